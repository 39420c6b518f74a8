use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{ListingStatus, PropertyListing, TenantProfile};

/// Eligibility gate that zeroes a pair's score when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardFilter {
    ListingNotActive,
    ListingExpired,
    CurrencyUnavailable,
    Budget,
    Location,
    PropertyType,
    Bedrooms,
    MoveInWindow,
    StayDuration,
    RequiredAmenities,
}

impl HardFilter {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ListingNotActive => "listing is not active",
            Self::ListingExpired => "listing has expired",
            Self::CurrencyUnavailable => "no exchange rate for the listing currency",
            Self::Budget => "rent outside budget",
            Self::Location => "location not targeted",
            Self::PropertyType => "property type not wanted",
            Self::Bedrooms => "bedroom count outside range",
            Self::MoveInWindow => "availability outside move-in window",
            Self::StayDuration => "stay durations do not overlap",
            Self::RequiredAmenities => "required amenity missing",
        }
    }
}

/// Overlapping stay window in months; `None` upper bound means open-ended.
pub(super) fn stay_window(
    tenant: &TenantProfile,
    listing: &PropertyListing,
) -> Option<(u16, Option<u16>)> {
    let lo = tenant
        .stay
        .min_months
        .max(listing.min_stay_months.unwrap_or(0));
    let hi = match (tenant.stay.max_months, listing.max_stay_months) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    match hi {
        Some(hi) if lo > hi => None,
        _ => Some((lo, hi)),
    }
}

/// Days between the listing's availability and the tenant's move-in date.
pub(super) fn move_in_offset_days(tenant: &TenantProfile, listing: &PropertyListing) -> i64 {
    (listing.available_from - tenant.move_in_date).num_days().abs()
}

/// Returns the first failed gate, in evaluation order.
pub(super) fn first_failure(
    tenant: &TenantProfile,
    listing: &PropertyListing,
    normalized_rent: Option<f64>,
    now: DateTime<Utc>,
) -> Option<HardFilter> {
    if listing.status != ListingStatus::Active {
        return Some(HardFilter::ListingNotActive);
    }
    if listing.is_expired(now) {
        return Some(HardFilter::ListingExpired);
    }

    let Some(rent) = normalized_rent else {
        return Some(HardFilter::CurrencyUnavailable);
    };
    if !tenant.budget.contains(rent) {
        return Some(HardFilter::Budget);
    }

    let city = listing.location.city.to_lowercase();
    let country = listing.location.country.to_lowercase();
    if (!tenant.target_cities.is_empty() && !tenant.target_cities.contains(&city))
        || (!tenant.target_countries.is_empty() && !tenant.target_countries.contains(&country))
    {
        return Some(HardFilter::Location);
    }

    if !tenant.property_types.is_empty() && !tenant.property_types.contains(&listing.property_type)
    {
        return Some(HardFilter::PropertyType);
    }

    if !tenant.bedrooms.contains(listing.bedrooms) {
        return Some(HardFilter::Bedrooms);
    }

    let outlasts_move_in = listing
        .available_to
        .map(|to| to >= tenant.move_in_date)
        .unwrap_or(true);
    if move_in_offset_days(tenant, listing) > i64::from(tenant.flexibility_days) || !outlasts_move_in
    {
        return Some(HardFilter::MoveInWindow);
    }

    if stay_window(tenant, listing).is_none() {
        return Some(HardFilter::StayDuration);
    }

    if !tenant
        .required_amenities
        .iter()
        .all(|amenity| listing.amenities.contains(amenity))
    {
        return Some(HardFilter::RequiredAmenities);
    }

    None
}
