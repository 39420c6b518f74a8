use super::super::domain::{MatchFactors, PropertyListing, TenantProfile, ValidationError};
use super::filters::{move_in_offset_days, stay_window};

/// Factor value used when the tenant left the relevant preference empty.
pub(crate) const NEUTRAL: f64 = 0.5;

const NEIGHBORHOOD_MATCH: f64 = 1.0;
const CITY_MATCH: f64 = 0.7;
const COUNTRY_MATCH: f64 = 0.4;
const NEIGHBORHOOD_MISSED: f64 = 0.3;

/// Computes the soft factors for a pair that already cleared every hard filter.
pub(super) fn soft_factors(
    tenant: &TenantProfile,
    listing: &PropertyListing,
    normalized_rent: f64,
) -> Result<MatchFactors, ValidationError> {
    let distance_km = match (&tenant.preferred_location, &listing.location.coordinates) {
        (Some(from), Some(to)) => Some(from.distance_km(to)),
        _ => None,
    };

    MatchFactors::new(
        budget_fit(tenant, normalized_rent),
        location_specificity(tenant, listing),
        amenity_coverage(tenant, listing),
        lifestyle_agreement(tenant, listing),
        move_in_proximity(tenant, listing),
        stay_overlap(tenant, listing),
    )
    .map(|factors| factors.with_distance(distance_km))
}

fn budget_fit(tenant: &TenantProfile, rent: f64) -> f64 {
    let half_width = (tenant.budget.max as f64 - tenant.budget.min as f64) / 2.0;
    let distance = (rent - tenant.budget.midpoint()).abs();
    if half_width <= f64::EPSILON {
        return if distance <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    (1.0 - distance / half_width).clamp(0.0, 1.0)
}

fn location_specificity(tenant: &TenantProfile, listing: &PropertyListing) -> f64 {
    let neighborhood_hit = listing
        .location
        .neighborhood
        .as_deref()
        .map(|name| {
            tenant
                .preferred_neighborhoods
                .contains(&name.trim().to_lowercase())
        })
        .unwrap_or(false);

    if neighborhood_hit {
        NEIGHBORHOOD_MATCH
    } else if !tenant.target_cities.is_empty() {
        CITY_MATCH
    } else if !tenant.target_countries.is_empty() {
        COUNTRY_MATCH
    } else if !tenant.preferred_neighborhoods.is_empty() {
        NEIGHBORHOOD_MISSED
    } else {
        NEUTRAL
    }
}

fn amenity_coverage(tenant: &TenantProfile, listing: &PropertyListing) -> f64 {
    if !tenant.preferred_amenities.is_empty() {
        let covered = tenant
            .preferred_amenities
            .iter()
            .filter(|amenity| listing.amenities.contains(amenity))
            .count();
        return covered as f64 / tenant.preferred_amenities.len() as f64;
    }
    // Required amenities are gated already, so all of them are present here.
    if !tenant.required_amenities.is_empty() {
        return 1.0;
    }
    NEUTRAL
}

fn lifestyle_agreement(tenant: &TenantProfile, listing: &PropertyListing) -> f64 {
    let lifestyle = &tenant.lifestyle;
    let checks = [
        lifestyle.furnished.map(|wanted| wanted == listing.furnished),
        lifestyle.pets.map(|has_pets| !has_pets || listing.pet_friendly),
        lifestyle.smoker.map(|smokes| !smokes || listing.smoking_allowed),
    ];

    let applicable: Vec<bool> = checks.into_iter().flatten().collect();
    if applicable.is_empty() {
        return NEUTRAL;
    }
    let agreed = applicable.iter().filter(|agrees| **agrees).count();
    agreed as f64 / applicable.len() as f64
}

fn move_in_proximity(tenant: &TenantProfile, listing: &PropertyListing) -> f64 {
    let offset = move_in_offset_days(tenant, listing) as f64;
    if tenant.flexibility_days == 0 {
        return if offset == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - offset / f64::from(tenant.flexibility_days)).clamp(0.0, 1.0)
}

fn stay_overlap(tenant: &TenantProfile, listing: &PropertyListing) -> f64 {
    let Some(tenant_max) = tenant.stay.max_months else {
        return NEUTRAL;
    };
    let Some((lo, Some(hi))) = stay_window(tenant, listing) else {
        return 0.0;
    };
    let wanted = f64::from(tenant_max - tenant.stay.min_months) + 1.0;
    let overlap = f64::from(hi - lo) + 1.0;
    (overlap / wanted).clamp(0.0, 1.0)
}
