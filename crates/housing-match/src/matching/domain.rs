use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(
    /// Identifier of a tenant's search profile.
    TenantProfileId
);
entity_id!(
    /// Identifier of a published property listing.
    ListingId
);
entity_id!(
    /// Identifier of a persisted tenant/listing pairing.
    MatchId
);
entity_id!(MessageId);
entity_id!(
    /// Account identifier owned by the external authentication system.
    UserId
);

/// Input rejected before it reaches the store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("currency code '{0}' must be three uppercase ASCII letters")]
    InvalidCurrency(String),
    #[error("{field}: minimum exceeds maximum")]
    InvertedRange { field: &'static str },
    #[error("move-in date {move_in} precedes profile creation on {created}")]
    MoveInInPast { move_in: NaiveDate, created: NaiveDate },
    #[error("{field} must not be blank")]
    Blank { field: &'static str },
    #[error("listing status cannot move from {from} to {to}")]
    ListingStatus {
        from: ListingStatus,
        to: ListingStatus,
    },
    #[error("factor {factor} must lie in [0, 1], got {value}")]
    FactorOutOfRange { factor: &'static str, value: f64 },
    #[error("invalid scoring weights: {0}")]
    Weights(String),
    #[error("cursor is malformed")]
    Cursor,
}

/// ISO 4217 style currency code, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.len() == 3 && trimmed.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ValidationError::InvalidCurrency(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: u32,
    pub currency: CurrencyCode,
}

/// Monthly rent window the tenant is prepared to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub min: u32,
    pub max: u32,
    pub currency: CurrencyCode,
}

impl Budget {
    pub fn midpoint(&self) -> f64 {
        (self.min as f64 + self.max as f64) / 2.0
    }

    pub fn contains(&self, amount: f64) -> bool {
        amount >= self.min as f64 && amount <= self.max as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedroomRange {
    pub min: u8,
    pub max: u8,
}

impl BedroomRange {
    pub fn contains(&self, bedrooms: u8) -> bool {
        (self.min..=self.max).contains(&bedrooms)
    }
}

/// Desired length of stay in months; an open maximum means "as long as possible".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    pub min_months: u16,
    #[serde(default)]
    pub max_months: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    House,
    Studio,
    Room,
    Townhouse,
    Condo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialStyle {
    Quiet,
    Balanced,
    Social,
}

/// Lifestyle answers; `None` means the tenant did not express a preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifestylePreferences {
    #[serde(default)]
    pub furnished: Option<bool>,
    #[serde(default)]
    pub pets: Option<bool>,
    #[serde(default)]
    pub smoker: Option<bool>,
    #[serde(default)]
    pub social_style: Option<SocialStyle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantAbout {
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

/// Preferences a tenant submits when creating or editing a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSubmission {
    #[serde(default)]
    pub target_cities: Vec<String>,
    #[serde(default)]
    pub target_countries: Vec<String>,
    #[serde(default)]
    pub preferred_neighborhoods: Vec<String>,
    #[serde(default)]
    pub preferred_location: Option<GeoPoint>,
    pub budget: Budget,
    #[serde(default)]
    pub property_types: Vec<PropertyType>,
    pub bedrooms: BedroomRange,
    pub move_in_date: NaiveDate,
    #[serde(default)]
    pub flexibility_days: u16,
    pub stay: StayRange,
    #[serde(default)]
    pub lifestyle: LifestylePreferences,
    #[serde(default)]
    pub required_amenities: Vec<String>,
    #[serde(default)]
    pub preferred_amenities: Vec<String>,
    #[serde(default)]
    pub about: TenantAbout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: TenantProfileId,
    pub user_id: UserId,
    pub target_cities: Vec<String>,
    pub target_countries: Vec<String>,
    pub preferred_neighborhoods: Vec<String>,
    pub preferred_location: Option<GeoPoint>,
    pub budget: Budget,
    pub property_types: Vec<PropertyType>,
    pub bedrooms: BedroomRange,
    pub move_in_date: NaiveDate,
    pub flexibility_days: u16,
    pub stay: StayRange,
    pub lifestyle: LifestylePreferences,
    pub required_amenities: Vec<String>,
    pub preferred_amenities: Vec<String>,
    pub about: TenantAbout,
    pub is_active: bool,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every write.
    #[serde(default)]
    pub version: u64,
}

impl TenantProfile {
    pub fn from_submission(
        user_id: UserId,
        submission: TenantSubmission,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        validate_tenant(&submission, now.date_naive())?;
        Ok(Self::build(user_id, submission, now))
    }

    fn build(user_id: UserId, submission: TenantSubmission, now: DateTime<Utc>) -> Self {
        Self {
            id: TenantProfileId::new(),
            user_id,
            target_cities: normalize_labels(submission.target_cities),
            target_countries: normalize_labels(submission.target_countries),
            preferred_neighborhoods: normalize_labels(submission.preferred_neighborhoods),
            preferred_location: submission.preferred_location,
            budget: submission.budget,
            property_types: submission.property_types,
            bedrooms: submission.bedrooms,
            move_in_date: submission.move_in_date,
            flexibility_days: submission.flexibility_days,
            stay: submission.stay,
            lifestyle: submission.lifestyle,
            required_amenities: normalize_labels(submission.required_amenities),
            preferred_amenities: normalize_labels(submission.preferred_amenities),
            about: submission.about,
            is_active: true,
            last_active_at: now,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Replace the preference set while keeping identity and ownership.
    ///
    /// The move-in date is checked against the profile's creation date, so a
    /// tenant whose move-in has passed can still edit the rest of the profile.
    pub fn apply(&mut self, submission: TenantSubmission, now: DateTime<Utc>) -> Result<(), ValidationError> {
        validate_tenant(&submission, self.created_at.date_naive())?;
        let mut next = Self::build(self.user_id, submission, now);
        next.id = self.id;
        next.is_active = self.is_active;
        next.created_at = self.created_at;
        next.version = self.version;
        *self = next;
        Ok(())
    }
}

fn validate_tenant(submission: &TenantSubmission, created: NaiveDate) -> Result<(), ValidationError> {
    if submission.budget.min > submission.budget.max {
        return Err(ValidationError::InvertedRange { field: "budget" });
    }
    if submission.bedrooms.min > submission.bedrooms.max {
        return Err(ValidationError::InvertedRange { field: "bedrooms" });
    }
    if let Some(max) = submission.stay.max_months {
        if submission.stay.min_months > max {
            return Err(ValidationError::InvertedRange { field: "stay" });
        }
    }
    if submission.move_in_date < created {
        return Err(ValidationError::MoveInInPast {
            move_in: submission.move_in_date,
            created,
        });
    }
    Ok(())
}

/// Trimmed, lowercased, de-duplicated labels so comparisons are case-insensitive.
pub(crate) fn normalize_labels(labels: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = labels
        .into_iter()
        .map(|label| label.trim().to_lowercase())
        .filter(|label| !label.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Pending,
    Active,
    Inactive,
    Rented,
}

impl ListingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Rented => "rented",
        }
    }

    /// Forward-only moves plus the landlord's active/inactive toggle.
    pub fn can_transition_to(self, next: ListingStatus) -> bool {
        use ListingStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Active, Inactive) | (Active, Rented) | (Inactive, Active)
        ) || self == next
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingTier {
    #[default]
    Basic,
    Featured,
    Premium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingLocation {
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinates: Option<GeoPoint>,
}

/// Attributes a landlord submits when publishing or editing a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSubmission {
    pub title: String,
    pub property_type: PropertyType,
    pub location: ListingLocation,
    pub rent: Money,
    #[serde(default)]
    pub deposit: u32,
    #[serde(default)]
    pub utilities_included: bool,
    pub bedrooms: u8,
    #[serde(default)]
    pub bathrooms: u8,
    #[serde(default)]
    pub area_sqm: Option<u32>,
    #[serde(default)]
    pub furnished: bool,
    #[serde(default)]
    pub pet_friendly: bool,
    #[serde(default)]
    pub smoking_allowed: bool,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub available_from: NaiveDate,
    #[serde(default)]
    pub available_to: Option<NaiveDate>,
    #[serde(default)]
    pub min_stay_months: Option<u16>,
    #[serde(default)]
    pub max_stay_months: Option<u16>,
    #[serde(default)]
    pub tier: ListingTier,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyListing {
    pub id: ListingId,
    pub landlord_id: UserId,
    pub title: String,
    pub property_type: PropertyType,
    pub location: ListingLocation,
    pub rent: Money,
    pub deposit: u32,
    pub utilities_included: bool,
    pub bedrooms: u8,
    pub bathrooms: u8,
    pub area_sqm: Option<u32>,
    pub furnished: bool,
    pub pet_friendly: bool,
    pub smoking_allowed: bool,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    pub available_from: NaiveDate,
    pub available_to: Option<NaiveDate>,
    pub min_stay_months: Option<u16>,
    pub max_stay_months: Option<u16>,
    pub status: ListingStatus,
    pub is_verified: bool,
    pub tier: ListingTier,
    pub expires_at: Option<DateTime<Utc>>,
    pub total_views: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PropertyListing {
    pub fn from_submission(
        landlord_id: UserId,
        submission: ListingSubmission,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        validate_listing(&submission)?;
        let mut location = submission.location;
        location.city = location.city.trim().to_string();
        location.country = location.country.trim().to_string();

        Ok(Self {
            id: ListingId::new(),
            landlord_id,
            title: submission.title.trim().to_string(),
            property_type: submission.property_type,
            location,
            rent: submission.rent,
            deposit: submission.deposit,
            utilities_included: submission.utilities_included,
            bedrooms: submission.bedrooms,
            bathrooms: submission.bathrooms,
            area_sqm: submission.area_sqm,
            furnished: submission.furnished,
            pet_friendly: submission.pet_friendly,
            smoking_allowed: submission.smoking_allowed,
            amenities: normalize_labels(submission.amenities),
            images: submission.images,
            available_from: submission.available_from,
            available_to: submission.available_to,
            min_stay_months: submission.min_stay_months,
            max_stay_months: submission.max_stay_months,
            status: ListingStatus::Pending,
            is_verified: false,
            tier: submission.tier,
            expires_at: submission.expires_at,
            total_views: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace landlord-editable attributes; status, verification and counters are kept.
    pub fn apply(&mut self, submission: ListingSubmission, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let mut next = Self::from_submission(self.landlord_id, submission, now)?;
        next.id = self.id;
        next.status = self.status;
        next.is_verified = self.is_verified;
        next.total_views = self.total_views;
        next.created_at = self.created_at;
        *self = next;
        Ok(())
    }

    pub fn set_status(&mut self, next: ListingStatus, now: DateTime<Utc>) -> Result<bool, ValidationError> {
        if !self.status.can_transition_to(next) {
            return Err(ValidationError::ListingStatus {
                from: self.status,
                to: next,
            });
        }
        if self.status == next {
            return Ok(false);
        }
        self.status = next;
        self.updated_at = now;
        Ok(true)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

fn validate_listing(submission: &ListingSubmission) -> Result<(), ValidationError> {
    if submission.title.trim().is_empty() {
        return Err(ValidationError::Blank { field: "title" });
    }
    if submission.location.city.trim().is_empty() {
        return Err(ValidationError::Blank { field: "location.city" });
    }
    if submission.location.country.trim().is_empty() {
        return Err(ValidationError::Blank {
            field: "location.country",
        });
    }
    if let Some(to) = submission.available_to {
        if submission.available_from > to {
            return Err(ValidationError::InvertedRange {
                field: "availability",
            });
        }
    }
    if let (Some(min), Some(max)) = (submission.min_stay_months, submission.max_stay_months) {
        if min > max {
            return Err(ValidationError::InvertedRange { field: "stay" });
        }
    }
    Ok(())
}

/// Fixed-key factor breakdown; every factor is normalised to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchFactors {
    pub budget_fit: f64,
    pub location_specificity: f64,
    pub amenity_coverage: f64,
    pub lifestyle_agreement: f64,
    pub move_in_proximity: f64,
    pub stay_overlap: f64,
    /// Informational only, never weighted.
    #[serde(default)]
    pub distance_km: Option<f64>,
}

impl MatchFactors {
    pub fn new(
        budget_fit: f64,
        location_specificity: f64,
        amenity_coverage: f64,
        lifestyle_agreement: f64,
        move_in_proximity: f64,
        stay_overlap: f64,
    ) -> Result<Self, ValidationError> {
        let factors = Self {
            budget_fit,
            location_specificity,
            amenity_coverage,
            lifestyle_agreement,
            move_in_proximity,
            stay_overlap,
            distance_km: None,
        };
        for (factor, value) in factors.entries() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::FactorOutOfRange { factor, value });
            }
        }
        Ok(factors)
    }

    pub const fn zero() -> Self {
        Self {
            budget_fit: 0.0,
            location_specificity: 0.0,
            amenity_coverage: 0.0,
            lifestyle_agreement: 0.0,
            move_in_proximity: 0.0,
            stay_overlap: 0.0,
            distance_km: None,
        }
    }

    pub fn with_distance(mut self, distance_km: Option<f64>) -> Self {
        self.distance_km = distance_km;
        self
    }

    pub fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("budget_fit", self.budget_fit),
            ("location_specificity", self.location_specificity),
            ("amenity_coverage", self.amenity_coverage),
            ("lifestyle_agreement", self.lifestyle_agreement),
            ("move_in_proximity", self.move_in_proximity),
            ("stay_overlap", self.stay_overlap),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Viewed,
    Contacted,
    Declined,
    Expired,
}

impl MatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Viewed => "viewed",
            Self::Contacted => "contacted",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Expired)
    }

    /// Display priority: contacted > viewed > pending.
    pub const fn display_rank(self) -> u8 {
        match self {
            Self::Contacted => 2,
            Self::Viewed => 1,
            Self::Pending | Self::Declined | Self::Expired => 0,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    ListingUnavailable,
    TenantInactive,
    Ineligible,
    TimeToLive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interest {
    #[default]
    Unknown,
    Interested,
    NotInterested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Tenant,
    Landlord,
}

/// The two accounts allowed to act on a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchParticipants {
    pub tenant_user_id: UserId,
    pub landlord_id: UserId,
}

impl MatchParticipants {
    pub fn party_of(&self, user: UserId) -> Option<Party> {
        if user == self.tenant_user_id {
            Some(Party::Tenant)
        } else if user == self.landlord_id {
            Some(Party::Landlord)
        } else {
            None
        }
    }

    pub fn user(&self, party: Party) -> UserId {
        match party {
            Party::Tenant => self.tenant_user_id,
            Party::Landlord => self.landlord_id,
        }
    }

    pub fn counterpart(&self, party: Party) -> UserId {
        match party {
            Party::Tenant => self.landlord_id,
            Party::Landlord => self.tenant_user_id,
        }
    }
}

/// Listing attributes copied onto the match so ranking never joins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub listing_created_at: DateTime<Utc>,
    /// Rent expressed in the tenant's budget currency.
    pub normalized_rent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HousingMatch {
    pub id: MatchId,
    pub tenant_profile_id: TenantProfileId,
    pub listing_id: ListingId,
    pub participants: MatchParticipants,
    pub compatibility_score: f64,
    pub factors: MatchFactors,
    pub snapshot: RankingSnapshot,
    pub status: MatchStatus,
    pub expiry_reason: Option<ExpiryReason>,
    pub tenant_interest: Interest,
    pub landlord_interest: Interest,
    pub messages_count: u32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl HousingMatch {
    pub fn pending(
        tenant: &TenantProfile,
        listing: &PropertyListing,
        score: f64,
        factors: MatchFactors,
        normalized_rent: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MatchId::new(),
            tenant_profile_id: tenant.id,
            listing_id: listing.id,
            participants: MatchParticipants {
                tenant_user_id: tenant.user_id,
                landlord_id: listing.landlord_id,
            },
            compatibility_score: score,
            factors,
            snapshot: RankingSnapshot {
                listing_created_at: listing.created_at,
                normalized_rent,
            },
            status: MatchStatus::Pending,
            expiry_reason: None,
            tenant_interest: Interest::Unknown,
            landlord_interest: Interest::Unknown,
            messages_count: 0,
            last_message_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn interest_mut(&mut self, party: Party) -> &mut Interest {
        match party {
            Party::Tenant => &mut self.tenant_interest,
            Party::Landlord => &mut self.landlord_interest,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Attachment,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousingMessage {
    pub id: MessageId,
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub body: String,
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
