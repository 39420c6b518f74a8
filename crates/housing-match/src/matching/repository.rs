use chrono::{DateTime, Utc};

use super::domain::{
    HousingMatch, HousingMessage, ListingId, MatchId, PropertyListing, TenantProfile,
    TenantProfileId, UserId,
};
use super::prefilter::{ListingQuery, TenantQuery};

/// Error enumeration for persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("stale write: expected version {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Tenant profile and listing persistence, including the coarse pre-index.
pub trait ProfileStore: Send + Sync {
    /// Fails with `Conflict` when the user already owns a profile.
    fn insert_tenant(&self, profile: TenantProfile) -> Result<TenantProfile, RepositoryError>;
    /// Fails with `VersionConflict` when `profile.version` is stale; bumps it on success.
    fn update_tenant(&self, profile: TenantProfile) -> Result<TenantProfile, RepositoryError>;
    fn fetch_tenant(&self, id: TenantProfileId) -> Result<Option<TenantProfile>, RepositoryError>;
    fn tenant_for_user(&self, user: UserId) -> Result<Option<TenantProfile>, RepositoryError>;

    fn insert_listing(&self, listing: PropertyListing) -> Result<PropertyListing, RepositoryError>;
    fn update_listing(&self, listing: PropertyListing) -> Result<PropertyListing, RepositoryError>;
    fn fetch_listing(&self, id: ListingId) -> Result<Option<PropertyListing>, RepositoryError>;

    /// Listings admitted by `query`, resolved through an index rather than a scan.
    fn candidate_listings(&self, query: &ListingQuery)
        -> Result<Vec<PropertyListing>, RepositoryError>;
    /// Active tenants admitted by `query`, resolved through an index rather than a scan.
    fn candidate_tenants(&self, query: &TenantQuery) -> Result<Vec<TenantProfile>, RepositoryError>;
}

/// Match and message persistence.
///
/// Implementations enforce a unique live row per (tenant, listing) pair and
/// bump `version` on every successful write.
pub trait MatchRepository: Send + Sync {
    /// Fails with `Conflict` when a live row for the same pair exists.
    fn insert_match(&self, record: HousingMatch) -> Result<HousingMatch, RepositoryError>;
    /// Writes `record` if the stored version still equals `expected_version`.
    fn compare_and_swap(
        &self,
        record: HousingMatch,
        expected_version: u64,
    ) -> Result<HousingMatch, RepositoryError>;
    fn fetch_match(&self, id: MatchId) -> Result<Option<HousingMatch>, RepositoryError>;
    fn live_pair(
        &self,
        tenant: TenantProfileId,
        listing: ListingId,
    ) -> Result<Option<HousingMatch>, RepositoryError>;
    /// Most recently created row for the pair, whatever its status.
    fn latest_pair(
        &self,
        tenant: TenantProfileId,
        listing: ListingId,
    ) -> Result<Option<HousingMatch>, RepositoryError>;
    fn matches_for_tenant(&self, tenant: TenantProfileId)
        -> Result<Vec<HousingMatch>, RepositoryError>;
    fn matches_for_listing(&self, listing: ListingId) -> Result<Vec<HousingMatch>, RepositoryError>;
    /// Live rows with id strictly greater than `after`, ascending by id.
    fn live_after(
        &self,
        after: Option<MatchId>,
        limit: usize,
    ) -> Result<Vec<HousingMatch>, RepositoryError>;

    /// Appends `message` and writes `record` in one transaction, guarded by `expected_version`.
    fn append_message(
        &self,
        message: HousingMessage,
        record: HousingMatch,
        expected_version: u64,
    ) -> Result<HousingMatch, RepositoryError>;
    /// Messages of a match ordered by creation time.
    fn messages(&self, match_id: MatchId) -> Result<Vec<HousingMessage>, RepositoryError>;
    /// Marks unread messages addressed to `reader`; returns how many changed.
    fn mark_read(
        &self,
        match_id: MatchId,
        reader: UserId,
        at: DateTime<Utc>,
    ) -> Result<usize, RepositoryError>;
}
