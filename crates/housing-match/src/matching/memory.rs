//! In-process adapters for every collaborator trait.
//!
//! They back the demo server and the test suites. Locks are held only for the
//! duration of a single call, which gives each call the atomicity a database
//! transaction would.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};

use super::collaborators::{
    CheckpointStore, Clock, DispatchError, ExternalError, FxRateProvider, Geocoder, LeaderLock,
    MatchNotification, NotificationDispatcher,
};
use super::domain::{
    CurrencyCode, GeoPoint, HousingMatch, HousingMessage, ListingId, MatchId, PropertyListing,
    TenantProfile, TenantProfileId, UserId,
};
use super::prefilter::{ListingQuery, TenantQuery};
use super::repository::{MatchRepository, ProfileStore, RepositoryError};

#[derive(Default)]
struct ProfileTables {
    tenants: BTreeMap<TenantProfileId, TenantProfile>,
    tenants_by_user: HashMap<UserId, TenantProfileId>,
    tenants_by_city: HashMap<String, BTreeSet<TenantProfileId>>,
    tenants_by_country: HashMap<String, BTreeSet<TenantProfileId>>,
    unrestricted_tenants: BTreeSet<TenantProfileId>,
    listings: BTreeMap<ListingId, PropertyListing>,
    listings_by_city: HashMap<String, BTreeSet<ListingId>>,
    listings_by_country: HashMap<String, BTreeSet<ListingId>>,
}

impl ProfileTables {
    fn index_tenant(&mut self, tenant: &TenantProfile) {
        if !tenant.target_cities.is_empty() {
            for city in &tenant.target_cities {
                self.tenants_by_city.entry(city.clone()).or_default().insert(tenant.id);
            }
        } else if !tenant.target_countries.is_empty() {
            for country in &tenant.target_countries {
                self.tenants_by_country
                    .entry(country.clone())
                    .or_default()
                    .insert(tenant.id);
            }
        } else {
            self.unrestricted_tenants.insert(tenant.id);
        }
    }

    fn unindex_tenant(&mut self, id: TenantProfileId) {
        for bucket in self.tenants_by_city.values_mut() {
            bucket.remove(&id);
        }
        for bucket in self.tenants_by_country.values_mut() {
            bucket.remove(&id);
        }
        self.unrestricted_tenants.remove(&id);
    }

    fn index_listing(&mut self, listing: &PropertyListing) {
        self.listings_by_city
            .entry(listing.location.city.to_lowercase())
            .or_default()
            .insert(listing.id);
        self.listings_by_country
            .entry(listing.location.country.to_lowercase())
            .or_default()
            .insert(listing.id);
    }

    fn unindex_listing(&mut self, listing: &PropertyListing) {
        if let Some(bucket) = self
            .listings_by_city
            .get_mut(&listing.location.city.to_lowercase())
        {
            bucket.remove(&listing.id);
        }
        if let Some(bucket) = self
            .listings_by_country
            .get_mut(&listing.location.country.to_lowercase())
        {
            bucket.remove(&listing.id);
        }
    }
}

/// Profile store with city/country buckets standing in for database indexes.
#[derive(Default)]
pub struct InMemoryProfileStore {
    tables: RwLock<ProfileTables>,
}

impl ProfileStore for InMemoryProfileStore {
    fn insert_tenant(&self, profile: TenantProfile) -> Result<TenantProfile, RepositoryError> {
        let mut tables = self.tables.write();
        if tables.tenants_by_user.contains_key(&profile.user_id)
            || tables.tenants.contains_key(&profile.id)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.tenants_by_user.insert(profile.user_id, profile.id);
        tables.index_tenant(&profile);
        tables.tenants.insert(profile.id, profile.clone());
        Ok(profile)
    }

    fn update_tenant(&self, mut profile: TenantProfile) -> Result<TenantProfile, RepositoryError> {
        let mut tables = self.tables.write();
        let found = tables
            .tenants
            .get(&profile.id)
            .map(|stored| stored.version)
            .ok_or(RepositoryError::NotFound)?;
        if found != profile.version {
            return Err(RepositoryError::VersionConflict {
                expected: profile.version,
                found,
            });
        }
        profile.version += 1;
        tables.unindex_tenant(profile.id);
        tables.index_tenant(&profile);
        tables.tenants.insert(profile.id, profile.clone());
        Ok(profile)
    }

    fn fetch_tenant(&self, id: TenantProfileId) -> Result<Option<TenantProfile>, RepositoryError> {
        Ok(self.tables.read().tenants.get(&id).cloned())
    }

    fn tenant_for_user(&self, user: UserId) -> Result<Option<TenantProfile>, RepositoryError> {
        let tables = self.tables.read();
        Ok(tables
            .tenants_by_user
            .get(&user)
            .and_then(|id| tables.tenants.get(id))
            .cloned())
    }

    fn insert_listing(&self, listing: PropertyListing) -> Result<PropertyListing, RepositoryError> {
        let mut tables = self.tables.write();
        if tables.listings.contains_key(&listing.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.index_listing(&listing);
        tables.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    fn update_listing(&self, listing: PropertyListing) -> Result<PropertyListing, RepositoryError> {
        let mut tables = self.tables.write();
        let Some(previous) = tables.listings.get(&listing.id).cloned() else {
            return Err(RepositoryError::NotFound);
        };
        tables.unindex_listing(&previous);
        tables.index_listing(&listing);
        tables.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    fn fetch_listing(&self, id: ListingId) -> Result<Option<PropertyListing>, RepositoryError> {
        Ok(self.tables.read().listings.get(&id).cloned())
    }

    fn candidate_listings(
        &self,
        query: &ListingQuery,
    ) -> Result<Vec<PropertyListing>, RepositoryError> {
        let tables = self.tables.read();
        let ids: BTreeSet<ListingId> = if !query.cities.is_empty() {
            bucket_union(&tables.listings_by_city, &query.cities)
        } else if !query.countries.is_empty() {
            bucket_union(&tables.listings_by_country, &query.countries)
        } else {
            tables.listings.keys().copied().collect()
        };

        Ok(ids
            .iter()
            .filter_map(|id| tables.listings.get(id))
            .filter(|listing| query.admits(listing))
            .cloned()
            .collect())
    }

    fn candidate_tenants(&self, query: &TenantQuery) -> Result<Vec<TenantProfile>, RepositoryError> {
        let tables = self.tables.read();
        let mut ids: BTreeSet<TenantProfileId> = tables.unrestricted_tenants.clone();
        if let Some(bucket) = tables.tenants_by_city.get(&query.city) {
            ids.extend(bucket.iter().copied());
        }
        if let Some(bucket) = tables.tenants_by_country.get(&query.country) {
            ids.extend(bucket.iter().copied());
        }

        Ok(ids
            .iter()
            .filter_map(|id| tables.tenants.get(id))
            .filter(|tenant| query.admits(tenant))
            .cloned()
            .collect())
    }
}

fn bucket_union<K: Ord + Copy>(
    buckets: &HashMap<String, BTreeSet<K>>,
    keys: &[String],
) -> BTreeSet<K> {
    keys.iter()
        .filter_map(|key| buckets.get(key))
        .flat_map(|bucket| bucket.iter().copied())
        .collect()
}

#[derive(Default)]
struct MatchTables {
    matches: BTreeMap<MatchId, HousingMatch>,
    live: HashMap<(TenantProfileId, ListingId), MatchId>,
    messages: HashMap<MatchId, Vec<HousingMessage>>,
}

impl MatchTables {
    fn swap(
        &mut self,
        mut record: HousingMatch,
        expected_version: u64,
    ) -> Result<HousingMatch, RepositoryError> {
        let stored = self
            .matches
            .get(&record.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                expected: expected_version,
                found: stored.version,
            });
        }

        record.version = expected_version + 1;
        let pair = (record.tenant_profile_id, record.listing_id);
        if record.is_live() {
            self.live.insert(pair, record.id);
        } else if self.live.get(&pair) == Some(&record.id) {
            self.live.remove(&pair);
        }
        self.matches.insert(record.id, record.clone());
        Ok(record)
    }
}

/// Match store enforcing one live row per pair and versioned writes.
#[derive(Default)]
pub struct InMemoryMatchRepository {
    tables: Mutex<MatchTables>,
}

impl MatchRepository for InMemoryMatchRepository {
    fn insert_match(&self, record: HousingMatch) -> Result<HousingMatch, RepositoryError> {
        let mut tables = self.tables.lock();
        let pair = (record.tenant_profile_id, record.listing_id);
        if tables.matches.contains_key(&record.id) || (record.is_live() && tables.live.contains_key(&pair)) {
            return Err(RepositoryError::Conflict);
        }
        if record.is_live() {
            tables.live.insert(pair, record.id);
        }
        tables.matches.insert(record.id, record.clone());
        Ok(record)
    }

    fn compare_and_swap(
        &self,
        record: HousingMatch,
        expected_version: u64,
    ) -> Result<HousingMatch, RepositoryError> {
        self.tables.lock().swap(record, expected_version)
    }

    fn fetch_match(&self, id: MatchId) -> Result<Option<HousingMatch>, RepositoryError> {
        Ok(self.tables.lock().matches.get(&id).cloned())
    }

    fn live_pair(
        &self,
        tenant: TenantProfileId,
        listing: ListingId,
    ) -> Result<Option<HousingMatch>, RepositoryError> {
        let tables = self.tables.lock();
        Ok(tables
            .live
            .get(&(tenant, listing))
            .and_then(|id| tables.matches.get(id))
            .cloned())
    }

    fn latest_pair(
        &self,
        tenant: TenantProfileId,
        listing: ListingId,
    ) -> Result<Option<HousingMatch>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .matches
            .values()
            .filter(|record| record.tenant_profile_id == tenant && record.listing_id == listing)
            .max_by_key(|record| (record.created_at, record.id))
            .cloned())
    }

    fn matches_for_tenant(
        &self,
        tenant: TenantProfileId,
    ) -> Result<Vec<HousingMatch>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .matches
            .values()
            .filter(|record| record.tenant_profile_id == tenant)
            .cloned()
            .collect())
    }

    fn matches_for_listing(&self, listing: ListingId) -> Result<Vec<HousingMatch>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .matches
            .values()
            .filter(|record| record.listing_id == listing)
            .cloned()
            .collect())
    }

    fn live_after(
        &self,
        after: Option<MatchId>,
        limit: usize,
    ) -> Result<Vec<HousingMatch>, RepositoryError> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        Ok(self
            .tables
            .lock()
            .matches
            .range((lower, Bound::Unbounded))
            .map(|(_, record)| record)
            .filter(|record| record.is_live())
            .take(limit)
            .cloned()
            .collect())
    }

    fn append_message(
        &self,
        message: HousingMessage,
        record: HousingMatch,
        expected_version: u64,
    ) -> Result<HousingMatch, RepositoryError> {
        let mut tables = self.tables.lock();
        let stored = tables.swap(record, expected_version)?;
        tables.messages.entry(message.match_id).or_default().push(message);
        Ok(stored)
    }

    fn messages(&self, match_id: MatchId) -> Result<Vec<HousingMessage>, RepositoryError> {
        let mut thread = self
            .tables
            .lock()
            .messages
            .get(&match_id)
            .cloned()
            .unwrap_or_default();
        thread.sort_by_key(|message| message.created_at);
        Ok(thread)
    }

    fn mark_read(
        &self,
        match_id: MatchId,
        reader: UserId,
        at: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        let mut tables = self.tables.lock();
        let Some(thread) = tables.messages.get_mut(&match_id) else {
            return Ok(0);
        };
        let mut marked = 0;
        for message in thread
            .iter_mut()
            .filter(|message| message.recipient_id == reader && !message.is_read)
        {
            message.is_read = true;
            message.read_at = Some(at);
            marked += 1;
        }
        Ok(marked)
    }
}

/// Fixed exchange-rate table; the inverse of a configured pair is derived.
#[derive(Debug, Clone, Default)]
pub struct StaticFxRates {
    rates: HashMap<(CurrencyCode, CurrencyCode), f64>,
}

impl StaticFxRates {
    pub fn new(rates: impl IntoIterator<Item = (CurrencyCode, CurrencyCode, f64)>) -> Self {
        let mut table = Self::default();
        for (from, to, rate) in rates {
            table = table.with_rate(from, to, rate);
        }
        table
    }

    pub fn with_rate(mut self, from: CurrencyCode, to: CurrencyCode, rate: f64) -> Self {
        if rate > 0.0 {
            self.rates
                .entry((to.clone(), from.clone()))
                .or_insert(1.0 / rate);
        }
        self.rates.insert((from, to), rate);
        self
    }

    pub fn lookup(&self, from: &CurrencyCode, to: &CurrencyCode) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        self.rates.get(&(from.clone(), to.clone())).copied()
    }
}

#[async_trait]
impl FxRateProvider for StaticFxRates {
    async fn rate(
        &self,
        _amount: u32,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Option<f64>, ExternalError> {
        Ok(self.lookup(from, to))
    }
}

/// Geocoder for deployments without an address service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGeocoder;

#[async_trait]
impl Geocoder for NoopGeocoder {
    async fn locate(&self, _address: &str) -> Result<Option<GeoPoint>, ExternalError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticGeocoder {
    points: HashMap<String, GeoPoint>,
}

impl StaticGeocoder {
    pub fn with_point(mut self, address: &str, point: GeoPoint) -> Self {
        self.points.insert(address.trim().to_lowercase(), point);
        self
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn locate(&self, address: &str) -> Result<Option<GeoPoint>, ExternalError> {
        Ok(self.points.get(&address.trim().to_lowercase()).copied())
    }
}

/// Records notifications so callers can inspect what would have been sent.
#[derive(Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<MatchNotification>>,
}

impl InMemoryNotifier {
    pub fn notifications(&self) -> Vec<MatchNotification> {
        self.sent.lock().clone()
    }
}

impl NotificationDispatcher for InMemoryNotifier {
    fn dispatch(&self, notification: MatchNotification) -> Result<(), DispatchError> {
        self.sent.lock().push(notification);
        Ok(())
    }
}

struct Lease {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// Lease-based lock; an expired lease can be taken over by any holder.
pub struct InMemoryLeaderLock {
    clock: std::sync::Arc<dyn Clock>,
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryLeaderLock {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            clock,
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn holder(&self, job: &str) -> Option<String> {
        let now = self.clock.now();
        self.leases
            .lock()
            .get(job)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.holder.clone())
    }
}

impl LeaderLock for InMemoryLeaderLock {
    fn try_acquire(&self, job: &str, holder: &str, lease: Duration) -> Result<bool, RepositoryError> {
        let now = self.clock.now();
        let mut leases = self.leases.lock();
        if let Some(current) = leases.get(job) {
            if current.holder != holder && current.expires_at > now {
                return Ok(false);
            }
        }
        leases.insert(
            job.to_string(),
            Lease {
                holder: holder.to_string(),
                expires_at: now + lease,
            },
        );
        Ok(true)
    }

    fn release(&self, job: &str, holder: &str) -> Result<(), RepositoryError> {
        let mut leases = self.leases.lock();
        if leases.get(job).map(|lease| lease.holder == holder).unwrap_or(false) {
            leases.remove(job);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, MatchId>>,
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self, job: &str) -> Result<Option<MatchId>, RepositoryError> {
        Ok(self.checkpoints.lock().get(job).copied())
    }

    fn save(&self, job: &str, last_processed: Option<MatchId>) -> Result<(), RepositoryError> {
        let mut checkpoints = self.checkpoints.lock();
        match last_processed {
            Some(id) => checkpoints.insert(job.to_string(), id),
            None => checkpoints.remove(job),
        };
        Ok(())
    }
}

/// Settable clock for deterministic tests and demos.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
