use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;

use crate::config::MatchingConfig;
use crate::matching::collaborators::{ExternalError, FxRateProvider};
use crate::matching::domain::{
    BedroomRange, Budget, CurrencyCode, HousingMatch, HousingMessage, LifestylePreferences,
    ListingId, ListingLocation, ListingStatus, ListingSubmission, ListingTier, MatchId, Money,
    PropertyListing, PropertyType, StayRange, TenantAbout, TenantProfile, TenantProfileId,
    TenantSubmission, UserId,
};
use crate::matching::index::{MatchIndex, UpsertOutcome};
use crate::matching::lifecycle::LifecycleManager;
use crate::matching::memory::{
    InMemoryCheckpointStore, InMemoryLeaderLock, InMemoryMatchRepository, InMemoryNotifier,
    InMemoryProfileStore, ManualClock, StaticFxRates,
};
use crate::matching::messaging::MessagingThread;
use crate::matching::ranking::RankingService;
use crate::matching::events::RescanWorker;
use crate::matching::repository::{MatchRepository, ProfileStore, RepositoryError};
use crate::matching::service::{MatchingDeps, MatchingService};
use crate::matching::sweep::ExpirySweeper;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn usd() -> CurrencyCode {
    CurrencyCode::parse("USD").expect("valid code")
}

pub(super) fn gbp() -> CurrencyCode {
    CurrencyCode::parse("GBP").expect("valid code")
}

/// Tenant from the Manchester walkthrough: 800-1200 USD, wifi required.
pub(super) fn tenant_submission() -> TenantSubmission {
    TenantSubmission {
        target_cities: vec!["Manchester".to_string()],
        target_countries: Vec::new(),
        preferred_neighborhoods: Vec::new(),
        preferred_location: None,
        budget: Budget {
            min: 800,
            max: 1200,
            currency: usd(),
        },
        property_types: Vec::new(),
        bedrooms: BedroomRange { min: 1, max: 3 },
        move_in_date: date(2025, 4, 1),
        flexibility_days: 14,
        stay: StayRange {
            min_months: 6,
            max_months: Some(12),
        },
        lifestyle: LifestylePreferences::default(),
        required_amenities: vec!["wifi".to_string()],
        preferred_amenities: Vec::new(),
        about: TenantAbout::default(),
    }
}

pub(super) fn listing_submission() -> ListingSubmission {
    ListingSubmission {
        title: "Two bed flat near Piccadilly".to_string(),
        property_type: PropertyType::Apartment,
        location: ListingLocation {
            city: "Manchester".to_string(),
            country: "GB".to_string(),
            neighborhood: Some("Ancoats".to_string()),
            address: None,
            coordinates: None,
        },
        rent: Money {
            amount: 1000,
            currency: usd(),
        },
        deposit: 1000,
        utilities_included: false,
        bedrooms: 2,
        bathrooms: 1,
        area_sqm: Some(65),
        furnished: true,
        pet_friendly: false,
        smoking_allowed: false,
        amenities: vec!["wifi".to_string(), "parking".to_string()],
        images: Vec::new(),
        available_from: date(2025, 4, 1),
        available_to: None,
        min_stay_months: Some(6),
        max_stay_months: None,
        tier: ListingTier::Basic,
        expires_at: None,
    }
}

pub(super) fn tenant_from(submission: TenantSubmission) -> TenantProfile {
    TenantProfile::from_submission(UserId::new(), submission, now()).expect("valid tenant")
}

pub(super) fn active_listing_from(submission: ListingSubmission) -> PropertyListing {
    let mut listing =
        PropertyListing::from_submission(UserId::new(), submission, now()).expect("valid listing");
    listing.status = ListingStatus::Active;
    listing
}

pub(super) fn test_config() -> MatchingConfig {
    MatchingConfig {
        worker_pool_size: 4,
        fx_timeout: StdDuration::from_millis(50),
        sweep_batch_size: 2,
        ..MatchingConfig::default()
    }
}

/// Wires the components over shared in-memory stores and a manual clock.
pub(super) struct Harness {
    pub(super) clock: Arc<ManualClock>,
    pub(super) profiles: Arc<InMemoryProfileStore>,
    pub(super) matches: Arc<dyn MatchRepository>,
    pub(super) notifier: Arc<InMemoryNotifier>,
    pub(super) leader: Arc<InMemoryLeaderLock>,
    pub(super) checkpoints: Arc<InMemoryCheckpointStore>,
    pub(super) lifecycle: Arc<LifecycleManager>,
    pub(super) index: Arc<MatchIndex>,
    pub(super) config: MatchingConfig,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::build(
            Arc::new(StaticFxRates::new([(gbp(), usd(), 1.25)])),
            Arc::new(InMemoryMatchRepository::default()),
            test_config(),
        )
    }

    pub(super) fn with_fx(fx: Arc<dyn FxRateProvider>) -> Self {
        Self::build(
            fx,
            Arc::new(InMemoryMatchRepository::default()),
            test_config(),
        )
    }

    pub(super) fn with_config(config: MatchingConfig) -> Self {
        Self::build(
            Arc::new(StaticFxRates::default()),
            Arc::new(InMemoryMatchRepository::default()),
            config,
        )
    }

    pub(super) fn with_matches(matches: Arc<dyn MatchRepository>) -> Self {
        Self::build(Arc::new(StaticFxRates::default()), matches, test_config())
    }

    fn build(
        fx: Arc<dyn FxRateProvider>,
        matches: Arc<dyn MatchRepository>,
        config: MatchingConfig,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(now()));
        let profiles = Arc::new(InMemoryProfileStore::default());
        let notifier = Arc::new(InMemoryNotifier::default());
        let leader = Arc::new(InMemoryLeaderLock::new(clock.clone()));
        let checkpoints = Arc::new(InMemoryCheckpointStore::default());
        let lifecycle = Arc::new(LifecycleManager::new(
            matches.clone(),
            notifier.clone(),
            clock.clone(),
            config.ttl(),
        ));
        let index = Arc::new(MatchIndex::new(
            profiles.clone(),
            matches.clone(),
            fx,
            notifier.clone(),
            lifecycle.clone(),
            &config,
        ));

        Self {
            clock,
            profiles,
            matches,
            notifier,
            leader,
            checkpoints,
            lifecycle,
            index,
            config,
        }
    }

    pub(super) fn store_tenant(&self, submission: TenantSubmission) -> TenantProfile {
        self.profiles
            .insert_tenant(tenant_from(submission))
            .expect("tenant stored")
    }

    pub(super) fn store_listing(&self, submission: ListingSubmission) -> PropertyListing {
        self.profiles
            .insert_listing(active_listing_from(submission))
            .expect("listing stored")
    }

    pub(super) fn refresh_tenant(&self, id: TenantProfileId) -> TenantProfile {
        self.profiles
            .fetch_tenant(id)
            .expect("store reachable")
            .expect("tenant exists")
    }

    pub(super) fn refresh_listing(&self, id: ListingId) -> PropertyListing {
        self.profiles
            .fetch_listing(id)
            .expect("store reachable")
            .expect("listing exists")
    }

    pub(super) fn fetch(&self, id: MatchId) -> HousingMatch {
        self.matches
            .fetch_match(id)
            .expect("store reachable")
            .expect("match exists")
    }

    pub(super) async fn upsert(
        &self,
        tenant: &TenantProfile,
        listing: &PropertyListing,
    ) -> UpsertOutcome {
        self.index
            .upsert_candidate(tenant, listing)
            .await
            .expect("upsert succeeds")
    }

    /// Stores the walkthrough pair and returns its freshly created match.
    pub(super) async fn seeded_match(&self) -> (TenantProfile, PropertyListing, HousingMatch) {
        let tenant = self.store_tenant(tenant_submission());
        let listing = self.store_listing(listing_submission());
        let record = created(self.upsert(&tenant, &listing).await);
        (tenant, listing, record)
    }

    pub(super) fn sweeper(&self, holder: &str) -> ExpirySweeper {
        ExpirySweeper::new(
            self.profiles.clone(),
            self.matches.clone(),
            self.lifecycle.clone(),
            self.leader.clone(),
            self.checkpoints.clone(),
            self.config.sweep_batch_size,
            Duration::minutes(10),
        )
        .with_holder(holder)
    }

    pub(super) fn messaging(&self) -> MessagingThread {
        MessagingThread::new(
            self.matches.clone(),
            self.notifier.clone(),
            self.lifecycle.clone(),
        )
    }

    pub(super) fn ranking(&self, max_page_size: usize) -> RankingService {
        RankingService::new(self.matches.clone(), max_page_size)
    }
}

/// Service over fresh in-memory stores, a manual clock and the GBP/USD table.
pub(super) struct ServiceFixture {
    pub(super) clock: Arc<ManualClock>,
    pub(super) notifier: Arc<InMemoryNotifier>,
    pub(super) deps: MatchingDeps,
}

impl ServiceFixture {
    pub(super) fn new() -> Self {
        let clock = Arc::new(ManualClock::new(now()));
        let notifier = Arc::new(InMemoryNotifier::default());
        let mut deps = MatchingDeps::in_memory(
            Arc::new(StaticFxRates::new([(gbp(), usd(), 1.25)])),
            clock.clone(),
        );
        deps.notifier = notifier.clone();
        Self {
            clock,
            notifier,
            deps,
        }
    }

    pub(super) fn build(self) -> (Arc<MatchingService>, RescanWorker) {
        self.build_with(test_config())
    }

    pub(super) fn build_with(self, config: MatchingConfig) -> (Arc<MatchingService>, RescanWorker) {
        let (service, worker) = MatchingService::new(self.deps, &config);
        (Arc::new(service), worker)
    }
}

pub(super) fn created(outcome: UpsertOutcome) -> HousingMatch {
    match outcome {
        UpsertOutcome::Created(record) => record,
        other => panic!("expected a created match, got {other:?}"),
    }
}

/// FX provider whose availability can be toggled mid-test.
#[derive(Default)]
pub(super) struct ToggleFx {
    pub(super) failing: AtomicBool,
    pub(super) rates: StaticFxRates,
}

impl ToggleFx {
    pub(super) fn failing(rates: StaticFxRates) -> Self {
        Self {
            failing: AtomicBool::new(true),
            rates,
        }
    }

    pub(super) fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl FxRateProvider for ToggleFx {
    async fn rate(
        &self,
        amount: u32,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Option<f64>, ExternalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExternalError::Unavailable {
                service: "fx",
                reason: "rates feed offline".to_string(),
            });
        }
        self.rates.rate(amount, from, to).await
    }
}

/// FX provider slower than any sensible timeout.
pub(super) struct StalledFx;

#[async_trait]
impl FxRateProvider for StalledFx {
    async fn rate(
        &self,
        _amount: u32,
        _from: &CurrencyCode,
        _to: &CurrencyCode,
    ) -> Result<Option<f64>, ExternalError> {
        tokio::time::sleep(StdDuration::from_secs(5)).await;
        Ok(Some(1.0))
    }
}

type Racer = Box<dyn FnOnce(&InMemoryMatchRepository) + Send>;

/// Wraps the in-memory store to inject competing writes ahead of a versioned write.
pub(super) struct InterferingRepository {
    pub(super) inner: InMemoryMatchRepository,
    racer: Mutex<Option<Racer>>,
    always_stale: AtomicBool,
}

impl InterferingRepository {
    pub(super) fn new() -> Self {
        Self {
            inner: InMemoryMatchRepository::default(),
            racer: Mutex::new(None),
            always_stale: AtomicBool::new(false),
        }
    }

    /// Runs `racer` against the store right before the next versioned write.
    pub(super) fn race_next_write(&self, racer: impl FnOnce(&InMemoryMatchRepository) + Send + 'static) {
        *self.racer.lock() = Some(Box::new(racer));
    }

    pub(super) fn reject_every_write(&self) {
        self.always_stale.store(true, Ordering::SeqCst);
    }

    fn interfere(&self, id: MatchId) -> Result<(), RepositoryError> {
        if let Some(racer) = self.racer.lock().take() {
            racer(&self.inner);
        }
        if self.always_stale.load(Ordering::SeqCst) {
            let found = self
                .inner
                .fetch_match(id)?
                .map(|record| record.version + 1)
                .unwrap_or_default();
            return Err(RepositoryError::VersionConflict {
                expected: found.saturating_sub(1),
                found,
            });
        }
        Ok(())
    }
}

impl MatchRepository for InterferingRepository {
    fn insert_match(&self, record: HousingMatch) -> Result<HousingMatch, RepositoryError> {
        self.inner.insert_match(record)
    }

    fn compare_and_swap(
        &self,
        record: HousingMatch,
        expected_version: u64,
    ) -> Result<HousingMatch, RepositoryError> {
        self.interfere(record.id)?;
        self.inner.compare_and_swap(record, expected_version)
    }

    fn fetch_match(&self, id: MatchId) -> Result<Option<HousingMatch>, RepositoryError> {
        self.inner.fetch_match(id)
    }

    fn live_pair(
        &self,
        tenant: TenantProfileId,
        listing: ListingId,
    ) -> Result<Option<HousingMatch>, RepositoryError> {
        self.inner.live_pair(tenant, listing)
    }

    fn latest_pair(
        &self,
        tenant: TenantProfileId,
        listing: ListingId,
    ) -> Result<Option<HousingMatch>, RepositoryError> {
        self.inner.latest_pair(tenant, listing)
    }

    fn matches_for_tenant(
        &self,
        tenant: TenantProfileId,
    ) -> Result<Vec<HousingMatch>, RepositoryError> {
        self.inner.matches_for_tenant(tenant)
    }

    fn matches_for_listing(&self, listing: ListingId) -> Result<Vec<HousingMatch>, RepositoryError> {
        self.inner.matches_for_listing(listing)
    }

    fn live_after(
        &self,
        after: Option<MatchId>,
        limit: usize,
    ) -> Result<Vec<HousingMatch>, RepositoryError> {
        self.inner.live_after(after, limit)
    }

    fn append_message(
        &self,
        message: HousingMessage,
        record: HousingMatch,
        expected_version: u64,
    ) -> Result<HousingMatch, RepositoryError> {
        self.interfere(record.id)?;
        self.inner.append_message(message, record, expected_version)
    }

    fn messages(&self, match_id: MatchId) -> Result<Vec<HousingMessage>, RepositoryError> {
        self.inner.messages(match_id)
    }

    fn mark_read(
        &self,
        match_id: MatchId,
        reader: UserId,
        at: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        self.inner.mark_read(match_id, reader, at)
    }
}
