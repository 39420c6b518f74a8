//! Deduplicated match storage and incremental re-scoring.
//!
//! A mutation on either side rescans the opposite side through the coarse
//! pre-index, scores every candidate pair on a bounded worker pool, and
//! upserts the results. Pair failures are deferred to the next sweep and
//! never abort the surrounding rescan.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::collaborators::{
    ExternalError, FxRateProvider, MatchNotification, NotificationDispatcher, NotificationKind,
};
use super::domain::{
    ExpiryReason, HousingMatch, ListingId, MatchId, MatchStatus, PropertyListing, RankingSnapshot,
    TenantProfile, TenantProfileId,
};
use super::lifecycle::{dispatch_quietly, LifecycleError, LifecycleManager};
use super::prefilter::{ListingQuery, TenantQuery};
use super::repository::{MatchRepository, ProfileStore, RepositoryError};
use super::scoring::{CompatibilityScorer, FxQuote, HardFilter, ScoreOutcome};
use crate::config::MatchingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PairKey {
    pub tenant: TenantProfileId,
    pub listing: ListingId,
}

/// A profile whose rescan was lost or failed and must be repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum StaleEntity {
    Tenant(TenantProfileId),
    Listing(ListingId),
}

/// What a single upsert did to the index.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(HousingMatch),
    Updated(HousingMatch),
    Unchanged(MatchId),
    Expired(MatchId),
    BelowThreshold { score: f64 },
    HardFailed(HardFilter),
    /// Declined earlier and neither side has changed since.
    Suppressed(MatchId),
    TenantInactive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescanReport {
    pub considered: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub below_threshold: usize,
    pub hard_failed: usize,
    pub suppressed: usize,
    pub expired: usize,
    pub deferred: usize,
}

impl RescanReport {
    fn record(&mut self, outcome: &UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created(_) => self.created += 1,
            UpsertOutcome::Updated(_) => self.updated += 1,
            UpsertOutcome::Unchanged(_) => self.unchanged += 1,
            UpsertOutcome::Expired(_) => self.expired += 1,
            UpsertOutcome::BelowThreshold { .. } => self.below_threshold += 1,
            UpsertOutcome::HardFailed(_) | UpsertOutcome::TenantInactive => self.hard_failed += 1,
            UpsertOutcome::Suppressed(_) => self.suppressed += 1,
        }
    }

    pub fn merge(&mut self, other: &RescanReport) {
        self.considered += other.considered;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.below_threshold += other.below_threshold;
        self.hard_failed += other.hard_failed;
        self.suppressed += other.suppressed;
        self.expired += other.expired;
        self.deferred += other.deferred;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("tenant profile {0} not found")]
    TenantNotFound(TenantProfileId),
    #[error("listing {0} not found")]
    ListingNotFound(ListingId),
    #[error(transparent)]
    External(#[from] ExternalError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("match for tenant {} and listing {} kept changing", .0.tenant, .0.listing)]
    Contended(PairKey),
}

pub struct MatchIndex {
    profiles: Arc<dyn ProfileStore>,
    matches: Arc<dyn MatchRepository>,
    fx: Arc<dyn FxRateProvider>,
    notifier: Arc<dyn NotificationDispatcher>,
    lifecycle: Arc<LifecycleManager>,
    scorer: CompatibilityScorer,
    min_score: f64,
    fx_timeout: Duration,
    permits: Arc<Semaphore>,
    deferred: Mutex<BTreeSet<PairKey>>,
    stale: Mutex<BTreeSet<StaleEntity>>,
}

impl MatchIndex {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        matches: Arc<dyn MatchRepository>,
        fx: Arc<dyn FxRateProvider>,
        notifier: Arc<dyn NotificationDispatcher>,
        lifecycle: Arc<LifecycleManager>,
        config: &MatchingConfig,
    ) -> Self {
        Self {
            profiles,
            matches,
            fx,
            notifier,
            lifecycle,
            scorer: CompatibilityScorer::new(config.weights),
            min_score: config.min_score,
            fx_timeout: config.fx_timeout,
            permits: Arc::new(Semaphore::new(config.worker_pool_size.max(1))),
            deferred: Mutex::new(BTreeSet::new()),
            stale: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn scorer(&self) -> &CompatibilityScorer {
        &self.scorer
    }

    /// Pairs waiting for the next sweep.
    pub fn deferred(&self) -> Vec<PairKey> {
        self.deferred.lock().iter().copied().collect()
    }

    /// Profiles waiting for a full rescan on the next sweep.
    pub fn stale(&self) -> Vec<StaleEntity> {
        self.stale.lock().iter().copied().collect()
    }

    /// Queues a full rescan of `entity` for the next sweep.
    pub fn mark_stale(&self, entity: StaleEntity) {
        counter!("housing_match_stale_entities_total").increment(1);
        self.stale.lock().insert(entity);
    }

    /// Scores one pair and reconciles the stored match with the result.
    pub async fn upsert_candidate(
        &self,
        tenant: &TenantProfile,
        listing: &PropertyListing,
    ) -> Result<UpsertOutcome, IndexError> {
        let key = PairKey {
            tenant: tenant.id,
            listing: listing.id,
        };
        let quote = self.quote(tenant, listing).await?;
        let now = self.lifecycle.now();
        let outcome = self.scorer.score(tenant, listing, quote, now);
        counter!("housing_match_pairs_scored_total").increment(1);

        for _ in 0..2 {
            let attempt = match self.matches.live_pair(tenant.id, listing.id)? {
                Some(current) => self.refresh(current, tenant, listing, &outcome, now)?,
                None => self.create(tenant, listing, &outcome, now)?,
            };
            if let Some(result) = attempt {
                return Ok(result);
            }
            debug!(tenant = %key.tenant, listing = %key.listing, "upsert raced another writer, retrying");
        }

        Err(IndexError::Contended(key))
    }

    fn refresh(
        &self,
        current: HousingMatch,
        tenant: &TenantProfile,
        listing: &PropertyListing,
        outcome: &ScoreOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<UpsertOutcome>, IndexError> {
        let retire = if !tenant.is_active {
            Some(ExpiryReason::TenantInactive)
        } else {
            outcome.hard_fail.map(|filter| match filter {
                HardFilter::ListingNotActive | HardFilter::ListingExpired => {
                    ExpiryReason::ListingUnavailable
                }
                _ => ExpiryReason::Ineligible,
            })
        };
        if let Some(reason) = retire {
            let retired = self.lifecycle.expire(current.id, reason)?;
            return Ok(Some(UpsertOutcome::Expired(retired.id)));
        }

        let snapshot = RankingSnapshot {
            listing_created_at: listing.created_at,
            normalized_rent: outcome.normalized_rent,
        };
        if current.compatibility_score == outcome.total
            && current.factors == outcome.factors
            && current.snapshot == snapshot
        {
            return Ok(Some(UpsertOutcome::Unchanged(current.id)));
        }

        let mut next = current.clone();
        next.compatibility_score = outcome.total;
        next.factors = outcome.factors;
        next.snapshot = snapshot;
        next.updated_at = now;

        match self.matches.compare_and_swap(next, current.version) {
            Ok(stored) => Ok(Some(UpsertOutcome::Updated(stored))),
            Err(RepositoryError::VersionConflict { .. }) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    fn create(
        &self,
        tenant: &TenantProfile,
        listing: &PropertyListing,
        outcome: &ScoreOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<UpsertOutcome>, IndexError> {
        if !tenant.is_active {
            return Ok(Some(UpsertOutcome::TenantInactive));
        }
        if let Some(filter) = outcome.hard_fail {
            return Ok(Some(UpsertOutcome::HardFailed(filter)));
        }
        if outcome.total < self.min_score {
            return Ok(Some(UpsertOutcome::BelowThreshold {
                score: outcome.total,
            }));
        }

        if let Some(previous) = self.matches.latest_pair(tenant.id, listing.id)? {
            let changed_since = tenant.updated_at.max(listing.updated_at) > previous.updated_at;
            if previous.status == MatchStatus::Declined && !changed_since {
                return Ok(Some(UpsertOutcome::Suppressed(previous.id)));
            }
        }

        let record = HousingMatch::pending(
            tenant,
            listing,
            outcome.total,
            outcome.factors,
            outcome.normalized_rent,
            now,
        );
        match self.matches.insert_match(record) {
            Ok(stored) => {
                counter!("housing_match_created_total").increment(1);
                info!(
                    match_id = %stored.id,
                    tenant = %tenant.id,
                    listing = %listing.id,
                    score = stored.compatibility_score,
                    "match created"
                );
                dispatch_quietly(
                    self.notifier.as_ref(),
                    MatchNotification {
                        match_id: stored.id,
                        recipients: vec![
                            stored.participants.tenant_user_id,
                            stored.participants.landlord_id,
                        ],
                        kind: NotificationKind::MatchCreated {
                            score: stored.compatibility_score,
                        },
                    },
                );
                Ok(Some(UpsertOutcome::Created(stored)))
            }
            Err(RepositoryError::Conflict) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    /// Scores a pair without reading or writing stored matches.
    pub async fn preview(
        &self,
        tenant: &TenantProfile,
        listing: &PropertyListing,
    ) -> Result<ScoreOutcome, IndexError> {
        let quote = self.quote(tenant, listing).await?;
        Ok(self.scorer.score(tenant, listing, quote, self.lifecycle.now()))
    }

    async fn quote(
        &self,
        tenant: &TenantProfile,
        listing: &PropertyListing,
    ) -> Result<FxQuote, ExternalError> {
        if tenant.budget.currency == listing.rent.currency {
            return Ok(FxQuote::SameCurrency);
        }

        let lookup = self.fx.rate(
            listing.rent.amount,
            &listing.rent.currency,
            &tenant.budget.currency,
        );
        match tokio::time::timeout(self.fx_timeout, lookup).await {
            Ok(Ok(Some(rate))) => Ok(FxQuote::Rate(rate)),
            Ok(Ok(None)) => Ok(FxQuote::Unavailable),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(ExternalError::Timeout {
                service: "fx",
                after_ms: self.fx_timeout.as_millis() as u64,
            }),
        }
    }

    /// Re-scores every listing that could match the tenant.
    pub async fn rescan_tenant(
        self: &Arc<Self>,
        id: TenantProfileId,
    ) -> Result<RescanReport, IndexError> {
        let tenant = self
            .profiles
            .fetch_tenant(id)?
            .ok_or(IndexError::TenantNotFound(id))?;
        if !tenant.is_active {
            let expired = self.remove_tenant(id)?;
            return Ok(RescanReport {
                expired,
                ..RescanReport::default()
            });
        }

        let query = ListingQuery::for_tenant(&tenant);
        let mut listings: BTreeMap<ListingId, PropertyListing> = self
            .profiles
            .candidate_listings(&query)?
            .into_iter()
            .map(|listing| (listing.id, listing))
            .collect();

        // Live matches outside the new candidate set still need re-scoring so they can retire.
        for record in self.matches.matches_for_tenant(id)? {
            if record.is_live() && !listings.contains_key(&record.listing_id) {
                if let Some(listing) = self.profiles.fetch_listing(record.listing_id)? {
                    listings.insert(listing.id, listing);
                }
            }
        }

        debug!(tenant = %id, candidates = listings.len(), "rescanning listings for tenant");
        let tenant = Arc::new(tenant);
        let pairs = listings
            .into_values()
            .map(|listing| (Arc::clone(&tenant), Arc::new(listing)))
            .collect();
        let report = self.fan_out(pairs).await;
        info!(tenant = %id, ?report, "tenant rescan finished");
        Ok(report)
    }

    /// Re-scores every tenant that could match the listing.
    pub async fn rescan_listing(self: &Arc<Self>, id: ListingId) -> Result<RescanReport, IndexError> {
        let listing = self
            .profiles
            .fetch_listing(id)?
            .ok_or(IndexError::ListingNotFound(id))?;

        let query = TenantQuery::for_listing(&listing);
        let mut tenants: BTreeMap<TenantProfileId, TenantProfile> = self
            .profiles
            .candidate_tenants(&query)?
            .into_iter()
            .map(|tenant| (tenant.id, tenant))
            .collect();

        for record in self.matches.matches_for_listing(id)? {
            if record.is_live() && !tenants.contains_key(&record.tenant_profile_id) {
                if let Some(tenant) = self.profiles.fetch_tenant(record.tenant_profile_id)? {
                    tenants.insert(tenant.id, tenant);
                }
            }
        }

        debug!(listing = %id, candidates = tenants.len(), "rescanning tenants for listing");
        let listing = Arc::new(listing);
        let pairs = tenants
            .into_values()
            .map(|tenant| (Arc::new(tenant), Arc::clone(&listing)))
            .collect();
        let report = self.fan_out(pairs).await;
        info!(listing = %id, ?report, "listing rescan finished");
        Ok(report)
    }

    /// Rescans stale profiles, then retries pairs that failed during earlier rescans.
    pub async fn retry_deferred(self: &Arc<Self>) -> RescanReport {
        let keys = std::mem::take(&mut *self.deferred.lock());
        let mut report = self.rescan_stale().await;
        if keys.is_empty() {
            return report;
        }

        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            let tenant = self.profiles.fetch_tenant(key.tenant);
            let listing = self.profiles.fetch_listing(key.listing);
            match (tenant, listing) {
                (Ok(Some(tenant)), Ok(Some(listing))) => {
                    pairs.push((Arc::new(tenant), Arc::new(listing)))
                }
                (Ok(_), Ok(_)) => debug!(tenant = %key.tenant, listing = %key.listing, "deferred pair no longer exists"),
                (Err(error), _) | (_, Err(error)) => {
                    warn!(tenant = %key.tenant, listing = %key.listing, %error, "deferred pair could not be loaded");
                    self.defer(key);
                    report.deferred += 1;
                }
            }
        }

        info!(pairs = pairs.len(), "retrying deferred pairs");
        report.merge(&self.fan_out(pairs).await);
        report
    }

    async fn rescan_stale(self: &Arc<Self>) -> RescanReport {
        let stale = std::mem::take(&mut *self.stale.lock());
        let mut report = RescanReport::default();
        if stale.is_empty() {
            return report;
        }

        info!(entities = stale.len(), "rescanning stale profiles");
        for entity in stale {
            let outcome = match entity {
                StaleEntity::Tenant(id) => self.rescan_tenant(id).await,
                StaleEntity::Listing(id) => self.rescan_listing(id).await,
            };
            match outcome {
                Ok(rescanned) => report.merge(&rescanned),
                Err(IndexError::TenantNotFound(_) | IndexError::ListingNotFound(_)) => {
                    debug!(?entity, "stale profile no longer exists");
                }
                Err(error) => {
                    warn!(?entity, %error, "stale profile rescan failed");
                    self.mark_stale(entity);
                }
            }
        }
        report
    }

    /// Retires every live match of a listing that left the market.
    pub fn remove_listing(&self, id: ListingId) -> Result<usize, IndexError> {
        let live: Vec<HousingMatch> = self
            .matches
            .matches_for_listing(id)?
            .into_iter()
            .filter(|record| record.is_live())
            .collect();
        Ok(self.retire(live, ExpiryReason::ListingUnavailable))
    }

    /// Retires every live match of a tenant who stopped searching.
    pub fn remove_tenant(&self, id: TenantProfileId) -> Result<usize, IndexError> {
        let live: Vec<HousingMatch> = self
            .matches
            .matches_for_tenant(id)?
            .into_iter()
            .filter(|record| record.is_live())
            .collect();
        Ok(self.retire(live, ExpiryReason::TenantInactive))
    }

    fn retire(&self, records: Vec<HousingMatch>, reason: ExpiryReason) -> usize {
        let mut expired = 0;
        for record in records {
            match self.lifecycle.expire(record.id, reason) {
                Ok(stored) if stored.status == MatchStatus::Expired => expired += 1,
                Ok(_) => {}
                Err(error) => {
                    warn!(match_id = %record.id, ?reason, %error, "failed to retire match")
                }
            }
        }
        expired
    }

    async fn fan_out(
        self: &Arc<Self>,
        pairs: Vec<(Arc<TenantProfile>, Arc<PropertyListing>)>,
    ) -> RescanReport {
        let mut report = RescanReport::default();
        let mut tasks = JoinSet::new();
        let mut outstanding = BTreeSet::new();

        for (tenant, listing) in pairs {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                error!("scoring worker pool closed");
                break;
            };
            report.considered += 1;
            let key = PairKey {
                tenant: tenant.id,
                listing: listing.id,
            };
            outstanding.insert(key);
            let index = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = permit;
                (key, index.upsert_candidate(&tenant, &listing).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(outcome))) => {
                    outstanding.remove(&key);
                    report.record(&outcome);
                }
                Ok((key, Err(error))) => {
                    outstanding.remove(&key);
                    warn!(
                        tenant = %key.tenant,
                        listing = %key.listing,
                        %error,
                        "pair skipped, deferred to next sweep"
                    );
                    self.defer(key);
                    report.deferred += 1;
                }
                Err(error) => error!(%error, "scoring task aborted"),
            }
        }

        // Whatever never reported back was lost to a panic or cancellation.
        for key in outstanding {
            warn!(tenant = %key.tenant, listing = %key.listing, "pair lost with its task, deferred to next sweep");
            self.defer(key);
            report.deferred += 1;
        }

        report
    }

    fn defer(&self, key: PairKey) {
        counter!("housing_match_pairs_deferred_total").increment(1);
        self.deferred.lock().insert(key);
    }
}
