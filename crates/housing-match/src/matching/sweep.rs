//! Periodic expiry sweep.
//!
//! Walks live matches in id order under a cluster-wide leader lock and retires
//! the ones whose listing left the market, whose tenant stopped searching, or
//! that outlived the TTL. The last processed id is checkpointed after every
//! batch so an interrupted run resumes where it stopped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as Lease;
use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collaborators::{CheckpointStore, LeaderLock};
use super::domain::{ExpiryReason, HousingMatch, ListingStatus, MatchId, MatchStatus};
use super::index::MatchIndex;
use super::lifecycle::{LifecycleError, LifecycleManager};
use super::repository::{MatchRepository, ProfileStore, RepositoryError};

pub const SWEEP_JOB: &str = "housing-match-expiry-sweep";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// `false` when another instance held the leader lock.
    pub ran: bool,
    pub resumed_from: Option<MatchId>,
    pub scanned: usize,
    pub expired: usize,
    pub retained: usize,
    pub failed: usize,
    /// Set when renewing the lease failed mid-run; the checkpoint is kept so
    /// the next leader resumes after the last finished batch.
    pub lost_lease: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct ExpirySweeper {
    profiles: Arc<dyn ProfileStore>,
    matches: Arc<dyn MatchRepository>,
    lifecycle: Arc<LifecycleManager>,
    leader: Arc<dyn LeaderLock>,
    checkpoints: Arc<dyn CheckpointStore>,
    holder: String,
    batch_size: usize,
    lease: Lease,
}

impl ExpirySweeper {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        matches: Arc<dyn MatchRepository>,
        lifecycle: Arc<LifecycleManager>,
        leader: Arc<dyn LeaderLock>,
        checkpoints: Arc<dyn CheckpointStore>,
        batch_size: usize,
        lease: Lease,
    ) -> Self {
        Self {
            profiles,
            matches,
            lifecycle,
            leader,
            checkpoints,
            holder: format!("sweeper-{}", Uuid::new_v4()),
            batch_size: batch_size.max(1),
            lease,
        }
    }

    /// Overrides the generated lock holder name.
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn run(&self) -> Result<SweepReport, SweepError> {
        if !self.leader.try_acquire(SWEEP_JOB, &self.holder, self.lease)? {
            debug!(holder = %self.holder, "sweep skipped, another instance holds the lock");
            return Ok(SweepReport::default());
        }

        let outcome = self.walk();
        let lease_lost = matches!(&outcome, Ok(report) if report.lost_lease);
        if !lease_lost {
            if let Err(error) = self.leader.release(SWEEP_JOB, &self.holder) {
                warn!(%error, "failed to release sweep lock");
            }
        }
        let report = outcome?;

        counter!("housing_match_sweeps_total").increment(1);
        info!(
            scanned = report.scanned,
            expired = report.expired,
            failed = report.failed,
            resumed_from = ?report.resumed_from,
            lost_lease = report.lost_lease,
            "expiry sweep finished"
        );
        Ok(report)
    }

    fn walk(&self) -> Result<SweepReport, SweepError> {
        let mut cursor = self.checkpoints.load(SWEEP_JOB)?;
        let mut report = SweepReport {
            ran: true,
            resumed_from: cursor,
            ..SweepReport::default()
        };

        loop {
            let batch = self.matches.live_after(cursor, self.batch_size)?;
            let Some(last) = batch.last().map(|record| record.id) else {
                break;
            };

            for record in &batch {
                report.scanned += 1;
                match self.sweep_one(record) {
                    Ok(true) => report.expired += 1,
                    Ok(false) => report.retained += 1,
                    Err(error) => {
                        report.failed += 1;
                        warn!(match_id = %record.id, %error, "sweep could not process match");
                    }
                }
            }

            cursor = Some(last);
            self.checkpoints.save(SWEEP_JOB, cursor)?;
            if batch.len() < self.batch_size {
                break;
            }
            if !self.leader.try_acquire(SWEEP_JOB, &self.holder, self.lease)? {
                warn!(holder = %self.holder, checkpoint = ?cursor, "sweep lease lost, stopping");
                counter!("housing_match_sweep_lease_lost_total").increment(1);
                report.lost_lease = true;
                return Ok(report);
            }
        }

        self.checkpoints.save(SWEEP_JOB, None)?;
        Ok(report)
    }

    fn sweep_one(&self, record: &HousingMatch) -> Result<bool, LifecycleError> {
        let Some(reason) = self.expiry_reason(record)? else {
            return Ok(false);
        };
        let stored = self.lifecycle.expire(record.id, reason)?;
        if stored.status == MatchStatus::Expired {
            counter!("housing_match_expired_total", "source" => "sweep").increment(1);
        }
        Ok(stored.status == MatchStatus::Expired)
    }

    fn expiry_reason(&self, record: &HousingMatch) -> Result<Option<ExpiryReason>, RepositoryError> {
        let now = self.lifecycle.now();
        let listing_gone = match self.profiles.fetch_listing(record.listing_id)? {
            Some(listing) => listing.status != ListingStatus::Active || listing.is_expired(now),
            None => true,
        };
        if listing_gone {
            return Ok(Some(ExpiryReason::ListingUnavailable));
        }

        let tenant_gone = self
            .profiles
            .fetch_tenant(record.tenant_profile_id)?
            .map(|tenant| !tenant.is_active)
            .unwrap_or(true);
        if tenant_gone {
            return Ok(Some(ExpiryReason::TenantInactive));
        }

        if self.lifecycle.ttl_elapsed(record, now) {
            return Ok(Some(ExpiryReason::TimeToLive));
        }
        Ok(None)
    }
}

/// Runs deferred pair retries followed by an expiry sweep on every tick.
pub fn spawn_sweep_task(
    sweeper: Arc<ExpirySweeper>,
    index: Arc<MatchIndex>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "expiry sweep task started");
        loop {
            ticker.tick().await;

            let retried = index.retry_deferred().await;
            if retried.considered > 0 || retried.expired > 0 {
                info!(?retried, "stale profiles and deferred pairs retried");
            }

            let worker = Arc::clone(&sweeper);
            match tokio::task::spawn_blocking(move || worker.run()).await {
                Ok(Ok(_)) => {}
                Ok(Err(error)) => warn!(%error, "expiry sweep failed"),
                Err(error) => warn!(%error, "expiry sweep task panicked"),
            }
        }
    })
}
