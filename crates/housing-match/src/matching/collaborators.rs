//! Narrow interfaces to the systems the engine depends on but does not own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CurrencyCode, GeoPoint, MatchId, MatchStatus, MessageId, UserId};
use super::repository::RepositoryError;

/// Failure of an outbound dependency; never surfaced to end users.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExternalError {
    #[error("{service} timed out after {after_ms}ms")]
    Timeout { service: &'static str, after_ms: u64 },
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },
}

/// Exchange-rate lookup. `Ok(None)` means the provider knows no rate for the pair.
#[async_trait]
pub trait FxRateProvider: Send + Sync {
    async fn rate(
        &self,
        amount: u32,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Option<f64>, ExternalError>;
}

/// Address to coordinates, used only to enrich listings for distance display.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, address: &str) -> Result<Option<GeoPoint>, ExternalError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    MatchCreated { score: f64 },
    StatusChanged { from: MatchStatus, to: MatchStatus },
    NewMessage { message_id: MessageId, sender: UserId },
}

/// Outbound notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchNotification {
    pub match_id: MatchId,
    pub recipients: Vec<UserId>,
    #[serde(flatten)]
    pub kind: NotificationKind,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Trait describing outbound notification hooks (push, e-mail, ...).
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: MatchNotification) -> Result<(), DispatchError>;
}

/// Cluster-wide mutual exclusion for periodic jobs.
pub trait LeaderLock: Send + Sync {
    /// Acquires or renews the lease; `false` when another holder owns it.
    fn try_acquire(
        &self,
        job: &str,
        holder: &str,
        lease: chrono::Duration,
    ) -> Result<bool, RepositoryError>;
    fn release(&self, job: &str, holder: &str) -> Result<(), RepositoryError>;
}

/// Resume point for id-ordered batch jobs.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, job: &str) -> Result<Option<MatchId>, RepositoryError>;
    fn save(&self, job: &str, last_processed: Option<MatchId>) -> Result<(), RepositoryError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
