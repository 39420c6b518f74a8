//! Domain events that drive incremental re-scoring.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::domain::{ListingId, TenantProfileId};
use super::index::{IndexError, MatchIndex, RescanReport, StaleEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    TenantChanged(TenantProfileId),
    ListingChanged(ListingId),
    TenantDeactivated(TenantProfileId),
    ListingDeactivated(ListingId),
}

impl MatchEvent {
    /// The profile whose matches this event affects.
    pub fn subject(&self) -> StaleEntity {
        match *self {
            MatchEvent::TenantChanged(id) | MatchEvent::TenantDeactivated(id) => {
                StaleEntity::Tenant(id)
            }
            MatchEvent::ListingChanged(id) | MatchEvent::ListingDeactivated(id) => {
                StaleEntity::Listing(id)
            }
        }
    }
}

/// Bounded, non-blocking producer side of the rescan queue.
#[derive(Clone)]
pub struct EventPublisher {
    sender: mpsc::Sender<MatchEvent>,
    index: Arc<MatchIndex>,
}

impl EventPublisher {
    pub fn channel(buffer: usize, index: Arc<MatchIndex>) -> (Self, mpsc::Receiver<MatchEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender, index }, receiver)
    }

    /// A dropped event marks its subject stale so the next sweep rescans it.
    pub fn publish(&self, event: MatchEvent) {
        match self.sender.try_send(event) {
            Ok(()) => debug!(?event, "match event queued"),
            Err(TrySendError::Full(event)) => {
                warn!(?event, "rescan queue full, subject marked stale");
                self.index.mark_stale(event.subject());
            }
            Err(TrySendError::Closed(event)) => {
                warn!(?event, "rescan worker stopped, subject marked stale");
                self.index.mark_stale(event.subject());
            }
        }
    }
}

pub struct RescanWorker {
    index: Arc<MatchIndex>,
    receiver: mpsc::Receiver<MatchEvent>,
}

impl RescanWorker {
    pub fn new(index: Arc<MatchIndex>, receiver: mpsc::Receiver<MatchEvent>) -> Self {
        Self { index, receiver }
    }

    /// Consumes events until every publisher is dropped.
    pub async fn run(mut self) {
        info!("rescan worker started");
        while let Some(event) = self.receiver.recv().await {
            match self.handle(event).await {
                Ok(report) => debug!(?event, ?report, "match event applied"),
                Err(IndexError::TenantNotFound(_) | IndexError::ListingNotFound(_)) => {
                    debug!(?event, "match event subject no longer exists")
                }
                Err(error) => {
                    warn!(?event, %error, "match event failed, subject marked stale");
                    self.index.mark_stale(event.subject());
                }
            }
        }
        info!("rescan worker stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn handle(&self, event: MatchEvent) -> Result<RescanReport, IndexError> {
        match event {
            MatchEvent::TenantChanged(id) => self.index.rescan_tenant(id).await,
            MatchEvent::ListingChanged(id) => self.index.rescan_listing(id).await,
            MatchEvent::TenantDeactivated(id) => Ok(RescanReport {
                expired: self.index.remove_tenant(id)?,
                ..RescanReport::default()
            }),
            MatchEvent::ListingDeactivated(id) => Ok(RescanReport {
                expired: self.index.remove_listing(id)?,
                ..RescanReport::default()
            }),
        }
    }
}
