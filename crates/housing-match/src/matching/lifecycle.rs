//! Match status state machine.
//!
//! ```text
//! pending -> viewed -> contacted
//!    \          \          \
//!     +----------+----------+--> declined | expired   (absorbing)
//! ```
//!
//! Writes are compare-and-set on `HousingMatch::version`. A losing writer
//! re-reads once and re-applies its transition, so a row that became terminal
//! in the meantime stays terminal ("most terminal wins").

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tracing::{debug, info, warn};

use super::collaborators::{Clock, MatchNotification, NotificationDispatcher, NotificationKind};
use super::domain::{ExpiryReason, HousingMatch, Interest, MatchId, MatchStatus, Party};
use super::repository::{MatchRepository, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Open,
    Message,
    Decline,
    Expire(ExpiryReason),
}

/// Next status for `transition`, or `None` when the transition does not apply.
pub fn advance(current: MatchStatus, transition: Transition) -> Option<MatchStatus> {
    use MatchStatus::*;
    match (current, transition) {
        (Pending, Transition::Open) => Some(Viewed),
        (Pending | Viewed, Transition::Message) => Some(Contacted),
        (Pending | Viewed | Contacted, Transition::Decline) => Some(Declined),
        (Pending | Viewed | Contacted, Transition::Expire(_)) => Some(Expired),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("match {0} not found")]
    NotFound(MatchId),
    #[error("match {id} is {status} and can no longer change")]
    Terminal { id: MatchId, status: MatchStatus },
    #[error("match {0} was modified concurrently, retry the request")]
    ConcurrencyConflict(MatchId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct LifecycleManager {
    matches: Arc<dyn MatchRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl LifecycleManager {
    pub fn new(
        matches: Arc<dyn MatchRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            matches,
            notifier,
            clock,
            ttl,
        }
    }

    /// Either party opened the match.
    pub fn open(&self, id: MatchId, party: Party) -> Result<HousingMatch, LifecycleError> {
        debug!(match_id = %id, ?party, "match opened");
        self.apply(id, |record| Ok(step(record, Transition::Open)))
    }

    /// Records explicit interest. Negative interest declines the match.
    pub fn set_interest(
        &self,
        id: MatchId,
        party: Party,
        interested: bool,
    ) -> Result<HousingMatch, LifecycleError> {
        self.apply(id, |record| {
            if record.status.is_terminal() {
                return if interested {
                    Err(LifecycleError::Terminal {
                        id: record.id,
                        status: record.status,
                    })
                } else {
                    Ok(false)
                };
            }

            let signal = if interested {
                Interest::Interested
            } else {
                Interest::NotInterested
            };
            let slot = record.interest_mut(party);
            let changed = *slot != signal;
            *slot = signal;

            if interested {
                Ok(changed)
            } else {
                Ok(step(record, Transition::Decline) || changed)
            }
        })
    }

    pub fn expire(&self, id: MatchId, reason: ExpiryReason) -> Result<HousingMatch, LifecycleError> {
        self.apply(id, |record| {
            let moved = step(record, Transition::Expire(reason));
            if moved {
                record.expiry_reason = Some(reason);
            }
            Ok(moved)
        })
    }

    /// Pending or viewed matches older than the TTL.
    pub fn ttl_elapsed(&self, record: &HousingMatch, now: DateTime<Utc>) -> bool {
        matches!(record.status, MatchStatus::Pending | MatchStatus::Viewed)
            && now - record.created_at > self.ttl
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn apply<F>(&self, id: MatchId, mutate: F) -> Result<HousingMatch, LifecycleError>
    where
        F: Fn(&mut HousingMatch) -> Result<bool, LifecycleError>,
    {
        for attempt in 0..2 {
            let current = self
                .matches
                .fetch_match(id)?
                .ok_or(LifecycleError::NotFound(id))?;

            let mut next = current.clone();
            if !mutate(&mut next)? {
                return Ok(current);
            }
            next.updated_at = self.clock.now();

            match self.matches.compare_and_swap(next, current.version) {
                Ok(stored) => {
                    if stored.status != current.status {
                        self.announce(&stored, current.status);
                    }
                    return Ok(stored);
                }
                Err(RepositoryError::VersionConflict { expected, found }) => {
                    debug!(match_id = %id, attempt, expected, found, "transition lost a race, re-reading");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(LifecycleError::ConcurrencyConflict(id))
    }

    /// Emits metrics and notifies both parties about a status change.
    pub(crate) fn announce(&self, record: &HousingMatch, from: MatchStatus) {
        counter!("housing_match_transitions_total", "to" => record.status.label()).increment(1);
        info!(
            match_id = %record.id,
            from = from.label(),
            to = record.status.label(),
            reason = ?record.expiry_reason,
            "match status changed"
        );
        dispatch_quietly(
            self.notifier.as_ref(),
            MatchNotification {
                match_id: record.id,
                recipients: vec![
                    record.participants.tenant_user_id,
                    record.participants.landlord_id,
                ],
                kind: NotificationKind::StatusChanged {
                    from,
                    to: record.status,
                },
            },
        );
    }
}

fn step(record: &mut HousingMatch, transition: Transition) -> bool {
    match advance(record.status, transition) {
        Some(next) => {
            record.status = next;
            true
        }
        None => false,
    }
}

/// Notification failures are logged and never fail the originating write.
pub(crate) fn dispatch_quietly(notifier: &dyn NotificationDispatcher, notification: MatchNotification) {
    let match_id = notification.match_id;
    if let Err(error) = notifier.dispatch(notification) {
        warn!(%match_id, %error, "notification dispatch failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_only_move_forward() {
        use MatchStatus::*;
        assert_eq!(advance(Pending, Transition::Open), Some(Viewed));
        assert_eq!(advance(Viewed, Transition::Open), None);
        assert_eq!(advance(Contacted, Transition::Open), None);
        assert_eq!(advance(Viewed, Transition::Message), Some(Contacted));
        assert_eq!(advance(Pending, Transition::Message), Some(Contacted));
        assert_eq!(advance(Contacted, Transition::Message), None);
    }

    #[test]
    fn terminal_statuses_absorb_every_transition() {
        for terminal in [MatchStatus::Declined, MatchStatus::Expired] {
            for transition in [
                Transition::Open,
                Transition::Message,
                Transition::Decline,
                Transition::Expire(ExpiryReason::TimeToLive),
            ] {
                assert_eq!(advance(terminal, transition), None);
            }
        }
    }

    #[test]
    fn any_live_status_can_be_declined_or_expired() {
        for live in [
            MatchStatus::Pending,
            MatchStatus::Viewed,
            MatchStatus::Contacted,
        ] {
            assert_eq!(advance(live, Transition::Decline), Some(MatchStatus::Declined));
            assert_eq!(
                advance(live, Transition::Expire(ExpiryReason::ListingUnavailable)),
                Some(MatchStatus::Expired)
            );
        }
    }
}
