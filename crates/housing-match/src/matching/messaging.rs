//! Match-scoped conversation log.
//!
//! Appending a message and bumping the match counters happen in one
//! repository call guarded by the match version. Writers targeting the same
//! match are additionally serialised through a striped lock.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::collaborators::{MatchNotification, NotificationDispatcher, NotificationKind};
use super::domain::{
    Attachment, HousingMatch, HousingMessage, MatchId, MatchStatus, MessageId, MessageKind, Party,
    UserId, ValidationError,
};
use super::lifecycle::{advance, dispatch_quietly, LifecycleManager, Transition};
use super::repository::{MatchRepository, RepositoryError};

const LOCK_STRIPES: usize = 64;

/// Message content supplied by a participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub body: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessageDraft {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("match {0} not found")]
    NotFound(MatchId),
    #[error("user {user} is not a participant of match {match_id}")]
    InvalidSender { match_id: MatchId, user: UserId },
    #[error("match {id} is {status}, messaging is closed")]
    MatchTerminal { id: MatchId, status: MatchStatus },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("match {0} was modified concurrently, retry the request")]
    ConcurrencyConflict(MatchId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct MessagingThread {
    matches: Arc<dyn MatchRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
    lifecycle: Arc<LifecycleManager>,
    stripes: Vec<Mutex<()>>,
}

impl MessagingThread {
    pub fn new(
        matches: Arc<dyn MatchRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
        lifecycle: Arc<LifecycleManager>,
    ) -> Self {
        Self {
            matches,
            notifier,
            lifecycle,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn post_message(
        &self,
        match_id: MatchId,
        sender: UserId,
        body: &str,
    ) -> Result<HousingMessage, MessagingError> {
        self.post(match_id, sender, MessageDraft::text(body))
    }

    /// Appends a message; the first message moves the match to contacted.
    pub fn post(
        &self,
        match_id: MatchId,
        sender: UserId,
        draft: MessageDraft,
    ) -> Result<HousingMessage, MessagingError> {
        let body = draft.body.trim().to_string();
        if body.is_empty() && draft.attachments.is_empty() {
            return Err(ValidationError::Blank { field: "body" }.into());
        }

        let _guard = self.stripe(match_id).lock();
        for attempt in 0..2 {
            let current = self.load(match_id)?;
            let party = participant(&current, sender)?;
            if current.status.is_terminal() {
                return Err(MessagingError::MatchTerminal {
                    id: match_id,
                    status: current.status,
                });
            }

            let now = self.lifecycle.now();
            let message = HousingMessage {
                id: MessageId::new(),
                match_id,
                sender_id: sender,
                recipient_id: current.participants.counterpart(party),
                body: body.clone(),
                kind: draft.kind,
                attachments: draft.attachments.clone(),
                is_read: false,
                read_at: None,
                created_at: now,
            };

            let mut next = current.clone();
            next.messages_count += 1;
            next.last_message_at = Some(now);
            next.updated_at = now;
            if let Some(status) = advance(current.status, Transition::Message) {
                next.status = status;
            }

            match self.matches.append_message(message.clone(), next, current.version) {
                Ok(stored) => {
                    counter!("housing_match_messages_total").increment(1);
                    info!(%match_id, message_id = %message.id, ?party, "message posted");
                    if stored.status != current.status {
                        self.lifecycle.announce(&stored, current.status);
                    }
                    dispatch_quietly(
                        self.notifier.as_ref(),
                        MatchNotification {
                            match_id,
                            recipients: vec![message.recipient_id],
                            kind: NotificationKind::NewMessage {
                                message_id: message.id,
                                sender,
                            },
                        },
                    );
                    return Ok(message);
                }
                Err(RepositoryError::VersionConflict { expected, found }) => {
                    debug!(%match_id, attempt, expected, found, "message append lost a race, re-reading");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(MessagingError::ConcurrencyConflict(match_id))
    }

    /// Marks every unread message addressed to `reader`; returns how many changed.
    pub fn mark_read(&self, match_id: MatchId, reader: UserId) -> Result<usize, MessagingError> {
        let current = self.load(match_id)?;
        participant(&current, reader)?;
        let marked = self
            .matches
            .mark_read(match_id, reader, self.lifecycle.now())?;
        debug!(%match_id, %reader, marked, "messages marked read");
        Ok(marked)
    }

    pub fn thread(
        &self,
        match_id: MatchId,
        reader: UserId,
    ) -> Result<Vec<HousingMessage>, MessagingError> {
        let current = self.load(match_id)?;
        participant(&current, reader)?;
        Ok(self.matches.messages(match_id)?)
    }

    fn load(&self, match_id: MatchId) -> Result<HousingMatch, MessagingError> {
        self.matches
            .fetch_match(match_id)?
            .ok_or(MessagingError::NotFound(match_id))
    }

    fn stripe(&self, match_id: MatchId) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        match_id.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % self.stripes.len()]
    }
}

fn participant(record: &HousingMatch, user: UserId) -> Result<Party, MessagingError> {
    record
        .participants
        .party_of(user)
        .ok_or(MessagingError::InvalidSender {
            match_id: record.id,
            user,
        })
}
