use std::sync::Arc;

use tracing::{debug, info, warn};

use super::collaborators::{
    CheckpointStore, Clock, FxRateProvider, Geocoder, LeaderLock, NotificationDispatcher,
};
use super::domain::{
    HousingMatch, HousingMessage, ListingId, ListingStatus, ListingSubmission, MatchId, Party,
    PropertyListing, TenantProfile, TenantProfileId, TenantSubmission, UserId, ValidationError,
};
use super::events::{EventPublisher, MatchEvent, RescanWorker};
use super::index::{IndexError, MatchIndex, RescanReport};
use super::lifecycle::{LifecycleError, LifecycleManager};
use super::memory::{
    InMemoryCheckpointStore, InMemoryLeaderLock, InMemoryMatchRepository, InMemoryNotifier,
    InMemoryProfileStore, NoopGeocoder,
};
use super::messaging::{MessageDraft, MessagingError, MessagingThread};
use super::ranking::{MatchPage, RankingError, RankingService};
use super::repository::{MatchRepository, ProfileStore, RepositoryError};
use super::scoring::ScoreOutcome;
use super::sweep::ExpirySweeper;
use crate::config::MatchingConfig;

/// Collaborators the engine is assembled from.
#[derive(Clone)]
pub struct MatchingDeps {
    pub profiles: Arc<dyn ProfileStore>,
    pub matches: Arc<dyn MatchRepository>,
    pub fx: Arc<dyn FxRateProvider>,
    pub geocoder: Arc<dyn Geocoder>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub leader: Arc<dyn LeaderLock>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub clock: Arc<dyn Clock>,
}

impl MatchingDeps {
    /// Process-local stores with the given rate table and clock.
    pub fn in_memory(fx: Arc<dyn FxRateProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            profiles: Arc::new(InMemoryProfileStore::default()),
            matches: Arc::new(InMemoryMatchRepository::default()),
            fx,
            geocoder: Arc::new(NoopGeocoder),
            notifier: Arc::new(InMemoryNotifier::default()),
            leader: Arc::new(InMemoryLeaderLock::new(Arc::clone(&clock))),
            checkpoints: Arc::new(InMemoryCheckpointStore::default()),
            clock,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("tenant profile {0} not found")]
    TenantNotFound(TenantProfileId),
    #[error("listing {0} not found")]
    ListingNotFound(ListingId),
    #[error("match {0} not found")]
    MatchNotFound(MatchId),
    #[error("user {0} already has a tenant profile")]
    DuplicateProfile(UserId),
    #[error("user {user} does not own tenant profile {tenant}")]
    NotProfileOwner { tenant: TenantProfileId, user: UserId },
    #[error("user {user} does not own listing {listing}")]
    NotOwner { listing: ListingId, user: UserId },
    #[error("user {user} is not a participant of match {match_id}")]
    NotParticipant { match_id: MatchId, user: UserId },
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error(transparent)]
    Ranking(#[from] RankingError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Facade composing the index, lifecycle, messaging and ranking components.
pub struct MatchingService {
    profiles: Arc<dyn ProfileStore>,
    matches: Arc<dyn MatchRepository>,
    geocoder: Arc<dyn Geocoder>,
    clock: Arc<dyn Clock>,
    index: Arc<MatchIndex>,
    lifecycle: Arc<LifecycleManager>,
    messaging: MessagingThread,
    ranking: RankingService,
    sweeper: Arc<ExpirySweeper>,
    events: EventPublisher,
}

impl MatchingService {
    /// Builds the service and the worker that must be spawned to consume its events.
    pub fn new(deps: MatchingDeps, config: &MatchingConfig) -> (Self, RescanWorker) {
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&deps.matches),
            Arc::clone(&deps.notifier),
            Arc::clone(&deps.clock),
            config.ttl(),
        ));
        let index = Arc::new(MatchIndex::new(
            Arc::clone(&deps.profiles),
            Arc::clone(&deps.matches),
            Arc::clone(&deps.fx),
            Arc::clone(&deps.notifier),
            Arc::clone(&lifecycle),
            config,
        ));
        let sweeper = Arc::new(ExpirySweeper::new(
            Arc::clone(&deps.profiles),
            Arc::clone(&deps.matches),
            Arc::clone(&lifecycle),
            Arc::clone(&deps.leader),
            Arc::clone(&deps.checkpoints),
            config.sweep_batch_size,
            config.sweep_lease(),
        ));
        let messaging = MessagingThread::new(
            Arc::clone(&deps.matches),
            Arc::clone(&deps.notifier),
            Arc::clone(&lifecycle),
        );
        let ranking = RankingService::new(Arc::clone(&deps.matches), config.max_page_size);
        let (events, receiver) = EventPublisher::channel(config.event_buffer, Arc::clone(&index));
        let worker = RescanWorker::new(Arc::clone(&index), receiver);

        let service = Self {
            profiles: deps.profiles,
            matches: deps.matches,
            geocoder: deps.geocoder,
            clock: deps.clock,
            index,
            lifecycle,
            messaging,
            ranking,
            sweeper,
            events,
        };
        (service, worker)
    }

    pub fn index(&self) -> Arc<MatchIndex> {
        Arc::clone(&self.index)
    }

    pub fn sweeper(&self) -> Arc<ExpirySweeper> {
        Arc::clone(&self.sweeper)
    }

    pub fn create_tenant(
        &self,
        user: UserId,
        submission: TenantSubmission,
    ) -> Result<TenantProfile, MatchingError> {
        let profile = TenantProfile::from_submission(user, submission, self.clock.now())?;
        let stored = self.profiles.insert_tenant(profile).map_err(|err| match err {
            RepositoryError::Conflict => MatchingError::DuplicateProfile(user),
            other => other.into(),
        })?;
        info!(tenant = %stored.id, %user, "tenant profile created");
        self.events.publish(MatchEvent::TenantChanged(stored.id));
        Ok(stored)
    }

    pub fn update_tenant(
        &self,
        user: UserId,
        id: TenantProfileId,
        submission: TenantSubmission,
    ) -> Result<TenantProfile, MatchingError> {
        let now = self.clock.now();
        let stored = self.write_tenant(user, id, |profile| {
            profile.apply(submission.clone(), now)?;
            Ok(true)
        })?;
        self.events.publish(if stored.is_active {
            MatchEvent::TenantChanged(id)
        } else {
            MatchEvent::TenantDeactivated(id)
        });
        Ok(stored)
    }

    pub fn deactivate_tenant(
        &self,
        user: UserId,
        id: TenantProfileId,
    ) -> Result<TenantProfile, MatchingError> {
        let now = self.clock.now();
        let stored = self.write_tenant(user, id, |profile| {
            if !profile.is_active {
                return Ok(false);
            }
            profile.is_active = false;
            profile.updated_at = now;
            Ok(true)
        })?;
        info!(tenant = %id, "tenant profile deactivated");
        self.events.publish(MatchEvent::TenantDeactivated(id));
        Ok(stored)
    }

    /// Stores a new listing in `pending`; it joins matching once activated.
    pub async fn create_listing(
        &self,
        landlord: UserId,
        submission: ListingSubmission,
    ) -> Result<PropertyListing, MatchingError> {
        let mut listing = PropertyListing::from_submission(landlord, submission, self.clock.now())?;
        self.enrich_coordinates(&mut listing).await;
        let stored = self.profiles.insert_listing(listing)?;
        info!(listing = %stored.id, %landlord, "listing created");
        self.events.publish(MatchEvent::ListingChanged(stored.id));
        Ok(stored)
    }

    pub async fn update_listing(
        &self,
        landlord: UserId,
        id: ListingId,
        submission: ListingSubmission,
    ) -> Result<PropertyListing, MatchingError> {
        let mut listing = self.owned_listing(landlord, id)?;
        listing.apply(submission, self.clock.now())?;
        self.enrich_coordinates(&mut listing).await;
        let stored = self.profiles.update_listing(listing)?;
        self.events.publish(MatchEvent::ListingChanged(id));
        Ok(stored)
    }

    pub fn set_listing_status(
        &self,
        landlord: UserId,
        id: ListingId,
        status: ListingStatus,
    ) -> Result<PropertyListing, MatchingError> {
        let mut listing = self.owned_listing(landlord, id)?;
        if !listing.set_status(status, self.clock.now())? {
            return Ok(listing);
        }
        let stored = self.profiles.update_listing(listing)?;
        info!(listing = %id, status = status.label(), "listing status changed");
        self.events.publish(if status == ListingStatus::Active {
            MatchEvent::ListingChanged(id)
        } else {
            MatchEvent::ListingDeactivated(id)
        });
        Ok(stored)
    }

    /// Queues an asynchronous rescan for the tenant.
    pub fn compute_matches_for_tenant(&self, id: TenantProfileId) -> Result<(), MatchingError> {
        self.tenant(id)?;
        self.events.publish(MatchEvent::TenantChanged(id));
        Ok(())
    }

    pub fn compute_matches_for_listing(&self, id: ListingId) -> Result<(), MatchingError> {
        self.listing(id)?;
        self.events.publish(MatchEvent::ListingChanged(id));
        Ok(())
    }

    /// Runs the tenant rescan inline instead of through the event queue.
    pub async fn rescan_tenant_now(&self, id: TenantProfileId) -> Result<RescanReport, MatchingError> {
        Ok(self.index.rescan_tenant(id).await?)
    }

    pub async fn rescan_listing_now(&self, id: ListingId) -> Result<RescanReport, MatchingError> {
        Ok(self.index.rescan_listing(id).await?)
    }

    /// Scores one stored pair without touching the index.
    pub async fn preview(
        &self,
        tenant: TenantProfileId,
        listing: ListingId,
    ) -> Result<ScoreOutcome, MatchingError> {
        let tenant = self.tenant(tenant)?;
        let listing = self.listing(listing)?;
        Ok(self.index.preview(&tenant, &listing).await?)
    }

    pub fn matches_for_tenant(
        &self,
        id: TenantProfileId,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Result<MatchPage, MatchingError> {
        self.tenant(id)?;
        Ok(self.ranking.matches_for_tenant(id, cursor, page_size)?)
    }

    pub fn matches_for_listing(
        &self,
        id: ListingId,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Result<MatchPage, MatchingError> {
        self.listing(id)?;
        Ok(self.ranking.matches_for_listing(id, cursor, page_size)?)
    }

    pub fn open_match(&self, id: MatchId, user: UserId) -> Result<HousingMatch, MatchingError> {
        let party = self.party(id, user)?;
        Ok(self.lifecycle.open(id, party)?)
    }

    pub fn set_interest(
        &self,
        id: MatchId,
        user: UserId,
        interested: bool,
    ) -> Result<HousingMatch, MatchingError> {
        let party = self.party(id, user)?;
        Ok(self.lifecycle.set_interest(id, party, interested)?)
    }

    pub fn post_message(
        &self,
        id: MatchId,
        sender: UserId,
        body: &str,
    ) -> Result<HousingMessage, MatchingError> {
        Ok(self.messaging.post_message(id, sender, body)?)
    }

    pub fn post(
        &self,
        id: MatchId,
        sender: UserId,
        draft: MessageDraft,
    ) -> Result<HousingMessage, MatchingError> {
        Ok(self.messaging.post(id, sender, draft)?)
    }

    pub fn mark_read(&self, id: MatchId, reader: UserId) -> Result<usize, MatchingError> {
        Ok(self.messaging.mark_read(id, reader)?)
    }

    pub fn thread(&self, id: MatchId, reader: UserId) -> Result<Vec<HousingMessage>, MatchingError> {
        Ok(self.messaging.thread(id, reader)?)
    }

    pub fn tenant(&self, id: TenantProfileId) -> Result<TenantProfile, MatchingError> {
        self.profiles
            .fetch_tenant(id)?
            .ok_or(MatchingError::TenantNotFound(id))
    }

    pub fn listing(&self, id: ListingId) -> Result<PropertyListing, MatchingError> {
        self.profiles
            .fetch_listing(id)?
            .ok_or(MatchingError::ListingNotFound(id))
    }

    fn owned_listing(&self, landlord: UserId, id: ListingId) -> Result<PropertyListing, MatchingError> {
        let listing = self.listing(id)?;
        if listing.landlord_id != landlord {
            return Err(MatchingError::NotOwner {
                listing: id,
                user: landlord,
            });
        }
        Ok(listing)
    }

    fn owned_tenant(&self, user: UserId, id: TenantProfileId) -> Result<TenantProfile, MatchingError> {
        let profile = self.tenant(id)?;
        if profile.user_id != user {
            return Err(MatchingError::NotProfileOwner { tenant: id, user });
        }
        Ok(profile)
    }

    /// Read-modify-write on the owner's profile, re-reading once if another
    /// writer bumped the version in between.
    fn write_tenant<F>(
        &self,
        user: UserId,
        id: TenantProfileId,
        mutate: F,
    ) -> Result<TenantProfile, MatchingError>
    where
        F: Fn(&mut TenantProfile) -> Result<bool, MatchingError>,
    {
        let mut retried = false;
        loop {
            let mut profile = self.owned_tenant(user, id)?;
            if !mutate(&mut profile)? {
                return Ok(profile);
            }
            match self.profiles.update_tenant(profile) {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::VersionConflict { expected, found }) if !retried => {
                    debug!(tenant = %id, expected, found, "tenant write lost a race, re-reading");
                    retried = true;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    fn party(&self, id: MatchId, user: UserId) -> Result<Party, MatchingError> {
        let record = self
            .matches
            .fetch_match(id)?
            .ok_or(MatchingError::MatchNotFound(id))?;
        record
            .participants
            .party_of(user)
            .ok_or(MatchingError::NotParticipant { match_id: id, user })
    }

    async fn enrich_coordinates(&self, listing: &mut PropertyListing) {
        if listing.location.coordinates.is_some() {
            return;
        }
        let Some(address) = listing.location.address.clone() else {
            return;
        };
        match self.geocoder.locate(&address).await {
            Ok(point) => listing.location.coordinates = point,
            Err(error) => warn!(listing = %listing.id, %error, "geocoding failed, distance unavailable"),
        }
    }
}
