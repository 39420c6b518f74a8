//! Tenant/listing compatibility matching.
//!
//! Profile and listing writes emit [`MatchEvent`]s; the [`RescanWorker`] feeds
//! them to the [`MatchIndex`], which scores candidate pairs with the
//! [`CompatibilityScorer`] and keeps one live [`HousingMatch`] per pair. The
//! [`LifecycleManager`] owns status transitions, [`MessagingThread`] the
//! per-match conversation, and [`RankingService`] the paginated read side.

pub mod collaborators;
pub mod domain;
pub mod events;
pub mod index;
pub mod lifecycle;
pub mod memory;
pub mod messaging;
pub mod prefilter;
pub mod ranking;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod sweep;

#[cfg(test)]
mod tests;

pub use collaborators::{
    CheckpointStore, Clock, DispatchError, ExternalError, FxRateProvider, Geocoder, LeaderLock,
    MatchNotification, NotificationDispatcher, NotificationKind, SystemClock,
};
pub use domain::{
    Attachment, BedroomRange, Budget, CurrencyCode, ExpiryReason, GeoPoint, HousingMatch,
    HousingMessage, Interest, LifestylePreferences, ListingId, ListingLocation, ListingStatus,
    ListingSubmission, ListingTier, MatchFactors, MatchId, MatchStatus, MessageId, MessageKind,
    Money, Party, PropertyListing, PropertyType, SocialStyle, StayRange, TenantAbout,
    TenantProfile, TenantProfileId, TenantSubmission, UserId, ValidationError,
};
pub use events::{EventPublisher, MatchEvent, RescanWorker};
pub use index::{IndexError, MatchIndex, RescanReport, StaleEntity, UpsertOutcome};
pub use lifecycle::{LifecycleError, LifecycleManager};
pub use memory::{
    InMemoryCheckpointStore, InMemoryLeaderLock, InMemoryMatchRepository, InMemoryNotifier,
    InMemoryProfileStore, ManualClock, NoopGeocoder, StaticFxRates, StaticGeocoder,
};
pub use messaging::{MessageDraft, MessagingError, MessagingThread};
pub use ranking::{MatchPage, RankingError, RankingService};
pub use repository::{MatchRepository, ProfileStore, RepositoryError};
pub use router::matching_router;
pub use scoring::{CompatibilityScorer, FxQuote, HardFilter, ScoreOutcome, ScoringWeights};
pub use service::{MatchingDeps, MatchingError, MatchingService};
pub use sweep::{spawn_sweep_task, ExpirySweeper, SweepReport};
