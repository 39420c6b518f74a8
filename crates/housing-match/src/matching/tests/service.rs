use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use super::common::*;
use crate::matching::collaborators::NotificationKind;
use crate::config::MatchingConfig;
use crate::matching::domain::{ExpiryReason, GeoPoint, ListingStatus, MatchStatus, PropertyListing, UserId};
use crate::matching::index::StaleEntity;
use crate::matching::memory::StaticGeocoder;
use crate::matching::repository::{MatchRepository, ProfileStore, RepositoryError};
use crate::matching::service::{MatchingError, MatchingService};

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
    check()
}

async fn published(service: &MatchingService, landlord: UserId) -> PropertyListing {
    let listing = service
        .create_listing(landlord, listing_submission())
        .await
        .expect("listing created");
    assert_eq!(listing.status, ListingStatus::Pending);
    service
        .set_listing_status(landlord, listing.id, ListingStatus::Active)
        .expect("activated")
}

fn live_count(service: &MatchingService, listing: &PropertyListing) -> usize {
    service
        .matches_for_listing(listing.id, None, None)
        .map(|page| page.items.len())
        .unwrap_or_default()
}

#[tokio::test]
async fn worker_turns_profile_writes_into_matches() {
    let fixture = ServiceFixture::new();
    let notifier = fixture.notifier.clone();
    let matches = fixture.deps.matches.clone();
    let (service, worker) = fixture.build();
    let worker = worker.spawn();

    let tenant = service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    let landlord = UserId::new();
    let listing = published(&service, landlord).await;

    assert!(eventually(|| live_count(&service, &listing) == 1).await);
    let page = service
        .matches_for_tenant(tenant.id, None, None)
        .expect("ranked");
    assert_eq!(page.items[0].listing_id, listing.id);
    assert!(notifier
        .notifications()
        .iter()
        .any(|note| matches!(note.kind, NotificationKind::MatchCreated { .. })));

    service
        .set_listing_status(landlord, listing.id, ListingStatus::Rented)
        .expect("rented");
    assert!(eventually(|| live_count(&service, &listing) == 0).await);

    let rows = matches
        .matches_for_tenant(tenant.id)
        .expect("store reachable");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, MatchStatus::Expired);
    assert_eq!(rows[0].expiry_reason, Some(ExpiryReason::ListingUnavailable));

    worker.abort();
}

#[tokio::test]
async fn deactivated_tenant_loses_live_matches() {
    let (service, worker) = ServiceFixture::new().build();
    let worker = worker.spawn();
    let tenant = service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    let listing = published(&service, UserId::new()).await;
    assert!(eventually(|| live_count(&service, &listing) == 1).await);

    let inactive = service
        .deactivate_tenant(tenant.user_id, tenant.id).expect("deactivated");
    assert!(!inactive.is_active);
    assert!(eventually(|| live_count(&service, &listing) == 0).await);

    worker.abort();
}

#[tokio::test]
async fn dropped_events_are_healed_by_the_next_retry() {
    let config = MatchingConfig {
        event_buffer: 1,
        ..test_config()
    };
    let (service, _worker) = ServiceFixture::new().build_with(config);
    let listing = published(&service, UserId::new()).await;

    let mut narrow = tenant_submission();
    narrow.budget.max = 900;
    let user = UserId::new();
    let tenant = service.create_tenant(user, narrow).expect("tenant created");
    let widened = service
        .update_tenant(user, tenant.id, tenant_submission())
        .expect("budget widened");
    assert_eq!(widened.budget.max, 1200);

    let index = service.index();
    assert_eq!(live_count(&service, &listing), 0);
    assert!(index.stale().contains(&StaleEntity::Tenant(tenant.id)));

    let report = index.retry_deferred().await;
    assert_eq!(report.created, 1);
    assert_eq!(live_count(&service, &listing), 1);
    assert!(index.stale().is_empty());
}

#[tokio::test]
async fn inline_rescans_report_their_work() {
    let (service, _worker) = ServiceFixture::new().build();
    let tenant = service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    let listing = published(&service, UserId::new()).await;

    let report = service
        .rescan_tenant_now(tenant.id)
        .await
        .expect("rescan runs");
    assert_eq!(report.created, 1);

    let again = service
        .rescan_listing_now(listing.id)
        .await
        .expect("rescan runs");
    assert_eq!(again.unchanged, 1);
    assert_eq!(again.created, 0);
}

#[tokio::test]
async fn preview_scores_without_storing() {
    let (service, _worker) = ServiceFixture::new().build();
    let tenant = service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    let listing = published(&service, UserId::new()).await;

    let outcome = service
        .preview(tenant.id, listing.id)
        .await
        .expect("scored");

    assert!(!outcome.is_hard_fail());
    assert!(outcome.total > 0.0);
    assert_eq!(live_count(&service, &listing), 0);
}

#[tokio::test]
async fn one_profile_per_user() {
    let (service, _worker) = ServiceFixture::new().build();
    let user = UserId::new();
    service
        .create_tenant(user, tenant_submission())
        .expect("first profile");

    let error = service
        .create_tenant(user, tenant_submission())
        .expect_err("second profile");
    assert!(matches!(error, MatchingError::DuplicateProfile(found) if found == user));
}

#[tokio::test]
async fn invalid_submissions_are_rejected() {
    let (service, _worker) = ServiceFixture::new().build();
    let mut inverted = tenant_submission();
    inverted.budget.min = 2000;

    let error = service
        .create_tenant(UserId::new(), inverted)
        .expect_err("inverted budget");
    assert!(matches!(error, MatchingError::Validation(_)));

    let mut past = tenant_submission();
    past.move_in_date = date(2025, 2, 1);
    let error = service
        .create_tenant(UserId::new(), past)
        .expect_err("move-in in the past");
    assert!(matches!(error, MatchingError::Validation(_)));
}

#[tokio::test]
async fn only_the_landlord_manages_a_listing() {
    let (service, _worker) = ServiceFixture::new().build();
    let listing = published(&service, UserId::new()).await;
    let intruder = UserId::new();

    let error = service
        .set_listing_status(intruder, listing.id, ListingStatus::Inactive)
        .expect_err("not the owner");
    assert!(matches!(error, MatchingError::NotOwner { user, .. } if user == intruder));

    let error = service
        .update_listing(intruder, listing.id, listing_submission())
        .await
        .expect_err("not the owner");
    assert!(matches!(error, MatchingError::NotOwner { .. }));
}

#[tokio::test]
async fn only_the_owner_edits_a_tenant_profile() {
    let (service, _worker) = ServiceFixture::new().build();
    let tenant = service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    let intruder = UserId::new();

    let error = service
        .update_tenant(intruder, tenant.id, tenant_submission())
        .expect_err("not the owner");
    assert!(matches!(error, MatchingError::NotProfileOwner { user, .. } if user == intruder));

    let error = service
        .deactivate_tenant(intruder, tenant.id)
        .expect_err("not the owner");
    assert!(matches!(error, MatchingError::NotProfileOwner { .. }));
    assert!(service.tenant(tenant.id).expect("stored").is_active);
}

#[tokio::test]
async fn tenant_edits_bump_the_profile_version() {
    let (service, _worker) = ServiceFixture::new().build();
    let tenant = service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    assert_eq!(tenant.version, 0);

    let mut wider = tenant_submission();
    wider.budget.max = 1500;
    let edited = service
        .update_tenant(tenant.user_id, tenant.id, wider)
        .expect("edited");
    assert_eq!(edited.version, 1);
    assert_eq!(edited.budget.max, 1500);

    let inactive = service
        .deactivate_tenant(tenant.user_id, tenant.id)
        .expect("deactivated");
    assert_eq!(inactive.version, 2);
    let again = service
        .deactivate_tenant(tenant.user_id, tenant.id)
        .expect("already inactive");
    assert_eq!(again.version, 2);
}

#[tokio::test]
async fn stale_tenant_copy_cannot_revive_a_deactivated_profile() {
    let fixture = ServiceFixture::new();
    let profiles = Arc::clone(&fixture.deps.profiles);
    let (service, _worker) = fixture.build();
    let tenant = service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    let stale = service.tenant(tenant.id).expect("stored");

    service
        .deactivate_tenant(tenant.user_id, tenant.id)
        .expect("deactivated");

    let mut edit = stale;
    edit.budget.max = 1500;
    let error = profiles.update_tenant(edit).expect_err("stale version");
    assert!(matches!(
        error,
        RepositoryError::VersionConflict { expected: 0, found: 1 }
    ));
    assert!(!service.tenant(tenant.id).expect("stored").is_active);

    // A fresh edit goes through and keeps the deactivation.
    let edited = service
        .update_tenant(tenant.user_id, tenant.id, tenant_submission())
        .expect("edited");
    assert!(!edited.is_active);
}

#[tokio::test]
async fn tenant_can_edit_after_move_in_has_passed() {
    let fixture = ServiceFixture::new();
    let clock = Arc::clone(&fixture.clock);
    let (service, _worker) = fixture.build();
    let tenant = service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    assert_eq!(tenant.move_in_date, date(2025, 4, 1));

    clock.advance(Duration::days(35));
    let mut submission = tenant_submission();
    submission.budget.max = 1400;
    let edited = service
        .update_tenant(tenant.user_id, tenant.id, submission)
        .expect("move-in is judged against creation");
    assert_eq!(edited.budget.max, 1400);
    assert_eq!(edited.created_at, tenant.created_at);

    let mut earlier = tenant_submission();
    earlier.move_in_date = date(2025, 2, 1);
    let error = service
        .update_tenant(tenant.user_id, tenant.id, earlier)
        .expect_err("before the profile existed");
    assert!(matches!(error, MatchingError::Validation(_)));
}

#[tokio::test]
async fn listing_status_moves_forward_only() {
    let (service, _worker) = ServiceFixture::new().build();
    let landlord = UserId::new();
    let listing = published(&service, landlord).await;
    service
        .set_listing_status(landlord, listing.id, ListingStatus::Rented)
        .expect("rented");

    let error = service
        .set_listing_status(landlord, listing.id, ListingStatus::Active)
        .expect_err("rented is final");
    assert!(matches!(error, MatchingError::Validation(_)));
}

#[tokio::test]
async fn listing_addresses_are_geocoded() {
    let point = GeoPoint {
        latitude: 53.4839,
        longitude: -2.2336,
    };
    let mut fixture = ServiceFixture::new();
    fixture.deps.geocoder = Arc::new(StaticGeocoder::default().with_point("1 Mill Street", point));
    let (service, _worker) = fixture.build();

    let mut submission = listing_submission();
    submission.location.address = Some("1 mill street ".to_string());
    let listing = service
        .create_listing(UserId::new(), submission)
        .await
        .expect("listing created");
    assert_eq!(listing.location.coordinates, Some(point));

    let mut unknown = listing_submission();
    unknown.location.address = Some("Nowhere Lane".to_string());
    let listing = service
        .create_listing(UserId::new(), unknown)
        .await
        .expect("listing created");
    assert_eq!(listing.location.coordinates, None);
}

#[tokio::test]
async fn participants_act_through_their_party() {
    let (service, _worker) = ServiceFixture::new().build();
    let tenant = service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    let landlord = UserId::new();
    let listing = published(&service, landlord).await;
    service
        .rescan_listing_now(listing.id)
        .await
        .expect("rescan runs");
    let record = service
        .matches_for_tenant(tenant.id, None, None)
        .expect("ranked")
        .items
        .remove(0);

    let stranger = UserId::new();
    let error = service
        .open_match(record.id, stranger)
        .expect_err("outsider");
    assert!(matches!(error, MatchingError::NotParticipant { .. }));

    let opened = service
        .open_match(record.id, landlord)
        .expect("landlord opens");
    assert_eq!(opened.status, MatchStatus::Viewed);

    service
        .post_message(record.id, tenant.user_id, "Hello!")
        .expect("posted");
    assert_eq!(service.mark_read(record.id, landlord).expect("marked"), 1);

    let declined = service
        .set_interest(record.id, tenant.user_id, false)
        .expect("declined");
    assert_eq!(declined.status, MatchStatus::Declined);
    assert!(service
        .matches_for_tenant(tenant.id, None, None)
        .expect("ranked")
        .items
        .is_empty());
}

#[tokio::test]
async fn sweeper_from_the_service_honours_the_ttl() {
    let fixture = ServiceFixture::new();
    let clock = fixture.clock.clone();
    let (service, _worker) = fixture.build();
    service
        .create_tenant(UserId::new(), tenant_submission())
        .expect("tenant created");
    let listing = published(&service, UserId::new()).await;
    service
        .rescan_listing_now(listing.id)
        .await
        .expect("rescan runs");

    clock.advance(Duration::days(31));
    let report = service.sweeper().run().expect("sweep runs");

    assert!(report.ran);
    assert_eq!(report.expired, 1);
    assert_eq!(live_count(&service, &listing), 0);
}
