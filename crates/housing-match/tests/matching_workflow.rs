use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use housing_match::config::MatchingConfig;
use housing_match::matching::{
    BedroomRange, Budget, CurrencyCode, LifestylePreferences, ListingLocation,
    ListingStatus, ListingSubmission, ListingTier, ManualClock, MatchStatus, MatchingDeps,
    MatchingService, Money, PropertyType, StaticFxRates, StayRange, TenantAbout, TenantSubmission,
    UserId,
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn currency(code: &str) -> CurrencyCode {
    CurrencyCode::parse(code).expect("valid currency")
}

fn service() -> (Arc<ManualClock>, MatchingService) {
    let start = Utc
        .with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("valid start");
    let clock = Arc::new(ManualClock::new(start));
    let fx = StaticFxRates::new([(currency("GBP"), currency("USD"), 1.25)]);
    let deps = MatchingDeps::in_memory(Arc::new(fx), clock.clone());
    let (service, _worker) = MatchingService::new(deps, &MatchingConfig::default());
    (clock, service)
}

fn manchester_tenant() -> TenantSubmission {
    TenantSubmission {
        target_cities: vec!["Manchester".to_string()],
        target_countries: Vec::new(),
        preferred_neighborhoods: Vec::new(),
        preferred_location: None,
        budget: Budget {
            min: 800,
            max: 1200,
            currency: currency("USD"),
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

fn manchester_flat(rent: Money) -> ListingSubmission {
    ListingSubmission {
        title: "Two bed flat in Ancoats".to_string(),
        property_type: PropertyType::Apartment,
        location: ListingLocation {
            city: "Manchester".to_string(),
            country: "GB".to_string(),
            neighborhood: Some("Ancoats".to_string()),
            address: None,
            coordinates: None,
        },
        rent,
        deposit: 1000,
        utilities_included: false,
        bedrooms: 2,
        bathrooms: 1,
        area_sqm: None,
        furnished: true,
        pet_friendly: false,
        smoking_allowed: false,
        amenities: vec!["WiFi".to_string(), "parking".to_string()],
        images: Vec::new(),
        available_from: date(2025, 4, 1),
        available_to: None,
        min_stay_months: Some(6),
        max_stay_months: None,
        tier: ListingTier::Basic,
        expires_at: None,
    }
}

#[tokio::test]
async fn tenant_meets_listing_and_conversation_follows() {
    let (_, service) = service();
    let tenant_user = UserId::new();
    let landlord = UserId::new();

    let tenant = service
        .create_tenant(tenant_user, manchester_tenant())
        .expect("tenant created");
    let listing = service
        .create_listing(
            landlord,
            manchester_flat(Money {
                amount: 1000,
                currency: currency("USD"),
            }),
        )
        .await
        .expect("listing created");
    service
        .set_listing_status(landlord, listing.id, ListingStatus::Active)
        .expect("listing activated");

    let report = service
        .rescan_tenant_now(tenant.id)
        .await
        .expect("rescan runs");
    assert_eq!(report.created, 1, "one qualifying listing: {report:?}");

    let page = service
        .matches_for_tenant(tenant.id, None, None)
        .expect("tenant view");
    let record = page.items.first().expect("match listed").clone();
    assert!((70.0..=95.0).contains(&record.compatibility_score));
    assert_eq!(record.factors.amenity_coverage, 1.0);

    let landlord_view = service
        .matches_for_listing(listing.id, None, None)
        .expect("landlord view");
    assert_eq!(landlord_view.items[0].id, record.id);

    service
        .open_match(record.id, landlord)
        .expect("landlord opens");
    service
        .post_message(record.id, landlord, "Would you like a viewing?")
        .expect("message posted");
    let stored = service
        .matches_for_tenant(tenant.id, None, None)
        .expect("tenant view")
        .items
        .remove(0);
    assert_eq!(stored.status, MatchStatus::Contacted);
    assert_eq!(stored.messages_count, 1);
    assert_eq!(service.mark_read(record.id, tenant_user).expect("marked"), 1);
}

#[tokio::test]
async fn over_budget_listing_never_matches() {
    let (_, service) = service();
    let tenant = service
        .create_tenant(UserId::new(), manchester_tenant())
        .expect("tenant created");
    let landlord = UserId::new();
    let listing = service
        .create_listing(
            landlord,
            manchester_flat(Money {
                amount: 1500,
                currency: currency("USD"),
            }),
        )
        .await
        .expect("listing created");
    service
        .set_listing_status(landlord, listing.id, ListingStatus::Active)
        .expect("listing activated");

    service
        .rescan_listing_now(listing.id)
        .await
        .expect("rescan runs");
    let preview = service
        .preview(tenant.id, listing.id)
        .await
        .expect("preview");

    assert!(preview.is_hard_fail());
    assert_eq!(preview.total, 0.0);
    assert!(service
        .matches_for_tenant(tenant.id, None, None)
        .expect("tenant view")
        .items
        .is_empty());
}

#[tokio::test]
async fn sterling_rent_is_converted_into_the_tenant_budget() {
    let (_, service) = service();
    let tenant = service
        .create_tenant(UserId::new(), manchester_tenant())
        .expect("tenant created");
    let landlord = UserId::new();
    let listing = service
        .create_listing(
            landlord,
            manchester_flat(Money {
                amount: 800,
                currency: currency("GBP"),
            }),
        )
        .await
        .expect("listing created");
    service
        .set_listing_status(landlord, listing.id, ListingStatus::Active)
        .expect("listing activated");

    service
        .rescan_listing_now(listing.id)
        .await
        .expect("rescan runs");

    let page = service
        .matches_for_tenant(tenant.id, None, None)
        .expect("tenant view");
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].snapshot.normalized_rent, 1000.0);
}

#[tokio::test]
async fn rented_listing_retires_matches_on_the_next_sweep() {
    let (clock, service) = service();
    let tenant = service
        .create_tenant(UserId::new(), manchester_tenant())
        .expect("tenant created");
    let landlord = UserId::new();
    let listing = service
        .create_listing(
            landlord,
            manchester_flat(Money {
                amount: 1000,
                currency: currency("USD"),
            }),
        )
        .await
        .expect("listing created");
    service
        .set_listing_status(landlord, listing.id, ListingStatus::Active)
        .expect("listing activated");
    service
        .rescan_tenant_now(tenant.id)
        .await
        .expect("rescan runs");

    service
        .set_listing_status(landlord, listing.id, ListingStatus::Rented)
        .expect("listing rented");
    clock.advance(Duration::minutes(1));
    let report = service.sweeper().run().expect("sweep runs");

    assert!(report.ran);
    assert_eq!(report.expired, 1);
    assert!(service
        .matches_for_listing(listing.id, None, None)
        .expect("landlord view")
        .items
        .is_empty());

    let again = service.sweeper().run().expect("sweep runs");
    assert_eq!(again.scanned, 0);
}
