use crate::infra::{midday, parse_date};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use housing_match::config::{FxConfig, MatchingConfig};
use housing_match::error::AppError;
use housing_match::matching::{
    BedroomRange, Budget, CompatibilityScorer, CurrencyCode, FxQuote, HousingMatch,
    LifestylePreferences, ListingLocation, ListingStatus, ListingSubmission, ListingTier,
    ManualClock, MatchingDeps, MatchingService, Money, PropertyListing, PropertyType,
    SocialStyle, StaticFxRates, StayRange, TenantAbout, TenantProfile,
    TenantSubmission, UserId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the walkthrough starts on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// GBP to USD rate used to normalise sterling rents.
    #[arg(long, default_value_t = 1.25)]
    pub(crate) gbp_usd: f64,
    /// Skip the messaging portion of the walkthrough.
    #[arg(long)]
    pub(crate) skip_messaging: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Path to a tenant submission JSON document
    #[arg(long)]
    pub(crate) tenant: PathBuf,
    /// Path to a listing submission JSON document
    #[arg(long)]
    pub(crate) listing: PathBuf,
    /// Exchange rates as FROM:TO=RATE pairs, comma separated
    #[arg(long)]
    pub(crate) rates: Option<String>,
    /// Evaluation date (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let now = midday(args.today.unwrap_or_else(|| Local::now().date_naive()));
    let tenant_submission: TenantSubmission = read_document(&args.tenant)?;
    let listing_submission: ListingSubmission = read_document(&args.listing)?;

    let tenant = TenantProfile::from_submission(UserId::new(), tenant_submission, now)
        .map_err(|err| AppError::Input(format!("tenant: {err}")))?;
    let mut listing = PropertyListing::from_submission(UserId::new(), listing_submission, now)
        .map_err(|err| AppError::Input(format!("listing: {err}")))?;
    listing
        .set_status(ListingStatus::Active, now)
        .map_err(|err| AppError::Input(format!("listing: {err}")))?;

    let rates = match args.rates.as_deref() {
        Some(raw) => FxConfig::parse(raw)?,
        None => FxConfig::from_env()?,
    };
    let quote = quote_for(
        &StaticFxRates::new(rates.rates),
        &listing.rent.currency,
        &tenant.budget.currency,
    );

    let config = MatchingConfig::from_env()?;
    let outcome = CompatibilityScorer::new(config.weights).score(&tenant, &listing, quote, now);
    let rendered = serde_json::to_string_pretty(&outcome)
        .map_err(|err| AppError::Input(format!("failed to render score: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|err| AppError::Input(format!("{}: {err}", path.display())))
}

fn quote_for(rates: &StaticFxRates, from: &CurrencyCode, to: &CurrencyCode) -> FxQuote {
    if from == to {
        return FxQuote::SameCurrency;
    }
    match rates.lookup(from, to) {
        Some(rate) => FxQuote::Rate(rate),
        None => FxQuote::Unavailable,
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let clock = Arc::new(ManualClock::new(midday(today)));
    let usd = currency("USD")?;
    let gbp = currency("GBP")?;
    let fx = StaticFxRates::new([(gbp.clone(), usd.clone(), args.gbp_usd)]);
    let deps = MatchingDeps::in_memory(Arc::new(fx), clock.clone());
    let config = MatchingConfig::default();
    let (service, _worker) = MatchingService::new(deps, &config);
    let move_in = today + Duration::days(30);

    println!("=== Housing Match Demo ===");
    println!("Start date: {today}");
    println!("Target move-in: {move_in}");
    println!("GBP -> USD: {:.2}", args.gbp_usd);

    let quiet_user = UserId::new();
    let quiet = service.create_tenant(
        quiet_user,
        seeker(&usd, move_in, 800, 1200, Some(SocialStyle::Quiet)),
    )?;
    let social = service.create_tenant(
        UserId::new(),
        seeker(&usd, move_in, 1200, 2200, Some(SocialStyle::Social)),
    )?;

    let landlord = UserId::new();
    let catalogue = [
        ("Two bed flat in Ancoats", Money { amount: 1000, currency: usd.clone() }, 2),
        ("Sterling studio in the Northern Quarter", Money { amount: 800, currency: gbp.clone() }, 1),
        ("Penthouse with a view", Money { amount: 2100, currency: usd.clone() }, 3),
    ];
    let mut listings = Vec::new();
    for (title, rent, bedrooms) in catalogue {
        let listing = service
            .create_listing(landlord, flat(title, rent, bedrooms, move_in))
            .await?;
        let listing = service.set_listing_status(landlord, listing.id, ListingStatus::Active)?;
        listings.push(listing);
    }

    println!();
    println!("Listings");
    for listing in &listings {
        println!(
            "- {} | {} {} | {} bed | {}",
            listing.title, listing.rent.amount, listing.rent.currency, listing.bedrooms, listing.status
        );
    }

    for listing in &listings {
        service.rescan_listing_now(listing.id).await?;
    }

    for (label, tenant) in [("Quiet seeker", &quiet), ("Social seeker", &social)] {
        let page = service.matches_for_tenant(tenant.id, None, None)?;
        println!();
        println!(
            "{label}: budget {}-{} {}",
            tenant.budget.min, tenant.budget.max, tenant.budget.currency
        );
        print_matches(&page.items, &listings);
        for listing in &listings {
            let outcome = service.preview(tenant.id, listing.id).await?;
            if let Some(reason) = outcome.hard_fail {
                println!("  x {} ({reason:?})", listing.title);
            }
        }
    }

    let Some(first) = service
        .matches_for_tenant(quiet.id, None, None)?
        .items
        .into_iter()
        .next()
    else {
        println!();
        println!("No matches to follow up on.");
        return Ok(());
    };

    if !args.skip_messaging {
        println!();
        println!("Conversation");
        service.open_match(first.id, landlord)?;
        service.post_message(first.id, landlord, "Hi! Would you like to arrange a viewing?")?;
        clock.advance(Duration::minutes(20));
        service.post_message(first.id, quiet_user, "Yes please, Saturday morning works.")?;
        for message in service.thread(first.id, quiet_user)? {
            let who = if message.sender_id == landlord {
                "landlord"
            } else {
                "tenant"
            };
            println!("  [{}] {who}: {}", message.created_at.format("%H:%M"), message.body);
        }
        let marked = service.mark_read(first.id, landlord)?;
        println!("  Landlord read {marked} message(s)");
        let refreshed = service.matches_for_tenant(quiet.id, None, None)?;
        print_matches(&refreshed.items, &listings);
    }

    println!();
    println!("Thirty-one days later");
    clock.advance(Duration::days(31));
    let report = service.sweeper().run().map_err(|err| AppError::Input(err.to_string()))?;
    println!(
        "  Sweep scanned {} match(es): {} expired, {} retained",
        report.scanned, report.expired, report.retained
    );
    for (label, tenant) in [("Quiet seeker", &quiet), ("Social seeker", &social)] {
        let remaining = service.matches_for_tenant(tenant.id, None, None)?.items.len();
        println!("  {label}: {remaining} live match(es)");
    }

    Ok(())
}

fn print_matches(items: &[HousingMatch], listings: &[PropertyListing]) {
    if items.is_empty() {
        println!("  (no matches)");
        return;
    }
    for record in items {
        let title = listings
            .iter()
            .find(|listing| listing.id == record.listing_id)
            .map(|listing| listing.title.as_str())
            .unwrap_or("unknown listing");
        println!(
            "  {:>6.2}  {:<40} {:<10} rent {:.0} | messages {}",
            record.compatibility_score,
            title,
            record.status.to_string(),
            record.snapshot.normalized_rent,
            record.messages_count
        );
    }
}

fn currency(code: &str) -> Result<CurrencyCode, AppError> {
    CurrencyCode::parse(code).map_err(|err| AppError::Input(err.to_string()))
}

fn seeker(
    currency: &CurrencyCode,
    move_in: NaiveDate,
    min: u32,
    max: u32,
    social_style: Option<SocialStyle>,
) -> TenantSubmission {
    TenantSubmission {
        target_cities: vec!["Manchester".to_string()],
        target_countries: vec!["GB".to_string()],
        preferred_neighborhoods: vec!["Ancoats".to_string()],
        preferred_location: None,
        budget: Budget {
            min,
            max,
            currency: currency.clone(),
        },
        property_types: vec![PropertyType::Apartment, PropertyType::Studio],
        bedrooms: BedroomRange { min: 1, max: 3 },
        move_in_date: move_in,
        flexibility_days: 14,
        stay: StayRange {
            min_months: 6,
            max_months: Some(18),
        },
        lifestyle: LifestylePreferences {
            furnished: Some(true),
            social_style,
            ..LifestylePreferences::default()
        },
        required_amenities: vec!["wifi".to_string()],
        preferred_amenities: vec!["washer".to_string(), "balcony".to_string()],
        about: TenantAbout::default(),
    }
}

fn flat(title: &str, rent: Money, bedrooms: u8, available_from: NaiveDate) -> ListingSubmission {
    ListingSubmission {
        title: title.to_string(),
        property_type: if bedrooms == 1 {
            PropertyType::Studio
        } else {
            PropertyType::Apartment
        },
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
        bedrooms,
        bathrooms: 1,
        area_sqm: None,
        furnished: true,
        pet_friendly: false,
        smoking_allowed: false,
        amenities: vec!["wifi".to_string(), "washer".to_string()],
        images: Vec::new(),
        available_from,
        available_to: None,
        min_stay_months: Some(6),
        max_stay_months: None,
        tier: ListingTier::Basic,
        expires_at: None,
    }
}
