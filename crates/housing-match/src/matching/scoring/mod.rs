//! Pure compatibility scoring for one tenant/listing pair.
//!
//! Hard filters gate eligibility first; surviving pairs get a weighted sum of
//! normalised soft factors. Currency conversion is resolved by the caller and
//! passed in as an [`FxQuote`] so the scorer never performs I/O.

mod factors;
mod filters;
mod weights;

pub use filters::HardFilter;
pub use weights::ScoringWeights;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{MatchFactors, PropertyListing, TenantProfile};

/// Exchange rate from the listing currency into the tenant's budget currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FxQuote {
    SameCurrency,
    Rate(f64),
    /// The provider answered but has no rate for this currency pair.
    Unavailable,
}

impl FxQuote {
    fn convert(self, amount: u32) -> Option<f64> {
        match self {
            FxQuote::SameCurrency => Some(amount as f64),
            FxQuote::Rate(rate) if rate.is_finite() && rate > 0.0 => Some(amount as f64 * rate),
            FxQuote::Rate(_) | FxQuote::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    /// 0..=100, rounded to two decimals; zero on hard failure.
    pub total: f64,
    pub factors: MatchFactors,
    pub hard_fail: Option<HardFilter>,
    /// Rent in the tenant's currency, zero when it could not be converted.
    pub normalized_rent: f64,
}

impl ScoreOutcome {
    pub fn is_hard_fail(&self) -> bool {
        self.hard_fail.is_some()
    }

    fn failed(filter: HardFilter, normalized_rent: Option<f64>) -> Self {
        Self {
            total: 0.0,
            factors: MatchFactors::zero(),
            hard_fail: Some(filter),
            normalized_rent: normalized_rent.unwrap_or(0.0),
        }
    }
}

/// Stateless scorer carrying its injected weight table.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityScorer {
    weights: ScoringWeights,
}

impl CompatibilityScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score(
        &self,
        tenant: &TenantProfile,
        listing: &PropertyListing,
        quote: FxQuote,
        now: DateTime<Utc>,
    ) -> ScoreOutcome {
        let normalized_rent = quote.convert(listing.rent.amount);

        if let Some(filter) = filters::first_failure(tenant, listing, normalized_rent, now) {
            return ScoreOutcome::failed(filter, normalized_rent);
        }
        let rent = normalized_rent.unwrap_or(0.0);

        let factors = match factors::soft_factors(tenant, listing, rent) {
            Ok(factors) => factors,
            Err(error) => {
                // Factors are clamped, so this needs NaN input to trip.
                warn!(tenant = %tenant.id, listing = %listing.id, %error, "factor out of range");
                let n = factors::NEUTRAL;
                MatchFactors {
                    budget_fit: n,
                    location_specificity: n,
                    amenity_coverage: n,
                    lifestyle_agreement: n,
                    move_in_proximity: n,
                    stay_overlap: n,
                    distance_km: None,
                }
            }
        };

        let total = (self.weights.total(&factors) * 100.0).round() / 100.0;
        ScoreOutcome {
            total,
            factors,
            hard_fail: None,
            normalized_rent: rent,
        }
    }
}
