use serde::Serialize;

use super::super::domain::{MatchFactors, ValidationError};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

/// Immutable weight table applied to the soft factors.
///
/// Only [`ScoringWeights::new`] and `Default` build one, so every instance has
/// passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringWeights {
    budget_fit: f64,
    location_specificity: f64,
    amenity_coverage: f64,
    lifestyle_agreement: f64,
    move_in_proximity: f64,
    stay_overlap: f64,
}

impl ScoringWeights {
    pub fn new(
        budget_fit: f64,
        location_specificity: f64,
        amenity_coverage: f64,
        lifestyle_agreement: f64,
        move_in_proximity: f64,
        stay_overlap: f64,
    ) -> Result<Self, ValidationError> {
        let weights = Self {
            budget_fit,
            location_specificity,
            amenity_coverage,
            lifestyle_agreement,
            move_in_proximity,
            stay_overlap,
        };

        let values = weights.values();
        if let Some(bad) = values.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ValidationError::Weights(format!(
                "weights must be finite and non-negative, found {bad}"
            )));
        }
        let sum: f64 = values.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ValidationError::Weights(format!(
                "weights must sum to 1.0, found {sum:.4}"
            )));
        }

        Ok(weights)
    }

    fn values(&self) -> [f64; 6] {
        [
            self.budget_fit,
            self.location_specificity,
            self.amenity_coverage,
            self.lifestyle_agreement,
            self.move_in_proximity,
            self.stay_overlap,
        ]
    }

    /// Weighted sum scaled to 0..=100.
    pub fn total(&self, factors: &MatchFactors) -> f64 {
        let sum = self.budget_fit * factors.budget_fit
            + self.location_specificity * factors.location_specificity
            + self.amenity_coverage * factors.amenity_coverage
            + self.lifestyle_agreement * factors.lifestyle_agreement
            + self.move_in_proximity * factors.move_in_proximity
            + self.stay_overlap * factors.stay_overlap;
        (sum * 100.0).clamp(0.0, 100.0)
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            budget_fit: 0.20,
            location_specificity: 0.15,
            amenity_coverage: 0.20,
            lifestyle_agreement: 0.15,
            move_in_proximity: 0.15,
            stay_overlap: 0.15,
        }
    }
}
