//! Keyset-paginated match retrieval.
//!
//! Cursors encode the full sort key of the last returned row, so rows inserted
//! between requests never shift pages that were already served.

use std::cmp::Ordering;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{HousingMatch, ListingId, MatchId, TenantProfileId, ValidationError};
use super::repository::{MatchRepository, RepositoryError};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Sort key: status rank, score, amenity coverage and listing age descend;
/// normalised rent ascends; match age descends; id breaks the final tie.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankKey {
    status_rank: u8,
    score: f64,
    amenity_coverage: f64,
    listing_created_at: DateTime<Utc>,
    normalized_rent: f64,
    created_at: DateTime<Utc>,
    id: MatchId,
}

impl RankKey {
    pub fn of(record: &HousingMatch) -> Self {
        Self {
            status_rank: record.status.display_rank(),
            score: record.compatibility_score,
            amenity_coverage: record.factors.amenity_coverage,
            listing_created_at: record.snapshot.listing_created_at,
            normalized_rent: record.snapshot.normalized_rent,
            created_at: record.created_at,
            id: record.id,
        }
    }

    /// `Less` means `self` is listed first.
    pub fn order(&self, other: &Self) -> Ordering {
        other
            .status_rank
            .cmp(&self.status_rank)
            .then_with(|| other.score.total_cmp(&self.score))
            .then_with(|| other.amenity_coverage.total_cmp(&self.amenity_coverage))
            .then_with(|| other.listing_created_at.cmp(&self.listing_created_at))
            .then_with(|| self.normalized_rent.total_cmp(&other.normalized_rent))
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }

    fn encode(&self) -> String {
        // Numbers, timestamps and a uuid always serialise.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    fn decode(cursor: &str) -> Result<Self, ValidationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor.trim())
            .map_err(|_| ValidationError::Cursor)?;
        serde_json::from_slice(&bytes).map_err(|_| ValidationError::Cursor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchPage {
    pub items: Vec<HousingMatch>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct RankingService {
    matches: Arc<dyn MatchRepository>,
    max_page_size: usize,
}

impl RankingService {
    pub fn new(matches: Arc<dyn MatchRepository>, max_page_size: usize) -> Self {
        Self {
            matches,
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn matches_for_tenant(
        &self,
        tenant: TenantProfileId,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Result<MatchPage, RankingError> {
        let rows = self.matches.matches_for_tenant(tenant)?;
        self.page(rows, cursor, page_size)
    }

    pub fn matches_for_listing(
        &self,
        listing: ListingId,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Result<MatchPage, RankingError> {
        let rows = self.matches.matches_for_listing(listing)?;
        self.page(rows, cursor, page_size)
    }

    fn page(
        &self,
        rows: Vec<HousingMatch>,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Result<MatchPage, RankingError> {
        let after = cursor
            .filter(|raw| !raw.trim().is_empty())
            .map(RankKey::decode)
            .transpose()?;
        let limit = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, self.max_page_size);

        let mut ranked: Vec<(RankKey, HousingMatch)> = rows
            .into_iter()
            .filter(HousingMatch::is_live)
            .map(|record| (RankKey::of(&record), record))
            .filter(|(key, _)| {
                after
                    .as_ref()
                    .map(|cursor| key.order(cursor) == Ordering::Greater)
                    .unwrap_or(true)
            })
            .collect();
        ranked.sort_by(|(a, _), (b, _)| a.order(b));

        let has_more = ranked.len() > limit;
        ranked.truncate(limit);
        let next_cursor = if has_more {
            ranked.last().map(|(key, _)| key.encode())
        } else {
            None
        };

        Ok(MatchPage {
            items: ranked.into_iter().map(|(_, record)| record).collect(),
            next_cursor,
        })
    }
}
