//! Diversity capping and pagination
//!
//! After scoring, candidates are ranked best-first and walked once. A content
//! kind stops admitting items when it reaches `ceil(total × cap)`; anything over
//! the cap is dropped from this response rather than pushed to a later page.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::content::{ceil_fraction, ContentKind, FeedItem};

/// Largest number of items one kind may keep out of `total` candidates
pub fn type_cap(total: usize, cap: f64) -> usize {
    ceil_fraction(total, cap)
}

/// Sort best-first. Ties go to newer items, then to the smaller id (and kind,
/// as ids come from separate tables), so equal inputs always produce the same order.
pub fn rank(items: &mut [FeedItem]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
            .then_with(|| a.kind.cmp(&b.kind))
    });
}

/// Keep ranked items while their kind is under its cap
pub fn apply_diversity_cap(ranked: Vec<FeedItem>, cap: f64) -> Vec<FeedItem> {
    let max_per_kind = type_cap(ranked.len(), cap);
    let mut counts: HashMap<ContentKind, usize> = HashMap::new();

    ranked
        .into_iter()
        .filter(|item| {
            let count = counts.entry(item.kind).or_insert(0);
            if *count < max_per_kind {
                *count += 1;
                true
            } else {
                false
            }
        })
        .collect()
}

/// `offset`/`limit` window over the diversified list
pub fn paginate(items: &[FeedItem], offset: usize, limit: usize) -> Vec<FeedItem> {
    items.iter().skip(offset).take(limit).cloned().collect()
}

/// Per-session record of what a user was shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiversityTracking {
    pub user_id: Uuid,
    pub session_id: String,
    pub civic_content_count: i32,
    pub job_content_count: i32,
    pub artist_content_count: i32,
    pub regions_represented: Vec<String>,
}

impl DiversityTracking {
    /// Summarise the page that was returned to the user
    pub fn from_page(user_id: Uuid, session_id: impl Into<String>, page: &[FeedItem]) -> Self {
        let count = |kind: ContentKind| page.iter().filter(|i| i.kind == kind).count() as i32;

        let regions: BTreeSet<String> = page
            .iter()
            .filter_map(|i| i.region.as_deref())
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            user_id,
            session_id: session_id.into(),
            civic_content_count: count(ContentKind::PulsePost),
            job_content_count: count(ContentKind::Job),
            artist_content_count: count(ContentKind::ArtistContent),
            regions_represented: regions.into_iter().collect(),
        }
    }
}
