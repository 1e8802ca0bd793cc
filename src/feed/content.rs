//! Content kinds and feed items
//!
//! The feed mixes three kinds of content pulled from separate tables. Each
//! fetched row becomes a [`ContentRecord`]; once scored it is turned into a
//! [`FeedItem`], which only lives for the duration of a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::preferences::UserPreferences;

/// Kinds of content that can appear in a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    PulsePost,
    Job,
    ArtistContent,
}

impl ContentKind {
    /// Every kind, in fetch order
    pub const ALL: [ContentKind; 3] = [
        ContentKind::PulsePost,
        ContentKind::Job,
        ContentKind::ArtistContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::PulsePost => "pulse_post",
            ContentKind::Job => "job",
            ContentKind::ArtistContent => "artist_content",
        }
    }

    /// Civic content is always requested; the other kinds only when the user
    /// gives them a positive weight.
    pub fn always_fetched(&self) -> bool {
        matches!(self, ContentKind::PulsePost)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pulse_post" | "pulse" => Ok(ContentKind::PulsePost),
            "job" => Ok(ContentKind::Job),
            "artist_content" | "artist" => Ok(ContentKind::ArtistContent),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

/// A content row as returned by the store, before scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub kind: ContentKind,
    /// Topic tag, matched against the user's blocked topics
    pub topic: Option<String>,
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
    /// The full originating row
    pub payload: serde_json::Value,
}

impl ContentRecord {
    /// Convert into a feed item carrying `score`
    pub fn into_item(self, score: f64) -> FeedItem {
        FeedItem {
            id: self.id,
            kind: self.kind,
            content: self.payload,
            score,
            region: self.region,
            created_at: self.created_at,
        }
    }
}

/// One scored entry of a personalized feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub content: serde_json::Value,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Number of items to request for a category: `ceil(limit × weight)`.
///
/// Non-positive or non-finite weights request nothing.
pub fn fetch_budget(limit: usize, weight: f64) -> usize {
    if !weight.is_finite() || weight <= 0.0 {
        return 0;
    }
    ceil_fraction(limit, weight.min(1.0))
}

/// `ceil(count × fraction)`, ignoring float noise such as `10 × 0.7 = 7.000000000000001`
pub(crate) fn ceil_fraction(count: usize, fraction: f64) -> usize {
    let exact = count as f64 * fraction;
    // Relative tolerance, so tiny positive products still round up to 1
    (exact * (1.0 - 1e-9)).ceil().max(0.0) as usize
}

/// Kinds to fetch for `prefs`, paired with their per-kind budgets
pub fn fetch_plan(prefs: &UserPreferences, limit: usize) -> Vec<(ContentKind, usize)> {
    ContentKind::ALL
        .iter()
        .filter_map(|&kind| {
            let weight = prefs.weight_for(kind);
            if kind.always_fetched() || weight > 0.0 {
                Some((kind, fetch_budget(limit, weight)))
            } else {
                None
            }
        })
        .collect()
}

/// Drop records whose topic the user has blocked
pub fn filter_blocked(records: Vec<ContentRecord>, prefs: &UserPreferences) -> Vec<ContentRecord> {
    if prefs.blocked_topics.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| r.topic.as_deref().map_or(true, |t| !prefs.is_blocked(t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(kind: ContentKind, topic: Option<&str>) -> ContentRecord {
        ContentRecord {
            id: Uuid::new_v4().to_string(),
            kind,
            topic: topic.map(str::to_string),
            region: None,
            created_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn test_fetch_budget_rounds_up() {
        assert_eq!(fetch_budget(20, 0.4), 8);
        assert_eq!(fetch_budget(20, 0.1), 2);
        assert_eq!(fetch_budget(5, 0.3), 2);
        assert_eq!(fetch_budget(20, 0.0), 0);
        assert_eq!(fetch_budget(20, -1.0), 0);
        assert_eq!(fetch_budget(20, f64::NAN), 0);
        assert_eq!(fetch_budget(10, 0.7), 7);
        assert_eq!(fetch_budget(20, 1e-12), 1);
        assert_eq!(fetch_budget(1, f64::MIN_POSITIVE), 1);
        assert_eq!(fetch_budget(0, 0.5), 0);
    }

    #[test]
    fn test_fetch_plan_skips_zero_weight_kinds() {
        let mut prefs = UserPreferences::defaults_for(Uuid::new_v4());
        prefs.job_weight = 0.0;
        prefs.artist_weight = 0.0;
        prefs.civic_weight = 0.0;

        let plan = fetch_plan(&prefs, 20);
        // Civic content is still requested, with an empty budget
        assert_eq!(plan, vec![(ContentKind::PulsePost, 0)]);
    }

    #[test]
    fn test_fetch_plan_defaults() {
        let prefs = UserPreferences::defaults_for(Uuid::new_v4());
        let plan = fetch_plan(&prefs, 20);
        assert_eq!(
            plan,
            vec![
                (ContentKind::PulsePost, 8),
                (ContentKind::Job, 4),
                (ContentKind::ArtistContent, 2),
            ]
        );
    }

    #[test]
    fn test_filter_blocked_is_case_insensitive() {
        let mut prefs = UserPreferences::defaults_for(Uuid::new_v4());
        prefs.blocked_topics = vec!["Elections".to_string()];

        let kept = filter_blocked(
            vec![
                record(ContentKind::PulsePost, Some("elections")),
                record(ContentKind::PulsePost, Some("transit")),
                record(ContentKind::Job, None),
            ],
            &prefs,
        );
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.topic.as_deref() != Some("elections")));
    }

    #[test]
    fn test_content_kind_round_trips_through_str() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
        assert_eq!("pulse".parse::<ContentKind>().unwrap(), ContentKind::PulsePost);
        assert!("video".parse::<ContentKind>().is_err());
    }

    #[test]
    fn test_feed_item_serializes_type_tag() {
        let item = record(ContentKind::ArtistContent, None).into_item(0.25);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "artist_content");
        assert_eq!(json["score"], 0.25);
        assert!(json.get("region").is_none());
    }
}
