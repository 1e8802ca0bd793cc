//! Relevance scoring
//!
//! Every candidate gets a weighted linear blend of five signals, scaled by the
//! user's weight for the candidate's content kind:
//!
//! | Signal              | Weight | Value                                            |
//! |---------------------|--------|--------------------------------------------------|
//! | civic relevance     | 0.30   | fixed per content type                           |
//! | geo relevance       | 0.25   | 0.8 when the user has a region, else 0.4         |
//! | time sensitivity    | 0.20   | 0.3, × civic boost while a civic event is near   |
//! | authenticity        | 0.15   | 0.5                                              |
//! | engagement affinity | 0.10   | avg. interaction quality for the kind, else 0.5  |
//!
//! The result is clamped to `[0, 1]`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::content::{ContentKind, ContentRecord};
use super::preferences::UserPreferences;

const POLITICAL_UPDATE_RELEVANCE: f64 = 0.9;
const PULSE_RELEVANCE: f64 = 0.6;
const JOB_RELEVANCE: f64 = 0.4;
const ARTIST_RELEVANCE: f64 = 0.2;
const OTHER_RELEVANCE: f64 = 0.3;

const GEO_KNOWN_REGION: f64 = 0.8;
const GEO_UNKNOWN_REGION: f64 = 0.4;

const BASE_TIME_SENSITIVITY: f64 = 0.3;
/// No verification signal exists yet; every item gets the same value
const AUTHENTICITY: f64 = 0.5;
const NEUTRAL_AFFINITY: f64 = 0.5;

/// Topic that marks a pulse post as a political update
pub const POLITICAL_UPDATE_TOPIC: &str = "political_update";

/// Blend weights (sum to 1.0)
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub civic_relevance: f64,
    pub geo_relevance: f64,
    pub time_sensitivity: f64,
    pub authenticity: f64,
    pub engagement_affinity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            civic_relevance: 0.30,
            geo_relevance: 0.25,
            time_sensitivity: 0.20,
            authenticity: 0.15,
            engagement_affinity: 0.10,
        }
    }
}

/// Average engagement quality per content kind over the history window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementAffinity {
    averages: HashMap<ContentKind, f64>,
}

impl EngagementAffinity {
    pub fn new(averages: HashMap<ContentKind, f64>) -> Self {
        Self { averages }
    }

    /// Affinity for `kind`, neutral when the user has no history with it
    pub fn get(&self, kind: ContentKind) -> f64 {
        self.averages
            .get(&kind)
            .copied()
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(NEUTRAL_AFFINITY)
    }
}

/// Per-request inputs shared by every candidate
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub prefs: UserPreferences,
    pub affinity: EngagementAffinity,
    pub civic_events_active: bool,
    pub civic_boost: f64,
}

/// Individual signal values behind a score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub civic_relevance: f64,
    pub geo_relevance: f64,
    pub time_sensitivity: f64,
    pub authenticity: f64,
    pub engagement_affinity: f64,
    pub preference_weight: f64,
}

/// Civic relevance for a content type tag
pub fn relevance_for_tag(tag: &str) -> f64 {
    match tag {
        POLITICAL_UPDATE_TOPIC => POLITICAL_UPDATE_RELEVANCE,
        "pulse" | "pulse_post" => PULSE_RELEVANCE,
        "job" => JOB_RELEVANCE,
        "artist_content" => ARTIST_RELEVANCE,
        _ => OTHER_RELEVANCE,
    }
}

/// Civic relevance of a record; pulse posts tagged as political updates rank highest
pub fn civic_relevance(record: &ContentRecord) -> f64 {
    let political = record.kind == ContentKind::PulsePost
        && record
            .topic
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(POLITICAL_UPDATE_TOPIC));

    if political {
        relevance_for_tag(POLITICAL_UPDATE_TOPIC)
    } else {
        relevance_for_tag(record.kind.as_str())
    }
}

/// Only checks that the user has a region; items are not matched against it
pub fn geo_relevance(prefs: &UserPreferences) -> f64 {
    if prefs.region().is_some() {
        GEO_KNOWN_REGION
    } else {
        GEO_UNKNOWN_REGION
    }
}

pub fn time_sensitivity(civic_events_active: bool, civic_boost: f64) -> f64 {
    if civic_events_active {
        BASE_TIME_SENSITIVITY * civic_boost
    } else {
        BASE_TIME_SENSITIVITY
    }
}

/// Scores candidates against a user profile
#[derive(Debug, Clone, Default)]
pub struct FeedScorer {
    weights: ScoringWeights,
}

impl FeedScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn breakdown(&self, record: &ContentRecord, ctx: &ScoringContext) -> ScoreBreakdown {
        ScoreBreakdown {
            civic_relevance: civic_relevance(record),
            geo_relevance: geo_relevance(&ctx.prefs),
            time_sensitivity: time_sensitivity(ctx.civic_events_active, ctx.civic_boost),
            authenticity: AUTHENTICITY,
            engagement_affinity: ctx.affinity.get(record.kind),
            preference_weight: ctx.prefs.weight_for(record.kind),
        }
    }

    /// Final score in `[0, 1]`
    pub fn score(&self, record: &ContentRecord, ctx: &ScoringContext) -> f64 {
        self.combine(&self.breakdown(record, ctx))
    }

    pub fn combine(&self, b: &ScoreBreakdown) -> f64 {
        let w = &self.weights;
        let blended = w.civic_relevance * b.civic_relevance
            + w.geo_relevance * b.geo_relevance
            + w.time_sensitivity * b.time_sensitivity
            + w.authenticity * b.authenticity
            + w.engagement_affinity * b.engagement_affinity;

        sanitise(blended * b.preference_weight)
    }
}

/// Non-finite scores become 0; everything else is clamped to `[0, 1]`
fn sanitise(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    const EPS: f64 = 1e-9;

    fn record(kind: ContentKind, topic: Option<&str>) -> ContentRecord {
        ContentRecord {
            id: "1".to_string(),
            kind,
            topic: topic.map(str::to_string),
            region: None,
            created_at: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    fn context(prefs: UserPreferences) -> ScoringContext {
        ScoringContext {
            prefs,
            affinity: EngagementAffinity::default(),
            civic_events_active: false,
            civic_boost: 1.2,
        }
    }

    #[test]
    fn test_civic_relevance_by_type() {
        assert_eq!(civic_relevance(&record(ContentKind::PulsePost, None)), 0.6);
        assert_eq!(
            civic_relevance(&record(ContentKind::PulsePost, Some("Political_Update"))),
            0.9
        );
        assert_eq!(civic_relevance(&record(ContentKind::Job, None)), 0.4);
        assert_eq!(civic_relevance(&record(ContentKind::ArtistContent, None)), 0.2);
        // Political topics only matter on pulse posts
        assert_eq!(civic_relevance(&record(ContentKind::Job, Some("political_update"))), 0.4);
        assert_eq!(relevance_for_tag("petition"), 0.3);
    }

    #[test]
    fn test_reference_scores() {
        let mut prefs = UserPreferences::defaults_for(Uuid::nil());
        prefs.civic_weight = 0.5;
        prefs.job_weight = 0.5;
        prefs.artist_weight = 0.0;
        let ctx = context(prefs);
        let scorer = FeedScorer::default();

        // (0.3·0.6 + 0.25·0.4 + 0.2·0.3 + 0.15·0.5 + 0.1·0.5) · 0.5
        let pulse = scorer.score(&record(ContentKind::PulsePost, None), &ctx);
        assert!((pulse - 0.2325).abs() < EPS, "pulse score {}", pulse);

        // (0.3·0.4 + 0.25·0.4 + 0.2·0.3 + 0.15·0.5 + 0.1·0.5) · 0.5
        let job = scorer.score(&record(ContentKind::Job, None), &ctx);
        assert!((job - 0.2025).abs() < EPS, "job score {}", job);

        let artist = scorer.score(&record(ContentKind::ArtistContent, None), &ctx);
        assert_eq!(artist, 0.0);
    }

    #[test]
    fn test_region_presence_raises_geo_term() {
        let mut prefs = UserPreferences::defaults_for(Uuid::nil());
        assert_eq!(geo_relevance(&prefs), 0.4);
        prefs.preferred_regions = vec!["Accra".to_string()];
        assert_eq!(geo_relevance(&prefs), 0.8);
    }

    #[test]
    fn test_civic_boost_multiplies_time_term() {
        assert!((time_sensitivity(false, 1.2) - 0.3).abs() < EPS);
        assert!((time_sensitivity(true, 1.2) - 0.36).abs() < EPS);

        let prefs = UserPreferences::defaults_for(Uuid::nil());
        let mut ctx = context(prefs);
        let scorer = FeedScorer::default();
        let item = record(ContentKind::PulsePost, None);

        let calm = scorer.score(&item, &ctx);
        ctx.civic_events_active = true;
        let boosted = scorer.score(&item, &ctx);
        // 0.2 · 0.06 · civic weight 0.4
        assert!((boosted - calm - 0.0048).abs() < EPS);
    }

    #[test]
    fn test_engagement_affinity_uses_history() {
        let mut averages = HashMap::new();
        averages.insert(ContentKind::Job, 0.9);
        averages.insert(ContentKind::ArtistContent, f64::NAN);
        let affinity = EngagementAffinity::new(averages);

        assert_eq!(affinity.get(ContentKind::Job), 0.9);
        assert_eq!(affinity.get(ContentKind::PulsePost), 0.5);
        assert_eq!(affinity.get(ContentKind::ArtistContent), 0.5);
    }

    #[test]
    fn test_score_is_bounded() {
        let scorer = FeedScorer::new(ScoringWeights {
            civic_relevance: 5.0,
            ..Default::default()
        });
        let mut prefs = UserPreferences::defaults_for(Uuid::nil());
        prefs.civic_weight = 1.0;
        let ctx = context(prefs);
        assert_eq!(scorer.score(&record(ContentKind::PulsePost, None), &ctx), 1.0);

        let breakdown = ScoreBreakdown {
            civic_relevance: f64::INFINITY,
            geo_relevance: 0.4,
            time_sensitivity: 0.3,
            authenticity: 0.5,
            engagement_affinity: 0.5,
            preference_weight: 1.0,
        };
        assert_eq!(FeedScorer::default().combine(&breakdown), 0.0);
    }
}
