//! Feed engine
//!
//! Turns a user and a page request into a scored, diversity-capped page of
//! content. Only an internal task failure makes [`FeedEngine::generate`] return
//! an error; every store failure along the way degrades the feed instead.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::content::{fetch_plan, filter_blocked, ContentKind, ContentRecord, FeedItem};
use super::diversity::{apply_diversity_cap, paginate, rank, DiversityTracking};
use super::metrics::{record_fetch_failure, FeedMetrics, PerformanceTimer, QualityAnalyzer};
use super::preferences::{resolve_preferences, UserPreferences};
use super::scoring::{EngagementAffinity, FeedScorer, ScoringContext};
use super::store::FeedStore;
use crate::config::FeedConfig;
use crate::error::{Error, Result};

/// Feed request body; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedRequest {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub session_id: Option<String>,
}

/// Feed response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    pub feed: Vec<FeedItem>,
    /// Candidates left after diversity capping, across all pages
    pub total_count: usize,
    pub user_preferences: UserPreferences,
    pub civic_events_active: bool,
}

/// Outcome of one category fetch
struct Fetched {
    records: Vec<ContentRecord>,
    failed: bool,
}

impl Fetched {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            failed: false,
        }
    }
}

/// Main feed engine
pub struct FeedEngine<S> {
    store: Arc<S>,
    config: FeedConfig,
    scorer: FeedScorer,
}

impl<S> Clone for FeedEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            scorer: self.scorer.clone(),
        }
    }
}

impl<S: FeedStore> FeedEngine<S> {
    pub fn new(store: Arc<S>, config: FeedConfig) -> Self {
        Self {
            store,
            config,
            scorer: FeedScorer::default(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Generate a personalized feed page for `user_id`
    pub async fn generate(&self, user_id: Uuid, request: &FeedRequest) -> Result<FeedResponse> {
        self.generate_at(user_id, request, Utc::now()).await
    }

    /// Same as [`generate`](Self::generate) with an explicit clock
    pub async fn generate_at(
        &self,
        user_id: Uuid,
        request: &FeedRequest,
        now: DateTime<Utc>,
    ) -> Result<FeedResponse> {
        let timer = PerformanceTimer::new("generate_feed");

        let limit = request
            .limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit);
        let offset = request.offset.unwrap_or(0);

        let prefs = resolve_preferences(self.store.as_ref(), user_id).await;

        // Category fetches, civic events and history are independent of each other
        let plan = fetch_plan(&prefs, limit);
        let budget = |kind: ContentKind| {
            plan.iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, budget)| *budget)
        };

        let (pulse, jobs, artist, civic_events_active, affinity) = tokio::join!(
            self.fetch_kind(ContentKind::PulsePost, budget(ContentKind::PulsePost)),
            self.fetch_kind(ContentKind::Job, budget(ContentKind::Job)),
            self.fetch_kind(ContentKind::ArtistContent, budget(ContentKind::ArtistContent)),
            self.civic_events_active(now),
            self.engagement_affinity(user_id, now),
        );

        let fetch_failures = [&pulse, &jobs, &artist].iter().filter(|f| f.failed).count();

        let mut candidates = pulse.records;
        candidates.extend(jobs.records);
        candidates.extend(artist.records);
        let candidates = filter_blocked(candidates, &prefs);
        let candidates_considered = candidates.len();

        let ctx = ScoringContext {
            prefs,
            affinity,
            civic_events_active,
            civic_boost: self.config.civic_boost,
        };

        let scorer = self.scorer.clone();
        let scoring_ctx = ctx.clone();
        let mut scored = tokio::task::spawn_blocking(move || {
            use rayon::prelude::*;
            let _scoring_timer = PerformanceTimer::new("parallel_scoring");

            candidates
                .into_par_iter()
                .map(|record| {
                    let score = scorer.score(&record, &scoring_ctx);
                    record.into_item(score)
                })
                .collect::<Vec<FeedItem>>()
        })
        .await
        .map_err(Error::internal)?;

        rank(&mut scored);
        let diversified = apply_diversity_cap(scored, self.config.diversity_cap);
        let page = paginate(&diversified, offset, limit);

        if let Some(session_id) = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            self.track_diversity(user_id, session_id, &page).await;
        }

        let mut metrics = FeedMetrics::from_page(&page);
        metrics.candidates_considered = candidates_considered;
        metrics.candidates_after_cap = diversified.len();
        metrics.fetch_failures = fetch_failures;
        metrics.total_duration_ms = timer.elapsed_ms();
        metrics.record();

        for issue in QualityAnalyzer::detect_issues(&metrics, self.config.slow_threshold_ms) {
            debug!("Feed quality issue for {}: {}", user_id, issue);
        }
        timer.log_if_slow(self.config.slow_threshold_ms);

        info!(
            "Generated feed for {}: {} of {} items (offset {}, civic boost {})",
            user_id,
            page.len(),
            diversified.len(),
            offset,
            civic_events_active
        );

        Ok(FeedResponse {
            feed: page,
            total_count: diversified.len(),
            user_preferences: ctx.prefs,
            civic_events_active,
        })
    }

    /// `None` budget means the kind is not part of this request
    async fn fetch_kind(&self, kind: ContentKind, budget: Option<usize>) -> Fetched {
        let Some(limit) = budget else {
            return Fetched::empty();
        };

        match self.store.recent_content(kind, limit).await {
            Ok(records) => Fetched {
                records,
                failed: false,
            },
            Err(e) => {
                warn!("Failed to fetch {} content: {}", kind, e);
                record_fetch_failure(kind);
                Fetched {
                    records: Vec::new(),
                    failed: true,
                }
            }
        }
    }

    async fn civic_events_active(&self, now: DateTime<Utc>) -> bool {
        let Some(until) = window_end(now, self.config.civic_event_window_days) else {
            warn!(
                "Civic event window of {} days is out of range, no boost applied",
                self.config.civic_event_window_days
            );
            return false;
        };
        match self.store.has_civic_event_between(now, until).await {
            Ok(active) => active,
            Err(e) => {
                warn!("Civic event lookup failed, no boost applied: {}", e);
                false
            }
        }
    }

    async fn engagement_affinity(&self, user_id: Uuid, now: DateTime<Utc>) -> EngagementAffinity {
        let Some(since) = window_start(now, self.config.engagement_window_days) else {
            warn!(
                "Engagement window of {} days is out of range, using neutral affinity",
                self.config.engagement_window_days
            );
            return EngagementAffinity::default();
        };
        match self.store.engagement_averages(user_id, since).await {
            Ok(averages) => EngagementAffinity::new(averages),
            Err(e) => {
                warn!(
                    "Engagement history lookup failed for {}, using neutral affinity: {}",
                    user_id, e
                );
                EngagementAffinity::default()
            }
        }
    }

    async fn track_diversity(&self, user_id: Uuid, session_id: &str, page: &[FeedItem]) {
        let tracking = DiversityTracking::from_page(user_id, session_id, page);
        if let Err(e) = self.store.upsert_diversity(&tracking).await {
            warn!(
                "Failed to record diversity for {} session {}: {}",
                user_id, session_id, e
            );
        }
    }
}

/// `now + days`, or `None` for a non-positive or unrepresentable window
fn window_end(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days <= 0 {
        return None;
    }
    now.checked_add_signed(Duration::try_days(days)?)
}

fn window_start(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days <= 0 {
        return None;
    }
    now.checked_sub_signed(Duration::try_days(days)?)
}
