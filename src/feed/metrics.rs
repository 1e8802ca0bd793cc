//! Feed metrics and performance monitoring
//!
//! Counters and histograms go through the `metrics` facade. Nothing is
//! recorded unless a recorder is installed (see the `prometheus` feature).

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use super::content::{ContentKind, FeedItem};

pub const FEED_REQUESTS_TOTAL: &str = "feed_requests_total";
pub const FEED_FETCH_FAILURES_TOTAL: &str = "feed_fetch_failures_total";
pub const FEED_ITEMS_RETURNED: &str = "feed_items_returned";
pub const FEED_GENERATION_SECONDS: &str = "feed_generation_seconds";

/// Summary of one generated feed
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedMetrics {
    pub candidates_considered: usize,
    pub candidates_after_cap: usize,
    pub items_returned: usize,
    pub avg_score: f64,
    pub kind_distribution: BTreeMap<ContentKind, usize>,
    pub unique_regions: usize,
    pub fetch_failures: usize,
    pub total_duration_ms: u64,
}

impl FeedMetrics {
    pub fn from_page(page: &[FeedItem]) -> Self {
        let mut kind_distribution = BTreeMap::new();
        for item in page {
            *kind_distribution.entry(item.kind).or_insert(0) += 1;
        }

        let mut regions: Vec<&str> = page.iter().filter_map(|i| i.region.as_deref()).collect();
        regions.sort_unstable();
        regions.dedup();

        let avg_score = if page.is_empty() {
            0.0
        } else {
            page.iter().map(|i| i.score).sum::<f64>() / page.len() as f64
        };

        Self {
            items_returned: page.len(),
            avg_score,
            kind_distribution,
            unique_regions: regions.len(),
            ..Default::default()
        }
    }

    /// Push this request's numbers to the installed recorder
    pub fn record(&self) {
        metrics::counter!(FEED_REQUESTS_TOTAL).increment(1);
        metrics::histogram!(FEED_ITEMS_RETURNED).record(self.items_returned as f64);
        metrics::histogram!(FEED_GENERATION_SECONDS).record(self.total_duration_ms as f64 / 1000.0);
    }
}

pub fn record_fetch_failure(kind: ContentKind) {
    metrics::counter!(FEED_FETCH_FAILURES_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Feed quality checks used for debug logging
pub struct QualityAnalyzer;

impl QualityAnalyzer {
    /// Share of the page held by the most common kind (0 for an empty page)
    pub fn dominant_share(metrics: &FeedMetrics) -> f64 {
        if metrics.items_returned == 0 {
            return 0.0;
        }
        let max = metrics.kind_distribution.values().copied().max().unwrap_or(0);
        max as f64 / metrics.items_returned as f64
    }

    pub fn detect_issues(metrics: &FeedMetrics, slow_threshold_ms: u64) -> Vec<String> {
        let mut issues = Vec::new();

        if metrics.items_returned == 0 && metrics.candidates_considered > 0 {
            issues.push("Candidates found but page is empty".to_string());
        }

        if metrics.total_duration_ms > slow_threshold_ms {
            issues.push(format!("Slow response: {}ms", metrics.total_duration_ms));
        }

        if metrics.items_returned > 0 && metrics.avg_score < 0.1 {
            issues.push(format!("Low avg score: {:.3}", metrics.avg_score));
        }

        if metrics.fetch_failures > 0 {
            issues.push(format!("{} content fetch(es) failed", metrics.fetch_failures));
        }

        let dropped = metrics
            .candidates_considered
            .saturating_sub(metrics.candidates_after_cap);
        if metrics.candidates_considered > 0
            && dropped as f64 / metrics.candidates_considered as f64 > 0.5
        {
            issues.push(format!(
                "Diversity cap dropped {} of {} candidates",
                dropped, metrics.candidates_considered
            ));
        }

        let share = Self::dominant_share(metrics);
        if metrics.items_returned >= 5 && share > 0.8 {
            issues.push(format!("One content kind holds {:.0}% of the page", share * 100.0));
        }

        issues
    }
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: String,
}

impl PerformanceTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold_ms: u64) {
        let elapsed = self.elapsed_ms();
        if elapsed > threshold_ms {
            tracing::warn!(
                "⚠️ Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        tracing::debug!("⏱️ {} completed in {}ms", self.label, elapsed);
    }
}
