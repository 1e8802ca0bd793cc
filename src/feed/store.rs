//! Storage for feed generation
//!
//! [`FeedStore`] is the only way the feed code touches persistence. The
//! production backend is [`PgFeedStore`]; tests use the in-memory store in
//! `feed::memory`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, warn};
use uuid::Uuid;

use super::content::{ContentKind, ContentRecord};
use super::diversity::DiversityTracking;
use super::interactions::FeedInteraction;
use super::preferences::{EngagementLevel, UserPreferences};
use crate::database::Database;
use crate::error::{Error, Result};

/// Async interface used by the feed engine and API handlers.
pub trait FeedStore: Send + Sync + 'static {
    /// Stored preferences for a user, if any.
    fn find_preferences(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Option<UserPreferences>>> + Send;

    /// Insert a new preference row; an existing row is left untouched.
    fn insert_preferences(&self, prefs: &UserPreferences) -> impl Future<Output = Result<()>> + Send;

    /// Insert or overwrite the preference row.
    fn save_preferences(&self, prefs: &UserPreferences) -> impl Future<Output = Result<()>> + Send;

    /// Up to `limit` most recent items of `kind`.
    fn recent_content(
        &self,
        kind: ContentKind,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ContentRecord>>> + Send;

    /// Whether an active civic event is scheduled in `[from, to]`.
    fn has_civic_event_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Average engagement quality per content kind since `since`.
    fn engagement_averages(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<HashMap<ContentKind, f64>>> + Send;

    /// Insert or replace the tracking row for (user, session).
    fn upsert_diversity(
        &self,
        tracking: &DiversityTracking,
    ) -> impl Future<Output = Result<()>> + Send;

    fn record_interaction(
        &self,
        interaction: &FeedInteraction,
    ) -> impl Future<Output = Result<()>> + Send;

    fn health_check(&self) -> impl Future<Output = Result<()>> + Send;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgFeedStore {
    db: Database,
}

impl PgFeedStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// Database row for preferences
#[derive(Debug, sqlx::FromRow)]
struct PreferencesRow {
    user_id: Uuid,
    civic_weight: f64,
    entertainment_weight: f64,
    job_weight: f64,
    artist_weight: f64,
    local_content_preference: f64,
    political_engagement_level: String,
    preferred_regions: Vec<String>,
    blocked_topics: Vec<String>,
}

impl From<PreferencesRow> for UserPreferences {
    fn from(row: PreferencesRow) -> Self {
        let level = row
            .political_engagement_level
            .parse()
            .unwrap_or_else(|e| {
                warn!("Stored preferences for {}: {}", row.user_id, e);
                EngagementLevel::default()
            });

        UserPreferences {
            user_id: row.user_id,
            civic_weight: row.civic_weight,
            entertainment_weight: row.entertainment_weight,
            job_weight: row.job_weight,
            artist_weight: row.artist_weight,
            local_content_preference: row.local_content_preference,
            political_engagement_level: level,
            preferred_regions: row.preferred_regions,
            blocked_topics: row.blocked_topics,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContentRow {
    id: String,
    topic: Option<String>,
    region: Option<String>,
    created_at: DateTime<Utc>,
    payload: serde_json::Value,
}

#[derive(Debug, sqlx::FromRow)]
struct AffinityRow {
    content_type: String,
    avg_quality: Option<f64>,
}

fn content_query(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::PulsePost => {
            r#"
            SELECT p.id::text AS id, p.topic, p.region, p.created_at, to_jsonb(p) AS payload
            FROM pulse_posts p
            ORDER BY p.created_at DESC
            LIMIT $1
            "#
        }
        ContentKind::Job => {
            r#"
            SELECT j.id::text AS id, j.topic, j.region, j.created_at, to_jsonb(j) AS payload
            FROM jobs j
            WHERE j.is_active = true
            ORDER BY j.created_at DESC
            LIMIT $1
            "#
        }
        ContentKind::ArtistContent => {
            r#"
            SELECT a.id::text AS id, a.topic, a.region, a.created_at, to_jsonb(a) AS payload
            FROM artist_content a
            ORDER BY a.created_at DESC
            LIMIT $1
            "#
        }
    }
}

impl FeedStore for PgFeedStore {
    async fn find_preferences(&self, user_id: Uuid) -> Result<Option<UserPreferences>> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            r#"
            SELECT user_id, civic_weight, entertainment_weight, job_weight, artist_weight,
                   local_content_preference, political_engagement_level,
                   preferred_regions, blocked_topics
            FROM user_feed_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(UserPreferences::from))
    }

    async fn insert_preferences(&self, prefs: &UserPreferences) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_feed_preferences
                (user_id, civic_weight, entertainment_weight, job_weight, artist_weight,
                 local_content_preference, political_engagement_level,
                 preferred_regions, blocked_topics, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(prefs.user_id)
        .bind(prefs.civic_weight)
        .bind(prefs.entertainment_weight)
        .bind(prefs.job_weight)
        .bind(prefs.artist_weight)
        .bind(prefs.local_content_preference)
        .bind(prefs.political_engagement_level.as_str())
        .bind(&prefs.preferred_regions)
        .bind(&prefs.blocked_topics)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn save_preferences(&self, prefs: &UserPreferences) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_feed_preferences
                (user_id, civic_weight, entertainment_weight, job_weight, artist_weight,
                 local_content_preference, political_engagement_level,
                 preferred_regions, blocked_topics, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                civic_weight = EXCLUDED.civic_weight,
                entertainment_weight = EXCLUDED.entertainment_weight,
                job_weight = EXCLUDED.job_weight,
                artist_weight = EXCLUDED.artist_weight,
                local_content_preference = EXCLUDED.local_content_preference,
                political_engagement_level = EXCLUDED.political_engagement_level,
                preferred_regions = EXCLUDED.preferred_regions,
                blocked_topics = EXCLUDED.blocked_topics,
                updated_at = NOW()
            "#,
        )
        .bind(prefs.user_id)
        .bind(prefs.civic_weight)
        .bind(prefs.entertainment_weight)
        .bind(prefs.job_weight)
        .bind(prefs.artist_weight)
        .bind(prefs.local_content_preference)
        .bind(prefs.political_engagement_level.as_str())
        .bind(&prefs.preferred_regions)
        .bind(&prefs.blocked_topics)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn recent_content(&self, kind: ContentKind, limit: usize) -> Result<Vec<ContentRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ContentRow>(content_query(kind))
            .bind(limit as i64)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| Error::ContentFetch {
                kind: kind.as_str(),
                message: e.to_string().into(),
            })?;

        debug!("Fetched {} {} rows (limit {})", rows.len(), kind, limit);

        Ok(rows
            .into_iter()
            .map(|row| ContentRecord {
                id: row.id,
                kind,
                topic: row.topic,
                region: row.region,
                created_at: row.created_at,
                payload: row.payload,
            })
            .collect())
    }

    async fn has_civic_event_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM civic_events
                WHERE is_active = true
                AND event_date >= $1
                AND event_date <= $2
            )
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.db.pool())
        .await?;

        Ok(exists)
    }

    async fn engagement_averages(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<HashMap<ContentKind, f64>> {
        let rows = sqlx::query_as::<_, AffinityRow>(
            r#"
            SELECT content_type, AVG(engagement_quality)::float8 AS avg_quality
            FROM feed_interactions
            WHERE user_id = $1
            AND created_at >= $2
            GROUP BY content_type
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(self.db.pool())
        .await?;

        let mut averages = HashMap::new();
        for row in rows {
            match (row.content_type.parse::<ContentKind>(), row.avg_quality) {
                (Ok(kind), Some(avg)) => {
                    averages.insert(kind, avg);
                }
                (Err(e), _) => debug!("Ignoring interactions for {}", e),
                _ => {}
            }
        }
        Ok(averages)
    }

    async fn upsert_diversity(&self, tracking: &DiversityTracking) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feed_diversity_tracking
                (user_id, session_id, civic_content_count, job_content_count,
                 artist_content_count, regions_represented, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (user_id, session_id) DO UPDATE SET
                civic_content_count = EXCLUDED.civic_content_count,
                job_content_count = EXCLUDED.job_content_count,
                artist_content_count = EXCLUDED.artist_content_count,
                regions_represented = EXCLUDED.regions_represented,
                updated_at = NOW()
            "#,
        )
        .bind(tracking.user_id)
        .bind(&tracking.session_id)
        .bind(tracking.civic_content_count)
        .bind(tracking.job_content_count)
        .bind(tracking.artist_content_count)
        .bind(&tracking.regions_represented)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn record_interaction(&self, interaction: &FeedInteraction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feed_interactions
                (id, user_id, content_type, content_id, interaction_type,
                 engagement_quality, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(interaction.user_id)
        .bind(interaction.content_type.as_str())
        .bind(&interaction.content_id)
        .bind(interaction.interaction_type.as_str())
        .bind(interaction.engagement_quality)
        .bind(interaction.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.db.health_check().await
    }
}
