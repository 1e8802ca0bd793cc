//! In-memory [`FeedStore`] for tests and local experiments

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use super::content::{ContentKind, ContentRecord};
use super::diversity::DiversityTracking;
use super::interactions::FeedInteraction;
use super::preferences::UserPreferences;
use super::store::FeedStore;
use crate::error::{Error, Result};

/// Operations the store should fail on
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    pub preference_lookup: bool,
    pub preference_insert: bool,
    pub content: HashSet<ContentKind>,
    pub civic_events: bool,
    pub engagement: bool,
    pub diversity: bool,
}

#[derive(Debug, Clone)]
struct CivicEvent {
    event_date: DateTime<Utc>,
    is_active: bool,
}

#[derive(Default)]
struct State {
    preferences: HashMap<Uuid, UserPreferences>,
    content: HashMap<ContentKind, Vec<ContentRecord>>,
    civic_events: Vec<CivicEvent>,
    interactions: Vec<FeedInteraction>,
    diversity: HashMap<(Uuid, String), DiversityTracking>,
    content_requests: Vec<(ContentKind, usize)>,
    failures: FailurePlan,
}

#[derive(Default)]
pub struct MemoryFeedStore {
    state: RwLock<State>,
}

fn poisoned() -> Error {
    Error::store("lock poisoned")
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_content(&self, record: ContentRecord) {
        if let Ok(mut state) = self.state.write() {
            state.content.entry(record.kind).or_default().push(record);
        }
    }

    pub fn add_civic_event(&self, event_date: DateTime<Utc>, is_active: bool) {
        if let Ok(mut state) = self.state.write() {
            state.civic_events.push(CivicEvent {
                event_date,
                is_active,
            });
        }
    }

    pub fn add_interaction(&self, interaction: FeedInteraction) {
        if let Ok(mut state) = self.state.write() {
            state.interactions.push(interaction);
        }
    }

    pub fn set_preferences(&self, prefs: UserPreferences) {
        if let Ok(mut state) = self.state.write() {
            state.preferences.insert(prefs.user_id, prefs);
        }
    }

    /// Replace the failure plan
    pub fn fail(&self, plan: FailurePlan) {
        if let Ok(mut state) = self.state.write() {
            state.failures = plan;
        }
    }

    pub fn preferences(&self, user_id: Uuid) -> Option<UserPreferences> {
        self.state.read().ok()?.preferences.get(&user_id).cloned()
    }

    pub fn diversity(&self, user_id: Uuid, session_id: &str) -> Option<DiversityTracking> {
        self.state
            .read()
            .ok()?
            .diversity
            .get(&(user_id, session_id.to_string()))
            .cloned()
    }

    pub fn interactions(&self) -> Vec<FeedInteraction> {
        self.state
            .read()
            .map(|s| s.interactions.clone())
            .unwrap_or_default()
    }

    /// Every `recent_content` call seen so far, as (kind, limit)
    pub fn content_requests(&self) -> Vec<(ContentKind, usize)> {
        self.state
            .read()
            .map(|s| s.content_requests.clone())
            .unwrap_or_default()
    }
}

impl FeedStore for MemoryFeedStore {
    async fn find_preferences(&self, user_id: Uuid) -> Result<Option<UserPreferences>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        if state.failures.preference_lookup {
            return Err(Error::database("preference lookup failed"));
        }
        Ok(state.preferences.get(&user_id).cloned())
    }

    async fn insert_preferences(&self, prefs: &UserPreferences) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.failures.preference_insert {
            return Err(Error::database("preference insert failed"));
        }
        state
            .preferences
            .entry(prefs.user_id)
            .or_insert_with(|| prefs.clone());
        Ok(())
    }

    async fn save_preferences(&self, prefs: &UserPreferences) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.preferences.insert(prefs.user_id, prefs.clone());
        Ok(())
    }

    async fn recent_content(&self, kind: ContentKind, limit: usize) -> Result<Vec<ContentRecord>> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.content_requests.push((kind, limit));
        if state.failures.content.contains(&kind) {
            return Err(Error::ContentFetch {
                kind: kind.as_str(),
                message: "simulated failure".into(),
            });
        }

        let mut records = state.content.get(&kind).cloned().unwrap_or_default();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn has_civic_event_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool> {
        let state = self.state.read().map_err(|_| poisoned())?;
        if state.failures.civic_events {
            return Err(Error::database("civic event lookup failed"));
        }
        Ok(state
            .civic_events
            .iter()
            .any(|e| e.is_active && e.event_date >= from && e.event_date <= to))
    }

    async fn engagement_averages(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<HashMap<ContentKind, f64>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        if state.failures.engagement {
            return Err(Error::database("engagement lookup failed"));
        }

        let mut sums: HashMap<ContentKind, (f64, usize)> = HashMap::new();
        for i in state
            .interactions
            .iter()
            .filter(|i| i.user_id == user_id && i.created_at >= since)
        {
            let entry = sums.entry(i.content_type).or_insert((0.0, 0));
            entry.0 += i.engagement_quality;
            entry.1 += 1;
        }

        Ok(sums
            .into_iter()
            .map(|(kind, (sum, n))| (kind, sum / n as f64))
            .collect())
    }

    async fn upsert_diversity(&self, tracking: &DiversityTracking) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.failures.diversity {
            return Err(Error::database("diversity tracking failed"));
        }
        state.diversity.insert(
            (tracking.user_id, tracking.session_id.clone()),
            tracking.clone(),
        );
        Ok(())
    }

    async fn record_interaction(&self, interaction: &FeedInteraction) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.interactions.push(interaction.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.state.read().map_err(|_| poisoned())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::interactions::InteractionType;
    use chrono::Duration;

    fn record(id: &str, kind: ContentKind, age_minutes: i64) -> ContentRecord {
        ContentRecord {
            id: id.to_string(),
            kind,
            topic: None,
            region: None,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            payload: serde_json::json!({ "id": id }),
        }
    }

    #[tokio::test]
    async fn test_recent_content_is_newest_first_and_limited() {
        let store = MemoryFeedStore::new();
        store.add_content(record("old", ContentKind::Job, 30));
        store.add_content(record("new", ContentKind::Job, 1));
        store.add_content(record("mid", ContentKind::Job, 10));

        let records = store.recent_content(ContentKind::Job, 2).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
        assert_eq!(store.content_requests(), vec![(ContentKind::Job, 2)]);
    }

    #[tokio::test]
    async fn test_insert_preferences_keeps_existing_row() {
        let store = MemoryFeedStore::new();
        let user = Uuid::new_v4();
        let mut custom = UserPreferences::defaults_for(user);
        custom.job_weight = 0.9;
        store.set_preferences(custom);

        store
            .insert_preferences(&UserPreferences::defaults_for(user))
            .await
            .unwrap();
        assert_eq!(store.preferences(user).unwrap().job_weight, 0.9);
    }

    #[tokio::test]
    async fn test_engagement_averages_respect_window() {
        let store = MemoryFeedStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        for (quality, age_days) in [(0.8, 1), (0.4, 2), (0.0, 60)] {
            store.add_interaction(FeedInteraction {
                user_id: user,
                content_type: ContentKind::Job,
                content_id: "j".to_string(),
                interaction_type: InteractionType::Click,
                engagement_quality: quality,
                created_at: now - Duration::days(age_days),
            });
        }

        let averages = store
            .engagement_averages(user, now - Duration::days(30))
            .await
            .unwrap();
        assert!((averages[&ContentKind::Job] - 0.6).abs() < 1e-9);
        assert!(!averages.contains_key(&ContentKind::PulsePost));
    }

    #[tokio::test]
    async fn test_inactive_civic_events_are_ignored() {
        let store = MemoryFeedStore::new();
        let now = Utc::now();
        store.add_civic_event(now + Duration::days(3), false);
        assert!(!store
            .has_civic_event_between(now, now + Duration::days(30))
            .await
            .unwrap());

        store.add_civic_event(now + Duration::days(3), true);
        assert!(store
            .has_civic_event_between(now, now + Duration::days(30))
            .await
            .unwrap());
    }
}
