//! User feed preferences
//!
//! Each user has one stored weighting profile. It is created lazily the first
//! time a feed is requested and afterwards only changes through explicit
//! settings updates. Resolution never fails: if the store cannot be read or
//! written, the request carries on with in-memory defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use super::content::ContentKind;
use super::store::FeedStore;
use crate::error::{Error, Result};

/// Default weights for a user without stored preferences
const DEFAULT_CIVIC_WEIGHT: f64 = 0.4;
const DEFAULT_ENTERTAINMENT_WEIGHT: f64 = 0.3;
const DEFAULT_JOB_WEIGHT: f64 = 0.2;
const DEFAULT_ARTIST_WEIGHT: f64 = 0.1;
const DEFAULT_LOCAL_PREFERENCE: f64 = 0.7;

/// How strongly a user wants political content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    Low,
    #[default]
    Moderate,
    High,
}

impl EngagementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::Low => "low",
            EngagementLevel::Moderate => "moderate",
            EngagementLevel::High => "high",
        }
    }
}

impl fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngagementLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(EngagementLevel::Low),
            "moderate" => Ok(EngagementLevel::Moderate),
            "high" => Ok(EngagementLevel::High),
            other => Err(format!("unknown engagement level '{}'", other)),
        }
    }
}

/// User preference profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: Uuid,

    // Content weights (0.0 to 1.0)
    pub civic_weight: f64,
    pub entertainment_weight: f64,
    pub job_weight: f64,
    pub artist_weight: f64,

    pub local_content_preference: f64,
    pub political_engagement_level: EngagementLevel,
    pub preferred_regions: Vec<String>,
    pub blocked_topics: Vec<String>,
}

impl UserPreferences {
    /// Default profile for `user_id`
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            civic_weight: DEFAULT_CIVIC_WEIGHT,
            entertainment_weight: DEFAULT_ENTERTAINMENT_WEIGHT,
            job_weight: DEFAULT_JOB_WEIGHT,
            artist_weight: DEFAULT_ARTIST_WEIGHT,
            local_content_preference: DEFAULT_LOCAL_PREFERENCE,
            political_engagement_level: EngagementLevel::Moderate,
            preferred_regions: Vec::new(),
            blocked_topics: Vec::new(),
        }
    }

    /// Preference weight applied to items of `kind`
    pub fn weight_for(&self, kind: ContentKind) -> f64 {
        match kind {
            ContentKind::PulsePost => self.civic_weight,
            ContentKind::Job => self.job_weight,
            ContentKind::ArtistContent => self.artist_weight,
        }
    }

    /// The user's home region, if they have told us one
    pub fn region(&self) -> Option<&str> {
        self.preferred_regions
            .iter()
            .map(|r| r.trim())
            .find(|r| !r.is_empty())
    }

    pub fn is_blocked(&self, topic: &str) -> bool {
        self.blocked_topics
            .iter()
            .any(|b| b.trim().eq_ignore_ascii_case(topic.trim()))
    }
}

/// Partial settings update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub civic_weight: Option<f64>,
    pub entertainment_weight: Option<f64>,
    pub job_weight: Option<f64>,
    pub artist_weight: Option<f64>,
    pub local_content_preference: Option<f64>,
    pub political_engagement_level: Option<EngagementLevel>,
    pub preferred_regions: Option<Vec<String>>,
    pub blocked_topics: Option<Vec<String>>,
}

impl PreferencesUpdate {
    /// Reject weights outside [0, 1]
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("civic_weight", self.civic_weight),
            ("entertainment_weight", self.entertainment_weight),
            ("job_weight", self.job_weight),
            ("artist_weight", self.artist_weight),
            ("local_content_preference", self.local_content_preference),
        ];

        for (name, value) in weights {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(Error::bad_request(format!(
                        "{} must be between 0 and 1, got {}",
                        name, v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Apply onto `prefs`
    pub fn apply(self, prefs: &mut UserPreferences) {
        if let Some(v) = self.civic_weight {
            prefs.civic_weight = v;
        }
        if let Some(v) = self.entertainment_weight {
            prefs.entertainment_weight = v;
        }
        if let Some(v) = self.job_weight {
            prefs.job_weight = v;
        }
        if let Some(v) = self.artist_weight {
            prefs.artist_weight = v;
        }
        if let Some(v) = self.local_content_preference {
            prefs.local_content_preference = v;
        }
        if let Some(level) = self.political_engagement_level {
            prefs.political_engagement_level = level;
        }
        if let Some(regions) = self.preferred_regions {
            prefs.preferred_regions = normalize_set(regions);
        }
        if let Some(topics) = self.blocked_topics {
            prefs.blocked_topics = normalize_set(topics);
        }
    }
}

/// Trim, drop empties and de-duplicate while keeping first-seen order
fn normalize_set(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let v = v.trim();
        if !v.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(v)) {
            out.push(v.to_string());
        }
    }
    out
}

/// Load the user's preferences, creating the default row on first use.
///
/// Store failures are logged and answered with unsaved defaults.
pub async fn resolve_preferences<S: FeedStore>(store: &S, user_id: Uuid) -> UserPreferences {
    match store.find_preferences(user_id).await {
        Ok(Some(prefs)) => return prefs,
        Ok(None) => {}
        Err(e) => {
            warn!(
                "Failed to load preferences for {}, using defaults: {}",
                user_id, e
            );
            return UserPreferences::defaults_for(user_id);
        }
    }

    let prefs = UserPreferences::defaults_for(user_id);
    match store.insert_preferences(&prefs).await {
        Ok(()) => info!("Created default feed preferences for {}", user_id),
        Err(e) => warn!(
            "Failed to persist default preferences for {}: {}",
            user_id, e
        ),
    }
    prefs
}

/// Apply a settings update and persist it
pub async fn update_preferences<S: FeedStore>(
    store: &S,
    user_id: Uuid,
    update: PreferencesUpdate,
) -> Result<UserPreferences> {
    update.validate()?;

    let mut prefs = store
        .find_preferences(user_id)
        .await?
        .unwrap_or_else(|| UserPreferences::defaults_for(user_id));
    update.apply(&mut prefs);

    store.save_preferences(&prefs).await?;
    info!("Updated feed preferences for {}", user_id);
    Ok(prefs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let prefs = UserPreferences::defaults_for(Uuid::nil());
        assert_eq!(prefs.civic_weight, 0.4);
        assert_eq!(prefs.entertainment_weight, 0.3);
        assert_eq!(prefs.job_weight, 0.2);
        assert_eq!(prefs.artist_weight, 0.1);
        assert_eq!(prefs.local_content_preference, 0.7);
        assert_eq!(prefs.political_engagement_level, EngagementLevel::Moderate);
        assert!(prefs.region().is_none());
    }

    #[test]
    fn test_weight_for_maps_kinds() {
        let mut prefs = UserPreferences::defaults_for(Uuid::nil());
        prefs.civic_weight = 0.9;
        prefs.job_weight = 0.5;
        prefs.artist_weight = 0.0;
        assert_eq!(prefs.weight_for(ContentKind::PulsePost), 0.9);
        assert_eq!(prefs.weight_for(ContentKind::Job), 0.5);
        assert_eq!(prefs.weight_for(ContentKind::ArtistContent), 0.0);
    }

    #[test]
    fn test_region_skips_blank_entries() {
        let mut prefs = UserPreferences::defaults_for(Uuid::nil());
        prefs.preferred_regions = vec!["  ".to_string(), "Nairobi".to_string()];
        assert_eq!(prefs.region(), Some("Nairobi"));
    }

    #[test]
    fn test_update_rejects_out_of_range_weights() {
        let update = PreferencesUpdate {
            job_weight: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(update.validate(), Err(Error::BadRequest { .. })));

        let update = PreferencesUpdate {
            civic_weight: Some(f64::NAN),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let mut prefs = UserPreferences::defaults_for(Uuid::nil());
        let update = PreferencesUpdate {
            artist_weight: Some(0.0),
            political_engagement_level: Some(EngagementLevel::High),
            preferred_regions: Some(vec![
                " Lagos ".to_string(),
                "lagos".to_string(),
                "Abuja".to_string(),
            ]),
            ..Default::default()
        };
        update.validate().unwrap();
        update.apply(&mut prefs);

        assert_eq!(prefs.artist_weight, 0.0);
        assert_eq!(prefs.civic_weight, 0.4);
        assert_eq!(prefs.political_engagement_level, EngagementLevel::High);
        assert_eq!(prefs.preferred_regions, vec!["Lagos", "Abuja"]);
    }

    #[test]
    fn test_engagement_level_parsing() {
        assert_eq!("HIGH".parse::<EngagementLevel>().unwrap(), EngagementLevel::High);
        assert!("extreme".parse::<EngagementLevel>().is_err());
        let json = serde_json::to_value(EngagementLevel::Low).unwrap();
        assert_eq!(json, "low");
    }
}
