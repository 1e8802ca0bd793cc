//! Feed interaction tracking
//!
//! Interactions feed the engagement-affinity signal: the average
//! `engagement_quality` a user produced for a content kind over the history
//! window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use uuid::Uuid;

use super::content::ContentKind;
use super::store::FeedStore;
use crate::error::{Error, Result};

/// Interaction types we track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    View,
    Click,
    Like,
    Comment,
    Share,
    Save,
    Hide,
}

impl InteractionType {
    /// Quality assumed when the client does not report one
    pub fn default_quality(&self) -> f64 {
        match self {
            InteractionType::View => 0.3,
            InteractionType::Click => 0.5,
            InteractionType::Save => 0.7,
            InteractionType::Like => 0.8,
            InteractionType::Comment => 0.85,
            InteractionType::Share => 0.9,
            InteractionType::Hide => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::View => "view",
            InteractionType::Click => "click",
            InteractionType::Like => "like",
            InteractionType::Comment => "comment",
            InteractionType::Share => "share",
            InteractionType::Save => "save",
            InteractionType::Hide => "hide",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedInteraction {
    pub user_id: Uuid,
    pub content_type: ContentKind,
    pub content_id: String,
    pub interaction_type: InteractionType,
    pub engagement_quality: f64,
    pub created_at: DateTime<Utc>,
}

/// Interaction as submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionRequest {
    pub content_type: ContentKind,
    pub content_id: String,
    pub interaction_type: InteractionType,
    pub engagement_quality: Option<f64>,
}

impl InteractionRequest {
    /// Validate and stamp with the caller's identity
    pub fn into_interaction(self, user_id: Uuid, now: DateTime<Utc>) -> Result<FeedInteraction> {
        if self.content_id.trim().is_empty() {
            return Err(Error::bad_request("content_id must not be empty"));
        }

        let quality = self
            .engagement_quality
            .unwrap_or_else(|| self.interaction_type.default_quality());
        if !(0.0..=1.0).contains(&quality) {
            return Err(Error::bad_request(format!(
                "engagement_quality must be between 0 and 1, got {}",
                quality
            )));
        }

        Ok(FeedInteraction {
            user_id,
            content_type: self.content_type,
            content_id: self.content_id.trim().to_string(),
            interaction_type: self.interaction_type,
            engagement_quality: quality,
            created_at: now,
        })
    }
}

/// Validate and persist an interaction
pub async fn record_interaction<S: FeedStore>(
    store: &S,
    user_id: Uuid,
    request: InteractionRequest,
) -> Result<FeedInteraction> {
    let interaction = request.into_interaction(user_id, Utc::now())?;
    store.record_interaction(&interaction).await?;

    info!(
        "Recorded {} interaction: user={}, {}={}",
        interaction.interaction_type, user_id, interaction.content_type, interaction.content_id
    );
    Ok(interaction)
}
