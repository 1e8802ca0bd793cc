//! Feed Module
//!
//! Builds personalized civic feeds mixing pulse posts, jobs and artist content.
//!
//! ## Pipeline
//!
//! 1. **Preferences** - Load the user's weighting profile, creating defaults on first use
//! 2. **Content** - Fetch up to `ceil(limit × weight)` recent items per kind, concurrently
//! 3. **Scoring** - Blend civic, geo, time, authenticity and engagement signals
//! 4. **Diversity** - Rank, cap each kind at 40% of the candidates, then paginate
//!
//! ## Scoring Overview
//!
//! - Civic relevance (30%): fixed per content type, political updates highest
//! - Geo relevance (25%): whether the user has told us a region
//! - Time sensitivity (20%): boosted while a civic event is coming up
//! - Authenticity (15%): constant until a verification signal exists
//! - Engagement affinity (10%): average quality of past interactions with the kind

pub mod content;
pub mod diversity;
pub mod engine;
pub mod interactions;
#[cfg(any(test, feature = "mock"))]
pub mod memory;
pub mod metrics;
pub mod preferences;
pub mod scoring;
pub mod store;

pub use content::{ContentKind, ContentRecord, FeedItem};
pub use engine::{FeedEngine, FeedRequest, FeedResponse};
pub use preferences::{EngagementLevel, PreferencesUpdate, UserPreferences};
pub use store::{FeedStore, PgFeedStore};
