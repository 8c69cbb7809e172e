//! Seams between the monitoring loop and the services it drives.

use crate::error::CoreError;
use crate::types::{Interaction, NewInteraction, Post};
use async_trait::async_trait;

/// Source of recent posts and sink for replies.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// Fetches up to `limit` of the newest posts in `subreddit`, newest first.
    async fn fetch_new(&self, subreddit: &str, limit: u32) -> Result<Vec<Post>, CoreError>;

    /// Posts `text` as a top-level reply to the post.
    async fn reply(&self, post_id: &str, text: &str) -> Result<(), CoreError>;
}

/// Produces reply text for a post. Blank text means nothing worth posting.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, title: &str, content: &str) -> Result<String, CoreError>;
}

/// Durable record of answered posts, keyed by post id.
#[async_trait]
pub trait InteractionLog: Send + Sync {
    async fn exists(&self, post_id: &str) -> Result<bool, CoreError>;

    /// Persists a new interaction. Fails with `DatabaseError::DuplicateKey`
    /// when the post id is already recorded.
    async fn append(&self, interaction: NewInteraction) -> Result<Interaction, CoreError>;

    /// All interactions, newest first.
    async fn list_all(&self) -> Result<Vec<Interaction>, CoreError>;
}
