use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// A submission fetched from the monitored subreddit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub title: String,
    /// Self-text of the submission; empty for link posts.
    pub content: String,
}

impl Post {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}

/// A reply that has been posted and is about to be recorded.
#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub post_id: String,
    pub title: String,
    pub content: String,
    pub response: String,
}

/// One answered post, as persisted by the interaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub sequence_id: i64,
    pub post_id: String,
    pub title: String,
    pub content: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Lower-cased, de-duplicated keyword set with empty entries removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Keywords(BTreeSet<String>);

impl Keywords {
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            raw.into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Transient state of one monitoring run.
#[derive(Debug, Clone)]
pub struct MonitoringSession {
    pub subreddit_name: String,
    pub keywords: Keywords,
    pub started_at: DateTime<Utc>,
    seen_in_session: HashSet<String>,
}

impl MonitoringSession {
    pub fn new(subreddit_name: impl Into<String>, keywords: Keywords) -> Self {
        Self {
            subreddit_name: subreddit_name.into(),
            keywords,
            started_at: Utc::now(),
            seen_in_session: HashSet::new(),
        }
    }

    pub fn has_seen(&self, post_id: &str) -> bool {
        self.seen_in_session.contains(post_id)
    }

    pub fn mark_seen(&mut self, post_id: impl Into<String>) {
        self.seen_in_session.insert(post_id.into());
    }

    pub fn seen_count(&self) -> usize {
        self.seen_in_session.len()
    }
}
