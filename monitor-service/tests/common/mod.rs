#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use monitor_service::{BackoffConfig, MonitorController, MonitorSettings};
use replybot_core::{
    CoreError, DatabaseError, FeedAdapter, Interaction, InteractionLog, LlmError, NewInteraction,
    Post, RedditApiError, ResponseGenerator,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Feed that replays scripted fetch results, then repeats `steady` forever.
#[derive(Default)]
pub struct FakeFeed {
    scripted: Mutex<VecDeque<Result<Vec<Post>, CoreError>>>,
    steady: Vec<Post>,
    failing_replies: HashSet<String>,
    pub replies: Mutex<Vec<(String, String)>>,
    fetches: AtomicUsize,
}

impl FakeFeed {
    pub fn new(steady: Vec<Post>) -> Self {
        Self {
            steady,
            ..Self::default()
        }
    }

    pub fn then_fail(self, error: CoreError) -> Self {
        self.scripted.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn fail_replies_to(mut self, post_id: &str) -> Self {
        self.failing_replies.insert(post_id.to_string());
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedAdapter for FakeFeed {
    async fn fetch_new(&self, _subreddit: &str, limit: u32) -> Result<Vec<Post>, CoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.scripted.lock().unwrap().pop_front() {
            return result;
        }
        Ok(self.steady.iter().take(limit as usize).cloned().collect())
    }

    async fn reply(&self, post_id: &str, text: &str) -> Result<(), CoreError> {
        if self.failing_replies.contains(post_id) {
            return Err(RedditApiError::ReplyRejected {
                reason: "THREAD_LOCKED".to_string(),
            }
            .into());
        }
        self.replies
            .lock()
            .unwrap()
            .push((post_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Generator answering by post title; unknown titles fail.
#[derive(Default)]
pub struct FakeGenerator {
    answers: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn answering(mut self, title: &str, response: &str) -> Self {
        self.answers.insert(title.to_string(), response.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for FakeGenerator {
    async fn generate(&self, title: &str, _content: &str) -> Result<String, CoreError> {
        self.calls.lock().unwrap().push(title.to_string());
        self.answers.get(title).cloned().ok_or_else(|| {
            LlmError::ServiceUnavailable {
                provider: "fake".to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AppendFailure {
    /// Another writer recorded the post first.
    Duplicate,
    Unavailable,
}

#[derive(Default)]
pub struct MemoryLog {
    rows: Mutex<Vec<Interaction>>,
    failing_appends: Option<AppendFailure>,
}

impl MemoryLog {
    /// Log that reports every post as new but rejects every append.
    pub fn failing_appends(failure: AppendFailure) -> Self {
        Self {
            failing_appends: Some(failure),
            ..Self::default()
        }
    }

    pub fn with_recorded(post_id: &str) -> Self {
        let log = Self::default();
        log.rows.lock().unwrap().push(Interaction {
            sequence_id: 1,
            post_id: post_id.to_string(),
            title: "earlier".to_string(),
            content: String::new(),
            response: "earlier reply".to_string(),
            created_at: Utc::now(),
        });
        log
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl InteractionLog for MemoryLog {
    async fn exists(&self, post_id: &str) -> Result<bool, CoreError> {
        Ok(self.rows.lock().unwrap().iter().any(|r| r.post_id == post_id))
    }

    async fn append(&self, interaction: NewInteraction) -> Result<Interaction, CoreError> {
        match self.failing_appends {
            Some(AppendFailure::Duplicate) => {
                return Err(DatabaseError::DuplicateKey {
                    post_id: interaction.post_id,
                }
                .into())
            }
            Some(AppendFailure::Unavailable) => {
                return Err(DatabaseError::ConnectionFailed {
                    reason: "disk unavailable".to_string(),
                }
                .into())
            }
            None => {}
        }

        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.post_id == interaction.post_id) {
            return Err(DatabaseError::DuplicateKey {
                post_id: interaction.post_id,
            }
            .into());
        }
        let stored = Interaction {
            sequence_id: rows.len() as i64 + 1,
            post_id: interaction.post_id,
            title: interaction.title,
            content: interaction.content,
            response: interaction.response,
            created_at: Utc::now(),
        };
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn list_all(&self) -> Result<Vec<Interaction>, CoreError> {
        let mut rows = self.rows.lock().unwrap().clone();
        rows.reverse();
        Ok(rows)
    }
}

pub fn fast_settings() -> MonitorSettings {
    MonitorSettings {
        batch_size: 50,
        reply_delay: Duration::from_millis(5),
        poll_interval: Duration::from_millis(2),
        backoff: BackoffConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
            jitter_factor: 0.0,
        },
    }
}

pub fn controller(
    feed: &Arc<FakeFeed>,
    generator: &Arc<FakeGenerator>,
    log: &Arc<MemoryLog>,
    settings: MonitorSettings,
) -> Arc<MonitorController> {
    Arc::new(MonitorController::new(
        feed.clone(),
        generator.clone(),
        log.clone(),
        settings,
    ))
}

pub fn job_posts() -> Vec<Post> {
    vec![
        Post::new("a", "Job opening", ""),
        Post::new("b", "Cats", "cute"),
    ]
}

/// Polls `condition` every few milliseconds, panicking after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
