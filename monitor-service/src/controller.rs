use crate::backoff::{Backoff, BackoffConfig};
use chrono::{DateTime, Utc};
use replybot_core::{
    matches, CoreError, ErrorExt, FeedAdapter, InteractionLog, Keywords, MonitorConfig,
    MonitoringSession, NewInteraction, Post, ResponseGenerator,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub batch_size: u32,
    /// Wait after each posted reply before the next post is considered.
    pub reply_delay: Duration,
    /// Wait between batches; zero re-fetches immediately.
    pub poll_interval: Duration,
    pub backoff: BackoffConfig,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            reply_delay: Duration::from_secs(config.reply_delay_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControllerStatus {
    Idle,
    Running {
        session_id: Uuid,
        subreddit: String,
        keywords: Keywords,
        started_at: DateTime<Utc>,
        /// Stop was requested but the loop has not exited yet.
        stopping: bool,
    },
}

impl ControllerStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, ControllerStatus::Idle)
    }
}

/// Counters for one session, returned when the loop exits.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub subreddit: String,
    pub batches_fetched: u64,
    pub posts_matched: u64,
    pub replies_posted: u64,
    pub generation_failures: u64,
    pub reply_failures: u64,
    pub fetch_failures: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionSummary {
    fn new(session: &MonitoringSession) -> Self {
        Self {
            subreddit: session.subreddit_name.clone(),
            batches_fetched: 0,
            posts_matched: 0,
            replies_posted: 0,
            generation_failures: 0,
            reply_failures: 0,
            fetch_failures: 0,
            started_at: session.started_at,
            finished_at: session.started_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostOutcome {
    NotMatched,
    AlreadyHandled,
    Skipped,
    Replied,
}

#[derive(Debug)]
struct ActiveControl {
    id: Uuid,
    stop: CancellationToken,
    subreddit: String,
    keywords: Keywords,
    started_at: DateTime<Utc>,
}

type Slot = Arc<Mutex<Option<ActiveControl>>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<ActiveControl>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a claimed session. The controller returns to idle when it is dropped.
#[derive(Debug)]
pub struct ActiveSession {
    id: Uuid,
    session: MonitoringSession,
    stop: CancellationToken,
    slot: Slot,
}

impl ActiveSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subreddit(&self) -> &str {
        &self.session.subreddit_name
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        let mut slot = lock_slot(&self.slot);
        if slot.as_ref().map(|active| active.id) == Some(self.id) {
            *slot = None;
        }
    }
}

/// Drives the poll, match, generate, reply and record loop for one subreddit at a time.
pub struct MonitorController {
    feed: Arc<dyn FeedAdapter>,
    generator: Arc<dyn ResponseGenerator>,
    log: Arc<dyn InteractionLog>,
    settings: MonitorSettings,
    active: Slot,
}

impl MonitorController {
    pub fn new(
        feed: Arc<dyn FeedAdapter>,
        generator: Arc<dyn ResponseGenerator>,
        log: Arc<dyn InteractionLog>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            feed,
            generator,
            log,
            settings,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn interaction_log(&self) -> Arc<dyn InteractionLog> {
        Arc::clone(&self.log)
    }

    /// Claims the controller for a new session. Fails if one is already running.
    pub fn begin(&self, subreddit: &str, keywords: Keywords) -> Result<ActiveSession, CoreError> {
        let mut slot = lock_slot(&self.active);
        if let Some(active) = slot.as_ref() {
            return Err(CoreError::AlreadyMonitoring {
                subreddit: active.subreddit.clone(),
            });
        }

        let session = MonitoringSession::new(subreddit, keywords);
        let id = Uuid::new_v4();
        let stop = CancellationToken::new();

        *slot = Some(ActiveControl {
            id,
            stop: stop.clone(),
            subreddit: session.subreddit_name.clone(),
            keywords: session.keywords.clone(),
            started_at: session.started_at,
        });

        Ok(ActiveSession {
            id,
            session,
            stop,
            slot: Arc::clone(&self.active),
        })
    }

    /// Runs a session to completion on the calling task.
    pub async fn start(
        &self,
        subreddit: &str,
        keywords: Keywords,
    ) -> Result<SessionSummary, CoreError> {
        let active = self.begin(subreddit, keywords)?;
        self.run_session(active).await
    }

    /// Requests the running session to stop. Does nothing when idle.
    pub fn stop(&self) {
        if let Some(active) = lock_slot(&self.active).as_ref() {
            if !active.stop.is_cancelled() {
                info!("Stop requested for r/{}", active.subreddit);
                active.stop.cancel();
            }
        }
    }

    pub fn status(&self) -> ControllerStatus {
        match lock_slot(&self.active).as_ref() {
            Some(active) => ControllerStatus::Running {
                session_id: active.id,
                subreddit: active.subreddit.clone(),
                keywords: active.keywords.clone(),
                started_at: active.started_at,
                stopping: active.stop.is_cancelled(),
            },
            None => ControllerStatus::Idle,
        }
    }

    pub fn is_stopping(&self) -> bool {
        lock_slot(&self.active)
            .as_ref()
            .is_some_and(|active| active.stop.is_cancelled())
    }

    pub async fn run_session(
        &self,
        mut active: ActiveSession,
    ) -> Result<SessionSummary, CoreError> {
        let stop = active.stop.clone();
        let mut summary = SessionSummary::new(&active.session);
        let mut backoff = Backoff::new(self.settings.backoff.clone());

        info!(
            "Monitoring r/{} for {} keyword(s)",
            active.session.subreddit_name,
            active.session.keywords.len()
        );

        let result = loop {
            if stop.is_cancelled() {
                break Ok(());
            }

            let posts = match self
                .feed
                .fetch_new(&active.session.subreddit_name, self.settings.batch_size)
                .await
            {
                Ok(posts) => {
                    backoff.reset();
                    summary.batches_fetched += 1;
                    posts
                }
                Err(e) if e.is_setup_failure() => {
                    error!(
                        "Cannot monitor r/{}: {}",
                        active.session.subreddit_name,
                        e.user_friendly_message()
                    );
                    break Err(e);
                }
                Err(e) => {
                    summary.fetch_failures += 1;
                    let delay = backoff.next_delay().max(e.retry_after().unwrap_or_default());
                    warn!(
                        "Fetch from r/{} failed ({}), retrying in {:?}",
                        active.session.subreddit_name, e, delay
                    );
                    if !pause(&stop, delay).await {
                        break Ok(());
                    }
                    continue;
                }
            };

            debug!("Fetched {} post(s)", posts.len());

            let mut stopped = false;
            for post in &posts {
                if stop.is_cancelled() {
                    stopped = true;
                    break;
                }

                let outcome = self
                    .process_post(&mut active.session, post, &mut summary)
                    .await;

                if outcome == PostOutcome::Replied && !pause(&stop, self.settings.reply_delay).await
                {
                    stopped = true;
                    break;
                }
            }
            if stopped {
                break Ok(());
            }

            tokio::task::yield_now().await;
            if !pause(&stop, self.settings.poll_interval).await {
                break Ok(());
            }
        };

        summary.finished_at = Utc::now();
        info!(
            "Monitoring of r/{} ended: {} batch(es), {} repl(ies), {} fetch failure(s)",
            summary.subreddit, summary.batches_fetched, summary.replies_posted, summary.fetch_failures
        );

        result.map(|_| summary)
    }

    async fn process_post(
        &self,
        session: &mut MonitoringSession,
        post: &Post,
        summary: &mut SessionSummary,
    ) -> PostOutcome {
        if !matches(post, &session.keywords) {
            return PostOutcome::NotMatched;
        }
        summary.posts_matched += 1;

        if session.has_seen(&post.id) {
            debug!("Post {} already handled this session", post.id);
            return PostOutcome::AlreadyHandled;
        }

        match self.log.exists(&post.id).await {
            Ok(true) => {
                debug!("Post {} already recorded", post.id);
                session.mark_seen(post.id.clone());
                return PostOutcome::AlreadyHandled;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Could not check history for post {}: {}", post.id, e);
                return PostOutcome::Skipped;
            }
        }

        let response = match self.generator.generate(&post.title, &post.content).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                summary.generation_failures += 1;
                warn!("Empty response generated for post {}, skipping", post.id);
                return PostOutcome::Skipped;
            }
            Err(e) => {
                summary.generation_failures += 1;
                e.log_warn();
                warn!("Response generation failed for post {}, skipping", post.id);
                return PostOutcome::Skipped;
            }
        };

        if let Err(e) = self.feed.reply(&post.id, &response).await {
            summary.reply_failures += 1;
            e.log_warn();
            warn!("Reply to post {} failed, skipping", post.id);
            return PostOutcome::Skipped;
        }

        summary.replies_posted += 1;
        info!("Replied to post {} ({})", post.id, post.title);

        let record = NewInteraction {
            post_id: post.id.clone(),
            title: post.title.clone(),
            content: post.content.clone(),
            response,
        };
        match self.log.append(record).await {
            Ok(interaction) => {
                debug!("Recorded interaction #{}", interaction.sequence_id);
            }
            Err(e) if e.is_duplicate_key() => {
                debug!("Post {} was recorded concurrently", post.id);
            }
            Err(e) => {
                error!("Reply to post {} was posted but not recorded: {}", post.id, e);
            }
        }
        session.mark_seen(post.id.clone());

        PostOutcome::Replied
    }
}

/// Waits for `duration` unless stop is requested first. Returns false if stopped.
async fn pause(stop: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !stop.is_cancelled();
    }
    tokio::select! {
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
