use crate::controller::{ControllerStatus, MonitorController};
use replybot_core::{CoreError, ErrorReporter, Interaction, Keywords};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const MAX_SUBREDDIT_LEN: usize = 21;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Strips an `r/` prefix and checks the name against Reddit's naming rules.
pub fn validate_subreddit(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    let name = trimmed
        .strip_prefix("/r/")
        .or_else(|| trimmed.strip_prefix("r/"))
        .unwrap_or(trimmed);

    if name.is_empty() {
        return Err(CoreError::InvalidInput {
            message: "subreddit name is required".to_string(),
        });
    }
    if name.len() > MAX_SUBREDDIT_LEN {
        return Err(CoreError::InvalidInput {
            message: format!("subreddit name '{}' is too long", name),
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CoreError::InvalidInput {
            message: format!("subreddit name '{}' contains invalid characters", name),
        });
    }

    Ok(name.to_string())
}

/// Entry points used by the HTTP layer. Sessions run on a spawned task so
/// stop and history requests stay responsive.
pub struct MonitorService {
    controller: Arc<MonitorController>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorService {
    pub fn new(controller: Arc<MonitorController>) -> Self {
        Self {
            controller,
            worker: Mutex::new(None),
        }
    }

    pub async fn start_monitoring<I, S>(
        &self,
        subreddit_name: &str,
        keywords: I,
    ) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let subreddit = validate_subreddit(subreddit_name)?;
        let keywords = Keywords::new(keywords);
        if keywords.is_empty() {
            warn!("No keywords given for r/{}; nothing will match", subreddit);
        }

        let mut worker = self.worker.lock().await;

        // A stopped session may still be finishing its current post.
        if self.controller.is_stopping() {
            if let Some(handle) = worker.take() {
                if let Err(e) = handle.await {
                    warn!("Previous monitoring task ended abnormally: {}", e);
                }
            }
        }

        let active = self.controller.begin(&subreddit, keywords)?;
        let controller = Arc::clone(&self.controller);

        *worker = Some(tokio::spawn(async move {
            if let Err(e) = controller.run_session(active).await {
                ErrorReporter::default().report_error(&e);
            }
        }));

        info!("Monitoring initiated for r/{}", subreddit);
        Ok(())
    }

    /// Always succeeds, including when nothing is running.
    pub fn stop_monitoring(&self) {
        self.controller.stop();
    }

    pub async fn get_history(&self) -> Result<Vec<Interaction>, CoreError> {
        self.controller.interaction_log().list_all().await
    }

    pub fn status(&self) -> ControllerStatus {
        self.controller.status()
    }

    /// Stops any running session and waits for its task to finish.
    pub async fn shutdown(&self) {
        self.controller.stop();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => info!("Monitoring task finished"),
                Ok(Err(e)) => warn!("Monitoring task ended abnormally: {}", e),
                Err(_) => warn!("Monitoring task did not finish within {:?}", SHUTDOWN_TIMEOUT),
            }
        }
    }
}
