pub mod api;
pub mod auth;
pub mod rate_limiter;


pub use api::{RedditApiClient, RedditPostData};
pub use auth::{RedditOAuth2Config, RedditToken};

use async_trait::async_trait;
use replybot_core::{
    ConfigError, CoreError, FeedAdapter, Post, RedditApiError, RedditConfig,
};
use std::future::Future;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Reddit implementation of the feed adapter.
#[derive(Debug)]
pub struct RedditClient {
    config: RedditOAuth2Config,
    api: RedditApiClient,
    token: RwLock<Option<RedditToken>>,
}

impl RedditClient {
    pub fn new(config: RedditOAuth2Config) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(config.api_base.clone(), config.user_agent.clone())?;
        Ok(Self {
            config,
            api,
            token: RwLock::new(None),
        })
    }

    pub fn from_config(config: &RedditConfig) -> Result<Self, CoreError> {
        let require = |value: &Option<String>, field: &str| {
            value.clone().ok_or_else(|| ConfigError::MissingField {
                field: format!("reddit.{}", field),
            })
        };

        Self::new(RedditOAuth2Config::new(
            require(&config.client_id, "client_id")?,
            require(&config.client_secret, "client_secret")?,
            require(&config.username, "username")?,
            require(&config.password, "password")?,
            config.user_agent.clone(),
        ))
    }

    pub async fn authenticate(&self) -> Result<(), CoreError> {
        let token = auth::password_grant(&self.config, self.api.http_client()).await?;
        *self.token.write().await = Some(token);
        Ok(())
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.write().await = Some(token);
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .is_some_and(|token| !token.is_expired())
    }

    async fn access_token(&self) -> Result<String, CoreError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
            debug!("Reddit access token expired, re-authenticating");
        }

        self.authenticate().await?;
        self.token
            .read()
            .await
            .as_ref()
            .map(|token| token.access_token.clone())
            .ok_or(CoreError::RedditApi(RedditApiError::InvalidToken))
    }

    /// Runs `operation` with a valid token, re-authenticating once if Reddit
    /// rejects the current one.
    async fn with_token<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let token = self.access_token().await?;
        match operation(token).await {
            Err(CoreError::RedditApi(RedditApiError::InvalidToken)) => {
                warn!("Reddit rejected the access token, re-authenticating");
                self.token.write().await.take();
                let token = self.access_token().await?;
                operation(token).await
            }
            other => other,
        }
    }

    pub async fn fetch_new_posts(&self, subreddit: &str, limit: u32) -> Result<Vec<Post>, CoreError> {
        let posts = self
            .with_token(|token| async move {
                self.api.get_new_posts(&token, subreddit, limit).await
            })
            .await?;

        Ok(posts
            .into_iter()
            .filter(|post| {
                let closed = post.locked || post.archived;
                if closed {
                    debug!("Ignoring locked or archived post {}", post.id);
                }
                !closed
            })
            .map(Post::from)
            .collect())
    }

    pub async fn reply(&self, post_id: &str, text: &str) -> Result<(), CoreError> {
        self.with_token(|token| async move {
            self.api.submit_comment(&token, post_id, text).await
        })
        .await?;
        info!("Replied to post {}", post_id);
        Ok(())
    }
}

#[async_trait]
impl FeedAdapter for RedditClient {
    async fn fetch_new(&self, subreddit: &str, limit: u32) -> Result<Vec<Post>, CoreError> {
        self.fetch_new_posts(subreddit, limit).await
    }

    async fn reply(&self, post_id: &str, text: &str) -> Result<(), CoreError> {
        RedditClient::reply(self, post_id, text).await
    }
}
