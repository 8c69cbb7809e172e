use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use replybot_core::{ConfigError, CoreError, Post, RedditApiError};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    json: CommentResponseBody,
}

#[derive(Debug, Deserialize)]
struct CommentResponseBody {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
}

/// What a request is about, so a 404 maps to the right error.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Subreddit(&'a str),
    Post(&'a str),
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
    api_base: Url,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(api_base: String, user_agent: String) -> Result<Self, CoreError> {
        let api_base = Url::parse(&api_base).map_err(|_| ConfigError::InvalidValue {
            field: "reddit.api_base".to_string(),
            value: api_base.clone(),
        })?;

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(RateLimitConfig::reddit_oauth()),
            api_base,
            user_agent,
        })
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
        form: Option<&[(&str, &str)]>,
        resource: Resource<'_>,
    ) -> Result<Response, CoreError> {
        let url = self
            .api_base
            .join(endpoint)
            .map_err(|e| RedditApiError::InvalidResponse {
                details: format!("bad endpoint {}: {}", endpoint, e),
            })?;

        self.rate_limiter.acquire().await;

        let mut request_builder = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(access_token);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }
        if let Some(fields) = form {
            request_builder = request_builder.form(fields);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = request_builder.send().await.map_err(|e| {
            error!("Network error for {} {}: {}", method, endpoint, e);
            if e.is_timeout() {
                CoreError::RedditApi(RedditApiError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        Err(CoreError::RedditApi(status_error(status, &response, endpoint, resource)))
    }

    /// Fetches the newest submissions of a subreddit.
    pub async fn get_new_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        limit: u32,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/new", subreddit);
        let limit_str = limit.to_string();
        let params = [("limit", limit_str.as_str()), ("raw_json", "1")];

        let response = self
            .make_request(
                Method::GET,
                &endpoint,
                access_token,
                Some(&params[..]),
                None,
                Resource::Subreddit(subreddit),
            )
            .await?;

        // Unknown subreddits redirect to the search page instead of 404ing.
        if response.url().path().starts_with("/subreddits/search") {
            return Err(CoreError::RedditApi(RedditApiError::SubredditNotFound {
                subreddit: subreddit.to_string(),
            }));
        }

        let listing: RedditListing<serde_json::Value> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            })
        })?;

        let posts: Vec<RedditPostData> = listing
            .data
            .children
            .into_iter()
            .filter(|child| child.kind == "t3")
            .filter_map(|child| match serde_json::from_value(child.data) {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!("Skipping malformed submission in r/{}: {}", subreddit, e);
                    None
                }
            })
            .collect();

        debug!("Retrieved {} posts from r/{}", posts.len(), subreddit);
        Ok(posts)
    }

    /// Posts a top-level comment on a submission.
    pub async fn submit_comment(
        &self,
        access_token: &str,
        post_id: &str,
        text: &str,
    ) -> Result<(), CoreError> {
        let thing_id = format!("t3_{}", post_id);
        let form = [
            ("api_type", "json"),
            ("thing_id", thing_id.as_str()),
            ("text", text),
        ];

        let response = self
            .make_request(
                Method::POST,
                "/api/comment",
                access_token,
                None,
                Some(&form[..]),
                Resource::Post(post_id),
            )
            .await?;

        let body: CommentResponse = response.json().await.map_err(|e| {
            error!("Failed to parse comment response: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse comment response for {}", thing_id),
            })
        })?;

        if let Some(first) = body.json.errors.first() {
            let code = first.first().and_then(|v| v.as_str()).unwrap_or("UNKNOWN");
            let message = first.get(1).and_then(|v| v.as_str()).unwrap_or_default();
            warn!("Reddit rejected reply to {}: {} {}", thing_id, code, message);
            return Err(CoreError::RedditApi(RedditApiError::ReplyRejected {
                reason: format!("{}: {}", code, message),
            }));
        }

        info!("Posted reply to {}", thing_id);
        Ok(())
    }
}

fn status_error(
    status: StatusCode,
    response: &Response,
    endpoint: &str,
    resource: Resource<'_>,
) -> RedditApiError {
    match status.as_u16() {
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => match resource {
            Resource::Subreddit(subreddit) => RedditApiError::SubredditNotFound {
                subreddit: subreddit.to_string(),
            },
            Resource::Post(post_id) => RedditApiError::PostNotFound {
                post_id: post_id.to_string(),
            },
        },
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(60);
            warn!("Rate limited, retry after {} seconds", retry_after);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, endpoint),
        },
    }
}

impl From<RedditPostData> for Post {
    fn from(post_data: RedditPostData) -> Self {
        Post::new(post_data.id, post_data.title, post_data.selftext)
    }
}
