//! Script-app authentication against Reddit's OAuth endpoint.
//!
//! Bots run headless, so the client uses the resource-owner password grant
//! with the bot account's credentials instead of the browser redirect flow.

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, ResourceOwnerPassword,
    ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use replybot_core::{CoreError, RedditApiError};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

pub const REDDIT_AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
pub const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Refresh a little before Reddit says the token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditOAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub token_url: String,
    pub api_base: String,
}

impl RedditOAuth2Config {
    pub fn new(
        client_id: String,
        client_secret: String,
        username: String,
        password: String,
        user_agent: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            username,
            password,
            user_agent,
            token_url: REDDIT_TOKEN_URL.to_string(),
            api_base: REDDIT_API_BASE.to_string(),
        }
    }

    /// Points the client at different endpoints, e.g. a local mock server.
    pub fn with_endpoints(mut self, token_url: String, api_base: String) -> Self {
        self.token_url = token_url;
        self.api_base = api_base;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() + EXPIRY_MARGIN >= self.expires_at
    }
}

pub fn required_scopes() -> Vec<&'static str> {
    vec!["identity", "read", "submit"]
}

/// Exchanges the bot account's credentials for an access token.
pub async fn password_grant(
    config: &RedditOAuth2Config,
    http_client: &reqwest::Client,
) -> Result<RedditToken, CoreError> {
    let auth_failed = |reason: String| CoreError::RedditApi(RedditApiError::AuthenticationFailed { reason });

    let oauth_client = BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        AuthUrl::new(REDDIT_AUTHORIZE_URL.to_string()).map_err(|e| auth_failed(e.to_string()))?,
        Some(TokenUrl::new(config.token_url.clone()).map_err(|e| auth_failed(e.to_string()))?),
    );

    let username = ResourceOwnerUsername::new(config.username.clone());
    let password = ResourceOwnerPassword::new(config.password.clone());
    let mut request = oauth_client.exchange_password(&username, &password);
    for scope in required_scopes() {
        request = request.add_scope(Scope::new(scope.to_string()));
    }

    debug!("Requesting Reddit access token for {}", config.username);
    let response = request
        .request_async(|req| send_token_request(http_client, req))
        .await
        .map_err(|e| auth_failed(e.to_string()))?;

    let expires_in = response
        .expires_in()
        .unwrap_or_else(|| Duration::from_secs(3600));
    let scope = response
        .scopes()
        .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
        .unwrap_or_default();

    info!("Authenticated with Reddit as {}", config.username);
    Ok(RedditToken {
        access_token: response.access_token().secret().clone(),
        expires_at: SystemTime::now() + expires_in,
        scope,
    })
}

/// Sends the token request through our own client so Reddit sees the
/// configured User-Agent.
async fn send_token_request(
    http_client: &reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let mut builder = http_client
        .request(request.method, request.url.as_str())
        .body(request.body);
    for (name, value) in request.headers.iter() {
        builder = builder.header(name, value);
    }

    let response = builder.send().await?;
    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_to_reddit_endpoints() {
        let config = RedditOAuth2Config::new(
            "id".to_string(),
            "secret".to_string(),
            "bot".to_string(),
            "pw".to_string(),
            "replybot/test".to_string(),
        );
        assert_eq!(config.token_url, REDDIT_TOKEN_URL);
        assert_eq!(config.api_base, REDDIT_API_BASE);
    }

    #[test]
    fn test_token_expiry() {
        let valid = RedditToken {
            access_token: "t".to_string(),
            expires_at: SystemTime::now() + Duration::from_secs(3600),
            scope: vec![],
        };
        assert!(!valid.is_expired());

        let nearly = RedditToken {
            access_token: "t".to_string(),
            expires_at: SystemTime::now() + Duration::from_secs(10),
            scope: vec![],
        };
        assert!(nearly.is_expired());
    }

    #[test]
    fn test_required_scopes() {
        assert_eq!(required_scopes(), vec!["identity", "read", "submit"]);
    }
}
