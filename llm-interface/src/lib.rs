use async_trait::async_trait;
use replybot_core::{ConfigError, CoreError, LlmError, OpenAiConfig, ResponseGenerator};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

const PROVIDER: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Builds the user prompt sent for a post.
pub fn build_prompt(title: &str, content: &str) -> String {
    format!("Title: {}\n\nContent: {} ", title, content)
}

/// Chat-completions backed response generator.
#[derive(Debug)]
pub struct OpenAiProvider {
    http_client: Client,
    api_key: String,
    model: String,
    base_url: String,
    system_prompt: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, config: &OpenAiConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            system_prompt: config.system_prompt.clone(),
        })
    }

    pub fn from_config(config: &OpenAiConfig) -> Result<Self, CoreError> {
        let api_key = config.api_key.clone().ok_or_else(|| ConfigError::MissingField {
            field: "openai.api_key".to_string(),
        })?;
        Self::new(api_key, config)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate_reply(&self, title: &str, content: &str) -> Result<String, CoreError> {
        let prompt = build_prompt(title, content);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting completion from {} ({})", PROVIDER, self.model);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Network error calling {}: {}", PROVIDER, e);
                if e.is_timeout() {
                    CoreError::Llm(LlmError::RequestTimeout {
                        provider: PROVIDER.to_string(),
                    })
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            warn!("{} returned {}: {}", PROVIDER, status, body);
            return Err(CoreError::Llm(self.status_error(status, retry_after, &body)));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse {} response: {}", PROVIDER, e);
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
            })
        })?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    fn status_error(&self, status: StatusCode, retry_after: Option<u64>, body: &str) -> LlmError {
        let provider = PROVIDER.to_string();
        match status.as_u16() {
            401 => LlmError::InvalidApiKey { provider },
            404 => LlmError::ModelNotAvailable {
                model: self.model.clone(),
            },
            429 => LlmError::RateLimitExceeded {
                provider,
                retry_after: retry_after.unwrap_or(20),
            },
            400 if body.contains("content_filter") || body.contains("content_policy") => {
                LlmError::ContentFiltered {
                    reason: body.to_string(),
                }
            }
            _ if status.is_server_error() => LlmError::ServiceUnavailable { provider },
            _ => LlmError::InvalidResponseFormat { provider },
        }
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiProvider {
    async fn generate(&self, title: &str, content: &str) -> Result<String, CoreError> {
        self.generate_reply(title, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiProvider {
        let config = OpenAiConfig {
            base_url: server.uri(),
            ..OpenAiConfig::default()
        };
        OpenAiProvider::new("sk-test".to_string(), &config).unwrap()
    }

    #[test]
    fn test_prompt_format() {
        assert_eq!(
            build_prompt("Job opening", "Remote"),
            "Title: Job opening\n\nContent: Remote "
        );
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let err = OpenAiProvider::from_config(&OpenAiConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    { "role": "system" },
                    { "role": "user", "content": "Title: Job opening\n\nContent:  " }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "role": "assistant", "content": "Thanks!" } } ]
            })))
            .mount(&server)
            .await;

        let reply = provider(&server).generate("Job opening", "").await.unwrap();
        assert_eq!(reply, "Thanks!");
    }

    #[tokio::test]
    async fn test_missing_content_is_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "role": "assistant", "content": null } } ]
            })))
            .mount(&server)
            .await;

        let reply = provider(&server).generate("t", "c").await.unwrap();
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = provider(&server).generate("t", "c").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Llm(LlmError::RateLimitExceeded { retry_after: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = provider(&server).generate("t", "c").await.unwrap_err();
        assert!(matches!(err, CoreError::Llm(LlmError::InvalidApiKey { .. })));
    }
}
