use crate::{
    config::ModelConfig,
    credential::Credential,
    error::{GatewayError, Result},
    inference::{InferenceBackend, SYSTEM_PROMPT, USER_INSTRUCTION},
    logger,
    models::{
        ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart, ImageUrl,
        UpstreamErrorEnvelope,
    },
    payload::DataUri,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Client for an OpenAI-compatible `chat/completions` endpoint.
///
/// Holds no credential. Each call binds one with [`ChatClient::bind`], so
/// requests carrying different keys share only the connection pool.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    config: ModelConfig,
}

impl ChatClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn bind<'a>(&'a self, credential: &'a Credential) -> BoundChatClient<'a> {
        BoundChatClient {
            inner: self,
            credential,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, image: &DataUri) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.to_string(),
                        },
                    },
                    ContentPart::Text {
                        text: USER_INSTRUCTION.to_string(),
                    },
                ]),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

/// A [`ChatClient`] paired with the credential for a single call.
pub struct BoundChatClient<'a> {
    inner: &'a ChatClient,
    credential: &'a Credential,
}

impl BoundChatClient<'_> {
    pub async fn complete(&self, image: &DataUri) -> Result<String> {
        let request = self.inner.build_request(image);
        let _timer = logger::timer("chat completion");

        log::info!(
            "Invoking model: {} ({} image, {} bytes)",
            request.model,
            image.mime_type(),
            image.decoded_len()
        );

        let response = self
            .inner
            .client
            .post(self.inner.endpoint())
            .bearer_auth(self.credential.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                log::error!("Chat completion transport error: {:?}", e);
                GatewayError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        if let Some(reason) = completion
            .choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
        {
            log::debug!("Finish reason: {}", reason);
        }

        completion
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::EmptyModelResponse(format!(
                    "{} choice(s) without usable text",
                    completion.choices.len()
                ))
            })
    }
}

#[async_trait]
impl InferenceBackend for ChatClient {
    async fn solve(&self, image: &DataUri, credential: &Credential) -> Result<String> {
        self.bind(credential).complete(image).await
    }
}

/// Maps a non-success upstream reply onto the error taxonomy.
pub fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let detail = serde_json::from_str::<UpstreamErrorEnvelope>(body)
        .ok()
        .and_then(UpstreamErrorEnvelope::into_detail)
        .unwrap_or_default();
    let message = if detail.message.is_empty() {
        body.chars().take(200).collect::<String>()
    } else {
        detail.message
    };
    let lowered = message.to_lowercase();
    let upstream_status = detail.status.unwrap_or_default();
    let summary = format!("HTTP {}: {}", status.as_u16(), message);

    log::error!("Chat completion failed with {}", summary);

    if status == StatusCode::TOO_MANY_REQUESTS
        || upstream_status == "RESOURCE_EXHAUSTED"
        || lowered.contains("quota")
        || lowered.contains("rate limit")
    {
        GatewayError::UpstreamRateLimited(summary)
    } else if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lowered.contains("api key")
        || lowered.contains("authentication")
    {
        GatewayError::UpstreamAuthRejected(summary)
    } else if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        GatewayError::UpstreamUnavailable(summary)
    } else {
        GatewayError::UpstreamError(summary)
    }
}
