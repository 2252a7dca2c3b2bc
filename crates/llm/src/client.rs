use std::time::Duration;

use async_trait::async_trait;
use virtuoso_transcript::Role;

use crate::{GenerationClient, GenerationError, GenerationRequest, GenerationResponse, Result};

/// Endpoint of the generation service.
pub const ENV_GENERATION_URL: &str = "VIRTUOSO_GENERATION_URL";

/// Optional bearer token for the generation service.
pub const ENV_API_KEY: &str = "VIRTUOSO_GENERATION_API_KEY";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-over-HTTP generation client.
pub struct HttpGenerationClient {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpGenerationClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            client,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into().trim().to_string();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Build a client from `VIRTUOSO_GENERATION_URL` and
    /// `VIRTUOSO_GENERATION_API_KEY`. Returns `None` without an endpoint.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var(ENV_GENERATION_URL).ok()?;
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return None;
        }
        let client = Self::new(endpoint);
        Some(match std::env::var(ENV_API_KEY) {
            Ok(key) => client.with_api_key(key),
            Err(_) => client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let res = builder
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let parsed: GenerationResponse = res
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        let reply = parsed.response.trim();
        if reply.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        tracing::debug!(chars = reply.len(), "Received generated reply");
        Ok(reply.to_string())
    }
}

/// Follow-ups used when no generation service is configured.
pub const CANNED_FOLLOW_UPS: &[&str] = &[
    "Could you tell me a bit more about that?",
    "Can you walk me through a concrete example?",
    "What would you do differently next time?",
    "How did you measure whether that worked?",
];

/// Offline client that rotates through fixed follow-up questions.
///
/// The follow-up is picked by the number of answers in the request, so a
/// replayed conversation gets the same replies.
pub struct CannedGenerationClient {
    replies: Vec<String>,
}

impl CannedGenerationClient {
    pub fn new() -> Self {
        Self::with_replies(CANNED_FOLLOW_UPS.iter().copied())
    }

    /// Falls back to the built-in follow-ups when `replies` has no usable entry.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let replies: Vec<String> = replies
            .into_iter()
            .map(|r| r.as_ref().trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if replies.is_empty() {
            return Self::new();
        }
        Self { replies }
    }
}

impl Default for CannedGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationClient for CannedGenerationClient {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let answers = request
            .messages
            .iter()
            .filter(|turn| turn.role == Role::User)
            .count();
        let index = answers.saturating_sub(1) % self.replies.len();
        Ok(self.replies[index].clone())
    }
}
