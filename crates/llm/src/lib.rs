//! Remote text generation for interviewer replies.
//!
//! The service takes the conversation so far plus a system prompt and
//! returns one reply string:
//!
//! ```text
//! POST { "messages": [{role, content}], "systemPrompt": "..." }
//!   -> { "response": "..." }
//! ```

mod client;
mod prompt;
pub mod testing;

pub use client::{
    CannedGenerationClient, HttpGenerationClient, CANNED_FOLLOW_UPS, ENV_API_KEY, ENV_GENERATION_URL,
};
pub use prompt::{build_system_prompt, strip_stock_phrases, PromptContext, DEFAULT_STOCK_PHRASES};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use virtuoso_transcript::ConversationTurn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub messages: Vec<ConversationTurn>,
    pub system_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub response: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation service returned an empty reply")]
    EmptyResponse,
    #[error("invalid generation response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, GenerationError>;

/// Produces the interviewer's reply to the latest user turn.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}
