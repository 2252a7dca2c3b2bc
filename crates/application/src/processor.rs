//! Turns a finalized utterance into the interviewer's reply.

use std::sync::Arc;

use futures::future::BoxFuture;
use virtuoso_llm::{
    build_system_prompt, strip_stock_phrases, GenerationClient, GenerationRequest, PromptContext,
};
use virtuoso_template::Question;
use virtuoso_transcript::{ConversationHistory, HistoryError};

use crate::settings::ProcessorSettings;

/// Whether a finalized utterance should become a user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted(String),
    /// Equal to, or contained in, the previously processed text.
    Duplicate,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    pub text: String,
    /// True when the configured fallback was used instead of a generated reply.
    pub fallback: bool,
}

pub type ReplyFuture = BoxFuture<'static, GeneratedReply>;

/// Result of handing a finalized utterance to the processor.
pub enum TurnStart {
    /// The user turn was committed and its reply is being generated.
    Generating { text: String, reply: ReplyFuture },
    Duplicate,
    Empty,
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub struct ResponseProcessor {
    client: Arc<dyn GenerationClient>,
    settings: Arc<ProcessorSettings>,
    last_processed: Option<String>,
}

impl ResponseProcessor {
    pub fn new(client: Arc<dyn GenerationClient>, settings: ProcessorSettings) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            last_processed: None,
        }
    }

    /// Apply the duplicate guard. Accepted text becomes the new reference.
    pub fn admit(&mut self, text: &str) -> Admission {
        let text = text.trim();
        if text.is_empty() {
            return Admission::Empty;
        }

        let normalized = normalize(text);
        if let Some(previous) = &self.last_processed {
            if previous.contains(normalized.as_str()) {
                tracing::debug!(text, "Dropping duplicate utterance");
                return Admission::Duplicate;
            }
        }
        self.last_processed = Some(normalized);
        Admission::Accepted(text.to_string())
    }

    /// Request for the reply to the last user turn in `history`.
    pub fn build_request(
        &self,
        history: &ConversationHistory,
        question: Option<&Question>,
    ) -> GenerationRequest {
        let context = question
            .map(|q| PromptContext {
                question: q.question.clone(),
                expected_keywords: q.expected_keywords.clone(),
                follow_up: q.follow_up.clone(),
            })
            .unwrap_or_default();

        GenerationRequest {
            messages: history.turns().to_vec(),
            system_prompt: build_system_prompt(&context),
        }
    }

    /// Generate a reply. Never fails: errors, timeouts and empty replies
    /// resolve to the fallback text.
    ///
    /// The future owns everything it needs so it can be spawned.
    pub fn generate(&self, request: GenerationRequest) -> BoxFuture<'static, GeneratedReply> {
        let client = Arc::clone(&self.client);
        let settings = Arc::clone(&self.settings);

        Box::pin(async move {
            let fallback = || GeneratedReply {
                text: settings.fallback_reply.clone(),
                fallback: true,
            };

            let result =
                tokio::time::timeout(settings.generation_timeout(), client.generate(&request)).await;
            match result {
                Ok(Ok(raw)) => {
                    let text = strip_stock_phrases(&raw, &settings.stock_phrases);
                    if text.is_empty() {
                        tracing::warn!(backend = client.name(), "Empty reply, using fallback");
                        return fallback();
                    }
                    GeneratedReply {
                        text,
                        fallback: false,
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(backend = client.name(), "Generation failed, using fallback: {}", e);
                    fallback()
                }
                Err(_) => {
                    tracing::warn!(
                        backend = client.name(),
                        timeout_ms = settings.generation_timeout_ms,
                        "Generation timed out, using fallback"
                    );
                    fallback()
                }
            }
        })
    }

    /// Admit `text` and commit it as a user turn.
    ///
    /// The returned reply future owns its inputs so it can be spawned; hand
    /// its output to [`finish_turn`](Self::finish_turn).
    pub fn start_turn(
        &mut self,
        text: &str,
        history: &mut ConversationHistory,
        question: Option<&Question>,
    ) -> Result<TurnStart, HistoryError> {
        let text = match self.admit(text) {
            Admission::Accepted(text) => text,
            Admission::Duplicate => return Ok(TurnStart::Duplicate),
            Admission::Empty => return Ok(TurnStart::Empty),
        };

        history.push_user(text.clone())?;
        let request = self.build_request(history, question);
        Ok(TurnStart::Generating {
            text,
            reply: self.generate(request),
        })
    }

    /// Commit the generated reply as the assistant turn.
    pub fn finish_turn(
        &self,
        history: &mut ConversationHistory,
        reply: &GeneratedReply,
    ) -> Result<(), HistoryError> {
        history.push_reply(reply.text.clone())
    }
}
