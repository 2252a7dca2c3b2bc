use std::time::Duration;

use serde::{Deserialize, Serialize};
use virtuoso_llm::DEFAULT_STOCK_PHRASES;
use virtuoso_silence::SilenceSettings;
use virtuoso_speech::OutputSettings;

use crate::constants::{
    DEFAULT_ADVANCE_DELAY_MS, DEFAULT_FALLBACK_REPLY, DEFAULT_GENERATION_TIMEOUT_MS,
};

/// How the interview moves on after the interviewer has replied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AdvanceMode {
    /// Ask the next question after `delay_ms` unless the candidate keeps talking.
    Auto { delay_ms: u64 },
    /// Wait for an explicit `next_question` command.
    Manual,
}

impl Default for AdvanceMode {
    fn default() -> Self {
        AdvanceMode::Auto {
            delay_ms: DEFAULT_ADVANCE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorSettings {
    pub fallback_reply: String,
    /// Leading phrases removed from generated replies.
    pub stock_phrases: Vec<String>,
    pub generation_timeout_ms: u64,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            stock_phrases: DEFAULT_STOCK_PHRASES.iter().map(|p| p.to_string()).collect(),
            generation_timeout_ms: DEFAULT_GENERATION_TIMEOUT_MS,
        }
    }
}

impl ProcessorSettings {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

/// Everything tunable about a session, persisted as one JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewSettings {
    pub silence: SilenceSettings,
    pub output: OutputSettings,
    pub processor: ProcessorSettings,
    pub advance: AdvanceMode,
    /// Retry a failed utterance once before moving on.
    pub retry_failed_speech: bool,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            silence: SilenceSettings::default(),
            output: OutputSettings::default(),
            processor: ProcessorSettings::default(),
            advance: AdvanceMode::default(),
            retry_failed_speech: true,
        }
    }
}
