//! Event contracts published by the interview coordinator.
//!
//! Shared DTOs keep producers and consumers agreeing on field names. Also
//! provides the `EventBus` trait for decoupled event emission.

mod bus;

pub use bus::{
    publish, EmittedEvent, EventBus, EventBusRef, InMemoryEventBus, NullEventBus, TracingEventBus,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use virtuoso_transcript::TranscriptMessage;

/// Emitted on every coordinator state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnStateChangedEvent {
    pub session_id: Uuid,
    /// State name, e.g. `listening` or `speaking:question`.
    pub state: String,
    pub epoch: u64,
    pub question_index: usize,
}

/// Emitted for each transcript message added to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessageEvent {
    pub session_id: Uuid,
    pub message: TranscriptMessage,
}

/// Live recognizer text while the candidate speaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialTranscriptEvent {
    pub session_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Same as, or contained in, the previously processed utterance.
    Duplicate,
    /// At or under the minimum length after silence.
    TooShort,
    /// Nothing left after trimming.
    Empty,
}

/// A finalized utterance that was not turned into a user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtteranceDroppedEvent {
    pub session_id: Uuid,
    pub text: String,
    pub reason: DropReason,
}

/// Microphone or speaker failure that ended the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceErrorEvent {
    pub session_id: Uuid,
    pub error: String,
    /// True when the failure was a denied permission.
    #[serde(default)]
    pub permission_denied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFinishedEvent {
    pub session_id: Uuid,
    /// `completed`, `cancelled` or `device_error`.
    pub outcome: String,
    pub duration_ms: u64,
    pub questions_asked: usize,
}

/// Event names as constants to prevent typos.
pub mod event_names {
    pub const STATE_CHANGED: &str = "interview:state_changed";
    pub const TRANSCRIPT_MESSAGE: &str = "interview:transcript_message";
    pub const PARTIAL_TRANSCRIPT: &str = "interview:partial_transcript";
    pub const UTTERANCE_DROPPED: &str = "interview:utterance_dropped";
    pub const DEVICE_ERROR: &str = "interview:device_error";
    pub const SESSION_FINISHED: &str = "interview:session_finished";
}
