mod history;

pub use history::{ConversationHistory, ConversationTurn, HistoryError, Role};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Repository trait for the completed-session log.
/// Implemented by storage layer, allowing domain to remain decoupled.
///
/// The log is append-only: records are never updated in place.
pub trait CallHistoryRepository: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn append(&self, record: &CallRecord) -> Result<(), Self::Error>;
    fn get(&self, id: &Uuid) -> Result<CallRecord, Self::Error>;
    fn list(&self) -> Result<Vec<CallRecord>, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sender {
    Ai,
    User,
    System,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::Ai => "AI",
            Sender::User => "User",
            Sender::System => "System",
        }
    }
}

/// Display message shown in the interview transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: Uuid,
    pub messages: Vec<TranscriptMessage>,
    pub started_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            messages: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn push(&mut self, message: TranscriptMessage) {
        self.messages.push(message);
    }

    /// Spoken exchange as `Sender: text` lines. System messages are left out.
    pub fn full_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.sender != Sender::System)
            .map(|m| format!("{}: {}", m.sender.label(), m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn spoken_by(&self, sender: Sender) -> impl Iterator<Item = &TranscriptMessage> {
        self.messages.iter().filter(move |m| m.sender == sender)
    }
}

/// Summary of a completed interview session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: Uuid,
    pub duration_ms: u64,
    pub transcript_text: String,
    pub timestamp: DateTime<Utc>,
}

impl CallRecord {
    pub fn from_transcript(transcript: &Transcript, duration_ms: u64) -> Self {
        Self {
            id: transcript.id,
            duration_ms,
            transcript_text: transcript.full_text(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_text_skips_system_messages() {
        let mut transcript = Transcript::new(Uuid::new_v4());
        transcript.push(TranscriptMessage::new(Sender::System, "Interview started"));
        transcript.push(TranscriptMessage::new(Sender::Ai, "Tell me about Apex."));
        transcript.push(TranscriptMessage::new(Sender::User, "I used Apex triggers"));

        assert_eq!(
            transcript.full_text(),
            "AI: Tell me about Apex.\nUser: I used Apex triggers"
        );
    }

    #[test]
    fn test_sender_serializes_uppercase() {
        let json = serde_json::to_string(&Sender::Ai).unwrap();
        assert_eq!(json, r#""AI""#);
    }

    #[test]
    fn test_call_record_uses_camel_case() {
        let transcript = Transcript::new(Uuid::new_v4());
        let record = CallRecord::from_transcript(&transcript, 1200);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["durationMs"], 1200);
        assert!(value.get("transcriptText").is_some());
        assert_eq!(record.id, transcript.id);
    }
}
