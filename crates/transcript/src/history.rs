//! Conversation turns and the ordered history sent to the generation service.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("user turn committed while the previous user turn is unanswered")]
    ConsecutiveUserTurns,
    #[error("assistant reply committed without a preceding user turn")]
    ReplyWithoutUserTurn,
    #[error("interviewer prompt committed while a user turn is unanswered")]
    UnansweredUserTurn,
}

/// Ordered conversation log.
///
/// Three kinds of commits keep the log well formed:
/// - `push_prompt`: scripted interviewer speech (intro, question, outro).
/// - `push_user`: a finalized candidate utterance.
/// - `push_reply`: the generated answer to the last user turn.
///
/// A user turn is always followed by exactly one reply, so user turns never
/// repeat and generated replies never repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_prompt(&mut self, content: impl Into<String>) -> Result<(), HistoryError> {
        if self.awaiting_reply() {
            return Err(HistoryError::UnansweredUserTurn);
        }
        self.turns.push(ConversationTurn::assistant(content));
        Ok(())
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), HistoryError> {
        if self.awaiting_reply() {
            return Err(HistoryError::ConsecutiveUserTurns);
        }
        self.turns.push(ConversationTurn::user(content));
        Ok(())
    }

    pub fn push_reply(&mut self, content: impl Into<String>) -> Result<(), HistoryError> {
        if !self.awaiting_reply() {
            return Err(HistoryError::ReplyWithoutUserTurn);
        }
        self.turns.push(ConversationTurn::assistant(content));
        Ok(())
    }

    /// True when the last committed turn is an unanswered user turn.
    pub fn awaiting_reply(&self) -> bool {
        matches!(self.turns.last(), Some(turn) if turn.role == Role::User)
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn into_turns(self) -> Vec<ConversationTurn> {
        self.turns
    }
}
