use std::fmt;

/// What the interviewer is saying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechPurpose {
    Intro,
    Question(usize),
    Reply,
    Outro,
}

impl SpeechPurpose {
    pub fn name(&self) -> &'static str {
        match self {
            SpeechPurpose::Intro => "intro",
            SpeechPurpose::Question(_) => "question",
            SpeechPurpose::Reply => "reply",
            SpeechPurpose::Outro => "outro",
        }
    }
}

/// Who holds the floor.
///
/// Exactly one state at a time; the coordinator is the only writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    /// Interviewer speech in flight. Input is paused.
    Speaking(SpeechPurpose),
    /// Waiting for the candidate.
    Listening,
    /// A user turn is committed and its reply is being generated.
    Processing,
    /// Reply spoken; waiting to move to the next question.
    AwaitingAdvance,
    Finished,
}

impl TurnState {
    pub fn is_speaking(&self) -> bool {
        matches!(self, TurnState::Speaking(_))
    }

    /// States in which transcript text is buffered.
    pub fn is_accepting_speech(&self) -> bool {
        matches!(
            self,
            TurnState::Listening | TurnState::Processing | TurnState::AwaitingAdvance
        )
    }

    /// States in which a finalized utterance can be processed right away.
    pub fn floor_is_free(&self) -> bool {
        matches!(self, TurnState::Listening | TurnState::AwaitingAdvance)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TurnState::Finished)
    }

    /// Stable name used in events, e.g. `speaking:question`.
    pub fn name(&self) -> String {
        match self {
            TurnState::Idle => "idle".to_string(),
            TurnState::Speaking(purpose) => format!("speaking:{}", purpose.name()),
            TurnState::Listening => "listening".to_string(),
            TurnState::Processing => "processing".to_string(),
            TurnState::AwaitingAdvance => "awaiting_advance".to_string(),
            TurnState::Finished => "finished".to_string(),
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Generation counter bumped on every state transition.
///
/// Async work records the epoch it was started in; a completion carrying an
/// older epoch belongs to a superseded state and is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TurnSnapshot {
    pub state: TurnState,
    pub epoch: Epoch,
    pub question_index: usize,
}
