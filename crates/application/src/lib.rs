mod constants;
mod coordinator;
mod processor;
mod session;
mod settings;

pub use constants::*;
pub use coordinator::{Epoch, PendingQueue, SpeechPurpose, TurnSnapshot, TurnState};
pub use processor::{Admission, GeneratedReply, ReplyFuture, ResponseProcessor, TurnStart};
pub use session::{
    InterviewSession, Result, SessionDeps, SessionError, SessionOutcome, SessionReport,
};
pub use settings::{AdvanceMode, InterviewSettings, ProcessorSettings};
