//! Speech channels for the interview coordinator.
//!
//! Vendor speech SDKs sit behind two engine traits:
//! - `SpeechSynthesizer`: text-to-speech played to the speaker
//! - `SpeechRecognizer`: continuous speech-to-text from the microphone
//!
//! The channels wrap those engines with the behaviour the coordinator relies
//! on: bounded playback waits, last-caller-wins cancellation, echo
//! suppression by pausing input while speaking, and idempotent release.

mod engine;
mod input;
mod output;
mod settings;
pub mod testing;

pub use engine::{RecognitionEvent, SpeechRecognizer, SpeechSynthesizer, Synthesis};
pub use input::{InputCallback, InputEvent, SpeechInputChannel, TranscriptUpdate};
pub use output::{estimate_speech_duration, SpeechOutputChannel};
pub use settings::OutputSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("speech recognition failed: {0}")]
    Recognition(String),
    #[error("speech synthesis timed out")]
    Timeout,
    #[error("speech interrupted by a newer request")]
    Interrupted,
    #[error("speech channel closed")]
    Closed,
}

impl SpeechError {
    /// Permission and device failures end the session; everything else is
    /// recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SpeechError::PermissionDenied | SpeechError::DeviceUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;
