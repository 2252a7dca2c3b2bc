use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::SpeechError;

/// Result of handing text to a synthesizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Synthesis {
    /// Length of the synthesized audio, when the engine reports it.
    pub audio_duration: Option<Duration>,
}

/// Raw event from a recognition engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Provisional hypothesis for the utterance in progress.
    Partial(String),
    /// Stable text for a recognized segment.
    Final(String),
    Error(SpeechError),
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesize `text` to the speaker.
    ///
    /// Returns once audio has been handed to the output device; the caller
    /// waits out playback using the reported duration.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Synthesis, SpeechError>;

    /// Stop the utterance currently playing, if any.
    fn cancel(&self);

    /// Release the engine. Called once per session.
    fn close(&self);
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Open the microphone and start continuous recognition.
    ///
    /// Events are delivered to `sink` until `stop` is called.
    async fn start(&self, sink: mpsc::UnboundedSender<RecognitionEvent>)
        -> Result<(), SpeechError>;

    /// Stop recognition and release the microphone.
    fn stop(&self);
}
