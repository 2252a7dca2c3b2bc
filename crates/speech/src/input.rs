//! Speech input channel: a continuous transcription stream.
//!
//! The channel knows nothing about turns. It forwards recognizer output to a
//! single registered callback, can be paused (transcripts are discarded, the
//! callback stays registered) and is stopped exactly once.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{RecognitionEvent, SpeechRecognizer};
use crate::{Result, SpeechError};

/// Incremental transcript text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptUpdate {
    pub text: String,
    /// True when the recognizer considers this segment stable.
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Transcript(TranscriptUpdate),
    /// Recognition failure. Fatal kinds are reported through
    /// [`SpeechError::is_fatal`].
    Error(SpeechError),
}

/// Callback type for input events.
pub type InputCallback = Arc<dyn Fn(InputEvent) + Send + Sync + 'static>;

#[derive(Default)]
struct InputState {
    listener: Option<InputCallback>,
    paused: bool,
    starting: bool,
    listening: bool,
    stopped: bool,
    cancel: Option<CancellationToken>,
}

pub struct SpeechInputChannel {
    recognizer: Arc<dyn SpeechRecognizer>,
    state: Mutex<InputState>,
}

impl SpeechInputChannel {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            state: Mutex::new(InputState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InputState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start continuous recognition and deliver events to `callback`.
    ///
    /// Calling this while already listening replaces the callback.
    pub async fn start_listening(self: &Arc<Self>, callback: InputCallback) -> Result<()> {
        {
            let mut state = self.lock();
            if state.stopped {
                return Err(SpeechError::Closed);
            }
            if state.listening || state.starting {
                state.listener = Some(callback);
                return Ok(());
            }
            state.starting = true;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.recognizer.start(tx).await {
            self.lock().starting = false;
            tracing::warn!(recognizer = self.recognizer.name(), "Failed to start recognition: {}", e);
            return Err(e);
        }

        let cancel = CancellationToken::new();
        {
            let mut state = self.lock();
            state.starting = false;
            if state.stopped {
                // Stopped while the recognizer was starting; release it now.
                drop(state);
                self.recognizer.stop();
                return Err(SpeechError::Closed);
            }
            state.listening = true;
            state.listener = Some(callback);
            state.cancel = Some(cancel.clone());
        }

        let channel = Arc::clone(self);
        tokio::spawn(async move {
            channel.forward(rx, cancel).await;
        });

        tracing::info!(recognizer = self.recognizer.name(), "Speech input started");
        Ok(())
    }

    async fn forward(
        &self,
        mut rx: mpsc::UnboundedReceiver<RecognitionEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };

            let Some(event) = event else {
                tracing::debug!("Recognizer event stream closed");
                break;
            };
            self.dispatch(event);
        }
    }

    fn dispatch(&self, event: RecognitionEvent) {
        let (listener, event) = {
            let state = self.lock();
            let Some(listener) = state.listener.clone() else {
                return;
            };
            let event = match event {
                RecognitionEvent::Partial(text) | RecognitionEvent::Final(text)
                    if state.paused =>
                {
                    tracing::trace!(len = text.len(), "Dropping transcript while paused");
                    return;
                }
                RecognitionEvent::Partial(text) => InputEvent::Transcript(TranscriptUpdate {
                    text,
                    is_final: false,
                }),
                RecognitionEvent::Final(text) => InputEvent::Transcript(TranscriptUpdate {
                    text,
                    is_final: true,
                }),
                RecognitionEvent::Error(e) => InputEvent::Error(e),
            };
            (listener, event)
        };

        // Invoke outside the lock so the callback may call back into the channel.
        listener(event);
    }

    pub fn pause(&self) {
        self.lock().paused = true;
    }

    pub fn resume(&self) {
        self.lock().paused = false;
    }

    /// Stop recognition, release the microphone and clear the callback.
    ///
    /// Returns false if the channel was already stopped.
    pub fn stop(&self) -> bool {
        let release_now = {
            let mut state = self.lock();
            if state.stopped {
                return false;
            }
            state.stopped = true;
            state.listener = None;
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
            let was_listening = state.listening;
            state.listening = false;
            was_listening
        };

        if release_now {
            self.recognizer.stop();
            tracing::info!(recognizer = self.recognizer.name(), "Speech input stopped");
        }
        true
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn has_listener(&self) -> bool {
        self.lock().listener.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.lock().listening
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// True when transcripts are currently being delivered.
    pub fn is_accepting(&self) -> bool {
        let state = self.lock();
        state.listening && !state.paused && !state.stopped
    }
}
