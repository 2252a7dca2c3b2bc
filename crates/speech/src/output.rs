//! Speech output channel: one utterance at a time, last caller wins.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::SpeechSynthesizer;
use crate::input::SpeechInputChannel;
use crate::settings::OutputSettings;
use crate::{Result, SpeechError};

/// Estimated playback length for `text` at `ms_per_word`.
pub fn estimate_speech_duration(text: &str, ms_per_word: u64) -> Duration {
    let words = text.split_whitespace().count().max(1) as u64;
    Duration::from_millis(words * ms_per_word)
}

struct InFlight {
    id: u64,
    cancel: CancellationToken,
}

pub struct SpeechOutputChannel {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Input paused while speaking so the recognizer doesn't hear us.
    input: Option<Arc<SpeechInputChannel>>,
    settings: OutputSettings,
    current: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl SpeechOutputChannel {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, settings: OutputSettings) -> Self {
        Self {
            synthesizer,
            input: None,
            settings,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_input(mut self, input: Arc<SpeechInputChannel>) -> Self {
        self.input = Some(input);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Speak `text` and resolve when playback has finished.
    ///
    /// A call made while another is in flight cancels the earlier one, which
    /// resolves with [`SpeechError::Interrupted`].
    pub async fn speak(&self, text: &str, voice: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SpeechError::Closed);
        }
        if text.trim().is_empty() {
            return Ok(());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let superseded = self.lock().replace(InFlight {
            id,
            cancel: cancel.clone(),
        });
        if let Some(previous) = superseded {
            tracing::debug!(previous = previous.id, id, "Cancelling in-flight speech");
            previous.cancel.cancel();
            self.synthesizer.cancel();
        }

        if let Some(input) = &self.input {
            input.pause();
        }

        let result = self.play(text, voice, &cancel).await;

        let still_current = {
            let mut current = self.lock();
            match current.as_ref() {
                Some(flight) if flight.id == id => {
                    current.take();
                    true
                }
                _ => false,
            }
        };

        if still_current && !self.closed.load(Ordering::Acquire) {
            if let Some(input) = &self.input {
                if input.has_listener() {
                    input.resume();
                }
            }
        }

        if let Err(e) = &result {
            if *e != SpeechError::Interrupted {
                tracing::warn!(synthesizer = self.synthesizer.name(), "Speech failed: {}", e);
            }
        }
        result
    }

    async fn play(&self, text: &str, voice: &str, cancel: &CancellationToken) -> Result<()> {
        let synthesis = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SpeechError::Interrupted),
            result = tokio::time::timeout(
                self.settings.synthesis_timeout(),
                self.synthesizer.synthesize(text, voice),
            ) => match result {
                Ok(synthesis) => synthesis?,
                Err(_) => {
                    self.synthesizer.cancel();
                    return Err(SpeechError::Timeout);
                }
            },
        };

        let estimated = synthesis
            .audio_duration
            .unwrap_or_else(|| estimate_speech_duration(text, self.settings.ms_per_word));
        let wait = estimated.min(self.settings.max_playback_wait());
        if wait < estimated {
            tracing::debug!(?estimated, ?wait, "Capping playback wait");
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SpeechError::Interrupted),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    /// Cancel any in-flight speech without closing the channel.
    pub fn cancel(&self) {
        if let Some(flight) = self.lock().take() {
            flight.cancel.cancel();
            self.synthesizer.cancel();
        }
    }

    /// Cancel in-flight speech and release the synthesizer.
    ///
    /// Returns false if the channel was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel();
        self.synthesizer.close();
        tracing::info!(synthesizer = self.synthesizer.name(), "Speech output closed");
        true
    }

    pub fn is_speaking(&self) -> bool {
        self.lock().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
