//! End-of-utterance detection from transcript activity.
//!
//! The recognizer gives no reliable "user finished" signal, so an utterance
//! is considered complete once no new transcript text has arrived for
//! `threshold_ms`. The detector is pure: callers supply the clock.

mod buffer;

pub use buffer::UtteranceBuffer;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Quiet period that ends an utterance.
pub const DEFAULT_SILENCE_THRESHOLD_MS: u64 = 5_000;

/// How often the coordinator evaluates the detector.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 1_000;

/// Buffered text of this many characters or fewer is treated as noise.
pub const DEFAULT_MIN_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SilenceSettings {
    pub threshold_ms: u64,
    pub check_interval_ms: u64,
    pub min_chars: usize,
}

impl Default for SilenceSettings {
    fn default() -> Self {
        Self {
            threshold_ms: DEFAULT_SILENCE_THRESHOLD_MS,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

impl SilenceSettings {
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedUtterance {
    pub text: String,
    /// When the last transcript update for this utterance arrived.
    pub last_speech_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SilenceDecision {
    /// Nothing buffered.
    Idle,
    /// Speech buffered, quiet period not over yet.
    Waiting { remaining: Duration },
    /// Quiet period over but the text was noise; buffer discarded.
    TooShort { text: String },
    /// Utterance complete and the floor is free.
    Ready(FinalizedUtterance),
    /// Utterance complete while the floor is held by processing.
    Contended(FinalizedUtterance),
}

#[derive(Debug, Clone)]
pub struct SilenceDetector {
    settings: SilenceSettings,
    buffer: UtteranceBuffer,
    last_speech_at: Option<Instant>,
}

impl SilenceDetector {
    pub fn new(settings: SilenceSettings) -> Self {
        Self {
            settings,
            buffer: UtteranceBuffer::new(),
            last_speech_at: None,
        }
    }

    pub fn settings(&self) -> SilenceSettings {
        self.settings
    }

    /// Record a transcript update received at `now`.
    pub fn record(&mut self, text: &str, is_final: bool, now: Instant) {
        if text.trim().is_empty() {
            return;
        }
        if is_final {
            self.buffer.push_final(text);
        } else {
            self.buffer.push_interim(text);
        }
        self.last_speech_at = Some(now);
    }

    /// Decide whether the buffered utterance is complete.
    ///
    /// The timestamp is read at call time, so an update that lands between
    /// two checks pushes finalization back by a full threshold.
    pub fn evaluate(&mut self, now: Instant, floor_free: bool) -> SilenceDecision {
        let Some(last_speech_at) = self.last_speech_at else {
            return SilenceDecision::Idle;
        };

        let elapsed = now.saturating_duration_since(last_speech_at);
        let threshold = self.settings.threshold();
        if elapsed < threshold {
            return SilenceDecision::Waiting {
                remaining: threshold - elapsed,
            };
        }

        let text = self.buffer.take();
        self.last_speech_at = None;

        if text.trim().chars().count() <= self.settings.min_chars {
            tracing::debug!(text = %text, "Discarding short utterance");
            return SilenceDecision::TooShort { text };
        }

        let utterance = FinalizedUtterance {
            text,
            last_speech_at,
        };
        if floor_free {
            SilenceDecision::Ready(utterance)
        } else {
            SilenceDecision::Contended(utterance)
        }
    }

    /// True when speech is buffered and not yet finalized.
    pub fn has_pending_speech(&self) -> bool {
        self.last_speech_at.is_some() && !self.buffer.is_empty()
    }

    pub fn buffered_text(&self) -> String {
        self.buffer.text()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_speech_at = None;
    }
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self::new(SilenceSettings::default())
    }
}
