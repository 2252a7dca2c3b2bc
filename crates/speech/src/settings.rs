use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound on waiting for playback to finish, in ms.
pub const DEFAULT_MAX_PLAYBACK_WAIT_MS: u64 = 10_000;

/// Upper bound on the synthesis call itself, in ms.
pub const DEFAULT_SYNTHESIS_TIMEOUT_MS: u64 = 15_000;

/// Speaking rate used when the engine does not report audio length.
pub const DEFAULT_MS_PER_WORD: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub max_playback_wait_ms: u64,
    pub synthesis_timeout_ms: u64,
    pub ms_per_word: u64,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            max_playback_wait_ms: DEFAULT_MAX_PLAYBACK_WAIT_MS,
            synthesis_timeout_ms: DEFAULT_SYNTHESIS_TIMEOUT_MS,
            ms_per_word: DEFAULT_MS_PER_WORD,
        }
    }
}

impl OutputSettings {
    pub fn max_playback_wait(&self) -> Duration {
        Duration::from_millis(self.max_playback_wait_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }
}
