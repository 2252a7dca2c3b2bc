/// Storage key for persisted [`crate::InterviewSettings`].
pub const SETTINGS_KEY: &str = "interview_settings";

/// Spoken when the generation service fails or times out.
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Could you expand on that a little, perhaps with a concrete example?";

/// Pause after a reply before the next question in automatic mode.
pub const DEFAULT_ADVANCE_DELAY_MS: u64 = 2_000;

/// Upper bound on a single generation call.
pub const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 20_000;
