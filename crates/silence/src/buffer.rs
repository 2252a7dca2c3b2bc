//! Buffered text for the utterance in progress.

/// Committed recognizer segments plus the volatile interim hypothesis.
#[derive(Debug, Clone, Default)]
pub struct UtteranceBuffer {
    segments: Vec<String>,
    interim: Option<String>,
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True when `incoming` repeats all of `committed` as whole words.
fn repeats_committed(committed: &str, incoming: &str) -> bool {
    if committed.is_empty() {
        return false;
    }
    match incoming.strip_prefix(committed) {
        Some(rest) => rest
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric()),
        None => false,
    }
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the interim hypothesis.
    pub fn push_interim(&mut self, text: &str) {
        let text = text.trim();
        self.interim = (!text.is_empty()).then(|| text.to_string());
    }

    /// Commit a final segment.
    ///
    /// Recognizers sometimes re-emit a stable phrase or emit a cumulative
    /// final that already contains earlier segments; neither is appended
    /// twice.
    pub fn push_final(&mut self, text: &str) {
        self.interim = None;
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let incoming = normalize(text);
        if let Some(last) = self.segments.last() {
            if normalize(last) == incoming {
                tracing::trace!("Ignoring repeated final segment");
                return;
            }
        }

        let committed = normalize(&self.committed());
        if repeats_committed(&committed, &incoming) {
            self.segments.clear();
        }
        self.segments.push(text.to_string());
    }

    fn committed(&self) -> String {
        self.segments.join(" ")
    }

    /// Full buffered text: committed segments followed by the interim tail.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        if let Some(interim) = &self.interim {
            let committed = normalize(&self.committed());
            // Some engines repeat committed text at the start of the next interim.
            if !repeats_committed(&committed, &normalize(interim)) {
                parts.push(interim);
            } else {
                return interim.clone();
            }
        }
        parts.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.interim.is_none()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.interim = None;
    }

    /// Take the buffered text, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        let text = self.text();
        self.clear();
        text
    }
}
