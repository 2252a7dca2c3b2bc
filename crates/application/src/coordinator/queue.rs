use std::collections::VecDeque;

/// Utterances finalized while the floor was held by processing.
///
/// Drained one at a time, oldest first, once the reply in progress has been
/// spoken. Lives only as long as the session.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<String>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: String) {
        self.items.push_back(text);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
