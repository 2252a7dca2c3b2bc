//! Scripted generation client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::{GenerationClient, GenerationError, GenerationRequest, Result};

enum Scripted {
    Reply(String),
    Fail(GenerationError),
}

/// Returns queued replies in order, then a canned default.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Scripted>>,
    default_reply: String,
    latency: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: "Could you tell me a bit more about that?".to_string(),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Delay before each reply resolves.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(reply.into()));
    }

    pub fn push_failure(&self, error: GenerationError) {
        self.script.lock().unwrap().push_back(Scripted::Fail(error));
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(error)) => Err(error),
            None => Ok(self.default_reply.clone()),
        }
    }
}
