//! Scripted speech engines for tests and headless runs.
//!
//! Both engines record what happened to them so callers can assert on
//! spoken text, cancellations and release counts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::{RecognitionEvent, SpeechRecognizer, SpeechSynthesizer, Synthesis};
use crate::SpeechError;

type SynthesizeHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Synthesizer that "plays" instantly and reports a fixed audio duration.
pub struct ScriptedSynthesizer {
    spoken: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<SpeechError>>,
    audio_duration: Option<Duration>,
    latency: Duration,
    hook: Option<SynthesizeHook>,
    cancels: AtomicUsize,
    closes: AtomicUsize,
}

impl Default for ScriptedSynthesizer {
    fn default() -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            audio_duration: Some(Duration::from_millis(500)),
            latency: Duration::ZERO,
            hook: None,
            cancels: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audio_duration(mut self, duration: Option<Duration>) -> Self {
        self.audio_duration = duration;
        self
    }

    /// Delay before `synthesize` returns.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Run `hook` at the start of every synthesis.
    pub fn on_synthesize(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Make the next synthesis fail with `error`.
    pub fn fail_next(&self, error: SpeechError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Synthesis, SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        if let Some(hook) = &self.hook {
            hook(text);
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(Synthesis {
            audio_duration: self.audio_duration,
        })
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recognizer driven by the caller through `emit_*`.
#[derive(Default)]
pub struct ScriptedRecognizer {
    sink: Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>,
    start_failure: Mutex<Option<SpeechError>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start` fail with `error`.
    pub fn fail_next_start(&self, error: SpeechError) {
        *self.start_failure.lock().unwrap() = Some(error);
    }

    /// Deliver an event. Returns false when recognition is not running.
    pub fn emit(&self, event: RecognitionEvent) -> bool {
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    pub fn emit_partial(&self, text: &str) -> bool {
        self.emit(RecognitionEvent::Partial(text.to_string()))
    }

    pub fn emit_final(&self, text: &str) -> bool {
        self.emit(RecognitionEvent::Final(text.to_string()))
    }

    pub fn emit_error(&self, error: SpeechError) -> bool {
        self.emit(RecognitionEvent::Error(error))
    }

    pub fn is_running(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(
        &self,
        sink: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<(), SpeechError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.start_failure.lock().unwrap().take() {
            return Err(error);
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().unwrap().take();
    }
}
