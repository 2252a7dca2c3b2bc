//! Interview session: wires the channels to a coordinator and guarantees
//! the microphone and synthesizer are released exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;
use virtuoso_events::EventBusRef;
use virtuoso_llm::GenerationClient;
use virtuoso_speech::{
    InputCallback, InputEvent, SpeechError, SpeechInputChannel, SpeechOutputChannel,
    SpeechRecognizer, SpeechSynthesizer,
};
use virtuoso_template::InterviewTemplate;
use virtuoso_transcript::{CallRecord, ConversationHistory, Transcript};

use crate::coordinator::{Coordinator, CoordinatorEvent, TurnSnapshot};
use crate::processor::ResponseProcessor;
use crate::settings::InterviewSettings;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not start speech input: {0}")]
    Device(#[from] SpeechError),
    #[error("interview task failed: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Outro spoken after the last question or when time ran out.
    Completed,
    /// Shut down before the outro.
    Cancelled,
    /// Microphone or speaker failure.
    DeviceError(String),
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Cancelled => "cancelled",
            SessionOutcome::DeviceError(_) => "device_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    pub questions_asked: usize,
    pub history: ConversationHistory,
    pub transcript: Transcript,
    /// Ready to append to the call-history log.
    pub record: CallRecord,
}

/// External engines a session runs against.
pub struct SessionDeps {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub generator: Arc<dyn GenerationClient>,
    pub bus: EventBusRef,
}

struct SessionResources {
    input: Arc<SpeechInputChannel>,
    output: Arc<SpeechOutputChannel>,
    released: AtomicBool,
}

impl SessionResources {
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.output.close();
        self.input.stop();
        tracing::debug!("Session resources released");
    }
}

/// Releases session resources when the coordinator task ends, including by
/// panic or abort.
struct ReleaseGuard(Arc<SessionResources>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Handle to a running interview.
///
/// Dropping the handle cancels the interview and releases the devices.
pub struct InterviewSession {
    id: Uuid,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    snapshot: watch::Receiver<TurnSnapshot>,
    cancel: CancellationToken,
    resources: Arc<SessionResources>,
    task: Option<JoinHandle<SessionReport>>,
}

impl InterviewSession {
    /// Acquire the speech devices and start the interview.
    ///
    /// Fails without starting when the microphone cannot be opened; anything
    /// acquired so far is released.
    pub async fn start(
        template: Arc<InterviewTemplate>,
        settings: InterviewSettings,
        deps: SessionDeps,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("interview", session_id = %id);

        let input = Arc::new(SpeechInputChannel::new(deps.recognizer));
        let output = Arc::new(
            SpeechOutputChannel::new(deps.synthesizer, settings.output)
                .with_input(Arc::clone(&input)),
        );
        let resources = Arc::new(SessionResources {
            input: Arc::clone(&input),
            output: Arc::clone(&output),
            released: AtomicBool::new(false),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let callback: InputCallback = {
            let tx = tx.clone();
            Arc::new(move |event: InputEvent| {
                let _ = tx.send(CoordinatorEvent::Input(event));
            })
        };

        if let Err(e) = input.start_listening(callback).instrument(span.clone()).await {
            span.in_scope(|| tracing::error!("Could not start interview: {}", e));
            resources.release();
            return Err(SessionError::Device(e));
        }

        let (snapshot_tx, snapshot_rx) = watch::channel(TurnSnapshot::default());
        let processor = ResponseProcessor::new(deps.generator, settings.processor.clone());
        let coordinator = Coordinator::new(
            id,
            template,
            settings,
            output,
            processor,
            deps.bus,
            tx.clone(),
            snapshot_tx,
        );

        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            let guard = ReleaseGuard(Arc::clone(&resources));
            tokio::spawn(
                async move {
                    let _guard = guard;
                    coordinator.run(rx, cancel).await
                }
                .instrument(span),
            )
        };

        Ok(Self {
            id,
            events: tx,
            snapshot: snapshot_rx,
            cancel,
            resources,
            task: Some(task),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the next question now. Ignored unless the interviewer is
    /// listening or waiting to advance.
    pub fn next_question(&self) {
        let _ = self.events.send(CoordinatorEvent::NextQuestion);
    }

    /// End the interview without the outro. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn subscribe(&self) -> watch::Receiver<TurnSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        *self.snapshot.borrow()
    }

    /// Wait for the interview to end and return its report.
    pub async fn finished(mut self) -> Result<SessionReport> {
        let Some(task) = self.task.take() else {
            return Err(SessionError::Aborted("session already awaited".into()));
        };
        task.await.map_err(|e| SessionError::Aborted(e.to_string()))
    }
}

impl Drop for InterviewSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.resources.release();
    }
}
