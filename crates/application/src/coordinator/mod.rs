//! Turn coordinator: the single owner of interview state.
//!
//! Every input reaches the coordinator as a [`CoordinatorEvent`] on one
//! channel, so state changes are serialized without locks. Speech, generation
//! and advance timers run as spawned tasks that report back through the same
//! channel, tagged with the [`Epoch`] they were started in.

mod queue;
mod state;

pub use queue::PendingQueue;
pub use state::{Epoch, SpeechPurpose, TurnSnapshot, TurnState};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use virtuoso_events::{
    event_names, publish, DeviceErrorEvent, DropReason, EventBusRef, PartialTranscriptEvent,
    SessionFinishedEvent, TranscriptMessageEvent, TurnStateChangedEvent, UtteranceDroppedEvent,
};
use virtuoso_silence::{SilenceDecision, SilenceDetector};
use virtuoso_speech::{InputEvent, SpeechError, SpeechOutputChannel, TranscriptUpdate};
use virtuoso_template::InterviewTemplate;
use virtuoso_transcript::{
    CallRecord, ConversationHistory, Sender, Transcript, TranscriptMessage,
};

use crate::processor::{GeneratedReply, ResponseProcessor, TurnStart};
use crate::session::{SessionOutcome, SessionReport};
use crate::settings::{AdvanceMode, InterviewSettings};

pub(crate) enum CoordinatorEvent {
    Input(InputEvent),
    SpeechDone {
        epoch: Epoch,
        purpose: SpeechPurpose,
        result: Result<(), SpeechError>,
    },
    ReplyReady {
        epoch: Epoch,
        processing_id: Uuid,
        reply: GeneratedReply,
    },
    AdvanceDue {
        epoch: Epoch,
    },
    NextQuestion,
}

fn is_retryable(error: &SpeechError) -> bool {
    !error.is_fatal() && !matches!(error, SpeechError::Interrupted | SpeechError::Closed)
}

pub(crate) struct Coordinator {
    session_id: Uuid,
    template: Arc<InterviewTemplate>,
    settings: InterviewSettings,
    output: Arc<SpeechOutputChannel>,
    processor: ResponseProcessor,
    bus: EventBusRef,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    snapshot: watch::Sender<TurnSnapshot>,

    state: TurnState,
    epoch: Epoch,
    question_index: usize,
    questions_asked: usize,
    processing_id: Option<Uuid>,
    detector: SilenceDetector,
    pending: PendingQueue,
    history: ConversationHistory,
    transcript: Transcript,
    tasks: Vec<JoinHandle<()>>,

    started_at: Instant,
    listening_since: Instant,
    /// Listening was re-entered because the candidate spoke during the
    /// advance delay.
    interrupted_advance: bool,
    /// The fallback is being spoken in place of a reply that failed.
    reply_recovery: bool,
    wrapping_up: bool,
    outcome: Option<SessionOutcome>,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: Uuid,
        template: Arc<InterviewTemplate>,
        settings: InterviewSettings,
        output: Arc<SpeechOutputChannel>,
        processor: ResponseProcessor,
        bus: EventBusRef,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
        snapshot: watch::Sender<TurnSnapshot>,
    ) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            detector: SilenceDetector::new(settings.silence),
            template,
            settings,
            output,
            processor,
            bus,
            events,
            snapshot,
            state: TurnState::Idle,
            epoch: Epoch::default(),
            question_index: 0,
            questions_asked: 0,
            processing_id: None,
            pending: PendingQueue::new(),
            history: ConversationHistory::new(),
            transcript: Transcript::new(session_id),
            tasks: Vec::new(),
            started_at: now,
            listening_since: now,
            interrupted_advance: false,
            reply_recovery: false,
            wrapping_up: false,
            outcome: None,
        }
    }

    /// Drive the interview until it finishes, is cancelled or hits a device
    /// error.
    pub(crate) async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<CoordinatorEvent>,
        cancel: CancellationToken,
    ) -> SessionReport {
        self.started_at = Instant::now();
        tracing::info!(
            template = %self.template.id,
            questions = self.template.question_count(),
            "Interview started"
        );
        self.add_message(Sender::System, format!("Interview started: {}", self.template.title));

        let intro = self.template.intro_script.clone();
        self.speak(SpeechPurpose::Intro, intro);

        let mut ticker = tokio::time::interval(self.settings.silence.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.state.is_finished() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("Interview cancelled");
                    self.output.cancel();
                    self.finish(SessionOutcome::Cancelled);
                }

                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => self.finish(SessionOutcome::Cancelled),
                },

                _ = ticker.tick() => self.on_tick(),
            }
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.into_report()
    }

    fn handle(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Input(InputEvent::Transcript(update)) => self.on_transcript(update),
            CoordinatorEvent::Input(InputEvent::Error(error)) => self.on_input_error(error),
            CoordinatorEvent::SpeechDone {
                epoch,
                purpose,
                result,
            } => {
                if self.is_stale(epoch, "speech") {
                    return;
                }
                self.on_speech_done(purpose, result);
            }
            CoordinatorEvent::ReplyReady {
                epoch,
                processing_id,
                reply,
            } => {
                if self.is_stale(epoch, "reply") || self.processing_id != Some(processing_id) {
                    return;
                }
                self.on_reply(reply);
            }
            CoordinatorEvent::AdvanceDue { epoch } => {
                if self.is_stale(epoch, "advance timer") {
                    return;
                }
                if self.state == TurnState::AwaitingAdvance {
                    self.advance();
                }
            }
            CoordinatorEvent::NextQuestion => {
                if self.state.floor_is_free() {
                    tracing::info!(question = self.question_index, "Advancing on request");
                    self.advance();
                } else {
                    tracing::debug!(state = %self.state, "Ignoring next-question request");
                }
            }
        }
    }

    fn is_stale(&self, epoch: Epoch, what: &str) -> bool {
        if epoch != self.epoch {
            tracing::debug!(
                what,
                epoch = epoch.value(),
                current = self.epoch.value(),
                "Discarding stale completion"
            );
            return true;
        }
        false
    }

    fn transition(&mut self, next: TurnState) {
        self.epoch = self.epoch.next();
        self.state = next;
        self.interrupted_advance = false;
        if next == TurnState::Listening {
            self.listening_since = Instant::now();
        }

        let snapshot = TurnSnapshot {
            state: next,
            epoch: self.epoch,
            question_index: self.question_index,
        };
        self.snapshot.send_replace(snapshot);

        tracing::debug!(
            state = %next,
            epoch = self.epoch.value(),
            question = self.question_index,
            "Turn state changed"
        );
        publish(
            self.bus.as_ref(),
            event_names::STATE_CHANGED,
            &TurnStateChangedEvent {
                session_id: self.session_id,
                state: next.name(),
                epoch: self.epoch.value(),
                question_index: self.question_index,
            },
        );
    }

    fn spawn(&mut self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(tokio::spawn(task));
    }

    fn add_message(&mut self, sender: Sender, text: impl Into<String>) {
        let message = TranscriptMessage::new(sender, text);
        publish(
            self.bus.as_ref(),
            event_names::TRANSCRIPT_MESSAGE,
            &TranscriptMessageEvent {
                session_id: self.session_id,
                message: message.clone(),
            },
        );
        self.transcript.push(message);
    }

    fn drop_utterance(&mut self, text: String, reason: DropReason) {
        tracing::debug!(?reason, "Utterance dropped");
        publish(
            self.bus.as_ref(),
            event_names::UTTERANCE_DROPPED,
            &UtteranceDroppedEvent {
                session_id: self.session_id,
                text,
                reason,
            },
        );
        self.resume_interrupted_advance();
    }

    // ------------------------------------------------------------------
    // Speaking
    // ------------------------------------------------------------------

    fn speak(&mut self, purpose: SpeechPurpose, text: String) {
        if !matches!(purpose, SpeechPurpose::Reply) {
            if let Err(e) = self.history.push_prompt(text.clone()) {
                tracing::warn!(purpose = purpose.name(), "Prompt not added to history: {}", e);
            }
        }
        if !text.trim().is_empty() {
            self.add_message(Sender::Ai, text.clone());
        }

        self.transition(TurnState::Speaking(purpose));

        let epoch = self.epoch;
        let output = Arc::clone(&self.output);
        let voice = self.template.ai_voice.clone();
        let retry = self.settings.retry_failed_speech;
        let events = self.events.clone();
        self.spawn(async move {
            let mut result = output.speak(&text, &voice).await;
            if let Err(e) = result.clone() {
                if retry && is_retryable(&e) {
                    tracing::warn!(purpose = purpose.name(), "Retrying speech after error: {}", e);
                    result = output.speak(&text, &voice).await;
                }
            }
            let _ = events.send(CoordinatorEvent::SpeechDone {
                epoch,
                purpose,
                result,
            });
        });
    }

    fn on_speech_done(&mut self, purpose: SpeechPurpose, result: Result<(), SpeechError>) {
        if let Err(e) = result {
            if e.is_fatal() {
                self.fail_device(e);
                return;
            }
            tracing::warn!(purpose = purpose.name(), "Speech failed, continuing: {}", e);
            if purpose == SpeechPurpose::Reply && is_retryable(&e) && self.speak_reply_fallback() {
                return;
            }
        }

        match purpose {
            SpeechPurpose::Intro => self.ask_question(0),
            SpeechPurpose::Question(_) => self.start_listening(),
            SpeechPurpose::Reply => {
                self.reply_recovery = false;
                self.after_reply();
            }
            SpeechPurpose::Outro => self.finish(SessionOutcome::Completed),
        }
    }

    /// Speak the fallback once in place of a reply that could not be
    /// spoken. The committed reply stays in history.
    fn speak_reply_fallback(&mut self) -> bool {
        if self.reply_recovery {
            return false;
        }
        self.reply_recovery = true;
        self.add_message(Sender::System, "Reply could not be spoken; asked a follow-up instead");
        let fallback = self.settings.processor.fallback_reply.clone();
        self.speak(SpeechPurpose::Reply, fallback);
        true
    }

    fn ask_question(&mut self, index: usize) {
        let Some(question) = self.template.question(index) else {
            self.speak_outro();
            return;
        };
        let text = question.question.clone();
        self.question_index = index;
        self.questions_asked += 1;
        tracing::info!(question = index, id = %question.id, "Asking question");
        self.speak(SpeechPurpose::Question(index), text);
    }

    fn speak_outro(&mut self) {
        self.detector.reset();
        self.pending.clear();
        let outro = self.template.outro_script.clone();
        self.speak(SpeechPurpose::Outro, outro);
    }

    // ------------------------------------------------------------------
    // Listening
    // ------------------------------------------------------------------

    fn start_listening(&mut self) {
        if self.wrapping_up {
            self.speak_outro();
            return;
        }
        self.transition(TurnState::Listening);
    }

    fn on_transcript(&mut self, update: TranscriptUpdate) {
        if !self.state.is_accepting_speech() {
            tracing::debug!(state = %self.state, "Dropping transcript outside a listening state");
            return;
        }

        let now = Instant::now().into_std();
        self.detector.record(&update.text, update.is_final, now);
        publish(
            self.bus.as_ref(),
            event_names::PARTIAL_TRANSCRIPT,
            &PartialTranscriptEvent {
                session_id: self.session_id,
                text: update.text,
                is_final: update.is_final,
            },
        );

        if self.state == TurnState::AwaitingAdvance {
            // The candidate is still talking; cancels the advance timer.
            self.transition(TurnState::Listening);
            self.interrupted_advance = true;
        }
    }

    fn on_input_error(&mut self, error: SpeechError) {
        if error.is_fatal() {
            self.fail_device(error);
        } else {
            tracing::warn!("Recognition error, continuing: {}", error);
        }
    }

    fn on_tick(&mut self) {
        let now = Instant::now();

        if self.state.is_accepting_speech() {
            match self
                .detector
                .evaluate(now.into_std(), self.state.floor_is_free())
            {
                SilenceDecision::Idle | SilenceDecision::Waiting { .. } => {}
                SilenceDecision::TooShort { text } => {
                    self.drop_utterance(text, DropReason::TooShort)
                }
                SilenceDecision::Ready(utterance) => {
                    tracing::debug!(chars = utterance.text.len(), "Utterance finalized");
                    self.handle_utterance(utterance.text);
                }
                SilenceDecision::Contended(utterance) => {
                    tracing::debug!(
                        pending = self.pending.len() + 1,
                        "Floor busy, queueing utterance"
                    );
                    self.pending.push(utterance.text);
                }
            }
        }

        if !self.wrapping_up {
            if let Some(limit) = self.template.session_duration() {
                if now.duration_since(self.started_at) >= limit {
                    tracing::info!(?limit, "Interview time is up");
                    self.wrapping_up = true;
                }
            }
        }

        let floor_free = self.state.floor_is_free() && !self.detector.has_pending_speech();
        if self.wrapping_up && floor_free {
            self.speak_outro();
            return;
        }

        let max_response = self.template.max_response_time();
        if self.state == TurnState::Listening
            && !max_response.is_zero()
            && !self.detector.has_pending_speech()
            && now.duration_since(self.listening_since) >= max_response
        {
            tracing::info!(
                question = self.question_index,
                secs = max_response.as_secs(),
                "No answer in time, moving on"
            );
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------

    /// Returns true when processing started.
    fn handle_utterance(&mut self, text: String) -> bool {
        let started = self.processor.start_turn(
            &text,
            &mut self.history,
            self.template.question(self.question_index),
        );
        let (accepted, reply) = match started {
            Ok(TurnStart::Generating { text, reply }) => (text, reply),
            Ok(TurnStart::Duplicate) => {
                self.drop_utterance(text, DropReason::Duplicate);
                return false;
            }
            Ok(TurnStart::Empty) => {
                self.drop_utterance(text, DropReason::Empty);
                return false;
            }
            Err(e) => {
                tracing::warn!("User turn rejected: {}", e);
                return false;
            }
        };
        self.add_message(Sender::User, accepted);

        let processing_id = Uuid::new_v4();
        self.processing_id = Some(processing_id);
        self.transition(TurnState::Processing);

        let epoch = self.epoch;
        let events = self.events.clone();
        self.spawn(async move {
            let reply = reply.await;
            let _ = events.send(CoordinatorEvent::ReplyReady {
                epoch,
                processing_id,
                reply,
            });
        });
        true
    }

    fn on_reply(&mut self, reply: GeneratedReply) {
        self.processing_id = None;
        self.reply_recovery = false;
        if reply.fallback {
            self.add_message(Sender::System, "Reply generation failed; asked a follow-up instead");
        }
        if let Err(e) = self.processor.finish_turn(&mut self.history, &reply) {
            tracing::warn!("Reply not added to history: {}", e);
        }
        self.speak(SpeechPurpose::Reply, reply.text);
    }

    fn after_reply(&mut self) {
        if self.wrapping_up {
            self.speak_outro();
            return;
        }

        while let Some(text) = self.pending.pop() {
            if self.handle_utterance(text) {
                return;
            }
        }

        self.await_advance();
    }

    /// Speech that interrupted the advance delay came to nothing.
    fn resume_interrupted_advance(&mut self) {
        if self.state == TurnState::Listening
            && self.interrupted_advance
            && !self.detector.has_pending_speech()
        {
            tracing::debug!("Interrupting speech was dropped, resuming advance");
            self.await_advance();
        }
    }

    fn await_advance(&mut self) {
        self.transition(TurnState::AwaitingAdvance);
        match self.settings.advance {
            AdvanceMode::Auto { delay_ms } => {
                let epoch = self.epoch;
                let events = self.events.clone();
                self.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    let _ = events.send(CoordinatorEvent::AdvanceDue { epoch });
                });
            }
            AdvanceMode::Manual => {}
        }
    }

    fn advance(&mut self) {
        self.detector.reset();
        self.pending.clear();
        if self.wrapping_up || self.template.is_last_question(self.question_index) {
            self.speak_outro();
        } else {
            self.ask_question(self.question_index + 1);
        }
    }

    // ------------------------------------------------------------------
    // Ending
    // ------------------------------------------------------------------

    fn fail_device(&mut self, error: SpeechError) {
        tracing::error!("Speech device failure, ending interview: {}", error);
        self.output.cancel();
        self.add_message(Sender::System, format!("Audio device error: {error}"));
        publish(
            self.bus.as_ref(),
            event_names::DEVICE_ERROR,
            &DeviceErrorEvent {
                session_id: self.session_id,
                error: error.to_string(),
                permission_denied: error == SpeechError::PermissionDenied,
            },
        );
        self.finish(SessionOutcome::DeviceError(error.to_string()));
    }

    fn finish(&mut self, outcome: SessionOutcome) {
        if self.state.is_finished() {
            return;
        }
        self.processing_id = None;
        self.transition(TurnState::Finished);

        let duration_ms = self.started_at.elapsed().as_millis() as u64;
        tracing::info!(
            outcome = outcome.as_str(),
            duration_ms,
            questions = self.questions_asked,
            "Interview finished"
        );
        publish(
            self.bus.as_ref(),
            event_names::SESSION_FINISHED,
            &SessionFinishedEvent {
                session_id: self.session_id,
                outcome: outcome.as_str().to_string(),
                duration_ms,
                questions_asked: self.questions_asked,
            },
        );
        self.outcome = Some(outcome);
    }

    fn into_report(self) -> SessionReport {
        let duration_ms = self.started_at.elapsed().as_millis() as u64;
        let record = CallRecord::from_transcript(&self.transcript, duration_ms);
        SessionReport {
            session_id: self.session_id,
            outcome: self.outcome.unwrap_or(SessionOutcome::Cancelled),
            questions_asked: self.questions_asked,
            history: self.history,
            transcript: self.transcript,
            record,
        }
    }
}
