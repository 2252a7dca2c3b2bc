//! End-to-end interview flows against scripted speech and generation engines.
//!
//! Every test runs on a paused tokio clock, so silence thresholds, playback
//! waits and advance delays elapse instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use virtuoso_application::{
    AdvanceMode, InterviewSession, InterviewSettings, SessionDeps, SessionError, SessionOutcome,
    SessionReport, SpeechPurpose, TurnSnapshot, TurnState, DEFAULT_FALLBACK_REPLY,
};
use virtuoso_events::{event_names, InMemoryEventBus};
use virtuoso_llm::testing::ScriptedGenerator;
use virtuoso_llm::GenerationError;
use virtuoso_speech::testing::{ScriptedRecognizer, ScriptedSynthesizer};
use virtuoso_speech::SpeechError;
use virtuoso_template::{InterviewTemplate, Question};
use virtuoso_transcript::{Role, Sender};

const INTRO: &str = "Welcome to the interview.";
const Q1: &str = "Tell me about Apex triggers.";
const Q2: &str = "When would you use a flow instead?";
const OUTRO: &str = "Thanks, that's all.";

fn question(id: &str, text: &str) -> Question {
    Question {
        id: id.into(),
        question: text.into(),
        expected_keywords: vec!["bulkification".into()],
        follow_up: None,
    }
}

fn template() -> InterviewTemplate {
    InterviewTemplate {
        id: "test".into(),
        title: "Test interview".into(),
        questions: vec![question("q1", Q1), question("q2", Q2)],
        intro_script: INTRO.into(),
        outro_script: OUTRO.into(),
        ai_voice: "en-US-JennyNeural".into(),
        duration: 0,
        max_response_time: 120,
    }
}

fn manual() -> InterviewSettings {
    InterviewSettings {
        advance: AdvanceMode::Manual,
        ..Default::default()
    }
}

struct Rig {
    synth: Arc<ScriptedSynthesizer>,
    recognizer: Arc<ScriptedRecognizer>,
    generator: Arc<ScriptedGenerator>,
    bus: Arc<InMemoryEventBus>,
}

impl Rig {
    fn new() -> Self {
        Self::with_synth(ScriptedSynthesizer::new())
    }

    fn with_synth(synth: ScriptedSynthesizer) -> Self {
        Self::with(synth, Arc::new(ScriptedRecognizer::new()), ScriptedGenerator::new())
    }

    fn with(
        synth: ScriptedSynthesizer,
        recognizer: Arc<ScriptedRecognizer>,
        generator: ScriptedGenerator,
    ) -> Self {
        Self {
            synth: Arc::new(synth),
            recognizer,
            generator: Arc::new(generator),
            bus: Arc::new(InMemoryEventBus::new()),
        }
    }

    fn deps(&self) -> SessionDeps {
        SessionDeps {
            synthesizer: self.synth.clone(),
            recognizer: self.recognizer.clone(),
            generator: self.generator.clone(),
            bus: self.bus.clone(),
        }
    }

    async fn start(&self, template: InterviewTemplate, settings: InterviewSettings) -> InterviewSession {
        InterviewSession::start(Arc::new(template), settings, self.deps())
            .await
            .expect("session starts")
    }
}

async fn wait_until(
    states: &mut watch::Receiver<TurnSnapshot>,
    mut pred: impl FnMut(&TurnSnapshot) -> bool,
) -> TurnSnapshot {
    let snapshot = tokio::time::timeout(Duration::from_secs(3600), states.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for state")
        .expect("session ended before reaching state");
    *snapshot
}

fn listening_on(index: usize) -> impl FnMut(&TurnSnapshot) -> bool {
    move |s| s.state == TurnState::Listening && s.question_index == index
}

fn is_state(state: TurnState) -> impl FnMut(&TurnSnapshot) -> bool {
    move |s| s.state == state
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn replies_follow_user_turns(report: &SessionReport) -> bool {
    let turns = report.history.turns();
    turns.windows(2).all(|w| !(w[0].role == Role::User && w[1].role == Role::User))
}

/// Intro, two questions, one noisy "um", then the outro.
async fn two_question_scenario(rig: &Rig) -> SessionReport {
    rig.generator
        .push_reply("Thank you for your response, triggers are a solid start.");

    let session = rig.start(template(), InterviewSettings::default()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer.emit_partial("I");
    rig.recognizer.emit_partial("I used");
    rig.recognizer.emit_final("I used Apex triggers");

    wait_until(&mut states, listening_on(1)).await;
    rig.recognizer.emit_final("um");
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(session.snapshot().state, TurnState::Listening);
    assert_eq!(rig.generator.request_count(), 1);

    rig.recognizer
        .emit_final("I prefer declarative flows for simple automation");
    wait_until(&mut states, is_state(TurnState::Finished)).await;

    session.finished().await.expect("session report")
}

#[tokio::test(start_paused = true)]
async fn test_two_question_interview_end_to_end() {
    let rig = Rig::new();
    let report = two_question_scenario(&rig).await;

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.questions_asked, 2);
    assert_eq!(
        rig.synth.spoken(),
        strings(&[
            INTRO,
            Q1,
            "Triggers are a solid start.",
            Q2,
            "Could you tell me a bit more about that?",
            OUTRO,
        ])
    );

    let requests = rig.generator.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages.len(), 3);
    assert_eq!(requests[0].messages[2].content, "I used Apex triggers");
    assert!(requests[0].system_prompt.contains(Q1));
    assert!(requests[1].system_prompt.contains(Q2));

    let turns = report.history.turns();
    assert_eq!(turns.len(), 8);
    assert_eq!(turns[2].role, Role::User);
    assert_eq!(turns[5].content, "I prefer declarative flows for simple automation");
    assert_eq!(turns[7].content, OUTRO);
    assert!(replies_follow_user_turns(&report));

    let dropped = rig.bus.payloads_for(event_names::UTTERANCE_DROPPED);
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0]["text"], "um");
    assert_eq!(dropped[0]["reason"], "too_short");

    assert_eq!(rig.recognizer.stop_count(), 1);
    assert_eq!(rig.synth.close_count(), 1);
    assert_eq!(rig.bus.count(event_names::SESSION_FINISHED), 1);
    assert!(report.record.transcript_text.starts_with(&format!("AI: {INTRO}")));
    assert!(report
        .record
        .transcript_text
        .contains("User: I used Apex triggers"));
}

#[tokio::test(start_paused = true)]
async fn test_replaying_inputs_gives_identical_history() {
    let first = two_question_scenario(&Rig::new()).await;
    let second = two_question_scenario(&Rig::new()).await;
    assert_eq!(first.history, second.history);
}

#[tokio::test(start_paused = true)]
async fn test_interviewer_speech_is_never_heard_as_an_answer() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let echo = Arc::clone(&recognizer);
    let synth = ScriptedSynthesizer::new().on_synthesize(move |text| {
        echo.emit_final(&format!("echo {text}"));
    });
    let rig = Rig::with(synth, recognizer, ScriptedGenerator::new());

    let report = two_question_scenario(&rig).await;

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert!(report
        .history
        .turns()
        .iter()
        .all(|t| !t.content.starts_with("echo")));
    assert!(rig
        .bus
        .payloads_for(event_names::PARTIAL_TRANSCRIPT)
        .iter()
        .all(|p| !p["text"].as_str().unwrap_or_default().starts_with("echo")));
}

#[tokio::test(start_paused = true)]
async fn test_state_changes_never_overlap_speaking_and_listening() {
    let rig = Rig::new();
    two_question_scenario(&rig).await;

    let states: Vec<String> = rig
        .bus
        .payloads_for(event_names::STATE_CHANGED)
        .iter()
        .map(|p| p["state"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(states.first().map(String::as_str), Some("speaking:intro"));
    assert_eq!(states.last().map(String::as_str), Some("finished"));
    // Every reply is followed by either more processing or a pause before advancing.
    for pair in states.windows(2) {
        if pair[0] == "speaking:reply" {
            assert!(
                pair[1] == "awaiting_advance" || pair[1] == "processing",
                "unexpected transition {pair:?}"
            );
        }
    }

    let epochs: Vec<u64> = rig
        .bus
        .payloads_for(event_names::STATE_CHANGED)
        .iter()
        .filter_map(|p| p["epoch"].as_u64())
        .collect();
    assert!(epochs.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_utterance_produces_one_reply() {
    let rig = Rig::new();
    let session = rig.start(template(), manual()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer.emit_final("I used Apex triggers");
    wait_until(&mut states, is_state(TurnState::AwaitingAdvance)).await;

    rig.recognizer.emit_final("I used Apex triggers");
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(session.snapshot().state, TurnState::AwaitingAdvance);

    session.shutdown();
    let report = session.finished().await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(rig.generator.request_count(), 1);
    let user_turns = report
        .history
        .turns()
        .iter()
        .filter(|t| t.role == Role::User)
        .count();
    assert_eq!(user_turns, 1);

    let dropped = rig.bus.payloads_for(event_names::UTTERANCE_DROPPED);
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0]["reason"], "duplicate");
}

#[tokio::test(start_paused = true)]
async fn test_generation_failure_uses_one_fallback_and_keeps_listening() {
    let rig = Rig::new();
    rig.generator
        .push_failure(GenerationError::Transport("connection reset".into()));
    let session = rig.start(template(), manual()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer.emit_final("I used Apex triggers");
    let after_fallback = wait_until(&mut states, is_state(TurnState::AwaitingAdvance)).await;
    assert_eq!(
        rig.synth.spoken().last().map(String::as_str),
        Some(DEFAULT_FALLBACK_REPLY)
    );

    rig.recognizer.emit_final("Mostly for validation logic");
    wait_until(&mut states, |s| {
        s.state == TurnState::AwaitingAdvance && s.epoch > after_fallback.epoch
    })
    .await;

    session.shutdown();
    let report = session.finished().await.unwrap();

    let fallbacks = report
        .history
        .turns()
        .iter()
        .filter(|t| t.content == DEFAULT_FALLBACK_REPLY)
        .count();
    assert_eq!(fallbacks, 1);
    assert_eq!(report.history.len(), 6);
    assert_eq!(rig.generator.request_count(), 2);
    assert!(replies_follow_user_turns(&report));
    assert!(report
        .transcript
        .spoken_by(Sender::System)
        .any(|m| m.text.contains("Reply generation failed")));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_intro_releases_devices_once() {
    let rig = Rig::with_synth(
        ScriptedSynthesizer::new().with_audio_duration(Some(Duration::from_secs(8))),
    );
    let session = rig.start(template(), InterviewSettings::default()).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        session.snapshot().state,
        TurnState::Speaking(SpeechPurpose::Intro)
    );

    session.shutdown();
    session.shutdown();
    let report = session.finished().await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(rig.synth.spoken(), strings(&[INTRO]));
    assert_eq!(rig.recognizer.stop_count(), 1);
    assert_eq!(rig.synth.close_count(), 1);
    assert!(!rig.recognizer.is_running());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(rig.synth.spoken(), strings(&[INTRO]));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_session_releases_devices_once() {
    let rig = Rig::with_synth(
        ScriptedSynthesizer::new().with_audio_duration(Some(Duration::from_secs(8))),
    );
    let session = rig.start(template(), InterviewSettings::default()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    drop(session);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(rig.recognizer.stop_count(), 1);
    assert_eq!(rig.synth.close_count(), 1);
    assert_eq!(rig.synth.spoken(), strings(&[INTRO]));
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_at_start() {
    let rig = Rig::new();
    rig.recognizer.fail_next_start(SpeechError::PermissionDenied);

    let result = InterviewSession::start(
        Arc::new(template()),
        InterviewSettings::default(),
        rig.deps(),
    )
    .await;

    assert!(matches!(
        result,
        Err(SessionError::Device(SpeechError::PermissionDenied))
    ));
    assert!(rig.synth.spoken().is_empty());
    assert_eq!(rig.synth.close_count(), 1);
    assert_eq!(rig.recognizer.stop_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_device_failure_mid_interview_skips_outro() {
    let rig = Rig::new();
    let session = rig.start(template(), InterviewSettings::default()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer
        .emit_error(SpeechError::DeviceUnavailable("microphone unplugged".into()));
    wait_until(&mut states, is_state(TurnState::Finished)).await;
    let report = session.finished().await.unwrap();

    assert!(matches!(report.outcome, SessionOutcome::DeviceError(ref e) if e.contains("unplugged")));
    assert_eq!(rig.synth.spoken(), strings(&[INTRO, Q1]));
    assert_eq!(rig.bus.count(event_names::DEVICE_ERROR), 1);
    assert_eq!(rig.recognizer.stop_count(), 1);
    assert_eq!(rig.synth.close_count(), 1);
    assert!(report
        .transcript
        .spoken_by(Sender::System)
        .any(|m| m.text.contains("microphone unplugged")));
}

#[tokio::test(start_paused = true)]
async fn test_transient_recognition_error_is_tolerated() {
    let rig = Rig::new();
    let session = rig.start(template(), manual()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer
        .emit_error(SpeechError::Recognition("websocket reset".into()));
    rig.recognizer.emit_final("I used Apex triggers");
    wait_until(&mut states, is_state(TurnState::AwaitingAdvance)).await;

    session.shutdown();
    let report = session.finished().await.unwrap();
    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(rig.bus.count(event_names::DEVICE_ERROR), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_mode_waits_for_next_question() {
    let rig = Rig::new();
    let session = rig.start(template(), manual()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer.emit_final("I used Apex triggers");
    wait_until(&mut states, is_state(TurnState::AwaitingAdvance)).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, TurnState::AwaitingAdvance);
    assert_eq!(snapshot.question_index, 0);

    session.next_question();
    wait_until(&mut states, listening_on(1)).await;

    session.next_question();
    wait_until(&mut states, is_state(TurnState::Finished)).await;
    let report = session.finished().await.unwrap();
    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(rig.synth.spoken().last().map(String::as_str), Some(OUTRO));
}

#[tokio::test(start_paused = true)]
async fn test_speaking_again_cancels_the_advance_timer() {
    let rig = Rig::new();
    let session = rig.start(template(), InterviewSettings::default()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer.emit_final("I used Apex triggers");
    let first = wait_until(&mut states, is_state(TurnState::AwaitingAdvance)).await;

    rig.recognizer
        .emit_partial("And one more thing about bulkification");
    tokio::time::sleep(Duration::from_secs(3)).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, TurnState::Listening);
    assert_eq!(snapshot.question_index, 0);

    wait_until(&mut states, |s| {
        s.state == TurnState::AwaitingAdvance && s.epoch > first.epoch
    })
    .await;
    assert_eq!(rig.generator.request_count(), 2);

    session.shutdown();
    session.finished().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_repeated_answer_during_advance_delay_still_advances() {
    let rig = Rig::new();
    let mut template = template();
    template.max_response_time = 0;
    let session = rig.start(template, InterviewSettings::default()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer.emit_final("I used Apex triggers");
    wait_until(&mut states, is_state(TurnState::AwaitingAdvance)).await;

    rig.recognizer.emit_final("I used Apex triggers");
    wait_until(&mut states, listening_on(1)).await;

    assert_eq!(rig.generator.request_count(), 1);
    let dropped = rig.bus.payloads_for(event_names::UTTERANCE_DROPPED);
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0]["reason"], "duplicate");

    session.shutdown();
    session.finished().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_noise_during_advance_delay_still_advances() {
    let rig = Rig::new();
    let mut template = template();
    template.max_response_time = 0;
    let session = rig.start(template, InterviewSettings::default()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer.emit_final("I used Apex triggers");
    let first = wait_until(&mut states, is_state(TurnState::AwaitingAdvance)).await;

    rig.recognizer.emit_final("um");
    let resumed = wait_until(&mut states, |s| {
        s.state == TurnState::AwaitingAdvance && s.epoch > first.epoch
    })
    .await;
    assert_eq!(resumed.question_index, 0);
    wait_until(&mut states, listening_on(1)).await;

    assert_eq!(rig.generator.request_count(), 1);
    let dropped = rig.bus.payloads_for(event_names::UTTERANCE_DROPPED);
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0]["reason"], "too_short");

    session.shutdown();
    session.finished().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_utterance_during_processing_is_queued() {
    let rig = Rig::with(
        ScriptedSynthesizer::new(),
        Arc::new(ScriptedRecognizer::new()),
        ScriptedGenerator::new().with_latency(Duration::from_secs(10)),
    );
    rig.generator.push_reply("Noted.");
    rig.generator.push_reply("Batch Apex is a good fit there.");
    let session = rig.start(template(), manual()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.recognizer.emit_final("I used Apex triggers");
    wait_until(&mut states, is_state(TurnState::Processing)).await;

    rig.recognizer
        .emit_final("Also batch Apex for large data volumes");
    wait_until(&mut states, is_state(TurnState::AwaitingAdvance)).await;

    session.shutdown();
    let report = session.finished().await.unwrap();

    let contents: Vec<&str> = report
        .history
        .turns()
        .iter()
        .map(|t| t.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec![
            INTRO,
            Q1,
            "I used Apex triggers",
            "Noted.",
            "Also batch Apex for large data volumes",
            "Batch Apex is a good fit there.",
        ]
    );
    assert_eq!(rig.generator.requests()[1].messages.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_questions_time_out() {
    let rig = Rig::new();
    let mut template = template();
    template.max_response_time = 10;
    let session = rig.start(template, InterviewSettings::default()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, is_state(TurnState::Finished)).await;
    let report = session.finished().await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(rig.synth.spoken(), strings(&[INTRO, Q1, Q2, OUTRO]));
    assert!(report.history.turns().iter().all(|t| t.role == Role::Assistant));
    assert_eq!(rig.generator.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_session_time_limit_moves_to_outro() {
    let rig = Rig::new();
    let mut template = template();
    template.duration = 1;
    template.max_response_time = 0;
    let session = rig.start(template, InterviewSettings::default()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    wait_until(&mut states, is_state(TurnState::Finished)).await;
    let report = session.finished().await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(rig.synth.spoken(), strings(&[INTRO, Q1, OUTRO]));
    assert!(report.record.duration_ms >= 60_000);
}

#[tokio::test(start_paused = true)]
async fn test_failed_speech_is_retried_once() {
    let rig = Rig::new();
    rig.synth.fail_next(SpeechError::Synthesis("tts returned 500".into()));
    let session = rig.start(template(), manual()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    assert_eq!(rig.synth.spoken(), strings(&[INTRO, INTRO, Q1]));

    session.shutdown();
    session.finished().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unspeakable_reply_is_replaced_by_fallback() {
    let rig = Rig::new();
    rig.generator.push_reply("Triggers are a solid start.");
    let session = rig.start(template(), manual()).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    rig.synth.fail_next(SpeechError::Synthesis("tts returned 500".into()));
    rig.synth.fail_next(SpeechError::Synthesis("tts returned 500".into()));
    rig.recognizer.emit_final("I used Apex triggers");
    wait_until(&mut states, is_state(TurnState::AwaitingAdvance)).await;

    assert_eq!(
        rig.synth.spoken(),
        strings(&[
            INTRO,
            Q1,
            "Triggers are a solid start.",
            "Triggers are a solid start.",
            DEFAULT_FALLBACK_REPLY,
        ])
    );

    session.shutdown();
    let report = session.finished().await.unwrap();

    assert_eq!(report.history.len(), 4);
    assert!(replies_follow_user_turns(&report));
    assert!(report
        .transcript
        .spoken_by(Sender::System)
        .any(|m| m.text.contains("Reply could not be spoken")));
}

#[tokio::test(start_paused = true)]
async fn test_speech_failure_without_retry_moves_on() {
    let rig = Rig::new();
    rig.synth.fail_next(SpeechError::Synthesis("tts returned 500".into()));
    let settings = InterviewSettings {
        retry_failed_speech: false,
        ..manual()
    };
    let session = rig.start(template(), settings).await;
    let mut states = session.subscribe();

    wait_until(&mut states, listening_on(0)).await;
    assert_eq!(rig.synth.spoken(), strings(&[INTRO, Q1]));

    session.shutdown();
    let report = session.finished().await.unwrap();
    assert_eq!(report.outcome, SessionOutcome::Cancelled);
}
