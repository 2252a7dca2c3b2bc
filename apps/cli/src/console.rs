//! Terminal stand-ins for the speech engines.
//!
//! The interviewer's lines are printed to stdout and each line typed on
//! stdin is treated as a recognized utterance. Lines starting with `/` are
//! console commands and never reach the interview.

use std::io::BufRead;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use virtuoso_speech::{
    RecognitionEvent, SpeechError, SpeechRecognizer, SpeechSynthesizer, Synthesis,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Next,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
enum ConsoleLine {
    Command(ConsoleCommand),
    Speech(String),
    Ignored,
}

fn parse_line(line: &str) -> ConsoleLine {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleLine::Ignored;
    }
    match line {
        "/next" | "/n" => ConsoleLine::Command(ConsoleCommand::Next),
        "/quit" | "/q" => ConsoleLine::Command(ConsoleCommand::Quit),
        other if other.starts_with('/') => {
            tracing::warn!("Unknown command: {}", other);
            ConsoleLine::Ignored
        }
        other => ConsoleLine::Speech(other.to_string()),
    }
}

/// Prints the interviewer's lines. Reports no audio duration so playback
/// time is estimated from the text.
#[derive(Debug, Default)]
pub struct ConsoleSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    fn name(&self) -> &str {
        "console"
    }

    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Synthesis, SpeechError> {
        let mut stdout = tokio::io::stdout();
        let line = format!("\nInterviewer: {text}\n> ");
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SpeechError::DeviceUnavailable(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| SpeechError::DeviceUnavailable(e.to_string()))?;
        Ok(Synthesis::default())
    }

    fn cancel(&self) {}

    fn close(&self) {
        tracing::debug!("Console output closed");
    }
}

/// Reads candidate answers from stdin.
///
/// Stdin is read on a dedicated thread so a pending read never holds up
/// runtime shutdown.
pub struct StdinRecognizer {
    lines: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    commands: mpsc::UnboundedSender<ConsoleCommand>,
    reader: Mutex<Option<CancellationToken>>,
}

impl StdinRecognizer {
    pub fn spawn() -> (Self, mpsc::UnboundedReceiver<ConsoleCommand>) {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                tracing::debug!("Stdin closed");
            })
            .map_err(|e| tracing::error!("Failed to spawn stdin reader: {}", e))
            .ok();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let recognizer = Self {
            lines: Mutex::new(Some(line_rx)),
            commands: command_tx,
            reader: Mutex::new(None),
        };
        (recognizer, command_rx)
    }
}

#[async_trait]
impl SpeechRecognizer for StdinRecognizer {
    fn name(&self) -> &str {
        "stdin"
    }

    async fn start(
        &self,
        sink: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<(), SpeechError> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| SpeechError::DeviceUnavailable("stdin reader poisoned".into()))?
            .take()
            .ok_or_else(|| SpeechError::DeviceUnavailable("stdin already in use".into()))?;

        let cancel = CancellationToken::new();
        if let Ok(mut reader) = self.reader.lock() {
            *reader = Some(cancel.clone());
        }

        let commands = self.commands.clone();
        tokio::spawn(async move {
            loop {
                let line = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    line = lines.recv() => line,
                };
                let Some(line) = line else { break };

                match parse_line(&line) {
                    ConsoleLine::Command(command) => {
                        let _ = commands.send(command);
                    }
                    ConsoleLine::Speech(text) => {
                        // A real recognizer refines its hypothesis before
                        // settling; mimic that with half the words.
                        let words: Vec<&str> = text.split_whitespace().collect();
                        if words.len() > 1 {
                            let partial = words[..words.len() / 2].join(" ");
                            let _ = sink.send(RecognitionEvent::Partial(partial));
                        }
                        let _ = sink.send(RecognitionEvent::Final(text));
                    }
                    ConsoleLine::Ignored => {}
                }
            }
        });

        Ok(())
    }

    fn stop(&self) {
        if let Some(cancel) = self.reader.lock().ok().and_then(|mut r| r.take()) {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("/next"), ConsoleLine::Command(ConsoleCommand::Next));
        assert_eq!(parse_line(" /q "), ConsoleLine::Command(ConsoleCommand::Quit));
        assert_eq!(parse_line("/skip"), ConsoleLine::Ignored);
    }

    #[test]
    fn test_parse_speech() {
        assert_eq!(
            parse_line("  I led the migration  "),
            ConsoleLine::Speech("I led the migration".into())
        );
        assert_eq!(parse_line("   "), ConsoleLine::Ignored);
    }

    #[tokio::test]
    async fn test_synthesizer_reports_no_duration() {
        let synthesis = ConsoleSynthesizer
            .synthesize("Hello there.", "en-US")
            .await
            .unwrap();
        assert!(synthesis.audio_duration.is_none());
    }
}
