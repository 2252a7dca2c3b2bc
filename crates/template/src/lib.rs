//! Interview templates: the question set and scripts for one session.
//!
//! Templates are selected once at session start and shared immutably
//! (`Arc<InterviewTemplate>`) for the lifetime of the session.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const BUILTIN_TEMPLATE: &str = include_str!("../templates/salesforce_developer.json");

/// Default voice used when a template does not name one.
pub const DEFAULT_VOICE: &str = "en-US-JennyNeural";

/// Default time allowed for a single answer, in seconds.
pub const DEFAULT_MAX_RESPONSE_SECS: u64 = 120;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid template json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("template '{0}' has no questions")]
    NoQuestions(String),
    #[error("question '{0}' has no text")]
    EmptyQuestion(String),
}

pub type Result<T> = std::result::Result<T, TemplateError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
    #[serde(default)]
    pub follow_up: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewTemplate {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub questions: Vec<Question>,
    pub intro_script: String,
    pub outro_script: String,
    #[serde(default = "default_voice")]
    pub ai_voice: String,
    /// Total interview length in minutes. Zero means unlimited.
    #[serde(default)]
    pub duration: u32,
    /// Time allowed for one answer, in seconds.
    #[serde(default = "default_max_response_time")]
    pub max_response_time: u64,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_max_response_time() -> u64 {
    DEFAULT_MAX_RESPONSE_SECS
}

impl InterviewTemplate {
    /// Parse and validate a template from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let template: Self = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }

    /// Load and validate a template file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let template = Self::from_json_str(&json)?;
        tracing::debug!(
            id = %template.id,
            questions = template.questions.len(),
            "Loaded interview template from {:?}",
            path
        );
        Ok(template)
    }

    /// Template bundled with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_TEMPLATE)
    }

    /// Build a template from a job posting's question list.
    ///
    /// Blank entries are skipped. Fails when nothing usable remains.
    pub fn from_job_questions<I, S>(job_id: &str, job_title: &str, questions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let questions = questions
            .into_iter()
            .map(|q| q.as_ref().trim().to_string())
            .filter(|q| !q.is_empty())
            .enumerate()
            .map(|(i, question)| Question {
                id: format!("q{}", i + 1),
                question,
                expected_keywords: Vec::new(),
                follow_up: None,
            })
            .collect();

        let template = Self {
            id: format!("job-{job_id}"),
            title: job_title.to_string(),
            questions,
            intro_script: format!(
                "Hello, and welcome to your interview for the {job_title} position. \
                 I'll ask you a few questions. Pause when you're done speaking."
            ),
            outro_script: "That concludes our interview. Thank you for your time.".to_string(),
            ai_voice: default_voice(),
            duration: 0,
            max_response_time: DEFAULT_MAX_RESPONSE_SECS,
        };
        template.validate()?;
        Ok(template)
    }

    pub fn validate(&self) -> Result<()> {
        if self.questions.is_empty() {
            return Err(TemplateError::NoQuestions(self.id.clone()));
        }
        if let Some(q) = self.questions.iter().find(|q| q.question.trim().is_empty()) {
            return Err(TemplateError::EmptyQuestion(q.id.clone()));
        }
        Ok(())
    }

    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn is_last_question(&self, index: usize) -> bool {
        index + 1 >= self.questions.len()
    }

    /// Session length limit, if any.
    pub fn session_duration(&self) -> Option<Duration> {
        (self.duration > 0).then(|| Duration::from_secs(u64::from(self.duration) * 60))
    }

    pub fn max_response_time(&self) -> Duration {
        Duration::from_secs(self.max_response_time)
    }
}
