mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use virtuoso_application::{
    AdvanceMode, InterviewSession, InterviewSettings, SessionDeps, SETTINGS_KEY,
};
use virtuoso_events::TracingEventBus;
use virtuoso_llm::{
    CannedGenerationClient, GenerationClient, HttpGenerationClient, ENV_GENERATION_URL,
};
use virtuoso_storage::Database;
use virtuoso_template::InterviewTemplate;
use virtuoso_transcript::CallHistoryRepository;

use crate::console::{ConsoleCommand, ConsoleSynthesizer, StdinRecognizer};

#[derive(Parser)]
#[command(name = "virtuoso", version, about = "Run a spoken-style interview in the terminal")]
struct Cli {
    /// Database file. Defaults to the platform data directory.
    #[arg(long, env = "VIRTUOSO_DB", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interview (default).
    Run(RunArgs),
    /// List past interviews, or print one transcript.
    History {
        /// Interview id to print.
        id: Option<Uuid>,
    },
    /// Show the stored interview settings.
    Settings {
        /// Replace the stored settings with a JSON file.
        #[arg(long, conflicts_with = "reset")]
        import: Option<PathBuf>,
        /// Restore the defaults.
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Interview template JSON. Uses the built-in template when omitted.
    #[arg(long)]
    template: Option<PathBuf>,

    /// JSON array of questions from a job posting.
    #[arg(long, conflicts_with = "template")]
    job_questions: Option<PathBuf>,

    /// Position title used with `--job-questions`.
    #[arg(long, default_value = "Open position")]
    job_title: String,

    /// Wait for `/next` instead of advancing automatically.
    #[arg(long)]
    manual: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,virtuoso=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = open_database(cli.db.as_deref())?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run_interview(&db, args).await,
        Command::History { id } => show_history(&db, id),
        Command::Settings { import, reset } => manage_settings(&db, import.as_deref(), reset),
    }
}

fn open_database(path: Option<&Path>) -> anyhow::Result<Database> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => dirs::data_dir()
            .context("no data directory on this platform; pass --db")?
            .join("virtuoso")
            .join("virtuoso.db"),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tracing::debug!("Opening database at {}", path.display());
    Database::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

fn load_template(args: &RunArgs) -> anyhow::Result<InterviewTemplate> {
    if let Some(path) = &args.template {
        return InterviewTemplate::load(path)
            .with_context(|| format!("failed to load template {}", path.display()));
    }
    if let Some(path) = &args.job_questions {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let questions: Vec<String> =
            serde_json::from_str(&json).context("job questions must be a JSON array of strings")?;
        let job_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("local");
        return Ok(InterviewTemplate::from_job_questions(
            job_id,
            &args.job_title,
            questions,
        )?);
    }
    InterviewTemplate::builtin().context("built-in template is invalid")
}

fn generation_client() -> Arc<dyn GenerationClient> {
    match HttpGenerationClient::from_env() {
        Some(client) => {
            tracing::info!("Using generation service at {}", client.endpoint());
            Arc::new(client)
        }
        None => {
            tracing::warn!(
                "{} is not set; the interviewer will use canned replies",
                ENV_GENERATION_URL
            );
            Arc::new(CannedGenerationClient::new())
        }
    }
}

async fn run_interview(db: &Database, args: RunArgs) -> anyhow::Result<()> {
    let template = load_template(&args)?;
    let mut settings: InterviewSettings = db.get_setting(SETTINGS_KEY)?.unwrap_or_default();
    if args.manual {
        settings.advance = AdvanceMode::Manual;
    }

    let (recognizer, mut commands) = StdinRecognizer::spawn();
    let deps = SessionDeps {
        synthesizer: Arc::new(ConsoleSynthesizer),
        recognizer: Arc::new(recognizer),
        generator: generation_client(),
        bus: Arc::new(TracingEventBus),
    };

    println!(
        "{} ({} questions). Type your answers; pause to let the interviewer respond.",
        template.title,
        template.question_count()
    );
    println!("Commands: /next skips ahead, /quit ends the interview.");

    let session = InterviewSession::start(Arc::new(template), settings, deps)
        .await
        .context("could not start the interview")?;

    let mut states = session.subscribe();
    let mut commands_open = true;
    loop {
        tokio::select! {
            command = commands.recv(), if commands_open => match command {
                Some(ConsoleCommand::Next) => session.next_question(),
                Some(ConsoleCommand::Quit) => {
                    session.shutdown();
                    break;
                }
                None => commands_open = false,
            },
            changed = states.changed() => {
                if changed.is_err() || states.borrow().state.is_finished() {
                    break;
                }
            }
        }
    }

    let report = session.finished().await?;
    db.append(&report.record)?;

    println!(
        "\nInterview {} ({}), {} question(s) asked in {}s.",
        report.session_id,
        report.outcome.as_str(),
        report.questions_asked,
        report.record.duration_ms / 1000
    );
    Ok(())
}

fn show_history(db: &Database, id: Option<Uuid>) -> anyhow::Result<()> {
    if let Some(id) = id {
        let record = db.get(&id)?;
        println!("{}", record.transcript_text);
        return Ok(());
    }

    let records = db.list()?;
    if records.is_empty() {
        println!("No interviews yet.");
    }
    for record in records {
        let first_line = record.transcript_text.lines().next().unwrap_or("");
        println!(
            "{}  {}  {:>5}s  {}",
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.id,
            record.duration_ms / 1000,
            first_line
        );
    }
    Ok(())
}

fn manage_settings(db: &Database, import: Option<&Path>, reset: bool) -> anyhow::Result<()> {
    if reset {
        db.set_setting(SETTINGS_KEY, &InterviewSettings::default())?;
    } else if let Some(path) = import {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings: InterviewSettings =
            serde_json::from_str(&json).context("invalid settings file")?;
        db.set_setting(SETTINGS_KEY, &settings)?;
    }

    let settings: InterviewSettings = db.get_setting(SETTINGS_KEY)?.unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
