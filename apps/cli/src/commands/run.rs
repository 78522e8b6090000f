//! Run command implementation.
//!
//! Builds a producer, a vision describer and (with `--confirm`) a gated
//! coordinator, runs the conversation, and exports the transcript, the final
//! image and an HTML preview page.

use anyhow::Context;
use async_trait::async_trait;
use colored::Colorize;
use loupe_abstraction::Model;
use loupe_orchestrator::conversation::DEFAULT_TASK_SENDER;
use loupe_orchestrator::offline::{offline_coder, offline_reviewer};
use loupe_orchestrator::prompts::STOP_SIGN_TASK;
use loupe_orchestrator::{
    ArtifactProducer, ConfirmationGate, Conversation, ConversationOutcome, Coordinator, ExecutorFactory,
    ImageArtifact, LoupeConfig, Message, Provider, Settings, VisionDescriber, classify,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::event_renderer;

const PRODUCER_ID: &str = "creator";
const DESCRIBER_ID: &str = "critic";

/// Exit code for a conversation that ended in `Aborted`.
const ABORTED_EXIT_CODE: u8 = 2;

type SharedModel = Arc<dyn Model + Send + Sync>;

/// Arguments for `loupe run`.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Task given to the producer (defaults to the stop-sign prompt)
    pub task: Option<String>,

    /// Maximum produce/review rounds
    #[arg(long, value_name = "N")]
    pub max_rounds: Option<u32>,

    /// Extra attempts for a failing agent turn
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Run generated scripts inside a Docker container
    #[arg(long)]
    pub isolated: bool,

    /// Per-script execution timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to a loupe.toml file (defaults to ./loupe.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Ask for confirmation before every revision round
    #[arg(long)]
    pub confirm: bool,

    /// Where to write the transcript JSON
    #[arg(long, value_name = "PATH", default_value = "transcript.json")]
    pub transcript_out: PathBuf,

    /// Where to write the final image (extension added from the image format when missing)
    #[arg(long, value_name = "PATH", default_value = "stop_sign")]
    pub artifact_out: PathBuf,

    /// Where to write the HTML preview page
    #[arg(long, value_name = "PATH", default_value = "preview.html")]
    pub preview_out: PathBuf,

    /// Print the outcome as JSON instead of rendering events
    #[arg(long)]
    pub json: bool,
}

/// Asks on the terminal whether another round should start.
struct PromptGate;

#[async_trait]
impl ConfirmationGate for PromptGate {
    async fn confirm(&self, review: &Message) -> bool {
        let question = format!("Round {} verdict is {}. Start another round?", review.round, classify(&review.text));
        let answer =
            tokio::task::spawn_blocking(move || inquire::Confirm::new(&question).with_default(true).prompt()).await;

        match answer {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(e)) => {
                warn!(error = %e, "Confirmation prompt failed, stopping");
                false
            }
            Err(e) => {
                warn!(error = %e, "Confirmation prompt task failed, stopping");
                false
            }
        }
    }
}

/// Execute the run command.
pub async fn execute(args: RunArgs) -> anyhow::Result<ExitCode> {
    let settings = Settings::load().context("Failed to load settings")?;
    let (mut config, config_path) =
        LoupeConfig::discover(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = &config_path {
        info!(path = %path.display(), "Loaded configuration file");
    }
    apply_overrides(&mut config, &args);

    let (coder, vision) = models(&settings, config.turn_timeout())?;
    let executor = ExecutorFactory::create(&config.execution).context("Failed to set up script execution")?;

    let producer = ArtifactProducer::new(PRODUCER_ID, coder, executor).with_config(config.producer_config());
    let describer = VisionDescriber::new(DESCRIBER_ID, vision).with_config(config.describer_config());
    let mut builder = Conversation::builder()
        .with_agent(producer)
        .with_agent(describer)
        .with_config(config.conversation_config());
    if args.confirm {
        builder = builder.with_agent(Coordinator::new(DEFAULT_TASK_SENDER).with_gate(Arc::new(PromptGate)));
    }
    let conversation = builder.build().context("Failed to build conversation")?;

    let token = conversation.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current turn");
            token.cancel();
        }
    });

    let renderer = if args.json {
        None
    } else {
        println!("{}", "loupe run".bold().cyan());
        println!("  {} Provider: {} ({})", "•".dimmed(), settings.provider, settings.model.cyan());
        println!();
        Some(event_renderer::spawn_event_renderer(conversation.subscribe(), conversation.id().to_string()))
    };

    let task = args.task.clone().unwrap_or_else(|| STOP_SIGN_TASK.to_string());
    let outcome = conversation.run(task).await;
    if let Some(handle) = renderer {
        let _ = handle.await;
    }

    let written = export(&args, &outcome)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?);
    } else {
        print_summary(&outcome, &written);
    }

    Ok(if outcome.is_completed() { ExitCode::SUCCESS } else { ExitCode::from(ABORTED_EXIT_CODE) })
}

fn apply_overrides(config: &mut LoupeConfig, args: &RunArgs) {
    if let Some(max_rounds) = args.max_rounds {
        config.conversation.max_rounds = max_rounds;
    }
    if let Some(max_retries) = args.max_retries {
        config.conversation.max_retries = max_retries;
    }
    if let Some(timeout) = args.timeout {
        config.execution.timeout_seconds = timeout;
    }
    if args.isolated {
        config.execution.use_isolation = true;
    }
}

fn models(settings: &Settings, timeout: Duration) -> anyhow::Result<(SharedModel, SharedModel)> {
    if settings.provider == Provider::Mock {
        info!("Using offline scripted models");
        let coder: SharedModel = Arc::new(offline_coder());
        let vision: SharedModel = Arc::new(offline_reviewer());
        return Ok((coder, vision));
    }

    let model = settings.build_model(timeout).context("Failed to create model client")?;
    Ok((Arc::clone(&model), model))
}

/// Writes the transcript, and the final image with its preview when there is one.
fn export(args: &RunArgs, outcome: &ConversationOutcome) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let transcript = outcome.transcript.to_json_pretty().context("Failed to serialize transcript")?;
    fs::write(&args.transcript_out, transcript)
        .with_context(|| format!("Failed to write {}", args.transcript_out.display()))?;
    written.push(args.transcript_out.clone());

    if let Some(artifact) = outcome.final_artifact() {
        let path = artifact_path(&args.artifact_out, artifact);
        let bytes = artifact.bytes().context("Failed to decode final image")?;
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);

        fs::write(&args.preview_out, preview_html(outcome, artifact))
            .with_context(|| format!("Failed to write {}", args.preview_out.display()))?;
        written.push(args.preview_out.clone());
    }

    Ok(written)
}

fn artifact_path(path: &Path, artifact: &ImageArtifact) -> PathBuf {
    if path.extension().is_some() { path.to_path_buf() } else { path.with_extension(artifact.extension()) }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Standalone page embedding the image as a data URI next to the latest review.
fn preview_html(outcome: &ConversationOutcome, artifact: &ImageArtifact) -> String {
    let review = outcome.transcript.latest_review().map(|m| escape_html(&m.text)).unwrap_or_default();
    format!(
        "<!DOCTYPE html>
<html>
<head>
<meta charset=\"utf-8\">
<title>Loupe {id}</title>
</head>
<body>
<h1>{state}: {finish}</h1>
<p>Verdict: {verdict} after {rounds} round(s)</p>
<img src=\"{src}\" width=\"{width}\" height=\"{height}\" alt=\"Generated image\">
<pre>{review}</pre>
</body>
</html>
",
        id = escape_html(&outcome.conversation_id),
        state = outcome.state,
        finish = escape_html(&outcome.finish.to_string()),
        verdict = outcome.verdict,
        rounds = outcome.rounds,
        src = artifact.data_url(),
        width = artifact.width,
        height = artifact.height,
        review = review,
    )
}

fn print_summary(outcome: &ConversationOutcome, written: &[PathBuf]) {
    let state = if outcome.is_completed() {
        outcome.state.to_string().green().bold()
    } else {
        outcome.state.to_string().red().bold()
    };

    println!();
    println!("{}", "Summary".bold());
    println!("  State:   {} ({})", state, outcome.finish);
    println!("  Verdict: {}", outcome.verdict);
    println!("  Rounds:  {}", outcome.rounds);
    println!("  Turns:   {}", outcome.turns);
    for path in written {
        println!("  {} Wrote {}", "•".dimmed(), path.display());
    }
}
