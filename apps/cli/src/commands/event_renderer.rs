//! Live terminal rendering of conversation events.
//!
//! Subscribe before starting the run, spawn the renderer, then await the
//! handle once the run returns:
//!
//! ```rust,ignore
//! let handle = event_renderer::spawn_event_renderer(conversation.subscribe(), conversation.id().to_string());
//! let outcome = conversation.run(task).await;
//! let _ = handle.await;
//! ```

use colored::Colorize;
use loupe_orchestrator::{ConversationEvent, Finish, MessageRole, Verdict};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

const REVIEW_INDENT: &str = "    │ ";

/// Spawns [`render_event_stream`] on the runtime.
pub fn spawn_event_renderer(
    rx: broadcast::Receiver<ConversationEvent>,
    conversation_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move { render_event_stream(rx, &conversation_id).await })
}

/// Prints events for `conversation_id` until the conversation finishes or the
/// channel closes.
pub async fn render_event_stream(mut rx: broadcast::Receiver<ConversationEvent>, conversation_id: &str) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if event.conversation_id() != conversation_id {
                    continue;
                }
                let finished = matches!(event, ConversationEvent::Finished { .. });
                println!("{}", format_event(&event));
                if finished {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                println!("{}", format!("  … {} events skipped", skipped).dimmed());
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn verdict_label(verdict: Verdict) -> String {
    match verdict {
        Verdict::Approved => verdict.to_string().green().bold().to_string(),
        Verdict::NeedsRevision => verdict.to_string().yellow().bold().to_string(),
        Verdict::Undetermined => verdict.to_string().dimmed().to_string(),
    }
}

/// Renders one event as terminal text.
pub fn format_event(event: &ConversationEvent) -> String {
    match event {
        ConversationEvent::Started { conversation_id, max_rounds, roster, .. } => {
            let roster: Vec<&str> = roster.iter().map(|id| id.as_str()).collect();
            format!(
                "{} conversation {} (up to {} rounds) with {}",
                "▶".cyan().bold(),
                conversation_id.dimmed(),
                max_rounds,
                roster.join(", ").cyan()
            )
        }
        ConversationEvent::TurnStarted { agent, capability, round, attempt, .. } => {
            let retry = if *attempt > 1 { format!(" (attempt {})", attempt) } else { String::new() };
            format!(
                "  {} {} [{}] round {}{}",
                "⏳".yellow(),
                agent.as_str().cyan(),
                capability,
                round,
                retry
            )
        }
        ConversationEvent::MessageAppended { message, .. } => match message.role {
            MessageRole::Task => format!("→ {}", message.excerpt(120)).dimmed().to_string(),
            MessageRole::Artifact => match &message.artifact {
                Some(artifact) => format!(
                    "  {} {} produced {} ({}x{})",
                    "✓".green(),
                    message.sender.as_str().cyan(),
                    artifact.media_type,
                    artifact.width,
                    artifact.height
                ),
                None => format!("  {} {} replied without an image", "•".dimmed(), message.sender),
            },
            MessageRole::Review => {
                let body: Vec<String> =
                    message.text.lines().map(|line| format!("{}{}", REVIEW_INDENT, line)).collect();
                format!("  {} {} reviewed:\n{}", "✓".green(), message.sender.as_str().cyan(), body.join("\n"))
            }
            MessageRole::Control => {
                format!("  {} {}: {}", "•".dimmed(), message.sender.as_str().cyan(), message.text.bold())
            }
        },
        ConversationEvent::VerdictReached { round, verdict, .. } => {
            format!("  {} round {} verdict: {}", "⚖".cyan(), round, verdict_label(*verdict))
        }
        ConversationEvent::PolicyAmbiguity { round, reason, excerpt, .. } => format!(
            "  {} round {} review is ambiguous ({}): {}",
            "⚠".yellow().bold(),
            round,
            reason,
            excerpt.dimmed()
        ),
        ConversationEvent::RetryScheduled { agent, attempt, error, .. } => format!(
            "  {} {} failed, retrying (attempt {}): {}",
            "↻".yellow(),
            agent.as_str().yellow(),
            attempt,
            error.dimmed()
        ),
        ConversationEvent::AgentFailed { agent, kind, error, .. } => {
            format!("  {} {} failed ({}): {}", "✗".red().bold(), agent.as_str().red(), kind, error.red())
        }
        ConversationEvent::Finished { finish, rounds, turns, .. } => {
            let status = match finish {
                Finish::Completed(_) => format!("✓ Completed: {}", finish).green().bold(),
                Finish::Aborted(_) => format!("✗ Aborted: {}", finish).red().bold(),
            };
            format!("\n{} {}", status, format!("({} rounds, {} turns)", rounds, turns).dimmed())
        }
    }
}
