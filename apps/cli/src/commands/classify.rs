//! Classify command implementation.
//!
//! Runs the termination policy over a saved review so prompt changes can be
//! checked without calling a model.

use anyhow::Context;
use colored::Colorize;
use loupe_orchestrator::{PolicyAmbiguity, TerminationPolicy, Verdict};
use std::io::Read;
use std::path::Path;

fn read_review(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).context("Failed to read review from stdin")?;
            Ok(text)
        }
    }
}

/// Execute the classify command.
pub fn execute(file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let text = read_review(file)?;
    let policy = TerminationPolicy::new();
    let assessment = policy.assess(&text);
    let verdict = assessment.as_ref().copied().unwrap_or(Verdict::Undetermined);
    let stop_requested = policy.stop_requested(&text);

    if json {
        let ambiguity = assessment.as_ref().err().map(|a: &PolicyAmbiguity| a.reason.to_string());
        let report = serde_json::json!({
            "verdict": verdict,
            "stop_requested": stop_requested,
            "ambiguity": ambiguity,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", verdict);
    if let Err(ambiguity) = &assessment {
        eprintln!("{} {}", "note:".yellow().bold(), ambiguity.reason);
    }
    if stop_requested {
        println!("stop requested");
    }
    Ok(())
}
