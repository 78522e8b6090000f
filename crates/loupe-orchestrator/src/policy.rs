//! Termination policy.
//!
//! Classifies a reviewer's reply into a [`Verdict`] and detects explicit stop
//! instructions. Classification is a pure function of the text.
//!
//! A structured `Verdict: <value>` line wins when it names exactly one
//! outcome. Otherwise standalone uppercase markers anywhere in the text are
//! used. Anything unclear is [`Verdict::Undetermined`]; nothing ambiguous is
//! ever approved.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AmbiguityReason, PolicyAmbiguity};
use crate::message::excerpt;

const EXCERPT_CHARS: usize = 120;

static VERDICT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s>#*_-]*verdict[\s*_]*:[\s*_]*(.*?)[\s*_]*$")
        .expect("verdict line regex should be valid")
});

static RECOMMENDATION_TERMINATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s>#*_-]*recommendation[\s*_]*:[\s*_\[]*terminate\b")
        .expect("recommendation regex should be valid")
});

static APPROVE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bAPPROVED?\b").expect("approve regex should be valid"));

static REVISE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bNEEDS\s+(?:OPTIMI[SZ]ATION|REVISION)\b|\bCONTINUE\b")
        .expect("revision regex should be valid")
});

static NEGATED_APPROVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?i:not|no|don't|do\s+not|cannot|can't|can\s+not|won't|will\s+not)\s+(?i:be\s+)?APPROVED?\b")
        .expect("negation regex should be valid")
});

static TERMINATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bTERMINATE\b").expect("terminate regex should be valid"));

static TEMPLATE_ECHO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bTERMINATE\s*[/|]\s*CONTINUE\b|\bCONTINUE\s*[/|]\s*TERMINATE\b")
        .expect("template echo regex should be valid")
});

/// Classification of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The artifact meets the requirements
    Approved,
    /// The reviewer asked for changes
    NeedsRevision,
    /// No usable signal
    Undetermined,
}

impl Verdict {
    /// Whether this verdict ends the conversation
    pub fn is_approved(self) -> bool {
        self == Self::Approved
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::NeedsRevision => write!(f, "needs-revision"),
            Self::Undetermined => write!(f, "undetermined"),
        }
    }
}

/// Marker-based termination policy
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminationPolicy;

impl TerminationPolicy {
    /// Create the policy
    pub fn new() -> Self {
        Self
    }

    /// Classify review text, treating ambiguity as undetermined
    pub fn classify(&self, text: &str) -> Verdict {
        self.assess(text).unwrap_or(Verdict::Undetermined)
    }

    /// Classify review text, reporting why ambiguous text could not be
    /// classified
    ///
    /// # Errors
    /// Returns [`PolicyAmbiguity`] when the text carries no marker, carries
    /// conflicting markers, or negates its verdict.
    pub fn assess(&self, text: &str) -> Result<Verdict, PolicyAmbiguity> {
        let ambiguous = |reason| PolicyAmbiguity { reason, excerpt: excerpt(text, EXCERPT_CHARS) };

        if let Some(value) = VERDICT_LINE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_uppercase())
            .last()
        {
            match markers(&value) {
                Markers::Approve if NEGATED_APPROVAL.is_match(&value) => {
                    return Err(ambiguous(AmbiguityReason::Negated));
                }
                Markers::Approve => return Ok(Verdict::Approved),
                Markers::Revise => return Ok(Verdict::NeedsRevision),
                Markers::Both => return Err(ambiguous(AmbiguityReason::ConflictingMarkers)),
                Markers::None => {}
            }
        }

        match markers(text) {
            Markers::Approve if NEGATED_APPROVAL.is_match(text) => Err(ambiguous(AmbiguityReason::Negated)),
            Markers::Approve => Ok(Verdict::Approved),
            Markers::Revise => Ok(Verdict::NeedsRevision),
            Markers::Both => Err(ambiguous(AmbiguityReason::ConflictingMarkers)),
            Markers::None => Err(ambiguous(AmbiguityReason::NoMarker)),
        }
    }

    /// Whether the text carries an explicit stop instruction.
    ///
    /// A line offering `TERMINATE/CONTINUE` as alternatives is a template
    /// echo, not an instruction.
    pub fn stop_requested(&self, text: &str) -> bool {
        text.lines().any(|line| {
            (RECOMMENDATION_TERMINATE.is_match(line) || TERMINATE_TOKEN.is_match(line))
                && !TEMPLATE_ECHO.is_match(line)
        })
    }
}

/// Classify review text with the default policy
pub fn classify(text: &str) -> Verdict {
    TerminationPolicy.classify(text)
}

enum Markers {
    Approve,
    Revise,
    Both,
    None,
}

fn markers(text: &str) -> Markers {
    match (APPROVE_TOKEN.is_match(text), REVISE_TOKEN.is_match(text)) {
        (true, true) => Markers::Both,
        (true, false) => Markers::Approve,
        (false, true) => Markers::Revise,
        (false, false) => Markers::None,
    }
}
