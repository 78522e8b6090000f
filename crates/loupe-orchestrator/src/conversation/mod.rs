//! Conversation orchestrator.
//!
//! A [`Conversation`] drives a fixed roster of agents through produce/review
//! rounds until the termination policy approves an artifact, an agent asks to
//! stop, the round budget runs out, an agent fails, or the cancellation token
//! fires. Exactly one agent turn is in flight at any time.
//!
//! # Example
//!
//! ```rust,no_run
//! use loupe_orchestrator::{ArtifactProducer, Conversation, VisionDescriber};
//! use loupe_orchestrator::execution::{CodeExecutionConfig, ExecutorFactory};
//! use loupe_models::ModelFactory;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let model = ModelFactory::create_with_api_key("openai", "gpt-4o".to_string(), "sk-...".to_string())?;
//! let executor = ExecutorFactory::create(&CodeExecutionConfig::default())?;
//!
//! let conversation = Conversation::builder()
//!     .with_agent(ArtifactProducer::new("creator", model.clone(), executor))
//!     .with_agent(VisionDescriber::new("reviewer", model))
//!     .build()?;
//!
//! let outcome = conversation.run("Draw a stop sign").await;
//! println!("{} after {} rounds", outcome.finish, outcome.rounds);
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod outcome;
mod selector;
pub mod state;

pub use events::{ConversationEvent, ConversationId};
pub use outcome::{AbortReason, ConversationOutcome, Finish, FinishReason};
pub use state::ConversationState;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agents::ConversationAgent;
use crate::error::{AgentError, OrchestrationError, Result};
use crate::message::{AgentId, Message, MessageRole};
use crate::policy::{TerminationPolicy, Verdict};
use crate::prompts::FEEDBACK_HEADING;
use crate::transcript::Transcript;

use selector::{Phase, SpeakerSelector};

/// Sender recorded on the opening task when no coordinator is present.
pub const DEFAULT_TASK_SENDER: &str = "user";

const EVENT_CAPACITY: usize = 256;

/// Round and retry limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Maximum produce/review rounds.
    pub max_rounds: u32,
    /// Extra attempts for a failing agent turn.
    pub max_retries: u32,
    /// Number of recent reviews included when asking for a revision.
    pub feedback_window: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { max_rounds: 5, max_retries: 0, feedback_window: 3 }
    }
}

impl ConversationConfig {
    fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(OrchestrationError::InvalidConfig("max_rounds must be at least 1".to_string()));
        }
        if self.feedback_window == 0 {
            return Err(OrchestrationError::InvalidConfig(
                "feedback_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`Conversation`].
#[derive(Debug, Default)]
pub struct ConversationBuilder {
    agents: Vec<ConversationAgent>,
    config: ConversationConfig,
    policy: TerminationPolicy,
    cancel: Option<CancellationToken>,
}

impl ConversationBuilder {
    /// Adds an agent to the roster.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<ConversationAgent>) -> Self {
        self.agents.push(agent.into());
        self
    }

    /// Sets round and retry limits.
    #[must_use]
    pub fn with_config(mut self, config: ConversationConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the termination policy.
    #[must_use]
    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validates the roster and config.
    ///
    /// # Errors
    /// [`OrchestrationError::InvalidRoster`] without a producer and a
    /// describer, with duplicate ids or more than one coordinator;
    /// [`OrchestrationError::InvalidConfig`] for out-of-range limits.
    pub fn build(self) -> Result<Conversation> {
        self.config.validate()?;
        let selector = SpeakerSelector::new(&self.agents)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            agents: self.agents,
            selector,
            config: self.config,
            policy: self.policy,
            state: ConversationState::Idle,
            events,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// A produce/review conversation over a fixed roster.
#[derive(Debug)]
pub struct Conversation {
    id: ConversationId,
    agents: Vec<ConversationAgent>,
    selector: SpeakerSelector,
    config: ConversationConfig,
    policy: TerminationPolicy,
    state: ConversationState,
    events: broadcast::Sender<ConversationEvent>,
    cancel: CancellationToken,
}

/// Mutable bookkeeping of one run.
struct RunState {
    transcript: Transcript,
    phase: Phase,
    round: u32,
    turns: u32,
    verdict: Verdict,
    feedback: VecDeque<Message>,
    inbox: Message,
}

impl Conversation {
    /// Starts building a conversation.
    pub fn builder() -> ConversationBuilder {
        ConversationBuilder::default()
    }

    /// Conversation id, also carried by every event.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// Round and retry limits.
    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Agent ids in roster order.
    pub fn roster(&self) -> Vec<AgentId> {
        self.agents.iter().map(|agent| agent.id().clone()).collect()
    }

    /// Subscribes to progress events. Subscribe before calling [`run`](Self::run).
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// Token that stops the conversation before its next turn.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn emit(&self, event: ConversationEvent) {
        let _ = self.events.send(event);
    }

    fn transition(&mut self, to: ConversationState) {
        if self.state.can_transition_to(to) {
            debug!(conversation_id = %self.id, from = %self.state, to = %to, "Conversation state change");
            self.state = to;
        } else {
            warn!(conversation_id = %self.id, from = %self.state, to = %to, "Ignoring invalid state transition");
        }
    }

    fn coordinator_id(&self) -> AgentId {
        self.agents
            .iter()
            .find_map(|agent| match agent {
                ConversationAgent::Coordinator(c) => Some(c.id().clone()),
                _ => None,
            })
            .unwrap_or_else(|| AgentId::new(DEFAULT_TASK_SENDER))
    }

    /// Runs the conversation to a terminal state.
    ///
    /// Never fails: agent errors, the round budget and cancellation all end
    /// in an [`ConversationOutcome`] with the transcript so far.
    pub async fn run(mut self, task: impl Into<String>) -> ConversationOutcome {
        let task = task.into();
        self.transition(ConversationState::Running);
        info!(
            conversation_id = %self.id,
            max_rounds = self.config.max_rounds,
            agents = self.agents.len(),
            "Conversation started"
        );
        self.emit(ConversationEvent::Started {
            conversation_id: self.id.clone(),
            max_rounds: self.config.max_rounds,
            roster: self.roster(),
        });

        let opening = self
            .agents
            .iter()
            .find_map(|agent| match agent {
                ConversationAgent::Coordinator(c) => Some(c.issue_task(&task)),
                _ => None,
            })
            .unwrap_or_else(|| Message::task(DEFAULT_TASK_SENDER, task.clone(), 0));

        let mut run = RunState {
            transcript: Transcript::new(),
            phase: Phase::NeedArtifact,
            round: 0,
            turns: 0,
            verdict: Verdict::Undetermined,
            feedback: VecDeque::new(),
            inbox: opening.clone(),
        };
        self.append(&mut run, opening);

        let finish = loop {
            if self.cancel.is_cancelled() {
                info!(conversation_id = %self.id, round = run.round, "Conversation cancelled");
                break Finish::Aborted(AbortReason::Cancelled);
            }
            if run.phase != Phase::NeedReview && run.round >= self.config.max_rounds {
                warn!(
                    conversation_id = %self.id,
                    max_rounds = self.config.max_rounds,
                    "Round budget exhausted without approval"
                );
                break Finish::Aborted(AbortReason::RoundBudgetExceeded {
                    max_rounds: self.config.max_rounds,
                });
            }

            let index = self.selector.next(run.phase);
            let (input, turn_round) = match run.phase {
                Phase::NeedArtifact => (self.revision_request(&task, &run), run.round + 1),
                Phase::NeedReview | Phase::NeedConfirmation(_) => (run.inbox.clone(), run.round),
            };

            let reply = match self.take_turn(index, &input, turn_round).await {
                Ok(reply) => reply,
                Err(e) => {
                    let agent = self.agents[index].id().clone();
                    error!(conversation_id = %self.id, agent_id = %agent, error = %e, "Agent failed");
                    self.emit(ConversationEvent::AgentFailed {
                        conversation_id: self.id.clone(),
                        agent: agent.clone(),
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    });
                    break Finish::Aborted(AbortReason::AgentFailed {
                        agent,
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    });
                }
            };
            run.turns += 1;

            let Some(mut message) = reply else {
                run.phase = Phase::NeedArtifact;
                continue;
            };

            match message.role {
                MessageRole::Artifact => {
                    run.round += 1;
                    message.round = run.round;
                    run.inbox = message.clone();
                    run.phase = Phase::NeedReview;
                    self.append(&mut run, message);
                }
                MessageRole::Review => {
                    if let Some(finish) = self.review(&mut run, message) {
                        break finish;
                    }
                }
                MessageRole::Control | MessageRole::Task => {
                    let stop = self.policy.stop_requested(&message.text);
                    let sender = message.sender.clone();
                    self.append(&mut run, message);
                    if stop {
                        info!(conversation_id = %self.id, agent_id = %sender, "Stop instruction received");
                        break Finish::Completed(FinishReason::StopRequested { agent: sender });
                    }
                    run.phase = Phase::NeedArtifact;
                }
            }
        };

        self.finish(run, finish)
    }

    /// Classifies a review and decides whether the conversation ends.
    fn review(&self, run: &mut RunState, message: Message) -> Option<Finish> {
        let round = run.round;
        let verdict = match self.policy.assess(&message.text) {
            Ok(verdict) => verdict,
            Err(ambiguity) => {
                warn!(
                    conversation_id = %self.id,
                    round,
                    reason = %ambiguity.reason,
                    excerpt = %ambiguity.excerpt,
                    "Review could not be classified"
                );
                self.emit(ConversationEvent::PolicyAmbiguity {
                    conversation_id: self.id.clone(),
                    round,
                    reason: ambiguity.reason.to_string(),
                    excerpt: ambiguity.excerpt,
                });
                Verdict::Undetermined
            }
        };
        run.verdict = verdict;

        let stop = self.policy.stop_requested(&message.text);
        let sender = message.sender.clone();
        run.inbox = message.clone();
        run.feedback.push_back(message.clone());
        while run.feedback.len() > self.config.feedback_window {
            run.feedback.pop_front();
        }
        self.append(run, message);

        info!(conversation_id = %self.id, round, verdict = %verdict, "Review classified");
        self.emit(ConversationEvent::VerdictReached { conversation_id: self.id.clone(), round, verdict });

        if verdict.is_approved() {
            return Some(Finish::Completed(FinishReason::Approved));
        }
        if stop {
            info!(conversation_id = %self.id, agent_id = %sender, "Stop instruction received");
            return Some(Finish::Completed(FinishReason::StopRequested { agent: sender }));
        }
        run.phase = self.selector.after_review();
        None
    }

    /// Runs one agent turn, retrying up to `max_retries` times.
    async fn take_turn(
        &self,
        index: usize,
        input: &Message,
        round: u32,
    ) -> std::result::Result<Option<Message>, AgentError> {
        let agent = &self.agents[index];
        let mut attempt = 1;
        loop {
            debug!(
                conversation_id = %self.id,
                agent_id = %agent.id(),
                capability = %agent.capability(),
                round,
                attempt,
                "Turn started"
            );
            self.emit(ConversationEvent::TurnStarted {
                conversation_id: self.id.clone(),
                agent: agent.id().clone(),
                capability: agent.capability(),
                round,
                attempt,
            });

            match agent.reply(input, round).await {
                Ok(reply) => return Ok(reply),
                Err(e) if attempt <= self.config.max_retries && !self.cancel.is_cancelled() => {
                    warn!(
                        conversation_id = %self.id,
                        agent_id = %agent.id(),
                        attempt,
                        error = %e,
                        "Agent turn failed, retrying"
                    );
                    self.emit(ConversationEvent::RetryScheduled {
                        conversation_id: self.id.clone(),
                        agent: agent.id().clone(),
                        attempt: attempt + 1,
                        error: e.to_string(),
                    });
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Task text for the next producer turn, with recent feedback attached.
    fn revision_request(&self, task: &str, run: &RunState) -> Message {
        let mut text = task.to_string();
        if !run.feedback.is_empty() {
            let _ = write!(text, "\n\n{}", FEEDBACK_HEADING);
            for review in &run.feedback {
                let _ = write!(text, "\n\n[round {}] {}", review.round, review.text.trim());
            }
            text.push_str(
                "\n\nRevise the script to address the feedback above and print the new image as base64.",
            );
        }
        Message::task(self.coordinator_id(), text, run.round + 1)
    }

    fn append(&self, run: &mut RunState, message: Message) {
        debug!(
            conversation_id = %self.id,
            sender = %message.sender,
            role = %message.role,
            round = message.round,
            "Message appended"
        );
        self.emit(ConversationEvent::MessageAppended {
            conversation_id: self.id.clone(),
            message: message.clone(),
        });
        run.transcript.append(message);
    }

    fn finish(mut self, run: RunState, finish: Finish) -> ConversationOutcome {
        self.transition(finish.state());
        info!(
            conversation_id = %self.id,
            state = %self.state,
            finish = %finish,
            verdict = %run.verdict,
            rounds = run.round,
            turns = run.turns,
            "Conversation finished"
        );
        self.emit(ConversationEvent::Finished {
            conversation_id: self.id.clone(),
            finish: finish.clone(),
            verdict: run.verdict,
            rounds: run.round,
            turns: run.turns,
        });

        ConversationOutcome {
            conversation_id: self.id,
            state: self.state,
            finish,
            verdict: run.verdict,
            transcript: run.transcript,
            rounds: run.round,
            turns: run.turns,
        }
    }
}
