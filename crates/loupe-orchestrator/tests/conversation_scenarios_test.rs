//! Integration tests for the produce/review conversation loop
//!
//! Drives full conversations with scripted models and a fake code executor
//! that prints a real PNG, covering approval, revision, round budget,
//! failures, ambiguity, retries, timeouts, cancellation and gating.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageBuffer, ImageFormat, Rgb};
use loupe_abstraction::ModelError;
use loupe_models::ScriptedModel;
use loupe_orchestrator::execution::{CodeExecutor, ExecutionOutput};
use loupe_orchestrator::prompts::FEEDBACK_HEADING;
use loupe_orchestrator::{
    AbortReason, AgentId, ArtifactProducer, ConfirmationGate, Conversation, ConversationConfig,
    ConversationEvent, ConversationOutcome, ConversationState, Coordinator, Finish, FinishReason,
    Message, MessageRole, ProducerConfig, Verdict, VisionDescriber,
};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const SCRIPT_REPLY: &str = "```python\nprint(render_stop_sign())\n```";

const APPROVE: &str = "ANALYSIS:\n- Present attributes: octagon, red, white border, centred STOP\n\
    - Missing/incorrect attributes: none\nVerdict: APPROVE\nSuggestions: none\nRecommendation: TERMINATE";

const REVISE: &str = "ANALYSIS:\n- Present attributes: red fill\n\
    - Missing/incorrect attributes: shape is a circle\nVerdict: NEEDS OPTIMIZATION\n\
    Suggestions: draw a regular octagon\nRecommendation: CONTINUE";

fn png_base64() -> String {
    let img = ImageBuffer::from_pixel(16, 16, Rgb([200u8, 16, 46]));
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png).unwrap();
    STANDARD.encode(cursor.into_inner())
}

enum Script {
    Png,
    Crash,
    Prints(&'static str),
}

/// Executor that prints a PNG, crashes, or prints fixed text without running anything.
struct FakeExecutor {
    script: Script,
    runs: AtomicUsize,
}

impl FakeExecutor {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self { script, runs: AtomicUsize::new(0) })
    }

    fn printing_png() -> Arc<Self> {
        Self::new(Script::Png)
    }

    fn crashing() -> Arc<Self> {
        Self::new(Script::Crash)
    }

    fn printing(stdout: &'static str) -> Arc<Self> {
        Self::new(Script::Prints(stdout))
    }
}

#[async_trait]
impl CodeExecutor for FakeExecutor {
    async fn execute(&self, _script: &str) -> loupe_orchestrator::execution::Result<ExecutionOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let output = match self.script {
            Script::Png => {
                ExecutionOutput { exit_code: Some(0), stdout: format!("{}\n", png_base64()), stderr: String::new() }
            }
            Script::Crash => ExecutionOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "Traceback (most recent call last):\nModuleNotFoundError: No module named 'PIL'"
                    .to_string(),
            },
            Script::Prints(stdout) => {
                ExecutionOutput { exit_code: Some(0), stdout: stdout.to_string(), stderr: String::new() }
            }
        };
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct Gate {
    allow: bool,
    cancel: Option<CancellationToken>,
}

#[async_trait]
impl ConfirmationGate for Gate {
    async fn confirm(&self, _review: &Message) -> bool {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        self.allow
    }
}

fn coder(replies: usize) -> Arc<ScriptedModel> {
    let mut model = ScriptedModel::new("coder");
    for _ in 0..replies {
        model = model.reply(SCRIPT_REPLY);
    }
    Arc::new(model)
}

fn reviewer(replies: &[&str]) -> Arc<ScriptedModel> {
    let model = replies.iter().fold(ScriptedModel::new("vision"), |model, reply| model.reply(*reply));
    Arc::new(model)
}

fn config(max_rounds: u32) -> ConversationConfig {
    ConversationConfig { max_rounds, ..ConversationConfig::default() }
}

fn build(
    coder: &Arc<ScriptedModel>,
    executor: Arc<FakeExecutor>,
    reviewer: &Arc<ScriptedModel>,
    config: ConversationConfig,
) -> Conversation {
    Conversation::builder()
        .with_agent(ArtifactProducer::new("creator", coder.clone(), executor))
        .with_agent(VisionDescriber::new("reviewer", reviewer.clone()))
        .with_config(config)
        .build()
        .unwrap()
}

fn drain(rx: &mut broadcast::Receiver<ConversationEvent>) -> Vec<ConversationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn roles(outcome: &ConversationOutcome) -> Vec<MessageRole> {
    outcome.transcript.messages().iter().map(|m| m.role).collect()
}

#[tokio::test]
async fn test_approval_completes_within_the_same_round() {
    let coder = coder(1);
    let reviewer = reviewer(&[APPROVE]);
    let outcome = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5)).run("draw").await;

    assert_eq!(outcome.state, ConversationState::Completed);
    assert_eq!(outcome.finish, Finish::Completed(FinishReason::Approved));
    assert_eq!(outcome.verdict, Verdict::Approved);
    assert_eq!(outcome.rounds, 1);
    assert_eq!(outcome.turns, 2);
    assert_eq!(roles(&outcome), vec![MessageRole::Task, MessageRole::Artifact, MessageRole::Review]);

    let artifact = outcome.final_artifact().unwrap();
    assert_eq!(artifact.media_type, "image/png");
    assert_eq!((artifact.width, artifact.height), (16, 16));

    // The reviewer saw the image, not just text.
    assert!(reviewer.requests()[0].messages[1].content.has_image());
}

#[tokio::test]
async fn test_revision_loops_back_with_feedback() {
    let coder = coder(2);
    let reviewer = reviewer(&[REVISE, APPROVE]);
    let outcome = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5)).run("draw a stop sign").await;

    assert_eq!(outcome.state, ConversationState::Completed);
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.verdict, Verdict::Approved);

    let prompts: Vec<String> =
        coder.requests().iter().map(|r| r.messages[1].content.text()).collect();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0], "draw a stop sign");
    assert!(prompts[1].starts_with("draw a stop sign"));
    assert!(prompts[1].contains(FEEDBACK_HEADING));
    assert!(prompts[1].contains("[round 1]"));
    assert!(prompts[1].contains("draw a regular octagon"));
}

#[tokio::test]
async fn test_round_budget_of_one_aborts_after_first_revision() {
    let coder = coder(3);
    let reviewer = reviewer(&[REVISE]);
    let outcome = build(&coder, FakeExecutor::printing_png(), &reviewer, config(1)).run("draw").await;

    assert_eq!(outcome.state, ConversationState::Aborted);
    assert_eq!(outcome.finish, Finish::Aborted(AbortReason::RoundBudgetExceeded { max_rounds: 1 }));
    assert_eq!(outcome.verdict, Verdict::NeedsRevision);
    assert_eq!(outcome.rounds, 1);
    assert_eq!(roles(&outcome), vec![MessageRole::Task, MessageRole::Artifact, MessageRole::Review]);
    assert_eq!(coder.request_count(), 1);
}

#[tokio::test]
async fn test_producer_crash_aborts_without_review() {
    let coder = coder(1);
    let reviewer = reviewer(&[APPROVE]);
    let executor = FakeExecutor::crashing();
    let outcome = build(&coder, executor.clone(), &reviewer, config(5)).run("draw").await;

    assert_eq!(outcome.state, ConversationState::Aborted);
    assert_eq!(outcome.verdict, Verdict::Undetermined);
    match &outcome.finish {
        Finish::Aborted(AbortReason::AgentFailed { agent, kind, error }) => {
            assert_eq!(agent, &AgentId::new("creator"));
            assert_eq!(kind, "generation_error");
            assert!(error.contains("ModuleNotFoundError"));
        }
        other => panic!("unexpected finish: {:?}", other),
    }
    assert_eq!(roles(&outcome), vec![MessageRole::Task]);
    assert_eq!(outcome.transcript.reviews().count(), 0);
    assert_eq!(reviewer.request_count(), 0);
    assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
}

fn assert_agent_failed(outcome: &ConversationOutcome, expected_agent: &str, expected_kind: &str) -> String {
    assert_eq!(outcome.state, ConversationState::Aborted);
    assert_eq!(outcome.verdict, Verdict::Undetermined);
    match &outcome.finish {
        Finish::Aborted(AbortReason::AgentFailed { agent, kind, error }) => {
            assert_eq!(agent, &AgentId::new(expected_agent));
            assert_eq!(kind, expected_kind);
            error.clone()
        }
        other => panic!("unexpected finish: {:?}", other),
    }
}

#[tokio::test]
async fn test_script_without_code_block_aborts_before_execution() {
    let coder = Arc::new(ScriptedModel::new("coder").reply("I would draw an octagon with PIL and print it."));
    let reviewer = reviewer(&[APPROVE]);
    let executor = FakeExecutor::printing_png();
    let outcome = build(&coder, executor.clone(), &reviewer, config(5)).run("draw").await;

    let error = assert_agent_failed(&outcome, "creator", "generation_error");
    assert!(error.contains("no code block"));
    assert_eq!(roles(&outcome), vec![MessageRole::Task]);
    assert_eq!(executor.runs.load(Ordering::SeqCst), 0);
    assert_eq!(reviewer.request_count(), 0);
}

#[tokio::test]
async fn test_script_printing_no_image_aborts_without_review() {
    let coder = coder(1);
    let reviewer = reviewer(&[APPROVE]);
    let executor = FakeExecutor::printing("Saved stop sign to stop_sign.png\n");
    let outcome = build(&coder, executor.clone(), &reviewer, config(5)).run("draw").await;

    let error = assert_agent_failed(&outcome, "creator", "generation_error");
    assert!(error.contains("no valid image"));
    assert_eq!(roles(&outcome), vec![MessageRole::Task]);
    assert_eq!(outcome.final_artifact(), None);
    assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
    assert_eq!(reviewer.request_count(), 0);
}

#[tokio::test]
async fn test_empty_review_aborts_after_the_artifact() {
    let coder = coder(2);
    let reviewer = reviewer(&["   \n  ", APPROVE]);
    let outcome = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5)).run("draw").await;

    let error = assert_agent_failed(&outcome, "reviewer", "remote_model_error");
    assert!(error.contains("empty response"));
    assert_eq!(roles(&outcome), vec![MessageRole::Task, MessageRole::Artifact]);
    assert_eq!(outcome.transcript.reviews().count(), 0);
    assert!(outcome.final_artifact().is_some());
    assert_eq!(coder.request_count(), 1);
    assert_eq!(reviewer.request_count(), 1);
}

#[tokio::test]
async fn test_vision_model_error_aborts_after_the_artifact() {
    let coder = coder(2);
    let reviewer = Arc::new(
        ScriptedModel::new("vision")
            .fail(ModelError::RequestError("vision endpoint unavailable".to_string()))
            .reply(APPROVE),
    );
    let outcome = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5)).run("draw").await;

    let error = assert_agent_failed(&outcome, "reviewer", "remote_model_error");
    assert!(error.contains("vision endpoint unavailable"));
    assert_eq!(roles(&outcome), vec![MessageRole::Task, MessageRole::Artifact]);
    assert_eq!(outcome.rounds, 1);
    assert_eq!(coder.request_count(), 1);
}

#[tokio::test]
async fn test_negated_approval_keeps_the_loop_running() {
    let coder = coder(2);
    let reviewer = reviewer(&["The image is NOT APPROVED: the shape is a circle, not an octagon.", APPROVE]);
    let conversation = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5));
    let mut rx = conversation.subscribe();

    let outcome = conversation.run("draw").await;
    assert_eq!(outcome.finish, Finish::Completed(FinishReason::Approved));
    assert_eq!(outcome.rounds, 2);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, ConversationEvent::PolicyAmbiguity { round: 1, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        ConversationEvent::VerdictReached { round: 1, verdict: Verdict::Undetermined, .. }
    )));
}

#[tokio::test]
async fn test_review_without_marker_continues() {
    let coder = coder(2);
    let reviewer = reviewer(&["A red shape with some white letters on it.", APPROVE]);
    let conversation = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5));
    let mut rx = conversation.subscribe();

    let outcome = conversation.run("draw").await;
    assert_eq!(outcome.state, ConversationState::Completed);
    assert_eq!(outcome.rounds, 2);

    let events = drain(&mut rx);
    let ambiguous = events
        .iter()
        .filter(|e| matches!(e, ConversationEvent::PolicyAmbiguity { round: 1, .. }))
        .count();
    assert_eq!(ambiguous, 1);
    assert!(events.iter().any(|e| matches!(
        e,
        ConversationEvent::VerdictReached { round: 1, verdict: Verdict::Undetermined, .. }
    )));
}

#[tokio::test]
async fn test_transcript_invariants_hold_when_budget_runs_out() {
    let coder = coder(3);
    let reviewer = reviewer(&[REVISE, "no idea", REVISE]);
    let outcome = build(&coder, FakeExecutor::printing_png(), &reviewer, config(3)).run("draw").await;

    assert_eq!(outcome.finish, Finish::Aborted(AbortReason::RoundBudgetExceeded { max_rounds: 3 }));
    assert_eq!(outcome.rounds, 3);
    assert!(outcome.transcript.is_causally_ordered());

    let messages = outcome.transcript.messages();
    for pair in messages.windows(2) {
        assert!(
            !(pair[0].role == MessageRole::Artifact && pair[1].role == MessageRole::Artifact),
            "two producer turns without a review in between"
        );
        assert!(pair[0].round <= pair[1].round);
    }
    assert!(messages.iter().all(|m| m.round <= 3));
}

#[tokio::test]
async fn test_failure_is_retried_when_budget_allows() {
    let coder = Arc::new(
        ScriptedModel::new("coder")
            .fail(ModelError::RequestError("connection reset".to_string()))
            .reply(SCRIPT_REPLY),
    );
    let reviewer = reviewer(&[APPROVE]);
    let config = ConversationConfig { max_retries: 1, ..ConversationConfig::default() };
    let conversation = build(&coder, FakeExecutor::printing_png(), &reviewer, config);
    let mut rx = conversation.subscribe();

    let outcome = conversation.run("draw").await;
    assert_eq!(outcome.state, ConversationState::Completed);
    assert_eq!(coder.request_count(), 2);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, ConversationEvent::RetryScheduled { attempt: 2, .. })));
}

#[tokio::test]
async fn test_no_retries_by_default() {
    let coder = Arc::new(
        ScriptedModel::new("coder")
            .fail(ModelError::RequestError("connection reset".to_string()))
            .reply(SCRIPT_REPLY),
    );
    let reviewer = reviewer(&[APPROVE]);
    let outcome = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5)).run("draw").await;

    assert_eq!(outcome.state, ConversationState::Aborted);
    assert_eq!(coder.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_model_timeout_aborts() {
    let coder = Arc::new(ScriptedModel::new("coder").reply(SCRIPT_REPLY).with_delay(Duration::from_secs(600)));
    let reviewer = reviewer(&[APPROVE]);
    let producer_config = ProducerConfig { model_timeout: Duration::from_secs(10), ..ProducerConfig::default() };

    let outcome = Conversation::builder()
        .with_agent(
            ArtifactProducer::new("creator", coder.clone(), FakeExecutor::printing_png())
                .with_config(producer_config),
        )
        .with_agent(VisionDescriber::new("reviewer", reviewer.clone()))
        .build()
        .unwrap()
        .run("draw")
        .await;

    match outcome.finish {
        Finish::Aborted(AbortReason::AgentFailed { error, .. }) => {
            assert!(error.contains("timed out after 10s"));
        }
        other => panic!("unexpected finish: {:?}", other),
    }
}

#[tokio::test]
async fn test_stop_instruction_in_review_completes() {
    let coder = coder(1);
    let reviewer = reviewer(&["Verdict: NEEDS OPTIMIZATION\nRecommendation: TERMINATE"]);
    let outcome = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5)).run("draw").await;

    assert_eq!(outcome.state, ConversationState::Completed);
    assert_eq!(
        outcome.finish,
        Finish::Completed(FinishReason::StopRequested { agent: AgentId::new("reviewer") })
    );
    assert_eq!(outcome.verdict, Verdict::NeedsRevision);
}

#[tokio::test]
async fn test_gated_coordinator_can_stop_the_loop() {
    let coder = coder(2);
    let reviewer = reviewer(&[REVISE]);
    let gate = Arc::new(Gate { allow: false, cancel: None });

    let outcome = Conversation::builder()
        .with_agent(Coordinator::new("user").with_gate(gate))
        .with_agent(ArtifactProducer::new("creator", coder.clone(), FakeExecutor::printing_png()))
        .with_agent(VisionDescriber::new("reviewer", reviewer.clone()))
        .build()
        .unwrap()
        .run("draw")
        .await;

    assert_eq!(outcome.finish, Finish::Completed(FinishReason::StopRequested { agent: AgentId::new("user") }));
    assert_eq!(
        roles(&outcome),
        vec![MessageRole::Task, MessageRole::Artifact, MessageRole::Review, MessageRole::Control]
    );
    assert_eq!(outcome.transcript.messages()[0].sender, AgentId::new("user"));
    assert_eq!(coder.request_count(), 1);
}

#[tokio::test]
async fn test_gated_coordinator_confirms_another_round() {
    let coder = coder(2);
    let reviewer = reviewer(&[REVISE, APPROVE]);
    let gate = Arc::new(Gate { allow: true, cancel: None });

    let outcome = Conversation::builder()
        .with_agent(Coordinator::new("user").with_gate(gate))
        .with_agent(ArtifactProducer::new("creator", coder.clone(), FakeExecutor::printing_png()))
        .with_agent(VisionDescriber::new("reviewer", reviewer.clone()))
        .build()
        .unwrap()
        .run("draw")
        .await;

    assert_eq!(outcome.finish, Finish::Completed(FinishReason::Approved));
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.transcript.with_role(MessageRole::Control).count(), 1);
    assert!(outcome.transcript.is_causally_ordered());
}

#[tokio::test]
async fn test_cancellation_is_checked_between_turns() {
    let coder = coder(2);
    let reviewer = reviewer(&[REVISE, APPROVE]);
    let token = CancellationToken::new();
    let gate = Arc::new(Gate { allow: true, cancel: Some(token.clone()) });

    let outcome = Conversation::builder()
        .with_agent(Coordinator::new("user").with_gate(gate))
        .with_agent(ArtifactProducer::new("creator", coder.clone(), FakeExecutor::printing_png()))
        .with_agent(VisionDescriber::new("reviewer", reviewer.clone()))
        .with_cancellation_token(token)
        .build()
        .unwrap()
        .run("draw")
        .await;

    assert_eq!(outcome.state, ConversationState::Aborted);
    assert_eq!(outcome.finish, Finish::Aborted(AbortReason::Cancelled));
    // The turn in flight when cancellation fired still completed.
    assert_eq!(outcome.transcript.last().map(|m| m.role), Some(MessageRole::Control));
    assert_eq!(coder.request_count(), 1);
}

#[tokio::test]
async fn test_producers_take_turns() {
    let first = coder(1);
    let second = coder(1);
    let reviewer = reviewer(&[REVISE, APPROVE]);

    let outcome = Conversation::builder()
        .with_agent(ArtifactProducer::new("creator-a", first.clone(), FakeExecutor::printing_png()))
        .with_agent(ArtifactProducer::new("creator-b", second.clone(), FakeExecutor::printing_png()))
        .with_agent(VisionDescriber::new("reviewer", reviewer.clone()))
        .build()
        .unwrap()
        .run("draw")
        .await;

    let senders: Vec<&str> = outcome
        .transcript
        .with_role(MessageRole::Artifact)
        .map(|m| m.sender.as_str())
        .collect();
    assert_eq!(senders, vec!["creator-a", "creator-b"]);
}

#[tokio::test]
async fn test_event_stream_brackets_the_run() {
    let coder = coder(1);
    let reviewer = reviewer(&[APPROVE]);
    let conversation = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5));
    let id = conversation.id().to_string();
    let mut rx = conversation.subscribe();

    let outcome = conversation.run("draw").await;
    let events = drain(&mut rx);

    assert!(matches!(events.first(), Some(ConversationEvent::Started { max_rounds: 5, .. })));
    assert!(matches!(
        events.last(),
        Some(ConversationEvent::Finished { rounds: 1, turns: 2, verdict: Verdict::Approved, .. })
    ));
    assert!(events.iter().all(|e| e.conversation_id() == id));
    assert_eq!(outcome.conversation_id, id);

    let appended = events
        .iter()
        .filter(|e| matches!(e, ConversationEvent::MessageAppended { .. }))
        .count();
    assert_eq!(appended, outcome.transcript.len());
}

#[tokio::test]
async fn test_outcome_serializes_to_json() {
    let coder = coder(1);
    let reviewer = reviewer(&[APPROVE]);
    let outcome = build(&coder, FakeExecutor::printing_png(), &reviewer, config(5)).run("draw").await;

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["state"], "completed");
    assert_eq!(json["finish"]["state"], "completed");
    assert_eq!(json["finish"]["reason"]["kind"], "approved");
    assert_eq!(json["transcript"].as_array().map(Vec::len), Some(3));
    assert_eq!(json["transcript"][1]["artifact"]["media_type"], "image/png");
}
