//! Integration tests for the action-decision loop.
//!
//! The oracle, screen and performer are scripted fakes, so every scenario
//! is deterministic and runs without a browser or network.

use async_trait::async_trait;
use pilot_agent::{Oracle, Prompt};
use pilot_core::{
    Action, ActionKind, ActionPerformer, PilotError, Result, ScreenSource, ScreenState,
};
use pilot_orchestrator::{
    ActionDecisionLoop, CancelFlag, LoopConfig, LoopState, ProjectContextLoader, StopReason,
};
use pilot_validation::Backoff;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const CLICK: &str = r#"{"kind": "click", "description": "press search", "parameters": {"x": 120, "y": 48}}"#;
const DONE: &str = r#"{"kind": "done", "description": "lamp is in the cart"}"#;

/// Replays scripted replies, then repeats the fallback forever
struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    fn new(replies: &[&str], fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            fallback: fallback.to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn always(reply: &str) -> Arc<Self> {
        Self::new(&[], reply)
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: DONE.to_string(),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn chat(&self, prompt: &Prompt, json_mode: bool) -> Result<String> {
        assert!(json_mode);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.text.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

struct FailingOracle;

#[async_trait]
impl Oracle for FailingOracle {
    async fn chat(&self, _prompt: &Prompt, _json_mode: bool) -> Result<String> {
        Err(PilotError::Api("connection refused".to_string()))
    }
}

struct FakeScreen {
    broken: bool,
}

#[async_trait]
impl ScreenSource for FakeScreen {
    async fn capture(&self) -> Result<ScreenState> {
        if self.broken {
            return Err(PilotError::Capture("display went away".to_string()));
        }
        Ok(ScreenState::new(
            vec![0x89, b'P', b'N', b'G'],
            "URL: https://shop.test\nTitle: Shop",
        ))
    }
}

/// Records every action; optionally fails or cancels on the first one
#[derive(Default)]
struct RecordingPerformer {
    performed: Mutex<Vec<ActionKind>>,
    fail_first: bool,
    cancel_on_perform: Option<CancelFlag>,
    kinds: Option<Vec<ActionKind>>,
}

impl RecordingPerformer {
    fn count(&self) -> usize {
        self.performed.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionPerformer for RecordingPerformer {
    async fn perform(&self, action: &Action) -> Result<()> {
        let mut performed = self.performed.lock().unwrap();
        performed.push(action.kind());

        if let Some(flag) = &self.cancel_on_perform {
            flag.cancel();
        }
        if self.fail_first && performed.len() == 1 {
            return Err(PilotError::Execution("element not found".to_string()));
        }
        Ok(())
    }

    fn supported_kinds(&self) -> Vec<ActionKind> {
        self.kinds.clone().unwrap_or_else(|| ActionKind::ALL.to_vec())
    }
}

fn test_config() -> LoopConfig {
    LoopConfig {
        max_steps: 15,
        history_window: 10,
        json_retries: 3,
        action_retries: 2,
        retry_backoff: Backoff::None,
        oracle_timeout: Duration::from_secs(30),
        command_timeout: None,
    }
}

fn decision_loop(
    oracle: Arc<dyn Oracle>,
    performer: Arc<RecordingPerformer>,
    config: LoopConfig,
) -> ActionDecisionLoop {
    ActionDecisionLoop::new(
        oracle,
        Arc::new(FakeScreen { broken: false }),
        performer,
        config,
    )
}

#[tokio::test]
async fn test_done_on_first_call_executes_nothing() {
    let oracle = ScriptedOracle::always(DONE);
    let performer = Arc::new(RecordingPerformer::default());
    let report = decision_loop(oracle.clone(), performer.clone(), test_config())
        .run("buy a lamp")
        .await;

    assert!(report.is_done());
    assert_eq!(
        report.state,
        LoopState::Done {
            summary: "lamp is in the cart".to_string()
        }
    );
    assert_eq!(report.stop_reason, StopReason::Completed);
    assert!(report.history.is_empty());
    assert_eq!(report.steps, 1);
    assert_eq!(report.diagnostic, None);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(performer.count(), 0);
}

#[tokio::test]
async fn test_always_malformed_json_aborts_after_json_budget() {
    let oracle = ScriptedOracle::always("Sure! I would click the search button.");
    let performer = Arc::new(RecordingPerformer::default());
    let report = decision_loop(oracle.clone(), performer.clone(), test_config())
        .run("buy a lamp")
        .await;

    assert!(matches!(report.state, LoopState::Aborted { .. }));
    assert_eq!(report.stop_reason, StopReason::MalformedResponse);
    let diagnostic = report.diagnostic.unwrap();
    assert!(diagnostic.contains("JSON"), "{}", diagnostic);
    assert!(diagnostic.contains("3 attempts"), "{}", diagnostic);
    assert!(report.history.is_empty());
    assert_eq!(oracle.calls(), 3);
    assert_eq!(performer.count(), 0);
}

#[tokio::test]
async fn test_step_ceiling_aborts_after_exactly_max_steps() {
    let oracle = ScriptedOracle::always(CLICK);
    let performer = Arc::new(RecordingPerformer::default());
    let config = LoopConfig {
        max_steps: 3,
        ..test_config()
    };
    let report = decision_loop(oracle.clone(), performer.clone(), config)
        .run("keep clicking")
        .await;

    assert_eq!(report.stop_reason, StopReason::StepBudgetExhausted);
    assert!(report.diagnostic.unwrap().contains("budget exhausted"));
    assert_eq!(report.history.len(), 3);
    assert_eq!(report.steps, 3);
    assert_eq!(performer.count(), 3);
    assert_eq!(oracle.calls(), 3);

    let steps: Vec<usize> = report
        .history
        .outcomes()
        .iter()
        .map(|o| o.attempted_at)
        .collect();
    assert_eq!(steps, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_repairable_reply_is_accepted_first_time() {
    let fenced = "```json\n{\"kind\": \"type_text\", \"parameters\": {\"text\": \"lamp\", \"submit\": True,},}\n```";
    let oracle = ScriptedOracle::new(&[fenced], DONE);
    let performer = Arc::new(RecordingPerformer::default());
    let report = decision_loop(oracle.clone(), performer.clone(), test_config())
        .run("search for a lamp")
        .await;

    assert!(report.is_done());
    assert_eq!(oracle.calls(), 2);
    assert_eq!(
        *performer.performed.lock().unwrap(),
        vec![ActionKind::TypeText]
    );
}

#[tokio::test]
async fn test_invalid_action_is_retried() {
    let oracle = ScriptedOracle::new(&[r#"{"kind": "fly", "parameters": {}}"#, CLICK], DONE);
    let performer = Arc::new(RecordingPerformer::default());
    let report = decision_loop(oracle.clone(), performer.clone(), test_config())
        .run("buy a lamp")
        .await;

    assert!(report.is_done());
    assert_eq!(oracle.calls(), 3);
    assert_eq!(report.history.len(), 1);
    assert_eq!(report.history.outcomes()[0].action.kind(), ActionKind::Click);
}

#[tokio::test]
async fn test_each_action_attempt_gets_a_fresh_json_budget() {
    // Two unparseable replies use up most of the JSON budget (3) before an
    // unknown kind spends one action attempt (of 2). The second action
    // attempt starts a new JSON budget and survives two more bad replies.
    let oracle = ScriptedOracle::new(
        &["bad", "bad", r#"{"kind": "fly"}"#, "bad", "bad", CLICK],
        DONE,
    );
    let performer = Arc::new(RecordingPerformer::default());
    let report = decision_loop(oracle.clone(), performer.clone(), test_config())
        .run("buy a lamp")
        .await;

    assert!(report.is_done());
    assert!(matches!(report.state, LoopState::Done { .. }));
    assert_eq!(oracle.calls(), 7);
    assert_eq!(performer.count(), 1);
    assert_eq!(report.history.outcomes()[0].action.kind(), ActionKind::Click);
}

#[tokio::test]
async fn test_unsupported_kind_is_not_offered_and_is_re_asked() {
    let oracle = ScriptedOracle::new(
        &[r#"{"kind": "open_app", "parameters": {"app_name": "Mail"}}"#],
        DONE,
    );
    let performer = Arc::new(RecordingPerformer {
        kinds: Some(vec![ActionKind::Navigate, ActionKind::Click]),
        ..RecordingPerformer::default()
    });
    let report = decision_loop(oracle.clone(), performer.clone(), test_config())
        .run("check my mail")
        .await;

    assert!(report.is_done());
    assert_eq!(oracle.calls(), 2);
    assert_eq!(performer.count(), 0);

    let prompt = oracle.last_prompt();
    assert!(!prompt.contains("open_app"));
    assert!(prompt.contains("navigate: url (string)"));
}

#[tokio::test]
async fn test_action_budget_exhaustion_aborts() {
    let oracle = ScriptedOracle::always(r#"{"kind": "click", "parameters": {"x": "left"}}"#);
    let performer = Arc::new(RecordingPerformer::default());
    let report = decision_loop(oracle.clone(), performer.clone(), test_config())
        .run("buy a lamp")
        .await;

    assert_eq!(report.stop_reason, StopReason::InvalidAction);
    assert!(report.diagnostic.unwrap().contains("no valid action after 2 attempts"));
    // Every reply parsed, so each action attempt made exactly one oracle call
    assert_eq!(oracle.calls(), 2);
    assert_eq!(performer.count(), 0);
}

#[tokio::test]
async fn test_failed_action_is_recorded_and_loop_continues() {
    let oracle = ScriptedOracle::new(&[CLICK, CLICK], DONE);
    let performer = Arc::new(RecordingPerformer {
        fail_first: true,
        ..Default::default()
    });
    let report = decision_loop(oracle.clone(), performer.clone(), test_config())
        .run("buy a lamp")
        .await;

    assert!(report.is_done());
    assert_eq!(report.history.len(), 2);
    assert_eq!(report.history.failure_count(), 1);

    let first = &report.history.outcomes()[0];
    assert!(!first.succeeded);
    assert!(first.error.as_deref().unwrap().contains("element not found"));

    // The failure is shown to the oracle on the next step
    assert!(oracle.last_prompt().contains("FAILED"));
}

#[tokio::test]
async fn test_capture_failure_aborts_before_oracle_call() {
    let oracle = ScriptedOracle::always(CLICK);
    let performer = Arc::new(RecordingPerformer::default());
    let report = ActionDecisionLoop::new(
        oracle.clone(),
        Arc::new(FakeScreen { broken: true }),
        performer.clone(),
        test_config(),
    )
    .run("buy a lamp")
    .await;

    assert_eq!(report.stop_reason, StopReason::CollaboratorFailure);
    assert!(report.diagnostic.unwrap().contains("display went away"));
    assert_eq!(oracle.calls(), 0);
    assert_eq!(performer.count(), 0);
}

#[tokio::test]
async fn test_oracle_transport_error_aborts() {
    let performer = Arc::new(RecordingPerformer::default());
    let report = decision_loop(Arc::new(FailingOracle), performer.clone(), test_config())
        .run("buy a lamp")
        .await;

    assert_eq!(report.stop_reason, StopReason::CollaboratorFailure);
    assert!(report.diagnostic.unwrap().contains("connection refused"));
    assert_eq!(performer.count(), 0);
}

#[tokio::test]
async fn test_cancelled_before_first_step() {
    let oracle = ScriptedOracle::always(CLICK);
    let performer = Arc::new(RecordingPerformer::default());
    let cancel = CancelFlag::new();
    cancel.cancel();

    let report = decision_loop(oracle.clone(), performer, test_config())
        .run_with_cancel("buy a lamp", &cancel)
        .await;

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.steps, 0);
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_action_stops_at_next_step() {
    let oracle = ScriptedOracle::always(CLICK);
    let cancel = CancelFlag::new();
    let performer = Arc::new(RecordingPerformer {
        cancel_on_perform: Some(cancel.clone()),
        ..Default::default()
    });

    let report = decision_loop(oracle.clone(), performer.clone(), test_config())
        .run_with_cancel("buy a lamp", &cancel)
        .await;

    // The in-flight action completes and is recorded
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.history.len(), 1);
    assert!(report.history.outcomes()[0].succeeded);
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_oracle_timeout_counts_as_invalid_attempt() {
    let oracle = ScriptedOracle::slow(Duration::from_secs(60));
    let performer = Arc::new(RecordingPerformer::default());
    let config = LoopConfig {
        oracle_timeout: Duration::from_secs(5),
        ..test_config()
    };

    let report = decision_loop(oracle.clone(), performer, config)
        .run("buy a lamp")
        .await;

    assert_eq!(report.stop_reason, StopReason::MalformedResponse);
    assert!(report.diagnostic.unwrap().contains("timed out after 5s"));
    assert_eq!(oracle.calls(), 3);
}

#[tokio::test]
async fn test_wall_clock_ceiling() {
    let oracle = ScriptedOracle::always(CLICK);
    let performer = Arc::new(RecordingPerformer::default());
    let config = LoopConfig {
        command_timeout: Some(Duration::ZERO),
        ..test_config()
    };

    let report = decision_loop(oracle.clone(), performer, config)
        .run("buy a lamp")
        .await;

    assert_eq!(report.stop_reason, StopReason::TimedOut);
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn test_custom_command_expands_from_context_file() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("PILOT.md"),
        "# Storefront\n\n## Custom Commands\n- \"deploy\" → git push origin main\n\n## Instructions\n- Use the staging site\n",
    )
    .unwrap();

    let loader = ProjectContextLoader::default();
    let context = loader.get_or_load(temp.path());
    assert_eq!(
        context.as_ref().unwrap().custom_commands["deploy"],
        "git push origin main"
    );

    let oracle = ScriptedOracle::always(DONE);
    let engine = decision_loop(
        oracle.clone(),
        Arc::new(RecordingPerformer::default()),
        test_config(),
    )
    .with_project_context(context);

    let report = engine.run("  Deploy ").await;
    assert_eq!(report.goal, "git push origin main");

    let prompt = oracle.last_prompt();
    assert!(prompt.contains("## TASK\n\ngit push origin main"));
    assert!(prompt.contains("## PROJECT CONTEXT: Storefront"));
    assert!(prompt.contains("- Use the staging site"));
}

#[tokio::test]
async fn test_no_context_is_a_no_op() {
    let oracle = ScriptedOracle::always(DONE);
    let engine = decision_loop(
        oracle.clone(),
        Arc::new(RecordingPerformer::default()),
        test_config(),
    )
    .with_project_context(None);

    let report = engine.run("deploy").await;
    assert_eq!(report.goal, "deploy");
    assert!(!oracle.last_prompt().contains("PROJECT CONTEXT"));
}

#[tokio::test]
async fn test_activity_log_records_command() {
    let temp = TempDir::new().unwrap();
    let pilot_dir = temp.path().join(".pilot");

    let oracle = ScriptedOracle::new(&[CLICK], DONE);
    let report = decision_loop(
        oracle,
        Arc::new(RecordingPerformer::default()),
        test_config(),
    )
    .with_activity_logging(pilot_dir.clone())
    .run("buy a lamp")
    .await;
    assert!(report.is_done());

    let log = std::fs::read_to_string(pilot_dir.join("activity.md")).unwrap();
    assert!(log.contains("## Command: buy a lamp"));
    assert!(log.contains(&format!("**Run**: {}", report.run_id)));
    assert!(log.contains("### Step 1 ✓"));
    assert!(log.contains("**State**: ✓ DONE"));
}
