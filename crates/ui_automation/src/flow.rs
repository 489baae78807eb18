//! Flow plan executor
//!
//! A flow plan is an ordered list of heterogeneous steps run against one
//! device session. The executor batches consecutive input primitives into a
//! single device round-trip, applies per-step retry policy to everything
//! else, and always hands back one result entry per executed step in the
//! original order. It never raises for an expected negative outcome:
//! callers inspect `ok` per step.

use crate::bridge::input;
use crate::engine::{percent_to_px, UiAutomator};
use crate::error::Result;
use crate::selector::{query, MatchMode, Selector};
use crate::snapshot::SnapshotOptions;
use crate::wait::WaitOptions;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What one step does. Closed set: anything else deserializes into
/// `Unknown` and fails at execution time instead of rejecting the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    // Input primitives, batchable into one shell round-trip
    Tap { x: i32, y: i32 },
    TapRelative { x_pct: f64, y_pct: f64 },
    TapCenter,
    Swipe { x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: Option<u32> },
    SwipeRelative {
        x1_pct: f64,
        y1_pct: f64,
        x2_pct: f64,
        y2_pct: f64,
        duration_ms: Option<u32>,
    },
    Text { text: String },
    Keyevent { key: String },
    Sleep { duration_ms: u64 },
    PressKeySequence { keys: Vec<String>, interval_ms: Option<u64> },

    // Selector-driven steps; each needs a fresh snapshot
    TapByText {
        text: String,
        #[serde(default, alias = "match_mode")]
        mode: MatchMode,
    },
    TapById { id: String },
    TapByDesc { desc: String },
    TypeById { id: String, text: String },
    WaitForText { text: String, timeout_ms: Option<u64>, interval_ms: Option<u64> },
    WaitForId { id: String, timeout_ms: Option<u64>, interval_ms: Option<u64> },
    WaitForDesc { desc: String, timeout_ms: Option<u64>, interval_ms: Option<u64> },
    WaitForTextGone { text: String, timeout_ms: Option<u64>, interval_ms: Option<u64> },
    AssertText { text: String },
    AssertId { id: String },
    AssertDesc { desc: String },

    // Activity-driven waits
    WaitForActivity { activity: String, timeout_ms: Option<u64> },
    WaitForActivityChange { timeout_ms: Option<u64> },
    WaitForPackage { package: String, timeout_ms: Option<u64> },

    #[serde(other)]
    Unknown,
}

impl StepAction {
    /// Whether this step can join a coalesced input batch. Batchable steps
    /// need the screen at most for geometry, never a fresh snapshot.
    pub fn is_batchable(&self) -> bool {
        matches!(
            self,
            StepAction::Tap { .. }
                | StepAction::TapRelative { .. }
                | StepAction::TapCenter
                | StepAction::Swipe { .. }
                | StepAction::SwipeRelative { .. }
                | StepAction::Text { .. }
                | StepAction::Keyevent { .. }
                | StepAction::Sleep { .. }
                | StepAction::PressKeySequence { .. }
        )
    }

    /// The serde tag, reused as the `type` field of results
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::Tap { .. } => "tap",
            StepAction::TapRelative { .. } => "tap_relative",
            StepAction::TapCenter => "tap_center",
            StepAction::Swipe { .. } => "swipe",
            StepAction::SwipeRelative { .. } => "swipe_relative",
            StepAction::Text { .. } => "text",
            StepAction::Keyevent { .. } => "keyevent",
            StepAction::Sleep { .. } => "sleep",
            StepAction::PressKeySequence { .. } => "press_key_sequence",
            StepAction::TapByText { .. } => "tap_by_text",
            StepAction::TapById { .. } => "tap_by_id",
            StepAction::TapByDesc { .. } => "tap_by_desc",
            StepAction::TypeById { .. } => "type_by_id",
            StepAction::WaitForText { .. } => "wait_for_text",
            StepAction::WaitForId { .. } => "wait_for_id",
            StepAction::WaitForDesc { .. } => "wait_for_desc",
            StepAction::WaitForTextGone { .. } => "wait_for_text_gone",
            StepAction::AssertText { .. } => "assert_text",
            StepAction::AssertId { .. } => "assert_id",
            StepAction::AssertDesc { .. } => "assert_desc",
            StepAction::WaitForActivity { .. } => "wait_for_activity",
            StepAction::WaitForActivityChange { .. } => "wait_for_activity_change",
            StepAction::WaitForPackage { .. } => "wait_for_package",
            StepAction::Unknown => "unknown",
        }
    }

    /// Device-side time this step spends sleeping inside a batch, so the
    /// batch round-trip timeout can cover it
    fn embedded_sleep_ms(&self) -> u64 {
        match self {
            StepAction::Sleep { duration_ms } => *duration_ms,
            StepAction::PressKeySequence { keys, interval_ms } => {
                interval_ms.unwrap_or(0) * keys.len().saturating_sub(1) as u64
            }
            StepAction::Swipe { duration_ms, .. }
            | StepAction::SwipeRelative { duration_ms, .. } => {
                u64::from(duration_ms.unwrap_or(300))
            }
            _ => 0,
        }
    }
}

/// One step of a flow plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStep {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(flatten)]
    pub action: StepAction,
}

impl From<StepAction> for FlowStep {
    fn from(action: StepAction) -> Self {
        Self {
            id: None,
            retries: None,
            action,
        }
    }
}

fn default_true() -> bool {
    true
}

/// An ordered step list plus its failure policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowPlan {
    pub steps: Vec<FlowStep>,
    #[serde(default = "default_true")]
    pub stop_on_failure: bool,
    #[serde(default)]
    pub default_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    /// Steps to run (with stop-on-failure disabled) after a step exhausts
    /// its retries; their results are appended to the main list
    #[serde(default)]
    pub on_fail: Option<Vec<FlowStep>>,
}

impl FlowPlan {
    pub fn new(steps: Vec<FlowStep>) -> Self {
        Self {
            steps,
            stop_on_failure: true,
            default_retries: None,
            retry_delay_ms: None,
            on_fail: None,
        }
    }
}

/// One entry per executed step, in original order
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub step_type: String,
    pub ok: bool,
    pub message: Option<String>,
    pub elapsed_ms: Option<u64>,
}

/// Terminal state of one executor invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Completed,
    HaltedOnFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowOutcome {
    pub state: FlowState,
    pub results: Vec<StepResult>,
}

type StepOutcome = std::result::Result<Option<String>, String>;

impl UiAutomator {
    /// Run a flow plan to one terminal state. Never raises: every failure
    /// lands in the result list.
    pub async fn run_flow_plan(&self, plan: &FlowPlan) -> FlowOutcome {
        let mut results = Vec::with_capacity(plan.steps.len());
        let mut batch: Vec<&FlowStep> = Vec::new();

        for (index, step) in plan.steps.iter().enumerate() {
            if step.action.is_batchable() {
                batch.push(step);
                continue;
            }

            if !self.flush_batch(&mut batch, &mut results).await {
                self.run_on_fail(plan, &mut results).await;
                if plan.stop_on_failure {
                    return FlowOutcome {
                        state: FlowState::HaltedOnFailure,
                        results,
                    };
                }
            }

            debug!(index, kind = step.action.kind(), "flow step");
            let result = self.run_single(step, plan).await;
            let ok = result.ok;
            results.push(result);

            if !ok {
                warn!(index, kind = step.action.kind(), "flow step failed");
                self.run_on_fail(plan, &mut results).await;
                if plan.stop_on_failure {
                    return FlowOutcome {
                        state: FlowState::HaltedOnFailure,
                        results,
                    };
                }
            }
        }

        if !self.flush_batch(&mut batch, &mut results).await {
            self.run_on_fail(plan, &mut results).await;
            if plan.stop_on_failure {
                return FlowOutcome {
                    state: FlowState::HaltedOnFailure,
                    results,
                };
            }
        }

        info!(steps = results.len(), "flow plan completed");
        FlowOutcome {
            state: FlowState::Completed,
            results,
        }
    }

    async fn run_on_fail(&self, plan: &FlowPlan, results: &mut Vec<StepResult>) {
        let Some(steps) = &plan.on_fail else {
            return;
        };
        info!(steps = steps.len(), "running on-fail sub-plan");
        let sub = FlowPlan {
            steps: steps.clone(),
            stop_on_failure: false,
            default_retries: plan.default_retries,
            retry_delay_ms: plan.retry_delay_ms,
            on_fail: None,
        };
        // Recursion bottoms out because the sub-plan carries no on_fail
        let outcome = Box::pin(self.run_flow_plan(&sub)).await;
        results.extend(outcome.results);
    }

    /// Coalesce pending input primitives into one shell command. Every
    /// member of a successful batch reports ok; a failed batch fails them
    /// all with the same message.
    async fn flush_batch(
        &self,
        batch: &mut Vec<&FlowStep>,
        results: &mut Vec<StepResult>,
    ) -> bool {
        if batch.is_empty() {
            return true;
        }

        let started = Instant::now();
        let outcome = self.execute_batch(batch).await;
        let elapsed = started.elapsed().as_millis() as u64;
        let ok = outcome.is_ok();
        let message = outcome.err();

        for step in batch.drain(..) {
            results.push(StepResult {
                id: step.id.clone(),
                step_type: step.action.kind().to_string(),
                ok,
                message: message.clone(),
                elapsed_ms: Some(elapsed),
            });
        }

        if ok {
            // The inputs changed the screen; drop the stale snapshot
            self.cache().invalidate(self.device_id()).await;
        }
        ok
    }

    async fn execute_batch(&self, batch: &[&FlowStep]) -> std::result::Result<(), String> {
        let mut fragments = Vec::with_capacity(batch.len());
        let mut embedded_ms = 0u64;
        for step in batch {
            fragments.push(
                self.batch_fragment(&step.action)
                    .await
                    .map_err(|e| e.to_string())?,
            );
            embedded_ms += step.action.embedded_sleep_ms();
        }

        let command = fragments.join(" && ");
        debug!(steps = batch.len(), command, "flushing input batch");
        let timeout =
            Duration::from_millis(self.config().command.command_timeout_ms + embedded_ms);
        self.bridge()
            .execute(self.device_id(), &command, timeout)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Shell fragment for one batchable step; relative geometry resolves
    /// against the cached screen size at flush time
    async fn batch_fragment(&self, action: &StepAction) -> Result<String> {
        Ok(match action {
            StepAction::Tap { x, y } => input::tap(*x, *y),
            StepAction::TapRelative { x_pct, y_pct } => {
                let (w, h) = self.screen_size().await?;
                input::tap(percent_to_px(*x_pct, w), percent_to_px(*y_pct, h))
            }
            StepAction::TapCenter => {
                let (w, h) = self.screen_size().await?;
                input::tap((w / 2) as i32, (h / 2) as i32)
            }
            StepAction::Swipe { x1, y1, x2, y2, duration_ms } => {
                input::swipe(*x1, *y1, *x2, *y2, *duration_ms)
            }
            StepAction::SwipeRelative { x1_pct, y1_pct, x2_pct, y2_pct, duration_ms } => {
                let (w, h) = self.screen_size().await?;
                input::swipe(
                    percent_to_px(*x1_pct, w),
                    percent_to_px(*y1_pct, h),
                    percent_to_px(*x2_pct, w),
                    percent_to_px(*y2_pct, h),
                    *duration_ms,
                )
            }
            StepAction::Text { text } => input::text(text),
            StepAction::Keyevent { key } => input::keyevent(key),
            StepAction::Sleep { duration_ms } => input::sleep(*duration_ms),
            StepAction::PressKeySequence { keys, interval_ms } => {
                input::key_sequence(keys, *interval_ms)
            }
            // Only batchable actions reach this function
            other => {
                return Err(crate::error::AutomationError::CommandFailed(format!(
                    "step kind {} is not batchable",
                    other.kind()
                )))
            }
        })
    }

    /// Run one non-batchable step under its retry policy
    async fn run_single(&self, step: &FlowStep, plan: &FlowPlan) -> StepResult {
        let started = Instant::now();

        if matches!(step.action, StepAction::Unknown) {
            return StepResult {
                id: step.id.clone(),
                step_type: step.action.kind().to_string(),
                ok: false,
                message: Some("Unknown step type".to_string()),
                elapsed_ms: Some(0),
            };
        }

        let attempts = step
            .retries
            .or(plan.default_retries)
            .unwrap_or(self.config().flow.default_step_retries)
            + 1;
        let delay = Duration::from_millis(
            plan.retry_delay_ms.unwrap_or(self.config().flow.retry_delay_ms),
        );

        let mut last_failure = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                debug!(attempt, kind = step.action.kind(), "retrying step");
                tokio::time::sleep(delay).await;
            }

            match self.execute_action(&step.action).await {
                Ok(message) => {
                    return StepResult {
                        id: step.id.clone(),
                        step_type: step.action.kind().to_string(),
                        ok: true,
                        message,
                        elapsed_ms: Some(started.elapsed().as_millis() as u64),
                    }
                }
                Err(failure) => last_failure = failure,
            }
        }

        StepResult {
            id: step.id.clone(),
            step_type: step.action.kind().to_string(),
            ok: false,
            message: Some(last_failure),
            elapsed_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    async fn execute_action(&self, action: &StepAction) -> StepOutcome {
        match action {
            StepAction::TapByText { text, mode } => {
                self.tap_selector_step(&Selector::text(text).with_mode(*mode)).await
            }
            StepAction::TapById { id } => {
                self.tap_selector_step(&Selector::resource_id(id)).await
            }
            StepAction::TapByDesc { desc } => {
                self.tap_selector_step(&Selector::content_desc(desc)).await
            }
            StepAction::TypeById { id, text } => match self.type_by_id(id, text).await {
                Ok(true) => Ok(None),
                Ok(false) => Err(format!("No input field with id {:?}", id)),
                Err(e) => Err(e.to_string()),
            },
            StepAction::WaitForText { text, timeout_ms, interval_ms } => {
                self.wait_selector_step(&Selector::text(text), *timeout_ms, *interval_ms).await
            }
            StepAction::WaitForId { id, timeout_ms, interval_ms } => {
                self.wait_selector_step(&Selector::resource_id(id), *timeout_ms, *interval_ms)
                    .await
            }
            StepAction::WaitForDesc { desc, timeout_ms, interval_ms } => {
                self.wait_selector_step(&Selector::content_desc(desc), *timeout_ms, *interval_ms)
                    .await
            }
            StepAction::WaitForTextGone { text, timeout_ms, interval_ms } => {
                let options = wait_options(*timeout_ms, *interval_ms);
                match self.wait_for_gone(&Selector::text(text), &options).await {
                    Ok(r) if r.found => Ok(None),
                    Ok(r) => Err(format!(
                        "Timed out after {}ms waiting for {:?} to disappear",
                        r.elapsed_ms, text
                    )),
                    Err(e) => Err(e.to_string()),
                }
            }
            StepAction::AssertText { text } => self.assert_selector_step(&Selector::text(text)).await,
            StepAction::AssertId { id } => {
                self.assert_selector_step(&Selector::resource_id(id)).await
            }
            StepAction::AssertDesc { desc } => {
                self.assert_selector_step(&Selector::content_desc(desc)).await
            }
            StepAction::WaitForActivity { activity, timeout_ms } => {
                let options = wait_options(*timeout_ms, None);
                match self.wait_for_activity(activity, &options).await {
                    Ok(r) if r.found => Ok(r.activity),
                    Ok(r) => Err(format!(
                        "Timed out waiting for activity {:?}; last seen {:?}",
                        activity, r.activity
                    )),
                    Err(e) => Err(e.to_string()),
                }
            }
            StepAction::WaitForActivityChange { timeout_ms } => {
                let options = wait_options(*timeout_ms, None);
                match self.wait_for_activity_change(&options).await {
                    Ok(r) if r.found => Ok(r.activity),
                    Ok(_) => Err("Timed out waiting for activity change".to_string()),
                    Err(e) => Err(e.to_string()),
                }
            }
            StepAction::WaitForPackage { package, timeout_ms } => {
                let options = wait_options(*timeout_ms, None);
                match self.wait_for_package(package, &options).await {
                    Ok(r) if r.found => Ok(r.activity),
                    Ok(r) => Err(format!(
                        "Timed out waiting for package {:?}; last seen {:?}",
                        package, r.activity
                    )),
                    Err(e) => Err(e.to_string()),
                }
            }
            StepAction::Unknown => Err("Unknown step type".to_string()),
            // Batchable kinds run through the batch path even when alone
            batchable => {
                let fragment = self
                    .batch_fragment(batchable)
                    .await
                    .map_err(|e| e.to_string())?;
                self.shell(&fragment).await.map_err(|e| e.to_string())?;
                Ok(None)
            }
        }
    }

    async fn tap_selector_step(&self, selector: &Selector) -> StepOutcome {
        match self.tap_by_selector(selector).await {
            Ok(Some(report)) if report.point.is_some() => {
                Ok(Some(format!("tapped via {:?}", report.resolution.reason)))
            }
            Ok(Some(_)) => Err(format!("Node matching {} has no bounds", selector)),
            Ok(None) => Err(format!("No node matching {}", selector)),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn wait_selector_step(
        &self,
        selector: &Selector,
        timeout_ms: Option<u64>,
        interval_ms: Option<u64>,
    ) -> StepOutcome {
        match self.wait_for(selector, &wait_options(timeout_ms, interval_ms)).await {
            Ok(r) if r.found => Ok(None),
            Ok(r) => Err(format!(
                "Timed out after {}ms waiting for {}",
                r.elapsed_ms, selector
            )),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Single-shot presence check against a fresh snapshot
    async fn assert_selector_step(&self, selector: &Selector) -> StepOutcome {
        let snapshot = match self.snapshot(&SnapshotOptions::fresh()).await {
            Ok(s) => s,
            Err(e) => return Err(e.to_string()),
        };
        if query(&snapshot.nodes, selector).is_empty() {
            Err(format!("Assertion failed: no node matching {}", selector))
        } else {
            Ok(None)
        }
    }
}

fn wait_options(timeout_ms: Option<u64>, interval_ms: Option<u64>) -> WaitOptions {
    WaitOptions {
        timeout_ms,
        interval_ms,
        cancel: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBridge;
    use std::sync::Arc;

    const SCREEN: &str = r#"<hierarchy>
<node text="Welcome" clickable="true" bounds="[100,100][500,200]" />
<node text="" resource-id="com.app:id/field" class="android.widget.EditText" clickable="true" bounds="[100,400][900,500]" />
</hierarchy>"#;

    fn fast_engine(bridge: Arc<FakeBridge>) -> UiAutomator {
        let mut config = crate::config::EngineConfig::default();
        config.snapshot.poll_interval_ms = 10;
        config.snapshot.default_wait_timeout_ms = 50;
        config.flow.retry_delay_ms = 5;
        UiAutomator::with_config(bridge, "dev", config)
    }

    fn step(action: StepAction) -> FlowStep {
        action.into()
    }

    #[tokio::test]
    async fn test_batching_coalesces_primitives() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![SCREEN]));
        let engine = fast_engine(bridge.clone());

        let plan = FlowPlan::new(vec![
            step(StepAction::Tap { x: 10, y: 20 }),
            step(StepAction::Sleep { duration_ms: 100 }),
            step(StepAction::Keyevent { key: "BACK".to_string() }),
        ]);
        let outcome = engine.run_flow_plan(&plan).await;

        assert_eq!(outcome.state, FlowState::Completed);
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results.iter().all(|r| r.ok));
        // All three primitives travel as one round trip
        assert_eq!(
            bridge.executed(),
            vec!["input tap 10 20 && sleep 0.100 && input keyevent 4".to_string()]
        );
    }

    #[tokio::test]
    async fn test_selector_step_flushes_pending_batch() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![SCREEN]));
        let engine = fast_engine(bridge.clone());

        let plan = FlowPlan::new(vec![
            step(StepAction::Tap { x: 1, y: 2 }),
            step(StepAction::TapByText {
                text: "Welcome".to_string(),
                mode: MatchMode::Contains,
            }),
            step(StepAction::Tap { x: 3, y: 4 }),
        ]);
        let outcome = engine.run_flow_plan(&plan).await;

        assert_eq!(outcome.state, FlowState::Completed);
        assert_eq!(outcome.results.len(), 3);
        let commands = bridge.executed();
        // Original ordering preserved: batch, selector tap, trailing batch
        assert_eq!(commands[0], "input tap 1 2");
        assert_eq!(commands[1], "input tap 300 150");
        assert_eq!(commands[2], "input tap 3 4");
    }

    #[tokio::test]
    async fn test_failed_selector_step_halts_after_retries() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![SCREEN]));
        let engine = fast_engine(bridge.clone());

        let mut failing = step(StepAction::TapByText {
            text: "No such button".to_string(),
            mode: MatchMode::Contains,
        });
        failing.retries = Some(2);

        let plan = FlowPlan::new(vec![
            step(StepAction::Tap { x: 1, y: 1 }),
            step(StepAction::Tap { x: 2, y: 2 }),
            step(StepAction::Tap { x: 3, y: 3 }),
            failing,
            step(StepAction::Tap { x: 9, y: 9 }), // must never run
        ]);
        let outcome = engine.run_flow_plan(&plan).await;

        assert_eq!(outcome.state, FlowState::HaltedOnFailure);
        assert_eq!(outcome.results.len(), 4);
        assert!(outcome.results[..3].iter().all(|r| r.ok));
        assert!(!outcome.results[3].ok);
        assert!(outcome.results[3]
            .message
            .as_deref()
            .unwrap()
            .contains("No node matching"));
        // 3 snapshot fetches: one per attempt (1 + 2 retries)
        assert_eq!(bridge.dump_count(), 3);
        // The 5th step never produced a command
        assert!(!bridge.executed().iter().any(|c| c.contains("9 9")));
    }

    #[tokio::test]
    async fn test_continue_past_failure_when_not_stopping() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![SCREEN]));
        let engine = fast_engine(bridge.clone());

        let mut plan = FlowPlan::new(vec![
            step(StepAction::AssertText { text: "absent".to_string() }),
            step(StepAction::Tap { x: 5, y: 5 }),
        ]);
        plan.stop_on_failure = false;
        let outcome = engine.run_flow_plan(&plan).await;

        assert_eq!(outcome.state, FlowState::Completed);
        assert_eq!(outcome.results.len(), 2);
        assert!(!outcome.results[0].ok);
        assert!(outcome.results[1].ok);
    }

    #[tokio::test]
    async fn test_on_fail_subplan_results_appended() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![SCREEN]));
        let engine = fast_engine(bridge.clone());

        let mut plan = FlowPlan::new(vec![step(StepAction::AssertText {
            text: "absent".to_string(),
        })]);
        plan.on_fail = Some(vec![step(StepAction::Keyevent { key: "HOME".to_string() })]);
        let outcome = engine.run_flow_plan(&plan).await;

        assert_eq!(outcome.state, FlowState::HaltedOnFailure);
        assert_eq!(outcome.results.len(), 2);
        assert!(!outcome.results[0].ok);
        assert_eq!(outcome.results[1].step_type, "keyevent");
        assert!(outcome.results[1].ok);
        assert!(bridge.executed().contains(&"input keyevent 3".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_step_fails_without_halting_others_before_it() {
        let json = r#"{
            "steps": [
                { "type": "tap", "x": 1, "y": 2 },
                { "type": "quantum_entangle", "qubits": 3 }
            ],
            "stop_on_failure": true
        }"#;
        let plan: FlowPlan = serde_json::from_str(json).unwrap();
        assert!(matches!(plan.steps[1].action, StepAction::Unknown));

        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![SCREEN]));
        let engine = fast_engine(bridge);
        let outcome = engine.run_flow_plan(&plan).await;

        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].ok);
        assert!(!outcome.results[1].ok);
        assert_eq!(
            outcome.results[1].message.as_deref(),
            Some("Unknown step type")
        );
        assert_eq!(outcome.state, FlowState::HaltedOnFailure);
    }

    #[tokio::test]
    async fn test_wait_step_succeeds_within_timeout() {
        let loaded = r#"<hierarchy><node text="Ready" bounds="[0,0][10,10]" /></hierarchy>"#;
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![SCREEN, SCREEN, loaded]));
        let engine = fast_engine(bridge);

        let plan = FlowPlan::new(vec![step(StepAction::WaitForText {
            text: "Ready".to_string(),
            timeout_ms: Some(2000),
            interval_ms: Some(10),
        })]);
        let outcome = engine.run_flow_plan(&plan).await;
        assert_eq!(outcome.state, FlowState::Completed);
        assert!(outcome.results[0].ok);
    }

    #[tokio::test]
    async fn test_type_by_id_step() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![SCREEN]));
        let engine = fast_engine(bridge.clone());

        let plan = FlowPlan::new(vec![step(StepAction::TypeById {
            id: "com.app:id/field".to_string(),
            text: "hello world".to_string(),
        })]);
        let outcome = engine.run_flow_plan(&plan).await;

        assert_eq!(outcome.state, FlowState::Completed);
        let commands = bridge.executed();
        assert_eq!(commands[0], "input tap 500 450");
        assert_eq!(commands[1], "input text 'hello%sworld'");
    }

    #[test]
    fn test_plan_json_round_trip() {
        let json = r#"{
            "steps": [
                { "id": "open", "type": "tap_by_text", "text": "Settings" },
                { "type": "swipe_relative", "x1_pct": 50, "y1_pct": 80, "x2_pct": 50, "y2_pct": 20 },
                { "type": "wait_for_activity", "activity": ".Settings", "timeout_ms": 3000 },
                { "type": "press_key_sequence", "keys": ["TAB", "ENTER"], "retries": 1 }
            ]
        }"#;
        let plan: FlowPlan = serde_json::from_str(json).unwrap();
        assert!(plan.stop_on_failure, "stop_on_failure defaults true");
        assert_eq!(plan.steps.len(), 4);
        assert_eq!(plan.steps[0].id.as_deref(), Some("open"));
        assert_eq!(plan.steps[3].retries, Some(1));
        assert!(plan.steps[1].action.is_batchable());
        assert!(!plan.steps[2].action.is_batchable());
    }
}
