use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::agent_engine::decision::{DecisionEngine, Verdict};
use crate::agent_engine::install::AppCatalog;
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{Mode, Session, TaskOutcome};
use crate::config::{AppConfig, TimingConfig};
use crate::errors::PilotResult;
use crate::executor::dispatcher::{Action, ActionTranslator};
use crate::executor::input::InputInjector;
use crate::llm::provider::LlmProvider;
use crate::perception::pipeline::{Observer, TickOutcome};
use crate::perception::traits::{ControlDetector, ScreenCapture};
use crate::perception::types::Observation;
use crate::ui::console::Console;
use crate::ui::viewer::FrameView;
use crate::vm::VmControl;

/// Everything the loop drives. Built once at startup.
pub struct Collaborators {
    pub capture: Box<dyn ScreenCapture>,
    pub detector: Box<dyn ControlDetector>,
    pub injector: Box<dyn InputInjector>,
    pub view: Box<dyn FrameView>,
    pub console: Box<dyn Console>,
    pub vm: Box<dyn VmControl>,
    pub provider: Box<dyn LlmProvider>,
}

pub struct AgentEngine {
    pub(super) session: Session,
    pub(super) observer: Observer,
    pub(super) decisions: DecisionEngine,
    pub(super) translator: ActionTranslator,
    pub(super) injector: Box<dyn InputInjector>,
    pub(super) view: Box<dyn FrameView>,
    pub(super) console: Box<dyn Console>,
    pub(super) vm: Box<dyn VmControl>,
    pub(super) catalog: AppCatalog,
    pub(super) timing: TimingConfig,
    pub(super) revert_snapshot: String,
}

impl AgentEngine {
    pub fn new(config: &AppConfig, parts: Collaborators) -> Self {
        let session_cfg = &config.session;
        Self {
            session: Session::default(),
            observer: Observer::new(parts.capture, parts.detector),
            decisions: DecisionEngine::new(
                parts.provider,
                (session_cfg.reference_width, session_cfg.reference_height),
            ),
            translator: ActionTranslator::new(
                session_cfg.display_scale,
                config.timing.click_settle(),
            ),
            injector: parts.injector,
            view: parts.view,
            console: parts.console,
            vm: parts.vm,
            catalog: AppCatalog::with_entries(&config.apps),
            timing: config.timing.clone(),
            revert_snapshot: session_cfg.revert_snapshot.clone(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.session.mode
    }

    pub fn observation(&self) -> &Observation {
        &self.session.observation
    }

    pub(super) fn say(&mut self, text: &str) {
        self.console.write_line(text, true);
    }

    pub fn show_mode_selection(&mut self) {
        self.show_help_for(Mode::Uninitialized);
    }

    fn show_help_for(&mut self, mode: Mode) {
        for line in mode.help_lines() {
            self.console.write_line(line, true);
        }
    }

    // ── Observation ─────────────────────────────────────────────────────

    pub async fn tick(&mut self) -> TickOutcome {
        self.observer
            .tick(&mut self.session.observation, self.view.as_mut())
            .await
    }

    /// Keep the view live for `duration`. The only way time passes.
    pub async fn run_for(&mut self, duration: Duration) {
        let ticks = self
            .observer
            .run_for(duration, &mut self.session.observation, self.view.as_mut())
            .await;
        tracing::trace!(ms = duration.as_millis() as u64, ticks, "settle cycles done");
    }

    // ── Command routing ─────────────────────────────────────────────────

    pub async fn handle_command(&mut self, cmd: &str) {
        let cmd = cmd.trim();
        if cmd.is_empty() {
            return;
        }
        tracing::info!(mode = ?self.session.mode, command = cmd, "command received");

        if cmd.eq_ignore_ascii_case("exit") && self.session.mode != Mode::Uninitialized {
            self.session.mode = Mode::Uninitialized;
            self.say("Returned to mode selection.");
            self.console.clear();
            self.show_mode_selection();
            return;
        }
        if cmd.eq_ignore_ascii_case("help") {
            self.show_help_for(self.session.mode);
            return;
        }

        match self.session.mode {
            Mode::Uninitialized => self.select_mode(cmd),
            Mode::SingleAction => self.handle_single_action(cmd).await,
            Mode::PerformTask => self.handle_perform_task(cmd).await,
            Mode::AppInstallTest => self.handle_app_install(cmd).await,
        }
    }

    fn select_mode(&mut self, cmd: &str) {
        let Some(mode) = Mode::from_selection(cmd) else {
            self.say("Invalid mode selection. Please choose 1, 2, or 3");
            return;
        };
        self.session.mode = mode;
        tracing::info!(?mode, "mode selected");
        self.say(&format!("Switched to {} mode", mode.title()));
        self.show_help_for(mode);
    }

    async fn handle_single_action(&mut self, instruction: &str) {
        self.say(&format!("Requesting Single Action: {instruction}"));
        if let Some(action) = self.do_action(instruction).await {
            self.say(&format!("Action: {action}"));
        }
    }

    async fn handle_perform_task(&mut self, task: &str) {
        self.say(&format!("Requesting to Perform Task: {task}"));
        let outcome = self.do_task(task).await;
        tracing::info!(?outcome, "task finished");
        self.run_for(self.timing.step_settle()).await;
    }

    // ── Decisions ───────────────────────────────────────────────────────

    /// One model-chosen action, executed once. `None` if the model could
    /// not be reached.
    pub async fn do_action(&mut self, instruction: &str) -> Option<Action> {
        let snapshot = self.session.observation.clone();
        let verdict = match self.decisions.single_action(instruction, &snapshot.registry).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "single-action query failed");
                self.say(&format!("Error: model request failed: {e}"));
                return None;
            }
        };
        match verdict {
            Verdict::Complete => {
                self.say("No Action");
                Some(Action::Complete)
            }
            Verdict::Wait => Some(Action::Wait),
            Verdict::Act(response) => Some(self.apply(&response, &snapshot).await),
        }
    }

    /// The bounded task loop. Waits and actions both spend an iteration;
    /// each real action is followed by a settle period before the next query.
    pub async fn do_task(&mut self, task: &str) -> TaskOutcome {
        let mut ctrl = LoopController::new(self.timing.max_task_iterations);
        let mut actions = 0;

        while ctrl.next_iteration() {
            let snapshot = self.session.observation.clone();
            let verdict = match self.decisions.task_step(task, &snapshot.registry).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(error = %e, iteration = ctrl.iterations(), "task-step query failed");
                    self.say(&format!("Error: model request failed: {e}"));
                    return TaskOutcome::Aborted {
                        reason: e.to_string(),
                    };
                }
            };

            match verdict {
                Verdict::Complete => {
                    self.say("Task Complete from LLM");
                    return TaskOutcome::Completed { actions };
                }
                Verdict::Wait => {
                    self.say("Waiting...");
                    self.run_for(self.timing.wait()).await;
                }
                Verdict::Act(response) => {
                    let action = self.apply(&response, &snapshot).await;
                    if action.is_input() {
                        actions += 1;
                    }
                    self.say(&format!("Action: {action}"));
                    self.run_for(self.timing.step_settle()).await;
                }
            }
        }

        tracing::warn!(iterations = ctrl.iterations(), actions, "task iteration cap reached");
        self.say(&format!("Too many actions {} complete", ctrl.iterations()));
        TaskOutcome::IterationCapReached { actions }
    }

    /// Translate against the snapshot the model saw, never the live registry.
    async fn apply(&mut self, response: &str, snapshot: &Observation) -> Action {
        self.translator
            .translate(
                response,
                snapshot,
                self.injector.as_mut(),
                self.view.as_mut(),
                self.console.as_mut(),
            )
            .await
    }

    /// Report a failed injection on the console; the session carries on.
    pub(super) fn report(&mut self, result: PilotResult<()>, what: &str) {
        if let Err(e) = result {
            tracing::warn!(error = %e, what, "injection failed");
            self.say(&format!("Error: {what} failed: {e}"));
        }
    }

    // ── Main loop ───────────────────────────────────────────────────────

    /// Drive the session until Ctrl-C or the console closes. Pending
    /// commands run between Observation Cycle ticks.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<String>) -> PilotResult<()> {
        self.show_mode_selection();
        let mut interrupt = std::pin::pin!(tokio::signal::ctrl_c());

        loop {
            tokio::select! {
                biased;
                res = &mut interrupt => {
                    res?;
                    tracing::info!("interrupt received, stopping");
                    break;
                }
                keep_going = self.step(&mut commands) => {
                    if !keep_going {
                        tracing::info!("console closed, stopping");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn step(&mut self, commands: &mut mpsc::Receiver<String>) -> bool {
        match commands.try_recv() {
            Ok(cmd) => self.handle_command(&cmd).await,
            Err(TryRecvError::Empty) => {
                self.tick().await;
            }
            Err(TryRecvError::Disconnected) => return false,
        }
        tokio::task::yield_now().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::coordinator::InjectionPoint;
    use crate::perception::types::{ControlKind, DetectedControl};
    use crate::test_support::{Harness, Injected};

    fn start_button() -> DetectedControl {
        DetectedControl {
            kind: ControlKind::Icon,
            content: "Start".into(),
            bbox: [0.0, 0.9, 0.05, 1.0],
        }
    }

    #[tokio::test]
    async fn mode_select_accepts_digits_and_rejects_the_rest() {
        let mut h = Harness::new(vec![], ["unused"]);

        h.engine.handle_command("9").await;
        assert_eq!(h.engine.mode(), Mode::Uninitialized);
        assert!(h.console.contains("Invalid mode selection"));

        h.engine.handle_command("2").await;
        assert_eq!(h.engine.mode(), Mode::PerformTask);
        assert!(h.console.contains("Perform Task Commands:"));
        assert_eq!(h.model_calls(), 0);
    }

    #[tokio::test]
    async fn exit_returns_to_menu_case_insensitively() {
        let mut h = Harness::new(vec![], ["unused"]);
        h.engine.handle_command("1").await;

        h.engine.handle_command("EXIT").await;

        assert_eq!(h.engine.mode(), Mode::Uninitialized);
        assert!(h.console.contains("Returned to mode selection."));
        assert_eq!(h.console.clears(), 1);
        assert!(h.console.contains("Select Control Mode:"));
    }

    #[tokio::test]
    async fn exit_at_menu_is_just_an_invalid_selection() {
        let mut h = Harness::new(vec![], ["unused"]);
        h.engine.handle_command("exit").await;
        assert_eq!(h.console.clears(), 0);
        assert!(h.console.contains("Invalid mode selection"));
    }

    #[tokio::test]
    async fn help_reprints_current_mode_help() {
        let mut h = Harness::new(vec![], ["unused"]);
        h.engine.handle_command("3").await;
        h.console.reset();

        h.engine.handle_command("Help").await;

        assert!(h.console.contains("App Install Test Commands:"));
        assert_eq!(h.engine.mode(), Mode::AppInstallTest);
    }

    #[tokio::test]
    async fn endless_waiting_hits_the_iteration_cap() {
        let mut h = Harness::new(vec![start_button()], ["task_wait"]);
        h.engine.tick().await;
        h.engine.handle_command("2").await;

        h.engine.handle_command("install the thing").await;

        assert_eq!(h.model_calls(), 5);
        assert!(h.injector.calls().is_empty());
        assert!(h.console.contains("Too many actions"));
    }

    #[tokio::test]
    async fn task_stops_at_completion() {
        let mut h = Harness::new(
            vec![start_button()],
            [r#"{"action":"click","id":0}"#, "task_wait", "task_complete"],
        );
        h.engine.tick().await;

        let outcome = h.engine.do_task("open start").await;

        assert_eq!(outcome, TaskOutcome::Completed { actions: 1 });
        assert_eq!(h.model_calls(), 3);
        assert_eq!(h.injector.calls().len(), 1);
        assert!(h.console.contains("Task Complete from LLM"));
    }

    #[tokio::test]
    async fn invalid_replies_count_toward_the_cap() {
        let mut h = Harness::new(vec![], ["no idea"]);
        let outcome = h.engine.do_task("anything").await;
        assert_eq!(outcome, TaskOutcome::IterationCapReached { actions: 0 });
        assert_eq!(h.model_calls(), 5);
        assert!(h.console.contains("Action: invalid_json"));
    }

    #[tokio::test]
    async fn only_input_actions_are_counted() {
        let mut h = Harness::new(
            vec![start_button()],
            [
                "garbage",
                r#"{"action":"task_wait"}"#,
                r#"{"action":"click","id":0}"#,
                r#"{"action":"type","text":"vlc"}"#,
                "task_complete",
            ],
        );
        h.engine.tick().await;

        let outcome = h.engine.do_task("open vlc").await;

        assert_eq!(outcome, TaskOutcome::Completed { actions: 2 });
        assert_eq!(h.model_calls(), 5);
    }

    #[tokio::test]
    async fn model_failure_aborts_only_the_task() {
        let mut h = Harness::failing_model(vec![start_button()]);
        h.engine.handle_command("2").await;

        h.engine.handle_command("open start").await;

        assert_eq!(h.engine.mode(), Mode::PerformTask);
        assert!(h.console.contains("Error: model request failed"));
        assert!(h.injector.calls().is_empty());
    }

    #[tokio::test]
    async fn single_action_complete_means_no_action() {
        let mut h = Harness::new(vec![start_button()], ["task_complete"]);
        h.engine.handle_command("1").await;
        h.engine.handle_command("do nothing").await;

        assert!(h.console.contains("No Action"));
        assert!(h.injector.calls().is_empty());
        assert_eq!(h.model_calls(), 1);
    }

    #[tokio::test]
    async fn clicks_start_end_to_end() {
        let mut h = Harness::new(vec![start_button()], [r#"{"action":"click","id":0}"#]);
        assert_eq!(h.engine.tick().await, TickOutcome::Detected(1));
        assert_eq!(h.engine.observation().dimensions, (1920, 1080));
        h.engine.handle_command("1").await;

        h.engine.handle_command("open the start menu").await;

        // centre (48, 1026) of the 1920x1080 frame, divided by 1.5 and truncated
        assert_eq!(
            h.injector.calls(),
            vec![Injected::Click(InjectionPoint { x: 32, y: 684 })]
        );
        assert_eq!(h.model_calls(), 1);
        assert_eq!(h.view.marks().len(), 1);
        assert!(h.console.contains("Action: click #0"));
    }

    #[tokio::test]
    async fn closed_console_ends_the_run() {
        let mut h = Harness::new(vec![start_button()], ["task_complete"]);
        let (tx, rx) = mpsc::channel(4);
        tx.send("1".to_string()).await.unwrap();
        drop(tx);

        h.engine.run(rx).await.unwrap();

        assert_eq!(h.engine.mode(), Mode::SingleAction);
        assert!(h.console.contains("Select Control Mode:"));
    }
}
