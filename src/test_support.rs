//! Recording fakes for every collaborator the loop drives.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::RgbaImage;

use crate::agent_engine::engine::{AgentEngine, Collaborators};
use crate::config::{AppConfig, TimingConfig};
use crate::errors::{PilotError, PilotResult};
use crate::executor::coordinator::{InjectionPoint, Point};
use crate::executor::input::{InputInjector, KeyName};
use crate::llm::provider::LlmProvider;
use crate::perception::traits::{ControlDetector, ScreenCapture};
use crate::perception::types::DetectedControl;
use crate::ui::console::Console;
use crate::ui::viewer::FrameView;
use crate::vm::VmControl;

// ── Perception ──────────────────────────────────────────────────────────

pub struct FakeCapture {
    size: Option<(u32, u32)>,
}

impl FakeCapture {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            size: Some((width, height)),
        }
    }

    pub fn absent() -> Self {
        Self { size: None }
    }
}

#[async_trait(?Send)]
impl ScreenCapture for FakeCapture {
    async fn capture(&mut self) -> Option<RgbaImage> {
        self.size.map(|(w, h)| RgbaImage::new(w, h))
    }
}

pub struct FakeDetector {
    result: Result<Vec<DetectedControl>, String>,
    calls: Rc<Cell<u32>>,
}

impl FakeDetector {
    pub fn returning(controls: Vec<DetectedControl>) -> Self {
        Self {
            result: Ok(controls),
            calls: Rc::default(),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            result: Err(msg.to_string()),
            calls: Rc::default(),
        }
    }

    pub fn calls(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.calls)
    }
}

#[async_trait(?Send)]
impl ControlDetector for FakeDetector {
    async fn detect(&mut self, _frame: &RgbaImage) -> PilotResult<Vec<DetectedControl>> {
        self.calls.set(self.calls.get() + 1);
        self.result.clone().map_err(PilotError::Detection)
    }
}

// ── Injection ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injected {
    Click(InjectionPoint),
    Focus,
    Text(String),
    Key(String),
    RunDialog,
}

#[derive(Default)]
struct InjectorLog {
    calls: Vec<Injected>,
    failure: Option<String>,
}

/// Records successful injections. Clones share one log.
#[derive(Clone, Default)]
pub struct RecordingInjector {
    log: Rc<RefCell<InjectorLog>>,
}

impl RecordingInjector {
    pub fn calls(&self) -> Vec<Injected> {
        self.log.borrow().calls.clone()
    }

    /// Make every later injection fail with `msg`.
    pub fn fail_all(&self, msg: &str) {
        self.log.borrow_mut().failure = Some(msg.to_string());
    }

    fn record(&self, call: Injected) -> PilotResult<()> {
        let mut log = self.log.borrow_mut();
        if let Some(msg) = &log.failure {
            return Err(PilotError::Injection(msg.clone()));
        }
        log.calls.push(call);
        Ok(())
    }
}

#[async_trait(?Send)]
impl InputInjector for RecordingInjector {
    async fn click(&mut self, point: InjectionPoint) -> PilotResult<()> {
        self.record(Injected::Click(point))
    }

    async fn focus(&mut self) -> PilotResult<()> {
        self.record(Injected::Focus)
    }

    async fn send_text(&mut self, text: &str) -> PilotResult<()> {
        self.record(Injected::Text(text.to_string()))
    }

    async fn press_key(&mut self, key: &str) -> PilotResult<()> {
        key.parse::<KeyName>()?;
        self.record(Injected::Key(key.to_string()))
    }

    async fn open_run_dialog(&mut self) -> PilotResult<()> {
        self.record(Injected::RunDialog)
    }
}

// ── Model ───────────────────────────────────────────────────────────────

/// Replies in script order; the last successful reply repeats forever.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<PilotResult<String>>>,
    log: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedProvider {
    pub fn new<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_results(replies.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn from_results(results: Vec<PilotResult<String>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            log: Arc::default(),
        }
    }

    /// (system prompt, user prompt) of every call.
    pub fn log(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> PilotResult<String> {
        if let Ok(mut log) = self.log.lock() {
            log.push((system_prompt.to_string(), user_prompt.to_string()));
        }
        let mut script = self
            .script
            .lock()
            .map_err(|_| PilotError::Model("script poisoned".into()))?;
        if script.len() == 1 {
            if let Some(Ok(reply)) = script.front() {
                return Ok(reply.clone());
            }
        }
        script
            .pop_front()
            .unwrap_or_else(|| Err(PilotError::Model("script exhausted".into())))
    }
}

// ── Display ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct ViewLog {
    frames: Vec<(u32, u32)>,
    marks: Vec<Point>,
}

#[derive(Clone, Default)]
pub struct RecordingView {
    log: Rc<RefCell<ViewLog>>,
}

impl RecordingView {
    pub fn frames(&self) -> Vec<(u32, u32)> {
        self.log.borrow().frames.clone()
    }

    pub fn marks(&self) -> Vec<Point> {
        self.log.borrow().marks.clone()
    }
}

impl FrameView for RecordingView {
    fn show_frame(&mut self, frame: &RgbaImage) {
        self.log.borrow_mut().frames.push(frame.dimensions());
    }

    fn mark_point(&mut self, point: Point) {
        self.log.borrow_mut().marks.push(point);
    }
}

#[derive(Default)]
struct ConsoleLog {
    lines: Vec<(String, bool)>,
    clears: u32,
}

#[derive(Clone, Default)]
pub struct RecordingConsole {
    log: Rc<RefCell<ConsoleLog>>,
}

impl RecordingConsole {
    pub fn contains(&self, needle: &str) -> bool {
        self.log.borrow().lines.iter().any(|(l, _)| l.contains(needle))
    }

    pub fn clears(&self) -> u32 {
        self.log.borrow().clears
    }

    pub fn reset(&self) {
        self.log.borrow_mut().lines.clear();
    }
}

impl Console for RecordingConsole {
    fn write_line(&mut self, text: &str, system: bool) {
        self.log.borrow_mut().lines.push((text.to_string(), system));
    }

    fn clear(&mut self) {
        self.log.borrow_mut().clears += 1;
    }
}

// ── VM ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct VmLog {
    restored: Vec<String>,
    failure: Option<String>,
}

#[derive(Clone, Default)]
pub struct FakeVm {
    log: Rc<RefCell<VmLog>>,
}

impl FakeVm {
    pub fn restored(&self) -> Vec<String> {
        self.log.borrow().restored.clone()
    }

    pub fn fail_with(&self, msg: &str) {
        self.log.borrow_mut().failure = Some(msg.to_string());
    }
}

#[async_trait(?Send)]
impl VmControl for FakeVm {
    async fn restore_snapshot(&mut self, name: &str) -> PilotResult<()> {
        let mut log = self.log.borrow_mut();
        if let Some(msg) = &log.failure {
            return Err(PilotError::Vm(msg.clone()));
        }
        log.restored.push(name.to_string());
        Ok(())
    }
}

// ── Engine harness ──────────────────────────────────────────────────────

/// Default timing with every delay zeroed, so no test sleeps.
pub fn zero_timing() -> TimingConfig {
    TimingConfig {
        max_task_iterations: 5,
        step_settle_ms: 0,
        wait_ms: 0,
        install_wait_ms: 0,
        dialog_wait_ms: 0,
        click_settle_ms: 0,
        key_settle_ms: 0,
        focus_settle_ms: 0,
    }
}

/// An engine over a 1920x1080 session whose detector always returns
/// `controls`, with handles on every recorder.
pub struct Harness {
    pub engine: AgentEngine,
    pub injector: RecordingInjector,
    pub view: RecordingView,
    pub console: RecordingConsole,
    pub vm: FakeVm,
    model_log: Arc<Mutex<Vec<(String, String)>>>,
}

impl Harness {
    pub fn new<'a>(
        controls: Vec<DetectedControl>,
        replies: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::with_provider(controls, ScriptedProvider::new(replies))
    }

    pub fn failing_model(controls: Vec<DetectedControl>) -> Self {
        Self::with_provider(
            controls,
            ScriptedProvider::from_results(vec![Err(PilotError::Model("401 Unauthorized".into()))]),
        )
    }

    fn with_provider(controls: Vec<DetectedControl>, provider: ScriptedProvider) -> Self {
        let config = AppConfig {
            timing: zero_timing(),
            ..AppConfig::default()
        };
        let injector = RecordingInjector::default();
        let view = RecordingView::default();
        let console = RecordingConsole::default();
        let vm = FakeVm::default();
        let model_log = provider.log();

        let engine = AgentEngine::new(
            &config,
            Collaborators {
                capture: Box::new(FakeCapture::sized(1920, 1080)),
                detector: Box::new(FakeDetector::returning(controls)),
                injector: Box::new(injector.clone()),
                view: Box::new(view.clone()),
                console: Box::new(console.clone()),
                vm: Box::new(vm.clone()),
                provider: Box::new(provider),
            },
        );
        Self {
            engine,
            injector,
            view,
            console,
            vm,
            model_log,
        }
    }

    pub fn model_calls(&self) -> usize {
        self.model_log.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// User prompts sent to the model, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.model_log
            .lock()
            .map(|l| l.iter().map(|(_, user)| user.clone()).collect())
            .unwrap_or_default()
    }
}
