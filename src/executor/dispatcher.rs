//! Action translator: decodes a model reply into an [`Action`] and replays
//! it into the session through the injection primitives.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::executor::coordinator::{center, denormalize, to_injection_space};
use crate::executor::input::InputInjector;
use crate::perception::types::Observation;
use crate::ui::console::Console;
use crate::ui::viewer::FrameView;

/// A decoded model instruction. Nothing untyped passes this boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click { id: u32 },
    Type { text: String },
    KeyPress { key: String },
    Select { id: u32 },
    Wait,
    Complete,
    /// The reply was not a well-formed action object.
    Invalid,
}

impl Action {
    /// Whether this action drives the session's mouse or keyboard.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Action::Click { .. }
                | Action::Select { .. }
                | Action::Type { .. }
                | Action::KeyPress { .. }
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click { id } => write!(f, "click #{id}"),
            Action::Select { id } => write!(f, "select #{id}"),
            Action::Type { text } => write!(f, "type {text:?}"),
            Action::KeyPress { key } => write!(f, "keypress {key}"),
            Action::Wait => f.write_str("task_wait"),
            Action::Complete => f.write_str("task_complete"),
            Action::Invalid => f.write_str("invalid_json"),
        }
    }
}

/// Wire shape of an action object as the model emits it.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WireAction {
    Click {
        id: u32,
    },
    Type {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "keypress")]
    KeyPress {
        #[serde(default)]
        key: Option<String>,
    },
    Select {
        id: u32,
    },
    TaskWait,
    TaskComplete,
}

impl From<WireAction> for Action {
    fn from(w: WireAction) -> Self {
        match w {
            WireAction::Click { id } => Action::Click { id },
            WireAction::Select { id } => Action::Select { id },
            WireAction::Type { text } => Action::Type {
                text: text.unwrap_or_default(),
            },
            WireAction::KeyPress { key } => Action::KeyPress {
                key: key.unwrap_or_default(),
            },
            WireAction::TaskWait => Action::Wait,
            WireAction::TaskComplete => Action::Complete,
        }
    }
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?is)^```(?:json)?\s*(.*?)\s*`*$").expect("fence pattern is valid")
    })
}

/// Strip a leading code-fence tag (```` ```json ````, ```` ``` ```` or a bare
/// `json` prefix) and trailing backticks. No other normalisation.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    if let Some(caps) = fence_pattern().captures(trimmed) {
        if let Some(body) = caps.get(1) {
            return body.as_str();
        }
    }
    if trimmed.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("json")) {
        return trimmed[4..].trim_start();
    }
    trimmed
}

pub fn decode(response: &str) -> Action {
    match serde_json::from_str::<WireAction>(strip_code_fence(response)) {
        Ok(wire) => wire.into(),
        Err(e) => {
            tracing::debug!(error = %e, "model reply is not an action object");
            Action::Invalid
        }
    }
}

pub struct ActionTranslator {
    display_scale: f64,
    click_settle: Duration,
}

impl ActionTranslator {
    pub fn new(display_scale: f64, click_settle: Duration) -> Self {
        Self {
            display_scale,
            click_settle,
        }
    }

    /// Decode `response` and apply it against `observation`, the snapshot
    /// the model saw. Never fails: every problem is reported on `console`
    /// and the decoded action is returned for the caller to log.
    pub async fn translate(
        &self,
        response: &str,
        observation: &Observation,
        injector: &mut dyn InputInjector,
        view: &mut dyn FrameView,
        console: &mut dyn Console,
    ) -> Action {
        let action = decode(response);
        tracing::info!(%action, "decoded model action");

        match &action {
            Action::Click { id } | Action::Select { id } => {
                self.click_control(*id, observation, injector, view, console).await;
            }
            Action::Type { text } => {
                if !text.is_empty() {
                    if let Err(e) = injector.focused_text(text).await {
                        console.write_line(&format!("Error: typing failed: {e}"), true);
                    }
                }
            }
            Action::KeyPress { key } => {
                if !key.is_empty() {
                    if let Err(e) = injector.focused_key(key).await {
                        tracing::warn!(error = %e, key = %key, "key press rejected");
                        console.write_line(&format!("Error: {e}"), true);
                    }
                }
            }
            Action::Wait | Action::Complete => {}
            Action::Invalid => {
                console.write_line(
                    &format!("Error: Invalid action format from LLM: {}", response.trim()),
                    true,
                );
            }
        }
        action
    }

    async fn click_control(
        &self,
        id: u32,
        observation: &Observation,
        injector: &mut dyn InputInjector,
        view: &mut dyn FrameView,
        console: &mut dyn Console,
    ) {
        if observation.registry.is_empty() {
            console.write_line("Error: No parsed content available", true);
            return;
        }
        let Some(control) = observation.registry.lookup(id) else {
            console.write_line(&format!("Error: Control with ID {id} not found"), true);
            return;
        };
        console.write_line(&format!("Clicking on control: {}", control.content), true);

        let (w, h) = observation.dimensions;
        let target = center(&denormalize(&control.bbox, w, h));
        // Marker goes on before the downscale so it sits on the real target.
        view.mark_point(target);
        tokio::time::sleep(self.click_settle).await;

        let point = to_injection_space(target, self.display_scale);
        match injector.click(point).await {
            Ok(()) => console.write_line(
                &format!("Clicked control {id} at ({}, {})", point.x, point.y),
                true,
            ),
            Err(e) => console.write_line(&format!("Error: click on control {id} failed: {e}"), true),
        }
    }
}
