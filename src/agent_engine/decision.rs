//! Decision engine: frames the two model request shapes over the current
//! control list and recognises the completion/wait sentinels.

use serde::Serialize;

use crate::errors::PilotResult;
use crate::llm::provider::LlmProvider;
use crate::perception::registry::ControlRegistry;
use crate::perception::types::ControlKind;

pub const TASK_COMPLETE: &str = "task_complete";
pub const TASK_WAIT: &str = "task_wait";

/// Transient model failures get one more attempt before the decision fails.
const MAX_MODEL_ATTEMPTS: u32 = 2;

const ROLE_TASK: &str = "You are an agent controlling a Windows computer. Each request will include a list of controls on the screen, and your job is to determine the next action to take to complete the task. Only return actions in the specified action response format. Return no additional text or comments.";

const ROLE_ACTION: &str = "You are an agent controlling a Windows computer. Each request will include a list of controls on the screen, and your job is to determine what action to take based on the request from the user. Only return a single action that is very close to the request from the user.";

const CONTROL_LIST_FORMAT: &str = "\
The request will include a list of all controls on the screen, one JSON object per line. Each control has the following properties:
  - 'id': A unique identifier for the control
  - 'type': The type of control, can ONLY be 'icon' or 'text'
  - 'content': The content of the control
  - 'x': The x coordinate of the control
  - 'y': The y coordinate of the control";

const ACTIONS_AVAILABLE: &str = "\
Action responses should be an action in the form of a JSON object with the following properties:
  - 'action': The action to take, can ONLY be 'click', 'type', 'keypress', or 'select'
  - 'id': The id of the control to act on, must be the integer value from the control list
  - 'text': The text to type, only used if action is 'type'
  - 'key': The key to press, only used if action is 'keypress'. Available keys are 'windows' or 'enter'
If the task has been completed, return 'task_complete'.";

const TASK_WAIT_HINT: &str =
    "If nothing should be done right now and the screen needs time to change, return 'task_wait'.";

const TASK_HINTS: &str = "\
Here are some hints to know if you're in different states of the OS:
  - If you're in the login screen, you're looking for the username and password textboxes and the login button
  - If you're in an application, you're looking for the controls in the application
  - If you're in the start menu, you're looking for the assorted application names as well as pinned and recommended apps. If start is up, press the Windows key to dismiss.
  - If you're in the file explorer, you're looking for the files and the folders
  - If you're in the settings, you're looking for the options and the settings
  - If you're in the task manager, you're looking for the processes and the applications
  - If you're in the command prompt, you're looking for the command line and the options";

/// The model's verdict after sentinel recognition. Anything that is not a
/// sentinel goes to the action translator untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Complete,
    Wait,
    Act(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFlavor {
    SingleAction,
    TaskStep,
}

/// Substring match on the raw reply. `task_complete` wins over `task_wait`;
/// single-action replies never wait.
pub fn classify(response: &str, flavor: QueryFlavor) -> Verdict {
    if response.contains(TASK_COMPLETE) {
        return Verdict::Complete;
    }
    if flavor == QueryFlavor::TaskStep && response.contains(TASK_WAIT) {
        return Verdict::Wait;
    }
    Verdict::Act(response.to_string())
}

#[derive(Serialize)]
struct ControlLine<'a> {
    id: u32,
    #[serde(rename = "type")]
    kind: ControlKind,
    content: &'a str,
    x: i64,
    y: i64,
}

/// One compact JSON object per control. x/y are the box's top-left corner
/// against the reference resolution, not the capture resolution.
pub fn serialize_controls(
    registry: &ControlRegistry,
    reference: (u32, u32),
) -> PilotResult<String> {
    let (ref_w, ref_h) = reference;
    let mut lines = Vec::with_capacity(registry.len());
    for control in registry.controls() {
        let line = ControlLine {
            id: control.id,
            kind: control.kind,
            content: &control.content,
            x: (control.bbox[0] * f64::from(ref_w)) as i64,
            y: (control.bbox[1] * f64::from(ref_h)) as i64,
        };
        lines.push(serde_json::to_string(&line)?);
    }
    Ok(lines.join("\n"))
}

pub fn system_prompt(flavor: QueryFlavor) -> String {
    match flavor {
        QueryFlavor::SingleAction => {
            [ROLE_ACTION, CONTROL_LIST_FORMAT, ACTIONS_AVAILABLE].join("\n")
        }
        QueryFlavor::TaskStep => {
            [ROLE_TASK, CONTROL_LIST_FORMAT, ACTIONS_AVAILABLE, TASK_WAIT_HINT, TASK_HINTS].join("\n")
        }
    }
}

pub fn user_prompt(flavor: QueryFlavor, request: &str, controls: &str) -> String {
    match flavor {
        QueryFlavor::SingleAction => format!(
            "I need to perform this single action: {request}\n\
             The controls on the screen are:\n{controls}\n\
             Please respond with the single action to take. If you can't determine the action, respond with '{TASK_COMPLETE}'."
        ),
        QueryFlavor::TaskStep => format!(
            "I'm trying to accomplish the following task: {request}\n\
             The controls on the screen are:\n{controls}\n"
        ),
    }
}

pub struct DecisionEngine {
    provider: Box<dyn LlmProvider>,
    reference: (u32, u32),
}

impl DecisionEngine {
    pub fn new(provider: Box<dyn LlmProvider>, reference: (u32, u32)) -> Self {
        Self {
            provider,
            reference,
        }
    }

    /// One action that satisfies `instruction`, or `Complete` if none applies.
    pub async fn single_action(
        &self,
        instruction: &str,
        registry: &ControlRegistry,
    ) -> PilotResult<Verdict> {
        self.query(QueryFlavor::SingleAction, instruction, registry).await
    }

    /// The next step toward `task`.
    pub async fn task_step(&self, task: &str, registry: &ControlRegistry) -> PilotResult<Verdict> {
        self.query(QueryFlavor::TaskStep, task, registry).await
    }

    async fn query(
        &self,
        flavor: QueryFlavor,
        request: &str,
        registry: &ControlRegistry,
    ) -> PilotResult<Verdict> {
        let controls = serialize_controls(registry, self.reference)?;
        let system = system_prompt(flavor);
        let user = user_prompt(flavor, request, &controls);

        let mut attempt = 1;
        let response = loop {
            match self.provider.complete(&system, &user).await {
                Ok(r) => break r,
                Err(e) if e.is_transient() && attempt < MAX_MODEL_ATTEMPTS => {
                    tracing::warn!(
                        provider = self.provider.name(),
                        attempt,
                        error = %e,
                        "model call failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let verdict = classify(&response, flavor);
        tracing::debug!(?flavor, ?verdict, controls = registry.len(), "model verdict");
        Ok(verdict)
    }
}
