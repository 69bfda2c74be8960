use crate::perception::types::Observation;

/// Operating modes of the session. Transitions are command driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Mode-select menu.
    #[default]
    Uninitialized,
    SingleAction,
    PerformTask,
    AppInstallTest,
}

impl Mode {
    /// Menu selection as typed at the mode prompt.
    pub fn from_selection(cmd: &str) -> Option<Self> {
        match cmd.trim() {
            "1" => Some(Mode::SingleAction),
            "2" => Some(Mode::PerformTask),
            "3" => Some(Mode::AppInstallTest),
            _ => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Mode::Uninitialized => "Mode Selection",
            Mode::SingleAction => "Single Action",
            Mode::PerformTask => "Perform Task",
            Mode::AppInstallTest => "App Install Test",
        }
    }

    pub fn help_lines(self) -> &'static [&'static str] {
        match self {
            Mode::Uninitialized => &[
                "Select Control Mode:",
                "1) Single Action",
                "2) Perform Task",
                "3) App Install Test",
            ],
            Mode::SingleAction => &[
                "Single Action Commands:",
                "  help - Show this help message",
                "  exit - Return to mode selection",
                "Any other text will be interpreted as a single action to perform",
            ],
            Mode::PerformTask => &[
                "Perform Task Commands:",
                "  help - Show this help message",
                "  exit - Return to mode selection",
                "Any other text will be interpreted as a task to accomplish",
            ],
            Mode::AppInstallTest => &[
                "App Install Test Commands:",
                "  help - Show this help message",
                "  exit - Return to mode selection",
                "  revert - Restore the VM to its clean snapshot",
                "Any other text will be interpreted as an app to install (eg. Chrome)",
            ],
        }
    }
}

/// Long-lived automation state, created once at startup.
#[derive(Debug, Default)]
pub struct Session {
    pub mode: Mode,
    /// Latest frame dimensions and registry. Overwritten by every
    /// successful detection; cloned into a snapshot before each decision.
    pub observation: Observation,
}

/// How a bounded task attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { actions: u32 },
    IterationCapReached { actions: u32 },
    /// The model could not be queried; the session itself carries on.
    Aborted { reason: String },
}
