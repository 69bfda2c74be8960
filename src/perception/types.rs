use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::executor::coordinator::NormalizedBox;
use crate::perception::registry::ControlRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Icon,
    Text,
}

impl ControlKind {
    /// Detectors label OCR hits as "text"; everything else is clickable chrome.
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("text") {
            ControlKind::Text
        } else {
            ControlKind::Icon
        }
    }
}

/// A control as returned by a detector, before per-frame ids are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedControl {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    pub content: String,
    pub bbox: NormalizedBox,
}

/// A detected UI element for one observed frame. `id` is only meaningful
/// against the registry that assigned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: ControlKind,
    pub content: String,
    pub bbox: NormalizedBox,
}

/// What the last Observation Cycle saw. Cheap to clone; a clone is the
/// immutable snapshot a decision is made and executed against.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// (width, height) of the most recent captured frame.
    pub dimensions: (u32, u32),
    pub registry: Rc<ControlRegistry>,
}
