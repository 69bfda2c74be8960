use crate::perception::types::{Control, DetectedControl};

/// The current frame's controls, ids dense in `0..len` in detector order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlRegistry {
    controls: Vec<Control>,
}

impl ControlRegistry {
    pub fn from_detections(detections: Vec<DetectedControl>) -> Self {
        let controls = detections
            .into_iter()
            .enumerate()
            .map(|(idx, d)| Control {
                id: idx as u32,
                kind: d.kind,
                content: d.content,
                bbox: d.bbox,
            })
            .collect();
        Self { controls }
    }

    pub fn lookup(&self, id: u32) -> Option<&Control> {
        self.controls.iter().find(|c| c.id == id)
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::ControlKind;

    fn detection(content: &str) -> DetectedControl {
        DetectedControl {
            kind: ControlKind::Icon,
            content: content.into(),
            bbox: [0.1, 0.1, 0.2, 0.2],
        }
    }

    #[test]
    fn ids_are_dense_in_detector_order() {
        let names = ["Next", "Cancel", "Back", "Help"];
        let reg = ControlRegistry::from_detections(names.iter().map(|n| detection(n)).collect());
        let ids: Vec<u32> = reg.controls().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(reg.lookup(1).map(|c| c.content.as_str()), Some("Cancel"));
    }

    #[test]
    fn lookup_outside_range_is_not_found() {
        let reg = ControlRegistry::from_detections(vec![detection("OK")]);
        assert!(reg.lookup(1).is_none());
        assert!(reg.lookup(u32::MAX).is_none());
    }

    #[test]
    fn empty_registry_never_resolves() {
        let reg = ControlRegistry::default();
        assert!(reg.is_empty());
        assert!(reg.lookup(0).is_none());
    }
}
