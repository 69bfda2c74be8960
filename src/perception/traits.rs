use async_trait::async_trait;
use image::RgbaImage;

use crate::errors::PilotResult;
use crate::perception::types::DetectedControl;

/// Source of frames from the remote session. `None` means this tick has no
/// frame; the caller retries on the next one.
#[async_trait(?Send)]
pub trait ScreenCapture {
    async fn capture(&mut self) -> Option<RgbaImage>;
}

/// Strategy trait for UI control detection.
/// Two implementations: a remote screen-parsing service and local ONNX/YOLO.
#[async_trait(?Send)]
pub trait ControlDetector {
    async fn detect(&mut self, frame: &RgbaImage) -> PilotResult<Vec<DetectedControl>>;
}
