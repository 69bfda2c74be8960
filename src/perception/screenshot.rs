use std::time::Instant;

use async_trait::async_trait;
use image::RgbaImage;

use crate::errors::{PilotError, PilotResult};
use crate::perception::traits::ScreenCapture;
use crate::perception::window::SessionWindow;

/// Captures the remote-session client window by title.
pub struct WindowCapture {
    window: SessionWindow,
}

impl WindowCapture {
    pub fn new(window: SessionWindow) -> Self {
        Self { window }
    }

    fn grab(&self) -> PilotResult<RgbaImage> {
        let window = self.window.find()?;
        let shot = window
            .capture_image()
            .map_err(|e| PilotError::Capture(format!("capture: {e}")))?;
        let (w, h) = (shot.width(), shot.height());
        RgbaImage::from_raw(w, h, shot.into_raw())
            .ok_or_else(|| PilotError::Capture(format!("bad buffer for {w}x{h} frame")))
    }
}

#[async_trait(?Send)]
impl ScreenCapture for WindowCapture {
    async fn capture(&mut self) -> Option<RgbaImage> {
        let started = Instant::now();
        match self.grab() {
            Ok(frame) => {
                tracing::trace!(
                    ms = started.elapsed().as_millis() as u64,
                    width = frame.width(),
                    height = frame.height(),
                    "frame captured"
                );
                Some(frame)
            }
            Err(e) => {
                tracing::warn!(error = %e, "capture failed, retrying next tick");
                None
            }
        }
    }
}
