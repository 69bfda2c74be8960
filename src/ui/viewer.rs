use std::path::PathBuf;

use image::imageops::FilterType;
use image::RgbaImage;

use crate::executor::coordinator::{to_view_space, view_size, Point};
use crate::perception::annotator;

/// Live view of the remote session.
pub trait FrameView {
    fn show_frame(&mut self, frame: &RgbaImage);
    /// Mark an imminent click; `point` is in screenshot pixel space.
    fn mark_point(&mut self, point: Point);
}

/// Renders the session at 1/display_scale and keeps the latest frame on
/// disk as PNG, so any image viewer with auto-reload works as the live view.
pub struct PngFrameView {
    path: PathBuf,
    display_scale: f64,
    last: Option<RgbaImage>,
}

impl PngFrameView {
    pub fn new(path: PathBuf, display_scale: f64) -> Self {
        Self {
            path,
            display_scale,
            last: None,
        }
    }

    fn flush(&self) {
        let Some(img) = &self.last else { return };
        if let Err(e) = img.save(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write live view");
        }
    }
}

impl FrameView for PngFrameView {
    fn show_frame(&mut self, frame: &RgbaImage) {
        let (w, h) = view_size(frame.width(), frame.height(), self.display_scale);
        self.last = Some(image::imageops::resize(frame, w, h, FilterType::Triangle));
        self.flush();
    }

    fn mark_point(&mut self, point: Point) {
        let (x, y) = to_view_space(point, self.display_scale);
        if let Some(img) = self.last.as_mut() {
            annotator::draw_marker(img, x, y, 12);
        }
        self.flush();
    }
}
