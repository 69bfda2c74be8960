//! Observation cycle: capture, detect, number and render one frame.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::perception::annotator;
use crate::perception::registry::ControlRegistry;
use crate::perception::traits::{ControlDetector, ScreenCapture};
use crate::perception::types::Observation;
use crate::ui::viewer::FrameView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No frame this tick; nothing changed.
    CaptureMissed,
    /// Frame shown raw; previous registry kept.
    DetectionFailed,
    /// Registry replaced with this many controls.
    Detected(usize),
}

pub struct Observer {
    capture: Box<dyn ScreenCapture>,
    detector: Box<dyn ControlDetector>,
}

impl Observer {
    pub fn new(capture: Box<dyn ScreenCapture>, detector: Box<dyn ControlDetector>) -> Self {
        Self { capture, detector }
    }

    /// Advance one frame.
    ///
    /// 1. Capture. A missing frame skips the tick.
    /// 2. Record dimensions and run detection.
    /// 3. On failure show the raw frame and leave the registry stale-but-available.
    /// 4. On success replace the registry and show the annotated frame.
    pub async fn tick(&mut self, observation: &mut Observation, view: &mut dyn FrameView) -> TickOutcome {
        let Some(frame) = self.capture.capture().await else {
            return TickOutcome::CaptureMissed;
        };
        observation.dimensions = frame.dimensions();

        let started = Instant::now();
        match self.detector.detect(&frame).await {
            Ok(detections) => {
                let registry = ControlRegistry::from_detections(detections);
                let count = registry.len();
                view.show_frame(&annotator::annotate(&frame, registry.controls()));
                observation.registry = Rc::new(registry);
                tracing::trace!(
                    count,
                    ms = started.elapsed().as_millis() as u64,
                    "observation updated"
                );
                TickOutcome::Detected(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "detection failed, showing raw frame");
                view.show_frame(&frame);
                TickOutcome::DetectionFailed
            }
        }
    }

    /// Keep cycling until `duration` of wall-clock time has passed. The
    /// deadline is checked once per tick, so a slow tick can overrun it.
    pub async fn run_for(
        &mut self,
        duration: Duration,
        observation: &mut Observation,
        view: &mut dyn FrameView,
    ) -> u32 {
        let started = Instant::now();
        let mut ticks = 0;
        while started.elapsed() < duration {
            self.tick(observation, view).await;
            ticks += 1;
            tokio::task::yield_now().await;
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{ControlKind, DetectedControl};
    use crate::test_support::{FakeCapture, FakeDetector, RecordingView};

    fn start_button() -> DetectedControl {
        DetectedControl {
            kind: ControlKind::Icon,
            content: "Start".into(),
            bbox: [0.0, 0.9, 0.05, 1.0],
        }
    }

    #[tokio::test]
    async fn successful_tick_replaces_registry_and_shows_frame() {
        let capture = FakeCapture::sized(1920, 1080);
        let detector = FakeDetector::returning(vec![start_button(), start_button()]);
        let mut observer = Observer::new(Box::new(capture), Box::new(detector));
        let view = RecordingView::default();
        let mut obs = Observation::default();

        let outcome = observer.tick(&mut obs, &mut view.clone()).await;

        assert_eq!(outcome, TickOutcome::Detected(2));
        assert_eq!(obs.dimensions, (1920, 1080));
        assert_eq!(obs.registry.len(), 2);
        assert_eq!(obs.registry.lookup(1).unwrap().id, 1);
        assert_eq!(view.frames(), vec![(1920, 1080)]);
    }

    #[tokio::test]
    async fn detection_failure_keeps_stale_registry_and_shows_raw_frame() {
        let mut obs = Observation {
            dimensions: (800, 600),
            registry: Rc::new(ControlRegistry::from_detections(vec![start_button()])),
        };
        let before = Rc::clone(&obs.registry);
        let mut observer = Observer::new(
            Box::new(FakeCapture::sized(1024, 768)),
            Box::new(FakeDetector::failing("model not loaded")),
        );
        let view = RecordingView::default();

        let outcome = observer.tick(&mut obs, &mut view.clone()).await;

        assert_eq!(outcome, TickOutcome::DetectionFailed);
        assert!(Rc::ptr_eq(&before, &obs.registry));
        assert_eq!(obs.dimensions, (1024, 768));
        assert_eq!(view.frames(), vec![(1024, 768)]);
    }

    #[tokio::test]
    async fn missing_capture_skips_detection() {
        let detector = FakeDetector::returning(vec![start_button()]);
        let detect_calls = detector.calls();
        let mut observer = Observer::new(Box::new(FakeCapture::absent()), Box::new(detector));
        let view = RecordingView::default();
        let mut obs = Observation::default();

        let outcome = observer.tick(&mut obs, &mut view.clone()).await;

        assert_eq!(outcome, TickOutcome::CaptureMissed);
        assert_eq!(detect_calls.get(), 0);
        assert!(obs.registry.is_empty());
        assert!(view.frames().is_empty());
    }

    #[tokio::test]
    async fn zero_duration_runs_no_cycles() {
        let mut observer = Observer::new(
            Box::new(FakeCapture::sized(10, 10)),
            Box::new(FakeDetector::returning(vec![])),
        );
        let mut view = RecordingView::default();
        let ticks = observer
            .run_for(Duration::ZERO, &mut Observation::default(), &mut view)
            .await;
        assert_eq!(ticks, 0);
    }

    #[tokio::test]
    async fn bounded_run_terminates_after_deadline() {
        let mut observer = Observer::new(
            Box::new(FakeCapture::sized(10, 10)),
            Box::new(FakeDetector::returning(vec![start_button()])),
        );
        let mut view = RecordingView::default();
        let mut obs = Observation::default();
        let ticks = observer
            .run_for(Duration::from_millis(20), &mut obs, &mut view)
            .await;
        assert!(ticks >= 1);
        assert_eq!(obs.registry.len(), 1);
    }
}
