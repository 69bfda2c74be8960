pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;
pub mod ui;
pub mod vm;

#[cfg(test)]
pub(crate) mod test_support;

use crate::agent_engine::engine::{AgentEngine, Collaborators};
use crate::config::{AppConfig, DetectorKind};
use crate::errors::{PilotError, PilotResult};
use crate::executor::input::EnigoInjector;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::perception::remote_detector::RemoteDetector;
use crate::perception::screenshot::WindowCapture;
use crate::perception::traits::ControlDetector;
use crate::perception::window::SessionWindow;
use crate::perception::yolo_detector::YoloDetector;
use crate::ui::console::{spawn_command_reader, StdConsole};
use crate::ui::viewer::PngFrameView;
use crate::vm::hyperv::HyperV;

pub fn run() -> PilotResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let mut config = config::load_config()?;
    if let Some(vm_name) = std::env::args().nth(1) {
        config.session.vm_name = Some(vm_name);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run_session(config));
    // The stdin reader may still be parked in a read; do not wait for it.
    runtime.shutdown_background();
    result
}

fn build_detector(config: &AppConfig) -> PilotResult<Box<dyn ControlDetector>> {
    let det = &config.detector;
    Ok(match det.kind {
        DetectorKind::Remote => Box::new(RemoteDetector::new(det.endpoint.clone())),
        DetectorKind::Yolo => Box::new(YoloDetector::load(
            &det.model_path,
            det.conf_threshold,
            det.iou_threshold,
            det.class_names.clone(),
        )?),
    })
}

/// Everything that can fail at setup fails here, before the loop starts.
async fn run_session(config: AppConfig) -> PilotResult<()> {
    let vm_name = config.session.vm_name.clone().ok_or_else(|| {
        PilotError::Config("no VM name: pass it as the first argument or set session.vm_name".into())
    })?;
    tracing::info!(vm = %vm_name, "attempting to connect to VM");
    let vm = HyperV::connect(&vm_name).await?;

    let provider = OpenAiCompatibleProvider::from_config(&config.llm)?;
    let window = SessionWindow::attach(&config.session.window_title)?;
    let injector = EnigoInjector::new(
        window.clone(),
        (config.session.click_offset_x, config.session.click_offset_y),
        &config.timing,
    )?;
    let capture = WindowCapture::new(window);
    let detector = build_detector(&config)?;
    tracing::info!(
        detector = ?config.detector.kind,
        scale = config.session.display_scale,
        "session ready"
    );

    let mut engine = AgentEngine::new(
        &config,
        Collaborators {
            capture: Box::new(capture),
            detector,
            injector: Box::new(injector),
            view: Box::new(PngFrameView::new(
                config.view.frame_path.clone(),
                config.session.display_scale,
            )),
            console: Box::new(StdConsole),
            vm: Box::new(vm),
            provider: Box::new(provider),
        },
    );
    engine.run(spawn_command_reader()).await
}
