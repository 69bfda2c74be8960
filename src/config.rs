use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub view: ViewConfig,
    /// Extra install-test catalog entries, merged over the built-in table.
    #[serde(default)]
    pub apps: Vec<AppEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

impl LlmConfig {
    pub fn active(&self) -> PilotResult<(&str, &ProviderEntry)> {
        self.providers
            .get_key_value(&self.active_provider)
            .map(|(id, entry)| (id.as_str(), entry))
            .ok_or_else(|| {
                PilotError::Config(format!(
                    "active provider '{}' is not configured under [llm.providers]",
                    self.active_provider
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub display_name: String,
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// "azure" sends an `api-key` header; anything else uses bearer auth.
    pub adapter: Option<String>,
    /// Falls back to env var VMPILOT_<ID>_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub vm_name: Option<String>,
    /// Substring matched against top-level window titles.
    pub window_title: String,
    /// The live view renders the session at 1/display_scale of the capture.
    pub display_scale: f64,
    /// Resolution the model is told the screen has.
    pub reference_width: u32,
    pub reference_height: u32,
    /// Offset of the session's client area inside the captured window.
    pub click_offset_x: i32,
    pub click_offset_y: i32,
    pub revert_snapshot: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vm_name: None,
            window_title: "Virtual Machine Connection".into(),
            display_scale: 1.5,
            reference_width: 1920,
            reference_height: 1080,
            click_offset_x: 0,
            click_offset_y: 0,
            revert_snapshot: "revert".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub max_task_iterations: u32,
    pub step_settle_ms: u64,
    pub wait_ms: u64,
    pub install_wait_ms: u64,
    pub dialog_wait_ms: u64,
    pub click_settle_ms: u64,
    pub key_settle_ms: u64,
    pub focus_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_task_iterations: 5,
            step_settle_ms: 1000,
            wait_ms: 2000,
            install_wait_ms: 10_000,
            dialog_wait_ms: 1000,
            click_settle_ms: 500,
            key_settle_ms: 50,
            focus_settle_ms: 500,
        }
    }
}

impl TimingConfig {
    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle_ms)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn install_wait(&self) -> Duration {
        Duration::from_millis(self.install_wait_ms)
    }

    pub fn dialog_wait(&self) -> Duration {
        Duration::from_millis(self.dialog_wait_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn key_settle(&self) -> Duration {
        Duration::from_millis(self.key_settle_ms)
    }

    /// Pause after raising the session window, before keyboard input.
    pub fn focus_settle(&self) -> Duration {
        Duration::from_millis(self.focus_settle_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    #[default]
    Remote,
    Yolo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    pub endpoint: String,
    pub model_path: String,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub class_names: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Remote,
            endpoint: "http://127.0.0.1:8000/parse/".into(),
            model_path: "weights/icon_detect/model.onnx".into(),
            conf_threshold: 0.05,
            iou_threshold: 0.45,
            class_names: vec!["icon".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub frame_path: PathBuf,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            frame_path: PathBuf::from("live_view.png"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEntry {
    pub name: String,
    pub package_id: String,
    pub shortcut_name: String,
}

fn resolve_config_path() -> PilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(PilotError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn parse_config(content: &str) -> PilotResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if config.session.display_scale <= 0.0 {
        return Err(PilotError::Config(format!(
            "session.display_scale must be positive, got {}",
            config.session.display_scale
        )));
    }
    Ok(config)
}

pub fn load_config() -> PilotResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [llm]
        active_provider = "azure"

        [llm.providers.azure]
        api_base = "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2023-09-01-preview"
        model = "gpt-4o"
        adapter = "azure"
    "#;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.timing.max_task_iterations, 5);
        assert_eq!(cfg.timing.step_settle(), Duration::from_secs(1));
        assert_eq!(cfg.timing.wait(), Duration::from_secs(2));
        assert_eq!(cfg.timing.install_wait(), Duration::from_secs(10));
        assert_eq!(cfg.session.display_scale, 1.5);
        assert_eq!((cfg.session.reference_width, cfg.session.reference_height), (1920, 1080));
        assert_eq!(cfg.detector.kind, DetectorKind::Remote);

        let (id, entry) = cfg.llm.active().unwrap();
        assert_eq!(id, "azure");
        assert_eq!(entry.max_tokens, 4096);
        assert!(!entry.stream);
    }

    #[test]
    fn unknown_active_provider_is_a_config_error() {
        let cfg = parse_config("[llm]\nactive_provider = \"missing\"\n").unwrap();
        assert!(matches!(cfg.llm.active(), Err(PilotError::Config(_))));
    }

    #[test]
    fn rejects_non_positive_display_scale() {
        let toml = format!("{MINIMAL}\n[session]\ndisplay_scale = 0.0\n");
        assert!(matches!(parse_config(&toml), Err(PilotError::Config(_))));
    }

    #[test]
    fn parses_extra_catalog_entries() {
        let toml = format!(
            "{MINIMAL}\n[[apps]]\nname = \"paint\"\npackage_id = \"dotPDN.PaintDotNet\"\nshortcut_name = \"Paint.NET\"\n"
        );
        let cfg = parse_config(&toml).unwrap();
        assert_eq!(cfg.apps.len(), 1);
        assert_eq!(cfg.apps[0].shortcut_name, "Paint.NET");
    }
}
