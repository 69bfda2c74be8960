use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Model request timed out after {0}s")]
    ModelTimeout(u64),

    #[error("Injection error: {0}")]
    Injection(String),

    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("VM error: {0}")]
    Vm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl PilotError {
    /// Errors that only cost the current tick or decision attempt; the
    /// session keeps running and the next cycle may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PilotError::Capture(_)
                | PilotError::Detection(_)
                | PilotError::ModelTimeout(_)
                | PilotError::Injection(_)
                | PilotError::UnsupportedKey(_)
        )
    }
}

pub type PilotResult<T> = Result<T, PilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_transient_but_config_is_not() {
        assert!(PilotError::ModelTimeout(30).is_transient());
        assert!(PilotError::Detection("boom".into()).is_transient());
        assert!(!PilotError::Config("missing key".into()).is_transient());
        assert!(!PilotError::Model("401".into()).is_transient());
    }
}
