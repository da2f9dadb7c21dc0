use thiserror::Error;

/// Failures that abort a whole scheduling request.
///
/// Per-instance problems never surface here; they become `Conflict` records.
/// Solver outcomes without a valuation are reported through an
/// `InfeasibilityReport` instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid scheduling input: {0}")]
    Configuration(String),

    #[error("Malformed request payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Cannot read configuration file: {0}")]
    ConfigFile(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl SchedulerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SchedulerError::Configuration(message.into())
    }

    /// Short category name reported alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::Configuration(_) | SchedulerError::InvalidPayload(_) => {
                "ConfigurationError"
            }
            SchedulerError::ConfigFile(_) | SchedulerError::ConfigParse(_) => "SettingsError",
        }
    }
}
