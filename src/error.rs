use thiserror::Error;

#[derive(Error, Debug)]
pub enum SirenError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Camera permission denied: {details}")]
    Permission { details: String },

    #[error("Hardware error: {0}")]
    Hardware(#[from] TorchError),

    #[error("Alert channel error: {details}")]
    Alert { details: String },
}

impl SirenError {
    pub fn alert<S: Into<String>>(details: S) -> Self {
        Self::Alert {
            details: details.into(),
        }
    }

    /// Whether the session can keep running with a fallback after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SirenError::Permission { .. } | SirenError::Hardware(_) | SirenError::Alert { .. }
        )
    }
}

/// Torch (camera flash LED) driver errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TorchError {
    #[error("Torch not available on this device")]
    Unavailable,

    #[error("Torch I/O failure: {details}")]
    Io { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },
}

pub type Result<T> = std::result::Result<T, SirenError>;
