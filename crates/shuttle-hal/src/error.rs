use thiserror::Error;

use crate::config::AudioConfig;
use crate::pcm::Endpoint;

pub type Result<T> = std::result::Result<T, HalError>;

#[derive(Debug, Error)]
pub enum HalError {
    /// The requested stream format cannot be served. `suggested` holds the
    /// closest configuration the caller should retry with.
    #[error("unsupported stream configuration, retry with {suggested}")]
    UnsupportedConfig { suggested: AudioConfig },
    /// Opening the hardware handle failed; the stream stays in standby.
    #[error("out of memory opening {endpoint} pcm: {reason}")]
    OutOfMemory { endpoint: Endpoint, reason: String },
    #[error("mixer control not found: {0}")]
    ControlNotFound(String),
    #[error("buffer underrun")]
    Underrun,
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`Pcm`](crate::pcm::Pcm) handle or its backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PcmError {
    #[error("buffer underrun")]
    Underrun,
    #[error("pcm not ready: {0}")]
    NotReady(String),
    #[error("pcm i/o error: {0}")]
    Io(String),
}

/// Errors reported by a [`MixerDevice`](crate::mixer::MixerDevice).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MixerError {
    #[error("value index {index} out of range for control {control}")]
    IndexOutOfRange { control: String, index: usize },
    #[error("invalid enum token '{token}' for control {control}")]
    InvalidToken { control: String, token: String },
    #[error("control {0} does not take this kind of value")]
    WrongKind(String),
    #[error("mixer i/o error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_config_names_the_suggestion() {
        let err = HalError::UnsupportedConfig {
            suggested: AudioConfig::capture_default(),
        };
        assert_eq!(
            err.to_string(),
            "unsupported stream configuration, retry with 44100Hz/2ch/pcm16"
        );
    }

    #[test]
    fn out_of_memory_reports_endpoint() {
        let err = HalError::OutOfMemory {
            endpoint: Endpoint::Sco,
            reason: "busy".into(),
        };
        assert_eq!(err.to_string(), "out of memory opening sco pcm: busy");
    }
}
