//! Error types for grabby readers.

use thiserror::Error;

/// Signal delivered on a merged reader's error channel.
///
/// `ReadClosed` and `AllHandlesDied` are terminal: exactly one of them is
/// delivered per reader, after which the channel ends. `Discovery` may
/// appear any number of times before that.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("read handle closed")]
    ReadClosed,

    #[error("all member read handles died")]
    AllHandlesDied,

    #[error("discovery failed: {0}")]
    Discovery(String),
}

impl ReadError {
    /// Whether this signal ends the merged stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadError::ReadClosed | ReadError::AllHandlesDied)
    }
}

/// Errors loading or validating a [`ReaderConfig`](crate::ReaderConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
