//! Error types for the replication runtime.

use codec::CodecError;
use schema::TypeKind;
use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Server`](crate::Server) and [`Client`](crate::Client)
/// construction and their explicit calls.
///
/// Failures while processing inbound traffic inside `update()` are logged
/// and dropped, never returned.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Encoding, decoding or registry validation failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The transport rejected a send.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A state kind is not registered.
    #[error("state kind {} is not registered", kind.get())]
    UnknownStateKind { kind: TypeKind },

    /// Command values do not match the registry's command layout.
    #[error("command values do not match the command layout")]
    InvalidCommand,

    /// Configuration is unusable.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },
}

/// Errors reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote end is gone.
    #[error("transport disconnected")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_is_transparent() {
        let err: Error = CodecError::MissingCommandLayout.into();
        assert_eq!(err.to_string(), "registry has no command layout");
    }

    #[test]
    fn invalid_config_display() {
        let err = Error::InvalidConfig {
            reason: "send rate must be positive",
        };
        assert_eq!(err.to_string(), "invalid config: send rate must be positive");
    }
}
