//! Library error types

use thiserror::Error;

/// Errors surfaced by the engine's public API.
///
/// Inbound traffic never produces errors: malformed or unsupported messages are
/// logged and dropped during the drain. These variants only cover caller mistakes
/// and collaborator failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Channel index outside 0-16
    #[error("invalid MIDI channel index: {0} (expected 0-15, or 16 for All)")]
    InvalidChannel(u8),

    /// The aggregate channel was used where a real channel is required (e.g. sending)
    #[error("the All channel cannot be used as a send target")]
    AggregateChannel,

    /// Backend failed to open ports or deliver a message
    #[error("MIDI backend error: {0}")]
    Backend(String),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience alias for engine results
pub type Result<T> = std::result::Result<T, EngineError>;
