use thiserror::Error;

/// Errors raised by the channel to the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel could not be opened (spawn failed, pipes missing).
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
    /// An I/O error on an open channel.
    #[error("Transport failure: {0}")]
    Failure(String),
    /// The engine went away or the channel was closed.
    #[error("Engine closed unexpectedly")]
    Closed,
}

/// Errors surfaced by the multiplexer to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The command was cancelled before its terminal line arrived.
    #[error("Command was discarded before it completed")]
    Discarded,
    /// The multiplexer was shut down.
    #[error("Multiplexer has been shut down")]
    ShutDown,
}
