//! Command/response multiplexer for a single UCI engine.
//!
//! UCI has no request identifiers: the engine answers on one stream and some
//! commands are never answered at all. The [`Multiplexer`] keeps a FIFO of
//! commands that expect a reply and attributes every incoming line to one of
//! them by its category, so many callers can share one engine process.
//!
//! # Overview
//!
//! - [`Transport`] - Duplex line channel to the engine ([`ProcessTransport`],
//!   [`ChannelTransport`])
//! - [`Multiplexer`] - Pending-command queue, reply correlation, cancellation
//! - [`route`] - The correlation heuristic on its own
//!
//! # Example
//!
//! ```ignore
//! use engine_mux::Multiplexer;
//!
//! let mux = Multiplexer::spawn_process("stockfish", &[])?;
//! mux.request("uci").await?;
//! mux.send("position startpos", None, None)?;
//! let bestmove = mux.request("go depth 12").await?;
//! ```

mod error;
mod multiplexer;
mod pending;
mod transport;

pub use error::{MuxError, TransportError};
pub use multiplexer::{Handshake, Multiplexer, OnError};
pub use pending::{route, OnComplete, OnStream, PendingCommand};
pub use transport::{
    ChannelTransport, EngineEnd, EventStream, ProcessTransport, Transport, TransportEvent,
};
