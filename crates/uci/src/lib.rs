//! UCI (Universal Chess Interface) vocabulary for driving an external engine.
//!
//! This crate knows what the text on the wire means but never touches the
//! wire itself. It is shared by the multiplexer (which routes replies) and the
//! analysis session (which reads search output).
//!
//! # Commands we send
//!
//! - `uci` / `uciok` - Handshake, followed by `id` and `option` lines
//! - `isready` / `readyok` - Synchronization
//! - `position (startpos | fen <fen>) [moves <move>...]` - Set position (no reply)
//! - `setoption name <name> value <value>` - Configure (no reply)
//! - `go depth <d>` - Start search, streams `info` and ends with `bestmove`
//! - `stop` / `ponderhit` / `ucinewgame` / `flip` - No reply
//! - `d` - Board dump, ends with `Legal uci moves` or `Key is`
//! - `eval` - Evaluation dump, ends with the total/final evaluation line
//! - `bench` - Benchmark, ends with `Nodes/second`

mod command;
mod info;
mod reply;

pub use command::{go_depth, set_option, CommandKind, Position, HANDSHAKE, READY_CHECK, STOP};
pub use info::{BestMove, EngineInfo, Score};
pub use reply::{is_noise, ReplyKind};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UciError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// First whitespace-delimited token of a line, or the whole line.
pub fn first_word(line: &str) -> &str {
    line.split(' ').next().unwrap_or(line)
}
