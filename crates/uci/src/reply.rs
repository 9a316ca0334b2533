//! Lines sent from the engine back to us.

use crate::{first_word, CommandKind};

/// Category of a reply line, decided by its first word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// `uciok` and `option ...`
    Handshake,
    /// `readyok`
    Ready,
    /// `info ...` and `bestmove ...`
    Search,
    /// Anything else (board dumps, eval tables, bench summaries, errors).
    Other,
}

impl ReplyKind {
    pub fn of(line: &str) -> Self {
        match first_word(line) {
            "uciok" | "option" => ReplyKind::Handshake,
            "readyok" => ReplyKind::Ready,
            "bestmove" | "info" => ReplyKind::Search,
            _ => ReplyKind::Other,
        }
    }

    /// Whether a pending command of `kind` claims lines of this category.
    ///
    /// Catch-all lines belong to the dump commands; benchmarks and unknown
    /// commands are never claimed by category.
    pub fn matches(self, kind: CommandKind) -> bool {
        matches!(
            (self, kind),
            (ReplyKind::Handshake, CommandKind::Handshake)
                | (ReplyKind::Ready, CommandKind::ReadyCheck)
                | (ReplyKind::Search, CommandKind::Search)
                | (ReplyKind::Other, CommandKind::Inspect)
                | (ReplyKind::Other, CommandKind::EvalDump)
        )
    }
}

/// Lines that never complete or belong to a command: banners, `id` lines,
/// complaints about unknown options, and blank lines.
pub fn is_noise(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("No such option")
        || line.starts_with("id ")
        || line.starts_with("Stockfish")
}
