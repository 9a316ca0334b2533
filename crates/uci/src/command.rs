//! Commands sent from our side to the engine.

use crate::{first_word, UciError};

/// Handshake command, answered by `id`/`option` lines and `uciok`.
pub const HANDSHAKE: &str = "uci";
/// Readiness check, answered by `readyok`.
pub const READY_CHECK: &str = "isready";
/// Interrupts a running search; the engine still answers with `bestmove`.
pub const STOP: &str = "stop";

/// Commands the engine never answers.
const NON_REPLYING: [&str; 4] = ["ucinewgame", "flip", "stop", "ponderhit"];

/// Category of an outbound command, decided by its first word.
///
/// Reply lines are routed back to pending commands by matching categories,
/// so this enum is closed: anything unrecognised is [`CommandKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `uci`
    Handshake,
    /// `isready`
    ReadyCheck,
    /// `go ...`
    Search,
    /// `d` (board dump)
    Inspect,
    /// `eval`
    EvalDump,
    /// `bench`; streams `info`/`bestmove` lines that must not finish it.
    Benchmark,
    /// Everything else.
    Other,
}

impl CommandKind {
    /// Classify a command by its first word.
    pub fn of(command: &str) -> Self {
        match first_word(command.trim()) {
            "uci" => CommandKind::Handshake,
            "isready" => CommandKind::ReadyCheck,
            "go" => CommandKind::Search,
            "d" => CommandKind::Inspect,
            "eval" => CommandKind::EvalDump,
            "bench" => CommandKind::Benchmark,
            _ => CommandKind::Other,
        }
    }

    /// Whether the engine will send at least one line in response.
    ///
    /// `position` and `setoption` are matched as prefixes, the rest of the
    /// silent set only as the whole command.
    pub fn expects_reply(command: &str) -> bool {
        let command = command.trim();
        !(NON_REPLYING.contains(&command)
            || command.starts_with("position")
            || command.starts_with("setoption"))
    }
}

/// A position to search from: a FEN (or the start position) plus moves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Position {
    /// `None` means `startpos`.
    pub fen: Option<String>,
    /// Moves in UCI notation applied after the base position.
    pub moves: Vec<String>,
}

impl Position {
    /// The standard starting position.
    pub fn startpos() -> Self {
        Self::default()
    }

    /// A position given in FEN notation.
    ///
    /// Rejects empty input and anything spanning more than one line, since
    /// a newline would smuggle a second command onto the wire.
    pub fn from_fen(fen: &str) -> Result<Self, UciError> {
        let fen = fen.trim();
        if fen.is_empty() {
            return Err(UciError::InvalidCommand("empty FEN".to_string()));
        }
        if fen.contains(['\n', '\r']) {
            return Err(UciError::InvalidCommand(format!(
                "FEN spans multiple lines: {:?}",
                fen
            )));
        }
        Ok(Self {
            fen: Some(fen.to_string()),
            moves: Vec::new(),
        })
    }

    /// Append moves to play from the base position.
    pub fn with_moves<I, S>(mut self, moves: I) -> Result<Self, UciError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for mv in moves {
            let mv = mv.into();
            if mv.is_empty() || mv.contains(char::is_whitespace) {
                return Err(UciError::InvalidCommand(format!("bad move: {:?}", mv)));
            }
            self.moves.push(mv);
        }
        Ok(self)
    }

    /// Format as a `position` command.
    pub fn to_uci(&self) -> String {
        let mut cmd = match &self.fen {
            Some(fen) => format!("position fen {}", fen),
            None => "position startpos".to_string(),
        };
        if !self.moves.is_empty() {
            cmd.push_str(" moves ");
            cmd.push_str(&self.moves.join(" "));
        }
        cmd
    }
}

/// `go depth <depth>`
pub fn go_depth(depth: u32) -> String {
    format!("go depth {}", depth)
}

/// `setoption name <name> value <value>`
pub fn set_option(name: &str, value: &str) -> String {
    format!("setoption name {} value {}", name, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_first_word() {
        assert_eq!(CommandKind::of("uci"), CommandKind::Handshake);
        assert_eq!(CommandKind::of("isready"), CommandKind::ReadyCheck);
        assert_eq!(CommandKind::of("go depth 10"), CommandKind::Search);
        assert_eq!(CommandKind::of("go infinite"), CommandKind::Search);
        assert_eq!(CommandKind::of("d"), CommandKind::Inspect);
        assert_eq!(CommandKind::of("eval"), CommandKind::EvalDump);
        assert_eq!(CommandKind::of("bench 16 1 10"), CommandKind::Benchmark);
        assert_eq!(CommandKind::of("perft 3"), CommandKind::Other);
    }

    #[test]
    fn uci_is_not_ucinewgame() {
        assert_eq!(CommandKind::of("ucinewgame"), CommandKind::Other);
    }

    #[test]
    fn silent_commands() {
        for cmd in ["ucinewgame", "flip", "stop", "ponderhit", "  stop  "] {
            assert!(!CommandKind::expects_reply(cmd), "{}", cmd);
        }
        assert!(!CommandKind::expects_reply("position startpos moves e2e4"));
        assert!(!CommandKind::expects_reply(
            "setoption name Hash value 128"
        ));
    }

    #[test]
    fn replying_commands() {
        for cmd in ["uci", "isready", "go depth 5", "d", "eval", "bench", "stop now"] {
            assert!(CommandKind::expects_reply(cmd), "{}", cmd);
        }
    }

    #[test]
    fn position_startpos() {
        assert_eq!(Position::startpos().to_uci(), "position startpos");
    }

    #[test]
    fn position_startpos_with_moves() {
        let pos = Position::startpos().with_moves(["e2e4", "e7e5"]).unwrap();
        assert_eq!(pos.to_uci(), "position startpos moves e2e4 e7e5");
    }

    #[test]
    fn position_fen() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        let pos = Position::from_fen(fen).unwrap();
        assert_eq!(pos.to_uci(), format!("position fen {}", fen));
    }

    #[test]
    fn position_fen_rejects_newline() {
        let err = Position::from_fen("8/8/8/8/8/8/8/8 w - - 0 1\ngo infinite").unwrap_err();
        assert!(matches!(err, UciError::InvalidCommand(_)));
    }

    #[test]
    fn position_fen_rejects_empty() {
        assert!(Position::from_fen("   ").is_err());
    }

    #[test]
    fn moves_reject_whitespace() {
        assert!(Position::startpos().with_moves(["e2e4 go"]).is_err());
        assert!(Position::startpos().with_moves([""]).is_err());
    }

    #[test]
    fn go_and_setoption_format() {
        assert_eq!(go_depth(15), "go depth 15");
        assert_eq!(set_option("Threads", "2"), "setoption name Threads value 2");
    }
}
