//! Search output: `info` and `bestmove` lines.

use serde::{Deserialize, Serialize};

/// Score in centipawns or mate distance, from the side to move's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    /// Centipawn score (100 = 1 pawn advantage).
    Cp(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated).
    Mate(i32),
}

/// Search information from one `info` line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineInfo {
    /// Search depth in plies.
    pub depth: Option<u32>,
    /// Selective search depth.
    pub seldepth: Option<u32>,
    /// Score evaluation.
    pub score: Option<Score>,
    /// Set when the score is only a fail-high/fail-low bound.
    pub bound: bool,
    /// Nodes searched.
    pub nodes: Option<u64>,
    /// Nodes per second.
    pub nps: Option<u64>,
    /// Time spent in milliseconds.
    pub time: Option<u64>,
    /// Principal variation (best line found).
    pub pv: Vec<String>,
    /// Which line this is in multi-PV mode.
    pub multipv: Option<u32>,
    /// Hash table usage (per mille).
    pub hashfull: Option<u32>,
    /// Arbitrary string info.
    pub string: Option<String>,
}

impl EngineInfo {
    /// Parse a UCI info line.
    ///
    /// Returns `None` for anything that is not an `info` line. Tokens that
    /// fail to parse are skipped rather than rejecting the line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().peekable();
        if parts.next() != Some("info") {
            return None;
        }

        let mut info = EngineInfo::default();
        while let Some(token) = parts.next() {
            match token {
                "depth" => info.depth = parts.next().and_then(|s| s.parse().ok()),
                "seldepth" => info.seldepth = parts.next().and_then(|s| s.parse().ok()),
                "nodes" => info.nodes = parts.next().and_then(|s| s.parse().ok()),
                "nps" => info.nps = parts.next().and_then(|s| s.parse().ok()),
                "time" => info.time = parts.next().and_then(|s| s.parse().ok()),
                "multipv" => info.multipv = parts.next().and_then(|s| s.parse().ok()),
                "hashfull" => info.hashfull = parts.next().and_then(|s| s.parse().ok()),
                "score" => {
                    let kind = parts.next();
                    let value = parts.next().and_then(|s| s.parse().ok());
                    info.score = match (kind, value) {
                        (Some("cp"), Some(v)) => Some(Score::Cp(v)),
                        (Some("mate"), Some(v)) => Some(Score::Mate(v)),
                        _ => info.score,
                    };
                }
                "upperbound" | "lowerbound" => info.bound = true,
                "pv" => {
                    while let Some(mv) = parts.next_if(|s| !is_info_keyword(s)) {
                        info.pv.push(mv.to_string());
                    }
                }
                "string" => {
                    // Rest of line is the string
                    info.string = Some(parts.by_ref().collect::<Vec<_>>().join(" "));
                }
                _ => {}
            }
        }

        Some(info)
    }
}

fn is_info_keyword(s: &str) -> bool {
    matches!(
        s,
        "depth"
            | "seldepth"
            | "score"
            | "nodes"
            | "nps"
            | "time"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "tbhits"
            | "string"
    )
}

/// A parsed `bestmove <move> [ponder <move>]` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMove {
    /// `None` when the engine reports `(none)` (no legal moves).
    pub mv: Option<String>,
    pub ponder: Option<String>,
}

impl BestMove {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("bestmove") {
            return None;
        }
        let mv = parts
            .next()
            .filter(|m| *m != "(none)")
            .map(str::to_string);
        let ponder = match parts.next() {
            Some("ponder") => parts.next().map(str::to_string),
            _ => None,
        };
        Some(Self { mv, ponder })
    }
}
