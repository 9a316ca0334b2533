//! Live analysis snapshots built from streamed search output.

use serde::Serialize;
use uci::{BestMove, EngineInfo};

use crate::Evaluation;

/// Latest view of a running or finished search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// Search depth in plies
    pub depth: u32,
    /// Score from the side to move's perspective
    pub score: Evaluation,
    /// Engine's best move, known once the search finishes
    pub best_move: Option<String>,
    /// Expected reply to the best move
    pub ponder: Option<String>,
    /// Principal variation
    pub pv: Vec<String>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    /// Search time in milliseconds
    pub time: Option<u64>,
}

impl AnalysisResult {
    /// Fold one `info` line onto the previous snapshot.
    ///
    /// Returns `None` when the line does not update the analysis: bound
    /// scores and lines without both depth and score are skipped. Fields the
    /// line leaves out keep their previous values.
    pub fn update(previous: Option<&Self>, info: &EngineInfo) -> Option<Self> {
        if info.bound {
            return None;
        }
        let (depth, score) = match (info.depth, info.score) {
            (Some(depth), Some(score)) => (depth, Evaluation::from(score)),
            _ => return None,
        };

        let mut next = match previous {
            Some(prev) => prev.clone(),
            None => Self {
                depth,
                score,
                best_move: None,
                ponder: None,
                pv: Vec::new(),
                nodes: None,
                nps: None,
                time: None,
            },
        };
        next.depth = depth;
        next.score = score;
        if !info.pv.is_empty() {
            next.pv = info.pv.clone();
        }
        next.nodes = info.nodes.or(next.nodes);
        next.nps = info.nps.or(next.nps);
        next.time = info.time.or(next.time);
        Some(next)
    }

    /// Carry the search verdict onto the snapshot.
    pub fn finish(&mut self, verdict: &BestMove) {
        self.best_move = verdict.mv.clone();
        self.ponder = verdict.ponder.clone();
    }
}
