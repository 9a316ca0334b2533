//! Chess position evaluation types.

use std::ops::Neg;

use serde::Serialize;
use uci::Score;

/// Centipawn value standing in for a forced mate.
pub const MATE_CP: i32 = 10_000;

/// Represents a chess position evaluation.
///
/// Evaluations can be either centipawn scores (for normal positions)
/// or mate scores (when a forced mate is found).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Evaluation {
    /// Centipawn evaluation (positive = good for the side it is viewed from)
    #[serde(rename = "cp")]
    Centipawns(i32),
    /// Mate in N moves (positive = delivering mate, negative = getting mated)
    Mate(i32),
}

impl Evaluation {
    /// Collapse onto one centipawn scale.
    ///
    /// Mates sit beyond every ordinary score, and a quicker mate is worth
    /// more than a slower one.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Evaluation::Centipawns(cp) => cp,
            Evaluation::Mate(n) if n > 0 => MATE_CP - n,
            Evaluation::Mate(n) => -MATE_CP - n,
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, Evaluation::Mate(_))
    }

    /// Pawn-unit text: `+0.35`, `-1.20`, `0.00`, `#+3`, `#-2`.
    pub fn format(self) -> String {
        match self {
            Evaluation::Mate(n) if n > 0 => format!("#+{}", n),
            Evaluation::Mate(n) => format!("#-{}", n.unsigned_abs()),
            Evaluation::Centipawns(cp) if cp > 0 => format!("+{:.2}", f64::from(cp) / 100.0),
            Evaluation::Centipawns(cp) if cp < 0 => format!("{:.2}", f64::from(cp) / 100.0),
            Evaluation::Centipawns(_) => "0.00".to_string(),
        }
    }

    /// Fill of an evaluation bar, 0 to 100, saturating at five pawns.
    pub fn bar_percent(self) -> f64 {
        match self {
            Evaluation::Mate(n) if n > 0 => 100.0,
            Evaluation::Mate(_) => 0.0,
            Evaluation::Centipawns(cp) => {
                let clamped = f64::from(cp.clamp(-500, 500));
                (clamped + 500.0) / 1000.0 * 100.0
            }
        }
    }
}

impl Neg for Evaluation {
    type Output = Self;

    /// The same evaluation from the other side's point of view.
    fn neg(self) -> Self {
        match self {
            Evaluation::Centipawns(cp) => Evaluation::Centipawns(cp.saturating_neg()),
            Evaluation::Mate(n) => Evaluation::Mate(n.saturating_neg()),
        }
    }
}

impl From<Score> for Evaluation {
    fn from(score: Score) -> Self {
        match score {
            Score::Cp(cp) => Evaluation::Centipawns(cp),
            Score::Mate(n) => Evaluation::Mate(n),
        }
    }
}
