//! Move quality classification.

use serde::Serialize;

use crate::Evaluation;

/// Classification of a played move, roughly from most to least favourable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveQuality {
    /// Matches the best line and swings the evaluation by a pawn or more
    Brilliant,
    /// The best move (or within 10 centipawns of it)
    Best,
    /// Minimal loss against the best move
    Excellent,
    /// Small loss
    Okay,
    /// Noticeable loss
    Inaccuracy,
    /// Significant loss
    Mistake,
    /// Large loss in a position that was already decided either way
    Critical,
    /// Large loss in a balanced position
    Blunder,
    /// Book move; assigned by callers, never by [`classify`]
    Theory,
}

impl MoveQuality {
    /// Every quality, in the order a report lists them.
    pub const ALL: [MoveQuality; 9] = [
        MoveQuality::Brilliant,
        MoveQuality::Best,
        MoveQuality::Excellent,
        MoveQuality::Okay,
        MoveQuality::Inaccuracy,
        MoveQuality::Mistake,
        MoveQuality::Critical,
        MoveQuality::Blunder,
        MoveQuality::Theory,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MoveQuality::Brilliant => "brilliant",
            MoveQuality::Best => "best",
            MoveQuality::Excellent => "excellent",
            MoveQuality::Okay => "okay",
            MoveQuality::Inaccuracy => "inaccuracy",
            MoveQuality::Mistake => "mistake",
            MoveQuality::Critical => "critical",
            MoveQuality::Blunder => "blunder",
            MoveQuality::Theory => "theory",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MoveQuality::Brilliant => "Brilliant move! Finds the best continuation.",
            MoveQuality::Best => "Best move in the position.",
            MoveQuality::Excellent => "Excellent move. Very close to the best.",
            MoveQuality::Okay => "Good move. Maintains a reasonable position.",
            MoveQuality::Inaccuracy => "Inaccuracy. Not the most precise move.",
            MoveQuality::Mistake => "Mistake. Gives opponent a significant advantage.",
            MoveQuality::Critical => "Critical position. Precision required.",
            MoveQuality::Blunder => "Blunder! Major mistake that loses material or position.",
            MoveQuality::Theory => "A move that follows known opening or endgame theory",
        }
    }

    /// Display colour as a hex string.
    pub fn color(self) -> &'static str {
        match self {
            MoveQuality::Brilliant => "#1e40af",
            MoveQuality::Best | MoveQuality::Excellent => "#059669",
            MoveQuality::Okay => "#65a30d",
            MoveQuality::Inaccuracy => "#d97706",
            MoveQuality::Mistake => "#dc2626",
            MoveQuality::Critical => "#7c2d12",
            MoveQuality::Blunder => "#991b1b",
            MoveQuality::Theory => "#6366f1",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for MoveQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Verdict on one played move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveEvaluation {
    pub quality: MoveQuality,
    /// Evaluation change caused by the move, from the mover's side.
    pub score: i32,
    pub description: &'static str,
    pub color: &'static str,
}

impl MoveEvaluation {
    fn new(quality: MoveQuality, score: i32) -> Self {
        Self {
            quality,
            score,
            description: quality.description(),
            color: quality.color(),
        }
    }

    /// A book move.
    pub fn theory() -> Self {
        Self::new(MoveQuality::Theory, 0)
    }
}

/// Classify a move from three white-positive centipawn scores.
///
/// `score_before` and `score_after` evaluate the position before and after
/// the move; `best_available` is the score after the engine's best move.
/// Scores are flipped to the mover's side when `side_is_white` is false.
pub fn classify(
    score_before: i32,
    score_after: i32,
    best_available: i32,
    side_is_white: bool,
) -> MoveEvaluation {
    let orient = |score: i32| {
        if side_is_white {
            score
        } else {
            score.saturating_neg()
        }
    };
    let before = orient(score_before);
    let after = orient(score_after);
    let best = orient(best_available);

    let delta = after.saturating_sub(before);
    let loss_from_best = best.saturating_sub(after);

    let quality = match loss_from_best {
        l if l <= 10 && delta >= 100 => MoveQuality::Brilliant,
        l if l <= 10 => MoveQuality::Best,
        l if l <= 25 => MoveQuality::Excellent,
        l if l <= 50 => MoveQuality::Okay,
        l if l <= 100 => MoveQuality::Inaccuracy,
        l if l <= 250 => MoveQuality::Mistake,
        _ if before.unsigned_abs() > 300 || after.unsigned_abs() > 300 => MoveQuality::Critical,
        _ => MoveQuality::Blunder,
    };

    MoveEvaluation::new(quality, delta)
}

/// [`classify`] over engine evaluations, which may be forced mates.
///
/// Mates are first placed on the centipawn scale via
/// [`Evaluation::to_centipawns`], so missing a mate counts as a large loss
/// and finding one as a large gain.
pub fn classify_evaluations(
    before: Evaluation,
    after: Evaluation,
    best: Evaluation,
    side_is_white: bool,
) -> MoveEvaluation {
    classify(
        before.to_centipawns(),
        after.to_centipawns(),
        best.to_centipawns(),
        side_is_white,
    )
}

/// Per-quality move counts, e.g. for one player over a game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityTally {
    counts: [u32; MoveQuality::ALL.len()],
}

impl QualityTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, quality: MoveQuality) {
        self.counts[quality.index()] += 1;
    }

    pub fn count(&self, quality: MoveQuality) -> u32 {
        self.counts[quality.index()]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Share of recorded moves with this quality, 0 to 100.
    pub fn percent(&self, quality: MoveQuality) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        f64::from(self.count(quality)) / f64::from(total) * 100.0
    }

    /// Share of moves that were brilliant, best, excellent or okay, 0 to 100.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let sound: u32 = [
            MoveQuality::Brilliant,
            MoveQuality::Best,
            MoveQuality::Excellent,
            MoveQuality::Okay,
        ]
        .into_iter()
        .map(|q| self.count(q))
        .sum();
        f64::from(sound) / f64::from(total) * 100.0
    }

    /// Non-zero counts in report order.
    pub fn iter(&self) -> impl Iterator<Item = (MoveQuality, u32)> + '_ {
        MoveQuality::ALL
            .iter()
            .map(|&q| (q, self.count(q)))
            .filter(|&(_, n)| n > 0)
    }
}

impl Extend<MoveQuality> for QualityTally {
    fn extend<I: IntoIterator<Item = MoveQuality>>(&mut self, iter: I) {
        for quality in iter {
            self.record(quality);
        }
    }
}

impl FromIterator<MoveQuality> for QualityTally {
    fn from_iter<I: IntoIterator<Item = MoveQuality>>(iter: I) -> Self {
        let mut tally = Self::new();
        tally.extend(iter);
        tally
    }
}

impl Serialize for QualityTally {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(MoveQuality::ALL.len() + 1))?;
        for quality in MoveQuality::ALL {
            map.serialize_entry(quality.label(), &self.count(quality))?;
        }
        map.serialize_entry("accuracy", &self.accuracy())?;
        map.end()
    }
}
