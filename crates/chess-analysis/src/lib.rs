//! Live chess position analysis over a UCI engine.
//!
//! This crate drives a Stockfish-style engine through an
//! [`engine_mux::Multiplexer`] and classifies played moves by how much
//! evaluation they give up against the engine's best line.
//!
//! # Overview
//!
//! - [`AnalysisSession`] - One engine, one search at a time, observable state
//! - [`AnalysisResult`] - Snapshot of a search as it streams in
//! - [`Evaluation`] - Position evaluation (centipawn or mate score)
//! - [`classify`] / [`MoveQuality`] - Move quality from three scores
//! - [`EngineConfig`] - Engine path, arguments and options from `engine.toml`
//!
//! # Example
//!
//! ```ignore
//! use chess_analysis::{AnalysisSession, EngineConfig};
//!
//! let session = AnalysisSession::spawn(&EngineConfig::load()?)?;
//! session.wait_ready().await?;
//! session.analyze_moves(["e2e4", "e7e5"], Some(18))?;
//! if let Some(result) = session.wait_idle().await? {
//!     println!("{} {}", result.score.format(), result.best_move.unwrap_or_default());
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod evaluation;
pub mod quality;
pub mod session;

pub use analysis::AnalysisResult;
pub use config::{ConfigError, EngineConfig, OptionValue};
pub use evaluation::{Evaluation, MATE_CP};
pub use quality::{classify, classify_evaluations, MoveEvaluation, MoveQuality, QualityTally};
pub use session::{AnalysisSession, SessionError, SessionState, SessionStatus, DEFAULT_DEPTH};
