//! engine-analyze - Analyse positions with a UCI engine and classify moves.

use std::path::PathBuf;

use anyhow::Context;
use chess_analysis::{classify, AnalysisResult, AnalysisSession, EngineConfig, MoveEvaluation};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "engine-analyze")]
#[command(about = "Analyse chess positions with a UCI engine")]
struct Cli {
    /// Engine executable (overrides the config file)
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    /// Config file (default: engine.toml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search a position and print the engine's verdict
    Analyze {
        /// Position in FEN notation
        #[arg(long, conflicts_with = "moves")]
        fen: Option<String>,
        /// Moves from the starting position, in UCI notation
        #[arg(long, num_args = 1..)]
        moves: Vec<String>,
        /// Search depth in plies (default from config)
        #[arg(short, long)]
        depth: Option<u32>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify a move from three white-positive centipawn scores
    Classify {
        /// Evaluation before the move
        #[arg(long, allow_hyphen_values = true)]
        before: i32,
        /// Evaluation after the move
        #[arg(long, allow_hyphen_values = true)]
        after: i32,
        /// Evaluation after the engine's best move
        #[arg(long, allow_hyphen_values = true)]
        best: i32,
        /// The move was played by black
        #[arg(long)]
        black: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            fen,
            moves,
            depth,
            json,
        } => {
            let config = load_config(cli.config, cli.engine)?;
            let result = analyze(&config, fen.as_deref(), moves, depth).await?;
            match result {
                Some(result) if json => println!("{}", serde_json::to_string_pretty(&result)?),
                Some(result) => println!("{}", describe_result(&result)),
                None => println!("no analysis"),
            }
        }
        Commands::Classify {
            before,
            after,
            best,
            black,
            json,
        } => {
            let evaluation = classify(before, after, best, !black);
            if json {
                println!("{}", serde_json::to_string_pretty(&evaluation)?);
            } else {
                println!("{}", describe_move(&evaluation));
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>, engine: Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::load()?,
    };
    if let Some(engine) = engine {
        config.path = engine;
    }
    Ok(config)
}

async fn analyze(
    config: &EngineConfig,
    fen: Option<&str>,
    moves: Vec<String>,
    depth: Option<u32>,
) -> anyhow::Result<Option<AnalysisResult>> {
    let session = AnalysisSession::spawn(config)?;
    session.wait_ready().await?;

    let mut updates = session.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().analysis.clone();
            if let Some(a) = snapshot {
                tracing::info!(
                    depth = a.depth,
                    score = %a.score.format(),
                    pv = %a.pv.join(" "),
                    "analysis"
                );
            }
        }
    });

    match fen {
        Some(fen) => session.analyze_position(fen, depth)?,
        None => session.analyze_moves(moves, depth)?,
    }

    let result = tokio::select! {
        result = session.wait_idle() => result?,
        _ = signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping search");
            session.stop_analysis();
            session.current_analysis()
        }
    };
    session.shutdown();
    Ok(result)
}

fn describe_result(result: &AnalysisResult) -> String {
    let mut out = format!("depth {}  score {}", result.depth, result.score.format());
    if let Some(best) = &result.best_move {
        out.push_str(&format!("  bestmove {}", best));
    }
    if let Some(ponder) = &result.ponder {
        out.push_str(&format!("  ponder {}", ponder));
    }
    if !result.pv.is_empty() {
        out.push_str(&format!("\npv {}", result.pv.join(" ")));
    }
    out
}

fn describe_move(evaluation: &MoveEvaluation) -> String {
    format!(
        "{} ({:+} cp) - {}",
        evaluation.quality, evaluation.score, evaluation.description
    )
}
