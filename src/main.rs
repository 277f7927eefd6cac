//! othello-pns: best-first proof-number search for Othello.
//!
//! ## Usage
//!
//! - `othello-pns protocol` - Serve the text protocol on stdin/stdout
//! - `othello-pns analyze` - Search one position and print the result
//! - `othello-pns bench` - Search a batch of random positions

use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use othello_pns::board::{Board, Color};
use othello_pns::constants::{DEFAULT_TABLE_CAPACITY, MAX_GOAL, MIN_GOAL};
use othello_pns::driver::{SearchConfig, SearchDriver};
use othello_pns::position::{random_position, str_coord};
use othello_pns::proofs::Claim;
use othello_pns::protocol::ProtocolEngine;

/// othello-pns: best-first proof-number search for Othello
#[derive(Parser)]
#[command(name = "othello-pns")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Worker threads (defaults to the number of cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Transposition table slots
    #[arg(long, global = true, default_value_t = DEFAULT_TABLE_CAPACITY)]
    table: usize,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the line-oriented text protocol on stdin/stdout
    Protocol,
    /// Search one position and print score, bounds, status and each move
    Analyze {
        /// 64 squares, `X` black, `O` white, `-` empty (default: opening)
        #[arg(long)]
        board: Option<String>,
        /// Side to move: X or O
        #[arg(long, default_value = "X")]
        turn: String,
        #[arg(long, default_value_t = 1_000_000)]
        nodes: u64,
        #[arg(long, default_value_t = 10_000)]
        millis: u64,
        #[arg(long, default_value_t = MIN_GOAL, allow_hyphen_values = true)]
        lower: i32,
        #[arg(long, default_value_t = MAX_GOAL, allow_hyphen_values = true)]
        upper: i32,
        /// Also print the DAG-wide remaining proof cost
        #[arg(long)]
        proof_cost: bool,
    },
    /// Search random positions with a fixed number of empties
    Bench {
        #[arg(long, default_value_t = 10)]
        positions: usize,
        #[arg(long, default_value_t = 20)]
        empties: u32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 100_000)]
        nodes: u64,
        #[arg(long, default_value_t = 10_000)]
        millis: u64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = SearchConfig {
        table_capacity: cli.table,
        table_buckets: cli.table.saturating_mul(2),
        ..SearchConfig::default()
    };
    if let Some(threads) = cli.threads {
        config.workers = threads;
    }

    match cli.command {
        Some(Commands::Protocol) | None => {
            let mut engine = ProtocolEngine::new(config)?;
            engine.run()
        }
        Some(Commands::Analyze {
            board,
            turn,
            nodes,
            millis,
            lower,
            upper,
            proof_cost,
        }) => run_analyze(config, board, &turn, nodes, millis, lower, upper, proof_cost),
        Some(Commands::Bench {
            positions,
            empties,
            seed,
            nodes,
            millis,
        }) => run_bench(config, positions, empties, seed, nodes, millis),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_analyze(
    config: SearchConfig,
    board: Option<String>,
    turn: &str,
    nodes: u64,
    millis: u64,
    lower: i32,
    upper: i32,
    proof_cost: bool,
) -> Result<()> {
    let to_move = match turn.to_ascii_uppercase().as_str() {
        "X" | "B" | "BLACK" => Color::Black,
        "O" | "W" | "WHITE" => Color::White,
        other => anyhow::bail!("unknown side to move {other}"),
    };
    let board = match board {
        Some(squares) => Board::parse(&squares, to_move).context("invalid --board")?,
        None => Board::default(),
    };
    println!("{board}\n");

    let mut driver = SearchDriver::new(config)?;
    let result = driver.search(board.position(), lower, upper, nodes, millis)?;
    println!("score:  {}", result.score);
    println!("bounds: [{}, {}]", result.lower, result.upper);
    println!("status: {}", result.status);
    println!("nodes:  {}", result.visited);
    let moves = driver.move_annotations();
    if !moves.is_empty() {
        println!("\nmove    eval   lower   upper        nodes      proof   disproof");
        for m in &moves {
            println!(
                "{:<4} {:>7} {:>7} {:>7} {:>12} {:>10.0} {:>10.0}{}",
                str_coord(m.square),
                m.eval,
                m.lower,
                m.upper,
                m.descendants,
                m.proof,
                m.disproof,
                if m.best { "  *" } else { "" }
            );
        }
    }
    if proof_cost {
        let show = |cost: Option<f64>| cost.map_or("none".to_string(), |c| format!("{c:.0}"));
        println!(
            "goal {}: prove {} / disprove {}",
            driver.goal().map(|g| g.to_string()).unwrap_or_default(),
            show(driver.remaining_proof_cost(Claim::ProveGreaterEqual)),
            show(driver.remaining_proof_cost(Claim::DisproveStrictlyGreater))
        );
    }
    Ok(())
}

fn run_bench(config: SearchConfig, positions: usize, empties: u32, seed: u64, nodes: u64, millis: u64) -> Result<()> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut driver = SearchDriver::new(config)?;
    let plies = 60u32.saturating_sub(empties);
    let start = Instant::now();
    let mut total_nodes = 0u64;
    let mut solved = 0usize;

    for i in 0..positions {
        let pos = random_position(&mut rng, plies);
        let result = driver.search(pos, MIN_GOAL, MAX_GOAL, nodes, millis)?;
        total_nodes += result.visited;
        if result.lower == result.upper {
            solved += 1;
        }
        println!(
            "#{i:<3} empties {:>2}  score {:>6}  [{:>6}, {:>6}]  {:<22}  {} nodes",
            pos.empties(),
            result.score,
            result.lower,
            result.upper,
            result.status,
            result.visited
        );
    }

    let elapsed = start.elapsed();
    println!(
        "{positions} positions, {solved} solved, {total_nodes} nodes in {:.2?} ({:.0} nodes/s)",
        elapsed,
        total_nodes as f64 / elapsed.as_secs_f64().max(1e-9)
    );
    Ok(())
}
