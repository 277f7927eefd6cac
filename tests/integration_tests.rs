//! Integration tests for othello-pns
//!
//! End-to-end searches through the public driver API: budgets, finished
//! games, exact solves, stopping, and the consistency of the DAG left in
//! the table afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use othello_pns::board::symmetries;
use othello_pns::constants::{MAX_GOAL, MAX_SCORE, MIN_GOAL, MIN_SCORE, QUANTUM};
use othello_pns::driver::{SearchConfig, SearchDriver, SearchStatus};
use othello_pns::endgame::{EndgameSolver, ExactSolver};
use othello_pns::error::{CollaboratorError, EngineError};
use othello_pns::midgame::{AlphaBetaEvaluator, HeuristicEvaluator};
use othello_pns::policy::ThresholdPolicy;
use othello_pns::position::{BitboardMover, Position, random_position};

// =============================================================================
// Helper functions
// =============================================================================

fn config(workers: usize) -> SearchConfig {
    SearchConfig {
        workers,
        table_capacity: 50_000,
        table_buckets: 100_000,
        ..SearchConfig::default()
    }
}

/// A reachable position with exactly `empties` empty squares whose game is
/// not over.
fn position_with_empties(seed: u64, empties: u32) -> Position {
    let mut rng = fastrand::Rng::with_seed(seed);
    loop {
        let pos = random_position(&mut rng, 60 - empties);
        if pos.empties() == empties && !pos.is_game_over() {
            return pos;
        }
    }
}

fn exact_score(pos: &Position) -> i32 {
    ExactSolver::new()
        .exact_score(pos, MIN_SCORE - 1, MAX_SCORE + 1)
        .unwrap()
}

/// Solves exactly at or below `forced_empties`, never elsewhere.
fn solve_below(forced_empties: u32) -> Box<ThresholdPolicy> {
    Box::new(ThresholdPolicy {
        forced_empties,
        max_empties: forced_empties,
        ..ThresholdPolicy::default()
    })
}

/// Exact solver that counts its calls.
struct CountingSolver {
    inner: ExactSolver,
    calls: Arc<AtomicUsize>,
}

impl EndgameSolver for CountingSolver {
    fn exact_score(&mut self, position: &Position, alpha: i32, beta: i32) -> Result<i32, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exact_score(position, alpha, beta)
    }

    fn visited(&self) -> u64 {
        self.inner.visited()
    }

    fn reset_visited(&mut self) {
        self.inner.reset_visited();
    }
}

/// Returns the exact score whatever the window, like a fail-soft search
/// that never cuts off.
struct FailSoftSolver {
    inner: ExactSolver,
}

impl EndgameSolver for FailSoftSolver {
    fn exact_score(&mut self, position: &Position, _: i32, _: i32) -> Result<i32, CollaboratorError> {
        self.inner.exact_score(position, MIN_SCORE - 1, MAX_SCORE + 1)
    }

    fn visited(&self) -> u64 {
        self.inner.visited()
    }

    fn reset_visited(&mut self) {
        self.inner.reset_visited();
    }
}

/// Solver that always fails.
struct BrokenSolver;

impl EndgameSolver for BrokenSolver {
    fn exact_score(&mut self, _: &Position, _: i32, _: i32) -> Result<i32, CollaboratorError> {
        Err(CollaboratorError::Failed("out of order".into()))
    }

    fn visited(&self) -> u64 {
        0
    }

    fn reset_visited(&mut self) {}
}

// =============================================================================
// Budgets and finished games
// =============================================================================

#[test]
fn test_budget_of_one_returns_seed_eval() {
    let pos = Position::initial();
    let mut driver = SearchDriver::new(config(1)).unwrap();
    let result = driver.search(pos, MIN_GOAL, MAX_GOAL, 1, 60_000).unwrap();

    let seed = AlphaBetaEvaluator::new()
        .quick_score(&pos, 2, MIN_SCORE, MAX_SCORE)
        .unwrap();
    assert_eq!(result.status, SearchStatus::StoppedByNodeBudget);
    assert_eq!(result.score, seed);
    assert_eq!((result.lower, result.upper), (MIN_SCORE, MAX_SCORE));
    assert_eq!(driver.table_occupancy(), 1);
}

#[test]
fn test_finished_game_is_solved_without_work() {
    // Neither side can move: four disks against one.
    let pos = Position::new(0b1111, 1 << 63).unwrap();
    assert!(pos.is_game_over());
    let mut driver = SearchDriver::new(config(2)).unwrap();
    let result = driver.search(pos, MIN_GOAL, MAX_GOAL, 1, 60_000).unwrap();
    assert_eq!(result.status, SearchStatus::Solved);
    assert_eq!(result.score, 6200);
    assert_eq!((result.lower, result.upper), (6200, 6200));
}

#[test]
fn test_full_board_score() {
    let pos = Position::new(!0u64 << 8, 0xff).unwrap();
    let mut driver = SearchDriver::new(config(1)).unwrap();
    let result = driver.search(pos, MIN_GOAL, MAX_GOAL, 1, 60_000).unwrap();
    assert_eq!(result.status, SearchStatus::Solved);
    assert_eq!(result.score, 4800);
}

#[test]
fn test_zero_time_stops_immediately() {
    let mut driver = SearchDriver::new(config(1)).unwrap();
    let result = driver
        .search(Position::initial(), MIN_GOAL, MAX_GOAL, u64::MAX, 0)
        .unwrap();
    assert_eq!(result.status, SearchStatus::StoppedByTime);
}

#[test]
fn test_repeat_search_is_idempotent() {
    let pos = position_with_empties(4, 30);
    let mut driver = SearchDriver::new(config(2)).unwrap();
    let first = driver.search(pos, MIN_GOAL, MAX_GOAL, 2_000, 60_000).unwrap();
    let second = driver.search(pos, MIN_GOAL, MAX_GOAL, 2_000, 60_000).unwrap();
    assert_eq!(first.status, SearchStatus::StoppedByNodeBudget);
    assert_eq!(second.status, first.status);
    assert_eq!(second.score, first.score);
    assert_eq!(second.visited, first.visited);
}

#[test]
fn test_larger_budget_continues_from_table() {
    let pos = position_with_empties(9, 30);
    let mut driver = SearchDriver::new(config(2)).unwrap();
    let first = driver.search(pos, MIN_GOAL, MAX_GOAL, 1_000, 60_000).unwrap();
    let occupancy = driver.table_occupancy();
    let second = driver.search(pos, MIN_GOAL, MAX_GOAL, 5_000, 60_000).unwrap();
    assert!(second.visited >= first.visited);
    assert!(driver.table_occupancy() >= occupancy);
}

#[test]
fn test_new_root_starts_from_empty_table() {
    let mut driver = SearchDriver::new(config(2)).unwrap();
    driver
        .search(Position::initial(), MIN_GOAL, MAX_GOAL, 3_000, 60_000)
        .unwrap();
    assert!(driver.table_occupancy() > 1);

    let other = position_with_empties(6, 40);
    let result = driver.search(other, MIN_GOAL, MAX_GOAL, 1, 60_000).unwrap();
    assert_eq!(result.status, SearchStatus::StoppedByNodeBudget);
    assert_eq!(driver.table_occupancy(), 1);
    driver.check_invariants().unwrap();
}

#[test]
fn test_root_already_in_table_is_reused() {
    let pos = Position::initial();
    let mut driver = SearchDriver::new(config(2)).unwrap();
    driver.search(pos, MIN_GOAL, MAX_GOAL, 3_000, 60_000).unwrap();
    let occupancy = driver.table_occupancy();

    let child = pos.successors()[0];
    driver.search(child, MIN_GOAL, MAX_GOAL, 1, 60_000).unwrap();
    assert_eq!(driver.root(), Some(child));
    assert_eq!(driver.table_occupancy(), occupancy);
}

// =============================================================================
// Exact solving
// =============================================================================

#[test]
fn test_small_endgame_needs_one_solve() {
    let pos = position_with_empties(21, 12);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut driver = SearchDriver::with_collaborators(
        config(2),
        BitboardMover,
        AlphaBetaEvaluator::new,
        move || CountingSolver {
            inner: ExactSolver::new(),
            calls: Arc::clone(&counter),
        },
        Box::new(ThresholdPolicy::default()),
    )
    .unwrap();

    let result = driver.search(pos, MIN_GOAL, MAX_GOAL, u64::MAX, 120_000).unwrap();
    assert_eq!(result.status, SearchStatus::Solved);
    assert_eq!(result.score, exact_score(&pos));
    assert_eq!(result.lower, result.upper);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_search_matches_exact_solver() {
    for seed in [1, 2, 3] {
        let pos = position_with_empties(seed, 13);
        let mut driver = SearchDriver::with_collaborators(
            config(2),
            BitboardMover,
            AlphaBetaEvaluator::new,
            ExactSolver::new,
            solve_below(9),
        )
        .unwrap();
        let result = driver.search(pos, MIN_GOAL, MAX_GOAL, u64::MAX, 300_000).unwrap();
        assert_eq!(result.status, SearchStatus::Solved, "seed {seed}");
        assert_eq!(result.score, exact_score(&pos), "seed {seed}");
        driver.check_invariants().unwrap();
    }
}

#[test]
fn test_narrow_window_bounds_are_sound() {
    let pos = position_with_empties(17, 12);
    let truth = exact_score(&pos);
    // A window just above and one just below the true score.
    for (lower, upper) in [(truth + 100, truth + 100), (truth - 300, truth - 100)] {
        let (lower, upper) = (lower.clamp(MIN_GOAL, MAX_GOAL), upper.clamp(MIN_GOAL, MAX_GOAL));
        let mut driver = SearchDriver::with_collaborators(
            config(2),
            BitboardMover,
            AlphaBetaEvaluator::new,
            ExactSolver::new,
            solve_below(8),
        )
        .unwrap();
        let result = driver.search(pos, lower, upper, u64::MAX, 300_000).unwrap();
        assert_eq!(result.status, SearchStatus::Solved);
        assert!(result.lower <= truth && truth <= result.upper, "{result:?} vs {truth}");
    }
}

#[test]
fn test_tiny_table_keeps_bounds_sound() {
    let pos = position_with_empties(33, 14);
    let truth = exact_score(&pos);
    let config = SearchConfig {
        workers: 2,
        table_capacity: 256,
        table_buckets: 512,
        ..SearchConfig::default()
    };
    let mut driver =
        SearchDriver::with_collaborators(config, BitboardMover, AlphaBetaEvaluator::new, ExactSolver::new, solve_below(8))
            .unwrap();
    let result = driver.search(pos, MIN_GOAL, MAX_GOAL, 2_000_000, 300_000).unwrap();
    assert!(driver.table_occupancy() <= 256);
    assert!(result.lower <= truth && truth <= result.upper, "{result:?} vs {truth}");
    assert_eq!(result.lower % QUANTUM, 0);
}

#[test]
fn test_fail_soft_solver_settles_the_root() {
    let pos = position_with_empties(10, 10);
    let truth = exact_score(&pos);
    // A single goal far from the truth: every solve lands outside the window.
    let goal = if truth + 2300 <= MAX_GOAL { truth + 2300 } else { truth - 2300 };
    let mut driver = SearchDriver::with_collaborators(
        config(1),
        BitboardMover,
        AlphaBetaEvaluator::new,
        || FailSoftSolver {
            inner: ExactSolver::new(),
        },
        solve_below(14),
    )
    .unwrap();

    let result = driver.search(pos, goal, goal, 100_000, 60_000).unwrap();
    assert_eq!(result.status, SearchStatus::Solved);
    assert!(result.lower <= truth && truth <= result.upper, "{result:?} vs {truth}");
    // The bound keeps the value the solver reported, not just the window edge.
    if goal > truth {
        assert_eq!(result.upper, truth);
    } else {
        assert_eq!(result.lower, truth);
    }
}

#[test]
fn test_solved_scores_agree_across_symmetries() {
    let pos = position_with_empties(8, 11);
    let truth = exact_score(&pos);
    let mut driver = SearchDriver::new(config(2)).unwrap();
    for image in symmetries(pos) {
        let result = driver.search(image, MIN_GOAL, MAX_GOAL, u64::MAX, 120_000).unwrap();
        assert_eq!(result.status, SearchStatus::Solved);
        assert_eq!(result.score, truth);
    }
}

// =============================================================================
// Invariants, failures and stopping
// =============================================================================

#[test]
fn test_midgame_search_keeps_dag_consistent() {
    let pos = position_with_empties(12, 36);
    let mut driver = SearchDriver::new(config(4)).unwrap();
    let result = driver.search(pos, MIN_GOAL, MAX_GOAL, 20_000, 60_000).unwrap();
    assert_eq!(result.status, SearchStatus::StoppedByNodeBudget);
    assert!(result.lower <= result.score && result.score <= result.upper);
    assert!(driver.table_occupancy() > 1);
    driver.check_invariants().unwrap();

    let goal = driver.goal().unwrap().value();
    assert!((MIN_GOAL..=MAX_GOAL).contains(&goal));
    assert_eq!((goal + 100).rem_euclid(QUANTUM), 0);
}

#[test]
fn test_failing_solver_consumes_budget() {
    let pos = position_with_empties(5, 10);
    let mut driver =
        SearchDriver::with_collaborators(config(1), BitboardMover, AlphaBetaEvaluator::new, || BrokenSolver, solve_below(14))
            .unwrap();
    let result = driver.search(pos, MIN_GOAL, MAX_GOAL, 50, 60_000).unwrap();
    assert_eq!(result.status, SearchStatus::StoppedByNodeBudget);
    assert_eq!((result.lower, result.upper), (MIN_SCORE, MAX_SCORE));
}

#[test]
fn test_stop_handle_kills_search() {
    let mut driver = SearchDriver::new(config(2)).unwrap();
    let handle = driver.handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        handle.stop();
        handle
    });
    let result = driver
        .search(Position::initial(), MIN_GOAL, MAX_GOAL, u64::MAX, 60_000)
        .unwrap();
    let handle = stopper.join().unwrap();
    assert_eq!(result.status, SearchStatus::Killed);
    assert_eq!(handle.status(), SearchStatus::Killed);
    assert_eq!(handle.root_score(), result.score);
    assert_eq!(handle.visited_nodes(), result.visited);
}

#[test]
fn test_invalid_requests_are_rejected() {
    let mut driver = SearchDriver::new(config(1)).unwrap();
    let pos = Position::initial();
    assert_eq!(
        driver.search(pos, 0, MAX_GOAL, 10, 10),
        Err(EngineError::UnquantizedWindow(0))
    );
    assert_eq!(
        driver.search(pos, 300, 100, 10, 10),
        Err(EngineError::InvertedWindow { lower: 300, upper: 100 })
    );
    let overlapping = Position {
        player: 1,
        opponent: 1,
    };
    assert!(matches!(
        driver.search(overlapping, MIN_GOAL, MAX_GOAL, 10, 10),
        Err(EngineError::OverlappingDisks { .. })
    ));
    assert!(SearchDriver::new(SearchConfig {
        workers: 0,
        ..config(1)
    })
    .is_err());
}
