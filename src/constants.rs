//! Score scale, search thresholds and default capacities.
//!
//! Scores are fixed-point integers with 100 units per disk, so a full
//! 64-disk win is 6400. Exact scores always land on multiples of
//! [`QUANTUM`], and evaluation goals sit halfway between two of them.

// =============================================================================
// Score Scale
// =============================================================================

/// Fixed-point units per disk.
pub const DISK_UNIT: i32 = 100;

/// Largest representable score (all 64 disks).
pub const MAX_SCORE: i32 = 64 * DISK_UNIT;

/// Smallest representable score.
pub const MIN_SCORE: i32 = -MAX_SCORE;

/// Granularity of exact scores.
pub const QUANTUM: i32 = 2 * DISK_UNIT;

/// Offset between a goal and the nearest exact scores.
pub const HALF_QUANTUM: i32 = DISK_UNIT;

/// Widest goal the engine accepts.
pub const MAX_GOAL: i32 = MAX_SCORE - HALF_QUANTUM;

/// Narrowest goal the engine accepts.
pub const MIN_GOAL: i32 = -MAX_GOAL;

// =============================================================================
// Probability Model
// =============================================================================

/// Base standard deviation of the heuristic error, in score units.
pub const SIGMA_BASE: f64 = 400.0;

/// Reduction of the standard deviation per empty square.
pub const SIGMA_PER_EMPTY: f64 = 4.0;

/// Probabilities closer than this to 0 or 1 are rounded to certainty.
pub const PROB_ROUNDING: f64 = 0.01;

/// Cost assigned to a heuristic leaf when computing midgame derivatives.
pub const MIDGAME_LEAF_COST: f64 = 200.0;

/// Exponent applied to the gap between a parent and its child probability.
/// Equals `1 - lambda` with `lambda = -0.45`.
pub const LOG_DERIVATIVE_EXPONENT: f64 = 1.45;

/// Above this probability of `>= goal` the selector works by proof numbers.
pub const ENDGAME_PROB_HIGH: f64 = 0.98;

/// Below this probability of `> goal` the selector works by proof numbers.
pub const ENDGAME_PROB_LOW: f64 = 0.02;

/// Candidates whose accumulated loss drops below this are not worth expanding.
pub const PRUNE_LOSS: f64 = -20.0;

// =============================================================================
// Endgame Cost Estimator
// =============================================================================

/// Smallest cost the estimator returns.
pub const MIN_PROOF_NUMBER: f64 = 1.0;

/// Largest finite cost the estimator returns.
pub const MAX_PROOF_NUMBER: f64 = 1.27e89;

// =============================================================================
// Solve Policy
// =============================================================================

/// Positions with at most this many empties are always solved exactly.
pub const FORCED_SOLVE_EMPTIES: u32 = 14;

/// Positions with more empties than this are never solved exactly.
pub const MAX_SOLVE_EMPTIES: u32 = FORCED_SOLVE_EMPTIES + 3;

/// Proof numbers below this make an exact solve worthwhile.
pub const CHEAP_PROOF_NUMBER: f64 = 10_000.0;

/// Required gap between eval and goal before a cheap proof is attempted.
pub const SOLVE_EVAL_MARGIN: i32 = 20 * DISK_UNIT;

/// Learning rate of the adaptive proof threshold.
pub const ADAPTIVE_RATE: f64 = 0.05;

// =============================================================================
// Driver Defaults
// =============================================================================

/// Depth of the heuristic evaluation that seeds a new root.
pub const ROOT_SEED_DEPTH: u32 = 2;

/// Depth of the heuristic evaluation of freshly expanded children.
pub const EXPANSION_DEPTH: u32 = 2;

/// Below this many empties past the current depth, deepening becomes solving.
pub const ENDGAME_EMPTIES: u32 = 8;

/// Growth factor of the visited-node threshold for goal nudging.
pub const GOAL_UPDATE_RATIO: f64 = 1.1;

/// Default number of table slots.
pub const DEFAULT_TABLE_CAPACITY: usize = 200_000;

/// Cap on alternatives kept per node when combining proofs over the DAG.
pub const MAX_PROOF_ALTERNATIVES: usize = 16;

/// Engine name reported by the text protocol.
pub const ENGINE_NAME: &str = "othello-pns";
