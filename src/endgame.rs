//! Exact endgame solving.
//!
//! [`ExactSolver`] is a fail-hard window search to the end of the game.
//! Above a few empties it tries moves that leave the opponent the fewest
//! replies first; near the end sorting costs more than it saves.

use crate::error::{CollaboratorError, check_range};
use crate::position::Position;

/// Exact scoring of positions near the end of the game.
///
/// Each worker thread owns its own instance.
pub trait EndgameSolver: Send {
    /// Exact score of `position` if it lies strictly inside `(alpha, beta)`;
    /// otherwise a valid one-sided bound: any value `<= alpha` when the
    /// score is at most that value, any value `>= beta` when it is at
    /// least that value. [`ExactSolver`] is fail-hard and returns `alpha`
    /// or `beta` exactly.
    fn exact_score(&mut self, position: &Position, alpha: i32, beta: i32) -> Result<i32, CollaboratorError>;

    /// Nodes visited since the last [`reset_visited`](Self::reset_visited).
    fn visited(&self) -> u64;

    fn reset_visited(&mut self);
}

/// Below this many empties, moves are tried in bit order.
const MIN_SORT_EMPTIES: u32 = 6;

#[derive(Debug, Default, Clone)]
pub struct ExactSolver {
    visited: u64,
}

impl ExactSolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn fastest_first(&mut self, pos: &Position, mut alpha: i32, beta: i32, passed: bool) -> i32 {
        if pos.empties() < MIN_SORT_EMPTIES {
            return self.unsorted(pos, alpha, beta, passed);
        }
        self.visited += 1;

        let mut children = pos.successors();
        if children.is_empty() {
            if passed {
                return pos.game_over_score().clamp(alpha, beta);
            }
            return -self.fastest_first(&pos.pass(), -beta, -alpha, true);
        }
        children.sort_by_key(|c| c.mobility());

        for child in children {
            let score = -self.fastest_first(&child, -beta, -alpha, false);
            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }
        alpha
    }

    fn unsorted(&mut self, pos: &Position, mut alpha: i32, beta: i32, passed: bool) -> i32 {
        self.visited += 1;
        if pos.empties() == 0 {
            return pos.game_over_score().clamp(alpha, beta);
        }

        let mut moves = pos.legal_moves();
        if moves == 0 {
            if passed {
                return pos.game_over_score().clamp(alpha, beta);
            }
            return -self.unsorted(&pos.pass(), -beta, -alpha, true);
        }

        while moves != 0 {
            let square = moves.trailing_zeros() as u8;
            moves &= moves - 1;
            let Some(child) = pos.play(square) else {
                continue;
            };
            let score = -self.unsorted(&child, -beta, -alpha, false);
            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }
        alpha
    }
}

impl EndgameSolver for ExactSolver {
    fn exact_score(&mut self, position: &Position, alpha: i32, beta: i32) -> Result<i32, CollaboratorError> {
        if alpha >= beta {
            return Err(CollaboratorError::Failed(format!(
                "empty solve window ({alpha}, {beta})"
            )));
        }
        let score = self.fastest_first(position, alpha, beta, false);
        check_range(score, alpha, beta)
    }

    fn visited(&self) -> u64 {
        self.visited
    }

    fn reset_visited(&mut self) {
        self.visited = 0;
    }
}
