//! Depth-limited heuristic search.
//!
//! The search engine asks for approximate scores of leaves and of freshly
//! expanded children through [`HeuristicEvaluator`]. The bundled
//! [`AlphaBetaEvaluator`] runs a fail-hard negamax over the static
//! evaluation in [`crate::patterns`].

use crate::error::{CollaboratorError, check_range};
use crate::patterns::evaluate;
use crate::position::Position;

/// Approximate scoring of positions.
///
/// Each worker thread owns its own instance.
pub trait HeuristicEvaluator: Send {
    /// Score of `position` searched to `depth`, from the mover's point of
    /// view. A result equal to `lower` or `upper` may only be a bound.
    fn quick_score(
        &mut self,
        position: &Position,
        depth: u32,
        lower: i32,
        upper: i32,
    ) -> Result<i32, CollaboratorError>;

    /// Nodes visited since the last [`reset_visited`](Self::reset_visited).
    fn visited(&self) -> u64;

    fn reset_visited(&mut self);
}

/// Fail-hard alpha-beta over the static evaluation.
#[derive(Debug, Default, Clone)]
pub struct AlphaBetaEvaluator {
    visited: u64,
}

impl AlphaBetaEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn negamax(&mut self, pos: &Position, depth: u32, mut alpha: i32, beta: i32, passed: bool) -> i32 {
        self.visited += 1;

        if depth == 0 || pos.empties() == 0 {
            if pos.is_game_over() {
                return pos.game_over_score().clamp(alpha, beta);
            }
            return evaluate(pos).clamp(alpha, beta);
        }

        let mut children = pos.successors();
        if children.is_empty() {
            if passed {
                // Both sides passed: the game is over.
                return pos.game_over_score().clamp(alpha, beta);
            }
            return -self.negamax(&pos.pass(), depth, -beta, -alpha, true);
        }

        if depth > 2 {
            children.sort_by_key(|c| c.mobility());
        }

        for child in children {
            let score = -self.negamax(&child, depth - 1, -beta, -alpha, false);
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

impl HeuristicEvaluator for AlphaBetaEvaluator {
    fn quick_score(
        &mut self,
        position: &Position,
        depth: u32,
        lower: i32,
        upper: i32,
    ) -> Result<i32, CollaboratorError> {
        if lower > upper {
            return Err(CollaboratorError::Failed(format!(
                "empty window [{lower}, {upper}]"
            )));
        }
        let score = self.negamax(position, depth, lower, upper, false);
        check_range(score, lower, upper)
    }

    fn visited(&self) -> u64 {
        self.visited
    }

    fn reset_visited(&mut self) {
        self.visited = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::symmetries;
    use crate::constants::{MAX_SCORE, MIN_SCORE};
    use crate::position::random_position;

    fn full(eval: &mut AlphaBetaEvaluator, pos: &Position, depth: u32) -> i32 {
        eval.quick_score(pos, depth, MIN_SCORE, MAX_SCORE).unwrap()
    }

    /// Plain minimax, no pruning.
    fn minimax(pos: &Position, depth: u32, passed: bool) -> i32 {
        if depth == 0 || pos.empties() == 0 {
            if pos.is_game_over() {
                return pos.game_over_score();
            }
            return evaluate(pos);
        }
        let children = pos.successors();
        if children.is_empty() {
            if passed {
                return pos.game_over_score();
            }
            return -minimax(&pos.pass(), depth, true);
        }
        children
            .iter()
            .map(|c| -minimax(c, depth - 1, false))
            .max()
            .unwrap()
    }

    #[test]
    fn test_depth_zero_is_static_eval() {
        let mut eval = AlphaBetaEvaluator::new();
        let pos = Position::initial();
        assert_eq!(full(&mut eval, &pos, 0), evaluate(&pos));
        assert_eq!(eval.visited(), 1);
    }

    #[test]
    fn test_matches_minimax() {
        let mut rng = fastrand::Rng::with_seed(3);
        let mut eval = AlphaBetaEvaluator::new();
        for plies in [0, 6, 20, 36] {
            let pos = random_position(&mut rng, plies);
            for depth in 1..=3 {
                assert_eq!(full(&mut eval, &pos, depth), minimax(&pos, depth, false));
            }
        }
    }

    #[test]
    fn test_fail_hard_window() {
        let mut eval = AlphaBetaEvaluator::new();
        let pos = Position::initial();
        let exact = full(&mut eval, &pos, 2);
        let low = eval.quick_score(&pos, 2, exact + 100, exact + 300).unwrap();
        assert_eq!(low, exact + 100);
        let high = eval.quick_score(&pos, 2, exact - 300, exact - 100).unwrap();
        assert_eq!(high, exact - 100);
    }

    #[test]
    fn test_game_over_position() {
        let mut eval = AlphaBetaEvaluator::new();
        let pos = Position::new(0b1111, 1 << 63).unwrap();
        assert!(pos.is_game_over());
        assert_eq!(full(&mut eval, &pos, 4), pos.game_over_score());
    }

    #[test]
    fn test_symmetric_positions_score_alike() {
        let mut rng = fastrand::Rng::with_seed(11);
        let mut eval = AlphaBetaEvaluator::new();
        let pos = random_position(&mut rng, 14);
        let base = full(&mut eval, &pos, 3);
        for image in symmetries(pos) {
            assert_eq!(full(&mut eval, &image, 3), base);
        }
    }

    #[test]
    fn test_visited_counter_resets() {
        let mut eval = AlphaBetaEvaluator::new();
        full(&mut eval, &Position::initial(), 2);
        assert!(eval.visited() > 1);
        eval.reset_visited();
        assert_eq!(eval.visited(), 0);
    }
}
