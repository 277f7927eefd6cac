//! Deciding when a leaf is worth an exact solve.

use crate::constants::{
    ADAPTIVE_RATE, CHEAP_PROOF_NUMBER, FORCED_SOLVE_EMPTIES, MAX_SOLVE_EMPTIES, SOLVE_EVAL_MARGIN,
};
use crate::node::SearchNode;

/// What a policy sees of a leaf.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeView {
    pub empties: u32,
    pub eval: i32,
    pub goal: i32,
    pub proof_ge: f64,
    pub disproof_sg: f64,
    /// The leaf was reached by following proof numbers.
    pub endgame: bool,
}

impl NodeView {
    pub fn of(node: &SearchNode, endgame: bool) -> Self {
        Self {
            empties: node.empties(),
            eval: node.eval,
            goal: node.goal.value(),
            proof_ge: node.proof_ge,
            disproof_sg: node.disproof_sg,
            endgame,
        }
    }
}

/// Chooses between an exact solve and further heuristic work on a leaf.
pub trait SolvePolicy: Send {
    fn should_solve(&self, view: &NodeView) -> bool;

    /// Feedback after a solve: nodes the solver visited.
    fn observe(&mut self, _solve_visited: u64) {}
}

/// Fixed thresholds on empties and estimated cost.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdPolicy {
    pub forced_empties: u32,
    pub max_empties: u32,
    pub cheap_proof: f64,
    pub eval_margin: i32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            forced_empties: FORCED_SOLVE_EMPTIES,
            max_empties: MAX_SOLVE_EMPTIES,
            cheap_proof: CHEAP_PROOF_NUMBER,
            eval_margin: SOLVE_EVAL_MARGIN,
        }
    }
}

impl ThresholdPolicy {
    fn decide(&self, view: &NodeView, cheap_proof: f64) -> bool {
        if view.empties <= self.forced_empties {
            return true;
        }
        if view.empties > self.max_empties {
            return false;
        }
        if view.endgame {
            return true;
        }
        let likely_above = view.proof_ge < cheap_proof && view.eval > view.goal + self.eval_margin;
        let likely_below = view.disproof_sg < cheap_proof && view.eval < view.goal - self.eval_margin;
        likely_above || likely_below
    }
}

impl SolvePolicy for ThresholdPolicy {
    fn should_solve(&self, view: &NodeView) -> bool {
        self.decide(view, self.cheap_proof)
    }
}

/// Like [`ThresholdPolicy`], but the cost threshold follows how expensive
/// recent solves turned out.
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptivePolicy {
    base: ThresholdPolicy,
    threshold: f64,
}

impl AdaptivePolicy {
    pub fn new(base: ThresholdPolicy) -> Self {
        let threshold = base.cheap_proof;
        Self { base, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self::new(ThresholdPolicy::default())
    }
}

impl SolvePolicy for AdaptivePolicy {
    fn should_solve(&self, view: &NodeView) -> bool {
        self.base.decide(view, self.threshold)
    }

    fn observe(&mut self, solve_visited: u64) {
        let error = self.base.cheap_proof - solve_visited as f64;
        self.threshold = (self.threshold + ADAPTIVE_RATE * error).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(empties: u32, eval: i32, proof_ge: f64, disproof_sg: f64) -> NodeView {
        NodeView {
            empties,
            eval,
            goal: 100,
            proof_ge,
            disproof_sg,
            endgame: false,
        }
    }

    #[test]
    fn test_threshold_by_empties() {
        let policy = ThresholdPolicy::default();
        assert!(policy.should_solve(&view(FORCED_SOLVE_EMPTIES, 0, 1e9, 1e9)));
        assert!(!policy.should_solve(&view(MAX_SOLVE_EMPTIES + 1, 5000, 1.0, 1.0)));
        assert!(!policy.should_solve(&view(16, 0, 1e9, 1e9)));
    }

    #[test]
    fn test_threshold_cheap_and_clear() {
        let policy = ThresholdPolicy::default();
        assert!(policy.should_solve(&view(16, 2500, 500.0, 1e9)));
        assert!(policy.should_solve(&view(16, -2500, 1e9, 500.0)));
        // Cheap but close to the goal.
        assert!(!policy.should_solve(&view(16, 500, 500.0, 500.0)));
        // Clear but expensive.
        assert!(!policy.should_solve(&view(16, 2500, 1e6, 1e9)));
    }

    #[test]
    fn test_threshold_endgame_frontier() {
        let policy = ThresholdPolicy::default();
        let mut v = view(16, 0, 1e9, 1e9);
        v.endgame = true;
        assert!(policy.should_solve(&v));
        v.empties = MAX_SOLVE_EMPTIES + 1;
        assert!(!policy.should_solve(&v));
    }

    #[test]
    fn test_adaptive_threshold_moves() {
        let mut policy = AdaptivePolicy::default();
        let start = policy.threshold();
        policy.observe(0);
        assert!(policy.threshold() > start);
        for _ in 0..100 {
            policy.observe(10_000_000);
        }
        assert_eq!(policy.threshold(), 0.0);
        // With a zero threshold only forced solves remain.
        assert!(!policy.should_solve(&view(16, 2500, 500.0, 1e9)));
        assert!(policy.should_solve(&view(10, 0, 1e9, 1e9)));
    }
}
