//! Search DAG nodes and the probability / proof-number model.
//!
//! Every node answers two questions about its goal `g`:
//! - "ge": is the true score `>= g`?
//! - "sg": is the true score `> g`?
//!
//! Exact scores never equal a goal, so the questions only differ in how
//! optimistic the heuristic model is about them. Each question carries a
//! probability, a proof number and a disproof number, and a log-derivative
//! measuring how much the best leaf below could still move it.
//!
//! Leaves get their numbers from [`crate::estimator`]. Internal nodes
//! combine their children: "ge" at a node is "not sg" at some child (OR),
//! "not sg" at a node is "ge" at every child (AND), and symmetrically.

use crate::constants::{
    ENDGAME_PROB_HIGH, ENDGAME_PROB_LOW, HALF_QUANTUM, LOG_DERIVATIVE_EXPONENT, MAX_SCORE,
    MAX_SOLVE_EMPTIES, MIDGAME_LEAF_COST, MIN_SCORE,
};
use crate::estimator::{disproof_number, proof_number, win_probability};
use crate::goal::EvalGoal;
use crate::position::Position;

/// The part of a child an update of its fathers reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChildSummary {
    pub eval: i32,
    pub lower: i32,
    pub upper: i32,
    pub prob_ge: f64,
    pub prob_sg: f64,
    pub proof_ge: f64,
    pub disproof_ge: f64,
    pub proof_sg: f64,
    pub disproof_sg: f64,
    pub max_log_derivative_ge: f64,
    pub max_log_derivative_sg: f64,
    pub descendants: u64,
}

/// One position in the search DAG.
///
/// Children and fathers are positions, resolved through the
/// [`TranspositionTable`](crate::table::TranspositionTable).
#[derive(Clone, Debug, PartialEq)]
pub struct SearchNode {
    pub position: Position,
    pub eval: i32,
    pub lower: i32,
    pub upper: i32,
    pub goal: EvalGoal,
    pub prob_ge: f64,
    pub prob_sg: f64,
    pub proof_ge: f64,
    pub disproof_ge: f64,
    pub proof_sg: f64,
    pub disproof_sg: f64,
    pub max_log_derivative_ge: f64,
    pub max_log_derivative_sg: f64,
    pub descendants: u64,
    pub children: Option<Vec<Position>>,
    pub fathers: Vec<Position>,
}

impl SearchNode {
    /// A fresh unsolved leaf.
    pub fn new(position: Position, eval: i32, goal: EvalGoal, descendants: u64) -> Self {
        let mut node = Self {
            position,
            eval: eval.clamp(MIN_SCORE, MAX_SCORE),
            lower: MIN_SCORE,
            upper: MAX_SCORE,
            goal,
            prob_ge: 0.5,
            prob_sg: 0.5,
            proof_ge: 1.0,
            disproof_ge: 1.0,
            proof_sg: 1.0,
            disproof_sg: 1.0,
            max_log_derivative_ge: f64::NEG_INFINITY,
            max_log_derivative_sg: f64::NEG_INFINITY,
            descendants: descendants.max(1),
            children: None,
            fathers: Vec::new(),
        };
        node.update_leaf();
        node
    }

    /// A finished game: solved at the end-of-game score.
    pub fn game_over(position: Position, goal: EvalGoal) -> Self {
        let mut node = Self::new(position, 0, goal, 1);
        node.set_solved(position.game_over_score());
        node
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn is_solved(&self) -> bool {
        self.lower == self.upper
    }

    pub fn empties(&self) -> u32 {
        self.position.empties()
    }

    pub fn summary(&self) -> ChildSummary {
        ChildSummary {
            eval: self.eval,
            lower: self.lower,
            upper: self.upper,
            prob_ge: self.prob_ge,
            prob_sg: self.prob_sg,
            proof_ge: self.proof_ge,
            disproof_ge: self.disproof_ge,
            proof_sg: self.proof_sg,
            disproof_sg: self.disproof_sg,
            max_log_derivative_ge: self.max_log_derivative_ge,
            max_log_derivative_sg: self.max_log_derivative_sg,
            descendants: self.descendants,
        }
    }

    pub fn add_father(&mut self, father: Position) {
        if !self.fathers.contains(&father) {
            self.fathers.push(father);
        }
    }

    /// True once "ge" is proved or disproved.
    pub fn ge_decided(&self) -> bool {
        self.proof_ge == 0.0 || self.proof_ge == f64::INFINITY
    }

    /// True once "sg" is proved or disproved.
    pub fn sg_decided(&self) -> bool {
        self.disproof_sg == 0.0 || self.disproof_sg == f64::INFINITY
    }

    // =========================================================================
    // Leaf updates
    // =========================================================================

    pub fn set_solved(&mut self, score: i32) {
        self.lower = score;
        self.upper = score;
        self.eval = score;
        self.update_leaf();
    }

    /// Records a proven lower bound.
    pub fn set_lower(&mut self, lower: i32) {
        self.lower = self.lower.max(lower).min(self.upper);
        self.eval = self.eval.clamp(self.lower, self.upper);
        self.update_leaf();
    }

    /// Records a proven upper bound.
    pub fn set_upper(&mut self, upper: i32) {
        self.upper = self.upper.min(upper).max(self.lower);
        self.eval = self.eval.clamp(self.lower, self.upper);
        self.update_leaf();
    }

    /// Replaces the heuristic estimate of a leaf.
    pub fn set_eval(&mut self, eval: i32) {
        self.eval = eval.clamp(self.lower, self.upper);
        self.update_leaf();
    }

    /// Drops the children, keeping eval and proven bounds.
    pub fn revert_to_leaf(&mut self) {
        self.children = None;
        self.update_leaf();
    }

    /// Recomputes probabilities, proof numbers and derivatives of a leaf
    /// from its eval, bounds and goal.
    pub fn update_leaf(&mut self) {
        let goal = self.goal.value();
        let empties = self.empties();
        if self.lower > goal {
            self.set_certain(true);
        } else if self.upper < goal {
            self.set_certain(false);
        } else {
            let ge_bound = goal - HALF_QUANTUM;
            let sg_bound = goal + HALF_QUANTUM;
            self.prob_ge = win_probability(ge_bound, self.eval, empties);
            self.prob_sg = win_probability(sg_bound, self.eval, empties);
            self.proof_ge = proof_number(&self.position, ge_bound, self.eval);
            self.disproof_ge = disproof_number(&self.position, ge_bound, self.eval);
            self.proof_sg = proof_number(&self.position, sg_bound, self.eval);
            self.disproof_sg = disproof_number(&self.position, sg_bound, self.eval);
        }
        let near_endgame = empties <= MAX_SOLVE_EMPTIES;
        self.max_log_derivative_ge =
            leaf_log_derivative(self.prob_ge, self.proof_ge, self.disproof_ge, near_endgame);
        self.max_log_derivative_sg =
            leaf_log_derivative(self.prob_sg, self.proof_sg, self.disproof_sg, near_endgame);
    }

    fn set_certain(&mut self, above_goal: bool) {
        let (prob, proof, disproof) = if above_goal {
            (1.0, 0.0, f64::INFINITY)
        } else {
            (0.0, f64::INFINITY, 0.0)
        };
        self.prob_ge = prob;
        self.prob_sg = prob;
        self.proof_ge = proof;
        self.proof_sg = proof;
        self.disproof_ge = disproof;
        self.disproof_sg = disproof;
    }

    // =========================================================================
    // Internal updates
    // =========================================================================

    /// Recomputes an internal node from its children. Returns true if any
    /// field an ancestor reads has changed.
    pub fn update_from_children(&mut self, children: &[ChildSummary]) -> bool {
        let before = self.summary();
        if children.is_empty() {
            return false;
        }

        self.eval = i32::MIN;
        self.lower = i32::MIN;
        self.upper = i32::MIN;
        self.prob_ge = 0.0;
        self.prob_sg = 0.0;
        self.proof_ge = f64::INFINITY;
        self.proof_sg = f64::INFINITY;
        self.disproof_ge = 0.0;
        self.disproof_sg = 0.0;
        for c in children {
            self.eval = self.eval.max(-c.eval);
            self.lower = self.lower.max(-c.upper);
            self.upper = self.upper.max(-c.lower);
            self.prob_ge = self.prob_ge.max(1.0 - c.prob_sg);
            self.prob_sg = self.prob_sg.max(1.0 - c.prob_ge);
            self.proof_ge = self.proof_ge.min(c.disproof_sg);
            self.proof_sg = self.proof_sg.min(c.disproof_ge);
            self.disproof_sg += c.proof_ge;
            self.disproof_ge += c.proof_sg;
        }

        self.max_log_derivative_ge = if is_uncertain(self.prob_ge) {
            children
                .iter()
                .map(|c| self.log_derivative_ge(c))
                .fold(f64::NEG_INFINITY, f64::max)
        } else {
            f64::NEG_INFINITY
        };
        self.max_log_derivative_sg = if is_uncertain(self.prob_sg) {
            children
                .iter()
                .map(|c| self.log_derivative_sg(c))
                .fold(f64::NEG_INFINITY, f64::max)
        } else {
            f64::NEG_INFINITY
        };

        self.summary() != before
    }

    /// How strongly further work on `child` moves this node's "ge"
    /// probability, on a log scale.
    pub fn log_derivative_ge(&self, child: &ChildSummary) -> f64 {
        if child.prob_sg == 0.0 {
            return f64::NEG_INFINITY;
        }
        child.max_log_derivative_sg
            + LOG_DERIVATIVE_EXPONENT * ((1.0 - self.prob_ge) / child.prob_sg).ln().min(0.0)
    }

    /// How strongly further work on `child` moves this node's "sg"
    /// probability, on a log scale.
    pub fn log_derivative_sg(&self, child: &ChildSummary) -> f64 {
        if child.prob_ge == 0.0 {
            return f64::NEG_INFINITY;
        }
        child.max_log_derivative_ge
            + LOG_DERIVATIVE_EXPONENT * ((1.0 - self.prob_sg) / child.prob_ge).ln().min(0.0)
    }

    /// True when "ge" is (nearly) certain and work should follow proof
    /// numbers rather than probabilities.
    pub fn ge_in_endgame_mode(&self) -> bool {
        !is_uncertain(self.prob_ge) || self.prob_ge > ENDGAME_PROB_HIGH
    }

    /// True when "sg" is (nearly) certain.
    pub fn sg_in_endgame_mode(&self) -> bool {
        !is_uncertain(self.prob_sg) || self.prob_sg < ENDGAME_PROB_LOW
    }

    /// Proof-number preference for `child` on the "ge" question.
    pub fn endgame_value_ge(&self, child: &ChildSummary) -> f64 {
        if self.proof_ge == 0.0 || child.disproof_sg == f64::INFINITY {
            return f64::NEG_INFINITY;
        }
        if child.prob_sg > 0.9 {
            return -1e30 * (1.0 + child.prob_sg);
        }
        let bonus = 0.1 * self.proof_ge.powf(0.1) / (child.descendants.max(1) as f64).sqrt();
        -child.disproof_sg / bonus.exp()
    }

    /// Proof-number preference for `child` on the "sg" question.
    pub fn endgame_value_sg(&self, child: &ChildSummary) -> f64 {
        if child.proof_ge == 0.0 || self.disproof_sg == f64::INFINITY {
            return f64::NEG_INFINITY;
        }
        child.proof_ge
    }

    // =========================================================================
    // Invariants
    // =========================================================================

    /// Checks the bound, probability and proof-number invariants.
    pub fn check_invariants(&self, children: Option<&[ChildSummary]>) -> Result<(), String> {
        if !(self.lower <= self.eval && self.eval <= self.upper) {
            return Err(format!(
                "bounds out of order: {} <= {} <= {}",
                self.lower, self.eval, self.upper
            ));
        }
        if !(0.0..=1.0).contains(&self.prob_sg) || !(0.0..=1.0).contains(&self.prob_ge) {
            return Err(format!("probability out of range: {} {}", self.prob_ge, self.prob_sg));
        }
        if self.prob_ge < self.prob_sg {
            return Err(format!("prob_ge {} < prob_sg {}", self.prob_ge, self.prob_sg));
        }
        let inf = f64::INFINITY;
        if (self.proof_ge == 0.0) != (self.disproof_sg == inf)
            || (self.proof_ge == inf) != (self.disproof_sg == 0.0)
            || (self.proof_sg == 0.0) != (self.disproof_ge == inf)
            || (self.proof_sg == inf) != (self.disproof_ge == 0.0)
        {
            return Err(format!(
                "proof numbers out of pairing: ge {}/{} sg {}/{}",
                self.proof_ge, self.disproof_ge, self.proof_sg, self.disproof_sg
            ));
        }
        if let Some(children) = children.filter(|c| !c.is_empty()) {
            let eval = children.iter().map(|c| -c.eval).max();
            let lower = children.iter().map(|c| -c.upper).max();
            let upper = children.iter().map(|c| -c.lower).max();
            if eval != Some(self.eval) || lower != Some(self.lower) || upper != Some(self.upper) {
                return Err(format!(
                    "negamax mismatch: node ({}, {}, {}) children ({:?}, {:?}, {:?})",
                    self.lower, self.eval, self.upper, lower, eval, upper
                ));
            }
        }
        Ok(())
    }
}

fn is_uncertain(prob: f64) -> bool {
    prob > 0.0 && prob < 1.0
}

fn leaf_log_derivative(prob: f64, proof: f64, disproof: f64, near_endgame: bool) -> f64 {
    if !is_uncertain(prob) {
        return f64::NEG_INFINITY;
    }
    let spread = prob * (1.0 - prob);
    if near_endgame {
        (spread / proof + spread / disproof).ln()
    } else {
        (spread / MIDGAME_LEAF_COST).ln()
    }
}
