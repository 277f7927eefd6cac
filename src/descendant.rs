//! Choosing which leaves to work on next.
//!
//! Two frontiers start at the root, one trying to settle "score >= goal"
//! and one "score > goal". From a node, the walk follows the child whose
//! further evaluation would move the node's probability the most, and
//! flips the question at each ply. Siblings that were not chosen are kept
//! in a priority queue, scored by how much worse than the chosen child
//! they looked; the batch is filled by repeatedly resuming the most
//! promising of them.
//!
//! When a question is (nearly) certain, probabilities carry no signal and
//! the walk follows proof numbers instead, marking the resulting targets
//! as endgame work.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::constants::PRUNE_LOSS;
use crate::goal::EvalGoal;
use crate::node::{ChildSummary, SearchNode};
use crate::position::Position;
use crate::table::TranspositionTable;

/// Longest path the walk follows. Games are shorter; this only guards
/// against a corrupted DAG.
const MAX_PATH: usize = 130;

/// A leaf picked for processing.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafTarget {
    pub position: Position,
    /// True for the "ge" question at this node, false for "sg".
    pub greater_equal: bool,
    pub goal: EvalGoal,
    /// Nodes from the root down to the leaf's father.
    pub path: Vec<Position>,
    /// Accumulated log-loss against the best line; 0 is the best line.
    pub loss: f64,
    /// Reached by following proof numbers.
    pub endgame: bool,
}

#[derive(Debug)]
struct Candidate {
    loss: f64,
    position: Position,
    greater_equal: bool,
    path: Vec<Position>,
    endgame: bool,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Highest loss (closest to zero) first; shorter paths break ties.
    fn cmp(&self, other: &Self) -> Ordering {
        self.loss
            .total_cmp(&other.loss)
            .then_with(|| other.path.len().cmp(&self.path.len()))
    }
}

/// Picks batches of leaves from the DAG rooted at a position.
#[derive(Clone, Debug)]
pub struct BestDescendantSelector {
    max_targets: usize,
    prune_loss: f64,
}

impl BestDescendantSelector {
    pub fn new(max_targets: usize) -> Self {
        Self {
            max_targets: max_targets.max(1),
            prune_loss: PRUNE_LOSS,
        }
    }

    pub fn max_targets(&self) -> usize {
        self.max_targets
    }

    /// Up to `max_targets` distinct leaves, best first. Empty when the
    /// root is missing or both questions are settled.
    pub fn select(&self, table: &TranspositionTable, root: &Position) -> Vec<LeafTarget> {
        let Some(root_node) = table.get(root) else {
            return Vec::new();
        };
        let mut heap = BinaryHeap::new();
        for (greater_equal, decided) in [(true, root_node.ge_decided()), (false, root_node.sg_decided())] {
            if !decided {
                heap.push(Candidate {
                    loss: 0.0,
                    position: *root,
                    greater_equal,
                    path: Vec::new(),
                    endgame: false,
                });
            }
        }

        let mut claimed = HashSet::new();
        let mut targets = Vec::with_capacity(self.max_targets);
        let mut best_loss = None;
        while let Some(candidate) = heap.pop() {
            if targets.len() >= self.max_targets {
                break;
            }
            if let Some(best) = best_loss
                && candidate.loss < best + self.prune_loss
            {
                break;
            }
            if let Some(target) = self.descend(table, candidate, &mut heap)
                && claimed.insert(target.position)
            {
                best_loss.get_or_insert(target.loss);
                targets.push(target);
            }
        }
        targets
    }

    /// Greedy walk from a candidate down to a leaf, queueing the siblings
    /// it passes over.
    fn descend(
        &self,
        table: &TranspositionTable,
        candidate: Candidate,
        heap: &mut BinaryHeap<Candidate>,
    ) -> Option<LeafTarget> {
        let Candidate {
            mut loss,
            mut position,
            mut greater_equal,
            mut path,
            mut endgame,
        } = candidate;

        loop {
            let node = table.get(&position)?;
            let decided = if greater_equal { node.ge_decided() } else { node.sg_decided() };
            if decided || path.len() > MAX_PATH {
                return None;
            }

            let Some(children) = &node.children else {
                return Some(Self::target(node, greater_equal, path, loss, endgame));
            };
            let summaries: Option<Vec<ChildSummary>> = children
                .iter()
                .map(|c| table.get(c).map(SearchNode::summary))
                .collect();
            let Some(summaries) = summaries else {
                // A child was evicted: hand the node back for re-expansion.
                return Some(Self::target(node, greater_equal, path, loss, endgame));
            };

            let endgame_mode = if greater_equal {
                node.ge_in_endgame_mode()
            } else {
                node.sg_in_endgame_mode()
            };
            let values: Vec<f64> = summaries
                .iter()
                .map(|c| match (endgame_mode, greater_equal) {
                    (false, true) => node.log_derivative_ge(c),
                    (false, false) => node.log_derivative_sg(c),
                    (true, true) => node.endgame_value_ge(c),
                    (true, false) => node.endgame_value_sg(c),
                })
                .collect();
            let tie_cost = |c: &ChildSummary| if greater_equal { c.disproof_sg } else { c.disproof_ge };

            let mut best: Option<usize> = None;
            for (i, &v) in values.iter().enumerate() {
                if v == f64::NEG_INFINITY || v.is_nan() {
                    continue;
                }
                best = match best {
                    None => Some(i),
                    Some(b) => match v.total_cmp(&values[b]) {
                        Ordering::Greater => Some(i),
                        Ordering::Equal if tie_cost(&summaries[i]) < tie_cost(&summaries[b]) => Some(i),
                        _ => Some(b),
                    },
                };
            }
            let best = best?;

            path.push(position);
            for (i, &v) in values.iter().enumerate() {
                if i == best || v == f64::NEG_INFINITY || v.is_nan() {
                    continue;
                }
                let delta = loss_delta(values[best], v, endgame_mode);
                heap.push(Candidate {
                    loss: loss + delta,
                    position: children[i],
                    greater_equal: !greater_equal,
                    path: path.clone(),
                    endgame: endgame_mode,
                });
            }

            position = children[best];
            greater_equal = !greater_equal;
            endgame = endgame_mode;
        }
    }

    fn target(node: &SearchNode, greater_equal: bool, path: Vec<Position>, loss: f64, endgame: bool) -> LeafTarget {
        let own_endgame = if greater_equal {
            node.ge_in_endgame_mode()
        } else {
            node.sg_in_endgame_mode()
        };
        LeafTarget {
            position: node.position,
            greater_equal,
            goal: node.goal,
            path,
            loss,
            endgame: endgame || own_endgame,
        }
    }
}

/// How much worse `value` is than `best`, on a log scale (never positive).
fn loss_delta(best: f64, value: f64, endgame_mode: bool) -> f64 {
    let delta = if !endgame_mode {
        value - best
    } else if best < 0.0 {
        // Values are negated costs: compare the costs.
        (-best).ln() - (-value).ln()
    } else {
        value.ln() - best.ln()
    };
    if delta.is_nan() { f64::NEG_INFINITY } else { delta.min(0.0) }
}
