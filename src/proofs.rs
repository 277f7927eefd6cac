//! Algebra of endgame proof witnesses.
//!
//! An [`EndgameProof`] is one way of settling a claim: a fixed number of
//! positions to visit plus a set of sub-claims that still have to be
//! settled. A [`ProofCombination`] is a list of such alternatives with no
//! alternative dominating another. AND sums costs and merges sub-claims;
//! since sub-claims are a set, a transposition reached along two lines is
//! only paid for once.

use std::collections::BTreeSet;
use std::fmt;

use crate::position::Position;

/// The four questions a node can be asked about its goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Claim {
    ProveGreaterEqual,
    DisproveGreaterEqual,
    ProveStrictlyGreater,
    DisproveStrictlyGreater,
}

impl Claim {
    /// The claim each child must settle, seen from the child.
    pub fn child_claim(self) -> Claim {
        match self {
            Claim::ProveGreaterEqual => Claim::DisproveStrictlyGreater,
            Claim::DisproveStrictlyGreater => Claim::ProveGreaterEqual,
            Claim::ProveStrictlyGreater => Claim::DisproveGreaterEqual,
            Claim::DisproveGreaterEqual => Claim::ProveStrictlyGreater,
        }
    }

    /// True if one child suffices; false if every child is needed.
    pub fn needs_one_child(self) -> bool {
        matches!(self, Claim::ProveGreaterEqual | Claim::ProveStrictlyGreater)
    }
}

/// A claim about a position, pending resolution.
///
/// Ordered so that positions closer to the root sort last: resolving the
/// greatest pending leaf first never meets a leaf whose parent is still
/// pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProofLeaf {
    rank: u32,
    pub position: Position,
    pub claim: Claim,
}

impl ProofLeaf {
    pub fn new(position: Position, claim: Claim) -> Self {
        // A side that must pass keeps the empties of its child, so it gets
        // the odd rank just above.
        let must_pass = u32::from(position.legal_moves() == 0);
        Self {
            rank: position.empties() * 2 + must_pass,
            position,
            claim,
        }
    }
}

/// One way to settle a claim.
#[derive(Clone, Debug, PartialEq)]
pub struct EndgameProof {
    pub cost: f64,
    pub pending: BTreeSet<ProofLeaf>,
}

impl EndgameProof {
    pub fn new(cost: f64) -> Self {
        Self {
            cost,
            pending: BTreeSet::new(),
        }
    }

    pub fn with_pending(cost: f64, pending: impl IntoIterator<Item = ProofLeaf>) -> Self {
        Self {
            cost,
            pending: pending.into_iter().collect(),
        }
    }

    /// At least as expensive as `other`, and needing everything it needs.
    pub fn greater_equal(&self, other: &EndgameProof) -> bool {
        self.cost >= other.cost && self.pending.is_superset(&other.pending)
    }

    pub fn strictly_greater(&self, other: &EndgameProof) -> bool {
        self.greater_equal(other)
            && (self.cost > other.cost || self.pending.len() > other.pending.len())
    }

    /// Both proofs together.
    pub fn and(&self, other: &EndgameProof) -> EndgameProof {
        EndgameProof {
            cost: self.cost + other.cost,
            pending: self.pending.union(&other.pending).copied().collect(),
        }
    }
}

impl fmt::Display for EndgameProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.cost)?;
        for leaf in &self.pending {
            write!(f, " ({:#x} {:#x} {:?})", leaf.position.player, leaf.position.opponent, leaf.claim)?;
        }
        write!(f, "]")
    }
}

/// Alternative proofs of one claim. Empty means the claim cannot be proved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProofCombination {
    pub alternatives: Vec<EndgameProof>,
}

impl ProofCombination {
    pub fn new(alternatives: Vec<EndgameProof>) -> Self {
        let mut result = Self { alternatives };
        result.simplify();
        result
    }

    /// A claim that cannot be proved.
    pub fn no_proof() -> Self {
        Self::default()
    }

    /// A claim that is already proved.
    pub fn trivial() -> Self {
        Self {
            alternatives: vec![EndgameProof::new(0.0)],
        }
    }

    /// A claim proved by a direct search of `cost` positions.
    pub fn leaf(cost: f64) -> Self {
        Self {
            alternatives: vec![EndgameProof::new(cost)],
        }
    }

    pub fn can_prove(&self) -> bool {
        !self.alternatives.is_empty()
    }

    /// Drops every alternative dominated by another. Among equal
    /// alternatives the first one survives.
    pub fn simplify(&mut self) {
        let mut kept: Vec<EndgameProof> = Vec::with_capacity(self.alternatives.len());
        for (i, p1) in self.alternatives.iter().enumerate() {
            if kept.iter().any(|p2| p1.greater_equal(p2)) {
                continue;
            }
            if self.alternatives[i + 1..].iter().any(|p2| p1.strictly_greater(p2)) {
                continue;
            }
            kept.push(p1.clone());
        }
        self.alternatives = kept;
    }

    /// Either claim suffices.
    pub fn or(&mut self, other: &ProofCombination) {
        self.alternatives.extend(other.alternatives.iter().cloned());
        self.simplify();
    }

    /// Both claims are needed.
    pub fn and(&mut self, other: &ProofCombination) {
        let mut combined = Vec::with_capacity(self.alternatives.len() * other.alternatives.len());
        for p1 in &self.alternatives {
            for p2 in &other.alternatives {
                combined.push(p1.and(p2));
            }
        }
        self.alternatives = combined;
        self.simplify();
    }

    /// Keeps at most `n` alternatives, cheapest first.
    pub fn truncate(&mut self, n: usize) {
        if self.alternatives.len() > n {
            self.alternatives.sort_by(|a, b| a.cost.total_cmp(&b.cost));
            self.alternatives.truncate(n);
        }
    }

    /// Cheapest alternative, ignoring what is still pending.
    pub fn min_cost(&self) -> Option<f64> {
        self.alternatives.iter().map(|p| p.cost).min_by(f64::total_cmp)
    }

    /// Cheapest total cost once every pending leaf is replaced by the
    /// combination `lookup` gives for it, recursively.
    ///
    /// Leaves `lookup` does not know cannot be proved. At most
    /// `max_alternatives` alternatives are kept between steps, so the
    /// result is an upper bound on the true minimum when the cap bites.
    pub fn min_resolved_cost<'a, F>(&self, lookup: F, max_alternatives: usize) -> Option<f64>
    where
        F: Fn(&ProofLeaf) -> Option<&'a ProofCombination>,
    {
        if !self.can_prove() {
            return None;
        }
        let mut current = self.clone();
        let mut unsolved: BTreeSet<ProofLeaf> = current
            .alternatives
            .iter()
            .flat_map(|p| p.pending.iter().copied())
            .collect();
        let mut seen = unsolved.clone();

        while let Some(leaf) = unsolved.pop_last() {
            let no_proof = ProofCombination::no_proof();
            let solving = lookup(&leaf).unwrap_or(&no_proof);

            let mut unaltered = ProofCombination::no_proof();
            let mut replaced = ProofCombination::no_proof();
            for alternative in current.alternatives {
                if !alternative.pending.contains(&leaf) {
                    unaltered.alternatives.push(alternative);
                    continue;
                }
                let mut without = alternative;
                without.pending.remove(&leaf);
                replaced.alternatives.push(without);
            }
            if !replaced.alternatives.is_empty() {
                for sub in solving.alternatives.iter().flat_map(|p| p.pending.iter()) {
                    if seen.insert(*sub) {
                        unsolved.insert(*sub);
                    }
                }
            }
            replaced.and(solving);
            replaced.or(&unaltered);
            replaced.truncate(max_alternatives);
            current = replaced;
        }
        current
            .alternatives
            .iter()
            .filter(|p| p.pending.is_empty())
            .map(|p| p.cost)
            .min_by(f64::total_cmp)
    }
}

impl fmt::Display for ProofCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for proof in &self.alternatives {
            write!(f, "{proof}, ")?;
        }
        write!(f, "}}")
    }
}
