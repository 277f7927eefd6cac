//! The search driver.
//!
//! A search runs in batches. Each batch:
//! 1. checks the stop conditions at the root,
//! 2. picks up to one leaf per worker with the [`BestDescendantSelector`],
//! 3. decides per leaf between an exact solve, an expansion and a deeper
//!    heuristic evaluation,
//! 4. processes the leaves in parallel on a rayon pool, each worker owning
//!    its evaluator and solver,
//! 5. applies the results on the driving thread and propagates them to
//!    every father, stopping where nothing changed,
//! 6. moves the root goal if the evidence says it is in the wrong place.
//!
//! The table is only mutated between batches, so workers never need
//! locks. Queries from other threads go through a [`SearchHandle`].

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::constants::{
    DEFAULT_TABLE_CAPACITY, ENDGAME_EMPTIES, EXPANSION_DEPTH, GOAL_UPDATE_RATIO,
    MAX_PROOF_ALTERNATIVES, MAX_SCORE, MIN_SCORE, QUANTUM, ROOT_SEED_DEPTH,
};
use crate::descendant::{BestDescendantSelector, LeafTarget};
use crate::endgame::{EndgameSolver, ExactSolver};
use crate::error::{CollaboratorError, EngineError, check_range};
use crate::goal::{EvalGoal, Window};
use crate::midgame::{AlphaBetaEvaluator, HeuristicEvaluator};
use crate::node::{ChildSummary, SearchNode};
use crate::policy::{NodeView, SolvePolicy, ThresholdPolicy};
use crate::position::{BitboardMover, Mover, PASS, Position, Square};
use crate::proofs::{Claim, EndgameProof, ProofCombination, ProofLeaf};
use crate::table::TranspositionTable;

/// Smallest table that can hold a root, a full path and one expansion.
const MIN_TABLE_CAPACITY: usize = 256;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct SearchConfig {
    /// Worker threads, and leaves per batch.
    pub workers: usize,
    pub table_capacity: usize,
    pub table_buckets: usize,
    /// Depth of the evaluation seeding a new root.
    pub root_seed_depth: u32,
    /// Depth of the evaluation of freshly expanded children.
    pub expansion_depth: u32,
    /// Deepening a leaf turns into solving it this close to the end.
    pub endgame_empties: u32,
    /// Growth of the visited-node threshold between goal nudges.
    pub goal_update_ratio: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            workers,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            table_buckets: DEFAULT_TABLE_CAPACITY * 2,
            root_seed_depth: ROOT_SEED_DEPTH,
            expansion_depth: EXPANSION_DEPTH,
            endgame_empties: ENDGAME_EMPTIES,
            goal_update_ratio: GOAL_UPDATE_RATIO,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 {
            return Err(EngineError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.table_capacity < MIN_TABLE_CAPACITY {
            return Err(EngineError::InvalidConfig(format!(
                "table capacity {} is below {MIN_TABLE_CAPACITY}",
                self.table_capacity
            )));
        }
        if self.table_buckets == 0 {
            return Err(EngineError::InvalidConfig("table needs at least one bucket".into()));
        }
        if self.goal_update_ratio.is_nan() || self.goal_update_ratio <= 1.0 {
            return Err(EngineError::InvalidConfig(format!(
                "goal update ratio {} must exceed 1",
                self.goal_update_ratio
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Status and Handle
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SearchStatus {
    Idle = 0,
    Running = 1,
    Solved = 2,
    StoppedByTime = 3,
    StoppedByNodeBudget = 4,
    Killing = 5,
    Killed = 6,
}

impl SearchStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SearchStatus::Running,
            2 => SearchStatus::Solved,
            3 => SearchStatus::StoppedByTime,
            4 => SearchStatus::StoppedByNodeBudget,
            5 => SearchStatus::Killing,
            6 => SearchStatus::Killed,
            _ => SearchStatus::Idle,
        }
    }

    /// True for the states a finished search ends in.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SearchStatus::Solved
                | SearchStatus::StoppedByTime
                | SearchStatus::StoppedByNodeBudget
                | SearchStatus::Killed
        )
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchStatus::Idle => "idle",
            SearchStatus::Running => "running",
            SearchStatus::Solved => "solved",
            SearchStatus::StoppedByTime => "stopped_by_time",
            SearchStatus::StoppedByNodeBudget => "stopped_by_node_budget",
            SearchStatus::Killing => "killing",
            SearchStatus::Killed => "killed",
        };
        f.write_str(name)
    }
}

/// Snapshot of the root, refreshed once per batch.
#[derive(Debug, Default)]
struct Progress {
    status: AtomicU8,
    stop: AtomicBool,
    root_score: AtomicI32,
    lower: AtomicI32,
    upper: AtomicI32,
    visited: AtomicU64,
    occupancy: AtomicUsize,
}

/// Thread-safe view of a running search, and the way to stop it.
#[derive(Clone, Debug)]
pub struct SearchHandle(Arc<Progress>);

impl SearchHandle {
    /// Asks the search to stop after the batch in flight.
    pub fn stop(&self) {
        self.0.stop.store(true, Ordering::SeqCst);
        let _ = self.0.status.compare_exchange(
            SearchStatus::Running as u8,
            SearchStatus::Killing as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn status(&self) -> SearchStatus {
        SearchStatus::from_u8(self.0.status.load(Ordering::SeqCst))
    }

    pub fn root_score(&self) -> i32 {
        self.0.root_score.load(Ordering::Relaxed)
    }

    pub fn bounds(&self) -> (i32, i32) {
        (self.0.lower.load(Ordering::Relaxed), self.0.upper.load(Ordering::Relaxed))
    }

    pub fn visited_nodes(&self) -> u64 {
        self.0.visited.load(Ordering::Relaxed)
    }

    pub fn table_occupancy(&self) -> usize {
        self.0.occupancy.load(Ordering::Relaxed)
    }
}

/// What a search call returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchResult {
    /// Best estimate of the root score, from the mover's point of view.
    pub score: i32,
    /// Proven lower bound.
    pub lower: i32,
    /// Proven upper bound.
    pub upper: i32,
    pub status: SearchStatus,
    /// Nodes visited below the root, over all calls on this root.
    pub visited: u64,
}

/// One move at the root, seen by the side to move there.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveAnnotation {
    /// The square played, or [`PASS`].
    pub square: Square,
    pub eval: i32,
    pub lower: i32,
    pub upper: i32,
    /// Nodes visited below the move.
    pub descendants: u64,
    /// Estimated cost to prove the move reaches the root goal.
    pub proof: f64,
    /// Estimated cost to prove it does not.
    pub disproof: f64,
    /// Set on the move with the best eval.
    pub best: bool,
}

// =============================================================================
// Workers
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Solve,
    Expand,
    Deepen,
}

#[derive(Debug)]
struct Job {
    target: LeafTarget,
    action: Action,
    /// Solve window, from the leaf's point of view.
    alpha: i32,
    beta: i32,
    descendants: u64,
}

#[derive(Debug)]
struct ChildSeed {
    position: Position,
    eval: i32,
}

#[derive(Debug)]
enum LeafOutcome {
    GameOver,
    Solved { score: i32 },
    Expanded { children: Vec<ChildSeed> },
    Deepened { eval: i32 },
    Failed(CollaboratorError),
}

#[derive(Debug)]
struct Processed {
    outcome: LeafOutcome,
    visited: u64,
}

struct Worker<E, S> {
    evaluator: E,
    solver: S,
}

impl<E: HeuristicEvaluator, S: EndgameSolver> Worker<E, S> {
    fn process<M: Mover>(&mut self, mover: &M, job: &Job, config: &SearchConfig) -> Processed {
        self.evaluator.reset_visited();
        self.solver.reset_visited();
        let outcome = self
            .run(mover, job, config)
            .unwrap_or_else(LeafOutcome::Failed);
        // A leaf that failed still cost its visit.
        let visited = (self.evaluator.visited() + self.solver.visited()).max(1);
        Processed { outcome, visited }
    }

    fn run<M: Mover>(&mut self, mover: &M, job: &Job, config: &SearchConfig) -> Result<LeafOutcome, CollaboratorError> {
        let position = job.target.position;
        let moves = mover.successors(&position);
        if moves.is_empty() && mover.successors(&position.pass()).is_empty() {
            return Ok(LeafOutcome::GameOver);
        }

        match job.action {
            Action::Solve => self.solve(&position, job),
            Action::Expand => {
                let children = if moves.is_empty() { vec![position.pass()] } else { moves };
                let children = children
                    .into_iter()
                    .map(|child| {
                        let eval = self
                            .evaluator
                            .quick_score(&child, config.expansion_depth, MIN_SCORE, MAX_SCORE)?;
                        Ok(ChildSeed { position: child, eval })
                    })
                    .collect::<Result<Vec<_>, CollaboratorError>>()?;
                Ok(LeafOutcome::Expanded { children })
            }
            Action::Deepen => {
                let empties = position.empties();
                let mut depth = 2;
                loop {
                    if empties.saturating_sub(depth) <= config.endgame_empties {
                        return self.solve(&position, job);
                    }
                    let eval = self.evaluator.quick_score(&position, depth, MIN_SCORE, MAX_SCORE)?;
                    if self.evaluator.visited() >= 2 * job.descendants {
                        return Ok(LeafOutcome::Deepened { eval });
                    }
                    depth += 2;
                }
            }
        }
    }

    fn solve(&mut self, position: &Position, job: &Job) -> Result<LeafOutcome, CollaboratorError> {
        // Fail-soft answers outside the window are one-sided bounds.
        let score = self.solver.exact_score(position, job.alpha, job.beta)?;
        let score = check_range(score, MIN_SCORE, MAX_SCORE)?;
        Ok(LeafOutcome::Solved { score })
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Best-first proof-number search over a transposition-table DAG.
pub struct SearchDriver<E = AlphaBetaEvaluator, S = ExactSolver, M = BitboardMover> {
    config: SearchConfig,
    mover: M,
    seed_evaluator: E,
    workers: Vec<Worker<E, S>>,
    pool: rayon::ThreadPool,
    table: TranspositionTable,
    selector: BestDescendantSelector,
    policy: Box<dyn SolvePolicy>,
    root: Option<Position>,
    window: Window,
    next_goal_update: f64,
    progress: Arc<Progress>,
}

impl SearchDriver {
    /// A driver with the bundled evaluator, solver and move generator.
    pub fn new(config: SearchConfig) -> Result<Self, EngineError> {
        Self::with_collaborators(
            config,
            BitboardMover,
            AlphaBetaEvaluator::new,
            ExactSolver::new,
            Box::new(ThresholdPolicy::default()),
        )
    }
}

impl<E, S, M> SearchDriver<E, S, M>
where
    E: HeuristicEvaluator,
    S: EndgameSolver,
    M: Mover,
{
    /// A driver with caller-supplied collaborators. The factories are
    /// called once per worker, plus once for the evaluator seeding roots.
    pub fn with_collaborators<FE, FS>(
        config: SearchConfig,
        mover: M,
        make_evaluator: FE,
        make_solver: FS,
        policy: Box<dyn SolvePolicy>,
    ) -> Result<Self, EngineError>
    where
        FE: Fn() -> E,
        FS: Fn() -> S,
    {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("pns-worker-{i}"))
            .build()
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;
        let workers = (0..config.workers)
            .map(|_| Worker {
                evaluator: make_evaluator(),
                solver: make_solver(),
            })
            .collect();
        log::debug!(
            "driver ready: {} workers, {} table slots",
            config.workers,
            config.table_capacity
        );
        Ok(Self {
            table: TranspositionTable::new(config.table_capacity, config.table_buckets),
            selector: BestDescendantSelector::new(config.workers),
            seed_evaluator: make_evaluator(),
            mover,
            workers,
            pool,
            policy,
            root: None,
            window: Window::full(),
            next_goal_update: 0.0,
            progress: Arc::new(Progress::default()),
            config,
        })
    }

    /// Searches `position` until its score is settled relative to the
    /// window `[lower, upper]`, or a budget runs out.
    ///
    /// Reuses whatever the table still knows about the position from
    /// earlier calls.
    pub fn search(
        &mut self,
        position: Position,
        lower: i32,
        upper: i32,
        max_nodes: u64,
        max_millis: u64,
    ) -> Result<SearchResult, EngineError> {
        let window = Window::new(lower, upper)?;
        Position::new(position.player, position.opponent)?;

        let start = Instant::now();
        let time_limit = Duration::from_millis(max_millis);
        self.progress.stop.store(false, Ordering::SeqCst);
        self.set_status(SearchStatus::Running);
        if let Err(e) = self.prepare_root(position, window) {
            self.set_status(SearchStatus::Idle);
            return Err(e);
        }
        log::info!(
            "search: {} empties, window [{lower}, {upper}], {max_nodes} nodes, {max_millis} ms",
            position.empties()
        );

        let mut batches = 0u64;
        let status = loop {
            self.publish();
            if let Some(status) = self.check_termination(max_nodes, start, time_limit) {
                break status;
            }
            let targets = self.selector.select(&self.table, &position);
            if targets.is_empty() {
                if self.update_goal(true) {
                    continue;
                }
                log::warn!("no leaf left to work on; stopping");
                break SearchStatus::StoppedByNodeBudget;
            }
            let jobs = self.plan(targets);
            let results = self.run_batch(&jobs);
            let leaves = jobs.len();
            self.apply(jobs, results);
            self.update_goal(false);
            batches += 1;
            if let Some(root) = self.root_node() {
                log::debug!(
                    "batch {batches}: {leaves} leaves, goal {}, eval {} in [{}, {}], p_ge {:.3}, {} nodes",
                    root.goal,
                    root.eval,
                    root.lower,
                    root.upper,
                    root.prob_ge,
                    root.descendants
                );
            }
        };

        self.set_status(status);
        self.publish();
        let result = self.result(status);
        log::info!(
            "search {}: score {} in [{}, {}], {} nodes, {batches} batches, {:.1?}",
            result.status,
            result.score,
            result.lower,
            result.upper,
            result.visited,
            start.elapsed()
        );
        Ok(result)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn handle(&self) -> SearchHandle {
        SearchHandle(Arc::clone(&self.progress))
    }

    pub fn status(&self) -> SearchStatus {
        self.handle().status()
    }

    pub fn root(&self) -> Option<Position> {
        self.root
    }

    fn root_node(&self) -> Option<&SearchNode> {
        self.root.as_ref().and_then(|p| self.table.get(p))
    }

    pub fn root_score(&self) -> Option<i32> {
        self.root_node().map(|n| n.eval)
    }

    pub fn bounds(&self) -> Option<(i32, i32)> {
        self.root_node().map(|n| (n.lower, n.upper))
    }

    pub fn goal(&self) -> Option<EvalGoal> {
        self.root_node().map(|n| n.goal)
    }

    pub fn visited_nodes(&self) -> u64 {
        self.root_node().map_or(0, |n| n.descendants)
    }

    pub fn table_occupancy(&self) -> usize {
        self.table.len()
    }

    pub fn table(&self) -> &TranspositionTable {
        &self.table
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The expanded moves of the root, best eval first. Empty while the
    /// root is a leaf; moves whose node was evicted are left out.
    pub fn move_annotations(&self) -> Vec<MoveAnnotation> {
        let Some(root) = self.root_node() else {
            return Vec::new();
        };
        let occupied = root.position.occupied();
        let mut annotations: Vec<MoveAnnotation> = root
            .children
            .iter()
            .flatten()
            .filter_map(|child| self.table.get(child))
            .map(|child| {
                let placed = child.position.occupied() & !occupied;
                MoveAnnotation {
                    square: if placed == 0 { PASS } else { placed.trailing_zeros() as Square },
                    eval: -child.eval,
                    lower: -child.upper,
                    upper: -child.lower,
                    descendants: child.descendants,
                    proof: child.disproof_sg,
                    disproof: child.proof_sg,
                    best: false,
                }
            })
            .collect();
        annotations.sort_by(|a, b| {
            b.eval
                .cmp(&a.eval)
                .then(b.lower.cmp(&a.lower))
                .then(a.square.cmp(&b.square))
        });
        if let Some(first) = annotations.first_mut() {
            first.best = true;
        }
        annotations
    }

    /// Checks every node whose children are all present.
    pub fn check_invariants(&self) -> Result<(), String> {
        for node in self.table.iter() {
            let summaries: Option<Vec<ChildSummary>> = match &node.children {
                None => None,
                Some(children) => {
                    let found: Option<Vec<_>> = children
                        .iter()
                        .map(|c| self.table.get(c).map(SearchNode::summary))
                        .collect();
                    match found {
                        Some(s) => Some(s),
                        None => continue,
                    }
                }
            };
            node.check_invariants(summaries.as_deref())
                .map_err(|e| format!("{:#x}/{:#x}: {e}", node.position.player, node.position.opponent))?;
        }
        Ok(())
    }

    /// Estimated nodes still needed to settle `claim` at the root, using
    /// the whole DAG rather than the per-node numbers.
    ///
    /// `None` when the claim cannot be settled from what the table holds.
    pub fn remaining_proof_cost(&self, claim: Claim) -> Option<f64> {
        let root = ProofLeaf::new(self.root?, claim);
        let mut combinations: HashMap<ProofLeaf, ProofCombination> = HashMap::new();
        let mut stack = vec![root];
        while let Some(leaf) = stack.pop() {
            if combinations.contains_key(&leaf) {
                continue;
            }
            let Some(node) = self.table.get(&leaf.position) else {
                continue;
            };
            let cost = claim_cost(node, leaf.claim);
            let combination = if cost == 0.0 {
                ProofCombination::trivial()
            } else if cost == f64::INFINITY {
                ProofCombination::no_proof()
            } else if let Some(children) = &node.children {
                let keys: Vec<ProofLeaf> = children
                    .iter()
                    .map(|c| ProofLeaf::new(*c, leaf.claim.child_claim()))
                    .collect();
                stack.extend(keys.iter().copied());
                if leaf.claim.needs_one_child() {
                    ProofCombination::new(keys.iter().map(|k| EndgameProof::with_pending(0.0, [*k])).collect())
                } else {
                    ProofCombination::new(vec![EndgameProof::with_pending(0.0, keys)])
                }
            } else {
                ProofCombination::leaf(cost)
            };
            combinations.insert(leaf, combination);
        }
        combinations
            .get(&root)?
            .min_resolved_cost(|l| combinations.get(l), MAX_PROOF_ALTERNATIVES)
    }

    // =========================================================================
    // Batch loop
    // =========================================================================

    fn set_status(&self, status: SearchStatus) {
        self.progress.status.store(status as u8, Ordering::SeqCst);
    }

    fn publish(&self) {
        if let Some(node) = self.root_node() {
            self.progress.root_score.store(node.eval, Ordering::Relaxed);
            self.progress.lower.store(node.lower, Ordering::Relaxed);
            self.progress.upper.store(node.upper, Ordering::Relaxed);
            self.progress.visited.store(node.descendants, Ordering::Relaxed);
        }
        self.progress.occupancy.store(self.table.len(), Ordering::Relaxed);
    }

    fn result(&self, status: SearchStatus) -> SearchResult {
        let (score, lower, upper, visited) = self
            .root_node()
            .map_or((0, MIN_SCORE, MAX_SCORE, 0), |n| (n.eval, n.lower, n.upper, n.descendants));
        SearchResult {
            score,
            lower,
            upper,
            status,
            visited,
        }
    }

    fn check_termination(&self, max_nodes: u64, start: Instant, time_limit: Duration) -> Option<SearchStatus> {
        let Some(root) = self.root_node() else {
            return Some(SearchStatus::StoppedByNodeBudget);
        };
        if self.progress.stop.load(Ordering::SeqCst) {
            Some(SearchStatus::Killed)
        } else if self.window.is_resolved(root.lower, root.upper) {
            Some(SearchStatus::Solved)
        } else if root.descendants >= max_nodes {
            Some(SearchStatus::StoppedByNodeBudget)
        } else if start.elapsed() >= time_limit {
            Some(SearchStatus::StoppedByTime)
        } else {
            None
        }
    }

    fn is_game_over(&self, position: &Position) -> bool {
        self.mover.successors(position).is_empty() && self.mover.successors(&position.pass()).is_empty()
    }

    /// Makes `position` the pinned root, reusing its node if the table has
    /// one and starting from an empty table otherwise, and brings its goal
    /// inside `window`.
    fn prepare_root(&mut self, position: Position, window: Window) -> Result<(), EngineError> {
        self.window = window;
        if self.root != Some(position) {
            if let Some(old) = self.root.take() {
                self.table.unpin(&old);
            }
            if !self.table.contains(&position) {
                let node = self.seed_root(position, window)?;
                // Goals and fathers left over from another root answer a
                // different question.
                log::debug!("new root; clearing {} nodes", self.table.len());
                self.table.clear();
                if self.table.get_or_create(position, || node).is_none() {
                    return Err(EngineError::InvalidConfig("table has no room for the root".into()));
                }
            } else {
                log::debug!("reusing root from the table");
            }
            self.table.pin(&position);
            self.root = Some(position);
            self.next_goal_update = 0.0;
        }

        let Some(root) = self.table.get(&position) else {
            return Err(EngineError::InvalidConfig("root missing from the table".into()));
        };
        let (goal, eval, descendants) = (root.goal, root.eval, root.descendants);
        if goal < window.lower || goal > window.upper {
            self.reset_goals(EvalGoal::nearest(eval, window));
        }
        if self.next_goal_update == 0.0 {
            self.next_goal_update = descendants as f64 * self.config.goal_update_ratio;
        }
        Ok(())
    }

    fn seed_root(&mut self, position: Position, window: Window) -> Result<SearchNode, EngineError> {
        if self.is_game_over(&position) {
            let score = position.game_over_score();
            log::debug!("root is a finished game: {score}");
            return Ok(SearchNode::game_over(position, EvalGoal::nearest(score, window)));
        }
        self.seed_evaluator.reset_visited();
        let eval = self
            .seed_evaluator
            .quick_score(&position, self.config.root_seed_depth, MIN_SCORE, MAX_SCORE)?;
        let goal = EvalGoal::nearest(eval, window);
        Ok(SearchNode::new(position, eval, goal, self.seed_evaluator.visited() + 1))
    }

    fn plan(&self, targets: Vec<LeafTarget>) -> Vec<Job> {
        let root_goal = self.goal();
        targets
            .into_iter()
            .filter_map(|target| {
                let node = self.table.get(&target.position)?;
                let window = if Some(node.goal) == root_goal {
                    self.window
                } else {
                    self.window.negate()
                };
                let (mut alpha, mut beta) = (window.lower.value(), window.upper.value());
                if alpha == beta {
                    alpha -= QUANTUM;
                    beta += QUANTUM;
                }
                let action = if self.policy.should_solve(&NodeView::of(node, target.endgame)) {
                    Action::Solve
                } else if !node.is_leaf() || !self.table.is_full() {
                    Action::Expand
                } else {
                    Action::Deepen
                };
                Some(Job {
                    descendants: node.descendants,
                    target,
                    action,
                    alpha,
                    beta,
                })
            })
            .collect()
    }

    fn run_batch(&mut self, jobs: &[Job]) -> Vec<Processed> {
        let mover = &self.mover;
        let config = &self.config;
        let workers = &mut self.workers;
        self.pool.install(|| {
            workers
                .par_iter_mut()
                .zip(jobs.par_iter())
                .map(|(worker, job)| worker.process(mover, job, config))
                .collect()
        })
    }

    fn apply(&mut self, jobs: Vec<Job>, results: Vec<Processed>) {
        let mut updated = Vec::with_capacity(jobs.len());
        for (job, processed) in jobs.iter().zip(results) {
            if let Some(position) = self.apply_one(job, processed) {
                updated.push(position);
            }
        }
        self.propagate(updated);
    }

    fn apply_one(&mut self, job: &Job, processed: Processed) -> Option<Position> {
        let position = job.target.position;
        let visited = processed.visited;
        for p in &job.target.path {
            if let Some(node) = self.table.get_mut(p) {
                node.descendants += visited;
            }
            self.table.touch(p);
        }
        if !self.table.touch(&position) {
            log::debug!("leaf evicted before its result arrived");
            return None;
        }

        match processed.outcome {
            LeafOutcome::Failed(error) => {
                log::warn!("leaf with {} empties failed: {error}", position.empties());
            }
            LeafOutcome::GameOver => {
                let node = self.table.get_mut(&position)?;
                node.children = None;
                node.set_solved(position.game_over_score());
            }
            LeafOutcome::Solved { score } => {
                self.policy.observe(visited);
                let node = self.table.get_mut(&position)?;
                if !node.is_leaf() {
                    node.revert_to_leaf();
                }
                // Rounded to the exact scores the bound still admits; a
                // fail-hard alpha (beta) lands half a step below (above).
                if score <= job.alpha {
                    node.set_upper(score.div_euclid(QUANTUM) * QUANTUM);
                } else if score >= job.beta {
                    node.set_lower(-(-score).div_euclid(QUANTUM) * QUANTUM);
                } else {
                    node.set_solved(score);
                }
            }
            LeafOutcome::Deepened { eval } => {
                let node = self.table.get_mut(&position)?;
                if !node.is_leaf() {
                    node.revert_to_leaf();
                }
                node.set_eval(eval);
            }
            LeafOutcome::Expanded { children } => {
                self.attach_children(position, children)?;
            }
        }

        let node = self.table.get_mut(&position)?;
        node.descendants += visited;
        Some(position)
    }

    fn attach_children(&mut self, father: Position, seeds: Vec<ChildSeed>) -> Option<()> {
        let goal = self.table.get(&father)?.goal.negate();
        let mut children = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let make = || SearchNode::new(seed.position, seed.eval, goal, 1);
            let Some((child, _)) = self.table.get_or_create(seed.position, make) else {
                log::warn!("table is full of pinned nodes; expansion dropped");
                return None;
            };
            child.add_father(father);
            children.push(seed.position);
        }
        self.table.get_mut(&father)?.children = Some(children);
        Some(())
    }

    /// Pushes changes at `updated` up through every father.
    fn propagate(&mut self, updated: Vec<Position>) {
        let mut stack = Vec::new();
        for position in updated {
            self.refresh(&position);
            stack.extend(self.live_fathers(&position));
        }
        while let Some(position) = stack.pop() {
            if self.refresh(&position) {
                stack.extend(self.live_fathers(&position));
            }
        }
    }

    /// Fathers of `position` that are still in the table and still list it
    /// as a child. The others are dropped from the node.
    fn live_fathers(&mut self, position: &Position) -> Vec<Position> {
        let Some(node) = self.table.get(position) else {
            return Vec::new();
        };
        let live: Vec<Position> = node
            .fathers
            .iter()
            .copied()
            .filter(|father| {
                self.table
                    .get(father)
                    .and_then(|f| f.children.as_ref())
                    .is_some_and(|children| children.contains(position))
            })
            .collect();
        let pruned = live.len() != node.fathers.len();
        if pruned && let Some(node) = self.table.get_mut(position) {
            node.fathers.clone_from(&live);
        }
        live
    }

    /// Recomputes an internal node from its children. Returns true if it
    /// changed. A node that lost a child goes back to being a leaf.
    fn refresh(&mut self, position: &Position) -> bool {
        let Some(children) = self.table.get(position).and_then(|n| n.children.as_ref()) else {
            return false;
        };
        let summaries: Option<Vec<ChildSummary>> = children
            .iter()
            .map(|c| self.table.get(c).map(SearchNode::summary))
            .collect();
        let Some(node) = self.table.get_mut(position) else {
            return false;
        };
        let Some(summaries) = summaries else {
            node.revert_to_leaf();
            return true;
        };
        let changed = node.update_from_children(&summaries);
        if let Err(violation) = node.check_invariants(Some(&summaries)) {
            if cfg!(debug_assertions) {
                panic!("invariant violated after update: {violation}\n{node:#?}");
            }
            log::error!("invariant violated after update: {violation}; re-deriving as a leaf");
            node.revert_to_leaf();
            return true;
        }
        changed
    }

    // =========================================================================
    // Goal
    // =========================================================================

    /// Moves the root goal one step when the root is (nearly) decided, or
    /// toward the root eval every so often. `exhausted` forces the nudge.
    /// Returns true if the goal changed.
    fn update_goal(&mut self, exhausted: bool) -> bool {
        let Some(root) = self.root_node() else {
            return false;
        };
        let (goal, eval, prob_ge, prob_sg, descendants) =
            (root.goal, root.eval, root.prob_ge, root.prob_sg, root.descendants);
        let window = self.window;

        let next = if prob_sg == 1.0 {
            goal.raised(window)
        } else if prob_ge == 0.0 {
            goal.lowered(window)
        } else if exhausted || descendants as f64 > self.next_goal_update {
            self.next_goal_update = descendants as f64 * self.config.goal_update_ratio;
            match EvalGoal::nearest(eval, window).cmp(&goal) {
                CmpOrdering::Greater => goal.raised(window),
                CmpOrdering::Less => goal.lowered(window),
                CmpOrdering::Equal => None,
            }
        } else {
            None
        };

        match next {
            Some(new_goal) if new_goal != goal => {
                log::debug!("goal {goal} -> {new_goal} (eval {eval})");
                self.reset_goals(new_goal);
                true
            }
            _ => false,
        }
    }

    /// Assigns `goal` to the root and alternating goals below it, then
    /// recomputes every reachable node bottom-up.
    fn reset_goals(&mut self, goal: EvalGoal) {
        let Some(root) = self.root else {
            return;
        };
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(root, goal, false)];
        while let Some((position, goal, finished)) = stack.pop() {
            if finished {
                order.push((position, goal));
                continue;
            }
            if !seen.insert(position) {
                continue;
            }
            let Some(node) = self.table.get(&position) else {
                continue;
            };
            stack.push((position, goal, true));
            for child in node.children.iter().flatten() {
                if !seen.contains(child) {
                    stack.push((*child, goal.negate(), false));
                }
            }
        }

        for (position, goal) in order {
            let Some(node) = self.table.get_mut(&position) else {
                continue;
            };
            node.goal = goal;
            if node.is_leaf() {
                node.update_leaf();
            } else {
                self.refresh(&position);
            }
        }
    }
}

fn claim_cost(node: &SearchNode, claim: Claim) -> f64 {
    match claim {
        Claim::ProveGreaterEqual => node.proof_ge,
        Claim::DisproveGreaterEqual => node.disproof_ge,
        Claim::ProveStrictlyGreater => node.proof_sg,
        Claim::DisproveStrictlyGreater => node.disproof_sg,
    }
}
