//! othello-pns: parallel best-first proof-number search for Othello.
//!
//! The engine grows a DAG of positions inside a fixed-size transposition
//! table, scoring each node by the probability that it beats an evaluation
//! goal and by estimated proof / disproof costs. Batches of the most
//! informative leaves are expanded, re-evaluated or solved exactly on a
//! worker pool until the root score is settled or a budget runs out.
//!
//! ## Modules
//!
//! - [`constants`] - Score scale, thresholds and defaults
//! - [`position`] - Bitboard positions, move generation, coordinates
//! - [`board`] - Colored boards for text I/O, board symmetries
//! - [`goal`] - Quantized evaluation goals and windows
//! - [`patterns`], [`midgame`] - Static evaluation and alpha-beta
//! - [`endgame`] - Exact endgame solver
//! - [`estimator`] - Win probabilities and proof-cost regression
//! - [`node`], [`table`] - The search DAG and its storage
//! - [`descendant`], [`policy`] - Choosing leaves and how to treat them
//! - [`proofs`] - Combining pending proofs over a DAG
//! - [`driver`] - The search loop
//! - [`protocol`] - Text protocol around the driver
//!
//! ## Example
//!
//! ```
//! use othello_pns::driver::{SearchConfig, SearchDriver, SearchStatus};
//! use othello_pns::position::Position;
//!
//! let config = SearchConfig {
//!     workers: 1,
//!     table_capacity: 10_000,
//!     table_buckets: 20_000,
//!     ..SearchConfig::default()
//! };
//! let mut driver = SearchDriver::new(config).unwrap();
//! let result = driver
//!     .search(Position::initial(), -6300, 6300, 2_000, 10_000)
//!     .unwrap();
//! assert!(result.lower <= result.score && result.score <= result.upper);
//! assert_ne!(result.status, SearchStatus::Running);
//! ```

pub mod board;
pub mod constants;
pub mod descendant;
pub mod driver;
pub mod endgame;
pub mod error;
pub mod estimator;
pub mod goal;
pub mod midgame;
pub mod node;
pub mod patterns;
pub mod policy;
pub mod position;
pub mod proofs;
pub mod protocol;
pub mod table;
