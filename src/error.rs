//! Error types for the search engine.

use thiserror::Error;

/// Caller misuse detected before any search work begins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("goal {0} is not an odd multiple of the half-step within [-6300, 6300]")]
    UnquantizedGoal(i32),

    #[error("window bound {0} is not an odd multiple of the half-step within [-6300, 6300]")]
    UnquantizedWindow(i32),

    #[error("inverted window: lower {lower} > upper {upper}")]
    InvertedWindow { lower: i32, upper: i32 },

    #[error("overlapping disks in position (player {player:#018x}, opponent {opponent:#018x})")]
    OverlappingDisks { player: u64, opponent: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("root evaluation failed: {0}")]
    RootEvaluation(#[from] CollaboratorError),
}

/// Failure reported by an evaluator or solver for a single leaf.
///
/// The driver logs these and skips the leaf for the current batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("score {score} outside window [{lower}, {upper}]")]
    OutOfRange { score: i32, lower: i32, upper: i32 },

    #[error("{0}")]
    Failed(String),
}

/// Checks that a collaborator score lies in the given window.
pub fn check_range(score: i32, lower: i32, upper: i32) -> Result<i32, CollaboratorError> {
    if score < lower || score > upper {
        Err(CollaboratorError::OutOfRange {
            score,
            lower,
            upper,
        })
    } else {
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert_eq!(check_range(0, -100, 100), Ok(0));
        assert_eq!(check_range(100, -100, 100), Ok(100));
        assert!(matches!(
            check_range(300, -100, 100),
            Err(CollaboratorError::OutOfRange { score: 300, .. })
        ));
    }

    #[test]
    fn test_messages() {
        let e = EngineError::InvertedWindow {
            lower: 300,
            upper: -100,
        };
        assert_eq!(e.to_string(), "inverted window: lower 300 > upper -100");
        assert_eq!(
            CollaboratorError::Failed("boom".into()).to_string(),
            "boom"
        );
    }
}
