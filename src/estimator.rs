//! Statistical models steering the search.
//!
//! Two families of closed-form estimates:
//! - the probability that the true score clears a threshold, given a
//!   heuristic estimate, under a Gaussian error model;
//! - the number of nodes an exact search would need to prove or disprove
//!   such a threshold, as a log-linear regression over empties, mobility
//!   and the gap between threshold and estimate.
//!
//! None of these affect correctness, only the order in which work is done.

use crate::constants::{
    MAX_PROOF_NUMBER, MIN_PROOF_NUMBER, PROB_ROUNDING, SIGMA_BASE, SIGMA_PER_EMPTY,
};
use crate::position::Position;

/// Standard normal CDF (Abramowitz and Stegun 26.2.17, error below 7.5e-8).
pub fn gaussian_cdf_std(x: f64) -> f64 {
    const P: f64 = 0.231_641_9;
    const B: [f64; 5] = [0.319_381_530, -0.356_563_782, 1.781_477_937, -1.821_255_978, 1.330_274_429];
    let t = 1.0 / (1.0 + P * x.abs());
    let poly = t * (B[0] + t * (B[1] + t * (B[2] + t * (B[3] + t * B[4]))));
    let tail = (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt() * poly;
    if x >= 0.0 { 1.0 - tail } else { tail }
}

/// CDF of a normal with the given mean and standard deviation.
pub fn gaussian_cdf(x: f64, mean: f64, sd: f64) -> f64 {
    gaussian_cdf_std((x - mean) / sd)
}

/// Standard deviation of the heuristic error at a given number of empties.
pub fn eval_sigma(empties: u32) -> f64 {
    (SIGMA_BASE - SIGMA_PER_EMPTY * empties as f64).max(1.0)
}

/// Snaps probabilities within [`PROB_ROUNDING`] of 0 or 1 to certainty.
pub fn round_probability(p: f64) -> f64 {
    if p < PROB_ROUNDING {
        0.0
    } else if p > 1.0 - PROB_ROUNDING {
        1.0
    } else {
        p
    }
}

/// Probability that the true score exceeds `threshold`, given a heuristic
/// `eval` of a position with `empties` empty squares.
pub fn win_probability(threshold: i32, eval: i32, empties: u32) -> f64 {
    round_probability(1.0 - gaussian_cdf(threshold as f64, eval as f64, eval_sigma(empties)))
}

/// Log of the expected nodes to prove the score of `pos` is above `bound`.
pub fn log_proof_number(pos: &Position, bound: i32, approx: i32) -> f64 {
    let empties = pos.empties() as f64;
    let opponent_moves = pos.opponent_mobility() as f64;
    -3.29 + 0.5395 * empties + 2.4157 * (1.0 + opponent_moves).ln()
        - 0.000615 * (approx - bound) as f64
}

/// Log of the expected nodes to prove the score of `pos` is at most `bound`.
pub fn log_disproof_number(pos: &Position, bound: i32, approx: i32) -> f64 {
    let empties = pos.empties() as f64;
    let player_moves = pos.mobility() as f64;
    -3.6659 + 0.5501 * empties + 2.7047 * (1.0 + player_moves).ln()
        - 0.000590 * (bound - approx) as f64
}

fn clamp_cost(log_cost: f64) -> f64 {
    log_cost.exp().clamp(MIN_PROOF_NUMBER, MAX_PROOF_NUMBER)
}

/// Expected nodes to prove the score of `pos` is above `bound`.
pub fn proof_number(pos: &Position, bound: i32, approx: i32) -> f64 {
    clamp_cost(log_proof_number(pos, bound, approx))
}

/// Expected nodes to prove the score of `pos` is at most `bound`.
pub fn disproof_number(pos: &Position, bound: i32, approx: i32) -> f64 {
    clamp_cost(log_disproof_number(pos, bound, approx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdf_reference_values() {
        assert!((gaussian_cdf_std(0.0) - 0.5).abs() < 1e-7);
        assert!((gaussian_cdf_std(1.0) - 0.841_344_7).abs() < 1e-6);
        assert!((gaussian_cdf_std(-1.96) - 0.024_997_9).abs() < 1e-6);
        assert!(gaussian_cdf_std(10.0) > 0.999_999);
    }

    #[test]
    fn test_cdf_is_monotone() {
        let mut last = 0.0;
        for i in -40..=40 {
            let v = gaussian_cdf_std(i as f64 / 10.0);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn test_win_probability() {
        assert!((win_probability(0, 0, 30) - 0.5).abs() < 1e-7);
        assert!(win_probability(-100, 0, 30) > win_probability(100, 0, 30));
        assert_eq!(win_probability(-3000, 0, 30), 1.0);
        assert_eq!(win_probability(3000, 0, 30), 0.0);
    }

    #[test]
    fn test_round_probability() {
        assert_eq!(round_probability(0.005), 0.0);
        assert_eq!(round_probability(0.995), 1.0);
        assert_eq!(round_probability(0.3), 0.3);
    }

    #[test]
    fn test_costs_grow_with_empties() {
        let pos = Position::initial();
        let late = Position::new(0x0000_00ff_ff00_0000, 0x00ff_0000_00ff_ff00).unwrap();
        assert!(proof_number(&pos, 100, 0) > proof_number(&late, 100, 0));
        assert!(disproof_number(&pos, 100, 0) > disproof_number(&late, 100, 0));
    }

    #[test]
    fn test_costs_follow_the_gap() {
        let pos = Position::initial();
        // Easier to prove a bound far below the estimate.
        assert!(proof_number(&pos, -2000, 0) < proof_number(&pos, 2000, 0));
        // Easier to disprove a bound far above the estimate.
        assert!(disproof_number(&pos, 2000, 0) < disproof_number(&pos, -2000, 0));
    }

    #[test]
    fn test_costs_are_clamped() {
        let pos = Position::initial();
        assert_eq!(proof_number(&pos, -1_000_000, 1_000_000), MIN_PROOF_NUMBER);
        assert_eq!(proof_number(&pos, 1_000_000_000, -1_000_000_000), MAX_PROOF_NUMBER);
    }
}
