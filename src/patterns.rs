//! Static position evaluation.
//!
//! A small linear model: a weight per square (corners good, squares next to
//! empty corners bad), a mobility term, and a potential-mobility term
//! counting empty squares next to the opponent's disks. Every term is
//! invariant under the eight board symmetries.

use crate::constants::{MAX_GOAL, MIN_GOAL};
use crate::position::Position;

/// Square weights in fixed-point score units, row by row from A1.
#[rustfmt::skip]
pub const SQUARE_WEIGHTS: [i32; 64] = [
     500, -150,  30,  10,  10,  30, -150,  500,
    -150, -250, -15,  -5,  -5, -15, -250, -150,
      30,  -15,  15,   3,   3,  15,  -15,   30,
      10,   -5,   3,   3,   3,   3,   -5,   10,
      10,   -5,   3,   3,   3,   3,   -5,   10,
      30,  -15,  15,   3,   3,  15,  -15,   30,
    -150, -250, -15,  -5,  -5, -15, -250, -150,
     500, -150,  30,  10,  10,  30, -150,  500,
];

/// Score per legal move of difference.
pub const MOBILITY_WEIGHT: i32 = 60;

/// Score per frontier square of difference.
pub const FRONTIER_WEIGHT: i32 = 15;

const CORNERS: u64 = 0x8100_0000_0000_0081;

/// Squares adjacent to a corner, with the corner each one belongs to.
const CORNER_NEIGHBORS: [(u8, u64); 4] = [
    (0, 0x0000_0000_0000_0302),
    (7, 0x0000_0000_0000_c040),
    (56, 0x0203_0000_0000_0000),
    (63, 0x40c0_0000_0000_0000),
];

fn weighted_sum(mask: u64, weights: &[i32; 64]) -> i32 {
    let mut bits = mask;
    let mut sum = 0;
    while bits != 0 {
        sum += weights[bits.trailing_zeros() as usize];
        bits &= bits - 1;
    }
    sum
}

/// Empty squares touching at least one disk of `disks`.
fn frontier(disks: u64, empty: u64) -> u64 {
    const NOT_A: u64 = 0xfefe_fefe_fefe_fefe;
    const NOT_H: u64 = 0x7f7f_7f7f_7f7f_7f7f;
    let around = ((disks << 1) & NOT_A)
        | ((disks >> 1) & NOT_H)
        | (disks << 8)
        | (disks >> 8)
        | ((disks << 9) & NOT_A)
        | ((disks << 7) & NOT_H)
        | ((disks >> 7) & NOT_A)
        | ((disks >> 9) & NOT_H);
    around & empty
}

/// Square weights with the X- and C-square penalties dropped for corners
/// that are already taken.
fn square_weights(pos: &Position) -> [i32; 64] {
    let mut weights = SQUARE_WEIGHTS;
    let occupied = pos.occupied();
    if occupied & CORNERS == 0 {
        return weights;
    }
    for (corner, neighbors) in CORNER_NEIGHBORS {
        if (occupied >> corner) & 1 != 0 {
            let mut bits = neighbors;
            while bits != 0 {
                weights[bits.trailing_zeros() as usize] = 0;
                bits &= bits - 1;
            }
        }
    }
    weights
}

/// Heuristic score of a position from the mover's point of view, clamped
/// strictly inside the exact-score range.
pub fn evaluate(pos: &Position) -> i32 {
    let weights = square_weights(pos);
    let squares = weighted_sum(pos.player, &weights) - weighted_sum(pos.opponent, &weights);
    let mobility = pos.mobility() as i32 - pos.opponent_mobility() as i32;
    let empty = pos.empty_squares();
    // Fewer frontier squares next to our own disks is better.
    let frontier_diff =
        frontier(pos.opponent, empty).count_ones() as i32 - frontier(pos.player, empty).count_ones() as i32;
    let score = squares + MOBILITY_WEIGHT * mobility + FRONTIER_WEIGHT * frontier_diff;
    score.clamp(MIN_GOAL, MAX_GOAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{symmetries, transform};
    use crate::position::{parse_coord, random_position};

    #[test]
    fn test_weights_are_symmetric() {
        for i in 0..8 {
            for sq in 0..64u8 {
                let image = transform(1 << sq, i).trailing_zeros() as usize;
                assert_eq!(SQUARE_WEIGHTS[sq as usize], SQUARE_WEIGHTS[image]);
            }
        }
    }

    #[test]
    fn test_initial_position_is_balanced() {
        assert_eq!(evaluate(&Position::initial()), 0);
    }

    #[test]
    fn test_evaluate_is_antisymmetric() {
        let pos = Position::initial().play(parse_coord("D3").unwrap()).unwrap();
        let swapped = pos.pass();
        assert_eq!(evaluate(&pos), -evaluate(&swapped));
    }

    #[test]
    fn test_corner_is_good() {
        let with_corner = Position::new(1, 1 << 9).unwrap();
        assert!(evaluate(&with_corner) > 0);
    }

    #[test]
    fn test_evaluate_symmetry_invariance() {
        let mut rng = fastrand::Rng::with_seed(42);
        for plies in [4, 12, 24, 40] {
            let pos = random_position(&mut rng, plies);
            let base = evaluate(&pos);
            for image in symmetries(pos) {
                assert_eq!(evaluate(&image), base);
            }
        }
    }
}
