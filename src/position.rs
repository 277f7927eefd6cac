//! Bitboard Othello positions and move execution.
//!
//! A position is always stored from the point of view of the side to move:
//! `player` holds the mover's disks and `opponent` the other side's. After
//! every move (or pass) the two masks swap roles, so the search never needs
//! to track colors.
//!
//! Squares are numbered `row * 8 + col`, with `A1` as bit 0 and `H8` as
//! bit 63.

use crate::constants::DISK_UNIT;
use crate::error::EngineError;

/// A square index in `0..64`, or [`PASS`].
pub type Square = u8;

/// Marker for a pass in move lists and coordinates.
pub const PASS: Square = 64;

const NOT_A_FILE: u64 = 0xfefe_fefe_fefe_fefe;
const NOT_H_FILE: u64 = 0x7f7f_7f7f_7f7f_7f7f;

/// Shift amounts and wrap masks for the eight directions.
/// Positive shifts move toward higher square numbers.
const DIRECTIONS: [(i32, u64); 8] = [
    (1, NOT_A_FILE),
    (-1, NOT_H_FILE),
    (8, u64::MAX),
    (-8, u64::MAX),
    (9, NOT_A_FILE),
    (7, NOT_H_FILE),
    (-7, NOT_A_FILE),
    (-9, NOT_H_FILE),
];

#[inline]
fn shift(bits: u64, amount: i32, mask: u64) -> u64 {
    if amount > 0 {
        (bits << amount) & mask
    } else {
        (bits >> -amount) & mask
    }
}

/// An Othello position: the disks of the side to move and of its opponent.
///
/// Two positions are equal exactly when both masks match; the pair is the
/// identity used by the transposition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub player: u64,
    pub opponent: u64,
}

impl Default for Position {
    fn default() -> Self {
        Self::initial()
    }
}

impl Position {
    /// Builds a position, rejecting masks that share a square.
    pub fn new(player: u64, opponent: u64) -> Result<Self, EngineError> {
        if player & opponent != 0 {
            return Err(EngineError::OverlappingDisks { player, opponent });
        }
        Ok(Self { player, opponent })
    }

    /// The standard opening position, Black to move.
    pub fn initial() -> Self {
        Self {
            player: (1 << 28) | (1 << 35),
            opponent: (1 << 27) | (1 << 36),
        }
    }

    pub fn occupied(&self) -> u64 {
        self.player | self.opponent
    }

    pub fn empty_squares(&self) -> u64 {
        !self.occupied()
    }

    pub fn empties(&self) -> u32 {
        self.empty_squares().count_ones()
    }

    /// Mask of squares where the side to move can play.
    pub fn legal_moves(&self) -> u64 {
        legal_moves(self.player, self.opponent)
    }

    /// Number of legal moves for the side to move.
    pub fn mobility(&self) -> u32 {
        self.legal_moves().count_ones()
    }

    /// Number of legal moves the opponent would have if it were to move.
    pub fn opponent_mobility(&self) -> u32 {
        legal_moves(self.opponent, self.player).count_ones()
    }

    /// Disks flipped by playing `square`; zero if the move is illegal.
    pub fn flips(&self, square: Square) -> u64 {
        if square >= PASS || (self.occupied() >> square) & 1 != 0 {
            return 0;
        }
        flips(self.player, self.opponent, 1u64 << square)
    }

    /// Plays `square` and returns the resulting position, opponent to move.
    pub fn play(&self, square: Square) -> Option<Position> {
        let flipped = self.flips(square);
        if flipped == 0 {
            return None;
        }
        Some(self.apply(1u64 << square, flipped))
    }

    #[inline]
    fn apply(&self, mv: u64, flipped: u64) -> Position {
        Position {
            player: self.opponent & !flipped,
            opponent: self.player | flipped | mv,
        }
    }

    /// The same board with the other side to move.
    pub fn pass(&self) -> Position {
        Position {
            player: self.opponent,
            opponent: self.player,
        }
    }

    /// Every position reachable with one move, each seen from the new side
    /// to move. Empty when the side to move must pass.
    pub fn successors(&self) -> Vec<Position> {
        let mut moves = self.legal_moves();
        let mut out = Vec::with_capacity(moves.count_ones() as usize);
        while moves != 0 {
            let mv = moves & moves.wrapping_neg();
            moves &= moves - 1;
            out.push(self.apply(mv, flips(self.player, self.opponent, mv)));
        }
        out
    }

    /// True when neither side can move.
    pub fn is_game_over(&self) -> bool {
        self.legal_moves() == 0 && legal_moves(self.opponent, self.player) == 0
    }

    /// Final score from the mover's point of view: disk difference, with
    /// the empty squares awarded to the winner.
    pub fn game_over_score(&self) -> i32 {
        let diff = self.player.count_ones() as i32 - self.opponent.count_ones() as i32;
        let empties = self.empties() as i32;
        DISK_UNIT * (diff + diff.signum() * empties)
    }
}

/// Legal move mask for `player` against `opponent`.
pub fn legal_moves(player: u64, opponent: u64) -> u64 {
    let empty = !(player | opponent);
    let mut moves = 0;
    for (amount, mask) in DIRECTIONS {
        let mut run = shift(player, amount, mask) & opponent;
        for _ in 0..5 {
            run |= shift(run, amount, mask) & opponent;
        }
        moves |= shift(run, amount, mask) & empty;
    }
    moves
}

/// Disks flipped when `player` plays the single-bit move `mv`.
pub fn flips(player: u64, opponent: u64, mv: u64) -> u64 {
    let mut flipped = 0;
    for (amount, mask) in DIRECTIONS {
        let mut line = 0;
        let mut cursor = shift(mv, amount, mask);
        while cursor & opponent != 0 {
            line |= cursor;
            cursor = shift(cursor, amount, mask);
        }
        if cursor & player != 0 {
            flipped |= line;
        }
    }
    flipped
}

/// Move generation as seen by the search engine.
///
/// Implementations must be shareable across worker threads.
pub trait Mover: Send + Sync {
    /// Resulting positions after each legal move; empty means "must pass".
    fn successors(&self, position: &Position) -> Vec<Position>;
}

/// The bundled shift-based move generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct BitboardMover;

impl Mover for BitboardMover {
    fn successors(&self, position: &Position) -> Vec<Position> {
        position.successors()
    }
}

/// Parse a coordinate string (e.g., "D3", "pass") into a square.
///
/// Columns are `A`..`H` left to right, rows `1`..`8` top to bottom.
/// Returns `None` for anything else.
pub fn parse_coord(s: &str) -> Option<Square> {
    if s.eq_ignore_ascii_case("pass") {
        return Some(PASS);
    }
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let col = bytes[0].to_ascii_uppercase().wrapping_sub(b'A');
    let row = bytes[1].wrapping_sub(b'1');
    (col < 8 && row < 8).then_some(row * 8 + col)
}

/// Convert a square to its coordinate string (e.g., "D3").
pub fn str_coord(square: Square) -> String {
    if square >= PASS {
        return "pass".into();
    }
    let col = (b'A' + square % 8) as char;
    let row = square / 8 + 1;
    format!("{col}{row}")
}

/// Plays `plies` random moves from the opening, passing when forced.
///
/// Stops early if the game ends.
pub fn random_position(rng: &mut fastrand::Rng, plies: u32) -> Position {
    let mut pos = Position::initial();
    for _ in 0..plies {
        let successors = pos.successors();
        if successors.is_empty() {
            if pos.is_game_over() {
                break;
            }
            pos = pos.pass();
            continue;
        }
        pos = successors[rng.usize(..successors.len())];
    }
    pos
}
