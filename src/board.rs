//! Colored board view and board symmetries.
//!
//! [`Position`] only knows "side to move" and "other side". This module
//! adds colors for text input and output, and the eight symmetries of the
//! square board.

use std::fmt;

use crate::position::{PASS, Position, Square, str_coord};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn other(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }
}

/// Error from parsing a board string or playing on a board.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("expected 64 squares, found {0}")]
    Length(usize),
    #[error("unexpected character {0:?}")]
    Character(char),
    #[error("illegal move {0}")]
    IllegalMove(String),
}

/// A position with colors attached.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Board {
    pub black: u64,
    pub white: u64,
    pub to_move: Color,
}

impl Default for Board {
    fn default() -> Self {
        Self::from_position(Position::initial(), Color::Black)
    }
}

impl Board {
    pub fn from_position(pos: Position, to_move: Color) -> Self {
        match to_move {
            Color::Black => Self {
                black: pos.player,
                white: pos.opponent,
                to_move,
            },
            Color::White => Self {
                black: pos.opponent,
                white: pos.player,
                to_move,
            },
        }
    }

    /// The position seen by the side to move.
    pub fn position(&self) -> Position {
        match self.to_move {
            Color::Black => Position {
                player: self.black,
                opponent: self.white,
            },
            Color::White => Position {
                player: self.white,
                opponent: self.black,
            },
        }
    }

    /// Parses 64 squares (`X`/`*`/`B` black, `O`/`W` white, `-`/`.` empty),
    /// ignoring whitespace.
    pub fn parse(squares: &str, to_move: Color) -> Result<Self, BoardError> {
        let mut black = 0u64;
        let mut white = 0u64;
        let mut count = 0usize;
        for ch in squares.chars().filter(|c| !c.is_whitespace()) {
            if count < 64 {
                match ch.to_ascii_uppercase() {
                    'X' | '*' | 'B' => black |= 1 << count,
                    'O' | 'W' => white |= 1 << count,
                    '-' | '.' => {}
                    _ => return Err(BoardError::Character(ch)),
                }
            }
            count += 1;
        }
        if count != 64 {
            return Err(BoardError::Length(count));
        }
        Ok(Self {
            black,
            white,
            to_move,
        })
    }

    /// Plays a move (or pass) for the side to move.
    pub fn play(&mut self, square: Square) -> Result<(), BoardError> {
        let pos = self.position();
        let next = if square == PASS {
            if pos.legal_moves() != 0 {
                return Err(BoardError::IllegalMove("pass".into()));
            }
            pos.pass()
        } else {
            pos.play(square)
                .ok_or_else(|| BoardError::IllegalMove(str_coord(square)))?
        };
        *self = Self::from_position(next, self.to_move.other());
        Ok(())
    }

    /// 64-character form accepted by [`Board::parse`].
    pub fn to_compact(&self) -> String {
        (0..64)
            .map(|i| match self.get(i) {
                Some(Color::Black) => 'X',
                Some(Color::White) => 'O',
                None => '-',
            })
            .collect()
    }

    pub fn get(&self, square: Square) -> Option<Color> {
        if (self.black >> square) & 1 != 0 {
            Some(Color::Black)
        } else if (self.white >> square) & 1 != 0 {
            Some(Color::White)
        } else {
            None
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  A B C D E F G H")?;
        for row in 0..8u8 {
            write!(f, "{} ", row + 1)?;
            for col in 0..8u8 {
                let ch = match self.get(row * 8 + col) {
                    Some(Color::Black) => 'X',
                    Some(Color::White) => 'O',
                    None => '.',
                };
                write!(f, "{ch} ")?;
            }
            writeln!(f)?;
        }
        let side = match self.to_move {
            Color::Black => "X",
            Color::White => "O",
        };
        write!(f, "{side} to move")
    }
}

// =============================================================================
// Symmetries
// =============================================================================

/// Mirror top-to-bottom (row 1 <-> row 8).
pub fn flip_vertical(x: u64) -> u64 {
    x.swap_bytes()
}

/// Mirror left-to-right (column A <-> column H).
pub fn mirror_horizontal(mut x: u64) -> u64 {
    const K1: u64 = 0x5555_5555_5555_5555;
    const K2: u64 = 0x3333_3333_3333_3333;
    const K4: u64 = 0x0f0f_0f0f_0f0f_0f0f;
    x = ((x >> 1) & K1) | ((x & K1) << 1);
    x = ((x >> 2) & K2) | ((x & K2) << 2);
    ((x >> 4) & K4) | ((x & K4) << 4)
}

/// Transpose along the A1-H8 diagonal.
pub fn flip_diagonal(mut x: u64) -> u64 {
    const K1: u64 = 0x5500_5500_5500_5500;
    const K2: u64 = 0x3333_0000_3333_0000;
    const K4: u64 = 0x0f0f_0f0f_0000_0000;
    let mut t = K4 & (x ^ (x << 28));
    x ^= t ^ (t >> 28);
    t = K2 & (x ^ (x << 14));
    x ^= t ^ (t >> 14);
    t = K1 & (x ^ (x << 7));
    x ^= t ^ (t >> 7);
    x
}

/// Applies symmetry `index` (0..8) to a mask; 0 is the identity.
pub fn transform(x: u64, index: usize) -> u64 {
    let mut x = x;
    if index & 1 != 0 {
        x = flip_vertical(x);
    }
    if index & 2 != 0 {
        x = mirror_horizontal(x);
    }
    if index & 4 != 0 {
        x = flip_diagonal(x);
    }
    x
}

/// The eight images of a position under the board symmetries.
pub fn symmetries(pos: Position) -> [Position; 8] {
    std::array::from_fn(|i| Position {
        player: transform(pos.player, i),
        opponent: transform(pos.opponent, i),
    })
}
