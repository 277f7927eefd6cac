//! Quantized evaluation goals and search windows.
//!
//! Exact scores are multiples of [`QUANTUM`]. A goal always sits on an odd
//! multiple of [`HALF_QUANTUM`], strictly between two exact scores, so no
//! exact score can ever tie with it.

use std::fmt;

use crate::constants::{HALF_QUANTUM, MAX_GOAL, MIN_GOAL, QUANTUM};
use crate::error::EngineError;

/// Returns true if `value` is a legal goal.
pub fn is_quantized(value: i32) -> bool {
    (MIN_GOAL..=MAX_GOAL).contains(&value) && (value - HALF_QUANTUM).rem_euclid(QUANTUM) == 0
}

/// A threshold the search is confirming or refuting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EvalGoal(i32);

impl EvalGoal {
    pub fn new(value: i32) -> Result<Self, EngineError> {
        if is_quantized(value) {
            Ok(Self(value))
        } else {
            Err(EngineError::UnquantizedGoal(value))
        }
    }

    /// The goal closest above `eval`, clamped into `window`.
    pub fn nearest(eval: i32, window: Window) -> Self {
        let raw = eval.div_euclid(QUANTUM) * QUANTUM + HALF_QUANTUM;
        Self(raw.clamp(window.lower.0, window.upper.0))
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// The same goal seen by the opponent.
    pub fn negate(self) -> Self {
        Self(-self.0)
    }

    /// One step up, if that stays inside `window`.
    pub fn raised(self, window: Window) -> Option<Self> {
        let next = self.0 + QUANTUM;
        (next <= window.upper.0).then_some(Self(next))
    }

    /// One step down, if that stays inside `window`.
    pub fn lowered(self, window: Window) -> Option<Self> {
        let next = self.0 - QUANTUM;
        (next >= window.lower.0).then_some(Self(next))
    }
}

impl fmt::Display for EvalGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Range of goals a search is asked to resolve.
///
/// The search stops once the root score is known to lie below `lower`,
/// above `upper`, or exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub lower: EvalGoal,
    pub upper: EvalGoal,
}

impl Window {
    pub fn new(lower: i32, upper: i32) -> Result<Self, EngineError> {
        if !is_quantized(lower) {
            return Err(EngineError::UnquantizedWindow(lower));
        }
        if !is_quantized(upper) {
            return Err(EngineError::UnquantizedWindow(upper));
        }
        if lower > upper {
            return Err(EngineError::InvertedWindow { lower, upper });
        }
        Ok(Self {
            lower: EvalGoal(lower),
            upper: EvalGoal(upper),
        })
    }

    /// Widest window: every score is resolved exactly.
    pub fn full() -> Self {
        Self {
            lower: EvalGoal(MIN_GOAL),
            upper: EvalGoal(MAX_GOAL),
        }
    }

    /// The window seen by the opponent.
    pub fn negate(self) -> Self {
        Self {
            lower: self.upper.negate(),
            upper: self.lower.negate(),
        }
    }

    /// True once proven bounds settle the window.
    pub fn is_resolved(self, lower: i32, upper: i32) -> bool {
        lower == upper || upper < self.lower.0 || lower > self.upper.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantized() {
        assert!(is_quantized(100));
        assert!(is_quantized(-100));
        assert!(is_quantized(6300));
        assert!(is_quantized(-6300));
        assert!(!is_quantized(0));
        assert!(!is_quantized(200));
        assert!(!is_quantized(150));
        assert!(!is_quantized(6500));
    }

    #[test]
    fn test_new_rejects_even_values() {
        assert_eq!(EvalGoal::new(0), Err(EngineError::UnquantizedGoal(0)));
        assert_eq!(EvalGoal::new(-300).map(EvalGoal::value), Ok(-300));
    }

    #[test]
    fn test_nearest() {
        let w = Window::full();
        assert_eq!(EvalGoal::nearest(0, w).value(), 100);
        assert_eq!(EvalGoal::nearest(-1, w).value(), -100);
        assert_eq!(EvalGoal::nearest(250, w).value(), 300);
        assert_eq!(EvalGoal::nearest(6400, w).value(), 6300);
        assert_eq!(EvalGoal::nearest(-6400, w).value(), -6300);

        let narrow = Window::new(-100, 100).unwrap();
        assert_eq!(EvalGoal::nearest(2000, narrow).value(), 100);
        assert_eq!(EvalGoal::nearest(-2000, narrow).value(), -100);
    }

    #[test]
    fn test_raise_lower_stay_in_window() {
        let w = Window::new(-300, 100).unwrap();
        let g = EvalGoal::new(-100).unwrap();
        assert_eq!(g.raised(w).map(EvalGoal::value), Some(100));
        assert_eq!(g.raised(w).and_then(|g| g.raised(w)), None);
        assert_eq!(g.lowered(w).map(EvalGoal::value), Some(-300));
        assert_eq!(g.lowered(w).and_then(|g| g.lowered(w)), None);
    }

    #[test]
    fn test_window_validation() {
        assert!(matches!(
            Window::new(300, -100),
            Err(EngineError::InvertedWindow { .. })
        ));
        assert_eq!(
            Window::new(0, 100),
            Err(EngineError::UnquantizedWindow(0))
        );
        let w = Window::new(-500, 300).unwrap();
        assert_eq!(w.negate(), Window::new(-300, 500).unwrap());
    }

    #[test]
    fn test_window_resolved() {
        let w = Window::new(-100, 100).unwrap();
        assert!(w.is_resolved(0, 0));
        assert!(w.is_resolved(200, 6400));
        assert!(w.is_resolved(-6400, -200));
        assert!(!w.is_resolved(-200, 200));
    }
}
