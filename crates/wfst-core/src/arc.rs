// Labels, state ids and arcs.

use std::fmt;

use crate::weight::Semiring;

/// Input or output symbol id.
pub type Label = u32;

/// State id.
pub type StateId = u32;

/// The epsilon ("no symbol") label.
pub const EPSILON: Label = 0;

/// Label used by composition for the implicit epsilon self-loop on a state
/// that stays put while the other operand moves.
pub const NO_LABEL: Label = Label::MAX;

/// Next-state sentinel of a final-weight pseudo-arc.
pub const NO_STATE_ID: StateId = StateId::MAX;

/// A labeled, weighted transition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Arc<W> {
    pub ilabel: Label,
    pub olabel: Label,
    pub weight: W,
    pub nextstate: StateId,
}

impl<W> Arc<W> {
    pub fn new(ilabel: Label, olabel: Label, weight: W, nextstate: StateId) -> Self {
        Self {
            ilabel,
            olabel,
            weight,
            nextstate,
        }
    }

    /// True if both labels are epsilon.
    #[inline]
    pub fn is_epsilon(&self) -> bool {
        self.ilabel == EPSILON && self.olabel == EPSILON
    }
}

impl<W: Semiring> Arc<W> {
    /// Epsilon arc with weight `one()`.
    pub fn epsilon(nextstate: StateId) -> Self {
        Self::new(EPSILON, EPSILON, W::one(), nextstate)
    }

    /// The pseudo-arc `(0, 0, weight, NO_STATE_ID)` through which mappers see
    /// a state's final weight.
    pub fn final_pseudo(weight: W) -> Self {
        Self::new(EPSILON, EPSILON, weight, NO_STATE_ID)
    }
}

impl<W: fmt::Display> fmt::Display for Arc<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{} -> {}",
            self.ilabel, self.olabel, self.weight, self.nextstate
        )
    }
}
