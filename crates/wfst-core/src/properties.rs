// Structural property bitmask and the functions that transfer it across
// operations.
//
// Bits 0-2 are binary (always known). From bit 16 up, properties come in
// pairs: a positive bit and its negation. If neither bit of a pair is set the
// property is unknown.

use bitflags::bitflags;

use crate::arc::{Arc, EPSILON, StateId};
use crate::weight::Semiring;

bitflags! {
    /// Cached structural facts about an automaton.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FstProperties: u64 {
        /// State count is known in O(1).
        const EXPANDED            = 0x0000_0000_0001;
        /// Supports in-place mutation.
        const MUTABLE             = 0x0000_0000_0002;
        /// A non-recoverable error was recorded. Sticky.
        const ERROR               = 0x0000_0000_0004;
        /// Every arc has equal input and output labels.
        const ACCEPTOR            = 0x0000_0001_0000;
        const NOT_ACCEPTOR        = 0x0000_0002_0000;
        /// No two arcs leaving a state share an input label.
        const I_DETERMINISTIC     = 0x0000_0004_0000;
        const NON_I_DETERMINISTIC = 0x0000_0008_0000;
        /// No two arcs leaving a state share an output label.
        const O_DETERMINISTIC     = 0x0000_0010_0000;
        const NON_O_DETERMINISTIC = 0x0000_0020_0000;
        /// Some arc has epsilon on both sides.
        const EPSILONS            = 0x0000_0040_0000;
        const NO_EPSILONS         = 0x0000_0080_0000;
        /// Some arc has an epsilon input label.
        const I_EPSILONS          = 0x0000_0100_0000;
        const NO_I_EPSILONS       = 0x0000_0200_0000;
        /// Some arc has an epsilon output label.
        const O_EPSILONS          = 0x0000_0400_0000;
        const NO_O_EPSILONS       = 0x0000_0800_0000;
        /// Arcs of every state are sorted by input label.
        const I_LABEL_SORTED      = 0x0000_1000_0000;
        const NOT_I_LABEL_SORTED  = 0x0000_2000_0000;
        /// Arcs of every state are sorted by output label.
        const O_LABEL_SORTED      = 0x0000_4000_0000;
        const NOT_O_LABEL_SORTED  = 0x0000_8000_0000;
        /// Some arc or final weight is neither `zero()` nor `one()`.
        const WEIGHTED            = 0x0001_0000_0000;
        const UNWEIGHTED          = 0x0002_0000_0000;
        const CYCLIC              = 0x0004_0000_0000;
        const ACYCLIC             = 0x0008_0000_0000;
        /// The start state lies on a cycle.
        const INITIAL_CYCLIC      = 0x0010_0000_0000;
        const INITIAL_ACYCLIC     = 0x0020_0000_0000;
        /// Every arc goes from a lower to a higher state id.
        const TOP_SORTED          = 0x0040_0000_0000;
        const NOT_TOP_SORTED      = 0x0080_0000_0000;
        /// Every state is reachable from the start.
        const ACCESSIBLE          = 0x0100_0000_0000;
        const NOT_ACCESSIBLE      = 0x0200_0000_0000;
        /// Every state reaches a final state.
        const COACCESSIBLE        = 0x0400_0000_0000;
        const NOT_COACCESSIBLE    = 0x0800_0000_0000;
        /// Accepts a single path.
        const STRING              = 0x1000_0000_0000;
        const NOT_STRING          = 0x2000_0000_0000;
        /// Some cycle carries a weight other than `one()`.
        const WEIGHTED_CYCLES     = 0x4000_0000_0000;
        const UNWEIGHTED_CYCLES   = 0x8000_0000_0000;
    }
}

const fn mask(flags: &[FstProperties]) -> FstProperties {
    let mut bits = 0;
    let mut i = 0;
    while i < flags.len() {
        bits |= flags[i].bits();
        i += 1;
    }
    FstProperties::from_bits_retain(bits)
}

type P = FstProperties;

impl FstProperties {
    pub const BINARY: Self = Self::from_bits_retain(0x0000_0000_0000_0007);
    pub const TRINARY: Self = Self::from_bits_retain(0x0000_ffff_ffff_0000);
    pub const POS_TRINARY: Self =
        Self::from_bits_retain(0x0000_ffff_ffff_0000 & 0x5555_5555_5555_5555);
    pub const NEG_TRINARY: Self =
        Self::from_bits_retain(0x0000_ffff_ffff_0000 & 0xaaaa_aaaa_aaaa_aaaa);
    pub const ALL: Self = Self::BINARY.union(Self::TRINARY);

    /// Properties that are copied when an automaton is copied.
    pub const COPY: Self = Self::ERROR.union(Self::TRINARY);
    /// Properties that depend only on the automaton's structure.
    pub const INTRINSIC: Self = mask(&[P::EXPANDED, P::MUTABLE, P::TRINARY]);
    /// Properties that depend on how the automaton was produced.
    pub const EXTRINSIC: Self = P::ERROR;

    /// Properties of the empty automaton.
    pub const NULL: Self = mask(&[
        P::ACCEPTOR,
        P::I_DETERMINISTIC,
        P::O_DETERMINISTIC,
        P::NO_EPSILONS,
        P::NO_I_EPSILONS,
        P::NO_O_EPSILONS,
        P::I_LABEL_SORTED,
        P::O_LABEL_SORTED,
        P::UNWEIGHTED,
        P::ACYCLIC,
        P::INITIAL_ACYCLIC,
        P::TOP_SORTED,
        P::ACCESSIBLE,
        P::COACCESSIBLE,
        P::STRING,
        P::UNWEIGHTED_CYCLES,
    ]);

    /// Preserved by changing the start state.
    pub const SET_START: Self = mask(&[
        P::BINARY,
        P::ACCEPTOR,
        P::NOT_ACCEPTOR,
        P::I_DETERMINISTIC,
        P::NON_I_DETERMINISTIC,
        P::O_DETERMINISTIC,
        P::NON_O_DETERMINISTIC,
        P::EPSILONS,
        P::NO_EPSILONS,
        P::I_EPSILONS,
        P::NO_I_EPSILONS,
        P::O_EPSILONS,
        P::NO_O_EPSILONS,
        P::I_LABEL_SORTED,
        P::NOT_I_LABEL_SORTED,
        P::O_LABEL_SORTED,
        P::NOT_O_LABEL_SORTED,
        P::WEIGHTED,
        P::UNWEIGHTED,
        P::CYCLIC,
        P::ACYCLIC,
        P::TOP_SORTED,
        P::NOT_TOP_SORTED,
        P::COACCESSIBLE,
        P::NOT_COACCESSIBLE,
        P::WEIGHTED_CYCLES,
        P::UNWEIGHTED_CYCLES,
    ]);

    /// Preserved by changing a final weight (weightedness handled separately).
    pub const SET_FINAL: Self = mask(&[
        P::BINARY,
        P::ACCEPTOR,
        P::NOT_ACCEPTOR,
        P::I_DETERMINISTIC,
        P::NON_I_DETERMINISTIC,
        P::O_DETERMINISTIC,
        P::NON_O_DETERMINISTIC,
        P::EPSILONS,
        P::NO_EPSILONS,
        P::I_EPSILONS,
        P::NO_I_EPSILONS,
        P::O_EPSILONS,
        P::NO_O_EPSILONS,
        P::I_LABEL_SORTED,
        P::NOT_I_LABEL_SORTED,
        P::O_LABEL_SORTED,
        P::NOT_O_LABEL_SORTED,
        P::CYCLIC,
        P::ACYCLIC,
        P::INITIAL_CYCLIC,
        P::INITIAL_ACYCLIC,
        P::TOP_SORTED,
        P::NOT_TOP_SORTED,
        P::ACCESSIBLE,
        P::NOT_ACCESSIBLE,
        P::WEIGHTED_CYCLES,
        P::UNWEIGHTED_CYCLES,
    ]);

    /// Preserved by adding a (disconnected) state.
    pub const ADD_STATE: Self = mask(&[
        P::BINARY,
        P::ACCEPTOR,
        P::NOT_ACCEPTOR,
        P::I_DETERMINISTIC,
        P::NON_I_DETERMINISTIC,
        P::O_DETERMINISTIC,
        P::NON_O_DETERMINISTIC,
        P::EPSILONS,
        P::NO_EPSILONS,
        P::I_EPSILONS,
        P::NO_I_EPSILONS,
        P::O_EPSILONS,
        P::NO_O_EPSILONS,
        P::I_LABEL_SORTED,
        P::NOT_I_LABEL_SORTED,
        P::O_LABEL_SORTED,
        P::NOT_O_LABEL_SORTED,
        P::WEIGHTED,
        P::UNWEIGHTED,
        P::CYCLIC,
        P::ACYCLIC,
        P::INITIAL_CYCLIC,
        P::INITIAL_ACYCLIC,
        P::TOP_SORTED,
        P::NOT_TOP_SORTED,
        P::NOT_ACCESSIBLE,
        P::NOT_COACCESSIBLE,
        P::NOT_STRING,
        P::WEIGHTED_CYCLES,
        P::UNWEIGHTED_CYCLES,
    ]);

    /// Preserved (or only made "more negative") by adding an arc.
    pub const ADD_ARC: Self = mask(&[
        P::BINARY,
        P::NOT_ACCEPTOR,
        P::NON_I_DETERMINISTIC,
        P::NON_O_DETERMINISTIC,
        P::EPSILONS,
        P::I_EPSILONS,
        P::O_EPSILONS,
        P::NOT_I_LABEL_SORTED,
        P::NOT_O_LABEL_SORTED,
        P::WEIGHTED,
        P::CYCLIC,
        P::INITIAL_CYCLIC,
        P::NOT_TOP_SORTED,
        P::ACCESSIBLE,
        P::COACCESSIBLE,
        P::WEIGHTED_CYCLES,
    ]);

    /// Preserved by replacing an arc in place.
    pub const SET_ARC: Self = P::BINARY;

    /// Preserved by deleting states.
    pub const DELETE_STATES: Self = mask(&[
        P::BINARY,
        P::ACCEPTOR,
        P::I_DETERMINISTIC,
        P::O_DETERMINISTIC,
        P::NO_EPSILONS,
        P::NO_I_EPSILONS,
        P::NO_O_EPSILONS,
        P::I_LABEL_SORTED,
        P::O_LABEL_SORTED,
        P::UNWEIGHTED,
        P::ACYCLIC,
        P::INITIAL_ACYCLIC,
        P::TOP_SORTED,
        P::UNWEIGHTED_CYCLES,
    ]);

    /// Preserved by deleting arcs.
    pub const DELETE_ARCS: Self = P::DELETE_STATES;

    /// Preserved by any change to input labels.
    pub const I_LABEL_INVARIANT: Self = mask(&[
        P::BINARY,
        P::O_DETERMINISTIC,
        P::NON_O_DETERMINISTIC,
        P::O_EPSILONS,
        P::NO_O_EPSILONS,
        P::O_LABEL_SORTED,
        P::NOT_O_LABEL_SORTED,
        P::WEIGHTED,
        P::UNWEIGHTED,
        P::CYCLIC,
        P::ACYCLIC,
        P::INITIAL_CYCLIC,
        P::INITIAL_ACYCLIC,
        P::TOP_SORTED,
        P::NOT_TOP_SORTED,
        P::ACCESSIBLE,
        P::NOT_ACCESSIBLE,
        P::COACCESSIBLE,
        P::NOT_COACCESSIBLE,
        P::STRING,
        P::NOT_STRING,
        P::WEIGHTED_CYCLES,
        P::UNWEIGHTED_CYCLES,
    ]);

    /// Preserved by any change to output labels.
    pub const O_LABEL_INVARIANT: Self = mask(&[
        P::BINARY,
        P::I_DETERMINISTIC,
        P::NON_I_DETERMINISTIC,
        P::I_EPSILONS,
        P::NO_I_EPSILONS,
        P::I_LABEL_SORTED,
        P::NOT_I_LABEL_SORTED,
        P::WEIGHTED,
        P::UNWEIGHTED,
        P::CYCLIC,
        P::ACYCLIC,
        P::INITIAL_CYCLIC,
        P::INITIAL_ACYCLIC,
        P::TOP_SORTED,
        P::NOT_TOP_SORTED,
        P::ACCESSIBLE,
        P::NOT_ACCESSIBLE,
        P::COACCESSIBLE,
        P::NOT_COACCESSIBLE,
        P::STRING,
        P::NOT_STRING,
        P::WEIGHTED_CYCLES,
        P::UNWEIGHTED_CYCLES,
    ]);

    /// Preserved by any change to weights.
    pub const WEIGHT_INVARIANT: Self = mask(&[
        P::BINARY,
        P::ACCEPTOR,
        P::NOT_ACCEPTOR,
        P::I_DETERMINISTIC,
        P::NON_I_DETERMINISTIC,
        P::O_DETERMINISTIC,
        P::NON_O_DETERMINISTIC,
        P::EPSILONS,
        P::NO_EPSILONS,
        P::I_EPSILONS,
        P::NO_I_EPSILONS,
        P::O_EPSILONS,
        P::NO_O_EPSILONS,
        P::I_LABEL_SORTED,
        P::NOT_I_LABEL_SORTED,
        P::O_LABEL_SORTED,
        P::NOT_O_LABEL_SORTED,
        P::CYCLIC,
        P::ACYCLIC,
        P::INITIAL_CYCLIC,
        P::INITIAL_ACYCLIC,
        P::TOP_SORTED,
        P::NOT_TOP_SORTED,
        P::ACCESSIBLE,
        P::NOT_ACCESSIBLE,
        P::COACCESSIBLE,
        P::NOT_COACCESSIBLE,
        P::STRING,
        P::NOT_STRING,
    ]);

    /// Preserved (or only made "more negative") by routing final weights
    /// through a new superfinal state.
    pub const ADD_SUPERFINAL: Self = mask(&[
        P::BINARY,
        P::ACCEPTOR,
        P::NOT_ACCEPTOR,
        P::NON_I_DETERMINISTIC,
        P::NON_O_DETERMINISTIC,
        P::EPSILONS,
        P::I_EPSILONS,
        P::O_EPSILONS,
        P::NOT_I_LABEL_SORTED,
        P::NOT_O_LABEL_SORTED,
        P::WEIGHTED,
        P::UNWEIGHTED,
        P::CYCLIC,
        P::ACYCLIC,
        P::INITIAL_CYCLIC,
        P::INITIAL_ACYCLIC,
        P::NOT_TOP_SORTED,
        P::NOT_ACCESSIBLE,
        P::COACCESSIBLE,
        P::NOT_COACCESSIBLE,
        P::NOT_STRING,
        P::WEIGHTED_CYCLES,
        P::UNWEIGHTED_CYCLES,
    ]);

    /// The bits whose value is known: all binary bits, plus both bits of every
    /// trinary pair where one of the two is set.
    pub fn known(self) -> Self {
        let pos = self.bits() & Self::POS_TRINARY.bits();
        let neg = self.bits() & Self::NEG_TRINARY.bits();
        Self::from_bits_retain(Self::BINARY.bits() | pos | (pos << 1) | neg | (neg >> 1))
    }

    /// Sets the bits selected by `mask` to their value in `props`.
    #[must_use]
    pub fn with(self, props: Self, mask: Self) -> Self {
        (self & !mask) | (props & mask)
    }
}

/// True if two masks agree on every trinary bit known to both.
pub fn compat_properties(props1: FstProperties, props2: FstProperties) -> bool {
    let known = props1.known() & props2.known() & FstProperties::TRINARY;
    ((props1 ^ props2) & known).is_empty()
}

pub fn set_start_properties(inprops: FstProperties) -> FstProperties {
    let mut outprops = inprops & FstProperties::SET_START;
    if inprops.contains(FstProperties::ACYCLIC) {
        outprops |= FstProperties::INITIAL_ACYCLIC;
    }
    outprops
}

pub fn set_final_properties<W: Semiring>(
    inprops: FstProperties,
    old_weight: &W,
    new_weight: &W,
) -> FstProperties {
    let mut outprops = inprops;
    if !old_weight.is_zero() && !old_weight.is_one() {
        outprops.remove(FstProperties::WEIGHTED);
    }
    if !new_weight.is_zero() && !new_weight.is_one() {
        outprops.insert(FstProperties::WEIGHTED);
        outprops.remove(FstProperties::UNWEIGHTED);
    }
    outprops & (FstProperties::SET_FINAL | FstProperties::WEIGHTED | FstProperties::UNWEIGHTED)
}

pub fn add_state_properties(inprops: FstProperties) -> FstProperties {
    inprops & FstProperties::ADD_STATE
}

/// Properties after adding `arc` to `state`, where `prev_arc` is the arc
/// previously last on that state.
pub fn add_arc_properties<W: Semiring>(
    inprops: FstProperties,
    state: StateId,
    arc: &Arc<W>,
    prev_arc: Option<&Arc<W>>,
) -> FstProperties {
    let mut outprops = inprops;
    if arc.ilabel != arc.olabel {
        outprops.insert(P::NOT_ACCEPTOR);
        outprops.remove(P::ACCEPTOR);
    }
    if arc.ilabel == EPSILON {
        outprops.insert(P::I_EPSILONS);
        outprops.remove(P::NO_I_EPSILONS);
        if arc.olabel == EPSILON {
            outprops.insert(P::EPSILONS);
            outprops.remove(P::NO_EPSILONS);
        }
    }
    if arc.olabel == EPSILON {
        outprops.insert(P::O_EPSILONS);
        outprops.remove(P::NO_O_EPSILONS);
    }
    if let Some(prev) = prev_arc {
        if prev.ilabel > arc.ilabel {
            outprops.insert(P::NOT_I_LABEL_SORTED);
            outprops.remove(P::I_LABEL_SORTED);
        }
        if prev.olabel > arc.olabel {
            outprops.insert(P::NOT_O_LABEL_SORTED);
            outprops.remove(P::O_LABEL_SORTED);
        }
    }
    if !arc.weight.is_zero() && !arc.weight.is_one() {
        outprops.insert(P::WEIGHTED);
        outprops.remove(P::UNWEIGHTED);
    }
    if arc.nextstate <= state {
        outprops.insert(P::NOT_TOP_SORTED);
        outprops.remove(P::TOP_SORTED);
    }
    outprops &= mask(&[
        P::ADD_ARC,
        P::ACCEPTOR,
        P::NO_EPSILONS,
        P::NO_I_EPSILONS,
        P::NO_O_EPSILONS,
        P::I_LABEL_SORTED,
        P::O_LABEL_SORTED,
        P::UNWEIGHTED,
        P::TOP_SORTED,
    ]);
    if outprops.contains(P::TOP_SORTED) {
        outprops |= P::ACYCLIC | P::INITIAL_ACYCLIC;
    }
    outprops
}

/// Properties after replacing `old` with `new` in place.
pub fn set_arc_properties<W: Semiring>(
    inprops: FstProperties,
    old: &Arc<W>,
    new: &Arc<W>,
) -> FstProperties {
    let mut outprops = inprops;
    if old.ilabel != old.olabel {
        outprops.remove(P::NOT_ACCEPTOR);
    }
    if old.ilabel == EPSILON {
        outprops.remove(P::I_EPSILONS);
        if old.olabel == EPSILON {
            outprops.remove(P::EPSILONS);
        }
    }
    if old.olabel == EPSILON {
        outprops.remove(P::O_EPSILONS);
    }
    if !old.weight.is_zero() && !old.weight.is_one() {
        outprops.remove(P::WEIGHTED);
    }
    if new.ilabel != new.olabel {
        outprops.insert(P::NOT_ACCEPTOR);
        outprops.remove(P::ACCEPTOR);
    }
    if new.ilabel == EPSILON {
        outprops.insert(P::I_EPSILONS);
        outprops.remove(P::NO_I_EPSILONS);
        if new.olabel == EPSILON {
            outprops.insert(P::EPSILONS);
            outprops.remove(P::NO_EPSILONS);
        }
    }
    if new.olabel == EPSILON {
        outprops.insert(P::O_EPSILONS);
        outprops.remove(P::NO_O_EPSILONS);
    }
    if !new.weight.is_zero() && !new.weight.is_one() {
        outprops.insert(P::WEIGHTED);
        outprops.remove(P::UNWEIGHTED);
    }
    outprops
        & mask(&[
            P::SET_ARC,
            P::ACCEPTOR,
            P::NOT_ACCEPTOR,
            P::EPSILONS,
            P::NO_EPSILONS,
            P::I_EPSILONS,
            P::NO_I_EPSILONS,
            P::O_EPSILONS,
            P::NO_O_EPSILONS,
            P::WEIGHTED,
            P::UNWEIGHTED,
        ])
}

pub fn delete_states_properties(inprops: FstProperties) -> FstProperties {
    inprops & FstProperties::DELETE_STATES
}

pub fn delete_arcs_properties(inprops: FstProperties) -> FstProperties {
    inprops & FstProperties::DELETE_ARCS
}

/// Properties of the union of two automata.
///
/// Both operands are reached from the result's start state through new
/// epsilon arcs, and that start state never lies on a cycle. `delayed` is set
/// for the on-the-fly union, whose operands may turn out to be empty.
pub fn union_properties(
    inprops1: FstProperties,
    inprops2: FstProperties,
    delayed: bool,
) -> FstProperties {
    let both = inprops1 & inprops2;
    let either = inprops1 | inprops2;

    let mut outprops = both
        & (P::ACCEPTOR | P::UNWEIGHTED | P::UNWEIGHTED_CYCLES | P::ACYCLIC | P::ACCESSIBLE);
    outprops |= either & P::ERROR;
    outprops |= P::INITIAL_ACYCLIC;
    outprops |= either
        & mask(&[
            P::NOT_ACCEPTOR,
            P::NON_I_DETERMINISTIC,
            P::NON_O_DETERMINISTIC,
            P::NOT_I_LABEL_SORTED,
            P::NOT_O_LABEL_SORTED,
            P::WEIGHTED,
            P::WEIGHTED_CYCLES,
            P::CYCLIC,
            P::NOT_ACCESSIBLE,
            P::NOT_COACCESSIBLE,
        ]);
    // A delayed union may have no operand to send an epsilon arc to.
    if delayed {
        outprops |= either & (P::EPSILONS | P::I_EPSILONS | P::O_EPSILONS);
    } else {
        outprops |= P::EPSILONS | P::I_EPSILONS | P::O_EPSILONS;
        outprops |= inprops1 & (P::EXPANDED | P::MUTABLE);
        outprops |= either & (P::NOT_TOP_SORTED | P::NOT_STRING);
        outprops |= both & P::COACCESSIBLE;
    }
    outprops
}

/// Properties after copying one side's labels onto the other.
pub fn project_properties(inprops: FstProperties, project_input: bool) -> FstProperties {
    let mut outprops = (inprops & P::ERROR) | P::ACCEPTOR;
    outprops |= inprops
        & mask(&[
            P::WEIGHTED,
            P::UNWEIGHTED,
            P::CYCLIC,
            P::ACYCLIC,
            P::INITIAL_CYCLIC,
            P::INITIAL_ACYCLIC,
            P::TOP_SORTED,
            P::NOT_TOP_SORTED,
            P::ACCESSIBLE,
            P::NOT_ACCESSIBLE,
            P::COACCESSIBLE,
            P::NOT_COACCESSIBLE,
            P::STRING,
            P::NOT_STRING,
            P::WEIGHTED_CYCLES,
            P::UNWEIGHTED_CYCLES,
        ]);
    let side = if project_input {
        [
            P::I_DETERMINISTIC,
            P::NON_I_DETERMINISTIC,
            P::I_EPSILONS,
            P::NO_I_EPSILONS,
            P::I_LABEL_SORTED,
            P::NOT_I_LABEL_SORTED,
        ]
    } else {
        [
            P::O_DETERMINISTIC,
            P::NON_O_DETERMINISTIC,
            P::O_EPSILONS,
            P::NO_O_EPSILONS,
            P::O_LABEL_SORTED,
            P::NOT_O_LABEL_SORTED,
        ]
    };
    let both = [
        P::I_DETERMINISTIC | P::O_DETERMINISTIC,
        P::NON_I_DETERMINISTIC | P::NON_O_DETERMINISTIC,
        P::EPSILONS | P::I_EPSILONS | P::O_EPSILONS,
        P::NO_EPSILONS | P::NO_I_EPSILONS | P::NO_O_EPSILONS,
        P::I_LABEL_SORTED | P::O_LABEL_SORTED,
        P::NOT_I_LABEL_SORTED | P::NOT_O_LABEL_SORTED,
    ];
    for (bit, out) in side.into_iter().zip(both) {
        if inprops.contains(bit) {
            outprops |= out;
        }
    }
    outprops
}

/// Properties of the composition (or intersection) of two automata.
pub fn compose_properties(inprops1: FstProperties, inprops2: FstProperties) -> FstProperties {
    let both = inprops1 & inprops2;
    let mut outprops = (inprops1 | inprops2) & P::ERROR;
    if both.contains(P::ACCEPTOR) {
        outprops |= P::ACCEPTOR | P::ACCESSIBLE;
        outprops |= both
            & (P::NO_EPSILONS
                | P::NO_I_EPSILONS
                | P::NO_O_EPSILONS
                | P::ACYCLIC
                | P::INITIAL_ACYCLIC);
        if both.contains(P::NO_I_EPSILONS) {
            outprops |= both & (P::I_DETERMINISTIC | P::O_DETERMINISTIC);
        }
    } else {
        outprops |= P::ACCESSIBLE;
        outprops |= both & (P::ACCEPTOR | P::NO_I_EPSILONS | P::ACYCLIC | P::INITIAL_ACYCLIC);
        if both.contains(P::NO_I_EPSILONS) {
            outprops |= both & P::I_DETERMINISTIC;
        }
    }
    outprops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weight::TropicalWeight;

    #[test]
    fn trinary_masks_split_evenly() {
        assert_eq!(P::POS_TRINARY | P::NEG_TRINARY, P::TRINARY);
        assert!((P::POS_TRINARY & P::NEG_TRINARY).is_empty());
        assert!(P::POS_TRINARY.contains(P::ACCEPTOR));
        assert!(P::NEG_TRINARY.contains(P::NOT_ACCEPTOR));
    }

    #[test]
    fn known_covers_both_bits_of_a_pair() {
        let known = P::ACCEPTOR.known();
        assert!(known.contains(P::ACCEPTOR | P::NOT_ACCEPTOR));
        assert!(known.contains(P::BINARY));
        assert!(!known.contains(P::CYCLIC));

        let known = P::NOT_COACCESSIBLE.known();
        assert!(known.contains(P::COACCESSIBLE));
    }

    #[test]
    fn with_replaces_masked_bits_only() {
        let props = P::ACCEPTOR | P::CYCLIC;
        let out = props.with(P::NOT_ACCEPTOR, P::ACCEPTOR | P::NOT_ACCEPTOR);
        assert_eq!(out, P::NOT_ACCEPTOR | P::CYCLIC);
    }

    #[test]
    fn compat_detects_contradiction() {
        assert!(compat_properties(P::ACCEPTOR, P::ACCEPTOR | P::CYCLIC));
        assert!(!compat_properties(P::ACCEPTOR, P::NOT_ACCEPTOR));
        assert!(compat_properties(P::ACCEPTOR, P::EXPANDED));
    }

    #[test]
    fn add_arc_breaks_acceptor_and_sorting() {
        let props = P::NULL;
        let first = Arc::new(2, 2, TropicalWeight::one(), 1);
        let props = add_arc_properties(props, 0, &first, None);
        assert!(props.contains(P::ACCEPTOR | P::I_LABEL_SORTED | P::TOP_SORTED));
        assert!(props.contains(P::ACYCLIC | P::INITIAL_ACYCLIC));

        let second = Arc::new(1, 3, TropicalWeight(0.5), 0);
        let props = add_arc_properties(props, 0, &second, Some(&first));
        assert!(props.contains(P::NOT_ACCEPTOR));
        assert!(props.contains(P::NOT_I_LABEL_SORTED));
        assert!(props.contains(P::WEIGHTED));
        assert!(props.contains(P::NOT_TOP_SORTED));
        assert!(!props.contains(P::ACYCLIC));
    }

    #[test]
    fn add_epsilon_arc() {
        let eps = Arc::new(0, 0, TropicalWeight::one(), 1);
        let props = add_arc_properties(P::NULL, 0, &eps, None);
        assert!(props.contains(P::EPSILONS | P::I_EPSILONS | P::O_EPSILONS));
        assert!(!props.intersects(P::NO_EPSILONS | P::NO_I_EPSILONS | P::NO_O_EPSILONS));
    }

    #[test]
    fn set_final_tracks_weightedness() {
        let props = P::UNWEIGHTED | P::ACCEPTOR;
        let out = set_final_properties(props, &TropicalWeight::zero(), &TropicalWeight(2.0));
        assert!(out.contains(P::WEIGHTED));
        assert!(!out.contains(P::UNWEIGHTED));
        assert!(out.contains(P::ACCEPTOR));

        let out = set_final_properties(out, &TropicalWeight(2.0), &TropicalWeight::one());
        assert!(!out.contains(P::WEIGHTED));
    }

    #[test]
    fn add_state_drops_positive_reachability() {
        let out = add_state_properties(P::NULL | P::EXPANDED);
        assert!(out.contains(P::EXPANDED | P::ACCEPTOR));
        assert!(!out.intersects(P::ACCESSIBLE | P::COACCESSIBLE | P::STRING));
    }

    #[test]
    fn union_of_acceptors() {
        let a = P::ACCEPTOR | P::ACYCLIC | P::UNWEIGHTED | P::EXPANDED | P::MUTABLE;
        let b = P::ACCEPTOR | P::CYCLIC | P::WEIGHTED;
        let out = union_properties(a, b, false);
        assert!(out.contains(P::ACCEPTOR | P::CYCLIC | P::WEIGHTED | P::EPSILONS));
        assert!(out.contains(P::EXPANDED | P::MUTABLE | P::INITIAL_ACYCLIC));
        assert!(!out.intersects(P::ACYCLIC | P::UNWEIGHTED));
    }

    #[test]
    fn delayed_union_only_inherits_epsilons() {
        let eager = union_properties(P::NULL, P::NULL, false);
        assert!(eager.contains(P::EPSILONS | P::I_EPSILONS | P::O_EPSILONS));
        let delayed = union_properties(P::NULL, P::NULL, true);
        assert!(!delayed.intersects(P::EPSILONS | P::I_EPSILONS | P::O_EPSILONS));
        let delayed = union_properties(P::NULL, P::EPSILONS | P::I_EPSILONS, true);
        assert!(delayed.contains(P::EPSILONS | P::I_EPSILONS));
        assert!(!delayed.contains(P::O_EPSILONS));
    }

    #[test]
    fn union_propagates_error() {
        let out = union_properties(P::ACCEPTOR, P::ACCEPTOR | P::ERROR, true);
        assert!(out.contains(P::ERROR));
        assert!(!out.contains(P::EXPANDED));
    }

    #[test]
    fn set_arc_replaces_evidence() {
        let old = Arc::new(1, 2, TropicalWeight(0.5), 1);
        let props = add_arc_properties(P::NULL, 0, &old, None);
        assert!(props.contains(P::NOT_ACCEPTOR | P::WEIGHTED));

        let new = Arc::new(3, 3, TropicalWeight::one(), 1);
        let out = set_arc_properties(props, &old, &new);
        assert!(!out.intersects(P::NOT_ACCEPTOR | P::WEIGHTED));
        assert!(!out.intersects(P::ACCEPTOR | P::UNWEIGHTED));

        let eps = Arc::new(0, 0, TropicalWeight(2.0), 1);
        let out = set_arc_properties(out, &new, &eps);
        assert!(out.contains(P::EPSILONS | P::I_EPSILONS | P::O_EPSILONS | P::WEIGHTED));
    }

    #[test]
    fn project_input_side() {
        let props = P::NOT_ACCEPTOR
            | P::I_DETERMINISTIC
            | P::NON_O_DETERMINISTIC
            | P::NO_I_EPSILONS
            | P::O_EPSILONS
            | P::ACYCLIC;
        let out = project_properties(props, true);
        assert!(out.contains(P::ACCEPTOR | P::I_DETERMINISTIC | P::O_DETERMINISTIC));
        assert!(out.contains(P::NO_EPSILONS | P::NO_O_EPSILONS | P::ACYCLIC));
        assert!(!out.intersects(P::NOT_ACCEPTOR | P::NON_O_DETERMINISTIC));

        let out = project_properties(props, false);
        assert!(out.contains(P::NON_I_DETERMINISTIC | P::I_EPSILONS | P::EPSILONS));
    }

    #[test]
    fn compose_of_acceptors_is_acceptor() {
        let a = P::ACCEPTOR | P::NO_EPSILONS | P::NO_I_EPSILONS | P::I_DETERMINISTIC;
        let b = a | P::O_DETERMINISTIC;
        let out = compose_properties(a, b);
        assert!(out.contains(P::ACCEPTOR | P::ACCESSIBLE | P::NO_EPSILONS | P::I_DETERMINISTIC));
        assert!(!out.contains(P::O_DETERMINISTIC));

        let out = compose_properties(P::NOT_ACCEPTOR, P::ACCEPTOR | P::ERROR);
        assert!(out.contains(P::ERROR | P::ACCESSIBLE));
        assert!(!out.contains(P::ACCEPTOR));
    }
}
