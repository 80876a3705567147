// Automaton contracts: read-only `Fst`, counted `ExpandedFst` and
// `MutableFst`, plus the blanket impls that let references and shared
// handles stand in for the automaton they point to.

use std::marker::PhantomData;
use std::sync;

use wfst_core::{Arc, EPSILON, FstError, FstProperties, Semiring, StateId, SymbolTable};

use crate::config::CopyMode;
use crate::props;

/// Out-arcs of one state, in storage order.
///
/// Arc lists are reference counted so lazy caches and vector storage can hand
/// them out without copying.
pub type ArcList<W> = sync::Arc<Vec<Arc<W>>>;

/// Read contract of a weighted automaton.
///
/// Methods take `&self` even on lazy implementations, which fill their
/// caches behind a lock. Querying a state id the automaton never produced is
/// answered as if the state had no arcs and a `zero()` final weight.
pub trait Fst<W: Semiring> {
    /// The start state, or `None` for the empty automaton.
    fn start(&self) -> Option<StateId>;

    /// Final weight of `state`; `zero()` if not final.
    fn final_weight(&self, state: StateId) -> W;

    /// Out-arcs of `state`.
    fn arcs(&self, state: StateId) -> ArcList<W>;

    fn num_arcs(&self, state: StateId) -> usize {
        self.arcs(state).len()
    }

    fn num_input_epsilons(&self, state: StateId) -> usize {
        self.arcs(state).iter().filter(|a| a.ilabel == EPSILON).count()
    }

    fn num_output_epsilons(&self, state: StateId) -> usize {
        self.arcs(state).iter().filter(|a| a.olabel == EPSILON).count()
    }

    /// Property bits known without any traversal.
    fn stored_properties(&self) -> FstProperties;

    /// Records bits learned by a traversal. Storage that cannot cache them
    /// ignores the call.
    fn update_properties(&self, _props: FstProperties) {}

    /// Properties selected by `mask`.
    ///
    /// With `compute` set, trinary bits in `mask` that are not yet known are
    /// determined by a full traversal and cached. Otherwise only stored bits
    /// are returned, and an unknown property simply reads as unset.
    fn properties(&self, mask: FstProperties, compute: bool) -> FstProperties {
        let stored = self.stored_properties();
        let wanted = mask & FstProperties::TRINARY;
        if !compute || stored.known().contains(wanted) {
            return stored & mask;
        }
        let computed = props::compute_properties(self);
        let merged = stored.with(computed, FstProperties::TRINARY);
        self.update_properties(merged);
        merged & mask
    }

    /// O(1) state count, when the implementation knows it.
    fn num_states_if_known(&self) -> Option<usize> {
        None
    }

    /// All state ids, in increasing order.
    fn states(&self) -> Box<dyn Iterator<Item = StateId> + '_> {
        Box::new(DiscoveredStates::new(self))
    }

    fn input_symbols(&self) -> Option<sync::Arc<SymbolTable>>;

    fn output_symbols(&self) -> Option<sync::Arc<SymbolTable>>;

    /// Short name of the implementation, for diagnostics.
    fn fst_type(&self) -> &'static str;

    fn is_final(&self, state: StateId) -> bool {
        !self.final_weight(state).is_zero()
    }
}

/// An automaton whose state count is known in O(1).
pub trait ExpandedFst<W: Semiring>: Fst<W> {
    fn num_states(&self) -> usize;
}

/// An automaton that supports in-place edits.
///
/// Every mutator keeps the stored property mask consistent with the edit.
pub trait MutableFst<W: Semiring>: ExpandedFst<W> {
    fn add_state(&mut self) -> StateId;

    fn add_states(&mut self, n: usize) {
        for _ in 0..n {
            self.add_state();
        }
    }

    fn reserve_states(&mut self, _n: usize) {}

    fn reserve_arcs(&mut self, state: StateId, n: usize) -> Result<(), FstError>;

    fn set_start(&mut self, state: StateId) -> Result<(), FstError>;

    fn set_final(&mut self, state: StateId, weight: W) -> Result<(), FstError>;

    fn add_arc(&mut self, state: StateId, arc: Arc<W>) -> Result<(), FstError>;

    /// Replaces the `index`-th arc of `state`.
    fn set_arc(&mut self, state: StateId, index: usize, arc: Arc<W>) -> Result<(), FstError>;

    fn delete_arcs(&mut self, state: StateId) -> Result<(), FstError>;

    /// Removes every state.
    fn delete_states(&mut self);

    /// Removes the given states, renumbering the survivors in order and
    /// dropping arcs into removed states.
    fn delete_state_set(&mut self, states: &[StateId]);

    /// Sets the bits selected by `mask` to their value in `props`.
    fn set_properties(&mut self, props: FstProperties, mask: FstProperties);

    fn set_input_symbols(&mut self, symbols: Option<sync::Arc<SymbolTable>>);

    fn set_output_symbols(&mut self, symbols: Option<sync::Arc<SymbolTable>>);
}

/// Cloning with an explicit sharing policy.
pub trait CopyFst {
    fn copy(&self, mode: CopyMode) -> Self;
}

/// State count, walking the automaton if the count is not known.
pub fn count_states<W: Semiring, F: Fst<W> + ?Sized>(fst: &F) -> usize {
    fst.num_states_if_known()
        .unwrap_or_else(|| fst.states().count())
}

/// Total arc count over all states.
pub fn count_arcs<W: Semiring, F: Fst<W> + ?Sized>(fst: &F) -> usize {
    fst.states().map(|s| fst.num_arcs(s)).sum()
}

/// State-id iterator for automata that only learn their states by expansion.
///
/// Yields `0..known`, where `known` starts just past the start state and
/// grows with the next-states of arcs seen while expanding states in order.
pub struct DiscoveredStates<'a, W, F: ?Sized> {
    fst: &'a F,
    next: StateId,
    expanded: StateId,
    known: Option<usize>,
    _weight: PhantomData<fn() -> W>,
}

impl<'a, W: Semiring, F: Fst<W> + ?Sized> DiscoveredStates<'a, W, F> {
    pub fn new(fst: &'a F) -> Self {
        Self {
            fst,
            next: 0,
            expanded: 0,
            known: None,
            _weight: PhantomData,
        }
    }
}

impl<W: Semiring, F: Fst<W> + ?Sized> Iterator for DiscoveredStates<'_, W, F> {
    type Item = StateId;

    fn next(&mut self) -> Option<StateId> {
        let fst = self.fst;
        let known = self
            .known
            .get_or_insert_with(|| fst.start().map_or(0, |s| s as usize + 1));
        while self.next as usize >= *known && (self.expanded as usize) < *known {
            for arc in fst.arcs(self.expanded).iter() {
                *known = (*known).max(arc.nextstate as usize + 1);
            }
            self.expanded += 1;
        }
        if (self.next as usize) < *known {
            let state = self.next;
            self.next += 1;
            Some(state)
        } else {
            None
        }
    }
}

macro_rules! forward_fst {
    () => {
        fn start(&self) -> Option<StateId> {
            (**self).start()
        }

        fn final_weight(&self, state: StateId) -> W {
            (**self).final_weight(state)
        }

        fn arcs(&self, state: StateId) -> ArcList<W> {
            (**self).arcs(state)
        }

        fn num_arcs(&self, state: StateId) -> usize {
            (**self).num_arcs(state)
        }

        fn num_input_epsilons(&self, state: StateId) -> usize {
            (**self).num_input_epsilons(state)
        }

        fn num_output_epsilons(&self, state: StateId) -> usize {
            (**self).num_output_epsilons(state)
        }

        fn stored_properties(&self) -> FstProperties {
            (**self).stored_properties()
        }

        fn update_properties(&self, props: FstProperties) {
            (**self).update_properties(props)
        }

        fn properties(&self, mask: FstProperties, compute: bool) -> FstProperties {
            (**self).properties(mask, compute)
        }

        fn num_states_if_known(&self) -> Option<usize> {
            (**self).num_states_if_known()
        }

        fn states(&self) -> Box<dyn Iterator<Item = StateId> + '_> {
            (**self).states()
        }

        fn input_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
            (**self).input_symbols()
        }

        fn output_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
            (**self).output_symbols()
        }

        fn fst_type(&self) -> &'static str {
            (**self).fst_type()
        }

        fn is_final(&self, state: StateId) -> bool {
            (**self).is_final(state)
        }
    };
}

impl<W: Semiring, F: Fst<W> + ?Sized> Fst<W> for &F {
    forward_fst!();
}

impl<W: Semiring, F: Fst<W> + ?Sized> Fst<W> for sync::Arc<F> {
    forward_fst!();
}

impl<W: Semiring, F: Fst<W> + ?Sized> Fst<W> for Box<F> {
    forward_fst!();
}

impl<W: Semiring, F: ExpandedFst<W> + ?Sized> ExpandedFst<W> for &F {
    fn num_states(&self) -> usize {
        (**self).num_states()
    }
}

impl<W: Semiring, F: ExpandedFst<W> + ?Sized> ExpandedFst<W> for sync::Arc<F> {
    fn num_states(&self) -> usize {
        (**self).num_states()
    }
}

/// A borrow can only be copied as the same borrow, so `CopyMode::Safe` still
/// shares the referent and its cache. Lazy automata lock their cache on every
/// read, which keeps this sound; callers wanting an independent cache copy
/// the referent itself.
impl<F: ?Sized> CopyFst for &F {
    fn copy(&self, _mode: CopyMode) -> Self {
        self
    }
}

impl<F: CopyFst> CopyFst for sync::Arc<F> {
    fn copy(&self, mode: CopyMode) -> Self {
        match mode {
            CopyMode::Shared => sync::Arc::clone(self),
            CopyMode::Safe => sync::Arc::new((**self).copy(mode)),
        }
    }
}
