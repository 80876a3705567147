// On-demand expansion engine shared by every lazy automaton.
//
// A lazy automaton is an `FstOp` (how to compute the start state, a final
// weight, or a state's arcs) plus an `FstCache` that remembers every answer.
// Both live behind one `parking_lot::Mutex` inside a reference-counted
// handle, so read methods take `&self` and clones share the cache.

use std::hash::Hash;
use std::sync;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::trace;

use wfst_core::{Arc, EPSILON, FstProperties, Semiring, StateId};

use crate::fst::ArcList;

/// The computation behind a lazy automaton.
///
/// Each method is called at most once per state by [`LazyFst`]; results are
/// cached and never recomputed.
pub trait FstOp<W: Semiring> {
    /// Short name reported as the automaton type.
    const TYPE: &'static str;

    fn compute_start(&mut self) -> Option<StateId>;

    fn compute_final(&mut self, state: StateId) -> W;

    fn compute_arcs(&mut self, state: StateId) -> Vec<Arc<W>>;

    /// Property bits known so far, including any error found while expanding.
    fn properties(&self) -> FstProperties;
}

#[derive(Debug, Clone)]
struct CacheState<W> {
    final_weight: Option<W>,
    arcs: Option<ArcList<W>>,
    niepsilons: usize,
    noepsilons: usize,
}

impl<W> Default for CacheState<W> {
    fn default() -> Self {
        Self {
            final_weight: None,
            arcs: None,
            niepsilons: 0,
            noepsilons: 0,
        }
    }
}

/// Memoized start state, final weights and arc lists.
///
/// "Not computed yet" and "computed as `zero()`" are distinct: a final
/// weight is `Some(zero)` once resolved.
#[derive(Debug, Clone)]
pub struct FstCache<W> {
    start: Option<Option<StateId>>,
    states: Vec<CacheState<W>>,
    nknown: usize,
}

impl<W> Default for FstCache<W> {
    fn default() -> Self {
        Self {
            start: None,
            states: Vec::new(),
            nknown: 0,
        }
    }
}

impl<W: Semiring> FstCache<W> {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self, state: StateId) -> &mut CacheState<W> {
        let index = state as usize;
        if self.states.len() <= index {
            self.states.resize_with(index + 1, CacheState::default);
        }
        &mut self.states[index]
    }

    fn note(&mut self, state: StateId) {
        self.nknown = self.nknown.max(state as usize + 1);
    }

    pub fn start(&self) -> Option<Option<StateId>> {
        self.start
    }

    pub fn set_start(&mut self, start: Option<StateId>) {
        self.start = Some(start);
        if let Some(s) = start {
            self.note(s);
        }
    }

    pub fn final_weight(&self, state: StateId) -> Option<&W> {
        self.states.get(state as usize)?.final_weight.as_ref()
    }

    pub fn set_final(&mut self, state: StateId, weight: W) {
        self.note(state);
        self.state_mut(state).final_weight = Some(weight);
    }

    pub fn arcs(&self, state: StateId) -> Option<&ArcList<W>> {
        self.states.get(state as usize)?.arcs.as_ref()
    }

    /// Stores the arcs of `state` and returns the shared list.
    pub fn set_arcs(&mut self, state: StateId, arcs: Vec<Arc<W>>) -> ArcList<W> {
        self.note(state);
        for arc in &arcs {
            self.note(arc.nextstate);
        }
        let niepsilons = arcs.iter().filter(|a| a.ilabel == EPSILON).count();
        let noepsilons = arcs.iter().filter(|a| a.olabel == EPSILON).count();
        let list = sync::Arc::new(arcs);
        let entry = self.state_mut(state);
        entry.arcs = Some(sync::Arc::clone(&list));
        entry.niepsilons = niepsilons;
        entry.noepsilons = noepsilons;
        list
    }

    pub fn has_final(&self, state: StateId) -> bool {
        self.final_weight(state).is_some()
    }

    pub fn has_arcs(&self, state: StateId) -> bool {
        self.arcs(state).is_some()
    }

    /// One past the highest state id seen so far.
    pub fn num_known_states(&self) -> usize {
        self.nknown
    }

    /// Number of states whose arcs have been computed.
    pub fn num_expanded(&self) -> usize {
        self.states.iter().filter(|s| s.arcs.is_some()).count()
    }
}

/// Dense state ids for the tuples a lazy operation discovers, in discovery
/// order.
#[derive(Debug, Clone)]
pub struct StateTable<T> {
    tuples: Vec<T>,
    ids: HashMap<T, StateId>,
}

impl<T> Default for StateTable<T> {
    fn default() -> Self {
        Self {
            tuples: Vec::new(),
            ids: HashMap::new(),
        }
    }
}

impl<T: Hash + Eq + Clone> StateTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `tuple`, assigning the next free id the first time it is seen.
    pub fn find_id(&mut self, tuple: T) -> StateId {
        if let Some(&id) = self.ids.get(&tuple) {
            return id;
        }
        let id = self.tuples.len() as StateId;
        self.tuples.push(tuple.clone());
        self.ids.insert(tuple, id);
        id
    }

    pub fn tuple(&self, id: StateId) -> Option<&T> {
        self.tuples.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

struct LazyImpl<W, Op> {
    cache: FstCache<W>,
    op: Op,
    properties: FstProperties,
}

impl<W: Semiring, Op: FstOp<W>> LazyImpl<W, Op> {
    fn expand(&mut self, state: StateId) -> ArcList<W> {
        if let Some(list) = self.cache.arcs(state) {
            return sync::Arc::clone(list);
        }
        let arcs = self.op.compute_arcs(state);
        trace!(fst_type = Op::TYPE, state, narcs = arcs.len(), "expanded state");
        self.cache.set_arcs(state, arcs)
    }
}

/// Handle to an operation and its cache.
///
/// `Clone` shares both. To get an independent cache, build a new handle
/// from a fresh operation.
pub struct LazyFst<W, Op> {
    inner: sync::Arc<Mutex<LazyImpl<W, Op>>>,
}

impl<W, Op> Clone for LazyFst<W, Op> {
    fn clone(&self) -> Self {
        Self {
            inner: sync::Arc::clone(&self.inner),
        }
    }
}

impl<W: Semiring, Op: FstOp<W>> LazyFst<W, Op> {
    pub fn new(op: Op) -> Self {
        let properties = op.properties();
        Self {
            inner: sync::Arc::new(Mutex::new(LazyImpl {
                cache: FstCache::new(),
                op,
                properties,
            })),
        }
    }

    pub fn start(&self) -> Option<StateId> {
        let mut guard = self.inner.lock();
        if let Some(start) = guard.cache.start() {
            return start;
        }
        let start = guard.op.compute_start();
        guard.cache.set_start(start);
        start
    }

    pub fn final_weight(&self, state: StateId) -> W {
        let mut guard = self.inner.lock();
        if let Some(weight) = guard.cache.final_weight(state) {
            return weight.clone();
        }
        let weight = guard.op.compute_final(state);
        guard.cache.set_final(state, weight.clone());
        weight
    }

    pub fn arcs(&self, state: StateId) -> ArcList<W> {
        self.inner.lock().expand(state)
    }

    pub fn num_input_epsilons(&self, state: StateId) -> usize {
        let mut guard = self.inner.lock();
        guard.expand(state);
        guard.cache.states[state as usize].niepsilons
    }

    pub fn num_output_epsilons(&self, state: StateId) -> usize {
        let mut guard = self.inner.lock();
        guard.expand(state);
        guard.cache.states[state as usize].noepsilons
    }

    /// Stored bits, with any error the operation has found since.
    pub fn properties(&self) -> FstProperties {
        let mut guard = self.inner.lock();
        let error = guard.op.properties() & FstProperties::ERROR;
        guard.properties |= error;
        guard.properties
    }

    /// Caches trinary bits learned by a traversal.
    pub fn update_properties(&self, props: FstProperties) {
        let mut guard = self.inner.lock();
        let known = props.known() & FstProperties::TRINARY;
        guard.properties = guard.properties.with(props, known);
    }

    pub fn num_known_states(&self) -> usize {
        self.inner.lock().cache.num_known_states()
    }

    pub fn num_expanded(&self) -> usize {
        self.inner.lock().cache.num_expanded()
    }

    pub fn has_final(&self, state: StateId) -> bool {
        self.inner.lock().cache.has_final(state)
    }

    pub fn has_arcs(&self, state: StateId) -> bool {
        self.inner.lock().cache.has_arcs(state)
    }

    /// Runs `f` on the operation while holding the cache lock.
    pub fn with_op<R>(&self, f: impl FnOnce(&mut Op) -> R) -> R {
        f(&mut self.inner.lock().op)
    }

    /// True if both handles use the same cache.
    pub fn shares_cache(&self, other: &Self) -> bool {
        sync::Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfst_core::TropicalWeight;

    type W = TropicalWeight;

    // Infinite chain 0 -> 1 -> 2 -> ..., counting how often it is asked.
    #[derive(Default)]
    struct Chain {
        calls: usize,
    }

    impl FstOp<W> for Chain {
        const TYPE: &'static str = "chain";

        fn compute_start(&mut self) -> Option<StateId> {
            self.calls += 1;
            Some(0)
        }

        fn compute_final(&mut self, state: StateId) -> W {
            self.calls += 1;
            if state % 2 == 0 { W::one() } else { W::zero() }
        }

        fn compute_arcs(&mut self, state: StateId) -> Vec<Arc<W>> {
            self.calls += 1;
            vec![Arc::new(0, 1, W::one(), state + 1)]
        }

        fn properties(&self) -> FstProperties {
            FstProperties::NOT_ACCEPTOR
        }
    }

    #[test]
    fn answers_are_memoized() {
        let fst = LazyFst::new(Chain::default());
        assert_eq!(fst.start(), Some(0));
        assert_eq!(fst.start(), Some(0));
        assert_eq!(fst.final_weight(2), W::one());
        assert_eq!(fst.final_weight(2), W::one());
        assert_eq!(fst.arcs(0).len(), 1);
        assert_eq!(fst.arcs(0)[0].nextstate, 1);
        assert_eq!(fst.num_input_epsilons(0), 1);
        assert_eq!(fst.num_output_epsilons(0), 0);
        assert_eq!(fst.with_op(|op| op.calls), 3);
    }

    #[test]
    fn zero_final_is_distinct_from_unresolved() {
        let fst = LazyFst::new(Chain::default());
        assert!(!fst.has_final(1));
        assert_eq!(fst.final_weight(1), W::zero());
        assert!(fst.has_final(1));
        assert_eq!(fst.final_weight(1), W::zero());
        assert_eq!(fst.with_op(|op| op.calls), 1);
    }

    #[test]
    fn known_states_grow_with_expansion() {
        let fst = LazyFst::new(Chain::default());
        assert_eq!(fst.num_known_states(), 0);
        fst.start();
        assert_eq!(fst.num_known_states(), 1);
        fst.arcs(0);
        fst.arcs(1);
        assert_eq!(fst.num_known_states(), 3);
        assert_eq!(fst.num_expanded(), 2);
        assert!(fst.has_arcs(1));
        assert!(!fst.has_arcs(2));
    }

    #[test]
    fn clones_share_the_cache() {
        let fst = LazyFst::new(Chain::default());
        let copy = fst.clone();
        fst.arcs(0);
        assert!(copy.has_arcs(0));
        assert!(copy.shares_cache(&fst));
        let fresh = LazyFst::new(Chain::default());
        assert!(!fresh.shares_cache(&fst));
    }

    #[test]
    fn state_table_numbers_in_discovery_order() {
        let mut table = StateTable::new();
        assert!(table.is_empty());
        assert_eq!(table.find_id((3, 7)), 0);
        assert_eq!(table.find_id((1, 1)), 1);
        assert_eq!(table.find_id((3, 7)), 0);
        assert_eq!(table.tuple(1), Some(&(1, 1)));
        assert_eq!(table.tuple(2), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn learned_properties_are_kept() {
        let fst = LazyFst::new(Chain::default());
        fst.update_properties(FstProperties::CYCLIC | FstProperties::NOT_ACCEPTOR);
        let props = fst.properties();
        assert!(props.contains(FstProperties::CYCLIC | FstProperties::NOT_ACCEPTOR));
    }
}
