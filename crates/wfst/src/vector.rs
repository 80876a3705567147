// Mutable, fully expanded automaton backed by per-state vectors.

use std::sync;
use std::sync::atomic::{AtomicU64, Ordering};

use wfst_core::properties::{
    add_arc_properties, add_state_properties, delete_arcs_properties, delete_states_properties,
    set_arc_properties, set_final_properties, set_start_properties,
};
use wfst_core::{Arc, EPSILON, FstError, FstProperties, Semiring, StateId, SymbolTable};

use crate::config::CopyMode;
use crate::fst::{ArcList, CopyFst, ExpandedFst, Fst, MutableFst};

#[derive(Debug, Clone)]
struct VectorState<W> {
    final_weight: W,
    /// Shared until the first edit after a clone.
    arcs: ArcList<W>,
    niepsilons: usize,
    noepsilons: usize,
}

impl<W: Semiring> VectorState<W> {
    fn new() -> Self {
        Self {
            final_weight: W::zero(),
            arcs: sync::Arc::new(Vec::new()),
            niepsilons: 0,
            noepsilons: 0,
        }
    }
}

/// Vector-backed mutable automaton.
///
/// Arc lists are copy-on-write, so cloning is cheap and reading a state's
/// arcs never copies them. The property mask is kept up to date by every
/// mutator; bits learned by `properties(mask, true)` are cached as well.
#[derive(Debug)]
pub struct VectorFst<W: Semiring> {
    states: Vec<VectorState<W>>,
    start: Option<StateId>,
    properties: AtomicU64,
    isymbols: Option<sync::Arc<SymbolTable>>,
    osymbols: Option<sync::Arc<SymbolTable>>,
}

const STATIC_PROPERTIES: FstProperties = FstProperties::EXPANDED.union(FstProperties::MUTABLE);

impl<W: Semiring> Default for VectorFst<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Semiring> Clone for VectorFst<W> {
    fn clone(&self) -> Self {
        Self {
            states: self.states.clone(),
            start: self.start,
            properties: AtomicU64::new(self.properties.load(Ordering::Relaxed)),
            isymbols: self.isymbols.clone(),
            osymbols: self.osymbols.clone(),
        }
    }
}

impl<W: Semiring> VectorFst<W> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            start: None,
            properties: AtomicU64::new((FstProperties::NULL | STATIC_PROPERTIES).bits()),
            isymbols: None,
            osymbols: None,
        }
    }

    /// Materializes any automaton. Properties carried over are the source's
    /// stored copy properties.
    pub fn from_fst<F: Fst<W> + ?Sized>(fst: &F) -> Self {
        let mut out = Self::new();
        let mut states = Vec::new();
        if let Some(n) = fst.num_states_if_known() {
            states.reserve(n);
        }
        for s in fst.states() {
            let index = s as usize;
            if states.len() <= index {
                states.resize_with(index + 1, VectorState::new);
            }
            let arcs = fst.arcs(s);
            let state = &mut states[index];
            state.final_weight = fst.final_weight(s);
            state.niepsilons = arcs.iter().filter(|a| a.ilabel == EPSILON).count();
            state.noepsilons = arcs.iter().filter(|a| a.olabel == EPSILON).count();
            state.arcs = arcs;
        }
        out.states = states;
        out.start = fst.start();
        out.isymbols = fst.input_symbols();
        out.osymbols = fst.output_symbols();
        let props = fst.properties(FstProperties::COPY, false) | STATIC_PROPERTIES;
        out.store(props);
        out
    }

    fn load(&self) -> FstProperties {
        FstProperties::from_bits_retain(self.properties.load(Ordering::Relaxed))
    }

    fn store(&mut self, props: FstProperties) {
        *self.properties.get_mut() = props.bits();
    }

    fn check_state(&self, state: StateId) -> Result<usize, FstError> {
        let index = state as usize;
        if index < self.states.len() {
            Ok(index)
        } else {
            Err(FstError::StateOutOfRange(state))
        }
    }

    fn check_arc(&self, state: StateId, arc: &Arc<W>) -> Result<usize, FstError> {
        let index = self.check_state(state)?;
        self.check_state(arc.nextstate)?;
        Ok(index)
    }
}

impl<W: Semiring> Fst<W> for VectorFst<W> {
    fn start(&self) -> Option<StateId> {
        self.start
    }

    fn final_weight(&self, state: StateId) -> W {
        self.states
            .get(state as usize)
            .map_or_else(W::zero, |s| s.final_weight.clone())
    }

    fn arcs(&self, state: StateId) -> ArcList<W> {
        self.states
            .get(state as usize)
            .map_or_else(|| sync::Arc::new(Vec::new()), |s| sync::Arc::clone(&s.arcs))
    }

    fn num_arcs(&self, state: StateId) -> usize {
        self.states.get(state as usize).map_or(0, |s| s.arcs.len())
    }

    fn num_input_epsilons(&self, state: StateId) -> usize {
        self.states.get(state as usize).map_or(0, |s| s.niepsilons)
    }

    fn num_output_epsilons(&self, state: StateId) -> usize {
        self.states.get(state as usize).map_or(0, |s| s.noepsilons)
    }

    fn stored_properties(&self) -> FstProperties {
        self.load()
    }

    fn update_properties(&self, props: FstProperties) {
        let known = props.known() & FstProperties::TRINARY;
        let current = self.load();
        let merged = current.with(props, known) | (current & FstProperties::ERROR);
        self.properties.store(merged.bits(), Ordering::Relaxed);
    }

    fn num_states_if_known(&self) -> Option<usize> {
        Some(self.states.len())
    }

    fn states(&self) -> Box<dyn Iterator<Item = StateId> + '_> {
        Box::new(0..self.states.len() as StateId)
    }

    fn input_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.isymbols.clone()
    }

    fn output_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.osymbols.clone()
    }

    fn fst_type(&self) -> &'static str {
        "vector"
    }
}

impl<W: Semiring> ExpandedFst<W> for VectorFst<W> {
    fn num_states(&self) -> usize {
        self.states.len()
    }
}

impl<W: Semiring> MutableFst<W> for VectorFst<W> {
    fn add_state(&mut self) -> StateId {
        let id = self.states.len() as StateId;
        self.states.push(VectorState::new());
        let props = add_state_properties(self.load());
        self.store(props);
        id
    }

    fn add_states(&mut self, n: usize) {
        self.states.resize_with(self.states.len() + n, VectorState::new);
        let props = add_state_properties(self.load());
        self.store(props);
    }

    fn reserve_states(&mut self, n: usize) {
        self.states.reserve(n);
    }

    fn reserve_arcs(&mut self, state: StateId, n: usize) -> Result<(), FstError> {
        let index = self.check_state(state)?;
        sync::Arc::make_mut(&mut self.states[index].arcs).reserve(n);
        Ok(())
    }

    fn set_start(&mut self, state: StateId) -> Result<(), FstError> {
        self.check_state(state)?;
        self.start = Some(state);
        let props = set_start_properties(self.load());
        self.store(props);
        Ok(())
    }

    fn set_final(&mut self, state: StateId, weight: W) -> Result<(), FstError> {
        let index = self.check_state(state)?;
        let props = set_final_properties(self.load(), &self.states[index].final_weight, &weight);
        self.states[index].final_weight = weight;
        self.store(props);
        Ok(())
    }

    fn add_arc(&mut self, state: StateId, arc: Arc<W>) -> Result<(), FstError> {
        let index = self.check_arc(state, &arc)?;
        let current = self.load();
        let vstate = &mut self.states[index];
        let props = add_arc_properties(current, state, &arc, vstate.arcs.last());
        if arc.ilabel == EPSILON {
            vstate.niepsilons += 1;
        }
        if arc.olabel == EPSILON {
            vstate.noepsilons += 1;
        }
        sync::Arc::make_mut(&mut vstate.arcs).push(arc);
        self.store(props);
        Ok(())
    }

    fn set_arc(&mut self, state: StateId, index: usize, arc: Arc<W>) -> Result<(), FstError> {
        let sindex = self.check_arc(state, &arc)?;
        let current = self.load();
        let vstate = &mut self.states[sindex];
        let Some(old) = vstate.arcs.get(index) else {
            return Err(FstError::ArcOutOfRange { state, index });
        };
        let props = set_arc_properties(current, old, &arc);
        if old.ilabel == EPSILON {
            vstate.niepsilons -= 1;
        }
        if old.olabel == EPSILON {
            vstate.noepsilons -= 1;
        }
        if arc.ilabel == EPSILON {
            vstate.niepsilons += 1;
        }
        if arc.olabel == EPSILON {
            vstate.noepsilons += 1;
        }
        sync::Arc::make_mut(&mut vstate.arcs)[index] = arc;
        self.store(props);
        Ok(())
    }

    fn delete_arcs(&mut self, state: StateId) -> Result<(), FstError> {
        let index = self.check_state(state)?;
        let vstate = &mut self.states[index];
        vstate.arcs = sync::Arc::new(Vec::new());
        vstate.niepsilons = 0;
        vstate.noepsilons = 0;
        let props = delete_arcs_properties(self.load());
        self.store(props);
        Ok(())
    }

    fn delete_states(&mut self) {
        self.states.clear();
        self.start = None;
        let props = (self.load() & FstProperties::ERROR) | FstProperties::NULL | STATIC_PROPERTIES;
        self.store(props);
    }

    fn delete_state_set(&mut self, states: &[StateId]) {
        if states.is_empty() {
            return;
        }
        let mut remap: Vec<Option<StateId>> = vec![Some(0); self.states.len()];
        for &s in states {
            if let Some(slot) = remap.get_mut(s as usize) {
                *slot = None;
            }
        }
        let mut next = 0;
        for slot in remap.iter_mut() {
            if slot.is_some() {
                *slot = Some(next);
                next += 1;
            }
        }

        let old = std::mem::take(&mut self.states);
        for (s, mut vstate) in old.into_iter().enumerate() {
            if remap[s].is_none() {
                continue;
            }
            let arcs: Vec<Arc<W>> = vstate
                .arcs
                .iter()
                .filter_map(|arc| {
                    let target = remap[arc.nextstate as usize]?;
                    let mut arc = arc.clone();
                    arc.nextstate = target;
                    Some(arc)
                })
                .collect();
            vstate.niepsilons = arcs.iter().filter(|a| a.ilabel == EPSILON).count();
            vstate.noepsilons = arcs.iter().filter(|a| a.olabel == EPSILON).count();
            vstate.arcs = sync::Arc::new(arcs);
            self.states.push(vstate);
        }
        self.start = self.start.and_then(|s| remap.get(s as usize).copied().flatten());
        let props = delete_states_properties(self.load());
        self.store(props);
    }

    fn set_properties(&mut self, props: FstProperties, mask: FstProperties) {
        let current = self.load();
        let merged = current.with(props, mask) | (current & FstProperties::ERROR);
        self.store(merged);
    }

    fn set_input_symbols(&mut self, symbols: Option<sync::Arc<SymbolTable>>) {
        self.isymbols = symbols;
    }

    fn set_output_symbols(&mut self, symbols: Option<sync::Arc<SymbolTable>>) {
        self.osymbols = symbols;
    }
}

impl<W: Semiring> CopyFst for VectorFst<W> {
    fn copy(&self, _mode: CopyMode) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::compute_properties;
    use wfst_core::TropicalWeight;

    type W = TropicalWeight;

    #[test]
    fn new_fst_is_null() {
        let fst = VectorFst::<W>::new();
        assert_eq!(fst.start(), None);
        assert_eq!(fst.num_states(), 0);
        assert_eq!(
            fst.properties(FstProperties::ALL, false),
            FstProperties::NULL | STATIC_PROPERTIES
        );
    }

    #[test]
    fn build_and_read() {
        let mut fst = VectorFst::<W>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0).unwrap();
        fst.add_arc(s0, Arc::new(1, 0, TropicalWeight(0.5), s1)).unwrap();
        fst.add_arc(s0, Arc::new(0, 0, W::one(), s1)).unwrap();
        fst.set_final(s1, TropicalWeight(1.5)).unwrap();

        assert_eq!(fst.num_arcs(s0), 2);
        assert_eq!(fst.num_input_epsilons(s0), 1);
        assert_eq!(fst.num_output_epsilons(s0), 2);
        assert_eq!(fst.final_weight(s1), TropicalWeight(1.5));
        assert!(!fst.is_final(s0));

        let props = fst.properties(FstProperties::ALL, false);
        assert!(props.contains(FstProperties::NOT_ACCEPTOR | FstProperties::WEIGHTED));
        assert!(props.contains(FstProperties::EPSILONS | FstProperties::NOT_I_LABEL_SORTED));
    }

    #[test]
    fn rejects_out_of_range() {
        let mut fst = VectorFst::<W>::new();
        fst.add_state();
        assert_eq!(fst.set_start(3), Err(FstError::StateOutOfRange(3)));
        assert_eq!(
            fst.add_arc(0, Arc::new(1, 1, W::one(), 7)),
            Err(FstError::StateOutOfRange(7))
        );
        assert_eq!(
            fst.set_arc(0, 0, Arc::new(1, 1, W::one(), 0)),
            Err(FstError::ArcOutOfRange { state: 0, index: 0 })
        );
        assert_eq!(fst.final_weight(9), W::zero());
        assert!(fst.arcs(9).is_empty());
    }

    #[test]
    fn clone_is_copy_on_write() {
        let mut fst = VectorFst::<W>::new();
        fst.add_states(2);
        fst.add_arc(0, Arc::new(1, 1, W::one(), 1)).unwrap();
        let copy = fst.clone();
        assert!(sync::Arc::ptr_eq(&fst.arcs(0), &copy.arcs(0)));

        fst.add_arc(0, Arc::new(2, 2, W::one(), 1)).unwrap();
        assert_eq!(fst.num_arcs(0), 2);
        assert_eq!(copy.num_arcs(0), 1);
    }

    #[test]
    fn set_arc_keeps_epsilon_counts() {
        let mut fst = VectorFst::<W>::new();
        fst.add_states(2);
        fst.add_arc(0, Arc::new(0, 3, W::one(), 1)).unwrap();
        fst.set_arc(0, 0, Arc::new(3, 0, W::one(), 1)).unwrap();
        assert_eq!(fst.num_input_epsilons(0), 0);
        assert_eq!(fst.num_output_epsilons(0), 1);
    }

    #[test]
    fn delete_state_set_renumbers() {
        let mut fst = VectorFst::<W>::new();
        fst.add_states(4);
        fst.set_start(0).unwrap();
        fst.add_arc(0, Arc::new(1, 1, W::one(), 1)).unwrap();
        fst.add_arc(0, Arc::new(2, 2, W::one(), 3)).unwrap();
        fst.add_arc(3, Arc::new(3, 3, W::one(), 2)).unwrap();
        fst.set_final(3, W::one()).unwrap();

        fst.delete_state_set(&[1]);
        assert_eq!(fst.num_states(), 3);
        assert_eq!(fst.start(), Some(0));
        assert_eq!(*fst.arcs(0), vec![Arc::new(2, 2, W::one(), 2)]);
        assert_eq!(*fst.arcs(2), vec![Arc::new(3, 3, W::one(), 1)]);
        assert!(fst.is_final(2));

        fst.delete_state_set(&[0]);
        assert_eq!(fst.start(), None);
    }

    #[test]
    fn error_bit_is_sticky() {
        let mut fst = VectorFst::<W>::new();
        fst.set_properties(FstProperties::ERROR, FstProperties::ERROR);
        fst.set_properties(FstProperties::empty(), FstProperties::ALL);
        assert!(fst.properties(FstProperties::ERROR, false).contains(FstProperties::ERROR));
        fst.delete_states();
        assert!(fst.properties(FstProperties::ERROR, false).contains(FstProperties::ERROR));
    }

    #[test]
    fn incremental_bits_match_traversal() {
        let mut fst = VectorFst::<W>::new();
        fst.add_states(3);
        fst.set_start(0).unwrap();
        fst.add_arc(0, Arc::new(1, 1, W::one(), 1)).unwrap();
        fst.add_arc(1, Arc::new(2, 2, W::one(), 2)).unwrap();
        fst.set_final(2, W::one()).unwrap();
        let stored = fst.properties(FstProperties::ALL, false);
        let computed = compute_properties(&fst);
        assert!(wfst_core::properties::compat_properties(stored, computed));

        let props = fst.properties(FstProperties::ACCESSIBLE | FstProperties::STRING, true);
        assert_eq!(props, FstProperties::ACCESSIBLE | FstProperties::STRING);
        assert!(fst.stored_properties().contains(FstProperties::COACCESSIBLE));
    }

    #[test]
    fn from_fst_copies_everything() {
        let mut src = VectorFst::<W>::new();
        src.add_states(2);
        src.set_start(1).unwrap();
        src.add_arc(1, Arc::new(4, 5, TropicalWeight(2.0), 0)).unwrap();
        src.set_final(0, W::one()).unwrap();
        src.set_input_symbols(Some(sync::Arc::new(SymbolTable::with_epsilon("in"))));

        let out = VectorFst::from_fst(&src);
        assert_eq!(out.start(), Some(1));
        assert_eq!(*out.arcs(1), *src.arcs(1));
        assert!(out.is_final(0));
        assert_eq!(out.input_symbols().map(|t| t.name().to_string()), Some("in".into()));
        assert!(out.output_symbols().is_none());
        assert!(out.stored_properties().contains(FstProperties::NOT_ACCEPTOR));
    }
}
