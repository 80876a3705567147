// Union: eager in place, and lazy over any number of operands.

use std::sync;

use tracing::{debug, error};

use wfst_core::properties::union_properties;
use wfst_core::{Arc, FstError, FstProperties, Semiring, StateId, SymbolTable, compat_symbols};

use crate::cache::{FstOp, LazyFst, StateTable};
use crate::config::CopyMode;
use crate::fst::{ArcList, CopyFst, Fst, MutableFst, count_states};

// Names the first side whose tables clash, if any.
fn incompatible_side<W, F1, F2>(fst1: &F1, fst2: &F2) -> Option<&'static str>
where
    W: Semiring,
    F1: Fst<W> + ?Sized,
    F2: Fst<W> + ?Sized,
{
    if !compat_symbols(fst1.input_symbols().as_deref(), fst2.input_symbols().as_deref()) {
        Some("input")
    } else if !compat_symbols(
        fst1.output_symbols().as_deref(),
        fst2.output_symbols().as_deref(),
    ) {
        Some("output")
    } else {
        None
    }
}

/// Replaces `fst1` with the union of `fst1` and `fst2`.
///
/// The states of `fst2` are appended after those of `fst1`. If the start
/// state of `fst1` is known not to lie on a cycle it gets one epsilon arc to
/// the start of `fst2`; otherwise a new start state with epsilon arcs to
/// both starts is added.
///
/// Incompatible symbol tables set `ERROR` on `fst1` and leave it otherwise
/// untouched.
pub fn union<W, F1, F2>(fst1: &mut F1, fst2: &F2)
where
    W: Semiring,
    F1: MutableFst<W> + ?Sized,
    F2: Fst<W> + ?Sized,
{
    if let Some(side) = incompatible_side(fst1, fst2) {
        error!(side, "union: {}", FstError::IncompatibleSymbols { side });
        fst1.set_properties(FstProperties::ERROR, FstProperties::ERROR);
        return;
    }
    let offset = fst1.num_states() as StateId;
    let initial_acyclic1 = fst1
        .properties(FstProperties::INITIAL_ACYCLIC, false)
        .contains(FstProperties::INITIAL_ACYCLIC);
    let props1 = fst1.properties(FstProperties::ALL, false);
    let props2 = fst2.properties(FstProperties::ALL, false);
    let Some(start2) = fst2.start() else {
        if props2.contains(FstProperties::ERROR) {
            fst1.set_properties(FstProperties::ERROR, FstProperties::ERROR);
        }
        return;
    };
    if let Some(n2) = fst2.num_states_if_known() {
        fst1.reserve_states(offset as usize + n2 + usize::from(!initial_acyclic1));
    }

    let states2: Vec<StateId> = fst2.states().collect();
    fst1.add_states(states2.last().map_or(0, |&s| s as usize + 1));
    let mut error = false;
    for s2 in states2 {
        if let Err(err) = copy_state(fst1, fst2, s2, offset) {
            error!(state = s2, %err, "union could not copy a state");
            error = true;
        }
    }

    let adopted = fst1.start().is_none();
    let connected = match fst1.start() {
        None => fst1.set_start(start2 + offset),
        Some(start1) if initial_acyclic1 => fst1.add_arc(start1, Arc::epsilon(start2 + offset)),
        Some(start1) => {
            let nstart = fst1.add_state();
            debug!(start = nstart, "union added a new start state");
            fst1.set_start(nstart)
                .and_then(|()| fst1.add_arc(nstart, Arc::epsilon(start1)))
                .and_then(|()| fst1.add_arc(nstart, Arc::epsilon(start2 + offset)))
        }
    };
    if let Err(err) = connected {
        error!(%err, "union could not connect the operands");
        error = true;
    }
    if adopted {
        fst1.set_properties(props2, FstProperties::COPY);
    } else {
        fst1.set_properties(union_properties(props1, props2, false), FstProperties::ALL);
    }
    if error {
        fst1.set_properties(FstProperties::ERROR, FstProperties::ERROR);
    }
}

// Copies state `s2` of `fst2` onto its shifted id in `fst1`.
fn copy_state<W, F1, F2>(
    fst1: &mut F1,
    fst2: &F2,
    s2: StateId,
    offset: StateId,
) -> Result<(), FstError>
where
    W: Semiring,
    F1: MutableFst<W> + ?Sized,
    F2: Fst<W> + ?Sized,
{
    let s1 = s2 + offset;
    let arcs = fst2.arcs(s2);
    fst1.set_final(s1, fst2.final_weight(s2))?;
    fst1.reserve_arcs(s1, arcs.len())?;
    for arc in arcs.iter() {
        let mut arc = arc.clone();
        arc.nextstate += offset;
        fst1.add_arc(s1, arc)?;
    }
    Ok(())
}

/// Unions every automaton in `fsts` into `fst1`, in order.
pub fn union_all<W, F1>(fst1: &mut F1, fsts: &[&dyn Fst<W>])
where
    W: Semiring,
    F1: MutableFst<W> + ?Sized,
{
    let total: usize = fsts.iter().map(|fst| count_states(*fst)).sum();
    fst1.reserve_states(1 + fst1.num_states() + total);
    for fst in fsts {
        union(fst1, *fst);
    }
}

/// An operand of a lazy union.
pub type UnionComponent<W> = sync::Arc<dyn Fst<W> + Send + Sync>;

struct UnionOp<W> {
    fsts: Vec<UnionComponent<W>>,
    /// `(component, state)` pairs; id `i` in the table is output state
    /// `i + 1`, state 0 being the union's own start.
    table: StateTable<(usize, StateId)>,
    props: FstProperties,
}

impl<W: Semiring> UnionOp<W> {
    fn new(fsts: Vec<UnionComponent<W>>, props: FstProperties) -> Self {
        Self {
            fsts,
            table: StateTable::new(),
            props,
        }
    }

    fn find_state(&mut self, component: usize, state: StateId) -> StateId {
        self.table.find_id((component, state)) + 1
    }

    fn tuple(&self, state: StateId) -> Option<(usize, StateId)> {
        let index = state.checked_sub(1)?;
        self.table.tuple(index).copied()
    }
}

impl<W: Semiring> FstOp<W> for UnionOp<W> {
    const TYPE: &'static str = "union";

    fn compute_start(&mut self) -> Option<StateId> {
        Some(0)
    }

    fn compute_final(&mut self, state: StateId) -> W {
        match self.tuple(state) {
            Some((c, s)) => self.fsts[c].final_weight(s),
            None => W::zero(),
        }
    }

    fn compute_arcs(&mut self, state: StateId) -> Vec<Arc<W>> {
        if state == 0 {
            let starts: Vec<(usize, StateId)> = self
                .fsts
                .iter()
                .enumerate()
                .filter_map(|(c, fst)| Some((c, fst.start()?)))
                .collect();
            return starts
                .into_iter()
                .map(|(c, s)| Arc::epsilon(self.find_state(c, s)))
                .collect();
        }
        let Some((c, s)) = self.tuple(state) else {
            return Vec::new();
        };
        let source = self.fsts[c].arcs(s);
        source
            .iter()
            .map(|arc| {
                let mut arc = arc.clone();
                arc.nextstate = self.find_state(c, arc.nextstate);
                arc
            })
            .collect()
    }

    fn properties(&self) -> FstProperties {
        let error = self
            .fsts
            .iter()
            .any(|fst| fst.properties(FstProperties::ERROR, false).contains(FstProperties::ERROR));
        if error {
            self.props | FstProperties::ERROR
        } else {
            self.props
        }
    }
}

/// Union computed on demand.
///
/// State 0 is a fresh start state with one epsilon arc into the start of
/// each operand; operand states are numbered as they are discovered.
/// Operands are shared read-only through reference counting, so any copy
/// may be read from its own thread once it has its own cache.
pub struct UnionFst<W> {
    lazy: LazyFst<W, UnionOp<W>>,
    fsts: Vec<UnionComponent<W>>,
    props: FstProperties,
    isymbols: Option<sync::Arc<SymbolTable>>,
    osymbols: Option<sync::Arc<SymbolTable>>,
}

impl<W: Semiring> UnionFst<W> {
    pub fn new<F1, F2>(fst1: F1, fst2: F2) -> Self
    where
        F1: Fst<W> + Send + Sync + 'static,
        F2: Fst<W> + Send + Sync + 'static,
    {
        Self::from_components(sync::Arc::new(fst1), sync::Arc::new(fst2))
    }

    /// Union of two operands already behind shared handles.
    pub fn from_components(fst1: UnionComponent<W>, fst2: UnionComponent<W>) -> Self {
        let isymbols = fst1.input_symbols();
        let osymbols = fst1.output_symbols();
        let props = fst1.properties(FstProperties::COPY, false);
        let mut union = Self {
            lazy: LazyFst::new(UnionOp::new(Vec::new(), props)),
            fsts: vec![fst1],
            props,
            isymbols,
            osymbols,
        };
        union.push(fst2);
        union
    }

    /// Adds another operand.
    ///
    /// The handle moves to a fresh cache; copies taken before the call keep
    /// the old operands and their cache.
    pub fn add_union<F>(&mut self, fst: F)
    where
        F: Fst<W> + Send + Sync + 'static,
    {
        self.push(sync::Arc::new(fst));
    }

    pub fn add_union_component(&mut self, fst: UnionComponent<W>) {
        self.push(fst);
    }

    fn push(&mut self, fst: UnionComponent<W>) {
        let mut props = union_properties(
            self.props,
            fst.properties(FstProperties::COPY, false),
            true,
        );
        if let Some(side) = incompatible_side(&self.fsts[0], &fst) {
            error!(side, "union: {}", FstError::IncompatibleSymbols { side });
            props |= FstProperties::ERROR;
        }
        self.fsts.push(fst);
        self.props = props;
        self.refresh();
    }

    fn refresh(&mut self) {
        self.lazy = LazyFst::new(UnionOp::new(self.fsts.clone(), self.props));
    }

    pub fn num_components(&self) -> usize {
        self.fsts.len()
    }

    pub fn num_expanded(&self) -> usize {
        self.lazy.num_expanded()
    }

    pub fn is_expanded(&self, state: StateId) -> bool {
        self.lazy.has_arcs(state)
    }
}

impl<W: Semiring> Fst<W> for UnionFst<W> {
    fn start(&self) -> Option<StateId> {
        self.lazy.start()
    }

    fn final_weight(&self, state: StateId) -> W {
        self.lazy.final_weight(state)
    }

    fn arcs(&self, state: StateId) -> ArcList<W> {
        self.lazy.arcs(state)
    }

    fn num_input_epsilons(&self, state: StateId) -> usize {
        self.lazy.num_input_epsilons(state)
    }

    fn num_output_epsilons(&self, state: StateId) -> usize {
        self.lazy.num_output_epsilons(state)
    }

    fn stored_properties(&self) -> FstProperties {
        self.lazy.properties()
    }

    fn update_properties(&self, props: FstProperties) {
        self.lazy.update_properties(props);
    }

    fn input_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.isymbols.clone()
    }

    fn output_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.osymbols.clone()
    }

    fn fst_type(&self) -> &'static str {
        "union"
    }
}

impl<W: Semiring> CopyFst for UnionFst<W> {
    fn copy(&self, mode: CopyMode) -> Self {
        let mut copy = Self {
            lazy: self.lazy.clone(),
            fsts: self.fsts.clone(),
            props: self.props,
            isymbols: self.isymbols.clone(),
            osymbols: self.osymbols.clone(),
        };
        if mode == CopyMode::Safe {
            copy.refresh();
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::ExpandedFst;
    use crate::vector::VectorFst;
    use wfst_core::TropicalWeight;

    type W = TropicalWeight;

    // Single-arc acceptor for `label`.
    fn word(label: u32) -> VectorFst<W> {
        let mut fst = VectorFst::new();
        fst.add_states(2);
        fst.set_start(0).unwrap();
        fst.add_arc(0, Arc::new(label, label, W::one(), 1)).unwrap();
        fst.set_final(1, W::one()).unwrap();
        fst
    }

    fn looping(label: u32) -> VectorFst<W> {
        let mut fst = VectorFst::new();
        fst.add_state();
        fst.set_start(0).unwrap();
        fst.add_arc(0, Arc::new(label, label, W::one(), 0)).unwrap();
        fst.set_final(0, W::one()).unwrap();
        fst
    }

    #[test]
    fn acyclic_start_gets_one_epsilon_arc() {
        let mut fst = word(1);
        union(&mut fst, &word(2));
        assert_eq!(fst.num_states(), 4);
        assert_eq!(fst.start(), Some(0));
        assert_eq!(*fst.arcs(0), vec![Arc::new(1, 1, W::one(), 1), Arc::epsilon(2)]);
        assert_eq!(*fst.arcs(2), vec![Arc::new(2, 2, W::one(), 3)]);
        assert!(fst.is_final(3));
        let props = fst.properties(FstProperties::EPSILONS | FstProperties::MUTABLE, false);
        assert_eq!(props, FstProperties::EPSILONS | FstProperties::MUTABLE);
    }

    #[test]
    fn cyclic_start_gets_a_new_start() {
        let mut fst = looping(1);
        union(&mut fst, &word(2));
        assert_eq!(fst.num_states(), 4);
        assert_eq!(fst.start(), Some(3));
        assert_eq!(*fst.arcs(3), vec![Arc::epsilon(0), Arc::epsilon(1)]);
        assert!(
            fst.properties(FstProperties::INITIAL_ACYCLIC, false)
                .contains(FstProperties::INITIAL_ACYCLIC)
        );
    }

    #[test]
    fn empty_left_operand_becomes_a_copy() {
        let mut fst = VectorFst::<W>::new();
        let right = word(5);
        union(&mut fst, &right);
        assert_eq!(fst.num_states(), 2);
        assert_eq!(fst.start(), Some(0));
        assert_eq!(*fst.arcs(0), *right.arcs(0));
        assert_eq!(fst.final_weight(1), W::one());
    }

    #[test]
    fn empty_right_operand_changes_nothing() {
        let mut fst = word(1);
        union(&mut fst, &VectorFst::new());
        assert_eq!(fst.num_states(), 2);
        assert_eq!(fst.num_arcs(0), 1);
    }

    #[test]
    fn incompatible_symbols_leave_fst_unchanged() {
        let mut table1 = SymbolTable::with_epsilon("a");
        table1.add_symbol("x");
        let mut table2 = SymbolTable::with_epsilon("b");
        table2.add_symbol("y");
        let mut fst = word(1);
        fst.set_input_symbols(Some(sync::Arc::new(table1)));
        let mut other = word(1);
        other.set_input_symbols(Some(sync::Arc::new(table2)));
        union(&mut fst, &other);
        assert_eq!(fst.num_states(), 2);
        assert!(fst.properties(FstProperties::ERROR, false).contains(FstProperties::ERROR));
    }

    #[test]
    fn union_all_appends_every_operand() {
        let mut fst = word(1);
        let (b, c) = (word(2), looping(3));
        union_all(&mut fst, &[&b, &c]);
        assert_eq!(fst.num_states(), 5);
        assert_eq!(fst.num_arcs(0), 3);
    }

    #[test]
    fn lazy_union_numbers_states_on_discovery() {
        let fst = UnionFst::new(word(1), looping(2));
        assert_eq!(fst.start(), Some(0));
        assert_eq!(*fst.arcs(0), vec![Arc::epsilon(1), Arc::epsilon(2)]);
        assert!(!fst.is_final(0));
        assert_eq!(*fst.arcs(2), vec![Arc::new(2, 2, W::one(), 2)]);
        assert!(fst.is_final(2));
        assert_eq!(*fst.arcs(1), vec![Arc::new(1, 1, W::one(), 3)]);
        assert!(fst.is_final(3));
        assert_eq!(fst.states().count(), 4);
        assert!(fst.properties(FstProperties::EPSILONS, true).contains(FstProperties::EPSILONS));
        let props = fst.properties(FstProperties::CYCLIC | FstProperties::ACYCLIC, true);
        assert_eq!(props, FstProperties::CYCLIC);
    }

    #[test]
    fn add_union_moves_to_a_fresh_cache() {
        let mut fst = UnionFst::new(word(1), word(2));
        fst.arcs(0);
        let before = fst.copy(CopyMode::Shared);
        fst.add_union(word(3));
        assert_eq!(fst.num_components(), 3);
        assert!(!fst.is_expanded(0));
        assert_eq!(fst.num_arcs(0), 3);
        assert_eq!(before.num_arcs(0), 2);
        assert!(before.is_expanded(0));
    }

    #[test]
    fn lazy_union_skips_empty_operands() {
        let fst = UnionFst::new(VectorFst::<W>::new(), word(4));
        assert_eq!(*fst.arcs(0), vec![Arc::epsilon(1)]);
        assert_eq!(fst.states().count(), 3);
    }

    #[test]
    fn lazy_union_of_empty_operands_claims_no_epsilons() {
        let fst = UnionFst::new(VectorFst::<W>::new(), VectorFst::<W>::new());
        assert_eq!(fst.num_arcs(0), 0);
        let stored = fst.stored_properties();
        let computed = crate::props::compute_properties(&fst);
        assert!(!stored.intersects(FstProperties::EPSILONS | FstProperties::I_EPSILONS | FstProperties::O_EPSILONS));
        assert!(computed.contains(FstProperties::NO_EPSILONS));
        assert!(crate::props::properties_consistent(&fst));
    }
}
