// Lazy arc map.
//
// States are mapped the first time a reader asks for them. Output state ids
// follow the source ids, except that a superfinal state, once it exists,
// takes one slot and every source id at or after it shifts up by one.

use std::marker::PhantomData;
use std::sync;

use hashbrown::HashMap;
use tracing::{debug, error};

use wfst_core::{Arc, FstProperties, Semiring, StateId, SymbolTable};

use crate::arc_map::{ArcMapper, MappedFinal, MapperRef, StateCountPreserving, map_final};
use crate::cache::{FstOp, LazyFst};
use crate::config::{CopyMode, MapFinalAction, MapSymbolsAction};
use crate::fst::{ArcList, CopyFst, DiscoveredStates, ExpandedFst, Fst};

struct ArcMapOp<'a, W1, W2, F, M> {
    fst: F,
    mapper: MapperRef<'a, M>,
    final_action: MapFinalAction,
    superfinal: Option<StateId>,
    /// One past the highest output id handed out.
    nstates: StateId,
    /// Mapped finals by source state. The mapper sees each final once.
    finals: HashMap<StateId, MappedFinal<W2>>,
    error: bool,
    props: FstProperties,
    _weights: PhantomData<fn(W1) -> W2>,
}

impl<'a, W1, W2, F, M> ArcMapOp<'a, W1, W2, F, M>
where
    W1: Semiring,
    W2: Semiring,
    F: Fst<W1>,
    M: ArcMapper<W1, W2>,
{
    fn new(fst: F, mapper: MapperRef<'a, M>) -> Self {
        let mut op = Self {
            final_action: mapper.final_action(),
            fst,
            mapper,
            superfinal: None,
            nstates: 0,
            finals: HashMap::new(),
            error: false,
            props: FstProperties::empty(),
            _weights: PhantomData,
        };
        let iprops = op.fst.properties(FstProperties::COPY, false);
        if op.fst.start().is_none() {
            op.final_action = MapFinalAction::NoSuperfinal;
            op.props = FstProperties::NULL | (iprops & FstProperties::ERROR);
            return op;
        }
        op.props = op.mapper.properties(iprops) & FstProperties::COPY;
        match op.final_action {
            MapFinalAction::RequireSuperfinal => {
                op.superfinal = Some(0);
                op.nstates = 1;
            }
            MapFinalAction::AllowSuperfinal => {
                // With a known count the superfinal lands after every source
                // state, as in the eager map.
                if let Some(n) = op.fst.num_states_if_known() {
                    op.nstates = n as StateId;
                }
            }
            MapFinalAction::NoSuperfinal => {}
        }
        op
    }

    fn find_istate(&self, ostate: StateId) -> StateId {
        match self.superfinal {
            Some(sf) if ostate > sf => ostate - 1,
            _ => ostate,
        }
    }

    fn find_ostate(&mut self, istate: StateId) -> StateId {
        let ostate = match self.superfinal {
            Some(sf) if istate >= sf => istate + 1,
            _ => istate,
        };
        if ostate >= self.nstates {
            self.nstates = ostate + 1;
        }
        ostate
    }

    fn superfinal_state(&mut self) -> StateId {
        if let Some(sf) = self.superfinal {
            return sf;
        }
        let sf = self.nstates;
        self.nstates += 1;
        self.superfinal = Some(sf);
        debug!(superfinal = sf, "lazy arc map added a superfinal state");
        sf
    }

    fn resolve_final(&mut self, istate: StateId) -> &MappedFinal<W2> {
        let Self {
            fst,
            mapper,
            final_action,
            finals,
            error,
            ..
        } = self;
        finals.entry(istate).or_insert_with(|| {
            map_final(&mut **mapper, *final_action, istate, fst.final_weight(istate), error)
        })
    }

    // Visits every source state so a lazily added superfinal gets its id.
    fn resolve_all_finals(&mut self, n: usize) {
        for istate in 0..n as StateId {
            let needs_superfinal = self.resolve_final(istate).superfinal_arc.is_some();
            if needs_superfinal {
                self.superfinal_state();
            }
        }
    }
}

impl<W1, W2, F, M> FstOp<W2> for ArcMapOp<'_, W1, W2, F, M>
where
    W1: Semiring,
    W2: Semiring,
    F: Fst<W1>,
    M: ArcMapper<W1, W2>,
{
    const TYPE: &'static str = "map";

    fn compute_start(&mut self) -> Option<StateId> {
        let start = self.fst.start()?;
        Some(self.find_ostate(start))
    }

    fn compute_final(&mut self, state: StateId) -> W2 {
        if self.superfinal == Some(state) {
            return W2::one();
        }
        let istate = self.find_istate(state);
        self.resolve_final(istate).final_weight.clone()
    }

    fn compute_arcs(&mut self, state: StateId) -> Vec<Arc<W2>> {
        if self.superfinal == Some(state) {
            return Vec::new();
        }
        let istate = self.find_istate(state);
        let source = self.fst.arcs(istate);
        let mut arcs = Vec::with_capacity(source.len() + 1);
        for arc in source.iter() {
            let mut mapped = self.mapper.map_arc(arc);
            mapped.nextstate = self.find_ostate(mapped.nextstate);
            arcs.push(mapped);
        }
        if let Some(mut arc) = self.resolve_final(istate).superfinal_arc.clone() {
            arc.nextstate = self.superfinal_state();
            arcs.push(arc);
        }
        arcs
    }

    fn properties(&self) -> FstProperties {
        let failed = self.error
            || self.fst.properties(FstProperties::ERROR, false).contains(FstProperties::ERROR)
            || self.mapper.properties(FstProperties::empty()).contains(FstProperties::ERROR);
        if failed {
            self.props | FstProperties::ERROR
        } else {
            self.props
        }
    }
}

/// Arc map computed on demand.
///
/// Each state is mapped the first time it is read, and the result is cached
/// for the life of the handle. The mapper is either owned or borrowed from the
/// caller, in which case the caller can inspect it once the automaton is
/// dropped.
///
/// Under `RequireSuperfinal` the superfinal state is state 0 and every source
/// state shifts up by one. Under `AllowSuperfinal` it is allocated the first
/// time a mapped final needs it.
pub struct ArcMapFst<'a, W1, W2, F, M> {
    lazy: LazyFst<W2, ArcMapOp<'a, W1, W2, F, M>>,
    isymbols: Option<sync::Arc<SymbolTable>>,
    osymbols: Option<sync::Arc<SymbolTable>>,
}

impl<'a, W1, W2, F, M> ArcMapFst<'a, W1, W2, F, M>
where
    W1: Semiring,
    W2: Semiring,
    F: Fst<W1>,
    M: ArcMapper<W1, W2>,
{
    /// Maps `fst` lazily with a mapper the automaton owns.
    pub fn new(fst: F, mapper: M) -> Self {
        Self::from_parts(fst, MapperRef::Owned(mapper))
    }

    /// Maps `fst` lazily with a mapper borrowed for the automaton's lifetime.
    pub fn with_borrowed_mapper(fst: F, mapper: &'a mut M) -> Self {
        Self::from_parts(fst, MapperRef::Borrowed(mapper))
    }

    fn from_parts(fst: F, mapper: MapperRef<'a, M>) -> Self {
        let isymbols = match mapper.input_symbols_action() {
            MapSymbolsAction::Copy => fst.input_symbols(),
            MapSymbolsAction::Clear | MapSymbolsAction::Noop => None,
        };
        let osymbols = match mapper.output_symbols_action() {
            MapSymbolsAction::Copy => fst.output_symbols(),
            MapSymbolsAction::Clear | MapSymbolsAction::Noop => None,
        };
        Self {
            lazy: LazyFst::new(ArcMapOp::new(fst, mapper)),
            isymbols,
            osymbols,
        }
    }

    /// The final action in effect, which is `NoSuperfinal` for an input
    /// without a start state whatever the mapper declares.
    pub fn final_action(&self) -> MapFinalAction {
        self.lazy.with_op(|op| op.final_action)
    }

    /// Superfinal state id, if one has been allocated so far.
    pub fn superfinal(&self) -> Option<StateId> {
        self.lazy.with_op(|op| op.superfinal)
    }

    /// Number of states whose arcs have been computed.
    pub fn num_expanded(&self) -> usize {
        self.lazy.num_expanded()
    }

    pub fn is_expanded(&self, state: StateId) -> bool {
        self.lazy.has_arcs(state)
    }

    fn flag_error(&self) {
        self.lazy.with_op(|op| op.error = true);
    }

    // Output state count, when the source count is known.
    fn output_count(&self) -> Option<usize> {
        if self.start().is_none() {
            return Some(0);
        }
        let (n, action) = self
            .lazy
            .with_op(|op| (op.fst.num_states_if_known(), op.final_action));
        let n = n?;
        let count = match action {
            MapFinalAction::NoSuperfinal => n,
            MapFinalAction::RequireSuperfinal => n + 1,
            MapFinalAction::AllowSuperfinal => self.lazy.with_op(|op| {
                op.resolve_all_finals(n);
                n + usize::from(op.superfinal.is_some())
            }),
        };
        Some(count)
    }
}

impl<W1, W2, F, M> Fst<W2> for ArcMapFst<'_, W1, W2, F, M>
where
    W1: Semiring,
    W2: Semiring,
    F: Fst<W1>,
    M: ArcMapper<W1, W2>,
{
    fn start(&self) -> Option<StateId> {
        self.lazy.start()
    }

    fn final_weight(&self, state: StateId) -> W2 {
        self.lazy.final_weight(state)
    }

    fn arcs(&self, state: StateId) -> ArcList<W2> {
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

    fn states(&self) -> Box<dyn Iterator<Item = StateId> + '_> {
        match self.output_count() {
            Some(n) => Box::new(0..n as StateId),
            None => Box::new(DiscoveredStates::new(self)),
        }
    }

    fn input_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.isymbols.clone()
    }

    fn output_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.osymbols.clone()
    }

    fn fst_type(&self) -> &'static str {
        "map"
    }
}

impl<W1, W2, F, M> CopyFst for ArcMapFst<'_, W1, W2, F, M>
where
    W1: Semiring,
    W2: Semiring,
    F: Fst<W1> + CopyFst,
    M: ArcMapper<W1, W2> + Clone,
{
    fn copy(&self, mode: CopyMode) -> Self {
        match mode {
            CopyMode::Shared => Self {
                lazy: self.lazy.clone(),
                isymbols: self.isymbols.clone(),
                osymbols: self.osymbols.clone(),
            },
            CopyMode::Safe => {
                let (fst, mapper) = self
                    .lazy
                    .with_op(|op| (op.fst.copy(CopyMode::Safe), op.mapper.to_owned_mapper()));
                Self::new(fst, mapper)
            }
        }
    }
}

/// Lazy arc map with an O(1) state count.
///
/// Only mappers that never add a superfinal state can be used, so the count
/// is always the source's.
pub struct ExpandedArcMapFst<'a, W1, W2, F, M> {
    inner: ArcMapFst<'a, W1, W2, F, M>,
    nstates: usize,
}

impl<'a, W1, W2, F, M> ExpandedArcMapFst<'a, W1, W2, F, M>
where
    W1: Semiring,
    W2: Semiring,
    F: ExpandedFst<W1>,
    M: StateCountPreserving<W1, W2>,
{
    pub fn new(fst: F, mapper: M) -> Self {
        let nstates = fst.num_states();
        Self::checked(ArcMapFst::new(fst, mapper), nstates)
    }

    pub fn with_borrowed_mapper(fst: F, mapper: &'a mut M) -> Self {
        let nstates = fst.num_states();
        Self::checked(ArcMapFst::with_borrowed_mapper(fst, mapper), nstates)
    }

    fn checked(inner: ArcMapFst<'a, W1, W2, F, M>, nstates: usize) -> Self {
        let action = inner.final_action();
        if action != MapFinalAction::NoSuperfinal {
            error!(?action, "counted arc map needs a mapper that keeps final weights");
            inner.flag_error();
        }
        Self { inner, nstates }
    }

    /// The streaming view of the same automaton.
    pub fn as_streaming(&self) -> &ArcMapFst<'a, W1, W2, F, M> {
        &self.inner
    }
}

impl<W1, W2, F, M> Fst<W2> for ExpandedArcMapFst<'_, W1, W2, F, M>
where
    W1: Semiring,
    W2: Semiring,
    F: ExpandedFst<W1>,
    M: StateCountPreserving<W1, W2>,
{
    fn start(&self) -> Option<StateId> {
        self.inner.start()
    }

    fn final_weight(&self, state: StateId) -> W2 {
        self.inner.final_weight(state)
    }

    fn arcs(&self, state: StateId) -> ArcList<W2> {
        self.inner.arcs(state)
    }

    fn num_input_epsilons(&self, state: StateId) -> usize {
        self.inner.num_input_epsilons(state)
    }

    fn num_output_epsilons(&self, state: StateId) -> usize {
        self.inner.num_output_epsilons(state)
    }

    fn stored_properties(&self) -> FstProperties {
        self.inner.stored_properties() | FstProperties::EXPANDED
    }

    fn update_properties(&self, props: FstProperties) {
        self.inner.update_properties(props);
    }

    fn num_states_if_known(&self) -> Option<usize> {
        Some(self.nstates)
    }

    fn states(&self) -> Box<dyn Iterator<Item = StateId> + '_> {
        Box::new(0..self.nstates as StateId)
    }

    fn input_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.inner.input_symbols()
    }

    fn output_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.inner.output_symbols()
    }

    fn fst_type(&self) -> &'static str {
        "map"
    }
}

impl<W1, W2, F, M> ExpandedFst<W2> for ExpandedArcMapFst<'_, W1, W2, F, M>
where
    W1: Semiring,
    W2: Semiring,
    F: ExpandedFst<W1>,
    M: StateCountPreserving<W1, W2>,
{
    fn num_states(&self) -> usize {
        self.nstates
    }
}

impl<W1, W2, F, M> CopyFst for ExpandedArcMapFst<'_, W1, W2, F, M>
where
    W1: Semiring,
    W2: Semiring,
    F: ExpandedFst<W1> + CopyFst,
    M: StateCountPreserving<W1, W2> + Clone,
{
    fn copy(&self, mode: CopyMode) -> Self {
        Self {
            inner: self.inner.copy(mode),
            nstates: self.nstates,
        }
    }
}
