// Lazy composition.
//
// A result state is a triple `(s1, s2, filter_state)`. At each state the
// output labels of the first operand are matched against the input labels of
// the second through a per-state label index. Epsilon moves that advance only
// one operand are admitted or rejected by the composition filter, whose small
// integer state rules out redundant epsilon paths.

use std::marker::PhantomData;
use std::sync;

use hashbrown::HashMap;
use tracing::error;

use wfst_core::properties::compose_properties;
use wfst_core::{
    Arc, EPSILON, FstError, FstProperties, Label, Semiring, StateId, SymbolTable, compat_symbols,
};

use crate::arc_map::arc_map_into;
use crate::cache::{FstOp, LazyFst, StateTable};
use crate::config::{ComposeFilter, ComposeOptions, CopyMode};
use crate::connect::connect;
use crate::fst::{ArcList, CopyFst, Fst, MutableFst};
use crate::mappers::IdentityMapper;

type FilterState = u8;

/// How a candidate result arc advances the operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    /// Both operands on a shared non-epsilon label.
    Match,
    /// Both operands on epsilon.
    Joint,
    /// The first operand alone, on an output epsilon.
    First,
    /// The second operand alone, on an input epsilon.
    Second,
}

// Facts about the current pair of operand states that the filters consult.
#[derive(Debug, Clone, Copy)]
struct FilterContext {
    state: FilterState,
    noeps1: bool,
    alleps1: bool,
    noeps2: bool,
    alleps2: bool,
}

/// Filter state reached by `mv`, or `None` if the filter blocks the move.
fn filter_move(filter: ComposeFilter, ctx: &FilterContext, mv: Move) -> Option<FilterState> {
    let fs = ctx.state;
    match filter {
        ComposeFilter::Auto | ComposeFilter::Sequence => match mv {
            Move::Second if ctx.alleps1 => None,
            Move::Second => Some(if ctx.noeps1 { 0 } else { 1 }),
            Move::First => (fs == 0).then_some(0),
            Move::Joint => None,
            Move::Match => Some(0),
        },
        ComposeFilter::AltSequence => match mv {
            Move::First if ctx.alleps2 => None,
            Move::First => Some(if ctx.noeps2 { 0 } else { 1 }),
            Move::Second => (fs == 0).then_some(0),
            Move::Joint => None,
            Move::Match => Some(0),
        },
        ComposeFilter::Match => match mv {
            Move::First if fs == 0 => {
                if ctx.noeps2 {
                    Some(0)
                } else if ctx.alleps2 {
                    None
                } else {
                    Some(1)
                }
            }
            Move::First => (fs == 1).then_some(1),
            Move::Second if fs == 0 => {
                if ctx.noeps1 {
                    Some(0)
                } else if ctx.alleps1 {
                    None
                } else {
                    Some(2)
                }
            }
            Move::Second => (fs == 2).then_some(2),
            Move::Joint => (fs == 0).then_some(0),
            Move::Match => Some(0),
        },
        ComposeFilter::NoMatch => (mv != Move::Joint).then_some(0),
        ComposeFilter::Null => matches!(mv, Move::Match | Move::Joint).then_some(0),
        ComposeFilter::Trivial => Some(0),
    }
}

// Arcs of one state of the second operand, indexed by input label.
struct LabelIndex {
    by_label: HashMap<Label, Vec<usize>>,
}

impl LabelIndex {
    fn new<W>(arcs: &[Arc<W>]) -> Self {
        let mut by_label: HashMap<Label, Vec<usize>> = HashMap::new();
        for (i, arc) in arcs.iter().enumerate() {
            by_label.entry(arc.ilabel).or_default().push(i);
        }
        Self { by_label }
    }

    fn find(&self, label: Label) -> &[usize] {
        self.by_label.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }
}

struct ComposeOp<W, F1, F2> {
    fst1: F1,
    fst2: F2,
    filter: ComposeFilter,
    table: StateTable<(StateId, StateId, FilterState)>,
    props: FstProperties,
    error: bool,
    _weight: PhantomData<fn() -> W>,
}

impl<W, F1, F2> ComposeOp<W, F1, F2>
where
    W: Semiring,
    F1: Fst<W>,
    F2: Fst<W>,
{
    fn new(fst1: F1, fst2: F2, filter: ComposeFilter) -> Self {
        let mut error = false;
        let osymbols1 = fst1.output_symbols();
        let isymbols2 = fst2.input_symbols();
        if !compat_symbols(osymbols1.as_deref(), isymbols2.as_deref()) {
            let err = FstError::IncompatibleSymbols { side: "output/input" };
            error!(%err, "compose: first output and second input tables differ");
            error = true;
        }
        let props = compose_properties(
            fst1.properties(FstProperties::ALL, false),
            fst2.properties(FstProperties::ALL, false),
        );
        Self {
            fst1,
            fst2,
            filter: filter.resolve(),
            table: StateTable::new(),
            props,
            error,
            _weight: PhantomData,
        }
    }

    fn tuple(&self, state: StateId) -> Option<(StateId, StateId, FilterState)> {
        self.table.tuple(state).copied()
    }
}

impl<W, F1, F2> FstOp<W> for ComposeOp<W, F1, F2>
where
    W: Semiring,
    F1: Fst<W>,
    F2: Fst<W>,
{
    const TYPE: &'static str = "compose";

    fn compute_start(&mut self) -> Option<StateId> {
        let s1 = self.fst1.start()?;
        let s2 = self.fst2.start()?;
        Some(self.table.find_id((s1, s2, 0)))
    }

    fn compute_final(&mut self, state: StateId) -> W {
        let Some((s1, s2, _)) = self.tuple(state) else {
            return W::zero();
        };
        let final1 = self.fst1.final_weight(s1);
        if final1.is_zero() {
            return W::zero();
        }
        final1.times(&self.fst2.final_weight(s2))
    }

    fn compute_arcs(&mut self, state: StateId) -> Vec<Arc<W>> {
        let Some((s1, s2, fs)) = self.tuple(state) else {
            return Vec::new();
        };
        let arcs1 = self.fst1.arcs(s1);
        let arcs2 = self.fst2.arcs(s2);
        let index = LabelIndex::new(arcs2.as_slice());
        let eps2 = index.find(EPSILON);

        let neps1 = arcs1.iter().filter(|a| a.olabel == EPSILON).count();
        let ctx = FilterContext {
            state: fs,
            noeps1: neps1 == 0,
            alleps1: neps1 == arcs1.len() && !self.fst1.is_final(s1),
            noeps2: eps2.is_empty(),
            alleps2: eps2.len() == arcs2.len() && !self.fst2.is_final(s2),
        };

        let mut out = Vec::new();
        for arc1 in arcs1.iter() {
            if arc1.olabel == EPSILON {
                if let Some(next_fs) = filter_move(self.filter, &ctx, Move::First) {
                    let next = self.table.find_id((arc1.nextstate, s2, next_fs));
                    out.push(Arc::new(arc1.ilabel, EPSILON, arc1.weight.clone(), next));
                }
            }
            let mv = if arc1.olabel == EPSILON {
                Move::Joint
            } else {
                Move::Match
            };
            let Some(next_fs) = filter_move(self.filter, &ctx, mv) else {
                continue;
            };
            for &i in index.find(arc1.olabel) {
                let arc2 = &arcs2[i];
                let next = self.table.find_id((arc1.nextstate, arc2.nextstate, next_fs));
                let weight = arc1.weight.times(&arc2.weight);
                out.push(Arc::new(arc1.ilabel, arc2.olabel, weight, next));
            }
        }
        if let Some(next_fs) = filter_move(self.filter, &ctx, Move::Second) {
            for &i in eps2 {
                let arc2 = &arcs2[i];
                let next = self.table.find_id((s1, arc2.nextstate, next_fs));
                out.push(Arc::new(EPSILON, arc2.olabel, arc2.weight.clone(), next));
            }
        }
        out
    }

    fn properties(&self) -> FstProperties {
        let failed = self.error
            || self.fst1.properties(FstProperties::ERROR, false).contains(FstProperties::ERROR)
            || self.fst2.properties(FstProperties::ERROR, false).contains(FstProperties::ERROR);
        if failed {
            self.props | FstProperties::ERROR
        } else {
            self.props
        }
    }
}

/// Composition of two transducers, computed on demand.
///
/// Paths of the result pair a path of `fst1` with a path of `fst2` whose
/// input string equals the first path's output string; weights multiply.
/// The filter from the options decides how epsilon moves on the two sides
/// are interleaved.
pub struct ComposeFst<W, F1, F2> {
    lazy: LazyFst<W, ComposeOp<W, F1, F2>>,
    isymbols: Option<sync::Arc<SymbolTable>>,
    osymbols: Option<sync::Arc<SymbolTable>>,
}

impl<W, F1, F2> ComposeFst<W, F1, F2>
where
    W: Semiring,
    F1: Fst<W>,
    F2: Fst<W>,
{
    pub fn new(fst1: F1, fst2: F2) -> Self {
        Self::with_filter(fst1, fst2, ComposeFilter::Auto)
    }

    /// Composition with the filter from `opts`. `opts.connect` only applies
    /// to the eager [`compose`].
    pub fn with_options(fst1: F1, fst2: F2, opts: &ComposeOptions) -> Self {
        Self::with_filter(fst1, fst2, opts.filter)
    }

    pub fn with_filter(fst1: F1, fst2: F2, filter: ComposeFilter) -> Self {
        let isymbols = fst1.input_symbols();
        let osymbols = fst2.output_symbols();
        Self {
            lazy: LazyFst::new(ComposeOp::new(fst1, fst2, filter)),
            isymbols,
            osymbols,
        }
    }

    /// The concrete filter in use.
    pub fn filter(&self) -> ComposeFilter {
        self.lazy.with_op(|op| op.filter)
    }

    /// Operand states behind a result state, if it has been discovered.
    pub fn state_tuple(&self, state: StateId) -> Option<(StateId, StateId)> {
        self.lazy
            .with_op(|op| op.tuple(state))
            .map(|(s1, s2, _)| (s1, s2))
    }

    pub fn num_expanded(&self) -> usize {
        self.lazy.num_expanded()
    }

    pub(crate) fn flag_error(&self) {
        self.lazy.with_op(|op| op.error = true);
    }
}

impl<W, F1, F2> Fst<W> for ComposeFst<W, F1, F2>
where
    W: Semiring,
    F1: Fst<W>,
    F2: Fst<W>,
{
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
        "compose"
    }
}

impl<W, F1, F2> CopyFst for ComposeFst<W, F1, F2>
where
    W: Semiring,
    F1: Fst<W> + CopyFst,
    F2: Fst<W> + CopyFst,
{
    fn copy(&self, mode: CopyMode) -> Self {
        match mode {
            CopyMode::Shared => Self {
                lazy: self.lazy.clone(),
                isymbols: self.isymbols.clone(),
                osymbols: self.osymbols.clone(),
            },
            CopyMode::Safe => {
                let (fst1, fst2, filter, error) = self.lazy.with_op(|op| {
                    (
                        op.fst1.copy(CopyMode::Safe),
                        op.fst2.copy(CopyMode::Safe),
                        op.filter,
                        op.error,
                    )
                });
                let copy = Self::with_filter(fst1, fst2, filter);
                if error {
                    copy.flag_error();
                }
                copy
            }
        }
    }
}

/// Writes the composition of `fst1` and `fst2` into `ofst`, trimming it
/// when `opts.connect` is set.
pub fn compose<W, F1, F2, M>(fst1: &F1, fst2: &F2, ofst: &mut M, opts: &ComposeOptions)
where
    W: Semiring,
    F1: Fst<W> + ?Sized,
    F2: Fst<W> + ?Sized,
    M: MutableFst<W> + ?Sized,
{
    let lazy = ComposeFst::with_options(fst1, fst2, opts);
    materialize(&lazy, ofst, opts.connect);
}

pub(crate) fn materialize<W, F, M>(fst: &F, ofst: &mut M, trim: bool)
where
    W: Semiring,
    F: Fst<W> + ?Sized,
    M: MutableFst<W> + ?Sized,
{
    arc_map_into(fst, ofst, &mut IdentityMapper);
    if trim {
        connect(ofst);
    }
}
