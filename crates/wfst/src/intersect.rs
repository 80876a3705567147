// Intersection of weighted acceptors, as composition restricted to acceptors.

use std::sync;

use tracing::error;

use wfst_core::{FstError, FstProperties, Semiring, StateId, SymbolTable};

use crate::compose::{ComposeFst, materialize};
use crate::config::{ComposeFilter, CopyMode, IntersectOptions};
use crate::fst::{ArcList, CopyFst, Fst, MutableFst};

/// Intersection of two acceptors, computed on demand.
///
/// Both operands must be acceptors; otherwise the result reports `ERROR`
/// but is still built. Matching is hash based, so neither operand needs to
/// be label sorted, though callers working with other implementations
/// should keep one of them input-label sorted.
pub struct IntersectFst<W, F1, F2> {
    inner: ComposeFst<W, F1, F2>,
}

fn is_acceptor<W: Semiring, F: Fst<W> + ?Sized>(fst: &F) -> bool {
    fst.properties(FstProperties::ACCEPTOR, true)
        .contains(FstProperties::ACCEPTOR)
}

impl<W, F1, F2> IntersectFst<W, F1, F2>
where
    W: Semiring,
    F1: Fst<W>,
    F2: Fst<W>,
{
    pub fn new(fst1: F1, fst2: F2) -> Self {
        Self::with_filter(fst1, fst2, ComposeFilter::Auto)
    }

    /// Intersection with the filter from `opts`. `opts.connect` only applies
    /// to the eager [`intersect`].
    pub fn with_options(fst1: F1, fst2: F2, opts: &IntersectOptions) -> Self {
        Self::with_filter(fst1, fst2, opts.filter)
    }

    pub fn with_filter(fst1: F1, fst2: F2, filter: ComposeFilter) -> Self {
        let acceptors = is_acceptor(&fst1) && is_acceptor(&fst2);
        let inner = ComposeFst::with_filter(fst1, fst2, filter);
        if !acceptors {
            error!(fst_type = "intersect", "{}", FstError::NotAcceptor);
            inner.flag_error();
        }
        Self { inner }
    }

    pub fn filter(&self) -> ComposeFilter {
        self.inner.filter()
    }
}

impl<W, F1, F2> Fst<W> for IntersectFst<W, F1, F2>
where
    W: Semiring,
    F1: Fst<W>,
    F2: Fst<W>,
{
    fn start(&self) -> Option<StateId> {
        self.inner.start()
    }

    fn final_weight(&self, state: StateId) -> W {
        self.inner.final_weight(state)
    }

    fn arcs(&self, state: StateId) -> ArcList<W> {
        self.inner.arcs(state)
    }

    fn num_input_epsilons(&self, state: StateId) -> usize {
        self.inner.num_input_epsilons(state)
    }

    fn num_output_epsilons(&self, state: StateId) -> usize {
        self.inner.num_output_epsilons(state)
    }

    fn stored_properties(&self) -> FstProperties {
        self.inner.stored_properties()
    }

    fn update_properties(&self, props: FstProperties) {
        self.inner.update_properties(props);
    }

    fn input_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.inner.input_symbols()
    }

    fn output_symbols(&self) -> Option<sync::Arc<SymbolTable>> {
        self.inner.output_symbols()
    }

    fn fst_type(&self) -> &'static str {
        "intersect"
    }
}

impl<W, F1, F2> CopyFst for IntersectFst<W, F1, F2>
where
    W: Semiring,
    F1: Fst<W> + CopyFst,
    F2: Fst<W> + CopyFst,
{
    fn copy(&self, mode: CopyMode) -> Self {
        Self {
            inner: self.inner.copy(mode),
        }
    }
}

/// Writes the intersection of `fst1` and `fst2` into `ofst`, trimming it
/// when `opts.connect` is set.
pub fn intersect<W, F1, F2, M>(fst1: &F1, fst2: &F2, ofst: &mut M, opts: &IntersectOptions)
where
    W: Semiring,
    F1: Fst<W> + ?Sized,
    F2: Fst<W> + ?Sized,
    M: MutableFst<W> + ?Sized,
{
    let lazy = IntersectFst::with_options(fst1, fst2, opts);
    materialize(&lazy, ofst, opts.connect);
}
