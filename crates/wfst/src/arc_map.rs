// Arc mappers and the eager arc-map algorithm.
//
// A mapper rewrites one arc at a time. Final weights reach it as the
// pseudo-arc `(0, 0, final, NO_STATE_ID)`; its `final_action` decides
// whether the mapped pseudo-arc stays a final weight or becomes an arc into
// a superfinal state.

use std::ops::{Deref, DerefMut};

use tracing::{debug, error};

use wfst_core::{Arc, FstError, FstProperties, Semiring, StateId};

use crate::config::{MapFinalAction, MapSymbolsAction};
use crate::fst::{Fst, MutableFst};

/// Per-arc transformation policy.
pub trait ArcMapper<W1: Semiring, W2: Semiring> {
    /// Maps one arc. For the final-weight pseudo-arc the result's
    /// `nextstate` is ignored.
    fn map_arc(&mut self, arc: &Arc<W1>) -> Arc<W2>;

    fn final_action(&self) -> MapFinalAction;

    fn input_symbols_action(&self) -> MapSymbolsAction;

    fn output_symbols_action(&self) -> MapSymbolsAction;

    /// Output property bits as a function of the input bits. Called with an
    /// empty mask, the `ERROR` bit reports errors the mapper itself hit.
    fn properties(&self, inprops: FstProperties) -> FstProperties;
}

/// Mappers that keep every state and never add a superfinal state, so the
/// mapped automaton has exactly the source's state count.
pub trait StateCountPreserving<W1: Semiring, W2: Semiring>: ArcMapper<W1, W2> {}

/// A mapper owned by the automaton that uses it, or borrowed from the
/// caller for the automaton's lifetime.
#[derive(Debug)]
pub enum MapperRef<'a, M> {
    Owned(M),
    Borrowed(&'a mut M),
}

impl<M> Deref for MapperRef<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        match self {
            MapperRef::Owned(m) => m,
            MapperRef::Borrowed(m) => m,
        }
    }
}

impl<M> DerefMut for MapperRef<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        match self {
            MapperRef::Owned(m) => m,
            MapperRef::Borrowed(m) => m,
        }
    }
}

impl<M: Clone> MapperRef<'_, M> {
    /// An owned clone, whichever way this one holds its mapper.
    pub fn to_owned_mapper(&self) -> M {
        (**self).clone()
    }
}

// Result of mapping one state's final weight.
pub(crate) struct MappedFinal<W> {
    pub final_weight: W,
    /// Arc to redirect through the superfinal state, `nextstate` unset.
    pub superfinal_arc: Option<Arc<W>>,
}

/// Applies the final-action rules to a state's final weight. Sets `error`
/// when a no-superfinal mapper puts labels on the pseudo-arc.
pub(crate) fn map_final<W1, W2, M>(
    mapper: &mut M,
    final_action: MapFinalAction,
    state: StateId,
    final_weight: W1,
    error: &mut bool,
) -> MappedFinal<W2>
where
    W1: Semiring,
    W2: Semiring,
    M: ArcMapper<W1, W2> + ?Sized,
{
    let arc = mapper.map_arc(&Arc::final_pseudo(final_weight));
    let labelled = arc.ilabel != 0 || arc.olabel != 0;
    match final_action {
        MapFinalAction::NoSuperfinal => {
            if labelled {
                error!(state, "{}", FstError::SuperfinalLabels { state });
                *error = true;
            }
            MappedFinal {
                final_weight: arc.weight,
                superfinal_arc: None,
            }
        }
        MapFinalAction::AllowSuperfinal if labelled => MappedFinal {
            final_weight: W2::zero(),
            superfinal_arc: Some(arc),
        },
        MapFinalAction::AllowSuperfinal => MappedFinal {
            final_weight: arc.weight,
            superfinal_arc: None,
        },
        MapFinalAction::RequireSuperfinal => {
            let keep = labelled || !arc.weight.is_zero();
            MappedFinal {
                final_weight: W2::zero(),
                superfinal_arc: keep.then_some(arc),
            }
        }
    }
}

// Collects the first mutation failure; the caller turns it into the error bit.
fn check(result: Result<(), FstError>, error: &mut bool) {
    if let Err(err) = result {
        error!(%err, "arc map could not update the output");
        *error = true;
    }
}

/// Maps `fst` in place.
///
/// An automaton without a start state is left as is (apart from cleared
/// symbol tables).
pub fn arc_map<W, F, M>(fst: &mut F, mapper: &mut M)
where
    W: Semiring,
    F: MutableFst<W> + ?Sized,
    M: ArcMapper<W, W> + ?Sized,
{
    if mapper.input_symbols_action() == MapSymbolsAction::Clear {
        fst.set_input_symbols(None);
    }
    if mapper.output_symbols_action() == MapSymbolsAction::Clear {
        fst.set_output_symbols(None);
    }
    if fst.start().is_none() {
        return;
    }
    let props = fst.properties(FstProperties::ALL, false);
    let final_action = mapper.final_action();
    let mut error = false;

    let mut superfinal = None;
    if final_action == MapFinalAction::RequireSuperfinal {
        let sf = fst.add_state();
        check(fst.set_final(sf, W::one()), &mut error);
        superfinal = Some(sf);
    }

    let mut state: StateId = 0;
    while (state as usize) < fst.num_states() {
        if superfinal == Some(state) {
            state += 1;
            continue;
        }
        let arcs = fst.arcs(state);
        for (index, arc) in arcs.iter().enumerate() {
            let mapped = mapper.map_arc(arc);
            check(fst.set_arc(state, index, mapped), &mut error);
        }

        let mapped = map_final(mapper, final_action, state, fst.final_weight(state), &mut error);
        if let Some(mut arc) = mapped.superfinal_arc {
            let sf = match superfinal {
                Some(sf) => sf,
                None => {
                    let sf = fst.add_state();
                    check(fst.set_final(sf, W::one()), &mut error);
                    debug!(superfinal = sf, "arc map added a superfinal state");
                    superfinal = Some(sf);
                    sf
                }
            };
            arc.nextstate = sf;
            check(fst.add_arc(state, arc), &mut error);
        }
        check(fst.set_final(state, mapped.final_weight), &mut error);
        state += 1;
    }

    fst.set_properties(mapper.properties(props), FstProperties::ALL);
    if error {
        fst.set_properties(FstProperties::ERROR, FstProperties::ERROR);
    }
}

/// Maps `ifst` into `ofst`, replacing whatever `ofst` held.
pub fn arc_map_into<W1, W2, F1, F2, M>(ifst: &F1, ofst: &mut F2, mapper: &mut M)
where
    W1: Semiring,
    W2: Semiring,
    F1: Fst<W1> + ?Sized,
    F2: MutableFst<W2> + ?Sized,
    M: ArcMapper<W1, W2> + ?Sized,
{
    ofst.delete_states();
    match mapper.input_symbols_action() {
        MapSymbolsAction::Copy => ofst.set_input_symbols(ifst.input_symbols()),
        MapSymbolsAction::Clear => ofst.set_input_symbols(None),
        MapSymbolsAction::Noop => {}
    }
    match mapper.output_symbols_action() {
        MapSymbolsAction::Copy => ofst.set_output_symbols(ifst.output_symbols()),
        MapSymbolsAction::Clear => ofst.set_output_symbols(None),
        MapSymbolsAction::Noop => {}
    }

    let iprops = ifst.properties(FstProperties::COPY, false);
    let Some(start) = ifst.start() else {
        if iprops.contains(FstProperties::ERROR) {
            ofst.set_properties(FstProperties::ERROR, FstProperties::ERROR);
        }
        return;
    };

    let final_action = mapper.final_action();
    let extra = usize::from(final_action != MapFinalAction::NoSuperfinal);
    if let Some(n) = ifst.num_states_if_known() {
        ofst.reserve_states(n + extra);
    }
    let states: Vec<StateId> = ifst.states().collect();
    let nstates = states.last().map_or(0, |&s| s as usize + 1);
    ofst.add_states(nstates);

    let mut error = false;
    let mut superfinal = None;
    if final_action == MapFinalAction::RequireSuperfinal {
        let sf = ofst.add_state();
        check(ofst.set_final(sf, W2::one()), &mut error);
        superfinal = Some(sf);
    }

    for &state in &states {
        if state == start {
            check(ofst.set_start(state), &mut error);
        }
        check(ofst.reserve_arcs(state, ifst.num_arcs(state) + extra), &mut error);
        for arc in ifst.arcs(state).iter() {
            let mapped = mapper.map_arc(arc);
            check(ofst.add_arc(state, mapped), &mut error);
        }
        let mapped = map_final(mapper, final_action, state, ifst.final_weight(state), &mut error);
        if let Some(mut arc) = mapped.superfinal_arc {
            let sf = match superfinal {
                Some(sf) => sf,
                None => {
                    let sf = ofst.add_state();
                    check(ofst.set_final(sf, W2::one()), &mut error);
                    debug!(superfinal = sf, "arc map added a superfinal state");
                    superfinal = Some(sf);
                    sf
                }
            };
            arc.nextstate = sf;
            check(ofst.add_arc(state, arc), &mut error);
        }
        check(ofst.set_final(state, mapped.final_weight), &mut error);
    }

    let oprops = ofst.properties(FstProperties::ALL, false);
    ofst.set_properties(mapper.properties(iprops) | oprops, FstProperties::ALL);
    if error {
        ofst.set_properties(FstProperties::ERROR, FstProperties::ERROR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::{
        IdentityMapper, InputEpsilonMapper, PlusMapper, SuperfinalMapper, TimesMapper,
        WeightConvertMapper,
    };
    use crate::vector::VectorFst;
    use crate::fst::ExpandedFst;
    use wfst_core::{LogWeight, SymbolTable, TropicalWeight};

    type W = TropicalWeight;

    fn sample() -> VectorFst<W> {
        let mut fst = VectorFst::new();
        fst.add_states(3);
        fst.set_start(0).unwrap();
        fst.add_arc(0, Arc::new(1, 2, TropicalWeight(1.0), 1)).unwrap();
        fst.add_arc(1, Arc::new(3, 3, TropicalWeight(0.5), 2)).unwrap();
        fst.add_arc(1, Arc::new(4, 4, W::one(), 0)).unwrap();
        fst.set_final(1, TropicalWeight(2.0)).unwrap();
        fst.set_final(2, W::one()).unwrap();
        fst
    }

    // Puts the final weight on a labelled arc.
    struct LabelFinals(MapFinalAction);

    impl ArcMapper<W, W> for LabelFinals {
        fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W> {
            if arc.nextstate == wfst_core::NO_STATE_ID && !arc.weight.is_zero() {
                Arc::new(9, 9, arc.weight.clone(), arc.nextstate)
            } else {
                arc.clone()
            }
        }
        fn final_action(&self) -> MapFinalAction {
            self.0
        }
        fn input_symbols_action(&self) -> MapSymbolsAction {
            MapSymbolsAction::Copy
        }
        fn output_symbols_action(&self) -> MapSymbolsAction {
            MapSymbolsAction::Copy
        }
        fn properties(&self, _inprops: FstProperties) -> FstProperties {
            FstProperties::empty()
        }
    }

    #[test]
    fn identity_in_place_is_a_no_op() {
        let mut fst = sample();
        let before = fst.clone();
        arc_map(&mut fst, &mut IdentityMapper);
        assert_eq!(fst.num_states(), before.num_states());
        for s in 0..3 {
            assert_eq!(*fst.arcs(s), *before.arcs(s));
            assert_eq!(fst.final_weight(s), before.final_weight(s));
        }
        assert!(
            !fst.properties(FstProperties::ERROR, false)
                .contains(FstProperties::ERROR)
        );
    }

    #[test]
    fn input_epsilon_copy() {
        let src = sample();
        let mut out = VectorFst::new();
        arc_map_into(&src, &mut out, &mut InputEpsilonMapper);
        assert_eq!(out.start(), Some(0));
        assert_eq!(*out.arcs(0), vec![Arc::new(0, 2, TropicalWeight(1.0), 1)]);
        assert_eq!(out.final_weight(1), TropicalWeight(2.0));
        assert!(out.stored_properties().contains(FstProperties::I_EPSILONS));
    }

    #[test]
    fn times_mapper_touches_finals() {
        let mut fst = sample();
        arc_map(&mut fst, &mut TimesMapper::new(TropicalWeight(1.0)));
        assert_eq!(fst.final_weight(1), TropicalWeight(3.0));
        assert_eq!(fst.final_weight(2), TropicalWeight(1.0));
        assert_eq!(fst.final_weight(0), W::zero());
        assert_eq!(fst.arcs(1)[0].weight, TropicalWeight(1.5));
    }

    #[test]
    fn require_superfinal_in_place() {
        let mut fst = sample();
        arc_map(&mut fst, &mut SuperfinalMapper::new());
        assert_eq!(fst.num_states(), 4);
        let finals: Vec<_> = (0..4).filter(|&s| fst.is_final(s)).collect();
        assert_eq!(finals, vec![3]);
        assert_eq!(fst.final_weight(3), W::one());
        assert_eq!(fst.arcs(1).last(), Some(&Arc::new(0, 0, TropicalWeight(2.0), 3)));
        assert_eq!(fst.arcs(2).len(), 1);
        assert_eq!(fst.num_arcs(0), 1);
    }

    #[test]
    fn require_superfinal_copy() {
        let src = sample();
        let mut out = VectorFst::new();
        arc_map_into(&src, &mut out, &mut SuperfinalMapper::new());
        assert_eq!(out.num_states(), 4);
        assert_eq!(out.final_weight(3), W::one());
        assert!(!out.is_final(1));
        assert_eq!(*out.arcs(2), vec![Arc::new(0, 0, W::one(), 3)]);
    }

    #[test]
    fn allow_superfinal_created_on_demand() {
        let mut fst = sample();
        arc_map(&mut fst, &mut LabelFinals(MapFinalAction::AllowSuperfinal));
        assert_eq!(fst.num_states(), 4);
        assert_eq!(fst.arcs(1).last(), Some(&Arc::new(9, 9, TropicalWeight(2.0), 3)));
        assert_eq!(fst.arcs(2).last(), Some(&Arc::new(9, 9, W::one(), 3)));
        assert!(!fst.is_final(1));
        assert!(fst.is_final(3));
        assert_eq!(fst.num_arcs(3), 0);
    }

    #[test]
    fn labelled_final_without_superfinal_is_an_error() {
        let src = sample();
        let mut out = VectorFst::new();
        arc_map_into(&src, &mut out, &mut LabelFinals(MapFinalAction::NoSuperfinal));
        assert!(out.properties(FstProperties::ERROR, false).contains(FstProperties::ERROR));
        assert!(src.properties(FstProperties::ERROR, false).is_empty());
    }

    #[test]
    fn empty_input_maps_to_empty_output() {
        let src = VectorFst::<W>::new();
        let mut out = sample();
        arc_map_into(&src, &mut out, &mut SuperfinalMapper::new());
        assert_eq!(out.num_states(), 0);
        assert_eq!(out.start(), None);

        let mut empty = VectorFst::<W>::new();
        empty.add_state();
        arc_map(&mut empty, &mut SuperfinalMapper::new());
        assert_eq!(empty.num_states(), 1);
    }

    #[test]
    fn error_on_empty_input_carries_over() {
        let mut src = VectorFst::<W>::new();
        src.set_properties(FstProperties::ERROR, FstProperties::ERROR);
        let mut out = VectorFst::new();
        arc_map_into(&src, &mut out, &mut IdentityMapper);
        assert!(out.properties(FstProperties::ERROR, false).contains(FstProperties::ERROR));
    }

    #[test]
    fn plus_mapper_keeps_min() {
        let mut fst = sample();
        arc_map(&mut fst, &mut PlusMapper::new(TropicalWeight(0.75)));
        assert_eq!(fst.arcs(0)[0].weight, TropicalWeight(0.75));
        assert_eq!(fst.arcs(1)[0].weight, TropicalWeight(0.5));
    }

    #[test]
    fn convert_between_weight_types() {
        let mut src = sample();
        src.set_input_symbols(Some(std::sync::Arc::new(SymbolTable::with_epsilon("in"))));
        let mut out: VectorFst<LogWeight> = VectorFst::new();
        arc_map_into(&src, &mut out, &mut WeightConvertMapper::new());
        assert_eq!(out.arcs(1)[0].weight, LogWeight(0.5));
        assert_eq!(out.final_weight(1), LogWeight(2.0));
        assert!(out.input_symbols().is_some());
    }

    #[test]
    fn borrowed_mapper_ref_derefs() {
        let mut mapper = TimesMapper::new(TropicalWeight(2.0));
        let mut by_ref = MapperRef::Borrowed(&mut mapper);
        let arc = by_ref.map_arc(&Arc::new(1, 1, W::one(), 0));
        assert_eq!(arc.weight, TropicalWeight(2.0));
        let owned = by_ref.to_owned_mapper();
        let by_value: MapperRef<'_, TimesMapper<W>> = MapperRef::Owned(owned);
        assert_eq!(by_value.final_action(), MapFinalAction::NoSuperfinal);
    }
}
