//! Property tests: the eager and lazy arc maps describe the same automaton,
//! and eager union adds at most one state.
//!
//! Run: cargo test -p wfst --test equivalence

use std::collections::{HashMap, VecDeque};

use proptest::prelude::*;

use wfst::mappers::{IdentityMapper, SuperfinalMapper, TimesMapper};
use wfst::{
    ArcMapFst, ArcMapper, ExpandedFst, Fst, MapFinalAction, MapSymbolsAction, MutableFst,
    UnionFst, VectorFst, arc_map, arc_map_into, count_states, union,
};
use wfst_core::{Arc, FstProperties, Label, NO_STATE_ID, Semiring, StateId, TropicalWeight};

type W = TropicalWeight;

/// A state as seen from the start: final weight and arcs with renumbered
/// targets.
type Canonical = Vec<(W, Vec<(Label, Label, W, StateId)>)>;

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

type RawArc = (StateId, Label, Label, u8, StateId);

fn build(n: usize, arcs: Vec<RawArc>, finals: Vec<Option<u8>>) -> VectorFst<W> {
    let mut fst = VectorFst::new();
    fst.add_states(n);
    fst.set_start(0).unwrap();
    for (src, ilabel, olabel, w, dst) in arcs {
        fst.add_arc(src, Arc::new(ilabel, olabel, TropicalWeight(f32::from(w)), dst))
            .unwrap();
    }
    for (s, w) in finals.into_iter().enumerate() {
        if let Some(w) = w {
            fst.set_final(s as StateId, TropicalWeight(f32::from(w))).unwrap();
        }
    }
    fst
}

fn arb_fst() -> impl Strategy<Value = VectorFst<W>> {
    (1_usize..7)
        .prop_flat_map(|n| {
            let top = n as StateId;
            let arc = (0..top, 0..3 as Label, 0..3 as Label, 0_u8..4, 0..top);
            (
                Just(n),
                prop::collection::vec(arc, 0..14),
                prop::collection::vec(prop::option::of(0_u8..4), n),
            )
        })
        .prop_map(|(n, arcs, finals)| build(n, arcs, finals))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Breadth-first renumbering from the start state, following arcs in order.
fn canonical<F: Fst<W> + ?Sized>(fst: &F) -> Canonical {
    let Some(start) = fst.start() else {
        return Vec::new();
    };
    let mut ids: HashMap<StateId, StateId> = HashMap::from([(start, 0)]);
    let mut queue = VecDeque::from([start]);
    let mut out = Vec::new();
    while let Some(s) = queue.pop_front() {
        let mut arcs = Vec::new();
        for arc in fst.arcs(s).iter() {
            let next = ids.len() as StateId;
            let id = *ids.entry(arc.nextstate).or_insert_with(|| {
                queue.push_back(arc.nextstate);
                next
            });
            arcs.push((arc.ilabel, arc.olabel, arc.weight, id));
        }
        out.push((fst.final_weight(s), arcs));
    }
    out
}

/// Sends odd final weights through a labelled superfinal arc.
#[derive(Debug, Clone, Copy)]
struct LabelOddFinals;

impl ArcMapper<W, W> for LabelOddFinals {
    fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W> {
        let odd = arc.weight.0 as u32 % 2 == 1;
        if arc.nextstate == NO_STATE_ID && !arc.weight.is_zero() && odd {
            Arc::new(7, 7, arc.weight, arc.nextstate)
        } else {
            arc.clone()
        }
    }

    fn final_action(&self) -> MapFinalAction {
        MapFinalAction::AllowSuperfinal
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

fn assert_eager_matches_lazy<M>(src: &VectorFst<W>, mapper: M) -> Result<(), TestCaseError>
where
    M: ArcMapper<W, W> + Clone,
{
    let mut copied = VectorFst::new();
    arc_map_into(src, &mut copied, &mut mapper.clone());

    let mut in_place = src.clone();
    arc_map(&mut in_place, &mut mapper.clone());

    let lazy = ArcMapFst::new(src, mapper);
    prop_assert_eq!(copied.num_states(), count_states(&lazy));
    prop_assert_eq!(in_place.num_states(), copied.num_states());
    prop_assert_eq!(canonical(&copied), canonical(&lazy));
    prop_assert_eq!(canonical(&in_place), canonical(&copied));
    Ok(())
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_identity_map_matches_source(src in arb_fst()) {
        assert_eager_matches_lazy(&src, IdentityMapper)?;
        prop_assert_eq!(canonical(&ArcMapFst::new(&src, IdentityMapper)), canonical(&src));
    }

    #[test]
    fn prop_times_map_eager_matches_lazy(src in arb_fst(), w in 0_u8..3) {
        assert_eager_matches_lazy(&src, TimesMapper::new(TropicalWeight(f32::from(w))))?;
    }

    #[test]
    fn prop_require_superfinal_eager_matches_lazy(src in arb_fst(), label in 0..2 as Label) {
        assert_eager_matches_lazy(&src, SuperfinalMapper::with_label(label))?;
    }

    #[test]
    fn prop_allow_superfinal_eager_matches_lazy(src in arb_fst()) {
        assert_eager_matches_lazy(&src, LabelOddFinals)?;
    }

    #[test]
    fn prop_union_adds_at_most_one_state(a in arb_fst(), b in arb_fst()) {
        let reuse_start = a
            .properties(FstProperties::INITIAL_ACYCLIC, false)
            .contains(FstProperties::INITIAL_ACYCLIC);
        let expected = a.num_states() + b.num_states() + usize::from(!reuse_start);

        let lazy = UnionFst::new(a.clone(), b.clone());
        prop_assert_eq!(lazy.num_arcs(0), 2);

        let mut eager = a;
        union(&mut eager, &b);
        prop_assert_eq!(eager.num_states(), expected);
        prop_assert!(
            !eager
                .properties(FstProperties::ERROR, false)
                .contains(FstProperties::ERROR)
        );
    }
}
