// Ready-made arc mappers.

use std::marker::PhantomData;

use tracing::error;

use wfst_core::properties::project_properties;
use wfst_core::{
    Arc, DivideWeight, EPSILON, FstError, FstProperties, Label, NO_STATE_ID, ReverseWeight,
    Semiring, WeightConvert, WeightPower, WeightQuantize,
};

use crate::arc_map::{ArcMapper, StateCountPreserving};
use crate::config::{MapFinalAction, MapSymbolsAction};

/// Returns every arc unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl<W: Semiring> ArcMapper<W, W> for IdentityMapper {
    fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W> {
        arc.clone()
    }

    fn final_action(&self) -> MapFinalAction {
        MapFinalAction::NoSuperfinal
    }

    fn input_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn output_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn properties(&self, inprops: FstProperties) -> FstProperties {
        inprops
    }
}

impl<W: Semiring> StateCountPreserving<W, W> for IdentityMapper {}

// Bits that can only be set by some arc. Without one of them the automaton
// may have no arcs, and an epsilon mapper cannot claim epsilons.
fn has_arcs(inprops: FstProperties) -> bool {
    inprops.intersects(
        FstProperties::NOT_ACCEPTOR
            | FstProperties::NON_I_DETERMINISTIC
            | FstProperties::NON_O_DETERMINISTIC
            | FstProperties::EPSILONS
            | FstProperties::I_EPSILONS
            | FstProperties::O_EPSILONS
            | FstProperties::NOT_I_LABEL_SORTED
            | FstProperties::NOT_O_LABEL_SORTED
            | FstProperties::CYCLIC
            | FstProperties::INITIAL_CYCLIC
            | FstProperties::NOT_TOP_SORTED,
    )
}

/// Replaces every input label with epsilon.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputEpsilonMapper;

impl<W: Semiring> ArcMapper<W, W> for InputEpsilonMapper {
    fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W> {
        Arc::new(EPSILON, arc.olabel, arc.weight.clone(), arc.nextstate)
    }

    fn final_action(&self) -> MapFinalAction {
        MapFinalAction::NoSuperfinal
    }

    fn input_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Clear
    }

    fn output_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn properties(&self, inprops: FstProperties) -> FstProperties {
        let props = (inprops & FstProperties::I_LABEL_INVARIANT) | FstProperties::I_LABEL_SORTED;
        if has_arcs(inprops) {
            props | FstProperties::I_EPSILONS
        } else {
            props
        }
    }
}

impl<W: Semiring> StateCountPreserving<W, W> for InputEpsilonMapper {}

/// Replaces every output label with epsilon.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputEpsilonMapper;

impl<W: Semiring> ArcMapper<W, W> for OutputEpsilonMapper {
    fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W> {
        Arc::new(arc.ilabel, EPSILON, arc.weight.clone(), arc.nextstate)
    }

    fn final_action(&self) -> MapFinalAction {
        MapFinalAction::NoSuperfinal
    }

    fn input_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn output_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Clear
    }

    fn properties(&self, inprops: FstProperties) -> FstProperties {
        let props = (inprops & FstProperties::O_LABEL_INVARIANT) | FstProperties::O_LABEL_SORTED;
        if has_arcs(inprops) {
            props | FstProperties::O_EPSILONS
        } else {
            props
        }
    }
}

impl<W: Semiring> StateCountPreserving<W, W> for OutputEpsilonMapper {}

/// Copies one side's label onto the other, making the result an acceptor.
/// The symbol table of the overwritten side is dropped.
#[derive(Debug, Clone, Copy)]
pub struct ProjectMapper {
    project_input: bool,
}

impl ProjectMapper {
    pub fn input() -> Self {
        Self {
            project_input: true,
        }
    }

    pub fn output() -> Self {
        Self {
            project_input: false,
        }
    }
}

impl<W: Semiring> ArcMapper<W, W> for ProjectMapper {
    fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W> {
        let label = if self.project_input {
            arc.ilabel
        } else {
            arc.olabel
        };
        Arc::new(label, label, arc.weight.clone(), arc.nextstate)
    }

    fn final_action(&self) -> MapFinalAction {
        MapFinalAction::NoSuperfinal
    }

    fn input_symbols_action(&self) -> MapSymbolsAction {
        if self.project_input {
            MapSymbolsAction::Copy
        } else {
            MapSymbolsAction::Clear
        }
    }

    fn output_symbols_action(&self) -> MapSymbolsAction {
        if self.project_input {
            MapSymbolsAction::Clear
        } else {
            MapSymbolsAction::Copy
        }
    }

    fn properties(&self, inprops: FstProperties) -> FstProperties {
        project_properties(inprops, self.project_input)
    }
}

impl<W: Semiring> StateCountPreserving<W, W> for ProjectMapper {}

/// Routes every final weight through a single superfinal state. With a
/// non-zero label, the arcs into the superfinal state carry that label on
/// both sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuperfinalMapper {
    label: Label,
}

impl SuperfinalMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(label: Label) -> Self {
        Self { label }
    }
}

impl<W: Semiring> ArcMapper<W, W> for SuperfinalMapper {
    fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W> {
        if self.label != EPSILON && arc.nextstate == NO_STATE_ID && !arc.weight.is_zero() {
            Arc::new(self.label, self.label, arc.weight.clone(), NO_STATE_ID)
        } else {
            arc.clone()
        }
    }

    fn final_action(&self) -> MapFinalAction {
        MapFinalAction::RequireSuperfinal
    }

    fn input_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn output_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn properties(&self, inprops: FstProperties) -> FstProperties {
        let props = inprops & FstProperties::ADD_SUPERFINAL;
        if self.label == EPSILON {
            props
        } else {
            props & FstProperties::I_LABEL_INVARIANT & FstProperties::O_LABEL_INVARIANT
        }
    }
}

/// Converts weights into another semiring.
///
/// A weight with no exact counterpart becomes `zero()` and the mapper
/// reports `ERROR` from then on.
#[derive(Debug, Clone)]
pub struct WeightConvertMapper<W1, W2> {
    error: bool,
    _weights: PhantomData<fn(W1) -> W2>,
}

impl<W1, W2> WeightConvertMapper<W1, W2> {
    pub fn new() -> Self {
        Self {
            error: false,
            _weights: PhantomData,
        }
    }
}

impl<W1, W2> Default for WeightConvertMapper<W1, W2> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W1, W2> ArcMapper<W1, W2> for WeightConvertMapper<W1, W2>
where
    W1: Semiring + WeightConvert<W2> + std::fmt::Display,
    W2: Semiring,
{
    fn map_arc(&mut self, arc: &Arc<W1>) -> Arc<W2> {
        let weight = match arc.weight.convert() {
            Some(weight) => weight,
            None => {
                let err = FstError::UnrepresentableWeight(arc.weight.to_string());
                error!(%err, "weight conversion failed");
                self.error = true;
                W2::zero()
            }
        };
        Arc::new(arc.ilabel, arc.olabel, weight, arc.nextstate)
    }

    fn final_action(&self) -> MapFinalAction {
        MapFinalAction::NoSuperfinal
    }

    fn input_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn output_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn properties(&self, inprops: FstProperties) -> FstProperties {
        if self.error {
            inprops | FstProperties::ERROR
        } else {
            inprops
        }
    }
}

impl<W1, W2> StateCountPreserving<W1, W2> for WeightConvertMapper<W1, W2>
where
    W1: Semiring + WeightConvert<W2> + std::fmt::Display,
    W2: Semiring,
{
}

// Weight-only mappers: labels and next states pass through, `zero()` stays
// `zero()`, and the structural bits are untouched.
macro_rules! weight_mapper {
    ($(#[$doc:meta])* $name:ident<W: $($bound:path),+> { $($field:ident: $fty:ty),* } |$this:ident, $w:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name<W> {
            $($field: $fty,)*
            _weight: PhantomData<fn() -> W>,
        }

        impl<W: $($bound +)+> ArcMapper<W, W> for $name<W> {
            fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W> {
                if arc.weight.is_zero() {
                    return arc.clone();
                }
                let $this = &*self;
                let $w = &arc.weight;
                Arc::new(arc.ilabel, arc.olabel, $body, arc.nextstate)
            }

            fn final_action(&self) -> MapFinalAction {
                MapFinalAction::NoSuperfinal
            }

            fn input_symbols_action(&self) -> MapSymbolsAction {
                MapSymbolsAction::Copy
            }

            fn output_symbols_action(&self) -> MapSymbolsAction {
                MapSymbolsAction::Copy
            }

            fn properties(&self, inprops: FstProperties) -> FstProperties {
                inprops & FstProperties::WEIGHT_INVARIANT
            }
        }
    };
}

weight_mapper! {
    /// `w ⊕ c` on every non-zero weight.
    PlusMapper<W: Semiring> { weight: W } |this, w| w.plus(&this.weight)
}

weight_mapper! {
    /// `w ⊗ c` on every non-zero weight.
    TimesMapper<W: Semiring> { weight: W } |this, w| w.times(&this.weight)
}

weight_mapper! {
    /// `w^k` on every non-zero weight.
    PowerMapper<W: WeightPower> { exponent: f32 } |this, w| w.power(this.exponent)
}

weight_mapper! {
    /// `one() / w` on every non-zero weight.
    InvertWeightMapper<W: DivideWeight> {} |_this, w| W::one().divide(w).unwrap_or_else(W::zero)
}

weight_mapper! {
    /// Rounds every non-zero weight to a multiple of `delta`.
    QuantizeMapper<W: WeightQuantize> { delta: f32 } |this, w| w.quantize(this.delta)
}

impl<W: Semiring> StateCountPreserving<W, W> for PlusMapper<W> {}
impl<W: Semiring> StateCountPreserving<W, W> for TimesMapper<W> {}
impl<W: WeightPower> StateCountPreserving<W, W> for PowerMapper<W> {}
impl<W: DivideWeight> StateCountPreserving<W, W> for InvertWeightMapper<W> {}
impl<W: WeightQuantize> StateCountPreserving<W, W> for QuantizeMapper<W> {}

impl<W> PlusMapper<W> {
    pub fn new(weight: W) -> Self {
        Self {
            weight,
            _weight: PhantomData,
        }
    }
}

impl<W> TimesMapper<W> {
    pub fn new(weight: W) -> Self {
        Self {
            weight,
            _weight: PhantomData,
        }
    }
}

impl<W> PowerMapper<W> {
    pub fn new(exponent: f32) -> Self {
        Self {
            exponent,
            _weight: PhantomData,
        }
    }
}

impl<W> InvertWeightMapper<W> {
    pub fn new() -> Self {
        Self {
            _weight: PhantomData,
        }
    }
}

impl<W> Default for InvertWeightMapper<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> QuantizeMapper<W> {
    pub fn new(delta: f32) -> Self {
        Self {
            delta,
            _weight: PhantomData,
        }
    }
}

impl<W> Default for QuantizeMapper<W> {
    fn default() -> Self {
        Self::new(wfst_core::weight::DELTA)
    }
}

/// Maps every non-zero weight to `one()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmWeightMapper;

impl<W: Semiring> ArcMapper<W, W> for RmWeightMapper {
    fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W> {
        let weight = if arc.weight.is_zero() {
            W::zero()
        } else {
            W::one()
        };
        Arc::new(arc.ilabel, arc.olabel, weight, arc.nextstate)
    }

    fn final_action(&self) -> MapFinalAction {
        MapFinalAction::NoSuperfinal
    }

    fn input_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn output_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn properties(&self, inprops: FstProperties) -> FstProperties {
        (inprops & FstProperties::WEIGHT_INVARIANT)
            | FstProperties::UNWEIGHTED
            | FstProperties::UNWEIGHTED_CYCLES
    }
}

impl<W: Semiring> StateCountPreserving<W, W> for RmWeightMapper {}

/// Moves weights into the reverse semiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseWeightMapper;

impl<W: ReverseWeight> ArcMapper<W, W::Reverse> for ReverseWeightMapper {
    fn map_arc(&mut self, arc: &Arc<W>) -> Arc<W::Reverse> {
        Arc::new(arc.ilabel, arc.olabel, arc.weight.reverse(), arc.nextstate)
    }

    fn final_action(&self) -> MapFinalAction {
        MapFinalAction::NoSuperfinal
    }

    fn input_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn output_symbols_action(&self) -> MapSymbolsAction {
        MapSymbolsAction::Copy
    }

    fn properties(&self, inprops: FstProperties) -> FstProperties {
        inprops
    }
}

impl<W: ReverseWeight> StateCountPreserving<W, W::Reverse> for ReverseWeightMapper {}
