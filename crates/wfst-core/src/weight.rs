// Semiring weights: the contract and the tropical, log and boolean semirings.
//
// Algorithms only rely on Zero, One, Plus, Times and equality. The optional
// capabilities (divide, power, quantize, reverse, conversion) are separate
// traits so a mapper states exactly what it needs from its weight type.

use std::fmt;

/// Default quantization delta.
pub const DELTA: f32 = 1.0 / 1024.0;

/// A semiring weight.
///
/// `zero()` is the annihilator for `times` and the identity for `plus`;
/// `one()` is the identity for `times`. A final weight equal to `zero()`
/// means "not final".
pub trait Semiring: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    fn zero() -> Self;
    fn one() -> Self;
    fn plus(&self, rhs: &Self) -> Self;
    fn times(&self, rhs: &Self) -> Self;

    #[inline]
    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    #[inline]
    fn is_one(&self) -> bool {
        *self == Self::one()
    }

    /// Approximate equality within `delta`. Exact for non-numeric semirings.
    fn approx_eq(&self, other: &Self, _delta: f32) -> bool {
        self == other
    }
}

/// Left division. Returns `None` when the quotient is undefined
/// (for example dividing by `zero()`).
pub trait DivideWeight: Semiring {
    fn divide(&self, rhs: &Self) -> Option<Self>;
}

/// Repeated `times`, generalized to real exponents where the semiring allows it.
pub trait WeightPower: Semiring {
    fn power(&self, exponent: f32) -> Self;
}

/// Rounds a weight to a multiple of `delta`.
pub trait WeightQuantize: Semiring {
    fn quantize(&self, delta: f32) -> Self;
}

/// The reverse semiring. Commutative semirings are their own reverse.
pub trait ReverseWeight: Semiring {
    type Reverse: Semiring;

    fn reverse(&self) -> Self::Reverse;
}

/// Conversion into another weight type.
///
/// Returns `None` when the value has no exact counterpart in the target
/// semiring.
pub trait WeightConvert<To: Semiring> {
    fn convert(&self) -> Option<To>;
}

impl<W: Semiring> WeightConvert<W> for W {
    #[inline]
    fn convert(&self) -> Option<W> {
        Some(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Tropical semiring: (min, +, inf, 0)
// ---------------------------------------------------------------------------

/// Tropical weight over `f32`: `plus` is `min`, `times` is `+`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TropicalWeight(pub f32);

impl TropicalWeight {
    pub fn new(value: f32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Semiring for TropicalWeight {
    #[inline]
    fn zero() -> Self {
        Self(f32::INFINITY)
    }

    #[inline]
    fn one() -> Self {
        Self(0.0)
    }

    #[inline]
    fn plus(&self, rhs: &Self) -> Self {
        if rhs.0 < self.0 { *rhs } else { *self }
    }

    #[inline]
    fn times(&self, rhs: &Self) -> Self {
        if self.0 == f32::INFINITY || rhs.0 == f32::INFINITY {
            Self::zero()
        } else {
            Self(self.0 + rhs.0)
        }
    }

    fn approx_eq(&self, other: &Self, delta: f32) -> bool {
        float_approx_eq(self.0, other.0, delta)
    }
}

impl DivideWeight for TropicalWeight {
    fn divide(&self, rhs: &Self) -> Option<Self> {
        float_divide(self.0, rhs.0).map(Self)
    }
}

impl WeightPower for TropicalWeight {
    fn power(&self, exponent: f32) -> Self {
        float_power(self.0, exponent).map_or_else(Self::one, Self)
    }
}

impl WeightQuantize for TropicalWeight {
    fn quantize(&self, delta: f32) -> Self {
        Self(float_quantize(self.0, delta))
    }
}

impl ReverseWeight for TropicalWeight {
    type Reverse = TropicalWeight;

    fn reverse(&self) -> Self {
        *self
    }
}

impl fmt::Display for TropicalWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_float(f, self.0)
    }
}

// ---------------------------------------------------------------------------
// Log semiring: (-log(e^-a + e^-b), +, inf, 0)
// ---------------------------------------------------------------------------

/// Negative log probability weight over `f32`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogWeight(pub f32);

impl LogWeight {
    pub fn new(value: f32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Semiring for LogWeight {
    #[inline]
    fn zero() -> Self {
        Self(f32::INFINITY)
    }

    #[inline]
    fn one() -> Self {
        Self(0.0)
    }

    fn plus(&self, rhs: &Self) -> Self {
        let (a, b) = (self.0, rhs.0);
        if a == f32::INFINITY {
            return *rhs;
        }
        if b == f32::INFINITY {
            return *self;
        }
        // Stable log-sum-exp on negated values.
        if a > b {
            Self(b - (b - a).exp().ln_1p())
        } else {
            Self(a - (a - b).exp().ln_1p())
        }
    }

    #[inline]
    fn times(&self, rhs: &Self) -> Self {
        if self.0 == f32::INFINITY || rhs.0 == f32::INFINITY {
            Self::zero()
        } else {
            Self(self.0 + rhs.0)
        }
    }

    fn approx_eq(&self, other: &Self, delta: f32) -> bool {
        float_approx_eq(self.0, other.0, delta)
    }
}

impl DivideWeight for LogWeight {
    fn divide(&self, rhs: &Self) -> Option<Self> {
        float_divide(self.0, rhs.0).map(Self)
    }
}

impl WeightPower for LogWeight {
    fn power(&self, exponent: f32) -> Self {
        float_power(self.0, exponent).map_or_else(Self::one, Self)
    }
}

impl WeightQuantize for LogWeight {
    fn quantize(&self, delta: f32) -> Self {
        Self(float_quantize(self.0, delta))
    }
}

impl ReverseWeight for LogWeight {
    type Reverse = LogWeight;

    fn reverse(&self) -> Self {
        *self
    }
}

impl fmt::Display for LogWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_float(f, self.0)
    }
}

// ---------------------------------------------------------------------------
// Boolean semiring: (or, and, false, true)
// ---------------------------------------------------------------------------

/// Boolean weight. Unweighted automata are automata over this semiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BooleanWeight(pub bool);

impl Semiring for BooleanWeight {
    #[inline]
    fn zero() -> Self {
        Self(false)
    }

    #[inline]
    fn one() -> Self {
        Self(true)
    }

    #[inline]
    fn plus(&self, rhs: &Self) -> Self {
        Self(self.0 || rhs.0)
    }

    #[inline]
    fn times(&self, rhs: &Self) -> Self {
        Self(self.0 && rhs.0)
    }
}

impl DivideWeight for BooleanWeight {
    fn divide(&self, rhs: &Self) -> Option<Self> {
        if rhs.0 { Some(*self) } else { None }
    }
}

impl ReverseWeight for BooleanWeight {
    type Reverse = BooleanWeight;

    fn reverse(&self) -> Self {
        *self
    }
}

impl fmt::Display for BooleanWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0 { "1" } else { "0" })
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl WeightConvert<LogWeight> for TropicalWeight {
    fn convert(&self) -> Option<LogWeight> {
        Some(LogWeight(self.0))
    }
}

impl WeightConvert<TropicalWeight> for LogWeight {
    fn convert(&self) -> Option<TropicalWeight> {
        Some(TropicalWeight(self.0))
    }
}

impl WeightConvert<TropicalWeight> for BooleanWeight {
    fn convert(&self) -> Option<TropicalWeight> {
        Some(if self.0 {
            TropicalWeight::one()
        } else {
            TropicalWeight::zero()
        })
    }
}

impl WeightConvert<LogWeight> for BooleanWeight {
    fn convert(&self) -> Option<LogWeight> {
        Some(if self.0 { LogWeight::one() } else { LogWeight::zero() })
    }
}

impl WeightConvert<BooleanWeight> for TropicalWeight {
    fn convert(&self) -> Option<BooleanWeight> {
        boolean_from_float(self.0)
    }
}

impl WeightConvert<BooleanWeight> for LogWeight {
    fn convert(&self) -> Option<BooleanWeight> {
        boolean_from_float(self.0)
    }
}

// Only the two identities survive the trip into the boolean semiring.
fn boolean_from_float(value: f32) -> Option<BooleanWeight> {
    if value == f32::INFINITY {
        Some(BooleanWeight(false))
    } else if value == 0.0 {
        Some(BooleanWeight(true))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Float helpers shared by the tropical and log semirings
// ---------------------------------------------------------------------------

fn float_approx_eq(a: f32, b: f32, delta: f32) -> bool {
    if a == b {
        return true;
    }
    a <= b + delta && b <= a + delta
}

fn float_divide(a: f32, b: f32) -> Option<f32> {
    if b == f32::INFINITY {
        None
    } else if a == f32::INFINITY {
        Some(f32::INFINITY)
    } else {
        Some(a - b)
    }
}

fn float_power(value: f32, exponent: f32) -> Option<f32> {
    if exponent == 0.0 {
        None
    } else if value == f32::INFINITY {
        Some(f32::INFINITY)
    } else {
        Some(value * exponent)
    }
}

fn float_quantize(value: f32, delta: f32) -> f32 {
    if value.is_infinite() || value.is_nan() {
        value
    } else {
        (value / delta + 0.5).floor() * delta
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, value: f32) -> fmt::Result {
    if value == f32::INFINITY {
        f.write_str("Infinity")
    } else {
        write!(f, "{value}")
    }
}
