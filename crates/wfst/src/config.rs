// Construction options and policy enums.
//
// Everything here is plain data with a `Default`, so callers can build
// options inline or (with the `serde` feature) load them from a config file.

use std::fmt;
use std::str::FromStr;

use wfst_core::FstError;

/// How a mapper's final weights are expressed in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MapFinalAction {
    /// A final weight maps to a final weight. Non-epsilon labels on the mapped
    /// pseudo-arc are an error.
    #[default]
    NoSuperfinal,
    /// A mapped pseudo-arc with labels becomes an arc into a superfinal state,
    /// which is created the first time it is needed.
    AllowSuperfinal,
    /// Every final weight is redirected through a superfinal state, which
    /// exists whenever the input has a start state.
    RequireSuperfinal,
}

/// What happens to a symbol table when arcs are mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MapSymbolsAction {
    /// Carry the input's table over.
    #[default]
    Copy,
    /// Drop the table.
    Clear,
    /// Leave the destination's table alone.
    Noop,
}

/// How a lazy automaton is copied.
///
/// `Shared` copies reuse the cache and the source, and are cheap. `Safe`
/// copies deep-copy the source, clone the mapper and start from an empty
/// cache, so the copy can be traversed from another thread without
/// contending on the original's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CopyMode {
    #[default]
    Shared,
    Safe,
}

/// Epsilon-synchronization filter for composition and intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ComposeFilter {
    /// Picks a filter from the operands. Currently always `Sequence`.
    #[default]
    Auto,
    /// Epsilon moves on the first operand must precede those on the second.
    Sequence,
    /// Epsilon moves on the second operand must precede those on the first.
    AltSequence,
    /// Matches epsilon against epsilon when both sides can move.
    Match,
    /// Only forbids the doubled epsilon:epsilon move.
    NoMatch,
    /// Allows no epsilon move on one side without the other.
    Null,
    /// Allows everything. Correct only for epsilon-free operands.
    Trivial,
}

impl ComposeFilter {
    pub const ALL: [ComposeFilter; 7] = [
        ComposeFilter::Auto,
        ComposeFilter::Sequence,
        ComposeFilter::AltSequence,
        ComposeFilter::Match,
        ComposeFilter::NoMatch,
        ComposeFilter::Null,
        ComposeFilter::Trivial,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComposeFilter::Auto => "auto",
            ComposeFilter::Sequence => "sequence",
            ComposeFilter::AltSequence => "alt_sequence",
            ComposeFilter::Match => "match",
            ComposeFilter::NoMatch => "no_match",
            ComposeFilter::Null => "null",
            ComposeFilter::Trivial => "trivial",
        }
    }

    /// The concrete filter `Auto` stands for.
    pub fn resolve(self) -> ComposeFilter {
        match self {
            ComposeFilter::Auto => ComposeFilter::Sequence,
            other => other,
        }
    }
}

impl fmt::Display for ComposeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComposeFilter {
    type Err = FstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComposeFilter::ALL
            .into_iter()
            .find(|filter| filter.as_str() == s)
            .ok_or_else(|| FstError::UnknownFilter(s.to_string()))
    }
}

/// Options for composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ComposeOptions {
    /// Trim states that are not both accessible and coaccessible after the
    /// eager form has materialized the result.
    pub connect: bool,
    pub filter: ComposeFilter,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            connect: true,
            filter: ComposeFilter::Auto,
        }
    }
}

impl ComposeOptions {
    pub fn with_filter(filter: ComposeFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// Intersection takes the same options as composition.
pub type IntersectOptions = ComposeOptions;
