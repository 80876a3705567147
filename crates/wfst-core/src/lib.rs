//! Building blocks for weighted finite-state transducers.
//!
//! This crate holds the value types every automaton and algorithm shares.
//! The automata themselves and the lazy operations over them live in the
//! `wfst` crate.
//!
//! # Architecture
//!
//! - [`weight`] -- Semiring trait and the tropical, log and boolean weights
//! - [`arc`] -- Labels, state ids and the arc record
//! - [`properties`] -- Structural property bitmask and its transfer functions
//! - [`symbols`] -- Label/string symbol tables
//! - [`error`] -- Error type

pub mod arc;
pub mod error;
pub mod properties;
pub mod symbols;
pub mod weight;

pub use arc::{Arc, EPSILON, Label, NO_LABEL, NO_STATE_ID, StateId};
pub use error::FstError;
pub use properties::FstProperties;
pub use symbols::{SymbolTable, compat_symbols};
pub use weight::{
    BooleanWeight, DivideWeight, LogWeight, ReverseWeight, Semiring, TropicalWeight,
    WeightConvert, WeightPower, WeightQuantize,
};
