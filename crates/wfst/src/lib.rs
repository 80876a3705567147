//! Weighted finite-state transducers with lazy operations.
//!
//! Automata are read through the [`Fst`] trait, whose methods take `&self`
//! even on lazy implementations: those compute states on first demand and
//! cache them behind a lock. Every result carries a property bitmask derived
//! from its inputs without rescanning, and failures set the sticky `ERROR`
//! bit instead of returning an error.
//!
//! # Architecture
//!
//! - [`fst`] -- Read, counted and mutable automaton contracts
//! - [`vector`] -- Vector-backed mutable automaton
//! - [`props`] -- Property computation by traversal
//! - [`cache`] -- Lazy expansion engine and state tables
//! - [`arc_map`] -- Arc mapper contract, eager in-place and copying map
//! - [`arc_map_fst`] -- Lazy arc map, streaming and counted
//! - [`mappers`] -- Ready-made mappers
//! - [`union`] -- Eager and lazy union
//! - [`compose`] -- Lazy composition and its filters
//! - [`intersect`] -- Acceptor intersection
//! - [`connect`] -- Trimming
//! - [`config`] -- Options and policy enums

pub mod arc_map;
pub mod arc_map_fst;
pub mod cache;
pub mod compose;
pub mod config;
pub mod connect;
pub mod fst;
pub mod intersect;
pub mod mappers;
pub mod props;
pub mod union;
pub mod vector;

pub use wfst_core;

pub use arc_map::{ArcMapper, MapperRef, StateCountPreserving, arc_map, arc_map_into};
pub use arc_map_fst::{ArcMapFst, ExpandedArcMapFst};
pub use cache::{FstCache, FstOp, LazyFst, StateTable};
pub use compose::{ComposeFst, compose};
pub use config::{
    ComposeFilter, ComposeOptions, CopyMode, IntersectOptions, MapFinalAction, MapSymbolsAction,
};
pub use connect::connect;
pub use fst::{ArcList, CopyFst, ExpandedFst, Fst, MutableFst, count_arcs, count_states};
pub use intersect::{IntersectFst, intersect};
pub use union::{UnionComponent, UnionFst, union, union_all};
pub use vector::VectorFst;
