//! Boron Core: the tagged value cell, the atom table, and error primitives.
//!
//! This crate is the most stable layer of the Boron interpreter — data
//! layout and bookkeeping that every other layer depends on, with no
//! allocation policy or collection strategy baked in. See `boron-runtime`
//! for the buffer store, garbage collector, tokenizer, parse engines, and
//! serializer built on top of these types.
//!
//! # Modules
//!
//! - `cell`: the 16-byte tagged `Cell` record (spec §3.1).
//! - `atoms`: fixed-capacity symbol interning (spec §4.1).
//! - `error`: descriptive error kinds and the thrown-error representation
//!   (spec §7).
//! - `memory_stats`: cross-thread buffer-store statistics registry.

pub mod atoms;
pub mod cell;
pub mod error;
pub mod memory_stats;

pub use atoms::{AtomTable, INVALID_ATOM};
pub use cell::{Binding, Cell, CellTag, BUILTIN_TYPE_COUNT, MAX_TYPES, NO_SLICE_END};
pub use error::{BoronError, ControlFlow, ErrorKind, Signal, TraceEntry};
