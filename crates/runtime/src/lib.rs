//! Boron Runtime: buffer store, collector, and the language surface built
//! on top of `boron-core`'s tagged cell and atom table.
//!
//! This crate owns everything that needs allocation policy or collection
//! strategy: the mark-sweep buffer store, series/string primitives,
//! context binding, path resolution, the tokenizer, the two parse
//! engines (block and binary bit-stream), the function-argument byte
//! code, the BOR1 serializer, and the port driver seam.
//!
//! # Modules
//!
//! - `buffer`: buffer store, mark-sweep collector, thread/env split, and
//!   freeze-to-shared promotion (spec §3.2–§3.4, §4.2).
//! - `series`: byte/wide/cell insert-erase primitives and string
//!   widen/flatten (spec §4.3).
//! - `context`: context binding table and bind/unbind (spec §4.4).
//! - `path`: path selection and path-set (spec §4.5).
//! - `tokenizer`: the lexer producing a block of cells from source text
//!   (spec §4.6).
//! - `parse_block`: the block/string rule-cell parse engine (spec §4.7).
//! - `parse_binary`: the binary parse engine and `bits [...]` bit-stream
//!   extension (spec §4.7).
//! - `argcode`: the function-argument byte code compiler/interpreter
//!   (spec §4.8).
//! - `serialize`: the BOR1 binary codec (spec §4.9).
//! - `port`: the port driver trait and scheme registry (spec §6, §9).

pub mod argcode;
pub mod buffer;
pub mod context;
pub mod parse_binary;
pub mod parse_block;
pub mod path;
pub mod port;
pub mod serialize;
pub mod series;
pub mod tokenizer;

pub use buffer::{resolve_id, make_id, Env, Thread};
pub use context::ContextData;
