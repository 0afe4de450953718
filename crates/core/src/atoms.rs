//! The atom table: interning of short symbol names to stable 16-bit ids.
//!
//! Mirrors spec §4.1 and the original `urlan/atoms.c`: a fixed-capacity,
//! separate-chaining hash table over a flat name arena. Lookup is
//! case-insensitive; the original spelling is preserved and returned on a
//! repeat `intern()` of a different case of the same word. The hash
//! function (`33*h + 720 + c`, lower-cased) is carried verbatim from the
//! original so that independently-computed hashes agree with any
//! interop/debug tooling built against the same constant.
//!
//! The first [`BUILTIN_TYPE_COUNT`](crate::cell::BUILTIN_TYPE_COUNT) atoms
//! are reserved for built-in type names (`int!`, `string!`, ...) so that an
//! atom id less than that threshold can be read directly as a type tag —
//! this is what lets the tokenizer recognize `int!`-style datatype words
//! without a secondary table.

use crate::error::{BoronError, ErrorKind};

/// Sentinel returned when interning fails (table or name arena full).
pub const INVALID_ATOM: u16 = 0xffff;

const MAX_WORD_LEN: usize = 64;
const EMPTY: u16 = 0xffff;

struct AtomRec {
    hash: u32,
    name_index: u32,
    name_len: u16,
    head: u16,
    chain: u16,
}

/// A fixed-capacity, case-preserving, case-insensitive-lookup symbol table.
pub struct AtomTable {
    records: Vec<AtomRec>,
    buckets: Vec<u16>,
    names: Vec<u8>,
    atom_limit: usize,
    name_arena_limit: usize,
}

impl AtomTable {
    pub fn new(atom_limit: usize, name_arena_limit: usize) -> AtomTable {
        let bucket_count = atom_limit.max(1);
        AtomTable {
            records: Vec::with_capacity(atom_limit),
            buckets: vec![EMPTY; bucket_count],
            names: Vec::with_capacity(name_arena_limit.min(4096)),
            atom_limit,
            name_arena_limit,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Intern a name, returning its atom id. Case-insensitive: re-interning
    /// an existing name in different case returns the original id and does
    /// not change its stored spelling.
    pub fn intern(&mut self, name: &str) -> Result<u16, BoronError> {
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_WORD_LEN);
        let bytes = &bytes[..len];
        let hash = hash_name(bytes);
        let bucket = (hash as usize) % self.buckets.len();

        let mut slot = self.buckets[bucket];
        let mut prev_in_chain: Option<u16> = None;
        while slot != EMPTY {
            let rec = &self.records[slot as usize];
            if rec.name_len as usize == len {
                let existing = &self.names[rec.name_index as usize..rec.name_index as usize + len];
                if names_equal_ci(existing, bytes) {
                    return Ok(slot);
                }
            }
            prev_in_chain = Some(slot);
            slot = self.records[slot as usize].chain;
        }

        if self.records.len() >= self.atom_limit {
            return Err(BoronError::new(ErrorKind::Internal, "atom table is full".into()));
        }
        if self.names.len() + len + 1 > self.name_arena_limit {
            return Err(BoronError::new(ErrorKind::Internal, "atom name buffer is full".into()));
        }

        let new_id = self.records.len() as u16;
        let name_index = self.names.len() as u32;
        self.names.extend_from_slice(bytes);
        self.names.push(0);

        self.records.push(AtomRec { hash, name_index, name_len: len as u16, head: EMPTY, chain: EMPTY });

        match prev_in_chain {
            Some(p) => self.records[p as usize].chain = new_id,
            None => self.buckets[bucket] = new_id,
        }

        Ok(new_id)
    }

    /// Look up an existing atom by exact spelling, case-insensitively.
    pub fn find(&self, name: &str) -> Option<u16> {
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_WORD_LEN);
        let bytes = &bytes[..len];
        let hash = hash_name(bytes);
        let bucket = (hash as usize) % self.buckets.len();
        let mut slot = self.buckets[bucket];
        while slot != EMPTY {
            let rec = &self.records[slot as usize];
            if rec.name_len as usize == len {
                let existing = &self.names[rec.name_index as usize..rec.name_index as usize + len];
                if names_equal_ci(existing, bytes) {
                    return Some(slot);
                }
            }
            slot = rec.chain;
        }
        None
    }

    /// The original, case-preserved spelling of an atom.
    pub fn name(&self, atom: u16) -> &str {
        let rec = &self.records[atom as usize];
        let start = rec.name_index as usize;
        let end = start + rec.name_len as usize;
        std::str::from_utf8(&self.names[start..end]).unwrap_or("")
    }
}

fn lowercase_byte(c: u8) -> u8 {
    if c.is_ascii_uppercase() { c - b'A' + b'a' } else { c }
}

fn hash_name(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &c in bytes {
        let c = lowercase_byte(c) as u32;
        h = h.wrapping_mul(33).wrapping_add(720).wrapping_add(c);
    }
    h
}

fn names_equal_ci(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| lowercase_byte(x) == lowercase_byte(y))
}
