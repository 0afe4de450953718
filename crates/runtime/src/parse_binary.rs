//! Binary/string parse engine and the `bits [ ... ]` bit-stream extension
//! (spec §4.7). `BinaryParseEngine` interprets the same rule-cell
//! vocabulary `parse_block::ParseEngine` does, specialized for a byte
//! slice input (a `Binary` or narrow `String` buffer) rather than a cell
//! array: literal matches compare bytes instead of cells, and `bits [...]`
//! layers the MSB-first bit-pipe reader on top for sub-byte fields.
//!
//! The original pulls at most 32 bits per refill; spec §4.7 asks for
//! fields wider than 56 bits to split into two pulls, which only makes
//! sense against a wider pipe, so `BitPipe` here holds a 64-bit
//! accumulator (see SPEC_FULL.md §2 for why this diverges from the
//! original's 32-bit one).

use std::collections::HashMap;

use boron_core::{AtomTable, BoronError, Cell, CellTag};

use crate::buffer::BufferData;
use crate::parse_block::{Capture, ParseHost};

/// MSB-first bit reader over a byte slice, with a 64-bit refill pipe.
pub struct BitPipe<'a> {
    bytes: &'a [u8],
    byte_pos: usize,
    pipe: u64,
    pipe_bits: u32,
    pub little_endian: bool,
}

impl<'a> BitPipe<'a> {
    pub fn new(bytes: &'a [u8]) -> BitPipe<'a> {
        BitPipe { bytes, byte_pos: 0, pipe: 0, pipe_bits: 0, little_endian: false }
    }

    fn refill(&mut self) {
        while self.pipe_bits <= 56 && self.byte_pos < self.bytes.len() {
            self.pipe = (self.pipe << 8) | self.bytes[self.byte_pos] as u64;
            self.byte_pos += 1;
            self.pipe_bits += 8;
        }
    }

    /// Pull `width` bits (1..=64), splitting into two pulls above 56 bits
    /// so a single refill never has to supply more than 56 fresh bits.
    pub fn pull_bits(&mut self, width: u32) -> Result<u64, BoronError> {
        if width == 0 {
            return Ok(0);
        }
        if width > 56 {
            let hi = self.pull_bits(width - 32)?;
            let lo = self.pull_bits(32)?;
            return Ok((hi << 32) | lo);
        }
        self.refill();
        if self.pipe_bits < width {
            return Err(BoronError::script("parse: bit-stream exhausted before field width satisfied"));
        }
        let shift = self.pipe_bits - width;
        let mask = (1u64 << width) - 1;
        let value = (self.pipe >> shift) & mask;
        self.pipe_bits -= width;
        self.pipe = if self.pipe_bits == 0 { 0 } else { self.pipe & ((1u64 << self.pipe_bits) - 1) };
        Ok(value)
    }

    pub fn byte_aligned(&self) -> bool {
        self.pipe_bits % 8 == 0
    }

    pub fn bytes_consumed(&self) -> usize {
        self.byte_pos - (self.pipe_bits / 8) as usize
    }
}

/// Run a `bits [ ... ]` sub-rule: `field_rules` alternates `setword width`
/// (or a `u8`/`u16`/`u32`/`u64` shortcut word) pairs; results are stored
/// into `captures` under the setword's atom as a plain integer value,
/// honoring the pipe's current endianness mode.
pub fn run_bits_rule(
    atoms: &AtomTable,
    field_rules: &[Cell],
    pipe: &mut BitPipe,
    captures: &mut HashMap<u16, Cell>,
) -> Result<(), BoronError> {
    let big_endian_atom = atoms.find("big-endian");
    let little_endian_atom = atoms.find("little-endian");
    let u8_atom = atoms.find("u8");
    let u16_atom = atoms.find("u16");
    let u32_atom = atoms.find("u32");
    let u64_atom = atoms.find("u64");

    let mut i = 0usize;
    let mut pending_name: Option<u16> = None;
    while i < field_rules.len() {
        let cell = field_rules[i];
        if cell.is(CellTag::Word) {
            let atom = cell.word_atom();
            if Some(atom) == big_endian_atom {
                pipe.little_endian = false;
                i += 1;
                continue;
            }
            if Some(atom) == little_endian_atom {
                pipe.little_endian = true;
                i += 1;
                continue;
            }
            let width = if Some(atom) == u8_atom {
                Some(8)
            } else if Some(atom) == u16_atom {
                Some(16)
            } else if Some(atom) == u32_atom {
                Some(32)
            } else if Some(atom) == u64_atom {
                Some(64)
            } else {
                None
            };
            if let Some(w) = width {
                let raw = pipe.pull_bits(w)?;
                let value = normalize_endian(raw, w, pipe.little_endian);
                if let Some(name) = pending_name.take() {
                    captures.insert(name, Cell::int(value as i64));
                }
                i += 1;
                continue;
            }
        }
        if cell.is(CellTag::SetWord) {
            pending_name = Some(cell.word_atom());
            i += 1;
            continue;
        }
        if cell.is(CellTag::Int) {
            let width = cell.as_int().max(0) as u32;
            let raw = pipe.pull_bits(width)?;
            if let Some(name) = pending_name.take() {
                captures.insert(name, Cell::int(raw as i64));
            }
            i += 1;
            continue;
        }
        i += 1;
    }
    Ok(())
}

fn normalize_endian(raw: u64, width: u32, little_endian: bool) -> u64 {
    if !little_endian || width <= 8 {
        return raw;
    }
    match width {
        16 => ((raw as u16).swap_bytes()) as u64,
        32 => ((raw as u32).swap_bytes()) as u64,
        64 => raw.swap_bytes(),
        _ => raw,
    }
}

/// The rule-cell dispatcher for a byte-slice input (spec §4.7). Shares
/// `Capture`/`ParseHost` with `parse_block::ParseEngine`; only the match
/// unit and the `bits [...]` keyword differ from the block engine.
pub struct BinaryParseEngine<'a> {
    atoms: &'a AtomTable,
}

enum Outcome {
    Matched,
    Failed,
    Break,
}

impl<'a> BinaryParseEngine<'a> {
    pub fn new(atoms: &'a AtomTable) -> BinaryParseEngine<'a> {
        BinaryParseEngine { atoms }
    }

    fn kw(&self, name: &str) -> Option<u16> {
        self.atoms.find(name)
    }

    fn is_keyword(&self, cell: &Cell, name: &str) -> bool {
        cell.is(CellTag::Word) && self.kw(name) == Some(cell.word_atom())
    }

    /// Run a rule block against `input`, starting at `*pos`. `get_bytes`
    /// resolves a literal String/Binary rule cell to its backing bytes;
    /// `get_block` resolves a nested-block rule, a paren's body, or a
    /// `bits [...]` sub-rule block to its cell slice. `values` collects
    /// the typed integers `bits` fields store under their setword atom,
    /// kept separate from `captures`' position-span slices.
    pub fn run(
        &self,
        rules: &[Cell],
        input: &[u8],
        pos: &mut usize,
        captures: &mut HashMap<u16, Capture>,
        values: &mut HashMap<u16, Cell>,
        host: &mut dyn ParseHost,
        get_bytes: &dyn Fn(&Cell) -> Option<Vec<u8>>,
        get_block: &dyn Fn(&Cell) -> Option<Vec<Cell>>,
    ) -> Result<bool, BoronError> {
        let bar = self.kw("|");
        let branches = split_alternatives(rules, bar);
        let start = *pos;
        for (i, branch) in branches.iter().enumerate() {
            *pos = start;
            match self.run_sequence(branch, input, pos, captures, values, host, get_bytes, get_block)? {
                Outcome::Matched | Outcome::Break => return Ok(true),
                Outcome::Failed => {
                    if i + 1 == branches.len() {
                        *pos = start;
                        return Ok(false);
                    }
                }
            }
        }
        Ok(branches.is_empty())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_sequence(
        &self,
        rules: &[Cell],
        input: &[u8],
        pos: &mut usize,
        captures: &mut HashMap<u16, Capture>,
        values: &mut HashMap<u16, Cell>,
        host: &mut dyn ParseHost,
        get_bytes: &dyn Fn(&Cell) -> Option<Vec<u8>>,
        get_block: &dyn Fn(&Cell) -> Option<Vec<Cell>>,
    ) -> Result<Outcome, BoronError> {
        let mut i = 0usize;
        while i < rules.len() {
            let rule = rules[i];

            if self.is_keyword(&rule, "break") {
                return Ok(Outcome::Break);
            }
            if rule.is(CellTag::SetWord) {
                captures.insert(rule.word_atom(), Capture { start: *pos, end: None });
                i += 1;
                continue;
            }
            if rule.is(CellTag::GetWord) {
                if let Some(cap) = captures.get_mut(&rule.word_atom()) {
                    cap.end = Some(*pos);
                }
                i += 1;
                continue;
            }
            if rule.is(CellTag::Paren) {
                if let Some(cells) = get_block(&rule) {
                    host.eval_paren(&cells)?;
                }
                i += 1;
                continue;
            }
            if self.is_keyword(&rule, "bits") {
                i += 1;
                let sub_rules = match rules.get(i) {
                    Some(r) if r.is(CellTag::Block) => get_block(r).unwrap_or_default(),
                    _ => return Err(BoronError::script("parse: 'bits' needs a following rule block")),
                };
                i += 1;
                if *pos > input.len() {
                    return Ok(Outcome::Failed);
                }
                let mut pipe = BitPipe::new(&input[*pos..]);
                run_bits_rule(self.atoms, &sub_rules, &mut pipe, values)?;
                if !pipe.byte_aligned() {
                    return Err(BoronError::script("parse: 'bits' rule left the pipe unaligned to a byte boundary"));
                }
                *pos += pipe.bytes_consumed();
                continue;
            }
            if self.is_keyword(&rule, "set") {
                i += 1;
                let name_atom = rules.get(i).filter(|c| c.is(CellTag::Word)).map(|c| c.word_atom());
                i += 1;
                let target = rules.get(i).copied();
                i += 1;
                if let (Some(atom), Some(_)) = (name_atom, target) {
                    if *pos < input.len() {
                        captures.insert(atom, Capture { start: *pos, end: Some(*pos + 1) });
                    }
                }
                if let Some(t) = target {
                    if !self.match_unit(&t, input, pos, host, get_bytes, get_block, values)? {
                        return Ok(Outcome::Failed);
                    }
                }
                continue;
            }
            if self.is_keyword(&rule, "to") || self.is_keyword(&rule, "thru") {
                let thru = self.is_keyword(&rule, "thru");
                i += 1;
                let target = match rules.get(i) {
                    Some(t) => *t,
                    None => return Err(BoronError::script("parse: 'to'/'thru' needs a following target")),
                };
                i += 1;
                let mut p = *pos;
                let mut found = false;
                while p <= input.len() {
                    let mut probe = p;
                    if self.match_unit(&target, input, &mut probe, host, get_bytes, get_block, values)? {
                        found = true;
                        *pos = if thru { probe } else { p };
                        break;
                    }
                    p += 1;
                }
                if !found {
                    return Ok(Outcome::Failed);
                }
                continue;
            }
            if self.is_keyword(&rule, "into") {
                // Byte-stream elements are never blocks, so `into` can
                // never descend here; included only so the shared
                // vocabulary doesn't silently fall through to a literal
                // match on the following rule block.
                i += 1;
                let _ = rules.get(i);
                return Ok(Outcome::Failed);
            }
            if self.is_keyword(&rule, "opt") || self.is_keyword(&rule, "any") || self.is_keyword(&rule, "some") {
                let (min, max) = match () {
                    _ if self.is_keyword(&rule, "opt") => (0usize, 1usize),
                    _ if self.is_keyword(&rule, "any") => (0usize, usize::MAX),
                    _ => (1usize, usize::MAX),
                };
                i += 1;
                let target = match rules.get(i) {
                    Some(t) => *t,
                    None => return Err(BoronError::script("parse: quantifier needs a following rule")),
                };
                i += 1;
                let count = self.repeat_match(&target, input, pos, host, get_bytes, get_block, values, max)?;
                if count < min {
                    return Ok(Outcome::Failed);
                }
                continue;
            }
            if rule.is(CellTag::Int) {
                let n = rule.as_int().max(0) as usize;
                i += 1;
                let (min, max) = if let Some(second) = rules.get(i).filter(|c| c.is(CellTag::Int)) {
                    i += 1;
                    (n, second.as_int().max(0) as usize)
                } else {
                    (n, n)
                };
                let target = match rules.get(i) {
                    Some(t) => *t,
                    None => return Err(BoronError::script("parse: repeat-count needs a following rule")),
                };
                i += 1;
                if self.is_keyword(&target, "skip") {
                    if *pos + n > input.len() {
                        return Ok(Outcome::Failed);
                    }
                    *pos += n;
                    continue;
                }
                let count = self.repeat_match(&target, input, pos, host, get_bytes, get_block, values, max)?;
                if count < min {
                    return Ok(Outcome::Failed);
                }
                continue;
            }

            // Plain single unit: datatype word, literal byte/char/string
            // value, or a nested rule-group block.
            if !self.match_unit(&rule, input, pos, host, get_bytes, get_block, values)? {
                return Ok(Outcome::Failed);
            }
            i += 1;
        }
        Ok(Outcome::Matched)
    }

    #[allow(clippy::too_many_arguments)]
    fn repeat_match(
        &self,
        target: &Cell,
        input: &[u8],
        pos: &mut usize,
        host: &mut dyn ParseHost,
        get_bytes: &dyn Fn(&Cell) -> Option<Vec<u8>>,
        get_block: &dyn Fn(&Cell) -> Option<Vec<Cell>>,
        values: &mut HashMap<u16, Cell>,
        max: usize,
    ) -> Result<usize, BoronError> {
        let mut count = 0usize;
        while count < max {
            let mut probe = *pos;
            if !self.match_unit(target, input, &mut probe, host, get_bytes, get_block, values)? {
                break;
            }
            *pos = probe;
            count += 1;
        }
        Ok(count)
    }

    /// Match exactly one rule "unit" against the byte(s) at `*pos`: a
    /// datatype word, a byte/char literal, a String/Binary literal (whose
    /// full length is matched and consumed), or a nested rule-group block.
    #[allow(clippy::too_many_arguments)]
    fn match_unit(
        &self,
        rule: &Cell,
        input: &[u8],
        pos: &mut usize,
        host: &mut dyn ParseHost,
        get_bytes: &dyn Fn(&Cell) -> Option<Vec<u8>>,
        get_block: &dyn Fn(&Cell) -> Option<Vec<Cell>>,
        values: &mut HashMap<u16, Cell>,
    ) -> Result<bool, BoronError> {
        if rule.is(CellTag::Block) {
            let sub = get_block(rule).unwrap_or_default();
            let mut captures = HashMap::new();
            let mut sub_pos = *pos;
            let matched = self.run(&sub, input, &mut sub_pos, &mut captures, values, host, get_bytes, get_block)?;
            if matched {
                *pos = sub_pos;
                return Ok(true);
            }
            return Ok(false);
        }
        if rule.is(CellTag::String) || rule.is(CellTag::Binary) {
            let literal = get_bytes(rule).unwrap_or_default();
            if *pos > input.len() {
                return Ok(false);
            }
            if !literal.is_empty() && input[*pos..].len() >= literal.len() && input[*pos..*pos + literal.len()] == literal[..] {
                *pos += literal.len();
                return Ok(true);
            }
            return Ok(false);
        }
        if *pos >= input.len() {
            return Ok(false);
        }
        let byte = input[*pos];
        let ok = if rule.is(CellTag::Datatype) {
            rule.datatype_has(CellTag::Int as u8) || rule.datatype_has(CellTag::Char as u8)
        } else if rule.is(CellTag::Int) {
            rule.as_int() == byte as i64
        } else if rule.is(CellTag::Char) {
            rule.as_char() == byte as u32
        } else {
            false
        };
        if ok {
            *pos += 1;
        }
        Ok(ok)
    }
}

/// Split a rule block into `|`-separated alternative branches.
fn split_alternatives(rules: &[Cell], bar: Option<u16>) -> Vec<Vec<Cell>> {
    let mut branches = Vec::new();
    let mut current = Vec::new();
    for cell in rules {
        if bar.is_some() && cell.is(CellTag::Word) && Some(cell.word_atom()) == bar {
            branches.push(std::mem::take(&mut current));
        } else {
            current.push(*cell);
        }
    }
    branches.push(current);
    branches
}

/// Resolve a literal String/Binary rule cell's backing bytes, for callers
/// that have a buffer-store slice on hand. Mirrors `parse_block::block_resolver`.
pub fn byte_resolver<'s>(data: &'s [Option<&'s BufferData>]) -> impl Fn(&Cell) -> Option<Vec<u8>> + 's {
    move |cell: &Cell| {
        let buf_id = cell.series_buf();
        data.get(buf_id.unsigned_abs() as usize).and_then(|d| *d).and_then(|d| d.as_bytes()).map(|b| b.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_bits_splits_fields_into_bytes() {
        let data = [0b1010_1100u8, 0b0000_0001];
        let mut pipe = BitPipe::new(&data);
        assert_eq!(pipe.pull_bits(4).unwrap(), 0b1010);
        assert_eq!(pipe.pull_bits(4).unwrap(), 0b1100);
        assert_eq!(pipe.pull_bits(8).unwrap(), 0b0000_0001);
    }

    #[test]
    fn pull_bits_exhausted_errors() {
        let data = [0xffu8];
        let mut pipe = BitPipe::new(&data);
        pipe.pull_bits(8).unwrap();
        assert!(pipe.pull_bits(1).is_err());
    }

    #[test]
    fn t4_bits_rule_reads_u8_then_big_endian_u16() {
        let data = [0x01u8, 0x02, 0x03, 0x04];
        let mut atoms = AtomTable::new(128, 4096);
        let a_atom = atoms.intern("a").unwrap();
        let b_atom = atoms.intern("b").unwrap();
        atoms.intern("u8").unwrap();
        atoms.intern("u16").unwrap();
        atoms.intern("big-endian").unwrap();

        let mut pipe = BitPipe::new(&data);
        let u8_word = Cell::word(CellTag::Word, boron_core::Binding::Unbound, 0, 0, atoms.find("u8").unwrap());
        let u16_word = Cell::word(CellTag::Word, boron_core::Binding::Unbound, 0, 0, atoms.find("u16").unwrap());
        let rules = vec![
            Cell::word(CellTag::SetWord, boron_core::Binding::Unbound, 0, 0, a_atom),
            u8_word,
            Cell::word(CellTag::SetWord, boron_core::Binding::Unbound, 0, 0, b_atom),
            u16_word,
        ];
        let mut captures = HashMap::new();
        run_bits_rule(&atoms, &rules, &mut pipe, &mut captures).unwrap();
        assert_eq!(captures[&a_atom].as_int(), 1);
        assert_eq!(captures[&b_atom].as_int(), 0x0203);
    }

    #[test]
    fn pull_bits_wider_than_56_splits_into_two_pulls() {
        let data = [0xffu8; 8];
        let mut pipe = BitPipe::new(&data);
        let v = pipe.pull_bits(60).unwrap();
        assert_eq!(v, (1u64 << 60) - 1);
    }

    fn atoms_with_keywords() -> AtomTable {
        let mut a = AtomTable::new(256, 4096);
        for kw in ["opt", "any", "some", "to", "thru", "into", "set", "break", "|", "skip", "bits", "u8", "u16", "big-endian"] {
            a.intern(kw).unwrap();
        }
        a
    }

    fn word(atoms: &AtomTable, tag: CellTag, name: &str) -> Cell {
        Cell::word(tag, boron_core::Binding::Unbound, 0, 0, atoms.find(name).unwrap())
    }

    #[test]
    fn some_int_matches_every_byte() {
        use crate::parse_block::NoHost;
        let atoms = atoms_with_keywords();
        let engine = BinaryParseEngine::new(&atoms);
        let input = [1u8, 2, 3];
        let rules = vec![word(&atoms, CellTag::Word, "some"), Cell::datatype_single(CellTag::Int as u8)];
        let mut pos = 0usize;
        let mut captures = HashMap::new();
        let mut values = HashMap::new();
        let matched = engine
            .run(&rules, &input, &mut pos, &mut captures, &mut values, &mut NoHost, &|_| None, &|_| None)
            .unwrap();
        assert!(matched);
        assert_eq!(pos, 3);
    }

    #[test]
    fn literal_char_mismatch_resets_position() {
        // A bare top-level `Cell::int` rule is the repeat-count prefix
        // (spec's "N rule" form, same as `parse_block`), so a literal
        // single-byte match needs a non-Int rule cell; `char!` fits.
        use crate::parse_block::NoHost;
        let atoms = atoms_with_keywords();
        let engine = BinaryParseEngine::new(&atoms);
        let input = [1u8, 2];
        let rules = vec![Cell::char_(9)];
        let mut pos = 0usize;
        let mut captures = HashMap::new();
        let mut values = HashMap::new();
        let matched = engine
            .run(&rules, &input, &mut pos, &mut captures, &mut values, &mut NoHost, &|_| None, &|_| None)
            .unwrap();
        assert!(!matched);
        assert_eq!(pos, 0);
    }

    #[test]
    fn string_literal_rule_matches_a_byte_substring_then_the_next_byte() {
        use crate::parse_block::NoHost;
        let atoms = atoms_with_keywords();
        let engine = BinaryParseEngine::new(&atoms);
        let input = b"abcdef";
        let literal = Cell::series(CellTag::String, 1, 0, boron_core::NO_SLICE_END);
        let rules = vec![literal, Cell::char_(b'd' as u32)];
        let mut pos = 2usize;
        let mut captures = HashMap::new();
        let mut values = HashMap::new();
        let get_bytes = |_: &Cell| Some(b"c".to_vec());
        let matched = engine
            .run(&rules, input, &mut pos, &mut captures, &mut values, &mut NoHost, &get_bytes, &|_| None)
            .unwrap();
        assert!(matched, "literal 'c' matches input[2], leaving 'd' at input[3] for the following byte rule");
        assert_eq!(pos, 4);
    }

    #[test]
    fn bits_sub_rule_pulls_fields_and_advances_position() {
        use crate::parse_block::NoHost;
        let mut atoms = atoms_with_keywords();
        let a_atom = atoms.intern("a").unwrap();
        let engine = BinaryParseEngine::new(&atoms);
        let input = [0x01u8, 0x02, 0x03];
        let bits_atom = atoms.find("bits").unwrap();
        let sub_rules = vec![
            Cell::word(CellTag::SetWord, boron_core::Binding::Unbound, 0, 0, a_atom),
            Cell::word(CellTag::Word, boron_core::Binding::Unbound, 0, 0, atoms.find("u8").unwrap()),
        ];
        let bits_block_cell = Cell::series(CellTag::Block, 2, 0, boron_core::NO_SLICE_END);
        let rules = vec![Cell::word(CellTag::Word, boron_core::Binding::Unbound, 0, 0, bits_atom), bits_block_cell];
        let mut pos = 0usize;
        let mut captures = HashMap::new();
        let mut values = HashMap::new();
        let get_block = |cell: &Cell| if cell.series_buf() == 2 { Some(sub_rules.clone()) } else { None };
        let matched = engine
            .run(&rules, &input, &mut pos, &mut captures, &mut values, &mut NoHost, &|_| None, &get_block)
            .unwrap();
        assert!(matched);
        assert_eq!(pos, 1, "a single u8 field consumes one byte");
        assert_eq!(values[&a_atom].as_int(), 1);
    }

    #[test]
    fn to_scans_forward_to_a_literal_byte() {
        use crate::parse_block::NoHost;
        let atoms = atoms_with_keywords();
        let engine = BinaryParseEngine::new(&atoms);
        let input = [1u8, 2, 3, 9, 5];
        let rules = vec![word(&atoms, CellTag::Word, "to"), Cell::int(9)];
        let mut pos = 0usize;
        let mut captures = HashMap::new();
        let mut values = HashMap::new();
        let matched = engine
            .run(&rules, &input, &mut pos, &mut captures, &mut values, &mut NoHost, &|_| None, &|_| None)
            .unwrap();
        assert!(matched);
        assert_eq!(pos, 3, "'to' stops before the match, without consuming it");
    }
}
