//! Block/string parse engine (spec §4.7): the shared rule-cell language,
//! specialized here for a block (cell-array) input. `parse_binary`
//! layers the bit-stream extension on top of the same rule shapes for a
//! binary input.
//!
//! Rules are read left to right out of a rule block; `ParseEngine` holds
//! only the atom table (to recognize keyword words like `opt`/`any`/
//! `some`/`to`/`thru`/`into`/`set`/`break`/`|`), so it is reusable across
//! threads/contexts without carrying evaluator state.

use std::collections::HashMap;

use boron_core::{AtomTable, BoronError, Cell, CellTag};

use crate::buffer::BufferData;

/// A captured slice: start position, and end position once a matching
/// getword closes it (spec §4.7's setword/getword capture pair).
#[derive(Debug, Clone, Copy)]
pub struct Capture {
    pub start: usize,
    pub end: Option<usize>,
}

/// Host callback invoked for a `paren` rule cell (spec §4.7: "invoke the
/// host evaluator callback; may mutate input").
pub trait ParseHost {
    fn eval_paren(&mut self, paren_cells: &[Cell]) -> Result<(), BoronError>;
}

/// A host that never expects to see a paren rule (safe default for tests
/// and for rule sets known not to use `( ... )`).
pub struct NoHost;
impl ParseHost for NoHost {
    fn eval_paren(&mut self, _paren_cells: &[Cell]) -> Result<(), BoronError> {
        Err(BoronError::script("parse: rule set contains a paren but no evaluator host was supplied"))
    }
}

pub struct ParseEngine<'a> {
    atoms: &'a AtomTable,
}

enum Outcome {
    Matched,
    Failed,
    Break,
}

impl<'a> ParseEngine<'a> {
    pub fn new(atoms: &'a AtomTable) -> ParseEngine<'a> {
        ParseEngine { atoms }
    }

    fn kw(&self, name: &str) -> Option<u16> {
        self.atoms.find(name)
    }

    fn is_keyword(&self, cell: &Cell, name: &str) -> bool {
        cell.is(CellTag::Word) && self.kw(name) == Some(cell.word_atom())
    }

    /// Run a rule block against `input`, starting at `*pos`, where
    /// `get_block` resolves a nested-block rule or `into` target's cell to
    /// its backing cell slice (so this module stays buffer-store-agnostic).
    pub fn run(
        &self,
        rules: &[Cell],
        input: &[Cell],
        pos: &mut usize,
        captures: &mut HashMap<u16, Capture>,
        host: &mut dyn ParseHost,
        get_block: &dyn Fn(&Cell) -> Option<Vec<Cell>>,
    ) -> Result<bool, BoronError> {
        let branches = split_alternatives(rules, self);
        let start = *pos;
        for (i, branch) in branches.iter().enumerate() {
            *pos = start;
            match self.run_sequence(branch, input, pos, captures, host, get_block)? {
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

    fn run_sequence(
        &self,
        rules: &[Cell],
        input: &[Cell],
        pos: &mut usize,
        captures: &mut HashMap<u16, Capture>,
        host: &mut dyn ParseHost,
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
                    if !self.match_unit(&t, input, pos, host, get_block)? {
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
                while p < input.len() {
                    let mut probe = p;
                    if self.match_unit(&target, input, &mut probe, host, get_block)? {
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
                i += 1;
                let sub_rules = match rules.get(i) {
                    Some(r) if r.is(CellTag::Block) => get_block(r).unwrap_or_default(),
                    _ => return Err(BoronError::script("parse: 'into' needs a following rule block")),
                };
                i += 1;
                if *pos >= input.len() || !input[*pos].is(CellTag::Block) {
                    return Ok(Outcome::Failed);
                }
                let nested = get_block(&input[*pos]).unwrap_or_default();
                let mut nested_pos = 0usize;
                if !self.run(&sub_rules, &nested, &mut nested_pos, captures, host, get_block)? || nested_pos != nested.len() {
                    return Ok(Outcome::Failed);
                }
                *pos += 1;
                continue;
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
                let count = self.repeat_match(&target, input, pos, host, get_block, min, max)?;
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
                let count = self.repeat_match(&target, input, pos, host, get_block, min, max)?;
                if count < min {
                    return Ok(Outcome::Failed);
                }
                continue;
            }

            // Plain single unit: datatype word, literal value, or nested block.
            if !self.match_unit(&rule, input, pos, host, get_block)? {
                return Ok(Outcome::Failed);
            }
            i += 1;
        }
        Ok(Outcome::Matched)
    }

    fn repeat_match(
        &self,
        target: &Cell,
        input: &[Cell],
        pos: &mut usize,
        host: &mut dyn ParseHost,
        get_block: &dyn Fn(&Cell) -> Option<Vec<Cell>>,
        min: usize,
        max: usize,
    ) -> Result<usize, BoronError> {
        let mut count = 0usize;
        while count < max {
            let mut probe = *pos;
            if !self.match_unit(target, input, &mut probe, host, get_block)? {
                break;
            }
            *pos = probe;
            count += 1;
        }
        let _ = min;
        Ok(count)
    }

    /// Match exactly one rule "unit" — a datatype word, a literal value
    /// cell, or a nested rule block — against the element at `*pos`,
    /// advancing `*pos` by one element on success.
    fn match_unit(
        &self,
        rule: &Cell,
        input: &[Cell],
        pos: &mut usize,
        host: &mut dyn ParseHost,
        get_block: &dyn Fn(&Cell) -> Option<Vec<Cell>>,
    ) -> Result<bool, BoronError> {
        if rule.is(CellTag::Block) {
            let sub = get_block(rule).unwrap_or_default();
            let mut captures = HashMap::new();
            let mut sub_pos = *pos;
            let matched_all_input = self.run(&sub, input, &mut sub_pos, &mut captures, host, get_block)?;
            if matched_all_input {
                *pos = sub_pos;
                return Ok(true);
            }
            return Ok(false);
        }
        if *pos >= input.len() {
            return Ok(false);
        }
        let elem = input[*pos];
        let ok = if rule.is(CellTag::Datatype) {
            rule.datatype_has(elem.tag)
        } else {
            cells_match_literal(rule, &elem)
        };
        if ok {
            *pos += 1;
        }
        Ok(ok)
    }
}

fn cells_match_literal(rule: &Cell, elem: &Cell) -> bool {
    if rule.tag != elem.tag {
        return false;
    }
    match CellTag::from_u8(rule.tag) {
        Some(CellTag::Int) => rule.as_int() == elem.as_int(),
        Some(CellTag::Double) => rule.as_double() == elem.as_double(),
        Some(CellTag::Char) => rule.as_char() == elem.as_char(),
        Some(CellTag::Logic) => rule.as_logic() == elem.as_logic(),
        Some(tag) if CellTag::is_word_type(rule.tag) || tag == CellTag::Word => rule.word_atom() == elem.word_atom(),
        _ => rule.slot_a == elem.slot_a && rule.slot_b == elem.slot_b,
    }
}

/// Split a rule block into `|`-separated alternative branches.
fn split_alternatives(rules: &[Cell], engine: &ParseEngine) -> Vec<Vec<Cell>> {
    let bar = engine.kw("|");
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

/// Resolve a nested-block-typed rule/input cell's cell slice from a
/// buffer-store-backed block, for callers that have one on hand.
pub fn block_resolver<'s>(data: &'s [Option<&'s BufferData>]) -> impl Fn(&Cell) -> Option<Vec<Cell>> + 's {
    move |cell: &Cell| {
        let buf_id = cell.series_buf();
        data.get(buf_id.unsigned_abs() as usize).and_then(|d| *d).and_then(|d| d.as_cells()).map(|c| c.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boron_core::AtomTable;

    fn atoms_with_keywords() -> AtomTable {
        let mut a = AtomTable::new(256, 4096);
        for kw in ["opt", "any", "some", "to", "thru", "into", "set", "break", "|", "skip"] {
            a.intern(kw).unwrap();
        }
        a
    }

    #[test]
    fn t3_some_int_matches_all_ints() {
        let atoms = atoms_with_keywords();
        let engine = ParseEngine::new(&atoms);
        let input = vec![Cell::int(1), Cell::int(2), Cell::int(3)];
        let some_atom = atoms.find("some").unwrap();
        let rules = vec![Cell::word(CellTag::Word, boron_core::Binding::Unbound, 0, 0, some_atom), Cell::datatype_single(CellTag::Int as u8)];
        let mut pos = 0usize;
        let mut captures = HashMap::new();
        let matched = engine
            .run(&rules, &input, &mut pos, &mut captures, &mut NoHost, &|_| None)
            .unwrap();
        assert!(matched);
        assert_eq!(pos, 3);
    }

    #[test]
    fn opt_allows_zero_matches() {
        let atoms = atoms_with_keywords();
        let engine = ParseEngine::new(&atoms);
        let input = vec![Cell::int(1)];
        let opt_atom = atoms.find("opt").unwrap();
        let rules = vec![
            Cell::word(CellTag::Word, boron_core::Binding::Unbound, 0, 0, opt_atom),
            Cell::datatype_single(CellTag::String as u8),
            Cell::datatype_single(CellTag::Int as u8),
        ];
        let mut pos = 0;
        let mut captures = HashMap::new();
        let matched = engine.run(&rules, &input, &mut pos, &mut captures, &mut NoHost, &|_| None).unwrap();
        assert!(matched);
        assert_eq!(pos, 1);
    }

    #[test]
    fn alternation_falls_through_to_second_branch() {
        let atoms = atoms_with_keywords();
        let engine = ParseEngine::new(&atoms);
        let input = vec![Cell::int(1)];
        let bar_atom = atoms.find("|").unwrap();
        let rules = vec![
            Cell::datatype_single(CellTag::String as u8),
            Cell::word(CellTag::Word, boron_core::Binding::Unbound, 0, 0, bar_atom),
            Cell::datatype_single(CellTag::Int as u8),
        ];
        let mut pos = 0;
        let mut captures = HashMap::new();
        let matched = engine.run(&rules, &input, &mut pos, &mut captures, &mut NoHost, &|_| None).unwrap();
        assert!(matched);
        assert_eq!(pos, 1);
    }

    #[test]
    fn setword_then_getword_captures_a_span() {
        let atoms = atoms_with_keywords();
        let engine = ParseEngine::new(&atoms);
        let input = vec![Cell::int(1), Cell::int(2), Cell::int(3)];
        let a_atom = atoms.find("a").unwrap_or_else(|| unreachable!());
        let _ = a_atom;
        let mut atoms2 = atoms;
        let span_atom = atoms2.intern("span").unwrap();
        let engine = ParseEngine::new(&atoms2);
        let rules = vec![
            Cell::word(CellTag::SetWord, boron_core::Binding::Unbound, 0, 0, span_atom),
            Cell::datatype_single(CellTag::Int as u8),
            Cell::datatype_single(CellTag::Int as u8),
            Cell::word(CellTag::GetWord, boron_core::Binding::Unbound, 0, 0, span_atom),
        ];
        let mut pos = 0;
        let mut captures = HashMap::new();
        let matched = engine.run(&rules, &input, &mut pos, &mut captures, &mut NoHost, &|_| None).unwrap();
        assert!(matched);
        let cap = captures[&span_atom];
        assert_eq!((cap.start, cap.end), (0, Some(2)));
    }

    #[test]
    fn no_match_resets_position() {
        let atoms = atoms_with_keywords();
        let engine = ParseEngine::new(&atoms);
        let input = vec![Cell::int(1)];
        let rules = vec![Cell::datatype_single(CellTag::String as u8)];
        let mut pos = 0;
        let mut captures = HashMap::new();
        let matched = engine.run(&rules, &input, &mut pos, &mut captures, &mut NoHost, &|_| None).unwrap();
        assert!(!matched);
        assert_eq!(pos, 0);
    }
}
