//! Context & binding (spec §4.4).
//!
//! A context is a paired array of value cells and a partially-sorted
//! atom/index table: a sorted prefix (`sorted` entries) followed by an
//! unsorted tail of newly-appended words. `lookup` binary-searches the
//! sorted prefix, then falls back to a linear scan of the tail — the
//! first match in that order wins, which matters because `sort()` is not
//! called automatically after every `add_word`.

use boron_core::{Binding, Cell, CellTag};

/// One atom/index entry in a context's search table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtomEntry {
    pub atom: u16,
    pub index: u16,
}

/// Backing storage for a `Context` buffer.
#[derive(Default)]
pub struct ContextData {
    pub values: Vec<Cell>,
    pub entries: Vec<AtomEntry>,
    /// Length of the sorted prefix of `entries`.
    pub sorted: usize,
    /// Reentrancy guard used while printing/binding self-referential
    /// contexts (carried from the original's context "recursion" byte;
    /// see SPEC_FULL.md §2).
    pub recursion: bool,
}

impl ContextData {
    pub fn with_capacity(n: usize) -> ContextData {
        ContextData {
            values: Vec::with_capacity(n),
            entries: Vec::with_capacity(n),
            sorted: 0,
            recursion: false,
        }
    }

    /// Append an Unset value cell and an atom/index entry if `atom` is
    /// absent, returning the slot index either way (spec §4.4).
    pub fn add_word(&mut self, atom: u16) -> usize {
        if let Some(idx) = self.lookup(atom) {
            return idx;
        }
        let index = self.values.len();
        self.values.push(Cell::unset());
        self.entries.push(AtomEntry { atom, index: index as u16 });
        index
    }

    /// Binary search the sorted prefix, then linear-scan the unsorted tail.
    pub fn lookup(&self, atom: u16) -> Option<usize> {
        if self.sorted > 0 {
            let sorted_slice = &self.entries[..self.sorted];
            if let Ok(i) = sorted_slice.binary_search_by_key(&atom, |e| e.atom) {
                return Some(sorted_slice[i].index as usize);
            }
        }
        self.entries[self.sorted..].iter().find(|e| e.atom == atom).map(|e| e.index as usize)
    }

    /// Sort the full table by atom id; subsequent lookups need only the
    /// binary-search path.
    pub fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.atom);
        self.sorted = self.entries.len();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Target of a bind operation (spec §4.4's `UBindTarget`).
#[derive(Clone, Copy)]
pub struct BindTarget {
    /// Buffer id of the context to bind against.
    pub ctx_n: i32,
    pub bind_type: Binding,
    pub self_atom: u16,
}

/// Bind every word cell in `cells` against a single context (spec §4.4's
/// per-cell binding table). This is the flat, single-level half of a bind;
/// `boron_runtime::buffer::Thread::bind` drives the recursion into nested
/// non-shared block/paren/path buffers, since that needs store access this
/// module doesn't have.
pub fn bind_cells(cells: &mut [Cell], ctx: &ContextData, target: BindTarget) {
    for cell in cells.iter_mut() {
        if CellTag::is_word_type(cell.tag) {
            if let Some(idx) = ctx.lookup(cell.word_atom()) {
                cell.set_binding(target.bind_type);
                cell.set_word_binding(target.ctx_n, idx as u16);
            } else if cell.word_atom() == target.self_atom {
                cell.set_binding(Binding::SelfCtx);
                cell.set_word_binding(target.ctx_n, 0);
            }
        }
    }
}

/// Write Unbound (or invalid-buffer) into every word in the slice.
pub fn unbind_cells(cells: &mut [Cell]) {
    for cell in cells.iter_mut() {
        if CellTag::is_word_type(cell.tag) {
            let atom = cell.word_atom();
            cell.set_word_unbound(atom);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_word_then_lookup_before_sort() {
        let mut ctx = ContextData::with_capacity(4);
        let idx = ctx.add_word(7);
        assert_eq!(ctx.lookup(7), Some(idx));
        assert_eq!(ctx.lookup(8), None);
    }

    #[test]
    fn add_word_is_idempotent() {
        let mut ctx = ContextData::with_capacity(4);
        let a = ctx.add_word(3);
        let b = ctx.add_word(3);
        assert_eq!(a, b);
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn lookup_after_sort_agrees_with_before() {
        let mut ctx = ContextData::with_capacity(4);
        let atoms = [5u16, 1, 9, 3];
        let indices: Vec<usize> = atoms.iter().map(|&a| ctx.add_word(a)).collect();
        for (&a, &i) in atoms.iter().zip(indices.iter()) {
            assert_eq!(ctx.lookup(a), Some(i));
        }
        ctx.sort();
        for (&a, &i) in atoms.iter().zip(indices.iter()) {
            assert_eq!(ctx.lookup(a), Some(i), "sort must preserve lookup results");
        }
    }

    #[test]
    fn sorted_prefix_wins_over_tail_duplicate_is_impossible_but_first_match_order_holds() {
        let mut ctx = ContextData::with_capacity(4);
        ctx.add_word(1);
        ctx.add_word(2);
        ctx.sort();
        // New word appended after sort lands in the unsorted tail.
        let idx = ctx.add_word(3);
        assert_eq!(ctx.lookup(3), Some(idx));
        assert_eq!(ctx.sorted, 2);
    }

    #[test]
    fn bind_cells_sets_binding_and_self_ctx() {
        let mut ctx = ContextData::with_capacity(2);
        let idx = ctx.add_word(5);
        let target = BindTarget { ctx_n: 3, bind_type: Binding::Thread, self_atom: 99 };
        let mut cells = vec![
            Cell::word(CellTag::Word, Binding::Unbound, 0, 0, 5),
            Cell::word(CellTag::Word, Binding::Unbound, 0, 0, 99),
            Cell::word(CellTag::Word, Binding::Unbound, 0, 0, 1),
        ];
        bind_cells(&mut cells, &ctx, target);
        assert_eq!(cells[0].binding(), Binding::Thread);
        assert_eq!(cells[0].word_ctx(), 3);
        assert_eq!(cells[0].word_index(), idx as u16);
        assert_eq!(cells[1].binding(), Binding::SelfCtx);
        assert_eq!(cells[2].binding(), Binding::Unbound, "unmatched word stays unbound");
    }

    #[test]
    fn unbind_writes_unbound() {
        let mut cells = vec![Cell::word(CellTag::Word, Binding::Thread, 4, 2, 9)];
        unbind_cells(&mut cells);
        assert_eq!(cells[0].binding(), Binding::Unbound);
        assert_eq!(cells[0].word_atom(), 9);
    }
}
