//! Buffer store and mark-sweep collector (spec §3.2–§3.4, §4.2).
//!
//! A `Buffer` is the variable-sized backing for every series, block,
//! context, and hash-map cell; cells never own heap data directly, only a
//! buffer id. Each thread owns a private `BufferStore`; the shared `Env`
//! owns a second store that holds frozen (read-only, cross-thread) data.
//! A cell's buffer id is positive for the owning thread's private store and
//! negative for the shared store (spec §3.3) — `abs(id) - 1` is the actual
//! index; id `0` never appears in a live cell.

use std::collections::HashMap as StdHashMap;

use boron_core::{memory_stats, Binding, BoronError, Cell, CellTag};

use crate::context::{self, BindTarget, ContextData};

/// Element width tag for a `Vector` buffer (spec §3.2's "sized numeric
/// array").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorElem {
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl VectorElem {
    pub fn byte_size(self) -> usize {
        match self {
            VectorElem::I16 | VectorElem::U16 => 2,
            VectorElem::I32 | VectorElem::U32 | VectorElem::F32 => 4,
            VectorElem::F64 => 8,
        }
    }
}

/// String sub-encoding (spec §4.3): buffers auto-widen Latin1 -> Ucs2 and
/// auto-narrow (flatten) back down when every character fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Latin1,
    Utf8,
    Ucs2,
}

/// A pair-valued lookup table (spec's `hashmap!`). Minimal linear
/// implementation — the spec does not define hashmap operations in detail,
/// so this exists only to give the Context-adjacent type a home and to let
/// the collector visit its referenced cells.
#[derive(Default)]
pub struct HashMapData {
    pub pairs: Vec<(Cell, Cell)>,
}

impl HashMapData {
    pub fn get(&self, key: &Cell) -> Option<&Cell> {
        self.pairs.iter().find(|(k, _)| cells_equal(k, key)).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: Cell, value: Cell) {
        if let Some(slot) = self.pairs.iter_mut().find(|(k, _)| cells_equal(k, &key)) {
            slot.1 = value;
        } else {
            self.pairs.push((key, value));
        }
    }
}

fn cells_equal(a: &Cell, b: &Cell) -> bool {
    if a.tag != b.tag {
        return false;
    }
    match CellTag::from_u8(a.tag) {
        Some(CellTag::Int) => a.as_int() == b.as_int(),
        Some(CellTag::Double) => a.as_double() == b.as_double(),
        Some(CellTag::Logic) => a.as_logic() == b.as_logic(),
        Some(CellTag::Char) => a.as_char() == b.as_char(),
        _ if CellTag::is_word_type(a.tag) => a.word_atom() == b.word_atom(),
        _ => a.slot_a == b.slot_a && a.slot_b == b.slot_b,
    }
}

/// The variable-sized payload a buffer holds, keyed by its cell's type tag.
pub enum BufferData {
    /// Binary, Bitset, File, or a Latin1/Utf8 String.
    Bytes(Vec<u8>),
    /// A Ucs2 String.
    Wide(Vec<u16>),
    /// A numeric Vector; raw little-endian bytes, `elem_size(elem)` at a time.
    Vector { elem: VectorElem, raw: Vec<u8> },
    /// Block, Paren, Path, LitPath, or SetPath.
    Cells(Vec<Cell>),
    Context(ContextData),
    HashMap(HashMapData),
}

impl BufferData {
    pub fn used(&self) -> usize {
        match self {
            BufferData::Bytes(v) => v.len(),
            BufferData::Wide(v) => v.len(),
            BufferData::Vector { elem, raw } => raw.len() / elem.byte_size(),
            BufferData::Cells(v) => v.len(),
            BufferData::Context(c) => c.len(),
            BufferData::HashMap(h) => h.pairs.len(),
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            BufferData::Bytes(v) => v.capacity(),
            BufferData::Wide(v) => v.capacity() * 2,
            BufferData::Vector { raw, .. } => raw.capacity(),
            BufferData::Cells(v) => v.capacity() * std::mem::size_of::<Cell>(),
            BufferData::Context(c) => {
                c.values.capacity() * std::mem::size_of::<Cell>() + c.entries.capacity() * 4
            }
            BufferData::HashMap(h) => h.pairs.capacity() * std::mem::size_of::<Cell>() * 2,
        }
    }

    pub fn as_cells(&self) -> Option<&[Cell]> {
        match self {
            BufferData::Cells(v) => Some(v),
            BufferData::Context(c) => Some(&c.values),
            _ => None,
        }
    }

    pub fn as_cells_mut(&mut self) -> Option<&mut [Cell]> {
        match self {
            BufferData::Cells(v) => Some(v),
            BufferData::Context(c) => Some(&mut c.values),
            _ => None,
        }
    }

    /// Narrow (Latin1/Utf8) byte payload, for a Binary/Bitset/File/String
    /// buffer. `Wide` strings have no byte-slice view.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BufferData::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

/// A single slot in a `BufferStore`. Free slots repurpose `next_free`
/// (normally unused, since a live buffer's element count is read off its
/// `data`) to thread an intrusive free list, mirroring the original's reuse
/// of a freed buffer's `used` field for the same purpose.
pub struct Buffer {
    pub tag: u8,
    pub form: u8,
    pub flags: u8,
    pub data: BufferData,
    free: bool,
    next_free: i32,
}

impl Buffer {
    fn live(tag: u8, form: u8, data: BufferData) -> Buffer {
        Buffer { tag, form, flags: 0, data, free: false, next_free: -1 }
    }

    fn dead(next_free: i32) -> Buffer {
        Buffer {
            tag: CellTag::Unset as u8,
            form: 0,
            flags: 0,
            data: BufferData::Bytes(Vec::new()),
            free: true,
            next_free,
        }
    }

    pub fn is_free(&self) -> bool {
        self.free
    }

    pub fn string_encoding(&self) -> StringEncoding {
        match self.form {
            0 => StringEncoding::Latin1,
            1 => StringEncoding::Utf8,
            _ => StringEncoding::Ucs2,
        }
    }
}

/// A growable arena of `Buffer` slots plus a free list (spec §3.2).
#[derive(Default)]
pub struct BufferStore {
    slots: Vec<Buffer>,
    free_head: i32,
    free_count: usize,
}

impl BufferStore {
    pub fn new() -> BufferStore {
        BufferStore { slots: Vec::new(), free_head: -1, free_count: 0 }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Buffer> {
        self.slots.get(idx).filter(|b| !b.free)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Buffer> {
        match self.slots.get(idx) {
            Some(b) if !b.free => self.slots.get_mut(idx),
            _ => None,
        }
    }

    /// Allocate one buffer, reusing a free slot if the list is non-empty.
    pub fn alloc(&mut self, tag: u8, form: u8, data: BufferData) -> usize {
        if self.free_head >= 0 {
            let idx = self.free_head as usize;
            self.free_head = self.slots[idx].next_free;
            self.free_count -= 1;
            self.slots[idx] = Buffer::live(tag, form, data);
            idx
        } else {
            self.slots.push(Buffer::live(tag, form, data));
            self.slots.len() - 1
        }
    }

    fn free(&mut self, idx: usize) {
        self.slots[idx] = Buffer::dead(self.free_head);
        self.free_head = idx as i32;
        self.free_count += 1;
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free_count
    }

    pub fn total_bytes(&self) -> usize {
        self.slots.iter().filter(|b| !b.free).map(|b| b.byte_size()).sum()
    }
}

/// Convert a cell's signed buffer id to a `(store_is_shared, index)` pair.
pub fn resolve_id(id: i32) -> Option<(bool, usize)> {
    if id > 0 {
        Some((false, (id - 1) as usize))
    } else if id < 0 {
        Some((true, (-id - 1) as usize))
    } else {
        None
    }
}

/// Convert a store-local index back to a signed cell buffer id.
pub fn make_id(shared: bool, idx: usize) -> i32 {
    let n = idx as i32 + 1;
    if shared {
        -n
    } else {
        n
    }
}

/// The shared, cross-thread half of an interpreter instance: the atom
/// table and a store of frozen buffers (spec §3.3, §4.1).
pub struct Env {
    pub atoms: boron_core::AtomTable,
    pub shared: BufferStore,
    pub global_ctx: i32,
}

impl Env {
    pub fn new(atom_limit: usize, name_arena_limit: usize) -> Env {
        let mut shared = BufferStore::new();
        let global = shared.alloc(
            CellTag::Context as u8,
            0,
            BufferData::Context(ContextData::with_capacity(64)),
        );
        Env { atoms: boron_core::AtomTable::new(atom_limit, name_arena_limit), shared, global_ctx: make_id(true, global) }
    }
}

/// A single thread of execution: its private buffer store, value stack,
/// hold stack, and GC mark bitmap (spec §3.3, §3.4).
pub struct Thread {
    pub store: BufferStore,
    pub stack: Vec<Cell>,
    pub holds: Vec<i32>,
    /// One bit per buffer id, packed 8-to-a-byte, mirroring
    /// `original_source/urlan/gc.c`'s mark bitset shape.
    mark_bits: Vec<u8>,
    pub scratch: Cell,
    pub thread_ctx: i32,
}

impl Thread {
    /// New thread store, pre-seeded with a pinned thread-local context at
    /// buffer id 1 (spec §3.3: "a thread's store starts with a pinned
    /// context buffer").
    pub fn new() -> Thread {
        let mut store = BufferStore::new();
        let ctx_idx = store.alloc(
            CellTag::Context as u8,
            0,
            BufferData::Context(ContextData::with_capacity(16)),
        );
        Thread {
            store,
            stack: Vec::new(),
            holds: Vec::new(),
            mark_bits: Vec::new(),
            scratch: Cell::unset(),
            thread_ctx: make_id(false, ctx_idx),
        }
    }

    /// Allocate a batch of buffers in one collector-amortized call (spec
    /// §4.2's `gen` contract): the collector runs at most once up front if
    /// the free list can't cover the whole batch.
    pub fn gen(&mut self, specs: Vec<(u8, u8, BufferData)>) -> Vec<i32> {
        if self.store.free_count < specs.len() {
            self.recycle(&[]);
        }
        specs
            .into_iter()
            .map(|(tag, form, data)| make_id(false, self.store.alloc(tag, form, data)))
            .collect()
    }

    /// Allocate one buffer.
    pub fn gen_one(&mut self, tag: u8, form: u8, data: BufferData) -> i32 {
        if self.store.free_count == 0 {
            self.recycle(&[]);
        }
        make_id(false, self.store.alloc(tag, form, data))
    }

    pub fn buffer(&self, env: &Env, id: i32) -> Option<&Buffer> {
        match resolve_id(id)? {
            (false, idx) => self.store.get(idx),
            (true, idx) => env.shared.get(idx),
        }
    }

    /// Fetch a buffer for mutation. Shared-store buffers (negative ids,
    /// spec §3.3) are read-only once frozen, so this rejects them instead
    /// of handing out a `&mut Buffer` an unrelated thread could be reading
    /// through at the same time.
    pub fn buffer_mut<'a>(&'a mut self, env: &'a mut Env, id: i32) -> Result<&'a mut Buffer, BoronError> {
        match resolve_id(id) {
            Some((false, idx)) => {
                self.store.get_mut(idx).ok_or_else(|| BoronError::access("buffer: invalid or freed buffer id"))
            }
            Some((true, _)) => Err(BoronError::script("cannot mutate a value in shared storage")),
            None => Err(BoronError::access("buffer: invalid buffer id")),
        }
    }

    /// Bind every word cell in `cells` against the context at `ctx_id`,
    /// recursing into any nested, non-shared block/paren/path buffer
    /// (spec §4.4). Shared (frozen) nested buffers are left untouched since
    /// they are immutable once frozen.
    pub fn bind(&mut self, env: &Env, cells: &mut [Cell], ctx_id: i32, target: BindTarget) -> Result<(), BoronError> {
        let buf = self.buffer(env, ctx_id).ok_or_else(|| BoronError::internal("bind: invalid context buffer id"))?;
        let entries = match &buf.data {
            BufferData::Context(c) => c.entries.clone(),
            _ => return Err(BoronError::internal("bind: buffer is not a context")),
        };
        let snapshot = ContextData { values: Vec::new(), entries, sorted: 0, recursion: false };
        self.bind_with_ctx(cells, &snapshot, target);
        Ok(())
    }

    /// Bind the cells backing a top-level block/paren/path buffer against
    /// the context at `ctx_id`. Convenience wrapper around [`Thread::bind`]
    /// for callers that only have a buffer id, not an in-hand `&mut [Cell]`.
    pub fn bind_buffer(&mut self, env: &Env, buffer_id: i32, ctx_id: i32, target: BindTarget) -> Result<(), BoronError> {
        let (shared, idx) = resolve_id(buffer_id).ok_or_else(|| BoronError::internal("bind: invalid buffer id"))?;
        if shared {
            return Err(BoronError::script("cannot bind words into shared storage"));
        }
        let mut cells = {
            let buf = self.store.get_mut(idx).ok_or_else(|| BoronError::internal("bind: invalid or freed buffer id"))?;
            match &mut buf.data {
                BufferData::Cells(v) => std::mem::take(v),
                _ => return Err(BoronError::internal("bind: buffer has no cells")),
            }
        };
        self.bind(env, &mut cells, ctx_id, target)?;
        if let Some(buf) = self.store.get_mut(idx) {
            if let BufferData::Cells(v) = &mut buf.data {
                *v = cells;
            }
        }
        Ok(())
    }

    fn bind_with_ctx(&mut self, cells: &mut [Cell], ctx: &ContextData, target: BindTarget) {
        context::bind_cells(cells, ctx, target);
        for i in 0..cells.len() {
            let cell = cells[i];
            if !CellTag::is_block_type(cell.tag) {
                continue;
            }
            let Some((shared, idx)) = resolve_id(cell.series_buf()) else { continue };
            if shared {
                continue;
            }
            let mut nested = match self.store.get_mut(idx) {
                Some(buf) => match &mut buf.data {
                    BufferData::Cells(v) => std::mem::take(v),
                    _ => continue,
                },
                None => continue,
            };
            self.bind_with_ctx(&mut nested, ctx, target);
            if let Some(buf) = self.store.get_mut(idx) {
                if let BufferData::Cells(v) = &mut buf.data {
                    *v = nested;
                }
            }
        }
    }

    /// Protect a buffer id across an operation that may trigger `recycle`
    /// (spec §4.2). Returns a handle to pass to `release`.
    pub fn hold(&mut self, id: i32) -> usize {
        self.holds.push(id);
        self.holds.len() - 1
    }

    /// Release holds back to (and including) the one identified by `handle`.
    pub fn release(&mut self, handle: usize) {
        self.holds.truncate(handle);
    }

    /// Mark-sweep the private store. `extra_roots` covers cells outside the
    /// stack/holds/scratch/thread-context root set (e.g. a caller's local
    /// variables not yet pushed to the stack).
    pub fn recycle(&mut self, extra_roots: &[Cell]) {
        self.mark_bits.clear();
        self.mark_bits.resize((self.store.len() + 7) / 8, 0);

        for i in 0..self.stack.len() {
            let cell = self.stack[i];
            self.mark_cell(&cell);
        }
        for i in 0..self.holds.len() {
            let id = self.holds[i];
            self.mark_buffer_id(id);
        }
        for cell in extra_roots {
            self.mark_cell(cell);
        }
        let scratch = self.scratch;
        self.mark_cell(&scratch);
        self.mark_buffer_id(self.thread_ctx);

        for idx in 0..self.store.len() {
            let marked = self.is_marked(idx);
            let is_free = self.store.slots[idx].free;
            if !marked && !is_free {
                self.store.free(idx);
            }
        }

        memory_stats::update_store_stats(self.store.live_count(), self.store.total_bytes());
    }

    fn is_marked(&self, idx: usize) -> bool {
        let byte = idx / 8;
        let bit = 1u8 << (idx % 8);
        self.mark_bits.get(byte).map(|b| b & bit != 0).unwrap_or(false)
    }

    fn mark_buffer_id(&mut self, id: i32) -> bool {
        if id <= 0 {
            return false;
        }
        let idx = (id - 1) as usize;
        let byte = idx / 8;
        if byte >= self.mark_bits.len() {
            return false;
        }
        if self.is_marked(idx) {
            return false;
        }
        self.mark_bits[byte] |= 1u8 << (idx % 8);
        true
    }

    fn mark_buf_contents(&mut self, id: i32) {
        let idx = (id - 1) as usize;
        let cells: Vec<Cell> = match self.store.slots.get(idx) {
            Some(b) => match b.data.as_cells() {
                Some(cells) => cells.to_vec(),
                None => return,
            },
            None => return,
        };
        for cell in &cells {
            self.mark_cell(cell);
        }
    }

    fn mark_cell(&mut self, cell: &Cell) {
        let tag = cell.tag;
        if CellTag::is_word_type(tag) {
            if matches!(cell.binding(), Binding::Thread | Binding::Stack) {
                let ctx = cell.word_ctx();
                if ctx > 0 && self.mark_buffer_id(ctx) {
                    self.mark_buf_contents(ctx);
                }
            }
        } else if CellTag::is_series_type(tag) || tag == CellTag::Context as u8 || tag == CellTag::HashMap as u8 {
            let buf = cell.series_buf();
            if buf > 0 && self.mark_buffer_id(buf) {
                self.mark_buf_contents(buf);
            }
        } else if tag == CellTag::Error as u8 {
            let m = cell.error_message_buf();
            if m > 0 && self.mark_buffer_id(m) {
                self.mark_buf_contents(m);
            }
            let t = cell.error_trace_buf();
            if t > 0 && self.mark_buffer_id(t) {
                self.mark_buf_contents(t);
            }
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Thread::new()
    }
}

/// Migrate one thread-private buffer (and everything it transitively
/// references) into the shared env store, rewriting every cell that
/// pointed at the old private id. This is a narrower operation than the
/// spec's `freezeEnv` (see [`freeze_env`] below): it promotes a single
/// value's closure rather than the whole thread store, leaving every other
/// thread-private buffer untouched. Useful when only one value needs to
/// cross threads without forcing a full env freeze.
pub fn promote_value_to_shared(thread: &mut Thread, env: &mut Env, root_id: i32) -> i32 {
    let mut remap: StdHashMap<i32, i32> = StdHashMap::new();
    promote_walk(thread, env, root_id, &mut remap);
    remap[&root_id]
}

fn promote_walk(thread: &mut Thread, env: &mut Env, id: i32, remap: &mut StdHashMap<i32, i32>) -> i32 {
    if let Some(&done) = remap.get(&id) {
        return done;
    }
    let (shared, idx) = match resolve_id(id) {
        Some(r) => r,
        None => return id,
    };
    if shared {
        return id;
    }

    let tag = thread.store.slots[idx].tag;
    let form = thread.store.slots[idx].form;
    let new_idx = env.shared.slots.len();
    let new_id = make_id(true, new_idx);
    remap.insert(id, new_id);

    let moved = std::mem::replace(&mut thread.store.slots[idx].data, BufferData::Bytes(Vec::new()));
    let mut moved = moved;
    if let Some(cells) = moved.as_cells_mut() {
        for cell in cells.iter_mut() {
            remap_promoted_cell_refs(thread, env, cell, remap);
        }
    }
    env.shared.slots.push(Buffer { tag, form, flags: 0, data: moved, free: false, next_free: -1 });
    new_id
}

fn remap_promoted_cell_refs(thread: &mut Thread, env: &mut Env, cell: &mut Cell, remap: &mut StdHashMap<i32, i32>) {
    let tag = cell.tag;
    if CellTag::is_word_type(tag) {
        let ctx = cell.word_ctx();
        if ctx > 0 {
            let new_ctx = promote_walk(thread, env, ctx, remap);
            cell.set_word_ctx(new_ctx);
        }
    } else if CellTag::is_series_type(tag) || tag == CellTag::Context as u8 || tag == CellTag::HashMap as u8 {
        let buf = cell.series_buf();
        if buf > 0 {
            let new_buf = promote_walk(thread, env, buf, remap);
            cell.set_series_buf(new_buf);
        }
    }
}

/// Freeze the whole thread store into the shared env (spec §3.3's
/// `freezeEnv`), matching `original_source/urlan/env.c`'s `ur_freezeEnv`:
/// recycle first, then move every live thread-private buffer into the
/// shared store in one pass and rewrite every moved buffer's bindings and
/// series references from thread ids to their new shared ids. The thread
/// is left with a fresh, empty private store afterward, so every buffer
/// that existed before the freeze is now immutable shared storage.
pub fn freeze_env(thread: &mut Thread, env: &mut Env) {
    thread.recycle(&[]);

    let mut remap: StdHashMap<i32, i32> = StdHashMap::new();
    let old_slots = std::mem::take(&mut thread.store.slots);
    for (idx, buf) in old_slots.into_iter().enumerate() {
        if buf.free {
            continue;
        }
        let old_id = make_id(false, idx);
        let new_idx = env.shared.slots.len();
        let new_id = make_id(true, new_idx);
        remap.insert(old_id, new_id);
        env.shared.slots.push(Buffer {
            tag: buf.tag,
            form: buf.form,
            flags: buf.flags,
            data: buf.data,
            free: false,
            next_free: -1,
        });
    }

    let moved_from = env.shared.slots.len() - remap.len();
    for buf in env.shared.slots[moved_from..].iter_mut() {
        if let Some(cells) = buf.data.as_cells_mut() {
            for cell in cells.iter_mut() {
                remap_frozen_cell_refs(cell, &remap);
            }
        }
    }
    for cell in thread.stack.iter_mut() {
        remap_frozen_cell_refs(cell, &remap);
    }
    for id in thread.holds.iter_mut() {
        if let Some(&new_id) = remap.get(id) {
            *id = new_id;
        }
    }
    let mut scratch = thread.scratch;
    remap_frozen_cell_refs(&mut scratch, &remap);
    thread.scratch = scratch;

    thread.store = BufferStore::new();
    let ctx_idx =
        thread.store.alloc(CellTag::Context as u8, 0, BufferData::Context(ContextData::with_capacity(16)));
    thread.thread_ctx = make_id(false, ctx_idx);
}

fn remap_frozen_cell_refs(cell: &mut Cell, remap: &StdHashMap<i32, i32>) {
    let tag = cell.tag;
    if CellTag::is_word_type(tag) {
        let ctx = cell.word_ctx();
        if let Some(&new_ctx) = remap.get(&ctx) {
            cell.set_word_ctx(new_ctx);
        }
    } else if CellTag::is_series_type(tag) || tag == CellTag::Context as u8 || tag == CellTag::HashMap as u8 {
        let buf = cell.series_buf();
        if let Some(&new_buf) = remap.get(&buf) {
            cell.set_series_buf(new_buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_reuses_freed_slot() {
        let mut store = BufferStore::new();
        let a = store.alloc(CellTag::Binary as u8, 0, BufferData::Bytes(vec![1, 2, 3]));
        let b = store.alloc(CellTag::Binary as u8, 0, BufferData::Bytes(vec![4]));
        store.free(a);
        let c = store.alloc(CellTag::Binary as u8, 0, BufferData::Bytes(vec![9]));
        assert_eq!(c, a, "freed slot must be recycled before growing the vec");
        assert_ne!(b, c);
    }

    #[test]
    fn resolve_and_make_id_roundtrip() {
        assert_eq!(resolve_id(make_id(false, 5)), Some((false, 5)));
        assert_eq!(resolve_id(make_id(true, 5)), Some((true, 5)));
        assert_eq!(resolve_id(0), None);
    }

    #[test]
    fn recycle_keeps_only_reachable_buffers() {
        let mut thread = Thread::new();
        let kept = thread.gen_one(CellTag::Binary as u8, 0, BufferData::Bytes(vec![1]));
        let _unreachable = thread.gen_one(CellTag::Binary as u8, 0, BufferData::Bytes(vec![2]));
        thread.stack.push(Cell::series(CellTag::Binary, kept, 0, boron_core::NO_SLICE_END));

        thread.recycle(&[]);

        assert!(thread.store.get((kept - 1) as usize).is_some());
        let total_live = thread.store.live_count();
        // thread-context (pinned) + the kept binary buffer survive; the
        // unreachable one is swept.
        assert_eq!(total_live, 2);
    }

    #[test]
    fn hold_protects_buffer_across_recycle() {
        let mut thread = Thread::new();
        let held = thread.gen_one(CellTag::Binary as u8, 0, BufferData::Bytes(vec![7]));
        let h = thread.hold(held);
        thread.recycle(&[]);
        assert!(thread.store.get((held - 1) as usize).is_some());
        thread.release(h);
    }

    #[test]
    fn word_cell_marks_its_context() {
        let mut thread = Thread::new();
        let ctx_id = thread.gen_one(
            CellTag::Context as u8,
            0,
            BufferData::Context(ContextData::with_capacity(2)),
        );
        let word = Cell::word(CellTag::Word, Binding::Thread, ctx_id, 0, 42);
        thread.stack.push(word);

        thread.recycle(&[]);
        assert!(thread.store.get((ctx_id - 1) as usize).is_some());
    }

    #[test]
    fn freeze_moves_block_and_remaps_nested_context() {
        let mut env = Env::new(256, 4096);
        let mut thread = Thread::new();
        let ctx_id = thread.gen_one(
            CellTag::Context as u8,
            0,
            BufferData::Context(ContextData::with_capacity(2)),
        );
        let word = Cell::word(CellTag::Word, Binding::Thread, ctx_id, 0, 5);
        let block_id = thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(vec![word]));

        let frozen = promote_value_to_shared(&mut thread, &mut env, block_id);
        assert!(frozen < 0, "frozen id must point into the shared store");

        let (shared, idx) = resolve_id(frozen).unwrap();
        assert!(shared);
        let buf = env.shared.get(idx).unwrap();
        let cells = buf.data.as_cells().unwrap();
        assert!(resolve_id(cells[0].word_ctx()).unwrap().0, "nested context must be frozen too");
    }

    #[test]
    fn freeze_env_moves_whole_thread_store_and_remaps_stack() {
        let mut env = Env::new(256, 4096);
        let mut thread = Thread::new();
        let block_id = thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(vec![Cell::int(9)]));
        thread.stack.push(Cell::series(CellTag::Block, block_id, 0, boron_core::NO_SLICE_END));

        freeze_env(&mut thread, &mut env);

        let on_stack = thread.stack[0];
        assert!(on_stack.series_buf() < 0, "stack cell must now point into shared storage");
        assert_eq!(thread.store.live_count(), 1, "thread gets a fresh private store with just its pinned context");
        assert!(thread.buffer(&env, on_stack.series_buf()).is_some(), "remapped id must resolve in the shared store");
    }

    #[test]
    fn bind_recurses_into_nested_non_shared_block() {
        let env = Env::new(256, 4096);
        let mut thread = Thread::new();
        let mut ctx = ContextData::with_capacity(2);
        ctx.add_word(7);
        let ctx_id = thread.gen_one(CellTag::Context as u8, 0, BufferData::Context(ctx));

        let nested_word = Cell::word(CellTag::Word, Binding::Unbound, 0, 0, 7);
        let nested_id = thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(vec![nested_word]));
        let mut top = vec![Cell::series(CellTag::Block, nested_id, 0, boron_core::NO_SLICE_END)];
        let target = BindTarget { ctx_n: ctx_id, bind_type: Binding::Thread, self_atom: 0 };

        thread.bind(&env, &mut top, ctx_id, target).unwrap();

        let nested_cells = thread.buffer(&env, nested_id).unwrap().data.as_cells().unwrap();
        assert_eq!(nested_cells[0].binding(), Binding::Thread, "word inside nested block must be bound");
        assert_eq!(nested_cells[0].word_ctx(), ctx_id);
    }

    #[test]
    fn bind_does_not_rewrite_nested_shared_block() {
        let mut env = Env::new(256, 4096);
        let mut thread = Thread::new();
        let mut ctx = ContextData::with_capacity(2);
        ctx.add_word(7);
        let ctx_id = thread.gen_one(CellTag::Context as u8, 0, BufferData::Context(ctx));

        let nested_word = Cell::word(CellTag::Word, Binding::Unbound, 0, 0, 7);
        let nested_id = thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(vec![nested_word]));
        let shared_nested = promote_value_to_shared(&mut thread, &mut env, nested_id);
        let mut top = vec![Cell::series(CellTag::Block, shared_nested, 0, boron_core::NO_SLICE_END)];
        let target = BindTarget { ctx_n: ctx_id, bind_type: Binding::Thread, self_atom: 0 };

        thread.bind(&env, &mut top, ctx_id, target).unwrap();

        let nested_cells = thread.buffer(&env, shared_nested).unwrap().data.as_cells().unwrap();
        assert_eq!(
            nested_cells[0].binding(),
            Binding::Unbound,
            "shared nested block must stay untouched by bind"
        );
    }

    #[test]
    fn t5_mutating_a_frozen_buffer_fails_with_shared_storage_error() {
        let mut env = Env::new(256, 4096);
        let mut thread = Thread::new();
        let block_id = thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(vec![Cell::int(9)]));

        let shared_id = promote_value_to_shared(&mut thread, &mut env, block_id);

        let err = thread.buffer_mut(&mut env, shared_id).unwrap_err();
        assert!(
            err.to_string().contains("shared storage"),
            "expected a Script error mentioning shared storage, got: {err}"
        );
    }
}
