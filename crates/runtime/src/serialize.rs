//! BOR1 binary serializer (spec §4.9, §6 "Serialized form").
//!
//! Layout: magic `BOR1`, a 32-bit big-endian offset to a NUL-separated
//! atom-name blob, a 32-bit big-endian buffer count, then one record per
//! buffer (type tag + variant byte + payload), then a trailing 4-byte
//! root buffer index. Integers inside cell/buffer payloads use a
//! packed-unsigned (6/14/22/38-bit width classes picked by the low two
//! bits of the leading byte) plus a zig-zag transform for signed values;
//! wide-string code units are written big-endian regardless of host
//! byte order. The name blob is written for inspectability but decoding
//! never depends on it — every word cell and context entry carries its
//! own name inline, which is what decoding actually re-interns.

use boron_core::{AtomTable, BoronError, Cell, CellTag};

use crate::buffer::{Buffer, BufferData, HashMapData, Thread, VectorElem};
use crate::context::{AtomEntry, ContextData};

pub const MAGIC: &[u8; 4] = b"BOR1";

const VARIANT_BYTES: u8 = 0;
const VARIANT_WIDE: u8 = 1;
const VARIANT_VECTOR: u8 = 2;
const VARIANT_CELLS: u8 = 3;
const VARIANT_CONTEXT: u8 = 4;
const VARIANT_HASHMAP: u8 = 5;

fn variant_of(data: &BufferData) -> u8 {
    match data {
        BufferData::Bytes(_) => VARIANT_BYTES,
        BufferData::Wide(_) => VARIANT_WIDE,
        BufferData::Vector { .. } => VARIANT_VECTOR,
        BufferData::Cells(_) => VARIANT_CELLS,
        BufferData::Context(_) => VARIANT_CONTEXT,
        BufferData::HashMap(_) => VARIANT_HASHMAP,
    }
}

fn write_packed_unsigned(out: &mut Vec<u8>, v: u64) {
    if v < (1 << 6) {
        out.push((v as u8) << 2);
    } else if v < (1 << 14) {
        let v = v as u16;
        out.push(((v & 0x3f) as u8) << 2 | 0b01);
        out.push((v >> 6) as u8);
    } else if v < (1 << 22) {
        out.push(((v & 0x3f) as u8) << 2 | 0b10);
        out.push(((v >> 6) & 0xff) as u8);
        out.push(((v >> 14) & 0xff) as u8);
    } else {
        out.push(((v & 0x3f) as u8) << 2 | 0b11);
        out.push(((v >> 6) & 0xff) as u8);
        out.push(((v >> 14) & 0xff) as u8);
        out.push(((v >> 22) & 0xff) as u8);
        out.push(((v >> 30) & 0xff) as u8);
    }
}

fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8, BoronError> {
    let v = *data.get(*pos).ok_or_else(|| BoronError::internal("serialize: truncated record"))?;
    *pos += 1;
    Ok(v)
}

fn read_packed_unsigned(data: &[u8], pos: &mut usize) -> Result<u64, BoronError> {
    let b0 = read_u8(data, pos)?;
    let width_class = b0 & 0b11;
    let low6 = (b0 >> 2) as u64;
    match width_class {
        0b00 => Ok(low6),
        0b01 => Ok(low6 | ((read_u8(data, pos)? as u64) << 6)),
        0b10 => {
            let b1 = read_u8(data, pos)?;
            let b2 = read_u8(data, pos)?;
            Ok(low6 | ((b1 as u64) << 6) | ((b2 as u64) << 14))
        }
        _ => {
            let b1 = read_u8(data, pos)?;
            let b2 = read_u8(data, pos)?;
            let b3 = read_u8(data, pos)?;
            let b4 = read_u8(data, pos)?;
            Ok(low6 | ((b1 as u64) << 6) | ((b2 as u64) << 14) | ((b3 as u64) << 22) | ((b4 as u64) << 30))
        }
    }
}

fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn write_signed(out: &mut Vec<u8>, v: i64) {
    write_packed_unsigned(out, zigzag_encode(v));
}

fn read_signed(data: &[u8], pos: &mut usize) -> Result<i64, BoronError> {
    Ok(zigzag_decode(read_packed_unsigned(data, pos)?))
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    write_packed_unsigned(out, name.len() as u64);
    out.extend_from_slice(name.as_bytes());
}

fn read_name(data: &[u8], pos: &mut usize) -> Result<String, BoronError> {
    let len = read_packed_unsigned(data, pos)? as usize;
    let end = *pos + len;
    let bytes = data.get(*pos..end).ok_or_else(|| BoronError::internal("serialize: truncated atom name"))?;
    *pos = end;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn vector_elem_tag(elem: VectorElem) -> u8 {
    match elem {
        VectorElem::I16 => 0,
        VectorElem::U16 => 1,
        VectorElem::I32 => 2,
        VectorElem::U32 => 3,
        VectorElem::F32 => 4,
        VectorElem::F64 => 5,
    }
}

fn vector_elem_from_tag(tag: u8) -> VectorElem {
    match tag {
        0 => VectorElem::I16,
        1 => VectorElem::U16,
        2 => VectorElem::I32,
        3 => VectorElem::U32,
        4 => VectorElem::F32,
        _ => VectorElem::F64,
    }
}

/// Serialize the buffer reachable from `root` (and everything it
/// transitively references) into a self-contained BOR1 binary.
pub fn serialize(thread: &Thread, atoms: &AtomTable, root: i32) -> Result<Vec<u8>, BoronError> {
    let mut order = Vec::new();
    collect_buffers(thread, root, &mut order);

    let mut atom_blob = Vec::new();
    let mut records = Vec::with_capacity(order.len());
    for &id in &order {
        let buf = thread
            .store
            .get((id - 1) as usize)
            .ok_or_else(|| BoronError::internal("serialize: dangling buffer id"))?;
        records.push(serialize_buffer(buf, &order, atoms, &mut atom_blob));
    }

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[0u8; 4]); // atom-blob offset, patched below
    out.extend_from_slice(&(order.len() as u32).to_be_bytes());
    for rec in &records {
        out.extend_from_slice(rec);
    }
    let blob_offset = out.len() as u32;
    out[4..8].copy_from_slice(&blob_offset.to_be_bytes());
    out.extend_from_slice(&atom_blob);

    let root_idx = order.iter().position(|&id| id == root).unwrap_or(0) as u32;
    out.extend_from_slice(&root_idx.to_be_bytes());
    Ok(out)
}

fn collect_buffers(thread: &Thread, id: i32, out: &mut Vec<i32>) {
    if id <= 0 || out.contains(&id) {
        return;
    }
    let buf = match thread.store.get((id - 1) as usize) {
        Some(b) => b,
        None => return,
    };
    out.push(id);
    if let Some(cells) = buf.data.as_cells() {
        let nested: Vec<i32> = cells.iter().filter_map(referenced_buffer_id).collect();
        for n in nested {
            collect_buffers(thread, n, out);
        }
    }
    if let BufferData::HashMap(h) = &buf.data {
        let nested: Vec<i32> =
            h.pairs.iter().flat_map(|(k, v)| [referenced_buffer_id(k), referenced_buffer_id(v)]).flatten().collect();
        for n in nested {
            collect_buffers(thread, n, out);
        }
    }
}

fn referenced_buffer_id(c: &Cell) -> Option<i32> {
    if CellTag::is_word_type(c.tag) {
        Some(c.word_ctx())
    } else if CellTag::is_series_type(c.tag) || c.tag == CellTag::Context as u8 || c.tag == CellTag::HashMap as u8 {
        Some(c.series_buf())
    } else {
        None
    }
}

fn serialize_buffer(buf: &Buffer, order: &[i32], atoms: &AtomTable, atom_blob: &mut Vec<u8>) -> Vec<u8> {
    let mut out = vec![buf.tag, buf.form, variant_of(&buf.data)];
    match &buf.data {
        BufferData::Bytes(b) => {
            write_packed_unsigned(&mut out, b.len() as u64);
            out.extend_from_slice(b);
        }
        BufferData::Wide(w) => {
            write_packed_unsigned(&mut out, w.len() as u64);
            for &u in w {
                out.extend_from_slice(&u.to_be_bytes());
            }
        }
        // Raw element bytes are copied verbatim; they carry their own
        // internal byte order (see series.rs), not the wire's general
        // big-endian convention for packed integers.
        BufferData::Vector { elem, raw } => {
            out.push(vector_elem_tag(*elem));
            write_packed_unsigned(&mut out, raw.len() as u64);
            out.extend_from_slice(raw);
        }
        BufferData::Cells(cells) => {
            write_packed_unsigned(&mut out, cells.len() as u64);
            for c in cells {
                serialize_cell(&mut out, c, order, atoms, atom_blob);
            }
        }
        BufferData::Context(ctx) => {
            write_packed_unsigned(&mut out, ctx.values.len() as u64);
            for entry in &ctx.entries {
                let name = atoms.name(entry.atom);
                write_name(&mut out, name);
                write_packed_unsigned(&mut out, entry.index as u64);
                atom_blob.extend_from_slice(name.as_bytes());
                atom_blob.push(0);
            }
            for c in &ctx.values {
                serialize_cell(&mut out, c, order, atoms, atom_blob);
            }
        }
        BufferData::HashMap(h) => {
            write_packed_unsigned(&mut out, h.pairs.len() as u64);
            for (k, v) in &h.pairs {
                serialize_cell(&mut out, k, order, atoms, atom_blob);
                serialize_cell(&mut out, v, order, atoms, atom_blob);
            }
        }
    }
    out
}

fn buffer_order_index(order: &[i32], id: i32) -> i64 {
    if id <= 0 {
        return 0;
    }
    order.iter().position(|&x| x == id).map(|i| i as i64 + 1).unwrap_or(0)
}

fn serialize_cell(out: &mut Vec<u8>, cell: &Cell, order: &[i32], atoms: &AtomTable, atom_blob: &mut Vec<u8>) {
    out.push(cell.tag);
    out.push(cell.flags);
    match CellTag::from_u8(cell.tag) {
        Some(CellTag::Int) => write_signed(out, cell.as_int()),
        Some(CellTag::Logic) => out.push(cell.as_logic() as u8),
        Some(CellTag::Char) => write_packed_unsigned(out, cell.as_char() as u64),
        Some(CellTag::Double) | Some(CellTag::Time) | Some(CellTag::Date) | Some(CellTag::Timecode) => {
            out.extend_from_slice(&cell.as_double().to_be_bytes());
        }
        Some(_) if CellTag::is_word_type(cell.tag) => {
            let name = atoms.name(cell.word_atom());
            write_name(out, name);
            atom_blob.extend_from_slice(name.as_bytes());
            atom_blob.push(0);
            out.push(cell.binding() as u8);
            write_signed(out, buffer_order_index(order, cell.word_ctx()));
        }
        Some(tag) if CellTag::is_series_type(cell.tag) || tag == CellTag::Context || tag == CellTag::HashMap => {
            write_signed(out, buffer_order_index(order, cell.series_buf()));
            write_signed(out, cell.series_it() as i64);
            write_signed(out, cell.series_end() as i64);
        }
        _ => {
            write_packed_unsigned(out, cell.ext as u64);
            write_signed(out, cell.slot_a as i64);
            write_signed(out, cell.slot_b as i64);
        }
    }
}

/// Rebuild the buffer graph encoded in `data` into `thread`'s store,
/// interning every atom name it references into `atoms`. Returns the
/// root buffer's (thread-private) id.
pub fn deserialize(thread: &mut Thread, atoms: &mut AtomTable, data: &[u8]) -> Result<i32, BoronError> {
    if data.len() < 12 || &data[0..4] != MAGIC {
        return Err(BoronError::internal("deserialize: bad magic"));
    }
    let buffer_count = u32::from_be_bytes(data[8..12].try_into().unwrap()) as usize;

    // Pass 1: walk every buffer record once. Non-referencing payloads
    // (Bytes/Wide/Vector) are fully decoded and allocated immediately;
    // referencing ones (Cells/Context/HashMap) get an empty placeholder
    // of the right shape, since their cells may point at buffers that
    // haven't been allocated yet (buffers are written parent-before-child).
    let mut pos = 12usize;
    let mut referencing: Vec<(i32, u8, usize, usize)> = Vec::new();
    let mut new_ids = Vec::with_capacity(buffer_count);
    for _ in 0..buffer_count {
        let tag = read_u8(data, &mut pos)?;
        let form = read_u8(data, &mut pos)?;
        let variant = read_u8(data, &mut pos)?;
        let start = pos;
        match variant {
            VARIANT_BYTES | VARIANT_WIDE | VARIANT_VECTOR => {
                let payload = parse_nonref_payload(variant, data, &mut pos)?;
                new_ids.push(thread.gen_one(tag, form, payload));
            }
            VARIANT_CELLS => {
                skip_cells_payload(data, &mut pos)?;
                let id = thread.gen_one(tag, form, BufferData::Cells(Vec::new()));
                new_ids.push(id);
                referencing.push((id, variant, start, pos));
            }
            VARIANT_CONTEXT => {
                skip_context_payload(data, &mut pos)?;
                let id = thread.gen_one(tag, form, BufferData::Context(ContextData::with_capacity(0)));
                new_ids.push(id);
                referencing.push((id, variant, start, pos));
            }
            VARIANT_HASHMAP => {
                skip_hashmap_payload(data, &mut pos)?;
                let id = thread.gen_one(tag, form, BufferData::HashMap(HashMapData::default()));
                new_ids.push(id);
                referencing.push((id, variant, start, pos));
            }
            _ => return Err(BoronError::internal("deserialize: unknown buffer variant")),
        }
    }

    // Pass 2: every id now exists, so referencing payloads can resolve
    // their forward-pointing buffer references.
    for (id, variant, start, _end) in referencing {
        let mut p = start;
        match variant {
            VARIANT_CELLS => {
                let cells = parse_cells_list(data, &mut p, atoms, &new_ids)?;
                if let Some(buf) = thread.store.get_mut((id - 1) as usize) {
                    buf.data = BufferData::Cells(cells);
                }
            }
            VARIANT_CONTEXT => {
                let ctx = parse_context_payload(data, &mut p, atoms, &new_ids)?;
                if let Some(buf) = thread.store.get_mut((id - 1) as usize) {
                    buf.data = BufferData::Context(ctx);
                }
            }
            VARIANT_HASHMAP => {
                let count = read_packed_unsigned(data, &mut p)? as usize;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let k = parse_cell(data, &mut p, atoms, &new_ids)?;
                    let v = parse_cell(data, &mut p, atoms, &new_ids)?;
                    pairs.push((k, v));
                }
                if let Some(buf) = thread.store.get_mut((id - 1) as usize) {
                    buf.data = BufferData::HashMap(HashMapData { pairs });
                }
            }
            _ => unreachable!(),
        }
    }

    let root_idx = u32::from_be_bytes(data[data.len() - 4..].try_into().unwrap()) as usize;
    new_ids.get(root_idx).copied().ok_or_else(|| BoronError::internal("deserialize: root index out of range"))
}

fn parse_nonref_payload(variant: u8, data: &[u8], pos: &mut usize) -> Result<BufferData, BoronError> {
    match variant {
        VARIANT_BYTES => {
            let len = read_packed_unsigned(data, pos)? as usize;
            let end = *pos + len;
            let bytes = data.get(*pos..end).ok_or_else(|| BoronError::internal("deserialize: truncated bytes"))?.to_vec();
            *pos = end;
            Ok(BufferData::Bytes(bytes))
        }
        VARIANT_WIDE => {
            let len = read_packed_unsigned(data, pos)? as usize;
            let mut w = Vec::with_capacity(len);
            for _ in 0..len {
                let hi = read_u8(data, pos)? as u16;
                let lo = read_u8(data, pos)? as u16;
                w.push((hi << 8) | lo);
            }
            Ok(BufferData::Wide(w))
        }
        VARIANT_VECTOR => {
            let elem_tag = read_u8(data, pos)?;
            let len = read_packed_unsigned(data, pos)? as usize;
            let end = *pos + len;
            let raw = data.get(*pos..end).ok_or_else(|| BoronError::internal("deserialize: truncated vector"))?.to_vec();
            *pos = end;
            Ok(BufferData::Vector { elem: vector_elem_from_tag(elem_tag), raw })
        }
        _ => unreachable!(),
    }
}

fn skip_name(data: &[u8], pos: &mut usize) -> Result<(), BoronError> {
    let len = read_packed_unsigned(data, pos)? as usize;
    *pos += len;
    Ok(())
}

fn skip_cell(data: &[u8], pos: &mut usize) -> Result<(), BoronError> {
    let tag = read_u8(data, pos)?;
    let _flags = read_u8(data, pos)?;
    match CellTag::from_u8(tag) {
        Some(CellTag::Int) => {
            read_signed(data, pos)?;
        }
        Some(CellTag::Logic) => {
            read_u8(data, pos)?;
        }
        Some(CellTag::Char) => {
            read_packed_unsigned(data, pos)?;
        }
        Some(CellTag::Double) | Some(CellTag::Time) | Some(CellTag::Date) | Some(CellTag::Timecode) => {
            *pos += 8;
        }
        Some(t) if CellTag::is_word_type(tag) => {
            skip_name(data, pos)?;
            read_u8(data, pos)?;
            read_signed(data, pos)?;
            let _ = t;
        }
        Some(t) if CellTag::is_series_type(tag) || t == CellTag::Context || t == CellTag::HashMap => {
            read_signed(data, pos)?;
            read_signed(data, pos)?;
            read_signed(data, pos)?;
        }
        _ => {
            read_packed_unsigned(data, pos)?;
            read_signed(data, pos)?;
            read_signed(data, pos)?;
        }
    }
    Ok(())
}

fn skip_cells_payload(data: &[u8], pos: &mut usize) -> Result<(), BoronError> {
    let count = read_packed_unsigned(data, pos)? as usize;
    for _ in 0..count {
        skip_cell(data, pos)?;
    }
    Ok(())
}

fn skip_context_payload(data: &[u8], pos: &mut usize) -> Result<(), BoronError> {
    let count = read_packed_unsigned(data, pos)? as usize;
    for _ in 0..count {
        skip_name(data, pos)?;
        read_packed_unsigned(data, pos)?;
    }
    for _ in 0..count {
        skip_cell(data, pos)?;
    }
    Ok(())
}

fn skip_hashmap_payload(data: &[u8], pos: &mut usize) -> Result<(), BoronError> {
    let count = read_packed_unsigned(data, pos)? as usize;
    for _ in 0..count * 2 {
        skip_cell(data, pos)?;
    }
    Ok(())
}

fn parse_cells_list(data: &[u8], pos: &mut usize, atoms: &mut AtomTable, new_ids: &[i32]) -> Result<Vec<Cell>, BoronError> {
    let count = read_packed_unsigned(data, pos)? as usize;
    let mut cells = Vec::with_capacity(count);
    for _ in 0..count {
        cells.push(parse_cell(data, pos, atoms, new_ids)?);
    }
    Ok(cells)
}

fn parse_context_payload(
    data: &[u8],
    pos: &mut usize,
    atoms: &mut AtomTable,
    new_ids: &[i32],
) -> Result<ContextData, BoronError> {
    let count = read_packed_unsigned(data, pos)? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_name(data, pos)?;
        let index = read_packed_unsigned(data, pos)? as u16;
        let atom = atoms.intern(&name)?;
        entries.push(AtomEntry { atom, index });
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(parse_cell(data, pos, atoms, new_ids)?);
    }
    Ok(ContextData { values, entries, sorted: 0, recursion: false })
}

/// Resolve a writer's order-index back to the freshly allocated buffer
/// id (`0` means "no buffer", matching an unbound/none reference).
fn resolve_order_index(order_idx: i64, new_ids: &[i32]) -> i32 {
    if order_idx <= 0 {
        0
    } else {
        new_ids.get((order_idx - 1) as usize).copied().unwrap_or(0)
    }
}

fn parse_cell(data: &[u8], pos: &mut usize, atoms: &mut AtomTable, new_ids: &[i32]) -> Result<Cell, BoronError> {
    let tag = read_u8(data, pos)?;
    let flags = read_u8(data, pos)?;
    let mut cell = match CellTag::from_u8(tag) {
        Some(CellTag::Int) => Cell::int(read_signed(data, pos)?),
        Some(CellTag::Logic) => Cell::logic(read_u8(data, pos)? != 0),
        Some(CellTag::Char) => Cell::char_(read_packed_unsigned(data, pos)? as u32),
        Some(t @ CellTag::Double) | Some(t @ CellTag::Time) | Some(t @ CellTag::Date) | Some(t @ CellTag::Timecode) => {
            let bits = u64::from_be_bytes(
                data.get(*pos..*pos + 8).ok_or_else(|| BoronError::internal("deserialize: truncated float"))?.try_into().unwrap(),
            );
            *pos += 8;
            let v = f64::from_bits(bits);
            match t {
                CellTag::Time => Cell::time(v),
                CellTag::Date => Cell::date(v),
                CellTag::Timecode => Cell::timecode(v, flags),
                _ => Cell::double(v),
            }
        }
        Some(t) if CellTag::is_word_type(tag) => {
            let name = read_name(data, pos)?;
            let binding = read_u8(data, pos)?;
            let ctx_order = read_signed(data, pos)?;
            let ctx_id = resolve_order_index(ctx_order, new_ids);
            let atom = atoms.intern(&name)?;
            Cell::word(t, boron_core::Binding::from_u8(binding), ctx_id, 0, atom)
        }
        Some(t) if CellTag::is_series_type(tag) || t == CellTag::Context || t == CellTag::HashMap => {
            let buf_order = read_signed(data, pos)?;
            let it = read_signed(data, pos)? as i32;
            let end = read_signed(data, pos)? as i32;
            Cell::series(t, resolve_order_index(buf_order, new_ids), it, end)
        }
        _ => {
            let ext = read_packed_unsigned(data, pos)? as u16;
            let a = read_signed(data, pos)?;
            let b = read_signed(data, pos)?;
            Cell { tag, flags: 0, ext, slot_a: a as i32, slot_b: b as u64 }
        }
    };
    cell.flags = flags;
    Ok(cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferData;

    #[test]
    fn t6_serialize_starts_with_magic() {
        let mut thread = Thread::new();
        let mut atoms = AtomTable::new(256, 8192);
        let word_atom = atoms.intern("word").unwrap();
        let string_id = thread.gen_one(CellTag::String as u8, 0, BufferData::Bytes(b"hi".to_vec()));
        let word = Cell::word(CellTag::Word, boron_core::Binding::Unbound, 0, 0, word_atom);
        let string_cell = Cell::series(CellTag::String, string_id, 0, boron_core::NO_SLICE_END);
        let block_id =
            thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(vec![Cell::int(1), string_cell, word]));

        let bytes = serialize(&thread, &atoms, block_id).unwrap();
        assert_eq!(&bytes[0..4], MAGIC);
    }

    #[test]
    fn t6_unserialize_rebuilds_unbound_word_with_original_atom_name() {
        let mut thread = Thread::new();
        let mut atoms = AtomTable::new(256, 8192);
        let word_atom = atoms.intern("word").unwrap();
        let string_id = thread.gen_one(CellTag::String as u8, 0, BufferData::Bytes(b"hi".to_vec()));
        let word = Cell::word(CellTag::Word, boron_core::Binding::Unbound, 0, 0, word_atom);
        let string_cell = Cell::series(CellTag::String, string_id, 0, boron_core::NO_SLICE_END);
        let block_id =
            thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(vec![Cell::int(1), string_cell, word]));

        let bytes = serialize(&thread, &atoms, block_id).unwrap();

        let mut thread2 = Thread::new();
        let root = deserialize(&mut thread2, &mut atoms, &bytes).unwrap();
        let buf = thread2.store.get((root - 1) as usize).unwrap();
        let cells = buf.data.as_cells().unwrap();
        assert_eq!(cells.len(), 3);
        assert!(cells[2].is(CellTag::Word));
        assert_eq!(cells[2].binding(), boron_core::Binding::Unbound);
        assert_eq!(atoms.name(cells[2].word_atom()), "word");
    }

    #[test]
    fn roundtrip_simple_int_block() {
        let mut thread = Thread::new();
        let mut atoms = AtomTable::new(256, 8192);
        let block_id =
            thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(vec![Cell::int(1), Cell::int(-7), Cell::int(42)]));

        let bytes = serialize(&thread, &atoms, block_id).unwrap();

        let mut thread2 = Thread::new();
        let root = deserialize(&mut thread2, &mut atoms, &bytes).unwrap();
        let buf = thread2.store.get((root - 1) as usize).unwrap();
        let cells = buf.data.as_cells().unwrap();
        assert_eq!(cells.iter().map(|c| c.as_int()).collect::<Vec<_>>(), vec![1, -7, 42]);
    }

    #[test]
    fn roundtrip_preserves_nested_context_binding() {
        let mut thread = Thread::new();
        let mut atoms = AtomTable::new(256, 8192);
        let x_atom = atoms.intern("x").unwrap();

        let mut ctx = ContextData::with_capacity(2);
        ctx.add_word(x_atom);
        ctx.values[0] = Cell::int(99);
        let ctx_id = thread.gen_one(CellTag::Context as u8, 0, BufferData::Context(ctx));

        let word = Cell::word(CellTag::Word, boron_core::Binding::Thread, ctx_id, 0, x_atom);
        let block_id = thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(vec![word]));

        let bytes = serialize(&thread, &atoms, block_id).unwrap();
        let mut thread2 = Thread::new();
        let root = deserialize(&mut thread2, &mut atoms, &bytes).unwrap();

        let block = thread2.store.get((root - 1) as usize).unwrap();
        let word2 = block.data.as_cells().unwrap()[0];
        let ctx2_id = word2.word_ctx();
        let ctx2 = thread2.store.get((ctx2_id - 1) as usize).unwrap();
        let ctx2_data = match &ctx2.data {
            BufferData::Context(c) => c,
            _ => panic!("expected a context buffer"),
        };
        assert_eq!(ctx2_data.values[0].as_int(), 99);
        let x_atom2 = atoms.intern("x").unwrap();
        assert_eq!(ctx2_data.lookup(x_atom2), Some(0));
    }

    #[test]
    fn packed_unsigned_roundtrips_across_width_classes() {
        for v in [0u64, 63, 64, 16383, 16384, 4194303, 4194304, 1_000_000_000] {
            let mut out = Vec::new();
            write_packed_unsigned(&mut out, v);
            let mut pos = 0;
            assert_eq!(read_packed_unsigned(&out, &mut pos).unwrap(), v);
        }
    }

    #[test]
    fn zigzag_roundtrips_negative_and_positive() {
        for v in [0i64, -1, 1, -1000, 1000, i32::MIN as i64, i32::MAX as i64] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }
}
