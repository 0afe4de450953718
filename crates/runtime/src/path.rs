//! Path selection and assignment (spec §4.5).
//!
//! A path's cells are selectors applied left to right against a starting
//! value: `a/b/1` looks up word `b` in whatever `a` evaluates to, then
//! indexes element `1` of that. `select` and `set_path` share the same
//! per-datatype dispatch table; `set_path` just stops one selector early
//! and pokes instead of reading.

use boron_core::{BoronError, Cell, CellTag};

use crate::buffer::{BufferData, VectorElem};
use crate::context::ContextData;

/// One step of path resolution against a container value.
pub enum Selector<'a> {
    Word(u16),
    Index(i64),
    Get(&'a Cell),
}

/// Resolve one selector against `container`, whose backing payload (if
/// any) is `data`. Returns the selected value.
pub fn select(container: &Cell, data: Option<&BufferData>, selector: &Selector) -> Result<Cell, BoronError> {
    match CellTag::from_u8(container.tag) {
        Some(CellTag::Context) => {
            let ctx = match data {
                Some(BufferData::Context(c)) => c,
                _ => return Err(BoronError::internal("path: context has no buffer")),
            };
            let atom = match selector {
                Selector::Word(a) => *a,
                Selector::Get(cell) if CellTag::is_word_type(cell.tag) => cell.word_atom(),
                _ => return Err(BoronError::script("path: expected a word selector on a context")),
            };
            ctx.lookup(atom)
                .map(|idx| ctx.values[idx])
                .ok_or_else(|| BoronError::script(format!("path: word not found in context (atom {atom})")))
        }
        Some(CellTag::Coord) => {
            let index = selector_index(selector)?;
            let n = container.coord_len();
            if index < 1 || index as usize > n {
                return Err(BoronError::script("path: coord index out of range"));
            }
            Ok(Cell::int(container.coord_components()[(index - 1) as usize] as i64))
        }
        Some(tag)
            if CellTag::is_block_type(container.tag)
                || tag == CellTag::Binary
                || tag == CellTag::String
                || tag == CellTag::Vector =>
        {
            let data = data.ok_or_else(|| BoronError::internal("path: series has no buffer"))?;
            let index = selector_index(selector)?;
            select_series_index(data, container, index)
        }
        _ => Err(BoronError::type_("path: value does not support path selection")),
    }
}

fn selector_index(selector: &Selector) -> Result<i64, BoronError> {
    match selector {
        Selector::Index(i) => Ok(*i),
        Selector::Get(cell) if cell.is(CellTag::Int) => Ok(cell.as_int()),
        _ => Err(BoronError::script("path: expected an integer selector")),
    }
}

fn select_series_index(data: &BufferData, container: &Cell, index: i64) -> Result<Cell, BoronError> {
    let it = container.series_it() as i64;
    let pos = it + index - 1;
    if pos < 0 {
        return Err(BoronError::script("path: index out of range"));
    }
    let pos = pos as usize;
    match data {
        BufferData::Cells(cells) => {
            cells.get(pos).copied().ok_or_else(|| BoronError::script("path: index out of range"))
        }
        BufferData::Bytes(bytes) => bytes
            .get(pos)
            .map(|&b| Cell::int(b as i64))
            .ok_or_else(|| BoronError::script("path: index out of range")),
        BufferData::Wide(wide) => wide
            .get(pos)
            .map(|&u| Cell::char_(u as u32))
            .ok_or_else(|| BoronError::script("path: index out of range")),
        BufferData::Vector { raw, elem } => {
            let sz = elem.byte_size();
            let start = pos * sz;
            if start + sz > raw.len() {
                Err(BoronError::script("path: index out of range"))
            } else {
                Ok(decode_vector_elem(*elem, &raw[start..start + sz]))
            }
        }
        BufferData::Context(ContextData { values, .. }) => {
            values.get(pos).copied().ok_or_else(|| BoronError::script("path: index out of range"))
        }
        BufferData::HashMap(_) => Err(BoronError::type_("path: cannot index a hashmap by position")),
    }
}

/// Decode one raw little-endian element out of a `Vector` buffer's backing
/// bytes, mirroring `tokenizer::push_vector_elem`'s encoding in reverse.
fn decode_vector_elem(elem: VectorElem, bytes: &[u8]) -> Cell {
    match elem {
        VectorElem::I16 => Cell::int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
        VectorElem::U16 => Cell::int(u16::from_le_bytes([bytes[0], bytes[1]]) as i64),
        VectorElem::I32 => Cell::int(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64),
        VectorElem::U32 => Cell::int(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64),
        VectorElem::F32 => {
            Cell::double(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64)
        }
        VectorElem::F64 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(bytes);
            Cell::double(f64::from_le_bytes(b))
        }
    }
}

/// Overwrite the element at a series' selected position (spec §4.5's
/// `set_path` on a block/paren/path target).
pub fn set_path_cells(cells: &mut [Cell], container: &Cell, index: i64, value: Cell) -> Result<(), BoronError> {
    let it = container.series_it() as i64;
    let pos = it + index - 1;
    if pos < 0 || pos as usize >= cells.len() {
        return Err(BoronError::script("set-path: index out of range"));
    }
    cells[pos as usize] = value;
    Ok(())
}

/// Overwrite a context member selected by word (spec §4.5's `set_path` on
/// a context target).
pub fn set_path_context(ctx: &mut ContextData, atom: u16, value: Cell) -> Result<(), BoronError> {
    let idx = ctx.lookup(atom).ok_or_else(|| BoronError::script("set-path: word not found in context"))?;
    ctx.values[idx] = value;
    Ok(())
}
