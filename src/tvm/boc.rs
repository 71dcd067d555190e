//! Bag of Cells (BoC) serialization and deserialization
//!
//! BoC is a serialization format that encodes cells into byte arrays.
//! It allows storing and transmitting cell structures efficiently.
//!
//! Layout of the generic format:
//!
//! ```text
//! magic:u32 flags:u8 off_bytes:u8
//! cells:size roots:size absent:size tot_cells_size:off_bytes
//! root_list:[size; roots]
//! index:[off_bytes; cells]          if has_idx
//! cell_data:[u8; tot_cells_size]
//! crc32c:u32 (little-endian)        if has_crc32c
//! ```
//!
//! Cells are written parents first: every child index is strictly greater
//! than the index of the cell referencing it.

use crate::tvm::cell::{Cell, DEPTH_BYTES, HASH_BYTES, MAX_CELL_REFS};
use crate::tvm::error::{CellError, Result};
use crate::tvm::level_mask::LevelMask;
use base64::Engine;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Arc;

/// BoC magic number for standard format
const BOC_GENERIC_MAGIC: u32 = 0xb5ee9c72;

/// BoC magic number for indexed format
const BOC_INDEXED_MAGIC: u32 = 0x68ff65f3;

/// BoC magic number for indexed format (with CRC32C)
const BOC_INDEXED_CRC32C_MAGIC: u32 = 0xacc3a728;

const FLAG_HAS_IDX: u8 = 0x80;
const FLAG_HAS_CRC32C: u8 = 0x40;
const FLAG_HAS_CACHE_BITS: u8 = 0x20;
const FLAG_RESERVED: u8 = 0x18;
const SIZE_MASK: u8 = 0x07;

/// Widest cell index field
const MAX_SIZE_BYTES: usize = 4;

/// Widest offset field
const MAX_OFFSET_BYTES: usize = 8;

/// Largest possible cell record for a given index width
fn max_record_size(size_bytes: usize) -> u64 {
    (2 + 4 * (HASH_BYTES + DEPTH_BYTES) + 128 + MAX_CELL_REFS * size_bytes) as u64
}

/// Emission options for [`serialize_boc`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BocFlags {
    /// Emit the offset index table
    pub index: bool,
    /// Append a CRC32C checksum
    pub crc32c: bool,
    /// Mark cells referenced more than once in the index (requires `index`)
    pub cache_bits: bool,
}

impl BocFlags {
    /// No index, no checksum
    pub const fn compact() -> Self {
        Self {
            index: false,
            crc32c: false,
            cache_bits: false,
        }
    }

    /// Checksum only
    pub const fn with_crc() -> Self {
        Self {
            index: false,
            crc32c: true,
            cache_bits: false,
        }
    }

    /// Index with cache bits and checksum
    pub const fn full() -> Self {
        Self {
            index: true,
            crc32c: true,
            cache_bits: true,
        }
    }
}

impl Default for BocFlags {
    fn default() -> Self {
        Self::with_crc()
    }
}

/// Deduplicated cell table in emission order
struct CellTable {
    cells: Vec<Arc<Cell>>,
    /// Child positions of each cell, in table order
    children: Vec<Vec<usize>>,
    /// Number of references pointing at each cell
    parents: Vec<usize>,
    roots: Vec<usize>,
}

impl CellTable {
    /// Collects every distinct cell reachable from `roots` and orders them by
    /// longest distance from a root, breadth-first discovery breaking ties.
    fn build(roots: &[Arc<Cell>]) -> Self {
        let mut index: HashMap<[u8; HASH_BYTES], usize> = HashMap::new();
        let mut discovered: Vec<Arc<Cell>> = Vec::new();
        let mut children: Vec<Vec<usize>> = Vec::new();
        let mut queue = VecDeque::new();

        let mut root_ids = Vec::with_capacity(roots.len());
        for root in roots {
            let id = match index.entry(root.hash()) {
                Entry::Occupied(entry) => *entry.get(),
                Entry::Vacant(entry) => {
                    entry.insert(discovered.len());
                    queue.push_back(discovered.len());
                    discovered.push(root.clone());
                    children.push(Vec::new());
                    discovered.len() - 1
                }
            };
            root_ids.push(id);
        }

        while let Some(id) = queue.pop_front() {
            let cell = discovered[id].clone();
            let mut refs = Vec::with_capacity(cell.reference_count());

            for reference in cell.references() {
                let child = match index.entry(reference.hash()) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => {
                        entry.insert(discovered.len());
                        queue.push_back(discovered.len());
                        discovered.push(reference.clone());
                        children.push(Vec::new());
                        discovered.len() - 1
                    }
                };
                refs.push(child);
            }
            children[id] = refs;
        }

        let count = discovered.len();
        let mut parents = vec![0usize; count];
        for refs in &children {
            for &child in refs {
                parents[child] += 1;
            }
        }

        // longest path from any root, Kahn style
        let mut pending = parents.clone();
        let mut distance = vec![0usize; count];
        let mut ready: VecDeque<usize> = (0..count).filter(|&id| pending[id] == 0).collect();
        while let Some(id) = ready.pop_front() {
            for &child in &children[id] {
                distance[child] = distance[child].max(distance[id] + 1);
                pending[child] -= 1;
                if pending[child] == 0 {
                    ready.push_back(child);
                }
            }
        }

        let mut order: Vec<usize> = (0..count).collect();
        order.sort_by_key(|&id| distance[id]);

        let mut position = vec![0usize; count];
        for (pos, &id) in order.iter().enumerate() {
            position[id] = pos;
        }

        Self {
            cells: order.iter().map(|&id| discovered[id].clone()).collect(),
            children: order
                .iter()
                .map(|&id| children[id].iter().map(|&c| position[c]).collect())
                .collect(),
            parents: order.iter().map(|&id| parents[id]).collect(),
            roots: root_ids.iter().map(|&id| position[id]).collect(),
        }
    }
}

/// Serializes cells and their references into a Bag of Cells (BoC)
pub fn serialize_boc(roots: &[Arc<Cell>], flags: BocFlags) -> Result<Vec<u8>> {
    if roots.is_empty() {
        return Err(CellError::InvalidBoc("at least one root is required".to_string()));
    }
    if flags.cache_bits && !flags.index {
        return Err(CellError::InvalidBoc(
            "cache bits require the index table".to_string(),
        ));
    }

    let table = CellTable::build(roots);

    let size_bytes = bytes_needed(table.cells.len() as u64);
    if size_bytes > MAX_SIZE_BYTES {
        return Err(CellError::LimitExceeded(format!(
            "{} cells do not fit a BoC",
            table.cells.len()
        )));
    }

    // Serialize each cell
    let mut cells_data = Vec::new();
    let mut offsets = Vec::with_capacity(table.cells.len());
    for (cell, refs) in table.cells.iter().zip(&table.children) {
        cells_data.extend_from_slice(&cell.descriptors());
        cells_data.extend_from_slice(&cell.serialize_data());
        for &child in refs {
            write_uint(&mut cells_data, child as u64, size_bytes);
        }
        offsets.push(cells_data.len() as u64);
    }

    let cells_size = cells_data.len() as u64;
    let offset_bytes = if flags.cache_bits {
        bytes_needed(cells_size * 2)
    } else {
        bytes_needed(cells_size)
    };

    log::debug!(
        "serializing BoC: {} cells, {} roots, {} bytes of cell data",
        table.cells.len(),
        table.roots.len(),
        cells_size
    );

    let mut result = Vec::with_capacity(cells_data.len() + 32);
    result.extend_from_slice(&BOC_GENERIC_MAGIC.to_be_bytes());

    let mut flags_and_size = size_bytes as u8;
    if flags.index {
        flags_and_size |= FLAG_HAS_IDX;
    }
    if flags.crc32c {
        flags_and_size |= FLAG_HAS_CRC32C;
    }
    if flags.cache_bits {
        flags_and_size |= FLAG_HAS_CACHE_BITS;
    }
    result.push(flags_and_size);
    result.push(offset_bytes as u8);

    write_uint(&mut result, table.cells.len() as u64, size_bytes);
    write_uint(&mut result, table.roots.len() as u64, size_bytes);
    // no absent cells
    write_uint(&mut result, 0, size_bytes);
    write_uint(&mut result, cells_size, offset_bytes);

    for &root in &table.roots {
        write_uint(&mut result, root as u64, size_bytes);
    }

    if flags.index {
        for (&offset, &parents) in offsets.iter().zip(&table.parents) {
            let entry = if flags.cache_bits {
                offset * 2 + u64::from(parents > 1)
            } else {
                offset
            };
            write_uint(&mut result, entry, offset_bytes);
        }
    }

    result.extend_from_slice(&cells_data);

    if flags.crc32c {
        let crc = crate::crc::CRC32C.checksum(&result);
        result.extend_from_slice(&crc.to_le_bytes());
    }

    Ok(result)
}

/// Fixed part of a BoC header
#[derive(Debug)]
struct BocHeader {
    has_idx: bool,
    has_crc32c: bool,
    has_cache_bits: bool,
    /// Root list present (generic format only)
    has_roots: bool,
    size_bytes: usize,
    offset_bytes: usize,
    cells: usize,
    roots: usize,
    absent: usize,
    cells_size: usize,
    /// Length of the fixed part
    len: usize,
}

fn truncated(_: std::io::Error) -> CellError {
    CellError::InvalidBoc("unexpected end of data".to_string())
}

impl BocHeader {
    /// Reads and validates the header against the total input length.
    ///
    /// Nothing proportional to the declared counts is allocated here.
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);

        let magic = reader.read_u32::<BigEndian>().map_err(truncated)?;
        let flags = reader.read_u8().map_err(truncated)?;

        let (has_idx, has_crc32c, has_cache_bits, has_roots) = match magic {
            BOC_GENERIC_MAGIC => (
                flags & FLAG_HAS_IDX != 0,
                flags & FLAG_HAS_CRC32C != 0,
                flags & FLAG_HAS_CACHE_BITS != 0,
                true,
            ),
            BOC_INDEXED_MAGIC | BOC_INDEXED_CRC32C_MAGIC => {
                if flags & !SIZE_MASK != 0 {
                    return Err(CellError::InvalidBoc(format!(
                        "unexpected flags 0x{flags:02x} in indexed BoC"
                    )));
                }
                (true, magic == BOC_INDEXED_CRC32C_MAGIC, false, false)
            }
            _ => {
                return Err(CellError::InvalidBoc(format!(
                    "invalid magic number 0x{magic:08x}"
                )));
            }
        };

        if flags & FLAG_RESERVED != 0 {
            return Err(CellError::InvalidBoc(format!(
                "reserved flag bits set in 0x{flags:02x}"
            )));
        }
        if has_cache_bits && !has_idx {
            return Err(CellError::InvalidBoc(
                "cache bits without index table".to_string(),
            ));
        }

        let size_bytes = (flags & SIZE_MASK) as usize;
        if size_bytes == 0 || size_bytes > MAX_SIZE_BYTES {
            return Err(CellError::InvalidBoc(format!(
                "invalid size_bytes: {size_bytes}"
            )));
        }

        let offset_bytes = reader.read_u8().map_err(truncated)? as usize;
        if offset_bytes == 0 || offset_bytes > MAX_OFFSET_BYTES {
            return Err(CellError::InvalidBoc(format!(
                "invalid offset_bytes: {offset_bytes}"
            )));
        }

        let cells = reader.read_uint::<BigEndian>(size_bytes).map_err(truncated)?;
        let roots = reader.read_uint::<BigEndian>(size_bytes).map_err(truncated)?;
        let absent = reader.read_uint::<BigEndian>(size_bytes).map_err(truncated)?;
        let cells_size = reader
            .read_uint::<BigEndian>(offset_bytes)
            .map_err(truncated)?;
        let len = reader.position() as usize;

        log::trace!(
            "BoC header: magic 0x{magic:08x}, flags 0x{flags:02x}, {cells} cells, \
             {roots} roots, {absent} absent, {cells_size} bytes of cell data"
        );

        if cells == 0 {
            return Err(CellError::InvalidBoc("no cells".to_string()));
        }
        if roots == 0 || roots > cells {
            return Err(CellError::InvalidBoc(format!(
                "{roots} roots declared for {cells} cells"
            )));
        }
        if !has_roots && roots != 1 {
            return Err(CellError::InvalidBoc(format!(
                "indexed BoC must have exactly one root, got {roots}"
            )));
        }
        if roots + absent > cells {
            return Err(CellError::InvalidBoc(format!(
                "{roots} roots and {absent} absent cells declared for {cells} cells"
            )));
        }

        // every record takes at least two bytes
        let available = (data.len() - len) as u64;
        if cells.saturating_mul(2) > available {
            return Err(CellError::LimitExceeded(format!(
                "{cells} cells declared but only {available} bytes follow the header"
            )));
        }
        if cells_size < cells * 2 || cells_size > cells * max_record_size(size_bytes) {
            return Err(CellError::InvalidBoc(format!(
                "{cells_size} bytes of cell data cannot hold {cells} cells"
            )));
        }

        let expected = len as u64
            + if has_roots { roots * size_bytes as u64 } else { 0 }
            + if has_idx { cells * offset_bytes as u64 } else { 0 }
            + cells_size
            + if has_crc32c { 4 } else { 0 };
        if expected != data.len() as u64 {
            return Err(CellError::InvalidBoc(format!(
                "BoC declares {expected} bytes, got {}",
                data.len()
            )));
        }

        Ok(Self {
            has_idx,
            has_crc32c,
            has_cache_bits,
            has_roots,
            size_bytes,
            offset_bytes,
            cells: cells as usize,
            roots: roots as usize,
            absent: absent as usize,
            cells_size: cells_size as usize,
            len,
        })
    }
}

/// A cell record with references still as indices
struct RawCell {
    exotic: bool,
    level_mask: LevelMask,
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<usize>,
}

/// Deserializes a Bag of Cells (BoC) into its root cells
pub fn deserialize_boc(data: &[u8]) -> Result<Vec<Arc<Cell>>> {
    let header = BocHeader::parse(data)?;

    let mut body = data;
    if header.has_crc32c {
        let (payload, trailer) = data.split_at(data.len() - 4);
        let stored = LittleEndian::read_u32(trailer);
        let computed = crate::crc::CRC32C.checksum(payload);
        if stored != computed {
            return Err(CellError::ChecksumMismatch { stored, computed });
        }
        body = payload;
    }

    let mut reader = Cursor::new(body);
    reader.set_position(header.len as u64);

    let mut roots = Vec::with_capacity(header.roots);
    if header.has_roots {
        for _ in 0..header.roots {
            let root = read_index(&mut reader, header.size_bytes)?;
            if root >= header.cells {
                return Err(CellError::InvalidBoc(format!(
                    "root index {root} out of range"
                )));
            }
            roots.push(root);
        }
    } else {
        roots.push(0);
    }

    let mut index = Vec::new();
    if header.has_idx {
        index.reserve(header.cells);
        for _ in 0..header.cells {
            let entry = reader
                .read_uint::<BigEndian>(header.offset_bytes)
                .map_err(truncated)?;
            index.push(if header.has_cache_bits {
                entry >> 1
            } else {
                entry
            });
        }
    }

    let start = reader.position() as usize;
    let cells_data = &body[start..start + header.cells_size];
    let raw_cells = parse_cells(cells_data, &header, &index)?;

    log::debug!(
        "parsed BoC: {} cells, {} roots, {} absent",
        header.cells,
        header.roots,
        header.absent
    );

    // children always follow their parents, so build from the back
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; header.cells];
    for (i, raw) in raw_cells.into_iter().enumerate().rev() {
        let references = raw
            .refs
            .iter()
            .map(|&r| {
                built[r]
                    .clone()
                    .ok_or_else(|| CellError::InvalidBoc(format!("cell {r} is not built")))
            })
            .collect::<Result<Vec<_>>>()?;

        let cell = Cell::new(raw.exotic, raw.data, raw.bit_len, references)?;
        if cell.level_mask() != raw.level_mask {
            return Err(CellError::InvalidBoc(format!(
                "cell {i} declares level mask {} but has {}",
                raw.level_mask,
                cell.level_mask()
            )));
        }
        built[i] = Some(Arc::new(cell));
    }

    roots
        .into_iter()
        .map(|r| {
            built[r]
                .clone()
                .ok_or_else(|| CellError::InvalidBoc(format!("root {r} is not built")))
        })
        .collect()
}

fn read_index(reader: &mut Cursor<&[u8]>, size_bytes: usize) -> Result<usize> {
    Ok(reader
        .read_uint::<BigEndian>(size_bytes)
        .map_err(truncated)? as usize)
}

fn parse_cells(data: &[u8], header: &BocHeader, index: &[u64]) -> Result<Vec<RawCell>> {
    let mut cells = Vec::with_capacity(header.cells);
    let mut reader = Cursor::new(data);

    for i in 0..header.cells {
        let d1 = reader.read_u8().map_err(truncated)?;
        let d2 = reader.read_u8().map_err(truncated)?;

        let ref_count = (d1 & 0x07) as usize;
        let exotic = d1 & 0x08 != 0;
        let with_hashes = d1 & 0x10 != 0;
        let level_mask = LevelMask::new(d1 >> 5);

        if ref_count > MAX_CELL_REFS {
            return Err(CellError::InvalidBoc(format!(
                "cell {i} declares {ref_count} references"
            )));
        }

        if with_hashes {
            let skip = level_mask.hashes_count() as u64 * (HASH_BYTES + DEPTH_BYTES) as u64;
            let pos = reader.position() + skip;
            if pos > data.len() as u64 {
                return Err(CellError::InvalidBoc("unexpected end of data".to_string()));
            }
            reader.set_position(pos);
        }

        // d2 = floor(b/8) + ceil(b/8)
        let data_size = (d2 as usize).div_ceil(2);
        let pos = reader.position() as usize;
        if pos + data_size > data.len() {
            return Err(CellError::InvalidBoc(format!(
                "cell {i} data exceeds buffer"
            )));
        }
        let cell_data = data[pos..pos + data_size].to_vec();
        reader.set_position((pos + data_size) as u64);

        let bit_len = if d2 % 2 == 0 {
            data_size * 8
        } else {
            // odd d2: the last byte carries a completion tag
            let last = cell_data[data_size - 1];
            if last == 0 {
                return Err(CellError::InvalidBoc(format!(
                    "cell {i} is missing its completion tag"
                )));
            }
            (data_size - 1) * 8 + 7 - last.trailing_zeros() as usize
        };

        let mut refs = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let r = read_index(&mut reader, header.size_bytes)?;
            if r == i {
                return Err(CellError::CyclicReference(i));
            }
            if r < i {
                return Err(CellError::InvalidBoc(format!(
                    "cell {i} references earlier cell {r}"
                )));
            }
            if r >= header.cells {
                return Err(CellError::InvalidBoc(format!(
                    "cell {i} references out-of-range cell {r}"
                )));
            }
            refs.push(r);
        }

        if let Some(&end) = index.get(i) {
            if end != reader.position() {
                return Err(CellError::InvalidBoc(format!(
                    "index entry {i} points to {end}, cell ends at {}",
                    reader.position()
                )));
            }
        }

        cells.push(RawCell {
            exotic,
            level_mask,
            data: cell_data,
            bit_len,
            refs,
        });
    }

    if reader.position() as usize != data.len() {
        return Err(CellError::InvalidBoc(format!(
            "{} trailing bytes after the last cell",
            data.len() - reader.position() as usize
        )));
    }

    Ok(cells)
}

fn bytes_needed(value: u64) -> usize {
    if value == 0 {
        return 1;
    }

    let bits = (u64::BITS - value.leading_zeros()) as usize;
    bits.div_ceil(8)
}

fn write_uint(buf: &mut Vec<u8>, value: u64, size: usize) {
    let bytes = value.to_be_bytes();
    buf.extend_from_slice(&bytes[8 - size..]);
}

impl Cell {
    /// Parses a single-root BoC
    pub fn from_boc(data: &[u8]) -> Result<Arc<Cell>> {
        let mut roots = deserialize_boc(data)?;
        if roots.len() != 1 {
            return Err(CellError::InvalidBoc(format!(
                "expected a single root, got {}",
                roots.len()
            )));
        }
        Ok(roots.remove(0))
    }

    /// Serializes the cell as a single-root BoC with a CRC32C trailer
    pub fn to_boc(self: &Arc<Self>) -> Result<Vec<u8>> {
        self.to_boc_with_flags(BocFlags::default())
    }

    pub fn to_boc_with_flags(self: &Arc<Self>, flags: BocFlags) -> Result<Vec<u8>> {
        serialize_boc(std::slice::from_ref(self), flags)
    }

    /// Parses a single-root BoC from hex, ignoring whitespace
    pub fn from_boc_hex(hex: &str) -> Result<Arc<Cell>> {
        Self::from_boc(&decode_hex(hex)?)
    }

    pub fn from_boc_base64(b64: &str) -> Result<Arc<Cell>> {
        Self::from_boc(&decode_base64(b64)?)
    }

    pub fn to_boc_hex(self: &Arc<Self>) -> Result<String> {
        Ok(hex::encode(self.to_boc()?))
    }

    pub fn to_boc_base64(self: &Arc<Self>) -> Result<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.to_boc()?))
    }
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    let hex: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&hex).map_err(|e| CellError::InvalidBoc(format!("failed to decode hex: {e}")))
}

fn decode_base64(b64: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| CellError::InvalidBoc(format!("failed to decode base64: {e}")))
}

/// Converts a hex string to BoC roots
pub fn hex_to_boc(hex: &str) -> Result<Vec<Arc<Cell>>> {
    deserialize_boc(&decode_hex(hex)?)
}

/// Converts a base64 string to BoC roots
pub fn base64_to_boc(b64: &str) -> Result<Vec<Arc<Cell>>> {
    deserialize_boc(&decode_base64(b64)?)
}

/// Converts a BoC to a hex string
pub fn boc_to_hex(roots: &[Arc<Cell>], flags: BocFlags) -> Result<String> {
    Ok(hex::encode(serialize_boc(roots, flags)?))
}

/// Converts a BoC to base64
pub fn boc_to_base64(roots: &[Arc<Cell>], flags: BocFlags) -> Result<String> {
    Ok(base64::engine::general_purpose::STANDARD.encode(serialize_boc(roots, flags)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::builder::begin_cell;

    const SAME_INDEX_CRC: &str =
        "b5ee9c72410102010013000310000000000000003701010100080000022b0586fadf";
    const SAME_INDEX_COMPACT: &str =
        "b5ee9c72010102010013000310000000000000003701010100080000022b";

    // root -> [leaf, mid], mid -> [leaf]
    const SHARED_LEAF_COMPACT: &str = "b5ee9c7201010301000b000200020101020202000201";

    fn same_index_root() -> Arc<Cell> {
        let child = begin_cell().must_store_uint(555, 32).must_end_cell();
        let copy = begin_cell().must_store_uint(555, 32).must_end_cell();
        begin_cell()
            .must_store_uint(55, 64)
            .must_store_ref(child.clone())
            .must_store_ref(child)
            .must_store_ref(copy)
            .must_end_cell()
    }

    #[test]
    fn test_serialize_deserialize_simple() {
        let cell = begin_cell().must_store_uint(0x12345678, 32).must_end_cell();

        let boc = cell.to_boc().unwrap();
        let deserialized = Cell::from_boc(&boc).unwrap();

        assert_eq!(cell.hash(), deserialized.hash());
    }

    #[test]
    fn test_same_cells_share_index() {
        let root = same_index_root();

        assert_eq!(hex::encode(root.to_boc().unwrap()), SAME_INDEX_CRC);
        assert_eq!(
            boc_to_hex(&[root.clone()], BocFlags::compact()).unwrap(),
            SAME_INDEX_COMPACT
        );

        let parsed = Cell::from_boc_hex(SAME_INDEX_CRC).unwrap();
        assert_eq!(parsed.hash(), root.hash());
        assert_eq!(
            hex::encode(parsed.hash()),
            "f55b8dd600cb288d9439e579b7b037a9d25770dffa4d27ea59b89344171f2dfa"
        );
    }

    #[test]
    fn test_children_follow_parents() {
        let leaf = begin_cell().must_store_uint(1, 8).must_end_cell();
        let mid = begin_cell()
            .must_store_uint(2, 8)
            .must_store_ref(leaf.clone())
            .must_end_cell();
        // leaf is a direct child of the root and a grandchild through mid
        let root = begin_cell()
            .must_store_ref(leaf.clone())
            .must_store_ref(mid.clone())
            .must_end_cell();

        let table = CellTable::build(&[root]);
        assert_eq!(table.cells.len(), 3);
        assert_eq!(table.cells[1].hash(), mid.hash());
        assert_eq!(table.cells[2].hash(), leaf.hash());
        assert_eq!(table.children[0], vec![2, 1]);
        assert_eq!(table.parents[2], 2);
        for (i, refs) in table.children.iter().enumerate() {
            assert!(refs.iter().all(|&r| r > i));
        }
    }

    #[test]
    fn test_shared_leaf_fixture() {
        let leaf = begin_cell().must_store_uint(1, 8).must_end_cell();
        let mid = begin_cell()
            .must_store_uint(2, 8)
            .must_store_ref(leaf.clone())
            .must_end_cell();
        let root = begin_cell()
            .must_store_ref(leaf)
            .must_store_ref(mid)
            .must_end_cell();

        assert_eq!(
            boc_to_hex(&[root.clone()], BocFlags::compact()).unwrap(),
            SHARED_LEAF_COMPACT
        );

        let parsed = Cell::from_boc_hex(SHARED_LEAF_COMPACT).unwrap();
        assert_eq!(parsed.hash(), root.hash());
        assert_eq!(parsed.reference(1).unwrap().reference_count(), 1);
        assert_eq!(Cell::from_boc(&root.to_boc().unwrap()).unwrap().hash(), root.hash());
    }

    #[test]
    fn test_all_flag_combinations() {
        let root = same_index_root();
        let flags = [
            BocFlags::compact(),
            BocFlags::with_crc(),
            BocFlags::full(),
            BocFlags {
                index: true,
                crc32c: false,
                cache_bits: false,
            },
        ];

        for flags in flags {
            let boc = root.to_boc_with_flags(flags).unwrap();
            assert_eq!(Cell::from_boc(&boc).unwrap().hash(), root.hash());
        }

        assert!(
            root.to_boc_with_flags(BocFlags {
                index: false,
                crc32c: false,
                cache_bits: true,
            })
            .is_err()
        );
    }

    #[test]
    fn test_multiple_roots() {
        let a = begin_cell().must_store_uint(1, 8).must_end_cell();
        let b = begin_cell()
            .must_store_uint(2, 8)
            .must_store_ref(a.clone())
            .must_end_cell();

        let boc = serialize_boc(&[a.clone(), b.clone()], BocFlags::full()).unwrap();
        let roots = deserialize_boc(&boc).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].hash(), a.hash());
        assert_eq!(roots[1].hash(), b.hash());

        assert!(Cell::from_boc(&boc).is_err());
        assert!(serialize_boc(&[], BocFlags::default()).is_err());
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut boc = hex::decode(SAME_INDEX_CRC).unwrap();
        boc[20] ^= 0x01;
        assert!(matches!(
            Cell::from_boc(&boc).unwrap_err(),
            CellError::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn test_length_must_match() {
        let boc = hex::decode(SAME_INDEX_COMPACT).unwrap();
        assert!(Cell::from_boc(&boc[..boc.len() - 1]).is_err());

        let mut longer = boc.clone();
        longer.push(0);
        assert!(Cell::from_boc(&longer).is_err());
        assert!(Cell::from_boc(&[]).is_err());
    }

    #[test]
    fn test_bad_magic_and_flags() {
        let mut boc = hex::decode(SAME_INDEX_COMPACT).unwrap();
        boc[0] = 0;
        assert!(Cell::from_boc(&boc).is_err());

        let mut boc = hex::decode(SAME_INDEX_COMPACT).unwrap();
        boc[4] |= 0x08;
        assert!(Cell::from_boc(&boc).is_err());

        let mut boc = hex::decode(SAME_INDEX_COMPACT).unwrap();
        boc[4] = 0x21;
        assert!(Cell::from_boc(&boc).is_err());
    }

    #[test]
    fn test_backward_reference() {
        // cell 1 points back at cell 0
        let boc = hex::decode("b5ee9c72010102010005010000010000").unwrap();
        let err = Cell::from_boc(&boc).unwrap_err();
        assert!(matches!(err, CellError::InvalidBoc(_)));
    }

    #[test]
    fn test_self_reference() {
        let boc = hex::decode("b5ee9c7201010101000300010000").unwrap();
        assert_eq!(
            Cell::from_boc(&boc).unwrap_err(),
            CellError::CyclicReference(0)
        );
    }

    #[test]
    fn test_hex_and_base64() {
        let cell = begin_cell().must_store_uint(0xFF, 8).must_end_cell();

        let hex = cell.to_boc_hex().unwrap();
        assert_eq!(Cell::from_boc_hex(&hex).unwrap().hash(), cell.hash());

        let b64 = cell.to_boc_base64().unwrap();
        assert_eq!(Cell::from_boc_base64(&b64).unwrap().hash(), cell.hash());
        assert_eq!(base64_to_boc(&b64).unwrap()[0].hash(), cell.hash());
    }
}
