//! Cell implementation for TON blockchain
//!
//! A cell is a fundamental data structure in TON that can store up to 1023 bits
//! of data and maintain up to 4 references to other cells.
//!
//! Cells are immutable once sealed and shared through [`Arc`]. Depths are
//! computed when a cell is constructed, hashes are computed on first request
//! and memoized for the lifetime of the cell.

use crate::tvm::error::{CellError, Result};
use crate::tvm::level_mask::{LevelMask, MAX_CELL_LEVEL};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Maximum number of bits a cell can store
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of references a cell can have
pub const MAX_CELL_REFS: usize = 4;

/// Maximum depth of a cell graph
pub const MAX_CELL_DEPTH: u16 = 1023;

/// Size of a cell hash in bytes
pub const HASH_BYTES: usize = 32;

/// Size of a serialized cell depth in bytes
pub const DEPTH_BYTES: usize = 2;

const LEVELS: usize = MAX_CELL_LEVEL as usize + 1;

/// Kind of a cell
///
/// Exotic kinds are identified by the first byte of the cell data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Ordinary,
    PrunedBranch,
    Library,
    MerkleProof,
    MerkleUpdate,
}

impl CellKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::PrunedBranch),
            2 => Some(Self::Library),
            3 => Some(Self::MerkleProof),
            4 => Some(Self::MerkleUpdate),
            _ => None,
        }
    }

    /// Type byte stored at the start of exotic cell data
    pub fn tag(self) -> Option<u8> {
        match self {
            Self::Ordinary => None,
            Self::PrunedBranch => Some(1),
            Self::Library => Some(2),
            Self::MerkleProof => Some(3),
            Self::MerkleUpdate => Some(4),
        }
    }

    pub fn is_exotic(self) -> bool {
        self != Self::Ordinary
    }

    pub fn is_merkle(self) -> bool {
        matches!(self, Self::MerkleProof | Self::MerkleUpdate)
    }
}

/// Represents a cell in the TON blockchain
pub struct Cell {
    /// Cell data, `ceil(bit_len / 8)` bytes with unused trailing bits cleared
    data: Vec<u8>,
    /// Number of bits in the cell (not necessarily a multiple of 8)
    bit_len: usize,
    /// References to other cells
    references: Vec<Arc<Cell>>,
    kind: CellKind,
    level_mask: LevelMask,
    /// Depth per computed hash index
    depths: [u16; LEVELS],
    /// Hash per computed hash index, filled on first request
    hashes: OnceLock<[[u8; HASH_BYTES]; LEVELS]>,
}

impl Cell {
    /// Validates the parts of a cell and seals them.
    ///
    /// Every constructor in the crate (builder, BoC parser, interchange decoder,
    /// proof helpers) goes through here.
    pub(crate) fn new(
        exotic: bool,
        mut data: Vec<u8>,
        bit_len: usize,
        references: Vec<Arc<Cell>>,
    ) -> Result<Self> {
        if bit_len > MAX_CELL_BITS {
            return Err(CellError::BitsOverflow {
                requested: bit_len,
                available: MAX_CELL_BITS,
            });
        }
        if references.len() > MAX_CELL_REFS {
            return Err(CellError::RefsOverflow { max: MAX_CELL_REFS });
        }

        let required_bytes = bit_len.div_ceil(8);
        if data.len() < required_bytes {
            return Err(CellError::BitsUnderflow {
                requested: bit_len,
                available: data.len() * 8,
            });
        }
        data.truncate(required_bytes);
        if bit_len % 8 != 0 {
            data[bit_len / 8] &= 0xFF << (8 - bit_len % 8);
        }

        let kind = if exotic {
            let tag = match data.first() {
                Some(tag) if bit_len >= 8 => *tag,
                _ => {
                    return Err(CellError::InvalidExotic(
                        "exotic cell must start with a type byte".to_string(),
                    ));
                }
            };
            CellKind::from_tag(tag).ok_or_else(|| {
                CellError::InvalidExotic(format!("unknown exotic cell type {tag}"))
            })?
        } else {
            CellKind::Ordinary
        };

        let level_mask = match kind {
            CellKind::Ordinary => references
                .iter()
                .fold(LevelMask::EMPTY, |mask, r| mask.union(r.level_mask)),
            CellKind::PrunedBranch => {
                let mask = data.get(1).copied().unwrap_or(0);
                if mask == 0 || mask > 0b111 {
                    return Err(CellError::InvalidExotic(format!(
                        "pruned branch level mask {mask} is out of range"
                    )));
                }
                LevelMask::new(mask)
            }
            CellKind::Library => LevelMask::EMPTY,
            CellKind::MerkleProof | CellKind::MerkleUpdate => references
                .iter()
                .fold(LevelMask::EMPTY, |mask, r| mask.union(r.level_mask))
                .shift_right(),
        };

        let (expected_bits, expected_refs) = match kind {
            CellKind::Ordinary => (bit_len, references.len()),
            CellKind::PrunedBranch => (
                16 + level_mask.hash_index() as usize * (HASH_BYTES + DEPTH_BYTES) * 8,
                0,
            ),
            CellKind::Library => (8 + HASH_BYTES * 8, 0),
            CellKind::MerkleProof => (8 + (HASH_BYTES + DEPTH_BYTES) * 8, 1),
            CellKind::MerkleUpdate => (8 + 2 * (HASH_BYTES + DEPTH_BYTES) * 8, 2),
        };
        if bit_len != expected_bits || references.len() != expected_refs {
            return Err(CellError::InvalidExotic(format!(
                "{kind:?} cell must have {expected_bits} bits and {expected_refs} references, \
                 got {bit_len} bits and {} references",
                references.len()
            )));
        }
        if kind.is_merkle() {
            check_merkle_children(kind, &data, &references)?;
        }

        let mut cell = Self {
            data,
            bit_len,
            references,
            kind,
            level_mask,
            depths: [0; LEVELS],
            hashes: OnceLock::new(),
        };
        cell.depths = cell.compute_depths()?;
        Ok(cell)
    }

    /// Creates a new empty cell
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            bit_len: 0,
            references: Vec::new(),
            kind: CellKind::Ordinary,
            level_mask: LevelMask::EMPTY,
            depths: [0; LEVELS],
            hashes: OnceLock::new(),
        }
    }

    /// Returns the cell's data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of bits in the cell
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Returns the cell's references
    pub fn references(&self) -> &[Arc<Cell>] {
        &self.references
    }

    /// Returns the number of references
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Gets a reference by index
    pub fn reference(&self, index: usize) -> Option<&Arc<Cell>> {
        self.references.get(index)
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    /// Returns whether this is an exotic cell
    pub fn is_exotic(&self) -> bool {
        self.kind.is_exotic()
    }

    pub fn level_mask(&self) -> LevelMask {
        self.level_mask
    }

    /// Returns the cell's level
    pub fn level(&self) -> u8 {
        self.level_mask.level()
    }

    /// Computes the cell's descriptors (2 bytes)
    pub fn descriptors(&self) -> [u8; 2] {
        self.descriptors_with_mask(self.level_mask)
    }

    /// Descriptors as seen by the hash of a given level
    ///
    /// First byte: `r + 8*s + 32*l` (references, exotic flag, level mask).
    /// Second byte: `floor(b/8) + ceil(b/8)` where `b` is the bit length.
    pub(crate) fn descriptors_with_mask(&self, mask: LevelMask) -> [u8; 2] {
        let refs_descriptor = self.references.len() as u8
            + if self.is_exotic() { 8 } else { 0 }
            + mask.to_u8() * 32;
        let bits_descriptor = (self.bit_len / 8 + self.bit_len.div_ceil(8)) as u8;

        [refs_descriptor, bits_descriptor]
    }

    /// Serializes the cell data with the completion tag if needed
    pub fn serialize_data(&self) -> Vec<u8> {
        let mut result = self.data.clone();

        if self.bit_len % 8 != 0 {
            result[self.bit_len / 8] |= 1 << (7 - self.bit_len % 8);
        }

        result
    }

    /// Representation hash, the hash at the highest level
    pub fn hash(&self) -> [u8; HASH_BYTES] {
        self.hash_at(MAX_CELL_LEVEL)
    }

    /// Depth matching [`Cell::hash`]
    pub fn depth(&self) -> u16 {
        self.depth_at(MAX_CELL_LEVEL)
    }

    /// Hash of the cell as seen at `level`
    ///
    /// Pruned branches answer the levels below their own from the hashes
    /// stored in their data.
    pub fn hash_at(&self, level: u8) -> [u8; HASH_BYTES] {
        let index = self.level_mask.apply(level).hash_index() as usize;

        if self.kind == CellKind::PrunedBranch {
            if index != self.level_mask.hash_index() as usize {
                return self.pruned_hash(index);
            }
            return self.hashes()[0];
        }

        self.hashes()[index]
    }

    /// Depth of the cell as seen at `level`
    pub fn depth_at(&self, level: u8) -> u16 {
        let index = self.level_mask.apply(level).hash_index() as usize;

        if self.kind == CellKind::PrunedBranch {
            if index != self.level_mask.hash_index() as usize {
                return self.pruned_depth(index);
            }
            return self.depths[0];
        }

        self.depths[index]
    }

    fn pruned_hash(&self, index: usize) -> [u8; HASH_BYTES] {
        let offset = 2 + index * HASH_BYTES;
        let mut hash = [0u8; HASH_BYTES];
        hash.copy_from_slice(&self.data[offset..offset + HASH_BYTES]);
        hash
    }

    fn pruned_depth(&self, index: usize) -> u16 {
        let offset = 2 + self.level_mask.hash_index() as usize * HASH_BYTES + index * DEPTH_BYTES;
        u16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }

    fn compute_depths(&self) -> Result<[u16; LEVELS]> {
        let mut depths = [0u16; LEVELS];

        if self.kind == CellKind::PrunedBranch {
            for index in 0..self.level_mask.hash_index() as usize {
                let depth = self.pruned_depth(index);
                if depth > MAX_CELL_DEPTH {
                    return Err(CellError::DepthLimit {
                        depth: depth.into(),
                        max: MAX_CELL_DEPTH,
                    });
                }
            }
            return Ok(depths);
        }

        let child_shift = u8::from(self.kind.is_merkle());
        let mut index = 0;
        for level in 0..=self.level_mask.level() {
            if !self.level_mask.is_significant(level) {
                continue;
            }

            let depth = self
                .references
                .iter()
                .map(|r| u32::from(r.depth_at(level + child_shift)) + 1)
                .max()
                .unwrap_or(0);
            if depth > u32::from(MAX_CELL_DEPTH) {
                return Err(CellError::DepthLimit {
                    depth,
                    max: MAX_CELL_DEPTH,
                });
            }

            depths[index] = depth as u16;
            index += 1;
        }

        Ok(depths)
    }

    /// Returns the memoized hashes, computing them for the whole subgraph
    /// that still lacks them.
    ///
    /// The walk is an explicit post-order over the DAG, so untrusted depth
    /// never turns into call-stack depth.
    fn hashes(&self) -> &[[u8; HASH_BYTES]; LEVELS] {
        if let Some(hashes) = self.hashes.get() {
            return hashes;
        }

        let mut stack: Vec<(&Cell, bool)> = vec![(self, false)];
        while let Some((cell, children_ready)) = stack.pop() {
            if cell.hashes.get().is_some() {
                continue;
            }

            if children_ready {
                cell.hashes.get_or_init(|| cell.compute_hashes());
            } else {
                stack.push((cell, true));
                stack.extend(
                    cell.references
                        .iter()
                        .filter(|r| r.hashes.get().is_none())
                        .map(|r| (r.as_ref(), false)),
                );
            }
        }

        self.hashes.get_or_init(|| self.compute_hashes())
    }

    /// Hashes every significant level. Children must already be hashed.
    fn compute_hashes(&self) -> [[u8; HASH_BYTES]; LEVELS] {
        let mut hashes = [[0u8; HASH_BYTES]; LEVELS];
        let top_level = self.level_mask.level();
        let child_shift = u8::from(self.kind.is_merkle());

        let mut index = 0;
        for level in 0..=top_level {
            if !self.level_mask.is_significant(level) {
                continue;
            }
            // lower levels of a pruned branch live in its data
            if self.kind == CellKind::PrunedBranch && level != top_level {
                continue;
            }

            let mut hasher = Sha256::new();
            hasher.update(self.descriptors_with_mask(self.level_mask.apply(level)));
            if index == 0 {
                hasher.update(self.serialize_data());
            } else {
                hasher.update(hashes[index - 1]);
            }
            for reference in &self.references {
                hasher.update(reference.depth_at(level + child_shift).to_be_bytes());
            }
            for reference in &self.references {
                hasher.update(reference.hash_at(level + child_shift));
            }

            hashes[index].copy_from_slice(&hasher.finalize());
            index += 1;
        }

        hashes
    }
}

/// Merkle cells store the level 0 hashes of their children followed by the
/// matching depths; both have to agree with the children they carry.
fn check_merkle_children(kind: CellKind, data: &[u8], references: &[Arc<Cell>]) -> Result<()> {
    let count = references.len();
    let depths_offset = 1 + count * HASH_BYTES;

    for (i, child) in references.iter().enumerate() {
        let hash_offset = 1 + i * HASH_BYTES;
        if data[hash_offset..hash_offset + HASH_BYTES] != child.hash_at(0) {
            return Err(CellError::InvalidExotic(format!(
                "{kind:?} stores a hash that does not match child {i}"
            )));
        }

        let depth_offset = depths_offset + i * DEPTH_BYTES;
        let stored = u16::from_be_bytes([data[depth_offset], data[depth_offset + 1]]);
        if stored != child.depth_at(0) {
            return Err(CellError::InvalidExotic(format!(
                "{kind:?} stores depth {stored} for child {i}, which has depth {}",
                child.depth_at(0)
            )));
        }
    }
    Ok(())
}

impl Default for Cell {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write(&Cell::hash(self));
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("kind", &self.kind)
            .field("bit_len", &self.bit_len)
            .field("data", &hex::encode(&self.data))
            .field("references", &self.references.len())
            .field("level_mask", &self.level_mask)
            .field("hash", &hex::encode(self.hash()))
            .finish()
    }
}
