//! Merkle proofs over cell trees
//!
//! A proof keeps part of a tree and replaces every other subtree with a
//! pruned branch carrying that subtree's hashes and depths. The level-0 hash
//! of the proof body equals the hash of the full tree, so a verifier holding
//! only the root hash can check the parts it was given.

use crate::tvm::cell::{Cell, CellKind, DEPTH_BYTES, HASH_BYTES};
use crate::tvm::error::{CellError, Result};
use crate::tvm::level_mask::{LevelMask, MAX_CELL_LEVEL};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

impl Cell {
    /// Builds a pruned branch standing in for this cell inside a proof
    /// nested `merkle_depth` merkle cells deep.
    pub fn to_pruned_branch(&self, merkle_depth: u8) -> Result<Arc<Cell>> {
        if merkle_depth >= MAX_CELL_LEVEL {
            return Err(CellError::InvalidProof(format!(
                "merkle depth {merkle_depth} leaves no level for the pruned branch"
            )));
        }

        let mask = self
            .level_mask()
            .union(LevelMask::with_level(merkle_depth + 1));

        let levels: Vec<u8> = (0..mask.level())
            .filter(|&level| mask.is_significant(level))
            .collect();

        let mut data = Vec::with_capacity(2 + levels.len() * (HASH_BYTES + DEPTH_BYTES));
        data.push(CellKind::PrunedBranch.tag().unwrap_or(1));
        data.push(mask.to_u8());
        for &level in &levels {
            data.extend_from_slice(&self.hash_at(level));
        }
        for &level in &levels {
            data.extend_from_slice(&self.depth_at(level).to_be_bytes());
        }

        let bit_len = data.len() * 8;
        Ok(Arc::new(Cell::new(true, data, bit_len, Vec::new())?))
    }
}

/// Builds a merkle proof of `root` revealing every cell whose representation
/// hash is in `keep`. The root itself is always revealed.
pub fn create_merkle_proof(root: &Arc<Cell>, keep: &HashSet<[u8; HASH_BYTES]>) -> Result<Arc<Cell>> {
    let mut rebuilt = HashMap::new();
    let body = rebuild(root, keep, 0, &mut rebuilt)?;

    let mut data = Vec::with_capacity(1 + HASH_BYTES + DEPTH_BYTES);
    data.push(CellKind::MerkleProof.tag().unwrap_or(3));
    data.extend_from_slice(&body.hash_at(0));
    data.extend_from_slice(&body.depth_at(0).to_be_bytes());

    log::debug!(
        "merkle proof for {} revealing {} cells",
        hex::encode(root.hash()),
        rebuilt.len()
    );

    let bit_len = data.len() * 8;
    Ok(Arc::new(Cell::new(true, data, bit_len, vec![body])?))
}

fn rebuild(
    cell: &Arc<Cell>,
    keep: &HashSet<[u8; HASH_BYTES]>,
    merkle_depth: u8,
    rebuilt: &mut HashMap<([u8; HASH_BYTES], u8), Arc<Cell>>,
) -> Result<Arc<Cell>> {
    let key = (cell.hash(), merkle_depth);
    if let Some(done) = rebuilt.get(&key) {
        return Ok(done.clone());
    }

    let child_depth = merkle_depth + u8::from(cell.kind().is_merkle());
    let references = cell
        .references()
        .iter()
        .map(|child| {
            if keep.contains(&child.hash()) {
                rebuild(child, keep, child_depth, rebuilt)
            } else {
                child.to_pruned_branch(child_depth)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let copy = Arc::new(Cell::new(
        cell.is_exotic(),
        cell.data().to_vec(),
        cell.bit_len(),
        references,
    )?);
    rebuilt.insert(key, copy.clone());
    Ok(copy)
}

/// Verifies a merkle proof against a trusted root hash and returns its body
pub fn check_merkle_proof(proof: &Cell, expected_hash: &[u8; HASH_BYTES]) -> Result<Arc<Cell>> {
    if proof.kind() != CellKind::MerkleProof {
        return Err(CellError::InvalidProof(format!(
            "expected a merkle proof cell, got {:?}",
            proof.kind()
        )));
    }

    let body = proof
        .reference(0)
        .ok_or_else(|| CellError::InvalidProof("proof has no body".to_string()))?;

    let data = proof.data();
    let stored_hash = &data[1..1 + HASH_BYTES];
    let stored_depth = u16::from_be_bytes([data[1 + HASH_BYTES], data[2 + HASH_BYTES]]);

    if stored_hash != body.hash_at(0) || stored_depth != body.depth_at(0) {
        return Err(CellError::InvalidProof(
            "stored hash does not match the body".to_string(),
        ));
    }
    if stored_hash != expected_hash {
        return Err(CellError::InvalidProof(format!(
            "proof is for {}, expected {}",
            hex::encode(stored_hash),
            hex::encode(expected_hash)
        )));
    }

    Ok(body.clone())
}
