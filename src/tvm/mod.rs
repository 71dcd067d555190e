//! TVM (TON Virtual Machine) data structures and utilities
//!
//! This module provides implementations of fundamental TON blockchain data structures:
//! - Cell: The basic data structure that can store up to 1023 bits and up to 4 references
//! - Builder: Writer that seals typed values into cells
//! - Slice: A reader for sequentially accessing cell data
//! - BoC: Bag of Cells serialization format for encoding cells into byte arrays
//! - Address: TON address handling (none, external, standard and var addresses)
//! - Dump and JSON interchange for inspecting cell trees
//! - Merkle proofs built from pruned branches

pub mod address;
pub mod boc;
pub mod builder;
pub mod cell;
pub mod dump;
pub mod error;
pub mod json;
pub mod level_mask;
pub mod proof;
pub mod slice;

pub use address::{Address, AddressType, Anycast, ExternalAddress, StdAddress, VarAddress};
pub use boc::{
    BocFlags, base64_to_boc, boc_to_base64, boc_to_hex, deserialize_boc, hex_to_boc,
    serialize_boc,
};
pub use builder::{Builder, begin_cell};
pub use cell::{Cell, CellKind, MAX_CELL_BITS, MAX_CELL_DEPTH, MAX_CELL_REFS};
pub use dump::{DEFAULT_DUMP_LIMIT, to_fift_hex};
pub use error::{CellError, ErrorKind, Result};
pub use json::{CellRepr, DEFAULT_INTERCHANGE_NODE_LIMIT, boc_base64};
pub use level_mask::{LevelMask, MAX_CELL_LEVEL};
pub use proof::{check_merkle_proof, create_merkle_proof};
pub use slice::Slice;
