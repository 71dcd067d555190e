//! TON cell trees: building, parsing, hashing and the Bag of Cells format

pub mod cli;
pub mod crc;
pub mod tvm;
pub mod utils;
