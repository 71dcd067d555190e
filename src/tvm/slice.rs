//! Slice implementation for reading data from cells
//!
//! A Slice provides a way to read data from a Cell sequentially,
//! tracking the current position in both bits and references.
//!
//! Reads only move forward and never touch the underlying cell. A failed
//! read leaves the cursor where it was.

use crate::tvm::address::Address;
use crate::tvm::builder::{MAX_INT_BITS, MAX_UINT_BITS};
use crate::tvm::cell::Cell;
use crate::tvm::error::{CellError, Result, must};
use num_bigint::{BigInt, BigUint};
use std::sync::Arc;

/// A slice for reading data from a cell
#[derive(Debug, Clone)]
pub struct Slice {
    /// The cell being read
    cell: Arc<Cell>,
    /// Current bit position in the cell
    bit_pos: usize,
    /// Current reference position
    ref_pos: usize,
}

impl Cell {
    /// Opens a slice at the start of the cell
    pub fn begin_parse(self: &Arc<Self>) -> Slice {
        Slice::new(self.clone())
    }
}

impl Slice {
    /// Creates a new slice from a cell
    pub fn new(cell: Arc<Cell>) -> Self {
        Self {
            cell,
            bit_pos: 0,
            ref_pos: 0,
        }
    }

    /// Returns the number of remaining bits
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bit_pos
    }

    /// Returns the number of remaining references
    pub fn remaining_refs(&self) -> usize {
        self.cell.reference_count() - self.ref_pos
    }

    /// Checks if there are any remaining bits or references
    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0 && self.remaining_refs() == 0
    }

    /// Gets the underlying cell
    pub fn cell(&self) -> &Arc<Cell> {
        &self.cell
    }

    fn ensure_bits(&self, n: usize) -> Result<()> {
        if n > self.remaining_bits() {
            return Err(CellError::BitsUnderflow {
                requested: n,
                available: self.remaining_bits(),
            });
        }
        Ok(())
    }

    fn ensure_refs(&self, n: usize) -> Result<()> {
        if n > self.remaining_refs() {
            return Err(CellError::RefsUnderflow);
        }
        Ok(())
    }

    /// Copies `n` bits starting at the cursor, left-aligned
    fn peek_bits(&self, n: usize) -> Result<Vec<u8>> {
        self.ensure_bits(n)?;

        let data = self.cell.data();
        let mut result = vec![0u8; n.div_ceil(8)];

        if self.bit_pos % 8 == 0 {
            let start = self.bit_pos / 8;
            result.copy_from_slice(&data[start..start + n.div_ceil(8)]);
            if n % 8 != 0 {
                if let Some(last) = result.last_mut() {
                    *last &= 0xFF << (8 - n % 8);
                }
            }
            return Ok(result);
        }

        for i in 0..n {
            let pos = self.bit_pos + i;
            if (data[pos / 8] >> (7 - pos % 8)) & 1 == 1 {
                result[i / 8] |= 1 << (7 - i % 8);
            }
        }

        Ok(result)
    }

    fn peek_uint(&self, bits: usize) -> Result<u64> {
        if bits > 64 {
            return Err(CellError::InvalidWidth { bits, max: 64 });
        }
        if bits == 0 {
            return Ok(0);
        }

        let bytes = self.peek_bits(bits)?;
        let mut buffer = [0u8; 8];
        buffer[..bytes.len()].copy_from_slice(&bytes);
        Ok(u64::from_be_bytes(buffer) >> (64 - bits))
    }

    /// Loads a single bit
    pub fn load_bit(&mut self) -> Result<bool> {
        Ok(self.load_uint(1)? == 1)
    }

    /// Loads a boolean stored as a single bit
    pub fn load_bool(&mut self) -> Result<bool> {
        self.load_bit()
    }

    /// Loads multiple bits into a byte vector
    pub fn load_bits(&mut self, n: usize) -> Result<Vec<u8>> {
        let bits = self.peek_bits(n)?;
        self.bit_pos += n;
        Ok(bits)
    }

    /// Loads a uint with a specific number of bits
    pub fn load_uint(&mut self, bits: usize) -> Result<u64> {
        let value = self.peek_uint(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Reads a uint without advancing the cursor
    pub fn preload_uint(&self, bits: usize) -> Result<u64> {
        self.peek_uint(bits)
    }

    /// Loads a signed integer with a specific number of bits
    pub fn load_int(&mut self, bits: usize) -> Result<i64> {
        if bits > 64 {
            return Err(CellError::InvalidWidth { bits, max: 64 });
        }
        if bits == 0 {
            return Ok(0);
        }

        let unsigned = self.load_uint(bits)?;

        // sign-extend
        let shift = 64 - bits;
        Ok(((unsigned << shift) as i64) >> shift)
    }

    /// Loads an unsigned integer of up to 256 bits
    pub fn load_big_uint(&mut self, bits: usize) -> Result<BigUint> {
        if bits > MAX_UINT_BITS {
            return Err(CellError::InvalidWidth {
                bits,
                max: MAX_UINT_BITS,
            });
        }
        self.load_biguint_bits(bits)
    }

    /// Loads a signed integer of up to 257 bits
    pub fn load_big_int(&mut self, bits: usize) -> Result<BigInt> {
        if bits > MAX_INT_BITS {
            return Err(CellError::InvalidWidth {
                bits,
                max: MAX_INT_BITS,
            });
        }
        if bits == 0 {
            return Ok(BigInt::default());
        }

        let negative = self.preload_uint(1)? == 1;
        let unsigned = BigInt::from(self.load_biguint_bits(bits)?);
        if negative {
            Ok(unsigned - (BigInt::from(1u8) << bits))
        } else {
            Ok(unsigned)
        }
    }

    fn load_biguint_bits(&mut self, bits: usize) -> Result<BigUint> {
        let bytes = self.load_bits(bits)?;
        let value = BigUint::from_bytes_be(&bytes);
        Ok(value >> (bytes.len() * 8 - bits))
    }

    /// Loads a byte (8 bits)
    pub fn load_byte(&mut self) -> Result<u8> {
        Ok(self.load_uint(8)? as u8)
    }

    /// Loads multiple bytes
    pub fn load_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.load_bits(n * 8)
    }

    pub fn load_u8(&mut self) -> Result<u8> {
        self.load_byte()
    }

    /// Loads a u16 value (16 bits, big-endian)
    pub fn load_u16(&mut self) -> Result<u16> {
        Ok(self.load_uint(16)? as u16)
    }

    /// Loads a u32 value (32 bits, big-endian)
    pub fn load_u32(&mut self) -> Result<u32> {
        Ok(self.load_uint(32)? as u32)
    }

    /// Loads a u64 value (64 bits, big-endian)
    pub fn load_u64(&mut self) -> Result<u64> {
        self.load_uint(64)
    }

    /// Loads coins (VarUInteger 16)
    /// Length is encoded in 4 bits, then that many bytes of value
    pub fn load_coins(&mut self) -> Result<u128> {
        let len = self.preload_uint(4)? as usize;
        self.ensure_bits(4 + len * 8)?;
        self.skip_bits(4)?;

        let bytes = self.load_bytes(len)?;
        Ok(bytes
            .iter()
            .fold(0u128, |acc, &byte| (acc << 8) | u128::from(byte)))
    }

    /// Loads a reference to another cell
    pub fn load_ref(&mut self) -> Result<Arc<Cell>> {
        let reference = self.preload_ref()?;
        self.ref_pos += 1;
        Ok(reference)
    }

    /// Loads the next reference and opens a slice on it
    pub fn load_ref_slice(&mut self) -> Result<Slice> {
        Ok(Slice::new(self.load_ref()?))
    }

    /// Returns the next reference without advancing
    pub fn preload_ref(&self) -> Result<Arc<Cell>> {
        self.ensure_refs(1)?;
        self.cell
            .reference(self.ref_pos)
            .cloned()
            .ok_or(CellError::RefsUnderflow)
    }

    /// Loads an optional reference (Maybe ^Cell)
    pub fn load_maybe_ref(&mut self) -> Result<Option<Arc<Cell>>> {
        if self.preload_uint(1)? == 0 {
            self.skip_bits(1)?;
            return Ok(None);
        }

        self.ensure_refs(1)?;
        self.skip_bits(1)?;
        self.load_ref().map(Some)
    }

    /// Loads an address in its wire layout
    pub fn load_address(&mut self) -> Result<Address> {
        let mut cursor = self.clone();
        let address = Address::load_from(&mut cursor)?;
        *self = cursor;
        Ok(address)
    }

    /// Skips a number of bits
    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        self.ensure_bits(n)?;
        self.bit_pos += n;
        Ok(())
    }

    /// Skips a number of references
    pub fn skip_refs(&mut self, n: usize) -> Result<()> {
        self.ensure_refs(n)?;
        self.ref_pos += n;
        Ok(())
    }

    /// Loads all remaining bits, returning their count and packed bytes
    pub fn load_remaining_bits(&mut self) -> Result<(usize, Vec<u8>)> {
        let remaining = self.remaining_bits();
        Ok((remaining, self.load_bits(remaining)?))
    }

    /// Loads all remaining references
    pub fn load_remaining_refs(&mut self) -> Result<Vec<Arc<Cell>>> {
        let mut refs = Vec::with_capacity(self.remaining_refs());
        while self.remaining_refs() > 0 {
            refs.push(self.load_ref()?);
        }
        Ok(refs)
    }

    pub fn must_load_bit(&mut self) -> bool {
        must(self.load_bit())
    }

    pub fn must_load_bits(&mut self, n: usize) -> Vec<u8> {
        must(self.load_bits(n))
    }

    pub fn must_load_uint(&mut self, bits: usize) -> u64 {
        must(self.load_uint(bits))
    }

    pub fn must_load_int(&mut self, bits: usize) -> i64 {
        must(self.load_int(bits))
    }

    pub fn must_load_big_uint(&mut self, bits: usize) -> BigUint {
        must(self.load_big_uint(bits))
    }

    pub fn must_load_big_int(&mut self, bits: usize) -> BigInt {
        must(self.load_big_int(bits))
    }

    pub fn must_load_bytes(&mut self, n: usize) -> Vec<u8> {
        must(self.load_bytes(n))
    }

    pub fn must_load_coins(&mut self) -> u128 {
        must(self.load_coins())
    }

    pub fn must_load_ref(&mut self) -> Arc<Cell> {
        must(self.load_ref())
    }

    pub fn must_load_ref_slice(&mut self) -> Slice {
        must(self.load_ref_slice())
    }

    pub fn must_load_maybe_ref(&mut self) -> Option<Arc<Cell>> {
        must(self.load_maybe_ref())
    }

    pub fn must_load_address(&mut self) -> Address {
        must(self.load_address())
    }
}

impl From<Arc<Cell>> for Slice {
    fn from(cell: Arc<Cell>) -> Self {
        Self::new(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::builder::begin_cell;

    #[test]
    fn test_slice_load_bits() {
        let cell = begin_cell()
            .must_store_bytes(&[0xFF, 0x00])
            .must_end_cell();

        let mut slice = cell.begin_parse();
        assert_eq!(slice.remaining_bits(), 16);

        assert_eq!(slice.load_byte().unwrap(), 0xFF);
        assert_eq!(slice.remaining_bits(), 8);

        assert_eq!(slice.load_byte().unwrap(), 0x00);
        assert_eq!(slice.remaining_bits(), 0);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_slice_load_uint() {
        let cell = begin_cell()
            .must_store_uint(0x12345678, 32)
            .must_store_uint(0b101, 3)
            .must_store_int(-3, 7)
            .must_end_cell();

        let mut slice = cell.begin_parse();
        assert_eq!(slice.load_u32().unwrap(), 0x12345678);
        assert_eq!(slice.preload_uint(3).unwrap(), 0b101);
        assert_eq!(slice.load_uint(3).unwrap(), 0b101);
        assert_eq!(slice.load_int(7).unwrap(), -3);
    }

    #[test]
    fn test_read_past_end_leaves_cursor() {
        let cell = begin_cell().must_store_uint(0xABC, 12).must_end_cell();

        let mut slice = cell.begin_parse();
        slice.skip_bits(4).unwrap();
        assert_eq!(
            slice.load_u16().unwrap_err(),
            CellError::BitsUnderflow {
                requested: 16,
                available: 8
            }
        );
        assert_eq!(slice.load_byte().unwrap(), 0xBC);
        assert_eq!(slice.load_ref().unwrap_err(), CellError::RefsUnderflow);
    }

    #[test]
    fn test_slice_load_reference() {
        let child = begin_cell().must_store_uint(7, 3).must_end_cell();
        let cell = begin_cell()
            .must_store_ref(child.clone())
            .must_store_maybe_ref(Some(child.clone()))
            .must_store_maybe_ref(None)
            .must_end_cell();

        let mut slice = cell.begin_parse();
        assert_eq!(slice.remaining_refs(), 2);
        assert_eq!(slice.preload_ref().unwrap().hash(), child.hash());

        let mut nested = slice.load_ref_slice().unwrap();
        assert_eq!(nested.load_uint(3).unwrap(), 7);

        assert!(slice.load_maybe_ref().unwrap().is_some());
        assert!(slice.load_maybe_ref().unwrap().is_none());
        assert!(slice.is_empty());
    }

    #[test]
    fn test_independent_slices() {
        let cell = begin_cell()
            .must_store_uint(1, 32)
            .must_store_uint(2, 32)
            .must_end_cell();

        let mut first = cell.begin_parse();
        let mut second = cell.begin_parse();
        assert_eq!(first.load_u32().unwrap(), 1);
        assert_eq!(second.load_u32().unwrap(), 1);
        assert_eq!(first.load_u32().unwrap(), 2);
        assert_eq!(cell.bit_len(), 64);
    }

    #[test]
    fn test_big_integers() {
        let value = (BigUint::from(1u8) << 255usize) + 12345u32;
        let negative = -(BigInt::from(1u8) << 200usize) - 1;
        let cell = begin_cell()
            .must_store_big_uint(&value, 256)
            .must_store_big_int(&negative, 257)
            .must_end_cell();

        let mut slice = cell.begin_parse();
        assert_eq!(slice.load_big_uint(256).unwrap(), value);
        assert_eq!(slice.load_big_int(257).unwrap(), negative);
    }

    #[test]
    fn test_coins() {
        let cell = begin_cell()
            .must_store_coins(0)
            .must_store_coins(1_000_000_000)
            .must_end_cell();

        let mut slice = cell.begin_parse();
        assert_eq!(slice.load_coins().unwrap(), 0);
        assert_eq!(slice.load_coins().unwrap(), 1_000_000_000);
    }

    #[test]
    fn test_remaining_bits() {
        let cell = begin_cell()
            .must_store_uint(0b1, 1)
            .must_store_uint(0b10110, 5)
            .must_end_cell();

        let mut slice = cell.begin_parse();
        slice.skip_bits(1).unwrap();
        assert_eq!(slice.load_remaining_bits().unwrap(), (5, vec![0b1011_0000]));
    }

    #[test]
    #[should_panic(expected = "not enough bits")]
    fn test_must_load_panics() {
        let cell = begin_cell().must_store_uint(1, 4).must_end_cell();
        cell.begin_parse().must_load_uint(8);
    }
}
