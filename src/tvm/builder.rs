//! Builder for constructing cells
//!
//! A [`Builder`] accumulates up to 1023 bits and 4 references and is sealed
//! into an immutable [`Cell`] with [`Builder::end_cell`]. Once sealed, every
//! further write fails with [`CellError::BuilderSealed`].
//!
//! Each fallible `store_*` method has a `must_store_*` twin that panics
//! instead of returning the error. Use the fallible form for anything driven
//! by untrusted data and the `must_*` form for layouts the caller controls.
//!
//! # Examples
//!
//! ```rust
//! use tonutils_cell::tvm::begin_cell;
//!
//! let child = begin_cell().must_store_uint(555, 32).must_end_cell();
//! let root = begin_cell()
//!     .must_store_uint(55, 64)
//!     .must_store_ref(child.clone())
//!     .must_store_ref(child)
//!     .must_end_cell();
//! assert_eq!(root.reference_count(), 2);
//! ```

use crate::tvm::address::Address;
use crate::tvm::cell::{Cell, MAX_CELL_BITS, MAX_CELL_REFS};
use crate::tvm::error::{CellError, Result, must};
use crate::tvm::slice::Slice;
use num_bigint::{BigInt, BigUint, Sign};
use std::sync::Arc;

/// Widest unsigned value accepted by [`Builder::store_big_uint`]
pub const MAX_UINT_BITS: usize = 256;

/// Widest signed value accepted by [`Builder::store_big_int`]
pub const MAX_INT_BITS: usize = 257;

/// Starts a new cell
pub fn begin_cell() -> Builder {
    Builder::new()
}

/// Mutable accumulator of cell bits and references
#[derive(Debug, Clone, Default)]
pub struct Builder {
    data: Vec<u8>,
    bit_len: usize,
    references: Vec<Arc<Cell>>,
    exotic: bool,
    sealed: bool,
}

impl Builder {
    /// Creates a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of bits used
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Returns the number of available bits
    pub fn available_bits(&self) -> usize {
        MAX_CELL_BITS - self.bit_len
    }

    /// Returns the number of references
    pub fn ref_count(&self) -> usize {
        self.references.len()
    }

    /// Returns the number of available references
    pub fn available_refs(&self) -> usize {
        MAX_CELL_REFS - self.references.len()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.sealed {
            return Err(CellError::BuilderSealed);
        }
        Ok(())
    }

    fn ensure_capacity(&self, bits: usize, refs: usize) -> Result<()> {
        self.ensure_writable()?;
        if bits > self.available_bits() {
            return Err(CellError::BitsOverflow {
                requested: bits,
                available: self.available_bits(),
            });
        }
        if refs > self.available_refs() {
            return Err(CellError::RefsOverflow { max: MAX_CELL_REFS });
        }
        Ok(())
    }

    /// Marks the cell as exotic; its type is taken from the first data byte
    pub fn set_exotic(&mut self, exotic: bool) -> Result<&mut Self> {
        self.ensure_writable()?;
        self.exotic = exotic;
        Ok(self)
    }

    /// Stores the first `bit_len` bits of `bits`
    pub fn store_bits(&mut self, bits: &[u8], bit_len: usize) -> Result<&mut Self> {
        self.ensure_capacity(bit_len, 0)?;
        if bits.len() * 8 < bit_len {
            return Err(CellError::BitsUnderflow {
                requested: bit_len,
                available: bits.len() * 8,
            });
        }

        if self.bit_len % 8 == 0 {
            self.data.extend_from_slice(&bits[..bit_len.div_ceil(8)]);
            if bit_len % 8 != 0 {
                if let Some(last) = self.data.last_mut() {
                    *last &= 0xFF << (8 - bit_len % 8);
                }
            }
            self.bit_len += bit_len;
            return Ok(self);
        }

        for i in 0..bit_len {
            let bit = (bits[i / 8] >> (7 - i % 8)) & 1;

            let target_byte_idx = self.bit_len / 8;
            if target_byte_idx >= self.data.len() {
                self.data.push(0);
            }
            if bit == 1 {
                self.data[target_byte_idx] |= 1 << (7 - self.bit_len % 8);
            }

            self.bit_len += 1;
        }

        Ok(self)
    }

    /// Stores a single bit
    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self> {
        self.store_bits(&[if bit { 0x80 } else { 0x00 }], 1)
    }

    /// Stores a boolean value as a single bit
    pub fn store_bool(&mut self, value: bool) -> Result<&mut Self> {
        self.store_bit(value)
    }

    /// Stores an unsigned integer in exactly `bits` bits
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self> {
        if bits > 64 {
            return Err(CellError::InvalidWidth { bits, max: 64 });
        }
        if bits < 64 && value >> bits != 0 {
            return Err(CellError::ValueOutOfRange { bits });
        }
        if bits == 0 {
            self.ensure_writable()?;
            return Ok(self);
        }

        self.store_bits(&(value << (64 - bits)).to_be_bytes(), bits)
    }

    /// Stores a signed integer in exactly `bits` bits (two's complement)
    pub fn store_int(&mut self, value: i64, bits: usize) -> Result<&mut Self> {
        if bits > 64 {
            return Err(CellError::InvalidWidth { bits, max: 64 });
        }
        if bits == 0 {
            if value != 0 {
                return Err(CellError::ValueOutOfRange { bits });
            }
            self.ensure_writable()?;
            return Ok(self);
        }
        if bits < 64 {
            let bound = 1i64 << (bits - 1);
            if value < -bound || value >= bound {
                return Err(CellError::ValueOutOfRange { bits });
            }
        }

        let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
        self.store_uint(value as u64 & mask, bits)
    }

    /// Stores an unsigned integer of up to 256 bits
    pub fn store_big_uint(&mut self, value: &BigUint, bits: usize) -> Result<&mut Self> {
        if bits > MAX_UINT_BITS {
            return Err(CellError::InvalidWidth {
                bits,
                max: MAX_UINT_BITS,
            });
        }
        if value.bits() > bits as u64 {
            return Err(CellError::ValueOutOfRange { bits });
        }
        self.store_biguint_bits(value, bits)
    }

    /// Stores a signed integer of up to 257 bits (two's complement)
    pub fn store_big_int(&mut self, value: &BigInt, bits: usize) -> Result<&mut Self> {
        if bits > MAX_INT_BITS {
            return Err(CellError::InvalidWidth {
                bits,
                max: MAX_INT_BITS,
            });
        }
        if bits == 0 {
            if value.sign() != Sign::NoSign {
                return Err(CellError::ValueOutOfRange { bits });
            }
            self.ensure_writable()?;
            return Ok(self);
        }

        let bound = BigInt::from(1u8) << (bits - 1);
        if *value < -bound.clone() || *value >= bound {
            return Err(CellError::ValueOutOfRange { bits });
        }

        let encoded = if value.sign() == Sign::Minus {
            (BigInt::from(1u8) << bits) + value
        } else {
            value.clone()
        };
        let (_, magnitude) = encoded.into_parts();
        self.store_biguint_bits(&magnitude, bits)
    }

    fn store_biguint_bits(&mut self, value: &BigUint, bits: usize) -> Result<&mut Self> {
        if bits == 0 {
            self.ensure_writable()?;
            return Ok(self);
        }

        let byte_len = bits.div_ceil(8);
        let aligned = value << (byte_len * 8 - bits);
        let bytes = aligned.to_bytes_be();

        let mut buffer = vec![0u8; byte_len.saturating_sub(bytes.len())];
        buffer.extend_from_slice(&bytes);
        self.store_bits(&buffer, bits)
    }

    /// Stores a byte
    pub fn store_byte(&mut self, byte: u8) -> Result<&mut Self> {
        self.store_bits(&[byte], 8)
    }

    /// Stores multiple bytes
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.store_bits(bytes, bytes.len() * 8)
    }

    pub fn store_u8(&mut self, value: u8) -> Result<&mut Self> {
        self.store_byte(value)
    }

    pub fn store_u16(&mut self, value: u16) -> Result<&mut Self> {
        self.store_bits(&value.to_be_bytes(), 16)
    }

    /// Stores a u32 value
    pub fn store_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.store_bits(&value.to_be_bytes(), 32)
    }

    /// Stores a u64 value
    pub fn store_u64(&mut self, value: u64) -> Result<&mut Self> {
        self.store_bits(&value.to_be_bytes(), 64)
    }

    /// Stores coins (VarUInteger 16)
    pub fn store_coins(&mut self, amount: u128) -> Result<&mut Self> {
        if amount == 0 {
            return self.store_uint(0, 4);
        }

        let byte_len = (128 - amount.leading_zeros() as usize).div_ceil(8);
        if byte_len > 15 {
            return Err(CellError::ValueOutOfRange { bits: 120 });
        }
        self.ensure_capacity(4 + byte_len * 8, 0)?;

        self.store_uint(byte_len as u64, 4)?;
        let bytes = amount.to_be_bytes();
        self.store_bytes(&bytes[16 - byte_len..])
    }

    /// Stores a reference to another cell
    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self> {
        self.ensure_capacity(0, 1)?;
        self.references.push(cell);
        Ok(self)
    }

    /// Stores an optional reference (Maybe ^Cell)
    pub fn store_maybe_ref(&mut self, cell: Option<Arc<Cell>>) -> Result<&mut Self> {
        match cell {
            Some(c) => {
                self.ensure_capacity(1, 1)?;
                self.store_bit(true)?;
                self.store_ref(c)
            }
            None => self.store_bit(false),
        }
    }

    /// Appends the bits and references of a sealed cell
    pub fn store_cell(&mut self, cell: &Cell) -> Result<&mut Self> {
        self.ensure_capacity(cell.bit_len(), cell.reference_count())?;
        self.store_bits(cell.data(), cell.bit_len())?;
        self.references.extend(cell.references().iter().cloned());
        Ok(self)
    }

    /// Appends the bits and references of another builder
    pub fn store_builder(&mut self, builder: &Builder) -> Result<&mut Self> {
        self.ensure_capacity(builder.bit_len, builder.references.len())?;
        self.store_bits(&builder.data, builder.bit_len)?;
        self.references.extend(builder.references.iter().cloned());
        Ok(self)
    }

    /// Seals another builder and stores it as a reference
    pub fn store_builder_as_ref(&mut self, mut builder: Builder) -> Result<&mut Self> {
        self.ensure_capacity(0, 1)?;
        let cell = builder.end_cell()?;
        self.store_ref(cell)
    }

    /// Stores the unread bits and references of a slice
    pub fn store_slice(&mut self, slice: &Slice) -> Result<&mut Self> {
        self.ensure_capacity(slice.remaining_bits(), slice.remaining_refs())?;

        let mut rest = slice.clone();
        let (bit_len, bits) = rest.load_remaining_bits()?;
        self.store_bits(&bits, bit_len)?;
        self.references.extend(rest.load_remaining_refs()?);
        Ok(self)
    }

    /// Stores an address in its wire layout
    pub fn store_address(&mut self, address: &Address) -> Result<&mut Self> {
        self.ensure_capacity(address.bit_len(), 0)?;
        address.store_into(self)?;
        Ok(self)
    }

    /// Seals the builder into a cell
    pub fn end_cell(&mut self) -> Result<Arc<Cell>> {
        self.ensure_writable()?;
        let cell = Cell::new(
            self.exotic,
            self.data.clone(),
            self.bit_len,
            self.references.clone(),
        )?;
        self.sealed = true;
        Ok(Arc::new(cell))
    }

    /// Seals the builder and opens a slice on the result
    pub fn to_slice(&mut self) -> Result<Slice> {
        Ok(Slice::new(self.end_cell()?))
    }

    pub fn must_set_exotic(&mut self, exotic: bool) -> &mut Self {
        must(self.set_exotic(exotic))
    }

    pub fn must_store_bits(&mut self, bits: &[u8], bit_len: usize) -> &mut Self {
        must(self.store_bits(bits, bit_len))
    }

    pub fn must_store_bit(&mut self, bit: bool) -> &mut Self {
        must(self.store_bit(bit))
    }

    pub fn must_store_uint(&mut self, value: u64, bits: usize) -> &mut Self {
        must(self.store_uint(value, bits))
    }

    pub fn must_store_int(&mut self, value: i64, bits: usize) -> &mut Self {
        must(self.store_int(value, bits))
    }

    pub fn must_store_big_uint(&mut self, value: &BigUint, bits: usize) -> &mut Self {
        must(self.store_big_uint(value, bits))
    }

    pub fn must_store_big_int(&mut self, value: &BigInt, bits: usize) -> &mut Self {
        must(self.store_big_int(value, bits))
    }

    pub fn must_store_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        must(self.store_bytes(bytes))
    }

    pub fn must_store_coins(&mut self, amount: u128) -> &mut Self {
        must(self.store_coins(amount))
    }

    pub fn must_store_ref(&mut self, cell: Arc<Cell>) -> &mut Self {
        must(self.store_ref(cell))
    }

    pub fn must_store_maybe_ref(&mut self, cell: Option<Arc<Cell>>) -> &mut Self {
        must(self.store_maybe_ref(cell))
    }

    pub fn must_store_cell(&mut self, cell: &Cell) -> &mut Self {
        must(self.store_cell(cell))
    }

    pub fn must_store_builder(&mut self, builder: &Builder) -> &mut Self {
        must(self.store_builder(builder))
    }

    pub fn must_store_builder_as_ref(&mut self, builder: Builder) -> &mut Self {
        must(self.store_builder_as_ref(builder))
    }

    pub fn must_store_slice(&mut self, slice: &Slice) -> &mut Self {
        must(self.store_slice(slice))
    }

    pub fn must_store_address(&mut self, address: &Address) -> &mut Self {
        must(self.store_address(address))
    }

    pub fn must_end_cell(&mut self) -> Arc<Cell> {
        must(self.end_cell())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::address::StdAddress;

    #[test]
    fn test_builder_basic() {
        let mut builder = Builder::new();
        builder.store_u32(0x12345678).unwrap();
        builder.store_byte(0xFF).unwrap();
        assert_eq!(builder.bit_len(), 40);
        assert_eq!(builder.available_bits(), MAX_CELL_BITS - 40);

        let cell = builder.end_cell().unwrap();
        assert_eq!(cell.bit_len(), 40);
        assert_eq!(cell.data(), &[0x12, 0x34, 0x56, 0x78, 0xFF]);
    }

    #[test]
    fn test_unaligned_bits() {
        let mut builder = Builder::new();
        builder.store_bit(true).unwrap();
        builder.store_uint(0b0101, 4).unwrap();
        builder.store_bits(&[0xFF], 5).unwrap();

        let cell = builder.end_cell().unwrap();
        assert_eq!(cell.bit_len(), 10);
        assert_eq!(cell.data(), &[0b1010_1111, 0b1100_0000]);
    }

    #[test]
    fn test_sealed_builder_rejects_writes() {
        let mut builder = Builder::new();
        builder.store_u8(1).unwrap();
        builder.end_cell().unwrap();

        assert!(builder.is_sealed());
        assert_eq!(builder.store_u8(2).unwrap_err(), CellError::BuilderSealed);
        assert_eq!(
            builder.store_ref(Arc::new(Cell::empty())).unwrap_err(),
            CellError::BuilderSealed
        );
        assert_eq!(builder.end_cell().unwrap_err(), CellError::BuilderSealed);
    }

    #[test]
    fn test_value_must_fit_width() {
        let mut builder = Builder::new();
        assert_eq!(
            builder.store_uint(256, 8).unwrap_err(),
            CellError::ValueOutOfRange { bits: 8 }
        );
        assert_eq!(
            builder.store_int(128, 8).unwrap_err(),
            CellError::ValueOutOfRange { bits: 8 }
        );
        assert_eq!(
            builder.store_int(-129, 8).unwrap_err(),
            CellError::ValueOutOfRange { bits: 8 }
        );
        assert_eq!(
            builder.store_uint(1, 65).unwrap_err(),
            CellError::InvalidWidth { bits: 65, max: 64 }
        );
        assert!(builder.store_uint(1, 0).is_err());
        assert_eq!(builder.bit_len(), 0);

        builder.store_int(-128, 8).unwrap();
        builder.store_int(i64::MIN, 64).unwrap();
        builder.store_uint(u64::MAX, 64).unwrap();
        builder.store_uint(0, 0).unwrap();
        assert_eq!(builder.bit_len(), 136);
    }

    #[test]
    fn test_bits_overflow() {
        let mut builder = Builder::new();
        builder.store_bytes(&[0xAB; 127]).unwrap();
        builder.store_uint(0b1010101, 7).unwrap();
        assert_eq!(builder.available_bits(), 0);

        assert_eq!(
            builder.store_bit(true).unwrap_err(),
            CellError::BitsOverflow {
                requested: 1,
                available: 0
            }
        );
        assert_eq!(builder.end_cell().unwrap().bit_len(), MAX_CELL_BITS);
    }

    #[test]
    fn test_refs_overflow() {
        let child = Arc::new(Cell::empty());
        let mut builder = Builder::new();
        for _ in 0..MAX_CELL_REFS {
            builder.store_ref(child.clone()).unwrap();
        }

        assert_eq!(
            builder.store_ref(child.clone()).unwrap_err(),
            CellError::RefsOverflow { max: 4 }
        );
        // failed maybe-ref leaves the bits untouched
        assert!(builder.store_maybe_ref(Some(child)).is_err());
        assert_eq!(builder.bit_len(), 0);
    }

    #[test]
    fn test_big_integers() {
        let max = (BigUint::from(1u8) << 256usize) - 1u8;
        let mut builder = Builder::new();
        builder.store_big_uint(&max, 256).unwrap();
        assert!(builder.store_big_uint(&max, 255).is_err());

        let min = -(BigInt::from(1u8) << 256usize);
        builder.store_big_int(&min, 257).unwrap();
        assert!(builder.store_big_int(&(BigInt::from(1u8) << 256usize), 257).is_err());
        assert_eq!(builder.bit_len(), 513);

        let cell = builder.end_cell().unwrap();
        assert!(cell.data()[..32].iter().all(|b| *b == 0xFF));
        // -2^256 in 257 bits is a single sign bit followed by zeroes
        assert_eq!(cell.data()[32], 0x80);
        assert!(cell.data()[33..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_builder_concatenation() {
        let child = Arc::new(Cell::empty());
        let mut inner = Builder::new();
        inner.store_uint(0b101, 3).unwrap();
        inner.store_ref(child).unwrap();

        let mut outer = Builder::new();
        outer.store_bit(true).unwrap();
        outer.store_builder(&inner).unwrap();
        outer.store_builder_as_ref(inner).unwrap();

        let cell = outer.end_cell().unwrap();
        assert_eq!(cell.bit_len(), 4);
        assert_eq!(cell.data(), &[0b1101_0000]);
        assert_eq!(cell.reference_count(), 2);
        assert_eq!(cell.reference(1).unwrap().bit_len(), 3);
    }

    #[test]
    fn test_store_cell_and_slice() {
        let source = begin_cell()
            .must_store_uint(0xABCD, 16)
            .must_store_ref(Arc::new(Cell::empty()))
            .must_end_cell();

        let mut slice = Slice::new(source.clone());
        slice.skip_bits(8).unwrap();

        let copy = begin_cell()
            .must_store_cell(&source)
            .must_store_slice(&slice)
            .must_end_cell();
        assert_eq!(copy.bit_len(), 24);
        assert_eq!(copy.data(), &[0xAB, 0xCD, 0xCD]);
        assert_eq!(copy.reference_count(), 2);
    }

    #[test]
    fn test_builder_address() {
        let addr = Address::Std(StdAddress::new(0, [0u8; 32]));
        let mut builder = Builder::new();
        builder.store_address(&addr).unwrap();

        let cell = builder.end_cell().unwrap();
        // 2 bits (addr_std) + 1 bit (no anycast) + 8 bits (workchain) + 256 bits (hash) = 267 bits
        assert_eq!(cell.bit_len(), 267);
    }

    #[test]
    fn test_builder_coins() {
        let mut builder = Builder::new();
        builder.store_coins(1_000_000_000).unwrap();

        let cell = builder.end_cell().unwrap();
        // 4 bits of length + 4 bytes
        assert_eq!(cell.bit_len(), 36);
        assert!(Builder::new().store_coins(u128::MAX).is_err());
    }

    #[test]
    fn test_exotic_builder() {
        let mut data = vec![0x02];
        data.extend_from_slice(&[0x77; 32]);

        let cell = begin_cell()
            .must_set_exotic(true)
            .must_store_bytes(&data)
            .must_end_cell();
        assert!(cell.is_exotic());

        let mut invalid = Builder::new();
        invalid.set_exotic(true).unwrap();
        invalid.store_u8(0x02).unwrap();
        assert!(matches!(
            invalid.end_cell().unwrap_err(),
            CellError::InvalidExotic(_)
        ));
        // a failed seal leaves the builder usable
        assert!(!invalid.is_sealed());
    }

    #[test]
    #[should_panic(expected = "value does not fit in 4 bits")]
    fn test_must_store_panics() {
        begin_cell().must_store_uint(16, 4);
    }
}
