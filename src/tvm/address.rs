//! TON Address implementation
//!
//! Covers the four `MsgAddress` variants and their cell layout:
//!
//! ```text
//! addr_none$00
//! addr_extern$01 len:(## 9) external_address:(bits len)
//! addr_std$10 anycast:(Maybe Anycast) workchain_id:int8 address:bits256
//! addr_var$11 anycast:(Maybe Anycast) addr_len:(## 9) workchain_id:int32 address:(bits addr_len)
//! anycast_info$_ depth:(#<= 30) { depth >= 1 } rewrite_pfx:(bits depth)
//! ```
//!
//! [`StdAddress`] also has the raw (`wc:hex`) and user-friendly base64 text
//! forms.

use crate::crc::CRC16;
use crate::tvm::builder::Builder;
use crate::tvm::error::{CellError, Result};
use crate::tvm::slice::Slice;
use base64::Engine;
use std::fmt;
use std::str::FromStr;

/// Longest external or var address payload, limited by its 9-bit length
pub const MAX_ADDRESS_BITS: usize = 511;

/// Deepest anycast rewrite prefix
pub const MAX_ANYCAST_DEPTH: u8 = 30;

const ANYCAST_DEPTH_BITS: usize = 5;
const ADDRESS_LEN_BITS: usize = 9;

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TEST_ONLY: u8 = 0x80;

/// Left-aligned copy of the first `bit_len` bits with the rest cleared
fn take_bits(data: &[u8], bit_len: usize) -> Result<Vec<u8>> {
    if data.len() * 8 < bit_len {
        return Err(CellError::InvalidAddress(format!(
            "{bit_len} bits requested but only {} provided",
            data.len() * 8
        )));
    }

    let mut bits = data[..bit_len.div_ceil(8)].to_vec();
    if bit_len % 8 != 0 {
        if let Some(last) = bits.last_mut() {
            *last &= 0xFF << (8 - bit_len % 8);
        }
    }
    Ok(bits)
}

/// Address variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    None,
    External,
    Std,
    Var,
}

impl AddressType {
    fn tag(self) -> u64 {
        match self {
            Self::None => 0b00,
            Self::External => 0b01,
            Self::Std => 0b10,
            Self::Var => 0b11,
        }
    }

    fn from_tag(tag: u64) -> Self {
        match tag {
            0b00 => Self::None,
            0b01 => Self::External,
            0b10 => Self::Std,
            _ => Self::Var,
        }
    }
}

/// Anycast rewrite prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Anycast {
    depth: u8,
    rewrite_prefix: Vec<u8>,
}

impl Anycast {
    /// Creates an anycast prefix from the first `depth` bits of `prefix`
    pub fn new(depth: u8, prefix: &[u8]) -> Result<Self> {
        if depth == 0 || depth > MAX_ANYCAST_DEPTH {
            return Err(CellError::InvalidAddress(format!(
                "anycast depth {depth} is outside 1..={MAX_ANYCAST_DEPTH}"
            )));
        }

        Ok(Self {
            depth,
            rewrite_prefix: take_bits(prefix, depth as usize)?,
        })
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Rewrite prefix, left-aligned
    pub fn rewrite_prefix(&self) -> &[u8] {
        &self.rewrite_prefix
    }

    fn bit_len(&self) -> usize {
        ANYCAST_DEPTH_BITS + self.depth as usize
    }

    fn store_into(&self, builder: &mut Builder) -> Result<()> {
        builder.store_uint(self.depth.into(), ANYCAST_DEPTH_BITS)?;
        builder.store_bits(&self.rewrite_prefix, self.depth as usize)?;
        Ok(())
    }

    fn load_from(slice: &mut Slice) -> Result<Self> {
        let depth = slice.load_uint(ANYCAST_DEPTH_BITS)? as u8;
        if depth == 0 || depth > MAX_ANYCAST_DEPTH {
            return Err(CellError::InvalidAddress(format!(
                "anycast depth {depth} is outside 1..={MAX_ANYCAST_DEPTH}"
            )));
        }

        Ok(Self {
            depth,
            rewrite_prefix: slice.load_bits(depth as usize)?,
        })
    }

    fn store_maybe(anycast: Option<&Self>, builder: &mut Builder) -> Result<()> {
        match anycast {
            Some(anycast) => {
                builder.store_bit(true)?;
                anycast.store_into(builder)
            }
            None => {
                builder.store_bit(false)?;
                Ok(())
            }
        }
    }

    fn load_maybe(slice: &mut Slice) -> Result<Option<Self>> {
        if slice.load_bit()? {
            Self::load_from(slice).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Standard internal address: workchain + 256-bit account id
///
/// The bounceable and test-only flags only affect the user-friendly text
/// form; they are not part of the cell layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StdAddress {
    /// Workchain ID (-1 for masterchain, 0 for basechain)
    pub workchain: i8,
    /// 32-byte hash part of the address
    pub hash_part: [u8; 32],
    pub anycast: Option<Anycast>,
    /// Whether the address is bounceable
    pub is_bounceable: bool,
    /// Whether this is a test-only address
    pub is_test_only: bool,
}

impl StdAddress {
    /// Creates a new address from workchain and hash part
    pub fn new(workchain: i8, hash_part: [u8; 32]) -> Self {
        Self {
            workchain,
            hash_part,
            anycast: None,
            is_bounceable: true,
            is_test_only: false,
        }
    }

    pub fn with_anycast(mut self, anycast: Anycast) -> Self {
        self.anycast = Some(anycast);
        self
    }

    /// Parses address from raw format: "workchain:hash"
    pub fn from_raw(address: &str) -> Result<Self> {
        let (workchain, hash_hex) = address
            .split_once(':')
            .ok_or_else(|| CellError::InvalidAddress("expected workchain:hash".to_string()))?;

        let workchain = workchain
            .parse::<i8>()
            .map_err(|e| CellError::InvalidAddress(format!("bad workchain: {e}")))?;

        let mut hash_part = [0u8; 32];
        hex::decode_to_slice(hash_hex, &mut hash_part)
            .map_err(|e| CellError::InvalidAddress(format!("bad hash part: {e}")))?;

        Ok(Self::new(workchain, hash_part))
    }

    /// Parses address from base64 user-friendly format
    pub fn from_base64(address: &str) -> Result<Self> {
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(address)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(address))
            .map_err(|e| CellError::InvalidAddress(format!("bad base64: {e}")))?;

        if decoded.len() != 36 {
            return Err(CellError::InvalidAddress(format!(
                "user-friendly address must be 36 bytes, got {}",
                decoded.len()
            )));
        }

        let checksum = CRC16.checksum(&decoded[..34]).to_be_bytes();
        if decoded[34..] != checksum {
            return Err(CellError::InvalidAddress("checksum mismatch".to_string()));
        }

        let mut tag = decoded[0];
        let is_test_only = tag & TAG_TEST_ONLY != 0;
        tag &= !TAG_TEST_ONLY;

        let is_bounceable = match tag {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            _ => {
                return Err(CellError::InvalidAddress(format!(
                    "unknown address tag 0x{tag:02x}"
                )));
            }
        };

        let mut hash_part = [0u8; 32];
        hash_part.copy_from_slice(&decoded[2..34]);

        Ok(Self {
            workchain: decoded[1] as i8,
            hash_part,
            anycast: None,
            is_bounceable,
            is_test_only,
        })
    }

    /// Converts address to a string in the requested form
    pub fn to_string_with(
        &self,
        user_friendly: bool,
        url_safe: bool,
        bounceable: bool,
        test_only: bool,
    ) -> String {
        if !user_friendly {
            return self.to_raw();
        }

        let mut tag = if bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if test_only {
            tag |= TAG_TEST_ONLY;
        }

        let mut data = Vec::with_capacity(36);
        data.push(tag);
        data.push(self.workchain as u8);
        data.extend_from_slice(&self.hash_part);
        data.extend_from_slice(&CRC16.checksum(&data).to_be_bytes());

        if url_safe {
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&data)
        } else {
            base64::engine::general_purpose::STANDARD.encode(&data)
        }
    }

    /// Converts to raw format (workchain:hash)
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash_part))
    }

    /// Converts to user-friendly url-safe base64 using the address flags
    pub fn to_base64(&self) -> String {
        self.to_string_with(true, true, self.is_bounceable, self.is_test_only)
    }

    fn bit_len(&self) -> usize {
        2 + 1 + self.anycast.as_ref().map_or(0, Anycast::bit_len) + 8 + 256
    }
}

impl fmt::Display for StdAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for StdAddress {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains(':') {
            Self::from_raw(s)
        } else {
            Self::from_base64(s)
        }
    }
}

/// External address: up to 511 arbitrary bits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalAddress {
    bit_len: usize,
    data: Vec<u8>,
}

impl ExternalAddress {
    /// Creates an external address from the first `bit_len` bits of `data`
    pub fn new(data: &[u8], bit_len: usize) -> Result<Self> {
        if bit_len > MAX_ADDRESS_BITS {
            return Err(CellError::InvalidAddress(format!(
                "external address of {bit_len} bits exceeds {MAX_ADDRESS_BITS}"
            )));
        }

        Ok(Self {
            bit_len,
            data: take_bits(data, bit_len)?,
        })
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for ExternalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EXT:{}:{}", self.bit_len, hex::encode(&self.data))
    }
}

/// Variable-length internal address with a 32-bit workchain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarAddress {
    pub workchain: i32,
    pub anycast: Option<Anycast>,
    bit_len: usize,
    data: Vec<u8>,
}

impl VarAddress {
    pub fn new(workchain: i32, data: &[u8], bit_len: usize) -> Result<Self> {
        if bit_len > MAX_ADDRESS_BITS {
            return Err(CellError::InvalidAddress(format!(
                "var address of {bit_len} bits exceeds {MAX_ADDRESS_BITS}"
            )));
        }

        Ok(Self {
            workchain,
            anycast: None,
            bit_len,
            data: take_bits(data, bit_len)?,
        })
    }

    pub fn with_anycast(mut self, anycast: Anycast) -> Self {
        self.anycast = Some(anycast);
        self
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for VarAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VAR:{}:{}:{}",
            self.workchain,
            self.bit_len,
            hex::encode(&self.data)
        )
    }
}

/// Any `MsgAddress` value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Address {
    #[default]
    None,
    External(ExternalAddress),
    Std(StdAddress),
    Var(VarAddress),
}

impl Address {
    pub fn address_type(&self) -> AddressType {
        match self {
            Self::None => AddressType::None,
            Self::External(_) => AddressType::External,
            Self::Std(_) => AddressType::Std,
            Self::Var(_) => AddressType::Var,
        }
    }

    /// Number of bits the address occupies in a cell
    pub fn bit_len(&self) -> usize {
        match self {
            Self::None => 2,
            Self::External(ext) => 2 + ADDRESS_LEN_BITS + ext.bit_len,
            Self::Std(std) => std.bit_len(),
            Self::Var(var) => {
                2 + 1
                    + var.anycast.as_ref().map_or(0, Anycast::bit_len)
                    + ADDRESS_LEN_BITS
                    + 32
                    + var.bit_len
            }
        }
    }

    /// Writes the address layout into a builder
    ///
    /// Nothing is written when the builder cannot hold the whole address.
    pub fn store_into(&self, builder: &mut Builder) -> Result<()> {
        if self.bit_len() > builder.available_bits() {
            return Err(CellError::BitsOverflow {
                requested: self.bit_len(),
                available: builder.available_bits(),
            });
        }
        builder.store_uint(self.address_type().tag(), 2)?;

        match self {
            Self::None => {}
            Self::External(ext) => {
                builder.store_uint(ext.bit_len as u64, ADDRESS_LEN_BITS)?;
                builder.store_bits(&ext.data, ext.bit_len)?;
            }
            Self::Std(std) => {
                Anycast::store_maybe(std.anycast.as_ref(), builder)?;
                builder.store_int(std.workchain.into(), 8)?;
                builder.store_bytes(&std.hash_part)?;
            }
            Self::Var(var) => {
                Anycast::store_maybe(var.anycast.as_ref(), builder)?;
                builder.store_uint(var.bit_len as u64, ADDRESS_LEN_BITS)?;
                builder.store_int(var.workchain.into(), 32)?;
                builder.store_bits(&var.data, var.bit_len)?;
            }
        }

        Ok(())
    }

    /// Reads an address layout from a slice
    pub fn load_from(slice: &mut Slice) -> Result<Self> {
        match AddressType::from_tag(slice.load_uint(2)?) {
            AddressType::None => Ok(Self::None),
            AddressType::External => {
                let bit_len = slice.load_uint(ADDRESS_LEN_BITS)? as usize;
                let data = slice.load_bits(bit_len)?;
                Ok(Self::External(ExternalAddress { bit_len, data }))
            }
            AddressType::Std => {
                let anycast = Anycast::load_maybe(slice)?;
                let workchain = slice.load_int(8)? as i8;
                let mut hash_part = [0u8; 32];
                hash_part.copy_from_slice(&slice.load_bytes(32)?);

                Ok(Self::Std(StdAddress {
                    anycast,
                    ..StdAddress::new(workchain, hash_part)
                }))
            }
            AddressType::Var => {
                let anycast = Anycast::load_maybe(slice)?;
                let bit_len = slice.load_uint(ADDRESS_LEN_BITS)? as usize;
                let workchain = slice.load_int(32)? as i32;
                let data = slice.load_bits(bit_len)?;

                Ok(Self::Var(VarAddress {
                    workchain,
                    anycast,
                    bit_len,
                    data,
                }))
            }
        }
    }
}

impl From<StdAddress> for Address {
    fn from(address: StdAddress) -> Self {
        Self::Std(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("NONE"),
            Self::External(ext) => ext.fmt(f),
            Self::Std(std) => std.fmt(f),
            Self::Var(var) => var.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::builder::begin_cell;

    const HASH_HEX: &str = "83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8";

    fn round_trip(address: &Address) -> Address {
        let cell = begin_cell().must_store_address(address).must_end_cell();
        assert_eq!(cell.bit_len(), address.bit_len());

        let mut slice = cell.begin_parse();
        let loaded = slice.load_address().unwrap();
        assert_eq!(slice.remaining_bits(), 0);
        loaded
    }

    #[test]
    fn test_address_raw() {
        let addr = StdAddress::from_raw(&format!("0:{HASH_HEX}")).unwrap();
        assert_eq!(addr.workchain, 0);
        assert_eq!(addr.to_raw(), format!("0:{HASH_HEX}"));

        assert!(StdAddress::from_raw("0:abcd").is_err());
        assert!(StdAddress::from_raw(&format!("300:{HASH_HEX}")).is_err());
    }

    #[test]
    fn test_address_base64() {
        let addr: StdAddress = "EQCD39VS5jcptHL8vMjEXrzGaRcCVYto7HUn4bpAOg8xqB2N"
            .parse()
            .unwrap();
        assert_eq!(addr.workchain, 0);
        assert!(addr.is_bounceable);
        assert_eq!(hex::encode(addr.hash_part), HASH_HEX);
        assert_eq!(
            addr.to_base64(),
            "EQCD39VS5jcptHL8vMjEXrzGaRcCVYto7HUn4bpAOg8xqB2N"
        );
    }

    #[test]
    fn test_address_checksum_mismatch() {
        let err = StdAddress::from_base64("EQCD39VS5jcptHL8vMjEXrzGaRcCVYto7HUn4bpAOg8xqB2O")
            .unwrap_err();
        assert!(matches!(err, CellError::InvalidAddress(_)));
    }

    #[test]
    fn test_zero_address_formats() {
        let zero_addr = StdAddress::new(0, [0u8; 32]);

        assert_eq!(
            zero_addr.to_raw(),
            "0:0000000000000000000000000000000000000000000000000000000000000000"
        );
        assert_eq!(
            zero_addr.to_string_with(true, true, true, false),
            "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c"
        );
        assert_eq!(
            zero_addr.to_string_with(true, true, false, false),
            "UQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAJKZ"
        );

        let parsed = StdAddress::from_base64("UQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAJKZ")
            .unwrap();
        assert!(!parsed.is_bounceable);
    }

    #[test]
    fn test_test_only_flag() {
        let mut addr = StdAddress::new(-1, [0x42; 32]);
        addr.is_test_only = true;

        let text = addr.to_string_with(true, false, true, true);
        let parsed = StdAddress::from_base64(&text).unwrap();
        assert!(parsed.is_test_only);
        assert_eq!(parsed.workchain, -1);
    }

    #[test]
    fn test_cell_round_trip() {
        let mut hash = [0u8; 32];
        hex::decode_to_slice(HASH_HEX, &mut hash).unwrap();

        let addresses = vec![
            Address::None,
            Address::External(ExternalAddress::new(&[1, 2, 3, 4, 5], 40).unwrap()),
            Address::Std(StdAddress::new(-1, hash)),
            Address::Std(
                StdAddress::new(0, hash).with_anycast(Anycast::new(3, &[0b1010_0000]).unwrap()),
            ),
            Address::Var(VarAddress::new(-7, &hash, 100).unwrap()),
            Address::Var(
                VarAddress::new(123456, &hash, 256)
                    .unwrap()
                    .with_anycast(Anycast::new(2, &[0b0100_0000]).unwrap()),
            ),
        ];

        for address in addresses {
            assert_eq!(round_trip(&address), address);
        }
    }

    #[test]
    fn test_std_layout() {
        let addr = Address::Std(StdAddress::new(0, [0xFF; 32]));
        let cell = begin_cell().must_store_address(&addr).must_end_cell();

        // 10 | 0 | 00000000 | 1...
        assert_eq!(cell.bit_len(), 267);
        assert_eq!(cell.data()[0], 0b1000_0000);
        assert_eq!(cell.data()[1], 0b0001_1111);
    }

    #[test]
    fn test_store_into_full_builder() {
        let addr = Address::Std(StdAddress::new(0, [0x11; 32]));
        let mut builder = Builder::new();
        builder.store_bits(&[0xAA; 128], 1020).unwrap();

        let err = addr.store_into(&mut builder).unwrap_err();
        assert!(matches!(
            err,
            CellError::BitsOverflow {
                requested: 267,
                available: 3
            }
        ));
        assert_eq!(builder.bit_len(), 1020);

        // a bare none tag still fits
        Address::None.store_into(&mut builder).unwrap();
        assert_eq!(builder.bit_len(), 1022);
    }

    #[test]
    fn test_invalid_anycast() {
        assert!(Anycast::new(0, &[]).is_err());
        assert!(Anycast::new(31, &[0; 4]).is_err());
        assert!(Anycast::new(9, &[0]).is_err());

        // std address claiming anycast depth 0
        let cell = begin_cell()
            .must_store_uint(0b10, 2)
            .must_store_bit(true)
            .must_store_uint(0, 5)
            .must_store_bytes(&[0; 33])
            .must_end_cell();
        let mut slice = cell.begin_parse();
        assert!(matches!(
            slice.load_address().unwrap_err(),
            CellError::InvalidAddress(_)
        ));
        assert_eq!(slice.remaining_bits(), cell.bit_len());
    }

    #[test]
    fn test_truncated_address() {
        let cell = begin_cell()
            .must_store_uint(0b10, 2)
            .must_store_bit(false)
            .must_store_bytes(&[0; 16])
            .must_end_cell();
        assert!(cell.begin_parse().load_address().is_err());
    }

    #[test]
    fn test_external_address_limits() {
        assert!(ExternalAddress::new(&[0; 64], 512).is_err());
        assert!(ExternalAddress::new(&[0; 1], 9).is_err());

        let ext = ExternalAddress::new(&[0xFF, 0xFF], 12).unwrap();
        assert_eq!(ext.data(), &[0xFF, 0xF0]);
        assert_eq!(ext.to_string(), "EXT:12:fff0");
    }
}
