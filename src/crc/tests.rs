//! Tests for CRC module

use super::*;

#[test]
fn test_crc16_check_value() {
    assert_eq!(CRC16.checksum(b"123456789"), 0x31C3);
}

#[test]
fn test_crc32c_check_value() {
    assert_eq!(CRC32C.checksum(b"123456789"), 0xE306_9283);
}

#[test]
fn test_crc16_empty_data() {
    assert_eq!(CRC16.checksum(b""), 0);
}

#[test]
fn test_crc16_address_checksum() {
    // tag 0x11, workchain 0, zero account id
    let mut data = vec![0x11u8, 0x00];
    data.extend_from_slice(&[0u8; 32]);

    assert_eq!(CRC16.checksum(&data).to_be_bytes(), [0xCF, 0x5C]);
}

#[test]
fn test_crc32c_boc_trailer() {
    let body = hex::decode("b5ee9c72410102010013000310000000000000003701010100080000022b").unwrap();

    // Stored little-endian after the BoC body
    assert_eq!(CRC32C.checksum(&body).to_le_bytes(), [0x05, 0x86, 0xfa, 0xdf]);
}

#[test]
fn test_crc32c_digest_update() {
    let mut digest = CRC32C.digest();
    digest.update(b"hello");
    digest.update(b" world");

    assert_eq!(digest.finalize(), CRC32C.checksum(b"hello world"));
}

#[test]
fn test_crc16_order_matters() {
    assert_ne!(CRC16.checksum(b"abc"), CRC16.checksum(b"bca"));
}

#[test]
fn test_crc32c_single_bit_flip() {
    let data = vec![0xAAu8; 64];
    let mut flipped = data.clone();
    flipped[17] ^= 0x01;

    assert_ne!(CRC32C.checksum(&data), CRC32C.checksum(&flipped));
}
