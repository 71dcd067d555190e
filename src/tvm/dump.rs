//! Human-readable cell tree dumps
//!
//! ```text
//! 64[0000000000000037] -> {
//!   32[0000022B],
//!   32[0000022B]
//! }
//! ```
//!
//! Shared subtrees are printed once per reference, so a small DAG can expand
//! into an enormous dump. Every dump takes a byte limit and stops walking the
//! graph as soon as the output reaches it.

use crate::tvm::cell::Cell;
use std::fmt;

/// Output limit used by [`fmt::Display`]
pub const DEFAULT_DUMP_LIMIT: usize = 1 << 20;

/// Renders bits in fift hex notation.
///
/// When the length is not a whole number of nibbles a completion bit is
/// appended and the result ends with `_`.
pub fn to_fift_hex(data: &[u8], bit_len: usize) -> String {
    let nibbles = bit_len.div_ceil(4);

    let mut bytes = data[..bit_len.div_ceil(8)].to_vec();
    if bit_len % 4 != 0 {
        bytes[bit_len / 8] |= 0x80 >> (bit_len % 8);
    }

    let mut hex = hex::encode_upper(bytes);
    hex.truncate(nibbles);
    if bit_len % 4 != 0 {
        hex.push('_');
    }
    hex
}

fn to_binary(data: &[u8], bit_len: usize) -> String {
    (0..bit_len)
        .map(|i| {
            if (data[i / 8] >> (7 - i % 8)) & 1 == 1 {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

enum Step<'a> {
    Cell(&'a Cell, usize),
    Text(&'static str),
    Close(usize),
}

impl Cell {
    /// Dumps the tree with payloads in fift hex, at most `limit` bytes
    pub fn dump(&self, limit: usize) -> String {
        self.render(limit, false)
    }

    /// Dumps the tree with payloads as binary digits, at most `limit` bytes
    pub fn dump_bits(&self, limit: usize) -> String {
        self.render(limit, true)
    }

    fn render(&self, limit: usize, binary: bool) -> String {
        let mut out = String::new();
        let mut stack = vec![Step::Cell(self, 0)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Cell(cell, depth) => {
                    let payload = if binary {
                        to_binary(cell.data(), cell.bit_len())
                    } else {
                        to_fift_hex(cell.data(), cell.bit_len())
                    };

                    out.push_str(&"  ".repeat(depth));
                    out.push_str(&format!("{}[{}]", cell.bit_len(), payload));
                    if cell.level() > 0 {
                        out.push_str(&format!("{{{}}}", cell.level()));
                    }
                    if cell.is_exotic() {
                        out.push('*');
                    }

                    let refs = cell.references();
                    if !refs.is_empty() {
                        out.push_str(" -> {");
                        stack.push(Step::Close(depth));
                        for (i, child) in refs.iter().enumerate().rev() {
                            stack.push(Step::Text(if i + 1 == refs.len() { "\n" } else { "," }));
                            stack.push(Step::Cell(child.as_ref(), depth + 1));
                            stack.push(Step::Text("\n"));
                        }
                    }
                }
                Step::Text(text) => out.push_str(text),
                Step::Close(depth) => {
                    out.push_str(&"  ".repeat(depth));
                    out.push('}');
                }
            }

            if out.len() >= limit {
                out.truncate(limit);
                break;
            }
        }

        out
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump(DEFAULT_DUMP_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::builder::begin_cell;

    #[test]
    fn test_fift_hex() {
        assert_eq!(to_fift_hex(&[0x12, 0x34], 16), "1234");
        assert_eq!(to_fift_hex(&[0xAB], 4), "A");
        assert_eq!(to_fift_hex(&[0b1010_0000], 3), "B_");
        assert_eq!(to_fift_hex(&[0xFF, 0x80], 9), "FFC_");
        assert_eq!(to_fift_hex(&[], 0), "");
    }

    #[test]
    fn test_dump_format() {
        let child = begin_cell().must_store_uint(555, 32).must_end_cell();
        let root = begin_cell()
            .must_store_uint(55, 64)
            .must_store_ref(child.clone())
            .must_store_ref(child)
            .must_end_cell();

        assert_eq!(
            root.dump(1024),
            "64[0000000000000037] -> {\n  32[0000022B],\n  32[0000022B]\n}"
        );
        assert_eq!(root.to_string(), root.dump(1024));
    }

    #[test]
    fn test_dump_bits() {
        let cell = begin_cell().must_store_uint(0b101, 3).must_end_cell();
        assert_eq!(cell.dump_bits(100), "3[101]");
        assert_eq!(cell.dump(100), "3[B_]");
    }

    #[test]
    fn test_dump_exotic_level() {
        let leaf = begin_cell().must_store_uint(1, 8).must_end_cell();
        let mut data = vec![0x01, 0x01];
        data.extend_from_slice(&leaf.hash());
        data.extend_from_slice(&leaf.depth().to_be_bytes());

        let pruned = begin_cell()
            .must_set_exotic(true)
            .must_store_bytes(&data)
            .must_end_cell();
        assert!(pruned.dump(1024).starts_with("288[0101"));
        assert!(pruned.dump(1024).ends_with("]{1}*"));
    }

    #[test]
    fn test_dump_limit() {
        let mut cell = begin_cell().must_store_uint(7, 8).must_end_cell();
        for _ in 0..40 {
            cell = begin_cell()
                .must_store_ref(cell.clone())
                .must_store_ref(cell.clone())
                .must_end_cell();
        }

        let dump = cell.dump(4096);
        assert_eq!(dump.len(), 4096);
        assert!(cell.dump(10).len() <= 10);
    }
}
