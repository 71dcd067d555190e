//! JSON interchange for cell trees
//!
//! A cell is written as a nested object:
//!
//! ```json
//! {"kind":"ordinary","bitLength":12,"bits":"q8A=","references":[]}
//! ```
//!
//! Shared subtrees are expanded once per reference, so encoding is bounded by
//! a node budget. Decoding goes through the validating cell constructor and
//! the rebuilt cell must agree with the declared kind and bit length. The
//! representation hash is what survives a round trip.
//!
//! Every tree level costs two JSON levels, so [`Cell::from_json`] lifts the
//! `serde_json` recursion limit and grows the stack on demand. Tree walks on
//! both sides keep their own stacks.

use crate::tvm::cell::{Cell, CellKind};
use crate::tvm::error::{CellError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::base64::Base64;
use serde_with::serde_as;
use std::sync::Arc;

/// Expanded node budget for [`Cell::to_json`] and `Serialize`
pub const DEFAULT_INTERCHANGE_NODE_LIMIT: usize = 1 << 20;

/// Interchange form of a cell
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRepr {
    pub kind: CellKind,
    pub bit_length: usize,
    /// Packed bits, trailing bits zero
    #[serde_as(as = "Base64")]
    pub bits: Vec<u8>,
    pub references: Vec<CellRepr>,
}

impl CellRepr {
    /// Expands a cell tree, failing once more than `limit` nodes are produced
    pub fn from_cell(cell: &Cell, limit: usize) -> Result<Self> {
        struct Frame<'a> {
            cell: &'a Cell,
            references: Vec<CellRepr>,
        }

        let mut budget = limit;
        let mut take = || {
            if budget == 0 {
                return Err(CellError::LimitExceeded(
                    "interchange node budget exhausted".to_string(),
                ));
            }
            budget -= 1;
            Ok(())
        };

        take()?;
        let mut stack = vec![Frame {
            cell,
            references: Vec::with_capacity(cell.reference_count()),
        }];

        while let Some(frame) = stack.last() {
            if let Some(child) = frame.cell.references().get(frame.references.len()) {
                take()?;
                stack.push(Frame {
                    cell: child,
                    references: Vec::with_capacity(child.reference_count()),
                });
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            let repr = Self {
                kind: frame.cell.kind(),
                bit_length: frame.cell.bit_len(),
                bits: frame.cell.data().to_vec(),
                references: frame.references,
            };
            match stack.last_mut() {
                Some(parent) => parent.references.push(repr),
                None => return Ok(repr),
            }
        }

        Err(CellError::LimitExceeded(
            "interchange node budget exhausted".to_string(),
        ))
    }

    fn check_length(&self) -> Result<()> {
        if self.bits.len() != self.bit_length.div_ceil(8) {
            return Err(CellError::InvalidInterchange(format!(
                "{} bytes given for {} bits",
                self.bits.len(),
                self.bit_length
            )));
        }
        Ok(())
    }

    fn seal(&self, references: Vec<Arc<Cell>>) -> Result<Cell> {
        let cell = Cell::new(
            self.kind.is_exotic(),
            self.bits.clone(),
            self.bit_length,
            references,
        )
        .map_err(|e| CellError::InvalidInterchange(e.to_string()))?;

        if cell.kind() != self.kind {
            return Err(CellError::InvalidInterchange(format!(
                "declared kind {:?} but data describes {:?}",
                self.kind,
                cell.kind()
            )));
        }

        Ok(cell)
    }

    /// Rebuilds and validates the cell tree
    pub fn to_cell(&self) -> Result<Cell> {
        struct Frame<'a> {
            repr: &'a CellRepr,
            references: Vec<Arc<Cell>>,
        }

        self.check_length()?;
        let mut stack = vec![Frame {
            repr: self,
            references: Vec::with_capacity(self.references.len()),
        }];

        while let Some(frame) = stack.last() {
            if let Some(child) = frame.repr.references.get(frame.references.len()) {
                child.check_length()?;
                stack.push(Frame {
                    repr: child,
                    references: Vec::with_capacity(child.references.len()),
                });
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            let cell = frame.repr.seal(frame.references)?;
            match stack.last_mut() {
                Some(parent) => parent.references.push(Arc::new(cell)),
                None => return Ok(cell),
            }
        }

        Err(CellError::InvalidInterchange("empty interchange tree".to_string()))
    }
}

impl Cell {
    /// Encodes the tree as interchange JSON
    pub fn to_json(&self) -> Result<String> {
        let repr = CellRepr::from_cell(self, DEFAULT_INTERCHANGE_NODE_LIMIT)?;

        let mut out = Vec::new();
        let mut ser = serde_json::Serializer::new(&mut out);
        repr.serialize(serde_stacker::Serializer::new(&mut ser))
            .map_err(invalid_json)?;
        String::from_utf8(out).map_err(|e| CellError::InvalidInterchange(e.to_string()))
    }

    /// Decodes interchange JSON of any depth a cell can have
    pub fn from_json(json: &str) -> Result<Arc<Cell>> {
        let mut de = serde_json::Deserializer::from_str(json);
        de.disable_recursion_limit();
        let repr = CellRepr::deserialize(serde_stacker::Deserializer::new(&mut de))
            .map_err(invalid_json)?;
        de.end().map_err(invalid_json)?;

        Ok(Arc::new(repr.to_cell()?))
    }
}

fn invalid_json(err: serde_json::Error) -> CellError {
    CellError::InvalidInterchange(err.to_string())
}

impl Serialize for Cell {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::Error;

        CellRepr::from_cell(self, DEFAULT_INTERCHANGE_NODE_LIMIT)
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        CellRepr::deserialize(serde_stacker::Deserializer::new(deserializer))?
            .to_cell()
            .map_err(D::Error::custom)
    }
}

/// Serde helper embedding a cell as a base64 BoC string
///
/// ```rust
/// use std::sync::Arc;
/// use tonutils_cell::tvm::{Cell, boc_base64};
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Message {
///     #[serde(with = "boc_base64")]
///     body: Arc<Cell>,
/// }
/// ```
pub mod boc_base64 {
    use crate::tvm::cell::Cell;
    use serde::de::{Error, Visitor};
    use serde::{Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(cell: &Arc<Cell>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = cell
            .to_boc_base64()
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<Cell>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BocVisitor;

        impl Visitor<'_> for BocVisitor {
            type Value = Arc<Cell>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("base64-encoded BoC")
            }

            fn visit_str<E: Error>(self, value: &str) -> Result<Self::Value, E> {
                Cell::from_boc_base64(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(BocVisitor)
    }
}
