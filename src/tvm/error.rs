use thiserror::Error;

/// Broad classification of [`CellError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bytes or text that do not describe a valid cell graph
    MalformedInput,
    /// A builder or slice operation broke a cell constraint
    ConstraintViolation,
    /// Declared sizes, depth or output budget beyond the hard ceiling
    ResourceLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("cell overflow: cannot store {requested} bits, {available} available")]
    BitsOverflow { requested: usize, available: usize },
    #[error("cell overflow: cannot store more than {max} references")]
    RefsOverflow { max: usize },
    #[error("value does not fit in {bits} bits")]
    ValueOutOfRange { bits: usize },
    #[error("unsupported bit width {bits}, at most {max} allowed")]
    InvalidWidth { bits: usize, max: usize },
    #[error("not enough bits: requested {requested}, {available} remaining")]
    BitsUnderflow { requested: usize, available: usize },
    #[error("no more references to read")]
    RefsUnderflow,
    #[error("builder is already sealed")]
    BuilderSealed,
    #[error("invalid exotic cell: {0}")]
    InvalidExotic(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid BoC: {0}")]
    InvalidBoc(String),
    #[error("BoC checksum mismatch: stored 0x{stored:08x}, computed 0x{computed:08x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("cyclic reference: cell {0} references itself")]
    CyclicReference(usize),
    #[error("invalid merkle proof: {0}")]
    InvalidProof(String),
    #[error("invalid interchange document: {0}")]
    InvalidInterchange(String),
    #[error("cell depth {depth} exceeds maximum {max}")]
    DepthLimit { depth: u32, max: u16 },
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

impl CellError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BitsOverflow { .. }
            | Self::RefsOverflow { .. }
            | Self::ValueOutOfRange { .. }
            | Self::InvalidWidth { .. }
            | Self::BitsUnderflow { .. }
            | Self::RefsUnderflow
            | Self::BuilderSealed
            | Self::InvalidExotic(_)
            | Self::InvalidAddress(_) => ErrorKind::ConstraintViolation,
            Self::InvalidBoc(_)
            | Self::ChecksumMismatch { .. }
            | Self::CyclicReference(_)
            | Self::InvalidProof(_)
            | Self::InvalidInterchange(_) => ErrorKind::MalformedInput,
            Self::DepthLimit { .. } | Self::LimitExceeded(_) => ErrorKind::ResourceLimit,
        }
    }
}

pub type Result<T> = std::result::Result<T, CellError>;

/// Unwraps a fallible cell operation, panicking with the error message.
///
/// Backs the `must_*` family of builder and slice methods.
#[track_caller]
pub(crate) fn must<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}
