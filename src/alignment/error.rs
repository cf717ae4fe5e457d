use thiserror::Error;

use super::difference::DiffOp;

/// 编解码过程中的错误。每条比对记录独立失败，调用方决定跳过还是中止。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Reference slice requested outside the supplied buffer.
    #[error("reference slice [{start}, {end}) out of bounds for buffer of length {len}")]
    OutOfBounds {
        start: usize,
        end: usize,
        len: usize,
    },

    /// Read consumption of the operations disagrees with a declared length.
    #[error("inconsistent length: expected {expected}, got {actual}")]
    InconsistentLength { expected: usize, actual: usize },

    /// A span needs bases that no stored sequence provides.
    #[error("no stored sequence for {op:?} difference at position {pos}")]
    MissingSequence { pos: usize, op: DiffOp },

    #[error("difference at position {pos} comes before position {previous}")]
    UnorderedDifferences { pos: usize, previous: usize },

    #[error("invalid CIGAR: {0}")]
    InvalidCigar(String),

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
}
