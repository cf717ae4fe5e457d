pub mod cigar;
pub mod codec;
pub mod difference;
pub mod error;
pub mod flags;
pub mod record;

pub use cigar::{Cigar, CigarElement, CigarOp};
pub use codec::{cigar_from_differences, differences_from_cigar, sequence_from_differences, STORE_ALL};
pub use difference::{AlignmentDifference, DiffOp};
pub use error::CodecError;
pub use flags::Flags;
pub use record::{AlignmentRecord, RawAlignment};

/// 编解码参数
#[derive(Clone, Copy, Debug)]
pub struct CodecOpt {
    /// 每条差异最多保存的碱基数
    pub max_stored: usize,
    /// 打包时总是保留原始 read 序列
    pub keep_sequence: bool,
}

impl Default for CodecOpt {
    fn default() -> Self {
        Self { max_stored: STORE_ALL, keep_sequence: false }
    }
}
