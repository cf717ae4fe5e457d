use std::fmt;

use serde::{Deserialize, Serialize};

use super::cigar::CigarOp;

/// 差异类型，字符表示与 CIGAR 操作码一致（错配使用 `X`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffOp {
    Insertion,
    Deletion,
    Mismatch,
    SkippedRegion,
    SoftClip,
    HardClip,
    Padding,
}

impl DiffOp {
    pub fn as_char(self) -> char {
        match self {
            DiffOp::Mismatch => 'X',
            op => op.cigar_op().as_char(),
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'I' => Some(DiffOp::Insertion),
            'D' => Some(DiffOp::Deletion),
            'X' => Some(DiffOp::Mismatch),
            'N' => Some(DiffOp::SkippedRegion),
            'S' => Some(DiffOp::SoftClip),
            'H' => Some(DiffOp::HardClip),
            'P' => Some(DiffOp::Padding),
            _ => None,
        }
    }

    /// 写回 CIGAR 时使用的操作码；错配写作 `M`
    pub fn cigar_op(self) -> CigarOp {
        match self {
            DiffOp::Insertion => CigarOp::Insertion,
            DiffOp::Deletion => CigarOp::Deletion,
            DiffOp::Mismatch => CigarOp::Match,
            DiffOp::SkippedRegion => CigarOp::Skip,
            DiffOp::SoftClip => CigarOp::SoftClip,
            DiffOp::HardClip => CigarOp::HardClip,
            DiffOp::Padding => CigarOp::Padding,
        }
    }

    #[inline]
    pub fn consumes_reference(self) -> bool {
        self.cigar_op().consumes_reference()
    }

    #[inline]
    pub fn consumes_read(self) -> bool {
        self.cigar_op().consumes_read()
    }

    /// Ops whose bases come from the read rather than the reference.
    #[inline]
    pub fn carries_read_bases(self) -> bool {
        matches!(self, DiffOp::Insertion | DiffOp::Mismatch | DiffOp::SoftClip)
    }
}

impl fmt::Display for DiffOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// 相对参考序列的一条差异记录。
///
/// `pos` 是参考窗口内的偏移，`length` 是差异覆盖的真实长度；
/// `seq` 可能只保存了前缀（`seq.len() < length`）。
/// 除 `seq` 外其余字段创建后不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentDifference {
    pos: usize,
    op: DiffOp,
    length: usize,
    seq: Option<Vec<u8>>,
}

impl AlignmentDifference {
    pub fn new(pos: usize, op: DiffOp, seq: Option<Vec<u8>>, length: usize) -> Self {
        Self { pos, op, length, seq }
    }

    /// Difference whose length is the length of `seq`.
    pub fn with_seq(pos: usize, op: DiffOp, seq: &[u8]) -> Self {
        Self::new(pos, op, Some(seq.to_vec()), seq.len())
    }

    /// Difference without stored bases.
    pub fn with_length(pos: usize, op: DiffOp, length: usize) -> Self {
        Self::new(pos, op, None, length)
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn op(&self) -> DiffOp {
        self.op
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn seq(&self) -> Option<&[u8]> {
        self.seq.as_deref()
    }

    pub fn set_seq(&mut self, seq: Option<Vec<u8>>) {
        self.seq = seq;
    }

    pub fn is_sequence_stored(&self) -> bool {
        self.seq.is_some()
    }

    pub fn is_full_sequence_stored(&self) -> bool {
        self.seq.as_ref().map_or(false, |s| s.len() == self.length)
    }

    /// Stored bases when they cover the whole span.
    pub fn full_seq(&self) -> Option<&[u8]> {
        self.seq.as_deref().filter(|s| s.len() == self.length)
    }

    /// 参考坐标上的结束位置（不含）
    pub fn reference_end(&self) -> usize {
        if self.op.consumes_reference() {
            self.pos + self.length
        } else {
            self.pos
        }
    }
}

/// 宽松相等：`pos`、`op`、`length` 相同即可；只有双方都保存了序列时
/// 才比较序列（忽略大小写）。因此该关系不满足传递性，没有实现 `Eq`。
impl PartialEq for AlignmentDifference {
    fn eq(&self, other: &Self) -> bool {
        if self.pos != other.pos || self.op != other.op || self.length != other.length {
            return false;
        }
        match (&self.seq, &other.seq) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => true,
        }
    }
}

impl fmt::Display for AlignmentDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seq = match &self.seq {
            Some(s) => String::from_utf8_lossy(s),
            None => "*".into(),
        };
        write!(f, "{}: {} {} {}", self.pos, self.length, self.op, seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_predicates() {
        let none = AlignmentDifference::with_length(3, DiffOp::Deletion, 4);
        assert!(!none.is_sequence_stored());
        assert!(!none.is_full_sequence_stored());

        let partial = AlignmentDifference::new(3, DiffOp::Deletion, Some(b"AC".to_vec()), 4);
        assert!(partial.is_sequence_stored());
        assert!(!partial.is_full_sequence_stored());
        assert_eq!(partial.full_seq(), None);

        let full = AlignmentDifference::with_seq(3, DiffOp::Deletion, b"ACGT");
        assert!(full.is_full_sequence_stored());
        assert_eq!(full.full_seq(), Some(&b"ACGT"[..]));
    }

    #[test]
    fn equality_tolerates_missing_sequence() {
        let bare = AlignmentDifference::with_length(7, DiffOp::Mismatch, 5);
        let full = AlignmentDifference::with_seq(7, DiffOp::Mismatch, b"ACGTT");
        let shorter = AlignmentDifference::with_length(7, DiffOp::Mismatch, 4);

        assert_eq!(bare, full);
        assert_eq!(full, bare);
        assert_ne!(bare, shorter);
    }

    #[test]
    fn equality_compares_sequences_case_insensitively() {
        let a = AlignmentDifference::with_seq(0, DiffOp::Insertion, b"acgt");
        let b = AlignmentDifference::with_seq(0, DiffOp::Insertion, b"ACGT");
        let c = AlignmentDifference::with_seq(0, DiffOp::Insertion, b"ACGA");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, AlignmentDifference::with_seq(1, DiffOp::Insertion, b"ACGT"));
        assert_ne!(a, AlignmentDifference::with_seq(0, DiffOp::SoftClip, b"ACGT"));
    }

    #[test]
    fn op_chars_round_trip() {
        for op in [
            DiffOp::Insertion,
            DiffOp::Deletion,
            DiffOp::Mismatch,
            DiffOp::SkippedRegion,
            DiffOp::SoftClip,
            DiffOp::HardClip,
            DiffOp::Padding,
        ] {
            assert_eq!(DiffOp::from_char(op.as_char()), Some(op));
        }
    }

    #[test]
    fn display_format() {
        let d = AlignmentDifference::with_seq(4, DiffOp::Insertion, b"XX");
        assert_eq!(d.to_string(), "4: 2 I XX");
        let d = AlignmentDifference::with_length(3, DiffOp::Deletion, 2);
        assert_eq!(d.to_string(), "3: 2 D *");
    }
}
