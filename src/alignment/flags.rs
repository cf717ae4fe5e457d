use serde::{Deserialize, Serialize};

pub const ALIGNMENT_MULTIPLE_SEGMENTS: u16 = 0x01;
pub const SEGMENTS_PROPERLY_ALIGNED: u16 = 0x02;
pub const SEGMENT_UNMAPPED: u16 = 0x04;
pub const NEXT_SEGMENT_UNMAPPED: u16 = 0x08;
pub const SEQUENCE_REVERSE_COMPLEMENTED: u16 = 0x10;
pub const SEQUENCE_NEXT_SEGMENT_REVERSED: u16 = 0x20;
pub const FIRST_SEGMENT: u16 = 0x40;
pub const LAST_SEGMENT: u16 = 0x80;
pub const SECONDARY_ALIGNMENT: u16 = 0x100;
pub const NOT_PASSING_QC: u16 = 0x200;
pub const PCR_OR_OPTICAL_DUPLICATE: u16 = 0x400;
pub const SUPPLEMENTARY_ALIGNMENT: u16 = 0x800;

/// SAM FLAG 位掩码。
///
/// 底层仍是原始的 `u16`，写回文件时原样输出；各个位互相独立，
/// 设置或清除时不做合法性检查。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flags(u16);

impl Flags {
    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn contains(self, bit: u16) -> bool {
        self.0 & bit == bit
    }

    pub fn insert(&mut self, bit: u16) {
        self.0 |= bit;
    }

    pub fn remove(&mut self, bit: u16) {
        self.0 &= !bit;
    }

    pub fn is_paired(self) -> bool {
        self.contains(ALIGNMENT_MULTIPLE_SEGMENTS)
    }

    pub fn is_proper_pair(self) -> bool {
        self.contains(SEGMENTS_PROPERLY_ALIGNED)
    }

    pub fn is_unmapped(self) -> bool {
        self.contains(SEGMENT_UNMAPPED)
    }

    pub fn is_mate_unmapped(self) -> bool {
        self.contains(NEXT_SEGMENT_UNMAPPED)
    }

    pub fn is_reverse_complemented(self) -> bool {
        self.contains(SEQUENCE_REVERSE_COMPLEMENTED)
    }

    pub fn is_mate_reverse_complemented(self) -> bool {
        self.contains(SEQUENCE_NEXT_SEGMENT_REVERSED)
    }

    pub fn is_first_segment(self) -> bool {
        self.contains(FIRST_SEGMENT)
    }

    pub fn is_last_segment(self) -> bool {
        self.contains(LAST_SEGMENT)
    }

    pub fn is_secondary(self) -> bool {
        self.contains(SECONDARY_ALIGNMENT)
    }

    pub fn is_qc_fail(self) -> bool {
        self.contains(NOT_PASSING_QC)
    }

    pub fn is_duplicate(self) -> bool {
        self.contains(PCR_OR_OPTICAL_DUPLICATE)
    }

    pub fn is_supplementary(self) -> bool {
        self.contains(SUPPLEMENTARY_ALIGNMENT)
    }
}

impl From<u16> for Flags {
    fn from(bits: u16) -> Self {
        Self(bits)
    }
}

impl From<Flags> for u16 {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_bits() {
        let mut f = Flags::default();
        f.insert(ALIGNMENT_MULTIPLE_SEGMENTS | FIRST_SEGMENT);
        f.insert(SEQUENCE_REVERSE_COMPLEMENTED);
        assert_eq!(f.bits(), 0x51);
        assert!(f.is_paired());
        assert!(f.is_first_segment());
        assert!(f.is_reverse_complemented());
        assert!(!f.is_unmapped());

        f.remove(FIRST_SEGMENT);
        assert_eq!(f.bits(), 0x11);
        // 清除未设置的位不产生影响
        f.remove(SUPPLEMENTARY_ALIGNMENT);
        assert_eq!(f.bits(), 0x11);
    }

    #[test]
    fn unknown_bits_are_kept() {
        let f = Flags::from_bits(0x1004);
        assert!(f.is_unmapped());
        assert_eq!(u16::from(f), 0x1004);
    }
}
