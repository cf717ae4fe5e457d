use std::fmt::{self, Write as _};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::CodecError;

/// CIGAR 操作码（SAM 规范中的 `MIDNSHP=X`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CigarOp {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Padding,
    SeqMatch,
    SeqMismatch,
}

impl CigarOp {
    pub fn from_char(c: char) -> Option<Self> {
        let op = match c {
            'M' => CigarOp::Match,
            'I' => CigarOp::Insertion,
            'D' => CigarOp::Deletion,
            'N' => CigarOp::Skip,
            'S' => CigarOp::SoftClip,
            'H' => CigarOp::HardClip,
            'P' => CigarOp::Padding,
            '=' => CigarOp::SeqMatch,
            'X' => CigarOp::SeqMismatch,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_char(self) -> char {
        match self {
            CigarOp::Match => 'M',
            CigarOp::Insertion => 'I',
            CigarOp::Deletion => 'D',
            CigarOp::Skip => 'N',
            CigarOp::SoftClip => 'S',
            CigarOp::HardClip => 'H',
            CigarOp::Padding => 'P',
            CigarOp::SeqMatch => '=',
            CigarOp::SeqMismatch => 'X',
        }
    }

    #[inline]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarOp::Match | CigarOp::Deletion | CigarOp::Skip | CigarOp::SeqMatch | CigarOp::SeqMismatch
        )
    }

    #[inline]
    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            CigarOp::Match | CigarOp::Insertion | CigarOp::SoftClip | CigarOp::SeqMatch | CigarOp::SeqMismatch
        )
    }

    /// `=` 与 `X` 都归并为 `M`
    #[inline]
    pub fn normalized(self) -> Self {
        match self {
            CigarOp::SeqMatch | CigarOp::SeqMismatch => CigarOp::Match,
            op => op,
        }
    }

    #[inline]
    pub fn is_clip(self) -> bool {
        matches!(self, CigarOp::SoftClip | CigarOp::HardClip)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CigarElement {
    pub len: u32,
    pub op: CigarOp,
}

impl CigarElement {
    pub fn new(len: u32, op: CigarOp) -> Self {
        Self { len, op }
    }
}

/// 游程编码的操作序列。
///
/// `push` 会把相邻的同类操作合并，因此由差异列表生成的 CIGAR
/// 与常规编码逐字节一致。空 CIGAR 在文本形式中写作 `*`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cigar(Vec<CigarElement>);

impl Cigar {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an element, merging it into the last one when the op matches.
    /// Zero-length elements are dropped. A merge that would overflow `u32`
    /// fills the last element up to `u32::MAX` and starts a new one with the rest.
    pub fn push(&mut self, mut len: u32, op: CigarOp) {
        if len == 0 {
            return;
        }
        if let Some(last) = self.0.last_mut() {
            if last.op == op {
                match last.len.checked_add(len) {
                    Some(sum) => {
                        last.len = sum;
                        return;
                    }
                    None => {
                        len -= u32::MAX - last.len;
                        last.len = u32::MAX;
                    }
                }
            }
        }
        self.0.push(CigarElement::new(len, op));
    }

    /// 追加任意长度的操作，超过 `u32::MAX` 的部分拆成多段
    pub fn push_span(&mut self, mut len: usize, op: CigarOp) {
        while len > 0 {
            let n = len.min(u32::MAX as usize);
            self.push(n as u32, op);
            len -= n;
        }
    }

    pub fn elements(&self) -> &[CigarElement] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CigarElement> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 消耗的 read 碱基数（M/I/S/=/X）
    pub fn read_len(&self) -> usize {
        self.0
            .iter()
            .filter(|e| e.op.consumes_read())
            .map(|e| e.len as usize)
            .sum()
    }

    /// 消耗的参考碱基数（M/D/N/=/X）
    pub fn reference_len(&self) -> usize {
        self.0
            .iter()
            .filter(|e| e.op.consumes_reference())
            .map(|e| e.len as usize)
            .sum()
    }

    /// Total length of the clip ops (S and H) before the first aligned op.
    pub fn leading_clip_len(&self) -> usize {
        self.0
            .iter()
            .take_while(|e| e.op.is_clip())
            .map(|e| e.len as usize)
            .sum()
    }

    pub fn trailing_clip_len(&self) -> usize {
        self.0
            .iter()
            .rev()
            .take_while(|e| e.op.is_clip())
            .map(|e| e.len as usize)
            .sum()
    }

    /// 将 `=`/`X` 改写为 `M` 并重新合并相邻操作
    pub fn normalized(&self) -> Cigar {
        let mut out = Cigar::new();
        for e in &self.0 {
            out.push(e.len, e.op.normalized());
        }
        out
    }
}

impl FromStr for Cigar {
    type Err = CodecError;

    /// 解析 CIGAR 文本。缺少长度、未知操作码或末尾残留数字都会报错；
    /// `*` 与空串解析为空 CIGAR。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut elements = Vec::new();
        if s.is_empty() || s == "*" {
            return Ok(Cigar(elements));
        }
        let mut num: Option<u32> = None;
        for ch in s.chars() {
            if let Some(d) = ch.to_digit(10) {
                let cur = num.unwrap_or(0);
                let next = cur
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(d))
                    .ok_or_else(|| CodecError::InvalidCigar(format!("length overflow in '{}'", s)))?;
                num = Some(next);
            } else {
                let op = CigarOp::from_char(ch)
                    .ok_or_else(|| CodecError::InvalidCigar(format!("unknown op '{}' in '{}'", ch, s)))?;
                let len = num.take().ok_or_else(|| {
                    CodecError::InvalidCigar(format!("op '{}' without length in '{}'", ch, s))
                })?;
                // 保留原始的分段，不做合并
                elements.push(CigarElement::new(len, op));
            }
        }
        if num.is_some() {
            return Err(CodecError::InvalidCigar(format!("trailing length without op in '{}'", s)));
        }
        Ok(Cigar(elements))
    }
}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_char('*');
        }
        for e in &self.0 {
            write!(f, "{}{}", e.len, e.op.as_char())?;
        }
        Ok(())
    }
}

impl FromIterator<CigarElement> for Cigar {
    fn from_iter<T: IntoIterator<Item = CigarElement>>(iter: T) -> Self {
        let mut out = Cigar::new();
        for e in iter {
            out.push(e.len, e.op);
        }
        out
    }
}

impl<'a> IntoIterator for &'a Cigar {
    type Item = &'a CigarElement;
    type IntoIter = std::slice::Iter<'a, CigarElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let c: Cigar = "3S4M2I1D5M2H".parse().unwrap();
        assert_eq!(c.len(), 6);
        assert_eq!(c.elements()[0], CigarElement::new(3, CigarOp::SoftClip));
        assert_eq!(c.elements()[5], CigarElement::new(2, CigarOp::HardClip));
        assert_eq!(c.to_string(), "3S4M2I1D5M2H");
    }

    #[test]
    fn parse_star_is_empty() {
        let c: Cigar = "*".parse().unwrap();
        assert!(c.is_empty());
        assert_eq!(c.to_string(), "*");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("4Q".parse::<Cigar>().is_err());
        assert!("M".parse::<Cigar>().is_err());
        assert!("4M3".parse::<Cigar>().is_err());
        assert!("99999999999M".parse::<Cigar>().is_err());
    }

    #[test]
    fn push_merges_adjacent_ops() {
        let mut c = Cigar::new();
        c.push(2, CigarOp::Match);
        c.push(3, CigarOp::Match);
        c.push(0, CigarOp::Insertion);
        c.push(1, CigarOp::Deletion);
        c.push(4, CigarOp::Match);
        assert_eq!(c.to_string(), "5M1D4M");
    }

    #[test]
    fn push_does_not_overflow_element_length() {
        let c: Cigar = "4294967295M1M".parse().unwrap();
        let n = c.normalized();
        assert_eq!(n.len(), 2);
        assert_eq!(n.elements()[0], CigarElement::new(u32::MAX, CigarOp::Match));
        assert_eq!(n.elements()[1], CigarElement::new(1, CigarOp::Match));
        assert_eq!(n.read_len(), u32::MAX as usize + 1);

        let mut c = Cigar::new();
        c.push(3, CigarOp::Deletion);
        c.push_span(u32::MAX as usize + 5, CigarOp::Deletion);
        assert_eq!(c.reference_len(), u32::MAX as usize + 8);
        assert_eq!(c.to_string(), "4294967295D8D");
    }

    #[test]
    fn consumption_totals() {
        let c: Cigar = "2S3M1I2D4=1X3N2H".parse().unwrap();
        assert_eq!(c.read_len(), 2 + 3 + 1 + 4 + 1);
        assert_eq!(c.reference_len(), 3 + 2 + 4 + 1 + 3);
        assert_eq!(c.leading_clip_len(), 2);
        assert_eq!(c.trailing_clip_len(), 2);
    }

    #[test]
    fn normalized_folds_sequence_match_ops() {
        let c: Cigar = "3=1X2=1I4M".parse().unwrap();
        assert_eq!(c.normalized().to_string(), "6M1I4M");
    }
}
