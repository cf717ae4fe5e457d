use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::cigar::Cigar;
use super::codec;
use super::difference::AlignmentDifference;
use super::error::CodecError;
use super::flags::Flags;

/// 差异的排序键：先按 `pos`，同一位置上不消耗参考的差异（插入、剪切、填充）
/// 排在消耗参考的差异之前。
fn order_key(d: &AlignmentDifference) -> (usize, bool) {
    (d.pos(), d.op().consumes_reference())
}

/// 解析器提供的原始比对字段，用于构造 [`AlignmentRecord`]。
#[derive(Debug, Clone, Default)]
pub struct RawAlignment {
    pub name: String,
    pub reference_name: String,
    /// 1-based alignment start
    pub start: u64,
    pub mapping_quality: u8,
    pub cigar: Cigar,
    pub read_sequence: Option<Vec<u8>>,
    pub qualities: String,
    pub mate_reference_name: String,
    pub mate_alignment_start: u64,
    pub inferred_insert_size: i64,
    pub flags: u16,
    pub attributes: HashMap<String, String>,
    /// 可选字段的 SAM 类型字符（`A`/`i`/`f`/`Z`/`H`/`B`）
    pub attribute_types: HashMap<String, char>,
}

/// 一条 read 的比对记录。
///
/// 坐标均为 1-based 闭区间。`differences` 以比对起点为原点，按位置升序保存；
/// 记录独占差异列表与属性表，对外只提供只读视图。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub name: String,
    pub reference_name: String,
    pub start: u64,
    pub end: u64,
    pub unclipped_start: u64,
    pub unclipped_end: u64,
    /// read 碱基数（不含硬剪切）
    pub length: usize,
    pub mapping_quality: u8,
    /// 空串表示质量值缺失
    pub qualities: String,
    pub mate_reference_name: String,
    pub mate_alignment_start: u64,
    pub inferred_insert_size: i64,
    read_sequence: Option<Vec<u8>>,
    differences: Vec<AlignmentDifference>,
    attributes: HashMap<String, String>,
    attribute_types: HashMap<String, char>,
    flags: Flags,
    /// 构造时是否带有操作列表；为 `false` 且没有差异时 CIGAR 写作 `*`
    has_cigar: bool,
}

impl AlignmentRecord {
    /// Record without differences, mate information or attributes.
    pub fn new(name: &str, reference_name: &str, start: u64, end: u64, length: usize) -> Self {
        Self {
            name: name.to_string(),
            reference_name: reference_name.to_string(),
            start,
            end,
            unclipped_start: start,
            unclipped_end: end,
            length,
            mapping_quality: 255,
            qualities: String::new(),
            mate_reference_name: "*".to_string(),
            mate_alignment_start: 0,
            inferred_insert_size: 0,
            read_sequence: None,
            differences: Vec::new(),
            attributes: HashMap::new(),
            attribute_types: HashMap::new(),
            flags: Flags::default(),
            has_cigar: true,
        }
    }

    /// 由原始字段与参考序列构造记录：计算比对终点与未剪切坐标，
    /// 并用 CIGAR 推导差异列表。`reference[offset]` 对应比对起点。
    ///
    /// 未比对（FLAG 0x4）或 CIGAR 为空的记录不带差异。
    pub fn from_cigar(
        raw: RawAlignment,
        reference: &[u8],
        offset: usize,
        max_stored: usize,
    ) -> Result<Self, CodecError> {
        let flags = Flags::from_bits(raw.flags);
        let aligned = !flags.is_unmapped() && !raw.cigar.is_empty();

        let (end, unclipped_start, unclipped_end, length, differences) = if aligned {
            let ref_len = raw.cigar.reference_len() as u64;
            let end = (raw.start + ref_len).saturating_sub(1).max(raw.start);
            let differences = codec::differences_from_cigar(
                &raw.cigar,
                raw.read_sequence.as_deref(),
                reference,
                offset,
                max_stored,
            )?;
            (
                end,
                raw.start.saturating_sub(raw.cigar.leading_clip_len() as u64),
                end + raw.cigar.trailing_clip_len() as u64,
                raw.cigar.read_len(),
                differences,
            )
        } else {
            let length = raw.read_sequence.as_ref().map_or(raw.qualities.len(), Vec::len);
            (raw.start, raw.start, raw.start, length, Vec::new())
        };

        let record = Self {
            name: raw.name,
            reference_name: raw.reference_name,
            start: raw.start,
            end,
            unclipped_start,
            unclipped_end,
            length,
            mapping_quality: raw.mapping_quality,
            qualities: raw.qualities,
            mate_reference_name: raw.mate_reference_name,
            mate_alignment_start: raw.mate_alignment_start,
            inferred_insert_size: raw.inferred_insert_size,
            read_sequence: raw.read_sequence,
            differences,
            attributes: raw.attributes,
            attribute_types: raw.attribute_types,
            flags,
            has_cigar: aligned,
        };
        record.validate()?;
        Ok(record)
    }

    // ── 差异 ────────────────────────────────────────────

    pub fn differences(&self) -> &[AlignmentDifference] {
        &self.differences
    }

    /// Replaces the difference list; rejects lists that are not in ascending order.
    pub fn set_differences(&mut self, differences: Vec<AlignmentDifference>) -> Result<(), CodecError> {
        for w in differences.windows(2) {
            if order_key(&w[1]) < order_key(&w[0]) {
                return Err(CodecError::UnorderedDifferences { pos: w[1].pos(), previous: w[0].pos() });
            }
        }
        self.differences = differences;
        Ok(())
    }

    /// 插入一条差异并保持升序；位置相同的差异按加入顺序排列，
    /// 因此按升序依次加入等价于直接追加。
    pub fn add_difference(&mut self, d: AlignmentDifference) {
        let key = order_key(&d);
        let idx = self.differences.partition_point(|e| order_key(e) <= key);
        self.differences.insert(idx, d);
    }

    /// Removes the first difference at `pos`. Returns whether one was removed.
    pub fn remove_difference(&mut self, pos: usize) -> bool {
        match self.differences.iter().position(|d| d.pos() == pos) {
            Some(idx) => {
                self.differences.remove(idx);
                true
            }
            None => false,
        }
    }

    /// 用参考序列补全未完整保存碱基的差异：`seq = reference[pos+offset .. pos+offset+length)`。
    ///
    /// 遇到第一个越界的差异即停止并返回错误；此前已补全的差异保持补全状态，
    /// 调用方需要容忍部分补全。对同一参考重复调用结果不变。
    pub fn complete_differences(&mut self, reference: &[u8], offset: usize) -> Result<(), CodecError> {
        for d in self.differences.iter_mut() {
            if d.is_full_sequence_stored() {
                continue;
            }
            let start = d.pos() + offset;
            let end = start + d.length();
            if end > reference.len() {
                log::warn!(
                    "{}: reference slice [{}, {}) out of bounds (len {}), completion aborted",
                    self.name,
                    start,
                    end,
                    reference.len()
                );
                return Err(CodecError::OutOfBounds { start, end, len: reference.len() });
            }
            d.set_seq(Some(reference[start..end].to_vec()));
        }
        Ok(())
    }

    // ── 编解码 ──────────────────────────────────────────

    /// Regenerates the operation list from the differences. Records built from an
    /// unmapped read or a `*` CIGAR get `*` back while they carry no differences.
    pub fn cigar(&self) -> Result<Cigar, CodecError> {
        if !self.has_cigar && self.differences.is_empty() {
            return Ok(Cigar::new());
        }
        codec::cigar_from_differences(&self.differences, self.length)
    }

    /// 由差异与参考重建 read 序列，不修改记录。
    pub fn reconstruct_sequence(&self, reference: &[u8], offset: usize) -> Result<Vec<u8>, CodecError> {
        codec::sequence_from_differences(&self.differences, self.length, reference, offset)
    }

    /// 返回 read 序列；未保存时重建并保存。
    pub fn materialize_sequence(&mut self, reference: &[u8], offset: usize) -> Result<&[u8], CodecError> {
        if self.read_sequence.is_none() {
            let seq = self.reconstruct_sequence(reference, offset)?;
            self.read_sequence = Some(seq);
        }
        Ok(self.read_sequence.as_deref().unwrap_or_default())
    }

    /// 检查坐标与长度约束。未比对记录的坐标没有意义，不做检查。
    pub fn validate(&self) -> Result<(), CodecError> {
        if !self.flags.is_unmapped() {
            if self.start > self.end {
                return Err(CodecError::InvalidCoordinates(format!(
                    "start {} > end {}",
                    self.start, self.end
                )));
            }
            if self.unclipped_start > self.start || self.end > self.unclipped_end {
                return Err(CodecError::InvalidCoordinates(format!(
                    "unclipped [{}, {}] does not contain [{}, {}]",
                    self.unclipped_start, self.unclipped_end, self.start, self.end
                )));
            }
        }
        if !self.qualities.is_empty() && self.qualities.len() != self.length {
            return Err(CodecError::InconsistentLength { expected: self.length, actual: self.qualities.len() });
        }
        if let Some(seq) = &self.read_sequence {
            if seq.len() != self.length {
                return Err(CodecError::InconsistentLength { expected: self.length, actual: seq.len() });
            }
        }
        // read consumption of the differences must fit in `length`
        codec::cigar_from_differences(&self.differences, self.length)?;
        Ok(())
    }

    // ── 序列 ────────────────────────────────────────────

    pub fn read_sequence(&self) -> Option<&[u8]> {
        self.read_sequence.as_deref()
    }

    pub fn set_read_sequence(&mut self, seq: Option<Vec<u8>>) {
        self.read_sequence = seq;
    }

    // ── FLAG ────────────────────────────────────────────

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn set_flags(&mut self, bits: u16) {
        self.flags = Flags::from_bits(bits);
    }

    pub fn add_flag(&mut self, bit: u16) {
        self.flags.insert(bit);
    }

    pub fn remove_flag(&mut self, bit: u16) {
        self.flags.remove(bit);
    }

    // ── 属性 ────────────────────────────────────────────

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Replaces all attributes; their stored SAM types are dropped.
    pub fn set_attributes(&mut self, attributes: HashMap<String, String>) {
        self.attributes = attributes;
        self.attribute_types.clear();
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Parses an attribute value, e.g. `record.attribute_as::<i64>("NM")`.
    pub fn attribute_as<T: FromStr>(&self, key: &str) -> Option<T> {
        self.attributes.get(key).and_then(|v| v.parse().ok())
    }

    /// Inserts or overwrites an attribute. Returns whether a value was already present.
    ///
    /// 覆盖时原有的类型字符被丢弃，写出时按值推断。
    pub fn add_attribute(&mut self, key: &str, value: &str) -> bool {
        self.attribute_types.remove(key);
        self.attributes.insert(key.to_string(), value.to_string()).is_some()
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        self.attribute_types.remove(key);
        self.attributes.remove(key)
    }

    /// 解析时记录的 SAM 类型字符
    pub fn attribute_type(&self, key: &str) -> Option<char> {
        self.attribute_types.get(key).copied()
    }
}
