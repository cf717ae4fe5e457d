//! CIGAR ⇄ 差异列表 ⇄ read 序列 的双向转换。
//!
//! 所有函数都以比对起点为原点的参考窗口坐标工作：差异的 `pos` 加上
//! `offset` 即为其在 `reference` 缓冲区中的下标。

use super::cigar::{Cigar, CigarOp};
use super::difference::{AlignmentDifference, DiffOp};
use super::error::CodecError;

/// `max_stored` 取该值时保存所有碱基
pub const STORE_ALL: usize = usize::MAX;

fn check_bounds(start: usize, end: usize, len: usize) -> Result<(), CodecError> {
    if start > end || end > len {
        return Err(CodecError::OutOfBounds { start, end, len });
    }
    Ok(())
}

/// Returns `reference[start..start + n]` or an out-of-bounds error.
fn reference_slice(reference: &[u8], start: usize, n: usize) -> Result<&[u8], CodecError> {
    let end = start.saturating_add(n);
    check_bounds(start, end, reference.len())?;
    Ok(&reference[start..end])
}

/// 按上限截取需要保存的碱基；上限为 0 时不保存
fn stored_prefix(bases: &[u8], max_stored: usize) -> Option<Vec<u8>> {
    if max_stored == 0 {
        return None;
    }
    Some(bases[..bases.len().min(max_stored)].to_vec())
}

/// Records each run of consecutive mismatching bases as one `Mismatch`.
fn push_mismatches(
    diffs: &mut Vec<AlignmentDifference>,
    read: &[u8],
    reference: &[u8],
    ref_pos: usize,
    max_stored: usize,
) {
    let n = read.len();
    let mut i = 0usize;
    while i < n {
        if read[i].eq_ignore_ascii_case(&reference[i]) {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < n && !read[i].eq_ignore_ascii_case(&reference[i]) {
            i += 1;
        }
        diffs.push(AlignmentDifference::new(
            ref_pos + run_start,
            DiffOp::Mismatch,
            stored_prefix(&read[run_start..i], max_stored),
            i - run_start,
        ));
    }
}

/// 由 CIGAR 推导差异列表。
///
/// - `read`：read 碱基，`None` 表示序列不可用（SAM 中的 `*`），此时无法识别错配，
///   插入与软剪切只记录长度；
/// - `reference` / `offset`：比对起点对应 `reference[offset]`；
/// - `max_stored`：每条差异最多保存的碱基数，超出部分只保留 `length`。
///
/// 返回的差异按 `pos` 升序排列。
pub fn differences_from_cigar(
    cigar: &Cigar,
    read: Option<&[u8]>,
    reference: &[u8],
    offset: usize,
    max_stored: usize,
) -> Result<Vec<AlignmentDifference>, CodecError> {
    if let Some(read) = read {
        let expected = cigar.read_len();
        if read.len() != expected {
            return Err(CodecError::InconsistentLength { expected, actual: read.len() });
        }
    }
    let window = reference_slice(reference, offset, cigar.reference_len())?;

    let mut diffs = Vec::new();
    let mut ref_pos = 0usize;
    let mut read_pos = 0usize;

    for e in cigar {
        let len = e.len as usize;
        match e.op {
            CigarOp::Match | CigarOp::SeqMatch | CigarOp::SeqMismatch => {
                if let Some(read) = read {
                    push_mismatches(
                        &mut diffs,
                        &read[read_pos..read_pos + len],
                        &window[ref_pos..ref_pos + len],
                        ref_pos,
                        max_stored,
                    );
                }
                ref_pos += len;
                read_pos += len;
            }
            CigarOp::Insertion | CigarOp::SoftClip => {
                let op = if e.op == CigarOp::Insertion { DiffOp::Insertion } else { DiffOp::SoftClip };
                let seq = read.and_then(|r| stored_prefix(&r[read_pos..read_pos + len], max_stored));
                diffs.push(AlignmentDifference::new(ref_pos, op, seq, len));
                read_pos += len;
            }
            CigarOp::Deletion => {
                let seq = stored_prefix(&window[ref_pos..ref_pos + len], max_stored);
                diffs.push(AlignmentDifference::new(ref_pos, DiffOp::Deletion, seq, len));
                ref_pos += len;
            }
            CigarOp::Skip => {
                // 内含子等跳过区域可能很长，不保存参考碱基
                diffs.push(AlignmentDifference::with_length(ref_pos, DiffOp::SkippedRegion, len));
                ref_pos += len;
            }
            CigarOp::HardClip => {
                diffs.push(AlignmentDifference::with_length(ref_pos, DiffOp::HardClip, len));
            }
            CigarOp::Padding => {
                diffs.push(AlignmentDifference::with_length(ref_pos, DiffOp::Padding, len));
            }
        }
    }

    Ok(diffs)
}

/// 由差异列表重建 CIGAR。
///
/// 差异之间未被覆盖的区域以及最后一条差异之后剩余的 read 碱基都写作 `M`，
/// 相邻的同类操作会被合并。`length` 是 read 的碱基数（不含硬剪切）。
pub fn cigar_from_differences(
    diffs: &[AlignmentDifference],
    length: usize,
) -> Result<Cigar, CodecError> {
    let mut cigar = Cigar::new();
    let mut ref_pos = 0usize;
    let mut read_pos = 0usize;

    for d in diffs {
        if d.pos() < ref_pos {
            return Err(CodecError::UnorderedDifferences { pos: d.pos(), previous: ref_pos });
        }
        let gap = d.pos() - ref_pos;
        cigar.push_span(gap, CigarOp::Match);
        ref_pos += gap;
        read_pos += gap;

        let op = d.op();
        cigar.push_span(d.length(), op.cigar_op());
        if op.consumes_reference() {
            ref_pos += d.length();
        }
        if op.consumes_read() {
            read_pos += d.length();
        }
    }

    if read_pos > length {
        return Err(CodecError::InconsistentLength { expected: length, actual: read_pos });
    }
    cigar.push_span(length - read_pos, CigarOp::Match);
    Ok(cigar)
}

/// 由差异列表与参考序列重建完整的 read 序列。
///
/// 插入、错配、软剪切的碱基取自差异自身保存的 `seq`（必须完整保存），
/// 其余区域逐字复制参考。任何越界访问都以 [`CodecError::OutOfBounds`] 报告，
/// 此时不返回部分结果。
pub fn sequence_from_differences(
    diffs: &[AlignmentDifference],
    length: usize,
    reference: &[u8],
    offset: usize,
) -> Result<Vec<u8>, CodecError> {
    let mut seq: Vec<u8> = Vec::with_capacity(length);
    let mut ref_pos = 0usize;

    for d in diffs {
        if d.pos() < ref_pos {
            return Err(CodecError::UnorderedDifferences { pos: d.pos(), previous: ref_pos });
        }
        let gap = d.pos() - ref_pos;
        seq.extend_from_slice(reference_slice(reference, offset + ref_pos, gap)?);
        ref_pos = d.pos();

        match d.op() {
            DiffOp::Insertion | DiffOp::SoftClip | DiffOp::Mismatch => {
                let bases = d
                    .full_seq()
                    .ok_or(CodecError::MissingSequence { pos: d.pos(), op: d.op() })?;
                seq.extend_from_slice(bases);
                if d.op() == DiffOp::Mismatch {
                    // the mismatch still has to fit the reference window
                    reference_slice(reference, offset + ref_pos, d.length())?;
                    ref_pos += d.length();
                }
            }
            DiffOp::Deletion | DiffOp::SkippedRegion => {
                reference_slice(reference, offset + ref_pos, d.length())?;
                ref_pos += d.length();
            }
            DiffOp::HardClip | DiffOp::Padding => {}
        }
    }

    if seq.len() > length {
        return Err(CodecError::InconsistentLength { expected: length, actual: seq.len() });
    }
    let rest = length - seq.len();
    seq.extend_from_slice(reference_slice(reference, offset + ref_pos, rest)?);
    Ok(seq)
}
