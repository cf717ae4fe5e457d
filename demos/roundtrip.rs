//! 演示如何在 library 模式下使用 alnkit 的差异编解码。
//!
//! 运行方式：
//! ```bash
//! cargo run --example roundtrip
//! ```

use alnkit::alignment::{AlignmentRecord, CodecOpt, DiffOp, RawAlignment, STORE_ALL};
use alnkit::io::fasta::Reference;
use alnkit::io::sam::{format_sam_line, parse_sam_line};

fn main() -> anyhow::Result<()> {
    // 1. 参考序列
    let mut reference = Reference::default();
    reference.insert("chr1".to_string(), b"TTTTACGTACGTACGTAAAA".to_vec());
    let contig = reference.window("chr1", 0, 20)?;
    println!("参考序列: {}", String::from_utf8_lossy(contig));

    // 2. 由 CIGAR 推导差异
    let raw = RawAlignment {
        name: "read1".to_string(),
        reference_name: "chr1".to_string(),
        start: 5,
        mapping_quality: 60,
        cigar: "2S4M2I4M".parse()?,
        read_sequence: Some(b"GGACCTTTACGT".to_vec()),
        ..Default::default()
    };
    let mut record = AlignmentRecord::from_cigar(raw, contig, 4, STORE_ALL)?;
    println!("比对区间: {}-{} (未剪切 {}-{})", record.start, record.end, record.unclipped_start, record.unclipped_end);
    for d in record.differences() {
        println!("  差异 {}", d);
    }

    // 3. 丢弃 read 序列后由差异重建
    record.set_read_sequence(None);
    println!("CIGAR: {}", record.cigar()?);
    let rebuilt = record.reconstruct_sequence(contig, 4)?;
    println!("重建序列: {}", String::from_utf8_lossy(&rebuilt));

    let insertions = record.differences().iter().filter(|d| d.op() == DiffOp::Insertion).count();
    println!("插入: {}", insertions);

    // 4. SAM 行往返
    let line = "read2\t0\tchr1\t5\t60\t3M1D4M\t*\t0\t0\tACGACGT\t*\tNM:i:1";
    let rec = parse_sam_line(line, &reference, &CodecOpt::default())?;
    println!("SAM: {}", format_sam_line(&rec, None)?);
    Ok(())
}
