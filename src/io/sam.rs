use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::fmt::Write as _;

use super::fasta::Reference;
use crate::alignment::{AlignmentRecord, Cigar, CodecOpt, Flags, RawAlignment};

/// 解析一行 SAM 记录并用参考序列推导差异列表。
///
/// 比对上的 read 以整条 contig 作为参考缓冲区，`offset = POS - 1`；
/// 可选字段保存为 `TAG → 值`（不含类型）。
pub fn parse_sam_line(line: &str, reference: &Reference, opt: &CodecOpt) -> Result<AlignmentRecord> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 11 {
        bail!("SAM line has {} columns, expected at least 11", fields.len());
    }
    let name = fields[0];
    let parse_err = |col: &str, value: &str| anyhow!("{}: invalid {} '{}'", name, col, value);

    let flags: u16 = fields[1].parse().map_err(|_| parse_err("FLAG", fields[1]))?;
    let start: u64 = fields[3].parse().map_err(|_| parse_err("POS", fields[3]))?;
    let mapping_quality: u8 = fields[4].parse().map_err(|_| parse_err("MAPQ", fields[4]))?;
    let cigar: Cigar = fields[5].parse().map_err(|e| anyhow!("{}: {}", name, e))?;
    let mate_alignment_start: u64 = fields[7].parse().map_err(|_| parse_err("PNEXT", fields[7]))?;
    let inferred_insert_size: i64 = fields[8].parse().map_err(|_| parse_err("TLEN", fields[8]))?;
    let read_sequence = match fields[9] {
        "*" => None,
        s => Some(s.as_bytes().to_vec()),
    };
    let qualities = match fields[10] {
        "*" => String::new(),
        q => q.to_string(),
    };

    let mut attributes = HashMap::new();
    let mut attribute_types = HashMap::new();
    for tag in &fields[11..] {
        let mut parts = tag.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(ty), Some(value)) if key.len() == 2 && is_tag_type(ty) => {
                attributes.insert(key.to_string(), value.to_string());
                attribute_types.insert(key.to_string(), ty.chars().next().unwrap_or('Z'));
            }
            _ => bail!("{}: malformed optional field '{}'", name, tag),
        }
    }

    let raw = RawAlignment {
        name: name.to_string(),
        reference_name: fields[2].to_string(),
        start,
        mapping_quality,
        cigar,
        read_sequence,
        qualities,
        mate_reference_name: fields[6].to_string(),
        mate_alignment_start,
        inferred_insert_size,
        flags,
        attributes,
        attribute_types,
    };

    let aligned = !Flags::from_bits(flags).is_unmapped() && !raw.cigar.is_empty();
    let record = if aligned {
        if start == 0 {
            bail!("{}: mapped read with POS 0", name);
        }
        let contig = reference
            .get(&raw.reference_name)
            .ok_or_else(|| anyhow!("{}: reference sequence '{}' not found", name, raw.reference_name))?;
        AlignmentRecord::from_cigar(raw, contig, (start - 1) as usize, opt.max_stored)
    } else {
        AlignmentRecord::from_cigar(raw, &[], 0, opt.max_stored)
    };
    record.map_err(|e| anyhow!("{}: {}", name, e))
}

fn is_tag_type(ty: &str) -> bool {
    matches!(ty, "A" | "i" | "f" | "Z" | "H" | "B")
}

/// 没有记录类型的属性（如 `add_attribute` 加入的）按值推断：整数写作 `i`，带小数点的数值写作 `f`，其余写作 `Z`
fn tag_type(value: &str) -> char {
    if value.parse::<i64>().is_ok() {
        'i'
    } else if value.contains('.') && value.parse::<f64>().is_ok() {
        'f'
    } else {
        'Z'
    }
}

/// 把记录格式化为一行 SAM（不含换行）。
///
/// CIGAR 总是由差异列表重新生成。read 序列优先使用记录中保存的序列；
/// 未保存时，若提供了参考则由差异重建，否则写作 `*`。
/// 可选字段按标签名排序输出，类型字符沿用解析时记录的类型。
pub fn format_sam_line(record: &AlignmentRecord, reference: Option<&Reference>) -> Result<String> {
    let cigar = record.cigar().map_err(|e| anyhow!("{}: {}", record.name, e))?;

    let rebuilt;
    let seq: &[u8] = match (record.read_sequence(), reference) {
        (Some(seq), _) => seq,
        (None, Some(reference)) if !cigar.is_empty() => {
            let contig = reference.get(&record.reference_name).ok_or_else(|| {
                anyhow!("{}: reference sequence '{}' not found", record.name, record.reference_name)
            })?;
            let offset = record.start.saturating_sub(1) as usize;
            rebuilt = record
                .reconstruct_sequence(contig, offset)
                .map_err(|e| anyhow!("{}: {}", record.name, e))?;
            &rebuilt
        }
        _ => b"*",
    };

    let mut line = String::new();
    let _ = write!(
        line,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        record.name,
        record.flags().bits(),
        if record.reference_name.is_empty() { "*" } else { record.reference_name.as_str() },
        record.start,
        record.mapping_quality,
        cigar,
        if record.mate_reference_name.is_empty() { "*" } else { record.mate_reference_name.as_str() },
        record.mate_alignment_start,
        record.inferred_insert_size,
        String::from_utf8_lossy(seq),
        if record.qualities.is_empty() { "*" } else { record.qualities.as_str() },
    );

    let mut tags: Vec<(&String, &String)> = record.attributes().iter().collect();
    tags.sort();
    for (key, value) in tags {
        let ty = record.attribute_type(key).unwrap_or_else(|| tag_type(value));
        let _ = write!(line, "\t{}:{}:{}", key, ty, value);
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::DiffOp;

    fn reference() -> Reference {
        let mut r = Reference::default();
        r.insert("chr1".to_string(), b"TTTTACGTACGTACGTAAAA".to_vec());
        r
    }

    #[test]
    fn parse_mapped_line() {
        let line = "read1\t0\tchr1\t5\t60\t2S4M2I4M\t*\t0\t0\tGGACCTXXACGT\tIIIIIIIIIIII\tNM:i:3\tRG:Z:grp1";
        let rec = parse_sam_line(line, &reference(), &CodecOpt::default()).unwrap();
        assert_eq!(rec.name, "read1");
        assert_eq!(rec.start, 5);
        assert_eq!(rec.end, 12);
        assert_eq!(rec.unclipped_start, 3);
        assert_eq!(rec.length, 12);
        assert_eq!(rec.mapping_quality, 60);
        assert_eq!(rec.attribute_as::<i64>("NM"), Some(3));
        assert_eq!(rec.attribute("RG"), Some("grp1"));

        let ops: Vec<(usize, DiffOp)> = rec.differences().iter().map(|d| (d.pos(), d.op())).collect();
        assert_eq!(
            ops,
            vec![(0, DiffOp::SoftClip), (2, DiffOp::Mismatch), (4, DiffOp::Insertion)]
        );
    }

    #[test]
    fn format_round_trips_line() {
        let line = "read1\t16\tchr1\t5\t60\t2S4M2I4M\t=\t40\t-35\tGGACCTXXACGT\tIIIIIIIIIIII\tNM:i:3\tRG:Z:grp1";
        let r = reference();
        let mut rec = parse_sam_line(line, &r, &CodecOpt::default()).unwrap();
        assert_eq!(format_sam_line(&rec, None).unwrap(), line);

        // 去掉 read 序列后由差异重建
        rec.set_read_sequence(None);
        assert_eq!(format_sam_line(&rec, Some(&r)).unwrap(), line);
    }

    #[test]
    fn unmapped_line() {
        let line = "read2\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t*";
        let rec = parse_sam_line(line, &reference(), &CodecOpt::default()).unwrap();
        assert!(rec.flags().is_unmapped());
        assert!(rec.differences().is_empty());
        assert_eq!(rec.length, 4);
        assert_eq!(format_sam_line(&rec, None).unwrap(), line);
    }

    #[test]
    fn missing_sequence_is_written_as_star() {
        let line = "read3\t0\tchr1\t5\t60\t4M\t*\t0\t0\t*\t*";
        let rec = parse_sam_line(line, &reference(), &CodecOpt::default()).unwrap();
        assert!(rec.read_sequence().is_none());
        assert_eq!(format_sam_line(&rec, None).unwrap(), line);
    }

    #[test]
    fn star_cigar_on_mapped_read_survives_pack() {
        use crate::store::{PackedRecord, SequenceState};

        let r = reference();
        let opt = CodecOpt::default();
        // 第二条的序列恰好与参考相同，仍不能被丢弃
        for line in [
            "r2\t0\tchr1\t5\t60\t*\t*\t0\t0\tGGGG\t*",
            "r3\t0\tchr1\t5\t60\t*\t*\t0\t0\tACGT\t*",
        ] {
            let rec = parse_sam_line(line, &r, &opt).unwrap();
            assert_eq!(format_sam_line(&rec, None).unwrap(), line);
            let packed = PackedRecord::pack(rec, &r, &opt);
            assert_eq!(packed.sequence, SequenceState::Stored);
            assert_eq!(packed.to_sam_line(&r).unwrap(), line);
        }
    }

    #[test]
    fn tag_types_are_kept() {
        let line = "read1\t0\tchr1\t5\t60\t4M\t*\t0\t0\tACGT\t*\tRG:Z:1\tXF:f:1.5\tXH:H:1AE3\tXS:i:5\tXT:A:U\tZB:B:c,1,-2";
        let r = reference();
        let mut rec = parse_sam_line(line, &r, &CodecOpt::default()).unwrap();
        assert_eq!(rec.attribute("ZB"), Some("c,1,-2"));
        assert_eq!(rec.attribute_type("XT"), Some('A'));
        assert_eq!(format_sam_line(&rec, None).unwrap(), line);

        // 新加入的属性按值推断类型
        rec.add_attribute("NM", "0");
        rec.add_attribute("RG", "grp2");
        let out = format_sam_line(&rec, None).unwrap();
        assert!(out.contains("\tNM:i:0\t"));
        assert!(out.contains("\tRG:Z:grp2\t"));
        assert!(out.ends_with("\tXT:A:U\tZB:B:c,1,-2"));
    }

    #[test]
    fn unknown_tag_type_is_rejected() {
        let line = "r\t0\tchr1\t5\t60\t4M\t*\t0\t0\tACGT\t*\tXX:Q:1";
        assert!(parse_sam_line(line, &reference(), &CodecOpt::default()).is_err());
    }

    #[test]
    fn parse_errors() {
        let r = reference();
        let opt = CodecOpt::default();
        assert!(parse_sam_line("too\tfew", &r, &opt).is_err());
        assert!(parse_sam_line("r\tx\tchr1\t5\t60\t4M\t*\t0\t0\tACGT\t*", &r, &opt).is_err());
        assert!(parse_sam_line("r\t0\tchrX\t5\t60\t4M\t*\t0\t0\tACGT\t*", &r, &opt).is_err());
        assert!(parse_sam_line("r\t0\tchr1\t5\t60\t4M\t*\t0\t0\tACG\t*", &r, &opt).is_err());
        assert!(parse_sam_line("r\t0\tchr1\t19\t60\t4M\t*\t0\t0\tACGT\t*", &r, &opt).is_err());
        assert!(parse_sam_line("r\t0\tchr1\t5\t60\t4M\t*\t0\t0\tACGT\t*\tbad", &r, &opt).is_err());
    }

    #[test]
    fn tag_types() {
        assert_eq!(tag_type("12"), 'i');
        assert_eq!(tag_type("-3"), 'i');
        assert_eq!(tag_type("0.5"), 'f');
        assert_eq!(tag_type("grp1"), 'Z');
        assert_eq!(tag_type("1e5"), 'Z');
    }
}
