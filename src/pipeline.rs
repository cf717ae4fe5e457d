use anyhow::{anyhow, Result};
use rayon::prelude::*;
use std::io::Write;

use crate::alignment::{AlignmentRecord, Cigar, CodecOpt};
use crate::io::fasta::Reference;
use crate::io::lines::LineReader;
use crate::io::sam::parse_sam_line;
use crate::store::{AlignmentStore, PackedRecord, StoreMeta};

/// 批处理参数
#[derive(Clone, Copy, Debug)]
pub struct PipelineOpt {
    pub codec: CodecOpt,
    pub threads: usize,
    /// 每批读取的 SAM 行数
    pub batch_size: usize,
}

impl Default for PipelineOpt {
    fn default() -> Self {
        Self { codec: CodecOpt::default(), threads: 1, batch_size: 10_000 }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackStats {
    pub records: usize,
    /// 序列被丢弃、解包时重建的记录数
    pub derived: usize,
    pub skipped: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckStats {
    pub checked: usize,
    pub passed: usize,
    /// 每条失败记录一行说明
    pub failures: Vec<String>,
}

fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| anyhow!("cannot build thread pool: {}", e))?;
    log::debug!("thread pool with {} threads", pool.current_num_threads());
    Ok(pool)
}

fn open_output(out_path: Option<&str>) -> Result<Box<dyn Write>> {
    Ok(match out_path {
        Some(p) => {
            let fh = std::fs::File::create(p).map_err(|e| anyhow!("cannot create '{}': {}", p, e))?;
            Box::new(std::io::BufWriter::new(fh))
        }
        None => Box::new(std::io::BufWriter::new(std::io::stdout())),
    })
}

/// 分批读取 SAM，`convert` 在线程池中并行处理每条记录，`sink` 按输入顺序接收结果。
///
/// 返回 `@` 开头的头部行。
fn process_sam<T, F, S>(sam_path: &str, opt: &PipelineOpt, convert: F, mut sink: S) -> Result<Vec<String>>
where
    T: Send,
    F: Fn(&str) -> T + Sync + Send,
    S: FnMut(&str, T) -> Result<()>,
{
    let pool = build_pool(opt.threads)?;
    let mut reader = LineReader::open(sam_path)?;
    if let Ok(total) = reader.file_size() {
        let mut seen = 0u64;
        let mut next = 10u64;
        reader.set_progress_listener(move |n| {
            seen += n;
            if total == 0 {
                return;
            }
            let pct = seen * 100 / total;
            if pct >= next {
                log::info!("{}% of input read", pct.min(100));
                next = pct / 10 * 10 + 10;
            }
        });
    }

    let mut header = Vec::new();
    loop {
        let batch = reader.read_batch(opt.batch_size.max(1))?;
        if batch.is_empty() {
            break;
        }
        let mut lines: Vec<&str> = Vec::with_capacity(batch.len());
        for line in &batch {
            if line.starts_with('@') {
                header.push(line.clone());
            } else if !line.is_empty() {
                lines.push(line.as_str());
            }
        }
        let results: Vec<T> = pool.install(|| lines.par_iter().map(|l| convert(l)).collect());
        for (line, result) in lines.iter().zip(results) {
            sink(line, result)?;
        }
    }
    log::debug!("{}: {} lines read", sam_path, reader.lines_read());
    Ok(header)
}

fn record_name(line: &str) -> &str {
    line.split('\t').next().unwrap_or("")
}

/// SAM → 差异存储 `<out_prefix>.alnz`
pub fn pack_sam(sam_path: &str, reference_path: &str, out_prefix: &str, opt: PipelineOpt) -> Result<PackStats> {
    let reference = Reference::load(reference_path)?;
    let codec = opt.codec;

    let mut records = Vec::new();
    let mut stats = PackStats::default();
    let header = process_sam(
        sam_path,
        &opt,
        |line| {
            parse_sam_line(line, &reference, &codec).map(|rec| PackedRecord::pack(rec, &reference, &codec))
        },
        |line, result| {
            match result {
                Ok(packed) => records.push(packed),
                Err(e) => {
                    stats.skipped += 1;
                    log::warn!("skipping record '{}': {}", record_name(line), e);
                }
            }
            Ok(())
        },
    )?;

    let mut store = AlignmentStore::new(header);
    store.records = records;
    store.set_meta(StoreMeta {
        source_file: Some(sam_path.to_string()),
        reference_file: Some(reference_path.to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
        max_stored: codec.max_stored as u64,
        ..Default::default()
    });
    stats.records = store.len();
    stats.derived = store.derived_count();

    let out_path = format!("{}.alnz", out_prefix);
    store
        .save_to_file(&out_path)
        .map_err(|e| anyhow!("cannot write store to '{}': {}", out_path, e))?;
    log::info!(
        "packed {} records ({} sequences derived, {} skipped) into {}",
        stats.records,
        stats.derived,
        stats.skipped,
        out_path
    );
    Ok(stats)
}

/// 差异存储 → SAM，返回写出的记录数
pub fn unpack_store(store_path: &str, reference_path: &str, out_path: Option<&str>, opt: PipelineOpt) -> Result<usize> {
    let store = AlignmentStore::load_from_file(store_path)
        .map_err(|e| anyhow!("cannot load store '{}': {}", store_path, e))?;
    let reference = Reference::load(reference_path)?;
    if let Some(src) = &store.meta.reference_file {
        log::debug!("store was packed against {}", src);
    }

    let pool = build_pool(opt.threads)?;
    let mut out = open_output(out_path)?;
    for line in &store.header {
        writeln!(out, "{}", line)?;
    }
    for chunk in store.records.chunks(opt.batch_size.max(1)) {
        let lines: Vec<Result<String>> = pool.install(|| chunk.par_iter().map(|p| p.to_sam_line(&reference)).collect());
        for line in lines {
            writeln!(out, "{}", line?)?;
        }
    }
    out.flush()?;
    log::info!("unpacked {} records from {}", store.len(), store_path);
    Ok(store.len())
}

/// 检查单条记录：重新生成的 CIGAR 等于规范化后的输入 CIGAR，
/// 由差异重建的序列等于输入序列。
pub fn check_line(line: &str, reference: &Reference, opt: &CodecOpt) -> Result<()> {
    let record = parse_sam_line(line, reference, opt)?;
    if record.flags().is_unmapped() {
        return Ok(());
    }
    let original: Cigar = line
        .split('\t')
        .nth(5)
        .ok_or_else(|| anyhow!("missing CIGAR column"))?
        .parse()?;
    if original.is_empty() {
        return Ok(());
    }

    let regenerated = record.cigar()?;
    if regenerated != original.normalized() {
        anyhow::bail!("CIGAR {} regenerated as {}", original, regenerated);
    }
    if let Some(seq) = record.read_sequence() {
        let contig = reference
            .get(&record.reference_name)
            .ok_or_else(|| anyhow!("reference sequence '{}' not found", record.reference_name))?;
        let rebuilt = record.reconstruct_sequence(contig, record.start.saturating_sub(1) as usize)?;
        if !rebuilt.eq_ignore_ascii_case(seq) {
            anyhow::bail!(
                "sequence {} rebuilt as {}",
                String::from_utf8_lossy(seq),
                String::from_utf8_lossy(&rebuilt)
            );
        }
    }
    Ok(())
}

pub fn check_sam(sam_path: &str, reference_path: &str, opt: PipelineOpt) -> Result<CheckStats> {
    let reference = Reference::load(reference_path)?;
    let codec = opt.codec;
    let mut stats = CheckStats::default();
    process_sam(
        sam_path,
        &opt,
        |line| check_line(line, &reference, &codec),
        |line, result| {
            stats.checked += 1;
            match result {
                Ok(()) => stats.passed += 1,
                Err(e) => stats.failures.push(format!("{}: {}", record_name(line), e)),
            }
            Ok(())
        },
    )?;
    log::info!("{} of {} records passed", stats.passed, stats.checked);
    Ok(stats)
}

/// 差异列表的文本形式：`name  CIGAR  diff;diff;...`，无差异时第三列为 `*`
pub fn describe_record(record: &AlignmentRecord) -> Result<String> {
    let cigar = record.cigar().map_err(|e| anyhow!("{}: {}", record.name, e))?;
    let diffs = if record.differences().is_empty() {
        "*".to_string()
    } else {
        record
            .differences()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    };
    Ok(format!("{}\t{}\t{}", record.name, cigar, diffs))
}

/// 输出每条记录的差异列表；`complete` 时先用参考补全差异碱基。
pub fn diff_sam(
    sam_path: &str,
    reference_path: &str,
    out_path: Option<&str>,
    complete: bool,
    opt: PipelineOpt,
) -> Result<usize> {
    let reference = Reference::load(reference_path)?;
    let codec = opt.codec;
    let mut out = open_output(out_path)?;
    let mut written = 0usize;

    process_sam(
        sam_path,
        &opt,
        |line| {
            let mut record = parse_sam_line(line, &reference, &codec)?;
            if complete && !record.differences().is_empty() {
                if let Some(contig) = reference.get(&record.reference_name) {
                    let offset = record.start.saturating_sub(1) as usize;
                    // 越界时保留已补全的部分
                    if let Err(e) = record.complete_differences(contig, offset) {
                        log::debug!("{}: partial completion ({})", record.name, e);
                    }
                }
            }
            describe_record(&record)
        },
        |line, result| {
            match result {
                Ok(text) => {
                    writeln!(out, "{}", text)?;
                    written += 1;
                }
                Err(e) => log::warn!("skipping record '{}': {}", record_name(line), e),
            }
            Ok(())
        },
    )?;
    out.flush()?;
    Ok(written)
}
