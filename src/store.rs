use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::alignment::{AlignmentRecord, CodecOpt};
use crate::io::fasta::Reference;
use crate::io::sam::format_sam_line;

pub const STORE_VERSION: u32 = 2;

/// 存储文件的元信息
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StoreMeta {
    pub version: u32,
    pub source_file: Option<String>,
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
    /// 打包时每条差异最多保存的碱基数
    pub max_stored: u64,
}

/// read 序列在存储中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceState {
    /// 原样保存在记录中
    Stored,
    /// 已丢弃，解包时由差异与参考重建
    Derived,
    /// 原始记录没有序列（SAM 中的 `*`）
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedRecord {
    pub record: AlignmentRecord,
    pub sequence: SequenceState,
}

impl PackedRecord {
    /// 能由差异与参考逐字节重建时丢弃 read 序列，否则保留。
    pub fn pack(mut record: AlignmentRecord, reference: &Reference, opt: &CodecOpt) -> Self {
        let seq = match record.read_sequence() {
            None => return Self { record, sequence: SequenceState::Absent },
            Some(seq) => seq,
        };
        // 没有操作列表的记录无法由差异重建
        let has_cigar = record.cigar().map_or(false, |c| !c.is_empty());
        if opt.keep_sequence || record.flags().is_unmapped() || !has_cigar {
            return Self { record, sequence: SequenceState::Stored };
        }
        let rebuilt = reference
            .get(&record.reference_name)
            .ok_or_else(|| anyhow!("reference sequence '{}' not found", record.reference_name))
            .and_then(|contig| {
                let offset = record.start.saturating_sub(1) as usize;
                record.reconstruct_sequence(contig, offset).map_err(anyhow::Error::from)
            });
        match rebuilt {
            Ok(rebuilt) if rebuilt == seq => {
                record.set_read_sequence(None);
                Self { record, sequence: SequenceState::Derived }
            }
            Ok(_) => {
                log::debug!("{}: rebuilt sequence differs, keeping original", record.name);
                Self { record, sequence: SequenceState::Stored }
            }
            Err(e) => {
                log::debug!("{}: sequence not derivable ({}), keeping original", record.name, e);
                Self { record, sequence: SequenceState::Stored }
            }
        }
    }

    /// 还原为一行 SAM
    pub fn to_sam_line(&self, reference: &Reference) -> Result<String> {
        match self.sequence {
            SequenceState::Derived => format_sam_line(&self.record, Some(reference)),
            SequenceState::Stored | SequenceState::Absent => format_sam_line(&self.record, None),
        }
    }
}

/// 以差异列表为主体的紧凑比对存储，bincode 序列化。
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct AlignmentStore {
    pub meta: StoreMeta,
    /// SAM 头部行（含 `@`）
    pub header: Vec<String>,
    pub records: Vec<PackedRecord>,
}

impl AlignmentStore {
    pub fn new(header: Vec<String>) -> Self {
        Self {
            meta: StoreMeta { version: STORE_VERSION, ..Default::default() },
            header,
            records: Vec::new(),
        }
    }

    pub fn set_meta(&mut self, meta: StoreMeta) {
        self.meta = StoreMeta { version: STORE_VERSION, ..meta };
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records whose read sequence was dropped.
    pub fn derived_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.sequence == SequenceState::Derived)
            .count()
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let f = std::fs::File::create(path)?;
        let mut w = std::io::BufWriter::new(f);
        bincode::serialize_into(&mut w, self)?;
        Ok(())
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path)?;
        let store: Self = bincode::deserialize_from(std::io::BufReader::new(f))?;
        if store.meta.version != STORE_VERSION {
            anyhow::bail!(
                "'{}' has store version {}, expected {}",
                path,
                store.meta.version,
                STORE_VERSION
            );
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sam::parse_sam_line;

    fn reference() -> Reference {
        let mut r = Reference::default();
        r.insert("chr1".to_string(), b"TTTTACGTACGTACGTAAAA".to_vec());
        r
    }

    const LINES: [&str; 3] = [
        "r1\t0\tchr1\t5\t60\t2S4M2I4M\t*\t0\t0\tGGACCTXXACGT\tIIIIIIIIIIII\tNM:i:3",
        "r2\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t*",
        "r3\t0\tchr1\t5\t60\t4M\t*\t0\t0\t*\t*",
    ];

    #[test]
    fn pack_drops_derivable_sequences() {
        let r = reference();
        let opt = CodecOpt::default();
        let packed: Vec<PackedRecord> = LINES
            .iter()
            .map(|l| PackedRecord::pack(parse_sam_line(l, &r, &opt).unwrap(), &r, &opt))
            .collect();
        assert_eq!(packed[0].sequence, SequenceState::Derived);
        assert!(packed[0].record.read_sequence().is_none());
        assert_eq!(packed[1].sequence, SequenceState::Stored);
        assert_eq!(packed[2].sequence, SequenceState::Absent);

        for (p, line) in packed.iter().zip(LINES.iter()) {
            assert_eq!(p.to_sam_line(&r).unwrap(), *line);
        }
    }

    #[test]
    fn pack_keeps_sequence_when_capped() {
        let r = reference();
        let opt = CodecOpt { max_stored: 1, keep_sequence: false };
        let rec = parse_sam_line(LINES[0], &r, &opt).unwrap();
        let packed = PackedRecord::pack(rec, &r, &opt);
        // 插入只保存了一个碱基，无法重建
        assert_eq!(packed.sequence, SequenceState::Stored);
        assert_eq!(packed.to_sam_line(&r).unwrap(), LINES[0]);
    }

    #[test]
    fn save_and_load() {
        let r = reference();
        let opt = CodecOpt::default();
        let mut store = AlignmentStore::new(vec!["@SQ\tSN:chr1\tLN:20".to_string()]);
        store.set_meta(StoreMeta {
            source_file: Some("in.sam".to_string()),
            build_timestamp: Some("2026-01-01T00:00:00+00:00".to_string()),
            ..Default::default()
        });
        for l in LINES {
            store.records.push(PackedRecord::pack(parse_sam_line(l, &r, &opt).unwrap(), &r, &opt));
        }

        let path = std::env::temp_dir().join(format!("alnkit_{}_store.alnz", std::process::id()));
        let path = path.to_string_lossy().to_string();
        store.save_to_file(&path).unwrap();
        let loaded = AlignmentStore::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.meta.version, STORE_VERSION);
        assert_eq!(loaded.meta.source_file.as_deref(), Some("in.sam"));
        assert_eq!(loaded.header, store.header);
        assert_eq!(loaded.records, store.records);
        assert_eq!(loaded.derived_count(), 1);
    }
}
