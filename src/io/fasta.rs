use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::Path;

use super::lines::LineReader;

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

pub struct FastaReader {
    lines: LineReader,
    done: bool,
    peek_header: Option<String>,
}

impl FastaReader {
    pub fn new(lines: LineReader) -> Self {
        Self { lines, done: false, peek_header: None }
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        if self.done {
            return Ok(None);
        }

        // Find header line
        let header = if let Some(h) = self.peek_header.take() {
            h
        } else {
            loop {
                match self.lines.read_line()? {
                    None => {
                        self.done = true;
                        return Ok(None);
                    }
                    Some(line) => {
                        if let Some(h) = line.strip_prefix('>') {
                            break h.trim().to_string();
                        }
                    }
                }
            }
        };

        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("").to_string();
        let desc = parts
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let mut seq: Vec<u8> = Vec::new();
        loop {
            let line = match self.lines.read_line()? {
                Some(line) => line,
                None => {
                    self.done = true;
                    break;
                }
            };
            if let Some(h) = line.strip_prefix('>') {
                self.peek_header = Some(h.trim().to_string());
                break;
            }
            seq.extend(
                line.bytes()
                    .filter(|b| !b.is_ascii_whitespace())
                    .map(|b| b.to_ascii_uppercase()),
            );
        }

        Ok(Some(FastaRecord { id, desc, seq }))
    }
}

/// 参考序列集合：contig 名称 → 大写碱基
#[derive(Debug, Default)]
pub struct Reference {
    contigs: HashMap<String, Vec<u8>>,
    order: Vec<String>,
}

impl Reference {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = FastaReader::new(LineReader::open(path)?);
        let mut reference = Reference::default();
        while let Some(rec) = reader.next_record()? {
            reference.insert(rec.id, rec.seq);
        }
        if reference.is_empty() {
            anyhow::bail!("FASTA file '{}' contains no sequences", path.display());
        }
        log::info!("loaded {} reference sequences from {}", reference.len(), path.display());
        Ok(reference)
    }

    pub fn insert(&mut self, name: String, seq: Vec<u8>) {
        if !self.contigs.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.contigs.insert(name, seq);
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.contigs.get(name).map(Vec::as_slice)
    }

    /// 取出 contig 的 `[start, end)` 区间（0-based）
    pub fn window(&self, name: &str, start: usize, end: usize) -> Result<&[u8]> {
        let seq = self
            .get(name)
            .ok_or_else(|| anyhow!("reference sequence '{}' not found", name))?;
        if start > end || end > seq.len() {
            return Err(anyhow!(
                "window [{}, {}) outside reference '{}' of length {}",
                start,
                end,
                name,
                seq.len()
            ));
        }
        Ok(&seq[start..end])
    }

    /// Contig names and lengths in file order.
    pub fn contigs(&self) -> impl Iterator<Item = (&str, usize)> {
        self.order
            .iter()
            .filter_map(|n| self.contigs.get(n).map(|s| (n.as_str(), s.len())))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(data: &'static [u8]) -> FastaReader {
        FastaReader::new(LineReader::new(Cursor::new(data)))
    }

    #[test]
    fn parse_simple_fasta() {
        let mut r = reader(b">chr1 first\nACgTNN\n>chr2\nAAA\n");

        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.desc.as_deref(), Some("first"));
        assert_eq!(r1.seq, b"ACGTNN");

        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.id, "chr2");
        assert_eq!(r2.desc, None);
        assert_eq!(r2.seq, b"AAA");

        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn parse_fasta_with_crlf_and_whitespace() {
        let mut r = reader(b">chr1 desc\r\nAC g t n\r\n acgt\r\n>chr2 \r\n N N N \r\n");

        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.desc.as_deref(), Some("desc"));
        assert_eq!(r1.seq, b"ACGTNACGT");

        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.id, "chr2");
        assert_eq!(r2.desc, None);
        assert_eq!(r2.seq, b"NNN");

        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn parse_fasta_with_leading_empty_lines() {
        let mut r = reader(b"\n\n>chr1\nACGT\n");
        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.seq, b"ACGT");
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn reference_windows() {
        let mut reference = Reference::default();
        reference.insert("chr2".to_string(), b"TTTT".to_vec());
        reference.insert("chr1".to_string(), b"ACGTACGT".to_vec());
        assert_eq!(reference.window("chr1", 2, 5).unwrap(), b"GTA");
        assert!(reference.window("chr1", 6, 9).is_err());
        assert!(reference.window("chrX", 0, 1).is_err());
        let names: Vec<(&str, usize)> = reference.contigs().collect();
        assert_eq!(names, vec![("chr2", 4), ("chr1", 8)]);
    }
}
