use anyhow::{anyhow, Result};
use flate2::read::MultiGzDecoder;
use std::cell::Cell;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// 统计从底层输入读取的原始字节数（压缩输入时为压缩后的字节）
struct CountingReader<R> {
    inner: R,
    count: Rc<Cell<u64>>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.set(self.count.get() + n as u64);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.count.set(self.count.get() + amt as u64);
        self.inner.consume(amt);
    }
}

type ProgressListener = Box<dyn FnMut(u64)>;

/// 按行读取文本输入，`.gz` 结尾的文件按 gzip 解压。
///
/// 行尾的 `\n` / `\r\n` 会被去掉。
pub struct LineReader {
    reader: Box<dyn BufRead>,
    path: Option<PathBuf>,
    consumed: Rc<Cell<u64>>,
    reported: u64,
    lines_read: u64,
    buf: String,
    listener: Option<ProgressListener>,
}

impl LineReader {
    pub fn new<R: BufRead + 'static>(reader: R) -> Self {
        let consumed = Rc::new(Cell::new(0));
        let counting = CountingReader { inner: reader, count: Rc::clone(&consumed) };
        Self::with_counter(Box::new(counting), None, consumed)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let fh = File::open(path).map_err(|e| anyhow!("cannot open '{}': {}", path.display(), e))?;
        let consumed = Rc::new(Cell::new(0));
        let counting = CountingReader { inner: fh, count: Rc::clone(&consumed) };

        let is_gz = path.extension().map_or(false, |ext| ext == "gz");
        let reader: Box<dyn BufRead> = if is_gz {
            log::debug!("{}: gzip input", path.display());
            Box::new(BufReader::new(MultiGzDecoder::new(counting)))
        } else {
            log::debug!("{}: plain input", path.display());
            Box::new(BufReader::new(counting))
        };
        Ok(Self::with_counter(reader, Some(path.to_path_buf()), consumed))
    }

    fn with_counter(reader: Box<dyn BufRead>, path: Option<PathBuf>, consumed: Rc<Cell<u64>>) -> Self {
        Self {
            reader,
            path,
            consumed,
            reported: 0,
            lines_read: 0,
            buf: String::new(),
            listener: None,
        }
    }

    /// 读取下一行；到达末尾时返回 `None`
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let line = self.next_line()?;
        self.notify_progress();
        Ok(line)
    }

    /// 最多读取 `n` 行。文件末尾返回的批次可能不足 `n` 行，读完后返回空批次。
    pub fn read_batch(&mut self, n: usize) -> Result<Vec<String>> {
        let mut batch = Vec::with_capacity(n);
        while batch.len() < n {
            match self.next_line()? {
                Some(line) => batch.push(line),
                None => break,
            }
        }
        self.notify_progress();
        Ok(batch)
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_line(&mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        if self.buf.ends_with('\n') {
            self.buf.pop();
            if self.buf.ends_with('\r') {
                self.buf.pop();
            }
        }
        self.lines_read += 1;
        Ok(Some(self.buf.clone()))
    }

    fn notify_progress(&mut self) {
        let now = self.consumed.get();
        if now > self.reported {
            if let Some(listener) = self.listener.as_mut() {
                listener(now - self.reported);
            }
            self.reported = now;
        }
    }

    /// 设置进度回调：参数为自上次通知以来从输入读取的字节数
    pub fn set_progress_listener<F: FnMut(u64) + 'static>(&mut self, listener: F) {
        self.listener = Some(Box::new(listener));
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Raw bytes pulled from the underlying input so far.
    pub fn bytes_read(&self) -> u64 {
        self.consumed.get()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 输入文件在磁盘上的大小
    pub fn file_size(&self) -> Result<u64> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| anyhow!("line reader is not backed by a file"))?;
        Ok(std::fs::metadata(path)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::{Cursor, Write};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("alnkit_{}_{}", std::process::id(), name))
    }

    #[test]
    fn read_lines_strips_terminators() {
        let data = b"first\r\nsecond\n\nlast";
        let mut r = LineReader::new(Cursor::new(&data[..]));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("first"));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("second"));
        assert_eq!(r.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(r.read_line().unwrap(), None);
        assert_eq!(r.lines_read(), 4);
        assert!(r.file_size().is_err());
    }

    #[test]
    fn read_batches() {
        let data = b"a\nb\nc\nd\ne\n";
        let mut r = LineReader::new(Cursor::new(&data[..]));
        assert_eq!(r.read_batch(2).unwrap(), vec!["a", "b"]);
        assert_eq!(r.read_batch(2).unwrap(), vec!["c", "d"]);
        assert_eq!(r.read_batch(2).unwrap(), vec!["e"]);
        assert!(r.read_batch(2).unwrap().is_empty());
        assert_eq!(r.lines_read(), 5);
    }

    #[test]
    fn progress_listener_reports_consumed_bytes() {
        let data = b"abc\ndefgh\n";
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut r = LineReader::new(Cursor::new(&data[..]));
        r.set_progress_listener(move |n| sink.borrow_mut().push(n));
        r.read_line().unwrap();
        r.read_line().unwrap();
        r.read_line().unwrap();
        assert_eq!(*seen.borrow(), vec![4, 6]);
        assert_eq!(r.bytes_read(), 10);
    }

    #[test]
    fn open_plain_and_gzip_files() {
        let plain = temp_path("lines.txt");
        std::fs::write(&plain, b"one\ntwo\n").unwrap();
        let mut r = LineReader::open(&plain).unwrap();
        assert_eq!(r.read_batch(10).unwrap(), vec!["one", "two"]);
        assert_eq!(r.file_size().unwrap(), 8);

        let gz = temp_path("lines.txt.gz");
        {
            let fh = File::create(&gz).unwrap();
            let mut enc = flate2::write::GzEncoder::new(fh, flate2::Compression::default());
            enc.write_all(b"alpha\nbeta\ngamma\n").unwrap();
            enc.finish().unwrap();
        }
        let mut r = LineReader::open(&gz).unwrap();
        assert_eq!(r.read_batch(10).unwrap(), vec!["alpha", "beta", "gamma"]);
        assert_eq!(r.bytes_read(), r.file_size().unwrap());

        std::fs::remove_file(plain).ok();
        std::fs::remove_file(gz).ok();
    }

    #[test]
    fn open_missing_file_fails() {
        assert!(LineReader::open(temp_path("does_not_exist.txt")).is_err());
    }
}
