//src/input.rs

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{PivotError, Result};

pub type TextReader = Box<dyn BufRead + Send>;

/// Open a text input; paths ending in ".gz" are decompressed on the fly.
pub fn open_text_reader<P: AsRef<Path>>(path: P) -> Result<TextReader> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| PivotError::io(path, e))?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: TextReader = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

pub fn create_text_writer<P: AsRef<Path>>(path: P) -> Result<BufWriter<File>> {
    let path = path.as_ref();
    let f = File::create(path).map_err(|e| PivotError::io(path, e))?;
    Ok(BufWriter::new(f))
}

/// Consume the header line. Returns `false` if the input is empty.
pub fn skip_header<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<bool> {
    let mut header = Vec::new();
    Ok(reader.read_until(b'\n', &mut header)? > 0)
}

/// Sequential cursor over the lines of one input, shared by all workers
/// of a pass behind a lock. Every line handed out gets a sequence number
/// in file order. Lines are handed out as raw bytes; decoding happens
/// outside the lock so one undecodable line only affects its own record.
pub struct LineCursor<R> {
    reader: R,
    next_seq: u64,
}

impl<R: BufRead> LineCursor<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, next_seq: 0 }
    }

    /// Read the next line into `buf` (without its line terminator).
    /// `Ok(None)` means end of input.
    pub fn next_line(&mut self, buf: &mut Vec<u8>) -> io::Result<Option<u64>> {
        buf.clear();
        if self.reader.read_until(b'\n', buf)? == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(Some(seq))
    }
}

/// Strip one pair of surrounding double quotes, if present.
pub fn unquote(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}
