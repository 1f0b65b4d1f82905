// Line-oriented file access shared by every phase
//
// Records are addressed by 0-based line index. Gzip input is detected by
// the `.gz` extension and decoded transparently.

use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::Path;
use tip_common::{Result, TipError};

const READ_BUFFER: usize = 1 << 20;

pub fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => TipError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => TipError::Io(e),
    })
}

/// Open a text file for buffered reading, decompressing `.gz` input
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = open_file(path)?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER,
            MultiGzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER, file)))
    }
}

pub fn create_text(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::with_capacity(READ_BUFFER, File::create(path)?))
}

/// Count lines; a final line without a terminator still counts
pub fn count_lines(path: &Path) -> Result<u64> {
    let mut reader = open_text(path)?;
    let mut lines = 0u64;
    let mut last = b'\n';
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        lines += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
        last = chunk[chunk.len() - 1];
        let consumed = chunk.len();
        reader.consume(consumed);
    }
    if last != b'\n' {
        lines += 1;
    }
    Ok(lines)
}

/// Call `visit(line_index, line)` for every line whose index is in `range`
///
/// Lines are passed without their terminator. Reading stops at `range.end`.
pub fn scan_lines<F>(path: &Path, range: Range<u64>, mut visit: F) -> Result<()>
where
    F: FnMut(u64, &str) -> Result<()>,
{
    if range.is_empty() {
        return Ok(());
    }
    let mut reader = open_text(path)?;
    let mut line = String::new();
    let mut index = 0u64;
    while index < range.end {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if index >= range.start {
            visit(index, line.trim_end_matches(['\n', '\r']))?;
        }
        index += 1;
    }
    Ok(())
}

/// Copy the raw lines of `range` from `src` to `dst`; returns lines copied
pub fn copy_line_range(src: &Path, dst: &Path, range: Range<u64>) -> Result<u64> {
    let mut reader = open_text(src)?;
    let mut writer = create_text(dst)?;
    let mut buf = Vec::new();
    let mut index = 0u64;
    let mut copied = 0u64;
    while index < range.end {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if index >= range.start {
            writer.write_all(&buf)?;
            if buf.last() != Some(&b'\n') {
                writer.write_all(b"\n")?;
            }
            copied += 1;
        }
        index += 1;
    }
    writer.flush()?;
    Ok(copied)
}

/// Append every line of `src` to `writer`, terminating each with `\n`
pub fn append_lines<W: Write>(src: &Path, writer: &mut W) -> Result<u64> {
    let mut reader = open_text(src)?;
    let mut buf = Vec::new();
    let mut lines = 0u64;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        writer.write_all(&buf)?;
        writer.write_all(b"\n")?;
        lines += 1;
    }
    Ok(lines)
}

/// Remove a file this rank owns, tolerating it already being gone
pub fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove {}: {}", path.display(), e),
    }
}
