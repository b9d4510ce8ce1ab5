//! Tail reads for log payloads
//!
//! Reads backwards from the end of a file in fixed-size blocks until enough
//! newlines have been seen or [`MAX_TAIL_BYTES`] have been scanned, so large
//! logs are never loaded whole.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const BLOCK_SIZE: u64 = 8 * 1024;

/// Most bytes a single tail read will scan back from the end of a file
pub const MAX_TAIL_BYTES: u64 = 1024 * 1024;

/// Return the last `lines` lines of a file joined with `\n`.
///
/// Any I/O failure (missing file, permission denied, ...) yields an empty
/// string. A trailing newline at the end of the file does not count as an
/// extra empty line. Lines that start before the scan limit are left out.
pub fn read_tail(path: &Path, lines: usize) -> String {
    match try_read_tail(path, lines, MAX_TAIL_BYTES) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("Tail read of {} failed: {}", path.display(), e);
            String::new()
        }
    }
}

fn try_read_tail(path: &Path, lines: usize, max_bytes: u64) -> std::io::Result<String> {
    if lines == 0 {
        return Ok(String::new());
    }

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut pos = len;
    let mut buf: Vec<u8> = Vec::new();

    // One extra newline covers the file's own trailing newline
    while pos > 0 && count_newlines(&buf) <= lines && len - pos < max_bytes {
        let step = BLOCK_SIZE.min(pos).min(max_bytes - (len - pos));
        pos -= step;
        file.seek(SeekFrom::Start(pos))?;
        let mut block = vec![0u8; step as usize];
        file.read_exact(&mut block)?;
        block.extend_from_slice(&buf);
        buf = block;
    }

    // Scan limit hit mid-line: drop the partial first line
    if pos > 0 && count_newlines(&buf) <= lines {
        if let Some(cut) = buf.iter().position(|&b| b == b'\n') {
            buf.drain(..=cut);
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let trimmed = text.strip_suffix('\n').unwrap_or(&text);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    let all: Vec<&str> = trimmed.split('\n').collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..]
        .iter()
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn count_newlines(buf: &[u8]) -> usize {
    buf.iter().filter(|&&b| b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_empty() {
        assert_eq!(read_tail(Path::new("/nonexistent/opswatch/app.log"), 10), "");
    }

    #[test]
    fn test_returns_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let content: String = (1..=30).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(&path, content).unwrap();

        let tail = read_tail(&path, 3);
        assert_eq!(tail, "line 28\nline 29\nline 30");
    }

    #[test]
    fn test_fewer_lines_than_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.log");
        std::fs::write(&path, "only\ntwo").unwrap();
        assert_eq!(read_tail(&path, 10), "only\ntwo");
    }

    #[test]
    fn test_spans_multiple_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.log");
        let mut file = File::create(&path).unwrap();
        let filler = "x".repeat(1000);
        for i in 0..40 {
            writeln!(file, "{} {}", i, filler).unwrap();
        }
        writeln!(file, "final entry").unwrap();
        drop(file);

        let tail = read_tail(&path, 2);
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("39 "));
        assert_eq!(lines[1], "final entry");
    }

    #[test]
    fn test_scan_stops_at_byte_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.log");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", "a".repeat(50_000)).unwrap();
        writeln!(file, "{}", "b".repeat(500)).unwrap();
        writeln!(file, "last").unwrap();
        drop(file);

        // The 50k line starts before the limit and is left out
        let tail = try_read_tail(&path, 10, 4096).unwrap();
        assert_eq!(tail, format!("{}\nlast", "b".repeat(500)));

        let tail = try_read_tail(&path, 10, 100).unwrap();
        assert_eq!(tail, "last");
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.log");
        std::fs::write(&path, "").unwrap();
        assert_eq!(read_tail(&path, 5), "");
    }
}
