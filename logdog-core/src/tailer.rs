//! Log file tailing
//!
//! [`LogTailer`] keeps a byte offset into a growing file and hands out the
//! complete lines appended since the previous poll. The first poll only
//! records the end of the file; content that existed before watching began
//! is never returned.
//!
//! Every failure after the initial open is treated as transient: the poll
//! yields nothing and the next one tries again.

use crate::types::{Result, WatchError};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Tails a single log file
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    /// Byte offset just past the last complete line handed out
    offset: u64,
    /// False until the first poll has skipped to the end of the file
    initialized: bool,
}

impl LogTailer {
    /// Create a tailer for `path` (nothing is opened yet)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
            offset: 0,
            initialized: false,
        }
    }

    /// Open the file without moving the read offset
    pub fn open(&mut self) -> Result<()> {
        let file = File::open(&self.path).map_err(|source| WatchError::Open {
            path: self.path.clone(),
            source,
        })?;
        self.reader = Some(BufReader::new(file));
        Ok(())
    }

    /// Release the file handle (the offset is kept)
    pub fn close(&mut self) {
        self.reader = None;
    }

    /// True while a file handle is held
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Offset the next read starts from
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Watched path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the complete lines appended since the previous call
    ///
    /// A trailing fragment without a newline is left in the file and returned
    /// in full once it is terminated. Carriage returns before the newline are
    /// stripped and blank lines are dropped.
    pub fn read_new_lines(&mut self) -> Vec<String> {
        // 1. File may be mid-rotation
        if !self.path.exists() {
            self.close();
            return Vec::new();
        }

        // 2. Current size
        let size = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                log::debug!("Cannot stat {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        // 3. First poll: start watching from the current end
        if !self.initialized {
            self.offset = size;
            self.initialized = true;
            log::debug!("Watching {:?} from offset {}", self.path, size);
            return Vec::new();
        }

        // 4. Shrunk below our offset: truncated or replaced
        if size < self.offset {
            log::info!(
                "Log rotation detected for {:?} (size {} < offset {}), reading from start",
                self.path,
                size,
                self.offset
            );
            self.close();
            self.offset = 0;
        }

        // 5. (Re)open
        if self.reader.is_none() {
            if let Err(e) = self.open() {
                log::debug!("{}", e);
                return Vec::new();
            }
        }
        let Some(reader) = self.reader.as_mut() else {
            return Vec::new();
        };

        // 6. Read complete lines from the stored offset
        if let Err(e) = reader.seek(SeekFrom::Start(self.offset)) {
            log::warn!("Failed to seek {:?} to {}: {}", self.path, self.offset, e);
            self.close();
            return Vec::new();
        }

        let mut lines = Vec::new();
        let position = read_complete_lines(reader, self.offset, &mut lines);

        // 7. Next read starts after the last complete line
        self.offset = match position {
            Ok(position) => position,
            Err(e) => {
                log::warn!("Error while reading {:?}: {}", self.path, e);
                size.max(self.offset)
            }
        };

        log::trace!("Read {} new lines, offset now {}", lines.len(), self.offset);
        lines
    }
}

/// Read newline-terminated lines into `lines`, returning the offset just past
/// the last one consumed.
fn read_complete_lines<R: BufRead>(
    reader: &mut R,
    start: u64,
    lines: &mut Vec<String>,
) -> io::Result<u64> {
    let mut position = start;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 || buf.last() != Some(&b'\n') {
            // EOF, possibly with an unterminated fragment left for later
            return Ok(position);
        }
        position += read as u64;

        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        let line = String::from_utf8_lossy(&buf);
        if !line.trim().is_empty() {
            lines.push(line.into_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn append(file: &mut NamedTempFile, text: &str) {
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    fn started_tailer(file: &NamedTempFile) -> LogTailer {
        let mut tailer = LogTailer::new(file.path());
        tailer.open().unwrap();
        assert!(tailer.read_new_lines().is_empty());
        tailer
    }

    #[test]
    fn test_cold_start_skips_existing_content() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, "old line 1\nold line 2\n");

        let mut tailer = LogTailer::new(file.path());
        tailer.open().unwrap();
        assert!(tailer.read_new_lines().is_empty());
        assert_eq!(tailer.offset(), 22);

        append(&mut file, "new line\n");
        assert_eq!(tailer.read_new_lines(), vec!["new line".to_string()]);
    }

    #[test]
    fn test_partial_line_is_held_back() {
        let mut file = NamedTempFile::new().unwrap();
        let mut tailer = started_tailer(&file);

        append(&mut file, "abc");
        assert!(tailer.read_new_lines().is_empty());
        assert_eq!(tailer.offset(), 0);

        append(&mut file, "def\n");
        assert_eq!(tailer.read_new_lines(), vec!["abcdef".to_string()]);
        assert_eq!(tailer.offset(), 7);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        let mut tailer = started_tailer(&file);

        append(&mut file, "first\r\n\r\n   \nsecond\n\n");
        assert_eq!(
            tailer.read_new_lines(),
            vec!["first".to_string(), "second".to_string()]
        );
        assert!(tailer.read_new_lines().is_empty());
    }

    #[test]
    fn test_truncation_resets_offset() {
        let mut file = NamedTempFile::new().unwrap();
        let mut tailer = started_tailer(&file);

        append(&mut file, &"x".repeat(499));
        append(&mut file, "\n");
        assert_eq!(tailer.read_new_lines().len(), 1);
        assert_eq!(tailer.offset(), 500);

        // Replace the content with something shorter
        fs::write(file.path(), "rotated\n").unwrap();
        assert_eq!(tailer.read_new_lines(), vec!["rotated".to_string()]);
        assert_eq!(tailer.offset(), 8);
    }

    #[test]
    fn test_missing_file_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "").unwrap();

        let mut tailer = LogTailer::new(&path);
        tailer.open().unwrap();
        assert!(tailer.read_new_lines().is_empty());

        fs::remove_file(&path).unwrap();
        assert!(tailer.read_new_lines().is_empty());
        assert!(!tailer.is_open());

        // Recreated file is picked up again on the next poll
        fs::write(&path, "back\n").unwrap();
        assert_eq!(tailer.read_new_lines(), vec!["back".to_string()]);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut tailer = LogTailer::new(dir.path().join("nope.log"));
        assert!(matches!(tailer.open(), Err(WatchError::Open { .. })));
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut file = NamedTempFile::new().unwrap();
        let mut tailer = started_tailer(&file);

        file.write_all(b"bad \xff byte\n").unwrap();
        file.flush().unwrap();
        assert_eq!(tailer.read_new_lines(), vec!["bad \u{fffd} byte".to_string()]);
    }
}
