//! Append-only URL log with a tracked read offset
//!
//! ## File Operations
//!
//! - `LogFile::open_or_create()` - make sure the file (and its directory) exists
//! - `LogFile::append()` - write encoded records to the end of the file
//! - `LogFile::read_new()` - decode complete lines past the tracked offset
//! - `LogFile::size()` - current file size on disk
//!
//! The file handle is opened and closed per call; nothing is held between
//! operations, so other processes can append to the same file.
//!
//! ## Offset tracking
//!
//! One cursor marks how far this process has consumed the file. Reads
//! advance it past every complete line. A trailing line without `\n` is left
//! for a later pass. If the file is smaller than the cursor (truncated or
//! replaced) the cursor restarts at 0.
//!
//! Local appends advance the cursor by the bytes written instead of
//! re-reading the file size, so a process does not replay its own records.
//! Appends and reads in one process are serialized on the cursor lock. When
//! another process appends between a local read and a local append, the
//! cursor no longer matches the line layout of the file; lines around that
//! point can be skipped or split. This is a known limitation of the format.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::LogError;
use crate::record::{encode_lines, LogRecord};

/// Outcome of one replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records decoded and handed to the caller
    pub records: usize,
    /// Lines skipped because they did not decode
    pub malformed: usize,
    /// Bytes consumed past the starting offset
    pub bytes_read: u64,
    /// Whether the pass restarted from offset 0 after the file shrank
    pub restarted: bool,
}

/// Handle to the URL log on disk
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    cursor: Mutex<u64>,
}

impl LogFile {
    /// Open the log at `path`, creating it and its parent directory if needed
    ///
    /// The cursor starts at 0, so the first `read_new` replays the whole file.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        open_for_append(&path)?;

        debug!(path = %path.display(), "opened url log");
        Ok(Self {
            path,
            cursor: Mutex::new(0),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset up to which this process has consumed the log
    pub fn offset(&self) -> u64 {
        *self.cursor.lock()
    }

    /// Current size of the file on disk
    pub fn size(&self) -> Result<u64, LogError> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Check that the file can currently be opened for read/write/append
    pub fn is_writable(&self) -> bool {
        OpenOptions::new()
            .read(true)
            .write(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .is_ok()
    }

    /// Append records, one line each
    ///
    /// Returns the number of bytes written; the cursor advances by the same
    /// amount.
    pub fn append(&self, records: &[LogRecord]) -> Result<u64, LogError> {
        if records.is_empty() {
            return Ok(0);
        }
        let data = encode_lines(records)?;

        let mut cursor = self.cursor.lock();
        let mut writer = BufWriter::new(open_for_append(&self.path)?);
        writer.write_all(&data)?;
        writer.flush()?;

        let written = data.len() as u64;
        *cursor += written;
        trace!(records = records.len(), bytes = written, offset = *cursor, "appended to url log");
        Ok(written)
    }

    /// Decode every complete line past the cursor and hand it to `apply`
    ///
    /// Malformed lines are logged and skipped. The cursor moves past each
    /// consumed line as it goes, so an I/O error midway leaves it after the
    /// last line that was handled.
    pub fn read_new(&self, mut apply: impl FnMut(LogRecord)) -> Result<ReplayStats, LogError> {
        let mut cursor = self.cursor.lock();
        let file = open_for_append(&self.path)?;
        let mut stats = ReplayStats::default();

        let size = file.metadata()?.len();
        if size < *cursor {
            warn!(
                path = %self.path.display(),
                size,
                offset = *cursor,
                "url log shrank, replaying from the start"
            );
            *cursor = 0;
            stats.restarted = true;
        }

        let start = *cursor;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start))?;

        let mut line = Vec::new();
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            if line.last() != Some(&b'\n') {
                trace!(offset = *cursor, bytes = n, "incomplete trailing line left for later");
                break;
            }

            let line_offset = *cursor;
            *cursor += n as u64;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match LogRecord::decode(&line, line_offset) {
                Ok(record) => {
                    apply(record);
                    stats.records += 1;
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping url log line");
                    stats.malformed += 1;
                }
            }
        }

        stats.bytes_read = *cursor - start;
        Ok(stats)
    }
}

fn open_for_append(path: &Path) -> Result<File, LogError> {
    Ok(OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?)
}
