//! Log file enumeration and incremental reading.
//!
//! `list_log_files` enumerates files matching a shell glob in sorted
//! order (zero-padded rotation names sort chronologically).
//! `FileTailer` reads newly appended bytes from a growing file,
//! surfacing only complete lines and detecting rotation via inode
//! change or truncation.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

/// Upper bound on bytes consumed per `read_new_lines` call. Prevents
/// unbounded memory usage when catching up on a large backlog.
const MAX_BYTES_PER_READ: u64 = 4 * 1024 * 1024;

/// Errors surfaced by log enumeration and tailing.
#[derive(Debug)]
pub enum TailError {
    /// No file matched the glob. Fatal for the run, distinguishable from
    /// a transient empty read.
    NoLogFiles { dir: PathBuf, pattern: String },
    /// The glob itself was malformed.
    BadPattern(glob::PatternError),
    Io(io::Error),
}

impl std::fmt::Display for TailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TailError::NoLogFiles { dir, pattern } => {
                write!(f, "no log files matching '{}' in {}", pattern, dir.display())
            }
            TailError::BadPattern(e) => write!(f, "invalid log file pattern: {}", e),
            TailError::Io(e) => write!(f, "log file I/O error: {}", e),
        }
    }
}

impl std::error::Error for TailError {}

impl From<io::Error> for TailError {
    fn from(e: io::Error) -> Self {
        TailError::Io(e)
    }
}

impl From<glob::PatternError> for TailError {
    fn from(e: glob::PatternError) -> Self {
        TailError::BadPattern(e)
    }
}

/// Enumerate files matching `pattern` under `dir`, lexicographically
/// sorted. An empty result is `TailError::NoLogFiles`.
pub fn list_log_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, TailError> {
    let glob_expr = dir.join(pattern);
    let glob_expr = glob_expr.to_string_lossy();

    let mut files: Vec<PathBuf> = glob::glob(&glob_expr)?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(TailError::NoLogFiles {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }
    Ok(files)
}

/// Reads lines appended to a file since the last read position.
///
/// The byte offset advances only past the last complete line, so a
/// partially written line is never surfaced and never re-read once it
/// completes. Rotation (inode change or size regression) restarts the
/// cursor at zero.
pub struct FileTailer {
    path: PathBuf,
    offset: u64,
    inode: u64,
}

impl FileTailer {
    /// Tail from the end of the file: only lines appended after this
    /// call are surfaced. Follow-mode constructor.
    pub fn at_end(path: PathBuf) -> io::Result<Self> {
        let metadata = fs::metadata(&path)?;
        Ok(Self {
            inode: get_inode(&metadata),
            offset: metadata.len(),
            path,
        })
    }

    /// Read from the beginning of the file. Bulk-mode constructor.
    pub fn from_start(path: PathBuf) -> io::Result<Self> {
        let metadata = fs::metadata(&path)?;
        Ok(Self {
            inode: get_inode(&metadata),
            offset: 0,
            path,
        })
    }

    /// Read complete lines appended since the last call, trailing
    /// newline stripped. Returns an empty vector when nothing new (or
    /// only a partial line) is available.
    pub fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // File gone (rotation in progress): empty read, retry later.
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let current_inode = get_inode(&metadata);
        let current_size = metadata.len();

        if current_inode != self.inode || current_size < self.offset {
            self.inode = current_inode;
            self.offset = 0;
        }

        if current_size <= self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;

        let mut buf = Vec::new();
        file.take(MAX_BYTES_PER_READ).read_to_end(&mut buf)?;

        // Consume only up to the last newline; a trailing partial line
        // stays in the file for the next call.
        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            if buf.len() as u64 == MAX_BYTES_PER_READ {
                // A full window with no newline: a line longer than the
                // window. Discard it so the cursor keeps advancing;
                // holding back would block every line behind it.
                self.offset += buf.len() as u64;
                warn!(
                    file = %self.path.display(),
                    bytes = buf.len(),
                    "discarding line longer than the read window"
                );
            }
            return Ok(Vec::new());
        };
        self.offset += (last_newline + 1) as u64;

        let lines = buf[..last_newline]
            .split(|&b| b == b'\n')
            .map(|raw| {
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                String::from_utf8_lossy(raw).into_owned()
            })
            .collect();
        Ok(lines)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current byte offset into the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Extract inode from file metadata (Unix).
#[cfg(unix)]
fn get_inode(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

/// Non-Unix fallback: rely on size-based rotation detection only.
#[cfg(not(unix))]
fn get_inode(_metadata: &fs::Metadata) -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn at_end_skips_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postgresql-001.log");
        fs::write(&path, "old line 1\nold line 2\n").unwrap();

        let mut tailer = FileTailer::at_end(path).unwrap();
        assert!(tailer.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn from_start_reads_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postgresql-001.log");
        fs::write(&path, "line 1\nline 2\n").unwrap();

        let mut tailer = FileTailer::from_start(path).unwrap();
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["line 1", "line 2"]);
    }

    #[test]
    fn appended_bytes_are_read_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postgresql-001.log");
        fs::write(&path, "old\n").unwrap();

        let mut tailer = FileTailer::at_end(path.clone()).unwrap();
        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "new line 1").unwrap();
        writeln!(f, "new line 2").unwrap();
        drop(f);

        assert_eq!(
            tailer.read_new_lines().unwrap(),
            vec!["new line 1", "new line 2"]
        );
        assert!(tailer.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn partial_line_is_held_back_until_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postgresql-001.log");
        fs::write(&path, "").unwrap();

        let mut tailer = FileTailer::at_end(path.clone()).unwrap();

        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(f, "incomplete").unwrap();
        f.flush().unwrap();
        assert!(tailer.read_new_lines().unwrap().is_empty());

        writeln!(f, " now done").unwrap();
        drop(f);
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["incomplete now done"]);
    }

    #[test]
    fn truncation_restarts_from_beginning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postgresql-001.log");
        fs::write(&path, "a".repeat(1000)).unwrap();

        let mut tailer = FileTailer::at_end(path.clone()).unwrap();
        fs::write(&path, "after rotation\n").unwrap();

        assert_eq!(tailer.read_new_lines().unwrap(), vec!["after rotation"]);
    }

    #[test]
    fn missing_file_is_a_transient_empty_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postgresql-001.log");
        fs::write(&path, "content\n").unwrap();

        let mut tailer = FileTailer::at_end(path.clone()).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(tailer.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn overlong_line_does_not_stall_the_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postgresql-001.log");

        // One line wider than the read window, then a normal line.
        let mut body = "x".repeat(MAX_BYTES_PER_READ as usize + 1024);
        body.push('\n');
        body.push_str("normal line after giant one\n");
        fs::write(&path, &body).unwrap();

        let mut tailer = FileTailer::from_start(path).unwrap();

        // First read sees a full window with no newline and discards it.
        assert!(tailer.read_new_lines().unwrap().is_empty());
        assert_eq!(tailer.offset(), MAX_BYTES_PER_READ);

        // The next read surfaces the remainder, including the complete
        // line behind the oversized one.
        let lines = tailer.read_new_lines().unwrap();
        assert_eq!(
            lines.last().map(String::as_str),
            Some("normal line after giant one")
        );
        assert_eq!(tailer.offset(), body.len() as u64);
        assert!(tailer.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn list_log_files_sorts_lexicographically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["postgresql-003.log", "postgresql-001.log", "postgresql-002.log"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::write(dir.path().join("other.txt"), "").unwrap();

        let files = list_log_files(dir.path(), "*.log").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["postgresql-001.log", "postgresql-002.log", "postgresql-003.log"]
        );
    }

    #[test]
    fn list_log_files_empty_match_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_log_files(dir.path(), "*.log").unwrap_err();
        assert!(matches!(err, TailError::NoLogFiles { .. }));
    }
}
