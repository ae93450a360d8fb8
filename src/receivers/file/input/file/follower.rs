// SPDX-License-Identifier: Apache-2.0

//! Follows a single file by path, yielding complete lines as they are appended.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::file_id::FileId;

/// Upper bound on lines returned by a single poll
const MAX_LINES_PER_POLL: usize = 10_000;

/// One complete line read from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Line text without its terminator, possibly truncated
    pub text: String,
    /// Bytes the line occupied in the file, terminator included
    pub bytes: u64,
}

/// Result of one poll.
#[derive(Debug, Default)]
pub struct FollowBatch {
    pub lines: Vec<Line>,
    /// The path now refers to a new file and reading restarted at its start
    pub reopened: bool,
    /// The file is shorter than what has already been read from it
    pub truncated: bool,
    /// Size of the file being read, `None` if it is not open
    pub file_len: Option<u64>,
}

/// Reads newline-terminated lines from a path, starting at a byte offset.
///
/// A missing file is not an error: the open is retried on the next poll. When
/// the path is replaced by a different file (rename and recreate), the rest of
/// the old file is read and then the new file is followed from offset 0.
/// Bytes after the last newline stay pending until the line is completed.
pub struct FileFollower {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    file_id: Option<FileId>,
    /// Offset just past the last complete line returned
    position: u64,
    /// Partial line read past `position`, capped at `max_line_bytes`
    pending: Vec<u8>,
    /// Actual length of the partial line in the file
    pending_len: u64,
    max_line_bytes: usize,
}

impl FileFollower {
    pub fn new(path: impl AsRef<Path>, offset: u64, max_line_bytes: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reader: None,
            file_id: None,
            position: offset,
            pending: Vec::new(),
            pending_len: 0,
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset just past the last complete line returned
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Restart reading the current file from its first byte.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.position = 0;
        self.clear_pending();
        if let Some(reader) = self.reader.as_mut() {
            reader.seek(SeekFrom::Start(0))?;
        }
        Ok(())
    }

    /// Read whatever complete lines are available now.
    pub fn poll(&mut self) -> io::Result<FollowBatch> {
        let mut batch = FollowBatch::default();

        if self.reader.is_none() && !self.open()? {
            return Ok(batch);
        }

        self.read_available(&mut batch.lines)?;

        // Only check for rotation once the current file is drained
        if batch.lines.len() < MAX_LINES_PER_POLL && self.check_rotated()? {
            // Whatever trailing bytes the old file had will never be completed
            if self.pending_len > 0 {
                let line = self.take_pending_line();
                batch.lines.push(line);
            }
            self.reader = None;
            self.file_id = None;
            self.position = 0;
            if self.open()? {
                batch.reopened = true;
                self.read_available(&mut batch.lines)?;
            }
        }

        if let Some(reader) = self.reader.as_ref() {
            let len = reader.get_ref().metadata()?.len();
            batch.truncated = len < self.position + self.pending_len;
            batch.file_len = Some(len);
        }

        Ok(batch)
    }

    /// Open the path and seek to the current position. Returns false if the
    /// file does not exist.
    fn open(&mut self) -> io::Result<bool> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let file_id = FileId::from_file(&file)?;
        file.seek(SeekFrom::Start(self.position))?;
        debug!(
            path = ?self.path,
            file_id = %file_id,
            offset = self.position,
            "Opened file"
        );

        self.reader = Some(BufReader::new(file));
        self.file_id = Some(file_id);
        self.clear_pending();
        Ok(true)
    }

    /// Whether the path now names a different file than the open handle.
    /// A missing path is not a rotation yet: the old file may still grow.
    fn check_rotated(&self) -> io::Result<bool> {
        let current = match self.file_id {
            Some(id) => id,
            None => return Ok(false),
        };
        match FileId::from_path(&self.path) {
            Ok(id) => Ok(id != current),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_available(&mut self, lines: &mut Vec<Line>) -> io::Result<()> {
        while lines.len() < MAX_LINES_PER_POLL {
            let reader = match self.reader.as_mut() {
                Some(r) => r,
                None => return Ok(()),
            };
            let buf = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if buf.is_empty() {
                return Ok(());
            }

            match buf.iter().position(|b| *b == b'\n') {
                Some(i) => {
                    let room = self.max_line_bytes.saturating_sub(self.pending.len());
                    self.pending.extend_from_slice(&buf[..i.min(room)]);
                    self.pending_len += i as u64 + 1;
                    reader.consume(i + 1);
                    let line = self.take_pending_line();
                    lines.push(line);
                }
                None => {
                    let n = buf.len();
                    let room = self.max_line_bytes.saturating_sub(self.pending.len());
                    self.pending.extend_from_slice(&buf[..n.min(room)]);
                    self.pending_len += n as u64;
                    reader.consume(n);
                }
            }
        }
        Ok(())
    }

    fn take_pending_line(&mut self) -> Line {
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = Line {
            text: String::from_utf8_lossy(&self.pending).into_owned(),
            bytes: self.pending_len,
        };
        self.position += self.pending_len;
        self.clear_pending();
        line
    }

    fn clear_pending(&mut self) {
        self.pending.clear();
        self.pending_len = 0;
    }
}
