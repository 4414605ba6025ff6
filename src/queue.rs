// Durable scrobble queue
// One JSON record per line, appended in order and replaced atomically

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::model::Song;

const TEMP_SUFFIX: &str = ".tmp";
const REJECTED_SUFFIX: &str = ".rejected";

/// A scrobble that could not be delivered right away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrobbleRecord {
    pub song: Song,
    /// Song start in seconds since the epoch
    pub start: i64,
    /// When the record was queued, in seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<i64>,
}

/// Queue contents as read from disk
#[derive(Debug, Default)]
pub struct QueueContents {
    pub records: Vec<ScrobbleRecord>,
    /// Lines that could not be parsed, in file order
    pub invalid: Vec<String>,
}

/// Append-only queue file of `ScrobbleRecord`s
#[derive(Debug, Clone)]
pub struct ScrobbleQueue {
    path: PathBuf,
}

impl ScrobbleQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file used while replacing the queue
    pub fn temp_path(&self) -> PathBuf {
        sibling(&self.path, TEMP_SUFFIX)
    }

    /// Sibling file collecting records that can never be delivered
    pub fn rejected_path(&self) -> PathBuf {
        sibling(&self.path, REJECTED_SUFFIX)
    }

    /// Append one record with a single write and flush it to disk
    pub fn append(&self, record: &ScrobbleRecord) -> Result<(), QueueError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        append_line(&self.path, &line)
    }

    /// Read every record, in order. A missing file is an empty queue.
    pub fn load(&self) -> Result<QueueContents, QueueError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(QueueContents::default()),
            Err(e) => return Err(QueueError::io(&self.path, e)),
        };

        let mut contents = QueueContents::default();
        for line in BufReader::new(file).split(b'\n') {
            let line = line.map_err(|e| QueueError::io(&self.path, e))?;
            // a write cut short by a crash can end inside a character
            let line = match String::from_utf8(line) {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Unreadable record in {:?}: {}", self.path, e.utf8_error());
                    contents
                        .invalid
                        .push(String::from_utf8_lossy(e.as_bytes()).into_owned());
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ScrobbleRecord>(&line) {
                Ok(record) => contents.records.push(record),
                Err(e) => {
                    log::warn!("Unreadable record in {:?}: {}", self.path, e);
                    contents.invalid.push(line);
                }
            }
        }

        Ok(contents)
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.load()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }

    /// Replace the queue with `records`.
    ///
    /// The new contents go to the temporary sibling first and are renamed over
    /// the queue, so a crash leaves either the old or the new queue intact.
    pub fn replace(&self, records: &[ScrobbleRecord]) -> Result<(), QueueError> {
        let temp = self.temp_path();

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let mut file = File::create(&temp).map_err(|e| QueueError::io(&temp, e))?;
        file.write_all(buf.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| QueueError::io(&temp, e))?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(|e| QueueError::io(&self.path, e))?;
        Ok(())
    }

    /// Keep undeliverable lines next to the queue rather than dropping them
    pub fn reject(&self, lines: &[String]) -> Result<(), QueueError> {
        if lines.is_empty() {
            return Ok(());
        }
        let path = self.rejected_path();
        let mut buf = lines.join("\n");
        buf.push('\n');
        append_line(&path, &buf)?;
        log::error!("Moved {} undeliverable record(s) to {:?}", lines.len(), path);
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), QueueError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| QueueError::io(parent, e))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| QueueError::io(path, e))?;

    // never glue a record onto the tail of a truncated one
    let mut buf = Vec::with_capacity(line.len() + 1);
    if ends_mid_line(&mut file).map_err(|e| QueueError::io(path, e))? {
        buf.push(b'\n');
    }
    buf.extend_from_slice(line.as_bytes());

    file.write_all(&buf)
        .and_then(|_| file.sync_data())
        .map_err(|e| QueueError::io(path, e))
}

fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
