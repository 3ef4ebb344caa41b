//! JSON-lines record store
//!
//! - `RecordWriter` creates the destination (and its parent directories)
//!   and appends one record per line. Each append is flushed before it is
//!   counted, so `written()` is what actually reached the file. Nothing is
//!   rolled back on failure; a partial file is an accepted outcome.
//! - `RecordReader` yields one record per non-blank line. The first
//!   malformed line ends the sequence with a `Decode` error carrying its
//!   line number. Reopen the file to start over.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};

use crate::record::{LegacyRecord, PersistedRecord};
use crate::utils::{Error, Result};

pub const RECORD_FILE_EXTENSION: &str = "jsonl";
pub const LEGACY_FILE_EXTENSION: &str = "json";

pub struct RecordWriter {
    path: PathBuf,
    file: File,
    written: u64,
}

impl RecordWriter {
    /// Creates (or truncates) the file at `path`.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }

        let file = File::create(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;

        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub async fn append(&mut self, record: &PersistedRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .await
            .map_err(|e| Error::io(&self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| Error::io(&self.path, e))?;

        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs the file to disk and returns the number of records written.
    pub async fn finish(self) -> Result<u64> {
        self.file
            .sync_all()
            .await
            .map_err(|e| Error::io(&self.path, e))?;
        Ok(self.written)
    }
}

enum Source {
    Lines(Lines<BufReader<File>>),
    /// Parsed on the first read so a malformed array surfaces like any
    /// other decode failure.
    Legacy {
        raw: Option<Vec<u8>>,
        records: std::vec::IntoIter<PersistedRecord>,
    },
}

pub struct RecordReader {
    path: PathBuf,
    source: Source,
    line: usize,
    done: bool,
}

impl RecordReader {
    /// Opens `path`. Files ending in `.json` are read as a legacy array.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let is_legacy = path
            .extension()
            .is_some_and(|ext| ext == LEGACY_FILE_EXTENSION);

        let source = if is_legacy {
            let raw = fs::read(&path).await.map_err(|e| Error::io(&path, e))?;
            Source::Legacy {
                raw: Some(raw),
                records: Vec::new().into_iter(),
            }
        } else {
            let file = File::open(&path).await.map_err(|e| Error::io(&path, e))?;
            Source::Lines(BufReader::new(file).lines())
        };

        Ok(Self {
            path,
            source,
            line: 0,
            done: false,
        })
    }

    /// Next record, `Ok(None)` at end of input. After an error every later
    /// call returns `Ok(None)`.
    pub async fn next_record(&mut self) -> Result<Option<PersistedRecord>> {
        if self.done {
            return Ok(None);
        }

        let next = self.advance().await;
        if !matches!(next, Ok(Some(_))) {
            self.done = true;
        }
        next
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn advance(&mut self) -> Result<Option<PersistedRecord>> {
        match &mut self.source {
            Source::Legacy { raw, records } => {
                if let Some(raw) = raw.take() {
                    let parsed: Vec<LegacyRecord> =
                        serde_json::from_slice(&raw).map_err(|e| Error::decode(None, e))?;
                    *records = parsed
                        .into_iter()
                        .map(PersistedRecord::from)
                        .collect::<Vec<_>>()
                        .into_iter();
                }
                Ok(records.next())
            }
            Source::Lines(lines) => loop {
                let Some(line) = lines.next_line().await.map_err(|e| match e.kind() {
                    // not UTF-8: the line is malformed, the file is fine
                    ErrorKind::InvalidData => Error::decode(Some(self.line + 1), e),
                    _ => Error::io(&self.path, e),
                })?
                else {
                    return Ok(None);
                };
                self.line += 1;

                if line.trim().is_empty() {
                    continue;
                }

                return serde_json::from_str(&line)
                    .map(Some)
                    .map_err(|e| Error::decode(Some(self.line), e));
            },
        }
    }
}

/// Names of the `.jsonl` files directly inside `directory`. An empty set
/// means there is nothing to offer and the caller should ask for a name.
pub async fn list_candidate_files(directory: impl AsRef<Path>) -> Result<BTreeSet<String>> {
    let directory = directory.as_ref();
    let mut entries = fs::read_dir(directory)
        .await
        .map_err(|e| Error::io(directory, e))?;

    let mut files = BTreeSet::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io(directory, e))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| Error::io(&path, e))?
            .is_file();

        if is_file && path.extension().is_some_and(|ext| ext == RECORD_FILE_EXTENSION) {
            files.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }

    Ok(files)
}

/// `{topic}-{subscription}-{YYYYMMDD-HHMMSS}-dlq-messages.jsonl`
pub fn default_drain_file_name<Tz>(topic: &str, subscription: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "{topic}-{subscription}-{}-dlq-messages.{RECORD_FILE_EXTENSION}",
        now.format("%Y%m%d-%H%M%S")
    )
}

const DRAIN_FILE_SUFFIX: &str = "-dlq-messages.jsonl";
const DRAIN_STAMP_LEN: usize = "YYYYMMDD-HHMMSS".len();

/// The most recently stamped drain file for `topic` in `directory`, judged
/// by the timestamp in its name rather than file metadata.
///
/// `pairs` lists every known topic/subscription pair. A file counts only
/// when its name belongs to a pair of `topic` and to no pair of another
/// topic, since names like `orders-eu-billing` are ambiguous on their own.
pub async fn latest_drain_file(
    directory: impl AsRef<Path>,
    topic: &str,
    pairs: &[(String, String)],
) -> Result<Option<PathBuf>> {
    let directory = directory.as_ref();

    let latest = list_candidate_files(directory)
        .await?
        .into_iter()
        .filter_map(|name| {
            let stamp = {
                let (owner, stamp) = split_drain_name(&name)?;
                if !belongs_to(owner, topic, pairs) {
                    return None;
                }
                stamp.to_string()
            };
            Some((stamp, name))
        })
        .max();

    Ok(latest.map(|(_, name)| directory.join(name)))
}

fn belongs_to(owner: &str, topic: &str, pairs: &[(String, String)]) -> bool {
    let mut topics = pairs
        .iter()
        .filter(|(t, s)| owner == format!("{t}-{s}"))
        .map(|(t, _)| t.as_str())
        .peekable();
    topics.peek().is_some() && topics.all(|t| t == topic)
}

/// Splits `{topic}-{subscription}-{stamp}-dlq-messages.jsonl` into the
/// `{topic}-{subscription}` part and the stamp.
fn split_drain_name(name: &str) -> Option<(&str, &str)> {
    let stem = name.strip_suffix(DRAIN_FILE_SUFFIX)?;
    let start = stem.len().checked_sub(DRAIN_STAMP_LEN)?;
    let stamp = stem.get(start..)?;
    let owner = stem.get(..start)?.strip_suffix('-')?;
    Some((owner, stamp))
}
