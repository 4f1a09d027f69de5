use crate::error::{Result, StorageError};
use crate::AuditSink;
use alertrelay_common::types::{AlertEvent, Notice};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Upper bound on `<stem>.<n>.json` probing for repeated deliveries of the
/// same event.
const MAX_RECORD_SUFFIX: u32 = 1000;

/// Writes each notice to `<dir>/<rule_id>_<event_id>_<trigger_time>.json`.
///
/// Files are created with `create_new`, so an existing record is never
/// rewritten; a re-run of the same event lands in `<stem>.1.json`,
/// `<stem>.2.json` and so on.
pub struct FileAuditStore {
    dir: PathBuf,
}

impl FileAuditStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record name stem. All three identifiers are required to keep names
    /// unique per occurrence.
    pub fn record_stem(event: &AlertEvent) -> String {
        format!(
            "{}_{}_{}",
            sanitize(&event.rule_id),
            sanitize(&event.event_id),
            event.trigger_time
        )
    }

    fn candidate(&self, stem: &str, n: u32) -> PathBuf {
        if n == 0 {
            self.dir.join(format!("{stem}.json"))
        } else {
            self.dir.join(format!("{stem}.{n}.json"))
        }
    }

    fn write_new(&self, stem: &str, contents: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;

        for n in 0..MAX_RECORD_SUFFIX {
            let path = self.candidate(stem, n);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(StorageError::Io { path, source }),
            };
            file.write_all(contents)
                .and_then(|()| file.sync_all())
                .map_err(|source| StorageError::Io {
                    path: path.clone(),
                    source,
                })?;
            return Ok(path);
        }

        Err(StorageError::NameExhausted {
            stem: stem.to_string(),
        })
    }

    /// Reads a stored record back.
    pub fn load(path: &Path) -> Result<Value> {
        let bytes = std::fs::read(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl AuditSink for FileAuditStore {
    fn persist(&self, notice: &Notice) -> Result<PathBuf> {
        let stem = Self::record_stem(&notice.event);
        let body = serde_json::to_vec_pretty(&notice.raw)?;
        let path = self.write_new(&stem, &body)?;
        tracing::debug!(path = %path.display(), "Notice persisted");
        Ok(path)
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
