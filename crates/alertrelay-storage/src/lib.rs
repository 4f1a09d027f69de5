//! Audit persistence for dispatched notices.
//!
//! Every incoming notice is written verbatim to local storage before
//! delivery so it can be inspected or replayed later. The default
//! implementation ([`file::FileAuditStore`]) writes one pretty-printed JSON
//! file per event into a directory.

pub mod error;
pub mod file;


use alertrelay_common::types::Notice;
use std::path::PathBuf;

/// Durable sink for raw notice payloads.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because a single sink serves every dispatch in the process.
pub trait AuditSink: Send + Sync {
    /// Persists the complete raw payload of `notice` and returns where it
    /// was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be written. Callers treat
    /// this as non-fatal.
    fn persist(&self, notice: &Notice) -> error::Result<PathBuf>;
}
