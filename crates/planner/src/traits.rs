//! The three capabilities the planner is parameterized over: `SnapshotStore`,
//! `ObjectStore` and `ByteFilterPipeline`. Production code gets one real implementation of each
//! (in `coldsnap-adapters`); tests get the in-memory fakes in [`crate::fakes`].

use crate::error::PlannerError;
use coldsnap_common::SnapshotInfo;
use std::io::{Read, Write};
use std::path::PathBuf;

/// A local directory of read-only snapshots on the same filesystem as its source subvolume.
pub trait SnapshotStore: Send + Sync {
    /// All read-only snapshots currently present, regardless of which source they belong to.
    fn list(&self) -> Result<Vec<SnapshotInfo>, PlannerError>;

    /// Creates a new read-only snapshot of `source_path`, named transiently
    /// `"<source>.NEW.<pid>"`.
    fn create_snapshot(&self, source_path: &std::path::Path, transient_name: &str) -> Result<SnapshotInfo, PlannerError>;

    /// Destroys the snapshot with the given store-local id. Implementations must refuse to
    /// destroy anything that isn't a read-only snapshot of a configured source.
    fn destroy_snapshot(&self, id: u64) -> Result<(), PlannerError>;

    /// Renames the on-disk entry for `id` to `target_name`.
    fn rename_snapshot(&self, id: u64, target_name: &str) -> Result<(), PlannerError>;

    /// Streams an incremental (`parent_id = Some`) or full (`None`) send of `id` into `writer`.
    /// Must detect and fail if `id` no longer refers to the snapshot enumerated earlier in this
    /// pass.
    fn send(&self, id: u64, parent_id: Option<u64>, writer: &mut dyn Write) -> Result<(), PlannerError>;

    /// The on-disk path of snapshot `id`, used only to derive deterministic action sort keys.
    fn path_of(&self, id: u64) -> PathBuf;
}

/// An object-store namespace (bucket) holding backup objects.
pub trait ObjectStore: Send + Sync {
    /// Lists every key under this store, including non-backup keys (callers filter with
    /// [`coldsnap_common::decode_backup_key`]).
    fn list(&self) -> Result<Vec<String>, PlannerError>;

    /// Stores the exact concatenation of bytes read from `reader` at `key`. Implementations
    /// choose single-part vs. multipart; on any failure, no partial object may be observable at
    /// `key` afterwards.
    fn put_stream(&self, key: &str, reader: &mut dyn Read) -> Result<(), PlannerError>;

    /// Deletes `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), PlannerError>;
}

/// Connects a send stream to its destination through zero or more user-configured filter
/// processes (`pipe_through`). `spawn` returns the writer end the producer feeds
/// raw bytes into and the reader end the consumer reads filtered bytes from.
pub trait ByteFilterPipeline: Send + Sync {
    fn spawn(&self) -> Result<(Box<dyn Write + Send>, Box<dyn Read + Send>), PlannerError>;
}
