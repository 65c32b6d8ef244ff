//! Error taxonomy for the planner and its collaborator capabilities.

use coldsnap_common::Uuid16;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("snapshot directory {path} is not on a supported filesystem")]
    UnsupportedFilesystem { path: String },

    #[error("path {path} is not a subvolume boundary")]
    NotASubvolume { path: String },

    #[error("remote {remote} is unreachable or authentication failed: {source}")]
    RemoteUnavailable { remote: String, #[source] source: Box<dyn std::error::Error + Send + Sync> },

    #[error("snapshot id {id} moved or was renamed since we started this pass")]
    ConcurrentMutation { id: u64 },

    #[error("upload of {key} failed and was aborted: {source}")]
    PartialUpload { key: String, #[source] source: Box<dyn std::error::Error + Send + Sync> },

    #[error("btrfs ioctl {op} failed on {path}: {source}")]
    Ioctl { op: &'static str, path: String, #[source] source: std::io::Error },

    #[error("filter pipeline command {command:?} failed to spawn: {source}")]
    PipelineSpawn { command: Vec<String>, #[source] source: std::io::Error },

    #[error(transparent)]
    BackupKey(#[from] coldsnap_common::CommonError),

    #[error("internal invariant violated: expected a local snapshot for uuid {0}")]
    MissingLocalSnapshot(Uuid16),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
