//! Adapter-level error type. Every production `SnapshotStore`/`ObjectStore`/`ByteFilterPipeline`
//! failure is converted to a [`coldsnap_planner::PlannerError`] at the trait boundary so the
//! planner never depends on adapter-specific error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("path {path} is not on a btrfs filesystem")]
    NotBtrfs { path: String },

    #[error("path {path} is not a btrfs subvolume")]
    NotASubvolume { path: String },

    #[error("btrfs ioctl {op} failed on {path}: {source}")]
    Ioctl { op: &'static str, path: String, #[source] source: rustix::io::Errno },

    #[error("s3 request failed: {0}")]
    S3(String),

    #[error("filter command {command:?} failed to spawn: {source}")]
    PipelineSpawn { command: Vec<String>, #[source] source: std::io::Error },

    #[error("filter command {command:?} exited with status {status}")]
    PipelineExitStatus { command: Vec<String>, status: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<AdapterError> for coldsnap_planner::PlannerError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::NotBtrfs { path } => coldsnap_planner::PlannerError::UnsupportedFilesystem { path },
            AdapterError::NotASubvolume { path } => coldsnap_planner::PlannerError::NotASubvolume { path },
            AdapterError::Ioctl { op, path, source } => {
                coldsnap_planner::PlannerError::Ioctl { op, path, source: std::io::Error::from(source) }
            }
            AdapterError::S3(message) => coldsnap_planner::PlannerError::RemoteUnavailable {
                remote: "s3".to_owned(),
                source: Box::new(std::io::Error::other(message)),
            },
            AdapterError::PipelineSpawn { command, source } => {
                coldsnap_planner::PlannerError::PipelineSpawn { command, source }
            }
            AdapterError::PipelineExitStatus { command, status } => coldsnap_planner::PlannerError::PipelineSpawn {
                command,
                source: std::io::Error::other(status),
            },
            AdapterError::Io(source) => coldsnap_planner::PlannerError::Io(source),
        }
    }
}
