//! Production implementations of the planner's three capability traits: local btrfs snapshots,
//! S3 object storage, and process-pipeline byte filters.

mod btrfs;
mod error;
mod pipeline;
mod s3;

pub use btrfs::{source_identity, BtrfsSnapshotStore};
pub use error::AdapterError;
pub use pipeline::ProcessPipeline;
pub use s3::{S3EndpointConfig, S3ObjectStore, Verify};
