//! Orchestrates the resolver over real sources, snapshot stores and remotes, and compiles the
//! resulting [`assessor::Assessment`] into an executable [`actions::Actions`] plan.

pub mod actions;
pub mod assessor;
pub mod error;
pub mod executor;
pub mod naming;
pub mod traits;

#[cfg(any(test, feature = "fakes"))]
pub mod fakes;

pub use actions::{compile, Actions, DeleteBackup, DestroySnapshot, RenameSnapshot, UploadBackup};
pub use assessor::{assess, destroy_proposed, AssessedBackup, AssessedSnapshot, Assessment, ConfigTuple};
pub use error::PlannerError;
pub use executor::{Executor, IdentityPipeline};
pub use traits::{ByteFilterPipeline, ObjectStore, SnapshotStore};
