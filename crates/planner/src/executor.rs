//! Applies an [`Actions`] plan against the capability traits, in the fixed order rename → upload
//! → destroy → delete.

use crate::actions::Actions;
use crate::error::PlannerError;
use crate::traits::{ByteFilterPipeline, ObjectStore, SnapshotStore};
use std::collections::HashMap;
use std::io::Write;
use std::thread;

/// Identity pipeline used when a source has no `pipe_through` filters configured: writes pass
/// straight through an OS pipe to the reader end.
pub struct IdentityPipeline;

impl ByteFilterPipeline for IdentityPipeline {
    fn spawn(&self) -> Result<(Box<dyn Write + Send>, Box<dyn std::io::Read + Send>), PlannerError> {
        let (reader, writer) = os_pipe::pipe()?;
        Ok((Box::new(writer), Box::new(reader)))
    }
}

/// Executes an [`Actions`] plan. `stores` and `remotes` are keyed by the ids carried on each
/// action; `pipelines` are keyed by `"{store_id}::{remote_name}"`, falling back to
/// [`IdentityPipeline`] when a source has no filters configured.
pub struct Executor<'a> {
    pub stores: HashMap<String, &'a dyn SnapshotStore>,
    pub remotes: HashMap<String, &'a dyn ObjectStore>,
    pub pipelines: HashMap<String, &'a dyn ByteFilterPipeline>,
}

impl<'a> Executor<'a> {
    fn store(&self, id: &str) -> Result<&'a dyn SnapshotStore, PlannerError> {
        self.stores.get(id).copied().ok_or_else(|| PlannerError::NotASubvolume { path: id.to_owned() })
    }

    fn remote(&self, name: &str) -> Result<&'a dyn ObjectStore, PlannerError> {
        self.remotes.get(name).copied().ok_or_else(|| PlannerError::RemoteUnavailable {
            remote: name.to_owned(),
            source: Box::new(std::io::Error::other("remote not configured in this executor")),
        })
    }

    fn pipeline_for(&self, store_id: &str, remote_name: &str) -> &dyn ByteFilterPipeline {
        self.pipelines
            .get(&format!("{store_id}::{remote_name}"))
            .copied()
            .unwrap_or(&IdentityPipeline)
    }

    /// Applies the full plan in order. Stops at the first fatal error; actions already
    /// performed are not rolled back.
    pub fn execute(&self, actions: &Actions) -> Result<(), PlannerError> {
        for rename in &actions.rename_snapshots {
            tracing::info!(id = rename.snapshot_id, target = %rename.target_name, "renaming snapshot");
            self.store(&rename.store_id)?.rename_snapshot(rename.snapshot_id, &rename.target_name)?;
        }

        for upload in &actions.upload_backups {
            tracing::info!(key = %upload.key, remote = %upload.remote_name, "uploading backup");
            self.upload_one(upload)?;
        }

        for destroy in &actions.destroy_snapshots {
            tracing::info!(id = destroy.snapshot_id, "destroying snapshot");
            self.store(&destroy.store_id)?.destroy_snapshot(destroy.snapshot_id)?;
        }

        for delete in &actions.delete_backups {
            tracing::info!(key = %delete.key, remote = %delete.remote_name, "deleting stale backup");
            self.remote(&delete.remote_name)?.delete(&delete.key)?;
        }

        Ok(())
    }

    fn upload_one(&self, upload: &crate::actions::UploadBackup) -> Result<(), PlannerError> {
        let store = self.store(&upload.store_id)?;
        let remote = self.remote(&upload.remote_name)?;
        let pipeline = self.pipeline_for(&upload.store_id, &upload.remote_name);

        let (mut filter_writer, mut filter_reader) = pipeline.spawn()?;
        let snapshot_id = upload.snapshot_id;
        let send_parent_id = upload.send_parent_id;

        // A scoped thread lets the producer borrow `store` and the pipe's writer end without
        // requiring `'static`; the scope joins the producer before returning on every exit path,
        // including panics, so the producer is always joined before the consumer result is used.
        let (upload_result, producer_result) = thread::scope(|scope| {
            let handle = scope.spawn(move || -> Result<(), PlannerError> {
                let result = store.send(snapshot_id, send_parent_id, filter_writer.as_mut());
                drop(filter_writer); // closes the writer exactly once, on every exit path
                result
            });
            let upload_result = remote.put_stream(&upload.key, filter_reader.as_mut());
            let producer_result = handle.join().unwrap_or_else(|_| {
                Err(PlannerError::Io(std::io::Error::other("snapshot send thread panicked")))
            });
            (upload_result, producer_result)
        });

        upload_result?;
        producer_result?;
        Ok(())
    }
}
