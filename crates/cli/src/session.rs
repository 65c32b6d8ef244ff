//! Wires a loaded [`Config`] into the capability implementations and the planner, shared
//! between the `update` and `plan` subcommands.

use std::path::Path;

use coldsnap_adapters::{BtrfsSnapshotStore, ProcessPipeline, S3EndpointConfig, S3ObjectStore, Verify};
use coldsnap_common::RetentionPolicy;
use coldsnap_planner::{assess, compile, Actions, Assessment, ConfigTuple};

use crate::config::{Config, RawVerify};

pub const SOURCE_NAME: &str = "source";

pub struct Session {
    pub config: Config,
    pub store: BtrfsSnapshotStore,
    pub remote: S3ObjectStore,
    pub pipeline: ProcessPipeline,
}

impl Session {
    pub fn open(config_path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(config_path)?;
        let store = BtrfsSnapshotStore::open(&config.snapshots_path)?;

        let endpoint = config.endpoint.as_ref().map(to_endpoint_config).unwrap_or_default();
        let remote = S3ObjectStore::connect(config.bucket.clone(), &endpoint)?;
        let pipeline = ProcessPipeline::new(config.pipe_through.clone());

        Ok(Self { config, store, remote, pipeline })
    }

    pub fn assess(&self) -> anyhow::Result<(Assessment, Actions, jiff::tz::TimeZone)> {
        let (source_uuid, source_ctransid) = coldsnap_adapters::source_identity(&self.config.source_path)?;
        let policy = RetentionPolicy::new(self.config.preserve, now_unix(), self.config.timezone.clone());

        let tuple = ConfigTuple {
            source_name: SOURCE_NAME.to_owned(),
            source_path: self.config.source_path.clone(),
            source_uuid,
            source_ctransid,
            store: &self.store,
            remote: &self.remote,
            remote_name: self.config.remote_id.clone(),
            policy,
        };

        let assessment = assess(std::slice::from_ref(&tuple))?;
        let actions = compile(&assessment, &self.config.timezone);
        Ok((assessment, actions, self.config.timezone.clone()))
    }

    pub fn executor(&self) -> coldsnap_planner::Executor<'_> {
        let mut stores = std::collections::HashMap::new();
        stores.insert(SOURCE_NAME.to_owned(), &self.store as &dyn coldsnap_planner::SnapshotStore);
        let mut remotes = std::collections::HashMap::new();
        remotes.insert(self.config.remote_id.clone(), &self.remote as &dyn coldsnap_planner::ObjectStore);
        let mut pipelines = std::collections::HashMap::new();
        pipelines.insert(
            format!("{SOURCE_NAME}::{}", self.config.remote_id),
            &self.pipeline as &dyn coldsnap_planner::ByteFilterPipeline,
        );
        coldsnap_planner::Executor { stores, remotes, pipelines }
    }
}

fn to_endpoint_config(raw: &crate::config::RawS3Endpoint) -> S3EndpointConfig {
    S3EndpointConfig {
        region_name: raw.region_name.clone(),
        profile_name: raw.profile_name.clone(),
        verify: match &raw.verify {
            RawVerify::Bool(true) => Verify::SystemDefault,
            RawVerify::Bool(false) => Verify::Disabled,
            RawVerify::CaPath(path) => Verify::CaBundle(path.clone()),
        },
        endpoint_url: raw.endpoint_url.clone(),
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
