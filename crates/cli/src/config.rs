//! YAML configuration file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use coldsnap_common::{CommonError, RetentionParams};

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub timezone: String,
    pub sources: Vec<RawSource>,
    pub remotes: Vec<RawRemote>,
}

#[derive(Debug, Deserialize)]
pub struct RawSource {
    pub path: PathBuf,
    pub snapshots: PathBuf,
    pub upload_to_remotes: Vec<RawUpload>,
}

#[derive(Debug, Deserialize)]
pub struct RawUpload {
    pub id: String,
    pub preserve: String,
    #[serde(default)]
    pub pipe_through: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RawRemote {
    pub id: String,
    pub s3: RawS3Remote,
}

#[derive(Debug, Deserialize)]
pub struct RawS3Remote {
    pub bucket: String,
    #[serde(default)]
    pub endpoint: Option<RawS3Endpoint>,
}

#[derive(Debug, Deserialize)]
pub struct RawS3Endpoint {
    pub region_name: Option<String>,
    pub profile_name: Option<String>,
    #[serde(default)]
    pub verify: RawVerify,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawVerify {
    Bool(bool),
    CaPath(String),
}

impl Default for RawVerify {
    fn default() -> Self {
        Self::Bool(true)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("parsing config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_yaml::Error },
    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
    #[error("source {source_path} references unknown remote id {remote_id:?}")]
    UnknownRemote { source_path: PathBuf, remote_id: String },
    #[error("invalid preserve string in source {source_path}: {source}")]
    InvalidPreserve { source_path: PathBuf, #[source] source: CommonError },
    #[error(
        "multiple sources/remotes/preserve strings configured; current validation supports exactly \
         one snapshot directory, one remote, and one distinct preserve string across all uploads"
    )]
    UnsupportedTopology,
}

/// The validated, resolved form of [`RawConfig`]. Validation enforces the single-source/
/// single-remote/single-preserve-string restriction, even though the data model (`RawConfig`)
/// is more permissive.
pub struct Config {
    pub timezone: jiff::tz::TimeZone,
    pub source_path: PathBuf,
    pub snapshots_path: PathBuf,
    pub remote_id: String,
    pub bucket: String,
    pub endpoint: Option<RawS3Endpoint>,
    pub preserve: RetentionParams,
    pub pipe_through: Vec<Vec<String>>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_owned(), source })?;
        let raw: RawConfig = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let timezone = jiff::tz::TimeZone::get(&raw.timezone).map_err(|_| ConfigError::UnknownTimezone(raw.timezone.clone()))?;

        if raw.sources.len() != 1 || raw.sources[0].upload_to_remotes.len() != 1 {
            return Err(ConfigError::UnsupportedTopology);
        }
        let source = &raw.sources[0];
        let upload = &source.upload_to_remotes[0];

        let remote = raw
            .remotes
            .iter()
            .find(|r| r.id == upload.id)
            .ok_or_else(|| ConfigError::UnknownRemote { source_path: source.path.clone(), remote_id: upload.id.clone() })?;

        let preserve = RetentionParams::parse(&upload.preserve)
            .map_err(|source_err| ConfigError::InvalidPreserve { source_path: source.path.clone(), source: source_err })?;

        Ok(Config {
            timezone,
            source_path: source.path.clone(),
            snapshots_path: source.snapshots.clone(),
            remote_id: remote.id.clone(),
            bucket: remote.s3.bucket.clone(),
            endpoint: remote.s3.endpoint.clone(),
            preserve,
            pipe_through: upload.pipe_through.clone(),
        })
    }
}

impl Clone for RawS3Endpoint {
    fn clone(&self) -> Self {
        Self {
            region_name: self.region_name.clone(),
            profile_name: self.profile_name.clone(),
            verify: match &self.verify {
                RawVerify::Bool(b) => RawVerify::Bool(*b),
                RawVerify::CaPath(p) => RawVerify::CaPath(p.clone()),
            },
            endpoint_url: self.endpoint_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coldsnap.yaml");
        std::fs::File::create(&path).unwrap().write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    const VALID: &str = r#"
timezone: UTC
sources:
  - path: /vol/data
    snapshots: /vol/.snapshots
    upload_to_remotes:
      - id: main
        preserve: "1y 12m 30d"
remotes:
  - id: main
    s3:
      bucket: my-backups
      endpoint:
        region_name: us-east-1
"#;

    #[test]
    fn loads_a_well_formed_config() {
        let (_dir, path) = write_config(VALID);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.source_path, PathBuf::from("/vol/data"));
        assert_eq!(config.bucket, "my-backups");
        assert_eq!(config.preserve.years, 1);
    }

    #[test]
    fn rejects_unknown_remote_id() {
        let (_dir, path) = write_config(
            r#"
timezone: UTC
sources:
  - path: /vol/data
    snapshots: /vol/.snapshots
    upload_to_remotes:
      - id: nope
        preserve: "1y"
remotes:
  - id: main
    s3:
      bucket: my-backups
"#,
        );
        assert!(matches!(Config::load(&path), Err(ConfigError::UnknownRemote { .. })));
    }

    #[test]
    fn rejects_invalid_preserve_string() {
        let (_dir, path) = write_config(
            r#"
timezone: UTC
sources:
  - path: /vol/data
    snapshots: /vol/.snapshots
    upload_to_remotes:
      - id: main
        preserve: "not a preserve string"
remotes:
  - id: main
    s3:
      bucket: my-backups
"#,
        );
        assert!(matches!(Config::load(&path), Err(ConfigError::InvalidPreserve { .. })));
    }

    #[test]
    fn rejects_multiple_sources() {
        let (_dir, path) = write_config(
            r#"
timezone: UTC
sources:
  - path: /vol/data
    snapshots: /vol/.snapshots
    upload_to_remotes:
      - id: main
        preserve: "1y"
  - path: /vol/other
    snapshots: /vol/.snapshots-other
    upload_to_remotes:
      - id: main
        preserve: "1y"
remotes:
  - id: main
    s3:
      bucket: my-backups
"#,
        );
        assert!(matches!(Config::load(&path), Err(ConfigError::UnsupportedTopology)));
    }

    #[test]
    fn rejects_unknown_timezone() {
        let (_dir, path) = write_config(
            r#"
timezone: Not/AZone
sources:
  - path: /vol/data
    snapshots: /vol/.snapshots
    upload_to_remotes:
      - id: main
        preserve: "1y"
remotes:
  - id: main
    s3:
      bucket: my-backups
"#,
        );
        assert!(matches!(Config::load(&path), Err(ConfigError::UnknownTimezone(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        assert!(matches!(Config::load(&path), Err(ConfigError::Io { .. })));
    }
}
