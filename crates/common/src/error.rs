//! Error kinds raised by the pure data model (parsing and codec failures only — the resolver
//! itself never fails).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid preserve string {0:?}: {1}")]
    InvalidPreserveString(String, String),

    #[error("unknown IANA time zone {0:?}: {1}")]
    InvalidTimeZone(String, String),

    #[error("missing or incomplete parameters for backup name")]
    IncompleteBackupKey,

    #[error("malformed backup key component {component:?} in key {key:?}: {source}")]
    MalformedBackupKeyComponent {
        key: String,
        component: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}
