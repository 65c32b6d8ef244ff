//! Process exit codes for the coldsnap CLI.

use std::process;

/// Named exit codes. 0 and 1 are the conventional success/usage codes; the rest refine
/// "non-zero on unhandled action failure" into the error taxonomy so operators can script
/// against specific failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// Misuse: non-TTY invocation without `--force`, or a malformed config.
    Usage = 1,
    Environment = 10,
    ConcurrentMutation = 11,
    PartialUpload = 12,
    RemoteUnavailable = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Maps an anyhow error chain to an exit code by walking it for recognized typed errors.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(config_err) = cause.downcast_ref::<crate::config::ConfigError>() {
                let _ = config_err;
                return Self::Usage;
            }
            if let Some(planner_err) = cause.downcast_ref::<coldsnap_planner::PlannerError>() {
                return match planner_err {
                    coldsnap_planner::PlannerError::UnsupportedFilesystem { .. }
                    | coldsnap_planner::PlannerError::NotASubvolume { .. } => Self::Environment,
                    coldsnap_planner::PlannerError::RemoteUnavailable { .. } => Self::RemoteUnavailable,
                    coldsnap_planner::PlannerError::ConcurrentMutation { .. } => Self::ConcurrentMutation,
                    coldsnap_planner::PlannerError::PartialUpload { .. } => Self::PartialUpload,
                    _ => Self::Usage,
                };
            }
        }
        Self::Usage
    }

    pub fn exit(self) -> ! {
        process::exit(self.code())
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Usage.code(), 1);
        assert_eq!(ExitCode::Environment.code(), 10);
    }

    #[test]
    fn remote_unavailable_maps_to_remote_code() {
        let err = anyhow::Error::new(coldsnap_planner::PlannerError::RemoteUnavailable {
            remote: "main".into(),
            source: Box::new(std::io::Error::other("boom")),
        });
        assert_eq!(ExitCode::from_error(&err), ExitCode::RemoteUnavailable);
    }

    #[test]
    fn concurrent_mutation_maps_to_its_own_code() {
        let err = anyhow::Error::new(coldsnap_planner::PlannerError::ConcurrentMutation { id: 7 });
        assert_eq!(ExitCode::from_error(&err), ExitCode::ConcurrentMutation);
    }

    #[test]
    fn generic_error_is_usage() {
        let err = anyhow::anyhow!("something went wrong");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }
}
