use std::time::Duration;

/// Everything that can go wrong between a raw command string and a finished
/// pipeline run.
///
/// `Spawn` and `StageFailed` are kept separate so callers can tell a program
/// that never started from one that started and exited non-zero.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The command string could not be split into at least one stage.
    #[error("malformed command: {0}")]
    Malformed(String),

    /// A stage's text does not begin with any allowed prefix.
    /// Checked for every stage before anything is spawned.
    #[error("command not allowed: \"{text}\" (stage {index})")]
    PolicyViolation {
        index: usize,
        program: String,
        text: String,
    },

    /// The pipeline did not finish within its wall-clock budget.
    /// All stages have been terminated by the time this is returned.
    #[error("pipeline timed out after {} seconds", timeout.as_secs())]
    Timeout { timeout: Duration },

    /// A stage's process could not be started or awaited.
    #[error("failed to run \"{program}\" (stage {index}): {source}")]
    Spawn {
        index: usize,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage ran and exited with a non-zero status. When several stages
    /// fail, this carries the first one in pipeline order.
    #[error("stage {index} (\"{program}\") exited with status {code}")]
    StageFailed {
        index: usize,
        program: String,
        code: i32,
        stderr: String,
    },
}

impl PipelineError {
    /// Returns `true` when the underlying cause is a missing program.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn not_found_detected() {
        let err = PipelineError::Spawn {
            index: 0,
            program: "nope".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.is_not_found());
    }

    #[test]
    fn other_spawn_error_is_not_not_found() {
        let err = PipelineError::Spawn {
            index: 0,
            program: "nope".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn timeout_message_names_seconds() {
        let err = PipelineError::Timeout {
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "pipeline timed out after 10 seconds");
    }
}
