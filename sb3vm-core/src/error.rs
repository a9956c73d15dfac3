use thiserror::Error;

/// Load-time contract faults. Runtime block execution never errors: per the
/// degradation policy, a malformed graph produces zero/empty results and a
/// `tracing::warn!`, not a failure.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project has no stage target")]
    MissingStage,

    #[error("project has {0} stage targets, expected exactly one")]
    MultipleStages(usize),

    #[error("project has no targets")]
    Empty,

    #[error("invalid project JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
