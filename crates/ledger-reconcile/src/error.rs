use std::path::PathBuf;

/// Failures of the matching engine and of record loading.
///
/// `InvalidSelection` and `MalformedAmount` are expected during interactive use
/// and are recovered by asking again. `LoadFailure` ends the load step it
/// happened in. `ConsistencyViolation` means an engine invariant was broken
/// and the operation was abandoned without touching any state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("selection {index} is out of range ({available} candidate(s) available)")]
    InvalidSelection { index: usize, available: usize },

    #[error("'{0}' is not a valid amount")]
    MalformedAmount(String),

    #[error("cannot load {}{}: {reason}", .path.display(), line_suffix(.line))]
    LoadFailure {
        path: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|line| format!(" (line {line})")).unwrap_or_default()
}

impl ReconcileError {
    pub(crate) fn consistency(message: impl Into<String>) -> Self {
        ReconcileError::ConsistencyViolation(message.into())
    }
}
