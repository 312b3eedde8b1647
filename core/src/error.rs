//! Error types for the portdeck-core library.

use thiserror::Error;

/// Result type alias for portdeck operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during port discovery and process management.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to execute a system command.
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// The listing tool reported a permission problem; some sockets may be
    /// owned by other users.
    #[error("Insufficient privilege: {0}")]
    PermissionDenied(String),

    /// Failed to parse command output.
    #[error("Failed to parse output: {0}")]
    ParseError(String),

    /// Failed to kill a process.
    #[error("Failed to kill process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Platform not supported.
    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),
}

impl Error {
    /// Classify a listing tool's non-zero exit by its stderr.
    ///
    /// Permission wording differs per tool, so match loosely.
    pub fn from_tool_stderr(tool: &str, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("access is denied")
        {
            Error::PermissionDenied(format!("{}: {}", tool, stderr.trim()))
        } else {
            Error::CommandFailed(format!("{} exited non-zero: {}", tool, stderr.trim()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_stderr_classified() {
        let err = Error::from_tool_stderr("lsof", "lsof: Permission denied");
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn test_generic_stderr_classified() {
        let err = Error::from_tool_stderr("netstat", "unknown flag -z");
        assert!(matches!(err, Error::CommandFailed(_)));
    }
}
