//! CLI-specific error type and exit code mapping

use layerlens_core::error::LayerlensError;

/// CLI-specific error type.
///
/// Every fatal condition maps to exit code 1; success is exit code 0,
/// with or without findings.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading failure (regex corpus, exclude file, advisory db).
    #[error("configuration error: {0}")]
    Config(String),

    /// Wrapped domain error from the scanner pipeline.
    #[error("{0}")]
    Scan(#[from] LayerlensError),

    /// Report serialisation failure.
    #[error("report error: {0}")]
    Report(#[from] serde_json::Error),

    /// IO error (report file write, archive read, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success (with or without findings)       |
    /// | 1    | Fatal error (bad ref, registry, IO, ...) |
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl From<layerlens_core::error::ConfigError> for CliError {
    fn from(e: layerlens_core::error::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<layerlens_deps_audit::DepsAuditError> for CliError {
    fn from(e: layerlens_deps_audit::DepsAuditError) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_errors_exit_with_one() {
        let err = CliError::Config("bad pattern".to_owned());
        assert_eq!(err.exit_code(), 1);

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(CliError::Io(io).exit_code(), 1);
    }

    #[test]
    fn config_error_display() {
        let err = CliError::Config("regexes.json not found".to_owned());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("regexes.json"));
    }

    #[test]
    fn core_config_error_converts() {
        let core_err = layerlens_core::error::ConfigError::FileNotFound {
            path: "x.json".to_owned(),
        };
        let cli_err: CliError = core_err.into();
        assert!(matches!(cli_err, CliError::Config(_)));
    }
}
