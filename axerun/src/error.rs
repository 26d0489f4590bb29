/// Fatal failures of an audit run, one variant per workflow phase.
///
/// Collaborator errors are carried as `anyhow::Error` so their context chain
/// survives; `Display` renders the chain on one line.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connectivity error: {0:#}")]
    Connectivity(anyhow::Error),

    #[error("session error: {0:#}")]
    Session(anyhow::Error),

    #[error("navigation error: {0:#}")]
    Navigation(anyhow::Error),

    #[error("audit error: {0:#}")]
    Audit(anyhow::Error),

    #[error("report error: {0:#}")]
    Report(anyhow::Error),
}

impl RunError {
    /// The underlying collaborator error, when there is one.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Configuration(_) => None,
            Self::Connectivity(e)
            | Self::Session(e)
            | Self::Navigation(e)
            | Self::Audit(e)
            | Self::Report(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for RunError {
    fn from(err: std::io::Error) -> Self {
        Self::Report(anyhow::Error::new(err).context("failed to write console output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn display_includes_context_chain() {
        let inner: anyhow::Result<()> = Err(anyhow!("HTTP 401"));
        let err = RunError::Connectivity(inner.context("status check failed").unwrap_err());
        assert_eq!(
            err.to_string(),
            "connectivity error: status check failed: HTTP 401"
        );
    }

    #[test]
    fn configuration_has_no_cause() {
        let err = RunError::Configuration("missing credentials".into());
        assert!(err.cause().is_none());
        assert!(matches!(err, RunError::Configuration(_)));
    }

    #[test]
    fn io_errors_become_report_errors() {
        let err: RunError = std::io::Error::other("broken pipe").into();
        assert!(matches!(err, RunError::Report(_)));
        assert!(err.to_string().contains("broken pipe"));
    }
}
