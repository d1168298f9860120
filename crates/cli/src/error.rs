//! CLI error types.

use std::fmt;

use alipay_gateway_common::error::AlipayError;
use error_stack::Report;

#[derive(Debug)]
pub enum CliError {
    /// Configuration file error
    Config(String),
    /// Invalid command-line input
    Input(String),
    /// IO error
    Io(std::io::Error),
    /// Signing, verification or certificate failure
    Gateway(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Input(msg) => write!(f, "Invalid input: {}", msg),
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::Gateway(msg) => write!(f, "Gateway error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<Report<AlipayError>> for CliError {
    fn from(report: Report<AlipayError>) -> Self {
        match report.current_context() {
            AlipayError::Configuration { .. } => CliError::Config(format!("{:?}", report)),
            _ => CliError::Gateway(format!("{:?}", report)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_cli_error_display() {
        assert_eq!(
            format!("{}", CliError::Config("test".into())),
            "Configuration error: test"
        );
        assert_eq!(
            format!("{}", CliError::Input("test".into())),
            "Invalid input: test"
        );
        assert_eq!(
            format!("{}", CliError::Gateway("test".into())),
            "Gateway error: test"
        );
    }

    #[test]
    fn test_cli_error_from_report() {
        let config: CliError = Report::new(AlipayError::missing("app_id")).into();
        assert!(matches!(config, CliError::Config(msg) if msg.contains("app_id")));

        let verification: CliError = Report::new(AlipayError::Verification {
            message: "mismatch".into(),
        })
        .into();
        assert!(matches!(verification, CliError::Gateway(_)));
    }

    #[test]
    fn test_cli_error_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err: CliError = io_err.into();
        assert!(cli_err.source().is_some());

        let config_err = CliError::Config("test".into());
        assert!(config_err.source().is_none());
    }
}
