//! CLI Exit Codes
//!
//! Exit codes shared by the command-line tools.

use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// Any failure: connection, protocol, malformed input, I/O
    pub const ERROR: u8 = 1;

    /// Invalid arguments (reported by the argument parser)
    pub const INVALID_ARGS: u8 = 2;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for the operator
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with the general error code
    pub fn failure(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::ERROR, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Print the message (errors to stderr) and convert to an [`ExitCode`]
    pub fn report(self) -> ExitCode {
        match &self {
            Self::Success(Some(msg)) => println!("{}", msg),
            Self::Error(_, msg) => eprintln!("{}", msg),
            Self::Success(None) => {}
        }
        ExitCode::from(self.code())
    }
}

impl From<anyhow::Result<()>> for CliResult {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(err) => Self::failure(format!("{:#}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::failure("Failed to connect");
        assert!(!error.is_success());
        assert_eq!(error.code(), 1);
        assert_eq!(error.message(), Some("Failed to connect"));
    }

    #[test]
    fn test_from_anyhow() {
        let result: CliResult = Err(anyhow::anyhow!("wrong size").context("reading input")).into();
        assert_eq!(result.code(), ExitCodes::ERROR);
        assert_eq!(result.message(), Some("reading input: wrong size"));
    }
}
