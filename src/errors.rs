//! Error types shared by the measurement client and the byte source server.
//!
//! Estimators recover from the failures they anticipate (see
//! [`SpeedTestError::is_recoverable`]); anything else travels up to the
//! orchestrator, which swaps the whole run for estimates.

use std::error::Error;
use std::fmt;

/// Process exit codes.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Network error (connection failed, timeout, etc.).
    pub const NETWORK_ERROR: i32 = 1;
    /// A server answered with an error status.
    pub const API_ERROR: i32 = 2;
    /// Invalid arguments or configuration.
    pub const CONFIG_ERROR: i32 = 3;
    /// A result could not be derived from the collected data.
    pub const MEASUREMENT_ERROR: i32 = 4;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of errors that can occur while measuring or serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect, reset, or body transfer failures.
    Network,
    /// DNS resolution failures.
    Dns,
    /// The wall-clock budget ran out.
    Timeout,
    /// TLS/SSL handshake failures.
    Tls,
    /// Non-success HTTP status or an error payload.
    Api,
    /// Invalid configuration or arguments.
    Config,
    /// Nothing usable could be derived from the transfer.
    Measurement,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Network
            | ErrorKind::Dns
            | ErrorKind::Timeout
            | ErrorKind::Tls => exit_codes::NETWORK_ERROR,
            ErrorKind::Api => exit_codes::API_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::Measurement => exit_codes::MEASUREMENT_ERROR,
            ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error",
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Timeout => "Timed out",
            ErrorKind::Tls => "TLS/SSL error",
            ErrorKind::Api => "Server error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Measurement => "Measurement error",
            ErrorKind::Unknown => "Unknown error",
        }
    }
}

/// A user-friendly error carrying an optional hint and the original cause.
#[derive(Debug)]
pub struct SpeedTestError {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestion: Option<String>,
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl SpeedTestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Whether an estimator may absorb this error by trying its fallback
    /// host or substituting an estimate.
    ///
    /// Configuration and unclassified errors are not anticipated by any
    /// estimator and abort the whole run instead.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind, ErrorKind::Config | ErrorKind::Unknown)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
            .with_suggestion("Check your internet connection and try again.")
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message).with_suggestion(
            "The server may be slow or unreachable. Try again later.",
        )
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn measurement(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Measurement, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }
}

impl fmt::Display for SpeedTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for SpeedTestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<reqwest::Error> for SpeedTestError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_builder() {
            ErrorKind::Config
        } else if error.is_timeout() {
            ErrorKind::Timeout
        } else if error.is_status() {
            ErrorKind::Api
        } else {
            // Whatever the text says, a failed exchange is still a
            // network-shaped failure the estimators can route around.
            match classify_error(&error) {
                ErrorKind::Unknown => ErrorKind::Network,
                kind => kind,
            }
        };

        let message = match error.url() {
            Some(url) => format!("{} ({})", error, url),
            None => error.to_string(),
        };

        SpeedTestError::new(kind, message).with_source(error)
    }
}

impl From<std::io::Error> for SpeedTestError {
    fn from(error: std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::AddrInUse
            | std::io::ErrorKind::AddrNotAvailable
            | std::io::ErrorKind::PermissionDenied => ErrorKind::Config,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => classify_error(&error),
        };

        SpeedTestError::new(kind, error.to_string()).with_source(error)
    }
}

/// Classify an error into an ErrorKind based on its message.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("dns")
        || error_str.contains("resolve")
        || error_str.contains("no such host")
    {
        return ErrorKind::Dns;
    }

    if error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("deadline")
    {
        return ErrorKind::Timeout;
    }

    if error_str.contains("tls")
        || error_str.contains("ssl")
        || error_str.contains("certificate")
        || error_str.contains("handshake")
    {
        return ErrorKind::Tls;
    }

    if error_str.contains("connection refused")
        || error_str.contains("connection reset")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("broken pipe")
    {
        return ErrorKind::Network;
    }

    if error_str.contains("status: 4")
        || error_str.contains("status: 5")
        || error_str.contains("server error")
    {
        return ErrorKind::Api;
    }

    ErrorKind::Unknown
}

/// Format an error for the terminal, suggestion included.
pub fn format_error_for_display(error: &SpeedTestError) -> String {
    let mut output = format!("Error: {}", error.message);

    if let Some(ref suggestion) = error.suggestion {
        output.push_str(&format!("\n\nSuggestion: {}", suggestion));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_exit_codes() {
        assert_eq!(ErrorKind::Network.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Timeout.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Api.exit_code(), exit_codes::API_ERROR);
        assert_eq!(ErrorKind::Config.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(
            ErrorKind::Measurement.exit_code(),
            exit_codes::MEASUREMENT_ERROR
        );
    }

    #[test]
    fn test_recoverable_kinds() {
        assert!(SpeedTestError::network("reset").is_recoverable());
        assert!(SpeedTestError::timeout("10s elapsed").is_recoverable());
        assert!(SpeedTestError::api("status 503").is_recoverable());
        assert!(SpeedTestError::measurement("no data").is_recoverable());
        assert!(!SpeedTestError::config("bad url").is_recoverable());
        assert!(!SpeedTestError::unknown("???").is_recoverable());
    }

    #[test]
    fn test_display_includes_suggestion() {
        let error = SpeedTestError::network("Failed to connect to server");

        let display = format!("{}", error);
        assert!(display.contains("Network error"));
        assert!(display.contains("Failed to connect"));
        assert!(display.contains("Suggestion"));
    }

    #[test]
    fn test_classify_error() {
        let dns = std::io::Error::other("DNS resolution failed: no such host");
        assert_eq!(classify_error(&dns), ErrorKind::Dns);

        let timeout = std::io::Error::other("connection timed out");
        assert_eq!(classify_error(&timeout), ErrorKind::Timeout);

        let refused = std::io::Error::other("connection refused");
        assert_eq!(classify_error(&refused), ErrorKind::Network);

        let other = std::io::Error::other("some random error");
        assert_eq!(classify_error(&other), ErrorKind::Unknown);
    }

    #[test]
    fn test_io_bind_errors_are_config() {
        let error: SpeedTestError = std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "address already in use",
        )
        .into();

        assert_eq!(error.kind, ErrorKind::Config);
        assert!(error.source.is_some());
    }

    #[test]
    fn test_format_error_for_display() {
        let error = SpeedTestError::config("port 99999 is out of range")
            .with_suggestion("Pick a port between 1 and 65535.");

        let output = format_error_for_display(&error);
        assert!(output.starts_with("Error: port 99999"));
        assert!(output.contains("Suggestion: Pick a port"));
    }
}
