//! Connection failure classification for display.
//!
//! Classification never feeds back into backoff or ban decisions: every
//! reported error counts the same.

use std::fmt;

/// Coarse category of a raw connection error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Tls,
    ConnectionRefused,
    HostNotFound,
    Unauthorized,
    Forbidden,
    Generic,
}

/// Ordered substring rules, first match wins.
const RULES: &[(ErrorKind, &[&str])] = &[
    (ErrorKind::Timeout, &["timeout", "timed out"]),
    (ErrorKind::Tls, &["ssl", "certificate"]),
    (ErrorKind::ConnectionRefused, &["refused", "connection refused"]),
    (ErrorKind::HostNotFound, &["host", "dns", "resolve"]),
    (ErrorKind::Unauthorized, &["401", "unauthorized"]),
    (ErrorKind::Forbidden, &["403", "forbidden"]),
];

impl ErrorKind {
    /// User-facing text, `None` for `Generic` (the raw message is shown instead).
    pub fn message(self) -> Option<&'static str> {
        match self {
            ErrorKind::Timeout => Some("Connection timed out. Check the server address and your network."),
            ErrorKind::Tls => Some("SSL/TLS error. The server certificate could not be verified."),
            ErrorKind::ConnectionRefused => Some("Connection refused. Make sure the proxy is running."),
            ErrorKind::HostNotFound => Some("Host not found. Check the server address."),
            ErrorKind::Unauthorized => Some("Unauthorized. The management key is invalid."),
            ErrorKind::Forbidden => Some("Forbidden. Remote management may be disabled on the server."),
            ErrorKind::Generic => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Tls => "tls",
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::HostNotFound => "host_not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

pub fn classify(raw: &str) -> ErrorKind {
    let lowered = raw.to_lowercase();
    RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| lowered.contains(n)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Generic)
}

/// Friendly text for a raw error; unknown errors are returned unchanged.
pub fn friendly_error_message(raw: &str) -> String {
    classify(raw)
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string())
}
