//! Error handling for WHOIS/RDAP lookups.
//!
//! Errors in this module are used *inside* the engine: handlers, config and
//! registry loading, bootstrap refresh. They never escape a lookup; the
//! dispatcher folds every failure into a [`ParsedRecord`](crate::ParsedRecord).

use std::fmt;
use std::time::Duration;

/// Main error type for the lookup engine.
#[derive(Debug, Clone)]
pub enum WhoisError {
    /// Input could not be turned into a queryable domain
    InvalidDomain { domain: String, reason: String },

    /// Connection failures, resets, DNS failures for the server host
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// Empty or garbled payload from an upstream server
    ProtocolError { server: String, message: String },

    /// RDAP specific errors (HTTP status, bad body)
    RdapError {
        domain: String,
        message: String,
        status_code: Option<u16>,
    },

    /// IANA bootstrap registry refresh or persistence failures
    BootstrapError { message: String },

    /// Structural parse failures (JSON, TOML, registry data)
    ParseError {
        message: String,
        content: Option<String>,
    },

    /// No adapter for a TLD, or invalid settings
    ConfigError { message: String },

    /// File I/O errors (config, registry, cache files, domain lists)
    FileError { path: String, message: String },

    /// Operation exceeded its wall-clock budget
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Anything that does not fit the categories above
    Internal { message: String },
}

impl WhoisError {
    pub fn invalid_domain<D: Into<String>, R: Into<String>>(domain: D, reason: R) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn protocol<S: Into<String>, M: Into<String>>(server: S, message: M) -> Self {
        Self::ProtocolError {
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn rdap<D: Into<String>, M: Into<String>>(domain: D, message: M) -> Self {
        Self::RdapError {
            domain: domain.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn rdap_with_status<D: Into<String>, M: Into<String>>(
        domain: D,
        message: M,
        status_code: u16,
    ) -> Self {
        Self::RdapError {
            domain: domain.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn bootstrap<M: Into<String>>(message: M) -> Self {
        Self::BootstrapError {
            message: message.into(),
        }
    }

    pub fn parse<M: Into<String>>(message: M) -> Self {
        Self::ParseError {
            message: message.into(),
            content: None,
        }
    }

    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether a handler should spend one of its remaining attempts on this error.
    ///
    /// Network, timeout and protocol failures are worth another try (possibly
    /// against another server). RDAP errors are retryable unless the server
    /// answered with a definitive 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. } | Self::Timeout { .. } | Self::ProtocolError { .. } => true,
            Self::RdapError { status_code, .. } => {
                !matches!(status_code, Some(code) if (400..500).contains(code) && *code != 429)
            }
            _ => false,
        }
    }
}

impl fmt::Display for WhoisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain { domain, reason } => {
                write!(f, "Invalid domain '{}': {}", domain, reason)
            }
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::ProtocolError { server, message } => {
                write!(f, "Protocol error from '{}': {}", server, message)
            }
            Self::RdapError {
                domain,
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "RDAP error for '{}' (HTTP {}): {}", domain, code, message)
                } else {
                    write!(f, "RDAP error for '{}': {}", domain, message)
                }
            }
            Self::BootstrapError { message } => {
                write!(f, "Bootstrap registry error: {}", message)
            }
            Self::ParseError { message, .. } => {
                write!(f, "Parse error: {}", message)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Timeout {
                operation,
                duration,
            } => {
                write!(f, "Timeout after {:?} during: {}", duration, operation)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for WhoisError {}

impl From<reqwest::Error> for WhoisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network_with_source("HTTP request timed out", err.to_string())
        } else if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else if let Some(status) = err.status() {
            Self::RdapError {
                domain: err
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_default(),
                message: err.to_string(),
                status_code: Some(status.as_u16()),
            }
        } else {
            Self::network_with_source("HTTP request failed", err.to_string())
        }
    }
}

impl From<serde_json::Error> for WhoisError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: format!("JSON parsing failed: {}", err),
            content: None,
        }
    }
}

impl From<toml::de::Error> for WhoisError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML: {}", err),
        }
    }
}

impl From<std::io::Error> for WhoisError {
    fn from(err: std::io::Error) -> Self {
        Self::network_with_source("I/O error", err.to_string())
    }
}

impl From<regex::Error> for WhoisError {
    fn from(err: regex::Error) -> Self {
        Self::Internal {
            message: format!("Regex error: {}", err),
        }
    }
}
