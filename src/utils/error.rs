// src/utils/error.rs
use std::fmt;
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP {status} for {url}")]
    Http { status: reqwest::StatusCode, url: String },

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Expected a PDF from {url} but received '{content_type}'")]
    NotPdf { url: String, content_type: String },
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("{reason} - failed to fetch {limit} pages in a row")]
    CircuitOpen { limit: u32, reason: String },

    #[error("No annual reports found for {company} ({})", .failures.join("; "))]
    Exhausted { company: String, failures: Vec<String> },

    #[error("Browser automation failed: {0}")]
    Browser(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("URL is not a PDF and no PDF found on HTML page: {0}")]
    NoPdfLink(String),

    #[error("PDF validation failed: {0}")]
    Unreadable(String),

    #[error("Only {pages} pages (min {min} required)")]
    TooFewPages { pages: usize, min: usize },

    #[error("Too many pages ({pages} > {max})")]
    TooManyPages { pages: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Could not read PDF: {0}")]
    Pdf(String),

    #[error("Cannot extract text: {0}")]
    Text(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Table error: {0}")]
    Table(#[from] csv::Error),

    #[error("Missing column '{column}' in {path}")]
    MissingColumn { column: String, path: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("HTTP interaction failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}

/// Coarse classification of a failed request, used for log lines and the
/// connection diagnostics report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Timeout,
    Dns,
    ConnectionRefused,
    ConnectionReset,
    Connection,
    Tls,
    Forbidden,
    NotFound,
    HttpStatus(u16),
    NotPdf,
    Unknown,
}

impl ErrorCategory {
    /// Stable machine-readable label, written to summaries and tables.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Dns => "dns_error",
            ErrorCategory::ConnectionRefused => "connection_refused",
            ErrorCategory::ConnectionReset => "connection_reset",
            ErrorCategory::Connection => "connection_error",
            ErrorCategory::Tls => "ssl_error",
            ErrorCategory::Forbidden => "http_403_blocked",
            ErrorCategory::NotFound => "http_404_not_found",
            ErrorCategory::HttpStatus(_) => "http_error",
            ErrorCategory::NotPdf => "not_pdf",
            ErrorCategory::Unknown => "unknown_error",
        }
    }

    /// Human-readable description for log output.
    pub fn describe(&self) -> String {
        match self {
            ErrorCategory::Timeout => "Connection timed out".to_string(),
            ErrorCategory::Dns => {
                "DNS resolution failed - domain may be blocked or unreachable".to_string()
            }
            ErrorCategory::ConnectionRefused => "Connection refused by server".to_string(),
            ErrorCategory::ConnectionReset => "Connection reset by server".to_string(),
            ErrorCategory::Connection => "Connection error".to_string(),
            ErrorCategory::Tls => "SSL/TLS error".to_string(),
            ErrorCategory::Forbidden => {
                "HTTP 403 Forbidden - server blocking requests".to_string()
            }
            ErrorCategory::NotFound => "HTTP 404 Not Found".to_string(),
            ErrorCategory::HttpStatus(code) => format!("HTTP error {}", code),
            ErrorCategory::NotPdf => "Response is not a PDF".to_string(),
            ErrorCategory::Unknown => "Unknown error".to_string(),
        }
    }

    /// Categorizes an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            403 => ErrorCategory::Forbidden,
            404 => ErrorCategory::NotFound,
            other => ErrorCategory::HttpStatus(other),
        }
    }

    /// Categorizes the rendered text of an error chain. Kept separate from
    /// `FetchError::category` so message matching can be tested on its own.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let dns_markers = [
            "dns error",
            "failed to lookup address",
            "name or service not known",
            "nodename nor servname",
            "no such host",
            "failed to resolve",
        ];
        if lower.contains("timed out") || lower.contains("timeout") {
            ErrorCategory::Timeout
        } else if dns_markers.iter().any(|m| lower.contains(m)) {
            ErrorCategory::Dns
        } else if lower.contains("connection refused") {
            ErrorCategory::ConnectionRefused
        } else if lower.contains("connection reset") {
            ErrorCategory::ConnectionReset
        } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
            ErrorCategory::Tls
        } else if lower.contains("connect") {
            ErrorCategory::Connection
        } else {
            ErrorCategory::Unknown
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

impl FetchError {
    /// Classifies this error for logging and diagnostics.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FetchError::Network(err) => {
                if err.is_timeout() {
                    return ErrorCategory::Timeout;
                }
                if let Some(status) = err.status() {
                    return ErrorCategory::from_status(status.as_u16());
                }
                match ErrorCategory::from_message(&error_chain_text(err)) {
                    ErrorCategory::Unknown if err.is_connect() => ErrorCategory::Connection,
                    category => category,
                }
            }
            FetchError::Http { status, .. } => ErrorCategory::from_status(status.as_u16()),
            FetchError::InvalidUrl(_) => ErrorCategory::Unknown,
            FetchError::NotPdf { .. } => ErrorCategory::NotPdf,
        }
    }
}

/// Joins an error and all of its sources into a single string. reqwest hides
/// the interesting part (DNS, refused, TLS) in the source chain.
pub fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}
