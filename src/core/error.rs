//! Error handling for apigee
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** ([`ApigeeError`]) for failures callers may want to
//!    tell apart, carried inside [`anyhow::Error`] and recovered with `downcast_ref`
//! 2. **User-friendly messages** ([`ErrorContext`]) with an actionable suggestion
//!    for everything that reaches the terminal
//!
//! # Error Categories
//!
//! - **Remote**: [`ApigeeError::RemoteError`] (non-2xx response) and
//!   [`ApigeeError::NetworkError`] (no response at all)
//! - **Preconditions**: [`ApigeeError::PathExists`] when a pull would clobber
//!   an earlier one and `--force` is not set
//! - **Configuration defects**: [`ApigeeError::ConfigurationDefect`] when an
//!   exported proxy file lacks an attribute or element the pull depends on
//! - **Local setup**: [`ApigeeError::ConfigError`], [`ApigeeError::ArchiveError`],
//!   [`ApigeeError::IoError`], [`ApigeeError::TomlError`]
//!
//! A file that fails to parse as XML while scanning for dependencies is *not*
//! an error; the scanner skips it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use apigee_cli::core::{ApigeeError, user_friendly_error};
//!
//! fn fetch() -> anyhow::Result<()> {
//!     Err(ApigeeError::RemoteError {
//!         status: 404,
//!         url: "https://api.enterprise.apigee.com/v1/organizations/acme/apis/x".to_string(),
//!     }
//!     .into())
//! }
//!
//! if let Err(e) = fetch() {
//!     user_friendly_error(e).display();
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for apigee operations
#[derive(Error, Debug)]
pub enum ApigeeError {
    /// The management API answered with a non-2xx status.
    ///
    /// Always fatal for a pull; there is no retry.
    #[error("Apigee returned HTTP {status} for {url}")]
    RemoteError {
        /// HTTP status code of the response
        status: u16,
        /// Request URL
        url: String,
    },

    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("Network error during {operation}: {reason}")]
    NetworkError {
        /// What was being requested
        operation: String,
        /// Transport error text
        reason: String,
    },

    /// A pull would overwrite an artifact of an earlier pull.
    #[error("Refusing to overwrite existing path: {path}")]
    PathExists {
        /// The conflicting path
        path: String,
    },

    /// An exported configuration file lacks something the pull requires.
    #[error("Invalid configuration in {file}: {reason}")]
    ConfigurationDefect {
        /// File that carries the defect
        file: String,
        /// What is missing
        reason: String,
    },

    /// A proxy bundle could not be unpacked.
    #[error("Failed to extract bundle {path}: {reason}")]
    ArchiveError {
        /// Archive path
        path: String,
        /// Underlying zip error
        reason: String,
    },

    /// Missing or invalid client configuration.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Generic error for anything else
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl ApigeeError {
    /// Whether this is an HTTP 404 from the management API.
    ///
    /// Upsert-style callers treat "not found" differently from every other failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RemoteError { status: 404, .. })
    }

    /// HTTP status of a [`ApigeeError::RemoteError`], `None` for every other variant.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Shorthand for [`ApigeeError::PathExists`].
    pub fn path_exists(path: &std::path::Path) -> Self {
        Self::PathExists {
            path: path.display().to_string(),
        }
    }
}

impl Clone for ApigeeError {
    fn clone(&self) -> Self {
        match self {
            Self::RemoteError { status, url } => Self::RemoteError {
                status: *status,
                url: url.clone(),
            },
            Self::NetworkError { operation, reason } => Self::NetworkError {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::PathExists { path } => Self::PathExists { path: path.clone() },
            Self::ConfigurationDefect { file, reason } => Self::ConfigurationDefect {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::ArchiveError { path, reason } => Self::ArchiveError {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ConfigError { message } => Self::ConfigError {
                message: message.clone(),
            },
            // io::Error and toml errors are not Clone; keep their text
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::TomlError(e) => Self::Other {
                message: format!("TOML parsing error: {e}"),
            },
            Self::Other { message } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// An [`ApigeeError`] plus the guidance shown to the operator.
///
/// Details are printed in yellow, suggestions in green.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: ApigeeError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with no suggestion or details.
    #[must_use]
    pub const fn new(error: ApigeeError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] suitable for the terminal.
///
/// Known [`ApigeeError`] variants get a tailored suggestion; IO errors get a
/// generic one; anything else is reported with its full `Caused by` chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(apigee_error) = error.downcast_ref::<ApigeeError>() {
        return create_error_context(apigee_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(ApigeeError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check ownership and permissions of the work tree");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(ApigeeError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(ApigeeError::Other {
        message,
    })
}

fn create_error_context(error: ApigeeError) -> ErrorContext {
    match &error {
        ApigeeError::RemoteError { status: 401 | 403, .. } => ErrorContext::new(error)
            .with_suggestion(
                "Check APIGEE_USERNAME/APIGEE_PASSWORD or APIGEE_TOKEN, \
                 and that the account can read this organization",
            ),
        ApigeeError::RemoteError { status: 404, .. } => ErrorContext::new(error)
            .with_suggestion("Check the organization, proxy name, revision and environment")
            .with_details("The management API does not know the requested resource"),
        ApigeeError::RemoteError { .. } => ErrorContext::new(error)
            .with_details("Nothing written before the failure has been rolled back"),
        ApigeeError::NetworkError { .. } => ErrorContext::new(error)
            .with_suggestion("Check your network connection and the configured base_url"),
        ApigeeError::PathExists { .. } => ErrorContext::new(error)
            .with_suggestion("Remove the existing path or re-run with --force to overwrite")
            .with_details("A previous pull already wrote this artifact"),
        ApigeeError::ConfigurationDefect { .. } => ErrorContext::new(error)
            .with_suggestion("Fix the proxy configuration in Apigee and export a new revision"),
        ApigeeError::ArchiveError { .. } => ErrorContext::new(error)
            .with_details("The exported bundle is not a readable zip archive"),
        ApigeeError::ConfigError { .. } => ErrorContext::new(error).with_suggestion(
            "Set org and credentials in ~/.apigee/config.toml \
             or via APIGEE_ORG, APIGEE_USERNAME, APIGEE_PASSWORD",
        ),
        ApigeeError::TomlError(_) => ErrorContext::new(error)
            .with_suggestion("Check the TOML syntax of your apigee config file"),
        _ => ErrorContext::new(error),
    }
}
