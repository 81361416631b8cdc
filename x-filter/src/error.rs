//! Error types for x-filter

use thiserror::Error;

use crate::settings::FilterMode;

/// Hint appended to configuration errors that are easier to diagnose with logs
pub const DEBUG_LOG_HINT: &str =
    "Enable debug logging for target 'x_filter' to see how behaviors were resolved.";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid profile expression '{0}'")]
    InvalidProfileExpression(String),

    #[error("Invalid parameters for resource '{resource}': {source}")]
    InvalidParameters {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid 2-way/circular visitor producer/consumer dependency detected in configuration.\n{chain}")]
    CircularDependency { chain: String },

    #[error(
        "The '{selected}' filter was selected, but the following behaviors do not support it:\n{list}\n{hint}",
        list = .incompatible.join("\n"),
        hint = DEBUG_LOG_HINT
    )]
    UnsupportedFilterMode {
        selected: FilterMode,
        incompatible: Vec<String>,
    },

    #[error(
        "No filter mode is supported by every configured behavior:\n{list}\n{hint}",
        list = .behaviors.join("\n"),
        hint = DEBUG_LOG_HINT
    )]
    NoCommonFilterMode { behaviors: Vec<String> },

    #[error("Reservation violation on fragment {fragment}: {reason}")]
    ReservationViolation { fragment: String, reason: String },

    #[error("Writer claim error: {0}")]
    WriterClaim(String),

    #[error("Visitor '{visitor}' failed during {phase} of <{element}>: {source}")]
    VisitorFailed {
        visitor: String,
        element: String,
        phase: String,
        #[source]
        source: Box<Error>,
    },

    #[error("XML error: {0}")]
    Xml(#[from] xml_model::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new invalid selector error
    pub fn invalid_selector<S: Into<String>, R: Into<String>>(selector: S, reason: R) -> Self {
        Error::InvalidSelector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// Create a new reservation violation error
    pub fn reservation<F: ToString, R: Into<String>>(fragment: F, reason: R) -> Self {
        Error::ReservationViolation {
            fragment: fragment.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new writer claim error
    pub fn writer_claim<S: Into<String>>(msg: S) -> Self {
        Error::WriterClaim(msg.into())
    }

    /// Create a generic error from a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// True for errors raised while validating configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidSelector { .. }
                | Error::InvalidProfileExpression(_)
                | Error::InvalidParameters { .. }
                | Error::CircularDependency { .. }
                | Error::UnsupportedFilterMode { .. }
                | Error::NoCommonFilterMode { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
