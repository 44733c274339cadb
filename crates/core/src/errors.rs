use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::session::{InvalidProxy, SessionTransitionError};

/// Coarse failure classes shared by every layer; the HTTP surface and CLI map on these only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    TransportFailure,
    ResolutionFailure,
    Timeout,
    Persistence,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidState => "invalid_state",
            Self::TransportFailure => "transport_failure",
            Self::ResolutionFailure => "resolution_failure",
            Self::Timeout => "timeout",
            Self::Persistence => "persistence",
            Self::Validation => "validation",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Conflict | Self::InvalidState => 409,
            Self::TransportFailure => 502,
            Self::ResolutionFailure => 422,
            Self::Timeout => 504,
            Self::Persistence => 503,
            Self::Validation => 400,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every library error so callers can branch on the class without matching
/// variants from other crates.
pub trait Classify: std::error::Error {
    fn kind(&self) -> ErrorKind;

    fn into_interface(&self, correlation_id: impl Into<String>) -> InterfaceError
    where
        Self: Sized,
    {
        InterfaceError { kind: self.kind(), message: self.to_string(), correlation_id: correlation_id.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    InvalidTransition(#[from] SessionTransitionError),
    #[error(transparent)]
    InvalidProxy(#[from] InvalidProxy),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl Classify for DomainError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTransition(_) => ErrorKind::InvalidState,
            Self::InvalidProxy(_) | Self::InvariantViolation(_) => ErrorKind::Validation,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct InterfaceError {
    pub kind: ErrorKind,
    pub message: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::NotFound => "The requested resource does not exist.",
            ErrorKind::Conflict | ErrorKind::InvalidState => {
                "The session is not in a state that allows this operation."
            }
            ErrorKind::TransportFailure => "The WhatsApp transport rejected the request.",
            ErrorKind::ResolutionFailure => "The message recipient could not be resolved.",
            ErrorKind::Timeout => "The operation timed out. Please retry shortly.",
            ErrorKind::Persistence => "The service is temporarily unavailable. Please retry shortly.",
            ErrorKind::Validation => {
                "The request could not be processed. Check inputs and try again."
            }
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind.http_status()
    }
}
