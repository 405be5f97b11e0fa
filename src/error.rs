//! Error taxonomy shared by the HTTP clients and the controllers.
use std::fmt;
use thiserror::Error;

/// Transport-level failure talking to one of the remote collaborators.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint: {0}")]
    Url(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Request(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-supplied message for 4xx/5xx responses, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

/// A single field-level validation message, surfaced next to the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    pub fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

struct FieldErrors<'a>(&'a [FieldError]);

impl fmt::Display for FieldErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Conditions signalled by the public controller operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport failure: {0}")]
    Transport(#[from] ApiError),
    #[error("validation failed: {}", FieldErrors(.0))]
    ValidationFailed(Vec<FieldError>),
    #[error("this action requires a signed-in user")]
    Unauthenticated,
    #[error("invalid email or password")]
    AuthenticationFailed,
    #[error("registration rejected: {0}")]
    RegistrationConflict(String),
    #[error("could not update like: {0}")]
    LikeActionFailed(#[source] ApiError),
    #[error("could not update review: {0}")]
    ReviewUpdateFailed(#[source] ApiError),
    #[error("could not delete review: {0}")]
    ReviewDeleteFailed(#[source] ApiError),
    #[error("credential storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl Error {
    pub fn invalid(field: &'static str, message: &'static str) -> Self {
        Error::ValidationFailed(vec![FieldError::new(field, message)])
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Error::ValidationFailed(errors) => errors,
            _ => &[],
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
