//! Error types for authentication and session operations.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Typed failures reported by the Cognito service boundary.
///
/// The state machine maps these onto the `Error` variants of the relevant
/// sub-machine; it never retries them itself. Network-class failures are
/// candidates for caller-driven retry (re-submitting the same logical event).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service rejected the credentials or the session.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// A challenge answer (MFA code, custom answer) did not match.
    #[error("Code mismatch: {0}")]
    CodeMismatch(String),

    /// The referenced user, device, or identity does not exist.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The service throttled the request.
    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    /// The request never reached the service.
    #[error("Network failure: {0}")]
    Network(String),

    /// Anything the service reported that has no dedicated variant.
    ///
    /// The original cause text is preserved, never discarded.
    #[error("Service error: {0}")]
    Unknown(String),
}

impl ServiceError {
    /// Whether re-submitting the same logical event may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::TooManyRequests(_))
    }
}

/// Comprehensive error taxonomy for the authentication state machine.
///
/// Resolvers never raise during transition computation; these values travel
/// inside the `Error` state variants and are surfaced to callers when a wait
/// resolves against an error state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or invalid pool / client configuration. Fatal to the relevant
    /// flow; never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed caller input, rejected before any event is submitted.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A Cognito-reported failure, preserved as-is.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The requested operation is illegal in the current state. Session data
    /// is left untouched.
    #[error("Operation not allowed in the current state: {0}")]
    InvalidState(String),

    /// No credentials can be produced: signed out and no unauthenticated
    /// (identity pool) access is configured.
    #[error("Signed out with no unauthenticated access configured")]
    SignedOut,

    /// The credential store failed while persisting or hydrating session
    /// blobs.
    #[error("Credential store failure: {0}")]
    Store(String),

    /// The SRP exchange received malformed or inconsistent values.
    #[error("Malformed SRP exchange: {0}")]
    Srp(String),

    /// A caller-side wait expired before the flow settled. The machine
    /// itself continues unaffected.
    #[error("Timed out waiting for the flow to settle")]
    Timeout,

    /// Wrapped cause for anything unclassified.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Whether the underlying failure is a transient service condition worth
    /// re-submitting.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cognito_auth::error::{AuthError, ServiceError};
    /// assert!(AuthError::Service(ServiceError::Network("reset".into())).is_retryable());
    /// assert!(!AuthError::SignedOut.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Service(service) if service.is_retryable())
    }

    /// Whether this error is due to invalid caller input or an illegal
    /// operation rather than a system fault.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ServiceError::Network("connection reset".into()).is_retryable());
        assert!(ServiceError::TooManyRequests("slow down".into()).is_retryable());
        assert!(!ServiceError::NotAuthorized("bad password".into()).is_retryable());
        assert!(!ServiceError::CodeMismatch("wrong code".into()).is_retryable());
    }

    #[test]
    fn service_errors_convert_into_auth_errors() {
        let error: AuthError = ServiceError::ResourceNotFound("no such user".into()).into();
        assert_eq!(
            error,
            AuthError::Service(ServiceError::ResourceNotFound("no such user".into()))
        );
    }

    #[test]
    fn user_error_classification() {
        assert!(AuthError::Validation("empty username".into()).is_user_error());
        assert!(!AuthError::Timeout.is_user_error());
    }
}
