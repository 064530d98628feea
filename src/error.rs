use thiserror::Error;

/// Failures a caller can act on. Anything else bubbling out of a service is a
/// backend failure (pool, SQL, filesystem) and is reported generically.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("Sign in required")]
    Unauthenticated,
}

pub fn invalid(msg: impl Into<String>) -> anyhow::Error {
    ServiceError::Invalid(msg.into()).into()
}

pub fn not_found(what: &'static str) -> anyhow::Error {
    ServiceError::NotFound(what).into()
}

/// Returns the user-facing message when `err` is a [`ServiceError`].
pub fn user_message(err: &anyhow::Error) -> Option<String> {
    err.downcast_ref::<ServiceError>().map(|e| e.to_string())
}
