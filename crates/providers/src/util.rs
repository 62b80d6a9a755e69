//! Shared utility functions for backend adapters.

use px_domain::error::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Read an API key from the named environment variable.
///
/// An empty variable name or an unset variable yields `None`; local
/// OpenAI-compatible servers usually run without auth.
pub(crate) fn api_key_from_env(var: &str) -> Option<String> {
    if var.is_empty() {
        return None;
    }
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Some(key),
        _ => {
            tracing::warn!(env = %var, "API key variable not set, sending unauthenticated requests");
            None
        }
    }
}
