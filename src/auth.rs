//! API-key authentication.
//!
//! Requests carry `Authorization: token <api_key>:<api_secret>`. The key
//! identifies a User document; the secret must match when the user has one.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::store::{DocType, DocumentStore, Query};

/// Credentials parsed from an Authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub key: String,
    pub secret: Option<String>,
}

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Technician {
    /// User document name, typically an email address.
    pub user: String,
}

/// Compare secrets without stopping at the first differing byte.
///
/// Only the length can leak through timing.
fn secrets_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Parse `token <key>[:<secret>]`.
pub fn parse_authorization(header: &str) -> Result<ApiCredentials, AuthError> {
    let (scheme, credentials) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("token") {
        return Err(AuthError::MalformedHeader);
    }

    let credentials = credentials.trim();
    let (key, secret) = match credentials.split_once(':') {
        Some((key, secret)) => (key, Some(secret)),
        None => (credentials, None),
    };
    if key.is_empty() {
        return Err(AuthError::MalformedHeader);
    }

    Ok(ApiCredentials {
        key: key.to_string(),
        secret: secret.filter(|s| !s.is_empty()).map(str::to_string),
    })
}

/// Resolve an Authorization header to a user.
pub fn authenticate(
    store: &dyn DocumentStore,
    header: Option<&str>,
) -> Result<Technician, AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    let credentials = parse_authorization(header)?;

    let user = store
        .first(DocType::User, Query::new().eq("api_key", credentials.key.as_str()))
        .map_err(|e| {
            warn!(error = %e, "User lookup failed");
            AuthError::InvalidApiKey
        })?
        .ok_or(AuthError::InvalidApiKey)?;

    if let Some(expected) = user.str("api_secret") {
        let matched = credentials
            .secret
            .as_deref()
            .is_some_and(|given| secrets_match(given, expected));
        if !matched {
            debug!(user = %user.name, "API secret mismatch");
            return Err(AuthError::InvalidApiKey);
        }
    }

    Ok(Technician { user: user.name })
}
