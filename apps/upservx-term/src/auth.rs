//! Credential attachment for requests made against the upservx host.
//!
//! The host accepts HTTP Basic credentials. The dashboard stores the
//! base64-encoded `user:password` pair as an opaque token; the same token is
//! accepted here and attached explicitly to each outbound request.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request, header::AUTHORIZATION};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token is empty")]
    EmptyToken,
    #[error("username must not contain ':'")]
    InvalidUsername,
    #[error("token contains characters not allowed in a header")]
    InvalidHeader,
    #[error("password prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

/// An already-encoded Basic token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn from_token(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Self { token })
    }

    pub fn from_login(username: &str, password: &str) -> Result<Self, AuthError> {
        if username.contains(':') {
            return Err(AuthError::InvalidUsername);
        }
        let token = STANDARD.encode(format!("{username}:{password}"));
        Ok(Self { token })
    }

    /// Reads the password from the controlling tty.
    pub fn prompt_for(username: &str) -> Result<Self, AuthError> {
        let password = rpassword::prompt_password(format!("Password for {username}: "))?;
        Self::from_login(username, &password)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn header_value(&self) -> Result<HeaderValue, AuthError> {
        HeaderValue::from_str(&format!("Basic {}", self.token)).map_err(|_| AuthError::InvalidHeader)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("token", &"<redacted>").finish()
    }
}

/// Attach `Authorization: Basic <token>` unless the request already carries an
/// Authorization header.
pub fn authorize<B>(request: &mut Request<B>, credentials: &Credentials) -> Result<bool, AuthError> {
    if request.headers().contains_key(AUTHORIZATION) {
        return Ok(false);
    }
    let value = credentials.header_value()?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(true)
}
