//! Shared-secret request verifier.

use std::fmt;

use subtle::ConstantTimeEq;

use crate::error::BoxError;
use crate::service::{HandshakeRequest, RequestVerifier};

/// Accepts requests carrying the configured token, either as
/// `Authorization: Bearer <token>` or as a `?token=<token>` query parameter.
#[derive(Clone)]
pub struct TokenVerifier {
    token: String,
}

impl TokenVerifier {
    /// Creates a verifier expecting `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl RequestVerifier for TokenVerifier {
    fn verify(&self, request: &HandshakeRequest) -> Result<(), BoxError> {
        let presented = request
            .bearer_token()
            .map(str::to_owned)
            .or_else(|| request.query_param("token"))
            .ok_or("access forbidden: missing token")?;
        if bool::from(presented.as_bytes().ct_eq(self.token.as_bytes())) {
            Ok(())
        } else {
            Err("access forbidden: invalid token".into())
        }
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("token", &"<redacted>")
            .finish()
    }
}
