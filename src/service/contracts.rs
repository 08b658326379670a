//! Collaborator contracts plugged into the [`super::Dispatcher`].
//!
//! The core only sequences these calls. It never inspects the request beyond
//! handing it to the verifier and never performs I/O on a stream except the
//! rejection close issued through [`Transport::close`].

use std::collections::HashMap;
use std::future::Future;

use axum::extract::Query;
use axum::http::{HeaderMap, Uri, header};
use chrono::{DateTime, Utc};

use super::DispatchContext;
use crate::domain::ConnId;
use crate::error::{BoxError, DispatchError};

/// The raw upgrade request as seen by a [`RequestVerifier`].
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    uri: Uri,
    headers: HeaderMap,
}

impl HandshakeRequest {
    /// Wraps the URI and headers of an upgrade request.
    #[must_use]
    pub fn new(uri: Uri, headers: HeaderMap) -> Self {
        Self { uri, headers }
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the token of an `Authorization: Bearer <token>` header.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Returns the percent-decoded value of a query parameter. A query
    /// string that fails to decode yields no parameters at all.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(&self.uri).ok()?;
        params.remove(name)
    }
}

/// A live duplex stream together with its identity.
///
/// Created by the dispatcher right after a successful upgrade. The processor
/// borrows it mutably for the duration of [`ConnectionProcessor::handle`] and
/// cannot keep it afterwards.
#[derive(Debug)]
pub struct Connection<S> {
    id: ConnId,
    stream: S,
    upgraded_at: DateTime<Utc>,
}

impl<S> Connection<S> {
    /// Wraps `stream` under a fresh [`ConnId`].
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self {
            id: ConnId::new(),
            stream,
            upgraded_at: Utc::now(),
        }
    }

    /// Connection identity.
    #[must_use]
    pub const fn id(&self) -> ConnId {
        self.id
    }

    /// When the upgrade completed.
    #[must_use]
    pub const fn upgraded_at(&self) -> DateTime<Utc> {
        self.upgraded_at
    }

    /// Exclusive access to the stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwraps the stream.
    #[must_use]
    pub fn into_stream(self) -> S {
        self.stream
    }
}

/// Decides whether a raw request may be upgraded.
///
/// A dispatcher without a verifier accepts every request.
pub trait RequestVerifier: Send + Sync {
    /// Checks credentials, addresses, headers or anything else carried by
    /// the request.
    ///
    /// # Errors
    ///
    /// Any error rejects the request as [`DispatchError::VerificationFailed`].
    fn verify(&self, request: &HandshakeRequest) -> Result<(), BoxError>;
}

impl<F> RequestVerifier for F
where
    F: Fn(&HandshakeRequest) -> Result<(), BoxError> + Send + Sync,
{
    fn verify(&self, request: &HandshakeRequest) -> Result<(), BoxError> {
        self(request)
    }
}

/// Produces the live stream for a verified request.
pub trait Upgrader: Send {
    /// Stream type produced by the upgrade.
    type Stream: Transport;

    /// Completes the handshake.
    ///
    /// # Errors
    ///
    /// Any error ends the dispatch as [`DispatchError::UpgradeFailed`].
    fn upgrade(self) -> impl Future<Output = Result<Self::Stream, BoxError>> + Send;
}

/// An already-upgraded stream, for transports that complete the handshake
/// before handing over control.
#[derive(Debug)]
pub struct Upgraded<S>(pub S);

impl<S: Transport> Upgrader for Upgraded<S> {
    type Stream = S;

    async fn upgrade(self) -> Result<S, BoxError> {
        Ok(self.0)
    }
}

/// Stream-side operations the dispatcher needs from a transport.
pub trait Transport: Send + 'static {
    /// Closes a stream that will never reach the processor, e.g. because no
    /// pool would take it.
    fn close(self, error: &DispatchError) -> impl Future<Output = ()> + Send;
}

/// Application logic run once per assigned connection.
///
/// `environment` is the shared state of the connection's pool. Siblings in
/// the same pool receive the same environment concurrently; any locking of
/// its contents is up to the implementation.
pub trait ConnectionProcessor<S, E>: Send + Sync + 'static {
    /// Runs until the connection is done.
    ///
    /// # Errors
    ///
    /// Any error is reported as [`DispatchError::ProcessingFailed`]; the
    /// connection is released from its pool either way.
    fn handle(
        &self,
        conn: &mut Connection<S>,
        environment: &E,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Receives every error a dispatch runs into. Must not panic.
pub trait ErrorReporter: Send + Sync {
    /// Records `error`, raised while the dispatch was in `ctx.state`.
    fn report_error(&self, ctx: &DispatchContext, error: &DispatchError);
}

/// Default [`ErrorReporter`]: logs through `tracing`.
///
/// Invariant violations are logged at `error`, capacity and factory problems
/// at `warn`, and handshake churn at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report_error(&self, ctx: &DispatchContext, error: &DispatchError) {
        let code = error.error_code();
        if error.is_invariant_violation() {
            tracing::error!(
                state = %ctx.state,
                conn_id = ?ctx.conn_id,
                pool_id = ?ctx.pool_id,
                code,
                %error,
                "dispatch invariant violated"
            );
            return;
        }
        match error {
            DispatchError::VerificationFailed(_) | DispatchError::UpgradeFailed(_) => {
                tracing::debug!(state = %ctx.state, code, %error, "handshake rejected");
            }
            _ => {
                tracing::warn!(
                    state = %ctx.state,
                    conn_id = ?ctx.conn_id,
                    pool_id = ?ctx.pool_id,
                    code,
                    %error,
                    "dispatch failed"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request(uri: &str, auth: Option<&'static str>) -> HandshakeRequest {
        let Ok(uri) = uri.parse::<Uri>() else {
            panic!("valid uri");
        };
        let mut headers = HeaderMap::new();
        if let Some(auth) = auth {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(auth));
        }
        HandshakeRequest::new(uri, headers)
    }

    #[test]
    fn bearer_token_is_extracted() {
        let req = request("/ws", Some("Bearer s3cret"));
        assert_eq!(req.bearer_token(), Some("s3cret"));
        assert_eq!(request("/ws", Some("Basic abc")).bearer_token(), None);
        assert_eq!(request("/ws", Some("Bearer ")).bearer_token(), None);
        assert_eq!(request("/ws", None).bearer_token(), None);
    }

    #[test]
    fn query_param_lookup() {
        let req = request("/ws?room=7&token=abc&flag", None);
        assert_eq!(req.query_param("token").as_deref(), Some("abc"));
        assert_eq!(req.query_param("room").as_deref(), Some("7"));
        assert_eq!(req.query_param("flag").as_deref(), Some(""));
        assert_eq!(req.query_param("missing"), None);
        assert_eq!(request("/ws", None).query_param("token"), None);
    }

    #[test]
    fn query_param_is_percent_decoded() {
        let req = request("/ws?token=a%2Bb%2Fc&name=chat+room", None);
        assert_eq!(req.query_param("token").as_deref(), Some("a+b/c"));
        assert_eq!(req.query_param("name").as_deref(), Some("chat room"));
    }

    #[test]
    fn closures_are_verifiers() {
        let verifier = |req: &HandshakeRequest| -> Result<(), BoxError> {
            req.bearer_token().map(|_| ()).ok_or_else(|| "no token".into())
        };
        assert!(verifier.verify(&request("/ws", Some("Bearer t"))).is_ok());
        assert!(verifier.verify(&request("/ws", None)).is_err());
    }

    #[test]
    fn connections_get_distinct_ids() {
        let a = Connection::new(());
        let b = Connection::new(());
        assert_ne!(a.id(), b.id());
        assert!(a.upgraded_at() <= Utc::now());
    }
}
