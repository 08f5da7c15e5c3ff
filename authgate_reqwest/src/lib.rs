//! Middleware to attach stored credentials to outgoing requests and renew
//! them when the server reports that they have expired
//!
//! When using [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware),
//! include the [`RenewalMiddleware`] followed by the [`AccessTokenMiddleware`]
//! in the middleware stack. The access token middleware attaches the access
//! token currently held by a [`CredentialStore`] to each outbound request.
//! The renewal middleware watches for authorization failures, hands them to a
//! [`RefreshCoordinator`][authgate_tokens::RefreshCoordinator], and replays
//! the request once renewed credentials are available. Because it sits above
//! the access token middleware, a replayed request passes through it again.
//!
//! If a request already has a value for the credential header by the time
//! the middleware executes, the existing value will be left in place,
//! allowing overrides to be specified as required. Requests carrying the
//! [`NoCredential`] extension are sent without a credential.
//!
//! ```
//! use std::sync::Arc;
//!
//! use authgate_reqwest::{AccessTokenMiddleware, RenewalMiddleware};
//! use authgate_tokens::{
//!     sources::EndpointRefreshSource,
//!     store::{CredentialStore, InMemoryCredentialStore},
//!     RefreshCoordinator,
//! };
//! use reqwest::Client;
//! use reqwest_middleware::ClientBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
//! let source = EndpointRefreshSource::new(
//!     Client::new(),
//!     "https://example.com/api/v1/base/refresh_token".parse()?,
//! );
//! let coordinator = RefreshCoordinator::new(source, store.clone());
//!
//! let client = ClientBuilder::new(Client::default())
//!     .with(RenewalMiddleware::new(coordinator, "/base/refresh_token"))
//!     .with(AccessTokenMiddleware::new(store))
//!     .build();
//!
//! let req = client.get("https://example.com/api/v1/base/userinfo");
//! # let _ = req;
//! # Ok(())
//! # }
//! ```
//!
//! Most applications will prefer [`ApiClient`], which assembles this stack
//! from an [`AuthConfig`] and also unwraps the application's
//! `{code, data, msg}` response envelope.
//!
//! The access token middleware can also be configured to add a credential
//! only conditionally. This can be useful in the event that you want to use a
//! single common middleware stack with multiple potential backends and want
//! to ensure that credentials are only sent to the intended one.
//!
//! ```
//! use std::sync::Arc;
//!
//! use authgate_reqwest::{AccessTokenMiddleware, ExactHostMatch, HttpsOnly};
//! use authgate_tokens::store::InMemoryCredentialStore;
//! use predicates::prelude::PredicateBooleanExt;
//!
//! AccessTokenMiddleware::new(Arc::new(InMemoryCredentialStore::new()))
//!     .with_predicate(HttpsOnly.and(ExactHostMatch::new("example.com")));
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use std::{fmt, sync::Arc};

use authgate_tokens::{store::CredentialStore, AccessTokenRef};
use bytes::{BufMut, BytesMut};
use http::Extensions;
use predicates::{prelude::*, reflection};
use reqwest::{
    header::{self, Entry, HeaderName, HeaderValue},
    Request, Response,
};
use reqwest_middleware::{Middleware, Next, Result};

mod classify;
mod client;
mod config;
mod envelope;
mod error;
mod notify;
mod renewal;
#[cfg(test)]
mod test_support;

pub use classify::{resolve_error_message, ErrorCode, TransportKind};
pub use client::{ApiClient, ApiClientBuilder, LoginOutput};
pub use config::{AuthConfig, ConfigError};
pub use envelope::{Envelope, OK_CODE, UNAUTHORIZED_CODE};
pub use error::{ApiError, SESSION_EXPIRED_MESSAGE};
pub use notify::{Notifier, NotifyOptions, TracingNotifier};
pub use renewal::RenewalMiddleware;

/// Marks a request as not requiring a credential
///
/// Attach with [`RequestBuilder::with_extension()`](reqwest_middleware::RequestBuilder::with_extension).
/// The login call is the usual example.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoCredential;

/// The header used to carry the access token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialHeader {
    name: HeaderName,
    bearer: bool,
}

impl Default for CredentialHeader {
    /// Sends the raw access token in the `token` header
    fn default() -> Self {
        Self::named(HeaderName::from_static("token"))
    }
}

impl CredentialHeader {
    /// Sends the raw access token in the named header
    pub fn named(name: HeaderName) -> Self {
        Self {
            name,
            bearer: false,
        }
    }

    /// Sends the access token as `Authorization: Bearer <token>`
    pub fn bearer() -> Self {
        Self::named_bearer(header::AUTHORIZATION)
    }

    /// Sends the access token as `Bearer <token>` in the named header
    pub fn named_bearer(name: HeaderName) -> Self {
        Self { name, bearer: true }
    }

    /// The name of the header
    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// Builds the header value for `token`
    ///
    /// Returns `None` if the token contains bytes that are not allowed in a
    /// header value.
    pub fn value_for(&self, token: &AccessTokenRef) -> Option<HeaderValue> {
        let prefix: &[u8] = if self.bearer { b"Bearer " } else { b"" };
        let mut header_value = BytesMut::with_capacity(token.as_str().len() + prefix.len());
        header_value.put_slice(prefix);
        header_value.put_slice(token.as_str().as_bytes());
        let mut value = HeaderValue::from_maybe_shared(header_value.freeze()).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

/// A middleware that injects the stored access token into outgoing requests
#[derive(Clone)]
pub struct AccessTokenMiddleware<P = AnyRequest> {
    store: Arc<dyn CredentialStore>,
    header: CredentialHeader,
    predicate: P,
}

impl AccessTokenMiddleware<AnyRequest> {
    /// Construct a new middleware from a credential store
    ///
    /// By default, this middleware will attach the access token to every
    /// request that is not marked with [`NoCredential`]. To restrict which
    /// requests receive the token, provide a custom predicate with
    /// [`with_predicate()`][Self::with_predicate()].
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            header: CredentialHeader::default(),
            predicate: AnyRequest,
        }
    }

    /// Replaces the default predicate with a custom predicate
    pub fn with_predicate<P>(self, predicate: P) -> AccessTokenMiddleware<P> {
        AccessTokenMiddleware {
            store: self.store,
            header: self.header,
            predicate,
        }
    }
}

impl<P> AccessTokenMiddleware<P> {
    /// Replaces the header used to carry the access token
    pub fn with_header(mut self, header: CredentialHeader) -> Self {
        self.header = header;
        self
    }

    fn get_token_from_store(&self) -> Option<HeaderValue> {
        let Some(token) = self.store.access_token() else {
            tracing::trace!("no access token stored, sending request without one");
            return None;
        };

        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!(
                token = format_args!("{:#?}", token),
                header = %self.header.name(),
                "obtained access token"
            );
        }

        let value = self.header.value_for(&token);
        if value.is_none() {
            tracing::warn!("stored access token is not a valid header value, not attaching it");
        }
        value
    }
}

impl<P: fmt::Debug> fmt::Debug for AccessTokenMiddleware<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenMiddleware")
            .field("header", &self.header)
            .field("predicate", &self.predicate)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<P> Middleware for AccessTokenMiddleware<P>
where
    P: Predicate<Request> + Send + Sync + 'static,
{
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if extensions.get::<NoCredential>().is_none() && self.predicate.eval(&req) {
            if let Entry::Vacant(entry) = req.headers_mut().entry(self.header.name().clone()) {
                if let Some(value) = self.get_token_from_store() {
                    entry.insert(value);
                }
            }
        }

        next.run(req, extensions).await
    }
}

/// Attach an access token to any request
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyRequest;

impl Predicate<Request> for AnyRequest {
    #[inline]
    fn eval(&self, _: &Request) -> bool {
        true
    }
}

impl reflection::PredicateReflection for AnyRequest {}
impl fmt::Display for AnyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any request")
    }
}

/// Only attach an access token if the request is being sent over HTTPS
#[derive(Clone, Copy, Debug)]
pub struct HttpsOnly;

impl Predicate<Request> for HttpsOnly {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url().scheme() == "https"
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "scheme",
                    req.url().scheme().to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for HttpsOnly {}
impl fmt::Display for HttpsOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scheme is https")
    }
}

/// Only attach an access token if the request is being sent to the exact host specified
#[derive(Clone, Debug)]
pub struct ExactHostMatch {
    host: String,
}

impl ExactHostMatch {
    /// Construct a new predicate from a host string
    pub fn new<S>(host: S) -> Self
    where
        S: ToString,
    {
        Self {
            host: host.to_string(),
        }
    }
}

impl Predicate<Request> for ExactHostMatch {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url().host_str() == Some(&self.host)
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "host",
                    req.url()
                        .host_str()
                        .unwrap_or("<value not valid utf-8>")
                        .to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for ExactHostMatch {}
impl fmt::Display for ExactHostMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("host == ")?;
        f.write_str(&self.host)
    }
}
