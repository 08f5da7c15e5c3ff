//! Credential storage and single-flight renewal of expired access tokens
//!
//! Clients of an API that issues short-lived access tokens alongside
//! longer-lived refresh tokens must eventually deal with the access token
//! expiring. When that happens, several requests are often already in flight,
//! and each of them will come back with an authorization failure at about the
//! same time. Renewing once per failed request wastes round-trips and, with
//! servers that rotate refresh tokens, leaves the client holding whichever
//! pair happened to arrive last.
//!
//! This crate handles that moment reactively. Tokens live in a
//! [`CredentialStore`][store::CredentialStore]. A
//! [`RefreshCoordinator`] receives authorization failures; the first one
//! starts a renewal against a [`RefreshTokenSource`][sources::RefreshTokenSource],
//! and every failure reported while that renewal is in flight waits on its
//! result. All waiters observe the same outcome: either the same new access
//! token, or the same error, after which both tokens are removed and the
//! session is ended.
//!
//! ```
//! use std::sync::Arc;
//!
//! use authgate_tokens::{
//!     sources::EndpointRefreshSource,
//!     store::{CredentialStore, InMemoryCredentialStore},
//!     RefreshCoordinator,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
//!
//! let source = EndpointRefreshSource::new(
//!     reqwest::Client::new(),
//!     reqwest::Url::parse("https://example.com/api/v1/base/refresh_token")?,
//! );
//!
//! let coordinator = RefreshCoordinator::with_session_terminator(source, store, || {
//!     tracing::warn!("session expired, please sign in again");
//! });
//! # let _ = coordinator;
//! # Ok(())
//! # }
//! ```
//!
//! Attaching tokens to outgoing requests and detecting authorization
//! failures is left to the HTTP layer; see `authgate_reqwest`.
//!
//! # Features
//!
//! The following features are supported by this crate, all of which are enabled by default:
//!
//! * `endpoint`: Provides a [`RefreshTokenSource`][sources::RefreshTokenSource] that calls
//!   an HTTP refresh endpoint using [reqwest].
//! * `file`: Provides a [`CredentialStore`][store::CredentialStore] persisted to a JSON file.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
mod coordinator;
pub mod sources;
pub mod store;
mod tokens;

pub use braids::*;
pub use coordinator::{NoopSessionTerminator, RefreshCoordinator, RefreshError, SessionTerminator};
pub use tokens::TokenPair;
