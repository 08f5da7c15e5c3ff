//! Refresh token sources

use async_trait::async_trait;
use std::error;

use crate::{RefreshTokenRef, TokenPair};

#[cfg(feature = "endpoint")]
pub mod endpoint;

#[cfg(feature = "endpoint")]
pub use endpoint::EndpointRefreshSource;

/// An asynchronous source of renewed credentials
///
/// A source exchanges the current refresh token for a new token pair. It is
/// called at most once per renewal cycle and must not retry on its own.
#[async_trait]
pub trait RefreshTokenSource: Send + Sync {
    /// The error type returned in the event that renewal fails
    type Error: error::Error + Send + Sync + 'static;

    /// Exchanges `refresh_token` for a new token pair
    async fn request_token(&self, refresh_token: &RefreshTokenRef)
        -> Result<TokenPair, Self::Error>;
}
