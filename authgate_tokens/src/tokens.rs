use serde::{Deserialize, Serialize};

use crate::{AccessToken, AccessTokenRef, RefreshToken, RefreshTokenRef};

/// An access token together with the refresh token issued alongside it
///
/// Both tokens are always replaced together. Login and refresh endpoints
/// return this pair as `{"access_token": "…", "refresh_token": "…"}`; any
/// additional fields are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    access_token: AccessToken,
    refresh_token: RefreshToken,
}

impl TokenPair {
    /// Constructs a new token pair
    pub fn new(access_token: AccessToken, refresh_token: RefreshToken) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    /// Gets the access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// Gets the refresh token
    #[inline]
    pub fn refresh_token(&self) -> &RefreshTokenRef {
        &self.refresh_token
    }

    /// Splits the pair into its access and refresh tokens
    #[inline]
    pub fn into_parts(self) -> (AccessToken, RefreshToken) {
        (self.access_token, self.refresh_token)
    }
}
