//! Credential storage
//!
//! A [`CredentialStore`] holds the current access token and refresh token
//! under two fixed slots. Stores do not validate or track expiry, and they
//! do not report failures to the caller. Implementations that persist to
//! durable storage log failures instead.

use std::sync::Arc;

use crate::{AccessToken, RefreshToken, TokenPair};

pub mod in_memory;
#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "file")]
pub use file::FileCredentialStore;
pub use in_memory::InMemoryCredentialStore;

/// A named slot in a credential store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialSlot {
    /// The access token, sent with every request
    Access,
    /// The refresh token, used only to renew the access token
    Refresh,
}

impl CredentialSlot {
    /// Every slot, in storage order
    pub const ALL: [CredentialSlot; 2] = [CredentialSlot::Access, CredentialSlot::Refresh];

    /// The fixed key under which this slot is stored
    pub const fn key(self) -> &'static str {
        match self {
            CredentialSlot::Access => "access_token",
            CredentialSlot::Refresh => "refresh_token",
        }
    }
}

/// A synchronous key/value store for credentials
pub trait CredentialStore: Send + Sync {
    /// Gets the value held in `slot`, if any
    fn get(&self, slot: CredentialSlot) -> Option<String>;

    /// Replaces the value held in `slot`
    fn set(&self, slot: CredentialSlot, value: String);

    /// Removes any value held in `slot`
    fn remove(&self, slot: CredentialSlot);

    /// Gets the stored access token
    fn access_token(&self) -> Option<AccessToken> {
        self.get(CredentialSlot::Access).map(AccessToken::new)
    }

    /// Gets the stored refresh token
    fn refresh_token(&self) -> Option<RefreshToken> {
        self.get(CredentialSlot::Refresh).map(RefreshToken::new)
    }

    /// Replaces both tokens with the contents of `pair`
    fn store_pair(&self, pair: &TokenPair) {
        self.set(CredentialSlot::Access, pair.access_token().as_str().to_owned());
        self.set(
            CredentialSlot::Refresh,
            pair.refresh_token().as_str().to_owned(),
        );
    }

    /// Removes both tokens
    fn clear(&self) {
        for slot in CredentialSlot::ALL {
            self.remove(slot);
        }
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    #[inline]
    fn get(&self, slot: CredentialSlot) -> Option<String> {
        (**self).get(slot)
    }

    #[inline]
    fn set(&self, slot: CredentialSlot, value: String) {
        (**self).set(slot, value)
    }

    #[inline]
    fn remove(&self, slot: CredentialSlot) {
        (**self).remove(slot)
    }
}
