//! An in-memory credential store

use std::{collections::HashMap, fmt};

use parking_lot::RwLock;

use super::{CredentialSlot, CredentialStore};
use crate::TokenPair;

/// A credential store that lives only as long as the process
#[derive(Default)]
pub struct InMemoryCredentialStore {
    slots: RwLock<HashMap<CredentialSlot, String>>,
}

impl InMemoryCredentialStore {
    /// Constructs a new, empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a store already holding `pair`
    pub fn with_pair(pair: &TokenPair) -> Self {
        let store = Self::new();
        store.store_pair(pair);
        store
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self, slot: CredentialSlot) -> Option<String> {
        self.slots.read().get(&slot).cloned()
    }

    fn set(&self, slot: CredentialSlot, value: String) {
        self.slots.write().insert(slot, value);
    }

    fn remove(&self, slot: CredentialSlot) {
        self.slots.write().remove(&slot);
    }
}

impl fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let slots = self.slots.read();
        let mut held: Vec<_> = slots.keys().map(|s| s.key()).collect();
        held.sort_unstable();
        f.debug_struct("InMemoryCredentialStore")
            .field("held", &held)
            .finish()
    }
}
