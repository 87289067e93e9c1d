//! In-memory credential store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::store::{CredentialStore, CredentialStoreError, StoreFuture};

/// `HashMap`-backed credential store.
///
/// Clones share the same map. Can be switched into a failing mode to test
/// hydration and persistence failure paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    blobs: Arc<Mutex<HashMap<String, String>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryCredentialStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Direct synchronous read, for test assertions.
    #[must_use]
    pub fn blob(&self, key: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Direct synchronous write, for seeding cold-start tests.
    pub fn seed(&self, key: &str, value: &str) {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
    }

    fn check(&self) -> Result<(), CredentialStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CredentialStoreError::Io("simulated store failure".into()))
        } else {
            Ok(())
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn put(&self, key: &str, value: &str) -> StoreFuture<'_, ()> {
        let key = key.to_owned();
        let value = value.to_owned();
        Box::pin(async move {
            self.check()?;
            self.blobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, value);
            Ok(())
        })
    }

    fn get(&self, key: &str) -> StoreFuture<'_, Option<String>> {
        let key = key.to_owned();
        Box::pin(async move {
            self.check()?;
            Ok(self
                .blobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&key)
                .cloned())
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, ()> {
        let key = key.to_owned();
        Box::pin(async move {
            self.check()?;
            self.blobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
            Ok(())
        })
    }

    fn remove_all(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            self.blobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            Ok(())
        })
    }
}
