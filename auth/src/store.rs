//! Credential store boundary and the blob codec layered on top of it.
//!
//! The store itself is a dumb key/value surface over opaque string blobs —
//! encryption-at-rest and platform storage are the implementation's concern.
//! This module owns the key namespace and the JSON codec used to persist
//! session material across process restarts, so the dispatcher can hydrate
//! its initial state from disk on a cold start.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::data::{AuthCredential, DeviceMetadata, SignedInData};

/// Boxed future alias for store operations.
pub type StoreFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, CredentialStoreError>> + Send + 'a>>;

/// Failures reported by the credential store boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialStoreError {
    /// The underlying storage failed.
    #[error("Credential store I/O failure: {0}")]
    Io(String),

    /// A persisted blob could not be encoded or decoded.
    #[error("Credential store serialization failure: {0}")]
    Serialization(String),
}

/// Key/value storage of opaque string blobs.
///
/// Used to persist the serialized credential and session data across
/// process restarts. Implementations must be `Send + Sync`; they are only
/// touched from effect execution, never from the pure resolvers.
pub trait CredentialStore: Send + Sync {
    /// Store a blob under a key, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> StoreFuture<'_, ()>;

    /// Fetch the blob stored under a key.
    fn get(&self, key: &str) -> StoreFuture<'_, Option<String>>;

    /// Remove the blob stored under a key.
    fn remove(&self, key: &str) -> StoreFuture<'_, ()>;

    /// Remove every blob this store holds.
    fn remove_all(&self) -> StoreFuture<'_, ()>;
}

/// The key namespace for persisted session material.
pub mod keys {
    /// The serialized [`AuthCredential`](crate::data::AuthCredential).
    pub const CREDENTIAL: &str = "session.credential";

    /// The serialized [`SignedInData`](crate::data::SignedInData).
    pub const SIGNED_IN_DATA: &str = "session.signedInData";

    /// The last signed-in username, kept after sign-out.
    pub const LAST_USERNAME: &str = "session.lastUsername";

    /// Per-user device metadata.
    #[must_use]
    pub fn device_metadata(username: &str) -> String {
        format!("device.metadata.{username}")
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, CredentialStoreError> {
    serde_json::to_string(value)
        .map_err(|err| CredentialStoreError::Serialization(err.to_string()))
}

fn decode<T: DeserializeOwned>(blob: &str) -> Result<T, CredentialStoreError> {
    serde_json::from_str(blob)
        .map_err(|err| CredentialStoreError::Serialization(err.to_string()))
}

/// Load the persisted credential, if any.
///
/// # Errors
///
/// Returns the store's error when the read or decode fails.
pub async fn load_credential(
    store: &dyn CredentialStore,
) -> Result<Option<AuthCredential>, CredentialStoreError> {
    match store.get(keys::CREDENTIAL).await? {
        Some(blob) => Ok(Some(decode(&blob)?)),
        None => Ok(None),
    }
}

/// Persist the credential blob.
///
/// # Errors
///
/// Returns the store's error when the encode or write fails.
pub async fn persist_credential(
    store: &dyn CredentialStore,
    credential: &AuthCredential,
) -> Result<(), CredentialStoreError> {
    store.put(keys::CREDENTIAL, &encode(credential)?).await
}

/// Load the persisted signed-in data, if any.
///
/// # Errors
///
/// Returns the store's error when the read or decode fails.
pub async fn load_signed_in_data(
    store: &dyn CredentialStore,
) -> Result<Option<SignedInData>, CredentialStoreError> {
    match store.get(keys::SIGNED_IN_DATA).await? {
        Some(blob) => Ok(Some(decode(&blob)?)),
        None => Ok(None),
    }
}

/// Persist the signed-in data blob.
///
/// # Errors
///
/// Returns the store's error when the encode or write fails.
pub async fn persist_signed_in_data(
    store: &dyn CredentialStore,
    data: &SignedInData,
) -> Result<(), CredentialStoreError> {
    store.put(keys::SIGNED_IN_DATA, &encode(data)?).await
}

/// Load the persisted device metadata for a user. Missing or corrupt blobs
/// read as [`DeviceMetadata::Empty`] — device trust degrades, it never
/// blocks a sign-in.
pub async fn load_device_metadata(store: &dyn CredentialStore, username: &str) -> DeviceMetadata {
    match store.get(&keys::device_metadata(username)).await {
        Ok(Some(blob)) => decode(&blob).unwrap_or_default(),
        Ok(None) => DeviceMetadata::Empty,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read device metadata");
            DeviceMetadata::Empty
        },
    }
}

/// Persist the device metadata for a user.
///
/// # Errors
///
/// Returns the store's error when the encode or write fails.
pub async fn persist_device_metadata(
    store: &dyn CredentialStore,
    username: &str,
    device: &DeviceMetadata,
) -> Result<(), CredentialStoreError> {
    store
        .put(&keys::device_metadata(username), &encode(device)?)
        .await
}

/// Clear the session blobs after sign-out, recording the last username.
///
/// Device metadata is deliberately kept: tracked devices survive sign-out.
///
/// # Errors
///
/// Returns the store's error when a removal or write fails.
pub async fn clear_session(
    store: &dyn CredentialStore,
    last_username: Option<&str>,
) -> Result<(), CredentialStoreError> {
    store.remove(keys::CREDENTIAL).await?;
    store.remove(keys::SIGNED_IN_DATA).await?;
    match last_username {
        Some(username) => store.put(keys::LAST_USERNAME, username).await,
        None => store.remove(keys::LAST_USERNAME).await,
    }
}

/// Read the last signed-in username, if recorded.
pub async fn load_last_username(store: &dyn CredentialStore) -> Option<String> {
    store.get(keys::LAST_USERNAME).await.ok().flatten()
}
