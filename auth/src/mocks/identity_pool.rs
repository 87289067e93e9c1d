//! Scripted identity pool client.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::client::{IdentityPoolClient, ServiceFuture};
use crate::data::AwsCredentials;
use crate::error::ServiceError;

/// An identity pool client that hands out a fixed identity and scripted
/// credential results.
#[derive(Debug, Clone)]
pub struct MockIdentityPoolClient {
    identity_id: String,
    credentials_script: Arc<Mutex<VecDeque<Result<AwsCredentials, ServiceError>>>>,
    get_id_calls: Arc<AtomicUsize>,
    get_credentials_calls: Arc<AtomicUsize>,
}

impl MockIdentityPoolClient {
    /// A client resolving every caller to `identity_id`.
    #[must_use]
    pub fn new(identity_id: impl Into<String>) -> Self {
        Self {
            identity_id: identity_id.into(),
            credentials_script: Arc::new(Mutex::new(VecDeque::new())),
            get_id_calls: Arc::new(AtomicUsize::new(0)),
            get_credentials_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue the next `get_credentials_for_identity` result.
    pub fn push_credentials(&self, result: Result<AwsCredentials, ServiceError>) {
        self.credentials_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    /// How many times `get_id` was called.
    #[must_use]
    pub fn get_id_calls(&self) -> usize {
        self.get_id_calls.load(Ordering::SeqCst)
    }

    /// How many times `get_credentials_for_identity` was called.
    #[must_use]
    pub fn get_credentials_calls(&self) -> usize {
        self.get_credentials_calls.load(Ordering::SeqCst)
    }
}

impl IdentityPoolClient for MockIdentityPoolClient {
    fn get_id(&self, _logins: HashMap<String, String>) -> ServiceFuture<'_, String> {
        self.get_id_calls.fetch_add(1, Ordering::SeqCst);
        let identity_id = self.identity_id.clone();
        Box::pin(async move { Ok(identity_id) })
    }

    fn get_credentials_for_identity(
        &self,
        _identity_id: &str,
        _logins: HashMap<String, String>,
    ) -> ServiceFuture<'_, AwsCredentials> {
        self.get_credentials_calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .credentials_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(ServiceError::Unknown(
                    "no scripted response for get_credentials_for_identity".into(),
                ))
            });
        Box::pin(async move { result })
    }
}
