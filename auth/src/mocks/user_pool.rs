//! Scripted user pool client.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::client::{
    AuthFlowResponse, ChallengeResponseRequest, ConfirmDeviceRequest, DeviceSummary,
    InitiateAuthRequest, ServiceFuture, UserPoolClient, WebAuthnCredentialSummary,
};
use crate::error::ServiceError;

type Script<T> = Arc<Mutex<VecDeque<Result<T, ServiceError>>>>;

fn pop<T>(script: &Script<T>, operation: &str) -> Result<T, ServiceError> {
    script
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
        .unwrap_or_else(|| {
            Err(ServiceError::Unknown(format!(
                "no scripted response for {operation}"
            )))
        })
}

/// A user pool client that plays back scripted responses and records what
/// it was asked.
///
/// Each operation pops the next scripted result for that operation; running
/// out of script yields an unknown-error response rather than a panic.
#[derive(Debug, Clone, Default)]
pub struct MockUserPoolClient {
    initiate_script: Script<AuthFlowResponse>,
    respond_script: Script<AuthFlowResponse>,

    initiate_calls: Arc<AtomicUsize>,
    respond_calls: Arc<AtomicUsize>,
    revoke_calls: Arc<AtomicUsize>,
    global_sign_out_calls: Arc<AtomicUsize>,
    confirm_device_calls: Arc<AtomicUsize>,

    initiate_requests: Arc<Mutex<Vec<InitiateAuthRequest>>>,
    respond_requests: Arc<Mutex<Vec<ChallengeResponseRequest>>>,

    devices: Arc<Mutex<Vec<DeviceSummary>>>,
    webauthn_credentials: Arc<Mutex<Vec<WebAuthnCredentialSummary>>>,
}

impl MockUserPoolClient {
    /// An empty (unscripted) client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next `initiate_auth` result.
    pub fn push_initiate_auth(&self, result: Result<AuthFlowResponse, ServiceError>) {
        self.initiate_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    /// Queue the next `respond_to_auth_challenge` result.
    pub fn push_respond(&self, result: Result<AuthFlowResponse, ServiceError>) {
        self.respond_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    /// Set what `list_devices` reports.
    pub fn set_devices(&self, devices: Vec<DeviceSummary>) {
        *self.devices.lock().unwrap_or_else(PoisonError::into_inner) = devices;
    }

    /// Set what `list_webauthn_credentials` reports.
    pub fn set_webauthn_credentials(&self, credentials: Vec<WebAuthnCredentialSummary>) {
        *self
            .webauthn_credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = credentials;
    }

    /// How many times `initiate_auth` was called.
    #[must_use]
    pub fn initiate_auth_calls(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    /// How many times `respond_to_auth_challenge` was called.
    #[must_use]
    pub fn respond_calls(&self) -> usize {
        self.respond_calls.load(Ordering::SeqCst)
    }

    /// How many times `revoke_token` was called.
    #[must_use]
    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    /// How many times `global_sign_out` was called.
    #[must_use]
    pub fn global_sign_out_calls(&self) -> usize {
        self.global_sign_out_calls.load(Ordering::SeqCst)
    }

    /// How many times `confirm_device` was called.
    #[must_use]
    pub fn confirm_device_calls(&self) -> usize {
        self.confirm_device_calls.load(Ordering::SeqCst)
    }

    /// The recorded `initiate_auth` requests.
    #[must_use]
    pub fn initiate_requests(&self) -> Vec<InitiateAuthRequest> {
        self.initiate_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The recorded challenge responses.
    #[must_use]
    pub fn respond_requests(&self) -> Vec<ChallengeResponseRequest> {
        self.respond_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UserPoolClient for MockUserPoolClient {
    fn initiate_auth(&self, request: InitiateAuthRequest) -> ServiceFuture<'_, AuthFlowResponse> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        self.initiate_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let result = pop(&self.initiate_script, "initiate_auth");
        Box::pin(async move { result })
    }

    fn respond_to_auth_challenge(
        &self,
        request: ChallengeResponseRequest,
    ) -> ServiceFuture<'_, AuthFlowResponse> {
        self.respond_calls.fetch_add(1, Ordering::SeqCst);
        self.respond_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let result = pop(&self.respond_script, "respond_to_auth_challenge");
        Box::pin(async move { result })
    }

    fn revoke_token(&self, _refresh_token: &str) -> ServiceFuture<'_, ()> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn global_sign_out(&self, _access_token: &str) -> ServiceFuture<'_, ()> {
        self.global_sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn confirm_device(&self, _request: ConfirmDeviceRequest) -> ServiceFuture<'_, ()> {
        self.confirm_device_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn list_devices(&self, _access_token: &str) -> ServiceFuture<'_, Vec<DeviceSummary>> {
        let devices = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Box::pin(async move { Ok(devices) })
    }

    fn forget_device(&self, _access_token: &str, device_key: &str) -> ServiceFuture<'_, ()> {
        let device_key = device_key.to_owned();
        let devices = Arc::clone(&self.devices);
        Box::pin(async move {
            devices
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|device| device.device_key != device_key);
            Ok(())
        })
    }

    fn list_webauthn_credentials(
        &self,
        _access_token: &str,
    ) -> ServiceFuture<'_, Vec<WebAuthnCredentialSummary>> {
        let credentials = self
            .webauthn_credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Box::pin(async move { Ok(credentials) })
    }
}
