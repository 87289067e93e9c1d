//! Session management: hydration, refresh, coalescing, and guest access.

#![allow(clippy::unwrap_used, clippy::panic)] // Test code can unwrap and panic

mod common;

use cognito_auth::client::{AuthFlowResponse, AuthTokensResult, InitiateAuthRequest};
use cognito_auth::config::AuthConfig;
use cognito_auth::data::{AuthCredential, DeviceMetadata, SignInMethod, SignedInData};
use cognito_auth::error::{AuthError, ServiceError};
use cognito_auth::state::{AuthenticationState, AuthorizationState};
use cognito_auth::store::keys;

use common::{NOW, aws_credentials, harness, harness_with_config, tokens_for};

fn seeded_signed_in_data(expires_at: i64) -> SignedInData {
    SignedInData::from_tokens(
        "alice",
        SignInMethod::ApiBased(cognito_auth::data::AuthFlowKind::UserSrp),
        tokens_for("alice", expires_at),
        chrono::DateTime::from_timestamp(NOW - 3600, 0).unwrap(),
    )
}

fn seed_session(h: &common::Harness, expires_at: i64) {
    let data = seeded_signed_in_data(expires_at);
    let credential = AuthCredential::UserAndIdentityPool {
        tokens: data.tokens.clone(),
        identity_id: "eu-west-1:identity-1".into(),
        credentials: aws_credentials(expires_at),
    };
    h.store.seed(
        keys::SIGNED_IN_DATA,
        &serde_json::to_string(&data).unwrap(),
    );
    h.store.seed(
        keys::CREDENTIAL,
        &serde_json::to_string(&credential).unwrap(),
    );
}

#[tokio::test]
async fn cold_start_hydrates_a_persisted_session_without_network_calls() {
    let h = harness();
    seed_session(&h, NOW + 3600);

    let state = h.machine.configure().await.unwrap();

    assert!(matches!(
        state.authentication,
        AuthenticationState::SignedIn(..)
    ));
    assert!(matches!(
        state.authorization,
        AuthorizationState::SessionEstablished(_)
    ));
    assert_eq!(h.user_pool.initiate_auth_calls(), 0);
    assert_eq!(h.identity_pool.get_id_calls(), 0);

    // A valid hydrated session resolves credentials with no refresh
    let credentials = h.machine.get_credentials().await.unwrap();
    assert_eq!(credentials.access_key_id, "AKIATEST");
    assert_eq!(h.user_pool.initiate_auth_calls(), 0);
}

#[tokio::test]
async fn corrupt_store_degrades_to_a_signed_out_start() {
    let h = harness();
    h.store.seed(keys::SIGNED_IN_DATA, "not valid json at all");

    let state = h.machine.configure().await.unwrap();
    assert!(matches!(
        state.authentication,
        AuthenticationState::SignedOut(_)
    ));
}

#[tokio::test]
async fn expired_session_refreshes_once_and_returns_fresh_credentials() {
    let h = harness();
    seed_session(&h, NOW + 3600);
    h.machine.configure().await.unwrap();

    // Let the tokens and AWS credentials age past expiry
    h.clock.advance_secs(7200);

    h.user_pool
        .push_initiate_auth(Ok(AuthFlowResponse::Tokens(AuthTokensResult {
            tokens: cognito_auth::data::UserPoolTokens {
                refresh_token: None, // refresh responses do not re-issue one
                ..tokens_for("alice", NOW + 7200 + 3600)
            },
            new_device: None,
        })));
    h.identity_pool
        .push_credentials(Ok(aws_credentials(NOW + 7200 + 3600)));

    let credentials = h.machine.get_credentials().await.unwrap();
    assert_eq!(credentials.expiration, Some(NOW + 7200 + 3600));

    // Exactly one refresh flow fired
    assert_eq!(h.user_pool.initiate_auth_calls(), 1);
    let requests = h.user_pool.initiate_requests();
    let InitiateAuthRequest::RefreshToken(request) = &requests[0] else {
        panic!("expected a refresh token flow");
    };
    assert_eq!(request.refresh_token, "refresh-alice");

    // The machine settled back into an established session with the new
    // expiration, and kept the old refresh token
    let state = h.machine.current_state().await;
    let credential = state.established_credential().unwrap();
    let tokens = credential.user_pool_tokens().unwrap();
    assert_eq!(tokens.expires_at, NOW + 7200 + 3600);
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-alice"));

    // The refreshed credential was re-persisted
    common::settle_effects().await;
    let blob = h.store.blob(keys::CREDENTIAL).unwrap();
    assert!(blob.contains(&(NOW + 7200 + 3600).to_string()));
}

#[tokio::test]
async fn concurrent_credential_requests_coalesce_into_one_refresh() {
    let h = harness();
    seed_session(&h, NOW + 3600);
    h.machine.configure().await.unwrap();
    h.clock.advance_secs(7200);

    h.user_pool
        .push_initiate_auth(Ok(AuthFlowResponse::Tokens(AuthTokensResult {
            tokens: tokens_for("alice", NOW + 7200 + 3600),
            new_device: None,
        })));
    h.identity_pool
        .push_credentials(Ok(aws_credentials(NOW + 7200 + 3600)));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let machine = h.machine.clone();
            tokio::spawn(async move { machine.get_credentials().await })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }

    // Every caller observed the same refreshed credential set
    for credentials in &results {
        assert_eq!(credentials.expiration, Some(NOW + 7200 + 3600));
    }

    // ... from exactly one refresh flow and one identity fetch
    assert_eq!(h.user_pool.initiate_auth_calls(), 1);
    assert_eq!(h.identity_pool.get_credentials_calls(), 1);
}

#[tokio::test]
async fn failed_refresh_surfaces_the_error_and_keeps_the_old_credential() {
    let h = harness();
    seed_session(&h, NOW + 3600);
    h.machine.configure().await.unwrap();
    h.clock.advance_secs(7200);

    h.user_pool
        .push_initiate_auth(Err(ServiceError::Network("connection reset".into())));

    let error = h.machine.get_credentials().await.unwrap_err();
    assert_eq!(
        error,
        AuthError::Service(ServiceError::Network("connection reset".into()))
    );
    // Retryable classification is preserved for the caller
    assert!(error.is_retryable());

    // The signed-in session data survives the failed refresh
    let state = h.machine.current_state().await;
    assert!(state.signed_in_data().is_some());
    let AuthorizationState::Error(session_error) = &state.authorization else {
        panic!("expected a preserved session error");
    };
    assert!(!session_error.credential.is_empty());

    // A later retry recovers through the same event
    h.user_pool
        .push_initiate_auth(Ok(AuthFlowResponse::Tokens(AuthTokensResult {
            tokens: tokens_for("alice", NOW + 7200 + 3600),
            new_device: None,
        })));
    h.identity_pool
        .push_credentials(Ok(aws_credentials(NOW + 7200 + 3600)));
    let credentials = h.machine.get_credentials().await.unwrap();
    assert_eq!(credentials.expiration, Some(NOW + 7200 + 3600));
}

#[tokio::test]
async fn guest_access_fetches_an_unauthenticated_session_on_demand() {
    let h = harness();
    h.machine.configure().await.unwrap();

    h.identity_pool
        .push_credentials(Ok(aws_credentials(NOW + 3600)));

    let identity_id = h.machine.get_identity_id().await.unwrap();
    assert_eq!(identity_id, "eu-west-1:identity-1");
    assert_eq!(h.identity_pool.get_id_calls(), 1);

    let state = h.machine.current_state().await;
    assert!(matches!(
        state.established_credential(),
        Some(AuthCredential::IdentityPool { .. })
    ));
}

#[tokio::test]
async fn signed_out_without_identity_pool_yields_a_typed_error() {
    let h = harness_with_config(AuthConfig::new(
        "eu-west-1_TestPool",
        "client-id",
        "eu-west-1",
    ));
    h.machine.configure().await.unwrap();

    let error = h.machine.get_credentials().await.unwrap_err();
    assert_eq!(error, AuthError::SignedOut);
}

#[tokio::test]
async fn requesting_credentials_before_configure_is_a_configuration_error() {
    let h = harness();
    let error = h.machine.get_credentials().await.unwrap_err();
    assert!(matches!(error, AuthError::Configuration(_)));
}

#[tokio::test]
async fn sign_out_revokes_clears_and_remembers_the_username() {
    let h = harness();
    seed_session(&h, NOW + 3600);
    h.machine.configure().await.unwrap();

    h.machine.sign_out(true).await.unwrap();
    common::settle_effects().await;

    assert_eq!(h.user_pool.global_sign_out_calls(), 1);
    assert_eq!(h.user_pool.revoke_calls(), 1);
    assert!(h.store.blob(keys::SIGNED_IN_DATA).is_none());
    assert!(h.store.blob(keys::CREDENTIAL).is_none());
    assert_eq!(h.store.blob(keys::LAST_USERNAME).as_deref(), Some("alice"));

    let state = h.machine.current_state().await;
    let AuthenticationState::SignedOut(data) = &state.authentication else {
        panic!("expected a signed-out state");
    };
    assert_eq!(data.last_signed_in_username.as_deref(), Some("alice"));

    // Tracked-device metadata survives sign-out
    // (none was seeded here, but the key namespace is untouched)
    assert!(matches!(
        state.authorization,
        AuthorizationState::SessionEstablished(AuthCredential::Empty)
    ));
}

#[tokio::test]
async fn device_queries_require_a_session() {
    let h = harness();
    h.machine.configure().await.unwrap();

    let error = h.machine.fetch_devices().await.unwrap_err();
    assert!(matches!(error, AuthError::InvalidState(_)));
}

#[tokio::test]
async fn device_and_passkey_queries_use_the_session_access_token() {
    let h = harness();
    seed_session(&h, NOW + 3600);
    h.machine.configure().await.unwrap();

    h.user_pool.set_devices(vec![cognito_auth::client::DeviceSummary {
        device_key: "device-key-1".into(),
        name: Some("Pixel".into()),
        last_authenticated_at: Some(NOW - 100),
    }]);
    h.user_pool
        .set_webauthn_credentials(vec![cognito_auth::client::WebAuthnCredentialSummary {
            credential_id: "cred-1".into(),
            friendly_name: Some("security key".into()),
            relying_party_id: "example.com".into(),
            created_at: Some(NOW - 1000),
        }]);

    let devices = h.machine.fetch_devices().await.unwrap();
    assert_eq!(devices.len(), 1);

    let passkeys = h.machine.list_webauthn_credentials().await.unwrap();
    assert_eq!(passkeys.len(), 1);

    h.machine.forget_device(Some("device-key-1")).await.unwrap();
    assert!(h.machine.fetch_devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn hydrated_device_metadata_rides_along_on_the_next_sign_in() {
    let h = harness();
    let device = DeviceMetadata::Registered {
        device_key: "device-key-9".into(),
        device_group_key: "group-9".into(),
        device_secret: Some("device-password".into()),
    };
    h.store.seed(
        &keys::device_metadata("alice"),
        &serde_json::to_string(&device).unwrap(),
    );
    h.machine.configure().await.unwrap();

    h.user_pool
        .push_initiate_auth(Ok(common::password_verifier_challenge("alice")));
    h.user_pool
        .push_respond(Ok(common::tokens_response("alice", NOW + 3600, false)));
    h.identity_pool
        .push_credentials(Ok(aws_credentials(NOW + 3600)));

    h.machine.sign_in("alice", "hunter2").await.unwrap();

    // The initiate request advertised the known device key
    let requests = h.user_pool.initiate_requests();
    let InitiateAuthRequest::UserSrp(request) = &requests[0] else {
        panic!("expected an SRP flow");
    };
    assert_eq!(request.device_key.as_deref(), Some("device-key-9"));

    // And the signed-in state carries the tracked device
    let state = h.machine.current_state().await;
    let AuthenticationState::SignedIn(_, device) = &state.authentication else {
        panic!("expected a signed-in state");
    };
    assert_eq!(device.device_key().map(String::as_str), Some("device-key-9"));
}
