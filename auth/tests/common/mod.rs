//! Shared fixtures for the end-to-end flow tests.

#![allow(dead_code)] // Not every test binary uses every fixture

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use cognito_auth::client::{AuthFlowResponse, AuthTokensResult, NewDeviceMetadata};
use cognito_auth::config::AuthConfig;
use cognito_auth::data::{AuthChallenge, AwsCredentials, ChallengeKind, UserPoolTokens};
use cognito_auth::environment::AuthEnvironment;
use cognito_auth::machine::AuthStateMachine;
use cognito_auth::mocks::{
    FixedClock, FixedKeySource, InMemoryCredentialStore, MockIdentityPoolClient,
    MockUserPoolClient,
};

/// The frozen "now" every test starts at.
pub const NOW: i64 = 1_700_000_000;

/// Give fire-and-forget persistence effects a chance to finish before
/// asserting on the store.
pub async fn settle_effects() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

/// Everything a test needs to drive and inspect the machine.
pub struct Harness {
    pub machine: AuthStateMachine,
    pub user_pool: Arc<MockUserPoolClient>,
    pub identity_pool: Arc<MockIdentityPoolClient>,
    pub store: Arc<InMemoryCredentialStore>,
    pub clock: FixedClock,
}

/// Build a machine wired to mocks, with an identity pool configured.
pub fn harness() -> Harness {
    harness_with_config(
        AuthConfig::new("eu-west-1_TestPool", "client-id", "eu-west-1")
            .with_identity_pool("eu-west-1:identity-pool"),
    )
}

/// Build a machine wired to mocks with a custom configuration.
pub fn harness_with_config(config: AuthConfig) -> Harness {
    let user_pool = Arc::new(MockUserPoolClient::new());
    let identity_pool = Arc::new(MockIdentityPoolClient::new("eu-west-1:identity-1"));
    let store = Arc::new(InMemoryCredentialStore::new());
    let clock = FixedClock::at_epoch(NOW);

    let identity_handle: Option<Arc<dyn cognito_auth::client::IdentityPoolClient>> =
        if config.has_identity_pool() {
            Some(identity_pool.clone())
        } else {
            None
        };

    let environment = AuthEnvironment::new(
        user_pool.clone(),
        identity_handle,
        store.clone(),
        Arc::new(clock.clone()),
        Arc::new(FixedKeySource::default()),
        config,
    );

    let machine = AuthStateMachine::new(environment).expect("valid test configuration");

    Harness {
        machine,
        user_pool,
        identity_pool,
        store,
        clock,
    }
}

/// A JWT-shaped token whose payload carries the given claims.
pub fn jwt_with_claims(claims: &[(&str, &str)]) -> String {
    let object: HashMap<&str, &str> = claims.iter().copied().collect();
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&object).expect("claims serialize"));
    format!("header.{payload}.signature")
}

/// A token set for `username`, expiring at `expires_at`.
pub fn tokens_for(username: &str, expires_at: i64) -> UserPoolTokens {
    UserPoolTokens {
        id_token: jwt_with_claims(&[("sub", "user-1234"), ("cognito:username", username)]),
        access_token: jwt_with_claims(&[("sub", "user-1234"), ("username", username)]),
        refresh_token: Some(format!("refresh-{username}")),
        expires_at,
    }
}

/// AWS credentials expiring at `expiration`.
pub fn aws_credentials(expiration: i64) -> AwsCredentials {
    AwsCredentials {
        access_key_id: "AKIATEST".into(),
        secret_access_key: "secret".into(),
        session_token: Some("session-token".into()),
        expiration: Some(expiration),
    }
}

/// The `PASSWORD_VERIFIER` challenge the pool issues for an SRP initiate.
pub fn password_verifier_challenge(username: &str) -> AuthFlowResponse {
    AuthFlowResponse::Challenge(AuthChallenge {
        kind: ChallengeKind::PasswordVerifier,
        username: username.to_owned(),
        session: Some("srp-session".into()),
        parameters: HashMap::from([
            ("USER_ID_FOR_SRP".to_owned(), username.to_owned()),
            (
                "SALT".to_owned(),
                "36ef01c6dde9fe503da333b1acc758ba".to_owned(),
            ),
            (
                "SRP_B".to_owned(),
                "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90".to_owned(),
            ),
            (
                "SECRET_BLOCK".to_owned(),
                base64::engine::general_purpose::STANDARD.encode(b"secret block"),
            ),
        ]),
    })
}

/// An MFA challenge following the verifier step.
pub fn sms_mfa_challenge(username: &str) -> AuthFlowResponse {
    AuthFlowResponse::Challenge(AuthChallenge {
        kind: ChallengeKind::SmsMfa,
        username: username.to_owned(),
        session: Some("mfa-session".into()),
        parameters: HashMap::from([(
            "CODE_DELIVERY_DESTINATION".to_owned(),
            "+***1234".to_owned(),
        )]),
    })
}

/// A token-issuing response, optionally with new-device material.
pub fn tokens_response(username: &str, expires_at: i64, with_device: bool) -> AuthFlowResponse {
    AuthFlowResponse::Tokens(AuthTokensResult {
        tokens: tokens_for(username, expires_at),
        new_device: with_device.then(|| NewDeviceMetadata {
            device_key: "device-key-1".into(),
            device_group_key: "device-group-1".into(),
        }),
    })
}
