//! End-to-end sign-in flows against scripted service mocks.

#![allow(clippy::unwrap_used, clippy::panic)] // Test code can unwrap and panic

mod common;

use std::collections::HashMap;
use std::time::Duration;

use cognito_auth::data::{ChallengeKind, DeviceMetadata, SignInMethod};
use cognito_auth::error::{AuthError, ServiceError};
use cognito_auth::machine::SignInOutcome;
use cognito_auth::state::{AuthenticationState, AuthorizationState};

use common::{
    NOW, harness, password_verifier_challenge, sms_mfa_challenge, tokens_for, tokens_response,
};

#[tokio::test]
async fn srp_sign_in_establishes_a_full_session() {
    let h = harness();
    h.machine.configure().await.unwrap();

    h.user_pool
        .push_initiate_auth(Ok(password_verifier_challenge("alice")));
    h.user_pool
        .push_respond(Ok(tokens_response("alice", NOW + 3600, false)));
    h.identity_pool
        .push_credentials(Ok(common::aws_credentials(NOW + 3600)));

    let outcome = h.machine.sign_in("alice", "hunter2").await.unwrap();
    let SignInOutcome::Done { data } = outcome else {
        panic!("expected a completed sign-in, got {outcome:?}");
    };
    assert_eq!(data.username, "alice");
    assert_eq!(data.user_id, "user-1234");
    assert_eq!(
        data.sign_in_method,
        SignInMethod::ApiBased(cognito_auth::data::AuthFlowKind::UserSrp)
    );

    let state = h.machine.current_state().await;
    assert!(matches!(
        state.authentication,
        AuthenticationState::SignedIn(..)
    ));
    let credential = state.established_credential().unwrap();
    assert_eq!(
        credential.identity_id().map(String::as_str),
        Some("eu-west-1:identity-1")
    );
    assert!(credential.aws_credentials().is_some());

    // One initiate round trip, one verifier round trip
    assert_eq!(h.user_pool.initiate_auth_calls(), 1);
    assert_eq!(h.user_pool.respond_calls(), 1);

    // The verifier response carried the computed claim fields
    let respond_requests = h.user_pool.respond_requests();
    let respond = &respond_requests[0];
    assert_eq!(respond.kind, ChallengeKind::PasswordVerifier);
    assert!(respond.responses.contains_key("PASSWORD_CLAIM_SIGNATURE"));
    assert!(respond.responses.contains_key("PASSWORD_CLAIM_SECRET_BLOCK"));
    assert!(respond.responses.contains_key("TIMESTAMP"));

    // The session was persisted for the next cold start
    common::settle_effects().await;
    assert!(h.store.blob(cognito_auth::store::keys::SIGNED_IN_DATA).is_some());
    assert!(h.store.blob(cognito_auth::store::keys::CREDENTIAL).is_some());
}

#[tokio::test]
async fn rejected_password_verifier_preserves_signed_out_state() {
    let h = harness();
    h.machine.configure().await.unwrap();

    h.user_pool
        .push_initiate_auth(Ok(password_verifier_challenge("alice")));
    h.user_pool.push_respond(Err(ServiceError::NotAuthorized(
        "Incorrect username or password.".into(),
    )));

    let error = h.machine.sign_in("alice", "wrong").await.unwrap_err();
    assert_eq!(
        error,
        AuthError::Service(ServiceError::NotAuthorized(
            "Incorrect username or password.".into()
        ))
    );

    // No partial sign-in survives the failure
    let state = h.machine.current_state().await;
    assert!(matches!(
        state.authentication,
        AuthenticationState::SignedOut(_)
    ));
    assert!(h.store.blob(cognito_auth::store::keys::SIGNED_IN_DATA).is_none());
}

#[tokio::test]
async fn mfa_challenge_retries_wrong_codes_then_succeeds() {
    let h = harness();
    h.machine.configure().await.unwrap();

    h.user_pool
        .push_initiate_auth(Ok(password_verifier_challenge("alice")));
    h.user_pool.push_respond(Ok(sms_mfa_challenge("alice")));

    let outcome = h.machine.sign_in("alice", "hunter2").await.unwrap();
    let SignInOutcome::ChallengeRequired { challenge } = outcome else {
        panic!("expected an MFA challenge, got {outcome:?}");
    };
    assert_eq!(challenge.kind, ChallengeKind::SmsMfa);
    // Parameters arrive verbatim for the caller to render
    assert_eq!(
        challenge.parameters.get("CODE_DELIVERY_DESTINATION"),
        Some(&"+***1234".to_owned())
    );

    // Two wrong codes: each round trips and comes back retryable
    for _ in 0..2 {
        h.user_pool
            .push_respond(Err(ServiceError::CodeMismatch("wrong code".into())));
        let error = h
            .machine
            .confirm_sign_in("000000", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            AuthError::Service(ServiceError::CodeMismatch(_))
        ));
        // The challenge is still pending and answerable
        assert!(h.machine.current_state().await.pending_challenge().is_some());
    }

    // Correct code completes the flow
    h.user_pool
        .push_respond(Ok(tokens_response("alice", NOW + 3600, false)));
    h.identity_pool
        .push_credentials(Ok(common::aws_credentials(NOW + 3600)));

    let outcome = h
        .machine
        .confirm_sign_in("123456", HashMap::new())
        .await
        .unwrap();
    assert!(outcome.is_done());

    // verifier + 2 wrong answers + 1 correct answer
    assert_eq!(h.user_pool.respond_calls(), 4);
}

#[tokio::test]
async fn sign_out_mid_challenge_returns_to_signed_out() {
    let h = harness();
    h.machine.configure().await.unwrap();

    h.user_pool
        .push_initiate_auth(Ok(password_verifier_challenge("alice")));
    h.user_pool.push_respond(Ok(sms_mfa_challenge("alice")));

    let outcome = h.machine.sign_in("alice", "hunter2").await.unwrap();
    assert!(matches!(outcome, SignInOutcome::ChallengeRequired { .. }));

    // Abandon the challenge by signing out
    h.machine.sign_out(false).await.unwrap();
    let state = h.machine.current_state().await;
    assert!(matches!(
        state.authentication,
        AuthenticationState::SignedOut(_)
    ));

    // A wait for a sign-in that will never come times out instead of
    // hanging; the machine itself is unaffected
    let result = h
        .machine
        .wait_for(
            |state| matches!(state.authentication, AuthenticationState::SignedIn(..)),
            Duration::from_millis(200),
        )
        .await;
    assert_eq!(result.unwrap_err(), AuthError::Timeout);

    // And the machine remains usable for a fresh attempt
    h.user_pool
        .push_initiate_auth(Ok(password_verifier_challenge("alice")));
    h.user_pool
        .push_respond(Ok(tokens_response("alice", NOW + 3600, false)));
    h.identity_pool
        .push_credentials(Ok(common::aws_credentials(NOW + 3600)));
    let outcome = h.machine.sign_in("alice", "hunter2").await.unwrap();
    assert!(outcome.is_done());
}

#[tokio::test]
async fn sign_in_while_signed_in_is_rejected_without_touching_the_session() {
    let h = harness();
    h.machine.configure().await.unwrap();

    h.user_pool
        .push_initiate_auth(Ok(password_verifier_challenge("alice")));
    h.user_pool
        .push_respond(Ok(tokens_response("alice", NOW + 3600, false)));
    h.identity_pool
        .push_credentials(Ok(common::aws_credentials(NOW + 3600)));
    h.machine.sign_in("alice", "hunter2").await.unwrap();

    let error = h.machine.sign_in("bob", "pw").await.unwrap_err();
    assert!(matches!(error, AuthError::InvalidState(_)));

    // The existing session is untouched
    let state = h.machine.current_state().await;
    assert_eq!(state.signed_in_data().unwrap().username, "alice");
    // And no extra network calls were made for the rejected attempt
    assert_eq!(h.user_pool.initiate_auth_calls(), 1);
}

#[tokio::test]
async fn empty_username_is_rejected_before_any_event() {
    let h = harness();
    h.machine.configure().await.unwrap();

    let error = h.machine.sign_in("  ", "pw").await.unwrap_err();
    assert!(matches!(error, AuthError::Validation(_)));
    assert_eq!(h.user_pool.initiate_auth_calls(), 0);
}

#[tokio::test]
async fn new_device_is_confirmed_and_recorded() {
    let h = harness();
    h.machine.configure().await.unwrap();

    h.user_pool
        .push_initiate_auth(Ok(password_verifier_challenge("alice")));
    h.user_pool
        .push_respond(Ok(tokens_response("alice", NOW + 3600, true)));
    h.identity_pool
        .push_credentials(Ok(common::aws_credentials(NOW + 3600)));

    h.machine.sign_in("alice", "hunter2").await.unwrap();

    assert_eq!(h.user_pool.confirm_device_calls(), 1);
    let state = h.machine.current_state().await;
    let AuthenticationState::SignedIn(_, device) = &state.authentication else {
        panic!("expected a signed-in state");
    };
    assert!(matches!(
        device,
        DeviceMetadata::Registered { device_key, device_secret: Some(_), .. }
            if device_key == "device-key-1"
    ));
}

#[tokio::test]
async fn hosted_ui_tokens_complete_a_sign_in_without_srp() {
    let h = harness();
    h.machine.configure().await.unwrap();

    h.identity_pool
        .push_credentials(Ok(common::aws_credentials(NOW + 3600)));

    let outcome = h
        .machine
        .sign_in_with_hosted_ui_tokens(tokens_for("alice", NOW + 3600))
        .await
        .unwrap();
    let SignInOutcome::Done { data } = outcome else {
        panic!("expected a completed sign-in");
    };
    assert_eq!(data.sign_in_method, SignInMethod::HostedUi);
    assert_eq!(data.username, "alice");
    // No SRP round trips happened
    assert_eq!(h.user_pool.initiate_auth_calls(), 0);
}

#[tokio::test]
async fn observers_receive_states_committed_after_subscription() {
    use futures::StreamExt;

    let h = harness();
    h.machine.configure().await.unwrap();

    let mut stream = Box::pin(h.machine.observe());

    h.user_pool
        .push_initiate_auth(Ok(password_verifier_challenge("alice")));
    h.user_pool
        .push_respond(Ok(tokens_response("alice", NOW + 3600, false)));
    h.identity_pool
        .push_credentials(Ok(common::aws_credentials(NOW + 3600)));
    h.machine.sign_in("alice", "hunter2").await.unwrap();

    // Rapid intermediate commits may coalesce into the latest value, but
    // the committed end state always arrives
    let mut saw_signed_in = false;
    while let Ok(Some(state)) =
        tokio::time::timeout(Duration::from_millis(200), stream.next()).await
    {
        if matches!(state.authentication, AuthenticationState::SignedIn(..)) {
            saw_signed_in = true;
            break;
        }
    }
    assert!(saw_signed_in);
}

#[tokio::test]
async fn federation_establishes_an_identity_pool_session() {
    let h = harness();
    h.machine.configure().await.unwrap();

    h.identity_pool
        .push_credentials(Ok(common::aws_credentials(NOW + 3600)));

    let credential = h
        .machine
        .federate_to_identity_pool("accounts.example.com", "provider-token")
        .await
        .unwrap();
    assert_eq!(
        credential.identity_id().map(String::as_str),
        Some("eu-west-1:identity-1")
    );

    let state = h.machine.current_state().await;
    assert!(matches!(
        state.authentication,
        AuthenticationState::FederatedToIdentityPool
    ));
    assert!(matches!(
        state.authorization,
        AuthorizationState::SessionEstablished(_)
    ));
}
