//! Pure transition resolvers.
//!
//! One resolver per sub-machine: authentication, sign-in, SRP, challenge,
//! and authorization. Each is a pure function
//! `(state, event, environment) → effects` that mutates its sub-state in
//! place and returns effect descriptions; the runtime executes them and
//! feeds their results back as new events.
//!
//! The top-level [`AuthReducer`] routes every event to both top-level
//! sub-machines, so a single committed transition can update the composite
//! pairing atomically (which is what keeps the `SignedIn` /
//! `SessionEstablished` invariant intact).

pub mod authentication;
pub mod authorization;
pub mod challenge;
mod common;
pub mod sign_in;
pub mod srp_sign_in;

use cognito_auth_core::effect::Effects;
use cognito_auth_core::reducer::Reducer;

use crate::environment::AuthEnvironment;
use crate::events::AuthEvent;
use crate::state::AuthState;

/// The composite reducer driving the whole machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthReducer;

impl AuthReducer {
    /// Create the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for AuthReducer {
    type State = AuthState;
    type Event = AuthEvent;
    type Environment = AuthEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        event: Self::Event,
        env: &Self::Environment,
    ) -> Effects<Self::Event> {
        tracing::trace!(event = ?event.kind, event_id = %event.id, "resolving event");

        let mut effects = authentication::resolve(&mut state.authentication, &event, env);
        effects.extend(authorization::resolve(&mut state.authorization, &event, env));

        debug_assert!(
            state.is_consistent(),
            "transition produced an undeclared composite pairing: {state:?}"
        );

        effects
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can unwrap and panic
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::data::{
        AuthChallenge, AuthCredential, AuthFlowKind, AwsCredentials, ChallengeKind,
        DeviceMetadata, SignInMethod, SignedInData, SignedOutData, UserPoolTokens,
    };
    use crate::error::{AuthError, ServiceError};
    use crate::events::{
        AuthenticationEvent, AuthorizationEvent, ChallengeEvent, SignInEvent, SrpEvent,
    };
    use crate::mocks::{
        FixedClock, FixedKeySource, InMemoryCredentialStore, MockIdentityPoolClient,
        MockUserPoolClient,
    };
    use crate::state::{
        AuthenticationState, AuthorizationState, SessionError, SignInChallengeState, SignInState,
    };
    use cognito_auth_core::reducer::Reducer;
    use cognito_auth_testing::ReducerTest;
    use cognito_auth_testing::assertions::{assert_has_future_effect, assert_no_effects};
    use std::collections::HashMap;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000;

    fn test_env() -> AuthEnvironment {
        AuthEnvironment::new(
            Arc::new(MockUserPoolClient::new()),
            Some(Arc::new(MockIdentityPoolClient::new("identity-1"))),
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(FixedClock::at_epoch(NOW)),
            Arc::new(FixedKeySource::default()),
            AuthConfig::new("eu-west-1_TestPool", "client-id", "eu-west-1"),
        )
    }

    fn tokens(expires_at: i64) -> UserPoolTokens {
        UserPoolTokens {
            id_token: "id".into(),
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at,
        }
    }

    fn signed_in_data() -> SignedInData {
        SignedInData {
            user_id: "user-1".into(),
            username: "alice".into(),
            signed_in_at: chrono::DateTime::from_timestamp(NOW, 0).unwrap(),
            sign_in_method: SignInMethod::ApiBased(AuthFlowKind::UserSrp),
            tokens: tokens(NOW + 3600),
        }
    }

    fn expired_credential() -> AuthCredential {
        AuthCredential::UserAndIdentityPool {
            tokens: tokens(NOW - 10),
            identity_id: "identity-1".into(),
            credentials: AwsCredentials {
                access_key_id: "AKIA".into(),
                secret_access_key: "secret".into(),
                session_token: Some("session".into()),
                expiration: Some(NOW - 10),
            },
        }
    }

    fn challenge(kind: ChallengeKind) -> AuthChallenge {
        AuthChallenge {
            kind,
            username: "alice".into(),
            session: Some("session-1".into()),
            parameters: HashMap::new(),
        }
    }

    #[test]
    fn configure_starts_hydration() {
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState::default())
            .when_event(AuthenticationEvent::Configure.into())
            .then_state(|state| {
                assert_eq!(state.authentication, AuthenticationState::Configuring);
                assert_eq!(state.authorization, AuthorizationState::Configuring);
            })
            .then_effects(|effects| assert_has_future_effect(effects))
            .run();
    }

    #[test]
    fn hydration_result_settles_both_sub_machines_in_one_transition() {
        let credential = AuthCredential::UserPool {
            tokens: tokens(NOW + 3600),
        };
        let expected = credential.clone();
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState {
                authentication: AuthenticationState::Configuring,
                authorization: AuthorizationState::Configuring,
            })
            .when_event(
                AuthenticationEvent::InitializedSignedIn {
                    data: signed_in_data(),
                    device: DeviceMetadata::Empty,
                    credential,
                }
                .into(),
            )
            .then_state(move |state| {
                assert!(matches!(
                    state.authentication,
                    AuthenticationState::SignedIn(..)
                ));
                assert_eq!(
                    state.authorization,
                    AuthorizationState::SessionEstablished(expected.clone())
                );
                assert!(state.is_consistent());
            })
            .run();
    }

    #[test]
    fn refresh_while_refreshing_coalesces_to_a_no_op() {
        let existing = expired_credential();
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState {
                authentication: AuthenticationState::SignedOut(SignedOutData::default()),
                authorization: AuthorizationState::RefreshingSession(existing.clone()),
            })
            .when_event(AuthorizationEvent::RefreshSession.into())
            .then_state(move |state| {
                assert_eq!(
                    state.authorization,
                    AuthorizationState::RefreshingSession(existing.clone())
                );
            })
            .then_effects(|effects| assert_no_effects(effects))
            .run();
    }

    #[test]
    fn refresh_of_a_still_valid_credential_is_ignored() {
        let credential = AuthCredential::UserPool {
            tokens: tokens(NOW + 3600),
        };
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState {
                authentication: AuthenticationState::SignedOut(SignedOutData::default()),
                authorization: AuthorizationState::SessionEstablished(credential.clone()),
            })
            .when_event(AuthorizationEvent::RefreshSession.into())
            .then_state(move |state| {
                assert_eq!(
                    state.authorization,
                    AuthorizationState::SessionEstablished(credential.clone())
                );
            })
            .then_effects(|effects| assert_no_effects(effects))
            .run();
    }

    #[test]
    fn expired_credential_refresh_enters_refreshing_with_a_network_effect() {
        let existing = expired_credential();
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState {
                authentication: AuthenticationState::SignedOut(SignedOutData::default()),
                authorization: AuthorizationState::SessionEstablished(existing.clone()),
            })
            .when_event(AuthorizationEvent::RefreshSession.into())
            .then_state(move |state| {
                assert_eq!(
                    state.authorization,
                    AuthorizationState::RefreshingSession(existing.clone())
                );
            })
            .then_effects(|effects| assert_has_future_effect(effects))
            .run();
    }

    #[test]
    fn refresh_failure_preserves_the_previous_credential() {
        let existing = expired_credential();
        let error = AuthError::Service(ServiceError::Network("connection reset".into()));
        let expected = SessionError {
            source: error.clone(),
            credential: existing.clone(),
        };
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState {
                authentication: AuthenticationState::SignedIn(
                    signed_in_data(),
                    DeviceMetadata::Empty,
                ),
                authorization: AuthorizationState::RefreshingSession(existing),
            })
            .when_event(AuthorizationEvent::RefreshFailed { error }.into())
            .then_state(move |state| {
                // The session data survives a failed refresh untouched
                assert!(state.signed_in_data().is_some());
                assert_eq!(state.authorization, AuthorizationState::Error(expected.clone()));
            })
            .run();
    }

    #[test]
    fn out_of_order_challenge_answer_is_a_no_op() {
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState {
                authentication: AuthenticationState::SignedOut(SignedOutData::default()),
                authorization: AuthorizationState::SessionEstablished(AuthCredential::Empty),
            })
            .when_event(
                ChallengeEvent::VerifyAnswer {
                    answer: "123456".into(),
                    metadata: HashMap::new(),
                }
                .into(),
            )
            .then_state(|state| {
                assert!(matches!(
                    state.authentication,
                    AuthenticationState::SignedOut(_)
                ));
            })
            .then_effects(|effects| assert_no_effects(effects))
            .run();
    }

    #[test]
    fn sign_in_request_while_signed_in_preserves_the_session() {
        let before = AuthState {
            authentication: AuthenticationState::SignedIn(signed_in_data(), DeviceMetadata::Empty),
            authorization: AuthorizationState::SessionEstablished(AuthCredential::UserPool {
                tokens: tokens(NOW + 3600),
            }),
        };
        let expected = before.clone();
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(before)
            .when_event(
                AuthenticationEvent::SignInRequested {
                    username: "bob".into(),
                    password: "pw".into(),
                }
                .into(),
            )
            .then_state(move |state| {
                assert_eq!(state.authentication, expected.authentication);
            })
            .run();
    }

    #[test]
    fn code_mismatch_loops_back_to_waiting_with_the_failure_recorded() {
        let pending = challenge(ChallengeKind::SmsMfa);
        let error = AuthError::Service(ServiceError::CodeMismatch("wrong code".into()));
        let expected_challenge = pending.clone();
        let expected_error = error.clone();
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState {
                authentication: AuthenticationState::SigningIn(SignInState::ResolvingChallenge(
                    SignInChallengeState::Verifying { challenge: pending },
                )),
                authorization: AuthorizationState::SigningIn,
            })
            .when_event(ChallengeEvent::ThrowError { error }.into())
            .then_state(move |state| {
                let AuthenticationState::SigningIn(SignInState::ResolvingChallenge(
                    SignInChallengeState::WaitingForAnswer {
                        challenge,
                        last_failure,
                    },
                )) = &state.authentication
                else {
                    panic!("expected a re-issued challenge, got {state:?}");
                };
                assert_eq!(challenge, &expected_challenge);
                assert_eq!(last_failure.as_ref(), Some(&expected_error));
            })
            .run();
    }

    #[test]
    fn not_authorized_during_verification_exits_to_error() {
        let pending = challenge(ChallengeKind::SmsMfa);
        let error = AuthError::Service(ServiceError::NotAuthorized("denied".into()));
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState {
                authentication: AuthenticationState::SigningIn(SignInState::ResolvingChallenge(
                    SignInChallengeState::Verifying { challenge: pending },
                )),
                authorization: AuthorizationState::SigningIn,
            })
            .when_event(ChallengeEvent::ThrowError { error: error.clone() }.into())
            .then_state(move |state| {
                assert!(matches!(
                    &state.authentication,
                    AuthenticationState::SigningIn(SignInState::ResolvingChallenge(
                        SignInChallengeState::Error(e)
                    )) if e == &error
                ));
            })
            // The failure is lifted to the sign-in flow as a follow-up event
            .then_effects(|effects| assert_has_future_effect(effects))
            .run();
    }

    #[test]
    fn srp_initiation_retains_the_ephemeral_pair_in_state() {
        let env = test_env();
        let mut state = AuthState {
            authentication: AuthenticationState::SigningIn(SignInState::SigningInWithSrp(
                crate::state::SrpSignInState::NotStarted,
            )),
            authorization: AuthorizationState::SigningIn,
        };
        let effects = AuthReducer::new().reduce(
            &mut state,
            SrpEvent::InitiateSrpAuth {
                username: "alice".into(),
                password: "hunter2".into(),
            }
            .into(),
            &env,
        );

        assert_has_future_effect(&effects);
        let AuthenticationState::SigningIn(SignInState::SigningInWithSrp(
            crate::state::SrpSignInState::InitiatingSrpA {
                username,
                initiator,
                ..
            },
        )) = &state.authentication
        else {
            panic!("expected the handshake to be initiating, got {state:?}");
        };
        assert_eq!(username, "alice");
        assert!(!initiator.public_a_hex().is_empty());
    }

    #[test]
    fn malformed_verifier_parameters_resolve_to_error_without_a_network_call() {
        let env = test_env();
        let keys = FixedKeySource::default();
        let initiator = crate::srp::SrpInitiator::generate(&keys);
        let mut state = AuthState {
            authentication: AuthenticationState::SigningIn(SignInState::SigningInWithSrp(
                crate::state::SrpSignInState::InitiatingSrpA {
                    username: "alice".into(),
                    password: "hunter2".into(),
                    initiator,
                },
            )),
            authorization: AuthorizationState::SigningIn,
        };

        let effects = AuthReducer::new().reduce(
            &mut state,
            SrpEvent::RespondPasswordVerifier {
                params: crate::data::PasswordVerifierParams {
                    user_id_for_srp: "alice".into(),
                    salt_hex: "not hex at all".into(),
                    srp_b_hex: "also not hex".into(),
                    secret_block: "block".into(),
                    session: None,
                },
            }
            .into(),
            &env,
        );

        assert!(matches!(
            &state.authentication,
            AuthenticationState::SigningIn(SignInState::SigningInWithSrp(
                crate::state::SrpSignInState::Error(AuthError::Srp(_))
            ))
        ));
        // Only the lift to the sign-in flow; no network effect
        assert_has_future_effect(&effects);
    }

    #[test]
    fn sign_out_mid_sign_in_cancels_the_flow() {
        ReducerTest::new(AuthReducer::new())
            .with_env(test_env())
            .given_state(AuthState {
                authentication: AuthenticationState::SigningIn(SignInState::ResolvingChallenge(
                    SignInChallengeState::WaitingForAnswer {
                        challenge: challenge(ChallengeKind::SmsMfa),
                        last_failure: None,
                    },
                )),
                authorization: AuthorizationState::SigningIn,
            })
            .when_event(AuthenticationEvent::SignOutRequested { global: false }.into())
            .then_state(|state| {
                assert_eq!(state.authentication, AuthenticationState::SigningOut);
            })
            .then_effects(|effects| assert_has_future_effect(effects))
            .run();
    }

    // ═══════════════════════════════════════════════════════════════════
    // Transition-table property: arbitrary event sequences never produce
    // an undeclared composite pairing and never panic
    // ═══════════════════════════════════════════════════════════════════

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arbitrary_event() -> impl Strategy<Value = AuthEvent> {
            prop_oneof![
                Just(AuthenticationEvent::Configure.into()),
                Just(
                    AuthenticationEvent::InitializedSignedOut {
                        data: SignedOutData::default(),
                        credential: AuthCredential::Empty,
                    }
                    .into()
                ),
                Just(
                    AuthenticationEvent::InitializedSignedIn {
                        data: signed_in_data(),
                        device: DeviceMetadata::Empty,
                        credential: AuthCredential::UserPool {
                            tokens: tokens(NOW + 3600),
                        },
                    }
                    .into()
                ),
                Just(
                    AuthenticationEvent::SignInRequested {
                        username: "alice".into(),
                        password: "hunter2".into(),
                    }
                    .into()
                ),
                Just(
                    AuthenticationEvent::SignInCompleted {
                        data: signed_in_data(),
                        device: DeviceMetadata::Empty,
                    }
                    .into()
                ),
                Just(AuthenticationEvent::CancelSignIn.into()),
                Just(AuthenticationEvent::SignOutRequested { global: false }.into()),
                Just(
                    AuthenticationEvent::SignedOutSuccess {
                        data: SignedOutData::default(),
                    }
                    .into()
                ),
                Just(
                    AuthenticationEvent::StartFederation {
                        provider: "provider".into(),
                        token: "token".into(),
                    }
                    .into()
                ),
                Just(
                    SignInEvent::InitiateSignInWithSrp {
                        username: "alice".into(),
                        password: "hunter2".into(),
                    }
                    .into()
                ),
                Just(
                    SignInEvent::ReceivedChallenge {
                        challenge: challenge(ChallengeKind::SmsMfa),
                    }
                    .into()
                ),
                Just(
                    SignInEvent::ThrowError {
                        error: AuthError::Service(ServiceError::NotAuthorized("no".into())),
                    }
                    .into()
                ),
                Just(
                    SrpEvent::InitiateSrpAuth {
                        username: "alice".into(),
                        password: "hunter2".into(),
                    }
                    .into()
                ),
                Just(
                    ChallengeEvent::VerifyAnswer {
                        answer: "123456".into(),
                        metadata: HashMap::new(),
                    }
                    .into()
                ),
                Just(
                    ChallengeEvent::ThrowError {
                        error: AuthError::Service(ServiceError::CodeMismatch("bad".into())),
                    }
                    .into()
                ),
                Just(AuthorizationEvent::FetchUnauthSession.into()),
                Just(
                    AuthorizationEvent::Fetched {
                        identity_id: Some("identity-1".into()),
                        credentials: Some(AwsCredentials {
                            access_key_id: "AKIA".into(),
                            secret_access_key: "secret".into(),
                            session_token: Some("session".into()),
                            expiration: Some(NOW + 3600),
                        }),
                    }
                    .into()
                ),
                Just(
                    AuthorizationEvent::FetchFailed {
                        error: AuthError::Service(ServiceError::Network("down".into())),
                    }
                    .into()
                ),
                Just(AuthorizationEvent::RefreshSession.into()),
                Just(
                    AuthorizationEvent::RefreshFailed {
                        error: AuthError::Service(ServiceError::Network("down".into())),
                    }
                    .into()
                ),
            ]
        }

        proptest! {
            #[test]
            fn composite_invariant_holds_under_any_event_order(
                events in proptest::collection::vec(arbitrary_event(), 0..40)
            ) {
                let env = test_env();
                let reducer = AuthReducer::new();
                let mut state = AuthState::default();

                for event in events {
                    let _effects = reducer.reduce(&mut state, event, &env);
                    prop_assert!(
                        state.is_consistent(),
                        "undeclared pairing reached: {:?}",
                        state
                    );
                }
            }
        }
    }
}
