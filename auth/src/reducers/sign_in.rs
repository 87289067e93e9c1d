//! Sign-in flow resolver.
//!
//! Orchestrates the legs of a sign-in: the SRP handshake, then any chain of
//! server-issued challenges, ending in a finalized session or a preserved
//! error. Only reachable while the authentication machine is `SigningIn`.

use cognito_auth_core::effect::{Effect, Effects};
use cognito_auth_core::{SmallVec, smallvec};

use crate::environment::AuthEnvironment;
use crate::events::{AuthEvent, AuthEventKind, AuthenticationEvent, SignInEvent, SrpEvent};
use crate::state::{SignInChallengeState, SignInState, SrpSignInState};

use super::{challenge, srp_sign_in};

/// Resolve an event against the sign-in sub-machine.
pub(crate) fn resolve(
    state: &mut SignInState,
    event: &AuthEvent,
    env: &AuthEnvironment,
) -> Effects<AuthEvent> {
    use AuthEventKind as K;
    use SignInEvent as E;
    use SignInState as S;

    match state {
        S::NotStarted => match &event.kind {
            K::SignIn(E::InitiateSignInWithSrp { username, password }) => {
                let username = username.clone();
                let password = password.clone();
                *state = S::SigningInWithSrp(SrpSignInState::NotStarted);
                smallvec![Effect::Future(Box::pin(async move {
                    Some(SrpEvent::InitiateSrpAuth { username, password }.into())
                }))]
            },
            // Custom flows can issue a challenge without an SRP leg
            K::SignIn(E::ReceivedChallenge { challenge }) => {
                *state = S::ResolvingChallenge(SignInChallengeState::WaitingForAnswer {
                    challenge: challenge.clone(),
                    last_failure: None,
                });
                SmallVec::new()
            },
            K::SignIn(E::Finalized { data, device }) => finalize(state, data, device),
            K::SignIn(E::ThrowError { error }) => {
                *state = S::Error(error.clone());
                SmallVec::new()
            },
            _ => SmallVec::new(),
        },

        S::SigningInWithSrp(srp_state) => match &event.kind {
            K::SignIn(E::ReceivedChallenge { challenge }) => {
                tracing::debug!(kind = challenge.kind.as_name(), "challenge issued");
                *state = S::ResolvingChallenge(SignInChallengeState::WaitingForAnswer {
                    challenge: challenge.clone(),
                    last_failure: None,
                });
                SmallVec::new()
            },
            K::SignIn(E::Finalized { data, device }) => finalize(state, data, device),
            K::SignIn(E::ThrowError { error }) => {
                *state = S::Error(error.clone());
                SmallVec::new()
            },
            _ => srp_sign_in::resolve(srp_state, event, env),
        },

        S::ResolvingChallenge(challenge_state) => match &event.kind {
            K::SignIn(E::Finalized { data, device }) => finalize(state, data, device),
            K::SignIn(E::ThrowError { error }) => {
                *state = S::Error(error.clone());
                SmallVec::new()
            },
            _ => challenge::resolve(challenge_state, event, env),
        },

        // Terminal within this flow; the top-level machine takes over
        S::SignedIn | S::Error(_) => SmallVec::new(),
    }
}

/// The flow produced a session: mark it and hand the result to the
/// top-level machine.
fn finalize(
    state: &mut SignInState,
    data: &crate::data::SignedInData,
    device: &crate::data::DeviceMetadata,
) -> Effects<AuthEvent> {
    let data = data.clone();
    let device = device.clone();
    *state = SignInState::SignedIn;
    smallvec![Effect::Future(Box::pin(async move {
        Some(AuthenticationEvent::SignInCompleted { data, device }.into())
    }))]
}
