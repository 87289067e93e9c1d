//! SRP handshake resolver.
//!
//! `NotStarted → InitiatingSrpA → RespondingPasswordVerifier → SignedIn`
//! with an `Error` exit at every network-dependent step. The ephemeral key
//! pair generated at initiation is retained in state until the server
//! responds; the password claim is computed offline at the transition into
//! `RespondingPasswordVerifier`, and only then does the network effect go
//! out.

use std::collections::HashMap;

use cognito_auth_core::effect::{Effect, Effects};
use cognito_auth_core::{SmallVec, smallvec};

use crate::client::{AuthFlowResponse, InitiateAuthRequest, SrpAuthRequest};
use crate::client::ChallengeResponseRequest;
use crate::data::{
    AuthChallenge, AuthFlowKind, ChallengeKind, PasswordVerifierParams, SignInMethod,
};
use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use crate::events::{AuthEvent, AuthEventKind, SignInEvent, SrpEvent};
use crate::srp::{self, PasswordClaim, SrpInitiator};
use crate::state::SrpSignInState;
use crate::store as blobs;

use super::common;

/// Resolve an event against the SRP sub-machine.
pub(crate) fn resolve(
    state: &mut SrpSignInState,
    event: &AuthEvent,
    env: &AuthEnvironment,
) -> Effects<AuthEvent> {
    use AuthEventKind as K;
    use SrpEvent as E;
    use SrpSignInState as S;

    match state {
        S::NotStarted => match &event.kind {
            K::Srp(E::InitiateSrpAuth { username, password }) => {
                let initiator = SrpInitiator::generate(env.keys.as_ref());
                let effect = initiate_auth(username.clone(), initiator.public_a_hex(), env);
                *state = S::InitiatingSrpA {
                    username: username.clone(),
                    password: password.clone(),
                    initiator,
                };
                smallvec![effect]
            },
            _ => SmallVec::new(),
        },

        S::InitiatingSrpA {
            username,
            password,
            initiator,
        } => match &event.kind {
            K::Srp(E::RespondPasswordVerifier { params }) => {
                match srp::password_claim(
                    &env.pool_name(),
                    &params.user_id_for_srp,
                    password,
                    initiator,
                    params,
                    env.clock.now(),
                ) {
                    Ok(claim) => {
                        let username = username.clone();
                        let effect =
                            respond_password_verifier(username.clone(), params.clone(), claim, env);
                        *state = S::RespondingPasswordVerifier { username };
                        smallvec![effect]
                    },
                    Err(error) => {
                        tracing::warn!(error = %error, "password claim computation failed");
                        let lift = common::lift_sign_in_error(error.clone());
                        *state = S::Error(error);
                        smallvec![lift]
                    },
                }
            },
            // The pool can issue tokens straight away (no verifier step)
            K::Srp(E::Verified { data, device }) => {
                let effect = finalize(data, device);
                *state = S::SignedIn;
                smallvec![effect]
            },
            K::Srp(E::ThrowAuthError { error }) => {
                let lift = common::lift_sign_in_error(error.clone());
                *state = S::Error(error.clone());
                smallvec![lift]
            },
            _ => SmallVec::new(),
        },

        S::RespondingPasswordVerifier { .. } => match &event.kind {
            K::Srp(E::Verified { data, device }) => {
                let effect = finalize(data, device);
                *state = S::SignedIn;
                smallvec![effect]
            },
            K::Srp(E::ThrowVerifierError { error }) => {
                tracing::warn!(error = %error, "password verifier rejected");
                let lift = common::lift_sign_in_error(error.clone());
                *state = S::Error(error.clone());
                smallvec![lift]
            },
            _ => SmallVec::new(),
        },

        S::SignedIn | S::Error(_) => SmallVec::new(),
    }
}

fn finalize(
    data: &crate::data::SignedInData,
    device: &crate::data::DeviceMetadata,
) -> Effect<AuthEvent> {
    let data = data.clone();
    let device = device.clone();
    Effect::Future(Box::pin(async move {
        Some(SignInEvent::Finalized { data, device }.into())
    }))
}

// ═══════════════════════════════════════════════════════════════════════
// Effects
// ═══════════════════════════════════════════════════════════════════════

/// Send `SRP_A` and classify the server's response.
fn initiate_auth(username: String, srp_a_hex: String, env: &AuthEnvironment) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        let secret_hash = env.secret_hash_for(&username);
        let device_key = blobs::load_device_metadata(env.store.as_ref(), &username)
            .await
            .device_key()
            .cloned();

        let request = InitiateAuthRequest::UserSrp(SrpAuthRequest {
            username: username.clone(),
            srp_a_hex,
            secret_hash,
            device_key,
        });

        match env.user_pool.initiate_auth(request).await {
            Ok(AuthFlowResponse::Challenge(challenge))
                if challenge.kind == ChallengeKind::PasswordVerifier =>
            {
                match verifier_params_from(&challenge) {
                    Ok(params) => Some(SrpEvent::RespondPasswordVerifier { params }.into()),
                    Err(error) => Some(SrpEvent::ThrowAuthError { error }.into()),
                }
            },
            Ok(AuthFlowResponse::Challenge(challenge)) => {
                Some(SignInEvent::ReceivedChallenge { challenge }.into())
            },
            Ok(AuthFlowResponse::Tokens(result)) => {
                let (data, device) = common::establish_session(
                    &env,
                    &username,
                    SignInMethod::ApiBased(AuthFlowKind::UserSrp),
                    result,
                )
                .await;
                Some(SrpEvent::Verified { data, device }.into())
            },
            Err(err) => Some(
                SrpEvent::ThrowAuthError {
                    error: err.into(),
                }
                .into(),
            ),
        }
    }))
}

/// Submit the password claim and classify the server's response.
fn respond_password_verifier(
    username: String,
    params: PasswordVerifierParams,
    claim: PasswordClaim,
    env: &AuthEnvironment,
) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        let mut responses = HashMap::new();
        responses.insert("USERNAME".to_owned(), params.user_id_for_srp.clone());
        responses.insert(
            "PASSWORD_CLAIM_SECRET_BLOCK".to_owned(),
            claim.secret_block,
        );
        responses.insert("PASSWORD_CLAIM_SIGNATURE".to_owned(), claim.signature);
        responses.insert("TIMESTAMP".to_owned(), claim.timestamp);
        if let Some(hash) = env.secret_hash_for(&params.user_id_for_srp) {
            responses.insert("SECRET_HASH".to_owned(), hash);
        }
        if let Some(device_key) = blobs::load_device_metadata(env.store.as_ref(), &username)
            .await
            .device_key()
        {
            responses.insert("DEVICE_KEY".to_owned(), device_key.clone());
        }

        let request = ChallengeResponseRequest {
            kind: ChallengeKind::PasswordVerifier,
            session: params.session.clone(),
            responses,
        };

        match env.user_pool.respond_to_auth_challenge(request).await {
            Ok(AuthFlowResponse::Tokens(result)) => {
                let (data, device) = common::establish_session(
                    &env,
                    &username,
                    SignInMethod::ApiBased(AuthFlowKind::UserSrp),
                    result,
                )
                .await;
                Some(SrpEvent::Verified { data, device }.into())
            },
            Ok(AuthFlowResponse::Challenge(challenge)) => {
                Some(SignInEvent::ReceivedChallenge { challenge }.into())
            },
            Err(err) => Some(
                SrpEvent::ThrowVerifierError {
                    error: err.into(),
                }
                .into(),
            ),
        }
    }))
}

/// Extract the SRP exchange parameters from a `PASSWORD_VERIFIER`
/// challenge.
fn verifier_params_from(challenge: &AuthChallenge) -> Result<PasswordVerifierParams, AuthError> {
    let parameter = |name: &str| -> Result<String, AuthError> {
        challenge
            .parameters
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::Srp(format!("challenge is missing parameter {name}")))
    };

    Ok(PasswordVerifierParams {
        user_id_for_srp: parameter("USER_ID_FOR_SRP")?,
        salt_hex: parameter("SALT")?,
        srp_b_hex: parameter("SRP_B")?,
        secret_block: parameter("SECRET_BLOCK")?,
        session: challenge.session.clone(),
    })
}
