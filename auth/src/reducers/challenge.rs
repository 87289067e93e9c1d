//! Challenge resolution resolver.
//!
//! Holds the server-issued challenge verbatim while the caller produces an
//! answer, verifies answers, and loops `Verifying → WaitingForAnswer` on
//! retryable failures (code mismatch) with the failure recorded for the
//! caller. Non-retryable failures exit to `Error` with the cause preserved.
//!
//! The resolver never interprets challenge parameter contents — rendering
//! an MFA prompt, collecting a new password, or signing a passkey assertion
//! is the caller's concern.

use std::collections::HashMap;

use cognito_auth_core::effect::{Effect, Effects};
use cognito_auth_core::{SmallVec, smallvec};

use crate::client::{AuthFlowResponse, ChallengeResponseRequest};
use crate::data::{AuthChallenge, AuthFlowKind, ChallengeKind, SignInMethod};
use crate::environment::AuthEnvironment;
use crate::error::{AuthError, ServiceError};
use crate::events::{AuthEvent, AuthEventKind, ChallengeEvent, SignInEvent};
use crate::state::SignInChallengeState;

use super::common;

/// Resolve an event against the challenge sub-machine.
pub(crate) fn resolve(
    state: &mut SignInChallengeState,
    event: &AuthEvent,
    env: &AuthEnvironment,
) -> Effects<AuthEvent> {
    use AuthEventKind as K;
    use ChallengeEvent as E;
    use SignInChallengeState as S;

    match state {
        S::WaitingForAnswer { challenge, .. } => match &event.kind {
            K::Challenge(E::VerifyAnswer { answer, metadata }) => {
                let challenge = challenge.clone();
                let effect = verify_answer(challenge.clone(), answer.clone(), metadata.clone(), env);
                *state = S::Verifying { challenge };
                smallvec![effect]
            },
            // The service re-issued or replaced the pending challenge
            K::Challenge(E::WaitForAnswer { challenge: next }) => {
                *state = S::WaitingForAnswer {
                    challenge: next.clone(),
                    last_failure: None,
                };
                SmallVec::new()
            },
            _ => SmallVec::new(),
        },

        S::Verifying { challenge } => match &event.kind {
            K::Challenge(E::Verified { data, device }) => {
                let data = data.clone();
                let device = device.clone();
                *state = S::Verified;
                smallvec![Effect::Future(Box::pin(async move {
                    Some(SignInEvent::Finalized { data, device }.into())
                }))]
            },
            // Another factor follows this one
            K::Challenge(E::WaitForAnswer { challenge: next }) => {
                *state = S::WaitingForAnswer {
                    challenge: next.clone(),
                    last_failure: None,
                };
                SmallVec::new()
            },
            K::Challenge(E::ThrowError { error }) => {
                if is_retryable_answer_failure(error) {
                    tracing::debug!(error = %error, "challenge answer rejected; waiting for retry");
                    let challenge = challenge.clone();
                    *state = S::WaitingForAnswer {
                        challenge,
                        last_failure: Some(error.clone()),
                    };
                    SmallVec::new()
                } else {
                    let lift = common::lift_sign_in_error(error.clone());
                    *state = S::Error(error.clone());
                    smallvec![lift]
                }
            },
            _ => SmallVec::new(),
        },

        // An answer arriving here is out of order: no-op, reported by the
        // dispatcher as an ignored event so callers do not wait forever
        S::Verified | S::Error(_) => SmallVec::new(),
    }
}

/// A wrong code can be answered again in place; anything else ends the
/// attempt.
fn is_retryable_answer_failure(error: &AuthError) -> bool {
    matches!(error, AuthError::Service(ServiceError::CodeMismatch(_)))
}

// ═══════════════════════════════════════════════════════════════════════
// Effects
// ═══════════════════════════════════════════════════════════════════════

/// Submit the caller's answer and classify the server's response.
fn verify_answer(
    challenge: AuthChallenge,
    answer: String,
    metadata: HashMap<String, String>,
    env: &AuthEnvironment,
) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        // Caller metadata is forwarded verbatim; the protocol fields are
        // layered on top of it
        let mut responses = metadata;
        responses.insert("USERNAME".to_owned(), challenge.username.clone());
        responses.insert(answer_field(&challenge.kind).to_owned(), answer);
        if let Some(hash) = env.secret_hash_for(&challenge.username) {
            responses.insert("SECRET_HASH".to_owned(), hash);
        }

        let request = ChallengeResponseRequest {
            kind: challenge.kind.clone(),
            session: challenge.session.clone(),
            responses,
        };

        match env.user_pool.respond_to_auth_challenge(request).await {
            Ok(AuthFlowResponse::Tokens(result)) => {
                let (data, device) = common::establish_session(
                    &env,
                    &challenge.username,
                    SignInMethod::ApiBased(AuthFlowKind::UserSrp),
                    result,
                )
                .await;
                Some(ChallengeEvent::Verified { data, device }.into())
            },
            Ok(AuthFlowResponse::Challenge(next)) => {
                Some(ChallengeEvent::WaitForAnswer { challenge: next }.into())
            },
            Err(err) => Some(
                ChallengeEvent::ThrowError {
                    error: err.into(),
                }
                .into(),
            ),
        }
    }))
}

/// The response field each challenge kind expects its answer in.
fn answer_field(kind: &ChallengeKind) -> &'static str {
    match kind {
        ChallengeKind::SmsMfa => "SMS_MFA_CODE",
        ChallengeKind::SoftwareTokenMfa => "SOFTWARE_TOKEN_MFA_CODE",
        ChallengeKind::EmailOtp => "EMAIL_OTP_CODE",
        ChallengeKind::NewPasswordRequired => "NEW_PASSWORD",
        ChallengeKind::WebAuthn => "CREDENTIAL",
        ChallengeKind::DeviceSrpAuth => "SRP_A",
        ChallengeKind::DevicePasswordVerifier | ChallengeKind::PasswordVerifier => {
            "PASSWORD_CLAIM_SIGNATURE"
        },
        ChallengeKind::CustomChallenge
        | ChallengeKind::SelectMfaType
        | ChallengeKind::Other(_) => "ANSWER",
    }
}
