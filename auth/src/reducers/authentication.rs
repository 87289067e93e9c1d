//! Top-level authentication resolver.
//!
//! Owns the lifecycle from `NotConfigured` through hydration, sign-in,
//! sign-out, and federation. The nested sign-in flow is delegated to
//! [`super::sign_in`].

use cognito_auth_core::effect::{Effect, Effects};
use cognito_auth_core::{SmallVec, smallvec};

use crate::data::{AuthCredential, DeviceMetadata, SignInMethod, SignedInData, SignedOutData};
use crate::data::{UserPoolTokens, jwt_claim};
use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use crate::events::{AuthEvent, AuthEventKind, AuthenticationEvent, SignInEvent};
use crate::state::{AuthenticationState, SignInState};
use crate::store as blobs;

use super::sign_in;

/// Resolve an event against the authentication sub-machine.
#[allow(clippy::too_many_lines)] // The transition table is one total match
pub(crate) fn resolve(
    state: &mut AuthenticationState,
    event: &AuthEvent,
    env: &AuthEnvironment,
) -> Effects<AuthEvent> {
    use AuthEventKind as K;
    use AuthenticationEvent as E;
    use AuthenticationState as S;

    match state {
        S::NotConfigured => match &event.kind {
            K::Authentication(E::Configure) => {
                *state = S::Configuring;
                smallvec![hydrate_session(env)]
            },
            _ => SmallVec::new(),
        },

        S::Configuring => match &event.kind {
            K::Authentication(E::InitializedSignedIn { data, device, .. }) => {
                tracing::debug!(username = %data.username, "hydrated signed-in session");
                *state = S::SignedIn(data.clone(), device.clone());
                SmallVec::new()
            },
            K::Authentication(E::InitializedSignedOut { data, .. }) => {
                *state = S::SignedOut(data.clone());
                SmallVec::new()
            },
            K::Authentication(E::ThrowError { error }) => {
                *state = S::Error(error.clone());
                SmallVec::new()
            },
            _ => SmallVec::new(),
        },

        S::SignedOut(_) => match &event.kind {
            K::Authentication(E::SignInRequested { username, password }) => {
                tracing::debug!(username = %username, "starting sign-in");
                let username = username.clone();
                let password = password.clone();
                *state = S::SigningIn(SignInState::NotStarted);
                smallvec![Effect::Future(Box::pin(async move {
                    Some(SignInEvent::InitiateSignInWithSrp { username, password }.into())
                }))]
            },
            K::Authentication(E::HostedUiTokensReceived { tokens }) => {
                let effect = finalize_hosted_ui(tokens.clone(), env);
                *state = S::SigningIn(SignInState::NotStarted);
                smallvec![effect]
            },
            K::Authentication(E::SignOutRequested { .. }) => {
                // Nothing to revoke; only local leftovers get cleared
                *state = S::SigningOut;
                smallvec![sign_out(None, false, env)]
            },
            K::Authentication(E::StartFederation { .. }) => {
                *state = S::FederatingToIdentityPool;
                SmallVec::new()
            },
            _ => SmallVec::new(),
        },

        S::SigningIn(flow) => match &event.kind {
            K::Authentication(E::SignInCompleted { data, device }) => {
                tracing::info!(username = %data.username, "sign-in completed");
                let effect = persist_session(data.clone(), device.clone(), env);
                *state = S::SignedIn(data.clone(), device.clone());
                smallvec![effect]
            },
            K::Authentication(E::CancelSignIn) => {
                *state = S::SignedOut(SignedOutData::default());
                SmallVec::new()
            },
            K::Authentication(E::SignOutRequested { .. }) => {
                // Cancels the attempt; late effect results for the
                // abandoned flow resolve as ignored events
                *state = S::SigningOut;
                smallvec![sign_out(None, false, env)]
            },
            K::Authentication(E::ThrowError { error }) => {
                *state = S::Error(error.clone());
                SmallVec::new()
            },
            _ => sign_in::resolve(flow, event, env),
        },

        S::SignedIn(data, _device) => match &event.kind {
            K::Authentication(E::SignOutRequested { global }) => {
                let effect = sign_out(Some(data.clone()), *global, env);
                *state = S::SigningOut;
                smallvec![effect]
            },
            // A sign-in request while signed in is rejected at the facade;
            // dispatched directly it is ignored and the session preserved
            _ => SmallVec::new(),
        },

        S::SigningOut => match &event.kind {
            K::Authentication(E::SignedOutSuccess { data }) => {
                tracing::info!("signed out");
                *state = S::SignedOut(data.clone());
                SmallVec::new()
            },
            _ => SmallVec::new(),
        },

        S::FederatingToIdentityPool => match &event.kind {
            K::Authorization(crate::events::AuthorizationEvent::Fetched { .. }) => {
                *state = S::FederatedToIdentityPool;
                SmallVec::new()
            },
            K::Authorization(crate::events::AuthorizationEvent::FetchFailed { error }) => {
                *state = S::Error(error.clone());
                SmallVec::new()
            },
            _ => SmallVec::new(),
        },

        S::FederatedToIdentityPool => match &event.kind {
            K::Authentication(E::StartFederation { .. }) => {
                *state = S::FederatingToIdentityPool;
                SmallVec::new()
            },
            K::Authentication(E::SignOutRequested { .. }) => {
                *state = S::SigningOut;
                smallvec![sign_out(None, false, env)]
            },
            _ => SmallVec::new(),
        },

        S::Error(_) => match &event.kind {
            K::Authentication(E::SignOutRequested { .. }) => {
                // Sign-out is the recovery path out of an error state
                *state = S::SigningOut;
                smallvec![sign_out(None, false, env)]
            },
            K::Authentication(E::StartFederation { .. }) => {
                *state = S::FederatingToIdentityPool;
                SmallVec::new()
            },
            _ => SmallVec::new(),
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Effects
// ═══════════════════════════════════════════════════════════════════════

/// Hydrate the machine from the credential store on a cold start.
///
/// A store failure degrades to a signed-out start; it never wedges the
/// machine in `Configuring`.
fn hydrate_session(env: &AuthEnvironment) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        match blobs::load_signed_in_data(env.store.as_ref()).await {
            Ok(Some(data)) => {
                let device = blobs::load_device_metadata(env.store.as_ref(), &data.username).await;
                let credential = blobs::load_credential(env.store.as_ref())
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(AuthCredential::UserPool {
                        tokens: data.tokens.clone(),
                    });
                Some(
                    AuthenticationEvent::InitializedSignedIn {
                        data,
                        device,
                        credential,
                    }
                    .into(),
                )
            },
            Ok(None) => {
                let credential = blobs::load_credential(env.store.as_ref())
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                let last = blobs::load_last_username(env.store.as_ref()).await;
                Some(
                    AuthenticationEvent::InitializedSignedOut {
                        data: SignedOutData {
                            last_signed_in_username: last,
                        },
                        credential,
                    }
                    .into(),
                )
            },
            Err(err) => {
                tracing::warn!(error = %err, "session hydration failed; starting signed out");
                Some(
                    AuthenticationEvent::InitializedSignedOut {
                        data: SignedOutData::default(),
                        credential: AuthCredential::Empty,
                    }
                    .into(),
                )
            },
        }
    }))
}

/// Turn hosted-UI tokens into a completed sign-in.
fn finalize_hosted_ui(tokens: UserPoolTokens, env: &AuthEnvironment) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        let username = jwt_claim(&tokens.id_token, "cognito:username")
            .or_else(|| jwt_claim(&tokens.access_token, "username"))
            .or_else(|| jwt_claim(&tokens.id_token, "sub"));

        let Some(username) = username else {
            return Some(
                SignInEvent::ThrowError {
                    error: AuthError::Validation(
                        "hosted UI tokens carry no identifiable user claim".into(),
                    ),
                }
                .into(),
            );
        };

        let device = blobs::load_device_metadata(env.store.as_ref(), &username).await;
        let data =
            SignedInData::from_tokens(&username, SignInMethod::HostedUi, tokens, env.clock.now());
        Some(AuthenticationEvent::SignInCompleted { data, device }.into())
    }))
}

/// Persist the freshly established session.
fn persist_session(
    data: SignedInData,
    device: DeviceMetadata,
    env: &AuthEnvironment,
) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        if let Err(err) = blobs::persist_signed_in_data(env.store.as_ref(), &data).await {
            tracing::warn!(error = %err, "failed to persist session data");
        }
        if let Err(err) =
            blobs::persist_device_metadata(env.store.as_ref(), &data.username, &device).await
        {
            tracing::warn!(error = %err, "failed to persist device metadata");
        }
        None
    }))
}

/// Best-effort revocation followed by the local sign-out completion event.
///
/// Revocation failures are logged and skipped: a sign-out always completes
/// locally.
fn sign_out(data: Option<SignedInData>, global: bool, env: &AuthEnvironment) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        let last_username = data.as_ref().map(|d| d.username.clone());

        if let Some(data) = &data {
            if global {
                if let Err(err) = env.user_pool.global_sign_out(&data.tokens.access_token).await {
                    tracing::warn!(error = %err, "global sign-out failed; continuing locally");
                }
            }
            if let Some(refresh_token) = &data.tokens.refresh_token {
                if let Err(err) = env.user_pool.revoke_token(refresh_token).await {
                    tracing::warn!(error = %err, "token revocation failed; continuing locally");
                }
            }
        }

        Some(
            AuthenticationEvent::SignedOutSuccess {
                data: SignedOutData {
                    last_signed_in_username: last_username,
                },
            }
            .into(),
        )
    }))
}
