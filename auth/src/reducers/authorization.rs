//! Authorization / session resolver.
//!
//! Owns the credential side of the machine: establishing a session after
//! sign-in, guest (unauthenticated) sessions, federation fetches, and
//! refresh with coalescing. A refresh already in flight short-circuits any
//! further refresh request back to the same state with no effect — the
//! dispatcher reports that event as ignored, which is the coalesce signal
//! callers rely on.

use std::collections::HashMap;

use cognito_auth_core::effect::{Effect, Effects};
use cognito_auth_core::{SmallVec, smallvec};

use crate::client::{AuthFlowResponse, InitiateAuthRequest, RefreshTokenRequest};
use crate::data::{AuthCredential, AwsCredentials, jwt_claim};
use crate::environment::AuthEnvironment;
use crate::error::{AuthError, ServiceError};
use crate::events::{AuthEvent, AuthEventKind, AuthenticationEvent, AuthorizationEvent};
use crate::state::{AuthorizationState, SessionError, SessionFetchContext};
use crate::store as blobs;

/// Resolve an event against the authorization sub-machine.
#[allow(clippy::too_many_lines)] // The transition table is one total match
pub(crate) fn resolve(
    state: &mut AuthorizationState,
    event: &AuthEvent,
    env: &AuthEnvironment,
) -> Effects<AuthEvent> {
    use AuthEventKind as K;
    use AuthenticationEvent as AE;
    use AuthorizationEvent as E;
    use AuthorizationState as S;

    match state {
        S::NotConfigured => match &event.kind {
            // Hydration is driven by the authentication side; both
            // sub-machines leave their configuration states on the same
            // committed events
            K::Authentication(AE::Configure) => {
                *state = S::Configuring;
                SmallVec::new()
            },
            _ => SmallVec::new(),
        },

        S::Configuring => match &event.kind {
            K::Authentication(
                AE::InitializedSignedIn { credential, .. }
                | AE::InitializedSignedOut { credential, .. },
            ) => {
                *state = S::SessionEstablished(credential.clone());
                SmallVec::new()
            },
            _ => SmallVec::new(),
        },

        S::SessionEstablished(credential) => match &event.kind {
            K::Authentication(AE::SignInRequested { .. } | AE::HostedUiTokensReceived { .. }) => {
                *state = S::SigningIn;
                SmallVec::new()
            },
            K::Authentication(AE::SignedOutSuccess { data }) => {
                let effect = clear_store(data.last_signed_in_username.clone(), env);
                *state = S::SessionEstablished(AuthCredential::Empty);
                smallvec![effect]
            },
            K::Authorization(E::RefreshSession) => {
                let now = env.clock.epoch_seconds();
                let margin = env.config.expiry_margin_secs;
                // A refresh request against a still-valid credential is a
                // no-op: a caller racing an already-completed refresh must
                // not trigger a second one
                if credential.is_empty() || credential.is_valid(now, margin) {
                    SmallVec::new()
                } else {
                    let existing = credential.clone();
                    let effect = refresh_session(existing.clone(), env);
                    *state = S::RefreshingSession(existing);
                    smallvec![effect]
                }
            },
            K::Authorization(E::FetchUnauthSession) => {
                if credential.is_empty() {
                    let effect = fetch_session(SessionFetchContext::Unauthenticated, env);
                    *state = S::FetchingAuthSession(SessionFetchContext::Unauthenticated);
                    smallvec![effect]
                } else {
                    SmallVec::new()
                }
            },
            K::Authentication(AE::StartFederation { provider, token }) => {
                let context = SessionFetchContext::Federated {
                    provider: provider.clone(),
                    token: token.clone(),
                };
                let effect = fetch_session(context.clone(), env);
                *state = S::FetchingAuthSession(context);
                smallvec![effect]
            },
            _ => SmallVec::new(),
        },

        S::SigningIn => match &event.kind {
            K::Authentication(AE::SignInCompleted { data, .. }) => {
                let context = SessionFetchContext::UserPool(data.clone());
                let effect = fetch_session(context.clone(), env);
                *state = S::FetchingAuthSession(context);
                smallvec![effect]
            },
            K::Authentication(AE::CancelSignIn) => {
                *state = S::SessionEstablished(AuthCredential::Empty);
                SmallVec::new()
            },
            K::Authentication(AE::SignedOutSuccess { data }) => {
                let effect = clear_store(data.last_signed_in_username.clone(), env);
                *state = S::SessionEstablished(AuthCredential::Empty);
                smallvec![effect]
            },
            _ => SmallVec::new(),
        },

        S::FetchingAuthSession(context) => match &event.kind {
            K::Authorization(E::Fetched {
                identity_id,
                credentials,
            }) => {
                let credential = build_credential(context, identity_id, credentials);
                let effect = persist_credential(credential.clone(), env);
                *state = S::SessionEstablished(credential);
                smallvec![effect]
            },
            K::Authorization(E::FetchFailed { error }) => match context {
                // Identity fetch failure must not lose a fresh user pool
                // session: degrade to tokens-only
                SessionFetchContext::UserPool(data) => {
                    tracing::warn!(
                        error = %error,
                        "identity fetch failed; continuing with user pool tokens only"
                    );
                    let credential = AuthCredential::UserPool {
                        tokens: data.tokens.clone(),
                    };
                    let effect = persist_credential(credential.clone(), env);
                    *state = S::SessionEstablished(credential);
                    smallvec![effect]
                },
                SessionFetchContext::Unauthenticated | SessionFetchContext::Federated { .. } => {
                    *state = S::Error(SessionError {
                        source: error.clone(),
                        credential: AuthCredential::Empty,
                    });
                    SmallVec::new()
                },
            },
            K::Authentication(AE::SignedOutSuccess { data }) => {
                let effect = clear_store(data.last_signed_in_username.clone(), env);
                *state = S::SessionEstablished(AuthCredential::Empty);
                smallvec![effect]
            },
            _ => SmallVec::new(),
        },

        S::RefreshingSession(existing) => match &event.kind {
            // Coalesce: exactly one refresh is in flight; further refresh
            // requests resolve to the same state with no second call
            K::Authorization(E::RefreshSession) => {
                tracing::debug!("refresh already in flight; coalescing");
                SmallVec::new()
            },
            K::Authorization(E::Refreshed { credential }) => {
                let credential = credential.clone();
                let effect = persist_credential(credential.clone(), env);
                *state = S::SessionEstablished(credential);
                smallvec![effect]
            },
            K::Authorization(E::RefreshFailed { error }) => {
                tracing::warn!(error = %error, "session refresh failed");
                let credential = existing.clone();
                *state = S::Error(SessionError {
                    source: error.clone(),
                    credential,
                });
                SmallVec::new()
            },
            K::Authentication(AE::SignedOutSuccess { data }) => {
                let effect = clear_store(data.last_signed_in_username.clone(), env);
                *state = S::SessionEstablished(AuthCredential::Empty);
                smallvec![effect]
            },
            _ => SmallVec::new(),
        },

        S::Error(session_error) => match &event.kind {
            K::Authorization(E::RefreshSession) => {
                if session_error.credential.is_empty() {
                    SmallVec::new()
                } else {
                    let existing = session_error.credential.clone();
                    let effect = refresh_session(existing.clone(), env);
                    *state = S::RefreshingSession(existing);
                    smallvec![effect]
                }
            },
            K::Authorization(E::FetchUnauthSession) => {
                let effect = fetch_session(SessionFetchContext::Unauthenticated, env);
                *state = S::FetchingAuthSession(SessionFetchContext::Unauthenticated);
                smallvec![effect]
            },
            K::Authentication(AE::SignInRequested { .. } | AE::HostedUiTokensReceived { .. }) => {
                *state = S::SigningIn;
                SmallVec::new()
            },
            K::Authentication(AE::StartFederation { provider, token }) => {
                let context = SessionFetchContext::Federated {
                    provider: provider.clone(),
                    token: token.clone(),
                };
                let effect = fetch_session(context.clone(), env);
                *state = S::FetchingAuthSession(context);
                smallvec![effect]
            },
            K::Authentication(AE::SignedOutSuccess { data }) => {
                let effect = clear_store(data.last_signed_in_username.clone(), env);
                *state = S::SessionEstablished(AuthCredential::Empty);
                smallvec![effect]
            },
            _ => SmallVec::new(),
        },
    }
}

/// Combine the fetch context with the identity output into a credential.
fn build_credential(
    context: &SessionFetchContext,
    identity_id: &Option<String>,
    credentials: &Option<AwsCredentials>,
) -> AuthCredential {
    match (context, identity_id, credentials) {
        (SessionFetchContext::UserPool(data), Some(identity_id), Some(credentials)) => {
            AuthCredential::UserAndIdentityPool {
                tokens: data.tokens.clone(),
                identity_id: identity_id.clone(),
                credentials: credentials.clone(),
            }
        },
        (SessionFetchContext::UserPool(data), _, _) => AuthCredential::UserPool {
            tokens: data.tokens.clone(),
        },
        (
            SessionFetchContext::Unauthenticated | SessionFetchContext::Federated { .. },
            Some(identity_id),
            Some(credentials),
        ) => AuthCredential::IdentityPool {
            identity_id: identity_id.clone(),
            credentials: credentials.clone(),
        },
        (SessionFetchContext::Unauthenticated | SessionFetchContext::Federated { .. }, _, _) => {
            AuthCredential::Empty
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Effects
// ═══════════════════════════════════════════════════════════════════════

/// Resolve an identity ID and AWS credentials for the given context.
fn fetch_session(context: SessionFetchContext, env: &AuthEnvironment) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        let Some(identity_pool) = env.identity_pool.clone() else {
            // A user pool session is complete without an identity pool;
            // guest and federated sessions are not
            return match &context {
                SessionFetchContext::UserPool(_) => Some(
                    AuthorizationEvent::Fetched {
                        identity_id: None,
                        credentials: None,
                    }
                    .into(),
                ),
                SessionFetchContext::Unauthenticated
                | SessionFetchContext::Federated { .. } => Some(
                    AuthorizationEvent::FetchFailed {
                        error: AuthError::Configuration(
                            "no identity pool configured".into(),
                        ),
                    }
                    .into(),
                ),
            };
        };

        let logins: HashMap<String, String> = match &context {
            SessionFetchContext::UserPool(data) => {
                HashMap::from([(env.config.provider_name(), data.tokens.id_token.clone())])
            },
            SessionFetchContext::Unauthenticated => HashMap::new(),
            SessionFetchContext::Federated { provider, token } => {
                HashMap::from([(provider.clone(), token.clone())])
            },
        };

        let attempt = async {
            let identity_id = identity_pool.get_id(logins.clone()).await?;
            let credentials = identity_pool
                .get_credentials_for_identity(&identity_id, logins)
                .await?;
            Ok::<_, ServiceError>((identity_id, credentials))
        }
        .await;

        match attempt {
            Ok((identity_id, credentials)) => Some(
                AuthorizationEvent::Fetched {
                    identity_id: Some(identity_id),
                    credentials: Some(credentials),
                }
                .into(),
            ),
            Err(err) => Some(
                AuthorizationEvent::FetchFailed {
                    error: err.into(),
                }
                .into(),
            ),
        }
    }))
}

/// Refresh the credential material backing the session.
fn refresh_session(existing: AuthCredential, env: &AuthEnvironment) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        let identity_id = existing.identity_id().cloned();

        let Some(tokens) = existing.user_pool_tokens().cloned() else {
            // Identity-pool-only sessions refresh straight against the
            // identity pool
            let Some(identity_id) = identity_id else {
                return Some(
                    AuthorizationEvent::RefreshFailed {
                        error: AuthError::InvalidState("nothing to refresh".into()),
                    }
                    .into(),
                );
            };
            let Some(identity_pool) = env.identity_pool.clone() else {
                return Some(
                    AuthorizationEvent::RefreshFailed {
                        error: AuthError::Configuration("no identity pool configured".into()),
                    }
                    .into(),
                );
            };
            return match identity_pool
                .get_credentials_for_identity(&identity_id, HashMap::new())
                .await
            {
                Ok(credentials) => Some(
                    AuthorizationEvent::Refreshed {
                        credential: AuthCredential::IdentityPool {
                            identity_id,
                            credentials,
                        },
                    }
                    .into(),
                ),
                Err(err) => Some(
                    AuthorizationEvent::RefreshFailed {
                        error: err.into(),
                    }
                    .into(),
                ),
            };
        };

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            return Some(
                AuthorizationEvent::RefreshFailed {
                    error: AuthError::InvalidState(
                        "session has no refresh token".into(),
                    ),
                }
                .into(),
            );
        };

        let username = jwt_claim(&tokens.access_token, "username")
            .or_else(|| jwt_claim(&tokens.id_token, "cognito:username"));
        let secret_hash = username
            .as_deref()
            .and_then(|username| env.secret_hash_for(username));
        let device_key = match &username {
            Some(username) => blobs::load_device_metadata(env.store.as_ref(), username)
                .await
                .device_key()
                .cloned(),
            None => None,
        };

        let request = InitiateAuthRequest::RefreshToken(RefreshTokenRequest {
            refresh_token: refresh_token.clone(),
            secret_hash,
            device_key,
        });

        match env.user_pool.initiate_auth(request).await {
            Ok(AuthFlowResponse::Tokens(result)) => {
                let mut new_tokens = result.tokens;
                // A refresh response does not re-issue the refresh token
                if new_tokens.refresh_token.is_none() {
                    new_tokens.refresh_token = Some(refresh_token);
                }

                match (identity_id, env.identity_pool.clone()) {
                    (Some(identity_id), Some(identity_pool)) => {
                        let logins = HashMap::from([(
                            env.config.provider_name(),
                            new_tokens.id_token.clone(),
                        )]);
                        match identity_pool
                            .get_credentials_for_identity(&identity_id, logins)
                            .await
                        {
                            Ok(credentials) => Some(
                                AuthorizationEvent::Refreshed {
                                    credential: AuthCredential::UserAndIdentityPool {
                                        tokens: new_tokens,
                                        identity_id,
                                        credentials,
                                    },
                                }
                                .into(),
                            ),
                            Err(err) => Some(
                                AuthorizationEvent::RefreshFailed {
                                    error: err.into(),
                                }
                                .into(),
                            ),
                        }
                    },
                    _ => Some(
                        AuthorizationEvent::Refreshed {
                            credential: AuthCredential::UserPool { tokens: new_tokens },
                        }
                        .into(),
                    ),
                }
            },
            Ok(AuthFlowResponse::Challenge(_)) => Some(
                AuthorizationEvent::RefreshFailed {
                    error: AuthError::Unknown(
                        "unexpected challenge during token refresh".into(),
                    ),
                }
                .into(),
            ),
            Err(err) => Some(
                AuthorizationEvent::RefreshFailed {
                    error: err.into(),
                }
                .into(),
            ),
        }
    }))
}

/// Persist the established credential. Best-effort: the in-memory session
/// is the source of truth, the store is a cache for cold starts.
fn persist_credential(credential: AuthCredential, env: &AuthEnvironment) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        if let Err(err) = blobs::persist_credential(env.store.as_ref(), &credential).await {
            tracing::warn!(error = %err, "failed to persist credential");
        }
        None
    }))
}

/// Clear the persisted session after sign-out, keeping the last username.
fn clear_store(last_username: Option<String>, env: &AuthEnvironment) -> Effect<AuthEvent> {
    let env = env.clone();
    Effect::Future(Box::pin(async move {
        if let Err(err) =
            blobs::clear_session(env.store.as_ref(), last_username.as_deref()).await
        {
            tracing::warn!(error = %err, "failed to clear persisted session");
        }
        None
    }))
}
