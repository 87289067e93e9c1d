//! On-demand session resolution: "give me a currently valid credential
//! set", refreshing through the dispatcher when the cached one is expired
//! or absent.
//!
//! Coalescing is structural: the authorization resolver short-circuits a
//! refresh request that arrives while a refresh is in flight, so any number
//! of concurrent callers produce exactly one network refresh and all attach
//! to the same committed result.

use std::time::Duration;

use crate::data::{AwsCredentials, UserPoolTokens};
use crate::error::{AuthError, Result};
use crate::events::AuthorizationEvent;
use crate::machine::{AuthStateMachine, map_store_error};
use crate::state::{AuthState, AuthenticationState, AuthorizationState};

/// Ceiling for one settle round while a fetch or refresh is in flight.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot rounds before giving up. Each round either returns, fails, or
/// observes a settling transition.
const MAX_ROUNDS: usize = 4;

/// A point-in-time view of the established session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    /// User pool `sub`, when a user is signed in.
    pub user_id: Option<String>,

    /// Username, when a user is signed in.
    pub username: Option<String>,

    /// Identity pool identity ID, when established.
    pub identity_id: Option<String>,

    /// AWS credentials, when established.
    pub credentials: Option<AwsCredentials>,

    /// User pool tokens, when a user pool session exists.
    pub tokens: Option<UserPoolTokens>,
}

impl AuthStateMachine {
    /// Resolve a currently valid session, refreshing if needed.
    ///
    /// Suspends until the authorization machine reaches
    /// `SessionEstablished` (submitting a refresh or guest fetch where
    /// appropriate) or surfaces the preserved error.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SignedOut`] when signed out with no identity pool
    ///   configured
    /// - [`AuthError::Configuration`] before configure
    /// - the preserved session error when a refresh or fetch failed
    /// - [`AuthError::Timeout`] when the machine does not settle
    pub async fn fetch_auth_session(&self) -> Result<AuthSession> {
        let mut attempted_refresh = false;

        for _ in 0..MAX_ROUNDS {
            let snapshot = self.current_state().await;
            let now = self.environment().clock.epoch_seconds();
            let margin = self.environment().config.expiry_margin_secs;

            match &snapshot.authorization {
                AuthorizationState::NotConfigured | AuthorizationState::Configuring => {
                    return Err(AuthError::Configuration(
                        "configure the machine before requesting a session".into(),
                    ));
                },

                AuthorizationState::SessionEstablished(credential) => {
                    if credential.is_empty() {
                        if !self.environment().config.has_identity_pool() {
                            return Err(AuthError::SignedOut);
                        }
                        // Guest access: establish an unauthenticated session
                        self.settle_after(AuthorizationEvent::FetchUnauthSession)
                            .await?;
                        continue;
                    }

                    if credential.is_valid(now, margin) {
                        return Ok(session_from(&snapshot));
                    }

                    tracing::debug!("established credential expired; refreshing");
                    attempted_refresh = true;
                    self.settle_after(AuthorizationEvent::RefreshSession).await?;
                },

                AuthorizationState::SigningIn
                | AuthorizationState::FetchingAuthSession(_)
                | AuthorizationState::RefreshingSession(_) => {
                    // Another caller is already driving the transition;
                    // attach to its result
                    self.wait_until_settled().await;
                },

                AuthorizationState::Error(session_error) => {
                    // A failure left over from a previous call is worth one
                    // fresh attempt when the cause was transient; a failure
                    // from this call's own refresh is surfaced as-is
                    if !attempted_refresh
                        && session_error.source.is_retryable()
                        && !session_error.credential.is_empty()
                    {
                        attempted_refresh = true;
                        self.settle_after(AuthorizationEvent::RefreshSession).await?;
                        continue;
                    }
                    return Err(session_error.source.clone());
                },
            }
        }

        Err(AuthError::Timeout)
    }

    /// Resolve a currently valid AWS credential set.
    ///
    /// # Errors
    ///
    /// Same surface as [`Self::fetch_auth_session`], plus
    /// [`AuthError::Configuration`] when no identity pool is configured to
    /// issue AWS credentials.
    pub async fn get_credentials(&self) -> Result<AwsCredentials> {
        let session = self.fetch_auth_session().await?;
        session.credentials.ok_or_else(|| {
            AuthError::Configuration(
                "no identity pool configured; AWS credentials are unavailable".into(),
            )
        })
    }

    /// Resolve the identity pool identity ID.
    ///
    /// # Errors
    ///
    /// Same surface as [`Self::get_credentials`].
    pub async fn get_identity_id(&self) -> Result<String> {
        let session = self.fetch_auth_session().await?;
        session.identity_id.ok_or_else(|| {
            AuthError::Configuration(
                "no identity pool configured; no identity ID is available".into(),
            )
        })
    }

    /// Submit an authorization event and wait until the machine settles.
    ///
    /// Subscribes before sending, so the settling commit cannot be missed.
    /// An event coalesced into an already-completed transition leaves the
    /// machine settled with no further commit; the post-send check returns
    /// immediately in that case instead of waiting on a commit that will
    /// never come. A settle timeout is not an error — the caller's loop
    /// re-inspects the state.
    async fn settle_after(&self, event: AuthorizationEvent) -> Result<()> {
        let mut rx = self.store().subscribe();
        rx.borrow_and_update();

        self.store()
            .send(event.into())
            .await
            .map_err(map_store_error)?;

        if session_settled(&self.current_state().await) {
            return Ok(());
        }

        Self::wait_on_settled(&mut rx).await;
        Ok(())
    }

    /// Wait (bounded) until the authorization machine settles, tolerating a
    /// settle that happened between snapshot and subscription.
    async fn wait_until_settled(&self) {
        let mut rx = self.store().subscribe();
        rx.borrow_and_update();
        if session_settled(&self.current_state().await) {
            return;
        }
        Self::wait_on_settled(&mut rx).await;
    }

    async fn wait_on_settled(rx: &mut tokio::sync::watch::Receiver<AuthState>) {
        let _ = tokio::time::timeout(SETTLE_TIMEOUT, async {
            loop {
                if rx.changed().await.is_err() {
                    return;
                }
                if session_settled(&rx.borrow_and_update()) {
                    return;
                }
            }
        })
        .await;
    }
}

fn session_settled(state: &AuthState) -> bool {
    matches!(
        state.authorization,
        AuthorizationState::SessionEstablished(_) | AuthorizationState::Error(_)
    )
}

fn session_from(snapshot: &AuthState) -> AuthSession {
    let (user_id, username) = match &snapshot.authentication {
        AuthenticationState::SignedIn(data, _) => {
            (Some(data.user_id.clone()), Some(data.username.clone()))
        },
        _ => (None, None),
    };

    let credential = snapshot.established_credential();

    AuthSession {
        user_id,
        username,
        identity_id: credential.and_then(|c| c.identity_id().cloned()),
        credentials: credential.and_then(|c| c.aws_credentials().cloned()),
        tokens: credential.and_then(|c| c.user_pool_tokens().cloned()),
    }
}
