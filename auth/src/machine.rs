//! The authentication state machine facade.
//!
//! An explicit, constructed instance owned by the application's dependency
//! graph — there is no ambient global. All mutation flows through the
//! dispatcher; callers interact through request/response helpers built on
//! the state stream.

use std::collections::HashMap;
use std::time::Duration;

use cognito_auth_runtime::{Store, StoreError};

use crate::client::{DeviceSummary, WebAuthnCredentialSummary};
use crate::data::{AuthChallenge, AuthCredential, SignedInData};
use crate::environment::AuthEnvironment;
use crate::error::{AuthError, Result};
use crate::events::{AuthEvent, AuthenticationEvent, ChallengeEvent};
use crate::reducers::AuthReducer;
use crate::state::{AuthState, AuthenticationState, SignInChallengeState, SignInState};
use crate::store as blobs;

/// The store type backing the machine.
pub type AuthStore = Store<AuthState, AuthEvent, AuthEnvironment, AuthReducer>;

/// Default ceiling for request/response waits against the state stream.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How a sign-in call settled.
#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    /// The flow completed and a session is established.
    Done {
        /// The new session data.
        data: SignedInData,
    },

    /// The service demands a challenge answer before issuing tokens.
    /// Answer with [`AuthStateMachine::confirm_sign_in`].
    ChallengeRequired {
        /// The challenge, parameters verbatim for rendering.
        challenge: AuthChallenge,
    },
}

impl SignInOutcome {
    /// Whether the flow is fully signed in.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// The Cognito authentication state machine.
///
/// Cloning shares the underlying dispatcher; all clones observe and drive
/// the same state.
#[derive(Clone)]
pub struct AuthStateMachine {
    store: AuthStore,
    environment: AuthEnvironment,
}

impl AuthStateMachine {
    /// Construct the machine in its initial `NotConfigured` state.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when the configuration is
    /// invalid.
    pub fn new(environment: AuthEnvironment) -> Result<Self> {
        environment.config.validate()?;
        Ok(Self {
            store: Store::new(AuthState::default(), AuthReducer::new(), environment.clone()),
            environment,
        })
    }

    /// Configure the machine: hydrate persisted session state and leave the
    /// configuration states. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Timeout`] when hydration does not settle.
    pub async fn configure(&self) -> Result<AuthState> {
        let snapshot = self.current_state().await;
        if snapshot.is_configured() {
            return Ok(snapshot);
        }

        self.store
            .send_and_wait_for(
                AuthenticationEvent::Configure.into(),
                AuthState::is_configured,
                DEFAULT_OPERATION_TIMEOUT,
            )
            .await
            .map_err(map_store_error)
    }

    /// Submit a raw event. Fire-and-forget: ordering relative to other
    /// events from this caller is preserved, completion is not awaited.
    ///
    /// # Errors
    ///
    /// Returns an error when the machine is shutting down.
    pub async fn dispatch(&self, event: AuthEvent) -> Result<()> {
        self.store.send(event).await.map(|_| ()).map_err(map_store_error)
    }

    /// Snapshot of the current composite state.
    pub async fn current_state(&self) -> AuthState {
        self.store.state(Clone::clone).await
    }

    /// A stream of every state committed after this call.
    ///
    /// Current-value + updates semantics: rapid successive commits may
    /// coalesce into the latest value. Read [`Self::current_state`] first
    /// for the "as of now" state.
    pub fn observe(&self) -> impl futures::Stream<Item = AuthState> + Send + use<> {
        let mut rx = self.store.subscribe();
        async_stream::stream! {
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                yield state;
            }
        }
    }

    /// Wait for the first state committed after this call that matches the
    /// predicate. The state current at call time never matches.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Timeout`] when no matching state is committed
    /// in time; the machine itself continues unaffected.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&AuthState) -> bool,
        timeout: Duration,
    ) -> Result<AuthState> {
        self.store
            .wait_for(predicate, timeout)
            .await
            .map_err(map_store_error)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Sign-in
    // ═══════════════════════════════════════════════════════════════════

    /// Sign in with username and password over the SRP handshake.
    ///
    /// Resolves when the machine settles: a full session, a challenge to
    /// answer, or an error. A failed attempt restores `SignedOut` — no
    /// partial sign-in survives.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] for empty inputs, before any event is
    ///   submitted
    /// - [`AuthError::InvalidState`] when a session already exists or
    ///   another flow is in progress
    /// - the preserved flow error when the service rejects the attempt
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<SignInOutcome> {
        if username.trim().is_empty() {
            return Err(AuthError::Validation("username must not be empty".into()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".into()));
        }

        self.ensure_sign_in_allowed().await?;

        let settled = self
            .store
            .send_and_wait_for(
                AuthenticationEvent::SignInRequested {
                    username: username.to_owned(),
                    password: password.to_owned(),
                }
                .into(),
                Self::sign_in_settled,
                DEFAULT_OPERATION_TIMEOUT,
            )
            .await
            .map_err(map_store_error)?;

        self.interpret_sign_in_outcome(settled).await
    }

    /// Complete a hosted-UI (browser) sign-in with the tokens the external
    /// flow obtained.
    ///
    /// # Errors
    ///
    /// Same surface as [`Self::sign_in`].
    pub async fn sign_in_with_hosted_ui_tokens(
        &self,
        tokens: crate::data::UserPoolTokens,
    ) -> Result<SignInOutcome> {
        self.ensure_sign_in_allowed().await?;

        let settled = self
            .store
            .send_and_wait_for(
                AuthenticationEvent::HostedUiTokensReceived { tokens }.into(),
                Self::sign_in_settled,
                DEFAULT_OPERATION_TIMEOUT,
            )
            .await
            .map_err(map_store_error)?;

        self.interpret_sign_in_outcome(settled).await
    }

    /// Answer the pending sign-in challenge.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] for an empty answer
    /// - [`AuthError::InvalidState`] when no challenge is waiting
    /// - the service's rejection (e.g. a code mismatch) — the challenge
    ///   stays pending and can be answered again
    pub async fn confirm_sign_in(
        &self,
        answer: &str,
        metadata: HashMap<String, String>,
    ) -> Result<SignInOutcome> {
        if answer.trim().is_empty() {
            return Err(AuthError::Validation("answer must not be empty".into()));
        }

        let snapshot = self.current_state().await;
        if snapshot.pending_challenge().is_none() {
            return Err(AuthError::InvalidState(
                "no challenge is waiting for an answer".into(),
            ));
        }

        let settled = self
            .store
            .send_and_wait_for(
                ChallengeEvent::VerifyAnswer {
                    answer: answer.to_owned(),
                    metadata,
                }
                .into(),
                Self::sign_in_settled,
                DEFAULT_OPERATION_TIMEOUT,
            )
            .await
            .map_err(map_store_error)?;

        // A re-issued challenge with a recorded failure is the retryable
        // rejection path: surface the failure, keep the challenge pending
        if let AuthenticationState::SigningIn(SignInState::ResolvingChallenge(
            SignInChallengeState::WaitingForAnswer {
                last_failure: Some(failure),
                ..
            },
        )) = &settled.authentication
        {
            return Err(failure.clone());
        }

        self.interpret_sign_in_outcome(settled).await
    }

    /// A sign-in flow has settled when it produced a session, a pending
    /// challenge, or an error.
    fn sign_in_settled(state: &AuthState) -> bool {
        matches!(state.authentication, AuthenticationState::Error(_))
            || state.sign_in_error().is_some()
            || state.pending_challenge().is_some()
            || (state.signed_in_data().is_some() && state.established_credential().is_some())
    }

    async fn ensure_sign_in_allowed(&self) -> Result<()> {
        let snapshot = self.current_state().await;
        match &snapshot.authentication {
            AuthenticationState::SignedOut(_) => Ok(()),
            AuthenticationState::NotConfigured | AuthenticationState::Configuring => Err(
                AuthError::Configuration("configure the machine before signing in".into()),
            ),
            AuthenticationState::SignedIn(..) => {
                Err(AuthError::InvalidState("already signed in".into()))
            },
            AuthenticationState::SigningIn(_) => Err(AuthError::InvalidState(
                "a sign-in is already in progress".into(),
            )),
            AuthenticationState::SigningOut => Err(AuthError::InvalidState(
                "a sign-out is in progress".into(),
            )),
            AuthenticationState::FederatingToIdentityPool
            | AuthenticationState::FederatedToIdentityPool => Err(AuthError::InvalidState(
                "federated to the identity pool; sign out first".into(),
            )),
            AuthenticationState::Error(_) => Err(AuthError::InvalidState(
                "the machine is in an error state; sign out to recover".into(),
            )),
        }
    }

    async fn interpret_sign_in_outcome(&self, settled: AuthState) -> Result<SignInOutcome> {
        if let Some(error) = settled.sign_in_error() {
            let error = error.clone();
            // Restore a clean signed-out state; the failed attempt keeps
            // nothing behind
            let _ = self
                .store
                .send_and_wait_for(
                    AuthenticationEvent::CancelSignIn.into(),
                    |state: &AuthState| {
                        matches!(state.authentication, AuthenticationState::SignedOut(_))
                    },
                    Duration::from_secs(5),
                )
                .await;
            return Err(error);
        }

        if let AuthenticationState::Error(error) = &settled.authentication {
            return Err(error.clone());
        }

        if let Some(challenge) = settled.pending_challenge() {
            return Ok(SignInOutcome::ChallengeRequired {
                challenge: challenge.clone(),
            });
        }

        settled
            .signed_in_data()
            .map(|data| SignInOutcome::Done { data: data.clone() })
            .ok_or_else(|| AuthError::Unknown("sign-in settled in an unexpected state".into()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Sign-out and federation
    // ═══════════════════════════════════════════════════════════════════

    /// Sign out. With `global`, the session is revoked on every device
    /// first; revocation failures degrade to a local sign-out.
    ///
    /// Signing out mid-sign-in cancels the in-progress flow. Already being
    /// signed out is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] before configure, or
    /// [`AuthError::Timeout`] when the flow does not settle.
    pub async fn sign_out(&self, global: bool) -> Result<()> {
        let snapshot = self.current_state().await;
        match &snapshot.authentication {
            AuthenticationState::SignedOut(_) => return Ok(()),
            AuthenticationState::NotConfigured | AuthenticationState::Configuring => {
                return Err(AuthError::Configuration(
                    "configure the machine before signing out".into(),
                ));
            },
            _ => {},
        }

        self.store
            .send_and_wait_for(
                AuthenticationEvent::SignOutRequested { global }.into(),
                |state: &AuthState| {
                    matches!(state.authentication, AuthenticationState::SignedOut(_))
                },
                DEFAULT_OPERATION_TIMEOUT,
            )
            .await
            .map_err(map_store_error)?;
        Ok(())
    }

    /// Exchange an external provider token for an identity pool session.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Configuration`] without an identity pool
    /// - [`AuthError::InvalidState`] while a user pool session exists
    /// - the preserved fetch error when the exchange fails
    pub async fn federate_to_identity_pool(
        &self,
        provider: &str,
        token: &str,
    ) -> Result<AuthCredential> {
        if provider.trim().is_empty() || token.trim().is_empty() {
            return Err(AuthError::Validation(
                "provider and token must not be empty".into(),
            ));
        }
        if !self.environment.config.has_identity_pool() {
            return Err(AuthError::Configuration(
                "no identity pool configured".into(),
            ));
        }

        let snapshot = self.current_state().await;
        match &snapshot.authentication {
            AuthenticationState::SignedOut(_)
            | AuthenticationState::FederatedToIdentityPool
            | AuthenticationState::Error(_) => {},
            _ => {
                return Err(AuthError::InvalidState(
                    "federation requires a signed-out machine".into(),
                ));
            },
        }

        let settled = self
            .store
            .send_and_wait_for(
                AuthenticationEvent::StartFederation {
                    provider: provider.to_owned(),
                    token: token.to_owned(),
                }
                .into(),
                |state: &AuthState| {
                    matches!(state.authentication, AuthenticationState::Error(_))
                        || (matches!(
                            state.authentication,
                            AuthenticationState::FederatedToIdentityPool
                        ) && state.established_credential().is_some())
                },
                DEFAULT_OPERATION_TIMEOUT,
            )
            .await
            .map_err(map_store_error)?;

        if let AuthenticationState::Error(error) = &settled.authentication {
            return Err(error.clone());
        }
        settled
            .established_credential()
            .cloned()
            .ok_or_else(|| AuthError::Unknown("federation settled in an unexpected state".into()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Devices and passkeys
    // ═══════════════════════════════════════════════════════════════════

    /// List the tracked devices for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidState`] without a session, or the
    /// service's failure.
    pub async fn fetch_devices(&self) -> Result<Vec<DeviceSummary>> {
        let access_token = self.access_token().await?;
        self.environment
            .user_pool
            .list_devices(&access_token)
            .await
            .map_err(AuthError::from)
    }

    /// Forget a tracked device. With `None`, forgets the current device.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidState`] without a session or a tracked
    /// device, or the service's failure.
    pub async fn forget_device(&self, device_key: Option<&str>) -> Result<()> {
        let access_token = self.access_token().await?;
        let snapshot = self.current_state().await;

        let current_device = match &snapshot.authentication {
            AuthenticationState::SignedIn(_, device) => device.device_key().cloned(),
            _ => None,
        };
        let forgetting_current = device_key.is_none();
        let key = match device_key {
            Some(key) => key.to_owned(),
            None => current_device.ok_or_else(|| {
                AuthError::InvalidState("no tracked device to forget".into())
            })?,
        };

        self.environment
            .user_pool
            .forget_device(&access_token, &key)
            .await?;

        if forgetting_current {
            if let Some(data) = snapshot.signed_in_data() {
                let _ = blobs::persist_device_metadata(
                    self.environment.store.as_ref(),
                    &data.username,
                    &crate::data::DeviceMetadata::Empty,
                )
                .await;
            }
        }
        Ok(())
    }

    /// List the registered passkey credentials for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidState`] without a session, or the
    /// service's failure.
    pub async fn list_webauthn_credentials(&self) -> Result<Vec<WebAuthnCredentialSummary>> {
        let access_token = self.access_token().await?;
        self.environment
            .user_pool
            .list_webauthn_credentials(&access_token)
            .await
            .map_err(AuthError::from)
    }

    /// The freshest access token available: the established credential's,
    /// falling back to the signed-in data's.
    pub(crate) async fn access_token(&self) -> Result<String> {
        let snapshot = self.current_state().await;
        snapshot
            .established_credential()
            .and_then(AuthCredential::user_pool_tokens)
            .map(|tokens| tokens.access_token.clone())
            .or_else(|| {
                snapshot
                    .signed_in_data()
                    .map(|data| data.tokens.access_token.clone())
            })
            .ok_or_else(|| AuthError::InvalidState("not signed in".into()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Plumbing
    // ═══════════════════════════════════════════════════════════════════

    /// Gracefully shut the dispatcher down, draining in-flight effects.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Timeout`] when effects are still running at the
    /// deadline.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.store.shutdown(timeout).await.map_err(map_store_error)
    }

    /// The store backing this machine, for advanced wiring (dispatch
    /// notices, effect handles).
    #[must_use]
    pub const fn store(&self) -> &AuthStore {
        &self.store
    }

    /// The environment this machine was built with.
    #[must_use]
    pub const fn environment(&self) -> &AuthEnvironment {
        &self.environment
    }
}

impl std::fmt::Debug for AuthStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStateMachine")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

pub(crate) fn map_store_error(error: StoreError) -> AuthError {
    match error {
        StoreError::Timeout | StoreError::ShutdownTimeout(_) => AuthError::Timeout,
        StoreError::ShutdownInProgress => {
            AuthError::InvalidState("the machine is shutting down".into())
        },
        StoreError::ChannelClosed => AuthError::Unknown("state channel closed".into()),
    }
}
