//! The closed state vocabulary of the authentication machine.
//!
//! States are pure values with no behavior beyond equality and read-only
//! accessors. Every reachable composite pairing is produced by the resolvers
//! in [`crate::reducers`]; nothing else constructs transitions.

use crate::data::{
    AuthChallenge, AuthCredential, ChallengeKind, DeviceMetadata, SignedInData, SignedOutData,
};
use crate::error::AuthError;
use crate::srp::SrpInitiator;

// ═══════════════════════════════════════════════════════════════════════
// Composite state
// ═══════════════════════════════════════════════════════════════════════

/// The composite machine state: authentication (who is signed in) paired
/// with authorization (what credentials back the session).
///
/// Created once at initialization as `NotConfigured`/`NotConfigured`,
/// transitioned exclusively through the dispatcher, and never reset except
/// by configure or sign-out completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    /// The authentication sub-machine.
    pub authentication: AuthenticationState,

    /// The authorization sub-machine.
    pub authorization: AuthorizationState,
}

impl AuthState {
    /// Whether both sub-machines have left their configuration states.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        !matches!(
            self.authentication,
            AuthenticationState::NotConfigured | AuthenticationState::Configuring
        ) && !matches!(
            self.authorization,
            AuthorizationState::NotConfigured | AuthorizationState::Configuring
        )
    }

    /// The signed-in session data, when authenticated.
    #[must_use]
    pub const fn signed_in_data(&self) -> Option<&SignedInData> {
        match &self.authentication {
            AuthenticationState::SignedIn(data, _) => Some(data),
            _ => None,
        }
    }

    /// The established credential, when a session exists.
    #[must_use]
    pub const fn established_credential(&self) -> Option<&AuthCredential> {
        match &self.authorization {
            AuthorizationState::SessionEstablished(credential) => Some(credential),
            _ => None,
        }
    }

    /// The challenge currently awaiting a caller answer, if any.
    #[must_use]
    pub const fn pending_challenge(&self) -> Option<&AuthChallenge> {
        match &self.authentication {
            AuthenticationState::SigningIn(SignInState::ResolvingChallenge(
                SignInChallengeState::WaitingForAnswer { challenge, .. },
            )) => Some(challenge),
            _ => None,
        }
    }

    /// The error carried by a failed sign-in attempt, if the machine is in
    /// one.
    #[must_use]
    pub const fn sign_in_error(&self) -> Option<&AuthError> {
        match &self.authentication {
            AuthenticationState::SigningIn(SignInState::Error(error)) => Some(error),
            _ => None,
        }
    }

    /// The invariant every committed composite state upholds: an
    /// authenticated user always has a configured authorization side.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        !(matches!(self.authentication, AuthenticationState::SignedIn(..))
            && matches!(
                self.authorization,
                AuthorizationState::NotConfigured | AuthorizationState::Configuring
            ))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Authentication
// ═══════════════════════════════════════════════════════════════════════

/// Who is signed in, and how far along any sign-in or sign-out flow is.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthenticationState {
    /// Initial state; nothing can run until configure.
    #[default]
    NotConfigured,

    /// Configure received; hydrating persisted session data.
    Configuring,

    /// No user session. Remembers the previous username, if any.
    SignedOut(SignedOutData),

    /// A sign-in flow is in progress.
    SigningIn(SignInState),

    /// A user session exists.
    SignedIn(SignedInData, DeviceMetadata),

    /// A sign-out flow is in progress (revocation, cleanup).
    SigningOut,

    /// Exchanging an external provider token for an identity pool session.
    FederatingToIdentityPool,

    /// An external provider token is backing the identity pool session.
    FederatedToIdentityPool,

    /// The authentication side failed irrecoverably for the current flow.
    Error(AuthError),
}

// ═══════════════════════════════════════════════════════════════════════
// Sign-in sub-machine
// ═══════════════════════════════════════════════════════════════════════

/// Progress of a sign-in flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SignInState {
    /// Sign-in requested but no leg has started.
    #[default]
    NotStarted,

    /// The SRP handshake is running.
    SigningInWithSrp(SrpSignInState),

    /// A server-issued challenge is being resolved.
    ResolvingChallenge(SignInChallengeState),

    /// The flow produced a session; the top-level machine is taking over.
    SignedIn,

    /// The flow failed. The cause is preserved for the caller.
    Error(AuthError),
}

/// Progress of the SRP handshake.
///
/// Each step is a distinct state because each depends on the shape of one
/// specific network round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SrpSignInState {
    /// Handshake not yet started.
    #[default]
    NotStarted,

    /// The client ephemeral pair was generated and `SRP_A` sent; waiting
    /// for the server's salt and public value.
    InitiatingSrpA {
        /// Username the handshake runs for.
        username: String,
        /// The password, retained until the verifier is computed.
        password: String,
        /// The ephemeral key pair; the public value was already sent.
        initiator: SrpInitiator,
    },

    /// The password claim was computed and submitted; waiting for tokens or
    /// a follow-up challenge.
    RespondingPasswordVerifier {
        /// Username the handshake runs for.
        username: String,
    },

    /// The handshake produced tokens.
    SignedIn,

    /// The handshake failed; cause preserved, never silently retried.
    Error(AuthError),
}

/// Progress of resolving a server-issued challenge (MFA, new password,
/// custom, device, passkey).
#[derive(Debug, Clone, PartialEq)]
pub enum SignInChallengeState {
    /// The challenge is waiting for the caller's answer.
    WaitingForAnswer {
        /// The challenge, parameters verbatim.
        challenge: AuthChallenge,
        /// A retryable verification failure from the previous answer, kept
        /// so the caller can render it and retry.
        last_failure: Option<AuthError>,
    },

    /// An answer was submitted and is being verified.
    Verifying {
        /// The challenge being verified, retained for retry rounds.
        challenge: AuthChallenge,
    },

    /// The answer was accepted.
    Verified,

    /// Verification failed in a way that cannot be retried in place.
    Error(AuthError),
}

impl SignInChallengeState {
    /// The kind of challenge this state is resolving, where one is known.
    #[must_use]
    pub const fn challenge_kind(&self) -> Option<&ChallengeKind> {
        match self {
            Self::WaitingForAnswer { challenge, .. } | Self::Verifying { challenge } => {
                Some(&challenge.kind)
            },
            Self::Verified | Self::Error(_) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Authorization
// ═══════════════════════════════════════════════════════════════════════

/// What the session-establishment fetch is exchanging.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionFetchContext {
    /// Exchanging freshly issued user pool tokens.
    UserPool(SignedInData),

    /// Establishing an unauthenticated (guest) identity.
    Unauthenticated,

    /// Exchanging an external provider token.
    Federated {
        /// Login-map key for the provider.
        provider: String,
        /// The provider token.
        token: String,
    },
}

/// A failed authorization flow, with the last known credential preserved so
/// a failure never destroys a previously valid session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionError {
    /// What went wrong.
    pub source: AuthError,

    /// The credential that was current when the failure happened.
    pub credential: AuthCredential,
}

/// What credentials back the session, and how far along any fetch or
/// refresh is.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthorizationState {
    /// Initial state; nothing can run until configure.
    #[default]
    NotConfigured,

    /// Configure received; hydrating the persisted credential.
    Configuring,

    /// A sign-in is in progress; a session will be fetched when it lands.
    SigningIn,

    /// Exchanging tokens or provider material for a session.
    FetchingAuthSession(SessionFetchContext),

    /// A session exists. `AuthCredential::Empty` means "established, but
    /// nothing to hand out" (signed out, no guest fetch yet).
    SessionEstablished(AuthCredential),

    /// A refresh is in flight; the existing credential is retained until
    /// the refresh settles.
    RefreshingSession(AuthCredential),

    /// The authorization flow failed; cause and last credential preserved.
    Error(SessionError),
}
