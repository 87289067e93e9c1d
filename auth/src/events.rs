//! The closed event vocabulary of the authentication machine.
//!
//! Every event carries a unique ID and a timestamp for debugging and
//! ordering. Payloads are pure values; effect results re-enter the machine
//! as events from this vocabulary and nothing else.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::data::{
    AuthChallenge, AuthCredential, AwsCredentials, DeviceMetadata, PasswordVerifierParams,
    SignedInData, SignedOutData, UserPoolTokens,
};
use crate::error::AuthError;

/// An event submitted to the machine.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    /// Unique event ID.
    pub id: Uuid,

    /// When the event was created.
    pub occurred_at: DateTime<Utc>,

    /// What happened.
    pub kind: AuthEventKind,
}

impl AuthEvent {
    /// Wrap an event kind with a fresh ID and timestamp.
    #[must_use]
    pub fn new(kind: impl Into<AuthEventKind>) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            kind: kind.into(),
        }
    }
}

/// The five sub-vocabularies, one per sub-machine.
#[derive(Debug, Clone)]
pub enum AuthEventKind {
    /// Top-level authentication lifecycle events.
    Authentication(AuthenticationEvent),

    /// Sign-in flow orchestration events.
    SignIn(SignInEvent),

    /// SRP handshake events.
    Srp(SrpEvent),

    /// Challenge resolution events.
    Challenge(ChallengeEvent),

    /// Authorization / session events.
    Authorization(AuthorizationEvent),
}

macro_rules! event_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for AuthEventKind {
            fn from(event: $ty) -> Self {
                Self::$variant(event)
            }
        }

        impl From<$ty> for AuthEvent {
            fn from(event: $ty) -> Self {
                Self::new(AuthEventKind::$variant(event))
            }
        }
    };
}

event_from!(Authentication, AuthenticationEvent);
event_from!(SignIn, SignInEvent);
event_from!(Srp, SrpEvent);
event_from!(Challenge, ChallengeEvent);
event_from!(Authorization, AuthorizationEvent);

// ═══════════════════════════════════════════════════════════════════════
// Authentication events
// ═══════════════════════════════════════════════════════════════════════

/// Top-level authentication lifecycle events.
#[derive(Debug, Clone)]
pub enum AuthenticationEvent {
    /// Start the machine: hydrate persisted session state. Observed by both
    /// sub-machines so the composite leaves its configuration states
    /// together.
    Configure,

    /// Hydration found a persisted user session.
    InitializedSignedIn {
        /// The persisted session data.
        data: SignedInData,
        /// The persisted device metadata for that user.
        device: DeviceMetadata,
        /// The persisted credential backing the session.
        credential: AuthCredential,
    },

    /// Hydration found no user session.
    InitializedSignedOut {
        /// What remains known about the previous session.
        data: SignedOutData,
        /// Any persisted guest credential.
        credential: AuthCredential,
    },

    /// A caller requested a username/password sign-in.
    SignInRequested {
        /// Username to sign in with.
        username: String,
        /// Password to prove.
        password: String,
    },

    /// A completed hosted-UI (browser) flow delivered tokens.
    HostedUiTokensReceived {
        /// The token set the browser flow obtained.
        tokens: UserPoolTokens,
    },

    /// A sign-in flow finished and produced a session.
    SignInCompleted {
        /// The new session data.
        data: SignedInData,
        /// Device metadata established during the flow.
        device: DeviceMetadata,
    },

    /// A caller abandoned the in-progress sign-in.
    CancelSignIn,

    /// A caller requested sign-out.
    SignOutRequested {
        /// Whether to revoke the session on every device.
        global: bool,
    },

    /// Sign-out finished (revocation done or skipped, local state cleared).
    SignedOutSuccess {
        /// What remains known after the sign-out.
        data: SignedOutData,
    },

    /// A caller wants to exchange an external provider token for an
    /// identity pool session.
    StartFederation {
        /// Login-map key for the provider.
        provider: String,
        /// The provider token.
        token: String,
    },

    /// An unrecoverable failure on the authentication side.
    ThrowError {
        /// The preserved cause.
        error: AuthError,
    },
}

// ═══════════════════════════════════════════════════════════════════════
// Sign-in events
// ═══════════════════════════════════════════════════════════════════════

/// Sign-in flow orchestration events.
#[derive(Debug, Clone)]
pub enum SignInEvent {
    /// Start the SRP leg of the flow.
    InitiateSignInWithSrp {
        /// Username to sign in with.
        username: String,
        /// Password to prove.
        password: String,
    },

    /// The service demanded a challenge before issuing tokens.
    ReceivedChallenge {
        /// The challenge, parameters verbatim.
        challenge: AuthChallenge,
    },

    /// The flow produced a session.
    Finalized {
        /// The new session data.
        data: SignedInData,
        /// Device metadata established during the flow.
        device: DeviceMetadata,
    },

    /// The flow failed.
    ThrowError {
        /// The preserved cause.
        error: AuthError,
    },
}

// ═══════════════════════════════════════════════════════════════════════
// SRP events
// ═══════════════════════════════════════════════════════════════════════

/// SRP handshake events.
#[derive(Debug, Clone)]
pub enum SrpEvent {
    /// Generate the ephemeral pair and send `SRP_A`.
    InitiateSrpAuth {
        /// Username to sign in with.
        username: String,
        /// Password to prove.
        password: String,
    },

    /// The server answered with its half of the exchange; compute and
    /// submit the password claim.
    RespondPasswordVerifier {
        /// Salt, `B`, secret block, and user ID from the server.
        params: PasswordVerifierParams,
    },

    /// The verifier round trip produced tokens.
    Verified {
        /// The new session data.
        data: SignedInData,
        /// Device metadata established during the flow.
        device: DeviceMetadata,
    },

    /// The initiate round trip failed.
    ThrowAuthError {
        /// The preserved cause.
        error: AuthError,
    },

    /// The verifier round trip failed.
    ThrowVerifierError {
        /// The preserved cause.
        error: AuthError,
    },
}

// ═══════════════════════════════════════════════════════════════════════
// Challenge events
// ═══════════════════════════════════════════════════════════════════════

/// Challenge resolution events.
#[derive(Debug, Clone)]
pub enum ChallengeEvent {
    /// The service issued (or re-issued) a challenge to wait on.
    WaitForAnswer {
        /// The challenge, parameters verbatim.
        challenge: AuthChallenge,
    },

    /// The caller answered the pending challenge.
    VerifyAnswer {
        /// The answer (code, new password, assertion, ...).
        answer: String,
        /// Additional response parameters, forwarded verbatim.
        metadata: HashMap<String, String>,
    },

    /// The answer was accepted and produced tokens.
    Verified {
        /// The new session data.
        data: SignedInData,
        /// Device metadata established during the flow.
        device: DeviceMetadata,
    },

    /// Verification failed.
    ThrowError {
        /// The preserved cause.
        error: AuthError,
    },
}

// ═══════════════════════════════════════════════════════════════════════
// Authorization events
// ═══════════════════════════════════════════════════════════════════════

/// Authorization / session events.
#[derive(Debug, Clone)]
pub enum AuthorizationEvent {
    /// Establish a guest session through the identity pool.
    FetchUnauthSession,

    /// The identity fetch finished.
    Fetched {
        /// Identity ID, when an identity pool took part.
        identity_id: Option<String>,
        /// AWS credentials, when an identity pool took part.
        credentials: Option<AwsCredentials>,
    },

    /// The identity fetch failed.
    FetchFailed {
        /// The preserved cause.
        error: AuthError,
    },

    /// Refresh the established session's credential material.
    RefreshSession,

    /// The refresh finished.
    Refreshed {
        /// The replacement credential.
        credential: AuthCredential,
    },

    /// The refresh failed. The pre-refresh credential is preserved in
    /// state.
    RefreshFailed {
        /// The preserved cause.
        error: AuthError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_get_unique_ids_and_timestamps() {
        let one = AuthEvent::from(AuthenticationEvent::Configure);
        let two = AuthEvent::from(AuthenticationEvent::Configure);
        assert_ne!(one.id, two.id);
        assert!(one.occurred_at <= two.occurred_at);
    }

    #[test]
    fn sub_vocabularies_wrap_into_the_event_type() {
        let event = AuthEvent::from(AuthorizationEvent::RefreshSession);
        assert!(matches!(
            event.kind,
            AuthEventKind::Authorization(AuthorizationEvent::RefreshSession)
        ));
    }
}
