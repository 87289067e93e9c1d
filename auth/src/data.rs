//! Session data types.
//!
//! Everything in this module is a pure value: tokens, credentials, device
//! metadata, and challenge descriptions. Expiration is always expressed as
//! epoch seconds and compared against the injected clock — never against a
//! wall-clock read inside these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ═══════════════════════════════════════════════════════════════════════
// User pool tokens
// ═══════════════════════════════════════════════════════════════════════

/// The token set issued by a user pool sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoolTokens {
    /// OIDC identity token (JWT).
    pub id_token: String,

    /// Access token (JWT) used for user pool API calls.
    pub access_token: String,

    /// Refresh token. Absent when the session came from a token exchange
    /// that does not issue one (e.g. a refresh response).
    pub refresh_token: Option<String>,

    /// Access token expiration, epoch seconds.
    pub expires_at: i64,
}

impl UserPoolTokens {
    /// Whether the access token is still usable at `now_epoch_seconds`,
    /// honoring the safety margin.
    #[must_use]
    pub const fn is_valid(&self, now_epoch_seconds: i64, margin_secs: i64) -> bool {
        self.expires_at > now_epoch_seconds + margin_secs
    }
}

/// Read a single string claim out of a JWT payload without verifying the
/// signature. Verification is the service's job; the machine only needs
/// identifying claims (`sub`, `username`) for bookkeeping.
#[must_use]
pub fn jwt_claim(token: &str, claim: &str) -> Option<String> {
    use base64::Engine;

    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get(claim)?.as_str().map(str::to_owned)
}

// ═══════════════════════════════════════════════════════════════════════
// AWS credentials
// ═══════════════════════════════════════════════════════════════════════

/// An AWS credential set issued by the identity pool.
///
/// Temporary credentials carry a session token and an expiration; long-lived
/// ones carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsCredentials {
    /// Access key ID.
    pub access_key_id: String,

    /// Secret access key.
    pub secret_access_key: String,

    /// Session token, present for temporary credentials.
    pub session_token: Option<String>,

    /// Expiration, epoch seconds, present for temporary credentials.
    pub expiration: Option<i64>,
}

impl AwsCredentials {
    /// Whether these are temporary (session-scoped) credentials.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        self.session_token.is_some() && self.expiration.is_some()
    }

    /// Whether the credentials are usable at `now_epoch_seconds`, honoring
    /// the safety margin. Long-lived credentials never expire.
    #[must_use]
    pub const fn is_valid(&self, now_epoch_seconds: i64, margin_secs: i64) -> bool {
        match self.expiration {
            Some(expiration) => expiration > now_epoch_seconds + margin_secs,
            None => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Composite credential
// ═══════════════════════════════════════════════════════════════════════

/// The credential material backing the current session.
///
/// Which variant is reachable depends on configuration: a user-pool-only
/// setup never holds AWS credentials, a guest session never holds tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthCredential {
    /// No credential material at all.
    #[default]
    Empty,

    /// User pool tokens only (no identity pool configured, or the identity
    /// fetch failed and the tokens were preserved).
    UserPool {
        /// The user pool token set.
        tokens: UserPoolTokens,
    },

    /// Identity pool output only (guest access or federation).
    IdentityPool {
        /// Identity pool identity ID.
        identity_id: String,
        /// AWS credentials for that identity.
        credentials: AwsCredentials,
    },

    /// Full session: user pool tokens plus the identity pool output derived
    /// from them.
    UserAndIdentityPool {
        /// The user pool token set.
        tokens: UserPoolTokens,
        /// Identity pool identity ID.
        identity_id: String,
        /// AWS credentials for that identity.
        credentials: AwsCredentials,
    },
}

impl AuthCredential {
    /// Whether there is no credential material.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The user pool tokens, if this credential carries any.
    #[must_use]
    pub const fn user_pool_tokens(&self) -> Option<&UserPoolTokens> {
        match self {
            Self::UserPool { tokens } | Self::UserAndIdentityPool { tokens, .. } => Some(tokens),
            Self::Empty | Self::IdentityPool { .. } => None,
        }
    }

    /// The identity pool identity ID, if established.
    #[must_use]
    pub const fn identity_id(&self) -> Option<&String> {
        match self {
            Self::IdentityPool { identity_id, .. }
            | Self::UserAndIdentityPool { identity_id, .. } => Some(identity_id),
            Self::Empty | Self::UserPool { .. } => None,
        }
    }

    /// The AWS credentials, if established.
    #[must_use]
    pub const fn aws_credentials(&self) -> Option<&AwsCredentials> {
        match self {
            Self::IdentityPool { credentials, .. }
            | Self::UserAndIdentityPool { credentials, .. } => Some(credentials),
            Self::Empty | Self::UserPool { .. } => None,
        }
    }

    /// Whether every part of the credential is still usable at
    /// `now_epoch_seconds`, honoring the safety margin.
    ///
    /// An empty credential is never valid.
    #[must_use]
    pub fn is_valid(&self, now_epoch_seconds: i64, margin_secs: i64) -> bool {
        match self {
            Self::Empty => false,
            Self::UserPool { tokens } => tokens.is_valid(now_epoch_seconds, margin_secs),
            Self::IdentityPool { credentials, .. } => {
                credentials.is_valid(now_epoch_seconds, margin_secs)
            },
            Self::UserAndIdentityPool {
                tokens,
                credentials,
                ..
            } => {
                tokens.is_valid(now_epoch_seconds, margin_secs)
                    && credentials.is_valid(now_epoch_seconds, margin_secs)
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Signed-in session data
// ═══════════════════════════════════════════════════════════════════════

/// How a session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignInMethod {
    /// Direct API-based sign-in with the given flow.
    ApiBased(AuthFlowKind),

    /// Browser-redirect (hosted UI / OAuth) sign-in; the token exchange
    /// happened outside this machine.
    HostedUi,
}

/// The user pool authentication flow used for an API-based sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthFlowKind {
    /// `USER_SRP_AUTH` — the SRP handshake.
    UserSrp,

    /// `REFRESH_TOKEN_AUTH` — token refresh.
    RefreshToken,
}

/// Everything known about the signed-in user.
///
/// Immutable once constructed; re-authentication creates a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInData {
    /// User pool `sub` for the user, falling back to the username when the
    /// tokens carry no readable subject claim.
    pub user_id: String,

    /// Username the sign-in was performed with.
    pub username: String,

    /// When the session was established.
    pub signed_in_at: DateTime<Utc>,

    /// How the session was established.
    pub sign_in_method: SignInMethod,

    /// The issued token set.
    pub tokens: UserPoolTokens,
}

impl SignedInData {
    /// Build signed-in data from a freshly issued token set.
    #[must_use]
    pub fn from_tokens(
        username: &str,
        sign_in_method: SignInMethod,
        tokens: UserPoolTokens,
        signed_in_at: DateTime<Utc>,
    ) -> Self {
        let user_id = jwt_claim(&tokens.access_token, "sub")
            .or_else(|| jwt_claim(&tokens.id_token, "sub"))
            .unwrap_or_else(|| username.to_owned());

        Self {
            user_id,
            username: username.to_owned(),
            signed_in_at,
            sign_in_method,
            tokens,
        }
    }
}

/// What remains known after signing out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOutData {
    /// The username of the last signed-in user, if any.
    pub last_signed_in_username: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Device metadata
// ═══════════════════════════════════════════════════════════════════════

/// Device-trust metadata associated with a signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceMetadata {
    /// No device has been confirmed for this user.
    #[default]
    Empty,

    /// A confirmed (tracked) device.
    Registered {
        /// Device key issued by the service.
        device_key: String,
        /// Device group key issued by the service.
        device_group_key: String,
        /// The random device password generated at confirmation time.
        /// Needed for device SRP authentication on later sign-ins.
        device_secret: Option<String>,
    },
}

impl DeviceMetadata {
    /// The device key, if a device is registered.
    #[must_use]
    pub const fn device_key(&self) -> Option<&String> {
        match self {
            Self::Registered { device_key, .. } => Some(device_key),
            Self::Empty => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Challenges
// ═══════════════════════════════════════════════════════════════════════

/// The closed set of challenge names the service can issue.
///
/// Service-defined names outside this set are carried verbatim in `Other`;
/// the machine stores and forwards them without interpreting their meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeKind {
    /// `PASSWORD_VERIFIER` — the SRP proof step.
    PasswordVerifier,
    /// `SMS_MFA`
    SmsMfa,
    /// `SOFTWARE_TOKEN_MFA`
    SoftwareTokenMfa,
    /// `EMAIL_OTP`
    EmailOtp,
    /// `NEW_PASSWORD_REQUIRED`
    NewPasswordRequired,
    /// `CUSTOM_CHALLENGE`
    CustomChallenge,
    /// `SELECT_MFA_TYPE`
    SelectMfaType,
    /// `DEVICE_SRP_AUTH`
    DeviceSrpAuth,
    /// `DEVICE_PASSWORD_VERIFIER`
    DevicePasswordVerifier,
    /// `WEB_AUTHN` — passkey assertion or registration.
    WebAuthn,
    /// Any other service-defined challenge name, kept verbatim.
    Other(String),
}

impl ChallengeKind {
    /// Map a service challenge name onto the closed set.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "PASSWORD_VERIFIER" => Self::PasswordVerifier,
            "SMS_MFA" => Self::SmsMfa,
            "SOFTWARE_TOKEN_MFA" => Self::SoftwareTokenMfa,
            "EMAIL_OTP" => Self::EmailOtp,
            "NEW_PASSWORD_REQUIRED" => Self::NewPasswordRequired,
            "CUSTOM_CHALLENGE" => Self::CustomChallenge,
            "SELECT_MFA_TYPE" => Self::SelectMfaType,
            "DEVICE_SRP_AUTH" => Self::DeviceSrpAuth,
            "DEVICE_PASSWORD_VERIFIER" => Self::DevicePasswordVerifier,
            "WEB_AUTHN" => Self::WebAuthn,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The service name for this challenge.
    #[must_use]
    pub fn as_name(&self) -> &str {
        match self {
            Self::PasswordVerifier => "PASSWORD_VERIFIER",
            Self::SmsMfa => "SMS_MFA",
            Self::SoftwareTokenMfa => "SOFTWARE_TOKEN_MFA",
            Self::EmailOtp => "EMAIL_OTP",
            Self::NewPasswordRequired => "NEW_PASSWORD_REQUIRED",
            Self::CustomChallenge => "CUSTOM_CHALLENGE",
            Self::SelectMfaType => "SELECT_MFA_TYPE",
            Self::DeviceSrpAuth => "DEVICE_SRP_AUTH",
            Self::DevicePasswordVerifier => "DEVICE_PASSWORD_VERIFIER",
            Self::WebAuthn => "WEB_AUTHN",
            Self::Other(name) => name,
        }
    }
}

/// A challenge issued by the service during sign-in.
///
/// The parameter map is stored verbatim for the caller to render; the
/// machine does not interpret parameter contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    /// Which challenge this is.
    pub kind: ChallengeKind,

    /// The username the challenge applies to.
    pub username: String,

    /// Opaque session handle to echo back in the answer.
    pub session: Option<String>,

    /// Challenge parameters, verbatim from the service.
    pub parameters: HashMap<String, String>,
}

// ═══════════════════════════════════════════════════════════════════════
// SRP wire parameters
// ═══════════════════════════════════════════════════════════════════════

/// The server half of the SRP exchange, extracted from a
/// `PASSWORD_VERIFIER` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordVerifierParams {
    /// The internal user identifier the proof must be computed over
    /// (`USER_ID_FOR_SRP`).
    pub user_id_for_srp: String,

    /// Server salt, hex.
    pub salt_hex: String,

    /// Server public value `B`, hex.
    pub srp_b_hex: String,

    /// Opaque secret block to echo back, base64.
    pub secret_block: String,

    /// Session handle from the challenge, echoed in the response.
    pub session: Option<String>,
}
