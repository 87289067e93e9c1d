//! Service boundary traits for the user pool and identity pool.
//!
//! These traits describe the async operations the flows need; the concrete
//! wire clients (HTTP, JSON shapes, signing) live outside this crate. The
//! methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
//! the traits stay dyn-compatible (`Arc<dyn UserPoolClient>`) — effects
//! created by reducers capture the clients as trait objects.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::data::{AuthChallenge, AwsCredentials, ChallengeKind, UserPoolTokens};
use crate::error::ServiceError;

/// Boxed future alias for boundary operations.
pub type ServiceFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

// ═══════════════════════════════════════════════════════════════════════
// Requests and responses
// ═══════════════════════════════════════════════════════════════════════

/// Parameters for starting a `USER_SRP_AUTH` flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpAuthRequest {
    /// Username to authenticate.
    pub username: String,

    /// Client public value `A`, hex.
    pub srp_a_hex: String,

    /// Secret hash, when the app client has a secret.
    pub secret_hash: Option<String>,

    /// Device key, when a tracked device is known for the user.
    pub device_key: Option<String>,
}

/// Parameters for a `REFRESH_TOKEN_AUTH` flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRequest {
    /// The refresh token.
    pub refresh_token: String,

    /// Secret hash, when the app client has a secret.
    pub secret_hash: Option<String>,

    /// Device key, when a tracked device is known for the user.
    pub device_key: Option<String>,
}

/// The authentication flows the machine initiates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiateAuthRequest {
    /// `USER_SRP_AUTH`
    UserSrp(SrpAuthRequest),

    /// `REFRESH_TOKEN_AUTH`
    RefreshToken(RefreshTokenRequest),
}

/// An answer to a previously issued challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponseRequest {
    /// Which challenge is being answered.
    pub kind: ChallengeKind,

    /// The session handle echoed from the challenge.
    pub session: Option<String>,

    /// The challenge response parameters.
    pub responses: HashMap<String, String>,
}

/// Device material issued alongside tokens when the pool tracks devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeviceMetadata {
    /// Device key for the new device.
    pub device_key: String,

    /// Device group key for the new device.
    pub device_group_key: String,
}

/// Token material from a successful flow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokensResult {
    /// The issued tokens.
    pub tokens: UserPoolTokens,

    /// New-device material, when the pool wants the device confirmed.
    pub new_device: Option<NewDeviceMetadata>,
}

/// Every flow round trip either demands a challenge or issues tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFlowResponse {
    /// The service wants a challenge answered first.
    Challenge(AuthChallenge),

    /// The service issued tokens.
    Tokens(AuthTokensResult),
}

/// Parameters for confirming a newly issued device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmDeviceRequest {
    /// Access token of the session confirming the device.
    pub access_token: String,

    /// The device key being confirmed.
    pub device_key: String,

    /// Optional friendly name.
    pub device_name: Option<String>,

    /// Password verifier for the device (base64).
    pub password_verifier: String,

    /// Salt for the verifier (base64).
    pub salt: String,
}

/// A tracked device, as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    /// Device key.
    pub device_key: String,

    /// Friendly name, if one was set.
    pub name: Option<String>,

    /// Last authentication time, epoch seconds.
    pub last_authenticated_at: Option<i64>,
}

/// A registered passkey credential, as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAuthnCredentialSummary {
    /// Credential ID.
    pub credential_id: String,

    /// Friendly name, if one was set.
    pub friendly_name: Option<String>,

    /// Relying party the credential is bound to.
    pub relying_party_id: String,

    /// Creation time, epoch seconds.
    pub created_at: Option<i64>,
}

// ═══════════════════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════════════════

/// The user pool (identity provider) operations the flows need.
///
/// Implementations must be `Send + Sync`; they are captured by effect
/// futures and called from worker tasks, never from the pure resolvers.
pub trait UserPoolClient: Send + Sync {
    /// Start an authentication flow.
    fn initiate_auth(&self, request: InitiateAuthRequest) -> ServiceFuture<'_, AuthFlowResponse>;

    /// Answer a challenge issued by a previous round trip.
    fn respond_to_auth_challenge(
        &self,
        request: ChallengeResponseRequest,
    ) -> ServiceFuture<'_, AuthFlowResponse>;

    /// Revoke a refresh token.
    fn revoke_token(&self, refresh_token: &str) -> ServiceFuture<'_, ()>;

    /// Sign the user out of every device.
    fn global_sign_out(&self, access_token: &str) -> ServiceFuture<'_, ()>;

    /// Confirm a newly issued device with its verifier material.
    fn confirm_device(&self, request: ConfirmDeviceRequest) -> ServiceFuture<'_, ()>;

    /// List the tracked devices for the signed-in user.
    fn list_devices(&self, access_token: &str) -> ServiceFuture<'_, Vec<DeviceSummary>>;

    /// Forget one tracked device.
    fn forget_device(&self, access_token: &str, device_key: &str) -> ServiceFuture<'_, ()>;

    /// List the registered passkey credentials for the signed-in user.
    fn list_webauthn_credentials(
        &self,
        access_token: &str,
    ) -> ServiceFuture<'_, Vec<WebAuthnCredentialSummary>>;
}

/// The identity pool operations the flows need.
pub trait IdentityPoolClient: Send + Sync {
    /// Resolve an identity ID for the given logins (empty for guests).
    fn get_id(&self, logins: HashMap<String, String>) -> ServiceFuture<'_, String>;

    /// Exchange an identity ID (plus logins) for AWS credentials.
    fn get_credentials_for_identity(
        &self,
        identity_id: &str,
        logins: HashMap<String, String>,
    ) -> ServiceFuture<'_, AwsCredentials>;
}
