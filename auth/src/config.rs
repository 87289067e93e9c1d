//! Static configuration for the authentication state machine.

use crate::error::{AuthError, Result};

/// Default safety margin, in seconds, subtracted from credential lifetimes.
///
/// A credential within this margin of its expiration is treated as already
/// expired so that in-flight requests signed with it do not race the actual
/// expiry on the service side.
pub const DEFAULT_EXPIRY_MARGIN_SECS: i64 = 60;

/// Configuration for a Cognito user pool / identity pool pairing.
///
/// Loading this from files or the environment is the embedding application's
/// concern; this type only validates and exposes the values the state
/// machine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// User pool ID in the `<region>_<pool>` form, e.g. `us-east-1_AbCdEfGh`.
    pub user_pool_id: String,

    /// App client ID registered with the user pool.
    pub app_client_id: String,

    /// App client secret, if the app client is configured with one.
    pub app_client_secret: Option<String>,

    /// Identity pool ID, if AWS credentials / guest access are wanted.
    pub identity_pool_id: Option<String>,

    /// AWS region hosting the pools.
    pub region: String,

    /// Safety margin applied to every expiration comparison.
    pub expiry_margin_secs: i64,
}

impl AuthConfig {
    /// Create a configuration for a user-pool-only setup.
    #[must_use]
    pub fn new(
        user_pool_id: impl Into<String>,
        app_client_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            user_pool_id: user_pool_id.into(),
            app_client_id: app_client_id.into(),
            app_client_secret: None,
            identity_pool_id: None,
            region: region.into(),
            expiry_margin_secs: DEFAULT_EXPIRY_MARGIN_SECS,
        }
    }

    /// Attach an app client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_client_secret = Some(secret.into());
        self
    }

    /// Attach an identity pool for AWS credentials and guest access.
    #[must_use]
    pub fn with_identity_pool(mut self, identity_pool_id: impl Into<String>) -> Self {
        self.identity_pool_id = Some(identity_pool_id.into());
        self
    }

    /// Override the expiry safety margin.
    #[must_use]
    pub const fn with_expiry_margin_secs(mut self, margin: i64) -> Self {
        self.expiry_margin_secs = margin;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when an ID is empty or the user
    /// pool ID is not in the `<region>_<pool>` form.
    pub fn validate(&self) -> Result<()> {
        if self.user_pool_id.is_empty() {
            return Err(AuthError::Configuration("user pool ID is empty".into()));
        }
        if self.app_client_id.is_empty() {
            return Err(AuthError::Configuration("app client ID is empty".into()));
        }
        if self.region.is_empty() {
            return Err(AuthError::Configuration("region is empty".into()));
        }
        if self.pool_name().is_none() {
            return Err(AuthError::Configuration(
                "user pool ID must be in the form `<region>_<pool id>`".into(),
            ));
        }
        if self.expiry_margin_secs < 0 {
            return Err(AuthError::Configuration(
                "expiry margin must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// The pool name — the part of the user pool ID after the region prefix.
    ///
    /// The SRP identity hash is computed over this name, not the full ID.
    #[must_use]
    pub fn pool_name(&self) -> Option<&str> {
        self.user_pool_id
            .split_once('_')
            .map(|(_, name)| name)
            .filter(|name| !name.is_empty())
    }

    /// The login-map key under which user pool tokens are presented to the
    /// identity pool.
    #[must_use]
    pub fn provider_name(&self) -> String {
        format!("cognito-idp.{}.amazonaws.com/{}", self.region, self.user_pool_id)
    }

    /// Whether an identity pool is configured (AWS credentials / guest
    /// access are possible).
    #[must_use]
    pub const fn has_identity_pool(&self) -> bool {
        self.identity_pool_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new("eu-west-1_PoolId", "client-id", "eu-west-1")
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(config().validate().is_ok());
        assert!(
            config()
                .with_client_secret("shh")
                .with_identity_pool("eu-west-1:identity")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn malformed_pool_id_is_rejected() {
        let bad = AuthConfig::new("nopool", "client-id", "eu-west-1");
        assert!(matches!(bad.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn empty_client_id_is_rejected() {
        let bad = AuthConfig::new("eu-west-1_PoolId", "", "eu-west-1");
        assert!(matches!(bad.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn pool_name_strips_region_prefix() {
        assert_eq!(config().pool_name(), Some("PoolId"));
    }

    #[test]
    fn provider_name_includes_region_and_pool() {
        assert_eq!(
            config().provider_name(),
            "cognito-idp.eu-west-1.amazonaws.com/eu-west-1_PoolId"
        );
    }
}
