//! The injected dependency set the reducers' effects capture.

use std::sync::Arc;

use cognito_auth_core::environment::Clock;

use crate::client::{IdentityPoolClient, UserPoolClient};
use crate::config::AuthConfig;
use crate::srp::{self, SrpKeySource};
use crate::store::CredentialStore;

/// Authentication environment.
///
/// Holds every external collaborator behind a trait object, so the whole
/// machine is constructed by the application's dependency graph — there is
/// no ambient global. Cloning is cheap (`Arc` handles plus the config).
#[derive(Clone)]
pub struct AuthEnvironment {
    /// User pool (identity provider) client.
    pub user_pool: Arc<dyn UserPoolClient>,

    /// Identity pool client, when one is configured.
    pub identity_pool: Option<Arc<dyn IdentityPoolClient>>,

    /// Persistent credential store.
    pub store: Arc<dyn CredentialStore>,

    /// The single time source for every expiration comparison.
    pub clock: Arc<dyn Clock>,

    /// Randomness source for the SRP handshake and device material.
    pub keys: Arc<dyn SrpKeySource>,

    /// Static pool / client configuration.
    pub config: AuthConfig,
}

impl AuthEnvironment {
    /// Create a new environment.
    #[must_use]
    pub fn new(
        user_pool: Arc<dyn UserPoolClient>,
        identity_pool: Option<Arc<dyn IdentityPoolClient>>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        keys: Arc<dyn SrpKeySource>,
        config: AuthConfig,
    ) -> Self {
        Self {
            user_pool,
            identity_pool,
            store,
            clock,
            keys,
            config,
        }
    }

    /// The secret hash for a username, when the app client has a secret.
    #[must_use]
    pub fn secret_hash_for(&self, username: &str) -> Option<String> {
        self.config
            .app_client_secret
            .as_deref()
            .and_then(|secret| srp::secret_hash(secret, username, &self.config.app_client_id))
    }

    /// The pool name the SRP identity is computed over.
    ///
    /// The configuration is validated at machine construction, so a missing
    /// pool name cannot occur on a live machine; an empty string keeps this
    /// total anyway.
    #[must_use]
    pub fn pool_name(&self) -> String {
        self.config.pool_name().unwrap_or_default().to_owned()
    }
}

impl std::fmt::Debug for AuthEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEnvironment")
            .field("config", &self.config)
            .field("has_identity_pool", &self.identity_pool.is_some())
            .finish_non_exhaustive()
    }
}
