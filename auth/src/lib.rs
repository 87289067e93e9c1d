//! # Cognito Auth
//!
//! An event-driven authentication state machine for Cognito user pools and
//! identity pools: SRP sign-in, MFA and custom challenges, device trust,
//! hosted-UI completion, federation, guest sessions, and coalesced token
//! refresh — coordinated as one globally consistent machine that any number
//! of concurrent callers can observe and drive.
//!
//! ## Architecture
//!
//! - **Events and states** are closed vocabularies of pure values
//!   ([`events`], [`state`], [`data`])
//! - **Resolvers** ([`reducers`]) are pure functions
//!   `(state, event) → (state, effects)`; failures travel in `Error` state
//!   variants, never as panics
//! - The **dispatcher** (from `cognito-auth-runtime`) serializes
//!   transitions, publishes every committed state before its effects run,
//!   and feeds effect results back as events
//! - The **facade** ([`machine::AuthStateMachine`]) offers request/response
//!   helpers (sign in, confirm, sign out, fetch session) built on the state
//!   stream with drop-the-stale-state semantics
//!
//! ## Example
//!
//! ```ignore
//! use cognito_auth::prelude::*;
//!
//! let machine = AuthStateMachine::new(environment)?;
//! machine.configure().await?;
//!
//! match machine.sign_in("alice", "hunter2").await? {
//!     SignInOutcome::Done { data } => println!("signed in as {}", data.username),
//!     SignInOutcome::ChallengeRequired { challenge } => {
//!         // render challenge.parameters, then:
//!         machine.confirm_sign_in("123456", Default::default()).await?;
//!     }
//! }
//!
//! let credentials = machine.get_credentials().await?;
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod data;
pub mod environment;
pub mod error;
pub mod events;
pub mod machine;
pub mod reducers;
pub mod srp;
pub mod state;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use client::{IdentityPoolClient, UserPoolClient};
pub use config::AuthConfig;
pub use credentials::AuthSession;
pub use data::{
    AuthChallenge, AuthCredential, AwsCredentials, ChallengeKind, DeviceMetadata, SignInMethod,
    SignedInData, UserPoolTokens,
};
pub use environment::AuthEnvironment;
pub use error::{AuthError, Result, ServiceError};
pub use events::{AuthEvent, AuthEventKind};
pub use machine::{AuthStateMachine, SignInOutcome};
pub use state::{AuthState, AuthenticationState, AuthorizationState, SignInState};
pub use store::CredentialStore;

/// Everything most applications need.
pub mod prelude {
    pub use crate::client::{IdentityPoolClient, UserPoolClient};
    pub use crate::config::AuthConfig;
    pub use crate::credentials::AuthSession;
    pub use crate::data::{AuthCredential, AwsCredentials, SignedInData, UserPoolTokens};
    pub use crate::environment::AuthEnvironment;
    pub use crate::error::{AuthError, Result};
    pub use crate::machine::{AuthStateMachine, SignInOutcome};
    pub use crate::state::{AuthState, AuthenticationState, AuthorizationState};
    pub use crate::store::CredentialStore;
}
