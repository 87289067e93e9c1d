//! Shared effect plumbing for the sign-in resolvers.

use cognito_auth_core::effect::Effect;

use crate::client::{AuthTokensResult, ConfirmDeviceRequest, NewDeviceMetadata};
use crate::data::{DeviceMetadata, SignInMethod, SignedInData};
use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use crate::events::{AuthEvent, SignInEvent};
use crate::srp;
use crate::store as blobs;

/// Turn a successful token round trip into session data plus device
/// metadata, confirming a newly issued device along the way.
pub(crate) async fn establish_session(
    env: &AuthEnvironment,
    username: &str,
    method: SignInMethod,
    result: AuthTokensResult,
) -> (SignedInData, DeviceMetadata) {
    let device = match result.new_device {
        Some(new_device) => {
            confirm_new_device(env, &result.tokens.access_token, username, new_device).await
        },
        None => blobs::load_device_metadata(env.store.as_ref(), username).await,
    };

    let data = SignedInData::from_tokens(username, method, result.tokens, env.clock.now());
    (data, device)
}

/// Confirm a newly issued device with generated verifier material.
///
/// Best-effort: a confirmation failure degrades to an untracked device, it
/// never fails the sign-in itself.
async fn confirm_new_device(
    env: &AuthEnvironment,
    access_token: &str,
    username: &str,
    new_device: NewDeviceMetadata,
) -> DeviceMetadata {
    let verifier = srp::generate_device_verifier(
        &new_device.device_group_key,
        &new_device.device_key,
        env.keys.as_ref(),
    );

    let request = ConfirmDeviceRequest {
        access_token: access_token.to_owned(),
        device_key: new_device.device_key.clone(),
        device_name: None,
        password_verifier: verifier.verifier.clone(),
        salt: verifier.salt.clone(),
    };

    match env.user_pool.confirm_device(request).await {
        Ok(()) => {
            let device = DeviceMetadata::Registered {
                device_key: new_device.device_key,
                device_group_key: new_device.device_group_key,
                device_secret: Some(verifier.password),
            };
            if let Err(err) =
                blobs::persist_device_metadata(env.store.as_ref(), username, &device).await
            {
                tracing::warn!(error = %err, "failed to persist device metadata");
            }
            device
        },
        Err(err) => {
            tracing::warn!(error = %err, "device confirmation failed; continuing untracked");
            DeviceMetadata::Empty
        },
    }
}

/// Lift a sub-machine failure to the sign-in flow's `Error` state.
pub(crate) fn lift_sign_in_error(error: AuthError) -> Effect<AuthEvent> {
    Effect::Future(Box::pin(async move {
        Some(SignInEvent::ThrowError { error }.into())
    }))
}
