//! Secure Remote Password (SRP) computations for the Cognito handshake.
//!
//! Implements the client side of the `USER_SRP_AUTH` / `PASSWORD_VERIFIER`
//! exchange and the device-confirmation verifier, using the 3072-bit group
//! (RFC 3526, generator 2) and the service's key-derivation variant.
//!
//! All randomness flows through [`SrpKeySource`], so the full handshake is
//! deterministic under test: a fixed ephemeral private value plus fixed
//! server parameters always produce the same session key and signature.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use digest::Digest;
use hmac::{Hmac, Mac};
use num_bigint::{BigInt, BigUint, Sign};
use rand::RngCore;
use sha2::Sha256;
use std::sync::LazyLock;

use crate::data::PasswordVerifierParams;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// 3072-bit safe prime `N` (RFC 3526 group 15), the group the service uses.
const HEX_N: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33\
A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7\
ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864\
D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2\
08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF";

/// The HKDF info label used by the service's key derivation.
const DERIVE_KEY_INFO: &[u8] = b"Caldera Derived Key";

/// Ephemeral private value size, bytes.
const EPHEMERAL_BYTES: usize = 128;

#[allow(clippy::unwrap_used)] // HEX_N is a compile-time constant
static N: LazyLock<BigUint> = LazyLock::new(|| BigUint::parse_bytes(HEX_N.as_bytes(), 16).unwrap());
static G: LazyLock<BigUint> = LazyLock::new(|| BigUint::from(2u32));

// ═══════════════════════════════════════════════════════════════════════
// Key source
// ═══════════════════════════════════════════════════════════════════════

/// Source of the randomness the handshake consumes.
///
/// Production uses the OS RNG; tests inject fixed bytes to make the computed
/// session key and signature reproducible.
pub trait SrpKeySource: Send + Sync {
    /// A fresh ephemeral private value (`a`), big-endian bytes.
    fn ephemeral_private(&self) -> Vec<u8>;

    /// `len` random bytes (device passwords, salts).
    fn random_bytes(&self, len: usize) -> Vec<u8>;
}

/// OS-RNG-backed key source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsKeySource;

impl SrpKeySource for OsKeySource {
    fn ephemeral_private(&self) -> Vec<u8> {
        self.random_bytes(EPHEMERAL_BYTES)
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        bytes
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Ephemeral key pair
// ═══════════════════════════════════════════════════════════════════════

/// The client's ephemeral SRP key pair, generated when the handshake starts
/// and retained in state until the server round trip returns.
#[derive(Clone, PartialEq, Eq)]
pub struct SrpInitiator {
    private_a: BigUint,
    public_a: BigUint,
}

impl SrpInitiator {
    /// Generate a fresh key pair.
    ///
    /// Regenerates until `A mod N != 0`, as the protocol requires.
    #[must_use]
    pub fn generate(keys: &dyn SrpKeySource) -> Self {
        loop {
            let private_a = BigUint::from_bytes_be(&keys.ephemeral_private()) % &*N;
            let public_a = G.modpow(&private_a, &N);
            if (&public_a % &*N) != BigUint::default() {
                return Self {
                    private_a,
                    public_a,
                };
            }
        }
    }

    /// The public value `A` as a lowercase hex string, as sent in
    /// `SRP_A`.
    #[must_use]
    pub fn public_a_hex(&self) -> String {
        hex::encode(self.public_a.to_bytes_be())
    }
}

// The private value never appears in logs or debug output.
impl std::fmt::Debug for SrpInitiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpInitiator")
            .field("public_a", &self.public_a_hex())
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Password claim
// ═══════════════════════════════════════════════════════════════════════

/// The proof material for a `PASSWORD_VERIFIER` challenge response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordClaim {
    /// The secret block, echoed back verbatim (base64).
    pub secret_block: String,

    /// `HMAC-SHA256` signature over pool name, user ID, secret block, and
    /// timestamp (base64).
    pub signature: String,

    /// The timestamp the signature was computed over.
    pub timestamp: String,
}

/// Compute the password claim for a `PASSWORD_VERIFIER` challenge.
///
/// Pure and CPU-bound: the network effect that submits the claim is emitted
/// separately. The timestamp comes from the injected clock, never from a
/// direct wall-clock read.
///
/// # Errors
///
/// Returns [`AuthError::Srp`] when the server-supplied values are malformed
/// (non-hex salt or `B`, invalid base64 secret block, `B mod N == 0`, or a
/// zero scrambling parameter).
pub fn password_claim(
    pool_name: &str,
    user_id_for_srp: &str,
    password: &str,
    initiator: &SrpInitiator,
    params: &PasswordVerifierParams,
    now: DateTime<Utc>,
) -> Result<PasswordClaim, AuthError> {
    let server_b = biguint_from_hex(&params.srp_b_hex)
        .ok_or_else(|| AuthError::Srp("server public value B is not valid hex".into()))?;
    if (&server_b % &*N) == BigUint::default() {
        return Err(AuthError::Srp("server public value B is zero mod N".into()));
    }

    let salt = biguint_from_hex(&params.salt_hex)
        .ok_or_else(|| AuthError::Srp("server salt is not valid hex".into()))?;

    let secret_block = BASE64
        .decode(&params.secret_block)
        .map_err(|err| AuthError::Srp(format!("secret block is not valid base64: {err}")))?;

    let key = password_authentication_key(pool_name, user_id_for_srp, password, initiator, &server_b, &salt)?;

    let timestamp = format_timestamp(now);

    let mut message: Vec<u8> = Vec::new();
    message.extend_from_slice(pool_name.as_bytes());
    message.extend_from_slice(user_id_for_srp.as_bytes());
    message.extend_from_slice(&secret_block);
    message.extend_from_slice(timestamp.as_bytes());

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|err| AuthError::Srp(format!("invalid key length: {err}")))?;
    mac.update(&message);
    let signature = BASE64.encode(mac.finalize().into_bytes());

    Ok(PasswordClaim {
        secret_block: params.secret_block.clone(),
        signature,
        timestamp,
    })
}

/// Derive the 16-byte password authentication key shared with the server.
fn password_authentication_key(
    pool_name: &str,
    user_id_for_srp: &str,
    password: &str,
    initiator: &SrpInitiator,
    server_b: &BigUint,
    salt: &BigUint,
) -> Result<Vec<u8>, AuthError> {
    let u = compute_u(&initiator.public_a, server_b);
    if u == BigUint::default() {
        return Err(AuthError::Srp("scrambling parameter u is zero".into()));
    }

    // x = H(pad(salt) | H(poolName | userId | ":" | password))
    let mut identity = Sha256::new();
    identity.update(pool_name.as_bytes());
    identity.update(user_id_for_srp.as_bytes());
    identity.update(b":");
    identity.update(password.as_bytes());
    let identity_hash = identity.finalize();

    let mut x_digest = Sha256::new();
    x_digest.update(pad_positive(&salt.to_bytes_be()));
    x_digest.update(identity_hash);
    let x = BigUint::from_bytes_be(&x_digest.finalize());

    let k = compute_k();

    // S = (B - k * g^x) ^ (a + u * x) mod N
    let g_x = G.modpow(&x, &N);
    let base = BigInt::from_biguint(Sign::Plus, server_b.clone())
        - BigInt::from_biguint(Sign::Plus, k) * BigInt::from_biguint(Sign::Plus, g_x);
    let modulus = BigInt::from_biguint(Sign::Plus, N.clone());
    let mut base = base % &modulus;
    if base.sign() == Sign::Minus {
        base += &modulus;
    }
    let exponent = &initiator.private_a + &u * &x;
    let s = base.modpow(
        &BigInt::from_biguint(Sign::Plus, exponent),
        &modulus,
    );
    let (_, s_bytes) = s.to_bytes_be();

    // HKDF: extract with pad(u) as salt, expand with the service label
    let mut extract = HmacSha256::new_from_slice(&pad_positive(&u.to_bytes_be()))
        .map_err(|err| AuthError::Srp(format!("invalid key length: {err}")))?;
    extract.update(&pad_positive(&s_bytes));
    let prk = extract.finalize().into_bytes();

    let mut expand = HmacSha256::new_from_slice(&prk)
        .map_err(|err| AuthError::Srp(format!("invalid key length: {err}")))?;
    expand.update(DERIVE_KEY_INFO);
    expand.update(&[1u8]);
    let full = expand.finalize().into_bytes();

    Ok(full[..16].to_vec())
}

/// `u = H(pad(A) | pad(B))`
fn compute_u(public_a: &BigUint, server_b: &BigUint) -> BigUint {
    let mut digest = Sha256::new();
    digest.update(pad_positive(&public_a.to_bytes_be()));
    digest.update(pad_positive(&server_b.to_bytes_be()));
    BigUint::from_bytes_be(&digest.finalize())
}

/// `k = H(pad(N) | pad(g))`
fn compute_k() -> BigUint {
    let mut digest = Sha256::new();
    digest.update(pad_positive(&N.to_bytes_be()));
    digest.update(pad_positive(&G.to_bytes_be()));
    BigUint::from_bytes_be(&digest.finalize())
}

// ═══════════════════════════════════════════════════════════════════════
// Secret hash
// ═══════════════════════════════════════════════════════════════════════

/// `BASE64(HMAC_SHA256(client_secret, username + client_id))`, required on
/// every request when the app client carries a secret.
#[must_use]
pub fn secret_hash(client_secret: &str, username: &str, client_id: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes()).ok()?;
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());
    Some(BASE64.encode(mac.finalize().into_bytes()))
}

// ═══════════════════════════════════════════════════════════════════════
// Device verifier
// ═══════════════════════════════════════════════════════════════════════

/// The verifier material generated when confirming a new device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceVerifier {
    /// Password verifier `g^x mod N` (base64).
    pub verifier: String,

    /// Salt used for `x` (base64).
    pub salt: String,

    /// The random device password. Must be retained: later device SRP
    /// sign-ins authenticate against the verifier with it.
    pub password: String,
}

/// Generate a random password, salt, and verifier for a new device.
#[must_use]
pub fn generate_device_verifier(
    device_group_key: &str,
    device_key: &str,
    keys: &dyn SrpKeySource,
) -> DeviceVerifier {
    let password = BASE64.encode(keys.random_bytes(40));
    let salt = keys.random_bytes(16);

    let mut identity = Sha256::new();
    identity.update(device_group_key.as_bytes());
    identity.update(device_key.as_bytes());
    identity.update(b":");
    identity.update(password.as_bytes());
    let identity_hash = identity.finalize();

    let mut x_digest = Sha256::new();
    x_digest.update(pad_positive(&salt));
    x_digest.update(identity_hash);
    let x = BigUint::from_bytes_be(&x_digest.finalize());

    let verifier = G.modpow(&x, &N);

    DeviceVerifier {
        verifier: BASE64.encode(pad_positive(&verifier.to_bytes_be())),
        salt: BASE64.encode(pad_positive(&salt)),
        password,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

/// Timestamp format the service expects in the password claim, e.g.
/// `Mon Feb 10 18:30:12 UTC 2025` (day of month unpadded).
#[must_use]
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format("%a %b %-d %H:%M:%S UTC %Y").to_string()
}

/// Parse hex that may arrive with an odd length (the service trims leading
/// zeros).
fn biguint_from_hex(hex_str: &str) -> Option<BigUint> {
    let trimmed = hex_str.trim();
    if trimmed.is_empty() {
        return None;
    }
    let padded = if trimmed.len() % 2 == 0 {
        trimmed.to_owned()
    } else {
        format!("0{trimmed}")
    };
    let bytes = hex::decode(padded).ok()?;
    Some(BigUint::from_bytes_be(&bytes))
}

/// Big-endian bytes of a positive integer, with a leading zero byte whenever
/// the high bit is set (two's-complement sign convention the server shares).
fn pad_positive(bytes: &[u8]) -> Vec<u8> {
    if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(bytes.len() + 1);
        padded.push(0);
        padded.extend_from_slice(bytes);
        padded
    } else {
        bytes.to_vec()
    }
}
