//! SRP-6a arithmetic for the authentication handshake.
//!
//! Covers both sides of the exchange: the authenticator needs the server
//! half, registration needs `calc_v`, and clients (and the handshake tests)
//! need the client half. All values transit as big-endian byte strings;
//! operands are padded to the modulus length wherever the protocol pads.
//! Group parameters come from the RFC 5054 tables.

use num_bigint::BigUint;
use num_traits::Zero;
use srp::groups::{G_4096, G_8192};
use srp::types::SrpGroup;
use subtle::ConstantTimeEq;

use crate::crypto::hash::{GenericHash, HashType};
use crate::crypto::CryptoError;

/// Resolve a stored group id to its RFC 5054 parameters.
pub fn group_by_id(group: &str) -> Option<&'static SrpGroup> {
    match group {
        "4096" => Some(&G_4096),
        "8192" => Some(&G_8192),
        _ => None,
    }
}

/// Group used when the identity has no resolvable group of its own.
pub fn fallback_group() -> &'static SrpGroup {
    &G_8192
}

/// Id of [`fallback_group`], for provisioning new identities.
pub const FALLBACK_GROUP_ID: &str = "8192";

// Left-pad a value to the byte length of N, as RFC 5054 requires for
// hashing public ephemerals.
fn pad(value: &BigUint, n: &BigUint) -> Vec<u8> {
    let width = n.to_bytes_be().len();
    let bytes = value.to_bytes_be();
    let mut padded = vec![0u8; width.saturating_sub(bytes.len())];
    padded.extend_from_slice(&bytes);
    padded
}

fn hash_to_int(parts: &[&[u8]]) -> BigUint {
    let mut hasher = GenericHash::new(HashType::Blake2s256);
    for part in parts {
        hasher.add_data(part);
    }
    BigUint::from_bytes_be(&hasher.result())
}

// Multiplier k = H(N | pad(g)).
fn calc_k(n: &BigUint, g: &BigUint) -> BigUint {
    hash_to_int(&[&n.to_bytes_be(), &pad(g, n)])
}

/// Private key derivative x = H(salt | H(username ":" password)).
pub fn calc_x(username: &[u8], password: &[u8], salt: &[u8]) -> BigUint {
    let mut inner = GenericHash::new(HashType::Blake2s256);
    inner.add_data(username);
    inner.add_data(b":");
    inner.add_data(password);
    hash_to_int(&[salt, &inner.result()])
}

/// Password verifier v = g^x mod N.
pub fn calc_v(username: &[u8], password: &[u8], salt: &[u8], group: &SrpGroup) -> BigUint {
    group.g.modpow(&calc_x(username, password, salt), &group.n)
}

/// A public ephemeral is acceptable only when A mod N is non-zero.
pub fn verify_a_mod_n(a_pub: &BigUint, n: &BigUint) -> bool {
    !(a_pub % n).is_zero()
}

/// Scrambling parameter u = H(pad(A) | pad(B)) mod N; zero is invalid.
pub fn calc_u(a_pub: &BigUint, b_pub: &BigUint, n: &BigUint) -> Result<BigUint, CryptoError> {
    let u = hash_to_int(&[&pad(a_pub, n), &pad(b_pub, n)]) % n;
    if u.is_zero() {
        return Err(CryptoError::InvalidParameter);
    }
    Ok(u)
}

/// Server public ephemeral B = k*v + g^b mod N; zero is invalid.
pub fn calc_b_pub(
    b: &BigUint,
    n: &BigUint,
    g: &BigUint,
    v: &BigUint,
) -> Result<BigUint, CryptoError> {
    let k = calc_k(n, g);
    let b_pub = (g.modpow(b, n) + k * v % n) % n;
    if b_pub.is_zero() {
        return Err(CryptoError::InvalidParameter);
    }
    Ok(b_pub)
}

/// Server-side session secret S = (A * v^u)^b mod N.
pub fn calc_server_key(
    a_pub: &BigUint,
    v: &BigUint,
    u: &BigUint,
    b: &BigUint,
    n: &BigUint,
) -> BigUint {
    (a_pub * v.modpow(u, n) % n).modpow(b, n)
}

/// Client public ephemeral A = g^a mod N.
pub fn calc_a_pub(a: &BigUint, n: &BigUint, g: &BigUint) -> BigUint {
    g.modpow(a, n)
}

/// Client-side session secret S = (B - k*g^x)^(a + u*x) mod N.
pub fn calc_client_key(
    b_pub: &BigUint,
    a: &BigUint,
    x: &BigUint,
    u: &BigUint,
    n: &BigUint,
    g: &BigUint,
) -> BigUint {
    let k = calc_k(n, g);
    let kgx = k * g.modpow(x, n) % n;
    // b_pub is already reduced mod N, so adding N keeps the difference
    // non-negative.
    let base = (b_pub + n - kgx) % n;
    base.modpow(&(a + u * x), n)
}

/// Constant-time equality over byte strings of possibly different lengths.
pub fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    lhs.ct_eq(rhs).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::random_bytes;

    fn agreement_for(username: &[u8], password: &[u8], group: &SrpGroup) -> (BigUint, BigUint) {
        let salt = random_bytes(64);
        let v = calc_v(username, password, &salt, group);

        let b = BigUint::from_bytes_be(&random_bytes(128));
        let b_pub = calc_b_pub(&b, &group.n, &group.g, &v).expect("valid B");

        let a = BigUint::from_bytes_be(&random_bytes(128));
        let a_pub = calc_a_pub(&a, &group.n, &group.g);

        let u = calc_u(&a_pub, &b_pub, &group.n).expect("valid u");
        let server_key = calc_server_key(&a_pub, &v, &u, &b, &group.n);

        let x = calc_x(username, password, &salt);
        let client_key = calc_client_key(&b_pub, &a, &x, &u, &group.n, &group.g);

        (server_key, client_key)
    }

    #[test]
    fn test_server_and_client_derive_same_key() {
        let (server_key, client_key) = agreement_for(b"alice", b"correct horse", &G_4096);
        assert_eq!(server_key, client_key);
    }

    #[test]
    fn test_wrong_password_diverges() {
        let group = &G_4096;
        let salt = random_bytes(64);
        let v = calc_v(b"alice", b"right", &salt, group);

        let b = BigUint::from_bytes_be(&random_bytes(128));
        let b_pub = calc_b_pub(&b, &group.n, &group.g, &v).expect("valid B");

        let a = BigUint::from_bytes_be(&random_bytes(128));
        let a_pub = calc_a_pub(&a, &group.n, &group.g);

        let u = calc_u(&a_pub, &b_pub, &group.n).expect("valid u");
        let server_key = calc_server_key(&a_pub, &v, &u, &b, &group.n);

        let x = calc_x(b"alice", b"wrong", &salt);
        let client_key = calc_client_key(&b_pub, &a, &x, &u, &group.n, &group.g);

        assert_ne!(server_key, client_key);
    }

    #[test]
    fn test_a_multiple_of_n_rejected() {
        let n = &G_4096.n;
        assert!(!verify_a_mod_n(&BigUint::zero(), n));
        assert!(!verify_a_mod_n(&(n * 2u32), n));
        assert!(verify_a_mod_n(&(n + 1u32), n));
    }

    #[test]
    fn test_verifier_depends_on_salt() {
        let group = &G_4096;
        let first = calc_v(b"alice", b"pw", &[1u8; 64], group);
        let second = calc_v(b"alice", b"pw", &[2u8; 64], group);
        assert_ne!(first, second);
    }

    #[test]
    fn test_group_lookup() {
        assert!(group_by_id("4096").is_some());
        assert!(group_by_id("8192").is_some());
        assert!(group_by_id("1536").is_none());
        assert_eq!(fallback_group().n, G_8192.n);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
