// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Hashing and message authentication primitives - HMAC-SHA1 / HMAC-SHA256
//! signatures and the P_SHA pseudo random function used for key derivation.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use uasc_types::{Error, StatusCode};

/// Size in bytes of a SHA-1 based signature.
pub const SHA1_SIZE: usize = 20;
/// Size in bytes of a SHA-256 based signature.
pub const SHA256_SIZE: usize = 32;

/// The P_SHA pseudo random function from TLS, used to derive the secure
/// channel keys from the client and server nonces (Part 6 6.7.5):
///
/// ```text
/// A(0) = seed
/// A(n) = HMAC_HASH(secret, A(n-1))
/// P_HASH(secret, seed) = HMAC_HASH(secret, A(1) + seed) +
///                        HMAC_HASH(secret, A(2) + seed) + ...
/// ```
macro_rules! p_sha_impl {
    ($name:ident, $hmac:ident, $digest_size:expr) => {
        fn $name(secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
            let mut result = Vec::with_capacity(length + $digest_size);

            let mut a_next = $hmac(secret, seed);
            while result.len() < length {
                let mut input = a_next.clone();
                input.extend_from_slice(seed);
                result.extend_from_slice(&$hmac(secret, &input));
                a_next = $hmac(secret, &a_next);
            }

            result.truncate(length);
            result
        }
    };
}

p_sha_impl!(p_sha1, hmac_sha1_vec, SHA1_SIZE);
p_sha_impl!(p_sha256, hmac_sha256_vec, SHA256_SIZE);

fn hmac_sha1_vec(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC can take a key of any size
    let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hmac_sha256_vec(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive `length` bytes of keying material with P_SHA-1.
pub fn p_sha1_derive(secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
    p_sha1(secret, seed, length)
}

/// Derive `length` bytes of keying material with P_SHA-256.
pub fn p_sha256_derive(secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
    p_sha256(secret, seed, length)
}

/// Compute an HMAC-SHA1 signature of `data` into `signature`.
pub fn hmac_sha1(key: &[u8], data: &[u8], signature: &mut [u8]) -> Result<(), Error> {
    if signature.len() != SHA1_SIZE {
        return Err(Error::new(
            StatusCode::BadSecurityChecksFailed,
            format!("Signature buffer len {} is not {}", signature.len(), SHA1_SIZE),
        ));
    }
    signature.copy_from_slice(&hmac_sha1_vec(key, data));
    Ok(())
}

/// Verify an HMAC-SHA1 signature.
pub fn verify_hmac_sha1(key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.verify_slice(signature).is_ok()
}

/// Compute an HMAC-SHA256 signature of `data` into `signature`.
pub fn hmac_sha256(key: &[u8], data: &[u8], signature: &mut [u8]) -> Result<(), Error> {
    if signature.len() != SHA256_SIZE {
        return Err(Error::new(
            StatusCode::BadSecurityChecksFailed,
            format!(
                "Signature buffer len {} is not {}",
                signature.len(),
                SHA256_SIZE
            ),
        ));
    }
    signature.copy_from_slice(&hmac_sha256_vec(key, data));
    Ok(())
}

/// Verify an HMAC-SHA256 signature.
pub fn verify_hmac_sha256(key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.verify_slice(signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_sha_is_deterministic_and_sized() {
        let secret = b"super secret";
        let seed = b"seed value";
        let a = p_sha1_derive(secret, seed, 40);
        let b = p_sha1_derive(secret, seed, 40);
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);

        // A longer derivation shares its prefix with a shorter one
        let c = p_sha1_derive(secret, seed, 64);
        assert_eq!(&c[..40], &a[..]);

        let d = p_sha256_derive(secret, seed, 64);
        assert_ne!(c, d);
        assert_eq!(d.len(), 64);
    }

    #[test]
    fn hmac_round_trip() {
        let key = [7u8; 32];
        let data = b"some message";
        let mut signature = [0u8; SHA1_SIZE];
        hmac_sha1(&key, data, &mut signature).unwrap();
        assert!(verify_hmac_sha1(&key, data, &signature));
        assert!(!verify_hmac_sha1(&key, b"other message", &signature));

        let mut signature = [0u8; SHA256_SIZE];
        hmac_sha256(&key, data, &mut signature).unwrap();
        assert!(verify_hmac_sha256(&key, data, &signature));

        // A different key does not verify
        let other_key = [8u8; 32];
        assert!(!verify_hmac_sha256(&other_key, data, &signature));
    }
}
