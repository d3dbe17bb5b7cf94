// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Security policies and the parameter tables and operations attached to them.

use std::fmt;
use std::str::FromStr;

use log::error;

use uasc_types::{Error, StatusCode};

use crate::{
    hash::{self, SHA1_SIZE, SHA256_SIZE},
    AesKey, PrivateKey, PublicKey, RsaPadding, SecretBytes, SecureChannelKeys,
};

// Security policy URIs per Part 7
const SECURITY_POLICY_NONE_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";
const SECURITY_POLICY_BASIC_128_RSA_15_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15";
const SECURITY_POLICY_BASIC_256_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#Basic256";
const SECURITY_POLICY_BASIC_256_SHA_256_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256";

// Short names for configuration files
const SECURITY_POLICY_NONE: &str = "None";
const SECURITY_POLICY_BASIC_128_RSA_15: &str = "Basic128Rsa15";
const SECURITY_POLICY_BASIC_256: &str = "Basic256";
const SECURITY_POLICY_BASIC_256_SHA_256: &str = "Basic256Sha256";

/// The security policy of a secure channel, selecting the suite of
/// algorithms used to secure messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityPolicy {
    /// Unrecognized policy URI.
    Unknown,
    /// No security at all.
    None,
    /// AES-128-CBC, HMAC-SHA1 and RSA with PKCS#1 v1.5 padding. Deprecated
    /// by the standard but still widely deployed.
    Basic128Rsa15,
    /// AES-256-CBC, HMAC-SHA1 and RSA-OAEP. Deprecated by the standard but
    /// still widely deployed.
    Basic256,
    /// AES-256-CBC, HMAC-SHA256 and RSA-OAEP.
    Basic256Sha256,
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            SECURITY_POLICY_NONE => SecurityPolicy::None,
            SECURITY_POLICY_BASIC_128_RSA_15 => SecurityPolicy::Basic128Rsa15,
            SECURITY_POLICY_BASIC_256 => SecurityPolicy::Basic256,
            SECURITY_POLICY_BASIC_256_SHA_256 => SecurityPolicy::Basic256Sha256,
            _ => {
                error!("Specified security policy \"{}\" is not recognized", s);
                SecurityPolicy::Unknown
            }
        })
    }
}

impl SecurityPolicy {
    /// Look up a policy from its URI. Unrecognized URIs map to `Unknown`.
    pub fn from_uri(uri: &str) -> SecurityPolicy {
        match uri {
            SECURITY_POLICY_NONE_URI => SecurityPolicy::None,
            SECURITY_POLICY_BASIC_128_RSA_15_URI => SecurityPolicy::Basic128Rsa15,
            SECURITY_POLICY_BASIC_256_URI => SecurityPolicy::Basic256,
            SECURITY_POLICY_BASIC_256_SHA_256_URI => SecurityPolicy::Basic256Sha256,
            _ => {
                error!(
                    "Specified security policy uri \"{}\" is not recognized",
                    uri
                );
                SecurityPolicy::Unknown
            }
        }
    }

    /// The URI identifying this policy on the wire.
    pub fn to_uri(&self) -> &'static str {
        match self {
            SecurityPolicy::None => SECURITY_POLICY_NONE_URI,
            SecurityPolicy::Basic128Rsa15 => SECURITY_POLICY_BASIC_128_RSA_15_URI,
            SecurityPolicy::Basic256 => SECURITY_POLICY_BASIC_256_URI,
            SecurityPolicy::Basic256Sha256 => SECURITY_POLICY_BASIC_256_SHA_256_URI,
            SecurityPolicy::Unknown => {
                // Unknown is never sent, it only exists as a parse result
                ""
            }
        }
    }

    /// The short name used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            SecurityPolicy::None => SECURITY_POLICY_NONE,
            SecurityPolicy::Basic128Rsa15 => SECURITY_POLICY_BASIC_128_RSA_15,
            SecurityPolicy::Basic256 => SECURITY_POLICY_BASIC_256,
            SecurityPolicy::Basic256Sha256 => SECURITY_POLICY_BASIC_256_SHA_256,
            SecurityPolicy::Unknown => "Unknown",
        }
    }

    /// Is this a policy the stack can actually operate.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            SecurityPolicy::None
                | SecurityPolicy::Basic128Rsa15
                | SecurityPolicy::Basic256
                | SecurityPolicy::Basic256Sha256
        )
    }

    /// Length in bytes of the nonces exchanged in OpenSecureChannel. Equal
    /// to the symmetric key size of the policy.
    pub fn secure_channel_nonce_length(&self) -> usize {
        match self {
            SecurityPolicy::Basic128Rsa15 => 16,
            SecurityPolicy::Basic256 | SecurityPolicy::Basic256Sha256 => 32,
            _ => 0,
        }
    }

    /// Size in bytes of a symmetric signature.
    pub fn symmetric_signature_size(&self) -> usize {
        match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => SHA1_SIZE,
            SecurityPolicy::Basic256Sha256 => SHA256_SIZE,
            _ => 0,
        }
    }

    /// Size in bytes of the derived symmetric signing key.
    pub fn derived_signature_key_size(&self) -> usize {
        match self {
            SecurityPolicy::Basic128Rsa15 => 16,
            SecurityPolicy::Basic256 => 24,
            SecurityPolicy::Basic256Sha256 => 32,
            _ => 0,
        }
    }

    /// Size in bytes of the derived symmetric encryption key.
    pub fn derived_encryption_key_size(&self) -> usize {
        match self {
            SecurityPolicy::Basic128Rsa15 => 16,
            SecurityPolicy::Basic256 | SecurityPolicy::Basic256Sha256 => 32,
            _ => 0,
        }
    }

    /// The plain text block size for symmetric encryption. The AES cipher
    /// block size, so cipher and plain blocks are the same size.
    pub fn plain_block_size(&self) -> usize {
        match self {
            SecurityPolicy::Basic128Rsa15
            | SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256 => 16,
            _ => 0,
        }
    }

    /// The cipher block size for symmetric encryption.
    pub fn cipher_block_size(&self) -> usize {
        // AES-CBC does not change the data size
        self.plain_block_size()
    }

    /// The padding scheme used for asymmetric encryption under this policy.
    pub fn asymmetric_encryption_padding(&self) -> RsaPadding {
        match self {
            SecurityPolicy::Basic128Rsa15 => RsaPadding::Pkcs1,
            SecurityPolicy::Basic256 | SecurityPolicy::Basic256Sha256 => RsaPadding::OaepSha1,
            _ => {
                // Policy is checked before any asymmetric operation
                RsaPadding::Pkcs1
            }
        }
    }

    /// Part 6, 6.7.5 - derive the signing key, encryption key and IV for one
    /// direction of a secure channel from the two nonces. The side whose
    /// nonce is the `secret` differs per direction; the caller swaps the
    /// arguments for the other direction.
    pub fn make_secure_channel_keys(&self, secret: &[u8], seed: &[u8]) -> SecureChannelKeys {
        // Work out the length of stuff
        let signing_key_length = self.derived_signature_key_size();
        let (encrypting_key_length, encrypting_block_size) = match self {
            SecurityPolicy::Basic128Rsa15 => (16, 16),
            SecurityPolicy::Basic256 | SecurityPolicy::Basic256Sha256 => (32, 16),
            _ => {
                return (SecretBytes::default(), AesKey::new(*self, &[]), Vec::new());
            }
        };

        let total = signing_key_length + encrypting_key_length + encrypting_block_size;
        let material = match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                hash::p_sha1_derive(secret, seed, total)
            }
            _ => hash::p_sha256_derive(secret, seed, total),
        };

        let signing_key = SecretBytes::from(&material[..signing_key_length]);
        let encrypting_key = AesKey::new(
            *self,
            &material[signing_key_length..(signing_key_length + encrypting_key_length)],
        );
        let iv = material[(signing_key_length + encrypting_key_length)..].to_vec();
        (signing_key, encrypting_key, iv)
    }

    /// Sign `data` with the derived symmetric signing key into `signature`.
    pub fn symmetric_sign(
        &self,
        key: &[u8],
        data: &[u8],
        signature: &mut [u8],
    ) -> Result<(), Error> {
        match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                hash::hmac_sha1(key, data, signature)
            }
            SecurityPolicy::Basic256Sha256 => hash::hmac_sha256(key, data, signature),
            _ => Err(Error::new(
                StatusCode::BadSecurityPolicyRejected,
                format!("Cannot sign with policy {}", self),
            )),
        }
    }

    /// Verify a symmetric signature. A mismatch is an error with
    /// `BadSecurityChecksFailed`.
    pub fn symmetric_verify_signature(
        &self,
        key: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, Error> {
        let verified = match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                hash::verify_hmac_sha1(key, data, signature)
            }
            SecurityPolicy::Basic256Sha256 => hash::verify_hmac_sha256(key, data, signature),
            _ => {
                return Err(Error::new(
                    StatusCode::BadSecurityPolicyRejected,
                    format!("Cannot verify with policy {}", self),
                ))
            }
        };
        if verified {
            Ok(true)
        } else {
            error!("Signature invalid {:?}", signature);
            Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                "Signature verification failed",
            ))
        }
    }

    /// Encrypt `src` into `dst` with the derived symmetric key and IV.
    pub fn symmetric_encrypt(
        &self,
        key: &AesKey,
        iv: &[u8],
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        key.encrypt(src, iv, dst)
    }

    /// Decrypt `src` into `dst` with the derived symmetric key and IV.
    pub fn symmetric_decrypt(
        &self,
        key: &AesKey,
        iv: &[u8],
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        key.decrypt(src, iv, dst)
    }

    /// Sign `data` with the sender's private key.
    pub fn asymmetric_sign(
        &self,
        signing_key: &PrivateKey,
        data: &[u8],
        signature: &mut [u8],
    ) -> Result<usize, Error> {
        match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                signing_key.sign_sha1(data, signature)
            }
            SecurityPolicy::Basic256Sha256 => signing_key.sign_sha256(data, signature),
            _ => Err(Error::new(
                StatusCode::BadSecurityPolicyRejected,
                format!("Cannot sign with policy {}", self),
            )),
        }
    }

    /// Verify a signature made with the peer's private key, using the public
    /// key from its certificate.
    pub fn asymmetric_verify_signature(
        &self,
        verification_key: &PublicKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                verification_key.verify_sha1(data, signature)
            }
            SecurityPolicy::Basic256Sha256 => verification_key.verify_sha256(data, signature),
            _ => Err(Error::new(
                StatusCode::BadSecurityPolicyRejected,
                format!("Cannot verify with policy {}", self),
            )),
        }
    }

    /// Encrypt `src` for the holder of `encryption_key`'s private key.
    pub fn asymmetric_encrypt(
        &self,
        encryption_key: &PublicKey,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        encryption_key.encrypt(src, dst, self.asymmetric_encryption_padding())
    }

    /// Decrypt `src` with our private key.
    pub fn asymmetric_decrypt(
        &self,
        decryption_key: &PrivateKey,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        decryption_key.decrypt(src, dst, self.asymmetric_encryption_padding())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random;

    #[test]
    fn uri_round_trip() {
        for policy in [
            SecurityPolicy::None,
            SecurityPolicy::Basic128Rsa15,
            SecurityPolicy::Basic256,
            SecurityPolicy::Basic256Sha256,
        ] {
            assert_eq!(SecurityPolicy::from_uri(policy.to_uri()), policy);
            assert_eq!(SecurityPolicy::from_str(policy.name()).unwrap(), policy);
        }
        assert_eq!(
            SecurityPolicy::from_uri("http://opcfoundation.org/UA/SecurityPolicy#Rot13"),
            SecurityPolicy::Unknown
        );
    }

    #[test]
    fn derived_keys_directional() {
        let policy = SecurityPolicy::Basic256Sha256;
        let mut client_nonce = vec![0u8; policy.secure_channel_nonce_length()];
        random::bytes(&mut client_nonce);
        let mut server_nonce = vec![0u8; policy.secure_channel_nonce_length()];
        random::bytes(&mut server_nonce);

        // Both sides derive the same keys for a given direction
        let client_side = policy.make_secure_channel_keys(&server_nonce, &client_nonce);
        let server_side = policy.make_secure_channel_keys(&server_nonce, &client_nonce);
        assert_eq!(client_side.0, server_side.0);
        assert_eq!(client_side.1.value(), server_side.1.value());
        assert_eq!(client_side.2, server_side.2);

        // The opposite direction derives different keys
        let reverse = policy.make_secure_channel_keys(&client_nonce, &server_nonce);
        assert_ne!(client_side.0, reverse.0);
    }

    #[test]
    fn symmetric_sign_and_verify() {
        for policy in [
            SecurityPolicy::Basic128Rsa15,
            SecurityPolicy::Basic256,
            SecurityPolicy::Basic256Sha256,
        ] {
            let key = vec![1u8; policy.derived_signature_key_size()];
            let mut signature = vec![0u8; policy.symmetric_signature_size()];
            policy.symmetric_sign(&key, b"payload", &mut signature).unwrap();
            assert!(policy
                .symmetric_verify_signature(&key, b"payload", &signature)
                .unwrap());
            assert!(policy
                .symmetric_verify_signature(&key, b"tampered", &signature)
                .is_err());
        }
    }

    #[test]
    fn keys_are_isolated_per_token_material() {
        // Keys derived from different nonces cannot verify each other's signatures
        let policy = SecurityPolicy::Basic256Sha256;
        let keys_a = policy.make_secure_channel_keys(b"secret-a-secret-a-secret-a-secre", b"seed");
        let keys_b = policy.make_secure_channel_keys(b"secret-b-secret-b-secret-b-secre", b"seed");

        let mut signature = vec![0u8; policy.symmetric_signature_size()];
        policy
            .symmetric_sign(&keys_a.0, b"data", &mut signature)
            .unwrap();
        assert!(policy
            .symmetric_verify_signature(&keys_b.0, b"data", &signature)
            .is_err());
    }
}
