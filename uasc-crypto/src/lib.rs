// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Cryptography for the OPC UA secure conversation stack.
//!
//! The secure channel consumes everything it needs for message security
//! through this crate: security policies and their parameters, symmetric
//! AES / HMAC operations, asymmetric RSA operations, P_SHA key derivation,
//! X509 certificate handling with SHA-1 thumbprints, a certificate store
//! acting as the PKI provider, and random nonce / id generation.

#![warn(missing_docs)]

mod aeskey;
mod certificate_store;
mod hash;
mod pkey;
pub mod random;
mod secret;
mod security_policy;
mod thumbprint;
mod x509;

pub use aeskey::AesKey;
pub use certificate_store::CertificateStore;
pub use pkey::{KeySize, PrivateKey, PublicKey, RsaPadding};
pub use secret::SecretBytes;
pub use security_policy::SecurityPolicy;
pub use thumbprint::Thumbprint;
pub use x509::X509;

/// The kind of keys derived for one direction of a secure channel:
/// a signing key, an encryption key and an initialisation vector.
pub type SecureChannelKeys = (SecretBytes, AesKey, Vec<u8>);
