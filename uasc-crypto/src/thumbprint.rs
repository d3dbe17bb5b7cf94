// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The SHA-1 thumbprint used to identify certificates in security headers.

use sha1::{Digest, Sha1};

use uasc_types::ByteString;

/// The SHA-1 digest of a DER encoded certificate. Receivers use the
/// thumbprint to work out which of their certificates the peer encrypted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbprint {
    value: [u8; Thumbprint::THUMBPRINT_SIZE],
}

impl Thumbprint {
    /// Size in bytes of a certificate thumbprint.
    pub const THUMBPRINT_SIZE: usize = 20;

    /// Constructs a thumbprint by hashing the supplied DER bytes.
    pub fn new(der: &[u8]) -> Thumbprint {
        let digest = Sha1::digest(der);
        let mut value = [0u8; Self::THUMBPRINT_SIZE];
        value.copy_from_slice(&digest);
        Thumbprint { value }
    }

    /// The thumbprint as a byte string, as carried in the asymmetric
    /// security header.
    pub fn as_byte_string(&self) -> ByteString {
        ByteString::from(self.value.to_vec())
    }

    /// The raw thumbprint bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The thumbprint as a hex string.
    pub fn as_hex_string(&self) -> String {
        self.value.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
