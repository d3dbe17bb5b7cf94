// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Cryptographically secure random values.

use rand::{rngs::OsRng, Rng, RngCore};

use uasc_types::ByteString;

/// Fills the slice with cryptographically strong pseudo-random bytes.
pub fn bytes(bytes: &mut [u8]) {
    OsRng.fill_bytes(bytes);
}

/// Returns a cryptographically strong pseudo-random byte string of the given size.
pub fn byte_string(number_of_bytes: usize) -> ByteString {
    let mut buf = vec![0u8; number_of_bytes];
    bytes(&mut buf);
    ByteString::from(buf)
}

/// A non-zero random u32, used for channel, token and request identifiers.
pub fn u32_id() -> u32 {
    OsRng.gen_range(1..u32::MAX)
}
