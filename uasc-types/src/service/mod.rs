// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The service structures owned by the secure channel layer itself:
//! `OpenSecureChannel`, `CloseSecureChannel` and `ServiceFault`.
//!
//! All other services are opaque to this stack and are carried as encoded
//! payloads resolved through the type registry.

mod channel;
mod enums;

pub use channel::*;
pub use enums::*;

use crate::StatusCode;

/// Object ids of the message types this stack can decode, as their numeric
/// value in the core namespace.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(non_camel_case_types)]
#[repr(u32)]
pub enum ObjectId {
    /// ServiceFault binary encoding id.
    ServiceFault_Encoding_DefaultBinary = 397,
    /// OpenSecureChannelRequest binary encoding id.
    OpenSecureChannelRequest_Encoding_DefaultBinary = 446,
    /// OpenSecureChannelResponse binary encoding id.
    OpenSecureChannelResponse_Encoding_DefaultBinary = 449,
    /// CloseSecureChannelRequest binary encoding id.
    CloseSecureChannelRequest_Encoding_DefaultBinary = 452,
    /// CloseSecureChannelResponse binary encoding id.
    CloseSecureChannelResponse_Encoding_DefaultBinary = 455,
}

impl TryFrom<u32> for ObjectId {
    type Error = StatusCode;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            397 => Self::ServiceFault_Encoding_DefaultBinary,
            446 => Self::OpenSecureChannelRequest_Encoding_DefaultBinary,
            449 => Self::OpenSecureChannelResponse_Encoding_DefaultBinary,
            452 => Self::CloseSecureChannelRequest_Encoding_DefaultBinary,
            455 => Self::CloseSecureChannelResponse_Encoding_DefaultBinary,
            _ => return Err(StatusCode::BadServiceUnsupported),
        })
    }
}
