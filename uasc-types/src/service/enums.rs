// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Enumerations used during the secure channel handshake.

use std::fmt;
use std::io::{Read, Write};

use crate::encoding::{
    read_i32, write_i32, DecodingOptions, EncodingResult, Error, SimpleBinaryDecodable,
    SimpleBinaryEncodable,
};

/// The security mode of a secure channel, agreed during the
/// `OpenSecureChannel` handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum MessageSecurityMode {
    /// A mode that is not valid on the wire.
    #[default]
    Invalid = 0,
    /// Messages are neither signed nor encrypted.
    None = 1,
    /// Messages are signed but not encrypted.
    Sign = 2,
    /// Messages are signed and encrypted.
    SignAndEncrypt = 3,
}

impl fmt::Display for MessageSecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSecurityMode::Invalid => write!(f, "Invalid"),
            MessageSecurityMode::None => write!(f, "None"),
            MessageSecurityMode::Sign => write!(f, "Sign"),
            MessageSecurityMode::SignAndEncrypt => write!(f, "SignAndEncrypt"),
        }
    }
}

impl From<MessageSecurityMode> for &'static str {
    fn from(value: MessageSecurityMode) -> Self {
        match value {
            MessageSecurityMode::None => "None",
            MessageSecurityMode::Sign => "Sign",
            MessageSecurityMode::SignAndEncrypt => "SignAndEncrypt",
            _ => "",
        }
    }
}

impl From<&str> for MessageSecurityMode {
    fn from(value: &str) -> Self {
        match value {
            "None" => MessageSecurityMode::None,
            "Sign" => MessageSecurityMode::Sign,
            "SignAndEncrypt" => MessageSecurityMode::SignAndEncrypt,
            _ => MessageSecurityMode::Invalid,
        }
    }
}

impl SimpleBinaryEncodable for MessageSecurityMode {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_i32(stream, *self as i32)
    }
}

impl SimpleBinaryDecodable for MessageSecurityMode {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        match read_i32(stream)? {
            0 => Ok(MessageSecurityMode::Invalid),
            1 => Ok(MessageSecurityMode::None),
            2 => Ok(MessageSecurityMode::Sign),
            3 => Ok(MessageSecurityMode::SignAndEncrypt),
            v => Err(Error::decoding(format!(
                "Invalid MessageSecurityMode value {v}"
            ))),
        }
    }
}

/// Whether an `OpenSecureChannel` request establishes a new channel or
/// renews the token of an existing one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum SecurityTokenRequestType {
    /// Open a new secure channel.
    #[default]
    Issue = 0,
    /// Renew the token of an established channel.
    Renew = 1,
}

impl SimpleBinaryEncodable for SecurityTokenRequestType {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_i32(stream, *self as i32)
    }
}

impl SimpleBinaryDecodable for SecurityTokenRequestType {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        match read_i32(stream)? {
            0 => Ok(SecurityTokenRequestType::Issue),
            1 => Ok(SecurityTokenRequestType::Renew),
            v => Err(Error::decoding(format!(
                "Invalid SecurityTokenRequestType value {v}"
            ))),
        }
    }
}
