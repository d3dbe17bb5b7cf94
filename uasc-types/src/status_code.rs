// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the [`StatusCode`] type, a 32-bit code describing the outcome of
//! an operation. Only the codes raised by this stack are given named
//! constants; any other code can still be represented and round-tripped.

use std::fmt;
use std::io::{Read, Write};

use crate::encoding::{
    read_u32, write_u32, DecodingOptions, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable,
};

macro_rules! status_codes {
    ($($name:ident = $value:literal, $doc:literal;)*) => {
        impl StatusCode {
            $(
                #[doc = $doc]
                #[allow(non_upper_case_globals)]
                pub const $name: StatusCode = StatusCode($value);
            )*

            /// Get the symbolic name of this status code, if the sub-code is known.
            pub fn name(&self) -> &'static str {
                match self.0 & !Self::INFO_MASK {
                    $( $value => stringify!($name), )*
                    v if v & Self::SEVERITY_MASK == 0 => "Good",
                    v if v & Self::SEVERITY_MASK == 0x4000_0000 => "Uncertain",
                    _ => "Bad",
                }
            }
        }
    };
}

/// An OPC UA status code as defined in Part 4 and Part 6.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct StatusCode(u32);

status_codes! {
    Good = 0x0000_0000, "The operation succeeded.";
    Uncertain = 0x4000_0000, "The operation was uncertain.";
    Bad = 0x8000_0000, "The operation failed.";
    BadUnexpectedError = 0x8001_0000, "An unexpected error occurred.";
    BadInternalError = 0x8002_0000, "An internal error occurred as a result of a programming or configuration error.";
    BadOutOfMemory = 0x8003_0000, "Not enough memory to complete the operation.";
    BadResourceUnavailable = 0x8004_0000, "An operating system resource is not available.";
    BadCommunicationError = 0x8005_0000, "A low level communication error occurred.";
    BadEncodingError = 0x8006_0000, "Encoding halted because of invalid data in the objects being serialized.";
    BadDecodingError = 0x8007_0000, "Decoding halted because of invalid data in the stream.";
    BadEncodingLimitsExceeded = 0x8008_0000, "The message encoding/decoding limits imposed by the stack have been exceeded.";
    BadUnknownResponse = 0x8009_0000, "An unrecognized response was received from the server.";
    BadTimeout = 0x800A_0000, "The operation timed out.";
    BadServiceUnsupported = 0x800B_0000, "The server does not support the requested service.";
    BadShutdown = 0x800C_0000, "The operation was cancelled because the application is shutting down.";
    BadServerHalted = 0x800E_0000, "The server has stopped and cannot process any requests.";
    BadNothingToDo = 0x800F_0000, "No processing could be done because there was nothing to do.";
    BadDataTypeIdUnknown = 0x8011_0000, "The ExtensionObject cannot be (de)serialized because the data type id is not recognized.";
    BadCertificateInvalid = 0x8012_0000, "The certificate provided as a parameter is not valid.";
    BadSecurityChecksFailed = 0x8013_0000, "An error occurred verifying security.";
    BadCertificateTimeInvalid = 0x8014_0000, "The certificate has expired or is not yet valid.";
    BadCertificateUntrusted = 0x801A_0000, "The certificate is not trusted.";
    BadUserAccessDenied = 0x8020_0000, "User does not have permission to perform the requested operation.";
    BadSecureChannelIdInvalid = 0x8023_0000, "The specified secure channel is no longer valid.";
    BadInvalidTimestamp = 0x8024_0000, "The timestamp is outside the range allowed by the server.";
    BadNonceInvalid = 0x8025_0000, "The nonce does appear to be not a random value or it is not the correct length.";
    BadNodeIdInvalid = 0x8033_0000, "The syntax the node id is not valid.";
    BadNodeIdUnknown = 0x8034_0000, "The node id refers to a node that does not exist in the server address space.";
    BadNoValidCertificates = 0x8059_0000, "The operation could not be completed because no valid certificates were found.";
    BadTcpServerTooBusy = 0x807B_0000, "The server cannot process the request because it is too busy.";
    BadTcpMessageTypeInvalid = 0x807C_0000, "The type of the message specified in the header invalid.";
    BadTcpSecureChannelUnknown = 0x807D_0000, "The SecureChannelId and/or TokenId are not currently in use.";
    BadTcpMessageTooLarge = 0x807E_0000, "The size of the message chunk specified in the header is too large.";
    BadTcpNotEnoughResources = 0x807F_0000, "There are not enough resources to process the request.";
    BadTcpInternalError = 0x8080_0000, "An internal error occurred.";
    BadTcpEndpointUrlInvalid = 0x8081_0000, "The server does not recognize the QueryString specified.";
    BadRequestInterrupted = 0x8082_0000, "The request could not be sent because of a network interruption.";
    BadRequestTimeout = 0x8083_0000, "Timeout occurred while processing the request.";
    BadSecureChannelClosed = 0x8084_0000, "The secure channel has been closed.";
    BadSecureChannelTokenUnknown = 0x8085_0000, "The token has expired or is not recognized.";
    BadSequenceNumberInvalid = 0x8086_0000, "The sequence number is not valid.";
    BadProtocolVersionUnsupported = 0x8087_0000, "The applications do not have compatible protocol versions.";
    BadConfigurationError = 0x8088_0000, "There is a problem with the configuration that affects the usefulness of the value.";
    BadNotConnected = 0x8089_0000, "The variable should receive its value from another variable, but has never been configured to do so.";
    BadOperationAbandoned = 0x80B3_0000, "The asynchronous operation was abandoned by the caller.";
    BadExpectedStreamToBlock = 0x80B4_0000, "The stream did not return all data requested (possibly because it is a non-blocking stream).";
    BadMaxConnectionsReached = 0x80B7_0000, "The operation could not be finished because all available connections are in use.";
    BadRequestTooLarge = 0x80B8_0000, "The request message size exceeds limits set by the server.";
    BadResponseTooLarge = 0x80B9_0000, "The response message size exceeds limits set by the client.";
    BadConnectionRejected = 0x80AC_0000, "Could not establish a network connection to remote server.";
    BadDisconnect = 0x80AD_0000, "The server has disconnected from the client.";
    BadConnectionClosed = 0x80AE_0000, "The network connection has been closed.";
    BadInvalidState = 0x80AF_0000, "The operation cannot be completed because the object is closed, uninitialized or in some other invalid state.";
    BadEndOfStream = 0x80B0_0000, "Cannot move beyond end of the stream.";
    BadInvalidArgument = 0x80AB_0000, "One or more arguments are invalid.";
    BadSecurityModeRejected = 0x80E6_0000, "The security mode does not meet the requirements set by the server.";
    BadSecurityPolicyRejected = 0x80E7_0000, "The security policy does not meet the requirements set by the server.";
}

impl StatusCode {
    const SEVERITY_MASK: u32 = 0xC000_0000;
    const INFO_MASK: u32 = 0x0000_FFFF;

    /// Get the raw 32-bit value of this status code.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True if the severity bits indicate success.
    pub fn is_good(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0
    }

    /// True if the severity bits indicate failure.
    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// True if the severity bits indicate an uncertain result.
    pub fn is_uncertain(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0x4000_0000
    }

    /// The code with the info bits stripped, leaving severity and sub-code.
    pub fn sub_code(&self) -> StatusCode {
        StatusCode(self.0 & !Self::INFO_MASK)
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        StatusCode(value)
    }
}

impl From<StatusCode> for u32 {
    fn from(value: StatusCode) -> Self {
        value.0
    }
}

impl From<StatusCode> for std::io::Error {
    fn from(value: StatusCode) -> Self {
        std::io::Error::other(format!("StatusCode {}", value))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        if self.0 & Self::INFO_MASK != 0 || matches!(name, "Good" | "Uncertain" | "Bad") {
            write!(f, "{} (0x{:08X})", name, self.0)
        } else {
            write!(f, "{}", name)
        }
    }
}

impl SimpleBinaryEncodable for StatusCode {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u32(stream, self.0)
    }
}

impl SimpleBinaryDecodable for StatusCode {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(StatusCode(read_u32(stream)?))
    }
}

#[cfg(test)]
mod tests {
    use super::StatusCode;

    #[test]
    fn severity() {
        assert!(StatusCode::Good.is_good());
        assert!(!StatusCode::Good.is_bad());
        assert!(StatusCode::BadDecodingError.is_bad());
        assert!(!StatusCode::BadDecodingError.is_good());
        assert!(StatusCode::Uncertain.is_uncertain());
    }

    #[test]
    fn name_lookup() {
        assert_eq!(StatusCode::BadTcpMessageTypeInvalid.name(), "BadTcpMessageTypeInvalid");
        assert_eq!(StatusCode::from(0x8013_0000).name(), "BadSecurityChecksFailed");
        // Unknown sub code falls back to the severity
        assert_eq!(StatusCode::from(0x8FFF_0000).name(), "Bad");
    }

    #[test]
    fn info_bits_round_trip() {
        let code = StatusCode::from(0x8086_00FF);
        assert_eq!(code.sub_code(), StatusCode::BadSequenceNumberInvalid);
        assert_eq!(code.bits(), 0x8086_00FF);
    }
}
