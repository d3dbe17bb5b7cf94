// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Types of the UA Connection Protocol layer - the message header and the
//! `HEL`, `ACK` and `ERR` messages exchanged before a secure channel exists.

use std::io::{Cursor, Read, Write};

use log::error;

use uasc_types::{
    encoding::{
        process_decode_io_result, process_encode_io_result, read_u32, write_u32, write_u8,
        DecodingOptions, EncodingResult, SimpleBinaryDecodable, SimpleBinaryEncodable,
    },
    status_code::StatusCode,
    Error, UAString,
};

use super::url::url_matches_except_host;

/// Minimum size in bytes that a hello / receive chunk size can be, imposed by
/// the spec. A peer offering less than this is rejected.
pub const MIN_CHUNK_SIZE: usize = 8192;

/// Maximum byte length of the endpoint URL carried in a hello (Part 6 table 35).
pub const MAX_ENDPOINT_URL_LENGTH: usize = 4096;

/// Size in bytes of the message header that starts every transported unit.
pub const MESSAGE_HEADER_LEN: usize = 8;

/// Wire identifier of a hello message.
pub const HELLO_MESSAGE: &[u8] = b"HEL";
/// Wire identifier of an acknowledge message.
pub const ACKNOWLEDGE_MESSAGE: &[u8] = b"ACK";
/// Wire identifier of an error message.
pub const ERROR_MESSAGE: &[u8] = b"ERR";
/// Wire identifier of a regular message chunk.
pub const CHUNK_MESSAGE: &[u8] = b"MSG";
/// Wire identifier of an open secure channel chunk.
pub const OPEN_SECURE_CHANNEL_MESSAGE: &[u8] = b"OPN";
/// Wire identifier of a close secure channel chunk.
pub const CLOSE_SECURE_CHANNEL_MESSAGE: &[u8] = b"CLO";

/// IsFinal value of an intermediate chunk.
pub const CHUNK_INTERMEDIATE: u8 = b'C';
/// IsFinal value of the last chunk of a message. Also the mandatory reserved
/// byte of the non-chunk messages.
pub const CHUNK_FINAL: u8 = b'F';
/// IsFinal value of an abort chunk.
pub const CHUNK_FINAL_ERROR: u8 = b'A';

/// The kind of transported unit, from the first 4 bytes of its header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageType {
    /// The message type was invalid.
    Invalid,
    /// A hello message.
    Hello,
    /// An acknowledge message.
    Acknowledge,
    /// An error message.
    Error,
    /// A chunk of a secure conversation message - `MSG`, `OPN` or `CLO`.
    Chunk,
}

/// The 8 byte header preceding every transported unit: a 3 byte message
/// type, 1 reserved / is-final byte and the total message size.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    /// The kind of the message.
    pub message_type: MessageType,
    /// The total size of the message including this header.
    pub message_size: u32,
}

impl SimpleBinaryEncodable for MessageHeader {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_LEN
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        let result = match self.message_type {
            MessageType::Hello => stream.write_all(HELLO_MESSAGE),
            MessageType::Acknowledge => stream.write_all(ACKNOWLEDGE_MESSAGE),
            MessageType::Error => stream.write_all(ERROR_MESSAGE),
            _ => {
                return Err(Error::encoding(
                    "Cannot encode message header for this message type",
                ));
            }
        };
        process_encode_io_result(result)?;
        // Non-chunk messages always carry 'F' in the reserved byte
        write_u8(stream, CHUNK_FINAL)?;
        write_u32(stream, self.message_size)
    }
}

impl SimpleBinaryDecodable for MessageHeader {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        let mut message_type_code = [0u8; 4];
        process_decode_io_result(stream.read_exact(&mut message_type_code))?;
        let message_type = MessageHeader::message_type(&message_type_code);
        if message_type == MessageType::Invalid {
            return Err(Error::new(
                StatusCode::BadTcpMessageTypeInvalid,
                format!("Message header type is not recognized, {:?}", message_type_code),
            ));
        }
        let message_size = read_u32(stream)?;
        Ok(MessageHeader {
            message_type,
            message_size,
        })
    }
}

impl MessageHeader {
    /// Create a new message header for the given type. The size field is a
    /// placeholder until the body length is known.
    pub fn new(message_type: MessageType) -> MessageHeader {
        MessageHeader {
            message_type,
            message_size: 0,
        }
    }

    /// Identify the message type from the first 4 bytes of a header. The
    /// reserved byte of `HEL`/`ACK`/`ERR` must be `F`; chunk messages carry
    /// their is-final flag there which the chunk decoder validates.
    pub fn message_type(t: &[u8]) -> MessageType {
        if t.len() != 4 {
            MessageType::Invalid
        } else {
            let message_type = match &t[0..3] {
                HELLO_MESSAGE => MessageType::Hello,
                ACKNOWLEDGE_MESSAGE => MessageType::Acknowledge,
                ERROR_MESSAGE => MessageType::Error,
                CHUNK_MESSAGE | OPEN_SECURE_CHANNEL_MESSAGE | CLOSE_SECURE_CHANNEL_MESSAGE => {
                    MessageType::Chunk
                }
                _ => {
                    error!("message type doesn't match anything");
                    MessageType::Invalid
                }
            };

            // Check the reserved / is-final byte
            let valid = match message_type {
                MessageType::Chunk => matches!(
                    t[3],
                    CHUNK_INTERMEDIATE | CHUNK_FINAL | CHUNK_FINAL_ERROR
                ),
                MessageType::Invalid => false,
                _ => t[3] == CHUNK_FINAL,
            };
            if !valid {
                MessageType::Invalid
            } else {
                message_type
            }
        }
    }
}

/// A hello message, the first message a client sends on a freshly opened
/// socket, proposing buffer sizes and limits.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    /// Common message header.
    pub message_header: MessageHeader,
    /// The protocol version the client wants to speak, 0 for this stack.
    pub protocol_version: u32,
    /// Size of the buffer the client receives chunks into. The server must
    /// not send chunks larger than this.
    pub receive_buffer_size: u32,
    /// Size of the buffer the client sends chunks from.
    pub send_buffer_size: u32,
    /// Largest complete message the client is willing to receive, 0 for no limit.
    pub max_message_size: u32,
    /// Largest number of chunks in a message the client is willing to
    /// receive, 0 for no limit.
    pub max_chunk_count: u32,
    /// The url of the endpoint the client wants to talk to.
    pub endpoint_url: UAString,
}

impl SimpleBinaryEncodable for HelloMessage {
    fn byte_len(&self) -> usize {
        self.message_header.byte_len() + 20 + self.endpoint_url.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.message_header.encode(stream)?;
        write_u32(stream, self.protocol_version)?;
        write_u32(stream, self.receive_buffer_size)?;
        write_u32(stream, self.send_buffer_size)?;
        write_u32(stream, self.max_message_size)?;
        write_u32(stream, self.max_chunk_count)?;
        self.endpoint_url.encode(stream)
    }
}

impl SimpleBinaryDecodable for HelloMessage {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let message_header = MessageHeader::decode(stream, decoding_options)?;
        let protocol_version = read_u32(stream)?;
        let receive_buffer_size = read_u32(stream)?;
        let send_buffer_size = read_u32(stream)?;
        let max_message_size = read_u32(stream)?;
        let max_chunk_count = read_u32(stream)?;
        let endpoint_url = UAString::decode(stream, decoding_options)?;
        let hello = HelloMessage {
            message_header,
            protocol_version,
            receive_buffer_size,
            send_buffer_size,
            max_message_size,
            max_chunk_count,
            endpoint_url,
        };
        if !hello.is_endpoint_url_length_valid() {
            return Err(Error::new(
                StatusCode::BadTcpEndpointUrlInvalid,
                "Hello endpoint url exceeds the maximum length",
            ));
        }
        Ok(hello)
    }
}

impl HelloMessage {
    /// Creates a HelloMessage
    pub fn new(
        endpoint_url: &str,
        send_buffer_size: usize,
        receive_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) -> HelloMessage {
        let mut msg = HelloMessage {
            message_header: MessageHeader::new(MessageType::Hello),
            protocol_version: 0,
            receive_buffer_size: receive_buffer_size as u32,
            send_buffer_size: send_buffer_size as u32,
            max_message_size: max_message_size as u32,
            max_chunk_count: max_chunk_count as u32,
            endpoint_url: UAString::from(endpoint_url),
        };
        msg.message_header.message_size = msg.byte_len() as u32;
        msg
    }

    /// Check the endpoint url length is within the bound of Part 6 table 35.
    pub fn is_endpoint_url_length_valid(&self) -> bool {
        self.endpoint_url.len() <= MAX_ENDPOINT_URL_LENGTH as isize
    }

    /// Test if the endpoint url refers to the supplied endpoint, ignoring
    /// the host name.
    pub fn matches_endpoint_url(&self, endpoint_url: &str) -> bool {
        url_matches_except_host(self.endpoint_url.as_ref(), endpoint_url)
    }

    /// Test that both buffer sizes meet the minimum chunk size floor.
    pub fn is_valid_buffer_sizes(&self) -> bool {
        self.receive_buffer_size >= MIN_CHUNK_SIZE as u32
            && self.send_buffer_size >= MIN_CHUNK_SIZE as u32
    }
}

/// The server's reply to a hello, carrying the revised values the
/// connection will operate with.
#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeMessage {
    /// Common message header.
    pub message_header: MessageHeader,
    /// The protocol version the server will speak.
    pub protocol_version: u32,
    /// Revised size of the buffer the server receives chunks into.
    pub receive_buffer_size: u32,
    /// Revised size of the buffer the server sends chunks from.
    pub send_buffer_size: u32,
    /// Revised maximum message size, 0 for no limit.
    pub max_message_size: u32,
    /// Revised maximum chunk count, 0 for no limit.
    pub max_chunk_count: u32,
}

impl SimpleBinaryEncodable for AcknowledgeMessage {
    fn byte_len(&self) -> usize {
        self.message_header.byte_len() + 20
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.message_header.encode(stream)?;
        write_u32(stream, self.protocol_version)?;
        write_u32(stream, self.receive_buffer_size)?;
        write_u32(stream, self.send_buffer_size)?;
        write_u32(stream, self.max_message_size)?;
        write_u32(stream, self.max_chunk_count)
    }
}

impl SimpleBinaryDecodable for AcknowledgeMessage {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let message_header = MessageHeader::decode(stream, decoding_options)?;
        let protocol_version = read_u32(stream)?;
        let receive_buffer_size = read_u32(stream)?;
        let send_buffer_size = read_u32(stream)?;
        let max_message_size = read_u32(stream)?;
        let max_chunk_count = read_u32(stream)?;
        Ok(AcknowledgeMessage {
            message_header,
            protocol_version,
            receive_buffer_size,
            send_buffer_size,
            max_message_size,
            max_chunk_count,
        })
    }
}

impl AcknowledgeMessage {
    /// Create a new acknowledge with the given revised values.
    pub fn new(
        protocol_version: u32,
        receive_buffer_size: u32,
        send_buffer_size: u32,
        max_message_size: u32,
        max_chunk_count: u32,
    ) -> AcknowledgeMessage {
        let mut msg = AcknowledgeMessage {
            message_header: MessageHeader::new(MessageType::Acknowledge),
            protocol_version,
            receive_buffer_size,
            send_buffer_size,
            max_message_size,
            max_chunk_count,
        };
        msg.message_header.message_size = msg.byte_len() as u32;
        msg
    }
}

/// A transport level error, sent before the connection is torn down.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    /// Common message header.
    pub message_header: MessageHeader,
    /// The numeric code of the error.
    pub error: StatusCode,
    /// Human readable reason for the error.
    pub reason: UAString,
}

impl SimpleBinaryEncodable for ErrorMessage {
    fn byte_len(&self) -> usize {
        self.message_header.byte_len() + self.error.byte_len() + self.reason.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.message_header.encode(stream)?;
        self.error.encode(stream)?;
        self.reason.encode(stream)
    }
}

impl SimpleBinaryDecodable for ErrorMessage {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let message_header = MessageHeader::decode(stream, decoding_options)?;
        let error = StatusCode::decode(stream, decoding_options)?;
        let reason = UAString::decode(stream, decoding_options)?;
        Ok(ErrorMessage {
            message_header,
            error,
            reason,
        })
    }
}

impl ErrorMessage {
    /// Create an error message from a status code and reason.
    pub fn new(status_code: StatusCode, reason: &str) -> ErrorMessage {
        let mut error = ErrorMessage {
            message_header: MessageHeader::new(MessageType::Error),
            error: status_code,
            reason: UAString::from(reason),
        };
        error.message_header.message_size = error.byte_len() as u32;
        error
    }

    /// Encode the abort chunk body form of this error - just the code and
    /// reason without a message header, as carried in a chunk whose is-final
    /// flag is `A`.
    pub fn encode_body(&self) -> EncodingResult<Vec<u8>> {
        let mut body = Cursor::new(Vec::with_capacity(
            self.error.byte_len() + self.reason.byte_len(),
        ));
        self.error.encode(&mut body)?;
        self.reason.encode(&mut body)?;
        Ok(body.into_inner())
    }

    /// Decode the abort chunk body form.
    pub fn decode_body(
        body: &[u8],
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<ErrorMessage> {
        let mut stream = Cursor::new(body);
        let error = StatusCode::decode(&mut stream, decoding_options)?;
        let reason = UAString::decode(&mut stream, decoding_options)?;
        Ok(ErrorMessage {
            message_header: MessageHeader::new(MessageType::Error),
            error,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_detection() {
        assert_eq!(
            MessageHeader::message_type(b"HELF"),
            MessageType::Hello
        );
        assert_eq!(
            MessageHeader::message_type(b"ACKF"),
            MessageType::Acknowledge
        );
        assert_eq!(MessageHeader::message_type(b"ERRF"), MessageType::Error);
        assert_eq!(MessageHeader::message_type(b"MSGC"), MessageType::Chunk);
        assert_eq!(MessageHeader::message_type(b"OPNF"), MessageType::Chunk);
        assert_eq!(MessageHeader::message_type(b"CLOA"), MessageType::Chunk);

        // Reserved byte of non-chunk messages must be 'F'
        assert_eq!(MessageHeader::message_type(b"HELC"), MessageType::Invalid);
        assert_eq!(MessageHeader::message_type(b"ERRX"), MessageType::Invalid);
        // Chunks only accept C / F / A
        assert_eq!(MessageHeader::message_type(b"MSGX"), MessageType::Invalid);
        // Garbage
        assert_eq!(MessageHeader::message_type(b"XXXF"), MessageType::Invalid);
    }

    #[test]
    fn hello_round_trip() {
        let hello = HelloMessage::new("opc.tcp://localhost:4840/", 65536, 65536, 0, 1);
        assert_eq!(
            hello.message_header.message_size as usize,
            hello.byte_len()
        );
        let bytes = hello.encode_to_vec();
        let mut stream = Cursor::new(bytes);
        let decoded = HelloMessage::decode(&mut stream, &DecodingOptions::test()).unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn hello_buffer_size_floor() {
        let mut hello = HelloMessage::new("opc.tcp://localhost:4840/", 65536, 65536, 0, 0);
        assert!(hello.is_valid_buffer_sizes());
        hello.receive_buffer_size = (MIN_CHUNK_SIZE - 1) as u32;
        assert!(!hello.is_valid_buffer_sizes());
        hello.receive_buffer_size = MIN_CHUNK_SIZE as u32;
        assert!(hello.is_valid_buffer_sizes());
        hello.send_buffer_size = 8191;
        assert!(!hello.is_valid_buffer_sizes());
    }

    #[test]
    fn hello_endpoint_url_limit() {
        let url = format!("opc.tcp://localhost/{}", "x".repeat(MAX_ENDPOINT_URL_LENGTH));
        let hello = HelloMessage::new(&url, 65536, 65536, 0, 0);
        assert!(!hello.is_endpoint_url_length_valid());
        let bytes = hello.encode_to_vec();
        let mut stream = Cursor::new(bytes);
        assert!(HelloMessage::decode(&mut stream, &DecodingOptions::test()).is_err());
    }

    #[test]
    fn error_round_trip() {
        let error = ErrorMessage::new(StatusCode::BadSecurityChecksFailed, "no thanks");
        let bytes = error.encode_to_vec();
        let mut stream = Cursor::new(bytes);
        let decoded = ErrorMessage::decode(&mut stream, &DecodingOptions::test()).unwrap();
        assert_eq!(decoded, error);

        // Abort body form round trips too
        let body = error.encode_body().unwrap();
        let decoded = ErrorMessage::decode_body(&body, &DecodingOptions::test()).unwrap();
        assert_eq!(decoded.error, error.error);
        assert_eq!(decoded.reason, error.reason);
    }
}
