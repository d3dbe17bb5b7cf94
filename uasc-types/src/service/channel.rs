// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The `OpenSecureChannel` / `CloseSecureChannel` service structures and
//! `ServiceFault`.

use std::io::{Read, Write};

use crate::{
    byte_string::ByteString,
    date_time::DateTime,
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult},
    request_header::RequestHeader,
    response_header::ResponseHeader,
    service::{MessageSecurityMode, ObjectId, SecurityTokenRequestType},
    ExpandedMessageInfo, ExpandedNodeId, NodeId,
};

macro_rules! impl_message_info {
    ($ty: ident, $enc: ident, $data: literal) => {
        impl ExpandedMessageInfo for $ty {
            fn full_type_id(&self) -> ExpandedNodeId {
                ExpandedNodeId::from(NodeId::from(ObjectId::$enc))
            }

            fn full_data_type_id(&self) -> ExpandedNodeId {
                ExpandedNodeId::from(NodeId::new(0, $data as u32))
            }
        }
    };
}

/// The token identifying the active key set of a secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelSecurityToken {
    /// Server-assigned identifier of the secure channel, unique among the
    /// server's active connections.
    pub channel_id: u32,
    /// Identifier of the token itself. A new value is assigned on every renewal.
    pub token_id: u32,
    /// When the token was issued.
    pub created_at: DateTime,
    /// The revised lifetime in milliseconds.
    pub revised_lifetime: u32,
}

impl BinaryEncodable for ChannelSecurityToken {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let mut size: usize = 0;
        size += self.channel_id.byte_len(ctx);
        size += self.token_id.byte_len(ctx);
        size += self.created_at.byte_len(ctx);
        size += self.revised_lifetime.byte_len(ctx);
        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.channel_id.encode(stream, ctx)?;
        self.token_id.encode(stream, ctx)?;
        self.created_at.encode(stream, ctx)?;
        self.revised_lifetime.encode(stream, ctx)
    }
}

impl BinaryDecodable for ChannelSecurityToken {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        let channel_id = u32::decode(stream, ctx)?;
        let token_id = u32::decode(stream, ctx)?;
        let created_at = DateTime::decode(stream, ctx)?;
        let revised_lifetime = u32::decode(stream, ctx)?;
        Ok(ChannelSecurityToken {
            channel_id,
            token_id,
            created_at,
            revised_lifetime,
        })
    }
}

/// Opens or renews a secure channel. This is the one request that may be
/// secured asymmetrically, with the certificates carried in the message's
/// security header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenSecureChannelRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The protocol version negotiated during the HELLO/ACK exchange.
    pub client_protocol_version: u32,
    /// Whether a channel is issued or renewed.
    pub request_type: SecurityTokenRequestType,
    /// The requested security mode of the channel.
    pub security_mode: MessageSecurityMode,
    /// Client entropy for key derivation. Null when the security mode is None.
    pub client_nonce: ByteString,
    /// Requested token lifetime in milliseconds.
    pub requested_lifetime: u32,
}

impl_message_info!(
    OpenSecureChannelRequest,
    OpenSecureChannelRequest_Encoding_DefaultBinary,
    444
);

impl BinaryEncodable for OpenSecureChannelRequest {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let mut size: usize = 0;
        size += self.request_header.byte_len(ctx);
        size += self.client_protocol_version.byte_len(ctx);
        size += self.request_type.byte_len(ctx);
        size += self.security_mode.byte_len(ctx);
        size += self.client_nonce.byte_len(ctx);
        size += self.requested_lifetime.byte_len(ctx);
        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.request_header.encode(stream, ctx)?;
        self.client_protocol_version.encode(stream, ctx)?;
        self.request_type.encode(stream, ctx)?;
        self.security_mode.encode(stream, ctx)?;
        self.client_nonce.encode(stream, ctx)?;
        self.requested_lifetime.encode(stream, ctx)
    }
}

impl BinaryDecodable for OpenSecureChannelRequest {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        let request_header = RequestHeader::decode(stream, ctx)?;
        let client_protocol_version = u32::decode(stream, ctx)?;
        let request_type = SecurityTokenRequestType::decode(stream, ctx)?;
        let security_mode = MessageSecurityMode::decode(stream, ctx)?;
        let client_nonce = ByteString::decode(stream, ctx)?;
        let requested_lifetime = u32::decode(stream, ctx)?;
        Ok(OpenSecureChannelRequest {
            request_header,
            client_protocol_version,
            request_type,
            security_mode,
            client_nonce,
            requested_lifetime,
        })
    }
}

/// Response to an [`OpenSecureChannelRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenSecureChannelResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// The protocol version the server operates at.
    pub server_protocol_version: u32,
    /// The issued security token.
    pub security_token: ChannelSecurityToken,
    /// Server entropy for key derivation. Null when the security mode is None.
    pub server_nonce: ByteString,
}

impl_message_info!(
    OpenSecureChannelResponse,
    OpenSecureChannelResponse_Encoding_DefaultBinary,
    447
);

impl BinaryEncodable for OpenSecureChannelResponse {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let mut size: usize = 0;
        size += self.response_header.byte_len(ctx);
        size += self.server_protocol_version.byte_len(ctx);
        size += self.security_token.byte_len(ctx);
        size += self.server_nonce.byte_len(ctx);
        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.response_header.encode(stream, ctx)?;
        self.server_protocol_version.encode(stream, ctx)?;
        self.security_token.encode(stream, ctx)?;
        self.server_nonce.encode(stream, ctx)
    }
}

impl BinaryDecodable for OpenSecureChannelResponse {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        let response_header = ResponseHeader::decode(stream, ctx)?;
        let server_protocol_version = u32::decode(stream, ctx)?;
        let security_token = ChannelSecurityToken::decode(stream, ctx)?;
        let server_nonce = ByteString::decode(stream, ctx)?;
        Ok(OpenSecureChannelResponse {
            response_header,
            server_protocol_version,
            security_token,
            server_nonce,
        })
    }
}

/// Closes an established secure channel. The server does not reply; the
/// transport connection is simply dropped once it has been processed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSecureChannelRequest {
    /// Common request header.
    pub request_header: RequestHeader,
}

impl_message_info!(
    CloseSecureChannelRequest,
    CloseSecureChannelRequest_Encoding_DefaultBinary,
    450
);

impl BinaryEncodable for CloseSecureChannelRequest {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.request_header.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.request_header.encode(stream, ctx)
    }
}

impl BinaryDecodable for CloseSecureChannelRequest {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        let request_header = RequestHeader::decode(stream, ctx)?;
        Ok(CloseSecureChannelRequest { request_header })
    }
}

/// Response to a [`CloseSecureChannelRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSecureChannelResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
}

impl_message_info!(
    CloseSecureChannelResponse,
    CloseSecureChannelResponse_Encoding_DefaultBinary,
    453
);

impl BinaryEncodable for CloseSecureChannelResponse {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.response_header.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.response_header.encode(stream, ctx)
    }
}

impl BinaryDecodable for CloseSecureChannelResponse {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        let response_header = ResponseHeader::decode(stream, ctx)?;
        Ok(CloseSecureChannelResponse { response_header })
    }
}

/// The response sent when a service invocation fails entirely.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceFault {
    /// Common response header, carrying the service result.
    pub response_header: ResponseHeader,
}

impl_message_info!(ServiceFault, ServiceFault_Encoding_DefaultBinary, 395);

impl BinaryEncodable for ServiceFault {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.response_header.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.response_header.encode(stream, ctx)
    }
}

impl BinaryDecodable for ServiceFault {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        let response_header = ResponseHeader::decode(stream, ctx)?;
        Ok(ServiceFault { response_header })
    }
}
