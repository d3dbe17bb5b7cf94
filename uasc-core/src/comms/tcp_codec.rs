// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The codec for reading transported units off a socket. Framing is a small
//! state machine: accumulate the 8 byte header, learn the expected size from
//! it, then accumulate until the whole unit is buffered and yield it upward.
//! `tokio_util`'s [`Decoder`] drives the accumulation.

use std::io::{Cursor, Error as IoError, ErrorKind};

use bytes::BytesMut;
use log::error;
use tokio_util::codec::Decoder;

use uasc_types::{DecodingOptions, SimpleBinaryDecodable, StatusCode};

use super::{
    message_chunk::MessageChunk,
    tcp_types::{
        AcknowledgeMessage, ErrorMessage, HelloMessage, MessageHeader, MessageType,
        MESSAGE_HEADER_LEN,
    },
};

/// A transported unit, as yielded by the [`TcpCodec`].
#[derive(Debug)]
pub enum Message {
    /// A client hello.
    Hello(HelloMessage),
    /// A server acknowledge.
    Acknowledge(AcknowledgeMessage),
    /// A transport error notification.
    Error(ErrorMessage),
    /// A chunk of a secure conversation message.
    Chunk(MessageChunk),
}

/// The codec decodes a message out of the stream. The intermediate framing
/// state lives in the `BytesMut` managed by `FramedRead`; this type holds
/// the decoding limits applied while parsing.
#[derive(Debug)]
pub struct TcpCodec {
    decoding_options: DecodingOptions,
}

impl TcpCodec {
    /// Create a new codec with the supplied decoding options.
    pub fn new(decoding_options: DecodingOptions) -> TcpCodec {
        TcpCodec { decoding_options }
    }
}

impl Decoder for TcpCodec {
    type Item = Message;
    type Error = IoError;

    // The decoder is split into two phases, mirroring the framing rules:
    //
    // Phase 1 - not enough bytes for the header yet, ask for more.
    // Phase 2 - the header gives the message size; wait for that many bytes,
    //           then decode the whole unit.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, IoError> {
        if buf.len() < MESSAGE_HEADER_LEN {
            return Ok(None);
        }

        let header = {
            let mut stream = Cursor::new(&buf[..MESSAGE_HEADER_LEN]);
            MessageHeader::decode(&mut stream, &self.decoding_options)
                .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("{e}")))?
        };

        let message_size = header.message_size as usize;
        if message_size < MESSAGE_HEADER_LEN {
            error!(
                "Message size {} in header is less than the header itself",
                message_size
            );
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!("{}", StatusCode::BadTcpInternalError),
            ));
        }
        if self.decoding_options.max_message_size > 0
            && message_size > self.decoding_options.max_message_size
        {
            error!(
                "Message size {} exceeds configured maximum {}",
                message_size, self.decoding_options.max_message_size
            );
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!("{}", StatusCode::BadTcpMessageTooLarge),
            ));
        }

        if buf.len() < message_size {
            // Tell the stream how much more data we are waiting for
            buf.reserve(message_size - buf.len());
            return Ok(None);
        }

        let data = buf.split_to(message_size);
        Ok(Some(Self::decode_message(
            &header,
            &data,
            &self.decoding_options,
        )?))
    }
}

impl TcpCodec {
    fn decode_message(
        header: &MessageHeader,
        data: &[u8],
        decoding_options: &DecodingOptions,
    ) -> Result<Message, IoError> {
        let io_err = |e: uasc_types::Error| IoError::new(ErrorKind::InvalidData, format!("{e}"));
        let mut stream = Cursor::new(data);
        match header.message_type {
            MessageType::Hello => Ok(Message::Hello(
                HelloMessage::decode(&mut stream, decoding_options).map_err(io_err)?,
            )),
            MessageType::Acknowledge => Ok(Message::Acknowledge(
                AcknowledgeMessage::decode(&mut stream, decoding_options).map_err(io_err)?,
            )),
            MessageType::Error => Ok(Message::Error(
                ErrorMessage::decode(&mut stream, decoding_options).map_err(io_err)?,
            )),
            MessageType::Chunk => Ok(Message::Chunk(
                MessageChunk::decode(&mut stream, decoding_options).map_err(io_err)?,
            )),
            MessageType::Invalid => Err(IoError::new(
                ErrorKind::InvalidData,
                format!("{}", StatusCode::BadTcpMessageTypeInvalid),
            )),
        }
    }
}
