// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::io::Cursor;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use uasc_core::comms::{
    buffer::SendBuffer,
    chunker::Chunker,
    message_chunk::{MessageChunk, MessageChunkType, MessageIsFinalType},
    secure_channel::SecureChannel,
    tcp_codec::{Message, TcpCodec},
    tcp_types::{AcknowledgeMessage, ErrorMessage, HelloMessage},
};
use uasc_core::{RequestMessage, ResponseMessage};

use uasc_types::{
    BinaryDecodable, DecodingOptions, DynEncodable, Error, NodeId, SimpleBinaryEncodable,
    StatusCode,
};

use futures::StreamExt;
use tokio::{
    io::{AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
};
use tokio_util::{codec::FramedRead, sync::CancellationToken};

use super::connect::Connector;

/// Transport implementation for opc.tcp on the server side.
pub(crate) struct TcpTransport {
    read: FramedRead<ReadHalf<TcpStream>, TcpCodec>,
    write: WriteHalf<TcpStream>,
    send_buffer: SendBuffer,
    state: TransportState,
    /// Decrypted chunks of the message currently being assembled.
    pending_chunks: Vec<MessageChunk>,
    /// Client protocol version set during HELLO
    pub(crate) client_protocol_version: u32,
    /// Last decoded sequence number
    last_received_sequence_number: u32,
}

enum TransportState {
    Running,
    Closing,
}

#[derive(Debug, Clone)]
pub(crate) struct TransportConfig {
    pub send_buffer_size: usize,
    pub receive_buffer_size: usize,
    pub max_message_size: usize,
    pub max_chunk_count: usize,
    pub hello_timeout: Duration,
}

/// A fully assembled incoming message.
#[derive(Debug)]
pub(crate) enum Request {
    /// An `OpenSecureChannel` or `CloseSecureChannel` request, handled by
    /// the endpoint itself.
    ChannelService {
        request_id: u32,
        message: RequestMessage,
    },
    /// A service request of a type registered with the type registry,
    /// decoded and handed upward.
    Service {
        request_id: u32,
        type_id: NodeId,
        body: Box<dyn DynEncodable>,
    },
    /// A service request of an unknown type.
    Unsupported { request_id: u32, type_id: NodeId },
}

#[derive(Debug)]
/// Result of polling a TCP transport.
pub(crate) enum TransportPollResult {
    OutgoingMessageSent,
    IncomingChunk,
    IncomingMessage(Request),
    /// The peer aborted the message in progress.
    AbortRequest {
        request_id: u32,
        error: StatusCode,
        reason: String,
    },
    RecoverableError(StatusCode, u32, u32),
    Error(StatusCode),
    Closed,
}

fn min_zero_infinite(server: u32, client: u32) -> u32 {
    if client == 0 {
        server
    } else if server == 0 {
        client
    } else {
        client.min(server)
    }
}

pub(crate) struct TcpConnector {
    read: FramedRead<ReadHalf<TcpStream>, TcpCodec>,
    write: WriteHalf<TcpStream>,
    deadline: Instant,
    config: TransportConfig,
    decoding_options: DecodingOptions,
    endpoint_url: String,
}

impl TcpConnector {
    pub fn new(
        stream: TcpStream,
        config: TransportConfig,
        decoding_options: DecodingOptions,
        endpoint_url: String,
    ) -> Self {
        let (read, write) = tokio::io::split(stream);
        let read = FramedRead::new(read, TcpCodec::new(decoding_options.clone()));
        TcpConnector {
            read,
            write,
            deadline: Instant::now() + config.hello_timeout,
            config,
            decoding_options,
            endpoint_url,
        }
    }

    async fn connect_inner(&mut self) -> Result<(SendBuffer, u32), ErrorMessage> {
        let hello = match self.read.next().await {
            Some(Ok(Message::Hello(hello))) => Ok(hello),
            Some(Ok(bad_msg)) => Err(ErrorMessage::new(
                StatusCode::BadCommunicationError,
                &format!("Expected a hello message, got {:?} instead", bad_msg),
            )),
            Some(Err(communication_err)) => Err(ErrorMessage::new(
                StatusCode::BadCommunicationError,
                &format!(
                    "Communication error while waiting for Hello message: {}",
                    communication_err
                ),
            )),
            None => Err(ErrorMessage::new(
                StatusCode::BadCommunicationError,
                "Stream closed",
            )),
        }?;

        let mut buffer = SendBuffer::new(
            self.config.send_buffer_size,
            self.config.max_message_size,
            self.config.max_chunk_count,
        );

        if !hello.matches_endpoint_url(&self.endpoint_url) {
            return Err(ErrorMessage::new(
                StatusCode::BadTcpEndpointUrlInvalid,
                "HELLO endpoint url does not refer to this endpoint",
            ));
        }
        // Each side must offer at least the minimum chunk size
        if !hello.is_valid_buffer_sizes() {
            return Err(ErrorMessage::new(
                StatusCode::BadConnectionRejected,
                "HELLO buffer sizes are invalid",
            ));
        }

        let server_protocol_version = 0;
        // Validate protocol version
        if hello.protocol_version > server_protocol_version {
            return Err(ErrorMessage::new(
                StatusCode::BadProtocolVersionUnsupported,
                "Client protocol version is unsupported.",
            ));
        }

        // Our send size must not exceed what the peer can receive, and the
        // reverse; every value is revised downward, never up.
        let acknowledge = AcknowledgeMessage::new(
            server_protocol_version,
            (self.config.receive_buffer_size as u32).min(hello.send_buffer_size),
            (buffer.send_buffer_size as u32).min(hello.receive_buffer_size),
            min_zero_infinite(
                self.decoding_options.max_message_size as u32,
                hello.max_message_size,
            ),
            min_zero_infinite(
                self.decoding_options.max_chunk_count as u32,
                hello.max_chunk_count,
            ),
        );
        buffer.revise(
            acknowledge.send_buffer_size as usize,
            acknowledge.max_message_size as usize,
            acknowledge.max_chunk_count as usize,
        );

        let mut buf = Vec::with_capacity(acknowledge.byte_len());
        acknowledge
            .encode(&mut buf)
            .map_err(|e| ErrorMessage::new(e.into(), "Failed to encode ack"))?;

        self.write.write_all(&buf).await.map_err(|e| {
            ErrorMessage::new(
                StatusCode::BadCommunicationError,
                &format!("Failed to send ack: {e}"),
            )
        })?;

        Ok((buffer, hello.protocol_version))
    }
}

impl Connector for TcpConnector {
    async fn connect(mut self, token: CancellationToken) -> Result<TcpTransport, StatusCode> {
        let err = tokio::select! {
            _ = tokio::time::sleep_until(self.deadline.into()) => {
                ErrorMessage::new(StatusCode::BadTimeout, "Timeout waiting for HELLO")
            }
            _ = token.cancelled() => {
                ErrorMessage::new(StatusCode::BadServerHalted, "Server closed")
            }
            r = self.connect_inner() => {
                match r {
                    Ok((buffer, protocol_version)) => {
                        return Ok(TcpTransport::new(self.read, self.write, buffer, protocol_version))
                    }
                    Err(e) => e,
                }
            }
        };

        // We want to send an error if connection failed for whatever reason, but
        // there's a good chance the channel is closed, so just ignore any errors.
        let mut buf = Vec::with_capacity(err.byte_len());
        if err.encode(&mut buf).is_ok() {
            let _ = self.write.write_all(&buf).await;
        }

        Err(err.error)
    }
}

impl TcpTransport {
    pub fn new(
        read: FramedRead<ReadHalf<TcpStream>, TcpCodec>,
        write: WriteHalf<TcpStream>,
        send_buffer: SendBuffer,
        client_protocol_version: u32,
    ) -> Self {
        Self {
            read,
            write,
            state: TransportState::Running,
            pending_chunks: Vec::new(),
            last_received_sequence_number: 0,
            client_protocol_version,
            send_buffer,
        }
    }

    /// Set the transport state to closing, once the final message is sent
    /// the connection will be closed.
    pub fn set_closing(&mut self) {
        self.state = TransportState::Closing;
    }

    pub fn is_closing(&self) -> bool {
        matches!(self.state, TransportState::Closing)
    }

    pub fn enqueue_error(&mut self, message: ErrorMessage) {
        self.send_buffer.write_error(message);
    }

    pub fn enqueue_message_for_send(
        &mut self,
        channel: &mut SecureChannel,
        message: ResponseMessage,
        request_id: u32,
    ) -> Result<(), StatusCode> {
        match self.send_buffer.write(request_id, message, channel) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Failed to encode outgoing message: {e:?}");
                Err(e.into())
            }
        }
    }

    pub async fn poll(&mut self, channel: &mut SecureChannel) -> TransportPollResult {
        // Either we've got something in the send buffer, which we can send,
        // or we're waiting for more outgoing messages.

        // If there's nothing in the send buffer, but there are chunks available,
        // write them to the send buffer before proceeding.
        if self.send_buffer.should_encode_chunks() {
            if let Err(e) = self.send_buffer.encode_next_chunk(channel) {
                return TransportPollResult::Error(e.into());
            }
        }

        // If there is something in the send buffer, write to the stream.
        // If not, wait for outgoing messages.
        // Either way, listen to incoming messages while we do this.
        if self.send_buffer.can_read() {
            tokio::select! {
                r = self.send_buffer.read_into_async(&mut self.write) => {
                    if let Err(e) = r {
                        error!("write bytes task failed: {}", e);
                        return TransportPollResult::Closed;
                    }
                    TransportPollResult::OutgoingMessageSent
                }
                incoming = self.read.next() => {
                    self.handle_incoming_message(incoming, channel)
                }
            }
        } else {
            if self.is_closing() {
                return TransportPollResult::Closed;
            }
            let incoming = self.read.next().await;
            self.handle_incoming_message(incoming, channel)
        }
    }

    fn handle_incoming_message(
        &mut self,
        incoming: Option<Result<Message, std::io::Error>>,
        channel: &mut SecureChannel,
    ) -> TransportPollResult {
        let Some(incoming) = incoming else {
            return TransportPollResult::Closed;
        };
        match incoming {
            Ok(message) => match self.process_message(message, channel) {
                Ok(ProcessResult::Chunk) => TransportPollResult::IncomingChunk,
                Ok(ProcessResult::Message(request)) => {
                    self.pending_chunks.clear();
                    TransportPollResult::IncomingMessage(request)
                }
                Ok(ProcessResult::Abort {
                    request_id,
                    error,
                    reason,
                }) => {
                    self.pending_chunks.clear();
                    TransportPollResult::AbortRequest {
                        request_id,
                        error,
                        reason,
                    }
                }
                Err(e) => {
                    self.pending_chunks.clear();
                    if let Some((id, handle)) = e.full_context() {
                        TransportPollResult::RecoverableError(e.status(), id, handle)
                    } else {
                        TransportPollResult::Error(e.status())
                    }
                }
            },
            Err(err) => {
                error!("Error reading from stream {:?}", err);
                TransportPollResult::Error(StatusCode::BadConnectionClosed)
            }
        }
    }

    fn process_message(
        &mut self,
        message: Message,
        channel: &mut SecureChannel,
    ) -> Result<ProcessResult, Error> {
        let chunk = match message {
            Message::Chunk(chunk) => chunk,
            unexpected => {
                return Err(Error::new(
                    StatusCode::BadUnexpectedError,
                    format!("Received unexpected message: {:?}", unexpected),
                ));
            }
        };

        let header = chunk.message_header(&channel.decoding_options())?;

        // The first OPN on a fresh connection must carry channel id 0; the
        // server has not assigned one yet.
        if header.message_type.is_open_secure_channel()
            && channel.secure_channel_id() == 0
            && header.secure_channel_id != 0
        {
            return Err(Error::new(
                StatusCode::BadSecureChannelIdInvalid,
                format!(
                    "First OPN carried channel id {} instead of 0",
                    header.secure_channel_id
                ),
            ));
        }

        // Decrypt and verify up front; everything below deals in plain text
        let chunk = channel.verify_and_remove_security(&chunk.data)?;
        let chunk_info = chunk.chunk_info(channel)?;
        let request_id = chunk_info.sequence_header.request_id;

        if header.is_final == MessageIsFinalType::FinalError {
            // An abort chunk carries an error code and reason in its body.
            // Whatever was being assembled for this request is discarded.
            let body = &chunk.data[chunk_info.body_offset..];
            let abort = ErrorMessage::decode_body(body, &channel.decoding_options())?;
            self.last_received_sequence_number = chunk_info.sequence_header.sequence_number;
            return Ok(ProcessResult::Abort {
                request_id,
                error: abort.error,
                reason: abort.reason.as_ref().to_string(),
            });
        }

        if header.message_type.is_open_secure_channel() {
            // An OPN must fit in a single chunk, and it re-baselines the
            // sequence number instead of continuing the old series.
            if header.is_final != MessageIsFinalType::Final {
                return Err(Error::new(
                    StatusCode::BadRequestTooLarge,
                    "OpenSecureChannel does not fit in a single chunk",
                ));
            }
            self.last_received_sequence_number = chunk_info.sequence_header.sequence_number;
            let message = Chunker::decode(&[chunk], channel, None)?;
            return Ok(ProcessResult::Message(Request::ChannelService {
                request_id,
                message,
            }));
        }

        // A chunk for a different request id while a message is being
        // assembled means the peer implicitly abandoned the older message.
        if let Some(first) = self.pending_chunks.first() {
            let first_request_id = first.chunk_info(channel)?.sequence_header.request_id;
            if first_request_id != request_id {
                debug!(
                    "Discarding partial message {} superseded by request {}",
                    first_request_id, request_id
                );
                self.pending_chunks.clear();
            }
        }

        if self.send_buffer.max_chunk_count > 0
            && self.pending_chunks.len() == self.send_buffer.max_chunk_count
        {
            return Err(Error::decoding(format!(
                "Message has more than {} chunks, exceeding negotiated limits",
                self.send_buffer.max_chunk_count
            )));
        }
        self.pending_chunks.push(chunk);

        if header.is_final == MessageIsFinalType::Intermediate {
            return Ok(ProcessResult::Chunk);
        }

        // Final chunk - validate the series then decode the message
        self.last_received_sequence_number = Chunker::validate_chunks(
            self.last_received_sequence_number,
            channel,
            &self.pending_chunks,
        )?;

        match header.message_type {
            MessageChunkType::CloseSecureChannel => {
                let message = Chunker::decode(&self.pending_chunks, channel, None)
                    .map_err(|e| e.with_request_id(request_id))?;
                Ok(ProcessResult::Message(Request::ChannelService {
                    request_id,
                    message,
                }))
            }
            MessageChunkType::Message => self.decode_service_request(request_id, channel),
            MessageChunkType::OpenSecureChannel => {
                // Handled above; multi chunk OPNs never reach here
                Err(Error::new(
                    StatusCode::BadUnexpectedError,
                    "OPN chunk fell through to message assembly",
                ))
            }
        }
    }

    /// Concatenate the chunk bodies, read the type node id and resolve it
    /// through the type registry. Services this layer does not know are
    /// handed up as `Unsupported`.
    fn decode_service_request(
        &mut self,
        request_id: u32,
        channel: &SecureChannel,
    ) -> Result<ProcessResult, Error> {
        let mut body = Vec::new();
        for chunk in &self.pending_chunks {
            let info = chunk.chunk_info(channel)?;
            body.extend_from_slice(&chunk.data[info.body_offset..]);
        }

        let ctx_r = channel.context();
        let ctx = ctx_r.context();
        let mut stream = Cursor::new(body);
        let type_id = NodeId::decode(&mut stream, &ctx)
            .map_err(|e| e.with_request_id(request_id))?;

        match ctx.load_from_binary(&type_id, &mut stream) {
            Some(Ok(body)) => Ok(ProcessResult::Message(Request::Service {
                request_id,
                type_id,
                body,
            })),
            Some(Err(e)) => Err(e.with_request_id(request_id)),
            None => Ok(ProcessResult::Message(Request::Unsupported {
                request_id,
                type_id,
            })),
        }
    }
}

enum ProcessResult {
    Chunk,
    Message(Request),
    Abort {
        request_id: u32,
        error: StatusCode,
        reason: String,
    },
}
