// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The [SendBuffer] stages outgoing messages on their way to the socket:
//! messages are cut into chunks, each chunk has security applied as it is
//! moved into the write buffer, and the staged bytes are written to the
//! stream as a single transaction.
//!
//! A connection owns exactly one send buffer inside its connection task,
//! which is what guarantees at most one in-flight message per connection
//! and keeps the chunks of a message contiguous on the wire.

use std::collections::VecDeque;
use std::io::{Cursor, Seek, SeekFrom};

use log::error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use uasc_types::{Error, SimpleBinaryEncodable, StatusCode};

use crate::{Message, MessageType};

use super::{
    chunker::Chunker,
    message_chunk::{MessageChunk, MessageChunkType, MessageIsFinalType},
    secure_channel::{next_sequence_number, SecureChannel},
    tcp_types::{ErrorMessage, MIN_CHUNK_SIZE},
};

/// Margin on top of a chunk for the expansion caused by asymmetric
/// encryption, whose cipher blocks are larger than its plain blocks.
const CHUNK_EXPANSION_MARGIN: usize = 4096;

/// Staging buffer for outgoing messages on one connection.
pub struct SendBuffer {
    /// The send buffer
    buffer: Cursor<Vec<u8>>,
    /// Queued chunks
    chunks: VecDeque<MessageChunk>,
    /// The last sequence number sent on this connection
    last_sent_sequence_number: u32,
    /// Maximum size of a message, total. Use 0 for no limit
    pub max_message_size: usize,
    /// Maximum number of chunks in a message. Use 0 for no limit
    pub max_chunk_count: usize,
    /// Maximum size of each individual chunk
    pub send_buffer_size: usize,
}

impl SendBuffer {
    /// Create a new send buffer with the local configuration. Call
    /// [SendBuffer::revise] once the HELLO/ACK exchange has produced the
    /// negotiated values.
    pub fn new(buffer_size: usize, max_message_size: usize, max_chunk_count: usize) -> Self {
        Self {
            buffer: Cursor::new(Vec::with_capacity(buffer_size + CHUNK_EXPANSION_MARGIN)),
            chunks: VecDeque::new(),
            last_sent_sequence_number: 0,
            max_message_size,
            max_chunk_count,
            send_buffer_size: buffer_size,
        }
    }

    /// Revise the sizes down to the values negotiated in the HELLO/ACK
    /// handshake. Sizes may only shrink; zero means no limit so any
    /// non-zero revision replaces it.
    pub fn revise(
        &mut self,
        send_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) {
        if self.send_buffer_size > send_buffer_size {
            self.send_buffer_size = send_buffer_size.max(MIN_CHUNK_SIZE);
        }
        if self.max_message_size > max_message_size && max_message_size > 0 {
            self.max_message_size = max_message_size;
        }
        if self.max_chunk_count > max_chunk_count && max_chunk_count > 0 {
            self.max_chunk_count = max_chunk_count;
        }
    }

    /// Whether there are staged bytes waiting to be written to the socket.
    pub fn can_read(&self) -> bool {
        (self.buffer.position() as usize) < self.buffer.get_ref().len()
    }

    /// Whether there are chunks waiting to have security applied. Chunks are
    /// only staged when the write buffer has been fully drained, so that one
    /// socket transaction carries one secured chunk.
    pub fn should_encode_chunks(&self) -> bool {
        !self.chunks.is_empty() && !self.can_read()
    }

    /// Apply security to the next queued chunk and stage its bytes for writing.
    pub fn encode_next_chunk(&mut self, secure_channel: &SecureChannel) -> Result<(), Error> {
        let Some(chunk) = self.chunks.pop_front() else {
            return Ok(());
        };

        let mut dst = vec![0u8; chunk.data.len() + CHUNK_EXPANSION_MARGIN];
        let size = secure_channel.apply_security(&chunk, &mut dst)?;

        self.buffer.get_mut().clear();
        self.buffer.seek(SeekFrom::Start(0)).map_err(Error::from)?;
        self.buffer.get_mut().extend_from_slice(&dst[..size]);
        Ok(())
    }

    /// Encode an outgoing message into chunks and queue them.
    ///
    /// A message that is too large for the negotiated maximum message size
    /// fails outright with nothing queued. A message needing more than the
    /// negotiated chunk count is truncated to the first `max_chunk_count`
    /// chunks, all intermediate, followed by an abort chunk so the peer
    /// drops the partial message.
    pub fn write(
        &mut self,
        request_id: u32,
        message: impl Message,
        secure_channel: &SecureChannel,
    ) -> Result<u32, Error> {
        let message_type = message.message_type();
        let sequence_number = next_sequence_number(self.last_sent_sequence_number);
        let mut chunks = Chunker::encode(
            sequence_number,
            request_id,
            self.max_message_size,
            self.send_buffer_size,
            secure_channel,
            &message,
        )?;

        // An OpenSecureChannel message must fit in a single chunk (Part 6 6.7.2)
        if message_type == MessageChunkType::OpenSecureChannel && chunks.len() > 1 {
            let error = if secure_channel.is_client_role() {
                StatusCode::BadRequestTooLarge
            } else {
                StatusCode::BadResponseTooLarge
            };
            return Err(Error::new(
                error,
                "OpenSecureChannel does not fit in a single chunk",
            )
            .with_request_id(request_id));
        }

        if self.max_chunk_count > 0 && chunks.len() > self.max_chunk_count {
            // The message does not fit in the negotiated chunk count. The
            // chunks up to the limit are sent as intermediate chunks and an
            // abort chunk replaces the rest.
            error!(
                "Message requires {} chunks, exceeding the negotiated count {}; aborting it",
                chunks.len(),
                self.max_chunk_count
            );
            let error = if secure_channel.is_client_role() {
                StatusCode::BadRequestTooLarge
            } else {
                StatusCode::BadResponseTooLarge
            };
            chunks.truncate(self.max_chunk_count);
            let abort_sequence_number = self
                .peek_chunk_sequence_number(chunks.last(), secure_channel)
                .map(next_sequence_number)
                .unwrap_or(sequence_number);
            let abort = ErrorMessage::new(error, "Message exceeds the negotiated chunk count");
            let abort_chunk = MessageChunk::new(
                abort_sequence_number,
                request_id,
                MessageChunkType::Message,
                MessageIsFinalType::FinalError,
                secure_channel,
                &abort.encode_body()?,
            )?;
            self.last_sent_sequence_number = abort_sequence_number;
            self.chunks.extend(chunks.drain(..));
            self.chunks.push_back(abort_chunk);
            return Err(Error::new(
                error,
                "Message exceeds the negotiated chunk count, an abort chunk was queued",
            )
            .with_request_id(request_id));
        }

        self.last_sent_sequence_number = self
            .peek_chunk_sequence_number(chunks.last(), secure_channel)
            .unwrap_or(self.last_sent_sequence_number);
        self.chunks.extend(chunks.drain(..));
        Ok(request_id)
    }

    /// Queue a transport error message. It bypasses chunking since it is a
    /// raw `ERR` message, not a chunk.
    pub fn write_error(&mut self, error: ErrorMessage) {
        // There is no security on an ERR message, stage it directly
        self.buffer.get_mut().clear();
        let _ = self.buffer.seek(SeekFrom::Start(0));
        let mut bytes = Vec::with_capacity(error.byte_len());
        if error.encode(&mut bytes).is_ok() {
            self.buffer.get_mut().extend_from_slice(&bytes);
        }
    }

    /// Write staged bytes into the stream. Partial writes leave the
    /// remainder staged, so this is safe to cancel and call again.
    pub async fn read_into_async<W: AsyncWrite + Unpin>(
        &mut self,
        write: &mut W,
    ) -> std::io::Result<()> {
        let pos = self.buffer.position() as usize;
        let end = self.buffer.get_ref().len();
        if pos >= end {
            return Ok(());
        }
        let written = {
            let data = &self.buffer.get_ref()[pos..end];
            write.write(data).await?
        };
        let new_pos = pos + written;
        self.buffer.set_position(new_pos as u64);
        if new_pos == end {
            self.buffer.get_mut().clear();
            self.buffer.set_position(0);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn queued_chunks(&self) -> &VecDeque<MessageChunk> {
        &self.chunks
    }

    fn peek_chunk_sequence_number(
        &self,
        chunk: Option<&MessageChunk>,
        secure_channel: &SecureChannel,
    ) -> Option<u32> {
        chunk
            .and_then(|c| c.chunk_info(secure_channel).ok())
            .map(|info| info.sequence_header.sequence_number)
    }
}
