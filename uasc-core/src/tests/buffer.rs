use uasc_types::{ByteString, NodeId, StatusCode};

use crate::comms::buffer::SendBuffer;
use crate::comms::message_chunk::{MessageChunkType, MessageIsFinalType};
use crate::comms::tcp_types::ErrorMessage;
use crate::tests::{unsecured_channels, OpaqueMessage};

fn large_request(body_size: usize) -> OpaqueMessage {
    OpaqueMessage {
        type_id: NodeId::new(0, 59999u32),
        body: ByteString::from(vec![b'y'; body_size]),
    }
}

#[test]
fn write_and_stage_single_message() {
    let (client, _) = unsecured_channels();
    let mut buffer = SendBuffer::new(8192, 0, 0);

    let request = large_request(100);
    buffer.write(5, request, &client).unwrap();

    assert!(!buffer.can_read());
    assert!(buffer.should_encode_chunks());
    buffer.encode_next_chunk(&client).unwrap();
    assert!(buffer.can_read());
    assert!(!buffer.should_encode_chunks());
}

#[test]
fn abort_chunk_replaces_overflowing_message() {
    let (_, server) = unsecured_channels();
    // Room for two chunks, the message needs three
    let mut buffer = SendBuffer::new(8192, 0, 2);

    let request = large_request(20_000);
    let err = buffer.write(77, request, &server).unwrap_err();
    // Server role reports BadResponseTooLarge
    assert_eq!(err.status(), StatusCode::BadResponseTooLarge);

    // The first two chunks go out as intermediate, then the abort chunk
    let chunks = buffer.queued_chunks();
    assert_eq!(chunks.len(), 3);
    for (i, chunk) in chunks.iter().enumerate() {
        let info = chunk.chunk_info(&server).unwrap();
        // Contiguous sequence numbers sharing the request id
        assert_eq!(info.sequence_header.sequence_number, 1 + i as u32);
        assert_eq!(info.sequence_header.request_id, 77);
        if i < 2 {
            assert_eq!(
                info.message_header.is_final,
                MessageIsFinalType::Intermediate
            );
        } else {
            assert_eq!(info.message_header.is_final, MessageIsFinalType::FinalError);
            assert_eq!(info.message_header.message_type, MessageChunkType::Message);
            // The abort body carries the error code and reason
            let body = &chunk.data[info.body_offset..];
            let abort =
                ErrorMessage::decode_body(body, &server.decoding_options()).unwrap();
            assert_eq!(abort.error, StatusCode::BadResponseTooLarge);
            assert!(!abort.reason.is_null());
        }
    }
}

#[test]
fn sequence_numbers_continue_across_messages() {
    let (client, _) = unsecured_channels();
    let mut buffer = SendBuffer::new(8192, 0, 0);

    buffer.write(1, large_request(100), &client).unwrap();
    buffer.write(2, large_request(100), &client).unwrap();

    let chunks = buffer.queued_chunks();
    assert_eq!(chunks.len(), 2);
    let first = chunks[0].chunk_info(&client).unwrap();
    let second = chunks[1].chunk_info(&client).unwrap();
    assert_eq!(
        second.sequence_header.sequence_number,
        first.sequence_header.sequence_number + 1
    );
}

#[test]
fn error_message_bypasses_chunking() {
    let mut buffer = SendBuffer::new(8192, 0, 0);
    buffer.write_error(ErrorMessage::new(StatusCode::BadTcpMessageTypeInvalid, "bad"));
    assert!(buffer.can_read());
}
