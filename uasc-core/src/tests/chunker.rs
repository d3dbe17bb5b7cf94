use uasc_types::{
    ByteString, DateTime, MessageSecurityMode, NodeId, RequestHeader, SecurityTokenRequestType,
    StatusCode, UAString,
};

use crate::comms::chunker::Chunker;
use crate::comms::message_chunk::MessageIsFinalType;
use crate::comms::secure_channel::next_sequence_number;
use crate::tests::unsecured_channels;
use crate::{Message, RequestMessage};

use uasc_types::OpenSecureChannelRequest;

fn open_secure_channel_request() -> RequestMessage {
    OpenSecureChannelRequest {
        request_header: RequestHeader::new(&NodeId::null(), &DateTime::now(), 1),
        client_protocol_version: 0,
        request_type: SecurityTokenRequestType::Issue,
        security_mode: MessageSecurityMode::None,
        client_nonce: ByteString::null(),
        requested_lifetime: 60_000,
    }
    .into()
}

fn large_request(body_size: usize) -> RequestMessage {
    // The audit entry string bloats the message body to force chunking
    let mut request = OpenSecureChannelRequest::default();
    request.request_header = RequestHeader::new(&NodeId::null(), &DateTime::now(), 7);
    request.request_header.audit_entry_id = UAString::from("x".repeat(body_size));
    request.requested_lifetime = 60_000;
    request.into()
}

#[test]
fn single_chunk_round_trip() {
    let (client, _server) = unsecured_channels();
    let request = open_secure_channel_request();

    let chunks = Chunker::encode(1, 99, 0, 0, &client, &request).unwrap();
    assert_eq!(chunks.len(), 1);

    let info = chunks[0].chunk_info(&client).unwrap();
    assert_eq!(info.message_header.is_final, MessageIsFinalType::Final);
    assert_eq!(info.sequence_header.sequence_number, 1);
    assert_eq!(info.sequence_header.request_id, 99);

    let decoded: RequestMessage = Chunker::decode(&chunks, &client, None).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn multi_chunk_split_and_reassemble() {
    let (client, server) = unsecured_channels();
    // ~20k of body with an 8192 byte chunk size needs 3 chunks
    let request = large_request(20_000);

    let chunks = Chunker::encode(1, 42, 0, 8192, &client, &request).unwrap();
    assert_eq!(chunks.len(), 3);

    // All chunks intermediate except the last, contiguous sequence numbers,
    // one request id
    for (i, chunk) in chunks.iter().enumerate() {
        let info = chunk.chunk_info(&client).unwrap();
        let expected = if i == chunks.len() - 1 {
            MessageIsFinalType::Final
        } else {
            MessageIsFinalType::Intermediate
        };
        assert_eq!(info.message_header.is_final, expected);
        assert_eq!(info.sequence_header.sequence_number, 1 + i as u32);
        assert_eq!(info.sequence_header.request_id, 42);
        // The message length field matches the actual chunk length
        assert_eq!(info.message_header.message_size as usize, chunk.data.len());
    }

    // Receiver side validation accepts the series and reassembly is exact
    let last = Chunker::validate_chunks(0, &server, &chunks).unwrap();
    assert_eq!(last, 3);
    let decoded: RequestMessage = Chunker::decode(&chunks, &server, None).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn message_size_limit_fails_before_sending() {
    let (client, _) = unsecured_channels();
    let request = large_request(20_000);
    let err = Chunker::encode(1, 1, 8192, 8192, &client, &request).unwrap_err();
    // Client role maps to BadRequestTooLarge
    assert_eq!(err.status(), StatusCode::BadRequestTooLarge);

    let (_, server) = unsecured_channels();
    let err = Chunker::encode(1, 1, 8192, 8192, &server, &request).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadResponseTooLarge);
}

#[test]
fn validate_chunks_rejects_gaps() {
    let (client, server) = unsecured_channels();
    let request = large_request(20_000);
    let mut chunks = Chunker::encode(1, 42, 0, 8192, &client, &request).unwrap();

    // Drop the middle chunk - the gap in sequence numbers must be detected
    chunks.remove(1);
    let err = Chunker::validate_chunks(0, &server, &chunks).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSequenceNumberInvalid);
}

#[test]
fn validate_chunks_rejects_mixed_request_ids() {
    let (client, server) = unsecured_channels();
    let request = large_request(20_000);
    let mut chunks = Chunker::encode(1, 42, 0, 8192, &client, &request).unwrap();

    // Patch a different request id into the second chunk. The request id
    // follows the 4 byte sequence number in the sequence header.
    let request_id_offset = chunks[1].chunk_info(&client).unwrap().sequence_header_offset + 4;
    chunks[1].data[request_id_offset] = 43;
    let err = Chunker::validate_chunks(0, &server, &chunks).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSequenceNumberInvalid);
}

#[test]
fn validate_chunks_accepts_wrap_window() {
    let (client, server) = unsecured_channels();
    let request = open_secure_channel_request();

    // A chunk sent just past the wrap limit wraps to 1
    let start = u32::MAX - 2;
    let chunks = Chunker::encode(start, 5, 0, 0, &client, &request).unwrap();
    let last = Chunker::validate_chunks(start - 1, &server, &chunks).unwrap();
    assert_eq!(last, start);

    let wrapped = Chunker::encode(next_sequence_number(start), 6, 0, 0, &client, &request).unwrap();
    let last = Chunker::validate_chunks(last, &server, &wrapped).unwrap();
    assert_eq!(last, 1);
}

#[test]
fn unknown_service_is_rejected() {
    use std::io::Write;

    let (client, server) = unsecured_channels();
    let request = open_secure_channel_request();
    let chunks = Chunker::encode(1, 1, 0, 0, &client, &request).unwrap();

    // Patch the type id in the body to something unknown. The encoded node
    // id is the four byte form 0x01 0x00 <id u16> at the body offset.
    let mut chunk = crate::comms::message_chunk::MessageChunk {
        data: chunks[0].data.clone(),
    };
    let info = chunk.chunk_info(&client).unwrap();
    let mut body = &mut chunk.data[info.body_offset..];
    body.write_all(&[0x01, 0x00, 0xFF, 0x7F]).unwrap();

    let err = Chunker::decode::<RequestMessage>(&[chunk], &server, None).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadServiceUnsupported);
}

#[test]
fn expected_node_id_mismatch_is_rejected() {
    let (client, server) = unsecured_channels();
    let request = open_secure_channel_request();
    let chunks = Chunker::encode(1, 1, 0, 0, &client, &request).unwrap();

    let err = Chunker::decode::<RequestMessage>(
        &chunks,
        &server,
        Some(NodeId::new(0, 999u32)),
    )
    .unwrap_err();
    assert!(err.status().is_bad());
}

#[test]
fn messages_encode_with_type_id_prefix() {
    // The body of the first chunk starts with the node id of the message type
    let (client, _) = unsecured_channels();
    let request = open_secure_channel_request();
    let chunks = Chunker::encode(1, 1, 0, 0, &client, &request).unwrap();
    let info = chunks[0].chunk_info(&client).unwrap();
    let body = &chunks[0].data[info.body_offset..];
    // Four byte node id form: 0x01, namespace 0, 446 little-endian
    assert_eq!(&body[0..4], &[0x01, 0x00, 0xBE, 0x01]);

    let type_id = Message::type_id(&request);
    assert_eq!(type_id, NodeId::new(0, 446u32));
}
