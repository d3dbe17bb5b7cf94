use bytes::BytesMut;
use tokio_util::codec::Decoder;

use uasc_types::{DecodingOptions, SimpleBinaryEncodable};

use crate::comms::tcp_codec::{Message, TcpCodec};
use crate::comms::tcp_types::HelloMessage;

fn hello_bytes() -> Vec<u8> {
    HelloMessage::new("opc.tcp://localhost:4840/", 65536, 65536, 0, 0).encode_to_vec()
}

#[test]
fn decode_whole_message() {
    let mut codec = TcpCodec::new(DecodingOptions::test());
    let mut buf = BytesMut::from(&hello_bytes()[..]);
    let msg = codec.decode(&mut buf).unwrap();
    assert!(matches!(msg, Some(Message::Hello(_))));
    assert!(buf.is_empty());
}

#[test]
fn decode_byte_at_a_time() {
    // Bytes dribbled in one at a time produce the same message - the codec
    // waits for the header, then for the full body
    let bytes = hello_bytes();
    let mut codec = TcpCodec::new(DecodingOptions::test());
    let mut buf = BytesMut::new();
    for (i, b) in bytes.iter().enumerate() {
        buf.extend_from_slice(&[*b]);
        let msg = codec.decode(&mut buf).unwrap();
        if i < bytes.len() - 1 {
            assert!(msg.is_none(), "unexpected message after {} bytes", i + 1);
        } else {
            assert!(matches!(msg, Some(Message::Hello(_))));
        }
    }
}

#[test]
fn decode_two_messages_back_to_back() {
    let mut bytes = hello_bytes();
    bytes.extend_from_slice(&hello_bytes());
    let mut codec = TcpCodec::new(DecodingOptions::test());
    let mut buf = BytesMut::from(&bytes[..]);
    assert!(matches!(
        codec.decode(&mut buf).unwrap(),
        Some(Message::Hello(_))
    ));
    assert!(matches!(
        codec.decode(&mut buf).unwrap(),
        Some(Message::Hello(_))
    ));
    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn reject_bad_message_type() {
    let mut bytes = hello_bytes();
    // Corrupt the message type
    bytes[0] = b'X';
    let mut codec = TcpCodec::new(DecodingOptions::test());
    let mut buf = BytesMut::from(&bytes[..]);
    assert!(codec.decode(&mut buf).is_err());
}

#[test]
fn reject_bad_reserved_byte() {
    let mut bytes = hello_bytes();
    // The reserved byte of a HEL must be 'F'
    bytes[3] = b'C';
    let mut codec = TcpCodec::new(DecodingOptions::test());
    let mut buf = BytesMut::from(&bytes[..]);
    assert!(codec.decode(&mut buf).is_err());
}

#[test]
fn reject_undersized_message_size() {
    let mut bytes = hello_bytes();
    // A message size smaller than the header itself is nonsense
    bytes[4..8].copy_from_slice(&4u32.to_le_bytes());
    let mut codec = TcpCodec::new(DecodingOptions::test());
    let mut buf = BytesMut::from(&bytes[..]);
    assert!(codec.decode(&mut buf).is_err());
}

#[test]
fn reject_oversized_message() {
    let mut options = DecodingOptions::test();
    options.max_message_size = 16;
    let mut codec = TcpCodec::new(options);
    let mut buf = BytesMut::from(&hello_bytes()[..]);
    assert!(codec.decode(&mut buf).is_err());
}
