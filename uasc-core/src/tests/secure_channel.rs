use uasc_crypto::SecurityPolicy;
use uasc_types::{MessageSecurityMode, StatusCode};

use crate::comms::message_chunk::{MessageChunk, MessageChunkType, MessageIsFinalType};
use crate::tests::{asymmetric_channels, symmetric_channels, unsecured_channels};

fn test_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

fn msg_chunk(
    channel: &crate::comms::secure_channel::SecureChannel,
    body: &[u8],
) -> MessageChunk {
    MessageChunk::new(
        1,
        1,
        MessageChunkType::Message,
        MessageIsFinalType::Final,
        channel,
        body,
    )
    .unwrap()
}

#[test]
fn none_policy_is_passthrough() {
    let (client, mut server) = unsecured_channels();
    let body = test_body(64);
    let chunk = msg_chunk(&client, &body);

    let mut wire = vec![0u8; chunk.data.len() + 4096];
    let size = client.apply_security(&chunk, &mut wire).unwrap();
    assert_eq!(&wire[..size], &chunk.data[..]);

    let received = server.verify_and_remove_security(&wire[..size]).unwrap();
    assert_eq!(received.data, chunk.data);
}

#[test]
fn symmetric_sign_round_trip() {
    let (client, mut server) = symmetric_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::Sign,
    );
    let body = test_body(100);
    let chunk = msg_chunk(&client, &body);

    let mut wire = vec![0u8; chunk.data.len() + 4096];
    let size = client.apply_security(&chunk, &mut wire).unwrap();
    // Sign mode appends a signature but does not encrypt
    assert_eq!(
        size,
        chunk.data.len() + SecurityPolicy::Basic256Sha256.symmetric_signature_size()
    );
    assert_eq!(&wire[..chunk.data.len()], &chunk.data[..]);

    let received = server.verify_and_remove_security(&wire[..size]).unwrap();
    assert_eq!(received.data, chunk.data);
}

#[test]
fn symmetric_sign_detects_tampering() {
    let (client, mut server) = symmetric_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::Sign,
    );
    let chunk = msg_chunk(&client, &test_body(100));

    let mut wire = vec![0u8; chunk.data.len() + 4096];
    let size = client.apply_security(&chunk, &mut wire).unwrap();

    // Flip a body byte
    wire[30] ^= 0xFF;
    let err = server.verify_and_remove_security(&wire[..size]).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSecurityChecksFailed);
}

#[test]
fn symmetric_sign_and_encrypt_round_trip() {
    for policy in [
        SecurityPolicy::Basic128Rsa15,
        SecurityPolicy::Basic256,
        SecurityPolicy::Basic256Sha256,
    ] {
        for body_len in [1usize, 15, 16, 17, 100, 255, 1000] {
            let (client, mut server) =
                symmetric_channels(policy, MessageSecurityMode::SignAndEncrypt);
            let body = test_body(body_len);
            let chunk = msg_chunk(&client, &body);

            let mut wire = vec![0u8; chunk.data.len() + 4096];
            let size = client.apply_security(&chunk, &mut wire).unwrap();

            // The encrypted region starts after the chunk and symmetric
            // security headers and is always a whole number of cipher blocks
            let encrypted_offset = 12 + 4;
            assert_eq!(
                (size - encrypted_offset) % policy.plain_block_size(),
                0,
                "policy {} body {}",
                policy,
                body_len
            );
            // Cipher text differs from the plain text
            assert_ne!(&wire[..chunk.data.len()], &chunk.data[..]);

            let received = server.verify_and_remove_security(&wire[..size]).unwrap();
            assert_eq!(received.data, chunk.data, "policy {} body {}", policy, body_len);
        }
    }
}

#[test]
fn unknown_token_is_rejected() {
    let (client, mut server) = symmetric_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
    );
    let chunk = msg_chunk(&client, &test_body(64));
    let mut wire = vec![0u8; chunk.data.len() + 4096];
    let size = client.apply_security(&chunk, &mut wire).unwrap();

    // Patch a different token id into the symmetric security header at
    // offset 12. The message was secured under token 1, the receiver has no
    // keys for token 2.
    wire[12] = 2;
    let err = server.verify_and_remove_security(&wire[..size]).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSecureChannelTokenUnknown);
}

#[test]
fn renewed_token_keeps_previous_keys_in_overlap_window() {
    let (client, mut server) = symmetric_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
    );

    // A message secured under token 1
    let chunk = msg_chunk(&client, &test_body(64));
    let mut wire = vec![0u8; chunk.data.len() + 4096];
    let size = client.apply_security(&chunk, &mut wire).unwrap();
    let wire = &wire[..size];

    // Renew on the server side: new token id, fresh nonces and keys. The
    // token 1 keys stay behind in the overlap window.
    server.set_token_id(2);
    server.create_random_nonce();
    let server_nonce = server.local_nonce().to_vec();
    server.set_remote_nonce(&server_nonce);
    server.derive_keys();

    // The old message still verifies
    let received = server.verify_and_remove_security(wire).unwrap();
    assert_eq!(received.data, chunk.data);
}

#[test]
fn asymmetric_opn_round_trip() {
    for policy in [
        SecurityPolicy::Basic128Rsa15,
        SecurityPolicy::Basic256,
        SecurityPolicy::Basic256Sha256,
    ] {
        let (client, mut server) = asymmetric_channels(policy);

        let body = test_body(200);
        let chunk = MessageChunk::new(
            1,
            1,
            MessageChunkType::OpenSecureChannel,
            MessageIsFinalType::Final,
            &client,
            &body,
        )
        .unwrap();

        let mut wire = vec![0u8; chunk.data.len() + 4096];
        let size = client.apply_security(&chunk, &mut wire).unwrap();
        // OPN is always encrypted when the policy is secure
        assert_ne!(size, chunk.data.len());

        let received = server.verify_and_remove_security(&wire[..size]).unwrap();
        assert_eq!(received.data, chunk.data, "policy {}", policy);
    }
}

#[test]
fn asymmetric_opn_rejects_wrong_thumbprint() {
    // The client encrypts for a different certificate than the one the
    // server holds; the thumbprint in the security header will not match.
    let (mut client, mut server) = asymmetric_channels(SecurityPolicy::Basic256Sha256);
    let (_, other_cert, _) = crate::tests::test_identity("someone else");
    client.set_remote_cert(Some(other_cert));

    let chunk = MessageChunk::new(
        1,
        1,
        MessageChunkType::OpenSecureChannel,
        MessageIsFinalType::Final,
        &client,
        &test_body(100),
    )
    .unwrap();
    let mut wire = vec![0u8; chunk.data.len() + 4096];
    let size = client.apply_security(&chunk, &mut wire).unwrap();

    let err = server.verify_and_remove_security(&wire[..size]).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSecurityChecksFailed);
}

#[test]
fn asymmetric_opn_rejects_unpinned_server_cert() {
    // A client with a pinned server certificate rejects an OPN response
    // from any other certificate. The server is the sender here.
    let (mut client, server) = asymmetric_channels(SecurityPolicy::Basic256Sha256);
    // Pin a different certificate than the peer actually uses
    let (_, pinned_cert, _) = crate::tests::test_identity("expected server");
    client.set_pinned_remote_cert(Some(pinned_cert));

    let chunk = MessageChunk::new(
        1,
        1,
        MessageChunkType::OpenSecureChannel,
        MessageIsFinalType::Final,
        &server,
        &test_body(100),
    )
    .unwrap();
    let mut wire = vec![0u8; chunk.data.len() + 4096];
    let size = server.apply_security(&chunk, &mut wire).unwrap();

    let err = client.verify_and_remove_security(&wire[..size]).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSecurityChecksFailed);
}

#[test]
fn opn_with_none_policy_rejects_certificates() {
    use crate::comms::security_header::{AsymmetricSecurityHeader, SecurityHeader};
    use uasc_types::{ByteString, SimpleBinaryEncodable, UAString};

    // Handcraft an OPN chunk whose header claims policy None but still
    // carries a certificate - the receiver must reject it.
    let (_, mut server) = unsecured_channels();
    let header = SecurityHeader::Asymmetric(AsymmetricSecurityHeader {
        security_policy_uri: UAString::from(SecurityPolicy::None.to_uri()),
        sender_certificate: ByteString::from(&[1u8, 2, 3]),
        receiver_certificate_thumbprint: ByteString::null(),
    });

    let mut data = Vec::new();
    // Chunk header: OPN, final, size patched below, channel id 0
    data.extend_from_slice(b"OPNF");
    data.extend_from_slice(&[0u8; 4]);
    data.extend_from_slice(&0u32.to_le_bytes());
    header.encode(&mut data).unwrap();
    // Sequence header and a trivial body
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    let size = (data.len() as u32).to_le_bytes();
    data[4..8].copy_from_slice(&size);

    let err = server.verify_and_remove_security(&data).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSecurityChecksFailed);
}
