mod buffer;
mod chunker;
mod secure_channel;
mod tcp_codec;

use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::RwLock;

use uasc_crypto::{CertificateStore, PrivateKey, SecurityPolicy, X509};
use uasc_types::{
    BinaryEncodable, ByteString, Context, ContextOwned, EncodingResult, Error,
    MessageSecurityMode, NodeId, ObjectId, StatusCode,
};

use crate::comms::message_chunk::MessageChunkType;
use crate::comms::secure_channel::{Role, SecureChannel};
use crate::{Message, MessageType};

/// A message with an arbitrary type id and body carried in plain `MSG`
/// chunks, for tests that need message bodies without a real service.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueMessage {
    pub type_id: NodeId,
    pub body: ByteString,
}

impl BinaryEncodable for OpaqueMessage {
    fn byte_len(&self, ctx: &Context<'_>) -> usize {
        self.body.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S, ctx: &Context<'_>) -> EncodingResult<()> {
        self.body.encode(stream, ctx)
    }
}

impl MessageType for OpaqueMessage {
    fn message_type(&self) -> MessageChunkType {
        MessageChunkType::Message
    }
}

impl Message for OpaqueMessage {
    fn request_handle(&self) -> u32 {
        0
    }

    fn decode_by_object_id<S: Read>(
        _stream: &mut S,
        object_id: ObjectId,
        _ctx: &Context<'_>,
    ) -> EncodingResult<Self> {
        Err(Error::new(
            StatusCode::BadServiceUnsupported,
            format!("OpaqueMessage cannot decode {:?}", object_id),
        ))
    }

    fn type_id(&self) -> NodeId {
        self.type_id.clone()
    }
}

/// A pair of unsecured channels, as they would exist on either end of a
/// connection before or without an OPN exchange.
pub fn unsecured_channels() -> (SecureChannel, SecureChannel) {
    let client = SecureChannel::new_no_certificate_store(Role::Client);
    let server = SecureChannel::new_no_certificate_store(Role::Server);
    (client, server)
}

/// A pair of channels secured symmetrically, with nonces exchanged and keys
/// derived on both sides, as they would be after a completed OPN exchange.
pub fn symmetric_channels(
    policy: SecurityPolicy,
    mode: MessageSecurityMode,
) -> (SecureChannel, SecureChannel) {
    let mut client = SecureChannel::new_no_certificate_store(Role::Client);
    let mut server = SecureChannel::new_no_certificate_store(Role::Server);
    for channel in [&mut client, &mut server] {
        channel.set_security_policy(policy);
        channel.set_security_mode(mode);
        channel.set_secure_channel_id(0xDEAD);
        channel.set_token_id(1);
        channel.set_token_lifetime(60_000);
    }

    client.create_random_nonce();
    server.create_random_nonce();
    let client_nonce = client.local_nonce().to_vec();
    let server_nonce = server.local_nonce().to_vec();
    client.set_remote_nonce(&server_nonce);
    server.set_remote_nonce(&client_nonce);
    client.derive_keys();
    server.derive_keys();

    (client, server)
}

/// An application identity for asymmetric tests - a fresh key pair with a
/// self signed certificate in a trust-all store.
pub fn test_identity(common_name: &str) -> (Arc<RwLock<CertificateStore>>, X509, PrivateKey) {
    let key = PrivateKey::new(1024).unwrap();
    let cert = X509::new_self_signed(&key, common_name, 365).unwrap();
    let mut store = CertificateStore::new_with_cert(cert.clone(), key.clone());
    store.set_trust_unknown_certs(true);
    (Arc::new(RwLock::new(store)), cert, key)
}

/// A pair of channels set up for an asymmetric OPN exchange with self
/// signed certificates on both sides.
pub fn asymmetric_channels(policy: SecurityPolicy) -> (SecureChannel, SecureChannel) {
    let (client_store, client_cert, _) = test_identity("uasc client");
    let (server_store, server_cert, _) = test_identity("uasc server");

    let mut client = SecureChannel::new(
        client_store,
        Role::Client,
        Arc::new(RwLock::new(ContextOwned::default())),
    );
    let mut server = SecureChannel::new(
        server_store,
        Role::Server,
        Arc::new(RwLock::new(ContextOwned::default())),
    );

    client.set_security_policy(policy);
    client.set_security_mode(MessageSecurityMode::SignAndEncrypt);
    client.set_remote_cert(Some(server_cert));
    server.set_security_policy(policy);
    server.set_security_mode(MessageSecurityMode::SignAndEncrypt);
    server.set_remote_cert(Some(client_cert));

    (client, server)
}
