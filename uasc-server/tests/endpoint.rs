//! End to end tests driving an [`Endpoint`] over localhost sockets with a
//! hand rolled client built from the core primitives.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::LazyLock;

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use uasc_core::comms::chunker::Chunker;
use uasc_core::comms::message_chunk::{MessageChunk, MessageChunkType, MessageIsFinalType};
use uasc_core::comms::secure_channel::{Role, SecureChannel};
use uasc_core::comms::tcp_codec::{Message as TcpMessage, TcpCodec};
use uasc_core::comms::tcp_types::{ErrorMessage, HelloMessage, MIN_CHUNK_SIZE};
use uasc_core::{Message, MessageType, RequestMessage, ResponseMessage};
use uasc_crypto::{CertificateStore, PrivateKey, SecurityPolicy, X509};
use uasc_types::{
    binary_decode_to_enc, BinaryDecodable, BinaryEncodable, ChannelSecurityToken,
    Context, DateTime, DecodingOptions, EncodingResult, ExpandedMessageInfo, ExpandedNodeId,
    MessageSecurityMode, NodeId, ObjectId, OpenSecureChannelRequest, RequestHeader,
    SecurityTokenRequestType, StaticTypeLoader, StatusCode,
    TypeLoaderCollection, TypeLoaderInstance, UAString,
};

use uasc_server::{Endpoint, EndpointConfig, EndpointEvent, SecurityPolicyConfig};

// A test service type registered under the core namespace with ids far away
// from any real ones.
const TEST_DATA_TYPE_ID: u32 = 59991;
const TEST_ENCODING_ID: u32 = 59992;

#[derive(Debug, Clone, PartialEq, Default)]
struct PingRequest {
    payload: UAString,
}

impl BinaryEncodable for PingRequest {
    fn byte_len(&self, ctx: &Context<'_>) -> usize {
        self.payload.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S, ctx: &Context<'_>) -> EncodingResult<()> {
        self.payload.encode(stream, ctx)
    }
}

impl BinaryDecodable for PingRequest {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &Context<'_>) -> EncodingResult<Self> {
        Ok(PingRequest {
            payload: UAString::decode(stream, ctx)?,
        })
    }
}

impl ExpandedMessageInfo for PingRequest {
    fn full_type_id(&self) -> ExpandedNodeId {
        ExpandedNodeId::new(NodeId::new(0, TEST_ENCODING_ID))
    }

    fn full_data_type_id(&self) -> ExpandedNodeId {
        ExpandedNodeId::new(NodeId::new(0, TEST_DATA_TYPE_ID))
    }
}

static PING_TYPES: LazyLock<TypeLoaderInstance> = LazyLock::new(|| {
    let mut inst = TypeLoaderInstance::new();
    inst.add_binary_type(
        TEST_DATA_TYPE_ID,
        TEST_ENCODING_ID,
        binary_decode_to_enc::<PingRequest>,
    );
    inst
});

struct PingTypeLoader;

impl StaticTypeLoader for PingTypeLoader {
    fn instance() -> &'static TypeLoaderInstance {
        &PING_TYPES
    }

    fn namespace() -> &'static str {
        "http://opcfoundation.org/UA/"
    }
}

/// An arbitrary message the client can push through the chunker, with a
/// type id the server may or may not recognize.
#[derive(Debug, Clone, PartialEq)]
struct OpaqueMessage<T> {
    type_id: NodeId,
    body: T,
}

impl<T: BinaryEncodable> BinaryEncodable for OpaqueMessage<T> {
    fn byte_len(&self, ctx: &Context<'_>) -> usize {
        self.body.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S, ctx: &Context<'_>) -> EncodingResult<()> {
        self.body.encode(stream, ctx)
    }
}

impl<T> MessageType for OpaqueMessage<T> {
    fn message_type(&self) -> MessageChunkType {
        MessageChunkType::Message
    }
}

impl<T: BinaryEncodable + BinaryDecodable + std::fmt::Debug> Message for OpaqueMessage<T> {
    fn request_handle(&self) -> u32 {
        0
    }

    fn decode_by_object_id<S: Read>(
        _stream: &mut S,
        _object_id: ObjectId,
        _ctx: &Context<'_>,
    ) -> EncodingResult<Self> {
        Err(uasc_types::Error::decoding("not decodable on the client"))
    }

    fn type_id(&self) -> NodeId {
        self.type_id.clone()
    }
}

/// The hand rolled client side of a connection.
#[derive(Debug)]
struct TestClient {
    read: FramedRead<ReadHalf<TcpStream>, TcpCodec>,
    write: WriteHalf<TcpStream>,
    channel: SecureChannel,
    sequence_number: u32,
    request_id: u32,
}

impl TestClient {
    async fn connect(addr: std::net::SocketAddr, endpoint_url: &str) -> TestClient {
        Self::connect_with_hello(
            addr,
            HelloMessage::new(endpoint_url, 65536, 65536, 0, 0),
            SecureChannel::new_no_certificate_store(Role::Client),
        )
        .await
        .expect("handshake failed")
    }

    async fn connect_with_hello(
        addr: std::net::SocketAddr,
        hello: HelloMessage,
        channel: SecureChannel,
    ) -> Result<TestClient, StatusCode> {
        let stream = TcpStream::connect(addr).await.expect("connect failed");
        let (read, mut write) = tokio::io::split(stream);
        let mut read = FramedRead::new(read, TcpCodec::new(DecodingOptions::test()));

        write
            .write_all(&uasc_types::SimpleBinaryEncodable::encode_to_vec(&hello))
            .await
            .expect("write hello");

        match read.next().await {
            Some(Ok(TcpMessage::Acknowledge(_ack))) => Ok(TestClient {
                read,
                write,
                channel,
                sequence_number: 0,
                request_id: 0,
            }),
            Some(Ok(TcpMessage::Error(e))) => Err(e.error),
            other => panic!("Expected ACK or ERR, got {:?}", other),
        }
    }

    async fn send_message(&mut self, message: &impl Message) -> u32 {
        self.request_id += 1;
        self.sequence_number += 1;
        let chunks = Chunker::encode(
            self.sequence_number,
            self.request_id,
            0,
            8192,
            &self.channel,
            message,
        )
        .expect("encode chunks");
        self.sequence_number += chunks.len() as u32 - 1;
        for chunk in &chunks {
            self.send_chunk(chunk).await;
        }
        self.request_id
    }

    async fn send_chunk(&mut self, chunk: &MessageChunk) {
        let mut wire = vec![0u8; chunk.data.len() + 4096];
        let size = self.channel.apply_security(chunk, &mut wire).expect("apply security");
        self.write.write_all(&wire[..size]).await.expect("write chunk");
    }

    async fn recv_response(&mut self) -> ResponseMessage {
        let mut chunks = Vec::new();
        loop {
            match self.read.next().await {
                Some(Ok(TcpMessage::Chunk(chunk))) => {
                    let header = chunk.message_header(&DecodingOptions::test()).unwrap();
                    let chunk = self
                        .channel
                        .verify_and_remove_security(&chunk.data)
                        .expect("verify chunk");
                    chunks.push(chunk);
                    if header.is_final == MessageIsFinalType::Final {
                        break;
                    }
                }
                other => panic!("Expected chunk, got {:?}", other),
            }
        }
        Chunker::decode(&chunks, &self.channel, None).expect("decode response")
    }

    async fn recv_error(&mut self) -> ErrorMessage {
        match self.read.next().await {
            Some(Ok(TcpMessage::Error(e))) => e,
            other => panic!("Expected ERR, got {:?}", other),
        }
    }

    fn open_request(
        &self,
        request_type: SecurityTokenRequestType,
        mode: MessageSecurityMode,
        requested_lifetime: u32,
    ) -> RequestMessage {
        OpenSecureChannelRequest {
            request_header: RequestHeader::new(&NodeId::null(), &DateTime::now(), 1),
            client_protocol_version: 0,
            request_type,
            security_mode: mode,
            client_nonce: self.channel.local_nonce_as_byte_string(),
            requested_lifetime,
        }
        .into()
    }

    async fn open_secure_channel(&mut self) -> ChannelSecurityToken {
        let request = self.open_request(
            SecurityTokenRequestType::Issue,
            MessageSecurityMode::None,
            60_000,
        );
        self.send_message(&request).await;
        let response = self.recv_response().await;
        let ResponseMessage::OpenSecureChannel(response) = response else {
            panic!("Expected OPN response, got {:?}", response);
        };
        self.channel.set_security_token(response.security_token);
        response.security_token
    }
}

async fn spawn_endpoint(
    config: EndpointConfig,
) -> (std::net::SocketAddr, mpsc::Receiver<EndpointEvent>, CancellationToken) {
    spawn_endpoint_with(config, CertificateStore::new(), TypeLoaderCollection::new()).await
}

async fn spawn_endpoint_with(
    config: EndpointConfig,
    store: CertificateStore,
    loaders: TypeLoaderCollection,
) -> (std::net::SocketAddr, mpsc::Receiver<EndpointEvent>, CancellationToken) {
    let (mut endpoint, events) =
        Endpoint::new(config, Arc::new(RwLock::new(store))).expect("create endpoint");
    endpoint.set_type_loaders(loaders);
    let token = CancellationToken::new();
    let run_token = token.clone();
    let (addr_send, addr_recv) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let listener = endpoint.bind().await.expect("bind endpoint");
        addr_send.send(listener.local_addr().unwrap()).unwrap();
        let _ = endpoint.run_on(listener, run_token).await;
    });
    let addr = addr_recv.await.expect("endpoint did not bind");
    (addr, events, token)
}

fn none_config() -> EndpointConfig {
    EndpointConfig::new_none("opc.tcp://127.0.0.1:0/uasc/test")
}

async fn next_event(events: &mut mpsc::Receiver<EndpointEvent>) -> EndpointEvent {
    tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_for_event<F: Fn(&EndpointEvent) -> bool>(
    events: &mut mpsc::Receiver<EndpointEvent>,
    predicate: F,
) -> EndpointEvent {
    loop {
        let event = next_event(events).await;
        if predicate(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn hello_ack_negotiation() {
    let (addr, mut events, token) = spawn_endpoint(none_config()).await;
    assert!(matches!(
        next_event(&mut events).await,
        EndpointEvent::ListenerOpened
    ));

    // A client offering smaller buffers than the server gets them back
    // unchanged; revised values are the minima of both sides
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = tokio::io::split(stream);
    let mut read = FramedRead::new(read, TcpCodec::new(DecodingOptions::test()));
    let hello = HelloMessage::new("opc.tcp://127.0.0.1/uasc/test", 32768, 32768, 0, 1);
    write.write_all(&uasc_types::SimpleBinaryEncodable::encode_to_vec(&hello)).await.unwrap();

    let Some(Ok(TcpMessage::Acknowledge(ack))) = read.next().await else {
        panic!("Expected ACK");
    };
    assert_eq!(ack.protocol_version, 0);
    assert_eq!(ack.receive_buffer_size, 32768);
    assert_eq!(ack.send_buffer_size, 32768);
    assert_eq!(ack.max_chunk_count, 1);

    token.cancel();
}

#[tokio::test]
async fn hello_below_buffer_floor_is_rejected() {
    let (addr, _events, token) = spawn_endpoint(none_config()).await;

    let hello = HelloMessage::new(
        "opc.tcp://127.0.0.1/uasc/test",
        MIN_CHUNK_SIZE - 1,
        MIN_CHUNK_SIZE - 1,
        0,
        0,
    );
    let err = TestClient::connect_with_hello(
        addr,
        hello,
        SecureChannel::new_no_certificate_store(Role::Client),
    )
    .await
    .unwrap_err();
    assert_eq!(err, StatusCode::BadConnectionRejected);

    token.cancel();
}

#[tokio::test]
async fn hello_with_wrong_endpoint_url_is_rejected() {
    let (addr, _events, token) = spawn_endpoint(none_config()).await;

    let hello = HelloMessage::new("opc.tcp://127.0.0.1/other/endpoint", 65536, 65536, 0, 0);
    let err = TestClient::connect_with_hello(
        addr,
        hello,
        SecureChannel::new_no_certificate_store(Role::Client),
    )
    .await
    .unwrap_err();
    assert_eq!(err, StatusCode::BadTcpEndpointUrlInvalid);

    token.cancel();
}

#[tokio::test]
async fn open_secure_channel_none() {
    let (addr, mut events, token) = spawn_endpoint(none_config()).await;

    let mut client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;
    let request = client.open_request(
        SecurityTokenRequestType::Issue,
        MessageSecurityMode::None,
        1_000, // Below the server's minimum, must be clamped up
    );
    client.send_message(&request).await;
    let ResponseMessage::OpenSecureChannel(response) = client.recv_response().await else {
        panic!("Expected OPN response");
    };

    // Fresh non-zero identifiers, lifetime clamped into the server's range,
    // no server nonce for an unsecured channel
    assert_ne!(response.security_token.channel_id, 0);
    assert_ne!(response.security_token.token_id, 0);
    assert_eq!(
        response.security_token.revised_lifetime,
        uasc_core::constants::MIN_TOKEN_LIFETIME_MS
    );
    assert!(response.server_nonce.is_null());
    assert_eq!(response.server_protocol_version, 0);

    let event = wait_for_event(&mut events, |e| {
        matches!(e, EndpointEvent::ConnectionNew { .. })
    })
    .await;
    let EndpointEvent::ConnectionNew { secure_channel_id } = event else {
        unreachable!();
    };
    assert_eq!(secure_channel_id, response.security_token.channel_id);

    token.cancel();
}

#[tokio::test]
async fn renew_token_on_open_channel() {
    let (addr, mut events, token) = spawn_endpoint(none_config()).await;

    let mut client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;
    let first_token = client.open_secure_channel().await;

    let request = client.open_request(
        SecurityTokenRequestType::Renew,
        MessageSecurityMode::None,
        60_000,
    );
    client.send_message(&request).await;
    let ResponseMessage::OpenSecureChannel(response) = client.recv_response().await else {
        panic!("Expected OPN response");
    };

    // Same channel, new token
    assert_eq!(response.security_token.channel_id, first_token.channel_id);
    assert_ne!(response.security_token.token_id, first_token.token_id);

    let renewed = wait_for_event(&mut events, |e| {
        matches!(e, EndpointEvent::ConnectionRenewed { .. })
    })
    .await;
    let EndpointEvent::ConnectionRenewed { secure_channel_id } = renewed else {
        unreachable!();
    };
    assert_eq!(secure_channel_id, first_token.channel_id);

    token.cancel();
}

#[tokio::test]
async fn renew_without_open_is_rejected() {
    let (addr, _events, token) = spawn_endpoint(none_config()).await;

    let mut client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;
    let request = client.open_request(
        SecurityTokenRequestType::Renew,
        MessageSecurityMode::None,
        60_000,
    );
    client.send_message(&request).await;
    let err = client.recv_error().await;
    assert_eq!(err.error, StatusCode::BadSecureChannelIdInvalid);

    token.cancel();
}

#[tokio::test]
async fn registered_request_is_dispatched() {
    let mut loaders = TypeLoaderCollection::new();
    loaders.add_type_loader(PingTypeLoader);
    let (addr, mut events, token) =
        spawn_endpoint_with(none_config(), CertificateStore::new(), loaders).await;

    let mut client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;
    let opened = client.open_secure_channel().await;

    let message = OpaqueMessage {
        type_id: NodeId::new(0, TEST_ENCODING_ID),
        body: PingRequest {
            payload: "are you there".into(),
        },
    };
    let request_id = client.send_message(&message).await;

    let event = wait_for_event(&mut events, |e| matches!(e, EndpointEvent::Request(_))).await;
    let EndpointEvent::Request(request) = event else {
        unreachable!();
    };
    assert_eq!(request.secure_channel_id, opened.channel_id);
    assert_eq!(request.request_id, request_id);
    assert_eq!(request.type_id, NodeId::new(0, TEST_ENCODING_ID));
    let ping = request
        .body
        .as_dyn_any_ref()
        .downcast_ref::<PingRequest>()
        .expect("body is a PingRequest");
    assert_eq!(ping.payload.as_ref(), "are you there");

    token.cancel();
}

#[tokio::test]
async fn unknown_request_gets_service_fault() {
    let (addr, mut events, token) = spawn_endpoint(none_config()).await;

    let mut client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;
    client.open_secure_channel().await;

    let message = OpaqueMessage {
        type_id: NodeId::new(0, 777u32),
        body: 1234u32,
    };
    client.send_message(&message).await;

    let ResponseMessage::ServiceFault(fault) = client.recv_response().await else {
        panic!("Expected a service fault");
    };
    assert_eq!(
        fault.response_header.service_result,
        StatusCode::BadServiceUnsupported
    );

    let event = wait_for_event(&mut events, |e| {
        matches!(e, EndpointEvent::DecoderError { .. })
    })
    .await;
    let EndpointEvent::DecoderError { status, .. } = event else {
        unreachable!();
    };
    assert_eq!(status, StatusCode::BadServiceUnsupported);

    token.cancel();
}

#[tokio::test]
async fn abort_chunk_surfaces_abort_request() {
    let (addr, mut events, token) = spawn_endpoint(none_config()).await;

    let mut client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;
    let opened = client.open_secure_channel().await;

    // One intermediate chunk followed by an abort chunk. The peer never
    // sees a decoded message, only the abort notification.
    client.sequence_number += 1;
    client.request_id += 1;
    let first = MessageChunk::new(
        client.sequence_number,
        client.request_id,
        MessageChunkType::Message,
        MessageIsFinalType::Intermediate,
        &client.channel,
        &[0u8; 100],
    )
    .unwrap();
    client.send_chunk(&first).await;

    client.sequence_number += 1;
    let abort_body = ErrorMessage::new(StatusCode::BadRequestTooLarge, "changed my mind")
        .encode_body()
        .unwrap();
    let abort = MessageChunk::new(
        client.sequence_number,
        client.request_id,
        MessageChunkType::Message,
        MessageIsFinalType::FinalError,
        &client.channel,
        &abort_body,
    )
    .unwrap();
    client.send_chunk(&abort).await;

    let event = wait_for_event(&mut events, |e| {
        matches!(e, EndpointEvent::AbortRequest { .. })
    })
    .await;
    let EndpointEvent::AbortRequest {
        secure_channel_id,
        request_id,
        error,
        reason,
    } = event
    else {
        unreachable!();
    };
    assert_eq!(secure_channel_id, opened.channel_id);
    assert_eq!(request_id, client.request_id);
    assert_eq!(error, StatusCode::BadRequestTooLarge);
    assert_eq!(reason, "changed my mind");

    token.cancel();
}

#[tokio::test]
async fn close_secure_channel_drops_connection() {
    let (addr, mut events, token) = spawn_endpoint(none_config()).await;

    let mut client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;
    let opened = client.open_secure_channel().await;

    let request: RequestMessage = uasc_types::CloseSecureChannelRequest {
        request_header: RequestHeader::new(&NodeId::null(), &DateTime::now(), 2),
    }
    .into();
    client.send_message(&request).await;

    let event = wait_for_event(&mut events, |e| {
        matches!(e, EndpointEvent::ConnectionClosed { .. })
    })
    .await;
    let EndpointEvent::ConnectionClosed {
        secure_channel_id,
        status,
    } = event
    else {
        unreachable!();
    };
    assert_eq!(secure_channel_id, opened.channel_id);
    assert!(status.is_good());

    token.cancel();
}

#[tokio::test]
async fn secured_opn_with_wrong_thumbprint_is_rejected() {
    // Server identity
    let server_key = PrivateKey::new(1024).unwrap();
    let server_cert = X509::new_self_signed(&server_key, "uasc server", 365).unwrap();
    let mut server_store = CertificateStore::new_with_cert(server_cert, server_key);
    server_store.set_trust_unknown_certs(true);

    let mut config = none_config();
    config.security_policies = vec![SecurityPolicyConfig::new(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
    )];
    let (addr, mut events, token) =
        spawn_endpoint_with(config, server_store, TypeLoaderCollection::new()).await;

    // Client identity, but pointed at the wrong server certificate - the
    // thumbprint it sends will not match the server's
    let client_key = PrivateKey::new(1024).unwrap();
    let client_cert = X509::new_self_signed(&client_key, "uasc client", 365).unwrap();
    let wrong_key = PrivateKey::new(1024).unwrap();
    let wrong_cert = X509::new_self_signed(&wrong_key, "not the server", 365).unwrap();

    let mut channel = SecureChannel::new_no_certificate_store(Role::Client);
    channel.set_cert(Some(client_cert));
    channel.set_private_key(Some(client_key));
    channel.set_security_policy(SecurityPolicy::Basic256Sha256);
    channel.set_security_mode(MessageSecurityMode::SignAndEncrypt);
    channel.set_remote_cert(Some(wrong_cert));
    channel.create_random_nonce();

    let hello = HelloMessage::new("opc.tcp://127.0.0.1/uasc/test", 65536, 65536, 0, 0);
    let mut client = TestClient::connect_with_hello(addr, hello, channel)
        .await
        .expect("handshake should succeed");

    let request = client.open_request(
        SecurityTokenRequestType::Issue,
        MessageSecurityMode::SignAndEncrypt,
        60_000,
    );
    client.send_message(&request).await;

    // The server answers with a transport error, not a service fault, and
    // tears the connection down without creating any channel state
    let err = client.recv_error().await;
    assert_eq!(err.error, StatusCode::BadSecurityChecksFailed);

    let closed = wait_for_event(&mut events, |e| {
        matches!(e, EndpointEvent::ConnectionClosed { .. })
    })
    .await;
    let EndpointEvent::ConnectionClosed {
        secure_channel_id, ..
    } = closed
    else {
        unreachable!();
    };
    assert_eq!(secure_channel_id, 0);

    token.cancel();
}

#[tokio::test]
async fn secured_opn_succeeds_and_messages_flow() {
    // Full secured round trip: OPN under Basic256Sha256, then a MSG secured
    // with the derived symmetric keys.
    let server_key = PrivateKey::new(1024).unwrap();
    let server_cert = X509::new_self_signed(&server_key, "uasc server", 365).unwrap();
    let mut server_store = CertificateStore::new_with_cert(server_cert.clone(), server_key);
    server_store.set_trust_unknown_certs(true);

    let mut config = none_config();
    config.security_policies = vec![SecurityPolicyConfig::new(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
    )];
    let mut loaders = TypeLoaderCollection::new();
    loaders.add_type_loader(PingTypeLoader);
    let (addr, mut events, token) = spawn_endpoint_with(config, server_store, loaders).await;

    let client_key = PrivateKey::new(1024).unwrap();
    let client_cert = X509::new_self_signed(&client_key, "uasc client", 365).unwrap();

    let mut channel = SecureChannel::new_no_certificate_store(Role::Client);
    channel.set_cert(Some(client_cert));
    channel.set_private_key(Some(client_key));
    channel.set_security_policy(SecurityPolicy::Basic256Sha256);
    channel.set_security_mode(MessageSecurityMode::SignAndEncrypt);
    channel.set_remote_cert(Some(server_cert));
    channel.create_random_nonce();

    let hello = HelloMessage::new("opc.tcp://127.0.0.1/uasc/test", 65536, 65536, 0, 0);
    let mut client = TestClient::connect_with_hello(addr, hello, channel)
        .await
        .expect("handshake should succeed");

    let request = client.open_request(
        SecurityTokenRequestType::Issue,
        MessageSecurityMode::SignAndEncrypt,
        60_000,
    );
    client.send_message(&request).await;
    let ResponseMessage::OpenSecureChannel(response) = client.recv_response().await else {
        panic!("Expected OPN response");
    };
    assert!(!response.server_nonce.is_null());
    client.channel.set_security_token(response.security_token);
    client
        .channel
        .set_remote_nonce_from_byte_string(&response.server_nonce)
        .unwrap();
    client.channel.derive_keys();

    // Now a symmetrically secured service request
    let message = OpaqueMessage {
        type_id: NodeId::new(0, TEST_ENCODING_ID),
        body: PingRequest {
            payload: "secured ping".into(),
        },
    };
    client.send_message(&message).await;

    let event = wait_for_event(&mut events, |e| matches!(e, EndpointEvent::Request(_))).await;
    let EndpointEvent::Request(request) = event else {
        unreachable!();
    };
    let ping = request
        .body
        .as_dyn_any_ref()
        .downcast_ref::<PingRequest>()
        .expect("body is a PingRequest");
    assert_eq!(ping.payload.as_ref(), "secured ping");

    token.cancel();
}

#[tokio::test]
async fn connection_cap_is_enforced() {
    let mut config = none_config();
    config.max_connections = 1;
    let (addr, _events, token) = spawn_endpoint(config).await;

    // First connection occupies the only slot
    let _client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;

    // The second is dropped without an ACK
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = tokio::io::split(stream);
    let mut read = FramedRead::new(read, TcpCodec::new(DecodingOptions::test()));
    let hello = HelloMessage::new("opc.tcp://127.0.0.1/uasc/test", 65536, 65536, 0, 0);
    write.write_all(&uasc_types::SimpleBinaryEncodable::encode_to_vec(&hello)).await.unwrap();
    let next = tokio::time::timeout(std::time::Duration::from_secs(2), read.next()).await;
    match next {
        // Socket closed with no response
        Ok(None) => {}
        Ok(Some(Err(_))) => {}
        other => panic!("Expected the connection to be dropped, got {:?}", other),
    }

    token.cancel();
}

#[tokio::test]
async fn unsupported_security_mode_is_rejected() {
    let (addr, _events, token) = spawn_endpoint(none_config()).await;

    let mut client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;
    // Endpoint only accepts None / None; Sign is refused
    let request = client.open_request(
        SecurityTokenRequestType::Issue,
        MessageSecurityMode::Sign,
        60_000,
    );
    client.send_message(&request).await;
    let err = client.recv_error().await;
    assert_eq!(err.error, StatusCode::BadSecurityModeRejected);

    token.cancel();
}

#[tokio::test]
async fn multi_chunk_request_is_reassembled() {
    let mut loaders = TypeLoaderCollection::new();
    loaders.add_type_loader(PingTypeLoader);
    let (addr, mut events, token) =
        spawn_endpoint_with(none_config(), CertificateStore::new(), loaders).await;

    let mut client = TestClient::connect(addr, "opc.tcp://127.0.0.1/uasc/test").await;
    client.open_secure_channel().await;

    // A payload needing several chunks at the client's 8192 chunk size
    let payload = "z".repeat(30_000);
    let message = OpaqueMessage {
        type_id: NodeId::new(0, TEST_ENCODING_ID),
        body: PingRequest {
            payload: payload.as_str().into(),
        },
    };
    client.send_message(&message).await;

    let event = wait_for_event(&mut events, |e| matches!(e, EndpointEvent::Request(_))).await;
    let EndpointEvent::Request(request) = event else {
        unreachable!();
    };
    let ping = request
        .body
        .as_dyn_any_ref()
        .downcast_ref::<PingRequest>()
        .expect("body is a PingRequest");
    assert_eq!(ping.payload.as_ref(), payload);

    token.cancel();
}
