// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The [`Endpoint`]: binds a listener on an `opc.tcp` URL, accepts
//! connections up to a configured cap, runs one task per connection and
//! delivers decoded requests and lifecycle notifications to the owner
//! through an event channel.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use uasc_core::comms::secure_channel::{Role, SecureChannel};
use uasc_core::comms::tcp_types::ErrorMessage;
use uasc_core::comms::url::hostname_port_from_url;
use uasc_core::config::Config;
use uasc_core::constants::{
    DEFAULT_OPC_UA_SERVER_PORT, DEFAULT_TOKEN_LIFETIME_MS, MAX_TOKEN_LIFETIME_MS,
    MIN_TOKEN_LIFETIME_MS,
};
use uasc_core::{RequestMessage, ResponseMessage};
use uasc_crypto::{random, CertificateStore, SecurityPolicy};

use uasc_types::{
    ChannelSecurityToken, ContextOwned, DateTime, DecodingOptions, DynEncodable, NodeId,
    OpenSecureChannelRequest, OpenSecureChannelResponse, ResponseHeader,
    SecurityTokenRequestType, ServiceFault, StatusCode, TypeLoaderCollection,
};

use crate::config::EndpointConfig;
use crate::transport::{Connector, Request, TcpConnector, TcpTransport, TransportConfig, TransportPollResult};

/// A decoded service request delivered to the endpoint owner.
#[derive(Debug)]
pub struct ReceivedRequest {
    /// The secure channel the request arrived on.
    pub secure_channel_id: u32,
    /// The id the client assigned to this request.
    pub request_id: u32,
    /// The type id of the request body.
    pub type_id: NodeId,
    /// The decoded request body.
    pub body: Box<dyn DynEncodable>,
}

/// Notifications delivered by the endpoint to its owner.
#[derive(Debug)]
pub enum EndpointEvent {
    /// The listener socket is bound and accepting connections.
    ListenerOpened,
    /// The listener has shut down.
    ListenerClosed,
    /// A secure channel completed its OPN exchange.
    ConnectionNew {
        /// Id of the new secure channel.
        secure_channel_id: u32,
    },
    /// A secure channel renewed its token.
    ConnectionRenewed {
        /// Id of the renewed secure channel.
        secure_channel_id: u32,
    },
    /// A connection went away, normally or otherwise.
    ConnectionClosed {
        /// Id of the channel, 0 when the connection never completed an OPN.
        secure_channel_id: u32,
        /// Why the connection closed.
        status: StatusCode,
    },
    /// A service request was decoded and awaits handling.
    Request(ReceivedRequest),
    /// The peer aborted a partially sent message.
    AbortRequest {
        /// Id of the secure channel.
        secure_channel_id: u32,
        /// The id of the aborted request.
        request_id: u32,
        /// The error code the peer supplied.
        error: StatusCode,
        /// The reason string the peer supplied.
        reason: String,
    },
    /// A message arrived that could not be decoded.
    DecoderError {
        /// Id of the secure channel.
        secure_channel_id: u32,
        /// The failure.
        status: StatusCode,
    },
}

/// A listening OPC UA endpoint. Create one with [`Endpoint::new`] and drive
/// it with [`Endpoint::run`]; events arrive on the receiver returned from `new`.
pub struct Endpoint {
    config: EndpointConfig,
    certificate_store: Arc<RwLock<CertificateStore>>,
    events: mpsc::Sender<EndpointEvent>,
    /// Type loaders handed to every connection for resolving request bodies.
    type_loaders: TypeLoaderCollection,
    /// Channel ids currently in use, so fresh ids can be picked unique.
    active_channel_ids: Arc<Mutex<HashSet<u32>>>,
}

impl Endpoint {
    /// Create an endpoint and the receiving half of its event channel.
    pub fn new(
        config: EndpointConfig,
        certificate_store: Arc<RwLock<CertificateStore>>,
    ) -> Result<(Endpoint, mpsc::Receiver<EndpointEvent>), StatusCode> {
        if let Err(errors) = config.validate() {
            for e in &errors {
                error!("Endpoint configuration error: {e}");
            }
            return Err(StatusCode::BadConfigurationError);
        }
        let (events, receiver) = mpsc::channel(100);
        Ok((
            Endpoint {
                config,
                certificate_store,
                events,
                type_loaders: TypeLoaderCollection::new(),
                active_channel_ids: Arc::new(Mutex::new(HashSet::new())),
            },
            receiver,
        ))
    }

    /// The configured endpoint URL.
    pub fn endpoint_url(&self) -> &str {
        &self.config.endpoint_url
    }

    /// Replace the connection type loader collection. Loaders registered
    /// here resolve incoming service request bodies; anything they do not
    /// know surfaces as `BadServiceUnsupported`.
    pub fn set_type_loaders(&mut self, loaders: TypeLoaderCollection) {
        self.type_loaders = loaders;
    }

    /// Bind the listener socket for this endpoint. Useful on its own when
    /// the URL carries port 0 and the caller needs the actual address.
    pub async fn bind(&self) -> Result<TcpListener, StatusCode> {
        let (host, port) =
            hostname_port_from_url(&self.config.endpoint_url, DEFAULT_OPC_UA_SERVER_PORT)?;
        TcpListener::bind((host.as_str(), port)).await.map_err(|e| {
            error!("Cannot bind endpoint listener on {host}:{port}, {e}");
            StatusCode::BadResourceUnavailable
        })
    }

    /// Bind the listener and accept connections until the token is
    /// cancelled. Each accepted connection runs in its own task; the
    /// endpoint only enforces the connection cap.
    pub async fn run(self, token: CancellationToken) -> Result<(), StatusCode> {
        let listener = self.bind().await?;
        self.run_on(listener, token).await
    }

    /// Accept connections on an already bound listener until the token is
    /// cancelled.
    pub async fn run_on(
        self,
        listener: TcpListener,
        token: CancellationToken,
    ) -> Result<(), StatusCode> {
        info!("Endpoint listening on {}", self.config.endpoint_url);
        let _ = self.events.send(EndpointEvent::ListenerOpened).await;

        let connection_count = Arc::new(tokio::sync::Semaphore::new(self.config.max_connections));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                r = listener.accept() => {
                    let (stream, addr) = match r {
                        Ok(r) => r,
                        Err(e) => {
                            error!("Failed to accept connection, {e}");
                            continue;
                        }
                    };
                    debug!("Accepted connection from {addr}");
                    let Ok(permit) = Arc::clone(&connection_count).try_acquire_owned() else {
                        // Over the cap; the socket is dropped without ceremony
                        error!("Connection from {addr} rejected, the endpoint is at its connection cap");
                        continue;
                    };
                    let connection = EndpointConnection {
                        config: self.config.clone(),
                        certificate_store: Arc::clone(&self.certificate_store),
                        events: self.events.clone(),
                        type_loaders: self.type_loaders.clone(),
                        active_channel_ids: Arc::clone(&self.active_channel_ids),
                    };
                    let token = token.child_token();
                    tokio::spawn(async move {
                        connection.run(stream, token).await;
                        drop(permit);
                    });
                }
            }
        }

        info!("Endpoint listener on {} closing", self.config.endpoint_url);
        let _ = self.events.send(EndpointEvent::ListenerClosed).await;
        Ok(())
    }
}

/// Everything one connection task needs.
struct EndpointConnection {
    config: EndpointConfig,
    certificate_store: Arc<RwLock<CertificateStore>>,
    events: mpsc::Sender<EndpointEvent>,
    type_loaders: TypeLoaderCollection,
    active_channel_ids: Arc<Mutex<HashSet<u32>>>,
}

impl EndpointConnection {
    async fn run(self, stream: TcpStream, token: CancellationToken) {
        let decoding_options = DecodingOptions {
            max_message_size: self.config.limits.max_message_size,
            max_chunk_count: self.config.limits.max_chunk_count,
            ..Default::default()
        };

        let connector = TcpConnector::new(
            stream,
            TransportConfig {
                send_buffer_size: self.config.limits.send_buffer_size,
                receive_buffer_size: self.config.limits.receive_buffer_size,
                max_message_size: self.config.limits.max_message_size,
                max_chunk_count: self.config.limits.max_chunk_count,
                hello_timeout: Duration::from_millis(self.config.hello_timeout_ms),
            },
            decoding_options.clone(),
            self.config.endpoint_url.clone(),
        );

        let mut transport = match connector.connect(token.clone()).await {
            Ok(t) => t,
            Err(status) => {
                let _ = self
                    .events
                    .send(EndpointEvent::ConnectionClosed {
                        secure_channel_id: 0,
                        status,
                    })
                    .await;
                return;
            }
        };

        let context = Arc::new(RwLock::new(ContextOwned::new(
            Default::default(),
            self.type_loaders.clone(),
            decoding_options,
        )));
        let mut channel = SecureChannel::new(
            Arc::clone(&self.certificate_store),
            Role::Server,
            context,
        );

        let status = self.connection_loop(&mut transport, &mut channel, token).await;

        let secure_channel_id = channel.secure_channel_id();
        if secure_channel_id != 0 {
            self.active_channel_ids.lock().remove(&secure_channel_id);
        }
        let _ = self
            .events
            .send(EndpointEvent::ConnectionClosed {
                secure_channel_id,
                status,
            })
            .await;
    }

    async fn connection_loop(
        &self,
        transport: &mut TcpTransport,
        channel: &mut SecureChannel,
        token: CancellationToken,
    ) -> StatusCode {
        loop {
            let result = tokio::select! {
                _ = token.cancelled() => return StatusCode::BadServerHalted,
                r = transport.poll(channel) => r,
            };
            match result {
                TransportPollResult::OutgoingMessageSent => {
                    if transport.is_closing() {
                        return StatusCode::Good;
                    }
                }
                TransportPollResult::IncomingChunk => {}
                TransportPollResult::IncomingMessage(request) => {
                    if let Err(status) = self.handle_request(transport, channel, request).await {
                        // Security failures surface as a transport error
                        // message and tear the connection down
                        transport.enqueue_error(ErrorMessage::new(status, status.name()));
                        transport.set_closing();
                        let _ = self.drain(transport, channel).await;
                        return status;
                    }
                    if transport.is_closing() {
                        let _ = self.drain(transport, channel).await;
                        return StatusCode::Good;
                    }
                }
                TransportPollResult::AbortRequest {
                    request_id,
                    error,
                    reason,
                } => {
                    let _ = self
                        .events
                        .send(EndpointEvent::AbortRequest {
                            secure_channel_id: channel.secure_channel_id(),
                            request_id,
                            error,
                            reason,
                        })
                        .await;
                }
                TransportPollResult::RecoverableError(status, request_id, request_handle) => {
                    // The message was bad but the connection survives; the
                    // peer learns through a service fault
                    let _ = self
                        .events
                        .send(EndpointEvent::DecoderError {
                            secure_channel_id: channel.secure_channel_id(),
                            status,
                        })
                        .await;
                    let fault = ServiceFault {
                        response_header: ResponseHeader::new_service_result(
                            request_handle,
                            status,
                        ),
                    };
                    let _ = transport.enqueue_message_for_send(channel, fault.into(), request_id);
                }
                TransportPollResult::Error(status) => {
                    let _ = self
                        .events
                        .send(EndpointEvent::DecoderError {
                            secure_channel_id: channel.secure_channel_id(),
                            status,
                        })
                        .await;
                    transport.enqueue_error(ErrorMessage::new(status, status.name()));
                    transport.set_closing();
                    let _ = self.drain(transport, channel).await;
                    return status;
                }
                TransportPollResult::Closed => return StatusCode::BadConnectionClosed,
            }
        }
    }

    /// Keep polling until the staged outgoing data has been flushed, so a
    /// final ERR or response reaches the wire before the socket drops.
    async fn drain(&self, transport: &mut TcpTransport, channel: &mut SecureChannel) -> StatusCode {
        loop {
            match transport.poll(channel).await {
                TransportPollResult::OutgoingMessageSent => {
                    if transport.is_closing() {
                        return StatusCode::Good;
                    }
                }
                TransportPollResult::Closed => return StatusCode::BadConnectionClosed,
                TransportPollResult::Error(e) => return e,
                _ => {}
            }
        }
    }

    async fn handle_request(
        &self,
        transport: &mut TcpTransport,
        channel: &mut SecureChannel,
        request: Request,
    ) -> Result<(), StatusCode> {
        match request {
            Request::ChannelService {
                request_id,
                message: RequestMessage::OpenSecureChannel(request),
            } => {
                self.open_secure_channel(transport, channel, request_id, &request)
                    .await
            }
            Request::ChannelService {
                request_id: _,
                message: RequestMessage::CloseSecureChannel(_),
            } => {
                // There is no response to CloseSecureChannel; just drop the
                // connection once anything pending has flushed
                debug!(
                    "CloseSecureChannel received on channel {}",
                    channel.secure_channel_id()
                );
                transport.set_closing();
                Ok(())
            }
            Request::Service {
                request_id,
                type_id,
                body,
            } => {
                let _ = self
                    .events
                    .send(EndpointEvent::Request(ReceivedRequest {
                        secure_channel_id: channel.secure_channel_id(),
                        request_id,
                        type_id,
                        body,
                    }))
                    .await;
                Ok(())
            }
            Request::Unsupported {
                request_id,
                type_id,
            } => {
                debug!("Request of unsupported type {type_id} on request id {request_id}");
                let _ = self
                    .events
                    .send(EndpointEvent::DecoderError {
                        secure_channel_id: channel.secure_channel_id(),
                        status: StatusCode::BadServiceUnsupported,
                    })
                    .await;
                let fault = ServiceFault {
                    response_header: ResponseHeader::new_service_result(
                        0,
                        StatusCode::BadServiceUnsupported,
                    ),
                };
                let _ = transport.enqueue_message_for_send(channel, fault.into(), request_id);
                Ok(())
            }
        }
    }

    /// The server side of the OpenSecureChannel exchange, both the initial
    /// issue and later renewals.
    async fn open_secure_channel(
        &self,
        transport: &mut TcpTransport,
        channel: &mut SecureChannel,
        request_id: u32,
        request: &OpenSecureChannelRequest,
    ) -> Result<(), StatusCode> {
        // The protocol version must match what the transport negotiated
        if request.client_protocol_version != transport.client_protocol_version {
            error!(
                "OPN protocol version {} differs from the negotiated {}",
                request.client_protocol_version, transport.client_protocol_version
            );
            return Err(StatusCode::BadProtocolVersionUnsupported);
        }

        // The policy arrived in the security header and is already set on
        // the channel; the mode arrives in the request body. The endpoint
        // must be configured for the pair.
        let policy = channel.security_policy();
        if !self.config.supports(policy, request.security_mode) {
            error!(
                "OPN requested {} / {} which this endpoint does not support",
                policy, request.security_mode
            );
            return Err(StatusCode::BadSecurityModeRejected);
        }

        let renew = match request.request_type {
            SecurityTokenRequestType::Issue => {
                if channel.secure_channel_id() != 0 {
                    error!("OPN issue on a channel that is already open");
                    return Err(StatusCode::BadSecurityChecksFailed);
                }
                false
            }
            SecurityTokenRequestType::Renew => {
                if channel.secure_channel_id() == 0 {
                    error!("OPN renew on a channel that was never opened");
                    return Err(StatusCode::BadSecureChannelIdInvalid);
                }
                true
            }
        };

        channel.set_security_mode(request.security_mode);
        channel
            .set_remote_nonce_from_byte_string(&request.client_nonce)
            .map_err(|e| e.status())?;

        let requested = if request.requested_lifetime == 0 {
            DEFAULT_TOKEN_LIFETIME_MS
        } else {
            request.requested_lifetime
        };
        let revised_lifetime = requested.clamp(MIN_TOKEN_LIFETIME_MS, MAX_TOKEN_LIFETIME_MS);

        let channel_id = if renew {
            channel.secure_channel_id()
        } else {
            self.fresh_channel_id()
        };
        let token = ChannelSecurityToken {
            channel_id,
            token_id: random::u32_id(),
            created_at: DateTime::now(),
            revised_lifetime,
        };
        channel.set_security_token(token);

        if policy != SecurityPolicy::None {
            channel.create_random_nonce();
            channel.derive_keys();
        }

        let response = OpenSecureChannelResponse {
            response_header: ResponseHeader::new_good(request.request_header.request_handle),
            server_protocol_version: 0,
            security_token: token,
            server_nonce: channel.local_nonce_as_byte_string(),
        };
        transport.enqueue_message_for_send(
            channel,
            ResponseMessage::from(response),
            request_id,
        )?;

        let event = if renew {
            EndpointEvent::ConnectionRenewed {
                secure_channel_id: channel_id,
            }
        } else {
            EndpointEvent::ConnectionNew {
                secure_channel_id: channel_id,
            }
        };
        let _ = self.events.send(event).await;
        Ok(())
    }

    /// A random channel id not used by any other live connection on this endpoint.
    fn fresh_channel_id(&self) -> u32 {
        let mut ids = self.active_channel_ids.lock();
        loop {
            let id = random::u32_id();
            if ids.insert(id) {
                return id;
            }
        }
    }
}
