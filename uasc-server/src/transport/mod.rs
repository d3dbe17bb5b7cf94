// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The server side transport: HELLO/ACK negotiation when a connection is
//! accepted, then the polling loop moving chunks in and out of the socket.

mod connect;
mod tcp;

pub(crate) use connect::Connector;
pub(crate) use tcp::{Request, TcpConnector, TcpTransport, TransportConfig, TransportPollResult};
