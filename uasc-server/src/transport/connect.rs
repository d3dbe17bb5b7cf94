// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::future::Future;

use tokio_util::sync::CancellationToken;
use uasc_types::StatusCode;

use super::tcp::TcpTransport;

/// Negotiates the transport level handshake on a freshly accepted
/// connection, yielding a transport once both sides agree.
pub(crate) trait Connector {
    /// Run the handshake to completion or failure.
    fn connect(
        self,
        token: CancellationToken,
    ) -> impl Future<Output = Result<TcpTransport, StatusCode>> + Send + Sync;
}
