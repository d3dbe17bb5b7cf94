// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

#![warn(missing_docs)]

//! The server endpoint glue of the OPC UA secure conversation stack.
//!
//! An [`Endpoint`] listens on an `opc.tcp` URL, negotiates the
//! HELLO/ACKNOWLEDGE exchange for every incoming connection, runs the server
//! side of `OpenSecureChannel` and delivers decoded service requests to the
//! owner through an event channel. Everything above the channel layer -
//! sessions, the address space, the services themselves - belongs to the
//! layers built on top of this crate.

mod config;
mod endpoint;
mod transport;

pub use config::{EndpointConfig, SecurityPolicyConfig, TransportLimits};
pub use endpoint::{Endpoint, EndpointEvent, ReceivedRequest};
