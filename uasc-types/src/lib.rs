// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Binary data types and codec for the OPC UA secure conversation stack.
//!
//! This crate implements the OPC UA built-in types from Part 6 of the
//! standard and their binary encoding: scalars, strings, `NodeId`,
//! `Variant`, `DataValue`, `ExtensionObject`, `DiagnosticInfo` and
//! arrays/matrices of all of these. It also contains the namespace table
//! and the process-wide encodeable type registry used to resolve
//! extension object payloads, plus the handful of service structures that
//! belong to the secure channel itself (`OpenSecureChannel` and friends).

#![warn(missing_docs)]

/// Contains constants for decoding limits and default sizes.
pub mod constants {
    /// Default maximum size of a message in bytes. 0 would mean no limit.
    pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;
    /// Default maximum number of chunks in a message.
    pub const MAX_CHUNK_COUNT: usize = 64;
    /// Default maximum length in bytes of a string.
    pub const MAX_STRING_LENGTH: usize = 65536;
    /// Default maximum length in bytes of a byte string.
    pub const MAX_BYTE_STRING_LENGTH: usize = 65536;
    /// Default maximum number of array elements.
    pub const MAX_ARRAY_LENGTH: usize = 65536;
    /// Default maximum depth of nested Variants / ExtensionObjects /
    /// DiagnosticInfos the decoder will enter before giving up.
    pub const MAX_DECODING_DEPTH: u64 = 100;
    /// Maximum size of a DER certificate carried in a security header.
    pub const MAX_CERTIFICATE_LENGTH: usize = 32768;
}

mod array;
mod basic_types;
mod byte_string;
mod data_value;
mod date_time;
mod diagnostic_info;
pub mod encoding;
mod expanded_node_id;
mod extension_object;
mod guid;
mod localized_text;
mod namespaces;
pub mod node_id;
mod qualified_name;
mod request_header;
mod response_header;
pub mod service;
pub mod status_code;
mod string;
mod type_loader;
mod variant;

#[cfg(test)]
mod tests;

pub use array::{Array, ArrayError};
pub use byte_string::ByteString;
pub use data_value::{DataValue, DataValueFlags};
pub use date_time::DateTime;
pub use diagnostic_info::{DiagnosticInfo, DiagnosticInfoMask};
pub use encoding::{
    process_decode_io_result, process_encode_io_result, read_bytes, read_f32, read_f64, read_i16,
    read_i32, read_i64, read_u16, read_u32, read_u64, read_u8, write_bytes, write_f32, write_f64,
    write_i16, write_i32, write_i64, write_u16, write_u32, write_u64, write_u8, BinaryDecodable,
    BinaryEncodable, DecodingOptions, DepthGauge, DepthLock, EncodingResult, Error,
    SimpleBinaryDecodable, SimpleBinaryEncodable,
};
pub use expanded_node_id::ExpandedNodeId;
pub use extension_object::{DynEncodable, ExtensionObject, ExtensionObjectBody};
pub use guid::Guid;
pub use localized_text::LocalizedText;
pub use namespaces::NamespaceMap;
pub use node_id::{Identifier, NodeId, NodeIdError};
pub use qualified_name::QualifiedName;
pub use request_header::RequestHeader;
pub use response_header::ResponseHeader;
pub use service::*;
pub use status_code::StatusCode;
pub use string::{UAString, XmlElement};
pub use type_loader::{
    binary_decode_to_enc, Context, ContextOwned, StaticTypeLoader, TypeLoader,
    TypeLoaderCollection, TypeLoaderInstance, TypeLoaderPriority,
};
pub use variant::{Variant, VariantScalarTypeId, VariantType, VariantTypeId};

/// Trait implemented by OPC UA structures that are sent as messages,
/// providing the identifiers the type is transmitted under.
pub trait ExpandedMessageInfo {
    /// The ID of the type when encoded as an extension object body.
    fn full_type_id(&self) -> ExpandedNodeId;
    /// The ID of the data type itself.
    fn full_data_type_id(&self) -> ExpandedNodeId;
}
