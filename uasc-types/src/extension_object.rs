// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `ExtensionObject`.

use std::{
    any::{Any, TypeId},
    fmt,
    io::{Cursor, Read, Write},
};

use crate::{
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult},
    node_id::NodeId,
    service::ObjectId,
    string::XmlElement,
    write_i32, write_u8, ByteString, Error, ExpandedMessageInfo, ExpandedNodeId,
};

#[derive(Debug)]
/// Error returned when working with extension objects.
pub struct ExtensionObjectError;

impl fmt::Display for ExtensionObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtensionObjectError")
    }
}

impl std::error::Error for ExtensionObjectError {}

/// Trait for an OPC-UA struct that can be dynamically encoded back to binary.
/// The `Object` form of an extension object wraps a dynamic object through this trait.
///
/// Note that this trait is automatically implemented for anything that implements
/// [BinaryEncodable], [ExpandedMessageInfo], [Send], [Sync], [Clone],
/// [std::fmt::Debug] and [PartialEq].
pub trait DynEncodable: Any + Send + Sync + std::fmt::Debug {
    /// Encode the struct using OPC-UA binary encoding.
    fn encode_binary(
        &self,
        stream: &mut dyn std::io::Write,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()>;

    /// Get the binary byte length of this struct.
    fn byte_len_dyn(&self, ctx: &crate::Context<'_>) -> usize;

    /// Get the binary encoding ID of this struct.
    fn binary_type_id(&self) -> ExpandedNodeId;

    /// Get the data type ID of this struct.
    fn data_type_id(&self) -> ExpandedNodeId;

    /// Method to cast this to a dyn Any box, required for downcasting.
    fn as_dyn_any(self: Box<Self>) -> Box<dyn Any + Send + Sync + 'static>;

    /// Method to cast this to a dyn Any trait object, required for downcasting by reference.
    fn as_dyn_any_ref(&self) -> &(dyn Any + Send + Sync);

    /// Clone this to a dyn box. Required in order to implement Clone for ExtensionObject.
    fn clone_box(&self) -> Box<dyn DynEncodable>;

    /// Compare this with dynamic object. Invokes the PartialEq implementation of self and other,
    /// if other has type `Self`.
    fn dyn_eq(&self, other: &dyn DynEncodable) -> bool;

    /// Get the type name of the type, by calling `std::any::type_name` on `Self`.
    /// Very useful for debugging.
    fn type_name(&self) -> &'static str;
}

impl<T> DynEncodable for T
where
    T: BinaryEncodable + ExpandedMessageInfo + Any + std::fmt::Debug + Send + Sync + Clone + PartialEq,
{
    fn encode_binary(
        &self,
        stream: &mut dyn std::io::Write,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        BinaryEncodable::encode(self, stream, ctx)
    }

    fn byte_len_dyn(&self, ctx: &crate::Context<'_>) -> usize {
        BinaryEncodable::byte_len(self, ctx)
    }

    fn binary_type_id(&self) -> ExpandedNodeId {
        self.full_type_id()
    }

    fn data_type_id(&self) -> ExpandedNodeId {
        self.full_data_type_id()
    }

    fn as_dyn_any(self: Box<Self>) -> Box<dyn Any + Send + Sync + 'static> {
        self
    }

    fn as_dyn_any_ref(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn clone_box(&self) -> Box<dyn DynEncodable> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn DynEncodable) -> bool {
        if let Some(o) = other.as_dyn_any_ref().downcast_ref::<Self>() {
            o == self
        } else {
            false
        }
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl PartialEq for dyn DynEncodable {
    fn eq(&self, other: &dyn DynEncodable) -> bool {
        self.dyn_eq(other)
    }
}

/// The body of an extension object.
///
/// The `Object` form is an in-memory convenience only, on the wire it is
/// always carried as a length-prefixed `ByteString` body (encoding byte
/// `0x01`). A received `ByteString` body is promoted to `Object` iff a type
/// loader recognises the type ID, otherwise the raw bytes are retained.
#[derive(Debug, Default)]
pub enum ExtensionObjectBody {
    /// No body.
    #[default]
    None,
    /// An opaque binary body whose type is not registered with any type loader.
    ByteString(ByteString),
    /// An XML body. Carried opaquely, XML decoding is not supported.
    XmlElement(XmlElement),
    /// A decoded structure.
    Object(Box<dyn DynEncodable>),
}

impl PartialEq for ExtensionObjectBody {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::ByteString(a), Self::ByteString(b)) => a == b,
            (Self::XmlElement(a), Self::XmlElement(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.dyn_eq(b.as_ref()),
            _ => false,
        }
    }
}

impl Clone for ExtensionObjectBody {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::ByteString(b) => Self::ByteString(b.clone()),
            Self::XmlElement(x) => Self::XmlElement(x.clone()),
            Self::Object(o) => Self::Object(o.clone_box()),
        }
    }
}

/// An extension object is a typed envelope carrying a sub-message whose
/// concrete type is identified by a NodeId.
///
/// Note that in order for a received body to be deserialized into the
/// `Object` form, the [crate::Context] given during deserialization needs to
/// contain a [crate::TypeLoader] that can handle the type.
#[derive(Debug, Clone, Default)]
pub struct ExtensionObject {
    /// The identifier of the body's type.
    pub type_id: ExpandedNodeId,
    /// The body of the extension object.
    pub body: ExtensionObjectBody,
}

impl PartialEq for ExtensionObject {
    fn eq(&self, other: &Self) -> bool {
        // For the Object form the authoritative type id lives on the object,
        // so compare through binary_type_id rather than the raw field.
        self.binary_type_id() == other.binary_type_id() && self.body == other.body
    }
}

impl BinaryEncodable for ExtensionObject {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let type_id = self.binary_type_id();
        let id = type_id.try_resolve(ctx.namespaces());

        // Just default to a two byte node id here, we'll fail later.
        let mut size = id.map(|n| n.byte_len(ctx)).unwrap_or(2usize);
        size += match &self.body {
            ExtensionObjectBody::None => 1,
            ExtensionObjectBody::ByteString(b) => 1 + b.byte_len(ctx),
            ExtensionObjectBody::XmlElement(x) => 1 + x.byte_len(ctx),
            ExtensionObjectBody::Object(o) => 5 + o.byte_len_dyn(ctx),
        };

        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        mut stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        let type_id = self.binary_type_id();
        let Some(id) = type_id.try_resolve(ctx.namespaces()) else {
            return Err(Error::encoding(format!("Unknown encoding ID: {type_id}")));
        };

        BinaryEncodable::encode(id.as_ref(), stream, ctx)?;

        match &self.body {
            ExtensionObjectBody::None => write_u8(stream, 0x0u8),
            ExtensionObjectBody::ByteString(b) => {
                write_u8(stream, 0x1u8)?;
                b.encode(stream, ctx)
            }
            ExtensionObjectBody::XmlElement(x) => {
                write_u8(stream, 0x2u8)?;
                x.encode(stream, ctx)
            }
            ExtensionObjectBody::Object(o) => {
                write_u8(stream, 0x1u8)?;
                write_i32(stream, o.byte_len_dyn(ctx) as i32)?;
                o.encode_binary(&mut stream as &mut dyn Write, ctx)
            }
        }
    }
}

impl BinaryDecodable for ExtensionObject {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        // Extension object is depth checked to prevent deep recursion
        let _depth_lock = ctx.options().depth_lock()?;
        let node_id = NodeId::decode(stream, ctx)?;
        let encoding_type = u8::decode(stream, ctx)?;
        let body = match encoding_type {
            0x0 => ExtensionObjectBody::None,
            0x1 => {
                // The byte string body is decoded in full first, which makes the
                // size limits apply before any type loader sees the data.
                let bytes = ByteString::decode(stream, ctx)?;
                if bytes.is_null() {
                    ExtensionObjectBody::None
                } else {
                    let mut cursor = Cursor::new(bytes.as_ref());
                    match ctx.load_from_binary(&node_id, &mut cursor) {
                        Some(body) => ExtensionObjectBody::Object(body?),
                        // Not a registered type, keep the raw bytes
                        None => ExtensionObjectBody::ByteString(bytes),
                    }
                }
            }
            0x2 => ExtensionObjectBody::XmlElement(XmlElement::decode(stream, ctx)?),
            _ => {
                return Err(Error::decoding(format!(
                    "Invalid extension object encoding type {} in stream",
                    encoding_type
                )));
            }
        };
        Ok(ExtensionObject {
            type_id: node_id.into(),
            body,
        })
    }
}

impl ExtensionObject {
    /// Create an extension object from a structure.
    pub fn new<T>(encodable: T) -> ExtensionObject
    where
        T: DynEncodable,
    {
        let type_id = encodable.binary_type_id();
        Self {
            type_id,
            body: ExtensionObjectBody::Object(Box::new(encodable)),
        }
    }

    /// Create an extension object from a structure.
    pub fn from_message<T>(encodable: T) -> ExtensionObject
    where
        T: DynEncodable,
    {
        Self::new(encodable)
    }

    /// Creates a null extension object, i.e. one with no value or payload
    pub fn null() -> ExtensionObject {
        ExtensionObject::default()
    }

    /// Tests for an empty extension object.
    pub fn is_null(&self) -> bool {
        matches!(self.body, ExtensionObjectBody::None)
    }

    /// Get the binary type ID of the body. For the `Object` form this is
    /// taken from the object itself, otherwise it is the identifier that was
    /// received on the wire.
    pub fn binary_type_id(&self) -> ExpandedNodeId {
        match &self.body {
            ExtensionObjectBody::Object(o) => o.binary_type_id(),
            _ => self.type_id.clone(),
        }
    }

    /// Returns the object id of the thing this extension object contains, assuming the
    /// object id can be recognised from the node id.
    pub fn object_id(&self) -> Result<ObjectId, ExtensionObjectError> {
        self.binary_type_id()
            .node_id
            .as_object_id()
            .map_err(|_| ExtensionObjectError)
    }

    /// Consume the extension object and return the inner value downcast to `T`,
    /// if the inner type is present and is an instance of `T`.
    pub fn into_inner_as<T: Send + Sync + 'static>(self) -> Option<Box<T>> {
        match self.body {
            ExtensionObjectBody::Object(o) => o.as_dyn_any().downcast().ok(),
            _ => None,
        }
    }

    /// Return the inner value by reference downcast to `T`,
    /// if the inner type is present and is an instance of `T`.
    pub fn inner_as<T: Send + Sync + 'static>(&self) -> Option<&T> {
        match &self.body {
            ExtensionObjectBody::Object(o) => o.as_dyn_any_ref().downcast_ref(),
            _ => None,
        }
    }

    /// Get the rust [std::any::TypeId] of the inner type, if the body is an object.
    pub fn inner_type_id(&self) -> Option<TypeId> {
        match &self.body {
            ExtensionObjectBody::Object(o) => Some((**o).type_id()),
            _ => None,
        }
    }

    /// Return `true` if the inner value is an instance of `T`
    pub fn inner_is<T: 'static>(&self) -> bool {
        self.inner_type_id() == Some(TypeId::of::<T>())
    }

    /// Get the name of the Rust type stored in the extension object, if the body is an object.
    pub fn type_name(&self) -> Option<&'static str> {
        match &self.body {
            ExtensionObjectBody::Object(o) => Some(o.type_name()),
            _ => None,
        }
    }
}
