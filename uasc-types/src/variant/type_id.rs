// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The [`VariantTypeId`] type, which is used to inspect variant types without looking at the value.

use std::fmt::Display;

use crate::StatusCode;

/// The variant type id is the type of the variant but without its payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariantTypeId<'a> {
    /// The variant is empty.
    Empty,
    /// The variant is a scalar with this inner type.
    Scalar(VariantScalarTypeId),
    /// The variant is an array with this inner type and optionally these ArrayDimensions.
    Array(VariantScalarTypeId, Option<&'a [u32]>),
}

impl From<VariantScalarTypeId> for VariantTypeId<'_> {
    fn from(value: VariantScalarTypeId) -> Self {
        Self::Scalar(value)
    }
}

impl<'a> From<(VariantScalarTypeId, &'a [u32])> for VariantTypeId<'a> {
    fn from(value: (VariantScalarTypeId, &'a [u32])) -> Self {
        Self::Array(value.0, Some(value.1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u32)]
/// The scalar type of a variant. The discriminants are the OPC UA built-in
/// type ids from Part 6, which also form the low bits of the encoding mask.
pub enum VariantScalarTypeId {
    /// Boolean
    Boolean = 1,
    /// Signed byte
    SByte = 2,
    /// Unsigned byte
    Byte = 3,
    /// Signed 16 bit integer
    Int16 = 4,
    /// Unsigned 16 bit integer
    UInt16 = 5,
    /// Signed 32 bit integer
    Int32 = 6,
    /// Unsigned 32 bit integer
    UInt32 = 7,
    /// Signed 64 bit integer
    Int64 = 8,
    /// Unsigned 64 bit integer
    UInt64 = 9,
    /// 32 bit floating point number
    Float = 10,
    /// 64 bit floating point number
    Double = 11,
    /// String
    String = 12,
    /// Datetime
    DateTime = 13,
    /// Globally unique ID
    Guid = 14,
    /// Byte string
    ByteString = 15,
    /// XmlElement
    XmlElement = 16,
    /// Node ID
    NodeId = 17,
    /// Expanded node ID
    ExpandedNodeId = 18,
    /// Status code
    StatusCode = 19,
    /// Qualified name
    QualifiedName = 20,
    /// Localized text
    LocalizedText = 21,
    /// Extension object, containing some dynamic structure.
    ExtensionObject = 22,
    /// Data value
    DataValue = 23,
    /// A nested variant.
    Variant = 24,
    /// Diagnostic info
    DiagnosticInfo = 25,
}

impl Display for VariantScalarTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantScalarTypeId::Boolean => write!(f, "Boolean"),
            VariantScalarTypeId::SByte => write!(f, "SByte"),
            VariantScalarTypeId::Byte => write!(f, "Byte"),
            VariantScalarTypeId::Int16 => write!(f, "Int16"),
            VariantScalarTypeId::UInt16 => write!(f, "UInt16"),
            VariantScalarTypeId::Int32 => write!(f, "Int32"),
            VariantScalarTypeId::UInt32 => write!(f, "UInt32"),
            VariantScalarTypeId::Int64 => write!(f, "Int64"),
            VariantScalarTypeId::UInt64 => write!(f, "UInt64"),
            VariantScalarTypeId::Float => write!(f, "Float"),
            VariantScalarTypeId::Double => write!(f, "Double"),
            VariantScalarTypeId::String => write!(f, "String"),
            VariantScalarTypeId::DateTime => write!(f, "DateTime"),
            VariantScalarTypeId::Guid => write!(f, "Guid"),
            VariantScalarTypeId::ByteString => write!(f, "ByteString"),
            VariantScalarTypeId::XmlElement => write!(f, "XmlElement"),
            VariantScalarTypeId::NodeId => write!(f, "NodeId"),
            VariantScalarTypeId::ExpandedNodeId => write!(f, "ExpandedNodeId"),
            VariantScalarTypeId::StatusCode => write!(f, "StatusCode"),
            VariantScalarTypeId::QualifiedName => write!(f, "QualifiedName"),
            VariantScalarTypeId::LocalizedText => write!(f, "LocalizedText"),
            VariantScalarTypeId::ExtensionObject => write!(f, "ExtensionObject"),
            VariantScalarTypeId::DataValue => write!(f, "DataValue"),
            VariantScalarTypeId::Variant => write!(f, "Variant"),
            VariantScalarTypeId::DiagnosticInfo => write!(f, "DiagnosticInfo"),
        }
    }
}

impl TryFrom<u32> for VariantScalarTypeId {
    type Error = StatusCode;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Boolean,
            2 => Self::SByte,
            3 => Self::Byte,
            4 => Self::Int16,
            5 => Self::UInt16,
            6 => Self::Int32,
            7 => Self::UInt32,
            8 => Self::Int64,
            9 => Self::UInt64,
            10 => Self::Float,
            11 => Self::Double,
            12 => Self::String,
            13 => Self::DateTime,
            14 => Self::Guid,
            15 => Self::ByteString,
            16 => Self::XmlElement,
            17 => Self::NodeId,
            18 => Self::ExpandedNodeId,
            19 => Self::StatusCode,
            20 => Self::QualifiedName,
            21 => Self::LocalizedText,
            22 => Self::ExtensionObject,
            23 => Self::DataValue,
            24 => Self::Variant,
            25 => Self::DiagnosticInfo,
            r => {
                log::error!("Got unexpected value for enum VariantScalarTypeId: {r}");
                return Err(StatusCode::BadDecodingError);
            }
        })
    }
}

impl VariantScalarTypeId {
    /// Get the encoding mask corresponding to this type ID.
    pub fn encoding_mask(&self) -> u8 {
        *self as u8
    }

    /// Try to get a scalar type from the encoding mask.
    pub fn from_encoding_mask(encoding_mask: u8) -> Option<Self> {
        Self::try_from((encoding_mask & !EncodingMask::ARRAY_MASK) as u32).ok()
    }

    /// Tests and returns true if the variant holds a numeric type
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::SByte
                | Self::Byte
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::Float
                | Self::Double
        )
    }
}

impl VariantTypeId<'_> {
    /// Get the encoding mask.
    pub fn encoding_mask(&self) -> u8 {
        match self {
            // Null / Empty
            VariantTypeId::Empty => 0u8,
            // Scalar types
            VariantTypeId::Scalar(s) => s.encoding_mask(),
            VariantTypeId::Array(s, dims) => {
                let mask = s.encoding_mask() | EncodingMask::ARRAY_VALUES_BIT;
                if dims.is_some() {
                    mask | EncodingMask::ARRAY_DIMENSIONS_BIT
                } else {
                    mask
                }
            }
        }
    }
}

pub(crate) struct EncodingMask;

impl EncodingMask {
    // These are values, not bits
    pub const BOOLEAN: u8 = VariantScalarTypeId::Boolean as u8;
    pub const SBYTE: u8 = VariantScalarTypeId::SByte as u8;
    pub const BYTE: u8 = VariantScalarTypeId::Byte as u8;
    pub const INT16: u8 = VariantScalarTypeId::Int16 as u8;
    pub const UINT16: u8 = VariantScalarTypeId::UInt16 as u8;
    pub const INT32: u8 = VariantScalarTypeId::Int32 as u8;
    pub const UINT32: u8 = VariantScalarTypeId::UInt32 as u8;
    pub const INT64: u8 = VariantScalarTypeId::Int64 as u8;
    pub const UINT64: u8 = VariantScalarTypeId::UInt64 as u8;
    pub const FLOAT: u8 = VariantScalarTypeId::Float as u8;
    pub const DOUBLE: u8 = VariantScalarTypeId::Double as u8;
    pub const STRING: u8 = VariantScalarTypeId::String as u8;
    pub const DATE_TIME: u8 = VariantScalarTypeId::DateTime as u8;
    pub const GUID: u8 = VariantScalarTypeId::Guid as u8;
    pub const BYTE_STRING: u8 = VariantScalarTypeId::ByteString as u8;
    pub const XML_ELEMENT: u8 = VariantScalarTypeId::XmlElement as u8;
    pub const NODE_ID: u8 = VariantScalarTypeId::NodeId as u8;
    pub const EXPANDED_NODE_ID: u8 = VariantScalarTypeId::ExpandedNodeId as u8;
    pub const STATUS_CODE: u8 = VariantScalarTypeId::StatusCode as u8;
    pub const QUALIFIED_NAME: u8 = VariantScalarTypeId::QualifiedName as u8;
    pub const LOCALIZED_TEXT: u8 = VariantScalarTypeId::LocalizedText as u8;
    pub const EXTENSION_OBJECT: u8 = VariantScalarTypeId::ExtensionObject as u8;
    pub const VARIANT: u8 = VariantScalarTypeId::Variant as u8;
    pub const DATA_VALUE: u8 = VariantScalarTypeId::DataValue as u8;
    pub const DIAGNOSTIC_INFO: u8 = VariantScalarTypeId::DiagnosticInfo as u8;
    /// Bit indicating that this value is an array
    pub const ARRAY_DIMENSIONS_BIT: u8 = 1 << 6;
    /// Bit indicating that this value has dimensions
    pub const ARRAY_VALUES_BIT: u8 = 1 << 7;
    pub const ARRAY_MASK: u8 = Self::ARRAY_DIMENSIONS_BIT | Self::ARRAY_VALUES_BIT;
}
