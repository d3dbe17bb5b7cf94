use std::io::Cursor;

use crate::{
    tests::*, Array, BinaryDecodable, BinaryEncodable, ByteString, ContextOwned, DataValue,
    DateTime, DecodingOptions, DepthGauge, Guid, LocalizedText, NodeId, QualifiedName, StatusCode,
    UAString, Variant, VariantScalarTypeId,
};

#[test]
fn variant_empty() {
    serialize_and_compare(Variant::Empty, &[0u8]);
    serialize_test(Variant::Empty);
}

#[test]
fn variant_scalars() {
    serialize_test(Variant::from(true));
    serialize_test(Variant::from(-5i8));
    serialize_test(Variant::from(250u8));
    serialize_test(Variant::from(-1000i16));
    serialize_test(Variant::from(1000u16));
    serialize_test(Variant::from(-1_000_000i32));
    serialize_test(Variant::from(1_000_000u32));
    serialize_test(Variant::from(-1_000_000_000i64));
    serialize_test(Variant::from(1_000_000_000u64));
    serialize_test(Variant::from(1.5f32));
    serialize_test(Variant::from(1.5f64));
    serialize_test(Variant::from(UAString::from("hello")));
    serialize_test(Variant::from(DateTime::now()));
    serialize_test(Variant::from(Guid::new()));
    serialize_test(Variant::from(StatusCode::BadDecodingError));
    serialize_test(Variant::from(ByteString::from(&[1u8, 2, 3])));
    serialize_test(Variant::XmlElement("<a/>".into()));
    serialize_test(Variant::from(QualifiedName::new(2, "name")));
    serialize_test(Variant::from(LocalizedText::new("en", "text")));
    serialize_test(Variant::from(NodeId::new(1, 200u32)));
}

#[test]
fn variant_nested_variant() {
    let v = Variant::Variant(Box::new(Variant::from(8u8)));
    serialize_test(v);
}

#[test]
fn variant_data_value() {
    let v = Variant::from(DataValue::new_now(100u16));
    serialize_test(v);
}

#[test]
fn variant_uint32_array_wire_format() {
    // UInt32 = 7, array flag = 0x80 -> encoding byte 0x87
    let values: Vec<Variant> = vec![
        Variant::from(1u32),
        Variant::from(2u32),
        Variant::from(3u32),
        Variant::from(0x8000_0000u32),
    ];
    let v = Variant::from(Array::new(VariantScalarTypeId::UInt32, values).unwrap());
    let ctx = ContextOwned::default();
    let bytes = v.encode_to_vec(&ctx.context());
    assert_eq!(bytes[0], 7 | 0x80);
    // Int32 length 4
    assert_eq!(&bytes[1..5], &[4, 0, 0, 0]);
    // Little-endian elements
    assert_eq!(&bytes[5..9], &[1, 0, 0, 0]);
    assert_eq!(&bytes[9..13], &[2, 0, 0, 0]);
    assert_eq!(&bytes[13..17], &[3, 0, 0, 0]);
    assert_eq!(&bytes[17..21], &[0, 0, 0, 0x80]);

    let mut stream = Cursor::new(bytes);
    let decoded = Variant::decode(&mut stream, &ctx.context()).unwrap();
    assert_eq!(decoded, v);
}

#[test]
fn variant_uint16_array_lands_in_uint16() {
    let values: Vec<Variant> = (0..4u16).map(Variant::from).collect();
    let v = Variant::from(Array::new(VariantScalarTypeId::UInt16, values).unwrap());
    let decoded = serialize_test_and_return(v);
    let Variant::Array(array) = decoded else {
        panic!("Expected an array");
    };
    assert_eq!(array.value_type, VariantScalarTypeId::UInt16);
    assert!(array
        .values
        .iter()
        .all(|v| matches!(v, Variant::UInt16(_))));
}

#[test]
fn variant_matrix() {
    // 2x3 matrix of Int32
    let values: Vec<Variant> = (0..6i32).map(Variant::from).collect();
    let v = Variant::from(Array::new_multi(VariantScalarTypeId::Int32, values, vec![2u32, 3u32]).unwrap());
    let ctx = ContextOwned::default();
    let bytes = v.encode_to_vec(&ctx.context());
    // Matrix flag and array flag are both set
    assert_eq!(bytes[0], 6 | 0x80 | 0x40);

    let mut stream = Cursor::new(bytes);
    let decoded = Variant::decode(&mut stream, &ctx.context()).unwrap();
    let Variant::Array(array) = &decoded else {
        panic!("Expected an array");
    };
    assert_eq!(array.dimensions.as_deref(), Some([2u32, 3u32].as_slice()));
    assert_eq!(decoded, v);
}

#[test]
fn variant_matrix_dimension_mismatch() {
    // Product of dimensions must equal the element count
    let values: Vec<Variant> = (0..6i32).map(Variant::from).collect();
    let v = Variant::from(
        Array::new_multi(VariantScalarTypeId::Int32, values, vec![2u32, 3u32]).unwrap(),
    );
    let ctx = ContextOwned::default();
    let mut bytes = v.encode_to_vec(&ctx.context());
    // Corrupt the first dimension from 2 to 4
    let len = bytes.len();
    bytes[len - 8] = 4;
    let mut stream = Cursor::new(bytes);
    assert!(Variant::decode(&mut stream, &ctx.context()).is_err());
}

#[test]
fn variant_matrix_flag_without_array_flag_is_invalid() {
    // 0x40 without 0x80 must be rejected - a matrix implies an array
    let bytes = vec![6u8 | 0x40, 1, 0, 0, 0];
    let ctx = ContextOwned::default();
    let mut stream = Cursor::new(bytes);
    assert!(Variant::decode(&mut stream, &ctx.context()).is_err());
}

#[test]
fn variant_array_of_variant() {
    // A Variant element type is only legal inside an array
    let values = vec![
        Variant::Variant(Box::new(Variant::from(1u32))),
        Variant::Variant(Box::new(Variant::from("s"))),
    ];
    let v = Variant::from(Array::new(VariantScalarTypeId::Variant, values).unwrap());
    serialize_test(v);
}

#[test]
fn variant_deep_nesting_protection() {
    // Build a variant nested deeper than the decoding limit
    let mut v = Variant::from(1u32);
    for _ in 0..10 {
        v = Variant::Variant(Box::new(v));
    }
    let ctx = ContextOwned::default();
    let bytes = v.encode_to_vec(&ctx.context());

    let mut options = DecodingOptions::test();
    options.decoding_depth_gauge = DepthGauge::new(5);
    let ctx = ContextOwned::new_default(Default::default(), options);
    let mut stream = Cursor::new(bytes);
    assert!(Variant::decode(&mut stream, &ctx.context()).is_err());
}

#[test]
fn variant_zero_length_array() {
    let v = Variant::from(Array::new(VariantScalarTypeId::UInt32, Vec::new()).unwrap());
    let ctx = ContextOwned::default();
    let bytes = v.encode_to_vec(&ctx.context());
    let mut stream = Cursor::new(bytes);
    let decoded = Variant::decode(&mut stream, &ctx.context()).unwrap();
    let Variant::Array(array) = decoded else {
        panic!("Expected an array");
    };
    assert!(array.values.is_empty());
    assert_eq!(array.value_type, VariantScalarTypeId::UInt32);
}

#[test]
fn variant_array_length_limit() {
    let values: Vec<Variant> = (0..100u32).map(Variant::from).collect();
    let v = Variant::from(Array::new(VariantScalarTypeId::UInt32, values).unwrap());
    let ctx = ContextOwned::default();
    let bytes = v.encode_to_vec(&ctx.context());

    let mut options = DecodingOptions::test();
    options.max_array_length = 10;
    let ctx = ContextOwned::new_default(Default::default(), options);
    let mut stream = Cursor::new(bytes);
    assert!(Variant::decode(&mut stream, &ctx.context()).is_err());
}

#[test]
fn variant_heterogeneous_array_rejected() {
    assert!(Array::new(
        VariantScalarTypeId::UInt32,
        vec![Variant::from(1u32), Variant::from("not a u32")]
    )
    .is_err());
}
