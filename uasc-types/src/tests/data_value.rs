use std::io::Cursor;

use crate::{
    tests::*, BinaryDecodable, BinaryEncodable, ContextOwned, DataValue, DateTime, StatusCode,
    Variant,
};

#[test]
fn data_value_null() {
    // A null data value is just the mask byte
    serialize_and_compare(DataValue::null(), &[0u8]);
    serialize_test(DataValue::null());
}

#[test]
fn data_value_full() {
    let v = DataValue {
        value: Some(Variant::from(123u32)),
        status: Some(StatusCode::BadDecodingError),
        source_timestamp: Some(DateTime::now()),
        source_picoseconds: Some(100),
        server_timestamp: Some(DateTime::now()),
        server_picoseconds: Some(200),
    };
    serialize_test(v);
}

#[test]
fn data_value_mask_bits() {
    let ctx = ContextOwned::default();

    // Value only
    let v = DataValue::value_only(1u8);
    let bytes = v.encode_to_vec(&ctx.context());
    assert_eq!(bytes[0], 0x1);

    // Good status is omitted from the wire
    let v = DataValue {
        value: Some(Variant::from(1u8)),
        status: Some(StatusCode::Good),
        ..Default::default()
    };
    let bytes = v.encode_to_vec(&ctx.context());
    assert_eq!(bytes[0], 0x1);

    // Non-good status sets the status bit
    let v = DataValue {
        value: Some(Variant::from(1u8)),
        status: Some(StatusCode::BadInternalError),
        ..Default::default()
    };
    let bytes = v.encode_to_vec(&ctx.context());
    assert_eq!(bytes[0], 0x1 | 0x2);

    // Timestamps and picoseconds
    let v = DataValue {
        source_timestamp: Some(DateTime::now()),
        source_picoseconds: Some(1),
        server_timestamp: Some(DateTime::now()),
        server_picoseconds: Some(1),
        ..Default::default()
    };
    let bytes = v.encode_to_vec(&ctx.context());
    assert_eq!(bytes[0], 0x4 | 0x8 | 0x10 | 0x20);
}

#[test]
fn data_value_absent_fields_default() {
    let v = DataValue::value_only(42i32);
    let ctx = ContextOwned::default();
    let bytes = v.encode_to_vec(&ctx.context());
    let mut stream = Cursor::new(bytes);
    let decoded = DataValue::decode(&mut stream, &ctx.context()).unwrap();
    assert_eq!(decoded.value, Some(Variant::from(42i32)));
    assert_eq!(decoded.status, None);
    assert_eq!(decoded.status(), StatusCode::Good);
    assert_eq!(decoded.source_timestamp, None);
    assert_eq!(decoded.server_timestamp, None);
}

#[test]
fn data_value_picoseconds_require_timestamp() {
    // Picoseconds without their timestamp are not written
    let v = DataValue {
        source_picoseconds: Some(100),
        ..Default::default()
    };
    let ctx = ContextOwned::default();
    let bytes = v.encode_to_vec(&ctx.context());
    assert_eq!(bytes, vec![0u8]);
}
