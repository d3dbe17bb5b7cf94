use std::io::Cursor;

use crate::{
    tests::*, ByteString, Context, ContextOwned, DecodingOptions, LocalizedText, QualifiedName,
    SimpleBinaryDecodable, SimpleBinaryEncodable, UAString,
};

#[test]
fn encoding_bool() {
    serialize_test(true);
    serialize_test(false);
}

#[test]
fn decoding_bool_canonicalizes_nonzero() {
    // Part 6 - a Boolean is false if zero, true for any other value
    let mut stream = Cursor::new(vec![42u8]);
    let value = <bool as SimpleBinaryDecodable>::decode(&mut stream, &DecodingOptions::test())
        .unwrap();
    assert!(value);
}

#[test]
fn encoding_sbyte() {
    serialize_test(-1i8);
    serialize_test(i8::MIN);
    serialize_test(i8::MAX);
}

#[test]
fn encoding_byte() {
    serialize_test(0u8);
    serialize_test(u8::MAX);
}

#[test]
fn encoding_int16() {
    serialize_test(0i16);
    serialize_test(i16::MIN);
    serialize_test(i16::MAX);
}

#[test]
fn encoding_uint16() {
    serialize_test(0u16);
    serialize_test(u16::MAX);
}

#[test]
fn encoding_int32() {
    serialize_test(0i32);
    serialize_test(i32::MIN);
    serialize_test(i32::MAX);
}

#[test]
fn encoding_uint32() {
    serialize_test(0u32);
    serialize_test(u32::MAX);
}

#[test]
fn encoding_int64() {
    serialize_test(0i64);
    serialize_test(i64::MIN);
    serialize_test(i64::MAX);
}

#[test]
fn encoding_uint64() {
    serialize_test(0u64);
    serialize_test(u64::MAX);
}

#[test]
fn encoding_f32() {
    serialize_test(0f32);
    serialize_test(f32::MIN);
    serialize_test(f32::MAX);
    serialize_test(std::f32::consts::PI);
}

#[test]
fn encoding_f64() {
    serialize_test(0f64);
    serialize_test(f64::MIN);
    serialize_test(f64::MAX);
    serialize_test(std::f64::consts::PI);
}

#[test]
fn little_endian_wire_format() {
    // Multi-byte integers are little-endian on the wire regardless of host
    serialize_and_compare(0x0102_0304u32, &[0x04, 0x03, 0x02, 0x01]);
    serialize_and_compare(0x0102i16, &[0x02, 0x01]);
    // IEEE-754 single precision -6.5 per the Part 6 example
    serialize_and_compare(-6.5f32, &[0x00, 0x00, 0xD0, 0xC0]);
}

#[test]
fn encoding_string() {
    serialize_test(UAString::null());
    serialize_test(UAString::from(""));
    serialize_test(UAString::from("Hello world"));
    // Non-ASCII UTF-8
    serialize_test(UAString::from("水Boy"));
}

#[test]
fn string_wire_format() {
    // Int32 length followed by UTF-8 bytes, -1 for null
    serialize_and_compare(UAString::from("ABC"), &[3, 0, 0, 0, b'A', b'B', b'C']);
    serialize_and_compare(UAString::null(), &[0xff, 0xff, 0xff, 0xff]);
    serialize_and_compare(UAString::from(""), &[0, 0, 0, 0]);
}

#[test]
fn string_length_limit() {
    let mut limited = DecodingOptions::test();
    limited.max_string_length = 2;
    let data = SimpleBinaryEncodable::encode_to_vec(&UAString::from("too long"));
    let mut stream = Cursor::new(data);
    assert!(<UAString as SimpleBinaryDecodable>::decode(&mut stream, &limited).is_err());
}

#[test]
fn decode_string_malformed_utf8() {
    // Length says 2 bytes, but the bytes are not valid UTF-8
    let mut stream = Cursor::new(vec![2u8, 0u8, 0u8, 0u8, 0xc3, 0x28]);
    assert!(
        <UAString as SimpleBinaryDecodable>::decode(&mut stream, &DecodingOptions::test())
            .is_err()
    );
}

#[test]
fn encoding_byte_string() {
    serialize_test(ByteString::null());
    serialize_test(ByteString::from(&[0x0u8, 0x1u8, 0x2u8, 0x3u8]));
}

#[test]
fn byte_string_length_limit() {
    let mut limited = DecodingOptions::test();
    limited.max_byte_string_length = 3;
    let data = SimpleBinaryEncodable::encode_to_vec(&ByteString::from(&[0u8; 16]));
    let mut stream = Cursor::new(data);
    assert!(<ByteString as SimpleBinaryDecodable>::decode(&mut stream, &limited).is_err());
}

#[test]
fn encoding_qualified_name() {
    serialize_test(QualifiedName::null());
    serialize_test(QualifiedName::new(1, "hello"));
}

#[test]
fn encoding_localized_text() {
    serialize_test(LocalizedText::null());
    serialize_test(LocalizedText::new("en-GB", "lorem ipsum"));
    serialize_test(LocalizedText::new("", "lorem ipsum"));
}

#[test]
fn localized_text_mask() {
    // Locale only = mask 0x1, text only = mask 0x2
    let v = LocalizedText::new("fr", "");
    let bytes = {
        let ctx = ContextOwned::default();
        crate::BinaryEncodable::encode_to_vec(&v, &ctx.context())
    };
    assert_eq!(bytes[0], 0x1);

    let v: LocalizedText = "hello".into();
    let bytes = {
        let ctx = ContextOwned::default();
        crate::BinaryEncodable::encode_to_vec(&v, &ctx.context())
    };
    assert_eq!(bytes[0], 0x2);
}

#[test]
fn null_array_round_trip() {
    let value: Option<Vec<UAString>> = None;
    serialize_test(value);
    let value: Option<Vec<UAString>> = Some(vec!["a".into(), UAString::null(), "c".into()]);
    serialize_test(value);
}

#[test]
fn array_length_limit() {
    let value: Option<Vec<u32>> = Some((0..100).collect());
    let ctx_f = ContextOwned::default();
    let data = crate::BinaryEncodable::encode_to_vec(&value, &ctx_f.context());

    let mut options = DecodingOptions::test();
    options.max_array_length = 10;
    let ctx_f = ContextOwned::new_default(Default::default(), options);
    let ctx: Context = ctx_f.context();
    let mut stream = Cursor::new(data);
    let result: Result<Option<Vec<u32>>, _> = crate::BinaryDecodable::decode(&mut stream, &ctx);
    assert!(result.is_err());
}
