mod data_value;
mod diagnostic_info;
mod encoding;
mod node_id;
mod variant;

use std::cmp::PartialEq;
use std::fmt::Debug;
use std::io::Cursor;

use crate::{BinaryDecodable, BinaryEncodable, ContextOwned};

pub fn serialize_test_and_return<T>(value: T) -> T
where
    T: BinaryEncodable + BinaryDecodable + Debug + PartialEq + Clone,
{
    serialize_test_and_return_expected(value.clone(), value)
}

pub fn serialize_as_stream<T>(value: T) -> Cursor<Vec<u8>>
where
    T: BinaryEncodable + Debug,
{
    let ctx_f = ContextOwned::default();
    let ctx = ctx_f.context();
    // Ask the struct for its byte length
    let byte_len = value.byte_len(&ctx);
    let mut stream = Cursor::new(Vec::with_capacity(byte_len));

    // Encode to stream
    let result = value.encode(&mut stream, &ctx);
    assert!(result.is_ok());

    // This ensures the size reported is the same as the byte length impl
    let actual = stream.into_inner();
    assert_eq!(actual.len(), byte_len);

    println!("value = {:?}", value);
    println!("encoded bytes = {:?}", actual);
    Cursor::new(actual)
}

pub fn serialize_test_and_return_expected<T>(value: T, expected_value: T) -> T
where
    T: BinaryEncodable + BinaryDecodable + Debug + PartialEq,
{
    let mut stream = serialize_as_stream(value);

    let ctx_f = ContextOwned::default();
    let ctx = ctx_f.context();
    let new_value: T = T::decode(&mut stream, &ctx).unwrap();
    println!("new value = {:?}", new_value);
    assert_eq!(expected_value, new_value);
    new_value
}

pub fn serialize_test<T>(value: T)
where
    T: BinaryEncodable + BinaryDecodable + Debug + PartialEq + Clone,
{
    let _ = serialize_test_and_return(value);
}

pub fn serialize_test_expected<T>(value: T, expected_value: T)
where
    T: BinaryEncodable + BinaryDecodable + Debug + PartialEq,
{
    let _ = serialize_test_and_return_expected(value, expected_value);
}

pub fn serialize_and_compare<T>(value: T, expected: &[u8])
where
    T: BinaryEncodable + Debug,
{
    let stream = serialize_as_stream(value);
    assert_eq!(stream.into_inner(), expected);
}
