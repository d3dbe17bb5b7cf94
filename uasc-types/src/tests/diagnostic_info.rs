use std::io::Cursor;

use crate::{
    tests::*, BinaryDecodable, BinaryEncodable, ContextOwned, DecodingOptions, DepthGauge,
    DiagnosticInfo, DiagnosticInfoMask, StatusCode, UAString,
};

#[test]
fn diagnostic_info_null() {
    serialize_and_compare(DiagnosticInfo::null(), &[0u8]);
    serialize_test(DiagnosticInfo::null());
}

#[test]
fn diagnostic_info_full() {
    let d = DiagnosticInfo {
        symbolic_id: Some(10),
        namespace_uri: Some(2),
        locale: Some(3),
        localized_text: Some(4),
        additional_info: Some(UAString::from("more details")),
        inner_status_code: Some(StatusCode::BadSequenceNumberInvalid),
        inner_diagnostic_info: Some(Box::new(DiagnosticInfo {
            symbolic_id: Some(99),
            ..Default::default()
        })),
    };
    assert_eq!(
        d.encoding_mask(),
        DiagnosticInfoMask::all()
    );
    serialize_test(d);
}

#[test]
fn diagnostic_info_partial_mask() {
    let d = DiagnosticInfo {
        symbolic_id: Some(1),
        additional_info: Some(UAString::from("x")),
        ..Default::default()
    };
    let ctx = ContextOwned::default();
    let bytes = d.encode_to_vec(&ctx.context());
    assert_eq!(bytes[0], 0x01 | 0x10);
    serialize_test(d);
}

#[test]
fn diagnostic_info_recursion_bound() {
    // Nest inner diagnostic infos beyond the decoding depth limit
    let mut d = DiagnosticInfo::null();
    for _ in 0..10 {
        d = DiagnosticInfo {
            inner_diagnostic_info: Some(Box::new(d)),
            ..Default::default()
        };
    }
    let ctx = ContextOwned::default();
    let bytes = d.encode_to_vec(&ctx.context());

    let mut options = DecodingOptions::test();
    options.decoding_depth_gauge = DepthGauge::new(5);
    let ctx = ContextOwned::new_default(Default::default(), options);
    let mut stream = Cursor::new(bytes);
    assert!(DiagnosticInfo::decode(&mut stream, &ctx.context()).is_err());
}
