use std::io::Cursor;
use std::str::FromStr;

use crate::{
    tests::*, BinaryDecodable, ByteString, ContextOwned, ExpandedNodeId, Guid, NodeId, UAString,
};

#[test]
fn node_id_two_byte_form() {
    // Numeric <= 255 in namespace 0 uses the two byte form
    let n = NodeId::new(0, 0x72u32);
    serialize_and_compare(n.clone(), &[0x00, 0x72]);
    serialize_test(n);
}

#[test]
fn node_id_four_byte_form() {
    // Numeric <= 65535 with namespace <= 255 uses the four byte form
    let n = NodeId::new(5, 1025u32);
    serialize_and_compare(n.clone(), &[0x01, 0x05, 0x01, 0x04]);
    serialize_test(n);
}

#[test]
fn node_id_numeric_form() {
    // Everything else uses the full numeric form
    let n = NodeId::new(5, 0x1000_0000u32);
    serialize_and_compare(n.clone(), &[0x02, 0x05, 0x00, 0x00, 0x00, 0x00, 0x10]);
    serialize_test(n);

    // A large namespace also forces the numeric form
    let n = NodeId::new(256, 1u32);
    serialize_and_compare(n.clone(), &[0x02, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00]);
    serialize_test(n);
}

#[test]
fn node_id_tightest_form_boundaries() {
    fn encoded_len(n: NodeId) -> usize {
        let ctx = ContextOwned::default();
        crate::BinaryEncodable::encode_to_vec(&n, &ctx.context()).len()
    }

    // 255 in ns 0 is two byte, 256 is four byte
    assert_eq!(encoded_len(NodeId::new(0, 255u32)), 2);
    assert_eq!(encoded_len(NodeId::new(0, 256u32)), 4);
    // 65535 in ns 255 is four byte, 65536 is numeric
    assert_eq!(encoded_len(NodeId::new(255, 65535u32)), 4);
    assert_eq!(encoded_len(NodeId::new(255, 65536u32)), 7);
    // namespace > 255 is always numeric
    assert_eq!(encoded_len(NodeId::new(256, 1u32)), 7);
}

#[test]
fn node_id_string_form() {
    serialize_test(NodeId::new(1, "hello"));
    serialize_test(NodeId::new(0, UAString::from("")));
}

#[test]
fn node_id_guid_form() {
    serialize_test(NodeId::new(30, Guid::new()));
}

#[test]
fn node_id_byte_string_form() {
    serialize_test(NodeId::new(2, ByteString::from(&[0x1u8, 0x2, 0x3])));
}

#[test]
fn node_id_reject_unknown_encoding() {
    // 0x6 is not a valid node id encoding byte
    let mut stream = Cursor::new(vec![0x6u8, 0, 0]);
    let ctx = ContextOwned::default();
    assert!(NodeId::decode(&mut stream, &ctx.context()).is_err());
}

#[test]
fn node_id_from_str() {
    assert_eq!(NodeId::from_str("i=13").unwrap(), NodeId::new(0, 13u32));
    assert_eq!(
        NodeId::from_str("ns=2;s=Hello World").unwrap(),
        NodeId::new(2, "Hello World")
    );
    assert!(NodeId::from_str("x=13").is_err());
}

#[test]
fn expanded_node_id_flags() {
    // Namespace uri flag 0x80
    let e = ExpandedNodeId {
        node_id: NodeId::new(0, 5u32),
        namespace_uri: "urn:test".into(),
        server_index: 0,
    };
    let bytes = {
        let ctx = ContextOwned::default();
        crate::BinaryEncodable::encode_to_vec(&e, &ctx.context())
    };
    assert_eq!(bytes[0], 0x80);
    serialize_test(e);

    // Server index flag 0x40
    let e = ExpandedNodeId {
        node_id: NodeId::new(0, 5u32),
        namespace_uri: UAString::null(),
        server_index: 10,
    };
    let bytes = {
        let ctx = ContextOwned::default();
        crate::BinaryEncodable::encode_to_vec(&e, &ctx.context())
    };
    assert_eq!(bytes[0], 0x40);
    serialize_test(e);

    // Both at once, on a four byte base
    let e = ExpandedNodeId {
        node_id: NodeId::new(4, 1000u32),
        namespace_uri: "urn:test".into(),
        server_index: 3,
    };
    let bytes = {
        let ctx = ContextOwned::default();
        crate::BinaryEncodable::encode_to_vec(&e, &ctx.context())
    };
    assert_eq!(bytes[0], 0x80 | 0x40 | 0x1);
    serialize_test(e);
}

#[test]
fn expanded_node_id_resolve() {
    let mut namespaces = crate::NamespaceMap::new();
    let idx = namespaces.add_namespace("urn:mynamespace");

    let e = ExpandedNodeId {
        node_id: NodeId::new(0, 55u32),
        namespace_uri: "urn:mynamespace".into(),
        server_index: 0,
    };
    let resolved = e.try_resolve(&namespaces).unwrap();
    assert_eq!(resolved.namespace, idx);

    let e = ExpandedNodeId {
        node_id: NodeId::new(0, 55u32),
        namespace_uri: "urn:unknown".into(),
        server_index: 0,
    };
    assert!(e.try_resolve(&namespaces).is_none());
}
