// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::node::NodeId;

#[test]
fn short_truncates() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
    assert_eq!(short("", 3), "");
}

#[test]
fn idbuf_round_trips() {
    let buf = IdBuf::new("node-abc123");
    assert_eq!(buf.as_str(), "node-abc123");
    assert!(!buf.is_empty());
    assert!(IdBuf::empty().is_empty());
}

#[test]
fn node_id_has_prefix() {
    let id = NodeId::new();
    assert!(id.as_str().starts_with("node-"));
    assert_eq!(id.as_str().len(), "node-".len() + 19);
}

#[test]
fn node_id_new_is_unique() {
    assert_ne!(NodeId::new(), NodeId::new());
}

#[test]
fn node_id_accepts_store_assigned_hex() {
    // 24-char hex object ids from the store must fit the buffer
    let id = NodeId::from_string("65a1b2c3d4e5f6a7b8c9d0e1");
    assert_eq!(id.as_str(), "65a1b2c3d4e5f6a7b8c9d0e1");
    assert_eq!(id.suffix(), "65a1b2c3d4e5f6a7b8c9d0e1");
}

#[test]
fn node_id_serde_is_transparent() {
    let id = NodeId::from_string("node-xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"node-xyz\"");
    let parsed: NodeId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn node_id_deserialize_rejects_oversized() {
    let long = format!("\"{}\"", "x".repeat(ID_MAX_LEN + 1));
    assert!(serde_json::from_str::<NodeId>(&long).is_err());
}

#[test]
fn node_id_borrow_str_lookup() {
    use std::collections::HashMap;
    let mut map: HashMap<NodeId, u32> = HashMap::new();
    map.insert(NodeId::from_string("node-a"), 1);
    assert_eq!(map.get("node-a"), Some(&1));
}
