// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Utilities for working with namespaces.

use hashbrown::HashMap;

use crate::{ExpandedNodeId, NodeId};

/// Map of namespace URIs to namespace indexes, owned by a connection or a
/// server. Index 0 is always the OPC UA core namespace.
#[derive(Debug, Clone)]
pub struct NamespaceMap {
    known_namespaces: HashMap<String, u16>,
}

impl Default for NamespaceMap {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceMap {
    /// Create a new namespace map containing only the base namespace.
    pub fn new() -> Self {
        let mut known_namespaces = HashMap::new();
        known_namespaces.insert("http://opcfoundation.org/UA/".to_owned(), 0u16);

        Self { known_namespaces }
    }

    /// Create a new namespace map from the given list of namespaces.
    pub fn new_full(map: HashMap<String, u16>) -> Self {
        Self {
            known_namespaces: map,
        }
    }

    /// Add a new namespace, returning its index in the namespace map.
    /// If the namespace is already added, its old index is returned.
    pub fn add_namespace(&mut self, namespace: &str) -> u16 {
        if let Some(ns) = self.known_namespaces.get(namespace) {
            return *ns;
        }
        let max = self
            .known_namespaces
            .iter()
            .map(|kv| *kv.1)
            .max()
            .unwrap_or_default();
        self.known_namespaces.insert(namespace.to_owned(), max + 1);

        max + 1
    }

    /// Return the inner namespace map.
    pub fn known_namespaces(&self) -> &HashMap<String, u16> {
        &self.known_namespaces
    }

    /// Get the index of the given namespace.
    pub fn get_index(&self, ns: &str) -> Option<u16> {
        self.known_namespaces.get(ns).copied()
    }

    /// Get the namespace URI registered under the given index.
    pub fn get_uri(&self, index: u16) -> Option<&str> {
        self.known_namespaces
            .iter()
            .find(|(_, v)| **v == index)
            .map(|(k, _)| k.as_str())
    }

    /// Try to resolve an expanded node ID to a NodeId.
    pub fn resolve_node_id<'b>(
        &self,
        id: &'b ExpandedNodeId,
    ) -> Option<std::borrow::Cow<'b, NodeId>> {
        id.try_resolve(self)
    }
}
