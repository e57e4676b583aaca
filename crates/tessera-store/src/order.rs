//! Storage order: the canonical, hash-derived ordering of tree entries.
//!
//! Entries are never ordered by insertion or by name. They are ordered, and
//! assigned to buckets, by the digest of their name, so identical entry sets
//! always produce identical trees and bucketing is a pure function of
//! content.

use std::cmp::Ordering;
use std::collections::HashMap;

use tessera_crypto::ContentHasher;
use tessera_types::{ObjectId, OBJECT_ID_LEN};

use crate::object::{Node, BUCKET_COUNT};

/// Default number of memoized name digests before the cache is reset.
const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Deepest level at which a name can still be bucketed.
pub const MAX_BUCKET_DEPTH: usize = OBJECT_ID_LEN;

/// Bucket index of a name digest at `depth`.
///
/// Returns `None` once `depth` runs past the digest length.
pub fn bucket_of(digest: &ObjectId, depth: usize) -> Option<u8> {
    if depth >= MAX_BUCKET_DEPTH {
        return None;
    }
    let byte = digest.byte_n(depth) as usize;
    Some((byte * BUCKET_COUNT / 256) as u8)
}

/// Compare two names in storage order without memoization.
pub fn storage_cmp(a: &str, b: &str) -> Ordering {
    ContentHasher::name_digest(a)
        .cmp(&ContentHasher::name_digest(b))
        .then_with(|| a.cmp(b))
}

/// Storage-order comparator and bucket function with a bounded name→digest
/// cache.
///
/// The cache belongs to one instance. Each traversal or builder owns its
/// own, so concurrent operations never contend on it.
#[derive(Debug)]
pub struct NodeStorageOrder {
    cache: HashMap<String, ObjectId>,
    capacity: usize,
}

impl NodeStorageOrder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Digest of `name`, memoized.
    pub fn name_hash(&mut self, name: &str) -> ObjectId {
        if let Some(hash) = self.cache.get(name) {
            return *hash;
        }
        let hash = ContentHasher::name_digest(name);
        if self.cache.len() >= self.capacity {
            self.cache.clear();
        }
        self.cache.insert(name.to_string(), hash);
        hash
    }

    /// Total order on names: by digest, then by name.
    pub fn compare(&mut self, a: &str, b: &str) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let ha = self.name_hash(a);
        let hb = self.name_hash(b);
        ha.cmp(&hb).then_with(|| a.cmp(b))
    }

    /// `floor(digest[depth] * B / 256)`, or `None` past the digest length.
    pub fn bucket(&mut self, name: &str, depth: usize) -> Option<u8> {
        let hash = self.name_hash(name);
        bucket_of(&hash, depth)
    }

    /// Sort nodes in place by storage order of their names.
    pub fn sort_nodes(&mut self, nodes: &mut [Node]) {
        nodes.sort_by(|a, b| self.compare(a.name(), b.name()));
    }

    /// Number of memoized digests.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl Default for NodeStorageOrder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_independent_of_input_order() {
        let names = ["zeta", "alpha", "m", "roads", "1", "2", "10"];
        let mut order = NodeStorageOrder::new();

        let mut forward: Vec<Node> = names
            .iter()
            .map(|n| Node::record(*n, ObjectId::null()))
            .collect();
        let mut backward: Vec<Node> = forward.iter().rev().cloned().collect();
        order.sort_nodes(&mut forward);
        order.sort_nodes(&mut backward);
        assert_eq!(forward, backward);
    }

    #[test]
    fn memoized_and_plain_comparison_agree() {
        let mut order = NodeStorageOrder::new();
        for (a, b) in [("a", "b"), ("b", "a"), ("x", "x"), ("long/name", "z")] {
            assert_eq!(order.compare(a, b), storage_cmp(a, b));
        }
    }

    #[test]
    fn bucket_is_in_range_and_bounded_by_depth() {
        let mut order = NodeStorageOrder::new();
        for i in 0..500 {
            let name = format!("feature-{i}");
            for depth in [0, 5, MAX_BUCKET_DEPTH - 1] {
                let b = order.bucket(&name, depth).unwrap();
                assert!((b as usize) < BUCKET_COUNT);
            }
            assert_eq!(order.bucket(&name, MAX_BUCKET_DEPTH), None);
        }
    }

    #[test]
    fn bucket_formula_edges() {
        let mut raw = [0u8; 32];
        raw[0] = 255;
        raw[1] = 7;
        raw[2] = 8;
        let digest = ObjectId::from_hash(raw);
        assert_eq!(bucket_of(&digest, 0), Some(31));
        assert_eq!(bucket_of(&digest, 1), Some(0));
        assert_eq!(bucket_of(&digest, 2), Some(1));
        assert_eq!(bucket_of(&digest, 3), Some(0));
    }

    #[test]
    fn cache_is_bounded() {
        let mut order = NodeStorageOrder::with_capacity(8);
        for i in 0..100 {
            order.name_hash(&i.to_string());
            assert!(order.cached() <= 8);
        }
    }
}
