use tessera_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"tessera-tree-v1"`) that is
/// prepended to every hash computation. A tree and a feature with identical
/// encoded bytes therefore produce different ids.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for tree objects.
    pub const TREE: Self = Self {
        domain: "tessera-tree-v1",
    };
    /// Hasher for feature (record) objects.
    pub const FEATURE: Self = Self {
        domain: "tessera-feature-v1",
    };
    /// Hasher for feature type (schema) objects.
    pub const FEATURE_TYPE: Self = Self {
        domain: "tessera-featuretype-v1",
    };
    /// Hasher for commit objects.
    pub const COMMIT: Self = Self {
        domain: "tessera-commit-v1",
    };
    /// Hasher for tag objects.
    pub const TAG: Self = Self {
        domain: "tessera-tag-v1",
    };
    /// Hasher for tree entry names. Drives storage order and bucketing.
    pub const NODE_NAME: Self = Self {
        domain: "tessera-node-name-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Digest of a tree entry name.
    pub fn name_digest(name: &str) -> ObjectId {
        Self::NODE_NAME.hash(name.as_bytes())
    }
}
