use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tessera_types::{Envelope, ObjectId};

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::object::node::{Bucket, Node, NodeKind};
use crate::object::ObjectKind;
use crate::order::storage_cmp;

/// Number of buckets a sharded tree is split into at each level.
pub const BUCKET_COUNT: usize = 32;

/// Canonical encoding of the empty tree: the tree tag byte followed by a
/// zero size, zero tree count, the `Leaf` variant index and two empty lists.
const EMPTY_TREE_ENCODING: [u8; 37] = {
    let mut bytes = [0u8; 37];
    bytes[0] = 1;
    bytes
};

/// The contents of a tree: exactly one of a flat list of children or a
/// sparse bucket map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TreeBody {
    /// Records and subtrees, each sorted in storage order.
    Leaf { features: Vec<Node>, trees: Vec<Node> },
    /// Bucket index (0..BUCKET_COUNT) to child tree.
    Buckets(BTreeMap<u8, Bucket>),
}

/// A sharded tree.
///
/// `size` counts the record nodes of this tree's own entry set (across all
/// of its buckets); `num_trees` counts its subtree nodes. Neither descends
/// into nested subtree nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevTree {
    #[serde(skip)]
    pub(crate) id: ObjectId,
    size: u64,
    num_trees: u64,
    body: TreeBody,
}

impl RevTree {
    /// The canonical empty tree.
    pub fn empty() -> Self {
        Self {
            id: Self::empty_id(),
            size: 0,
            num_trees: 0,
            body: TreeBody::Leaf {
                features: Vec::new(),
                trees: Vec::new(),
            },
        }
    }

    /// Id of the canonical empty tree.
    pub fn empty_id() -> ObjectId {
        static EMPTY_ID: OnceLock<ObjectId> = OnceLock::new();
        *EMPTY_ID.get_or_init(|| ObjectKind::Tree.hasher().hash(&EMPTY_TREE_ENCODING))
    }

    /// Build a flat tree. Both lists are sorted into storage order here.
    pub fn leaf(mut features: Vec<Node>, mut trees: Vec<Node>) -> StoreResult<Self> {
        if let Some(bad) = features.iter().find(|n| n.kind() != NodeKind::Record) {
            return Err(StoreError::InvalidObject(format!(
                "{} node {:?} listed as a record",
                bad.kind(),
                bad.name()
            )));
        }
        if let Some(bad) = trees.iter().find(|n| n.kind() != NodeKind::Tree) {
            return Err(StoreError::InvalidObject(format!(
                "{} node {:?} listed as a subtree",
                bad.kind(),
                bad.name()
            )));
        }
        if features.is_empty() && trees.is_empty() {
            return Ok(Self::empty());
        }

        features.sort_by(|a, b| storage_cmp(a.name(), b.name()));
        trees.sort_by(|a, b| storage_cmp(a.name(), b.name()));
        check_unique(&features, &trees)?;

        let mut tree = Self {
            id: ObjectId::NULL,
            size: features.len() as u64,
            num_trees: trees.len() as u64,
            body: TreeBody::Leaf { features, trees },
        };
        tree.id = codec::compute_id(&tree)?;
        Ok(tree)
    }

    /// Build a bucketed tree from its children's ids and precomputed counts.
    pub fn bucketed(size: u64, num_trees: u64, buckets: BTreeMap<u8, Bucket>) -> StoreResult<Self> {
        if buckets.is_empty() {
            return Err(StoreError::InvalidObject(
                "bucketed tree without buckets".into(),
            ));
        }
        if let Some(index) = buckets.keys().find(|i| **i as usize >= BUCKET_COUNT) {
            return Err(StoreError::InvalidObject(format!(
                "bucket index {index} out of range"
            )));
        }
        if size + num_trees == 0 {
            return Err(StoreError::InvalidObject(
                "bucketed tree with no entries".into(),
            ));
        }
        let mut tree = Self {
            id: ObjectId::NULL,
            size,
            num_trees,
            body: TreeBody::Buckets(buckets),
        };
        tree.id = codec::compute_id(&tree)?;
        Ok(tree)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Number of record entries.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of subtree entries.
    pub fn num_trees(&self) -> u64 {
        self.num_trees
    }

    /// Total immediate entries, the figure compared against the
    /// normalization threshold.
    pub fn entry_count(&self) -> u64 {
        self.size + self.num_trees
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    pub fn body(&self) -> &TreeBody {
        &self.body
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, TreeBody::Leaf { .. })
    }

    pub fn is_bucketed(&self) -> bool {
        matches!(self.body, TreeBody::Buckets(_))
    }

    /// Record nodes; empty for a bucketed tree.
    pub fn features(&self) -> &[Node] {
        match &self.body {
            TreeBody::Leaf { features, .. } => features,
            TreeBody::Buckets(_) => &[],
        }
    }

    /// Subtree nodes; empty for a bucketed tree.
    pub fn trees(&self) -> &[Node] {
        match &self.body {
            TreeBody::Leaf { trees, .. } => trees,
            TreeBody::Buckets(_) => &[],
        }
    }

    /// All direct children of a leaf tree, records first.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.features().iter().chain(self.trees().iter())
    }

    pub fn buckets(&self) -> Option<&BTreeMap<u8, Bucket>> {
        match &self.body {
            TreeBody::Buckets(buckets) => Some(buckets),
            TreeBody::Leaf { .. } => None,
        }
    }

    /// Union of the bounds of every entry, or `None` if any entry has none
    /// (or the tree is empty).
    pub fn bounds(&self) -> Option<Envelope> {
        match &self.body {
            TreeBody::Leaf { .. } => Envelope::union_all(self.children().map(Node::bounds)),
            TreeBody::Buckets(buckets) => Envelope::union_all(buckets.values().map(Bucket::bounds)),
        }
    }

    /// Structural checks run after decoding.
    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        match &self.body {
            TreeBody::Leaf { features, trees } => {
                if features.len() as u64 != self.size || trees.len() as u64 != self.num_trees {
                    return Err(format!(
                        "leaf tree counts ({}, {}) disagree with its entries ({}, {})",
                        self.size,
                        self.num_trees,
                        features.len(),
                        trees.len()
                    ));
                }
                let sorted = |nodes: &[Node]| {
                    nodes
                        .windows(2)
                        .all(|w| storage_cmp(w[0].name(), w[1].name()).is_lt())
                };
                if !sorted(features) || !sorted(trees) {
                    return Err("leaf entries are not in storage order".into());
                }
                Ok(())
            }
            TreeBody::Buckets(buckets) => {
                if buckets.is_empty() || buckets.keys().any(|i| *i as usize >= BUCKET_COUNT) {
                    return Err("invalid bucket map".into());
                }
                Ok(())
            }
        }
    }
}

fn check_unique(features: &[Node], trees: &[Node]) -> StoreResult<()> {
    let mut seen = HashSet::with_capacity(features.len() + trees.len());
    for node in features.iter().chain(trees.iter()) {
        if !seen.insert(node.name()) {
            return Err(StoreError::InvalidObject(format!(
                "duplicate entry name {:?}",
                node.name()
            )));
        }
    }
    Ok(())
}
