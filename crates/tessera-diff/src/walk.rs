//! The structural diff traversal.
//!
//! [`DiffTreeWalk`] compares two trees pairwise and reports differences to a
//! [`DiffConsumer`]. Subtrees and buckets with equal ids are skipped without
//! being read, so the cost of a diff is proportional to what changed.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use tessera_store::{Bucket, Node, NodeStorageOrder, ObjectDatabase, RevTree, StoreError, TreeBody};
use tessera_types::ObjectId;
use tracing::trace;

use crate::consumer::DiffConsumer;
use crate::error::{DiffError, DiffResult};

/// Cooperative cancellation flag shared between a walk and its owner.
///
/// A [`child`](Self::child) token is cancelled by its own `cancel` or by its
/// parent's, while cancelling the child leaves the parent untouched.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, AtomicOrdering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(AtomicOrdering::Acquire)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(AtomicOrdering::Acquire))
    }
}

/// Pairwise walk of two trees.
///
/// The roots are reported as tree nodes named `""` carrying the root ids and
/// bounds. Identical roots produce no calls at all.
pub struct DiffTreeWalk<'a> {
    db: &'a dyn ObjectDatabase,
    left: RevTree,
    right: RevTree,
    cancel: CancelToken,
}

impl<'a> DiffTreeWalk<'a> {
    pub fn new(db: &'a dyn ObjectDatabase, left: RevTree, right: RevTree) -> Self {
        Self {
            db,
            left,
            right,
            cancel: CancelToken::new(),
        }
    }

    /// Walk between the trees stored under `left` and `right`.
    pub fn open(db: &'a dyn ObjectDatabase, left: &ObjectId, right: &ObjectId) -> DiffResult<Self> {
        Ok(Self::new(db, db.get_tree(left)?, db.get_tree(right)?))
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn left(&self) -> &RevTree {
        &self.left
    }

    pub fn right(&self) -> &RevTree {
        &self.right
    }

    /// Run the traversal, feeding `consumer`.
    pub fn walk(&self, consumer: &mut dyn DiffConsumer) -> DiffResult<()> {
        if self.left.id() == self.right.id() {
            return Ok(());
        }
        let mut walker = Walker {
            db: self.db,
            cancel: &self.cancel,
            order: NodeStorageOrder::new(),
            consumer,
        };
        walker.check_cancelled()?;
        let left = Node::tree("", self.left.id()).with_optional_bounds(self.left.bounds());
        let right = Node::tree("", self.right.id()).with_optional_bounds(self.right.bounds());
        if walker.consumer.tree(Some(&left), Some(&right))? {
            walker.traverse_tree(&self.left, &self.right, 0)?;
        }
        walker.consumer.end_tree(Some(&left), Some(&right))
    }
}

/// One side of a bucket pair. Buckets of a leaf tree compared against a
/// bucketed one are synthesized in memory and carry their tree.
struct BucketSide {
    bucket: Bucket,
    tree: Option<RevTree>,
}

struct Walker<'w> {
    db: &'w dyn ObjectDatabase,
    cancel: &'w CancelToken,
    order: NodeStorageOrder,
    consumer: &'w mut dyn DiffConsumer,
}

impl Walker<'_> {
    fn check_cancelled(&self) -> DiffResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DiffError::Cancelled);
        }
        Ok(())
    }

    /// Compare the contents of two trees at bucket `depth`.
    fn traverse_tree(&mut self, left: &RevTree, right: &RevTree, depth: usize) -> DiffResult<()> {
        if left.id() == right.id() {
            return Ok(());
        }
        if left.is_leaf() && right.is_leaf() {
            self.traverse_leaves(left, right)
        } else {
            self.traverse_buckets(left, right, depth)
        }
    }

    /// Merge-join two leaves in storage order.
    fn traverse_leaves(&mut self, left: &RevTree, right: &RevTree) -> DiffResult<()> {
        let mut lefts: Vec<&Node> = left.children().collect();
        let mut rights: Vec<&Node> = right.children().collect();
        lefts.sort_by(|a, b| self.order.compare(a.name(), b.name()));
        rights.sort_by(|a, b| self.order.compare(a.name(), b.name()));

        let (mut i, mut j) = (0, 0);
        while i < lefts.len() || j < rights.len() {
            let ordering = match (lefts.get(i), rights.get(j)) {
                (Some(l), Some(r)) => self.order.compare(l.name(), r.name()),
                (Some(_), None) => Ordering::Less,
                _ => Ordering::Greater,
            };
            match ordering {
                Ordering::Less => {
                    self.entry(Some(lefts[i]), None)?;
                    i += 1;
                }
                Ordering::Greater => {
                    self.entry(None, Some(rights[j]))?;
                    j += 1;
                }
                Ordering::Equal => {
                    self.entry(Some(lefts[i]), Some(rights[j]))?;
                    i += 1;
                    j += 1;
                }
            }
        }
        Ok(())
    }

    /// Report one pair of entries sharing a name.
    fn entry(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        match (left, right) {
            (Some(l), Some(r)) if l.kind() != r.kind() => {
                self.entry(Some(l), None)?;
                self.entry(None, Some(r))
            }
            (Some(l), Some(r)) if l.object_id() == r.object_id() => Ok(()),
            _ => {
                let is_tree = left.or(right).is_some_and(Node::is_tree);
                if is_tree {
                    self.subtree(left, right)
                } else {
                    self.consumer.feature(left, right)
                }
            }
        }
    }

    fn subtree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        self.check_cancelled()?;
        if self.consumer.tree(left, right)? {
            let left_tree = self.load(left.map(Node::object_id))?;
            let right_tree = self.load(right.map(Node::object_id))?;
            self.traverse_tree(&left_tree, &right_tree, 0)?;
        }
        self.consumer.end_tree(left, right)
    }

    fn traverse_buckets(&mut self, left: &RevTree, right: &RevTree, depth: usize) -> DiffResult<()> {
        let mut lefts = self.bucket_sides(left, depth)?;
        let mut rights = self.bucket_sides(right, depth)?;
        let indexes: BTreeSet<u8> = lefts.keys().chain(rights.keys()).copied().collect();

        for index in indexes {
            let l = lefts.remove(&index);
            let r = rights.remove(&index);
            let lb = l.as_ref().map(|s| &s.bucket);
            let rb = r.as_ref().map(|s| &s.bucket);
            if let (Some(a), Some(b)) = (lb, rb) {
                if a.id() == b.id() {
                    continue;
                }
            }
            self.check_cancelled()?;
            if self.consumer.bucket(index, depth, lb, rb)? {
                trace!(index, depth, "descending into bucket pair");
                let left_tree = self.side_tree(l.as_ref())?;
                let right_tree = self.side_tree(r.as_ref())?;
                self.traverse_tree(&left_tree, &right_tree, depth + 1)?;
            }
            self.consumer.end_bucket(index, depth, lb, rb)?;
        }
        Ok(())
    }

    /// The buckets of `tree` at `depth`, partitioning a leaf as if it had
    /// been bucketed.
    fn bucket_sides(&mut self, tree: &RevTree, depth: usize) -> DiffResult<BTreeMap<u8, BucketSide>> {
        let (features, trees) = match tree.body() {
            TreeBody::Buckets(buckets) => {
                return Ok(buckets
                    .iter()
                    .map(|(index, bucket)| {
                        let side = BucketSide {
                            bucket: *bucket,
                            tree: None,
                        };
                        (*index, side)
                    })
                    .collect());
            }
            TreeBody::Leaf { features, trees } => (features, trees),
        };

        let mut partitions: BTreeMap<u8, (Vec<Node>, Vec<Node>)> = BTreeMap::new();
        for node in features.iter().chain(trees.iter()) {
            let index = self.order.bucket(node.name(), depth).ok_or_else(|| {
                StoreError::CorruptObject {
                    id: tree.id(),
                    reason: format!("cannot bucket {:?} at depth {depth}", node.name()),
                }
            })?;
            let (f, t) = partitions.entry(index).or_default();
            if node.is_tree() {
                t.push(node.clone());
            } else {
                f.push(node.clone());
            }
        }

        let mut sides = BTreeMap::new();
        for (index, (f, t)) in partitions {
            let child = RevTree::leaf(f, t)?;
            let side = BucketSide {
                bucket: Bucket::new(child.id(), child.bounds()),
                tree: Some(child),
            };
            sides.insert(index, side);
        }
        Ok(sides)
    }

    fn side_tree(&self, side: Option<&BucketSide>) -> DiffResult<RevTree> {
        match side {
            None => Ok(RevTree::empty()),
            Some(BucketSide {
                tree: Some(tree), ..
            }) => Ok(tree.clone()),
            Some(side) => self.load(Some(side.bucket.id())),
        }
    }

    fn load(&self, id: Option<ObjectId>) -> DiffResult<RevTree> {
        match id {
            Some(id) => Ok(self.db.get_tree(&id)?),
            None => Ok(RevTree::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_store::InMemoryObjectDatabase;
    use tessera_tree::{RevTreeBuilder, TreeFormat};

    /// Records every call as a line of text.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        open: i32,
        prune_trees: bool,
    }

    fn label(node: Option<&Node>) -> String {
        node.map_or("-".to_string(), |n| n.name().to_string())
    }

    impl DiffConsumer for Recorder {
        fn tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<bool> {
            self.open += 1;
            self.events.push(format!("tree {} {}", label(left), label(right)));
            Ok(!self.prune_trees || left.or(right).is_some_and(|n| n.name().is_empty()))
        }

        fn end_tree(&mut self, _left: Option<&Node>, _right: Option<&Node>) -> DiffResult<()> {
            self.open -= 1;
            Ok(())
        }

        fn bucket(
            &mut self,
            _index: u8,
            _depth: usize,
            _left: Option<&Bucket>,
            _right: Option<&Bucket>,
        ) -> DiffResult<bool> {
            self.open += 1;
            Ok(true)
        }

        fn end_bucket(
            &mut self,
            _index: u8,
            _depth: usize,
            _left: Option<&Bucket>,
            _right: Option<&Bucket>,
        ) -> DiffResult<()> {
            self.open -= 1;
            Ok(())
        }

        fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
            self.events.push(format!("feature {} {}", label(left), label(right)));
            Ok(())
        }
    }

    fn oid(s: &str) -> ObjectId {
        ObjectId::from_bytes(s.as_bytes())
    }

    fn build(db: &InMemoryObjectDatabase, format: TreeFormat, nodes: Vec<Node>) -> RevTree {
        let mut builder = RevTreeBuilder::new(db).with_format(format);
        for node in nodes {
            builder.insert(node).unwrap();
        }
        builder.build().unwrap()
    }

    fn records(range: std::ops::Range<usize>, version: &str) -> Vec<Node> {
        range
            .map(|i| Node::record(i.to_string(), oid(&format!("{i}-{version}"))))
            .collect()
    }

    #[test]
    fn identical_roots_produce_no_calls() {
        let db = InMemoryObjectDatabase::new();
        let tree = build(&db, TreeFormat::V1, records(0..5, "v1"));
        let mut rec = Recorder::default();
        DiffTreeWalk::new(&db, tree.clone(), tree).walk(&mut rec).unwrap();
        assert!(rec.events.is_empty());
    }

    #[test]
    fn leaf_changes_are_reported_once_each() {
        let db = InMemoryObjectDatabase::new();
        let left = build(&db, TreeFormat::V1, records(0..3, "v1"));
        let mut nodes = records(1..3, "v1");
        nodes[0] = Node::record("1", oid("1-v2"));
        nodes.push(Node::record("9", oid("9-v1")));
        let right = build(&db, TreeFormat::V1, nodes);

        let mut rec = Recorder::default();
        DiffTreeWalk::new(&db, left, right).walk(&mut rec).unwrap();
        let mut features: Vec<&String> = rec.events.iter().filter(|e| e.starts_with("feature")).collect();
        features.sort();
        assert_eq!(features, vec!["feature - 9", "feature 0 -", "feature 1 1"]);
        assert_eq!(rec.events[0], "tree  ");
        assert_eq!(rec.open, 0);
    }

    #[test]
    fn kind_change_is_a_removal_and_an_addition() {
        let db = InMemoryObjectDatabase::new();
        let sub = build(&db, TreeFormat::V1, records(0..2, "v1"));
        let left = build(&db, TreeFormat::V1, vec![Node::record("x", oid("x"))]);
        let right = build(&db, TreeFormat::V1, vec![Node::tree("x", sub.id())]);

        let mut rec = Recorder::default();
        DiffTreeWalk::new(&db, left, right).walk(&mut rec).unwrap();
        assert!(rec.events.contains(&"feature x -".to_string()));
        assert!(rec.events.contains(&"tree - x".to_string()));
        assert_eq!(rec.events.iter().filter(|e| e.starts_with("feature - ")).count(), 2);
        assert_eq!(rec.open, 0);
    }

    #[test]
    fn equal_ids_with_new_metadata_are_skipped() {
        let db = InMemoryObjectDatabase::new();
        let sub = build(&db, TreeFormat::V1, records(0..2, "v1"));
        let side = |md: &str| {
            vec![
                Node::record("x", oid("x")).with_metadata(oid(md)),
                Node::tree("t", sub.id()).with_metadata(oid(md)),
            ]
        };
        let left = build(&db, TreeFormat::V1, side("s1"));
        let right = build(&db, TreeFormat::V1, side("s2"));

        let mut rec = Recorder::default();
        DiffTreeWalk::new(&db, left, right).walk(&mut rec).unwrap();
        assert_eq!(rec.events, vec!["tree  "]);
        assert_eq!(rec.open, 0);
    }

    #[test]
    fn pruned_trees_are_still_closed() {
        let db = InMemoryObjectDatabase::new();
        let a = build(&db, TreeFormat::V1, records(0..2, "a"));
        let b = build(&db, TreeFormat::V1, records(0..2, "b"));
        let left = build(&db, TreeFormat::V1, vec![Node::tree("t", a.id())]);
        let right = build(&db, TreeFormat::V1, vec![Node::tree("t", b.id())]);

        let mut rec = Recorder {
            prune_trees: true,
            ..Default::default()
        };
        DiffTreeWalk::new(&db, left, right).walk(&mut rec).unwrap();
        assert_eq!(rec.events, vec!["tree  ", "tree t t"]);
        assert_eq!(rec.open, 0);
    }

    #[test]
    fn leaf_against_bucketed_tree() {
        let db = InMemoryObjectDatabase::new();
        let format = TreeFormat::with_threshold(4).unwrap();
        let left = build(&db, format, records(0..3, "v1"));
        let right = build(&db, format, records(0..20, "v1"));
        assert!(left.is_leaf() && right.is_bucketed());

        let mut rec = Recorder::default();
        DiffTreeWalk::new(&db, left.clone(), right.clone())
            .walk(&mut rec)
            .unwrap();
        let added: Vec<&String> = rec.events.iter().filter(|e| e.starts_with("feature - ")).collect();
        assert_eq!(added.len(), 17);
        assert_eq!(rec.events.iter().filter(|e| e.starts_with("feature")).count(), 17);
        assert_eq!(rec.open, 0);

        let mut rec = Recorder::default();
        DiffTreeWalk::new(&db, right, left).walk(&mut rec).unwrap();
        assert_eq!(rec.events.iter().filter(|e| e.ends_with(" -")).count(), 17);
    }

    #[test]
    fn cancelled_walk_stops() {
        let db = InMemoryObjectDatabase::new();
        let left = build(&db, TreeFormat::V1, records(0..2, "v1"));
        let right = build(&db, TreeFormat::V1, records(0..2, "v2"));
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut rec = Recorder::default();
        let err = DiffTreeWalk::new(&db, left, right)
            .with_cancel_token(cancel)
            .walk(&mut rec)
            .unwrap_err();
        assert!(matches!(err, DiffError::Cancelled));
        assert!(rec.events.is_empty());
    }

    #[test]
    fn child_tokens_follow_their_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn missing_subtree_is_fatal() {
        let db = InMemoryObjectDatabase::new();
        let left = build(&db, TreeFormat::V1, vec![Node::tree("t", oid("absent"))]);
        let right = RevTree::empty();
        let mut rec = Recorder::default();
        let err = DiffTreeWalk::new(&db, left, right).walk(&mut rec).unwrap_err();
        assert!(matches!(err, DiffError::Store(StoreError::NotFound(_))));
    }
}
