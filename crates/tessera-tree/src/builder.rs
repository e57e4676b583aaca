use std::collections::BTreeMap;

use tessera_store::{
    Bucket, Node, NodeKind, NodeStorageOrder, ObjectDatabase, RevTree, TreeBody,
};
use tracing::debug;

use crate::error::{TreeError, TreeResult};
use crate::format::TreeFormat;
use crate::lookup::all_entries;

/// A staged edit to one entry name.
#[derive(Clone, Debug)]
enum Change {
    Remove,
    /// `replaces` is set when the name was removed first, which allows the
    /// new node to have a different kind than the entry it replaces.
    Put { node: Node, replaces: bool },
}

/// Builds a [`RevTree`] from an existing tree plus staged inserts and
/// removals, persisting every new tree it creates.
///
/// The result is always the canonical tree of its entry set: a tree with at
/// most `T` immediate entries is flat; a larger one is split into buckets by
/// the name digest byte at its depth, each bucket being the canonical tree
/// of its entries one level deeper. Edits to a bucketed tree rebuild only
/// the buckets they touch; untouched buckets keep their ids.
pub struct RevTreeBuilder<'a> {
    db: &'a dyn ObjectDatabase,
    format: TreeFormat,
    original: RevTree,
    pending: BTreeMap<String, Change>,
    order: NodeStorageOrder,
}

impl<'a> RevTreeBuilder<'a> {
    /// Builder starting from the empty tree.
    pub fn new(db: &'a dyn ObjectDatabase) -> Self {
        Self::from_tree(db, RevTree::empty())
    }

    /// Builder starting from `original`, which must be canonical under the
    /// builder's format.
    pub fn from_tree(db: &'a dyn ObjectDatabase, original: RevTree) -> Self {
        Self {
            db,
            format: TreeFormat::V1,
            original,
            pending: BTreeMap::new(),
            order: NodeStorageOrder::new(),
        }
    }

    pub fn with_format(mut self, format: TreeFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> &TreeFormat {
        &self.format
    }

    /// Stage `node`, replacing any entry of the same name and kind.
    pub fn insert(&mut self, node: Node) -> TreeResult<&mut Self> {
        validate_name(node.name())?;
        let replaces = match self.pending.get(node.name()) {
            None => false,
            Some(Change::Remove) => true,
            Some(Change::Put { node: staged, replaces }) => {
                if staged.kind() != node.kind() {
                    return Err(ambiguous(node.name(), staged.kind(), node.kind()));
                }
                *replaces
            }
        };
        self.pending
            .insert(node.name().to_string(), Change::Put { node, replaces });
        Ok(self)
    }

    /// Stage the removal of `name`. Removing an absent name is a no-op.
    pub fn remove(&mut self, name: &str) -> TreeResult<&mut Self> {
        validate_name(name)?;
        self.pending.insert(name.to_string(), Change::Remove);
        Ok(self)
    }

    /// Number of staged changes.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Apply the staged changes and persist the resulting tree.
    pub fn build(mut self) -> TreeResult<RevTree> {
        let changes: Vec<(String, Change)> = std::mem::take(&mut self.pending).into_iter().collect();
        let original = std::mem::replace(&mut self.original, RevTree::empty());
        let tree = self.apply(original, changes, 0)?;
        debug!(
            id = %tree.id().short_hex(),
            size = tree.size(),
            trees = tree.num_trees(),
            bucketed = tree.is_bucketed(),
            "built tree"
        );
        Ok(tree)
    }

    fn apply(
        &mut self,
        original: RevTree,
        changes: Vec<(String, Change)>,
        depth: usize,
    ) -> TreeResult<RevTree> {
        if changes.is_empty() {
            return Ok(original);
        }
        match original.body() {
            TreeBody::Leaf { .. } => {
                let mut entries: BTreeMap<String, Node> = original
                    .children()
                    .map(|n| (n.name().to_string(), n.clone()))
                    .collect();
                merge(&mut entries, changes)?;
                self.build_canonical(entries.into_values().collect(), depth)
            }
            TreeBody::Buckets(buckets) => self.apply_bucketed(&original, buckets, changes, depth),
        }
    }

    fn apply_bucketed(
        &mut self,
        original: &RevTree,
        buckets: &BTreeMap<u8, Bucket>,
        changes: Vec<(String, Change)>,
        depth: usize,
    ) -> TreeResult<RevTree> {
        let mut grouped: BTreeMap<u8, Vec<(String, Change)>> = BTreeMap::new();
        for (name, change) in changes {
            let index = self.bucket(&name, depth)?;
            grouped.entry(index).or_default().push((name, change));
        }

        let mut new_buckets = buckets.clone();
        let mut size = original.size();
        let mut num_trees = original.num_trees();
        for (index, changes) in grouped {
            let child = match buckets.get(&index) {
                Some(bucket) => self.db.get_tree(&bucket.id())?,
                None => RevTree::empty(),
            };
            size -= child.size();
            num_trees -= child.num_trees();
            let rebuilt = self.apply(child, changes, depth + 1)?;
            size += rebuilt.size();
            num_trees += rebuilt.num_trees();
            if rebuilt.is_empty() {
                new_buckets.remove(&index);
            } else {
                new_buckets.insert(index, Bucket::new(rebuilt.id(), rebuilt.bounds()));
            }
        }

        let count = size + num_trees;
        if count == 0 {
            return Ok(RevTree::empty());
        }
        if self.format.is_leaf(count, depth) {
            // Shrunk below the threshold: collapse every bucket into one leaf.
            let mut entries = Vec::with_capacity(count as usize);
            for bucket in new_buckets.values() {
                let child = self.db.get_tree(&bucket.id())?;
                entries.extend(all_entries(self.db, &child)?);
            }
            return self.persist_leaf(entries, depth);
        }
        self.persist_bucketed(size, num_trees, new_buckets, depth)
    }

    /// The canonical tree of `entries` at `depth`, built from scratch.
    fn build_canonical(&mut self, entries: Vec<Node>, depth: usize) -> TreeResult<RevTree> {
        if entries.is_empty() {
            return Ok(RevTree::empty());
        }
        if self.format.is_leaf(entries.len() as u64, depth) {
            return self.persist_leaf(entries, depth);
        }

        let mut grouped: BTreeMap<u8, Vec<Node>> = BTreeMap::new();
        for node in entries {
            let index = self.bucket(node.name(), depth)?;
            grouped.entry(index).or_default().push(node);
        }

        let mut buckets = BTreeMap::new();
        let (mut size, mut num_trees) = (0, 0);
        for (index, group) in grouped {
            let child = self.build_canonical(group, depth + 1)?;
            size += child.size();
            num_trees += child.num_trees();
            buckets.insert(index, Bucket::new(child.id(), child.bounds()));
        }
        self.persist_bucketed(size, num_trees, buckets, depth)
    }

    fn persist_leaf(&mut self, entries: Vec<Node>, depth: usize) -> TreeResult<RevTree> {
        let (trees, features): (Vec<Node>, Vec<Node>) =
            entries.into_iter().partition(Node::is_tree);
        let tree = RevTree::leaf(features, trees)?;
        if !tree.is_empty() {
            self.db.put_tree(&tree)?;
        }
        debug!(
            id = %tree.id().short_hex(),
            depth,
            size = tree.size(),
            trees = tree.num_trees(),
            "wrote leaf tree"
        );
        Ok(tree)
    }

    fn persist_bucketed(
        &mut self,
        size: u64,
        num_trees: u64,
        buckets: BTreeMap<u8, Bucket>,
        depth: usize,
    ) -> TreeResult<RevTree> {
        let bucket_count = buckets.len();
        let tree = RevTree::bucketed(size, num_trees, buckets)?;
        self.db.put_tree(&tree)?;
        debug!(
            id = %tree.id().short_hex(),
            depth,
            size,
            trees = num_trees,
            buckets = bucket_count,
            "wrote bucketed tree"
        );
        Ok(tree)
    }

    fn bucket(&mut self, name: &str, depth: usize) -> TreeResult<u8> {
        self.order.bucket(name, depth).ok_or_else(|| {
            TreeError::InvalidFormat(format!("cannot bucket {name:?} at depth {depth}"))
        })
    }
}

/// Apply staged changes to a materialized leaf.
fn merge(entries: &mut BTreeMap<String, Node>, changes: Vec<(String, Change)>) -> TreeResult<()> {
    for (name, change) in changes {
        match change {
            Change::Remove => {
                entries.remove(&name);
            }
            Change::Put { node, replaces } => {
                if let Some(existing) = entries.get(&name) {
                    if !replaces && existing.kind() != node.kind() {
                        return Err(ambiguous(&name, existing.kind(), node.kind()));
                    }
                }
                entries.insert(name, node);
            }
        }
    }
    Ok(())
}

fn validate_name(name: &str) -> TreeResult<()> {
    if name.is_empty() || name.contains('/') {
        return Err(TreeError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn ambiguous(name: &str, existing: NodeKind, inserted: NodeKind) -> TreeError {
    TreeError::AmbiguousPath {
        name: name.to_string(),
        existing,
        inserted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{deep_size, find_node};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_store::{InMemoryObjectDatabase, StoreResult};
    use tessera_types::{Envelope, ObjectId};

    fn oid(name: &str) -> ObjectId {
        ObjectId::from_bytes(name.as_bytes())
    }

    fn record(name: &str) -> Node {
        Node::record(name, oid(name))
    }

    fn build_from(db: &dyn ObjectDatabase, format: TreeFormat, names: &[String]) -> RevTree {
        let mut builder = RevTreeBuilder::new(db).with_format(format);
        for name in names {
            builder.insert(record(name)).unwrap();
        }
        builder.build().unwrap()
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    fn expanded_names(db: &dyn ObjectDatabase, tree: &RevTree) -> Vec<String> {
        let mut out: Vec<String> = all_entries(db, tree)
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        out.sort();
        out
    }

    /// Counts tree reads on top of an in-memory database.
    #[derive(Default)]
    struct CountingDb {
        inner: InMemoryObjectDatabase,
        reads: AtomicUsize,
    }

    impl ObjectDatabase for CountingDb {
        fn read_raw(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_raw(id)
        }
        fn put_raw(&self, id: &ObjectId, data: &[u8]) -> StoreResult<bool> {
            self.inner.put_raw(id, data)
        }
        fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
            self.inner.exists(id)
        }
        fn lookup(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
            self.inner.lookup(prefix)
        }
        fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
            self.inner.delete(id)
        }
    }

    #[test]
    fn empty_entry_set_builds_the_empty_tree() {
        let db = InMemoryObjectDatabase::new();
        let tree = RevTreeBuilder::new(&db).build().unwrap();
        assert_eq!(tree.id(), RevTree::empty_id());

        let mut builder = RevTreeBuilder::new(&db);
        builder.insert(record("a")).unwrap();
        builder.remove("a").unwrap();
        assert_eq!(builder.build().unwrap().id(), RevTree::empty_id());
    }

    #[test]
    fn three_records_with_threshold_two() {
        let db = InMemoryObjectDatabase::new();
        let format = TreeFormat::with_threshold(2).unwrap();
        let abc = ["a", "b", "c"].map(String::from);
        let cab = ["c", "a", "b"].map(String::from);

        let first = build_from(&db, format, &abc);
        assert!(first.is_bucketed());
        assert!(first.features().is_empty());
        assert_eq!(first.size(), 3);
        assert_eq!(expanded_names(&db, &first), vec!["a", "b", "c"]);

        let second = build_from(&db, format, &cab);
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn threshold_sharding() {
        let db = InMemoryObjectDatabase::new();
        let format = TreeFormat::with_threshold(16).unwrap();

        let flat = build_from(&db, format, &names(16));
        assert!(flat.is_leaf());
        assert_eq!(flat.features().len(), 16);
        assert_eq!(flat.size(), 16);

        let sharded = build_from(&db, format, &names(17));
        assert!(sharded.is_bucketed());
        assert!(sharded.features().is_empty());
        assert_eq!(sharded.size(), 17);
        assert_eq!(deep_size(&db, &sharded).unwrap(), 17);
    }

    #[test]
    fn default_format_shards_above_512() {
        let db = InMemoryObjectDatabase::new();
        let tree = build_from(&db, TreeFormat::V1, &names(513));
        assert!(tree.is_bucketed());
        assert_eq!(tree.size(), 513);
        for bucket in tree.buckets().unwrap().values() {
            assert!(db.get_tree(&bucket.id()).unwrap().is_leaf());
        }
    }

    #[test]
    fn ambiguous_kinds_are_rejected() {
        let db = InMemoryObjectDatabase::new();
        let mut builder = RevTreeBuilder::new(&db);
        builder.insert(record("x")).unwrap();
        let err = builder
            .insert(Node::tree("x", RevTree::empty_id()))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            TreeError::AmbiguousPath { existing: NodeKind::Record, inserted: NodeKind::Tree, .. }
        ));

        // Against an existing entry, at every shape.
        let format = TreeFormat::with_threshold(2).unwrap();
        for n in [1, 40] {
            let base = build_from(&db, format, &names(n));
            let mut builder = RevTreeBuilder::from_tree(&db, base.clone()).with_format(format);
            builder.insert(Node::tree("f0", RevTree::empty_id())).unwrap();
            assert!(matches!(
                builder.build().unwrap_err(),
                TreeError::AmbiguousPath { .. }
            ));

            let mut builder = RevTreeBuilder::from_tree(&db, base).with_format(format);
            builder.remove("f0").unwrap();
            builder.insert(Node::tree("f0", RevTree::empty_id())).unwrap();
            let replaced = builder.build().unwrap();
            assert!(find_node(&db, &replaced, "f0").unwrap().unwrap().is_tree());
        }
    }

    #[test]
    fn invalid_names_are_rejected() {
        let db = InMemoryObjectDatabase::new();
        let mut builder = RevTreeBuilder::new(&db);
        assert!(matches!(
            builder.insert(record("")).err().unwrap(),
            TreeError::InvalidName(_)
        ));
        assert!(matches!(
            builder.remove("a/b").err().unwrap(),
            TreeError::InvalidName(_)
        ));
    }

    #[test]
    fn incremental_edit_reuses_untouched_buckets() {
        let db = CountingDb::default();
        let base = build_from(&db, TreeFormat::V1, &names(2000));
        assert!(base.is_bucketed());

        db.reads.store(0, Ordering::SeqCst);
        let mut builder = RevTreeBuilder::from_tree(&db, base.clone());
        builder.insert(record("extra")).unwrap();
        let edited = builder.build().unwrap();
        assert_eq!(db.reads.load(Ordering::SeqCst), 1);
        assert_eq!(edited.size(), 2001);

        let old = base.buckets().unwrap();
        let new = edited.buckets().unwrap();
        let changed: Vec<u8> = new
            .iter()
            .filter(|(i, b)| old.get(*i).map(Bucket::id) != Some(b.id()))
            .map(|(i, _)| *i)
            .collect();
        assert_eq!(changed.len(), 1);

        let mut all = names(2000);
        all.push("extra".into());
        let scratch = build_from(&db, TreeFormat::V1, &all);
        assert_eq!(scratch.id(), edited.id());
    }

    #[test]
    fn shrinking_collapses_back_to_a_leaf() {
        let db = InMemoryObjectDatabase::new();
        let format = TreeFormat::with_threshold(4).unwrap();
        let base = build_from(&db, format, &names(10));
        assert!(base.is_bucketed());

        let mut builder = RevTreeBuilder::from_tree(&db, base).with_format(format);
        for name in &names(10)[3..] {
            builder.remove(name).unwrap();
        }
        let shrunk = builder.build().unwrap();
        assert!(shrunk.is_leaf());
        assert_eq!(shrunk.id(), build_from(&db, format, &names(3)).id());

        let mut builder = RevTreeBuilder::from_tree(&db, shrunk).with_format(format);
        for name in names(3) {
            builder.remove(&name).unwrap();
        }
        assert_eq!(builder.build().unwrap().id(), RevTree::empty_id());
    }

    #[test]
    fn bucket_bounds_cover_entries() {
        let db = InMemoryObjectDatabase::new();
        let format = TreeFormat::with_threshold(2).unwrap();
        let mut builder = RevTreeBuilder::new(&db).with_format(format);
        for i in 0..20 {
            let x = i as f64;
            builder
                .insert(record(&format!("p{i}")).with_bounds(Envelope::new(x, x, x + 1.0, x + 1.0).unwrap()))
                .unwrap();
        }
        let tree = builder.build().unwrap();
        assert_eq!(tree.bounds(), Some(Envelope::new(0.0, 0.0, 20.0, 20.0).unwrap()));

        let mut builder = RevTreeBuilder::from_tree(&db, tree).with_format(format);
        builder.insert(record("unbounded")).unwrap();
        let tree = builder.build().unwrap();
        assert_eq!(tree.bounds(), None);
    }

    #[test]
    fn subtrees_count_toward_the_threshold() {
        let db = InMemoryObjectDatabase::new();
        let format = TreeFormat::with_threshold(3).unwrap();
        let mut builder = RevTreeBuilder::new(&db).with_format(format);
        builder.insert(record("a")).unwrap();
        builder.insert(record("b")).unwrap();
        builder.insert(Node::tree("t1", RevTree::empty_id())).unwrap();
        builder.insert(Node::tree("t2", RevTree::empty_id())).unwrap();
        let tree = builder.build().unwrap();
        assert!(tree.is_bucketed());
        assert_eq!(tree.size(), 2);
        assert_eq!(tree.num_trees(), 2);
    }

    proptest! {
        #[test]
        fn build_is_independent_of_insertion_order(
            (ordered, shuffled) in prop::collection::btree_set("[a-z0-9]{1,8}", 0..60)
                .prop_flat_map(|set| {
                    let v: Vec<String> = set.into_iter().collect();
                    (Just(v.clone()), Just(v).prop_shuffle())
                }),
            threshold in 1usize..8,
        ) {
            let db = InMemoryObjectDatabase::new();
            let format = TreeFormat::with_threshold(threshold).unwrap();
            let a = build_from(&db, format, &ordered);
            let b = build_from(&db, format, &shuffled);
            prop_assert_eq!(a.id(), b.id());
            prop_assert_eq!(a.size() as usize, ordered.len());
        }

        #[test]
        fn incremental_build_matches_scratch_build(
            names in prop::collection::btree_set("[a-z]{1,6}", 1..60),
            split in 0usize..60,
            threshold in 1usize..6,
        ) {
            let db = InMemoryObjectDatabase::new();
            let format = TreeFormat::with_threshold(threshold).unwrap();
            let names: Vec<String> = names.into_iter().collect();
            let split = split.min(names.len());

            let base = build_from(&db, format, &names[..split]);
            let mut builder = RevTreeBuilder::from_tree(&db, base).with_format(format);
            for name in &names[split..] {
                builder.insert(record(name)).unwrap();
            }
            let incremental = builder.build().unwrap();
            let scratch = build_from(&db, format, &names);
            prop_assert_eq!(incremental.id(), scratch.id());
        }
    }
}
