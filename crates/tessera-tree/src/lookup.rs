//! Read-side tree operations: name and path lookup, listing, deep counts.

use std::borrow::Cow;

use tessera_crypto::ContentHasher;
use tessera_store::{
    append_child, bucket_of, storage_cmp, Node, NodeRef, NodeStorageOrder, ObjectDatabase,
    RevTree, TreeBody,
};
use tessera_types::ObjectId;

use crate::error::{TreeError, TreeResult};

/// Which entries [`ls_tree`] reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LsTreeMode {
    Records,
    Trees,
    All,
}

/// Find the immediate entry `name` of `tree`, following buckets by name
/// digest. Reads one tree per bucket level.
pub fn find_node(db: &dyn ObjectDatabase, tree: &RevTree, name: &str) -> TreeResult<Option<Node>> {
    let digest = ContentHasher::name_digest(name);
    let mut current = Cow::Borrowed(tree);
    let mut depth = 0;
    loop {
        let next = match current.body() {
            TreeBody::Leaf { features, trees } => {
                let found = [features, trees].into_iter().find_map(|nodes| {
                    nodes
                        .binary_search_by(|n| storage_cmp(n.name(), name))
                        .ok()
                        .map(|i| nodes[i].clone())
                });
                return Ok(found);
            }
            TreeBody::Buckets(buckets) => {
                let bucket = bucket_of(&digest, depth).and_then(|index| buckets.get(&index));
                match bucket {
                    Some(bucket) => bucket.id(),
                    None => return Ok(None),
                }
            }
        };
        current = Cow::Owned(db.get_tree(&next)?);
        depth += 1;
    }
}

/// Resolve a slash-delimited path below `root`. The returned reference
/// carries the metadata id inherited from the nearest enclosing tree node.
pub fn find_path(db: &dyn ObjectDatabase, root: &RevTree, path: &str) -> TreeResult<Option<NodeRef>> {
    let segments = split_path(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Err(TreeError::InvalidPath(path.to_string()));
    };

    let mut tree = Cow::Borrowed(root);
    let mut parent = String::new();
    let mut metadata = None;
    for segment in parents {
        let Some(node) = find_node(db, &tree, segment)? else {
            return Ok(None);
        };
        if !node.is_tree() {
            return Ok(None);
        }
        metadata = node.metadata_id().or(metadata);
        parent = append_child(&parent, segment);
        tree = Cow::Owned(db.get_tree(&node.object_id())?);
    }
    Ok(find_node(db, &tree, last)?.map(|node| NodeRef::new(node, parent, metadata)))
}

/// Split a path into its segments. The empty string is the root and has no
/// segments; empty segments are rejected.
pub fn split_path(path: &str) -> TreeResult<Vec<&str>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(TreeError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Every immediate entry of `tree` in storage order, expanding buckets.
pub fn all_entries(db: &dyn ObjectDatabase, tree: &RevTree) -> TreeResult<Vec<Node>> {
    let mut out = Vec::with_capacity(tree.entry_count() as usize);
    collect_entries(db, tree, &mut out)?;
    // Buckets keep only the high bits of each digest byte, so concatenating
    // them is not storage order by itself.
    NodeStorageOrder::new().sort_nodes(&mut out);
    Ok(out)
}

fn collect_entries(db: &dyn ObjectDatabase, tree: &RevTree, out: &mut Vec<Node>) -> TreeResult<()> {
    match tree.body() {
        TreeBody::Leaf { .. } => out.extend(tree.children().cloned()),
        TreeBody::Buckets(buckets) => {
            for bucket in buckets.values() {
                let child = db.get_tree(&bucket.id())?;
                collect_entries(db, &child, out)?;
            }
        }
    }
    Ok(())
}

/// List a tree depth-first.
///
/// With `recursive` set, nested trees are descended into right after their
/// own node; their entries inherit the nearest tree node's metadata id.
pub fn ls_tree(
    db: &dyn ObjectDatabase,
    tree_id: &ObjectId,
    mode: LsTreeMode,
    recursive: bool,
) -> TreeResult<Vec<NodeRef>> {
    let tree = db.get_tree(tree_id)?;
    let mut out = Vec::new();
    list_into(db, &tree, "", None, mode, recursive, &mut out)?;
    Ok(out)
}

fn list_into(
    db: &dyn ObjectDatabase,
    tree: &RevTree,
    parent: &str,
    metadata: Option<ObjectId>,
    mode: LsTreeMode,
    recursive: bool,
    out: &mut Vec<NodeRef>,
) -> TreeResult<()> {
    for node in all_entries(db, tree)? {
        if node.is_tree() {
            let child_metadata = node.metadata_id().or(metadata);
            let child_id = node.object_id();
            let child_path = append_child(parent, node.name());
            if mode != LsTreeMode::Records {
                out.push(NodeRef::new(node, parent, metadata));
            }
            if recursive {
                let child = db.get_tree(&child_id)?;
                list_into(db, &child, &child_path, child_metadata, mode, recursive, out)?;
            }
        } else if mode != LsTreeMode::Trees {
            out.push(NodeRef::new(node, parent, metadata));
        }
    }
    Ok(())
}

/// Number of records reachable from `tree`, through nested trees.
pub fn deep_size(db: &dyn ObjectDatabase, tree: &RevTree) -> TreeResult<u64> {
    let mut total = tree.size();
    if tree.num_trees() == 0 {
        return Ok(total);
    }
    for node in all_entries(db, tree)?.iter().filter(|n| n.is_tree()) {
        let child = db.get_tree(&node.object_id())?;
        total += deep_size(db, &child)?;
    }
    Ok(total)
}
