use std::collections::BTreeMap;

use tessera_store::{Node, NodeKind, ObjectDatabase, RevTree};
use tessera_types::ObjectId;
use tracing::debug;

use crate::builder::RevTreeBuilder;
use crate::error::{TreeError, TreeResult};
use crate::format::TreeFormat;
use crate::lookup::{find_node, split_path};

/// Edits staged for one tree level.
#[derive(Debug, Default)]
struct DirEdit {
    puts: BTreeMap<String, Node>,
    removes: Vec<String>,
    children: BTreeMap<String, DirEdit>,
    metadata: Option<ObjectId>,
}

/// Path-based editing of a tree hierarchy with write-back.
///
/// Edits address entries by slash-delimited path. Missing intermediate
/// trees are created on [`write`](Self::write). Every tree on a touched path
/// is rebuilt bottom-up; its node in the parent receives the new id and the
/// union bounds of its contents.
pub struct TreeEditor<'a> {
    db: &'a dyn ObjectDatabase,
    format: TreeFormat,
    root: RevTree,
    edits: DirEdit,
    default_metadata: Option<ObjectId>,
}

impl<'a> TreeEditor<'a> {
    pub fn new(db: &'a dyn ObjectDatabase, root: RevTree) -> Self {
        Self {
            db,
            format: TreeFormat::V1,
            root,
            edits: DirEdit::default(),
            default_metadata: None,
        }
    }

    /// Editor over the tree stored under `root_id`.
    pub fn open(db: &'a dyn ObjectDatabase, root_id: &ObjectId) -> TreeResult<Self> {
        Ok(Self::new(db, db.get_tree(root_id)?))
    }

    pub fn with_format(mut self, format: TreeFormat) -> Self {
        self.format = format;
        self
    }

    /// Metadata id given to intermediate trees this editor creates.
    pub fn with_default_metadata(mut self, metadata_id: ObjectId) -> Self {
        self.default_metadata = Some(metadata_id);
        self
    }

    /// Place `node` inside the tree at `parent_path` (`""` for the root).
    pub fn put(&mut self, parent_path: &str, node: Node) -> TreeResult<&mut Self> {
        let dir = self.dir_mut(parent_path)?;
        dir.puts.insert(node.name().to_string(), node);
        Ok(self)
    }

    /// Remove the entry at `path`, together with any edits staged below it.
    pub fn remove(&mut self, path: &str) -> TreeResult<&mut Self> {
        let segments = split_path(path)?;
        let Some((name, parents)) = segments.split_last() else {
            return Err(TreeError::InvalidPath(path.to_string()));
        };
        let dir = self.dir_mut_segments(parents)?;
        dir.children.remove(*name);
        dir.puts.remove(*name);
        dir.removes.push(name.to_string());
        Ok(self)
    }

    /// Set the metadata id of the tree at `path`, creating it if missing.
    pub fn set_tree_metadata(&mut self, path: &str, metadata_id: ObjectId) -> TreeResult<&mut Self> {
        if path.is_empty() {
            return Err(TreeError::InvalidPath(path.to_string()));
        }
        self.dir_mut(path)?.metadata = Some(metadata_id);
        Ok(self)
    }

    /// Rebuild every touched tree and return the new root.
    pub fn write(self) -> TreeResult<RevTree> {
        let Self {
            db,
            format,
            root,
            edits,
            default_metadata,
        } = self;
        let writer = Writer {
            db,
            format,
            default_metadata,
        };
        let new_root = writer.write_dir(root, edits)?;
        debug!(root = %new_root.id().short_hex(), "wrote edited tree");
        Ok(new_root)
    }

    fn dir_mut(&mut self, path: &str) -> TreeResult<&mut DirEdit> {
        let segments = split_path(path)?;
        self.dir_mut_segments(&segments)
    }

    fn dir_mut_segments(&mut self, segments: &[&str]) -> TreeResult<&mut DirEdit> {
        let mut dir = &mut self.edits;
        for segment in segments {
            dir = dir.children.entry(segment.to_string()).or_default();
        }
        Ok(dir)
    }
}

struct Writer<'a> {
    db: &'a dyn ObjectDatabase,
    format: TreeFormat,
    default_metadata: Option<ObjectId>,
}

impl Writer<'_> {
    fn write_dir(&self, tree: RevTree, edits: DirEdit) -> TreeResult<RevTree> {
        let mut subtree_nodes = Vec::with_capacity(edits.children.len());
        for (name, child_edits) in edits.children {
            // A tree removed and then written to again starts out empty.
            let existing = if edits.removes.contains(&name) {
                None
            } else {
                find_node(self.db, &tree, &name)?
            };
            if let Some(node) = existing.as_ref().filter(|n| !n.is_tree()) {
                return Err(TreeError::AmbiguousPath {
                    name,
                    existing: node.kind(),
                    inserted: NodeKind::Tree,
                });
            }
            let child = match &existing {
                Some(node) => self.db.get_tree(&node.object_id())?,
                None => RevTree::empty(),
            };
            let metadata = child_edits
                .metadata
                .or_else(|| existing.as_ref().and_then(Node::metadata_id))
                .or(self.default_metadata);
            let rebuilt = self.write_dir(child, child_edits)?;
            let mut node = Node::tree(name, rebuilt.id()).with_optional_bounds(rebuilt.bounds());
            if let Some(metadata) = metadata {
                node = node.with_metadata(metadata);
            }
            subtree_nodes.push(node);
        }

        let mut builder = RevTreeBuilder::from_tree(self.db, tree).with_format(self.format);
        for name in &edits.removes {
            builder.remove(name)?;
        }
        for node in subtree_nodes {
            builder.insert(node)?;
        }
        for node in edits.puts.into_values() {
            builder.insert(node)?;
        }
        builder.build()
    }
}
