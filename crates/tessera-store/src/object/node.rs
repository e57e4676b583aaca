use serde::{Deserialize, Serialize};
use tessera_types::{Envelope, ObjectId};

/// What a [`Node`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A nested [`RevTree`](super::RevTree).
    Tree,
    /// A leaf record ([`RevFeature`](super::RevFeature)).
    Record,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree => write!(f, "tree"),
            Self::Record => write!(f, "record"),
        }
    }
}

/// A named pointer to a stored object, as listed inside a tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    name: String,
    object_id: ObjectId,
    metadata_id: Option<ObjectId>,
    kind: NodeKind,
    bounds: Option<Envelope>,
}

impl Node {
    pub fn new(name: impl Into<String>, object_id: ObjectId, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            object_id,
            metadata_id: None,
            kind,
            bounds: None,
        }
    }

    /// A node pointing at a record.
    pub fn record(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(name, object_id, NodeKind::Record)
    }

    /// A node pointing at a subtree.
    pub fn tree(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(name, object_id, NodeKind::Tree)
    }

    /// Set the schema descriptor governing the target.
    pub fn with_metadata(mut self, metadata_id: ObjectId) -> Self {
        self.metadata_id = Some(metadata_id);
        self
    }

    pub fn with_bounds(mut self, bounds: Envelope) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_optional_bounds(mut self, bounds: Option<Envelope>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn metadata_id(&self) -> Option<ObjectId> {
        self.metadata_id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn bounds(&self) -> Option<&Envelope> {
        self.bounds.as_ref()
    }

    pub fn is_tree(&self) -> bool {
        self.kind == NodeKind::Tree
    }

    /// Returns `true` if this node's bounds intersect `envelope`. A node
    /// without bounds carries no spatial information and always intersects.
    pub fn intersects(&self, envelope: &Envelope) -> bool {
        self.bounds.map_or(true, |b| b.intersects(envelope))
    }
}

/// One shard of a bucketed tree: the id of the child tree and the union of
/// the bounds of everything below it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    id: ObjectId,
    bounds: Option<Envelope>,
}

impl Bucket {
    pub fn new(id: ObjectId, bounds: Option<Envelope>) -> Self {
        Self { id, bounds }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn bounds(&self) -> Option<&Envelope> {
        self.bounds.as_ref()
    }

    /// Same semantics as [`Node::intersects`].
    pub fn intersects(&self, envelope: &Envelope) -> bool {
        self.bounds.map_or(true, |b| b.intersects(envelope))
    }
}

/// A [`Node`] located inside a tree hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeRef {
    node: Node,
    parent_path: String,
    metadata_id: Option<ObjectId>,
}

impl NodeRef {
    /// Create a reference. `metadata_id` is the default schema inherited
    /// from the enclosing tree; the node's own metadata id wins over it.
    pub fn new(node: Node, parent_path: impl Into<String>, metadata_id: Option<ObjectId>) -> Self {
        let metadata_id = node.metadata_id().or(metadata_id);
        Self {
            node,
            parent_path: parent_path.into(),
            metadata_id,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn parent_path(&self) -> &str {
        &self.parent_path
    }

    pub fn object_id(&self) -> ObjectId {
        self.node.object_id()
    }

    /// The effective schema id of the target.
    pub fn metadata_id(&self) -> Option<ObjectId> {
        self.metadata_id
    }

    /// Full slash-delimited path.
    pub fn path(&self) -> String {
        append_child(&self.parent_path, self.node.name())
    }
}

/// Join a parent path and a child name. The root path is the empty string.
pub fn append_child(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        parent.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

/// The parent of a slash-delimited path; the parent of a top-level name is
/// the root path `""`.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(a: f64, b: f64, c: f64, d: f64) -> Envelope {
        Envelope::new(a, b, c, d).unwrap()
    }

    #[test]
    fn node_builders() {
        let md = ObjectId::from_bytes(b"schema");
        let node = Node::record("p1", ObjectId::from_bytes(b"p1"))
            .with_metadata(md)
            .with_bounds(env(0.0, 0.0, 1.0, 1.0));
        assert_eq!(node.name(), "p1");
        assert_eq!(node.kind(), NodeKind::Record);
        assert_eq!(node.metadata_id(), Some(md));
        assert!(!node.is_tree());
        assert!(Node::tree("roads", ObjectId::null()).is_tree());
    }

    #[test]
    fn nodes_without_bounds_always_intersect() {
        let q = env(100.0, 100.0, 101.0, 101.0);
        let bare = Node::record("a", ObjectId::null());
        assert!(bare.intersects(&q));
        let far = bare.clone().with_bounds(env(0.0, 0.0, 1.0, 1.0));
        assert!(!far.intersects(&q));
        assert!(Bucket::new(ObjectId::null(), None).intersects(&q));
    }

    #[test]
    fn node_ref_paths_and_metadata() {
        let inherited = ObjectId::from_bytes(b"layer schema");
        let own = ObjectId::from_bytes(b"own schema");

        let r = NodeRef::new(Node::record("1", ObjectId::null()), "roads", Some(inherited));
        assert_eq!(r.path(), "roads/1");
        assert_eq!(r.metadata_id(), Some(inherited));

        let r = NodeRef::new(
            Node::record("1", ObjectId::null()).with_metadata(own),
            "",
            Some(inherited),
        );
        assert_eq!(r.path(), "1");
        assert_eq!(r.metadata_id(), Some(own));
    }

    #[test]
    fn path_helpers() {
        assert_eq!(append_child("", "a"), "a");
        assert_eq!(append_child("a", "b"), "a/b");
        assert_eq!(append_child("a", ""), "a");
        assert_eq!(parent_path("a/b/c"), "a/b");
        assert_eq!(parent_path("a"), "");
    }
}
