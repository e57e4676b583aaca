use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_store::{Node, NodeRef};
use tessera_types::ObjectId;

use crate::consumer::DiffConsumer;
use crate::error::DiffResult;
use crate::tracker::DiffPathTracker;

/// Kind of change a [`DiffEntry`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Removed => write!(f, "REMOVED"),
            Self::Modified => write!(f, "MODIFIED"),
        }
    }
}

/// One changed entry: its old version, new version, or both.
#[derive(Clone, Debug, PartialEq)]
pub struct DiffEntry {
    sides: Sides,
}

#[derive(Clone, Debug, PartialEq)]
enum Sides {
    Added(NodeRef),
    Removed(NodeRef),
    Modified(NodeRef, NodeRef),
}

impl DiffEntry {
    pub fn added(new: NodeRef) -> Self {
        Self {
            sides: Sides::Added(new),
        }
    }

    pub fn removed(old: NodeRef) -> Self {
        Self {
            sides: Sides::Removed(old),
        }
    }

    pub fn modified(old: NodeRef, new: NodeRef) -> Self {
        Self {
            sides: Sides::Modified(old, new),
        }
    }

    fn from_pair(old: Option<NodeRef>, new: Option<NodeRef>) -> Option<Self> {
        match (old, new) {
            (None, None) => None,
            (None, Some(new)) => Some(Self::added(new)),
            (Some(old), None) => Some(Self::removed(old)),
            (Some(old), Some(new)) => Some(Self::modified(old, new)),
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match self.sides {
            Sides::Added(_) => ChangeType::Added,
            Sides::Removed(_) => ChangeType::Removed,
            Sides::Modified(..) => ChangeType::Modified,
        }
    }

    pub fn old_node(&self) -> Option<&NodeRef> {
        match &self.sides {
            Sides::Removed(old) | Sides::Modified(old, _) => Some(old),
            Sides::Added(_) => None,
        }
    }

    pub fn new_node(&self) -> Option<&NodeRef> {
        match &self.sides {
            Sides::Added(new) | Sides::Modified(_, new) => Some(new),
            Sides::Removed(_) => None,
        }
    }

    fn either(&self) -> &NodeRef {
        match &self.sides {
            Sides::Added(node) | Sides::Removed(node) | Sides::Modified(_, node) => node,
        }
    }

    /// Path of the entry; the new path if both sides exist.
    pub fn path(&self) -> String {
        self.either().path()
    }

    pub fn old_object_id(&self) -> Option<ObjectId> {
        self.old_node().map(NodeRef::object_id)
    }

    pub fn new_object_id(&self) -> Option<ObjectId> {
        self.new_node().map(NodeRef::object_id)
    }

    pub fn is_tree(&self) -> bool {
        self.either().node().is_tree()
    }

    /// The same change seen from the other direction.
    pub fn reversed(self) -> Self {
        let sides = match self.sides {
            Sides::Added(node) => Sides::Removed(node),
            Sides::Removed(node) => Sides::Added(node),
            Sides::Modified(old, new) => Sides::Modified(new, old),
        };
        Self { sides }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = |side: Option<ObjectId>| side.map_or("-".to_string(), |id| id.short_hex());
        write!(
            f,
            "{} {} {} -> {}",
            self.change_type(),
            self.path(),
            id(self.old_object_id()),
            id(self.new_object_id())
        )
    }
}

/// Turns traversal events into [`DiffEntry`] values handed to a sink.
///
/// Feature changes are always reported. Changed trees other than the root
/// are reported too when [`report_trees`](Self::report_trees) is set.
pub struct DiffEntryConsumer<F> {
    sink: F,
    tracker: DiffPathTracker,
    report_trees: bool,
}

impl<F> DiffEntryConsumer<F>
where
    F: FnMut(DiffEntry) -> DiffResult<()>,
{
    pub fn new(sink: F) -> Self {
        Self {
            sink,
            tracker: DiffPathTracker::new(),
            report_trees: false,
        }
    }

    pub fn report_trees(mut self, report_trees: bool) -> Self {
        self.report_trees = report_trees;
        self
    }

    fn entry(&self, left: Option<&Node>, right: Option<&Node>) -> Option<DiffEntry> {
        let parent = self.tracker.current_path().unwrap_or("");
        let old = left.map(|n| NodeRef::new(n.clone(), parent, self.tracker.left_metadata_id()));
        let new = right.map(|n| NodeRef::new(n.clone(), parent, self.tracker.right_metadata_id()));
        DiffEntry::from_pair(old, new)
    }
}

impl<F> DiffConsumer for DiffEntryConsumer<F>
where
    F: FnMut(DiffEntry) -> DiffResult<()>,
{
    fn tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<bool> {
        if self.report_trees && self.tracker.depth() > 0 {
            if let Some(entry) = self.entry(left, right) {
                (self.sink)(entry)?;
            }
        }
        self.tracker.tree(left, right)?;
        Ok(true)
    }

    fn end_tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        self.tracker.end_tree(left, right)?;
        Ok(())
    }

    fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        match self.entry(left, right) {
            Some(entry) => (self.sink)(entry),
            None => Ok(()),
        }
    }
}
