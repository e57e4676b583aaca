//! Aggregating consumers: change counts and changed-area envelopes.

use serde::{Deserialize, Serialize};
use tessera_store::Node;
use tessera_types::Envelope;

use crate::consumer::DiffConsumer;
use crate::entry::ChangeType;
use crate::error::DiffResult;

/// Number of changed features and trees in a diff.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffObjectCount {
    pub features_added: u64,
    pub features_removed: u64,
    pub features_modified: u64,
    pub trees_added: u64,
    pub trees_removed: u64,
    pub trees_modified: u64,
}

impl DiffObjectCount {
    pub fn features_count(&self) -> u64 {
        self.features_added + self.features_removed + self.features_modified
    }

    pub fn trees_count(&self) -> u64 {
        self.trees_added + self.trees_removed + self.trees_modified
    }

    pub fn count(&self) -> u64 {
        self.features_count() + self.trees_count()
    }
}

fn change_type(left: Option<&Node>, right: Option<&Node>) -> ChangeType {
    match (left, right) {
        (None, _) => ChangeType::Added,
        (_, None) => ChangeType::Removed,
        _ => ChangeType::Modified,
    }
}

/// Counts changes. The root tree pair is not counted.
#[derive(Debug, Default)]
pub struct DiffCountConsumer {
    count: DiffObjectCount,
    depth: usize,
}

impl DiffCountConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> DiffObjectCount {
        self.count
    }
}

impl DiffConsumer for DiffCountConsumer {
    fn tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<bool> {
        if self.depth > 0 {
            match change_type(left, right) {
                ChangeType::Added => self.count.trees_added += 1,
                ChangeType::Removed => self.count.trees_removed += 1,
                ChangeType::Modified => self.count.trees_modified += 1,
            }
        }
        self.depth += 1;
        Ok(true)
    }

    fn end_tree(&mut self, _left: Option<&Node>, _right: Option<&Node>) -> DiffResult<()> {
        self.depth = self.depth.saturating_sub(1);
        Ok(())
    }

    fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        match change_type(left, right) {
            ChangeType::Added => self.count.features_added += 1,
            ChangeType::Removed => self.count.features_removed += 1,
            ChangeType::Modified => self.count.features_modified += 1,
        }
        Ok(())
    }
}

/// Accumulates the extent of changed features on each side.
///
/// Features without bounds do not contribute.
#[derive(Debug, Default)]
pub struct DiffBoundsConsumer {
    left: Option<Envelope>,
    right: Option<Envelope>,
}

impl DiffBoundsConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extent of the old versions of changed features.
    pub fn left(&self) -> Option<Envelope> {
        self.left
    }

    /// Extent of the new versions of changed features.
    pub fn right(&self) -> Option<Envelope> {
        self.right
    }

    /// Extent of both sides.
    pub fn merged(&self) -> Option<Envelope> {
        match (self.left, self.right) {
            (Some(left), Some(right)) => Some(left.union(&right)),
            (left, right) => left.or(right),
        }
    }
}

fn expand(acc: &mut Option<Envelope>, node: Option<&Node>) {
    let Some(bounds) = node.and_then(Node::bounds) else {
        return;
    };
    match acc {
        Some(envelope) => envelope.expand_to_include(bounds),
        None => *acc = Some(*bounds),
    }
}

impl DiffConsumer for DiffBoundsConsumer {
    fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        expand(&mut self.left, left);
        expand(&mut self.right, right);
        Ok(())
    }
}
