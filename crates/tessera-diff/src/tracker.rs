use tessera_store::{append_child, parent_path, Node};
use tessera_types::ObjectId;

use crate::error::{DiffError, DiffResult};

/// Follows `tree`/`end_tree` brackets to know where the traversal is.
///
/// Keeps the stack of ancestor tree nodes on both sides, from which the
/// current path and the nearest enclosing metadata id are derived. The root
/// tree has the empty path; outside of any tree there is no current path.
#[derive(Debug, Default)]
pub struct DiffPathTracker {
    left: Vec<Option<Node>>,
    right: Vec<Option<Node>>,
    current_path: Option<String>,
}

impl DiffPathTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a tree pair and return its path.
    pub fn tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<&str> {
        let name = left
            .or(right)
            .map(Node::name)
            .ok_or_else(|| DiffError::UnbalancedTraversal("tree call without nodes".into()))?;
        let path = match &self.current_path {
            None => name.to_string(),
            Some(parent) => append_child(parent, name),
        };
        self.left.push(left.cloned());
        self.right.push(right.cloned());
        Ok(self.current_path.insert(path).as_str())
    }

    /// Leave a tree pair and return the parent path, or `None` once back
    /// outside the root.
    pub fn end_tree(
        &mut self,
        left: Option<&Node>,
        right: Option<&Node>,
    ) -> DiffResult<Option<&str>> {
        let (Some(popped_left), Some(popped_right)) = (self.left.pop(), self.right.pop()) else {
            return Err(DiffError::UnbalancedTraversal(
                "end_tree without a matching tree".into(),
            ));
        };
        if popped_left.as_ref() != left || popped_right.as_ref() != right {
            return Err(DiffError::UnbalancedTraversal(format!(
                "end_tree for {:?} does not match open tree {:?}",
                left.or(right).map(Node::name),
                popped_left.as_ref().or(popped_right.as_ref()).map(Node::name),
            )));
        }
        self.current_path = if self.left.is_empty() {
            None
        } else {
            self.current_path.as_deref().map(|p| parent_path(p).to_string())
        };
        Ok(self.current_path.as_deref())
    }

    /// Path of the innermost open tree.
    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    /// Number of open trees.
    pub fn depth(&self) -> usize {
        self.left.len()
    }

    /// Full path of an entry of the innermost open tree.
    pub fn child_path(&self, node: &Node) -> String {
        append_child(self.current_path.as_deref().unwrap_or(""), node.name())
    }

    /// Nearest metadata id on the old side.
    pub fn left_metadata_id(&self) -> Option<ObjectId> {
        nearest_metadata(&self.left)
    }

    /// Nearest metadata id on the new side.
    pub fn right_metadata_id(&self) -> Option<ObjectId> {
        nearest_metadata(&self.right)
    }
}

fn nearest_metadata(stack: &[Option<Node>]) -> Option<ObjectId> {
    stack
        .iter()
        .rev()
        .flatten()
        .find_map(|node| node.metadata_id())
}
