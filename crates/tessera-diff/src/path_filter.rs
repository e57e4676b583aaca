use tessera_store::{Bucket, Node};

use crate::consumer::DiffConsumer;
use crate::error::{DiffError, DiffResult};
use crate::tracker::DiffPathTracker;

/// Restricts a diff to a set of paths.
///
/// Trees are descended into only while they can still contain, or are
/// contained by, a filter path. Features are forwarded when their path equals
/// a filter path or lies below one. An empty filter set lets everything
/// through.
pub struct PathFilteringDiffConsumer<C> {
    delegate: C,
    filters: Vec<String>,
    tracker: DiffPathTracker,
    open_trees: Vec<bool>,
}

impl<C: DiffConsumer> PathFilteringDiffConsumer<C> {
    /// Leading and trailing slashes of each filter are ignored.
    pub fn new<I, S>(delegate: C, filters: I) -> DiffResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for filter in filters {
            normalized.push(normalize_filter(filter.as_ref())?);
        }
        normalized.sort();
        normalized.dedup();
        Ok(Self {
            delegate,
            filters: normalized,
            tracker: DiffPathTracker::new(),
            open_trees: Vec::new(),
        })
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn into_inner(self) -> C {
        self.delegate
    }

    fn tree_applies(&self, path: &str) -> bool {
        path.is_empty()
            || self.filters.is_empty()
            || self
                .filters
                .iter()
                .any(|f| f == path || is_below(f, path) || is_below(path, f))
    }

    fn feature_applies(&self, path: &str) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f == path || is_below(path, f))
    }
}

/// Whether `path` lies strictly below `ancestor`.
fn is_below(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

fn normalize_filter(filter: &str) -> DiffResult<String> {
    let trimmed = filter.trim_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(str::is_empty) {
        return Err(DiffError::InvalidPathFilter(filter.to_string()));
    }
    Ok(trimmed.to_string())
}

impl<C: DiffConsumer> DiffConsumer for PathFilteringDiffConsumer<C> {
    fn tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<bool> {
        let path = self.tracker.tree(left, right)?.to_string();
        let applies = self.tree_applies(&path);
        self.open_trees.push(applies);
        if !applies {
            return Ok(false);
        }
        self.delegate.tree(left, right)
    }

    fn end_tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        self.tracker.end_tree(left, right)?;
        let forwarded = self.open_trees.pop().ok_or_else(|| {
            DiffError::UnbalancedTraversal("end_tree without a matching tree".into())
        })?;
        if forwarded {
            self.delegate.end_tree(left, right)?;
        }
        Ok(())
    }

    fn bucket(
        &mut self,
        index: u8,
        depth: usize,
        left: Option<&Bucket>,
        right: Option<&Bucket>,
    ) -> DiffResult<bool> {
        self.delegate.bucket(index, depth, left, right)
    }

    fn end_bucket(
        &mut self,
        index: u8,
        depth: usize,
        left: Option<&Bucket>,
        right: Option<&Bucket>,
    ) -> DiffResult<()> {
        self.delegate.end_bucket(index, depth, left, right)
    }

    fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        let Some(node) = left.or(right) else {
            return Ok(());
        };
        let path = self.tracker.child_path(node);
        if self.feature_applies(&path) {
            self.delegate.feature(left, right)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::ObjectId;

    #[derive(Default)]
    struct Collect {
        trees: Vec<String>,
        features: Vec<String>,
        depth: i32,
    }

    impl DiffConsumer for Collect {
        fn tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<bool> {
            self.depth += 1;
            self.trees.push(left.or(right).unwrap().name().to_string());
            Ok(true)
        }

        fn end_tree(&mut self, _: Option<&Node>, _: Option<&Node>) -> DiffResult<()> {
            self.depth -= 1;
            Ok(())
        }

        fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
            self.features.push(left.or(right).unwrap().name().to_string());
            Ok(())
        }
    }

    fn tree(name: &str) -> Node {
        Node::tree(name, ObjectId::from_bytes(name.as_bytes()))
    }

    fn record(name: &str) -> Node {
        Node::record(name, ObjectId::from_bytes(name.as_bytes()))
    }

    #[test]
    fn filters_are_normalized_and_validated() {
        let f = PathFilteringDiffConsumer::new(Collect::default(), ["/roads/", "roads", "rivers"]).unwrap();
        assert_eq!(f.filters(), ["rivers", "roads"]);
        assert!(PathFilteringDiffConsumer::new(Collect::default(), ["/"]).is_err());
        assert!(PathFilteringDiffConsumer::new(Collect::default(), ["a//b"]).is_err());
    }

    #[test]
    fn tree_descent_follows_prefixes() {
        let f = PathFilteringDiffConsumer::new(Collect::default(), ["roads/primary"]).unwrap();
        assert!(f.tree_applies(""));
        assert!(f.tree_applies("roads"));
        assert!(f.tree_applies("roads/primary"));
        assert!(f.tree_applies("roads/primary/north"));
        assert!(!f.tree_applies("roads/prim"));
        assert!(!f.tree_applies("rivers"));

        assert!(f.feature_applies("roads/primary"));
        assert!(f.feature_applies("roads/primary/7"));
        assert!(!f.feature_applies("roads/7"));
        assert!(!f.feature_applies("roads/primary7"));
    }

    #[test]
    fn pruned_trees_are_not_closed_on_the_delegate() {
        let mut f = PathFilteringDiffConsumer::new(Collect::default(), ["roads"]).unwrap();
        let root = tree("");
        let rivers = tree("rivers");
        let roads = tree("roads");

        assert!(f.tree(Some(&root), Some(&root)).unwrap());
        assert!(!f.tree(Some(&rivers), None).unwrap());
        f.end_tree(Some(&rivers), None).unwrap();
        f.feature(Some(&record("readme")), None).unwrap();
        assert!(f.tree(None, Some(&roads)).unwrap());
        f.feature(None, Some(&record("1"))).unwrap();
        f.end_tree(None, Some(&roads)).unwrap();
        f.end_tree(Some(&root), Some(&root)).unwrap();

        let inner = f.into_inner();
        assert_eq!(inner.trees, vec!["", "roads"]);
        assert_eq!(inner.features, vec!["1"]);
        assert_eq!(inner.depth, 0);
    }
}
