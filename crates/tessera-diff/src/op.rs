//! The diff operation: configure once, then collect, count or stream.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tessera_store::{ObjectDatabase, RevTree};
use tessera_types::{Crs, Envelope, ObjectId};
use tracing::debug;

use crate::bounds_filter::{BoundsFilteringDiffConsumer, DatabaseResolver, FeatureTypeResolver};
use crate::consumer::DiffConsumer;
use crate::counting::{DiffBoundsConsumer, DiffCountConsumer, DiffObjectCount};
use crate::entry::{DiffEntry, DiffEntryConsumer};
use crate::error::{DiffError, DiffResult};
use crate::path_filter::PathFilteringDiffConsumer;
use crate::walk::{CancelToken, DiffTreeWalk};

/// Entries buffered between a streaming worker and its reader.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A diff between two root trees.
///
/// Both sides default to the empty tree. Filters compose as decorators
/// around the terminal consumer: bounds first, then paths outermost.
#[derive(Clone)]
pub struct DiffTree {
    db: Arc<dyn ObjectDatabase>,
    old_tree: ObjectId,
    new_tree: ObjectId,
    path_filters: Vec<String>,
    bounds: Option<(Envelope, Option<Crs>)>,
    resolver: Option<Arc<dyn FeatureTypeResolver>>,
    report_trees: bool,
    cancel: CancelToken,
    channel_capacity: usize,
}

impl DiffTree {
    pub fn new(db: Arc<dyn ObjectDatabase>) -> Self {
        Self {
            db,
            old_tree: RevTree::empty_id(),
            new_tree: RevTree::empty_id(),
            path_filters: Vec::new(),
            bounds: None,
            resolver: None,
            report_trees: false,
            cancel: CancelToken::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn old_tree(mut self, id: ObjectId) -> Self {
        self.old_tree = id;
        self
    }

    pub fn new_tree(mut self, id: ObjectId) -> Self {
        self.new_tree = id;
        self
    }

    /// Only report changes at or below these paths.
    pub fn path_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Only report changes whose bounds may intersect `envelope`, given in
    /// `crs` (or in each schema's own frame when `None`).
    pub fn bounds_filter(mut self, envelope: Envelope, crs: Option<Crs>) -> Self {
        self.bounds = Some((envelope, crs));
        self
    }

    /// Schema lookup for the bounds filter. Defaults to reading feature
    /// types from the database.
    pub fn resolver(mut self, resolver: Arc<dyn FeatureTypeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Also report changed trees, not only features.
    pub fn report_trees(mut self, report_trees: bool) -> Self {
        self.report_trees = report_trees;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Drive `consumer` through the configured filters.
    pub fn run(&self, consumer: &mut dyn DiffConsumer) -> DiffResult<()> {
        debug!(
            old = %self.old_tree.short_hex(),
            new = %self.new_tree.short_hex(),
            path_filters = self.path_filters.len(),
            bounded = self.bounds.is_some(),
            "starting diff"
        );
        let walk = DiffTreeWalk::open(self.db.as_ref(), &self.old_tree, &self.new_tree)?
            .with_cancel_token(self.cancel.clone());

        let mut chain: Box<dyn DiffConsumer + '_> = Box::new(consumer);
        if let Some((envelope, crs)) = &self.bounds {
            let resolver: Arc<dyn FeatureTypeResolver> = match &self.resolver {
                Some(resolver) => Arc::clone(resolver),
                None => Arc::new(DatabaseResolver(Arc::clone(&self.db))),
            };
            chain = Box::new(BoundsFilteringDiffConsumer::new(
                chain,
                *envelope,
                crs.clone(),
                resolver,
            ));
        }
        if !self.path_filters.is_empty() {
            chain = Box::new(PathFilteringDiffConsumer::new(chain, &self.path_filters)?);
        }
        walk.walk(&mut chain)
    }

    /// Collect every change.
    pub fn call(&self) -> DiffResult<Vec<DiffEntry>> {
        let mut entries = Vec::new();
        {
            let mut consumer = DiffEntryConsumer::new(|entry| {
                entries.push(entry);
                Ok(())
            })
            .report_trees(self.report_trees);
            self.run(&mut consumer)?;
        }
        debug!(entries = entries.len(), "diff finished");
        Ok(entries)
    }

    /// Count changes without materializing entries.
    pub fn count(&self) -> DiffResult<DiffObjectCount> {
        let mut consumer = DiffCountConsumer::new();
        self.run(&mut consumer)?;
        let count = consumer.count();
        debug!(
            features = count.features_count(),
            trees = count.trees_count(),
            "diff count finished"
        );
        Ok(count)
    }

    /// Extent of the changed features on each side.
    pub fn bounds(&self) -> DiffResult<DiffBoundsConsumer> {
        let mut consumer = DiffBoundsConsumer::new();
        self.run(&mut consumer)?;
        Ok(consumer)
    }

    /// Produce entries lazily from a worker thread.
    ///
    /// The worker stops once the stream is dropped. Errors of the walk are
    /// yielded after the last entry.
    pub fn stream(&self) -> DiffResult<DiffEntryStream> {
        let (tx, rx) = mpsc::sync_channel(self.channel_capacity);
        let cancel = self.cancel.child();
        let op = self.clone().cancel_token(cancel.clone());
        let handle = thread::Builder::new()
            .name("tessera-diff".into())
            .spawn(move || {
                let mut consumer = DiffEntryConsumer::new(|entry| {
                    tx.send(entry).map_err(|_| DiffError::Cancelled)
                })
                .report_trees(op.report_trees);
                op.run(&mut consumer)
            })
            .map_err(|e| DiffError::Worker(e.to_string()))?;
        Ok(DiffEntryStream {
            rx,
            handle: Some(handle),
            cancel,
        })
    }
}

/// Iterator over the entries of a streaming diff.
pub struct DiffEntryStream {
    rx: Receiver<DiffEntry>,
    handle: Option<JoinHandle<DiffResult<()>>>,
    cancel: CancelToken,
}

impl Iterator for DiffEntryStream {
    type Item = DiffResult<DiffEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Ok(entry) = self.rx.recv() {
            return Some(Ok(entry));
        }
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(Err(e)),
            Err(_) => Some(Err(DiffError::Worker("diff worker panicked".into()))),
        }
    }
}

impl Drop for DiffEntryStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
