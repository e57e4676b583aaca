//! Spatial pruning of a diff against a query envelope.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use tessera_store::{Bucket, Node, ObjectDatabase, RevFeatureType, StoreError};
use tessera_types::{Crs, Envelope, ObjectId};
use tracing::warn;

use crate::consumer::DiffConsumer;
use crate::error::{DiffError, DiffResult};
use crate::tracker::DiffPathTracker;

/// Looks up the schema a metadata id refers to.
pub trait FeatureTypeResolver: Send + Sync {
    /// `Ok(None)` when no schema is stored under `metadata_id`.
    fn resolve(&self, metadata_id: &ObjectId) -> DiffResult<Option<RevFeatureType>>;
}

impl<R: FeatureTypeResolver + ?Sized> FeatureTypeResolver for &R {
    fn resolve(&self, metadata_id: &ObjectId) -> DiffResult<Option<RevFeatureType>> {
        (**self).resolve(metadata_id)
    }
}

impl<R: FeatureTypeResolver + ?Sized> FeatureTypeResolver for Arc<R> {
    fn resolve(&self, metadata_id: &ObjectId) -> DiffResult<Option<RevFeatureType>> {
        (**self).resolve(metadata_id)
    }
}

impl<R: FeatureTypeResolver + ?Sized> FeatureTypeResolver for Box<R> {
    fn resolve(&self, metadata_id: &ObjectId) -> DiffResult<Option<RevFeatureType>> {
        (**self).resolve(metadata_id)
    }
}

/// Resolves schemas from an object database.
#[derive(Clone, Debug)]
pub struct DatabaseResolver<D>(pub D);

impl<D> FeatureTypeResolver for DatabaseResolver<D>
where
    D: Deref + Send + Sync,
    D::Target: ObjectDatabase,
{
    fn resolve(&self, metadata_id: &ObjectId) -> DiffResult<Option<RevFeatureType>> {
        match self.0.get_feature_type(metadata_id) {
            Ok(feature_type) => Ok(Some(feature_type)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Forwards only what may intersect a query envelope.
///
/// A node is tested against the query reprojected into the native frame of
/// the schema that governs it: its own metadata id if it has one, else the
/// nearest enclosing tree's on the same side. Anything without bounds, or
/// whose frame cannot be reached from the query's, passes. A pair passes
/// when either side does.
///
/// Bucket bounds are a union over entries that may each name their own
/// schema, so buckets are pruned only when the query has no frame. A framed
/// query descends every bucket and prunes at the entries.
pub struct BoundsFilteringDiffConsumer<C, R> {
    delegate: C,
    envelope: Envelope,
    crs: Option<Crs>,
    resolver: R,
    tracker: DiffPathTracker,
    /// Query envelope per metadata id in that schema's frame; `None` when
    /// it cannot be compared.
    projected: HashMap<ObjectId, Option<Envelope>>,
    open_trees: Vec<bool>,
    open_buckets: Vec<bool>,
}

impl<C: DiffConsumer, R: FeatureTypeResolver> BoundsFilteringDiffConsumer<C, R> {
    pub fn new(delegate: C, envelope: Envelope, crs: Option<Crs>, resolver: R) -> Self {
        Self {
            delegate,
            envelope,
            crs,
            resolver,
            tracker: DiffPathTracker::new(),
            projected: HashMap::new(),
            open_trees: Vec::new(),
            open_buckets: Vec::new(),
        }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn into_inner(self) -> C {
        self.delegate
    }

    fn query_for(&mut self, metadata_id: Option<ObjectId>) -> DiffResult<Option<Envelope>> {
        let Some(metadata_id) = metadata_id else {
            return Ok(self.unframed_query());
        };
        if let Some(projected) = self.projected.get(&metadata_id) {
            return Ok(*projected);
        }
        let native = self
            .resolver
            .resolve(&metadata_id)?
            .and_then(|feature_type| feature_type.crs().cloned());
        let projected = match (&self.crs, native) {
            (Some(query_crs), Some(native)) => {
                let projected = self.envelope.transform(query_crs, &native);
                if projected.is_none() {
                    warn!(
                        from = %query_crs,
                        to = %native,
                        metadata = %metadata_id.short_hex(),
                        "no reprojection between reference frames, not pruning"
                    );
                }
                projected
            }
            _ => self.unframed_query(),
        };
        self.projected.insert(metadata_id, projected);
        Ok(projected)
    }

    /// A query without a frame is compared as is; one with a frame cannot
    /// be compared against data of unknown frame.
    fn unframed_query(&self) -> Option<Envelope> {
        match self.crs {
            None => Some(self.envelope),
            Some(_) => None,
        }
    }

    fn nearest_metadata(&self, side: Side) -> Option<ObjectId> {
        match side {
            Side::Left => self.tracker.left_metadata_id(),
            Side::Right => self.tracker.right_metadata_id(),
        }
    }

    fn test(&mut self, bounds: Option<&Envelope>, metadata_id: Option<ObjectId>) -> DiffResult<bool> {
        let Some(bounds) = bounds else {
            return Ok(true);
        };
        let query = self.query_for(metadata_id)?;
        Ok(query.map_or(true, |q| bounds.intersects(&q)))
    }

    fn node_intersects(&mut self, node: Option<&Node>, side: Side) -> DiffResult<bool> {
        let Some(node) = node else {
            return Ok(false);
        };
        let metadata_id = node.metadata_id().or_else(|| self.nearest_metadata(side));
        self.test(node.bounds(), metadata_id)
    }

    fn bucket_intersects(&mut self, bucket: Option<&Bucket>) -> DiffResult<bool> {
        let Some(bucket) = bucket else {
            return Ok(false);
        };
        // Entries below may name schemas in other frames.
        if self.crs.is_some() {
            return Ok(true);
        }
        self.test(bucket.bounds(), None)
    }

    fn pair_intersects(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<bool> {
        Ok(self.node_intersects(left, Side::Left)? || self.node_intersects(right, Side::Right)?)
    }
}

impl<C: DiffConsumer, R: FeatureTypeResolver> DiffConsumer for BoundsFilteringDiffConsumer<C, R> {
    fn tree(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<bool> {
        let applies = self.pair_intersects(left, right)?;
        self.tracker.tree(left, right)?;
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
        let applies = self.bucket_intersects(left)? || self.bucket_intersects(right)?;
        self.open_buckets.push(applies);
        if !applies {
            return Ok(false);
        }
        self.delegate.bucket(index, depth, left, right)
    }

    fn end_bucket(
        &mut self,
        index: u8,
        depth: usize,
        left: Option<&Bucket>,
        right: Option<&Bucket>,
    ) -> DiffResult<()> {
        let forwarded = self.open_buckets.pop().ok_or_else(|| {
            DiffError::UnbalancedTraversal(format!("end_bucket {index} without a matching bucket"))
        })?;
        if forwarded {
            self.delegate.end_bucket(index, depth, left, right)?;
        }
        Ok(())
    }

    fn feature(&mut self, left: Option<&Node>, right: Option<&Node>) -> DiffResult<()> {
        if self.pair_intersects(left, right)? {
            self.delegate.feature(left, right)?;
        }
        Ok(())
    }
}
