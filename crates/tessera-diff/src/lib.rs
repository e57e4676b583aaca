//! Structural diff for Tessera trees.
//!
//! A diff is a pairwise walk of two trees that never reads record contents.
//! Pairs with equal ids are skipped without being loaded, so unchanged
//! subtrees and buckets cost nothing however large they are.
//!
//! # Key Types
//!
//! - [`DiffTreeWalk`] -- The traversal engine, driving a [`DiffConsumer`]
//! - [`DiffTree`] -- The diff operation: filters, collection, counting, streaming
//! - [`DiffEntry`] / [`ChangeType`] -- One added, removed or modified entry
//! - [`DiffPathTracker`] -- Path and metadata context of the current position
//! - [`PathFilteringDiffConsumer`] / [`BoundsFilteringDiffConsumer`] -- Decorators
//! - [`DiffCountConsumer`] / [`DiffBoundsConsumer`] -- Aggregating consumers

pub mod bounds_filter;
pub mod consumer;
pub mod counting;
pub mod entry;
pub mod error;
pub mod op;
pub mod path_filter;
pub mod tracker;
pub mod walk;

pub use bounds_filter::{BoundsFilteringDiffConsumer, DatabaseResolver, FeatureTypeResolver};
pub use consumer::DiffConsumer;
pub use counting::{DiffBoundsConsumer, DiffCountConsumer, DiffObjectCount};
pub use entry::{ChangeType, DiffEntry, DiffEntryConsumer};
pub use error::{DiffError, DiffResult};
pub use op::{DiffEntryStream, DiffTree, DEFAULT_CHANNEL_CAPACITY};
pub use path_filter::PathFilteringDiffConsumer;
pub use tracker::DiffPathTracker;
pub use walk::{CancelToken, DiffTreeWalk};
