//! Hash-sharded tree construction and navigation for Tessera.
//!
//! A tree with at most `T` immediate entries is stored flat; a larger one is
//! split into up to 32 buckets by the digest of each entry name, recursively.
//! The shape is a pure function of the entry set, so identical content always
//! produces the identical root id regardless of edit history.
//!
//! - [`RevTreeBuilder`] -- insert/remove entries of one tree and build it
//! - [`TreeEditor`] -- path-based edits across nested trees with write-back
//! - [`find_node`], [`find_path`], [`ls_tree`], [`deep_size`] -- lookup

pub mod builder;
pub mod editor;
pub mod error;
pub mod format;
pub mod lookup;

pub use builder::RevTreeBuilder;
pub use editor::TreeEditor;
pub use error::{TreeError, TreeResult};
pub use format::TreeFormat;
pub use lookup::{all_entries, deep_size, find_node, find_path, ls_tree, split_path, LsTreeMode};
pub use tessera_store::{bucket_of, NodeStorageOrder, BUCKET_COUNT};
