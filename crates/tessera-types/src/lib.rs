//! Foundation types for Tessera.
//!
//! This crate provides the identity and spatial types shared by every other
//! Tessera crate.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`Envelope`] -- Axis-aligned bounding box attached to records and subtrees
//! - [`Crs`] -- Reference frame of an envelope, with Web Mercator reprojection

pub mod error;
pub mod object;
pub mod spatial;

pub use error::TypeError;
pub use object::{ObjectId, OBJECT_ID_LEN};
pub use spatial::{Crs, Envelope};
