//! Hashing primitives for Tessera.
//!
//! Provides domain-separated BLAKE3 hashing for every stored object kind and
//! the name digests that define the storage order of tree entries.
//!
//! All hashing goes through the `blake3` crate.

pub mod hasher;

pub use hasher::ContentHasher;
