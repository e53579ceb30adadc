//! tcas-digest: object identification for the content addressable storage
//!
//! # Overview
//! - `digest`: validated `Digest` values (hash, size, instance name)
//! - `blake3zcc`: BLAKE3 with the chunk counter fixed to zero
//! - `manifest`: serialized Merkle tree nodes describing decomposed blobs
//! - `hasher`: incremental hashing for every supported algorithm
//! - `set`: ordered digest sets for FindMissing() style batch operations

pub mod blake3zcc;
pub mod digest;
pub mod hasher;
pub mod manifest;
pub mod set;

pub use digest::{Digest, HashAlgorithm, KeyFormat};
pub use hasher::{Generator, Hasher};
pub use manifest::{
    is_valid_manifest_size, manifest_size_bytes, Blake3ZccManifestParser, ManifestHasher,
    ManifestParser,
};
pub use set::DigestSet;
