//! tcas-blobstore: storage backends for the content addressable storage
//!
//! # Overview
//! - `BlobAccess`: get/put/find_missing contract shared by all backends
//! - `memory`: in-process store, used by tests and the `tcas` tool
//! - `decomposing`: splits large BLAKE3ZCC objects into blocks plus a manifest

pub mod decomposing;
pub mod memory;

pub use decomposing::DecomposingBlobAccess;
pub use memory::MemoryBlobAccess;

use tcas_buffer::BoxBuffer;
use tcas_core::CasResult;
use tcas_digest::{Digest, DigestSet};

/// Key/value store for CAS objects, keyed by digest.
///
/// Failures of `get` are reported through the returned buffer, so that
/// callers only have to check for errors when consuming it.
pub trait BlobAccess: Send + Sync {
    fn get(&self, digest: &Digest) -> BoxBuffer;

    fn put(&self, digest: &Digest, b: BoxBuffer) -> CasResult<()>;

    /// Return the subset of `digests` that is not present.
    fn find_missing(&self, digests: &DigestSet) -> CasResult<DigestSet>;
}
