//! Transparent decomposition of large objects into blocks.
//!
//! BLAKE3ZCC objects larger than the block size are not stored as a
//! whole. Each block is stored as an object of its own, together with a
//! manifest (stored under the `B3ZM:` digest of the object) that holds the
//! Merkle tree nodes of all blocks. Block digests are derived from the
//! manifest when reading, and the manifest itself is validated against
//! the object's hash. This places an upper bound on the size of objects
//! in the backing store, while still permitting random access.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use tcas_buffer::{
    new_buffer_from_error, new_cas_concatenating_buffer, BoxBuffer, ChunkPolicy,
    ValidatedByteSliceBuffer,
};
use tcas_core::config::DecompositionConfig;
use tcas_core::{CasError, CasResult, Code, TcasResult};
use tcas_digest::{Digest, DigestSet, ManifestParser};

use crate::BlobAccess;

const DEFAULT_FIND_MISSING_BATCH_SIZE: usize = 1000;

/// [`BlobAccess`] decorator that decomposes large objects written through
/// it into blocks, and reassembles them when read.
pub struct DecomposingBlobAccess {
    base: Arc<dyn BlobAccess>,
    block_size_bytes: i64,
    maximum_manifest_size_bytes: usize,
    find_missing_batch_size: usize,
}

impl DecomposingBlobAccess {
    /// `block_size_bytes` must be a power of two larger than 1 KiB, so
    /// that every full block is a complete subtree of the Merkle tree.
    pub fn new(
        base: Arc<dyn BlobAccess>,
        block_size_bytes: i64,
        maximum_manifest_size_bytes: usize,
    ) -> CasResult<Self> {
        let config = DecompositionConfig {
            block_size_bytes,
            maximum_manifest_size_bytes: i64::try_from(maximum_manifest_size_bytes)
                .unwrap_or(i64::MAX),
            find_missing_batch_size: DEFAULT_FIND_MISSING_BATCH_SIZE,
        };
        config
            .validate()
            .map_err(|e| CasError::invalid_argument(e.to_string()))?;
        Ok(Self::from_validated(base, &config))
    }

    pub fn from_config(base: Arc<dyn BlobAccess>, config: &DecompositionConfig) -> TcasResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(base, config))
    }

    fn from_validated(base: Arc<dyn BlobAccess>, config: &DecompositionConfig) -> Self {
        DecomposingBlobAccess {
            base,
            block_size_bytes: config.block_size_bytes,
            maximum_manifest_size_bytes: config.maximum_manifest_size_bytes as usize,
            find_missing_batch_size: config.find_missing_batch_size,
        }
    }

    pub fn block_size_bytes(&self) -> i64 {
        self.block_size_bytes
    }

    /// Read a manifest in its entirety. Its size is validated against the
    /// digest, as block lookups index into it blindly.
    fn load_manifest(&self, manifest_digest: &Digest) -> CasResult<Bytes> {
        let manifest = self
            .base
            .get(manifest_digest)
            .to_byte_slice(self.maximum_manifest_size_bytes)?;
        if manifest.len() as i64 != manifest_digest.size_bytes() {
            return Err(CasError::internal(format!(
                "Manifest is {} bytes in size, while {} bytes were expected",
                manifest.len(),
                manifest_digest.size_bytes()
            )));
        }
        Ok(manifest)
    }
}

impl BlobAccess for DecomposingBlobAccess {
    fn get(&self, digest: &Digest) -> BoxBuffer {
        let Some((manifest_digest, parser)) = digest.to_manifest(self.block_size_bytes) else {
            return self.base.get(digest);
        };

        let manifest = match self.load_manifest(&manifest_digest) {
            Ok(manifest) => manifest,
            Err(e) => return new_buffer_from_error(e.wrap("Failed to load manifest")),
        };

        // Blocks are only fetched once the data they hold is accessed.
        let base = self.base.clone();
        new_cas_concatenating_buffer(digest, move |offset| {
            let (block_digest, block_offset) = parser.block_digest(&manifest, offset);
            (base.get(&block_digest), block_offset)
        })
    }

    fn put(&self, digest: &Digest, b: BoxBuffer) -> CasResult<()> {
        let Some((manifest_digest, parser)) = digest.to_manifest(self.block_size_bytes) else {
            return self.base.put(digest, b);
        };

        let manifest_size_bytes = manifest_digest.size_bytes();
        if manifest_size_bytes as u64 > self.maximum_manifest_size_bytes as u64 {
            b.discard();
            return Err(CasError::invalid_argument(format!(
                "Buffer requires a manifest that is {manifest_size_bytes} bytes in size, while a maximum of {} bytes is permitted",
                self.maximum_manifest_size_bytes
            )));
        }

        let mut r = b.to_chunk_reader(0, ChunkPolicy::exactly(self.block_size_bytes as usize));
        let mut manifest = Vec::with_capacity(manifest_size_bytes as usize);
        let mut offset = 0i64;
        while let Some(block) = r.read()? {
            let block_size_bytes = block.len() as i64;
            let block_digest = parser.append_block_digest(&mut manifest, &block);
            // Blocks are part of the stream that is validated against the
            // digest of the object, so they need no validation of their own.
            self.base
                .put(&block_digest, ValidatedByteSliceBuffer::boxed(block))
                .map_err(|e| {
                    e.wrap(format!(
                        "Failed to store block at offset {offset} with digest {block_digest}"
                    ))
                })?;
            tracing::debug!(%block_digest, offset, "Stored block");
            offset += block_size_bytes;
        }

        self.base
            .put(&manifest_digest, ValidatedByteSliceBuffer::boxed(manifest))
            .map_err(|e| e.wrap("Failed to store manifest"))?;
        tracing::debug!(%digest, %manifest_digest, "Stored decomposed object");
        Ok(())
    }

    fn find_missing(&self, digests: &DigestSet) -> CasResult<DigestSet> {
        // Check for the presence of manifests instead of composed objects.
        let mut composed: BTreeMap<Digest, Vec<(Digest, Arc<dyn ManifestParser>)>> =
            BTreeMap::new();
        let mut initial = DigestSet::new();
        for blob_digest in digests {
            match blob_digest.to_manifest(self.block_size_bytes) {
                Some((manifest_digest, parser)) => {
                    initial.insert(manifest_digest.clone());
                    composed
                        .entry(manifest_digest)
                        .or_default()
                        .push((blob_digest.clone(), parser));
                }
                None => {
                    initial.insert(blob_digest.clone());
                }
            }
        }
        let missing_initially = self.base.find_missing(&initial)?;

        // Objects without a manifest are absent, without having to check
        // their blocks.
        let mut queue = FindMissingQueue::new(self.base.as_ref(), self.find_missing_batch_size);
        for manifest_digest in &missing_initially {
            if let Some(blobs) = composed.remove(manifest_digest) {
                queue.missing_composed.extend(blobs.into_iter().map(|(d, _)| d));
            }
        }

        for (manifest_digest, blobs) in composed {
            let manifest = match self.load_manifest(&manifest_digest) {
                Ok(manifest) => manifest,
                Err(e) if e.code() == Code::NotFound => {
                    tracing::warn!(%manifest_digest, "Manifest disappeared while checking for presence");
                    queue.missing_composed.extend(blobs.into_iter().map(|(d, _)| d));
                    continue;
                }
                Err(e) => return Err(e.wrap(format!("Failed to load manifest {manifest_digest}"))),
            };
            for (blob_digest, parser) in &blobs {
                let mut offset = 0;
                while offset < blob_digest.size_bytes() {
                    let (block_digest, block_offset) = parser.block_digest(&manifest, offset);
                    offset = block_offset + block_digest.size_bytes();
                    queue.add(block_digest, blob_digest)?;
                }
            }
        }
        let missing_composed = queue.finish()?;

        // Manifest digests were not requested by the caller.
        Ok(missing_initially
            .intersection(digests)
            .union(&missing_composed))
    }
}

/// Batches FindMissing() calls for blocks, remembering which composed
/// objects each block belongs to.
struct FindMissingQueue<'a> {
    base: &'a dyn BlobAccess,
    batch_size: usize,
    pending: BTreeMap<Digest, BTreeSet<Digest>>,
    missing_composed: DigestSet,
}

impl<'a> FindMissingQueue<'a> {
    fn new(base: &'a dyn BlobAccess, batch_size: usize) -> Self {
        FindMissingQueue {
            base,
            batch_size,
            pending: BTreeMap::new(),
            missing_composed: DigestSet::new(),
        }
    }

    fn add(&mut self, block_digest: Digest, blob_digest: &Digest) -> CasResult<()> {
        if self.pending.len() >= self.batch_size && !self.pending.contains_key(&block_digest) {
            self.flush()?;
        }
        self.pending
            .entry(block_digest)
            .or_default()
            .insert(blob_digest.clone());
        Ok(())
    }

    fn flush(&mut self) -> CasResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let block_digests: DigestSet = pending.keys().cloned().collect();
        let missing_blocks = self.base.find_missing(&block_digests)?;
        for block_digest in &missing_blocks {
            if let Some(blobs) = pending.get(block_digest) {
                self.missing_composed.extend(blobs.iter().cloned());
            }
        }
        Ok(())
    }

    fn finish(mut self) -> CasResult<DigestSet> {
        self.flush()?;
        Ok(self.missing_composed)
    }
}
