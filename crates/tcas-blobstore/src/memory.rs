use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tcas_buffer::{new_buffer_from_error, new_cas_buffer_from_byte_slice, BoxBuffer, Source};
use tcas_core::{CasError, CasResult};
use tcas_digest::{Digest, DigestSet, KeyFormat};

type Objects = Arc<Mutex<HashMap<String, Bytes>>>;

/// [`super::BlobAccess`] that keeps all objects in memory.
///
/// Objects are validated on the way in and on the way out. Objects that
/// fail validation when read are removed, so that clients can upload
/// them again.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobAccess {
    objects: Objects,
}

fn lock(objects: &Objects) -> MutexGuard<'_, HashMap<String, Bytes>> {
    // Map updates cannot be left half done, so a poisoned lock is harmless.
    objects.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBlobAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        lock(&self.objects).contains_key(digest.key(KeyFormat::WithInstance))
    }
}

impl super::BlobAccess for MemoryBlobAccess {
    fn get(&self, digest: &Digest) -> BoxBuffer {
        let key = digest.key(KeyFormat::WithInstance).to_string();
        let Some(data) = lock(&self.objects).get(&key).cloned() else {
            return new_buffer_from_error(CasError::not_found("Object not found"));
        };

        let objects = self.objects.clone();
        let repair = move || {
            tracing::warn!(key = %key, "Removing corrupted object");
            lock(&objects).remove(&key);
        };
        new_cas_buffer_from_byte_slice(digest, data, Source::reparable(repair))
    }

    fn put(&self, digest: &Digest, b: BoxBuffer) -> CasResult<()> {
        let data = b.to_byte_slice(usize::MAX)?;
        tracing::trace!(%digest, "Storing object");
        lock(&self.objects).insert(digest.key(KeyFormat::WithInstance).to_string(), data);
        Ok(())
    }

    fn find_missing(&self, digests: &DigestSet) -> CasResult<DigestSet> {
        let objects = lock(&self.objects);
        Ok(digests
            .iter()
            .filter(|d| !objects.contains_key(d.key(KeyFormat::WithInstance)))
            .cloned()
            .collect())
    }
}
