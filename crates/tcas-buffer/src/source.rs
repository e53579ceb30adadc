use std::fmt;
use std::sync::Arc;

use tcas_core::CasError;
use tcas_digest::Digest;

/// Where the data of a buffer originates from. Determines how checksum and
/// size mismatches are reported.
#[derive(Clone)]
pub enum Source {
    /// Data from storage that cannot be repaired: mismatches are `Internal`.
    Irreparable,
    /// Data sent by a client: mismatches are `InvalidArgument`, as the
    /// client supplied bad data.
    UserProvided,
    /// Data from storage that can repair itself, e.g. by removing the
    /// corrupted object. The hook runs before `Internal` is returned.
    Reparable(Arc<dyn Fn() + Send + Sync>),
}

impl Source {
    pub fn reparable(repair: impl Fn() + Send + Sync + 'static) -> Self {
        Source::Reparable(Arc::new(repair))
    }

    pub(crate) fn size_mismatch(&self, digest: &Digest, actual: i64) -> CasError {
        self.mismatch(
            digest,
            format!(
                "Buffer is {actual} bytes in size, while {} bytes were expected",
                digest.size_bytes()
            ),
        )
    }

    /// Reported as soon as a stream grows beyond the expected size.
    pub(crate) fn size_overflow(&self, digest: &Digest, at_least: i64) -> CasError {
        self.mismatch(
            digest,
            format!(
                "Buffer is at least {at_least} bytes in size, while {} bytes were expected",
                digest.size_bytes()
            ),
        )
    }

    pub(crate) fn checksum_mismatch(&self, digest: &Digest, actual: &[u8]) -> CasError {
        self.mismatch(
            digest,
            format!(
                "Buffer has checksum {}, while {} was expected",
                hex::encode(actual),
                digest.hash_hex()
            ),
        )
    }

    fn mismatch(&self, digest: &Digest, message: String) -> CasError {
        match self {
            Source::Irreparable => CasError::internal(message),
            Source::UserProvided => CasError::invalid_argument(message),
            Source::Reparable(repair) => {
                tracing::warn!(%digest, "{message}, repairing");
                repair();
                CasError::internal(message)
            }
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Irreparable => f.write_str("Irreparable"),
            Source::UserProvided => f.write_str("UserProvided"),
            Source::Reparable(_) => f.write_str("Reparable(..)"),
        }
    }
}
