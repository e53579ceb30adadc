use std::io::{self, Write};

use bytes::Bytes;
use tcas_core::CasResult;
use tcas_digest::Digest;

use crate::buffer::{
    check_maximum_size, BoxBuffer, Buffer, ErrorHandler, ErrorHandlerOutcome,
};
use crate::chunk_reader::{ChunkPolicy, ChunkReader};
use crate::error_buffer::new_buffer_from_error;
use crate::source::Source;
use crate::validated_byte_slice::ValidatedByteSliceBuffer;

/// In-memory data for a CAS object that has not been checked against its
/// digest yet. Validation happens when the buffer is consumed.
pub struct CasByteSliceBuffer {
    digest: Digest,
    data: Bytes,
    source: Source,
}

pub fn new_cas_buffer_from_byte_slice(
    digest: &Digest,
    data: impl Into<Bytes>,
    source: Source,
) -> BoxBuffer {
    Box::new(CasByteSliceBuffer {
        digest: digest.clone(),
        data: data.into(),
        source,
    })
}

impl CasByteSliceBuffer {
    fn validate(self) -> BoxBuffer {
        let actual = self.data.len() as i64;
        if actual != self.digest.size_bytes() {
            return new_buffer_from_error(self.source.size_mismatch(&self.digest, actual));
        }
        let mut hasher = self.digest.new_hasher();
        hasher.update(&self.data);
        let checksum = hasher.finalize();
        if checksum != self.digest.hash_bytes() {
            return new_buffer_from_error(self.source.checksum_mismatch(&self.digest, &checksum));
        }
        ValidatedByteSliceBuffer::boxed(self.data)
    }
}

impl Buffer for CasByteSliceBuffer {
    fn size_bytes(&self) -> CasResult<i64> {
        Ok(self.digest.size_bytes())
    }

    fn to_byte_slice(self: Box<Self>, maximum_size_bytes: usize) -> CasResult<Bytes> {
        check_maximum_size(self.digest.size_bytes(), maximum_size_bytes)?;
        self.validate().to_byte_slice(maximum_size_bytes)
    }

    fn to_reader(self: Box<Self>) -> Box<dyn io::Read + Send> {
        self.validate().to_reader()
    }

    fn to_chunk_reader(self: Box<Self>, offset: i64, policy: ChunkPolicy) -> Box<dyn ChunkReader> {
        self.validate().to_chunk_reader(offset, policy)
    }

    fn read_at(self: Box<Self>, buf: &mut [u8], offset: i64) -> CasResult<usize> {
        self.validate().read_at(buf, offset)
    }

    fn into_writer(self: Box<Self>, w: &mut dyn Write) -> CasResult<()> {
        self.validate().into_writer(w)
    }

    fn clone_copy(self: Box<Self>, maximum_size_bytes: usize) -> (BoxBuffer, BoxBuffer) {
        self.validate().clone_copy(maximum_size_bytes)
    }

    fn clone_stream(self: Box<Self>) -> (BoxBuffer, BoxBuffer) {
        self.validate().clone_stream()
    }

    fn to_unvalidated_chunk_reader(
        self: Box<Self>,
        offset: i64,
        policy: ChunkPolicy,
    ) -> Box<dyn ChunkReader> {
        ValidatedByteSliceBuffer::boxed(self.data).to_unvalidated_chunk_reader(offset, policy)
    }

    fn apply_error_handler(self: Box<Self>, handler: Box<dyn ErrorHandler>) -> ErrorHandlerOutcome {
        self.validate().apply_error_handler(handler)
    }
}
