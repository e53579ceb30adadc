use std::io::{self, Write};

use bytes::Bytes;
use tcas_core::CasResult;
use tcas_digest::Digest;

use crate::buffer::{
    check_maximum_size, clone_via_byte_slice, collect_chunks, read_at_via_chunk_reader,
    validate_reader_offset, write_chunks, BoxBuffer, Buffer, ErrorHandler, ErrorHandlerGuard,
    ErrorHandlerOutcome,
};
use crate::cas_chunk_reader::ValidatingChunkReader;
use crate::chunk_reader::{
    ChunkPolicy, ChunkReader, ChunkReaderAsRead, ErrorChunkReader, NormalizingChunkReader,
    SkippingChunkReader,
};
use crate::source::Source;
use crate::tee::clone_via_tee;

/// Streams the contents of `inner`, asking the error handler for a
/// replacement buffer whenever reading fails. Replacements are read from
/// the offset at which the failure occurred.
struct ErrorHandlingChunkReader {
    r: Box<dyn ChunkReader>,
    guard: ErrorHandlerGuard,
    offset: i64,
}

impl ErrorHandlingChunkReader {
    fn new(inner: BoxBuffer, guard: ErrorHandlerGuard, offset: i64) -> Self {
        ErrorHandlingChunkReader {
            r: inner.to_unvalidated_chunk_reader(offset, ChunkPolicy::dont_care()),
            guard,
            offset,
        }
    }
}

impl ChunkReader for ErrorHandlingChunkReader {
    fn read(&mut self) -> CasResult<Option<Bytes>> {
        loop {
            match self.r.read() {
                Ok(Some(chunk)) => {
                    self.offset += chunk.len() as i64;
                    return Ok(Some(chunk));
                }
                Ok(None) => return Ok(None),
                Err(err) => {
                    tracing::debug!(offset = self.offset, error = %err, "Read failed, consulting error handler");
                    let replacement = self.guard.0.on_error(err)?;
                    self.r = replacement
                        .to_unvalidated_chunk_reader(self.offset, ChunkPolicy::dont_care());
                }
            }
        }
    }
}

/// Buffer decorated with an [`ErrorHandler`]. The combined stream, which
/// may be stitched together from multiple replacement buffers, is
/// validated against the digest.
pub(crate) struct CasErrorHandlingBuffer {
    inner: BoxBuffer,
    guard: ErrorHandlerGuard,
    digest: Digest,
    source: Source,
}

impl CasErrorHandlingBuffer {
    pub(crate) fn boxed(
        inner: BoxBuffer,
        handler: Box<dyn ErrorHandler>,
        digest: Digest,
        source: Source,
    ) -> BoxBuffer {
        Box::new(CasErrorHandlingBuffer {
            inner,
            guard: ErrorHandlerGuard(handler),
            digest,
            source,
        })
    }

    fn into_validating_reader(self) -> Box<dyn ChunkReader> {
        let r = ErrorHandlingChunkReader::new(self.inner, self.guard, 0);
        Box::new(ValidatingChunkReader::new(
            Box::new(r),
            self.digest,
            self.source,
        ))
    }
}

impl Buffer for CasErrorHandlingBuffer {
    fn size_bytes(&self) -> CasResult<i64> {
        Ok(self.digest.size_bytes())
    }

    fn to_byte_slice(self: Box<Self>, maximum_size_bytes: usize) -> CasResult<Bytes> {
        let size_bytes = self.digest.size_bytes();
        check_maximum_size(size_bytes, maximum_size_bytes)?;
        collect_chunks(self.into_validating_reader(), size_bytes)
    }

    fn to_reader(self: Box<Self>) -> Box<dyn io::Read + Send> {
        Box::new(ChunkReaderAsRead::new(self.into_validating_reader()))
    }

    fn to_chunk_reader(self: Box<Self>, offset: i64, policy: ChunkPolicy) -> Box<dyn ChunkReader> {
        if let Err(err) = validate_reader_offset(self.digest.size_bytes(), offset) {
            return Box::new(ErrorChunkReader::new(err));
        }
        Box::new(NormalizingChunkReader::new(
            Box::new(SkippingChunkReader::new(
                self.into_validating_reader(),
                offset as u64,
            )),
            policy,
        ))
    }

    fn read_at(self: Box<Self>, buf: &mut [u8], offset: i64) -> CasResult<usize> {
        validate_reader_offset(i64::MAX, offset)?;
        read_at_via_chunk_reader(self.into_validating_reader(), buf, offset)
    }

    fn into_writer(self: Box<Self>, w: &mut dyn Write) -> CasResult<()> {
        write_chunks(self.into_validating_reader(), w)
    }

    fn clone_copy(self: Box<Self>, maximum_size_bytes: usize) -> (BoxBuffer, BoxBuffer) {
        clone_via_byte_slice(self, maximum_size_bytes)
    }

    fn clone_stream(self: Box<Self>) -> (BoxBuffer, BoxBuffer) {
        let digest = self.digest.clone();
        clone_via_tee(&digest, self.into_validating_reader())
    }

    fn to_unvalidated_chunk_reader(
        self: Box<Self>,
        offset: i64,
        policy: ChunkPolicy,
    ) -> Box<dyn ChunkReader> {
        if let Err(err) = validate_reader_offset(self.digest.size_bytes(), offset) {
            return Box::new(ErrorChunkReader::new(err));
        }
        Box::new(NormalizingChunkReader::new(
            Box::new(ErrorHandlingChunkReader::new(self.inner, self.guard, offset)),
            policy,
        ))
    }

    fn apply_error_handler(self: Box<Self>, handler: Box<dyn ErrorHandler>) -> ErrorHandlerOutcome {
        let digest = self.digest.clone();
        let source = self.source.clone();
        ErrorHandlerOutcome::Finished(CasErrorHandlingBuffer::boxed(self, handler, digest, source))
    }
}
