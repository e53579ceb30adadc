use std::io::{self, Write};
use std::sync::Arc;

use bytes::Bytes;
use tcas_core::{CasError, CasResult};
use tcas_digest::Digest;

use crate::buffer::{
    check_maximum_size, collect_chunks, validate_reader_offset, write_chunks, BoxBuffer, Buffer,
    ErrorHandler, ErrorHandlerOutcome,
};
use crate::chunk_reader::{
    ChunkPolicy, ChunkReader, ChunkReaderAsRead, ErrorChunkReader, NormalizingChunkReader,
};
use crate::error_handling::CasErrorHandlingBuffer;
use crate::source::Source;

/// Returns the buffer that holds the data at the given offset, together
/// with the offset at which that buffer starts.
pub type SmallBufferFetcher = Arc<dyn Fn(i64) -> (BoxBuffer, i64) + Send + Sync>;

/// A large CAS object assembled from smaller buffers on demand. Only the
/// buffers overlapping the requested range are fetched. Every small buffer
/// is expected to validate its own contents.
pub struct CasConcatenatingBuffer {
    digest: Digest,
    fetcher: SmallBufferFetcher,
}

pub fn new_cas_concatenating_buffer(
    digest: &Digest,
    fetcher: impl Fn(i64) -> (BoxBuffer, i64) + Send + Sync + 'static,
) -> BoxBuffer {
    Box::new(CasConcatenatingBuffer {
        digest: digest.clone(),
        fetcher: Arc::new(fetcher),
    })
}

fn no_progress(offset: i64) -> CasError {
    CasError::internal(format!(
        "Buffer at offset {offset} did not return any data"
    ))
}

impl Buffer for CasConcatenatingBuffer {
    fn size_bytes(&self) -> CasResult<i64> {
        Ok(self.digest.size_bytes())
    }

    fn to_byte_slice(self: Box<Self>, maximum_size_bytes: usize) -> CasResult<Bytes> {
        let size_bytes = self.digest.size_bytes();
        check_maximum_size(size_bytes, maximum_size_bytes)?;
        collect_chunks(self.to_chunk_reader(0, ChunkPolicy::dont_care()), size_bytes)
    }

    fn to_reader(self: Box<Self>) -> Box<dyn io::Read + Send> {
        Box::new(ChunkReaderAsRead::new(
            self.to_chunk_reader(0, ChunkPolicy::dont_care()),
        ))
    }

    fn to_chunk_reader(self: Box<Self>, offset: i64, policy: ChunkPolicy) -> Box<dyn ChunkReader> {
        let size_bytes = self.digest.size_bytes();
        if let Err(err) = validate_reader_offset(size_bytes, offset) {
            return Box::new(ErrorChunkReader::new(err));
        }
        Box::new(NormalizingChunkReader::new(
            Box::new(ConcatenatingChunkReader {
                fetcher: self.fetcher,
                size_bytes,
                offset,
                current: None,
            }),
            policy,
        ))
    }

    fn read_at(self: Box<Self>, mut buf: &mut [u8], mut offset: i64) -> CasResult<usize> {
        validate_reader_offset(i64::MAX, offset)?;
        let size_bytes = self.digest.size_bytes();
        let mut copied = 0;
        while !buf.is_empty() && offset < size_bytes {
            let (small, start) = (self.fetcher)(offset);
            let n = small.read_at(buf, offset - start)?;
            if n == 0 {
                return Err(no_progress(offset));
            }
            copied += n;
            offset += n as i64;
            buf = &mut std::mem::take(&mut buf)[n..];
        }
        Ok(copied)
    }

    fn into_writer(self: Box<Self>, w: &mut dyn Write) -> CasResult<()> {
        write_chunks(self.to_chunk_reader(0, ChunkPolicy::dont_care()), w)
    }

    fn clone_copy(self: Box<Self>, _maximum_size_bytes: usize) -> (BoxBuffer, BoxBuffer) {
        self.clone_stream()
    }

    fn clone_stream(self: Box<Self>) -> (BoxBuffer, BoxBuffer) {
        let other = Box::new(CasConcatenatingBuffer {
            digest: self.digest.clone(),
            fetcher: self.fetcher.clone(),
        });
        (other, self)
    }

    fn to_unvalidated_chunk_reader(
        self: Box<Self>,
        offset: i64,
        policy: ChunkPolicy,
    ) -> Box<dyn ChunkReader> {
        self.to_chunk_reader(offset, policy)
    }

    fn apply_error_handler(self: Box<Self>, handler: Box<dyn ErrorHandler>) -> ErrorHandlerOutcome {
        let digest = self.digest.clone();
        ErrorHandlerOutcome::Finished(CasErrorHandlingBuffer::boxed(
            self,
            handler,
            digest,
            Source::Irreparable,
        ))
    }
}

/// Reads the small buffers back to back, starting at `offset`.
struct ConcatenatingChunkReader {
    fetcher: SmallBufferFetcher,
    size_bytes: i64,
    offset: i64,
    current: Option<Box<dyn ChunkReader>>,
}

impl ChunkReader for ConcatenatingChunkReader {
    fn read(&mut self) -> CasResult<Option<Bytes>> {
        if let Some(r) = &mut self.current {
            if let Some(chunk) = r.read()? {
                self.offset += chunk.len() as i64;
                return Ok(Some(chunk));
            }
            self.current = None;
        }
        if self.offset >= self.size_bytes {
            return Ok(None);
        }

        // Continue with the small buffer that holds the current offset.
        let (small, start) = (self.fetcher)(self.offset);
        let mut r = small.to_chunk_reader(self.offset - start, ChunkPolicy::dont_care());
        let Some(chunk) = r.read()? else {
            return Err(no_progress(self.offset));
        };
        self.offset += chunk.len() as i64;
        self.current = Some(r);
        Ok(Some(chunk))
    }
}
