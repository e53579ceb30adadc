use std::io::{self, Write};

use bytes::Bytes;
use tcas_core::CasResult;

use crate::buffer::{
    check_maximum_size, validate_reader_offset, BoxBuffer, Buffer, ErrorHandler,
    ErrorHandlerOutcome,
};
use crate::chunk_reader::{
    cas_error_from_io, BytesChunkReader, ChunkPolicy, ChunkReader, ErrorChunkReader,
    NormalizingChunkReader,
};

/// In-memory data that is known to be valid, e.g. because it was just
/// validated or just produced.
#[derive(Debug, Clone)]
pub struct ValidatedByteSliceBuffer {
    data: Bytes,
}

impl ValidatedByteSliceBuffer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        ValidatedByteSliceBuffer { data: data.into() }
    }

    pub fn boxed(data: impl Into<Bytes>) -> BoxBuffer {
        Box::new(Self::new(data))
    }
}

impl Buffer for ValidatedByteSliceBuffer {
    fn size_bytes(&self) -> CasResult<i64> {
        Ok(self.data.len() as i64)
    }

    fn to_byte_slice(self: Box<Self>, maximum_size_bytes: usize) -> CasResult<Bytes> {
        check_maximum_size(self.data.len() as i64, maximum_size_bytes)?;
        Ok(self.data)
    }

    fn to_reader(self: Box<Self>) -> Box<dyn io::Read + Send> {
        Box::new(io::Cursor::new(self.data))
    }

    fn to_chunk_reader(self: Box<Self>, offset: i64, policy: ChunkPolicy) -> Box<dyn ChunkReader> {
        self.to_unvalidated_chunk_reader(offset, policy)
    }

    fn read_at(self: Box<Self>, buf: &mut [u8], offset: i64) -> CasResult<usize> {
        validate_reader_offset(i64::MAX, offset)?;
        let Some(tail) = self.data.get(offset as usize..) else {
            return Ok(0);
        };
        let n = buf.len().min(tail.len());
        buf[..n].copy_from_slice(&tail[..n]);
        Ok(n)
    }

    fn into_writer(self: Box<Self>, w: &mut dyn Write) -> CasResult<()> {
        w.write_all(&self.data).map_err(cas_error_from_io)
    }

    fn clone_copy(self: Box<Self>, _maximum_size_bytes: usize) -> (BoxBuffer, BoxBuffer) {
        (self.clone(), self)
    }

    fn clone_stream(self: Box<Self>) -> (BoxBuffer, BoxBuffer) {
        (self.clone(), self)
    }

    fn to_unvalidated_chunk_reader(
        self: Box<Self>,
        offset: i64,
        policy: ChunkPolicy,
    ) -> Box<dyn ChunkReader> {
        if let Err(e) = validate_reader_offset(self.data.len() as i64, offset) {
            return Box::new(ErrorChunkReader::new(e));
        }
        let tail = self.data.slice(offset as usize..);
        Box::new(NormalizingChunkReader::new(
            Box::new(BytesChunkReader::new(tail)),
            policy,
        ))
    }

    fn apply_error_handler(
        self: Box<Self>,
        mut handler: Box<dyn ErrorHandler>,
    ) -> ErrorHandlerOutcome {
        // In-memory data cannot fail.
        handler.done();
        ErrorHandlerOutcome::Finished(self)
    }
}
