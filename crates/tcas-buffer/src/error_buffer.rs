use std::io::{self, Write};

use bytes::Bytes;
use tcas_core::{CasError, CasResult};

use crate::buffer::{BoxBuffer, Buffer, ErrorHandler, ErrorHandlerOutcome};
use crate::chunk_reader::{ChunkPolicy, ChunkReader, ErrorChunkReader};

/// Buffer standing in for an object that could not be obtained. Every
/// operation reports the original error.
#[derive(Debug, Clone)]
pub struct ErrorBuffer {
    err: CasError,
}

pub fn new_buffer_from_error(err: CasError) -> BoxBuffer {
    Box::new(ErrorBuffer { err })
}

impl Buffer for ErrorBuffer {
    fn size_bytes(&self) -> CasResult<i64> {
        Err(self.err.clone())
    }

    fn to_byte_slice(self: Box<Self>, _maximum_size_bytes: usize) -> CasResult<Bytes> {
        Err(self.err)
    }

    fn to_reader(self: Box<Self>) -> Box<dyn io::Read + Send> {
        Box::new(ErrorReader(Some(self.err)))
    }

    fn to_chunk_reader(self: Box<Self>, _offset: i64, _policy: ChunkPolicy) -> Box<dyn ChunkReader> {
        Box::new(ErrorChunkReader::new(self.err))
    }

    fn read_at(self: Box<Self>, _buf: &mut [u8], _offset: i64) -> CasResult<usize> {
        Err(self.err)
    }

    fn into_writer(self: Box<Self>, _w: &mut dyn Write) -> CasResult<()> {
        Err(self.err)
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
        self.to_chunk_reader(offset, policy)
    }

    fn apply_error_handler(
        self: Box<Self>,
        mut handler: Box<dyn ErrorHandler>,
    ) -> ErrorHandlerOutcome {
        match handler.on_error(self.err) {
            Ok(replacement) => ErrorHandlerOutcome::Retry(replacement, handler),
            Err(err) => {
                handler.done();
                ErrorHandlerOutcome::Finished(new_buffer_from_error(err))
            }
        }
    }
}

/// Yields the error on the first read and EOF afterwards.
struct ErrorReader(Option<CasError>);

impl io::Read for ErrorReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        match self.0.take() {
            Some(err) => Err(io::Error::other(err)),
            None => Ok(0),
        }
    }
}
