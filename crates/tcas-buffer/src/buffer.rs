use std::io::{self, Write};

use bytes::{Bytes, BytesMut};
use prost::Message;
use tcas_core::proto::ActionResult;
use tcas_core::{CasError, CasResult};

use crate::chunk_reader::{cas_error_from_io, ChunkPolicy, ChunkReader};
use crate::error_buffer::new_buffer_from_error;
use crate::validated_byte_slice::ValidatedByteSliceBuffer;

/// Owned, type-erased buffer.
pub type BoxBuffer = Box<dyn Buffer>;

/// Deferred handle to the contents of a single object.
///
/// A buffer is consumed by whichever operation materializes it. To access
/// the same data twice, clone it first with [`Buffer::clone_copy`] or
/// [`Buffer::clone_stream`]. Data of CAS buffers is validated against the
/// digest while it is produced, and a mismatch is reported instead of the
/// final bytes.
pub trait Buffer: Send {
    fn size_bytes(&self) -> CasResult<i64>;

    /// Read the full contents, as long as they do not exceed
    /// `maximum_size_bytes`.
    fn to_byte_slice(self: Box<Self>, maximum_size_bytes: usize) -> CasResult<Bytes>;

    fn to_reader(self: Box<Self>) -> Box<dyn io::Read + Send>;

    /// Stream the contents starting at `offset`, in chunks shaped by
    /// `policy`. Offsets outside `[0, size]` fail on the first read.
    fn to_chunk_reader(self: Box<Self>, offset: i64, policy: ChunkPolicy)
        -> Box<dyn ChunkReader>;

    /// Copy data at `offset` into `buf`, returning the number of bytes
    /// copied. A count below `buf.len()` means the end of the buffer was
    /// reached.
    fn read_at(self: Box<Self>, buf: &mut [u8], offset: i64) -> CasResult<usize>;

    fn to_action_result(self: Box<Self>, maximum_size_bytes: usize) -> CasResult<ActionResult> {
        let data = self.to_byte_slice(maximum_size_bytes)?;
        ActionResult::decode(data).map_err(|e| {
            CasError::invalid_argument(format!("Failed to unmarshal message: {e}"))
        })
    }

    fn into_writer(self: Box<Self>, w: &mut dyn Write) -> CasResult<()>;

    /// Two buffers with the same contents, where each may be consumed
    /// independently. Variants without cheap random access materialize up
    /// to `maximum_size_bytes` bytes.
    fn clone_copy(self: Box<Self>, maximum_size_bytes: usize) -> (BoxBuffer, BoxBuffer);

    /// Like [`Buffer::clone_copy`], without a size limit. Stream-backed
    /// variants read their source once on behalf of both clones, holding
    /// chunks in memory until both have consumed them. Reading one clone
    /// to the end before starting on the other buffers the whole object.
    fn clone_stream(self: Box<Self>) -> (BoxBuffer, BoxBuffer);

    /// Release the buffer without reading it.
    fn discard(self: Box<Self>) {}

    /// Stream contents without checksum validation, for use by the error
    /// handling decorator that validates the combined stream itself.
    #[doc(hidden)]
    fn to_unvalidated_chunk_reader(
        self: Box<Self>,
        offset: i64,
        policy: ChunkPolicy,
    ) -> Box<dyn ChunkReader>;

    #[doc(hidden)]
    fn apply_error_handler(self: Box<Self>, handler: Box<dyn ErrorHandler>) -> ErrorHandlerOutcome;
}

/// Policy hook for I/O failures of a buffer. See [`with_error_handler`].
pub trait ErrorHandler: Send {
    /// Called for every failure of the underlying reader. Returning a
    /// buffer continues the transfer from it, at the same offset.
    /// Returning an error stops the transfer.
    fn on_error(&mut self, err: CasError) -> CasResult<BoxBuffer>;

    /// Called exactly once, when the transfer is finished or abandoned.
    fn done(&mut self);
}

#[doc(hidden)]
pub enum ErrorHandlerOutcome {
    Finished(BoxBuffer),
    Retry(BoxBuffer, Box<dyn ErrorHandler>),
}

/// Decorate `b` so that I/O failures are passed to `handler`, which may
/// provide a replacement buffer to resume from. The combined stream is
/// validated against the digest, so replacements cannot introduce
/// corrupted data.
pub fn with_error_handler(mut b: BoxBuffer, mut handler: Box<dyn ErrorHandler>) -> BoxBuffer {
    loop {
        match b.apply_error_handler(handler) {
            ErrorHandlerOutcome::Finished(replacement) => return replacement,
            ErrorHandlerOutcome::Retry(replacement, h) => {
                b = replacement;
                handler = h;
            }
        }
    }
}

/// Calls [`ErrorHandler::done`] when dropped.
pub(crate) struct ErrorHandlerGuard(pub(crate) Box<dyn ErrorHandler>);

impl Drop for ErrorHandlerGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}

pub(crate) fn validate_reader_offset(size_bytes: i64, offset: i64) -> CasResult<()> {
    if offset < 0 {
        return Err(CasError::invalid_argument(format!(
            "Negative read offset: {offset}"
        )));
    }
    if offset > size_bytes {
        return Err(CasError::invalid_argument(format!(
            "Buffer is {size_bytes} bytes in size, while a read at offset {offset} was requested"
        )));
    }
    Ok(())
}

pub(crate) fn check_maximum_size(size_bytes: i64, maximum_size_bytes: usize) -> CasResult<()> {
    if size_bytes as u64 > maximum_size_bytes as u64 {
        return Err(CasError::invalid_argument(format!(
            "Buffer is {size_bytes} bytes in size, while a maximum of {maximum_size_bytes} bytes is permitted"
        )));
    }
    Ok(())
}

pub(crate) fn collect_chunks(mut r: Box<dyn ChunkReader>, size_hint: i64) -> CasResult<Bytes> {
    let first = match r.read()? {
        Some(chunk) => chunk,
        None => return Ok(Bytes::new()),
    };
    let Some(second) = r.read()? else {
        // Avoid copying data that arrives in one piece.
        return Ok(first);
    };
    let mut data = BytesMut::with_capacity(size_hint.max(0) as usize);
    data.extend_from_slice(&first);
    data.extend_from_slice(&second);
    while let Some(chunk) = r.read()? {
        data.extend_from_slice(&chunk);
    }
    Ok(data.freeze())
}

pub(crate) fn write_chunks(mut r: Box<dyn ChunkReader>, w: &mut dyn Write) -> CasResult<()> {
    while let Some(chunk) = r.read()? {
        w.write_all(&chunk).map_err(cas_error_from_io)?;
    }
    Ok(())
}

/// Random access on top of a sequential, validated stream. The stream is
/// read until its end, so that no data is returned before it has been
/// validated.
pub(crate) fn read_at_via_chunk_reader(
    mut r: Box<dyn ChunkReader>,
    buf: &mut [u8],
    offset: i64,
) -> CasResult<usize> {
    let start = offset as u64;
    let end = start + buf.len() as u64;
    let mut position = 0u64;
    let mut copied = 0usize;
    while let Some(chunk) = r.read()? {
        let chunk_end = position + chunk.len() as u64;
        let from = start.max(position);
        let to = end.min(chunk_end);
        if from < to {
            let src = &chunk[(from - position) as usize..(to - position) as usize];
            buf[(from - start) as usize..(to - start) as usize].copy_from_slice(src);
            copied = copied.max((to - start) as usize);
        }
        position = chunk_end;
    }
    Ok(copied)
}

/// Clone by materializing, for buffers that can only be read once.
pub(crate) fn clone_via_byte_slice(
    b: BoxBuffer,
    maximum_size_bytes: usize,
) -> (BoxBuffer, BoxBuffer) {
    match b.to_byte_slice(maximum_size_bytes) {
        Ok(data) => (
            ValidatedByteSliceBuffer::boxed(data.clone()),
            ValidatedByteSliceBuffer::boxed(data),
        ),
        Err(err) => (new_buffer_from_error(err.clone()), new_buffer_from_error(err)),
    }
}
