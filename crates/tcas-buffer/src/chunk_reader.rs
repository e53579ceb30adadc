//! Forward-only chunked access to buffer contents.

use std::io;

use bytes::{Bytes, BytesMut};
use tcas_core::{CasError, CasResult, Code};

/// Iterator over the contents of a buffer, one chunk at a time.
///
/// `Ok(None)` marks the end of the stream. Readers are not restartable; a
/// fresh one has to be obtained from a buffer. Dropping a reader closes it.
pub trait ChunkReader: Send {
    fn read(&mut self) -> CasResult<Option<Bytes>>;
}

/// Desired size of the chunks returned by a [`ChunkReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub(crate) minimum_size_bytes: usize,
    pub(crate) default_size_bytes: usize,
    pub(crate) maximum_size_bytes: usize,
}

impl ChunkPolicy {
    /// Chunks of exactly `size_bytes`, except for the final chunk, which
    /// may be smaller. May require copying data into contiguous buffers.
    pub fn exactly(size_bytes: usize) -> Self {
        ChunkPolicy {
            minimum_size_bytes: size_bytes,
            default_size_bytes: size_bytes,
            maximum_size_bytes: size_bytes,
        }
    }

    /// Chunks of at most `size_bytes`. Performs the least amount of
    /// copying.
    pub fn at_most(size_bytes: usize) -> Self {
        ChunkPolicy {
            minimum_size_bytes: 1,
            default_size_bytes: size_bytes,
            maximum_size_bytes: size_bytes,
        }
    }

    /// Any chunk size. Readers that have to pick a size use 64 KiB.
    pub fn dont_care() -> Self {
        ChunkPolicy {
            minimum_size_bytes: 1,
            default_size_bytes: 64 * 1024,
            maximum_size_bytes: usize::MAX,
        }
    }

    pub fn default_size_bytes(&self) -> usize {
        self.default_size_bytes
    }
}

/// Reader that fails every call with the same error.
pub struct ErrorChunkReader {
    err: CasError,
}

impl ErrorChunkReader {
    pub fn new(err: CasError) -> Self {
        ErrorChunkReader { err }
    }
}

impl ChunkReader for ErrorChunkReader {
    fn read(&mut self) -> CasResult<Option<Bytes>> {
        Err(self.err.clone())
    }
}

/// Returns a single in-memory chunk.
pub(crate) struct BytesChunkReader {
    data: Option<Bytes>,
}

impl BytesChunkReader {
    pub(crate) fn new(data: Bytes) -> Self {
        BytesChunkReader { data: Some(data) }
    }
}

impl ChunkReader for BytesChunkReader {
    fn read(&mut self) -> CasResult<Option<Bytes>> {
        Ok(self.data.take())
    }
}

/// Adapts an [`io::Read`] to a [`ChunkReader`] producing chunks of at most
/// `chunk_size` bytes.
pub(crate) struct IoChunkReader {
    r: Box<dyn io::Read + Send>,
    chunk_size: usize,
    eof: bool,
}

impl IoChunkReader {
    pub(crate) fn new(r: Box<dyn io::Read + Send>, chunk_size: usize) -> Self {
        IoChunkReader {
            r,
            chunk_size: chunk_size.max(1),
            eof: false,
        }
    }
}

impl ChunkReader for IoChunkReader {
    fn read(&mut self) -> CasResult<Option<Bytes>> {
        if self.eof {
            return Ok(None);
        }
        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            match self.r.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(None);
                }
                Ok(n) => {
                    chunk.truncate(n);
                    return Ok(Some(Bytes::from(chunk)));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(cas_error_from_io(e)),
            }
        }
    }
}

/// Skips the first `remaining` bytes of the underlying stream.
pub(crate) struct SkippingChunkReader {
    r: Box<dyn ChunkReader>,
    remaining: u64,
}

impl SkippingChunkReader {
    pub(crate) fn new(r: Box<dyn ChunkReader>, skip: u64) -> Self {
        SkippingChunkReader { r, remaining: skip }
    }
}

impl ChunkReader for SkippingChunkReader {
    fn read(&mut self) -> CasResult<Option<Bytes>> {
        while self.remaining > 0 {
            let Some(mut chunk) = self.r.read()? else {
                return Ok(None);
            };
            let len = chunk.len() as u64;
            if len <= self.remaining {
                self.remaining -= len;
            } else {
                let tail = chunk.split_off(self.remaining as usize);
                self.remaining = 0;
                return Ok(Some(tail));
            }
        }
        self.r.read()
    }
}

/// Enforces a [`ChunkPolicy`] on an arbitrary reader: empty chunks are
/// dropped, small chunks are coalesced until the minimum size is reached
/// (except at the end of the stream) and large chunks are split, with the
/// remainder returned by the next call.
pub struct NormalizingChunkReader {
    r: Box<dyn ChunkReader>,
    minimum_size_bytes: usize,
    maximum_size_bytes: usize,
    last_chunk: Bytes,
    last_result: Option<CasResult<()>>,
}

impl NormalizingChunkReader {
    pub fn new(r: Box<dyn ChunkReader>, policy: ChunkPolicy) -> Self {
        NormalizingChunkReader {
            r,
            minimum_size_bytes: policy.minimum_size_bytes.max(1),
            maximum_size_bytes: policy.maximum_size_bytes.max(1),
            last_chunk: Bytes::new(),
            last_result: None,
        }
    }

    fn read_next_chunk(&mut self) -> CasResult<Option<Bytes>> {
        if !self.last_chunk.is_empty() {
            return Ok(Some(std::mem::take(&mut self.last_chunk)));
        }
        // The stream already ended or failed.
        match &self.last_result {
            Some(Ok(())) => return Ok(None),
            Some(Err(e)) => return Err(e.clone()),
            None => {}
        }
        match self.r.read() {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.last_result = Some(Ok(()));
                Ok(None)
            }
            Err(e) => {
                self.last_result = Some(Err(e.clone()));
                Err(e)
            }
        }
    }

    fn read_chunk_with_minimum_size(&mut self) -> CasResult<Option<Bytes>> {
        let Some(chunk) = self.read_next_chunk()? else {
            return Ok(None);
        };
        if chunk.len() >= self.minimum_size_bytes {
            return Ok(Some(chunk));
        }

        let mut full = BytesMut::from(&chunk[..]);
        loop {
            match self.read_next_chunk()? {
                // The final chunk may be smaller than the minimum.
                None if !full.is_empty() => return Ok(Some(full.freeze())),
                None => return Ok(None),
                Some(chunk) => {
                    full.extend_from_slice(&chunk);
                    if full.len() >= self.minimum_size_bytes {
                        return Ok(Some(full.freeze()));
                    }
                }
            }
        }
    }
}

impl ChunkReader for NormalizingChunkReader {
    fn read(&mut self) -> CasResult<Option<Bytes>> {
        let Some(mut chunk) = self.read_chunk_with_minimum_size()? else {
            return Ok(None);
        };
        if chunk.len() > self.maximum_size_bytes {
            self.last_chunk = chunk.split_off(self.maximum_size_bytes);
        }
        Ok(Some(chunk))
    }
}

/// Exposes a [`ChunkReader`] as an [`io::Read`]. Errors are passed on as
/// [`io::Error`]s wrapping the original [`CasError`].
pub struct ChunkReaderAsRead {
    r: Box<dyn ChunkReader>,
    current: Bytes,
    eof: bool,
}

impl ChunkReaderAsRead {
    pub fn new(r: Box<dyn ChunkReader>) -> Self {
        ChunkReaderAsRead {
            r,
            current: Bytes::new(),
            eof: false,
        }
    }
}

impl io::Read for ChunkReaderAsRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            if self.eof {
                return Ok(0);
            }
            match self.r.read().map_err(io::Error::other)? {
                Some(chunk) => self.current = chunk,
                None => self.eof = true,
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current.split_to(n));
        Ok(n)
    }
}

/// Recover the [`CasError`] carried by an [`io::Error`], or classify a
/// plain I/O failure.
pub fn cas_error_from_io(e: io::Error) -> CasError {
    if let Some(inner) = e.get_ref().and_then(|inner| inner.downcast_ref::<CasError>()) {
        return inner.clone();
    }
    let code = match e.kind() {
        io::ErrorKind::NotFound => Code::NotFound,
        io::ErrorKind::InvalidInput => Code::InvalidArgument,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => Code::Internal,
        _ => Code::Unavailable,
    };
    CasError::new(code, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Read;

    /// Replays a fixed script of results.
    struct ScriptedChunkReader(VecDeque<CasResult<Option<Bytes>>>);

    impl ScriptedChunkReader {
        fn boxed(chunks: &[&'static [u8]]) -> Box<dyn ChunkReader> {
            let script = chunks
                .iter()
                .map(|c| Ok(Some(Bytes::from_static(c))))
                .collect();
            Box::new(ScriptedChunkReader(script))
        }
    }

    impl ChunkReader for ScriptedChunkReader {
        fn read(&mut self) -> CasResult<Option<Bytes>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    fn drain(r: &mut dyn ChunkReader) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = r.read().unwrap() {
            out.push(chunk.to_vec());
        }
        out
    }

    #[test]
    fn normalizing_drops_empty_chunks() {
        let mut r = NormalizingChunkReader::new(
            ScriptedChunkReader::boxed(&[b"", b"Hello", b"", b"", b"World", b""]),
            ChunkPolicy::at_most(100),
        );
        assert_eq!(drain(&mut r), [b"Hello".to_vec(), b"World".to_vec()]);
        // End-of-stream is sticky.
        assert!(r.read().unwrap().is_none());
    }

    #[test]
    fn normalizing_exact_size() {
        let mut r = NormalizingChunkReader::new(
            ScriptedChunkReader::boxed(&[b"He", b"llo", b"Wo", b"rld!!!", b"x"]),
            ChunkPolicy::exactly(4),
        );
        assert_eq!(
            drain(&mut r),
            [b"Hell".to_vec(), b"oWor".to_vec(), b"ld!!".to_vec(), b"!x".to_vec()]
        );
    }

    #[test]
    fn normalizing_splits_large_chunks() {
        let mut r = NormalizingChunkReader::new(
            ScriptedChunkReader::boxed(&[b"abcdefgh", b"ij"]),
            ChunkPolicy::at_most(3),
        );
        assert_eq!(
            drain(&mut r),
            [b"abc".to_vec(), b"def".to_vec(), b"gh".to_vec(), b"ij".to_vec()]
        );
    }

    #[test]
    fn normalizing_error_is_sticky() {
        let script = VecDeque::from([
            Ok(Some(Bytes::from_static(b"ab"))),
            Err(CasError::internal("Disk on fire")),
            Ok(Some(Bytes::from_static(b"never returned"))),
        ]);
        let mut r = NormalizingChunkReader::new(
            Box::new(ScriptedChunkReader(script)),
            ChunkPolicy::exactly(4),
        );
        assert_eq!(r.read().unwrap_err().message(), "Disk on fire");
        assert_eq!(r.read().unwrap_err().message(), "Disk on fire");
    }

    #[test]
    fn skipping_reader_slices_first_chunk() {
        let mut r = SkippingChunkReader::new(ScriptedChunkReader::boxed(&[b"ab", b"cdef", b"g"]), 3);
        assert_eq!(drain(&mut r), [b"def".to_vec(), b"g".to_vec()]);
    }

    #[test]
    fn chunk_reader_as_read_preserves_errors() {
        let mut r = ChunkReaderAsRead::new(Box::new(ErrorChunkReader::new(CasError::not_found(
            "Object not found",
        ))));
        let mut buf = [0u8; 4];
        let err = r.read(&mut buf).unwrap_err();
        let cas = cas_error_from_io(err);
        assert_eq!(cas.code(), Code::NotFound);
        assert_eq!(cas.message(), "Object not found");
    }

    #[test]
    fn io_chunk_reader_respects_chunk_size() {
        let data: &'static [u8] = b"0123456789";
        let mut r = IoChunkReader::new(Box::new(data), 4);
        assert_eq!(
            drain(&mut r),
            [b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]
        );
    }

    proptest::proptest! {
        #[test]
        fn normalizing_preserves_content(
            chunks in proptest::collection::vec(proptest::collection::vec(0u8..=255, 0..40), 0..20),
            min in 1usize..50,
            extra in 0usize..50,
        ) {
            let max = min + extra;
            let expected: Vec<u8> = chunks.iter().flatten().copied().collect();
            let script = chunks.into_iter().map(|c| Ok(Some(Bytes::from(c)))).collect();
            let mut r = NormalizingChunkReader::new(
                Box::new(ScriptedChunkReader(script)),
                ChunkPolicy { minimum_size_bytes: min, default_size_bytes: min, maximum_size_bytes: max },
            );
            let out = drain(&mut r);
            for (i, chunk) in out.iter().enumerate() {
                proptest::prop_assert!(!chunk.is_empty());
                proptest::prop_assert!(chunk.len() <= max);
                if i + 1 < out.len() {
                    proptest::prop_assert!(chunk.len() >= min);
                }
            }
            proptest::prop_assert_eq!(out.concat(), expected);
        }
    }
}
