use std::io::{self, Write};

use bytes::Bytes;
use tcas_core::{CasError, CasResult};
use tcas_digest::{Digest, Hasher};

use crate::buffer::{
    check_maximum_size, clone_via_byte_slice, collect_chunks, read_at_via_chunk_reader,
    validate_reader_offset, write_chunks, BoxBuffer, Buffer, ErrorHandler, ErrorHandlerOutcome,
};
use crate::chunk_reader::{
    ChunkPolicy, ChunkReader, ChunkReaderAsRead, ErrorChunkReader, IoChunkReader,
    NormalizingChunkReader, SkippingChunkReader,
};
use crate::error_handling::CasErrorHandlingBuffer;
use crate::source::Source;
use crate::tee::clone_via_tee;

const READER_CHUNK_SIZE: usize = 64 * 1024;

/// Checks a stream against a digest while passing it through. The chunk
/// that completes the object is only returned once its checksum matches.
pub(crate) struct ValidatingChunkReader {
    r: Box<dyn ChunkReader>,
    digest: Digest,
    source: Source,
    hasher: Option<Hasher>,
    size_bytes: i64,
    err: Option<CasError>,
}

impl ValidatingChunkReader {
    pub(crate) fn new(r: Box<dyn ChunkReader>, digest: Digest, source: Source) -> Self {
        ValidatingChunkReader {
            r,
            hasher: Some(digest.new_hasher()),
            digest,
            source,
            size_bytes: 0,
            err: None,
        }
    }

    fn verify_checksum(&mut self) -> CasResult<()> {
        let Some(hasher) = self.hasher.take() else {
            return Ok(());
        };
        let checksum = hasher.finalize();
        if checksum != self.digest.hash_bytes() {
            return Err(self.source.checksum_mismatch(&self.digest, &checksum));
        }
        Ok(())
    }

    fn read_validated(&mut self) -> CasResult<Option<Bytes>> {
        let expected = self.digest.size_bytes();
        match self.r.read()? {
            Some(chunk) => {
                self.size_bytes += chunk.len() as i64;
                if self.size_bytes > expected {
                    return Err(self.source.size_overflow(&self.digest, self.size_bytes));
                }
                if let Some(hasher) = &mut self.hasher {
                    hasher.update(&chunk);
                }
                if self.size_bytes == expected {
                    self.verify_checksum()?;
                }
                Ok(Some(chunk))
            }
            None => {
                if self.size_bytes != expected {
                    return Err(self.source.size_mismatch(&self.digest, self.size_bytes));
                }
                self.verify_checksum()?;
                Ok(None)
            }
        }
    }
}

impl ChunkReader for ValidatingChunkReader {
    fn read(&mut self) -> CasResult<Option<Bytes>> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        self.read_validated().inspect_err(|err| self.err = Some(err.clone()))
    }
}

/// CAS object backed by a stream that is validated as it is read.
pub struct CasChunkReaderBuffer {
    digest: Digest,
    r: Box<dyn ChunkReader>,
    source: Source,
}

pub fn new_cas_buffer_from_chunk_reader(
    digest: &Digest,
    r: Box<dyn ChunkReader>,
    source: Source,
) -> BoxBuffer {
    Box::new(CasChunkReaderBuffer {
        digest: digest.clone(),
        r,
        source,
    })
}

pub fn new_cas_buffer_from_reader(
    digest: &Digest,
    r: impl io::Read + Send + 'static,
    source: Source,
) -> BoxBuffer {
    new_cas_buffer_from_chunk_reader(
        digest,
        Box::new(IoChunkReader::new(Box::new(r), READER_CHUNK_SIZE)),
        source,
    )
}

impl CasChunkReaderBuffer {
    fn into_validating_reader(self) -> Box<dyn ChunkReader> {
        Box::new(ValidatingChunkReader::new(self.r, self.digest, self.source))
    }
}

impl Buffer for CasChunkReaderBuffer {
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
            Box::new(SkippingChunkReader::new(self.r, offset as u64)),
            policy,
        ))
    }

    fn apply_error_handler(self: Box<Self>, handler: Box<dyn ErrorHandler>) -> ErrorHandlerOutcome {
        let digest = self.digest.clone();
        let source = self.source.clone();
        ErrorHandlerOutcome::Finished(CasErrorHandlingBuffer::boxed(self, handler, digest, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tcas_core::Code;

    const HELLO_MD5: &str = "8b1a9953c4611296a827abf8c47804d7";

    /// Produces the given chunks, then fails or ends.
    struct ScriptedChunkReader {
        chunks: Vec<Bytes>,
        tail: Option<CasError>,
    }

    impl ChunkReader for ScriptedChunkReader {
        fn read(&mut self) -> CasResult<Option<Bytes>> {
            if !self.chunks.is_empty() {
                return Ok(Some(self.chunks.remove(0)));
            }
            match &self.tail {
                Some(err) => Err(err.clone()),
                None => Ok(None),
            }
        }
    }

    fn scripted(chunks: &[&'static [u8]], tail: Option<CasError>) -> Box<dyn ChunkReader> {
        Box::new(ScriptedChunkReader {
            chunks: chunks.iter().map(|c| Bytes::from_static(c)).collect(),
            tail,
        })
    }

    #[test]
    fn to_byte_slice_joins_chunks() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 5);
        let b = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"He", b"llo"], None),
            Source::Irreparable,
        );
        assert_eq!(&b.to_byte_slice(5).unwrap()[..], b"Hello");
    }

    #[test]
    fn last_chunk_withheld_on_checksum_mismatch() {
        let digest = Digest::must_new("ubuntu1804", "d41d8cd98f00b204e9800998ecf8427e", 5);
        let mut r = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"He", b"llo"], None),
            Source::Irreparable,
        )
        .to_chunk_reader(0, ChunkPolicy::dont_care());
        assert_eq!(&r.read().unwrap().unwrap()[..], b"He");
        let err = r.read().unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(
            err.message(),
            "Buffer has checksum 8b1a9953c4611296a827abf8c47804d7, while d41d8cd98f00b204e9800998ecf8427e was expected"
        );
        // Sticky.
        assert_eq!(r.read().unwrap_err(), err);
    }

    #[test]
    fn stream_too_long() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 5);
        let b = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"Hel", b"lo!"], None),
            Source::UserProvided,
        );
        let err = b.to_byte_slice(100).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(
            err.message(),
            "Buffer is at least 6 bytes in size, while 5 bytes were expected"
        );
    }

    #[test]
    fn stream_too_short() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 6);
        let b = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"Hello"], None),
            Source::Irreparable,
        );
        let err = b.to_byte_slice(100).unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(
            err.message(),
            "Buffer is 5 bytes in size, while 6 bytes were expected"
        );
    }

    #[test]
    fn io_errors_propagate() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 5);
        let b = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"He"], Some(CasError::unavailable("Disk on fire"))),
            Source::Irreparable,
        );
        assert_eq!(
            b.to_byte_slice(5),
            Err(CasError::unavailable("Disk on fire"))
        );
    }

    #[test]
    fn from_reader_validates() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 5);
        let mut out = String::new();
        new_cas_buffer_from_reader(&digest, io::Cursor::new(b"Hello".to_vec()), Source::Irreparable)
            .to_reader()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "Hello");

        let mut r = new_cas_buffer_from_reader(
            &digest,
            io::Cursor::new(b"Hellp".to_vec()),
            Source::Irreparable,
        )
        .to_reader();
        assert!(r.read_to_end(&mut Vec::new()).is_err());
    }

    #[test]
    fn read_at_returns_validated_range() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 5);
        let b = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"He", b"l", b"lo"], None),
            Source::Irreparable,
        );
        let mut buf = [0u8; 3];
        assert_eq!(b.read_at(&mut buf, 1).unwrap(), 3);
        assert_eq!(&buf, b"ell");
    }

    #[test]
    fn clone_copy_materializes_once() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 5);
        let b = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"Hello"], None),
            Source::Irreparable,
        );
        let (a, b) = b.clone_copy(10);
        assert_eq!(&a.to_byte_slice(10).unwrap()[..], b"Hello");
        assert_eq!(&b.to_byte_slice(10).unwrap()[..], b"Hello");

        let b = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"Hello"], None),
            Source::Irreparable,
        );
        let (a, b) = b.clone_copy(4);
        assert_eq!(a.size_bytes().unwrap_err().code(), Code::InvalidArgument);
        assert_eq!(b.to_byte_slice(10).unwrap_err().code(), Code::InvalidArgument);
    }

    #[test]
    fn clone_stream_reads_lazily() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 5);
        let b = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"He", b"llo"], None),
            Source::Irreparable,
        );
        let (a, b) = b.clone_stream();
        assert_eq!(a.size_bytes().unwrap(), 5);

        let mut ra = a.to_chunk_reader(0, ChunkPolicy::dont_care());
        let mut rb = b.to_chunk_reader(0, ChunkPolicy::dont_care());
        assert_eq!(&ra.read().unwrap().unwrap()[..], b"He");
        assert_eq!(&rb.read().unwrap().unwrap()[..], b"He");
        assert_eq!(&rb.read().unwrap().unwrap()[..], b"llo");
        assert!(rb.read().unwrap().is_none());
        assert_eq!(&ra.read().unwrap().unwrap()[..], b"llo");
        assert!(ra.read().unwrap().is_none());
    }

    #[test]
    fn clone_stream_shares_validation_failures() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 5);
        let b = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"He", b"llp"], None),
            Source::UserProvided,
        );
        let (a, b) = b.clone_stream();
        let expected = "Buffer has checksum ";
        let err = a.to_byte_slice(10).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(err.message().starts_with(expected), "{err}");
        assert_eq!(b.to_byte_slice(10).unwrap_err(), err);
    }

    #[test]
    fn offset_chunk_reader() {
        let digest = Digest::must_new("ubuntu1804", HELLO_MD5, 5);
        let mut r = new_cas_buffer_from_chunk_reader(
            &digest,
            scripted(&[b"Hel", b"lo"], None),
            Source::Irreparable,
        )
        .to_chunk_reader(2, ChunkPolicy::exactly(2));
        assert_eq!(&r.read().unwrap().unwrap()[..], b"ll");
        assert_eq!(&r.read().unwrap().unwrap()[..], b"o");
        assert!(r.read().unwrap().is_none());
    }
}
