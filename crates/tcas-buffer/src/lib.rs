//! tcas-buffer: deferred, digest-validated object contents
//!
//! # Overview
//! - `buffer`: the `Buffer` trait and error handler hooks
//! - `chunk_reader`: forward-only chunked streams and chunk size policies
//! - `cas_byte_slice` / `cas_chunk_reader`: objects validated against their digest
//! - `concatenating`: large objects assembled from smaller buffers on demand
//! - `source`: how size and checksum mismatches are reported and repaired

pub mod buffer;
pub mod cas_byte_slice;
pub mod cas_chunk_reader;
pub mod chunk_reader;
pub mod concatenating;
pub mod error_buffer;
mod error_handling;
pub mod source;
mod tee;
pub mod validated_byte_slice;

pub use buffer::{with_error_handler, BoxBuffer, Buffer, ErrorHandler};
pub use cas_byte_slice::new_cas_buffer_from_byte_slice;
pub use cas_chunk_reader::{new_cas_buffer_from_chunk_reader, new_cas_buffer_from_reader};
pub use chunk_reader::{ChunkPolicy, ChunkReader, ChunkReaderAsRead, ErrorChunkReader};
pub use concatenating::{new_cas_concatenating_buffer, SmallBufferFetcher};
pub use error_buffer::new_buffer_from_error;
pub use source::Source;
pub use validated_byte_slice::ValidatedByteSliceBuffer;
