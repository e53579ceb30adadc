//! One pass over a stream, shared by the two halves of a stream clone.
//!
//! Chunks are pulled from the source on demand by whichever reader gets
//! ahead, and kept only until the other reader has consumed them too.
//! Memory use is therefore bounded by the distance between the readers,
//! not by the size of the object.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tcas_core::CasResult;
use tcas_digest::Digest;

use crate::buffer::BoxBuffer;
use crate::cas_chunk_reader::new_cas_buffer_from_chunk_reader;
use crate::chunk_reader::ChunkReader;
use crate::source::Source;

struct TeeState {
    source: Box<dyn ChunkReader>,
    /// The most recent chunks read from `source` that a live reader has
    /// not consumed yet.
    buffered: VecDeque<Bytes>,
    /// Number of chunks read from `source` so far.
    chunks_read: usize,
    /// Index of the next chunk for each reader.
    positions: [usize; 2],
    alive: [bool; 2],
    /// End of stream or the sticky error that ended it.
    end: Option<CasResult<()>>,
}

impl TeeState {
    fn read(&mut self, side: usize) -> CasResult<Option<Bytes>> {
        let position = self.positions[side];
        let chunk = if position < self.chunks_read {
            let first = self.chunks_read - self.buffered.len();
            self.buffered[position - first].clone()
        } else {
            if let Some(end) = &self.end {
                return end.clone().map(|()| None);
            }
            match self.source.read() {
                Ok(Some(chunk)) => {
                    self.chunks_read += 1;
                    self.buffered.push_back(chunk.clone());
                    chunk
                }
                Ok(None) => {
                    self.end = Some(Ok(()));
                    return Ok(None);
                }
                Err(err) => {
                    self.end = Some(Err(err.clone()));
                    return Err(err);
                }
            }
        };
        self.positions[side] += 1;
        self.trim();
        Ok(Some(chunk))
    }

    /// Drop chunks that every live reader has moved past.
    fn trim(&mut self) {
        let keep_from = (0..2)
            .filter(|&side| self.alive[side])
            .map(|side| self.positions[side])
            .min()
            .unwrap_or(self.chunks_read);
        while self.chunks_read - self.buffered.len() < keep_from {
            self.buffered.pop_front();
        }
    }
}

pub(crate) struct TeeChunkReader {
    state: Arc<Mutex<TeeState>>,
    side: usize,
}

fn lock(state: &Mutex<TeeState>) -> MutexGuard<'_, TeeState> {
    // A panicking reader cannot leave the queue half updated.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChunkReader for TeeChunkReader {
    fn read(&mut self) -> CasResult<Option<Bytes>> {
        lock(&self.state).read(self.side)
    }
}

impl Drop for TeeChunkReader {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.alive[self.side] = false;
        state.trim();
    }
}

pub(crate) fn tee(source: Box<dyn ChunkReader>) -> (TeeChunkReader, TeeChunkReader) {
    let state = Arc::new(Mutex::new(TeeState {
        source,
        buffered: VecDeque::new(),
        chunks_read: 0,
        positions: [0, 0],
        alive: [true, true],
        end: None,
    }));
    (
        TeeChunkReader {
            state: state.clone(),
            side: 0,
        },
        TeeChunkReader { state, side: 1 },
    )
}

/// Clone a buffer that can only be read once, given its validating
/// reader. Neither half touches the source until it is read.
pub(crate) fn clone_via_tee(digest: &Digest, r: Box<dyn ChunkReader>) -> (BoxBuffer, BoxBuffer) {
    let (a, b) = tee(r);
    (
        new_cas_buffer_from_chunk_reader(digest, Box::new(a), Source::Irreparable),
        new_cas_buffer_from_chunk_reader(digest, Box::new(b), Source::Irreparable),
    )
}
