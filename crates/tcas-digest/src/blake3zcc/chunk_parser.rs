use super::{
    compress, truncate, words_from_le_bytes, ChainingValueStack, Node, BLOCKS_PER_CHUNK,
    BLOCK_LEN, CHUNK_START, IV,
};

/// Streaming BLAKE3ZCC hasher.
///
/// Input is cut into 64 byte blocks. Sixteen of them form a 1 KiB chunk,
/// whose node is pushed onto a [`ChainingValueStack`]. The last block is
/// always held back, even when full, because only [`ChunkParser::root_node`]
/// knows whether it ends the input.
#[derive(Debug, Clone)]
pub struct ChunkParser {
    block: [u8; BLOCK_LEN],
    block_len: usize,

    blocks_remaining: usize,
    chunk_cv: [u32; 8],
    chunk_start: bool,

    stack: ChainingValueStack,
}

impl Default for ChunkParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkParser {
    /// A parser in its initial state: its root node hashes the empty input.
    pub fn new() -> Self {
        ChunkParser {
            block: [0; BLOCK_LEN],
            block_len: 0,
            blocks_remaining: BLOCKS_PER_CHUNK,
            chunk_cv: IV,
            chunk_start: true,
            stack: ChainingValueStack::new(),
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        loop {
            let n = (BLOCK_LEN - self.block_len).min(data.len());
            self.block[self.block_len..self.block_len + n].copy_from_slice(&data[..n]);
            self.block_len += n;
            data = &data[n..];
            if data.is_empty() {
                return;
            }

            // The current block is full and more data follows.
            let m = words_from_le_bytes::<16>(&self.block);
            self.block_len = 0;
            if self.blocks_remaining == 1 {
                let node = Node::chunk(self.chunk_cv, m, BLOCK_LEN as u32, false);
                self.stack.append_node(&node);

                self.blocks_remaining = BLOCKS_PER_CHUNK;
                self.chunk_cv = IV;
                self.chunk_start = true;
            } else {
                self.blocks_remaining -= 1;
                let flags = if self.chunk_start { CHUNK_START } else { 0 };
                self.chunk_cv = truncate(compress(&self.chunk_cv, &m, 0, BLOCK_LEN as u32, flags));
                self.chunk_start = false;
            }
        }
    }

    /// Root node of the tree for all data written so far.
    pub fn root_node(&self) -> Node {
        let mut block = [0u8; BLOCK_LEN];
        block[..self.block_len].copy_from_slice(&self.block[..self.block_len]);
        let m = words_from_le_bytes::<16>(&block);
        let last = Node::chunk(self.chunk_cv, m, self.block_len as u32, self.chunk_start);
        self.stack.root_node(&last)
    }
}

impl std::io::Write for ChunkParser {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
