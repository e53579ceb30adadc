use super::{compress, BLOCK_LEN, CHUNK_END, CHUNK_START, IV, PARENT, ROOT};

/// A node in the BLAKE3 Merkle tree, captured right before its final
/// compression. Keeping the inputs instead of the output allows the same
/// node to act both as a subtree and as the root of a (sub)tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// The last block of a chunk: 1 KiB of data or less.
    Chunk {
        chaining_value: [u32; 8],
        message: [u32; 16],
        block_len: u32,
        chunk_start: bool,
    },
    /// Two concatenated child chaining values covering more than 1 KiB.
    Parent { message: [u32; 16] },
}

impl Node {
    pub fn chunk(
        chaining_value: [u32; 8],
        message: [u32; 16],
        block_len: u32,
        chunk_start: bool,
    ) -> Self {
        Node::Chunk {
            chaining_value,
            message,
            block_len,
            chunk_start,
        }
    }

    pub fn parent(message: [u32; 16]) -> Self {
        Node::Parent { message }
    }

    /// Inputs of a chunk node.
    ///
    /// # Panics
    ///
    /// Panics when called on a parent node.
    pub fn chunk_data(&self) -> ([u32; 8], [u32; 16], u32, bool) {
        match *self {
            Node::Chunk {
                chaining_value,
                message,
                block_len,
                chunk_start,
            } => (chaining_value, message, block_len, chunk_start),
            Node::Parent { .. } => panic!("Node is not a chunk end node"),
        }
    }

    /// Message of a parent node.
    ///
    /// # Panics
    ///
    /// Panics when called on a chunk node.
    pub fn parent_data(&self) -> [u32; 16] {
        match *self {
            Node::Parent { message } => message,
            Node::Chunk { .. } => panic!("Node is not a parent node"),
        }
    }

    fn compression_input(&self) -> (&[u32; 8], &[u32; 16], u32, u32) {
        match self {
            Node::Chunk {
                chaining_value,
                message,
                block_len,
                chunk_start,
            } => {
                let flags = if *chunk_start {
                    CHUNK_END | CHUNK_START
                } else {
                    CHUNK_END
                };
                (chaining_value, message, *block_len, flags)
            }
            Node::Parent { message } => (&IV, message, BLOCK_LEN as u32, PARENT),
        }
    }

    pub(crate) fn compress(&self, counter: u64, extra_flags: u32) -> [u32; 16] {
        let (cv, m, block_len, flags) = self.compression_input();
        compress(cv, m, counter, block_len, flags | extra_flags)
    }

    /// Chaining value of this node when it is part of a larger tree.
    pub fn chaining_value(&self) -> [u32; 8] {
        super::truncate(self.compress(0, 0))
    }

    /// Treat this node as the root of the tree and produce `output_len`
    /// bytes of extendable output.
    pub fn hash_value(&self, output_len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(output_len);
        let mut counter = 0u64;
        while out.len() < output_len {
            for word in self.compress(counter, ROOT) {
                let remaining = output_len - out.len();
                let bytes = word.to_le_bytes();
                if remaining < 4 {
                    out.extend_from_slice(&bytes[..remaining]);
                    break;
                }
                out.extend_from_slice(&bytes);
            }
            counter += 1;
        }
        out
    }
}
