//! BLAKE3ZCC manifests: the serialized Merkle tree nodes of every block of
//! a decomposed blob.
//!
//! A manifest is a sequence of 64 byte parent node entries, one per block.
//! When the last block holds between 1 and 1024 bytes it is a single chunk,
//! and its entry is a 97 byte chunk node instead:
//!
//! ```text
//! parent: message (16 x u32 LE)
//! chunk:  chaining value (8 x u32 LE) | message (16 x u32 LE) | flags byte
//! ```
//!
//! The flags byte holds the chunk's final block length in its low seven bits
//! and the chunk-start flag in bit 7. Hashing a manifest with
//! [`ManifestHasher`] yields the hash of the original blob, which is what
//! allows a blob digest to vouch for the digests of its blocks.

use crate::blake3zcc::{self, ChainingValueStack, ChunkParser, Node};
use crate::digest::{Digest, HashAlgorithm};

/// Size of a serialized chunk node.
pub const CHUNK_NODE_SIZE_BYTES: usize = 97;
/// Size of a serialized parent node.
pub const PARENT_NODE_SIZE_BYTES: usize = 64;

const CHUNK_START_BIT: u8 = 0x80;

/// Number of `block_size` blocks needed to hold `blob_size` bytes.
/// Computed unsigned, so that sizes close to `i64::MAX` do not overflow.
pub fn block_count(blob_size: i64, block_size: i64) -> i64 {
    let (blob, block) = (blob_size as u64, block_size as u64);
    ((blob + block - 1) / block) as i64
}

/// Size of the manifest of a `blob_size` byte blob split into `block_size`
/// byte blocks.
pub fn manifest_size_bytes(blob_size: i64, block_size: i64) -> i64 {
    let mut size = block_count(blob_size, block_size) * PARENT_NODE_SIZE_BYTES as i64;
    let last = blob_size % block_size;
    if last > 0 && last <= blake3zcc::CHUNK_LEN as i64 {
        size += (CHUNK_NODE_SIZE_BYTES - PARENT_NODE_SIZE_BYTES) as i64;
    }
    size
}

/// Whether a manifest can be `size_bytes` in size: one or more parent
/// entries, or any number of them followed by a single chunk entry.
pub fn is_valid_manifest_size(size_bytes: i64) -> bool {
    let parent = PARENT_NODE_SIZE_BYTES as i64;
    let chunk = CHUNK_NODE_SIZE_BYTES as i64;
    size_bytes > 0
        && (size_bytes % parent == 0 || (size_bytes >= chunk && (size_bytes - chunk) % parent == 0))
}

fn append_chunk_node(node: &Node, out: &mut Vec<u8>) {
    let (cv, m, block_len, chunk_start) = node.chunk_data();
    out.extend(cv.iter().flat_map(|w| w.to_le_bytes()));
    out.extend(m.iter().flat_map(|w| w.to_le_bytes()));
    let mut flags = (block_len as u8) & !CHUNK_START_BIT;
    if chunk_start {
        flags |= CHUNK_START_BIT;
    }
    out.push(flags);
}

fn append_parent_node(node: &Node, out: &mut Vec<u8>) {
    out.extend(node.parent_data().iter().flat_map(|w| w.to_le_bytes()));
}

fn chunk_node_from_entry(entry: &[u8]) -> Node {
    let cv = blake3zcc::words_from_le_bytes::<8>(&entry[..32]);
    let m = blake3zcc::words_from_le_bytes::<16>(&entry[32..96]);
    let flags = entry[96];
    Node::chunk(
        cv,
        m,
        u32::from(flags & !CHUNK_START_BIT),
        flags & CHUNK_START_BIT != 0,
    )
}

fn parent_node_from_entry(entry: &[u8]) -> Node {
    Node::parent(blake3zcc::words_from_le_bytes::<16>(
        &entry[..PARENT_NODE_SIZE_BYTES],
    ))
}

/// Access to the entries of a manifest, and construction of new manifests.
pub trait ManifestParser: Send + Sync {
    /// Digest of the block containing byte `offset` of the blob, along with
    /// the offset at which that block starts.
    ///
    /// # Panics
    ///
    /// `manifest` must have been validated against the manifest digest, and
    /// `offset` must lie within the blob.
    fn block_digest(&self, manifest: &[u8], offset: i64) -> (Digest, i64);

    /// Append the entry for `block` to `manifest`, returning the digest of
    /// the block.
    fn append_block_digest(&self, manifest: &mut Vec<u8>, block: &[u8]) -> Digest;
}

/// [`ManifestParser`] for BLAKE3ZCC manifests.
#[derive(Debug, Clone)]
pub struct Blake3ZccManifestParser {
    instance: String,
    blob_size: i64,
    block_size: i64,
    hash_len: usize,
}

impl Blake3ZccManifestParser {
    pub fn new(instance: &str, blob_size: i64, block_size: i64, hash_len: usize) -> Self {
        Blake3ZccManifestParser {
            instance: instance.to_string(),
            blob_size,
            block_size,
            hash_len,
        }
    }

    fn node_digest(&self, node: &Node, size: i64) -> Digest {
        Digest::from_parts(
            HashAlgorithm::Blake3Zcc,
            &hex::encode(node.hash_value(self.hash_len)),
            size,
            &self.instance,
        )
    }
}

impl ManifestParser for Blake3ZccManifestParser {
    fn block_digest(&self, manifest: &[u8], offset: i64) -> (Digest, i64) {
        let block = offset / self.block_size;
        let mut size = self.block_size;
        let remainder = self.blob_size % self.block_size;
        if block == block_count(self.blob_size, self.block_size) - 1 && remainder != 0 {
            size = remainder;
        }

        let entry = &manifest[block as usize * PARENT_NODE_SIZE_BYTES..];
        let node = if size <= blake3zcc::CHUNK_LEN as i64 {
            chunk_node_from_entry(entry)
        } else {
            parent_node_from_entry(entry)
        };
        (self.node_digest(&node, size), block * self.block_size)
    }

    fn append_block_digest(&self, manifest: &mut Vec<u8>, block: &[u8]) -> Digest {
        let mut parser = ChunkParser::new();
        parser.update(block);
        let node = parser.root_node();
        if block.len() <= blake3zcc::CHUNK_LEN {
            append_chunk_node(&node, manifest);
        } else {
            append_parent_node(&node, manifest);
        }
        self.node_digest(&node, block.len() as i64)
    }
}

/// Computes the BLAKE3ZCC hash of a blob from its manifest.
///
/// Entries are buffered until it is known whether they are followed by
/// more data. Only the very last entry can be a chunk node, so everything
/// before it is ingested as a parent node.
#[derive(Debug, Clone)]
pub struct ManifestHasher {
    entry: [u8; CHUNK_NODE_SIZE_BYTES],
    entry_len: usize,
    stack: ChainingValueStack,
    output_len: usize,
}

impl ManifestHasher {
    pub fn new(output_len: usize) -> Self {
        ManifestHasher {
            entry: [0; CHUNK_NODE_SIZE_BYTES],
            entry_len: 0,
            stack: ChainingValueStack::new(),
            output_len,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        loop {
            let n = (CHUNK_NODE_SIZE_BYTES - self.entry_len).min(data.len());
            self.entry[self.entry_len..self.entry_len + n].copy_from_slice(&data[..n]);
            self.entry_len += n;
            data = &data[n..];
            if data.is_empty() {
                return;
            }

            self.stack.append_node(&parent_node_from_entry(&self.entry));
            self.entry.copy_within(PARENT_NODE_SIZE_BYTES.., 0);
            self.entry_len = CHUNK_NODE_SIZE_BYTES - PARENT_NODE_SIZE_BYTES;
        }
    }

    /// # Panics
    ///
    /// Panics when the input was not `64 * n` or `64 * n + 97` bytes in
    /// size. Callers validate the manifest size against its digest first.
    pub fn finalize(&self) -> Vec<u8> {
        let last = match self.entry_len {
            CHUNK_NODE_SIZE_BYTES => chunk_node_from_entry(&self.entry),
            PARENT_NODE_SIZE_BYTES => parent_node_from_entry(&self.entry),
            _ => panic!("Manifest has invalid size"),
        };
        self.stack.root_node(&last).hash_value(self.output_len)
    }
}
