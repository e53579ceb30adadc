//! BLAKE3ZCC: BLAKE3 with the chunk counter fixed to zero
//!
//! Standard BLAKE3 feeds the index of every 1 KiB chunk into the compression
//! function. BLAKE3ZCC keeps it at zero, which makes the chaining value of a
//! subtree independent of where it sits in the blob. Large blobs can then be
//! split into blocks that are hashed, stored and verified on their own, while
//! the hash of the whole blob is still a function of the block nodes alone.
//!
//! For inputs of at most 1 KiB there is only one chunk, so the result is
//! identical to regular BLAKE3.
//!
//! Constants and algorithms follow the BLAKE3 paper:
//! <https://github.com/BLAKE3-team/BLAKE3-specs/raw/master/blake3.pdf>

mod chaining_value_stack;
mod chunk_parser;
mod node;

pub use chaining_value_stack::ChainingValueStack;
pub use chunk_parser::ChunkParser;
pub use node::Node;

/// Size of a single compression function input block.
pub const BLOCK_LEN: usize = 64;
/// Size of a chunk, the leaves of BLAKE3's Merkle tree.
pub const CHUNK_LEN: usize = 1024;

const BLOCKS_PER_CHUNK: usize = CHUNK_LEN / BLOCK_LEN;

// Domain separation flags (table 3).
pub(crate) const CHUNK_START: u32 = 1 << 0;
pub(crate) const CHUNK_END: u32 = 1 << 1;
pub(crate) const PARENT: u32 = 1 << 2;
pub(crate) const ROOT: u32 = 1 << 3;

pub(crate) const IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

const MSG_PERMUTATION: [usize; 16] = [2, 6, 3, 10, 7, 0, 4, 13, 1, 11, 12, 5, 9, 14, 15, 8];

#[inline(always)]
fn g(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize, mx: u32, my: u32) {
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(mx);
    state[d] = (state[d] ^ state[a]).rotate_right(16);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(12);
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(my);
    state[d] = (state[d] ^ state[a]).rotate_right(8);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(7);
}

#[inline(always)]
fn round(state: &mut [u32; 16], m: &[u32; 16]) {
    // Columns
    g(state, 0, 4, 8, 12, m[0], m[1]);
    g(state, 1, 5, 9, 13, m[2], m[3]);
    g(state, 2, 6, 10, 14, m[4], m[5]);
    g(state, 3, 7, 11, 15, m[6], m[7]);
    // Diagonals
    g(state, 0, 5, 10, 15, m[8], m[9]);
    g(state, 1, 6, 11, 12, m[10], m[11]);
    g(state, 2, 7, 8, 13, m[12], m[13]);
    g(state, 3, 4, 9, 14, m[14], m[15]);
}

fn permute(m: &mut [u32; 16]) {
    let mut permuted = [0u32; 16];
    for (i, p) in permuted.iter_mut().enumerate() {
        *p = m[MSG_PERMUTATION[i]];
    }
    *m = permuted;
}

/// The BLAKE3 compression function (pages 4 to 6).
pub(crate) fn compress(
    chaining_value: &[u32; 8],
    message: &[u32; 16],
    counter: u64,
    block_len: u32,
    flags: u32,
) -> [u32; 16] {
    let mut state = [
        chaining_value[0],
        chaining_value[1],
        chaining_value[2],
        chaining_value[3],
        chaining_value[4],
        chaining_value[5],
        chaining_value[6],
        chaining_value[7],
        IV[0],
        IV[1],
        IV[2],
        IV[3],
        counter as u32,
        (counter >> 32) as u32,
        block_len,
        flags,
    ];
    let mut m = *message;

    round(&mut state, &m);
    for _ in 1..7 {
        permute(&mut m);
        round(&mut state, &m);
    }

    for i in 0..8 {
        state[i] ^= state[i + 8];
        state[i + 8] ^= chaining_value[i];
    }
    state
}

/// Truncate compression function output to a 256-bit chaining value.
pub(crate) fn truncate(out: [u32; 16]) -> [u32; 8] {
    let mut cv = [0u32; 8];
    cv.copy_from_slice(&out[..8]);
    cv
}

/// Concatenate two chaining values into a parent node message.
pub(crate) fn concatenate(left: &[u32; 8], right: &[u32; 8]) -> [u32; 16] {
    let mut m = [0u32; 16];
    m[..8].copy_from_slice(left);
    m[8..].copy_from_slice(right);
    m
}

/// Decode little endian words, as BLAKE3 does for message blocks and
/// serialized nodes. `bytes` must hold at least `4 * N` bytes.
pub(crate) fn words_from_le_bytes<const N: usize>(bytes: &[u8]) -> [u32; N] {
    let mut words = [0u32; N];
    for (w, b) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *w = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    }
    words
}

/// Hash `data` with BLAKE3ZCC, producing `output_len` bytes of output.
pub fn hash(data: &[u8], output_len: usize) -> Vec<u8> {
    let mut parser = ChunkParser::new();
    parser.update(data);
    parser.root_node().hash_value(output_len)
}
