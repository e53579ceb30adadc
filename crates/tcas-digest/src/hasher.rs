use md5::Md5;
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha384, Sha512};

use crate::blake3zcc::ChunkParser;
use crate::digest::{Digest, HashAlgorithm};
use crate::manifest::ManifestHasher;

/// Incremental hasher for any of the supported digest algorithms.
#[derive(Debug, Clone)]
pub enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Blake3Zcc {
        parser: ChunkParser,
        output_len: usize,
    },
    Blake3ZccManifest(ManifestHasher),
}

impl Hasher {
    /// `output_len` only applies to the BLAKE3ZCC algorithms, whose output
    /// length is variable.
    pub fn new(algorithm: HashAlgorithm, output_len: usize) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            HashAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => Hasher::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            HashAlgorithm::Blake3Zcc => Hasher::Blake3Zcc {
                parser: ChunkParser::new(),
                output_len,
            },
            HashAlgorithm::Blake3ZccManifest => {
                Hasher::Blake3ZccManifest(ManifestHasher::new(output_len))
            }
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Blake3Zcc { parser, .. } => parser.update(data),
            Hasher::Blake3ZccManifest(h) => h.update(data),
        }
    }

    /// # Panics
    ///
    /// A manifest hasher panics when its input is not a sequence of
    /// manifest entries. See [`ManifestHasher::finalize`].
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Md5(h) => h.finalize().to_vec(),
            Hasher::Sha1(h) => h.finalize().to_vec(),
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Sha384(h) => h.finalize().to_vec(),
            Hasher::Sha512(h) => h.finalize().to_vec(),
            Hasher::Blake3Zcc { parser, output_len } => {
                parser.root_node().hash_value(output_len)
            }
            Hasher::Blake3ZccManifest(h) => h.finalize(),
        }
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Computes the digest of newly created data, in the instance and with the
/// algorithm of the digest it was created from.
#[derive(Debug, Clone)]
pub struct Generator {
    instance: String,
    algorithm: HashAlgorithm,
    hasher: Hasher,
    size_bytes: i64,
}

impl Generator {
    pub(crate) fn new(instance: &str, algorithm: HashAlgorithm, hasher: Hasher) -> Self {
        Generator {
            instance: instance.to_string(),
            algorithm,
            hasher,
            size_bytes: 0,
        }
    }

    /// Generator for objects that have no related digest yet. BLAKE3ZCC
    /// hashes are 256 bits, like regular BLAKE3.
    pub fn for_algorithm(instance: &str, algorithm: HashAlgorithm) -> Self {
        Generator::new(instance, algorithm, Hasher::new(algorithm, 32))
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.size_bytes += data.len() as i64;
    }

    pub fn sum(self) -> Digest {
        Digest::from_parts(
            self.algorithm,
            &hex::encode(self.hasher.finalize()),
            self.size_bytes,
            &self.instance,
        )
    }
}

impl std::io::Write for Generator {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
