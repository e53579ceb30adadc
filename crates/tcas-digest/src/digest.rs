use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tcas_core::proto;
use tcas_core::{CasError, CasResult};

use crate::hasher::{Generator, Hasher};
use crate::manifest::{
    is_valid_manifest_size, manifest_size_bytes, Blake3ZccManifestParser, ManifestParser,
};

const BLAKE3ZCC_PREFIX: &str = "B3Z:";
const BLAKE3ZCC_MANIFEST_PREFIX: &str = "B3ZM:";

/// Hashing algorithm of a digest, derived from its hash string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    /// BLAKE3 with the chunk counter fixed to zero.
    Blake3Zcc,
    /// BLAKE3ZCC over a sequence of serialized Merkle tree nodes.
    Blake3ZccManifest,
}

impl HashAlgorithm {
    /// Prefix carried by hash strings of this algorithm.
    pub fn prefix(self) -> &'static str {
        match self {
            HashAlgorithm::Blake3Zcc => BLAKE3ZCC_PREFIX,
            HashAlgorithm::Blake3ZccManifest => BLAKE3ZCC_MANIFEST_PREFIX,
            _ => "",
        }
    }

    fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(HashAlgorithm::Md5),
            40 => Some(HashAlgorithm::Sha1),
            64 => Some(HashAlgorithm::Sha256),
            96 => Some(HashAlgorithm::Sha384),
            128 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// Format of the keys returned by [`Digest::key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// `<hash>-<size>`: objects are shared between instances.
    WithoutInstance,
    /// `<hash>-<size>-<instance>`
    WithInstance,
}

/// Identification of an object in the CAS: hash, size and instance name.
///
/// A `Digest` is never degenerate: the hash has been validated and the
/// size is non-negative. The canonical string representation is built
/// once on construction, and is what equality, ordering and hashing
/// operate on. Cloning is cheap.
#[derive(Clone)]
pub struct Digest {
    value: Arc<str>,
    hash_end: usize,
    size_end: usize,
    size_bytes: i64,
    algorithm: HashAlgorithm,
}

fn is_lower_hex(c: char) -> bool {
    c.is_ascii_digit() || ('a'..='f').contains(&c)
}

fn validate_hex(hash: &str) -> CasResult<()> {
    match hash.chars().find(|c| !is_lower_hex(*c)) {
        Some(c) => Err(CasError::invalid_argument(format!(
            "Non-hexadecimal character in digest hash: U+{:04X} '{c}'",
            c as u32
        ))),
        None => Ok(()),
    }
}

impl Digest {
    /// Construct a digest from an instance name, a (possibly prefixed)
    /// hash string and an object size.
    pub fn new(instance: &str, hash: &str, size_bytes: i64) -> CasResult<Self> {
        if size_bytes < 0 {
            return Err(CasError::invalid_argument(format!(
                "Invalid digest size: {size_bytes} bytes"
            )));
        }

        let (algorithm, bare) = if let Some(h) = hash.strip_prefix(BLAKE3ZCC_PREFIX) {
            (HashAlgorithm::Blake3Zcc, h)
        } else if let Some(h) = hash.strip_prefix(BLAKE3ZCC_MANIFEST_PREFIX) {
            (HashAlgorithm::Blake3ZccManifest, h)
        } else {
            let algorithm = HashAlgorithm::from_hex_len(hash.len()).ok_or_else(|| {
                CasError::invalid_argument(format!(
                    "Unknown digest hash length: {} characters",
                    hash.len()
                ))
            })?;
            (algorithm, hash)
        };

        if matches!(
            algorithm,
            HashAlgorithm::Blake3Zcc | HashAlgorithm::Blake3ZccManifest
        ) && (bare.is_empty() || bare.len() % 2 != 0)
        {
            return Err(CasError::invalid_argument(format!(
                "Invalid BLAKE3ZCC digest hash length: {} characters",
                bare.len()
            )));
        }
        validate_hex(bare)?;

        // Manifests consist of whole entries, so other sizes could never
        // be validated against their hash.
        if algorithm == HashAlgorithm::Blake3ZccManifest && !is_valid_manifest_size(size_bytes) {
            return Err(CasError::invalid_argument(format!(
                "Invalid BLAKE3ZCC manifest size: {size_bytes} bytes"
            )));
        }

        Ok(Self::from_parts(algorithm, bare, size_bytes, instance))
    }

    /// Like [`Digest::new`], panicking on invalid input. Meant for tests
    /// and constants.
    pub fn must_new(instance: &str, hash: &str, size_bytes: i64) -> Self {
        match Self::new(instance, hash, size_bytes) {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        }
    }

    /// Assemble a digest from components that are known to be valid.
    pub(crate) fn from_parts(
        algorithm: HashAlgorithm,
        hash_hex: &str,
        size_bytes: i64,
        instance: &str,
    ) -> Self {
        let prefix = algorithm.prefix();
        let value = format!("{prefix}{hash_hex}-{size_bytes}-{instance}");
        let hash_end = prefix.len() + hash_hex.len();
        let size_end = value[hash_end + 1..]
            .find('-')
            .map_or(value.len(), |i| hash_end + 1 + i);
        Digest {
            value: value.into(),
            hash_end,
            size_end,
            size_bytes,
            algorithm,
        }
    }

    /// Construct a digest from a wire message. The populated hash field
    /// determines the algorithm.
    pub fn from_partial_digest(
        instance: &str,
        partial: Option<&proto::Digest>,
    ) -> CasResult<Self> {
        let partial = partial.ok_or_else(|| CasError::invalid_argument("No digest provided"))?;
        match &partial.hash {
            Some(proto::digest::Hash::Blake3zcc(h)) => Self::new(
                instance,
                &format!("{BLAKE3ZCC_PREFIX}{}", hex::encode(h)),
                partial.size_bytes,
            ),
            Some(proto::digest::Hash::Blake3zccManifest(h)) => Self::new(
                instance,
                &format!("{BLAKE3ZCC_MANIFEST_PREFIX}{}", hex::encode(h)),
                partial.size_bytes,
            ),
            Some(proto::digest::Hash::Other(h)) => {
                if h.starts_with(BLAKE3ZCC_PREFIX) || h.starts_with(BLAKE3ZCC_MANIFEST_PREFIX) {
                    return Err(CasError::invalid_argument(
                        "BLAKE3ZCC hashes must use their dedicated digest fields",
                    ));
                }
                Self::new(instance, h, partial.size_bytes)
            }
            None => Err(CasError::invalid_argument("No digest hash provided")),
        }
    }

    /// Parse a ByteStream resource name of the form
    /// `[<instance>/]blobs/<hash>/<size>`, as used by Bazel.
    pub fn from_bytestream_path(path: &str) -> CasResult<Self> {
        let invalid = || CasError::invalid_argument("Invalid resource naming scheme");
        let fields: Vec<&str> = path.split('/').filter(|f| !f.is_empty()).collect();
        let l = fields.len();
        if (l != 3 && l != 4) || fields[l - 3] != "blobs" {
            return Err(invalid());
        }
        let size: i64 = fields[l - 1].parse().map_err(|_| invalid())?;
        let instance = if l == 4 { fields[0] } else { "" };
        Self::new(instance, fields[l - 2], size)
    }

    /// Inverse of [`Digest::from_bytestream_path`].
    pub fn bytestream_path(&self) -> String {
        let (instance, hash, size) = (self.instance(), self.hash_string(), self.size_bytes);
        if instance.is_empty() {
            format!("blobs/{hash}/{size}")
        } else {
            format!("{instance}/blobs/{hash}/{size}")
        }
    }

    /// Construct a digest for an object referenced by this one, in the
    /// same instance.
    pub fn new_derived_digest(&self, partial: Option<&proto::Digest>) -> CasResult<Self> {
        Self::from_partial_digest(self.instance(), partial)
    }

    /// Encode the digest as a wire message. The instance name is not part
    /// of it.
    pub fn partial_digest(&self) -> proto::Digest {
        let hash = match self.algorithm {
            HashAlgorithm::Blake3Zcc => proto::digest::Hash::Blake3zcc(self.hash_bytes()),
            HashAlgorithm::Blake3ZccManifest => {
                proto::digest::Hash::Blake3zccManifest(self.hash_bytes())
            }
            _ => proto::digest::Hash::Other(self.hash_hex().to_string()),
        };
        proto::Digest {
            size_bytes: self.size_bytes,
            hash: Some(hash),
        }
    }

    pub fn instance(&self) -> &str {
        self.value.get(self.size_end + 1..).unwrap_or("")
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash including its algorithm prefix, e.g. `B3Z:af13...`.
    pub fn hash_string(&self) -> &str {
        &self.value[..self.hash_end]
    }

    /// Hash without algorithm prefix.
    pub fn hash_hex(&self) -> &str {
        &self.value[self.algorithm.prefix().len()..self.hash_end]
    }

    pub fn hash_bytes(&self) -> Vec<u8> {
        match hex::decode(self.hash_hex()) {
            Ok(bytes) => bytes,
            Err(_) => unreachable!("digest hash was validated on construction"),
        }
    }

    /// Length of the hash in bytes.
    pub fn hash_len(&self) -> usize {
        self.hash_hex().len() / 2
    }

    pub fn size_bytes(&self) -> i64 {
        self.size_bytes
    }

    pub fn key(&self, format: KeyFormat) -> &str {
        match format {
            KeyFormat::WithoutInstance => &self.value[..self.size_end],
            KeyFormat::WithInstance => &self.value,
        }
    }

    /// Digest of the manifest that describes this object as a sequence of
    /// `block_size` sized blocks, along with a parser for that manifest.
    ///
    /// Only BLAKE3ZCC digests can be decomposed, and only when the object
    /// spans more than a single block.
    pub fn to_manifest(&self, block_size: i64) -> Option<(Digest, Arc<dyn ManifestParser>)> {
        if self.algorithm != HashAlgorithm::Blake3Zcc || self.size_bytes <= block_size {
            return None;
        }
        let manifest_digest = Digest::from_parts(
            HashAlgorithm::Blake3ZccManifest,
            self.hash_hex(),
            manifest_size_bytes(self.size_bytes, block_size),
            self.instance(),
        );
        let parser = Blake3ZccManifestParser::new(
            self.instance(),
            self.size_bytes,
            block_size,
            self.hash_len(),
        );
        Some((manifest_digest, Arc::new(parser)))
    }

    /// Hasher for the algorithm of this digest, producing output of the
    /// same length as this digest's hash.
    pub fn new_hasher(&self) -> Hasher {
        Hasher::new(self.algorithm, self.hash_len())
    }

    /// Generator for digests of new objects, using the same instance name
    /// and algorithm as this digest.
    pub fn new_generator(&self) -> Generator {
        Generator::new(self.instance(), self.algorithm, self.new_hasher())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.value)
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Digest {}

impl PartialOrd for Digest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Digest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl Hash for Digest {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}
