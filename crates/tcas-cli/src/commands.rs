//! Command implementations. Each command writes its report to `out`.

use anyhow::{ensure, Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use tcas_blobstore::{BlobAccess, DecomposingBlobAccess, MemoryBlobAccess};
use tcas_buffer::{new_cas_buffer_from_byte_slice, new_cas_buffer_from_reader, Source};
use tcas_core::config::{DecompositionConfig, TcasConfig};
use tcas_digest::{Digest, Generator, HashAlgorithm};

// ── `tcas digest` ─────────────────────────────────────────────────────────────

pub fn digest_file(path: &Path, instance: &str, algorithm: HashAlgorithm) -> Result<Digest> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut generator = Generator::for_algorithm(instance, algorithm);
    io::copy(&mut file, &mut generator).with_context(|| format!("reading {}", path.display()))?;
    Ok(generator.sum())
}

pub fn cmd_digest(
    out: &mut dyn Write,
    path: &Path,
    instance: &str,
    algorithm: HashAlgorithm,
) -> Result<()> {
    let digest = digest_file(path, instance, algorithm)?;
    tracing::debug!(file = %path.display(), %digest, "computed digest");
    writeln!(out, "digest:        {digest}")?;
    writeln!(out, "resource name: {}", digest.bytestream_path())?;
    writeln!(out, "size:          {}", fmt_bytes(digest.size_bytes() as u64))?;
    Ok(())
}

// ── `tcas decompose` ──────────────────────────────────────────────────────────

/// Result of storing a file through [`DecomposingBlobAccess`].
#[derive(Debug)]
pub struct Decomposition {
    pub digest: Digest,
    /// Absent when the file fits in a single block.
    pub manifest: Option<Digest>,
    /// Offset and digest of every block, in blob order.
    pub blocks: Vec<(i64, Digest)>,
}

pub fn decompose_file(
    path: &Path,
    instance: &str,
    config: &DecompositionConfig,
) -> Result<Decomposition> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut generator = Generator::for_algorithm(instance, HashAlgorithm::Blake3Zcc);
    generator.update(&data);
    let digest = generator.sum();

    let memory = MemoryBlobAccess::new();
    let blob_access = DecomposingBlobAccess::from_config(Arc::new(memory.clone()), config)
        .context("creating decomposing blob access")?;
    blob_access
        .put(
            &digest,
            new_cas_buffer_from_byte_slice(&digest, data.clone(), Source::UserProvided),
        )
        .with_context(|| format!("storing {digest}"))?;

    let mut blocks = Vec::new();
    let manifest = match digest.to_manifest(config.block_size_bytes) {
        None => None,
        Some((manifest_digest, parser)) => {
            let manifest = memory
                .get(&manifest_digest)
                .to_byte_slice(usize::MAX)
                .with_context(|| format!("loading manifest {manifest_digest}"))?;
            let mut offset = 0;
            while offset < digest.size_bytes() {
                let (block_digest, block_offset) = parser.block_digest(&manifest, offset);
                offset = block_offset + block_digest.size_bytes();
                blocks.push((block_offset, block_digest));
            }
            Some(manifest_digest)
        }
    };

    let reassembled = blob_access
        .get(&digest)
        .to_byte_slice(data.len())
        .with_context(|| format!("reading back {digest}"))?;
    ensure!(
        reassembled.as_ref() == data.as_slice(),
        "reassembled object differs from {}",
        path.display()
    );

    Ok(Decomposition {
        digest,
        manifest,
        blocks,
    })
}

pub fn cmd_decompose(
    out: &mut dyn Write,
    path: &Path,
    instance: &str,
    config: &DecompositionConfig,
) -> Result<()> {
    let decomposition = decompose_file(path, instance, config)?;
    writeln!(out, "digest:     {}", decomposition.digest)?;
    writeln!(
        out,
        "block size: {}",
        fmt_bytes(config.block_size_bytes as u64)
    )?;
    match &decomposition.manifest {
        None => writeln!(out, "manifest:   none (stored as a single object)")?,
        Some(manifest) => {
            writeln!(out, "manifest:   {manifest}")?;
            writeln!(out)?;
            writeln!(out, "{:>14}  {:>10}  block", "offset", "size")?;
            for (offset, block) in &decomposition.blocks {
                writeln!(
                    out,
                    "{offset:>14}  {:>10}  {}",
                    fmt_bytes(block.size_bytes() as u64),
                    block.hash_string()
                )?;
            }
        }
    }
    Ok(())
}

// ── `tcas verify` ─────────────────────────────────────────────────────────────

pub fn verify_file(path: &Path, resource_name: &str) -> Result<Digest> {
    let digest = Digest::from_bytestream_path(resource_name)
        .with_context(|| format!("parsing resource name {resource_name:?}"))?;
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    new_cas_buffer_from_reader(&digest, file, Source::UserProvided)
        .into_writer(&mut io::sink())
        .with_context(|| format!("{} does not match {digest}", path.display()))?;
    Ok(digest)
}

pub fn cmd_verify(out: &mut dyn Write, path: &Path, resource_name: &str) -> Result<()> {
    let digest = verify_file(path, resource_name)?;
    writeln!(out, "OK  {}  {digest}", path.display())?;
    Ok(())
}

// ── `tcas config show` ────────────────────────────────────────────────────────

pub fn cmd_config_show(out: &mut dyn Write, config: &TcasConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        writeln!(out, "# Configuration from: {}", config_path.display())?;
    } else {
        writeln!(
            out,
            "# Configuration: defaults (no file at {})",
            config_path.display()
        )?;
    }
    writeln!(out)?;
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    write!(out, "{rendered}")?;
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "185f8db32271fe25f561a6fc938b2e264306ec304eda518007d1764826381969";

    fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn identity251(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn small_blocks() -> DecompositionConfig {
        DecompositionConfig {
            block_size_bytes: 8192,
            ..DecompositionConfig::default()
        }
    }

    #[test]
    fn digest_of_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.txt", b"Hello");

        let digest = digest_file(&path, "foo", HashAlgorithm::Sha256).unwrap();
        assert_eq!(digest.hash_string(), HELLO_SHA256);
        assert_eq!(digest.size_bytes(), 5);
        assert_eq!(digest.instance(), "foo");

        let mut out = Vec::new();
        cmd_digest(&mut out, &path, "foo", HashAlgorithm::Sha256).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(&format!("foo/blobs/{HELLO_SHA256}/5")), "{out}");
        assert!(out.contains("5 B"), "{out}");
    }

    #[test]
    fn digest_of_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = digest_file(&dir.path().join("absent"), "", HashAlgorithm::Sha256).unwrap_err();
        assert!(err.to_string().starts_with("opening "), "{err}");
    }

    #[test]
    fn blake3zcc_digest_carries_prefix() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty", b"");
        let digest = digest_file(&path, "", HashAlgorithm::Blake3Zcc).unwrap();
        assert_eq!(
            digest.hash_string(),
            "B3Z:af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn decompose_small_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "small", &identity251(8192));

        let decomposition = decompose_file(&path, "", &small_blocks()).unwrap();
        assert!(decomposition.manifest.is_none());
        assert!(decomposition.blocks.is_empty());

        let mut out = Vec::new();
        cmd_decompose(&mut out, &path, "", &small_blocks()).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("single object"));
    }

    #[test]
    fn decompose_large_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "large", &identity251(16385));

        let decomposition = decompose_file(&path, "", &small_blocks()).unwrap();
        assert_eq!(
            decomposition.digest.hash_string(),
            "B3Z:091108a2b65e2ae62b852eb3b25296badea4202048daf726e9411bfc12840d0b"
        );
        // Two parent entries plus a trailing chunk entry.
        let manifest = decomposition.manifest.unwrap();
        assert_eq!(manifest.hash_algorithm(), HashAlgorithm::Blake3ZccManifest);
        assert_eq!(manifest.size_bytes(), 64 + 64 + 97);

        let layout: Vec<(i64, i64)> = decomposition
            .blocks
            .iter()
            .map(|(offset, block)| (*offset, block.size_bytes()))
            .collect();
        assert_eq!(layout, vec![(0, 8192), (8192, 8192), (16384, 1)]);
        assert_eq!(
            decomposition.blocks[0].1.hash_string(),
            "B3Z:73c932bec255516b229488d6af3d29fc780e186bcae1b48bbbf8120ecd40cc43"
        );
    }

    #[test]
    fn decompose_rejects_bad_block_size() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "large", &identity251(4096));
        let config = DecompositionConfig {
            block_size_bytes: 1000,
            ..DecompositionConfig::default()
        };
        let err = decompose_file(&path, "", &config).unwrap_err();
        assert!(
            err.to_string().contains("creating decomposing blob access"),
            "{err}"
        );
    }

    #[test]
    fn verify_matching_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.txt", b"Hello");

        let mut out = Vec::new();
        cmd_verify(&mut out, &path, &format!("blobs/{HELLO_SHA256}/5")).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("OK  "));
    }

    #[test]
    fn verify_mismatching_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.txt", b"Hellp");
        let err = verify_file(&path, &format!("blobs/{HELLO_SHA256}/5")).unwrap_err();
        assert!(err.to_string().contains("does not match"), "{err}");

        let path = write_file(&dir, "longer.txt", b"Hello!");
        assert!(verify_file(&path, &format!("blobs/{HELLO_SHA256}/5")).is_err());
    }

    #[test]
    fn verify_rejects_bad_resource_name() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.txt", b"Hello");
        let err = verify_file(&path, "not-a-resource-name").unwrap_err();
        assert!(err.to_string().starts_with("parsing resource name"), "{err}");

        let path = write_file(&dir, "partial-manifest", &[0; 100]);
        let err = verify_file(&path, "blobs/B3ZM:00/100").unwrap_err();
        assert!(err.to_string().starts_with("parsing resource name"), "{err}");
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();
        cmd_config_show(&mut out, &TcasConfig::default(), &dir.path().join("tcas.toml")).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("# Configuration: defaults"), "{out}");
        assert!(out.contains("[decomposition]"), "{out}");
        assert!(out.contains("block_size_bytes = 2097152"), "{out}");
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(0), "0 B");
        assert_eq!(fmt_bytes(1023), "1023 B");
        assert_eq!(fmt_bytes(8192), "8.0 KB");
        assert_eq!(fmt_bytes(2 * 1024 * 1024), "2.0 MB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
