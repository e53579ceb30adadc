use tcas_digest::blake3zcc;
use tcas_digest::{Blake3ZccManifestParser, ManifestHasher, ManifestParser};

fn make_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

#[divan::bench(args = [1024, 65536, 1048576, 10485760])]
fn blake3zcc_hash(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| blake3zcc::hash(divan::black_box(&data), 32));
}

#[divan::bench(args = [1024, 65536, 1048576, 10485760])]
fn blake3_reference(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| blake3::hash(divan::black_box(&data)));
}

#[divan::bench(args = [1048576, 10485760])]
fn build_manifest(bencher: divan::Bencher, size: usize) {
    let block_size = 64 * 1024;
    let data = make_data(size);
    let parser = Blake3ZccManifestParser::new("bench", size as i64, block_size as i64, 32);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut manifest = Vec::new();
            for block in divan::black_box(&data).chunks(block_size) {
                parser.append_block_digest(&mut manifest, block);
            }
            manifest
        });
}

#[divan::bench]
fn hash_manifest(bencher: divan::Bencher) {
    // 2 MiB worth of parent entries, the default manifest limit.
    let manifest = vec![0x5a; 2 * 1024 * 1024];
    bencher
        .counter(divan::counter::BytesCount::new(manifest.len()))
        .bench(|| {
            let mut h = ManifestHasher::new(32);
            h.update(divan::black_box(&manifest));
            h.finalize()
        });
}

fn main() {
    divan::main();
}
