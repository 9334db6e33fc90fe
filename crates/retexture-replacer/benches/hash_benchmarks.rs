//! Hash Benchmarks
//!
//! Fingerprint throughput per algorithm, for contiguous and strided textures

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use retexture_replacer::hash::{compute_hash, HashRequest, ReplacedTextureHash};
use retexture_replacer::{PackConfig, TextureFormat};

const ALGORITHMS: [ReplacedTextureHash; 3] = [
    ReplacedTextureHash::Quick,
    ReplacedTextureHash::Xxh32,
    ReplacedTextureHash::Xxh64,
];

fn memory(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 131 + 17) as u8).collect()
}

fn request(w: u32, h: u32, buf_w: u32) -> HashRequest {
    HashRequest {
        addr: 0x0880_0000,
        buf_w,
        w,
        h,
        format: TextureFormat::Rgba8888,
        max_seen_v: 0,
    }
}

fn bench_contiguous(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_contiguous_256");
    let mem = memory(256 * 256 * 4);
    group.throughput(Throughput::Bytes(mem.len() as u64));

    for algo in ALGORITHMS {
        let config = PackConfig {
            hash: algo,
            ..PackConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(algo), &algo, |b, _| {
            b.iter(|| compute_hash(&config, &mem, &request(256, 256, 256)));
        });
    }

    group.finish();
}

fn bench_strided(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_strided_480x272");
    let mem = memory(512 * 272 * 4);

    for algo in ALGORITHMS {
        let config = PackConfig {
            hash: algo,
            ..PackConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(algo), &algo, |b, _| {
            b.iter(|| compute_hash(&config, &mem, &request(480, 272, 512)));
        });
    }

    group.finish();
}

fn bench_reduced(c: &mut Criterion) {
    let mem = memory(512 * 512 * 4);
    let config = PackConfig {
        hash: ReplacedTextureHash::Xxh64,
        reduce_hash: true,
        ..PackConfig::default()
    };

    c.bench_function("hash_reduced_512_xxh64", |b| {
        b.iter(|| compute_hash(&config, &mem, &request(512, 512, 512)));
    });
}

criterion_group!(benches, bench_contiguous, bench_strided, bench_reduced);
criterion_main!(benches);
