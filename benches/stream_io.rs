//! Benchmarks for stream reads and writes

use compound_rs::{Archive, ArchiveConfig, OpenMode};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn archive(cache_blocks: usize) -> Archive {
    Archive::create_in_memory(ArchiveConfig::default().with_cache_blocks(cache_blocks)).unwrap()
}

fn benchmark_sequential_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_write");

    for size in [4 * 1024, 64 * 1024, 1024 * 1024].iter() {
        let data = vec![0x5au8; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let archive = archive(256);
                let mut handle = archive.create_stream("bench/write").unwrap();
                handle.write(black_box(data)).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_sequential_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_read");

    for cache_blocks in [0usize, 512].iter() {
        let archive = archive(*cache_blocks);
        archive
            .write_stream("bench/read", &vec![0xa5u8; 1024 * 1024])
            .unwrap();

        group.throughput(Throughput::Bytes(1024 * 1024));
        group.bench_with_input(
            BenchmarkId::new("cache_blocks", cache_blocks),
            &archive,
            |b, archive| {
                b.iter(|| {
                    let mut handle = archive.open_stream("bench/read", OpenMode::Read).unwrap();
                    black_box(handle.read(1024 * 1024).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn benchmark_small_random_writes(c: &mut Criterion) {
    let archive = archive(256);
    archive.write_stream("bench/random", &vec![0u8; 256 * 1024]).unwrap();
    let mut handle = archive.open_stream("bench/random", OpenMode::Write).unwrap();

    c.bench_function("stream_random_write_64b", |b| {
        let mut offset = 0u64;
        b.iter(|| {
            offset = (offset + 7919) % (256 * 1024 - 64);
            handle.seek(offset).unwrap();
            handle.write(black_box(&[1u8; 64])).unwrap();
        });
    });
}

fn benchmark_prefix_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_prefix");

    for count in [100, 1000, 10000].iter() {
        let archive = archive(0);
        for i in 0..*count {
            archive
                .create_stream(&format!("dir{}/stream{}", i % 10, i))
                .unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(count), &archive, |b, archive| {
            b.iter(|| black_box(archive.list("dir3/").unwrap()));
        });
    }

    group.finish();
}

fn benchmark_flush(c: &mut Criterion) {
    let archive = archive(256);
    for i in 0..1000 {
        archive.write_stream(&format!("s/{}", i), b"payload").unwrap();
    }

    c.bench_function("flush_1000_streams", |b| {
        b.iter(|| {
            archive.set_flags("s/0", 1).unwrap();
            archive.flush().unwrap();
        });
    });
}

criterion_group!(
    benches,
    benchmark_sequential_write,
    benchmark_sequential_read,
    benchmark_small_random_writes,
    benchmark_prefix_listing,
    benchmark_flush
);
criterion_main!(benches);
