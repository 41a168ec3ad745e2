use std::io;
use std::sync::Arc;

use chunkstream::{
    BucketedPool, BufferPool, MemorySink, PoolConfig, SegmentedAsyncWriter, ThreadedSink,
    WriterConfig,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const TOTAL: usize = 1 << 20;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn bench_inline_sink(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_inline_sink");
    group.throughput(Throughput::Bytes(TOTAL as u64));

    for write_size in [64usize, 1024, 16 * 1024] {
        let data = payload(write_size);
        group.bench_with_input(BenchmarkId::from_parameter(write_size), &data, |b, data| {
            b.iter(|| {
                let sink = MemorySink::new();
                let writer =
                    SegmentedAsyncWriter::new(sink.clone(), WriterConfig::new(64 * 1024, 4)).unwrap();
                for _ in 0..TOTAL / data.len() {
                    writer.write(data).unwrap();
                }
                writer.close().unwrap();
                sink.len()
            })
        });
    }
    group.finish();
}

fn bench_threaded_sink(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_threaded_sink");
    group.throughput(Throughput::Bytes(TOTAL as u64));
    let data = payload(4096);

    for max_chunks in [1usize, 2, 8] {
        group.bench_with_input(BenchmarkId::new("max_chunks", max_chunks), &data, |b, data| {
            b.iter(|| {
                let sink = ThreadedSink::spawn(io::sink()).unwrap();
                let writer =
                    SegmentedAsyncWriter::new(sink, WriterConfig::new(16 * 1024, max_chunks)).unwrap();
                for _ in 0..TOTAL / data.len() {
                    writer.write(data).unwrap();
                }
                writer.close().unwrap();
            })
        });
    }
    group.finish();
}

fn bench_pool_take_give_back(c: &mut Criterion) {
    let pool = Arc::new(BucketedPool::new(PoolConfig::default()).unwrap());
    c.bench_function("pool_take_give_back_64k", |b| {
        b.iter(|| {
            let buf = pool.take(64 * 1024).unwrap();
            pool.give_back(buf).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_inline_sink,
    bench_threaded_sink,
    bench_pool_take_give_back
);
criterion_main!(benches);
