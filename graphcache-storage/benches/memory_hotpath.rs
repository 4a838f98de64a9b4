use graphcache_core::{CacheHeaders, CacheKey, DefaultRecordMerger, MemoryCacheConfig, Record};
use graphcache_storage::{MemoryCache, NormalizedCache};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new(format!("user:{i}"), "User")
                .with_field("name", format!("user {i}"))
                .with_field("email", format!("user{i}@example.com"))
                .with_field("friend", CacheKey::new(format!("user:{}", (i + 1) % count)))
        })
        .collect()
}

fn bench_memory_tier(c: &mut Criterion) {
    let records = bench_records(1_000);
    let keys: Vec<CacheKey> = records.iter().map(|r| r.key.clone()).collect();
    let headers = CacheHeaders::none();

    let cache = MemoryCache::new(MemoryCacheConfig::default()).expect("memory tier");
    cache.merge_records(records.clone(), &headers, &DefaultRecordMerger);

    c.bench_function("memory/load_record_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            let record = cache.load_record(&keys[i % keys.len()], &headers);
            i += 1;
            black_box(record);
        });
    });

    c.bench_function("memory/load_records_batch_100", |b| {
        b.iter(|| black_box(cache.load_records(&keys[..100], &headers)));
    });

    c.bench_function("memory/merge_unchanged_1000", |b| {
        b.iter(|| black_box(cache.merge_records(records.clone(), &headers, &DefaultRecordMerger)));
    });

    // Budget for roughly a tenth of the records, so every merge evicts.
    let budget = records[0].size_in_bytes() * 100;
    let small = MemoryCache::new(MemoryCacheConfig::new().with_max_size_bytes(budget))
        .expect("memory tier");
    c.bench_function("memory/merge_with_eviction_1000", |b| {
        b.iter(|| black_box(small.merge_records(records.clone(), &headers, &DefaultRecordMerger)));
    });
}

criterion_group!(benches, bench_memory_tier);
criterion_main!(benches);
