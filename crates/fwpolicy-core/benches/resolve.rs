//! Benchmarks for the resolution hot path
//!
//! Run with: `cargo bench --bench resolve`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fwpolicy_core::{DomainKind, EngineConfig, PolicyEngine};

// ============================================================================
// Fixtures
// ============================================================================

/// Engine with a realistic mix of rules and a cache of `cache_capacity`
fn populated_engine(cache_capacity: u64) -> PolicyEngine {
    let mut config = EngineConfig::default();
    config.cache.domain_capacity = cache_capacity;
    config.cache.ip_capacity = cache_capacity;

    let engine = PolicyEngine::open(config).expect("engine");
    engine.load().expect("load");

    for i in 0..1_000 {
        engine
            .block_domain(&format!("tracker{i}.example.com"), DomainKind::Exact)
            .expect("exact rule");
    }
    for tld in ["ru", "cn", "co.uk"] {
        engine.block_domain(tld, DomainKind::Tld).expect("tld rule");
    }
    for i in 0..100 {
        engine
            .block_domain(&format!("*.ads{i}.net"), DomainKind::Wildcard)
            .expect("wildcard rule");
    }

    for i in 0..1_000 {
        engine
            .block_ip(10_000 + i % 10, &format!("1.2.{}.{}", i / 256, i % 256), Some(443))
            .expect("exact ip rule");
    }
    for i in 0..50 {
        engine
            .block_ip(10_000, &format!("10.{i}.0.0/16"), None)
            .expect("range rule");
    }

    engine.flush().expect("flush");
    engine
}

// ============================================================================
// Domain Resolution
// ============================================================================

fn bench_domain(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_domain");

    let cached = populated_engine(5_000);
    group.bench_function("cached", |b| {
        b.iter(|| cached.resolve_domain(black_box("tracker7.example.com")));
    });

    // A tiny cache and a rotating key keep every lookup on the slow path.
    let uncached = populated_engine(1);
    let tiers = [
        ("exact", "tracker7.example.com"),
        ("tld", "anything.co.uk"),
        ("wildcard", "x.ads99.net"),
        ("miss", "nothing.example.org"),
    ];
    for (tier, domain) in tiers {
        let keys: Vec<String> = (0..64).map(|i| format!("{domain}{}", ".".repeat(i % 2))).collect();
        let mut n = 0usize;
        group.bench_with_input(BenchmarkId::new("uncached", tier), &keys, |b, keys| {
            b.iter(|| {
                n = n.wrapping_add(1);
                uncached.resolve_domain(black_box(&keys[n % keys.len()]))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Connection Resolution
// ============================================================================

fn bench_connection(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_connection");

    let cached = populated_engine(5_000);
    group.bench_function("cached", |b| {
        b.iter(|| cached.resolve_connection(10_003, black_box("1.2.0.3"), Some(443)));
    });

    let uncached = populated_engine(1);
    let cases = [
        ("exact", "1.2.0.3"),
        ("range", "10.49.1.1"),
        ("mapped", "::ffff:1.2.0.3"),
        ("miss", "203.0.113.9"),
    ];
    for (case, addr) in cases {
        let mut port = 0u16;
        group.bench_with_input(BenchmarkId::new("uncached", case), &addr, |b, addr| {
            b.iter(|| {
                port = port.wrapping_add(1);
                uncached.resolve_connection(10_000, black_box(addr), Some(port))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_domain, bench_connection);
criterion_main!(benches);
