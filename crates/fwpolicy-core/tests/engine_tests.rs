//! Integration tests for the engine facade under concurrent use

use fwpolicy_core::{
    DomainKind, DomainStatus, EngineConfig, IpRuleStatus, MemoryRepository, PolicyEngine,
};
use std::sync::Arc;
use std::thread;

fn engine() -> Arc<PolicyEngine> {
    let engine = PolicyEngine::new(Arc::new(MemoryRepository::new()), EngineConfig::default())
        .unwrap();
    engine.load().unwrap();
    Arc::new(engine)
}

#[test]
fn test_readers_during_writes() {
    let engine = engine();

    let readers: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for n in 0..500 {
                    // Keys disjoint from the final asserts below; a lookup racing an
                    // invalidation may cache a stale answer.
                    let domain = format!("host{}.example{}.org", n % 50, i);
                    let status = engine.resolve_domain(&domain);
                    assert_ne!(status, DomainStatus::Whitelist);
                    let _ = engine.resolve_connection(20_000 + i, "10.0.0.1", Some(443));
                }
            })
        })
        .collect();

    for n in 0..100 {
        engine
            .block_domain(&format!("host{n}.example0.com"), DomainKind::Exact)
            .unwrap();
        engine.block_ip(10_000, &format!("10.{n}.0.0/16"), None).unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    engine.flush().unwrap();

    assert_eq!(engine.domains().len(), 100);
    assert_eq!(engine.ips().len(), 100);
    assert_eq!(engine.resolve_domain("host7.example0.com"), DomainStatus::Block);
    assert_eq!(engine.resolve_connection(10_000, "10.0.0.1", Some(443)), IpRuleStatus::Block);
}

#[test]
fn test_mutations_apply_in_issue_order() {
    let engine = engine();
    engine.block_domain("flip.example.com", DomainKind::Exact).unwrap();
    engine.whitelist_domain("flip.example.com", DomainKind::Exact).unwrap();
    engine.clear_domain_rule("flip.example.com", DomainKind::Exact);
    engine.block_domain("flip.example.com", DomainKind::Exact).unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.resolve_domain("flip.example.com"), DomainStatus::Block);
}

#[test]
fn test_cache_counters() {
    let engine = engine();
    engine.resolve_domain("a.example.com");
    engine.resolve_domain("a.example.com");
    engine.resolve_domain("b.example.com");

    let stats = engine.domains().cache_stats();
    assert_eq!(stats.hits(), 1);
    assert_eq!(stats.misses(), 2);
}
