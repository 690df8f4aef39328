//! Basic usage examples for TransportPool

use esox_invokerpool::{
    HttpInvokerFactory, HttpVersion, OrderedEvictionQueue, PoolConfiguration, RedirectPolicy,
    RequestConfig, TransportPool,
};
use std::time::Duration;

fn main() {
    println!("=== EsoxSolutions.InvokerPool - Basic Examples ===\n");

    // Example 1: Shared invokers per fingerprint
    shared_invokers();

    // Example 2: Expiry while rented
    expiry_while_rented();

    // Example 3: The eviction queue on its own
    eviction_queue();

    // Example 4: Metrics and health
    metrics_and_health();
}

fn shared_invokers() {
    println!("1. Shared Invokers:");
    let pool = TransportPool::new(HttpInvokerFactory, PoolConfiguration::default());

    let plain = RequestConfig::new();
    let strict = RequestConfig::new().with_redirect(RedirectPolicy::None);

    let _a = pool.rent(&plain).unwrap();
    let _b = pool.rent(&plain.clone().with_timeout(Duration::from_secs(2))).unwrap();
    let _c = pool.rent(&strict).unwrap();

    println!("   Owners: {}", pool.outstanding_owners());
    println!("   Pooled invokers: {}\n", pool.entry_count());
}

fn expiry_while_rented() {
    println!("2. Expiry While Rented:");
    let config = PoolConfiguration::new().with_ttl(Duration::from_millis(50));
    let pool = TransportPool::new(HttpInvokerFactory, config);
    let request = RequestConfig::new().with_http_version(HttpVersion::Http1Only);

    let invoker = pool.rent(&request).unwrap();
    std::thread::sleep(Duration::from_millis(80));
    println!("   Evicted: {}", pool.evict_expired());
    println!("   Still usable, expired = {}", invoker.is_expired());

    drop(invoker);
    println!("   Pooled invokers after release: {}\n", pool.entry_count());
}

fn eviction_queue() {
    println!("3. Eviction Queue:");
    let queue = OrderedEvictionQueue::new();
    for (stamp, name) in [(30u64, "c"), (10, "a"), (20, "b")] {
        queue.enqueue_with_backoff((stamp, name));
    }

    while let Ok((stamp, name)) = queue.dequeue() {
        println!("   {} @ {}", name, stamp);
    }
    println!();
}

fn metrics_and_health() {
    println!("4. Metrics and Health:");
    let config = PoolConfiguration::new().with_max_pool_size(4);
    let pool = TransportPool::new(HttpInvokerFactory, config);

    {
        let _one = pool.rent(&RequestConfig::new()).unwrap();
        let _two = pool.rent(&RequestConfig::new().without_proxy()).unwrap();

        let health = pool.get_health_status();
        println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
        println!("   Utilization: {:.1}%", health.utilization * 100.0);
        println!("   Live: {}, Owners: {}", health.live_entries, health.outstanding_owners);
    }

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
}
