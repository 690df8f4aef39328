// EsoxSolutions.InvokerPool - Rust Port
// Pooled, time-evicted HTTP invokers with reference-counted rentals

// This is just a binary wrapper - the actual library is in lib.rs
// Run examples with: cargo run --example basic

use esox_invokerpool::{HttpInvokerFactory, HttpVersion, PoolConfiguration, RequestConfig, TransportPool};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    println!("=== EsoxSolutions.InvokerPool ===");
    println!("See demos/ directory for usage examples");
    println!("Run: cargo run --example basic");
    println!();

    println!("Quick Demo:");
    let config = PoolConfiguration::new().with_ttl(Duration::from_secs(30));
    let pool = TransportPool::new(HttpInvokerFactory, config);

    let request = RequestConfig::new().with_http_version(HttpVersion::Http1Only);
    match pool.rent(&request) {
        Ok(invoker) => {
            println!("  Rented invoker, age {:?}", invoker.age());
            println!("  Pooled entries: {}", pool.entry_count());
        }
        Err(err) => println!("  Rent failed: {}", err),
    }

    println!("  Outstanding after release: {}", pool.outstanding_owners());
}
