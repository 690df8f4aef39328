//! Async usage examples

use esox_invokerpool::{
    CompletionOption, HttpInvokerFactory, PoolConfiguration, RequestConfig, Transport, TransportPool,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("esox_invokerpool=debug").init();

    println!("=== EsoxSolutions.InvokerPool - Async Examples ===\n");

    // Example 1: Async rent and send
    async_send().await;

    // Example 2: Concurrent access
    concurrent_access().await;
}

async fn async_send() {
    println!("1. Async Send:");
    let pool = TransportPool::new(HttpInvokerFactory, PoolConfiguration::default());
    let config = RequestConfig::new()
        .with_timeout(Duration::from_secs(5))
        .with_completion(CompletionOption::HeadersRead);

    let invoker = pool.rent_async(config.clone()).await.unwrap();
    let request = reqwest::Request::new(reqwest::Method::GET, "https://example.com/".parse().unwrap());
    match invoker.send(config.prepare(request)).await {
        Ok(response) => println!("   Status: {}", response.status()),
        Err(e) => println!("   Error: {}", e),
    }

    println!();
}

async fn concurrent_access() {
    println!("2. Concurrent Access:");
    let config = PoolConfiguration::new()
        .with_ttl(Duration::from_millis(200))
        .with_sweep_interval(Duration::from_millis(50));
    let pool = Arc::new(TransportPool::new(HttpInvokerFactory, config));

    let mut handles = vec![];
    for i in 0..10 {
        let pool = Arc::clone(&pool);
        let handle = tokio::spawn(async move {
            let invoker = pool.rent_async(RequestConfig::new()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20 * i)).await;
            invoker.age()
        });
        handles.push(handle);
    }

    for handle in handles {
        let age = handle.await.unwrap();
        println!("   Released invoker aged {:?}", age);
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    let metrics = pool.get_metrics();
    println!("   Created: {}, Disposed: {}", metrics.entries_created, metrics.transports_disposed);
    println!("   Pooled invokers: {}\n", pool.entry_count());
}
