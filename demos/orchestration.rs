//! Example demonstrating the orchestration pipeline.
//!
//! This example shows how to:
//! - Cache responses with a per-request TTL
//! - Let identical concurrent requests share one transport call
//! - Cap how many requests run at once
//! - Inspect cache statistics
//!
//! Run with: `cargo run --example orchestration`

use coalesce::{Client, Error, RequestOptions};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    id: u32,
    title: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("coalesce=debug,orchestration=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .envelope(false)
        .max_in_flight(2)
        .build()?;

    println!("=== Duplicate merging ===");
    // Five identical concurrent GETs collapse into one transport call;
    // every task receives the same outcome.
    let mut handles = Vec::new();
    for i in 0..5 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let response = client.get::<Post>("/posts/1").await?;
            println!("task {i}: post {} in {:?}", response.data.id, response.latency);
            Ok::<_, Error>(())
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked")?;
    }
    println!();

    println!("=== Caching ===");
    let options = RequestOptions::new().cache(Duration::from_secs(30));
    let first = client.get_with::<Post>("/posts/2", options.clone()).await?;
    let second = client.get_with::<Post>("/posts/2", options).await?;
    println!("first from_cache: {}", first.from_cache);
    println!("second from_cache: {}", second.from_cache);

    let stats = client.cache_stats();
    println!(
        "cache: {} hits, {} misses, {} entries",
        stats.hits, stats.misses, stats.size
    );
    println!();

    println!("=== Concurrency gate ===");
    // With max_in_flight(2), these run at most two at a time in FIFO order.
    let mut handles = Vec::new();
    for id in 3..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let response = client.get::<Post>(&format!("/posts/{id}")).await?;
            println!("fetched post {}", response.data.id);
            Ok::<_, Error>(())
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked")?;
    }

    Ok(())
}
