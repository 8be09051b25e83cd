//! Example demonstrating error handling and retries.
//!
//! This example shows how to:
//! - Branch on the normalized error taxonomy
//! - Configure a default retry strategy with jitter
//! - Use per-request retry overrides
//! - React to authentication failures
//!
//! Run with: `cargo run --example error_handling`

use coalesce::{Client, Error, ErrorKind, RequestOptions, RetryStrategy};
use serde::Deserialize;
use serde_json::Value;
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
        .with_env_filter("coalesce=info,error_handling=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .envelope(false)
        .retry_strategy(RetryStrategy::ExponentialBackoff {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            max_retries: 3,
            jitter: true,
        })
        .on_unauthorized(|| eprintln!("session expired, please sign in again"))
        .build()?;

    println!("=== Branching on ErrorKind ===");
    match client.get::<Post>("/posts/does-not-exist").await {
        Ok(response) => println!("unexpected success: {:?}", response.data),
        Err(e) => match e.kind() {
            ErrorKind::Client => {
                println!("final client error {}: not retried", e.status().unwrap())
            }
            ErrorKind::Network | ErrorKind::Timeout => println!("transient, was retried: {e}"),
            ErrorKind::Business => println!("backend rejected the request: {e}"),
            other => println!("{other:?}: {e}"),
        },
    }
    println!();

    println!("=== Per-request retry override ===");
    // Overrides the client-level strategy for this one request: up to two
    // retries, starting at 100ms.
    let result = client
        .get_with::<Value>(
            "/posts/1",
            RequestOptions::new()
                .retry(2, Duration::from_millis(100))
                .timeout(Duration::from_secs(5)),
        )
        .await?;
    println!("succeeded after {} attempt(s)", result.attempts);

    Ok(())
}
