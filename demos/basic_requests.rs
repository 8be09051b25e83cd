//! Basic example demonstrating simple GET and POST requests.
//!
//! This example shows how to:
//! - Create a client with basic configuration
//! - Make GET requests to fetch data
//! - Make POST requests to create data
//! - Access response data and metadata
//!
//! Run with: `cargo run --example basic_requests`

use coalesce::{Client, Error};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("coalesce=debug,basic_requests=info")
        .init();

    // JSONPlaceholder returns plain JSON bodies, not the {code, data,
    // success} envelope, so envelope unwrapping is turned off.
    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .envelope(false)
        .build()?;

    println!("=== GET Request Example ===");
    let response = client.get::<Post>("/posts/1").await?;

    println!("Post ID: {}", response.data.id);
    println!("Title: {}", response.data.title);
    println!("Request latency: {:?}", response.latency);
    println!("Status code: {}", response.status);
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let created = client.post::<NewPost, Post>("/posts", &new_post).await?;

    println!("Created post ID: {}", created.data.id);
    println!("Attempts: {}", created.attempts);

    Ok(())
}
