//! # Coalesce - a request-orchestrating HTTP client
//!
//! Coalesce is an HTTP client library built on top of `reqwest` for
//! long-lived client sessions that hammer one REST backend. Around the
//! transport it composes a fixed pipeline:
//!
//! - **Response cache** - TTL'd, capacity-bounded (FIFO by insertion), keyed
//!   by a canonical request signature
//! - **Duplicate request merger** - identical concurrent requests share one
//!   transport call and all receive its outcome
//! - **Concurrency gate** - a FIFO-fair cap on in-flight transport calls
//! - **Retry** - exponential backoff for transient failures only, honoring
//!   server `Retry-After` hints
//! - **Error normalization** - every failure surfaces as one [`Error`] with
//!   a stable [`ErrorKind`] taxonomy
//!
//! ## Quick Start
//!
//! ```no_run
//! use coalesce::{Client, RequestOptions, RetryStrategy};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), coalesce::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(10))
//!         .max_in_flight(4)
//!         .retry_strategy(RetryStrategy::ExponentialBackoff {
//!             base_delay: Duration::from_millis(100),
//!             max_delay: Duration::from_secs(10),
//!             max_retries: 3,
//!             jitter: true,
//!         })
//!         .build()?;
//!
//!     // Cached GET: repeated calls within 60s hit the cache, and identical
//!     // concurrent calls share a single transport request.
//!     let user = client
//!         .get_with::<User>(
//!             "/users/123",
//!             RequestOptions::new().cache(Duration::from_secs(60)),
//!         )
//!         .await?;
//!     println!("{} via {} attempt(s)", user.data.name, user.attempts);
//!
//!     let created: coalesce::Response<User> = client
//!         .post(
//!             "/users",
//!             &CreateUser {
//!                 name: "Alice".to_string(),
//!                 email: "alice@example.com".to_string(),
//!             },
//!         )
//!         .await?;
//!     println!("created user {}", created.data.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Every failure reaching a caller is normalized; branch on
//! [`Error::kind`]:
//!
//! ```no_run
//! use coalesce::{Client, ErrorKind};
//!
//! # async fn example() -> Result<(), coalesce::Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.get::<serde_json::Value>("/endpoint").await {
//!     Ok(response) => println!("{:?}", response.data),
//!     Err(e) => match e.kind() {
//!         ErrorKind::Timeout | ErrorKind::Network => eprintln!("try again later"),
//!         ErrorKind::Business => eprintln!("backend said no: {e}"),
//!         _ => eprintln!("{e}"),
//!     },
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! In-flight requests are cancellable by signature; all merged waiters
//! settle with [`ErrorKind::Cancelled`]:
//!
//! ```no_run
//! use coalesce::{Client, RequestOptions};
//! use http::Method;
//!
//! # async fn example() -> Result<(), coalesce::Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! let key = client.request_key::<()>(&Method::GET, "/slow", None, &RequestOptions::new())?;
//! client.cancel(&key);
//! # Ok(())
//! # }
//! ```

pub mod cache;
mod client;
mod dedupe;
mod error;
pub mod gate;
mod response;
pub mod retry;
mod signature;
pub mod transport;
mod util;

pub use client::{Client, ClientBuilder, RequestOptions, RetryOverride};
pub use error::{Error, ErrorKind, Result};
pub use response::Response;
pub use retry::{RetryPredicate, RetryStrategy};
pub use signature::RequestSignature;
pub use transport::{Transport, TransportRequest, TransportResponse};
