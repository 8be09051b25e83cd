//! Typed response wrapper with request metadata.

use http::StatusCode;
use std::time::Duration;

/// A successful, unwrapped response.
///
/// Wraps the deserialized payload together with how the request was served:
/// the final status, the caller-observed latency, how many transport tries
/// it took, and whether it came from the cache.
///
/// # Examples
///
/// ```no_run
/// use coalesce::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), coalesce::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = client.get::<User>("/users/123").await?;
/// println!("User: {}", response.data.name);
/// println!("Took {:?} over {} tries", response.latency, response.attempts);
/// if response.from_cache {
///     println!("Served from cache");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized payload (the envelope's `data` field when envelope
    /// unwrapping is enabled).
    pub data: T,

    /// The HTTP status of the response that produced this payload.
    pub status: StatusCode,

    /// Time from this caller issuing the request until it resolved,
    /// including queueing, retries, and merged waits.
    pub latency: Duration,

    /// Number of transport tries the serving request made. `1` for a
    /// first-try success, `0` when served from the cache.
    pub attempts: u32,

    /// Whether this payload was served from the cache without any
    /// transport call.
    pub from_cache: bool,
}

impl<T> Response<T> {
    pub(crate) fn new(
        data: T,
        status: StatusCode,
        latency: Duration,
        attempts: u32,
        from_cache: bool,
    ) -> Self {
        Self {
            data,
            status,
            latency,
            attempts,
            from_cache,
        }
    }

    /// Transforms the payload while keeping the metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            status: self.status,
            latency: self.latency,
            attempts: self.attempts,
            from_cache: self.from_cache,
        }
    }

    /// Returns `true` if the serving request needed more than one try.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
