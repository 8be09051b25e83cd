//! Request orchestrator: the client façade and its builder.
//!
//! [`Client`] wires the pipeline stages together in a fixed order:
//! cache lookup → duplicate merge → concurrency gate → retried transport
//! call → classification. Each stage is an explicit component owned by the
//! client, so multiple independent clients can coexist in one process.

use crate::{
    cache::{CacheStats, CacheStore},
    dedupe::{InFlightRegistry, Joined},
    gate::ConcurrencyGate,
    retry::{retry_after_hint, RetryPredicate, RetryStrategy, TransientErrors},
    signature::RequestSignature,
    transport::{HttpTransport, Transport, TransportRequest, TransportResponse},
    util::lock_unpoisoned,
    Error, Response, Result,
};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CACHE_CAPACITY: usize = 128;
const DEFAULT_MAX_IN_FLIGHT: usize = 8;
/// Cap on backoff delays for per-request retry overrides.
const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Per-request configuration.
///
/// # Examples
///
/// ```
/// use coalesce::RequestOptions;
/// use std::time::Duration;
///
/// let options = RequestOptions::new()
///     .cache(Duration::from_secs(30))
///     .retry(3, Duration::from_millis(100))
///     .timeout(Duration::from_secs(5))
///     .query("page", "1")
///     .requires_auth();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Cache the response for this long. `None` disables caching for the
    /// request; a zero duration is never stored.
    pub cache_ttl: Option<Duration>,
    /// Per-request retry override; `None` uses the client's strategy.
    pub retry: Option<RetryOverride>,
    /// Do not merge this request with identical in-flight ones.
    pub skip_duplicate_check: bool,
    /// Do not take a concurrency gate slot for this request.
    pub skip_concurrency_control: bool,
    /// Per-request deadline; `None` uses the client default.
    pub timeout: Option<Duration>,
    /// Extra headers for this request.
    pub headers: HeaderMap,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Attach the client's auth token as `Authorization: Bearer <token>`.
    pub requires_auth: bool,
}

/// Per-request retry configuration: exponential backoff with
/// `max_attempts` retries starting at `base_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryOverride {
    /// Maximum number of retries (so `max_attempts + 1` total tries).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
}

impl RequestOptions {
    /// Creates empty options (no caching, client-default retry and timeout).
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches a successful response for `ttl`.
    pub fn cache(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Retries transient failures up to `max_attempts` times with
    /// exponential backoff starting at `base_delay`.
    pub fn retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.retry = Some(RetryOverride {
            max_attempts,
            base_delay,
        });
        self
    }

    /// Opts this request out of duplicate merging.
    pub fn skip_duplicate_check(mut self) -> Self {
        self.skip_duplicate_check = true;
        self
    }

    /// Opts this request out of the concurrency gate.
    pub fn skip_concurrency_control(mut self) -> Self {
        self.skip_concurrency_control = true;
        self
    }

    /// Sets the deadline for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Flags this request as requiring the client's auth token.
    pub fn requires_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }
}

/// Result of one orchestrated execution, shared between merged waiters and
/// consulted for caching. Status and attempts travel with the payload so
/// every waiter reports the same serving metadata.
#[derive(Debug, Clone)]
struct Payload {
    data: Value,
    status: StatusCode,
    attempts: u32,
}

type Outcome = Result<Payload>;

/// Fully resolved inputs for one logical request, owned by the detached
/// execution task.
struct ExecutionPlan {
    signature: RequestSignature,
    method: Method,
    url: Url,
    query: Vec<(String, String)>,
    body: Option<Value>,
    headers: HeaderMap,
    timeout: Duration,
    strategy: RetryStrategy,
    cache_ttl: Option<Duration>,
    skip_concurrency_control: bool,
    requires_auth: bool,
}

/// Backend response envelope: `{code, message, data, success}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    success: Option<bool>,
}

/// The request orchestrator.
///
/// A `Client` deduplicates identical concurrent requests, limits how many
/// transport calls run at once, caches responses on demand, retries
/// transient failures, and normalizes every error into [`Error`]. It is
/// cheap to clone and designed to live for the whole session.
///
/// # Examples
///
/// ```no_run
/// use coalesce::{Client, RequestOptions, RetryStrategy};
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), coalesce::Error> {
///     let client = Client::builder()
///         .base_url("https://api.example.com")?
///         .timeout(Duration::from_secs(10))
///         .retry_strategy(RetryStrategy::ExponentialBackoff {
///             base_delay: Duration::from_millis(100),
///             max_delay: Duration::from_secs(10),
///             max_retries: 3,
///             jitter: true,
///         })
///         .build()?;
///
///     let user = client
///         .get_with::<User>(
///             "/users/123",
///             RequestOptions::new().cache(Duration::from_secs(60)),
///         )
///         .await?;
///     println!("{} ({:?})", user.data.name, user.latency);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    base_url: Url,
    default_headers: HeaderMap,
    timeout: Duration,
    retry_strategy: RetryStrategy,
    retry_predicate: Box<dyn RetryPredicate>,
    accepted_codes: Vec<i64>,
    envelope: bool,
    cache: Mutex<CacheStore>,
    gate: ConcurrencyGate,
    in_flight: InFlightRegistry<Outcome>,
    auth_token: Mutex<Option<String>>,
    on_unauthorized: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Makes an orchestrated request.
    ///
    /// This is the generic entry point behind the verb helpers: it derives
    /// the request signature, consults the cache, merges with identical
    /// in-flight requests, waits for a gate slot, and retries transient
    /// failures — returning the unwrapped payload or a normalized error.
    pub async fn request<Req, Res>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Req>,
        options: RequestOptions,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let started = Instant::now();

        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::Configuration(format!("failed to serialize request body: {e}")))?;

        let url = self.resolve_url(path);
        let signature = RequestSignature::new(&method, url.as_str(), &options.query, body.as_ref());

        if options.cache_ttl.is_some() {
            let cached = lock_unpoisoned(&self.inner.cache).get(&signature);
            if let Some(data) = cached {
                tracing::debug!(signature = %signature, "cache hit");
                let payload = Payload {
                    data,
                    status: StatusCode::OK,
                    attempts: 0,
                };
                return deserialize_payload(payload, started.elapsed(), true);
            }
            tracing::debug!(signature = %signature, "cache miss");
        }

        let plan = ExecutionPlan {
            signature: signature.clone(),
            method,
            url,
            query: options.query,
            body,
            headers: options.headers,
            timeout: options.timeout.unwrap_or(self.inner.timeout),
            strategy: match options.retry {
                Some(retry) => RetryStrategy::ExponentialBackoff {
                    base_delay: retry.base_delay,
                    max_delay: DEFAULT_MAX_RETRY_DELAY,
                    max_retries: retry.max_attempts,
                    jitter: false,
                },
                None => self.inner.retry_strategy.clone(),
            },
            cache_ttl: options.cache_ttl,
            skip_concurrency_control: options.skip_concurrency_control,
            requires_auth: options.requires_auth,
        };

        let outcome = if options.skip_duplicate_check {
            self.inner.execute_and_record(&plan).await
        } else {
            let rx = match self.inner.in_flight.join(&signature) {
                Joined::Waiter { rx } => rx,
                Joined::Leader { rx, cancel } => {
                    // The execution is detached so that a caller dropping
                    // its future cannot orphan merged waiters. Everyone,
                    // leader included, awaits the settled outcome.
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        let outcome = tokio::select! {
                            _ = cancel.notified() => Err(Error::Cancelled),
                            outcome = inner.execute_and_record(&plan) => outcome,
                        };
                        inner.in_flight.settle(&plan.signature, outcome);
                    });
                    rx
                }
            };
            rx.await.unwrap_or(Err(Error::Cancelled))
        };

        deserialize_payload(outcome?, started.elapsed(), false)
    }

    /// Makes a GET request.
    pub async fn get<Res>(&self, path: &str) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.get_with(path, RequestOptions::new()).await
    }

    /// Makes a GET request with options.
    pub async fn get_with<Res>(&self, path: &str, options: RequestOptions) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.request::<(), Res>(Method::GET, path, None, options)
            .await
    }

    /// Makes a POST request with a JSON body.
    pub async fn post<Req, Res>(&self, path: &str, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.post_with(path, body, RequestOptions::new()).await
    }

    /// Makes a POST request with a JSON body and options.
    pub async fn post_with<Req, Res>(
        &self,
        path: &str,
        body: &Req,
        options: RequestOptions,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(body), options).await
    }

    /// Makes a PUT request with a JSON body.
    pub async fn put<Req, Res>(&self, path: &str, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.put_with(path, body, RequestOptions::new()).await
    }

    /// Makes a PUT request with a JSON body and options.
    pub async fn put_with<Req, Res>(
        &self,
        path: &str,
        body: &Req,
        options: RequestOptions,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.request(Method::PUT, path, Some(body), options).await
    }

    /// Makes a DELETE request.
    pub async fn delete<Res>(&self, path: &str) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.delete_with(path, RequestOptions::new()).await
    }

    /// Makes a DELETE request with options.
    pub async fn delete_with<Res>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.request::<(), Res>(Method::DELETE, path, None, options)
            .await
    }

    /// Makes a PATCH request with a JSON body.
    pub async fn patch<Req, Res>(&self, path: &str, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.patch_with(path, body, RequestOptions::new()).await
    }

    /// Makes a PATCH request with a JSON body and options.
    pub async fn patch_with<Req, Res>(
        &self,
        path: &str,
        body: &Req,
        options: RequestOptions,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.request(Method::PATCH, path, Some(body), options).await
    }

    /// Derives the signature the client would use for this request, for use
    /// with [`cancel`](Client::cancel) and cache invalidation.
    pub fn request_key<Req>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Req>,
        options: &RequestOptions,
    ) -> Result<RequestSignature>
    where
        Req: Serialize,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::Configuration(format!("failed to serialize request body: {e}")))?;
        let url = self.resolve_url(path);
        Ok(RequestSignature::new(
            method,
            url.as_str(),
            &options.query,
            body.as_ref(),
        ))
    }

    /// Cancels the in-flight request with this signature.
    ///
    /// Every merged waiter is settled with [`Error::Cancelled`] and the
    /// gate slot is released. Returns `false` if nothing was in flight.
    pub fn cancel(&self, signature: &RequestSignature) -> bool {
        self.inner.in_flight.cancel(signature)
    }

    /// Cancels every in-flight request. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.inner.in_flight.cancel_all()
    }

    /// Cancels all in-flight requests and clears the cache.
    pub fn shutdown(&self) {
        let cancelled = self.cancel_all();
        lock_unpoisoned(&self.inner.cache).clear();
        tracing::info!(cancelled, "client shut down");
    }

    /// Sets or clears the auth token attached to requests flagged
    /// [`RequestOptions::requires_auth`].
    pub fn set_auth_token(&self, token: Option<String>) {
        *lock_unpoisoned(&self.inner.auth_token) = token;
    }

    /// Removes one cached response.
    pub fn invalidate_cache(&self, signature: &RequestSignature) -> bool {
        lock_unpoisoned(&self.inner.cache).invalidate(signature)
    }

    /// Removes every cached response whose URL starts with `url_prefix`.
    pub fn invalidate_cache_by_prefix(&self, url_prefix: &str) -> usize {
        lock_unpoisoned(&self.inner.cache).invalidate_by_prefix(url_prefix)
    }

    /// Clears the response cache. Statistics are unaffected.
    pub fn clear_cache(&self) {
        lock_unpoisoned(&self.inner.cache).clear()
    }

    /// Current cache hit/miss/eviction counters and size.
    pub fn cache_stats(&self) -> CacheStats {
        lock_unpoisoned(&self.inner.cache).stats()
    }

    /// Changes the concurrency limit. Raising it resumes queued requests
    /// immediately; lowering it never preempts executing ones.
    pub fn set_concurrency_limit(&self, limit: usize) {
        self.inner.gate.set_limit(limit)
    }

    fn resolve_url(&self, path: &str) -> Url {
        let mut url = self.inner.base_url.clone();
        url.set_path(path);
        url
    }
}

impl ClientInner {
    /// Runs the gated, retried transport call and records its side effects:
    /// a successful payload is cached when requested (errors never are),
    /// and a 401 outcome fires the unauthenticated hook once.
    async fn execute_and_record(&self, plan: &ExecutionPlan) -> Outcome {
        let outcome = self.execute(plan).await;
        match &outcome {
            Ok(payload) => {
                if let Some(ttl) = plan.cache_ttl {
                    lock_unpoisoned(&self.cache).set(
                        plan.signature.clone(),
                        payload.data.clone(),
                        ttl,
                    );
                    tracing::debug!(signature = %plan.signature, ttl_ms = ttl.as_millis() as u64, "cached response");
                }
            }
            Err(e) => self.notify_unauthorized(e),
        }
        outcome
    }

    /// Holds one gate slot across all retries of the logical request.
    async fn execute(&self, plan: &ExecutionPlan) -> Outcome {
        let _permit = if plan.skip_concurrency_control {
            None
        } else {
            Some(self.gate.acquire().await)
        };

        let mut attempt: u32 = 0;
        loop {
            match self.single_attempt(plan).await {
                Ok((data, status)) => {
                    return Ok(Payload {
                        data,
                        status,
                        attempts: attempt + 1,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        method = %plan.method,
                        url = %plan.url,
                        "request attempt failed"
                    );

                    if !self.retry_predicate.should_retry(&e, attempt) {
                        return Err(e);
                    }
                    let Some(backoff) = plan.strategy.delay_for_attempt(attempt) else {
                        return Err(e);
                    };

                    // The server's own hint wins over computed backoff,
                    // capped at the strategy's maximum delay.
                    let delay = match e.retry_after() {
                        Some(hint) => match plan.strategy.delay_cap() {
                            Some(cap) => hint.min(cap),
                            None => hint,
                        },
                        None => backoff,
                    };
                    tracing::info!(
                        delay_ms = delay.as_millis() as u64,
                        attempt,
                        "retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn single_attempt(&self, plan: &ExecutionPlan) -> Result<(Value, StatusCode)> {
        let mut headers = self.default_headers.clone();
        for (name, value) in &plan.headers {
            headers.insert(name, value.clone());
        }
        if plan.requires_auth {
            let token = lock_unpoisoned(&self.auth_token).clone();
            if let Some(token) = token {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| Error::Configuration(format!("invalid auth token: {e}")))?;
                headers.insert(header::AUTHORIZATION, value);
            }
        }

        let request = TransportRequest {
            method: plan.method.clone(),
            url: plan.url.clone(),
            query: plan.query.clone(),
            body: plan.body.clone(),
            headers,
            timeout: Some(plan.timeout),
        };

        // The timer races the transport; whichever settles first wins and
        // the loser is dropped.
        let response = match tokio::time::timeout(plan.timeout, self.transport.invoke(request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    message: format!("no response within {:?}", plan.timeout),
                })
            }
        };

        tracing::debug!(
            status = response.status.as_u16(),
            url = %plan.url,
            "received HTTP response"
        );
        self.classify(response)
    }

    /// Maps a raw transport response onto the error taxonomy, unwrapping
    /// the business envelope on success.
    fn classify(&self, response: TransportResponse) -> Result<(Value, StatusCode)> {
        let status = response.status;

        if status.is_server_error() {
            return Err(Error::Server {
                status,
                raw_response: response.body,
                retry_after: retry_after_hint(&response.headers),
            });
        }
        if status.is_client_error() {
            let retry_after = if status.as_u16() == 408 || status.as_u16() == 429 {
                retry_after_hint(&response.headers)
            } else {
                None
            };
            return Err(Error::Client {
                status,
                raw_response: response.body,
                retry_after,
            });
        }
        if !status.is_success() {
            return Err(Error::Unexpected { status });
        }

        // 204-style responses carry no body to unwrap.
        if response.body.trim().is_empty() {
            return Ok((Value::Null, status));
        }

        if self.envelope {
            match serde_json::from_str::<Envelope>(&response.body) {
                Ok(envelope) => {
                    if envelope.success == Some(false)
                        || !self.accepted_codes.contains(&envelope.code)
                    {
                        return Err(Error::Business {
                            code: envelope.code,
                            message: envelope
                                .message
                                .unwrap_or_else(|| "request failed".to_string()),
                        });
                    }
                    Ok((envelope.data.unwrap_or(Value::Null), status))
                }
                Err(e) => Err(Error::Decode {
                    raw_response: response.body,
                    serde_error: e.to_string(),
                    status,
                }),
            }
        } else {
            match serde_json::from_str::<Value>(&response.body) {
                Ok(value) => Ok((value, status)),
                Err(e) => Err(Error::Decode {
                    raw_response: response.body,
                    serde_error: e.to_string(),
                    status,
                }),
            }
        }
    }

    fn notify_unauthorized(&self, error: &Error) {
        if error.status() == Some(StatusCode::UNAUTHORIZED) {
            if let Some(hook) = &self.on_unauthorized {
                tracing::debug!("invoking unauthenticated hook");
                hook();
            }
        }
    }
}

fn deserialize_payload<Res>(
    payload: Payload,
    latency: Duration,
    from_cache: bool,
) -> Result<Response<Res>>
where
    Res: DeserializeOwned,
{
    let Payload {
        data,
        status,
        attempts,
    } = payload;
    let raw = data.to_string();
    match serde_json::from_value::<Res>(data) {
        Ok(parsed) => Ok(Response::new(parsed, status, latency, attempts, from_cache)),
        Err(e) => Err(Error::Decode {
            raw_response: raw,
            serde_error: e.to_string(),
            status,
        }),
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use coalesce::{ClientBuilder, RetryStrategy};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), coalesce::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(10))
///     .max_in_flight(4)
///     .cache_capacity(256)
///     .default_header("User-Agent", "my-app/1.0")?
///     .on_unauthorized(|| eprintln!("session expired"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    timeout: Duration,
    retry_strategy: RetryStrategy,
    retry_predicate: Option<Box<dyn RetryPredicate>>,
    accepted_codes: Vec<i64>,
    envelope: bool,
    cache_capacity: usize,
    max_in_flight: usize,
    transport: Option<Arc<dyn Transport>>,
    on_unauthorized: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ClientBuilder {
    /// Creates a builder with default settings: 30s timeout, no retries,
    /// 128 cache entries, 8 concurrent requests, envelope unwrapping with
    /// accepted codes 0 and 200.
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            retry_strategy: RetryStrategy::None,
            retry_predicate: None,
            accepted_codes: vec![0, 200],
            envelope: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            transport: None,
            on_unauthorized: None,
        }
    }

    /// Creates a builder configured from the environment: `API_BASE_URL`
    /// (required) and `API_TIMEOUT_MS` (optional). Read once; later changes
    /// to the environment are not observed.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("API_BASE_URL")
            .map_err(|_| Error::Configuration("API_BASE_URL is not set".to_string()))?;
        let mut builder = Self::new().base_url(base_url)?;
        if let Ok(ms) = std::env::var("API_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|e| Error::Configuration(format!("invalid API_TIMEOUT_MS: {e}")))?;
            builder = builder.timeout(Duration::from_millis(ms));
        }
        Ok(builder)
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header value: {e}")))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the default request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default retry strategy for requests without a per-request
    /// override.
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Replaces the default transient-error retry predicate.
    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Sets the envelope codes treated as success (default `0` and `200`).
    pub fn accepted_codes(mut self, codes: Vec<i64>) -> Self {
        self.accepted_codes = codes;
        self
    }

    /// Enables or disables envelope unwrapping. When disabled, response
    /// bodies are returned as-is.
    pub fn envelope(mut self, envelope: bool) -> Self {
        self.envelope = envelope;
        self
    }

    /// Sets the response cache capacity. Zero disables caching entirely.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the maximum number of concurrent transport calls.
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit;
        self
    }

    /// Replaces the default reqwest-backed transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Registers a callback invoked when a request fails with HTTP 401.
    pub fn on_unauthorized(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Arc::new(hook));
        self
    }

    /// Builds the configured [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided or the default
    /// transport cannot be constructed.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("base URL is required".to_string()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        let retry_predicate = self
            .retry_predicate
            .unwrap_or_else(|| Box::new(TransientErrors));

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                base_url,
                default_headers: self.default_headers,
                timeout: self.timeout,
                retry_strategy: self.retry_strategy,
                retry_predicate,
                accepted_codes: self.accepted_codes,
                envelope: self.envelope,
                cache: Mutex::new(CacheStore::new(self.cache_capacity)),
                gate: ConcurrencyGate::new(self.max_in_flight),
                in_flight: InFlightRegistry::new(),
                auth_token: Mutex::new(None),
                on_unauthorized: self.on_unauthorized,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
