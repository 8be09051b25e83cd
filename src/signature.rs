//! Canonical request signatures.
//!
//! A [`RequestSignature`] identifies a logical request for the cache and the
//! duplicate-request merger. Two requests that differ only in parameter or
//! body key order produce equal signatures; any difference in method, URL,
//! query, or body produces distinct ones.

use http::Method;
use serde_json::Value;
use std::fmt;

/// Derived identity of a logical request.
///
/// Built from the method, the resolved URL (without query string), the
/// stable-sorted query parameters, and the canonical JSON rendering of the
/// body. Used as the key for response caching, in-flight deduplication, and
/// cancellation.
///
/// # Examples
///
/// ```
/// use coalesce::RequestSignature;
/// use http::Method;
///
/// let a = RequestSignature::new(
///     &Method::GET,
///     "https://api.example.com/users",
///     &[("page".into(), "1".into()), ("limit".into(), "10".into())],
///     None,
/// );
/// let b = RequestSignature::new(
///     &Method::GET,
///     "https://api.example.com/users",
///     &[("limit".into(), "10".into()), ("page".into(), "1".into())],
///     None,
/// );
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    method: String,
    url: String,
    params: String,
    body: String,
}

impl RequestSignature {
    /// Builds a signature from the request's components.
    ///
    /// `params` are sorted by key (then value) before serialization; the
    /// body, if present, is rendered with recursively sorted object keys.
    pub fn new(
        method: &Method,
        url: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Self {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();
        let params = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        Self {
            method: method.to_string(),
            url: url.to_string(),
            params,
            body: body.map(canonical_json).unwrap_or_default(),
        }
    }

    /// The HTTP method this signature was derived from.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The resolved URL (without query string) this signature was derived
    /// from. Prefix invalidation in the cache matches against this.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if !self.params.is_empty() {
            write!(f, "?{}", self.params)?;
        }
        if !self.body.is_empty() {
            write!(f, " {}", self.body)?;
        }
        Ok(())
    }
}

/// Renders a JSON value with object keys sorted recursively.
///
/// `serde_json`'s default map is already ordered, but the sort here is
/// explicit so signatures stay stable even when the `preserve_order`
/// feature is enabled transitively.
pub(crate) fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
