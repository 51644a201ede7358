//! Authenticated HTTP transport for the Todoist API.
//!
//! Every request carries the bearer token and a user agent, runs under a
//! per-attempt timeout clamped to the run's deadline, and is retried with
//! backoff on throttling and server errors (see [`crate::retry`]).

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};
use reconcile::Deadline;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default API origin.
pub const DEFAULT_BASE_URL: &str = "https://api.todoist.com";

/// Default timeout for a single request attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("tidyist/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

enum Body<'a> {
    Empty,
    Json(serde_json::Value),
    Form(&'a [(&'a str, String)]),
}

/// Blocking HTTP client with auth, retry and deadline handling.
pub struct HttpClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
    retry: RetryConfig,
    timeout: Duration,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client for the public API.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a different API origin (proxies, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Per-attempt timeout; never extends past the run's deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the current API origin.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        deadline: &Deadline,
    ) -> Result<T> {
        let text = self.execute(Method::Get, path, query, &Body::Empty, deadline)?;
        decode(&text)
    }

    pub fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        deadline: &Deadline,
    ) -> Result<T> {
        let body = Body::Json(encode(body)?);
        let text = self.execute(Method::Post, path, &[], &body, deadline)?;
        decode(&text)
    }

    /// POST a JSON body and ignore whatever comes back.
    pub fn post_json_discard<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        deadline: &Deadline,
    ) -> Result<()> {
        let body = Body::Json(encode(body)?);
        self.execute(Method::Post, path, &[], &body, deadline)?;
        Ok(())
    }

    /// POST `application/x-www-form-urlencoded` fields.
    pub fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
        deadline: &Deadline,
    ) -> Result<T> {
        let text = self.execute(Method::Post, path, &[], &Body::Form(form), deadline)?;
        decode(&text)
    }

    pub fn delete(&self, path: &str, deadline: &Deadline) -> Result<()> {
        self.execute(Method::Delete, path, &[], &Body::Empty, deadline)?;
        Ok(())
    }

    fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: &Body<'_>,
        deadline: &Deadline,
    ) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        with_retry(&self.retry, deadline, || {
            let timeout = deadline.clamp(self.timeout);
            if timeout.is_zero() {
                return Err(Error::DeadlineExceeded);
            }
            // Query strings may carry cursors; only the path is logged.
            log::debug!("todoist request: {} {}", method.as_str(), path);
            let (status, retry_after, text) = self.send_once(method, &url, query, body, timeout)?;
            log::debug!("todoist response: {status} for {path}");
            if (200..300).contains(&status) {
                Ok(text)
            } else {
                Err(Error::http(status, text, retry_after))
            }
        })
    }

    fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: &Body<'_>,
        timeout: Duration,
    ) -> Result<(u16, Option<Duration>, String)> {
        let mut response = match (method, body) {
            (Method::Get, _) => self.prepare(self.agent.get(url), query, timeout).call()?,
            (Method::Delete, _) => self.prepare(self.agent.delete(url), query, timeout).call()?,
            (Method::Post, Body::Empty) => self
                .prepare(self.agent.post(url), query, timeout)
                .send_empty()?,
            (Method::Post, Body::Json(value)) => self
                .prepare(self.agent.post(url), query, timeout)
                .header("Content-Type", "application/json")
                .send_json(value)?,
            (Method::Post, Body::Form(fields)) => self
                .prepare(self.agent.post(url), query, timeout)
                .send_form(fields.iter().map(|(k, v)| (*k, v.as_str())))?,
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let text = response.body_mut().read_to_string()?;
        Ok((status, retry_after, text))
    }

    fn prepare<B>(
        &self,
        builder: ureq::RequestBuilder<B>,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> ureq::RequestBuilder<B> {
        let mut builder = builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json");
        for (key, value) in query {
            builder = builder.query(*key, *value);
        }
        builder.config().timeout_global(Some(timeout)).build()
    }
}

fn encode<B: Serialize>(body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body).map_err(|e| Error::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    let trimmed = text.trim();
    let source = if trimmed.is_empty() { "null" } else { trimmed };
    Ok(serde_json::from_str(source)?)
}

/// Parse a `Retry-After` header given in seconds.
///
/// HTTP-date values are not supported and yield `None`, which falls back to
/// regular backoff.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Percent-encode a single path segment.
pub(crate) fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
