// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Minimal HTTP primitives consumed by the client core.
//!
//! The actual transport (connection pooling, TLS, proxies) lives outside this
//! crate and is plugged in through the [`Transport`] trait. Bodies are plain
//! [`Bytes`], which makes every request trivially replayable across retries.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::constants;

/// HTTP request methods used by the service protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        })
    }
}

/// An HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const CONFLICT: StatusCode = StatusCode(409);
    pub const TOO_MANY_REQUESTS: StatusCode = StatusCode(429);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    pub fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A case-insensitive header map.
#[derive(Debug, Clone, Default)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.0
            .get(&name.as_ref().to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parses a header value, returning `None` when absent or unparseable.
    pub fn get_as<T: FromStr>(&self, name: impl AsRef<str>) -> Option<T> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The capability of contributing request headers.
///
/// Per-operation option structs implement this so the request builder can
/// consume them uniformly instead of special-casing each option type.
pub trait AsHeaders {
    fn as_headers(&self) -> Vec<(&'static str, String)>;
}

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Bytes,
}

impl Request {
    pub fn new(url: Url, method: Method) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Applies every header contributed by `options`.
    pub fn apply_headers(&mut self, options: &impl AsHeaders) {
        for (name, value) in options.as_headers() {
            self.headers.insert(name, value);
        }
    }

    /// Serializes `body` as JSON and sets the content type accordingly.
    pub fn set_json<T: Serialize>(&mut self, body: &T) -> crate::Result<()> {
        self.body = Bytes::from(serde_json::to_vec(body)?);
        self.headers
            .insert(constants::CONTENT_TYPE, constants::APPLICATION_JSON);
        Ok(())
    }

    /// Repoints the request at a different regional endpoint, keeping the
    /// path and query intact. Used by the failover policy between attempts.
    pub fn set_endpoint(&mut self, endpoint: &Url) {
        let _ = self.url.set_scheme(endpoint.scheme());
        let _ = self.url.set_host(endpoint.host_str());
        let _ = self.url.set_port(endpoint.port());
    }
}

/// An HTTP response with a fully buffered body.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl Response {
    pub fn from_bytes(status: StatusCode, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn deserialize_body<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The substatus qualifying this response's status code, if present.
    pub fn sub_status(&self) -> Option<u32> {
        self.headers.get_as(constants::SUB_STATUS)
    }

    /// The session token returned by the service, if any.
    pub fn session_token(&self) -> Option<&str> {
        self.headers.get(constants::SESSION_TOKEN)
    }

    /// The server-assigned resource id of the addressed resource.
    pub fn resource_id(&self) -> Option<&str> {
        self.headers.get(constants::RESOURCE_ID)
    }

    /// The logical address the service reports for the addressed resource.
    pub fn alt_content_path(&self) -> Option<&str> {
        self.headers.get(constants::ALT_CONTENT_PATH)
    }

    /// The backoff the service asked for on a throttled response.
    ///
    /// Prefers the millisecond-precision header, falling back to the
    /// standard seconds-granularity one.
    pub fn retry_after(&self) -> Option<Duration> {
        if let Some(ms) = self.headers.get_as::<u64>(constants::RETRY_AFTER_MS) {
            return Some(Duration::from_millis(ms));
        }
        self.headers
            .get_as::<u64>(constants::RETRY_AFTER)
            .map(Duration::from_secs)
    }
}

/// The outbound HTTP collaborator.
///
/// Implementations must be able to resend a request verbatim: retries clone
/// the same [`Request`], body included.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> crate::Result<Response>;
}
