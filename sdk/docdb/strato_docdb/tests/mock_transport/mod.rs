// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Scripted transports shared by the pipeline integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use strato_docdb::constants;
use strato_docdb::http::{Headers, Request, Response, StatusCode, Transport};
use strato_docdb::models::AccountProperties;
use strato_docdb::{Error, Result};

/// Plays back a scripted sequence of responses and records every request.
pub struct MockTransport {
    script: Mutex<VecDeque<Result<Response>>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn append_response(&self, response: Response) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    pub fn append_transport_error(&self, retryable: bool, message: &str) {
        self.script.lock().unwrap().push_back(Err(Error::Transport {
            retryable,
            source: message.to_string().into(),
        }));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Hosts targeted by each recorded request, in order.
    pub fn request_hosts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url().host_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn session_tokens_sent(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                r.headers()
                    .get(constants::SESSION_TOKEN)
                    .map(str::to_string)
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock transport script exhausted")
    }
}

/// Serves the account topology document on every request, the way the
/// account root endpoint would.
pub struct AccountDocTransport {
    document: AccountProperties,
    pub fetches: AtomicUsize,
}

impl AccountDocTransport {
    pub fn new(document: AccountProperties) -> Arc<Self> {
        Arc::new(Self {
            document,
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Transport for AccountDocTransport {
    async fn send(&self, _request: &Request) -> Result<Response> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Response::from_bytes(
            StatusCode::OK,
            Headers::new(),
            serde_json::to_vec(&self.document).unwrap(),
        ))
    }
}

/// One write region (East US), three read regions.
pub fn single_master_account() -> AccountProperties {
    account(false)
}

/// Two write regions, three read regions.
pub fn multi_master_account() -> AccountProperties {
    account(true)
}

fn account(multi_master: bool) -> AccountProperties {
    let writes = if multi_master {
        r#"[{"name": "East US", "endpoint": "https://east.example.com"},
            {"name": "Central US", "endpoint": "https://central.example.com"}]"#
    } else {
        r#"[{"name": "East US", "endpoint": "https://east.example.com"}]"#
    };
    serde_json::from_str(&format!(
        r#"{{
            "readRegions": [
                {{"name": "East US", "endpoint": "https://east.example.com"}},
                {{"name": "Central US", "endpoint": "https://central.example.com"}},
                {{"name": "East US 2", "endpoint": "https://east2.example.com"}}
            ],
            "writeRegions": {writes},
            "enableMultipleWriteLocations": {multi_master},
            "consistencyPolicy": {{"defaultConsistencyLevel": "Session"}}
        }}"#
    ))
    .unwrap()
}

pub fn response(status: StatusCode) -> Response {
    Response::from_bytes(status, Headers::new(), Vec::new())
}

pub fn response_with_substatus(status: StatusCode, sub_status: u32) -> Response {
    let mut headers = Headers::new();
    headers.insert(constants::SUB_STATUS, sub_status.to_string());
    Response::from_bytes(status, headers, Vec::new())
}

pub fn throttled_response(retry_after_ms: u64) -> Response {
    let mut headers = Headers::new();
    headers.insert(constants::RETRY_AFTER_MS, retry_after_ms.to_string());
    Response::from_bytes(StatusCode::TOO_MANY_REQUESTS, headers, Vec::new())
}
