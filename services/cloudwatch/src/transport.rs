// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::body::RequestBody;
use crate::constants::X_AMZN_REQUEST_ID;
use crate::Credential;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, Uri};
use log::{debug, warn};
use putmetric_core::{Error, Result, Signer};
use quick_xml::de;
use serde::Deserialize;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Observer invoked with every fully signed request right before it is
/// transmitted.
///
/// Observers must not block; they see each attempt, retries included.
pub trait ObserveRequest: Debug + Send + Sync + 'static {
    /// Called once per attempt.
    fn on_request(&self, req: &Request<Bytes>);
}

/// ObserveRequest that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ObserveRequest for NoopObserver {
    fn on_request(&self, _: &Request<Bytes>) {}
}

/// Fixed delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry transient failures at all.
    pub enabled: bool,
    /// Delay between two attempts.
    pub delay: Duration,
    /// Upper bound of attempts, the first one included.
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_millis(1000),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    fn attempts(&self) -> usize {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}

/// Result of delivering one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Status of the successful response.
    pub status: StatusCode,
    /// Identifier the service assigned to the request, if any.
    pub request_id: Option<String>,
    /// Attempts it took, the successful one included.
    pub attempts: usize,
}

/// Transport signs request bodies and delivers them with bounded retry.
///
/// Cloning is cheap; clones share the signer and its cached credential.
#[derive(Debug, Clone)]
pub struct Transport {
    signer: Signer<Credential>,
    endpoint: Option<Uri>,
    timeout: Duration,
    retry: RetryPolicy,
    observer: Arc<dyn ObserveRequest>,
}

impl Transport {
    /// Create a transport posting to `endpoint` with default timeout and retry.
    pub fn new(signer: Signer<Credential>, endpoint: &str) -> Result<Self> {
        let endpoint: Uri = endpoint.parse()?;
        if endpoint.authority().is_none() {
            return Err(Error::config_invalid(format!(
                "endpoint {endpoint} has no host"
            )));
        }

        Ok(Self {
            endpoint: Some(endpoint),
            ..Self::regional(signer)
        })
    }

    /// Create a transport posting to the regional endpoint of the signing
    /// credential, e.g. `https://monitoring.us-east-1.amazonaws.com/`.
    ///
    /// The host is resolved on every attempt from the credential the request
    /// is signed with, so a refreshed credential in another region moves the
    /// requests along with it.
    pub fn regional(signer: Signer<Credential>) -> Self {
        Self {
            signer,
            endpoint: None,
            timeout: Duration::from_millis(60_000),
            retry: RetryPolicy::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Set the timeout of one attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the request observer.
    pub fn with_observer(mut self, observer: impl ObserveRequest) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Deliver one body, retrying transient failures.
    ///
    /// Every attempt is signed again so a credential that went stale during
    /// the retry sequence is refreshed. On exhaustion the last error is
    /// returned.
    pub async fn send(&self, body: &RequestBody) -> Result<SendOutcome> {
        let payload = Bytes::copy_from_slice(body.as_str().as_bytes());
        let max_attempts = self.retry.attempts();

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.attempt(payload.clone()).await {
                Ok(resp) => {
                    let request_id = resp
                        .headers()
                        .get(X_AMZN_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.to_string());
                    debug!(
                        "delivered {} data points in {attempt} attempt(s), request id: {request_id:?}",
                        body.count()
                    );

                    return Ok(SendOutcome {
                        status: resp.status(),
                        request_id,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "attempt {attempt}/{max_attempts} failed: {err}, retrying in {:?}",
                        self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Deliver bodies one after another.
    ///
    /// A failed body doesn't stop the following ones. The first error is
    /// returned once every body has been attempted.
    pub async fn send_batch(&self, batch: Vec<RequestBody>) -> Result<Vec<SendOutcome>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        debug!("sending batch of {} request bodies", batch.len());

        let mut outcomes = Vec::with_capacity(batch.len());
        let mut first_err = None;
        for (idx, body) in batch.iter().enumerate() {
            match self.send(body).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!("request body {idx} of the batch failed: {err}");
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }

    async fn attempt(&self, payload: Bytes) -> Result<Response<Bytes>> {
        // Without an explicit endpoint the signer fills in the regional one.
        let uri = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => Uri::from_static("/"),
        };
        let (mut parts, ()) = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(())?
            .into_parts();
        self.signer.sign(&mut parts, &payload).await?;

        let req = Request::from_parts(parts, payload);
        self.observer.on_request(&req);

        // Dropping the in-flight future on timeout aborts the connection.
        let resp = tokio::time::timeout(self.timeout, self.signer.context().http_send(req))
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "request timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(parse_error_response(resp))
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ErrorResponse {
    error: ErrorDetail,
    request_id: String,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Build the error for a non-2xx response.
///
/// The message is `HTTP <status>`, followed by the service error code and
/// message when the body is an `ErrorResponse` document.
fn parse_error_response(resp: Response<Bytes>) -> Error {
    let status = resp.status();
    let err = Error::from_status(status);

    let Ok(body) = std::str::from_utf8(resp.body()) else {
        return err;
    };
    let Ok(detail) = de::from_str::<ErrorResponse>(body) else {
        return err;
    };
    if detail.error.code.is_empty() {
        return err;
    }

    debug!(
        "service rejected request {} with {}",
        detail.request_id, detail.error.code
    );
    Error::new(
        err.kind(),
        format!("{err}: {}: {}", detail.error.code, detail.error.message),
    )
    .with_status(status)
}
