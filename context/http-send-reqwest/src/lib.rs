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

//! [`HttpSend`] implementation backed by [`reqwest`].
//!
//! Transport failures are classified so that the caller can decide whether
//! to retry: connect-phase failures (connect timeouts included) and dropped
//! connections become [`ErrorKind::NetworkTransient`], timeouts once the
//! connection is up become [`ErrorKind::Timeout`].

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use log::debug;
use putmetric_core::{Error, ErrorKind, HttpSend, Result};
use reqwest::{Client, Request};
use std::error::Error as _;
use std::io;

/// ReqwestHttpSend sends requests through a shared [`reqwest::Client`].
#[derive(Debug, Default, Clone)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let req = Request::try_from(req).map_err(|e| {
            Error::request_invalid("failed to convert http request").with_source(e)
        })?;
        let resp: http::Response<_> = self
            .client
            .execute(req)
            .await
            .map_err(classify)?
            .into();

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(classify)?;
        Ok(http::Response::from_parts(parts, bs))
    }
}

/// Convert a reqwest error into an [`Error`] carrying the retry classification.
fn classify(err: reqwest::Error) -> Error {
    let kind = error_kind(&err);
    debug!("reqwest error classified as {kind:?}: {err:?}");

    Error::new(kind, err.to_string()).with_source(err)
}

fn error_kind(err: &reqwest::Error) -> ErrorKind {
    let mut io_kinds = Vec::new();
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            io_kinds.push(io_err.kind());
        }
        source = e.source();
    }

    kind_from_parts(err.is_connect(), err.is_timeout(), &io_kinds)
}

/// Connect-phase failures are transient even when they timed out. Only a
/// timeout after the connection was established is fatal.
fn kind_from_parts(connect: bool, timeout: bool, io_kinds: &[io::ErrorKind]) -> ErrorKind {
    if connect {
        return ErrorKind::NetworkTransient;
    }
    if timeout {
        return ErrorKind::Timeout;
    }
    if io_kinds.iter().any(|kind| is_transient_io(*kind)) {
        return ErrorKind::NetworkTransient;
    }

    ErrorKind::Unexpected
}

/// Socket level errors worth another attempt.
fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::UnexpectedEof
    )
}
