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

use std::mem;

use crate::{Error, Result};
use http::uri::Authority;
use http::HeaderMap;
use http::HeaderValue;
use http::Method;

/// Signing context for request.
#[derive(Debug)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// HTTP authority.
    pub authority: Authority,
    /// HTTP path.
    pub path: String,
    /// HTTP query string, without the leading `?`.
    pub query: String,
    /// HTTP headers.
    pub headers: HeaderMap,
}

impl SigningRequest {
    /// Build a signing context from http::request::Parts.
    pub fn build(parts: &mut http::request::Parts) -> Result<Self> {
        let authority = parts
            .uri
            .authority()
            .cloned()
            .ok_or_else(|| {
                Error::request_invalid("request without authority is invalid for signing")
            })?;

        Ok(SigningRequest {
            method: parts.method.clone(),
            authority,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),

            // Take the headers out of the request to avoid copy.
            // We will return it back when apply the context.
            headers: mem::take(&mut parts.headers),
        })
    }

    /// Apply the signing context back to http::request::Parts.
    pub fn apply(mut self, parts: &mut http::request::Parts) -> Result<()> {
        mem::swap(&mut parts.headers, &mut self.headers);
        parts.method = self.method;
        Ok(())
    }

    /// Normalize header value.
    ///
    /// Leading and trailing whitespace is trimmed and every inner run of
    /// whitespace collapses into a single space.
    pub fn header_value_normalize(v: &mut HeaderValue) {
        let bs = v.as_bytes();
        if !bs.iter().any(|b| b.is_ascii_whitespace()) {
            return;
        }

        let mut normalized = Vec::with_capacity(bs.len());
        for word in bs
            .split(|b| b.is_ascii_whitespace())
            .filter(|w| !w.is_empty())
        {
            if !normalized.is_empty() {
                normalized.push(b' ');
            }
            normalized.extend_from_slice(word);
        }

        let sensitive = v.is_sensitive();
        // This can't fail because we started with a valid HeaderValue and then only removed whitespace
        *v = HeaderValue::from_bytes(&normalized).expect("invalid header value");
        v.set_sensitive(sensitive);
    }
}
