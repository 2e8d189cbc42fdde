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

use crate::constants::*;
use crate::transport::RetryPolicy;
use putmetric_core::utils::Redact;
use putmetric_core::{Context, Error, Result};
use serde::Deserialize;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// Config for publishing metrics.
///
/// Durations are given in milliseconds. Every field has a default, so a host
/// only needs to set what it cares about:
///
/// ```
/// use putmetric_cloudwatch::Config;
///
/// let config = Config::from_toml_str(
///     r#"
///     namespace = "my-app"
///     region = "eu-west-1"
///     retry_delay = 250
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.timeout, 60_000);
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `namespace` data points are published under.
    ///
    /// - env value: `PUTMETRIC_NAMESPACE`
    /// - default to `telemetry`
    pub namespace: String,
    /// Retry transient failures, default to `true`.
    pub retry: bool,
    /// Delay between two attempts in milliseconds, default to `1000`.
    pub retry_delay: u64,
    /// Timeout of one attempt in milliseconds, default to `60000`.
    pub timeout: u64,
    /// Upper bound of attempts per request body, default to `3`.
    pub max_attempts: usize,
    /// `access_key_id` used instead of discovering credentials.
    pub access_key_id: Option<String>,
    /// `secret_access_key` used instead of discovering credentials.
    pub secret_access_key: Option<String>,
    /// `session_token` sent along with the static keys.
    pub session_token: Option<String>,
    /// `region` will be loaded from:
    ///
    /// - this field if it's `is_some`
    /// - env value: `AWS_REGION`
    /// - env value: `AWS_DEFAULT_REGION`
    ///
    /// When set, it wins over the region a credential comes with.
    pub region: Option<String>,
    /// `endpoint` will be loaded from:
    ///
    /// - this field if it's `is_some`
    /// - env value: `PUTMETRIC_ENDPOINT`
    /// - default to `https://monitoring.<region>.amazonaws.com`, where
    ///   `<region>` is the region requests are signed for
    pub endpoint: Option<String>,
    /// Upper bound of data points per request body, default to `20`.
    pub max_datums: usize,
    /// Upper bound of a request body in bytes, default to `40960`.
    pub max_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "telemetry".to_string(),
            retry: true,
            retry_delay: 1000,
            timeout: 60_000,
            max_attempts: 3,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            region: None,
            endpoint: None,
            max_datums: MAX_DATUMS_PER_REQUEST,
            max_bytes: MAX_BODY_BYTES,
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("namespace", &self.namespace)
            .field("retry", &self.retry)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("max_datums", &self.max_datums)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

impl Config {
    /// Parse config from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| Error::config_invalid("failed to parse config as toml").with_source(e))
    }

    /// Load config from env.
    ///
    /// Values already set on this config are kept for `region` and
    /// `endpoint`; `namespace` from env always wins.
    pub fn from_env(mut self, ctx: &Context) -> Self {
        if let Some(v) = ctx.env_var(PUTMETRIC_NAMESPACE) {
            self.namespace = v;
        }
        if self.endpoint.is_none() {
            self.endpoint = ctx.env_var(PUTMETRIC_ENDPOINT);
        }
        if self.region.is_none() {
            self.region = ctx
                .env_var(AWS_REGION)
                .or_else(|| ctx.env_var(AWS_DEFAULT_REGION));
        }
        self
    }

    /// Check the config for values that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::config_invalid("namespace must not be empty"));
        }
        if self.retry_delay == 0 {
            return Err(Error::config_invalid("retry_delay must be positive"));
        }
        if self.timeout == 0 {
            return Err(Error::config_invalid("timeout must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(Error::config_invalid("max_attempts must be positive"));
        }
        if self.max_datums == 0 || self.max_datums > MAX_DATUMS_PER_REQUEST {
            return Err(Error::config_invalid(format!(
                "max_datums must be within 1..={MAX_DATUMS_PER_REQUEST}"
            )));
        }
        if self.max_bytes == 0 || self.max_bytes > MAX_BODY_BYTES {
            return Err(Error::config_invalid(format!(
                "max_bytes must be within 1..={MAX_BODY_BYTES}"
            )));
        }
        Ok(())
    }

    /// Endpoint requests are posted to, if set explicitly.
    ///
    /// `None` means the regional endpoint of the credential each request is
    /// signed with, so host and signing scope never disagree.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Retry policy described by this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            enabled: self.retry,
            delay: Duration::from_millis(self.retry_delay),
            max_attempts: self.max_attempts,
        }
    }

    /// Timeout of one attempt.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}
