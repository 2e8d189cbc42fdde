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

use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// The error type for putmetric operations
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<StatusCode>,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A metric datum is malformed (missing timestamp, bad resolution, empty
    /// dimension name, oversized datum...)
    DatumInvalid,

    /// Credentials are expired, even right after a refresh
    CredentialExpired,

    /// Request cannot be signed (empty form key, invalid header...)
    RequestInvalid,

    /// Configuration error (missing fields, invalid values)
    ConfigInvalid,

    /// Transport failed before a response arrived: DNS failure, connection
    /// refused or reset, unreachable host, broken pipe.
    NetworkTransient,

    /// Server answered with 429 or a 5xx status
    ServerTransient,

    /// Request exceeded the configured timeout
    Timeout,

    /// Server answered with a non-retryable, non-2xx status
    RequestRejected,

    /// Unexpected errors (I/O, service errors, etc.)
    Unexpected,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the HTTP status that produced this error
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the HTTP status of the response that failed, if any
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Check if this is a credential error
    pub fn is_credential_error(&self) -> bool {
        self.kind == ErrorKind::CredentialExpired
    }

    /// Check if the failed operation may succeed when attempted again.
    ///
    /// Timeouts are not retryable: a request that already exceeded
    /// the configured timeout is not sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NetworkTransient | ErrorKind::ServerTransient
        )
    }
}

// Convenience constructors
impl Error {
    /// Create a datum invalid error
    pub fn datum_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatumInvalid, message)
    }

    /// Create a credential expired error
    pub fn credential_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialExpired, message)
    }

    /// Create a request invalid error
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Create a config invalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a transient network error
    pub fn network_transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkTransient, message)
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create an error from a non-2xx HTTP status.
    ///
    /// 429 and 5xx are classified as transient, everything else as rejected.
    pub fn from_status(status: StatusCode) -> Self {
        let kind = if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            ErrorKind::ServerTransient
        } else {
            ErrorKind::RequestRejected
        };

        Self::new(kind, format!("HTTP {}", status.as_u16())).with_status(status)
    }

    /// Create an unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::DatumInvalid => write!(f, "invalid metric datum"),
            ErrorKind::CredentialExpired => write!(f, "expired credentials"),
            ErrorKind::RequestInvalid => write!(f, "invalid request"),
            ErrorKind::ConfigInvalid => write!(f, "invalid configuration"),
            ErrorKind::NetworkTransient => write!(f, "transient network error"),
            ErrorKind::ServerTransient => write!(f, "transient server error"),
            ErrorKind::Timeout => write!(f, "request timed out"),
            ErrorKind::RequestRejected => write!(f, "request rejected"),
            ErrorKind::Unexpected => write!(f, "unexpected error"),
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

// Common From implementations
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::config_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(err: http::header::ToStrError) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}
