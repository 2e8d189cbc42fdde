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

//! Publish metric data points as SigV4 signed `PutMetricData` requests.
//!
//! Data points are accumulated into form encoded request bodies that honor
//! the per request limits of the service (20 data points, 40 KiB). Overflow
//! is split transparently into more bodies. Each body is signed with AWS
//! Signature Version 4 and delivered with a fixed delay retry on transient
//! failures.
//!
//! ## Quick Start
//!
//! ```no_run
//! use putmetric_cloudwatch::{Config, MetricDatum, Publisher, Unit};
//! use putmetric_core::{Context, OsEnv, Result};
//! use putmetric_http_send_reqwest::ReqwestHttpSend;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = Context::new()
//!         .with_http_send(ReqwestHttpSend::default())
//!         .with_env(OsEnv);
//!
//!     // Namespace, region and endpoint may come from env.
//!     let config = Config::default().from_env(&ctx);
//!     let publisher = Publisher::from_config(ctx, config)?;
//!
//!     publisher.publish(
//!         &MetricDatum::new("requests")
//!             .with_timestamp(chrono::Utc::now())
//!             .with_unit(Unit::Count)
//!             .with_value(1.0)
//!             .with_dimension("host", "web-1"),
//!     )?;
//!
//!     publisher.stop().await
//! }
//! ```
//!
//! ## Lower level
//!
//! [`RequestBuilder`] and [`Transport`] can be driven directly. The builder is
//! drained synchronously by [`RequestBuilder::send`], so data added while the
//! returned future runs starts a new batch.
//!
//! Every signed attempt can be observed through [`ObserveRequest`].

#![warn(missing_docs)]

mod constants;

mod config;
pub use config::Config;

mod credential;
pub use credential::Credential;

mod signing_key;
pub use signing_key::generate_signing_key;
pub use signing_key::SigningKeyCache;
pub use signing_key::SIGNING_KEY_CACHE_CAPACITY;

mod sign_request;
pub use sign_request::form_body;
pub use sign_request::RequestSigner;

mod datum;
pub use datum::MetricDatum;
pub use datum::Statistics;
pub use datum::StorageResolution;
pub use datum::Unit;

mod body;
pub use body::RequestBody;

mod builder;
pub use builder::RequestBuilder;

mod transport;
pub use transport::NoopObserver;
pub use transport::ObserveRequest;
pub use transport::RetryPolicy;
pub use transport::SendOutcome;
pub use transport::Transport;

mod publisher;
pub use publisher::Publisher;

mod provide_credential;
pub use provide_credential::*;
