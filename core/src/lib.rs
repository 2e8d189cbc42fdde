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

//! Core components for signing and delivering metric submissions.
//!
//! This crate provides the foundational types and traits shared by the
//! putmetric crates.
//!
//! ## Overview
//!
//! - **Context**: A container that holds implementations for HTTP sending and environment access
//! - **Traits**: Abstract interfaces for credential loading (`ProvideCredential`) and request signing (`SignRequest`)
//! - **Signer**: The orchestrator that caches the credential, refreshes it when stale and signs requests
//!
//! ## Example
//!
//! ```no_run
//! use putmetric_core::time::DateTime;
//! use putmetric_core::{Context, ProvideCredential, Result, SignRequest, Signer, SigningCredential};
//! use async_trait::async_trait;
//! use http::request::Parts;
//!
//! #[derive(Clone, Debug)]
//! struct MyCredential {
//!     key: String,
//! }
//!
//! impl SigningCredential for MyCredential {
//!     fn is_valid(&self) -> bool {
//!         !self.key.is_empty()
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MyLoader;
//!
//! #[async_trait]
//! impl ProvideCredential for MyLoader {
//!     type Credential = MyCredential;
//!
//!     async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
//!         Ok(Some(MyCredential {
//!             key: "my-access-key".to_string(),
//!         }))
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MyBuilder;
//!
//! #[async_trait]
//! impl SignRequest for MyBuilder {
//!     type Credential = MyCredential;
//!
//!     async fn sign_request(
//!         &self,
//!         _ctx: &Context,
//!         _req: &mut Parts,
//!         _body: &[u8],
//!         _cred: &Self::Credential,
//!         _now: DateTime,
//!     ) -> Result<()> {
//!         todo!()
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let signer = Signer::new(Context::new(), MyLoader, MyBuilder);
//!
//! let mut parts = http::Request::builder()
//!     .method("POST")
//!     .uri("https://example.com/")
//!     .body(())
//!     .unwrap()
//!     .into_parts()
//!     .0;
//!
//! signer.sign(&mut parts, b"Action=Ping").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Utilities
//!
//! - [`hash`]: Cryptographic hashing utilities
//! - [`time`]: Time formatting utilities
//! - [`utils`]: General utilities including secret redaction

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::{Context, Env, HttpSend, NoopEnv, NoopHttpSend, OsEnv, StaticEnv};

mod error;
pub use error::{Error, ErrorKind, Result};

mod api;
pub use api::{ProvideCredential, SignRequest, SigningCredential};
mod chain;
pub use chain::ProvideCredentialChain;
mod request;
pub use request::SigningRequest;
mod signer;
pub use signer::Signer;
