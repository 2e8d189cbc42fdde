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

use crate::time::DateTime;
use crate::{Context, Result};
use std::fmt::Debug;

/// SigningCredential is the trait used by signer as the signing credential.
pub trait SigningCredential: Clone + Debug + Send + Sync + Unpin + 'static {
    /// Check if the credential is complete and not about to expire.
    fn is_valid(&self) -> bool;

    /// Check that every field required for signing is present.
    ///
    /// Called on a freshly provided credential; a failure aborts signing with
    /// a configuration error.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// ProvideCredential is the trait used by signer to load the credential from the environment.
#[async_trait::async_trait]
pub trait ProvideCredential: Debug + Send + Sync + Unpin + 'static {
    /// Credential returned by this loader.
    type Credential: Send + Sync + Unpin + 'static;

    /// Load signing credential from current env.
    ///
    /// Returns `Ok(None)` if this provider has nothing to offer.
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>>;
}

/// SignRequest is the trait used by signer to sign a request carrying `body`.
#[async_trait::async_trait]
pub trait SignRequest: Debug + Send + Sync + Unpin + 'static {
    /// Credential used by this builder.
    type Credential: Send + Sync + Unpin + 'static;

    /// Sign the request in place.
    ///
    /// ## Body
    ///
    /// The `body` is the exact payload that will be transmitted; its digest
    /// becomes part of the signature.
    ///
    /// ## Now
    ///
    /// The `now` parameter is the signing time. Passing the same body,
    /// credential and time must produce the same signature.
    async fn sign_request(
        &self,
        ctx: &Context,
        req: &mut http::request::Parts,
        body: &[u8],
        credential: &Self::Credential,
        now: DateTime,
    ) -> Result<()>;
}
