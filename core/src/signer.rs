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

use crate::time::{now, DateTime};
use crate::{Context, Error, ProvideCredential, Result, SignRequest, SigningCredential};
use log::debug;
use std::sync::{Arc, Mutex};

/// Signer is the main struct used to sign the request.
///
/// It owns the current credential and refreshes it through the configured
/// [`ProvideCredential`] whenever it is absent or stale.
#[derive(Clone, Debug)]
pub struct Signer<K: SigningCredential> {
    ctx: Context,
    loader: Arc<dyn ProvideCredential<Credential = K>>,
    builder: Arc<dyn SignRequest<Credential = K>>,
    credential: Arc<Mutex<Option<K>>>,
}

impl<K: SigningCredential> Signer<K> {
    /// Create a new signer.
    pub fn new(
        ctx: Context,
        loader: impl ProvideCredential<Credential = K>,
        builder: impl SignRequest<Credential = K>,
    ) -> Self {
        Self {
            ctx,

            loader: Arc::new(loader),
            builder: Arc::new(builder),
            credential: Arc::new(Mutex::new(None)),
        }
    }

    /// The context this signer was built with.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Signing request with current time.
    pub async fn sign(&self, req: &mut http::request::Parts, body: &[u8]) -> Result<()> {
        self.sign_at(req, body, now()).await
    }

    /// Signing request at the given time.
    pub async fn sign_at(
        &self,
        req: &mut http::request::Parts,
        body: &[u8],
        now: DateTime,
    ) -> Result<()> {
        let cred = self.credential.lock().expect("lock poisoned").clone();
        let cred = match cred {
            Some(cred) if cred.is_valid() => cred,
            _ => self.refresh().await?,
        };

        self.builder
            .sign_request(&self.ctx, req, body, &cred, now)
            .await
    }

    async fn refresh(&self) -> Result<K> {
        debug!("credential is absent or stale, refreshing");

        let Some(cred) = self.loader.provide_credential(&self.ctx).await? else {
            return Err(Error::config_invalid(
                "no credential could be loaded from any provider",
            ));
        };
        cred.validate()?;
        if !cred.is_valid() {
            return Err(Error::credential_expired(
                "credential is still stale right after refresh",
            ));
        }

        *self.credential.lock().expect("lock poisoned") = Some(cred.clone());
        Ok(cred)
    }
}
