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

use crate::provide_credential::{ConfigCredentialProvider, EnvCredentialProvider};
use crate::{Config, Credential};
use async_trait::async_trait;
use log::debug;
use putmetric_core::{Context, ProvideCredential, ProvideCredentialChain, Result};
use std::sync::Arc;

/// DefaultCredentialProvider will try to load credential from different sources.
///
/// Resolution order:
///
/// 1. Keys set on [`Config`]
/// 2. Environment variables
///
/// The region of the [`Config`], when set, replaces the region the credential
/// comes with, so requests are signed for the region configured by the host.
#[derive(Debug)]
pub struct DefaultCredentialProvider {
    chain: ProvideCredentialChain<Credential>,
    region: Option<String>,
}

impl DefaultCredentialProvider {
    /// Create a new `DefaultCredentialProvider` instance.
    pub fn new(config: Arc<Config>) -> Self {
        let region = config.region.clone();
        let chain = ProvideCredentialChain::new()
            .push(ConfigCredentialProvider::new(config))
            .push(EnvCredentialProvider::new());

        Self { chain, region }
    }

    /// Create with a custom credential chain.
    pub fn with_chain(chain: ProvideCredentialChain<Credential>, region: Option<String>) -> Self {
        Self { chain, region }
    }
}

#[async_trait]
impl ProvideCredential for DefaultCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let Some(mut cred) = self.chain.provide_credential(ctx).await? else {
            return Ok(None);
        };

        if let Some(region) = &self.region {
            if cred.region.as_ref() != Some(region) {
                debug!(
                    "using configured region {region} instead of {:?}",
                    cred.region
                );
                cred.region = Some(region.clone());
            }
        }
        Ok(Some(cred))
    }
}
