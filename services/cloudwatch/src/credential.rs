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

use putmetric_core::time::{now, DateTime};
use putmetric_core::utils::Redact;
use putmetric_core::{Error, Result, SigningCredential};
use std::fmt::{Debug, Formatter};

/// Credentials are considered stale this long before they actually expire.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Credential that holds the access_key and secret_key, plus the region the
/// metrics are sent to.
#[derive(Default, Clone)]
pub struct Credential {
    /// Access key id for aws services.
    pub access_key_id: String,
    /// Secret access key for aws services.
    pub secret_access_key: String,
    /// Session token for aws services.
    pub session_token: Option<String>,
    /// Expiration time for this credential.
    pub expires_in: Option<DateTime>,
    /// Region resolved together with the credential.
    pub region: Option<String>,
}

impl Credential {
    /// Region of this credential, empty if unset.
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or_default()
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("expires_in", &self.expires_in)
            .field("region", &self.region)
            .finish()
    }
}

impl SigningCredential for Credential {
    fn is_valid(&self) -> bool {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return false;
        }

        match self.expires_in {
            Some(expires_in) => {
                now() < expires_in - chrono::TimeDelta::seconds(EXPIRY_MARGIN_SECS)
            }
            None => true,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.access_key_id.is_empty() {
            return Err(Error::config_invalid("access key id is missing"));
        }
        if self.secret_access_key.is_empty() {
            return Err(Error::config_invalid("secret access key is missing"));
        }
        if self.region().is_empty() {
            return Err(Error::config_invalid("region is missing"));
        }
        Ok(())
    }
}
