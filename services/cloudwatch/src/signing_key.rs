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

use std::fmt::{self, Debug};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use once_cell::sync::Lazy;
use putmetric_core::hash::hmac_sha256;

/// Capacity of the process wide signing key cache.
pub const SIGNING_KEY_CACHE_CAPACITY: usize = 1000;

/// Process wide cache shared by every signer.
static SIGNING_KEY_CACHE: Lazy<SigningKeyCache> =
    Lazy::new(|| SigningKeyCache::new(SIGNING_KEY_CACHE_CAPACITY));

/// (secret, date, region, service)
type CacheKey = (String, String, String, String);

/// LRU cache for derived SigV4 signing keys.
///
/// A signing key only depends on the secret, the UTC calendar day, the region
/// and the service, so it can be reused by every request signed on that day.
pub struct SigningKeyCache {
    keys: Mutex<LruCache<CacheKey, Vec<u8>>>,
}

impl SigningKeyCache {
    /// Create a cache holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            keys: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The process wide cache.
    pub fn global() -> &'static SigningKeyCache {
        &SIGNING_KEY_CACHE
    }

    /// Return the cached signing key or derive and cache it.
    pub fn get_or_derive(&self, secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
        let key = (
            secret.to_string(),
            date.to_string(),
            region.to_string(),
            service.to_string(),
        );

        if let Some(v) = self.keys.lock().expect("lock poisoned").get(&key) {
            return v.clone();
        }

        let signing_key = generate_signing_key(secret, date, region, service);
        self.keys
            .lock()
            .expect("lock poisoned")
            .put(key, signing_key.clone());
        signing_key
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.lock().expect("lock poisoned").len()
    }

    /// Returns true if no key is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for SigningKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys.lock().expect("lock poisoned");
        f.debug_struct("SigningKeyCache")
            .field("len", &keys.len())
            .field("cap", &keys.cap())
            .finish()
    }
}

/// Derive the SigV4 signing key for `date` (formatted as `20220313`).
pub fn generate_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    // Sign secret
    let secret = format!("AWS4{secret}");
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    // Sign request
    hmac_sha256(sign_service.as_slice(), "aws4_request".as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn test_generate_signing_key() {
        // Example from "Examples of how to derive a signing key for Signature Version 4".
        let key = generate_signing_key(SECRET, "20120215", "us-east-1", "iam");
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_cache_hit_returns_same_key() {
        let cache = SigningKeyCache::new(4);
        let first = cache.get_or_derive(SECRET, "20240101", "us-east-1", "monitoring");
        let second = cache.get_or_derive(SECRET, "20240101", "us-east-1", "monitoring");

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            first,
            generate_signing_key(SECRET, "20240101", "us-east-1", "monitoring")
        );
    }

    #[test]
    fn test_cache_evicts_least_recent() {
        let cache = SigningKeyCache::new(2);
        cache.get_or_derive(SECRET, "20240101", "us-east-1", "monitoring");
        cache.get_or_derive(SECRET, "20240102", "us-east-1", "monitoring");
        // Touch the first entry so the second one becomes least recent.
        cache.get_or_derive(SECRET, "20240101", "us-east-1", "monitoring");
        cache.get_or_derive(SECRET, "20240103", "us-east-1", "monitoring");

        assert_eq!(cache.len(), 2);
        let keys = cache.keys.lock().expect("lock poisoned");
        let date_of = |k: &CacheKey| k.1.clone();
        let mut dates: Vec<_> = keys.iter().map(|(k, _)| date_of(k)).collect();
        dates.sort();
        assert_eq!(dates, vec!["20240101", "20240103"]);
    }

    #[test]
    fn test_cache_concurrent_access() {
        let cache = Arc::new(SigningKeyCache::new(SIGNING_KEY_CACHE_CAPACITY));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let region = format!("region-{}", i % 4);
                    cache.get_or_derive(SECRET, "20240101", &region, "monitoring")
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread must not panic");
        }
        assert_eq!(cache.len(), 4);
    }
}
