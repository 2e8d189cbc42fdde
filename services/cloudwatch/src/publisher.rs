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

use crate::builder::RequestBuilder;
use crate::datum::MetricDatum;
use crate::provide_credential::DefaultCredentialProvider;
use crate::transport::{SendOutcome, Transport};
use crate::{Config, RequestSigner};
use log::{debug, error};
use putmetric_core::{Context, Result, Signer};
use std::sync::{Arc, Mutex};

/// Publisher accumulates data points and delivers them on flush.
///
/// `publish` never waits on the network. Flushes are serialized: a flush
/// requested while another one is in flight waits for it, then drains what
/// was published in between. Waiters are served in the order they arrived.
#[derive(Debug)]
pub struct Publisher {
    builder: Mutex<RequestBuilder>,
    transport: Transport,
    flushing: tokio::sync::Mutex<()>,
}

impl Publisher {
    /// Create a publisher from its parts.
    pub fn new(builder: RequestBuilder, transport: Transport) -> Self {
        Self {
            builder: Mutex::new(builder),
            transport,
            flushing: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a publisher from `config`.
    ///
    /// Credentials come from the config keys first, then from env. Without
    /// an explicit endpoint, requests go to the regional endpoint of the
    /// region they are signed for.
    pub fn from_config(ctx: Context, config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let signer = Signer::new(
            ctx,
            DefaultCredentialProvider::new(config.clone()),
            RequestSigner::default(),
        );
        let transport = match config.endpoint() {
            Some(endpoint) => Transport::new(signer, endpoint)?,
            None => Transport::regional(signer),
        }
        .with_timeout(config.timeout())
        .with_retry(config.retry_policy());
        let builder = RequestBuilder::new(&config.namespace)
            .with_limits(config.max_datums, config.max_bytes);

        debug!(
            "publishing to {} under namespace {}",
            config.endpoint().unwrap_or("the regional endpoint"),
            config.namespace
        );
        Ok(Self::new(builder, transport))
    }

    /// Validate and accumulate a data point.
    pub fn publish(&self, datum: &MetricDatum) -> Result<()> {
        self.builder.lock().expect("lock poisoned").add(datum)
    }

    /// Returns true if data points are waiting for the next flush.
    pub fn has_data(&self) -> bool {
        self.builder.lock().expect("lock poisoned").has_data()
    }

    /// Deliver everything published so far.
    pub async fn flush(&self) -> Result<Vec<SendOutcome>> {
        let _guard = self.flushing.lock().await;

        let send = self
            .builder
            .lock()
            .expect("lock poisoned")
            .send(&self.transport);
        send.await
    }

    /// Wait for the in-flight flush, then flush until nothing is left.
    ///
    /// Every round is attempted even if an earlier one failed; the first
    /// error is returned.
    pub async fn stop(&self) -> Result<()> {
        let mut first_err = None;

        loop {
            if let Err(err) = self.flush().await {
                error!("flush failed while stopping, data points are lost: {err}");
                first_err.get_or_insert(err);
            }
            if !self.has_data() {
                break;
            }
            debug!("data points arrived during the final flush, flushing again");
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provide_credential::StaticCredentialProvider;
    use crate::transport::RetryPolicy;
    use crate::Unit;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use crate::constants::{
        AWS_ACCESS_KEY_ID, AWS_DEFAULT_REGION, AWS_REGION, AWS_SECRET_ACCESS_KEY,
    };
    use putmetric_core::{Error, ErrorKind, HttpSend, StaticEnv};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// HttpSend that parks every request until released.
    #[derive(Debug, Default)]
    struct GatedHttpSend {
        gate: Arc<Notify>,
        calls: Arc<AtomicUsize>,
        datums: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl HttpSend for GatedHttpSend {
        async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = String::from_utf8_lossy(req.body()).to_string();
            self.datums
                .lock()
                .expect("lock poisoned")
                .push(body.matches(".MetricName=").count());

            self.gate.notified().await;
            Ok(http::Response::builder()
                .status(200)
                .body(Bytes::new())
                .map_err(Error::from)?)
        }
    }

    /// HttpSend answering 200 and recording `(host, authorization)`.
    #[derive(Debug, Default, Clone)]
    struct RecordingHttpSend {
        seen: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl HttpSend for RecordingHttpSend {
        async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
            let host = req.uri().host().unwrap_or_default().to_string();
            let auth = req.headers()[http::header::AUTHORIZATION].to_str()?;
            self.seen
                .lock()
                .expect("lock poisoned")
                .push((host, auth.to_string()));

            Ok(http::Response::builder()
                .status(200)
                .body(Bytes::new())
                .map_err(Error::from)?)
        }
    }

    fn env_ctx(http: RecordingHttpSend, envs: &[(&str, &str)]) -> Context {
        Context::new().with_http_send(http).with_env(StaticEnv {
            envs: envs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        })
    }

    fn datum(name: &str) -> MetricDatum {
        MetricDatum::new(name)
            .with_timestamp(Utc::now())
            .with_unit(Unit::Count)
            .with_value(1.0)
    }

    fn publisher(http: GatedHttpSend) -> Publisher {
        let signer = Signer::new(
            Context::new().with_http_send(http),
            StaticCredentialProvider::new("AKIDEXAMPLE", "secret").with_region("us-east-1"),
            RequestSigner::default(),
        );
        let transport = Transport::new(signer, "https://monitoring.us-east-1.amazonaws.com")
            .expect("endpoint must be valid")
            .with_retry(RetryPolicy {
                enabled: false,
                ..Default::default()
            });
        Publisher::new(RequestBuilder::new("telemetry"), transport)
    }

    /// Publish one data point and return the `(host, authorization)` sent.
    async fn deliver(ctx: Context, http: &RecordingHttpSend, config: Config) -> (String, String) {
        let p = Publisher::from_config(ctx.clone(), config.from_env(&ctx))
            .expect("publisher must build");
        p.publish(&datum("m")).expect("datum must be valid");
        p.stop().await.expect("delivery must succeed");

        let seen = http.seen.lock().expect("lock poisoned");
        assert_eq!(seen.len(), 1);
        seen[0].clone()
    }

    #[tokio::test]
    async fn test_host_matches_scope_with_config_region() {
        let http = RecordingHttpSend::default();
        let ctx = env_ctx(
            http.clone(),
            &[
                (AWS_ACCESS_KEY_ID, "env_ak"),
                (AWS_SECRET_ACCESS_KEY, "env_sk"),
                (AWS_REGION, "eu-west-1"),
            ],
        );
        let config = Config {
            region: Some("us-east-1".to_string()),
            ..Default::default()
        };

        let (host, auth) = deliver(ctx, &http, config).await;
        assert_eq!(host, "monitoring.us-east-1.amazonaws.com");
        assert!(auth.contains("Credential=env_ak/"), "{auth}");
        assert!(auth.contains("/us-east-1/monitoring/aws4_request,"), "{auth}");
    }

    #[tokio::test]
    async fn test_default_region_only() {
        let http = RecordingHttpSend::default();
        let ctx = env_ctx(
            http.clone(),
            &[
                (AWS_ACCESS_KEY_ID, "env_ak"),
                (AWS_SECRET_ACCESS_KEY, "env_sk"),
                (AWS_DEFAULT_REGION, "eu-west-1"),
            ],
        );

        let (host, auth) = deliver(ctx, &http, Config::default()).await;
        assert_eq!(host, "monitoring.eu-west-1.amazonaws.com");
        assert!(auth.contains("/eu-west-1/monitoring/aws4_request,"), "{auth}");
    }

    #[tokio::test]
    async fn test_host_follows_credential_region_without_config_region() {
        let http = RecordingHttpSend::default();
        let ctx = env_ctx(
            http.clone(),
            &[
                (AWS_ACCESS_KEY_ID, "env_ak"),
                (AWS_SECRET_ACCESS_KEY, "env_sk"),
                (AWS_REGION, "ap-south-1"),
            ],
        );

        // Skip `from_env` so the region only reaches the credential.
        let p = Publisher::from_config(ctx, Config::default())
            .expect("publisher must build");
        p.publish(&datum("m")).expect("datum must be valid");
        p.stop().await.expect("delivery must succeed");

        let seen = http.seen.lock().expect("lock poisoned");
        assert_eq!(seen[0].0, "monitoring.ap-south-1.amazonaws.com");
        assert!(seen[0].1.contains("/ap-south-1/monitoring/aws4_request,"));
    }

    #[tokio::test]
    async fn test_publish_rejects_invalid_datum() {
        let p = publisher(GatedHttpSend::default());
        let err = p
            .publish(&MetricDatum::new("m").with_value(1.0))
            .expect_err("must be rejected");

        assert_eq!(err.kind(), ErrorKind::DatumInvalid);
        assert!(!p.has_data());
    }

    #[tokio::test]
    async fn test_flush_without_data() -> anyhow::Result<()> {
        let http = GatedHttpSend::default();
        let calls = http.calls.clone();
        let p = publisher(http);

        assert!(p.flush().await?.is_empty());
        p.stop().await?;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_waits_for_inflight_flush_and_drains() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let http = GatedHttpSend::default();
        let gate = http.gate.clone();
        let calls = http.calls.clone();
        let datums = http.datums.clone();
        let p = Arc::new(publisher(http));

        p.publish(&datum("first"))?;
        let inflight = tokio::spawn({
            let p = p.clone();
            async move { p.flush().await }
        });
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // Published while the first flush is in flight.
        p.publish(&datum("second"))?;
        p.publish(&datum("third"))?;
        let stop = tokio::spawn({
            let p = p.clone();
            async move { p.stop().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "stop must wait");

        gate.notify_one();
        while calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        gate.notify_one();

        inflight.await??;
        stop.await??;
        assert_eq!(*datums.lock().expect("lock poisoned"), vec![1, 2]);
        assert!(!p.has_data());
        Ok(())
    }
}
