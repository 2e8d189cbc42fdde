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

use crate::body::{DatumFields, RequestBody};
use crate::constants::{MAX_BODY_BYTES, MAX_DATUMS_PER_REQUEST};
use crate::datum::{MetricDatum, Statistics};
use crate::transport::{SendOutcome, Transport};
use log::debug;
use putmetric_core::time::{format_rfc3339, DateTime};
use putmetric_core::{Error, Result};
use std::future::Future;
use std::mem;

/// RequestBuilder accumulates data points into bounded request bodies.
///
/// Bodies are filled in order: a datum goes into the first body that still
/// has room for it, a new body is appended otherwise. A datum is never split
/// across two bodies.
#[derive(Debug)]
pub struct RequestBuilder {
    namespace: String,
    max_datums: usize,
    max_bytes: usize,
    bodies: Vec<RequestBody>,
}

impl RequestBuilder {
    /// Create a builder for `namespace` with the service limits.
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            max_datums: MAX_DATUMS_PER_REQUEST,
            max_bytes: MAX_BODY_BYTES,
            bodies: Vec::new(),
        }
    }

    /// Override the per body limits.
    pub fn with_limits(mut self, max_datums: usize, max_bytes: usize) -> Self {
        self.max_datums = max_datums;
        self.max_bytes = max_bytes;
        self
    }

    /// Add a datum carrying a scalar value.
    pub fn add_single(&mut self, datum: &MetricDatum) -> Result<()> {
        let (ts, value) = datum.validate_single()?;

        let mut fields = preamble(datum, ts);
        fields.push(("Value".to_string(), value.to_string()));
        push_dimensions(&mut fields, datum);

        self.push(&datum.name, fields)
    }

    /// Add a datum carrying pre-computed statistics.
    ///
    /// Statistics with a sample count of zero are sent as all zeros.
    pub fn add_summary(&mut self, datum: &MetricDatum) -> Result<()> {
        let (ts, Statistics { sum, min, max, sample_count }) = datum.validate_summary()?;

        let mut fields = preamble(datum, ts);
        fields.push(("StatisticValues.Sum".to_string(), sum.to_string()));
        fields.push(("StatisticValues.Minimum".to_string(), min.to_string()));
        fields.push(("StatisticValues.Maximum".to_string(), max.to_string()));
        fields.push(("StatisticValues.SampleCount".to_string(), sample_count.to_string()));
        push_dimensions(&mut fields, datum);

        self.push(&datum.name, fields)
    }

    /// Add a datum, as a summary if it carries statistics.
    pub fn add(&mut self, datum: &MetricDatum) -> Result<()> {
        if datum.statistics.is_some() {
            self.add_summary(datum)
        } else {
            self.add_single(datum)
        }
    }

    /// Returns true if any body holds at least one datum.
    pub fn has_data(&self) -> bool {
        self.bodies.iter().any(|b| !b.is_empty())
    }

    /// Take every non-empty body in order and start over with an empty chain.
    pub fn take_batch(&mut self) -> Vec<RequestBody> {
        mem::take(&mut self.bodies)
            .into_iter()
            .filter(|b| !b.is_empty())
            .collect()
    }

    /// Drain the builder and deliver the drained bodies with `transport`.
    ///
    /// Draining happens before this returns, so data added while the returned
    /// future runs goes into a fresh chain. An empty builder resolves without
    /// any network call.
    pub fn send(
        &mut self,
        transport: &Transport,
    ) -> impl Future<Output = Result<Vec<SendOutcome>>> + Send + 'static {
        let batch = self.take_batch();
        let transport = transport.clone();

        async move { transport.send_batch(batch).await }
    }

    fn push(&mut self, name: &str, fields: DatumFields) -> Result<()> {
        for body in self.bodies.iter_mut() {
            if body.try_push(&fields)? {
                return Ok(());
            }
        }

        let mut body = RequestBody::new(&self.namespace, self.max_datums, self.max_bytes)?;
        if !body.try_push(&fields)? {
            return Err(Error::datum_invalid(format!(
                "metric {name} doesn't fit into a request body of {} bytes",
                self.max_bytes
            )));
        }
        self.bodies.push(body);
        debug!("request builder now holds {} bodies", self.bodies.len());
        Ok(())
    }
}

fn preamble(datum: &MetricDatum, ts: DateTime) -> DatumFields {
    let mut fields = vec![
        ("MetricName".to_string(), datum.name.clone()),
        ("Unit".to_string(), datum.unit.as_str().to_string()),
        ("Timestamp".to_string(), format_rfc3339(ts)),
    ];
    if let Some(resolution) = datum.resolution {
        fields.push(("StorageResolution".to_string(), resolution.seconds().to_string()));
    }
    fields
}

fn push_dimensions(fields: &mut DatumFields, datum: &MetricDatum) {
    let dims = datum.dimensions.iter().filter(|(_, v)| !v.is_empty());
    for (idx, (name, value)) in dims.enumerate() {
        let n = idx + 1;
        fields.push((format!("Dimensions.member.{n}.Name"), name.clone()));
        fields.push((format!("Dimensions.member.{n}.Value"), value.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{StorageResolution, Unit};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use putmetric_core::ErrorKind;
    use std::collections::HashMap;

    fn epoch() -> DateTime {
        chrono::Utc
            .timestamp_opt(0, 0)
            .single()
            .expect("epoch must be valid")
    }

    fn single(name: &str, value: f64) -> MetricDatum {
        MetricDatum::new(name)
            .with_timestamp(epoch())
            .with_unit(Unit::Count)
            .with_value(value)
    }

    fn parse(body: &RequestBody) -> Vec<(String, String)> {
        form_urlencoded::parse(body.as_str().as_bytes())
            .into_owned()
            .collect()
    }

    fn datum_fields(body: &RequestBody, index: usize) -> HashMap<String, String> {
        let prefix = format!("MetricData.member.{index}.");
        parse(body)
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|k| (k.to_string(), v)))
            .collect()
    }

    #[test]
    fn test_add_single_round_trip() -> anyhow::Result<()> {
        let name = "it's (really) *odd*!";
        let datum = MetricDatum::new(name)
            .with_timestamp(
                chrono::Utc
                    .timestamp_opt(1_700_000_000, 987_000_000)
                    .single()
                    .expect("must be valid"),
            )
            .with_unit(Unit::Milliseconds)
            .with_value(12.5)
            .with_resolution(StorageResolution::High)
            .with_dimension("host", "web 1/a")
            .with_dimension("dropped", "")
            .with_dimension("region", "eu-west-1");

        let mut builder = RequestBuilder::new("app (prod)");
        builder.add_single(&datum)?;
        let batch = builder.take_batch();
        assert_eq!(batch.len(), 1);
        for encoded in ["%21", "%27", "%28", "%29", "%2A"] {
            assert!(batch[0].as_str().contains(encoded), "{encoded}");
        }

        let pairs = parse(&batch[0]);
        assert_eq!(
            pairs[..3].to_vec(),
            vec![
                ("Action".to_string(), "PutMetricData".to_string()),
                ("Version".to_string(), "2010-08-01".to_string()),
                ("Namespace".to_string(), "app (prod)".to_string()),
            ]
        );

        let keys: Vec<&str> = pairs[3..].iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "MetricData.member.1.MetricName",
                "MetricData.member.1.Unit",
                "MetricData.member.1.Timestamp",
                "MetricData.member.1.StorageResolution",
                "MetricData.member.1.Value",
                "MetricData.member.1.Dimensions.member.1.Name",
                "MetricData.member.1.Dimensions.member.1.Value",
                "MetricData.member.1.Dimensions.member.2.Name",
                "MetricData.member.1.Dimensions.member.2.Value",
            ]
        );

        let fields = datum_fields(&batch[0], 1);
        assert_eq!(fields["MetricName"], name);
        assert_eq!(fields["Unit"], "Milliseconds");
        assert_eq!(fields["Timestamp"], "2023-11-14T22:13:20Z");
        assert_eq!(fields["StorageResolution"], "1");
        assert_eq!(fields["Value"], "12.5");
        assert_eq!(fields["Dimensions.member.1.Value"], "web 1/a");
        assert_eq!(fields["Dimensions.member.2.Name"], "region");
        Ok(())
    }

    #[test]
    fn test_add_summary_zero_count() -> anyhow::Result<()> {
        let datum = MetricDatum::new("latency")
            .with_timestamp(epoch())
            .with_statistics(Statistics {
                sum: 10.0,
                min: 2.0,
                max: 8.0,
                sample_count: 0.0,
            });

        let mut builder = RequestBuilder::new("telemetry");
        builder.add_summary(&datum)?;
        let batch = builder.take_batch();

        let fields = datum_fields(&batch[0], 1);
        for key in ["Sum", "Minimum", "Maximum", "SampleCount"] {
            assert_eq!(fields[&format!("StatisticValues.{key}")], "0", "{key}");
        }
        assert!(!fields.contains_key("Value"));
        assert!(!fields.contains_key("StorageResolution"));
        assert_eq!(fields["Unit"], "None");
        Ok(())
    }

    #[test]
    fn test_add_dispatches_by_payload() -> anyhow::Result<()> {
        let mut builder = RequestBuilder::new("telemetry");
        builder.add(&single("a", 1.0))?;
        builder.add(
            &MetricDatum::new("b")
                .with_timestamp(epoch())
                .with_statistics(Statistics {
                    sum: 3.0,
                    min: 1.0,
                    max: 2.0,
                    sample_count: 2.0,
                }),
        )?;

        let batch = builder.take_batch();
        assert_eq!(datum_fields(&batch[0], 1)["Value"], "1");
        assert_eq!(
            datum_fields(&batch[0], 2)["StatisticValues.SampleCount"],
            "2"
        );
        Ok(())
    }

    #[test]
    fn test_split_by_count() -> anyhow::Result<()> {
        let mut builder = RequestBuilder::new("telemetry");
        for i in 0..25 {
            builder.add_single(&single(&format!("metric.{i}"), i as f64))?;
        }

        let batch = builder.take_batch();
        assert_eq!(
            batch.iter().map(|b| b.count()).collect::<Vec<_>>(),
            vec![20, 5]
        );
        // Indices restart in every body.
        assert_eq!(datum_fields(&batch[1], 1)["MetricName"], "metric.20");
        assert!(datum_fields(&batch[1], 6).is_empty());
        assert!(!builder.has_data());
        Ok(())
    }

    #[test]
    fn test_split_count_is_ceil() -> anyhow::Result<()> {
        for n in [21usize, 40, 41, 99] {
            let mut builder = RequestBuilder::new("telemetry");
            for i in 0..n {
                builder.add_single(&single("m", i as f64))?;
            }

            let batch = builder.take_batch();
            assert_eq!(batch.len(), n.div_ceil(20), "n = {n}");
            assert_eq!(batch.iter().map(|b| b.count()).sum::<usize>(), n);
            assert!(batch
                .iter()
                .all(|b| b.count() <= MAX_DATUMS_PER_REQUEST && b.len() <= MAX_BODY_BYTES));
        }
        Ok(())
    }

    #[test]
    fn test_split_by_bytes() -> anyhow::Result<()> {
        let mut builder = RequestBuilder::new("telemetry").with_limits(20, 600);
        let long = "x".repeat(200);
        for _ in 0..4 {
            builder.add_single(&single(&long, 1.0))?;
        }

        let batch = builder.take_batch();
        assert!(batch.len() > 1);
        assert!(batch.iter().all(|b| b.len() <= 600));
        assert_eq!(batch.iter().map(|b| b.count()).sum::<usize>(), 4);
        Ok(())
    }

    #[test]
    fn test_oversized_datum_is_rejected() {
        let mut builder = RequestBuilder::new("telemetry");
        let err = builder
            .add_single(&single(&"x".repeat(MAX_BODY_BYTES), 1.0))
            .expect_err("must be rejected");

        assert_eq!(err.kind(), ErrorKind::DatumInvalid);
        assert!(!builder.has_data());
    }

    #[test]
    fn test_invalid_datum_leaves_builder_untouched() {
        let mut builder = RequestBuilder::new("telemetry");
        assert!(builder
            .add_single(&MetricDatum::new("m").with_value(1.0))
            .is_err());
        assert!(builder
            .add_single(&single("m", 1.0).with_dimension("", "v"))
            .is_err());
        assert!(!builder.has_data());
        assert!(builder.take_batch().is_empty());
    }

    #[test]
    fn test_take_batch_resets() -> anyhow::Result<()> {
        let mut builder = RequestBuilder::new("telemetry");
        builder.add_single(&single("a", 1.0))?;
        assert!(builder.has_data());

        assert_eq!(builder.take_batch().len(), 1);
        assert!(!builder.has_data());

        builder.add_single(&single("b", 2.0))?;
        let batch = builder.take_batch();
        assert_eq!(datum_fields(&batch[0], 1)["MetricName"], "b");
        Ok(())
    }
}
