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

use crate::constants::{ACTION, API_VERSION};
use crate::sign_request::form_body;
use putmetric_core::Result;

/// Fields of one datum, keyed relative to `MetricData.member.N.`.
pub(crate) type DatumFields = Vec<(String, String)>;

/// One form encoded `PutMetricData` request body.
///
/// A body never holds more than `max_datums` data points nor more than
/// `max_bytes` bytes. Data points are numbered from 1 within the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    query: String,
    count: usize,
    max_datums: usize,
    max_bytes: usize,
}

impl RequestBody {
    /// Create an empty body for `namespace`.
    pub fn new(namespace: &str, max_datums: usize, max_bytes: usize) -> Result<Self> {
        let query = form_body(&[
            ("Action", ACTION),
            ("Version", API_VERSION),
            ("Namespace", namespace),
        ])?;

        Ok(Self {
            query,
            count: 0,
            max_datums,
            max_bytes,
        })
    }

    /// Append a datum if it fits both ceilings.
    ///
    /// Returns `Ok(false)` and leaves the body untouched when it doesn't.
    pub(crate) fn try_push(&mut self, fields: &[(String, String)]) -> Result<bool> {
        if self.count >= self.max_datums {
            return Ok(false);
        }

        let encoded = encode_datum(self.count + 1, fields)?;
        if self.query.len() + encoded.len() > self.max_bytes {
            return Ok(false);
        }

        self.query.push_str(&encoded);
        self.count += 1;
        Ok(true)
    }

    /// Number of data points in this body.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Size of the serialized body in bytes.
    pub fn len(&self) -> usize {
        self.query.len()
    }

    /// Returns true if no data point has been added.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The serialized body.
    pub fn as_str(&self) -> &str {
        &self.query
    }
}

/// Serialize `fields` as `&MetricData.member.<index>.<key>=<value>...`.
fn encode_datum(index: usize, fields: &[(String, String)]) -> Result<String> {
    let pairs: Vec<(String, &str)> = fields
        .iter()
        .map(|(k, v)| (format!("MetricData.member.{index}.{k}"), v.as_str()))
        .collect();

    let mut s = String::from("&");
    s.push_str(&form_body(&pairs)?);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(value: &str) -> DatumFields {
        vec![
            ("MetricName".to_string(), "m".to_string()),
            ("Value".to_string(), value.to_string()),
        ]
    }

    #[test]
    fn test_new_body_preamble() {
        let body = RequestBody::new("my app", 20, 1024).expect("must build");
        assert_eq!(
            body.as_str(),
            "Action=PutMetricData&Version=2010-08-01&Namespace=my%20app"
        );
        assert!(body.is_empty());
    }

    #[test]
    fn test_try_push_indexes_from_one() {
        let mut body = RequestBody::new("ns", 20, 1024).expect("must build");
        assert!(body.try_push(&fields("1")).expect("must encode"));
        assert!(body.try_push(&fields("2")).expect("must encode"));

        assert_eq!(
            body.as_str(),
            "Action=PutMetricData&Version=2010-08-01&Namespace=ns\
             &MetricData.member.1.MetricName=m&MetricData.member.1.Value=1\
             &MetricData.member.2.MetricName=m&MetricData.member.2.Value=2"
        );
        assert_eq!(body.count(), 2);
    }

    #[test]
    fn test_try_push_count_ceiling() {
        let mut body = RequestBody::new("ns", 2, 1024).expect("must build");
        assert!(body.try_push(&fields("1")).expect("must encode"));
        assert!(body.try_push(&fields("2")).expect("must encode"));
        let before = body.clone();

        assert!(!body.try_push(&fields("3")).expect("must encode"));
        assert_eq!(body, before);
    }

    #[test]
    fn test_try_push_byte_ceiling() {
        let preamble = RequestBody::new("ns", 20, usize::MAX)
            .expect("must build")
            .len();
        let datum = encode_datum(1, &fields("1")).expect("must encode").len();

        let mut body = RequestBody::new("ns", 20, preamble + datum).expect("must build");
        assert!(body.try_push(&fields("1")).expect("must encode"));
        assert_eq!(body.len(), preamble + datum);
        assert!(!body.try_push(&fields("2")).expect("must encode"));
    }
}
