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

use putmetric_core::time::DateTime;
use putmetric_core::{Error, Result};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Unit of a metric data point, rendered with its canonical display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum Unit {
    Seconds,
    Microseconds,
    Milliseconds,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Bits,
    Kilobits,
    Megabits,
    Gigabits,
    Terabits,
    Percent,
    Count,
    BytesPerSecond,
    KilobytesPerSecond,
    MegabytesPerSecond,
    GigabytesPerSecond,
    TerabytesPerSecond,
    BitsPerSecond,
    KilobitsPerSecond,
    MegabitsPerSecond,
    GigabitsPerSecond,
    TerabitsPerSecond,
    CountPerSecond,
    #[default]
    None,
}

impl Unit {
    const ALL: [Unit; 27] = [
        Unit::Seconds,
        Unit::Microseconds,
        Unit::Milliseconds,
        Unit::Bytes,
        Unit::Kilobytes,
        Unit::Megabytes,
        Unit::Gigabytes,
        Unit::Terabytes,
        Unit::Bits,
        Unit::Kilobits,
        Unit::Megabits,
        Unit::Gigabits,
        Unit::Terabits,
        Unit::Percent,
        Unit::Count,
        Unit::BytesPerSecond,
        Unit::KilobytesPerSecond,
        Unit::MegabytesPerSecond,
        Unit::GigabytesPerSecond,
        Unit::TerabytesPerSecond,
        Unit::BitsPerSecond,
        Unit::KilobitsPerSecond,
        Unit::MegabitsPerSecond,
        Unit::GigabitsPerSecond,
        Unit::TerabitsPerSecond,
        Unit::CountPerSecond,
        Unit::None,
    ];

    /// Canonical name accepted by the service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Seconds => "Seconds",
            Unit::Microseconds => "Microseconds",
            Unit::Milliseconds => "Milliseconds",
            Unit::Bytes => "Bytes",
            Unit::Kilobytes => "Kilobytes",
            Unit::Megabytes => "Megabytes",
            Unit::Gigabytes => "Gigabytes",
            Unit::Terabytes => "Terabytes",
            Unit::Bits => "Bits",
            Unit::Kilobits => "Kilobits",
            Unit::Megabits => "Megabits",
            Unit::Gigabits => "Gigabits",
            Unit::Terabits => "Terabits",
            Unit::Percent => "Percent",
            Unit::Count => "Count",
            Unit::BytesPerSecond => "Bytes/Second",
            Unit::KilobytesPerSecond => "Kilobytes/Second",
            Unit::MegabytesPerSecond => "Megabytes/Second",
            Unit::GigabytesPerSecond => "Gigabytes/Second",
            Unit::TerabytesPerSecond => "Terabytes/Second",
            Unit::BitsPerSecond => "Bits/Second",
            Unit::KilobitsPerSecond => "Kilobits/Second",
            Unit::MegabitsPerSecond => "Megabits/Second",
            Unit::GigabitsPerSecond => "Gigabits/Second",
            Unit::TerabitsPerSecond => "Terabits/Second",
            Unit::CountPerSecond => "Count/Second",
            Unit::None => "None",
        }
    }

    fn alias(s: &str) -> Option<Unit> {
        let unit = match s {
            "s" | "sec" | "second" => Unit::Seconds,
            "us" | "µs" | "microsecond" => Unit::Microseconds,
            "ms" | "millisecond" => Unit::Milliseconds,
            "b" | "byte" => Unit::Bytes,
            "kb" | "kilobyte" => Unit::Kilobytes,
            "mb" | "megabyte" => Unit::Megabytes,
            "gb" | "gigabyte" => Unit::Gigabytes,
            "tb" | "terabyte" => Unit::Terabytes,
            "bit" => Unit::Bits,
            "%" | "pct" => Unit::Percent,
            "" | "1" => Unit::None,
            "count/s" | "rate" => Unit::CountPerSecond,
            "b/s" | "bytes/s" => Unit::BytesPerSecond,
            "bit/s" | "bits/s" => Unit::BitsPerSecond,
            _ => return None,
        };
        Some(unit)
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = Error;

    /// Parse a unit from its display name or a short alias, ignoring case.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Unit::ALL
            .into_iter()
            .find(|u| u.as_str().to_ascii_lowercase() == lower)
            .or_else(|| Unit::alias(&lower))
            .ok_or_else(|| Error::datum_invalid(format!("unknown unit: {s}")))
    }
}

/// Granularity the service stores a metric with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageResolution {
    /// One second granularity.
    High,
    /// Sixty seconds granularity.
    Standard,
}

impl StorageResolution {
    /// Value sent as `StorageResolution`.
    pub fn seconds(&self) -> u32 {
        match self {
            StorageResolution::High => 1,
            StorageResolution::Standard => 60,
        }
    }
}

impl TryFrom<u32> for StorageResolution {
    type Error = Error;

    fn try_from(v: u32) -> Result<Self> {
        match v {
            1 => Ok(StorageResolution::High),
            60 => Ok(StorageResolution::Standard),
            v => Err(Error::datum_invalid(format!(
                "storage resolution must be 1 or 60, got {v}"
            ))),
        }
    }
}

impl FromStr for StorageResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(StorageResolution::High),
            "standard" => Ok(StorageResolution::Standard),
            v => v
                .parse::<u32>()
                .map_err(|_| Error::datum_invalid(format!("invalid storage resolution: {s}")))
                .and_then(StorageResolution::try_from),
        }
    }
}

/// Pre-computed statistics of a summary data point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Statistics {
    /// Sum of all samples.
    pub sum: f64,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
    /// Number of samples.
    pub sample_count: f64,
}

impl Statistics {
    /// All four values are forced to zero when there are no samples.
    pub(crate) fn coerced(&self) -> Statistics {
        if self.sample_count == 0.0 {
            return Statistics::default();
        }
        *self
    }

    fn is_finite(&self) -> bool {
        [self.sum, self.min, self.max, self.sample_count]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// One named, timestamped measurement.
///
/// A datum carries either a scalar `value` or `statistics`. Build one with
/// [`MetricDatum::new`] and the `with_*` methods:
///
/// ```
/// use putmetric_cloudwatch::{MetricDatum, Unit};
///
/// let datum = MetricDatum::new("requests")
///     .with_timestamp(chrono::Utc::now())
///     .with_unit(Unit::Count)
///     .with_value(1.0)
///     .with_dimension("host", "web-1");
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricDatum {
    /// Name of the metric.
    pub name: String,
    /// Time of the measurement.
    pub timestamp: Option<DateTime>,
    /// Unit of the measurement.
    pub unit: Unit,
    /// Scalar value.
    pub value: Option<f64>,
    /// Summary statistics.
    pub statistics: Option<Statistics>,
    /// Storage resolution, service default if unset.
    pub resolution: Option<StorageResolution>,
    /// Dimensions in insertion order.
    pub dimensions: Vec<(String, String)>,
}

impl MetricDatum {
    /// Create a datum with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the unit.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Set a scalar value.
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Set summary statistics.
    pub fn with_statistics(mut self, statistics: Statistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Set the storage resolution.
    pub fn with_resolution(mut self, resolution: StorageResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Append a dimension.
    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.push((name.into(), value.into()));
        self
    }

    /// Check the fields shared by single and summary data points.
    pub(crate) fn validate_common(&self) -> Result<DateTime> {
        if self.name.is_empty() {
            return Err(Error::datum_invalid("metric name is empty"));
        }
        let Some(ts) = self.timestamp else {
            return Err(Error::datum_invalid(format!(
                "metric {} has no timestamp",
                self.name
            )));
        };
        if let Some((idx, _)) = self
            .dimensions
            .iter()
            .enumerate()
            .find(|(_, (name, _))| name.is_empty())
        {
            return Err(Error::datum_invalid(format!(
                "metric {} has an empty dimension name at position {idx}",
                self.name
            )));
        }
        Ok(ts)
    }

    pub(crate) fn validate_single(&self) -> Result<(DateTime, f64)> {
        let ts = self.validate_common()?;
        if self.statistics.is_some() {
            return Err(Error::datum_invalid(format!(
                "metric {} carries statistics, not a value",
                self.name
            )));
        }
        let Some(value) = self.value else {
            return Err(Error::datum_invalid(format!(
                "metric {} has no value",
                self.name
            )));
        };
        if !value.is_finite() {
            return Err(Error::datum_invalid(format!(
                "metric {} has a non-finite value {value}",
                self.name
            )));
        }
        Ok((ts, value))
    }

    pub(crate) fn validate_summary(&self) -> Result<(DateTime, Statistics)> {
        let ts = self.validate_common()?;
        if self.value.is_some() {
            return Err(Error::datum_invalid(format!(
                "metric {} carries a value, not statistics",
                self.name
            )));
        }
        let Some(stats) = self.statistics else {
            return Err(Error::datum_invalid(format!(
                "metric {} has no statistics",
                self.name
            )));
        };
        if !stats.is_finite() {
            return Err(Error::datum_invalid(format!(
                "metric {} has non-finite statistics",
                self.name
            )));
        }
        Ok((ts, stats.coerced()))
    }
}
