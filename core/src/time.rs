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

//! Time related utils.

use chrono::{SubsecRound, Utc};

/// DateTime is the alias for `chrono::DateTime<Utc>`.
pub type DateTime = chrono::DateTime<Utc>;

/// Create datetime of now.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format time into date: `20220301`
pub fn format_date(t: DateTime) -> String {
    t.format("%Y%m%d").to_string()
}

/// Format time into ISO8601: `20220313T072004Z`
pub fn format_iso8601(t: DateTime) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Format time into RFC3339 with second precision: `2022-03-13T07:20:04Z`
///
/// Sub-second parts are truncated, never rounded.
pub fn format_rfc3339(t: DateTime) -> String {
    t.trunc_subsecs(0).format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime {
        Utc.with_ymd_and_hms(2022, 3, 1, 8, 12, 34)
            .single()
            .expect("must be valid")
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(test_time()), "20220301")
    }

    #[test]
    fn test_format_iso8601() {
        assert_eq!(format_iso8601(test_time()), "20220301T081234Z")
    }

    #[test]
    fn test_format_rfc3339_truncates() {
        let t = test_time() + chrono::TimeDelta::milliseconds(999);
        assert_eq!(format_rfc3339(t), "2022-03-01T08:12:34Z")
    }
}
