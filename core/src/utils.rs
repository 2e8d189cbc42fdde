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

//! Utility functions and types.

use std::fmt::{Debug, Display, Formatter};

/// Redact wraps a secret so that it can be logged or debug-printed safely.
///
/// - Empty secrets print as `EMPTY`.
/// - Secrets shorter than 12 bytes are fully masked as `***`.
/// - Longer secrets keep their first and last three characters, which is enough
///   to tell two access keys apart in logs.
#[derive(Clone, Copy)]
pub struct Redact<'a>(&'a str);

impl<'a> From<&'a str> for Redact<'a> {
    fn from(value: &'a str) -> Self {
        Redact(value)
    }
}

impl<'a> From<&'a String> for Redact<'a> {
    fn from(value: &'a String) -> Self {
        Redact(value.as_str())
    }
}

impl<'a> From<&'a Option<String>> for Redact<'a> {
    fn from(value: &'a Option<String>) -> Self {
        Redact(value.as_deref().unwrap_or_default())
    }
}

impl Display for Redact<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = self.0;
        match s.chars().count() {
            0 => f.write_str("EMPTY"),
            n if n < 12 => f.write_str("***"),
            n => {
                let head: String = s.chars().take(3).collect();
                let tail: String = s.chars().skip(n - 3).collect();
                write!(f, "{head}***{tail}")
            }
        }
    }
}

impl Debug for Redact<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
