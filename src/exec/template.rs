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
//! Placeholder substitution and output layout for partitioned queries.

use std::fmt;
use std::path::PathBuf;

/// One distinct partition key returned by the partition query.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct PartitionRow {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
}

impl PartitionRow {
    pub fn new(
        year: impl Into<String>,
        month: impl Into<String>,
        day: impl Into<String>,
        hour: impl Into<String>,
    ) -> Self {
        Self {
            year: year.into(),
            month: month.into(),
            day: day.into(),
            hour: hour.into(),
        }
    }
}

impl fmt::Display for PartitionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{} {}:00", self.year, self.month, self.day, self.hour)
    }
}

/// Values substituted into one partitioned statement.
#[derive(Clone, Copy, Debug)]
pub struct PlaceholderValues<'a> {
    pub export_path: &'a str,
    pub log_name: &'a str,
    pub query_name: &'a str,
    pub partition: &'a PartitionRow,
    pub rand: &'a str,
}

impl PlaceholderValues<'_> {
    fn pairs(&self) -> [(&'static str, &str); 8] {
        [
            ("{{exportpath}}", self.export_path),
            ("{{logname}}", self.log_name),
            ("{{queryname}}", self.query_name),
            ("{{year}}", &self.partition.year),
            ("{{month}}", &self.partition.month),
            ("{{day}}", &self.partition.day),
            ("{{hour}}", &self.partition.hour),
            ("{{rand}}", self.rand),
        ]
    }
}

/// Plain textual replacement of every placeholder occurrence. Unknown
/// `{{...}}` sequences are left untouched.
pub fn render_query(template: &str, values: &PlaceholderValues<'_>) -> String {
    let mut query = template.to_string();
    for (placeholder, value) in values.pairs() {
        if query.contains(placeholder) {
            query = query.replace(placeholder, value);
        }
    }
    query
}

/// `export/log/query/year=Y/month=M/day=D/hour=H`, joined as text so the
/// directory matches what `{{exportpath}}/{{logname}}/{{queryname}}/...`
/// renders to, even when a name starts with a separator.
pub fn partition_dir(
    export_path: &str,
    log_name: &str,
    query_name: &str,
    partition: &PartitionRow,
) -> PathBuf {
    PathBuf::from(format!(
        "{export_path}/{log_name}/{query_name}/year={}/month={}/day={}/hour={}",
        partition.year, partition.month, partition.day, partition.hour
    ))
}

/// Hex nanoseconds of the current second. Distinguishes output files of
/// repeated runs; two calls within the same nanosecond may collide.
pub fn rand_token() -> String {
    format!("{:x}", chrono::Utc::now().timestamp_subsec_nanos())
}
