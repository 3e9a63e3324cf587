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
use std::path::PathBuf;

use thiserror::Error;

use crate::exec::template::PartitionRow;

/// Failure of one run. Carries enough location (query index and name,
/// partition) to find the statement in the request.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no queries specified")]
    NoQueries,

    #[error("file stat error {path}: {source}")]
    FileMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file {path} is only {size} bytes, need at least {min}")]
    FileTooSmall { path: PathBuf, size: u64, min: u64 },

    #[error("db open error {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("exec query {index} - {name} error: {message}")]
    Exec {
        index: usize,
        name: String,
        message: String,
    },

    #[error("engine setting {setting} error: {message}")]
    Tuning {
        setting: &'static str,
        message: String,
    },

    #[error("partitionquery error: {message}")]
    PartitionQuery { message: String },

    #[error("query {index} has no name")]
    QueryNameMissing { index: usize },

    #[error("error creating path {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("query {index} - {name} error at partition {partition}: {message}")]
    Query {
        index: usize,
        name: String,
        partition: PartitionRow,
        message: String,
    },
}

pub(crate) fn engine_message(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
