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
//! Request/response data model shared by the RPC front end, the job queue and
//! the query runner.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Kind of call carried by a request frame. Unrecognized values decode to
/// `Unknown` so they can be answered instead of dropping the connection.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[serde(alias = "PING")]
    Ping,
    #[serde(alias = "RUN")]
    Run,
    #[serde(alias = "VALIDATE")]
    Validate,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestType::Ping => "PING",
            RequestType::Run => "RUN",
            RequestType::Validate => "VALIDATE",
            RequestType::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One partitioned export job.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    /// Local path to the source data file. Deleted once a RUN finishes.
    pub path: String,
    /// Replaces `{{logname}}` and names the second level of the output tree.
    pub log_name: String,
    /// Output root; replaces `{{exportpath}}`.
    pub export_path: String,
    /// Run once, in order, results discarded.
    pub exec_queries: Vec<String>,
    /// Names of `exec_queries`; lengths must match.
    pub exec_queries_names: Vec<String>,
    /// Returns (year, month, day, hour) rows as four string columns.
    pub partition_query: String,
    /// Run once per partition row, in order. `{{year}}`, `{{month}}`, `{{day}}`,
    /// `{{hour}}`, `{{queryname}}` and `{{rand}}` are substituted as well.
    pub queries: Vec<String>,
    /// Names of `queries`; lengths must match.
    pub queries_names: Vec<String>,
}

impl Request {
    pub fn file_name(&self) -> String {
        Path::new(&self.path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.clone())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    Busy,
    RunnerError,
    RequestTypeInvalid,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseStatus::Ok => "OK",
            ResponseStatus::Busy => "BUSY",
            ResponseStatus::RunnerError => "RUNNER_ERROR",
            ResponseStatus::RequestTypeInvalid => "REQUEST_TYPE_INVALID",
        };
        f.write_str(s)
    }
}

/// Reply to every call. Echoes the request it answers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_type: RequestType,
    pub request: Request,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(request_type: RequestType, request: Request) -> Self {
        Self {
            request_type,
            request,
            status: ResponseStatus::Ok,
            error: None,
        }
    }

    pub fn busy(request: Request) -> Self {
        Self {
            request_type: RequestType::Run,
            request,
            status: ResponseStatus::Busy,
            error: Some("runner busy".to_string()),
        }
    }

    pub fn runner_error(request_type: RequestType, request: Request, err: impl fmt::Display) -> Self {
        Self {
            request_type,
            request,
            status: ResponseStatus::RunnerError,
            error: Some(err.to_string()),
        }
    }

    pub fn invalid(request_type: RequestType, request: Request, err: Option<String>) -> Self {
        Self {
            request_type,
            request,
            status: ResponseStatus::RequestTypeInvalid,
            error: err,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}
