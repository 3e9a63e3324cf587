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
//! Request checks performed at the RPC boundary.

use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::common::types::Request;
use crate::exec::partitioned_query::MIN_SOURCE_FILE_BYTES;

/// One violated request invariant. Each variant renders a distinct message.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("path is empty")]
    PathMissing,

    #[error("export path is empty")]
    ExportPathMissing,

    #[error("exec_queries has {queries} entries but exec_queries_names has {names}")]
    ExecQueryNamesMismatch { queries: usize, names: usize },

    #[error("queries has {queries} entries but queries_names has {names}")]
    QueryNamesMismatch { queries: usize, names: usize },

    #[error("output name {name:?} leaves the export path")]
    NameLeavesExportPath { name: String },

    #[error("file {path} is not readable: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a regular file")]
    NotAFile { path: PathBuf },

    #[error("file {path} is only {size} bytes, need at least {min}")]
    FileTooSmall { path: PathBuf, size: u64, min: u64 },
}

/// Checks that need nothing but the request itself. RUN applies only these;
/// file problems surface later as a runner error.
pub fn validate_structure(request: &Request) -> Result<(), ValidationError> {
    if request.path.is_empty() {
        return Err(ValidationError::PathMissing);
    }
    if normalize_export_path(&request.export_path).is_empty() {
        return Err(ValidationError::ExportPathMissing);
    }
    if request.exec_queries.len() != request.exec_queries_names.len() {
        return Err(ValidationError::ExecQueryNamesMismatch {
            queries: request.exec_queries.len(),
            names: request.exec_queries_names.len(),
        });
    }
    if request.queries.len() != request.queries_names.len() {
        return Err(ValidationError::QueryNamesMismatch {
            queries: request.queries.len(),
            names: request.queries_names.len(),
        });
    }
    let mut names = std::iter::once(&request.log_name).chain(&request.queries_names);
    if let Some(name) = names.find(|name| climbs_out(name)) {
        return Err(ValidationError::NameLeavesExportPath { name: name.clone() });
    }
    Ok(())
}

/// Names are spliced into output paths as text, so only `..` segments can
/// point outside the export path.
fn climbs_out(name: &str) -> bool {
    name.split(['/', '\\']).any(|segment| segment == "..")
}

/// Structural checks plus: the source file exists, can be opened for reading
/// and holds at least [`MIN_SOURCE_FILE_BYTES`].
pub fn validate_request(request: &Request) -> Result<(), ValidationError> {
    validate_structure(request)?;

    let path = Path::new(&request.path);
    let file = File::open(path).map_err(|source| ValidationError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let meta = file
        .metadata()
        .map_err(|source| ValidationError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    if !meta.is_file() {
        return Err(ValidationError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    if meta.len() < MIN_SOURCE_FILE_BYTES {
        return Err(ValidationError::FileTooSmall {
            path: path.to_path_buf(),
            size: meta.len(),
            min: MIN_SOURCE_FILE_BYTES,
        });
    }
    Ok(())
}

/// Strips trailing separators. A path made only of separators becomes empty.
pub fn normalize_export_path(raw: &str) -> &str {
    raw.trim_end_matches(['/', std::path::MAIN_SEPARATOR])
}
