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
//! Partitioned query runner.
//!
//! Requests arrive over a local socket, run one at a time against an embedded
//! DuckDB engine and write a hive-partitioned tree of output files. A separate
//! sweep promotes settled files from that tree to object storage.

pub mod common;
pub mod exec;
pub mod fs;
pub mod runtime;
pub mod service;

pub use common::app_config as quackrun_config;
pub use common::logging as quackrun_logging;

pub use common::types::{Request, RequestType, Response, ResponseStatus};
pub use exec::partitioned_query::PartitionedQueryRunner;
pub use fs::sweep::Sweeper;
pub use service::rpc_server::{ListenAddr, RpcClient, RpcServer};
