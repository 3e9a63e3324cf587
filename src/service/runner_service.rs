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
//! Routes decoded calls to an immediate reply or the job queue.

use crate::common::types::{Request, RequestType, Response};
use crate::quackrun_logging::{debug, error};
use crate::runtime::job_queue::{Admission, JobQueue};
use crate::service::rpc::RpcCall;
use crate::service::validation::{normalize_export_path, validate_request, validate_structure};

pub struct RunnerService {
    queue: JobQueue,
}

impl RunnerService {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub async fn handle(&self, call: RpcCall) -> Response {
        match call {
            RpcCall::Ping(request) => Response::ok(RequestType::Ping, request),
            RpcCall::Validate(request) => validate(request),
            RpcCall::Run(request) => self.run(request).await,
        }
    }

    async fn run(&self, mut request: Request) -> Response {
        if let Err(err) = validate_structure(&request) {
            debug!("rejecting run for {}: {err}", request.path);
            return Response::invalid(RequestType::Run, request, Some(err.to_string()));
        }
        request.export_path = normalize_export_path(&request.export_path).to_string();

        match self.queue.submit(request.clone()).await {
            Ok(Admission::Accepted) => Response::ok(RequestType::Run, request),
            Ok(Admission::Busy) => Response::busy(request),
            Err(err) => {
                error!("cannot queue {}: {err}", request.path);
                Response::runner_error(RequestType::Run, request, err)
            }
        }
    }
}

fn validate(mut request: Request) -> Response {
    request.export_path = normalize_export_path(&request.export_path).to_string();
    match validate_request(&request) {
        Ok(()) => Response::ok(RequestType::Validate, request),
        Err(err) => Response::invalid(RequestType::Validate, request, Some(err.to_string())),
    }
}
