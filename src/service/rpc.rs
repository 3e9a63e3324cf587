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
//! Newline-delimited JSON framing for the runner protocol.
//!
//! Every frame is one JSON object on one line. A request frame carries a
//! `type` field (`ping`, `run` or `validate`) next to the request fields:
//!
//! ```text
//! {"type":"run","path":"/data/in/x.duckdb","export_path":"/data/out",...}
//! ```
//!
//! The reply is a serialized [`Response`] on its own line.

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::types::{Request, RequestType, Response};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(rename = "type", default)]
    pub request_type: RequestType,
    #[serde(flatten)]
    pub request: Request,
}

/// A decoded call. Dispatch matches on this exhaustively.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RpcCall {
    Ping(Request),
    Run(Request),
    Validate(Request),
}

impl RpcCall {
    pub fn request_type(&self) -> RequestType {
        match self {
            RpcCall::Ping(_) => RequestType::Ping,
            RpcCall::Run(_) => RequestType::Run,
            RpcCall::Validate(_) => RequestType::Validate,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed request frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown request type")]
    UnknownType(Request),
}

impl FrameError {
    /// The reply sent for a frame that could not be turned into a call.
    pub fn into_response(self) -> Response {
        let message = self.to_string();
        let request = match self {
            FrameError::Malformed(_) => Request::default(),
            FrameError::UnknownType(request) => request,
        };
        Response::invalid(RequestType::Unknown, request, Some(message))
    }
}

pub fn decode_frame(line: &str) -> Result<RpcCall, FrameError> {
    let frame: RequestFrame = serde_json::from_str(line)?;
    match frame.request_type {
        RequestType::Ping => Ok(RpcCall::Ping(frame.request)),
        RequestType::Run => Ok(RpcCall::Run(frame.request)),
        RequestType::Validate => Ok(RpcCall::Validate(frame.request)),
        RequestType::Unknown => Err(FrameError::UnknownType(frame.request)),
    }
}

pub fn encode_request(request_type: RequestType, request: &Request) -> io::Result<String> {
    let frame = RequestFrame {
        request_type,
        request: request.clone(),
    };
    serde_json::to_string(&frame).map_err(io::Error::other)
}

/// Reads the next non-blank line. `Ok(None)` on end of stream.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
}

pub async fn write_json_line<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut bytes = serde_json::to_vec(value).map_err(io::Error::other)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ResponseStatus;

    #[test]
    fn run_frame_decodes_into_typed_call() {
        let call = decode_frame(
            r#"{"type":"run","path":"/in/a.duckdb","export_path":"/out","queries":["q"],"queries_names":["n"]}"#,
        )
        .expect("decode");
        let RpcCall::Run(request) = call else {
            panic!("expected run, got {call:?}");
        };
        assert_eq!(request.path, "/in/a.duckdb");
        assert_eq!(request.queries_names, vec!["n"]);
        assert!(request.exec_queries.is_empty());
    }

    #[test]
    fn unknown_type_keeps_the_request_for_the_reply() {
        let err = decode_frame(r#"{"type":"explode","path":"/in/a"}"#).expect_err("unknown");
        let response = err.into_response();
        assert_eq!(response.status, ResponseStatus::RequestTypeInvalid);
        assert_eq!(response.request.path, "/in/a");
    }

    #[test]
    fn missing_type_is_unknown() {
        assert!(matches!(
            decode_frame(r#"{"path":"/in/a"}"#),
            Err(FrameError::UnknownType(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = decode_frame("not json").expect_err("garbage");
        assert!(matches!(err, FrameError::Malformed(_)));
        assert_eq!(err.into_response().request, Request::default());
    }

    #[test]
    fn encoded_request_decodes_to_same_call() {
        let request = Request {
            path: "/in/a".to_string(),
            ..Default::default()
        };
        let line = encode_request(RequestType::Validate, &request).unwrap();
        assert_eq!(decode_frame(&line).unwrap(), RpcCall::Validate(request));
    }

    #[tokio::test]
    async fn read_line_skips_blank_lines() {
        let mut input: &[u8] = b"\n  \n{\"type\":\"ping\"}\n";
        let line = read_line(&mut input).await.unwrap();
        assert_eq!(line.as_deref(), Some(r#"{"type":"ping"}"#));
        assert_eq!(read_line(&mut input).await.unwrap(), None);
    }
}
