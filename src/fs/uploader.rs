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
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::Operator;
use tokio::io::AsyncReadExt;

pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Remote side of promotion. `upload` returns only once the object is durably
/// written; the caller deletes the local file after that and never before.
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    async fn upload(&self, local: &Path, key: &str) -> Result<u64>;
}

#[derive(Clone, Debug)]
pub struct OpendalUploader {
    op: Operator,
    chunk_size: usize,
}

impl OpendalUploader {
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }
}

#[async_trait]
impl ObjectUploader for OpendalUploader {
    async fn upload(&self, local: &Path, key: &str) -> Result<u64> {
        let mut file = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("open {}", local.display()))?;
        let mut writer = self
            .op
            .writer(key)
            .await
            .with_context(|| format!("open object writer: {key}"))?;

        let mut written = 0u64;
        loop {
            let mut chunk = Vec::with_capacity(self.chunk_size);
            let n = match (&mut file)
                .take(self.chunk_size as u64)
                .read_to_end(&mut chunk)
                .await
            {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e).with_context(|| format!("read {}", local.display()));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.write(chunk).await {
                let _ = writer.abort().await;
                return Err(e).with_context(|| format!("write object: {key}"));
            }
            written += n as u64;
        }

        writer
            .close()
            .await
            .with_context(|| format!("close object writer: {key}"))?;
        Ok(written)
    }
}
