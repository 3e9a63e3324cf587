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
use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use opendal::Operator;
use opendal::layers::RetryLayer;

use crate::common::app_config::ObjectStoreScheme;
use crate::fs::local::build_fs_operator;

const DEFAULT_RETRY_MAX_TIMES: usize = 6;
const DEFAULT_RETRY_MIN_DELAY_MS: u64 = 100;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ObjectStoreConfig {
    pub scheme: ObjectStoreScheme,
    /// Bucket name for gcs/s3. Ignored by the fs scheme.
    pub bucket: String,
    /// Key prefix inside the bucket, or the target directory for the fs scheme.
    pub root: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub credential_path: Option<String>,
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub retry_max_times: Option<usize>,
    pub retry_min_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
}

impl ObjectStoreConfig {
    pub fn local(root: impl Into<String>) -> Self {
        Self {
            scheme: ObjectStoreScheme::Fs,
            bucket: String::new(),
            root: root.into(),
            endpoint: None,
            region: None,
            credential_path: None,
            access_key_id: None,
            access_key_secret: None,
            retry_max_times: None,
            retry_min_delay_ms: None,
            retry_max_delay_ms: None,
        }
    }

    /// Human readable destination used in startup logs.
    pub fn describe(&self) -> String {
        match self.scheme {
            ObjectStoreScheme::Gcs => format!("gs://{}/{}", self.bucket, self.root.trim_matches('/')),
            ObjectStoreScheme::S3 => format!("s3://{}/{}", self.bucket, self.root.trim_matches('/')),
            ObjectStoreScheme::Fs => format!("file://{}", self.root),
        }
    }
}

fn build_retry_layer(cfg: &ObjectStoreConfig) -> RetryLayer {
    let max_times = cfg.retry_max_times.unwrap_or(DEFAULT_RETRY_MAX_TIMES);
    let min_delay_ms = cfg.retry_min_delay_ms.unwrap_or(DEFAULT_RETRY_MIN_DELAY_MS);
    let max_delay_ms = cfg
        .retry_max_delay_ms
        .unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS)
        .max(min_delay_ms);

    RetryLayer::new()
        .with_jitter()
        .with_min_delay(Duration::from_millis(min_delay_ms))
        .with_max_delay(Duration::from_millis(max_delay_ms))
        .with_max_times(max_times)
}

fn build_gcs_operator(cfg: &ObjectStoreConfig) -> Result<Operator> {
    if cfg.bucket.trim().is_empty() {
        return Err(anyhow!("empty gcs bucket"));
    }
    let mut builder = opendal::services::Gcs::default().bucket(&cfg.bucket);
    if !cfg.root.is_empty() {
        builder = builder.root(&cfg.root);
    }
    if let Some(endpoint) = cfg.endpoint.as_deref() {
        builder = builder.endpoint(&normalize_endpoint(endpoint)?);
    }
    if let Some(path) = cfg.credential_path.as_deref() {
        builder = builder.credential_path(path);
    }
    let op = Operator::new(builder)
        .context("init opendal gcs operator")?
        .finish();
    Ok(op)
}

fn build_s3_operator(cfg: &ObjectStoreConfig) -> Result<Operator> {
    if cfg.bucket.trim().is_empty() {
        return Err(anyhow!("empty s3 bucket"));
    }
    let mut builder = opendal::services::S3::default()
        .bucket(&cfg.bucket)
        .region(cfg.region.as_deref().unwrap_or("us-east-1"));
    if let Some(endpoint) = cfg.endpoint.as_deref() {
        let endpoint = normalize_endpoint(endpoint)?;
        if !is_local_endpoint(&endpoint) {
            builder = builder.enable_virtual_host_style();
        }
        builder = builder.endpoint(&endpoint);
    }
    if let Some(ak) = cfg.access_key_id.as_deref() {
        builder = builder.access_key_id(ak);
    }
    if let Some(sk) = cfg.access_key_secret.as_deref() {
        builder = builder.secret_access_key(sk);
    }
    if !cfg.root.is_empty() {
        builder = builder.root(&cfg.root);
    }
    let op = Operator::new(builder)
        .context("init opendal s3 operator")?
        .finish();
    Ok(op)
}

/// Build the promotion target. Remote schemes get a jittered retry layer; the
/// sweep retries whole files on the next tick on top of that.
pub fn build_object_store_operator(cfg: &ObjectStoreConfig) -> Result<Operator> {
    let op = match cfg.scheme {
        ObjectStoreScheme::Gcs => build_gcs_operator(cfg)?,
        ObjectStoreScheme::S3 => build_s3_operator(cfg)?,
        ObjectStoreScheme::Fs => return build_fs_operator(&cfg.root),
    };
    Ok(op.layer(build_retry_layer(cfg)))
}

fn endpoint_host(endpoint: &str) -> String {
    let mut view = endpoint.trim();
    if let Some(rest) = view.strip_prefix("http://") {
        view = rest;
    } else if let Some(rest) = view.strip_prefix("https://") {
        view = rest;
    }
    if let Some((authority, _)) = view.split_once('/') {
        view = authority;
    }
    if let Some(rest) = view.strip_prefix('[')
        && let Some((host, _)) = rest.split_once(']')
    {
        return host.to_ascii_lowercase();
    }
    view.split(':').next().unwrap_or(view).to_ascii_lowercase()
}

fn is_local_endpoint(endpoint: &str) -> bool {
    let host = endpoint_host(endpoint);
    host == "localhost" || host.parse::<IpAddr>().is_ok()
}

fn normalize_endpoint(raw_endpoint: &str) -> Result<String> {
    let endpoint = raw_endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return Err(anyhow!("empty object store endpoint"));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return Ok(endpoint.to_string());
    }
    let scheme = if is_local_endpoint(endpoint) {
        "http"
    } else {
        "https"
    };
    Ok(format!("{scheme}://{endpoint}"))
}
