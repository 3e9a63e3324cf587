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
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::fs::object_store::ObjectStoreConfig;

pub const CONFIG_ENV: &str = "QUACKRUN_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "quackrun.toml";

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_size() -> usize {
    10
}

/// Where the configuration was taken from. `Defaults` means no file was found,
/// which is tolerated so that the runner can start on a bare host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

/// Resolve the config file: explicit path, then `$QUACKRUN_CONFIG`, then
/// `./quackrun.toml`. An explicit path that does not exist is an error; a
/// missing implicit file yields the defaults.
pub fn load(explicit: Option<&Path>) -> Result<(RunnerConfig, ConfigSource)> {
    if let Some(path) = explicit {
        let cfg = RunnerConfig::load_from_file(path)?;
        return Ok((cfg, ConfigSource::File(path.to_path_buf())));
    }
    match config_path_from_env_or_default() {
        Some(path) => {
            let cfg = RunnerConfig::load_from_file(&path)?;
            Ok((cfg, ConfigSource::File(path)))
        }
        None => Ok((RunnerConfig::default(), ConfigSource::Defaults)),
    }
}

fn config_path_from_env_or_default() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV)
        && !p.trim().is_empty()
    {
        return Some(PathBuf::from(p.trim()));
    }
    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    candidate.exists().then_some(candidate)
}

#[derive(Clone, Debug, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "quackrun=debug,opendal=warn"
    #[serde(default)]
    pub log_filter: Option<String>,

    /// Queue occupancy at which RUN requests are answered with BUSY.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub object_store: ObjectStoreSection,
}

impl RunnerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: RunnerConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn log_filter(&self) -> String {
        match self.log_filter.as_deref() {
            Some(f) if !f.trim().is_empty() => f.to_string(),
            _ => crate::common::logging::filter_for_level(&self.log_level),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            queue_size: default_queue_size(),
            rpc: RpcConfig::default(),
            queue: QueueConfig::default(),
            sweep: SweepConfig::default(),
            object_store: ObjectStoreSection::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Unix socket on unix hosts, TCP elsewhere.
    #[default]
    Auto,
    Unix,
    Tcp,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_host")]
    pub host: String,
    #[serde(default = "default_rpc_port")]
    pub port: u16,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

fn default_rpc_host() -> String {
    "127.0.0.1".to_string()
}
fn default_rpc_port() -> u16 {
    9090
}
fn default_socket_path() -> String {
    "./quackrun-sock.unix".to_string()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: default_rpc_host(),
            port: default_rpc_port(),
            transport: TransportKind::default(),
            socket_path: default_socket_path(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct QueueConfig {
    /// Hard bound of the FIFO; senders wait once it is full.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

fn default_queue_capacity() -> usize {
    100
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_enabled")]
    pub enabled: bool,
    #[serde(default = "default_watch_path")]
    pub watch_path: String,
    #[serde(default = "default_watch_extension")]
    pub extension: String,
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_sweep_grace_secs")]
    pub grace_secs: u64,
    #[serde(default = "default_sweep_cleanup_passes")]
    pub cleanup_passes: usize,
}

fn default_sweep_enabled() -> bool {
    true
}
fn default_watch_path() -> String {
    "./parquet/".to_string()
}
fn default_watch_extension() -> String {
    ".parquet".to_string()
}
fn default_sweep_interval_secs() -> u64 {
    20
}
fn default_sweep_grace_secs() -> u64 {
    5
}
fn default_sweep_cleanup_passes() -> usize {
    4
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweep_enabled(),
            watch_path: default_watch_path(),
            extension: default_watch_extension(),
            interval_secs: default_sweep_interval_secs(),
            grace_secs: default_sweep_grace_secs(),
            cleanup_passes: default_sweep_cleanup_passes(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreScheme {
    #[default]
    Gcs,
    S3,
    Fs,
}

#[derive(Clone, Deserialize)]
pub struct ObjectStoreSection {
    #[serde(default)]
    pub scheme: ObjectStoreScheme,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub credential_path: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub access_key_secret: Option<String>,
    #[serde(default)]
    pub retry_max_times: Option<usize>,
    #[serde(default)]
    pub retry_min_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry_max_delay_ms: Option<u64>,
}

fn default_bucket() -> String {
    "bucket".to_string()
}

impl Default for ObjectStoreSection {
    fn default() -> Self {
        Self {
            scheme: ObjectStoreScheme::default(),
            bucket: default_bucket(),
            root: String::new(),
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
}

impl ObjectStoreSection {
    pub fn to_object_store_config(&self) -> ObjectStoreConfig {
        ObjectStoreConfig {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            root: self.root.clone(),
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            credential_path: self.credential_path.clone(),
            access_key_id: self.access_key_id.clone(),
            access_key_secret: self.access_key_secret.clone(),
            retry_max_times: self.retry_max_times,
            retry_min_delay_ms: self.retry_min_delay_ms,
            retry_max_delay_ms: self.retry_max_delay_ms,
        }
    }
}

impl std::fmt::Debug for ObjectStoreSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreSection")
            .field("scheme", &self.scheme)
            .field("bucket", &self.bucket)
            .field("root", &self.root)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("credential_path", &self.credential_path)
            .field("access_key_id", &self.access_key_id)
            .field(
                "access_key_secret",
                &self.access_key_secret.as_ref().map(|_| "***"),
            )
            .finish()
    }
}
