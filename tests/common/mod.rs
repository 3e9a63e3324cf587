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
//! Common utilities and helpers for integration tests.
#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use quackrun::common::app_config::RunnerConfig;
use quackrun::exec::engine::{EngineSession, QueryEngine};
use quackrun::exec::partitioned_query::MIN_SOURCE_FILE_BYTES;
use quackrun::exec::template::PartitionRow;
use quackrun::fs::sweep::Clock;
use quackrun::fs::uploader::ObjectUploader;
use quackrun::quackrun_config;
use quackrun::quackrun_logging;

/// Scratch layout for one test: source files, export tree and the remote side
/// of promotion all live under one temporary directory.
pub struct TestConfig {
    /// Temporary directory for test artifacts
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
    pub input_dir: PathBuf,
    pub export_dir: PathBuf,
    pub remote_dir: PathBuf,
}

impl TestConfig {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let input_dir = temp_dir.path().join("in");
        let export_dir = temp_dir.path().join("export");
        let remote_dir = temp_dir.path().join("remote");
        for dir in [&input_dir, &export_dir, &remote_dir] {
            std::fs::create_dir_all(dir)?;
        }
        let config_path = temp_dir.path().join("test_quackrun.toml");

        let config_content = format!(
            r#"
log_level = "debug"
queue_size = 2

[rpc]
transport = "tcp"
host = "127.0.0.1"
port = 0

[queue]
capacity = 16

[sweep]
watch_path = "{export}"
interval_secs = 1
grace_secs = 5
cleanup_passes = 4

[object_store]
scheme = "fs"
root = "{remote}"
"#,
            export = export_dir.display(),
            remote = remote_dir.display(),
        );
        std::fs::write(&config_path, config_content)?;

        Ok(Self {
            temp_dir,
            config_path,
            input_dir,
            export_dir,
            remote_dir,
        })
    }

    pub fn init_logging(&self) {
        quackrun_logging::init_with_level("debug");
    }

    pub fn load_config(&self) -> anyhow::Result<RunnerConfig> {
        let (cfg, _) = quackrun_config::load(Some(&self.config_path))?;
        Ok(cfg)
    }

    /// Writes a source file of `size` bytes into the input directory.
    pub fn source_file(&self, name: &str, size: u64) -> PathBuf {
        let path = self.input_dir.join(name);
        std::fs::write(&path, vec![0u8; size as usize]).expect("write source file");
        path
    }

    pub fn large_source_file(&self, name: &str) -> PathBuf {
        self.source_file(name, MIN_SOURCE_FILE_BYTES)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new().expect("Failed to create test config")
    }
}

/// Everything a [`RecordingEngine`] saw, in order.
#[derive(Clone, Debug, Default)]
pub struct EngineLog {
    pub opened: Vec<PathBuf>,
    pub statements: Vec<String>,
}

/// Engine fake that records every open and statement, returns fixed partition
/// rows and can fail statements containing a marker.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    pub log: Arc<Mutex<EngineLog>>,
    pub partitions: Vec<PartitionRow>,
    pub fail_marker: Option<String>,
}

impl RecordingEngine {
    pub fn with_partitions(partitions: Vec<PartitionRow>) -> Self {
        Self {
            partitions,
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> EngineLog {
        self.log.lock().unwrap().clone()
    }
}

struct RecordingSession {
    engine: RecordingEngine,
}

impl QueryEngine for RecordingEngine {
    fn open(&self, path: &Path) -> anyhow::Result<Box<dyn EngineSession>> {
        self.log.lock().unwrap().opened.push(path.to_path_buf());
        Ok(Box::new(RecordingSession {
            engine: self.clone(),
        }))
    }
}

impl EngineSession for RecordingSession {
    fn execute(&mut self, sql: &str) -> anyhow::Result<()> {
        if let Some(marker) = &self.engine.fail_marker
            && sql.contains(marker.as_str())
        {
            anyhow::bail!("statement rejected: {sql}");
        }
        self.engine.log.lock().unwrap().statements.push(sql.to_string());
        Ok(())
    }

    fn query_partitions(&mut self, _sql: &str) -> anyhow::Result<Vec<PartitionRow>> {
        Ok(self.engine.partitions.clone())
    }
}

/// Clock pinned to a settable instant.
pub struct ManualClock(Mutex<SystemTime>);

impl ManualClock {
    pub fn at(now: SystemTime) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.0.lock().unwrap()
    }
}

/// Uploader that fails while `failing` is set and records keys it accepted.
#[derive(Default)]
pub struct FlakyUploader {
    pub failing: std::sync::atomic::AtomicBool,
    pub uploaded: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ObjectUploader for FlakyUploader {
    async fn upload(&self, local: &Path, key: &str) -> anyhow::Result<u64> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("remote unavailable");
        }
        let size = std::fs::metadata(local)?.len();
        self.uploaded.lock().unwrap().push(key.to_string());
        Ok(size)
    }
}

/// Wait for a condition to become true, with timeout.
pub fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Run `f` and fail the test if it does not finish within `timeout`.
pub fn run_with_timeout<F, T>(timeout: Duration, f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    use std::sync::mpsc;

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });

    match rx.recv_timeout(timeout) {
        Ok(v) => v,
        Err(_) => panic!("test timed out after {:?}", timeout),
    }
}

/// Assert that a result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
}
