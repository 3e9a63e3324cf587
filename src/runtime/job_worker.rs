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
//! The single query worker.
//!
//! One named thread takes jobs off the queue in order and runs each one to
//! completion before looking at the next, so at most one run holds an engine
//! connection at any time. The source file of every finished job is deleted,
//! whether the run succeeded or not.

use std::path::Path;
use std::thread::JoinHandle;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::common::types::Request;
use crate::common::util::format_duration;
use crate::exec::partitioned_query::PartitionedQueryRunner;
use crate::quackrun_logging::{debug, error, info, warn};
use crate::runtime::job_queue::JobReceiver;

const WORKER_THREAD_NAME: &str = "query-worker";

/// Counters returned when the worker thread exits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WorkerStats {
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs still queued at shutdown. Their source files are left in place.
    pub dropped: usize,
}

pub struct JobWorker {
    runner: PartitionedQueryRunner,
}

impl JobWorker {
    pub fn new(runner: PartitionedQueryRunner) -> Self {
        Self { runner }
    }

    pub fn spawn(
        self,
        rx: JobReceiver,
        cancel: CancellationToken,
    ) -> std::io::Result<JoinHandle<WorkerStats>> {
        let waiter = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run(waiter, rx, cancel))
    }

    fn run(
        self,
        waiter: tokio::runtime::Runtime,
        mut rx: JobReceiver,
        cancel: CancellationToken,
    ) -> WorkerStats {
        debug!("query worker started");
        let mut stats = WorkerStats::default();
        loop {
            let next = waiter.block_on(async {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    job = rx.recv() => job,
                }
            });
            let Some(request) = next else {
                break;
            };
            if self.process(&request) {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
        }

        rx.close();
        while let Ok(request) = rx.try_recv() {
            warn!("shutdown: dropping queued job {}", request.path);
            stats.dropped += 1;
        }
        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            dropped = stats.dropped,
            "query worker stopped"
        );
        stats
    }

    /// Runs one job and removes its source file. Returns whether the run
    /// succeeded.
    fn process(&self, request: &Request) -> bool {
        let start = Instant::now();
        info!("start {}", request.file_name());
        let succeeded = match self.runner.run(request) {
            Ok(summary) => {
                info!(
                    exec_queries = summary.exec_queries,
                    partitions = summary.partitions,
                    statements = summary.statements,
                    "done {} in {}",
                    request.file_name(),
                    format_duration(start.elapsed())
                );
                true
            }
            Err(err) => {
                error!(
                    "run {} failed after {}: {err}",
                    request.path,
                    format_duration(start.elapsed())
                );
                false
            }
        };
        remove_source(Path::new(&request.path));
        succeeded
    }
}

fn remove_source(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed {}", path.display()),
        Err(err) => warn!("remove {} failed: {err}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::engine::{EngineSession, QueryEngine};
    use crate::exec::partitioned_query::MIN_SOURCE_FILE_BYTES;
    use crate::exec::template::PartitionRow;
    use crate::runtime::job_queue;
    use std::sync::{Arc, Mutex};

    struct OpenLog(Arc<Mutex<Vec<String>>>);

    struct NullSession;

    impl QueryEngine for OpenLog {
        fn open(&self, path: &Path) -> anyhow::Result<Box<dyn EngineSession>> {
            self.0
                .lock()
                .unwrap()
                .push(path.file_name().unwrap().to_string_lossy().to_string());
            Ok(Box::new(NullSession))
        }
    }

    impl EngineSession for NullSession {
        fn execute(&mut self, _sql: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn query_partitions(&mut self, _sql: &str) -> anyhow::Result<Vec<PartitionRow>> {
            Ok(Vec::new())
        }
    }

    fn job(dir: &Path, name: &str, size: u64) -> Request {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; size as usize]).unwrap();
        Request {
            path: path.to_string_lossy().to_string(),
            export_path: dir.join("out").to_string_lossy().to_string(),
            queries: vec!["COPY t TO '{{exportpath}}'".to_string()],
            queries_names: vec!["q".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn jobs_run_in_order_and_sources_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let opened = Arc::new(Mutex::new(Vec::new()));
        let runner = PartitionedQueryRunner::new(Arc::new(OpenLog(Arc::clone(&opened))));
        let (queue, rx) = job_queue::channel(8, 8);

        let jobs = [
            job(dir.path(), "a.duckdb", MIN_SOURCE_FILE_BYTES),
            job(dir.path(), "small.duckdb", 10),
            job(dir.path(), "b.duckdb", MIN_SOURCE_FILE_BYTES),
        ];
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        for request in jobs.iter().cloned() {
            rt.block_on(queue.submit(request)).unwrap();
        }
        drop(queue);

        let handle = JobWorker::new(runner)
            .spawn(rx, CancellationToken::new())
            .unwrap();
        let stats = handle.join().unwrap();

        assert_eq!(
            stats,
            WorkerStats {
                succeeded: 2,
                failed: 1,
                dropped: 0
            }
        );
        assert_eq!(*opened.lock().unwrap(), vec!["a.duckdb", "b.duckdb"]);
        for request in &jobs {
            assert!(!Path::new(&request.path).exists(), "{}", request.path);
        }
    }

    #[test]
    fn cancelled_worker_leaves_queued_sources_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let opened = Arc::new(Mutex::new(Vec::new()));
        let runner = PartitionedQueryRunner::new(Arc::new(OpenLog(Arc::clone(&opened))));
        let (queue, rx) = job_queue::channel(8, 8);
        let request = job(dir.path(), "a.duckdb", MIN_SOURCE_FILE_BYTES);
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(queue.submit(request.clone())).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = JobWorker::new(runner).spawn(rx, cancel).unwrap().join().unwrap();

        assert_eq!(stats.dropped, 1);
        assert!(opened.lock().unwrap().is_empty());
        assert!(Path::new(&request.path).exists());
    }
}
