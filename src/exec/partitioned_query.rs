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
//! Expands one request into exec statements plus one statement per
//! (partition, query) pair.
//!
//! Output written before a failure is kept; nothing is rolled back.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::common::types::Request;
use crate::exec::engine::{EngineSession, QueryEngine};
use crate::exec::error::{RunnerError, engine_message};
use crate::exec::template::{PlaceholderValues, partition_dir, rand_token, render_query};
use crate::quackrun_logging::{debug, info};

/// Smaller source files are treated as incomplete exports.
pub const MIN_SOURCE_FILE_BYTES: u64 = 1024 * 1024;

/// Applied after the exec queries and before any partitioned statement.
/// Output ordering is irrelevant because consumers read partitioned files.
pub const ENGINE_SETTINGS: [(&str, &str); 2] = [
    (
        "allocator_background_threads",
        "SET allocator_background_threads = true",
    ),
    (
        "preserve_insertion_order",
        "SET preserve_insertion_order = false",
    ),
];

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub exec_queries: usize,
    pub partitions: usize,
    pub statements: usize,
}

pub struct PartitionedQueryRunner {
    engine: Arc<dyn QueryEngine>,
}

impl PartitionedQueryRunner {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    pub fn run(&self, request: &Request) -> Result<RunSummary, RunnerError> {
        if request.queries.is_empty() {
            return Err(RunnerError::NoQueries);
        }
        let path = Path::new(&request.path);
        check_source_file(path)?;

        let mut session = self
            .engine
            .open(path)
            .map_err(|e| RunnerError::Open {
                path: path.to_path_buf(),
                message: engine_message(&e),
            })?;
        info!("opening {}", path.display());

        let mut summary = RunSummary::default();
        run_exec_queries(session.as_mut(), request, &mut summary)?;
        apply_engine_settings(session.as_mut())?;

        if request.partition_query.is_empty() {
            debug!("no partition query for {}", request.file_name());
            return Ok(summary);
        }

        let tick = Instant::now();
        let partitions = session
            .query_partitions(&request.partition_query)
            .map_err(|e| RunnerError::PartitionQuery {
                message: engine_message(&e),
            })?;
        info!(
            "partitionquery : {:.3} secs - {} results",
            tick.elapsed().as_secs_f64(),
            partitions.len()
        );

        for partition in &partitions {
            for (index, template) in request.queries.iter().enumerate() {
                let tick = Instant::now();
                let name = request
                    .queries_names
                    .get(index)
                    .ok_or(RunnerError::QueryNameMissing { index })?;

                let dir = partition_dir(&request.export_path, &request.log_name, name, partition);
                std::fs::create_dir_all(&dir).map_err(|source| RunnerError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;

                let rand = rand_token();
                let query = render_query(
                    template,
                    &PlaceholderValues {
                        export_path: &request.export_path,
                        log_name: &request.log_name,
                        query_name: name,
                        partition,
                        rand: &rand,
                    },
                );
                debug!("query {index} {name}: {query}");
                session.execute(&query).map_err(|e| RunnerError::Query {
                    index,
                    name: name.clone(),
                    partition: partition.clone(),
                    message: engine_message(&e),
                })?;
                summary.statements += 1;
                info!(
                    "query {index} {partition} : {:.3} secs",
                    tick.elapsed().as_secs_f64()
                );
            }
            summary.partitions += 1;
        }
        Ok(summary)
    }
}

pub fn check_source_file(path: &Path) -> Result<u64, RunnerError> {
    let meta = std::fs::metadata(path).map_err(|source| RunnerError::FileMissing {
        path: path.to_path_buf(),
        source,
    })?;
    let size = meta.len();
    if size < MIN_SOURCE_FILE_BYTES {
        return Err(RunnerError::FileTooSmall {
            path: path.to_path_buf(),
            size,
            min: MIN_SOURCE_FILE_BYTES,
        });
    }
    Ok(size)
}

fn run_exec_queries(
    session: &mut dyn EngineSession,
    request: &Request,
    summary: &mut RunSummary,
) -> Result<(), RunnerError> {
    for (index, query) in request.exec_queries.iter().enumerate() {
        let tick = Instant::now();
        let name = request
            .exec_queries_names
            .get(index)
            .map(String::as_str)
            .unwrap_or_default();
        session.execute(query).map_err(|e| RunnerError::Exec {
            index,
            name: name.to_string(),
            message: engine_message(&e),
        })?;
        summary.exec_queries += 1;
        if !name.is_empty() {
            info!(
                "exec query {name}: {:9.3} secs",
                tick.elapsed().as_secs_f64()
            );
        }
    }
    Ok(())
}

fn apply_engine_settings(session: &mut dyn EngineSession) -> Result<(), RunnerError> {
    for (setting, sql) in ENGINE_SETTINGS {
        session.execute(sql).map_err(|e| RunnerError::Tuning {
            setting,
            message: engine_message(&e),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::template::PartitionRow;
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Script {
        executed: Vec<String>,
        fail_on: Option<String>,
        partitions: Vec<PartitionRow>,
    }

    struct ScriptedEngine(Arc<Mutex<Script>>);

    struct ScriptedSession(Arc<Mutex<Script>>);

    impl QueryEngine for ScriptedEngine {
        fn open(&self, _path: &Path) -> anyhow::Result<Box<dyn EngineSession>> {
            Ok(Box::new(ScriptedSession(Arc::clone(&self.0))))
        }
    }

    impl EngineSession for ScriptedSession {
        fn execute(&mut self, sql: &str) -> anyhow::Result<()> {
            let mut script = self.0.lock().unwrap();
            if script.fail_on.as_deref().is_some_and(|f| sql.contains(f)) {
                return Err(anyhow!("boom"));
            }
            script.executed.push(sql.to_string());
            Ok(())
        }

        fn query_partitions(&mut self, _sql: &str) -> anyhow::Result<Vec<PartitionRow>> {
            Ok(self.0.lock().unwrap().partitions.clone())
        }
    }

    fn source_file(dir: &Path, size: usize) -> String {
        let path = dir.join("source.duckdb");
        std::fs::write(&path, vec![0u8; size]).unwrap();
        path.to_string_lossy().to_string()
    }

    fn request(dir: &Path) -> Request {
        Request {
            path: source_file(dir, MIN_SOURCE_FILE_BYTES as usize),
            log_name: "bids".to_string(),
            export_path: dir.join("out").to_string_lossy().to_string(),
            exec_queries: vec!["CREATE VIEW v AS SELECT 1".to_string()],
            exec_queries_names: vec!["view".to_string()],
            partition_query: "SELECT y, m, d, h FROM v".to_string(),
            queries: vec!["Q1 {{year}}".to_string(), "Q2 {{hour}}".to_string()],
            queries_names: vec!["q1".to_string(), "q2".to_string()],
        }
    }

    #[test]
    fn statements_run_in_partition_then_query_order() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script {
            partitions: vec![
                PartitionRow::new("2024", "01", "15", "09"),
                PartitionRow::new("2024", "01", "15", "10"),
            ],
            ..Default::default()
        }));
        let runner = PartitionedQueryRunner::new(Arc::new(ScriptedEngine(Arc::clone(&script))));
        let summary = runner.run(&request(dir.path())).expect("run");
        assert_eq!(
            summary,
            RunSummary {
                exec_queries: 1,
                partitions: 2,
                statements: 4
            }
        );

        let executed = script.lock().unwrap().executed.clone();
        assert_eq!(
            executed,
            vec![
                "CREATE VIEW v AS SELECT 1".to_string(),
                ENGINE_SETTINGS[0].1.to_string(),
                ENGINE_SETTINGS[1].1.to_string(),
                "Q1 2024".to_string(),
                "Q2 09".to_string(),
                "Q1 2024".to_string(),
                "Q2 10".to_string(),
            ]
        );
        assert!(dir
            .path()
            .join("out/bids/q2/year=2024/month=01/day=15/hour=10")
            .is_dir());
    }

    #[test]
    fn exec_failure_stops_before_later_statements() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script {
            fail_on: Some("VIEW".to_string()),
            ..Default::default()
        }));
        let runner = PartitionedQueryRunner::new(Arc::new(ScriptedEngine(Arc::clone(&script))));
        let err = runner.run(&request(dir.path())).expect_err("exec must fail");
        match err {
            RunnerError::Exec { index, name, .. } => {
                assert_eq!(index, 0);
                assert_eq!(name, "view");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(script.lock().unwrap().executed.is_empty());
    }

    #[test]
    fn query_failure_reports_partition_and_keeps_earlier_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script {
            fail_on: Some("Q2 10".to_string()),
            partitions: vec![
                PartitionRow::new("2024", "01", "15", "09"),
                PartitionRow::new("2024", "01", "15", "10"),
            ],
            ..Default::default()
        }));
        let runner = PartitionedQueryRunner::new(Arc::new(ScriptedEngine(Arc::clone(&script))));
        let err = runner.run(&request(dir.path())).expect_err("query must fail");
        match err {
            RunnerError::Query {
                index, partition, ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(partition.hour, "10");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(dir
            .path()
            .join("out/bids/q1/year=2024/month=01/day=15/hour=09")
            .is_dir());
        assert_eq!(script.lock().unwrap().executed.len(), 6);
    }

    #[test]
    fn empty_partition_query_skips_partitioned_work() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        let runner = PartitionedQueryRunner::new(Arc::new(ScriptedEngine(Arc::clone(&script))));
        let mut req = request(dir.path());
        req.partition_query.clear();
        let summary = runner.run(&req).expect("run");
        assert_eq!(summary.statements, 0);
        assert_eq!(script.lock().unwrap().executed.len(), 3);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn small_source_file_is_rejected_before_opening() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        let runner = PartitionedQueryRunner::new(Arc::new(ScriptedEngine(Arc::clone(&script))));
        let mut req = request(dir.path());
        req.path = source_file(dir.path(), 1024);
        let err = runner.run(&req).expect_err("small file must fail");
        assert!(matches!(err, RunnerError::FileTooSmall { size: 1024, .. }));
        assert!(script.lock().unwrap().executed.is_empty());
    }

    #[test]
    fn request_without_queries_is_rejected_before_opening() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        let runner = PartitionedQueryRunner::new(Arc::new(ScriptedEngine(Arc::clone(&script))));
        let mut req = request(dir.path());
        req.queries.clear();
        req.queries_names.clear();
        let err = runner.run(&req).expect_err("no queries");
        assert!(matches!(err, RunnerError::NoQueries));
        assert_eq!(err.to_string(), "no queries specified");
        assert!(script.lock().unwrap().executed.is_empty());
    }

    #[test]
    fn missing_source_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_source_file(&dir.path().join("missing.duckdb")).expect_err("missing");
        assert!(matches!(err, RunnerError::FileMissing { .. }));
    }
}
