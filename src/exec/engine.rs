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
//! Embedded engine seam. The runner only needs to run statements without
//! results and read the partition rows; everything else stays in SQL.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use duckdb::types::ValueRef;

use crate::exec::template::PartitionRow;

pub trait QueryEngine: Send + Sync {
    /// Open the data file. The session is used by one thread for one run.
    fn open(&self, path: &Path) -> Result<Box<dyn EngineSession>>;
}

pub trait EngineSession {
    /// Execute one statement, discarding any result.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Execute the partition query and read columns 0..3 of every row as
    /// (year, month, day, hour), in the order the engine returns them.
    fn query_partitions(&mut self, sql: &str) -> Result<Vec<PartitionRow>>;
}

/// DuckDB database files opened read-write through the bundled library.
#[derive(Clone, Copy, Debug, Default)]
pub struct DuckDbEngine;

impl QueryEngine for DuckDbEngine {
    fn open(&self, path: &Path) -> Result<Box<dyn EngineSession>> {
        let conn = duckdb::Connection::open(path)
            .with_context(|| format!("open duckdb file {}", path.display()))?;
        Ok(Box::new(DuckDbSession { conn }))
    }
}

struct DuckDbSession {
    conn: duckdb::Connection,
}

impl EngineSession for DuckDbSession {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn query_partitions(&mut self, sql: &str) -> Result<Vec<PartitionRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cols: [String; 4] = Default::default();
            for (idx, col) in cols.iter_mut().enumerate() {
                let v = row
                    .get_ref(idx)
                    .with_context(|| format!("partition row {} column {idx}", out.len()))?;
                *col = partition_text(v)
                    .with_context(|| format!("partition row {} column {idx}", out.len()))?;
            }
            let [year, month, day, hour] = cols;
            out.push(PartitionRow {
                year,
                month,
                day,
                hour,
            });
        }
        Ok(out)
    }
}

/// Partition columns are expected as text; integer columns are accepted and
/// rendered without padding.
fn partition_text(value: ValueRef<'_>) -> Result<String> {
    match value {
        ValueRef::Text(b) => Ok(String::from_utf8_lossy(b).to_string()),
        ValueRef::TinyInt(v) => Ok(v.to_string()),
        ValueRef::SmallInt(v) => Ok(v.to_string()),
        ValueRef::Int(v) => Ok(v.to_string()),
        ValueRef::BigInt(v) => Ok(v.to_string()),
        ValueRef::UTinyInt(v) => Ok(v.to_string()),
        ValueRef::USmallInt(v) => Ok(v.to_string()),
        ValueRef::UInt(v) => Ok(v.to_string()),
        ValueRef::UBigInt(v) => Ok(v.to_string()),
        ValueRef::Null => Err(anyhow!("partition value is NULL")),
        _ => Err(anyhow!("unsupported partition value type, expected text or integer")),
    }
}
