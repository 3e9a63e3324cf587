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
use anyhow::{Context, Result, anyhow};
use opendal::Operator;
use std::path::{Component, Path, PathBuf};

pub fn build_fs_operator(root: &str) -> Result<Operator> {
    if root.trim().is_empty() {
        return Err(anyhow!("empty fs operator root"));
    }
    let builder = opendal::services::Fs::default().root(root);
    let op = Operator::new(builder)
        .context("init opendal fs operator")?
        .finish();
    Ok(op)
}

/// Normalize the watched root to end with exactly one separator and make sure
/// it exists as a directory.
pub fn normalize_watch_root(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("watch path is empty"));
    }
    let base = trimmed.trim_end_matches(std::path::MAIN_SEPARATOR);
    let base = if base.is_empty() {
        std::path::MAIN_SEPARATOR.to_string()
    } else {
        base.to_string()
    };
    let meta = std::fs::metadata(&base).with_context(|| format!("watch path error for {base}"))?;
    if !meta.is_dir() {
        return Err(anyhow!("watch path {base} is not a directory"));
    }
    let mut normalized = base;
    if !normalized.ends_with(std::path::MAIN_SEPARATOR) {
        normalized.push(std::path::MAIN_SEPARATOR);
    }
    Ok(PathBuf::from(normalized))
}

/// Object key for a file under `root`: the path with the root prefix removed,
/// joined with `/` whatever the host separator is.
pub fn object_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::{normalize_watch_root, object_key};
    use std::path::Path;

    #[test]
    fn object_key_strips_root_prefix() {
        let root = Path::new("/data/parquet/");
        let key = object_key(root, Path::new("/data/parquet/run/q1/year=2024/a.parquet"));
        assert_eq!(key.as_deref(), Some("run/q1/year=2024/a.parquet"));
    }

    #[test]
    fn object_key_rejects_paths_outside_root() {
        let root = Path::new("/data/parquet/");
        assert!(object_key(root, Path::new("/other/a.parquet")).is_none());
        assert!(object_key(root, Path::new("/data/parquet/")).is_none());
    }

    #[test]
    fn watch_root_gets_single_trailing_separator() {
        let dir = tempfile::tempdir().expect("tempdir");
        let raw = format!(
            "{}{}{}",
            dir.path().display(),
            std::path::MAIN_SEPARATOR,
            std::path::MAIN_SEPARATOR
        );
        let root = normalize_watch_root(&raw).expect("normalize");
        let rendered = root.to_string_lossy().to_string();
        assert!(rendered.ends_with(std::path::MAIN_SEPARATOR));
        assert!(!rendered.ends_with(&format!(
            "{}{}",
            std::path::MAIN_SEPARATOR,
            std::path::MAIN_SEPARATOR
        )));
    }

    #[test]
    fn missing_watch_root_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        assert!(normalize_watch_root(&missing.to_string_lossy()).is_err());
    }
}
