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
//! Periodic promotion of settled output files to object storage.
//!
//! Every tick runs a promotion pass followed by a fixed number of cleanup
//! passes over the watched root:
//! - a regular file with the watched extension whose mtime is older than the
//!   grace window is uploaded under its root-relative key, and removed locally
//!   only once the upload has been committed. Failures leave the file for the
//!   next tick.
//! - a non-root directory that is empty and older than the grace window is
//!   removed. A chain of nested empty directories deeper than the pass count
//!   collapses over several ticks.
//!
//! The sweep shares nothing with the query worker except the filesystem; the
//! grace window is what keeps it from racing a writer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::common::app_config::SweepConfig;
use crate::common::util::{format_bytes, format_duration};
use crate::fs::local::object_key;
use crate::fs::uploader::ObjectUploader;
use crate::quackrun_logging::{debug, info, warn};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[derive(Clone, Debug)]
pub struct SweepOptions {
    pub root: PathBuf,
    /// Extension including the leading dot, e.g. `.parquet`. Empty matches every file.
    pub extension: String,
    pub interval: Duration,
    pub grace: Duration,
    pub cleanup_passes: usize,
}

impl SweepOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(root, &SweepConfig::default())
    }

    pub fn from_config(root: impl Into<PathBuf>, cfg: &SweepConfig) -> Self {
        Self {
            root: root.into(),
            extension: cfg.extension.clone(),
            interval: Duration::from_secs(cfg.interval_secs.max(1)),
            grace: Duration::from_secs(cfg.grace_secs),
            cleanup_passes: cfg.cleanup_passes,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn matches_extension(&self, path: &Path) -> bool {
        let wanted = self.extension.trim_start_matches('.');
        if wanted.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == wanted)
    }
}

/// A candidate for promotion, rebuilt on every tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub key: String,
    pub size: u64,
    pub modified: SystemTime,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub promoted: usize,
    pub failed: usize,
    pub unsettled: usize,
    pub dirs_removed: usize,
}

pub struct Sweeper {
    options: SweepOptions,
    uploader: Arc<dyn ObjectUploader>,
    clock: Arc<dyn Clock>,
}

impl Sweeper {
    pub fn new(options: SweepOptions, uploader: Arc<dyn ObjectUploader>) -> Self {
        Self {
            options,
            uploader,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &SweepOptions {
        &self.options
    }

    /// Files eligible for promotion at `now`, in walk order, plus the number of
    /// matching files still inside the grace window.
    pub fn scan(&self, now: SystemTime) -> (Vec<WatchedFile>, usize) {
        scan_settled(&self.options, now)
    }

    /// Upload every settled file, one at a time. Returns the parent directories
    /// of promoted files so cleanup can leave them alone for this tick.
    pub async fn promote(&self, report: &mut SweepReport) -> HashSet<PathBuf> {
        let options = self.options.clone();
        let now = self.clock.now();
        let (files, unsettled) =
            match tokio::task::spawn_blocking(move || scan_settled(&options, now)).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("sweep scan aborted: {}", e);
                    return HashSet::new();
                }
            };
        report.unsettled += unsettled;
        let mut touched = HashSet::new();
        for file in files {
            let start = Instant::now();
            info!("Upload START {} {}", file.key, format_bytes(file.size));
            if let Err(e) = self.uploader.upload(&file.path, &file.key).await {
                warn!("Upload ERROR {} : {:#}", file.key, e);
                report.failed += 1;
                continue;
            }
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                // Already uploaded; the next tick re-uploads the same key, which
                // overwrites the object with identical bytes.
                warn!("Upload ERROR {} : remove local copy: {}", file.path.display(), e);
                report.failed += 1;
                continue;
            }
            if let Some(parent) = file.path.parent() {
                touched.insert(parent.to_path_buf());
            }
            report.promoted += 1;
            info!(
                "Upload DONE {} in {}",
                file.key,
                format_duration(start.elapsed())
            );
        }
        touched
    }

    /// Bounded number of pre-order passes removing empty, settled, non-root
    /// directories. Directories in `keep` are skipped.
    pub async fn cleanup(&self, keep: HashSet<PathBuf>) -> usize {
        let options = self.options.clone();
        let clock = Arc::clone(&self.clock);
        let passes = tokio::task::spawn_blocking(move || {
            (0..options.cleanup_passes)
                .map(|_| cleanup_pass(&options, clock.now(), &keep))
                .sum::<usize>()
        });
        match passes.await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("sweep cleanup aborted: {}", e);
                0
            }
        }
    }

    pub async fn tick(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let touched = self.promote(&mut report).await;
        report.dirs_removed = self.cleanup(touched).await;
        debug!(
            promoted = report.promoted,
            failed = report.failed,
            unsettled = report.unsettled,
            dirs_removed = report.dirs_removed,
            "sweep tick finished"
        );
        report
    }

    /// Sleep one interval, run one tick, repeat. Cancellation is observed while
    /// waiting; a tick that already started runs to completion.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "sweep started: root={} extension={} interval={:?} grace={:?}",
            self.options.root.display(),
            self.options.extension,
            self.options.interval,
            self.options.grace
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.options.interval) => {
                    self.tick().await;
                }
            }
        }
        info!("sweep stopped");
    }
}

fn is_settled(grace: Duration, modified: SystemTime, now: SystemTime) -> bool {
    // A timestamp in the future counts as fresh.
    now.duration_since(modified).is_ok_and(|age| age > grace)
}

fn walk(root: &Path) -> walkdir::IntoIter {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
}

fn scan_settled(options: &SweepOptions, now: SystemTime) -> (Vec<WatchedFile>, usize) {
    let mut settled = Vec::new();
    let mut unsettled = 0usize;
    for entry in walk(&options.root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("sweep walk under {}: {}", options.root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !options.matches_extension(entry.path()) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if !is_settled(options.grace, modified, now) {
            unsettled += 1;
            continue;
        }
        let Some(key) = object_key(&options.root, entry.path()) else {
            warn!("skip {}: outside watched root", entry.path().display());
            continue;
        };
        settled.push(WatchedFile {
            path: entry.into_path(),
            key,
            size: meta.len(),
            modified,
        });
    }
    (settled, unsettled)
}

/// One pre-order pass. A removed directory is not descended into, so each
/// pass peels at most one level off an empty chain.
fn cleanup_pass(options: &SweepOptions, now: SystemTime, keep: &HashSet<PathBuf>) -> usize {
    let mut removed = 0usize;
    let mut entries = walk(&options.root);
    while let Some(entry) = entries.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("sweep walk under {}: {}", options.root.display(), e);
                continue;
            }
        };
        if entry.depth() == 0 || !entry.file_type().is_dir() || keep.contains(entry.path()) {
            continue;
        }
        let settled = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .is_some_and(|modified| is_settled(options.grace, modified, now));
        if !settled || !is_empty_dir(entry.path()) {
            continue;
        }
        match std::fs::remove_dir(entry.path()) {
            Ok(()) => {
                info!("{} removed", entry.path().display());
                removed += 1;
                entries.skip_current_dir();
            }
            Err(e) => warn!("remove dir {}: {}", entry.path().display(), e),
        }
    }
    removed
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).is_ok_and(|mut rd| rd.next().is_none())
}
