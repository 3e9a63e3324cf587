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
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use chrono::{Datelike, Local, Timelike};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

static INIT: OnceLock<()> = OnceLock::new();

const LOG_FILE_NAME: &str = "quackrun.log";

struct GlogFormatter;

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `$QUACKRUN_LOG_FILE` wins, then `$QUACKRUN_LOG_DIR` / `$LOG_DIR` joined with
/// `quackrun.log`, then `./log/quackrun.log`.
pub fn resolve_log_file_path() -> PathBuf {
    if let Some(file) = non_empty_env("QUACKRUN_LOG_FILE") {
        return PathBuf::from(file);
    }
    let log_dir = non_empty_env("QUACKRUN_LOG_DIR")
        .or_else(|| non_empty_env("LOG_DIR"))
        .unwrap_or_else(|| "log".to_string());
    PathBuf::from(log_dir).join(LOG_FILE_NAME)
}

/// Appends to the resolved log file, creating its directory first.
fn open_log_file() -> io::Result<File> {
    let path = resolve_log_file_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(&path)
}

impl<S, N> FormatEvent<S, N> for GlogFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let level_char = match *metadata.level() {
            tracing::Level::ERROR => 'E',
            tracing::Level::WARN => 'W',
            tracing::Level::INFO => 'I',
            tracing::Level::DEBUG => 'D',
            tracing::Level::TRACE => 'T',
        };

        let now = Local::now();
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("-");
        let file = metadata.file().unwrap_or("unknown");
        let line = metadata.line().unwrap_or(0);

        // Lyyyymmdd hh:mm:ss.uuuuuu thread file:line] message
        write!(
            writer,
            "{}{:04}{:02}{:02} {:02}:{:02}:{:02}.{:06} {} {}:{}] ",
            level_char,
            now.year() % 10000,
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_micros(),
            thread_name,
            file,
            line
        )?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Expand a bare level into a filter expression. `debug` and `trace` are scoped
/// to this crate so dependencies (opendal, hyper, duckdb) stay at `info`.
pub fn filter_for_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => "info,quackrun=debug".to_string(),
        "trace" => "info,quackrun=trace".to_string(),
        other => other.to_string(),
    }
}

/// Install the global subscriber once; later calls are ignored. Logs go to
/// the resolved log file, or to stderr when it cannot be opened.
pub fn init_with_level(level: &str) {
    INIT.get_or_init(|| match open_log_file() {
        Ok(file) => {
            let _ = tracing_fmt()
                .with_env_filter(EnvFilter::new(level))
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .event_format(GlogFormatter)
                .try_init();
        }
        Err(err) => {
            eprintln!(
                "cannot open log file {}: {err}, logging to stderr",
                resolve_log_file_path().display()
            );
            let _ = tracing_fmt()
                .with_env_filter(EnvFilter::new(level))
                .with_writer(io::stderr)
                .with_ansi(atty::is(atty::Stream::Stderr))
                .event_format(GlogFormatter)
                .try_init();
        }
    });
}

pub use tracing::{debug, error, info, trace, warn};
