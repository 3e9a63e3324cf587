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
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use quackrun::common::app_config::{ConfigSource, RunnerConfig};
use quackrun::exec::engine::DuckDbEngine;
use quackrun::fs::local::normalize_watch_root;
use quackrun::fs::object_store::build_object_store_operator;
use quackrun::fs::sweep::{SweepOptions, Sweeper};
use quackrun::fs::uploader::OpendalUploader;
use quackrun::quackrun_logging::{error, info, warn};
use quackrun::runtime::job_queue;
use quackrun::runtime::job_worker::JobWorker;
use quackrun::service::runner_service::RunnerService;
use quackrun::{ListenAddr, PartitionedQueryRunner, RpcServer, quackrun_config, quackrun_logging};

#[derive(Parser, Debug)]
#[command(name = "quackrun", version, about = "Partitioned DuckDB query runner")]
struct Args {
    /// Config file; defaults to $QUACKRUN_CONFIG, then ./quackrun.toml
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen address: a socket path, host:port, unix://path or tcp://host:port
    #[arg(short = 'r', long, env = "RUNNER_SOCKET")]
    address: Option<String>,

    /// Directory watched by the sweep
    #[arg(short = 'p', long = "parquet-path", env = "PARQUET_PATH")]
    parquet_path: Option<String>,

    /// Destination bucket for promoted files
    #[arg(short = 'b', long, env = "GCS_BUCKET")]
    bucket: Option<String>,

    #[arg(long)]
    log_level: Option<String>,
}

/// Startup problems exit 1, a listener that cannot serve exits 2.
enum Failure {
    Setup(anyhow::Error),
    Serve(anyhow::Error),
}

impl Failure {
    fn exit_code(&self) -> ExitCode {
        match self {
            Failure::Setup(_) => ExitCode::from(1),
            Failure::Serve(_) => ExitCode::from(2),
        }
    }

    fn error(&self) -> &anyhow::Error {
        match self {
            Failure::Setup(e) | Failure::Serve(e) => e,
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<RunnerConfig> {
    let (mut cfg, source) = quackrun_config::load(args.config.as_deref())?;
    if let ConfigSource::File(path) = &source {
        eprintln!("quackrun: using config {}", path.display());
    }
    if let Some(path) = &args.parquet_path {
        cfg.sweep.watch_path = path.clone();
    }
    if let Some(bucket) = &args.bucket {
        cfg.object_store.bucket = bucket.clone();
    }
    if let Some(level) = &args.log_level {
        cfg.log_level = level.clone();
        cfg.log_filter = None;
    }
    Ok(cfg)
}

fn start_sweep(
    cfg: &RunnerConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<Option<tokio::task::JoinHandle<()>>> {
    if !cfg.sweep.enabled {
        info!("sweep disabled");
        return Ok(None);
    }
    let root = normalize_watch_root(&cfg.sweep.watch_path)?;
    let store = cfg.object_store.to_object_store_config();
    let op = build_object_store_operator(&store)
        .with_context(|| format!("build object store {}", store.describe()))?;
    let sweeper = Sweeper::new(
        SweepOptions::from_config(root, &cfg.sweep),
        Arc::new(OpendalUploader::new(op)),
    );
    Ok(Some(tokio::spawn(sweeper.run(cancel.clone()))))
}

async fn run(cfg: RunnerConfig, address: Option<String>) -> Result<(), Failure> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        on_signal.cancel();
    })
    .context("install signal handler")
    .map_err(Failure::Setup)?;

    let sweep = start_sweep(&cfg, &cancel).map_err(Failure::Setup)?;

    let (queue, rx) = job_queue::channel(cfg.queue.capacity, cfg.queue_size);
    let worker = JobWorker::new(PartitionedQueryRunner::new(Arc::new(DuckDbEngine)))
        .spawn(rx, cancel.clone())
        .context("start query worker")
        .map_err(Failure::Setup)?;
    info!(
        capacity = cfg.queue.capacity,
        busy_threshold = cfg.queue_size,
        "query worker started"
    );

    let service = Arc::new(RunnerService::new(queue));
    let addr = ListenAddr::resolve(&cfg.rpc, address.as_deref());
    let served = match RpcServer::bind(&addr, service).await {
        Ok(server) => server
            .serve(cancel.clone())
            .await
            .with_context(|| format!("serve {addr}")),
        Err(e) => Err(anyhow!(e).context(format!("bind {addr}"))),
    };

    cancel.cancel();
    if let Some(task) = sweep
        && let Err(e) = task.await
    {
        warn!("sweep task ended abnormally: {e}");
    }
    match tokio::task::spawn_blocking(move || worker.join()).await {
        Ok(Ok(stats)) => info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            dropped = stats.dropped,
            "query worker joined"
        ),
        Ok(Err(_)) => error!("query worker panicked"),
        Err(e) => error!("join query worker: {e}"),
    }
    served.map_err(Failure::Serve)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let cfg = match load_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("quackrun: {e:#}");
            return ExitCode::from(1);
        }
    };
    quackrun_logging::init_with_level(&cfg.log_filter());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("quackrun-rt")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("init tokio runtime failed: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cfg, args.address)) {
        Ok(()) => {
            println!("Bye");
            ExitCode::SUCCESS
        }
        Err(failure) => {
            error!("{:#}", failure.error());
            eprintln!("quackrun: {:#}", failure.error());
            failure.exit_code()
        }
    }
}
