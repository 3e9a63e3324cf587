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
//! Socket listener for the runner protocol, and a matching client.

use std::fmt;
use std::io;
#[cfg(unix)]
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::common::app_config::{RpcConfig, TransportKind};
use crate::common::types::{Request, RequestType, Response};
use crate::quackrun_logging::{debug, info, warn};
use crate::service::rpc::{decode_frame, encode_request, read_line, write_json_line};
use crate::service::runner_service::RunnerService;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ListenAddr {
    #[cfg(unix)]
    Unix(PathBuf),
    Tcp(String),
}

impl ListenAddr {
    /// An explicit address wins over the config. It may be `tcp://host:port`,
    /// `unix://path`, a bare `host:port` or a bare socket path.
    pub fn resolve(cfg: &RpcConfig, address: Option<&str>) -> Self {
        if let Some(address) = address.filter(|a| !a.is_empty()) {
            return Self::parse(address);
        }
        let tcp = || ListenAddr::Tcp(format!("{}:{}", cfg.host, cfg.port));
        match cfg.transport {
            TransportKind::Tcp => tcp(),
            #[cfg(unix)]
            TransportKind::Unix | TransportKind::Auto => {
                ListenAddr::Unix(PathBuf::from(&cfg.socket_path))
            }
            #[cfg(not(unix))]
            TransportKind::Unix | TransportKind::Auto => {
                warn!("unix sockets are unavailable, listening on tcp");
                tcp()
            }
        }
    }

    pub fn parse(address: &str) -> Self {
        if let Some(rest) = address.strip_prefix("tcp://") {
            return ListenAddr::Tcp(rest.to_string());
        }
        #[cfg(unix)]
        {
            if let Some(rest) = address.strip_prefix("unix://") {
                return ListenAddr::Unix(PathBuf::from(rest));
            }
            if address.parse::<SocketAddr>().is_err() {
                return ListenAddr::Unix(PathBuf::from(address));
            }
        }
        ListenAddr::Tcp(address.to_string())
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            ListenAddr::Unix(path) => write!(f, "unix://{}", path.display()),
            ListenAddr::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

enum Listener {
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
    Tcp(TcpListener),
}

impl Listener {
    fn remove_socket_file(&self) {
        match self {
            #[cfg(unix)]
            Listener::Unix(_, path) => {
                if let Err(err) = std::fs::remove_file(path) {
                    warn!("remove socket {} failed: {err}", path.display());
                }
            }
            Listener::Tcp(_) => {}
        }
    }
}

pub struct RpcServer {
    listener: Listener,
    local_addr: ListenAddr,
    service: Arc<RunnerService>,
}

impl RpcServer {
    pub async fn bind(addr: &ListenAddr, service: Arc<RunnerService>) -> io::Result<Self> {
        let (listener, local_addr) = match addr {
            #[cfg(unix)]
            ListenAddr::Unix(path) => {
                remove_stale_socket(path)?;
                let listener = UnixListener::bind(path)?;
                (Listener::Unix(listener, path.clone()), addr.clone())
            }
            ListenAddr::Tcp(host_port) => {
                let listener = TcpListener::bind(host_port.as_str()).await?;
                let bound = listener.local_addr()?;
                (Listener::Tcp(listener), ListenAddr::Tcp(bound.to_string()))
            }
        };
        info!("rpc listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
            service,
        })
    }

    /// The bound address. For TCP this carries the actual port.
    pub fn local_addr(&self) -> &ListenAddr {
        &self.local_addr
    }

    /// Accepts connections until `cancel` fires. Every connection is served
    /// on its own task; one frame in, one response out, repeated.
    pub async fn serve(self, cancel: CancellationToken) -> io::Result<()> {
        let result = match &self.listener {
            #[cfg(unix)]
            Listener::Unix(listener, _) => {
                accept_loop(&cancel, &self.service, move || async move {
                    listener.accept().await.map(|(stream, _)| stream)
                })
                .await
            }
            Listener::Tcp(listener) => {
                accept_loop(&cancel, &self.service, move || async move {
                    let (stream, peer) = listener.accept().await?;
                    debug!("rpc connection from {peer}");
                    Ok::<_, io::Error>(stream)
                })
                .await
            }
        };
        self.listener.remove_socket_file();
        info!("rpc listener on {} stopped", self.local_addr);
        result
    }
}

async fn accept_loop<S, F, Fut>(
    cancel: &CancellationToken,
    service: &Arc<RunnerService>,
    mut accept: F,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<S>>,
{
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = accept() => accepted,
        };
        match accepted {
            Ok(stream) => {
                let service = Arc::clone(service);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, service, cancel).await {
                        debug!("rpc connection closed with error: {err}");
                    }
                });
            }
            Err(err) if is_transient_accept_error(&err) => {
                warn!("rpc accept failed: {err}");
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

async fn serve_connection<S>(
    stream: S,
    service: Arc<RunnerService>,
    cancel: CancellationToken,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            line = read_line(&mut reader) => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let response = match decode_frame(&line) {
            Ok(call) => {
                debug!("rpc {} {}", call.request_type(), line);
                service.handle(call).await
            }
            Err(err) => {
                warn!("rpc bad frame: {err}");
                err.into_response()
            }
        };
        write_json_line(&mut write_half, &response).await?;
    }
}

#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            info!("removing stale socket {}", path.display());
            std::fs::remove_file(path)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// One connection to a running listener. Calls are sequential.
pub struct RpcClient {
    reader: BufReader<BoxedRead>,
    writer: BoxedWrite,
}

impl RpcClient {
    pub async fn connect(addr: &ListenAddr) -> io::Result<Self> {
        let (reader, writer): (BoxedRead, BoxedWrite) = match addr {
            #[cfg(unix)]
            ListenAddr::Unix(path) => {
                let (r, w) = UnixStream::connect(path).await?.into_split();
                (Box::new(r), Box::new(w))
            }
            ListenAddr::Tcp(host_port) => {
                let (r, w) = TcpStream::connect(host_port.as_str()).await?.into_split();
                (Box::new(r), Box::new(w))
            }
        };
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    pub async fn call(&mut self, request_type: RequestType, request: &Request) -> io::Result<Response> {
        let line = encode_request(request_type, request)?;
        self.call_raw(&line).await
    }

    pub async fn ping(&mut self) -> io::Result<Response> {
        self.call(RequestType::Ping, &Request::default()).await
    }

    /// Sends one already-encoded frame.
    pub async fn call_raw(&mut self, line: &str) -> io::Result<Response> {
        self.writer.write_all(line.trim_end().as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        let Some(reply) = read_line(&mut self.reader).await? else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "listener closed the connection",
            ));
        };
        serde_json::from_str(&reply).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
