// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Caching secret-store proxy server.
//!
//! The server is a thin wrapper around **hyper-util**. It owns the listening
//! socket and answers `GET /list` and `GET /get` from a [`ProxyCache`], so
//! any number of concurrent callers cost the upstream store one listing per
//! project and one value read per secret for the lifetime of the process.
//!
//! Uses `hyper_util::server::conn::auto::Builder`, so the same connection
//! handles both HTTP/1.1 and HTTP/2.

mod cache;
mod handlers;

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::Request;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{RwLock, oneshot};
use tokio::task::{Id, JoinSet};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

pub use cache::{CachedSecret, ClientFactory, ProxyCache};
pub use handlers::{CACHE_HIT, respond};

use crate::logging::LoggingConfig;

/// Configuration for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    #[error("cannot install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// HTTP server for the proxy.
#[derive(Debug, Clone)]
pub struct ProxyServer {
    config: ServerConfig,
    cache: Arc<ProxyCache>,
    logging: Arc<LoggingConfig>,
    /// Shutdown senders for each connection task
    shutdown_senders: Arc<RwLock<HashMap<Id, oneshot::Sender<()>>>>,
}

impl ProxyServer {
    pub fn new(config: ServerConfig, cache: Arc<ProxyCache>, logging: LoggingConfig) -> Self {
        Self {
            config,
            cache,
            logging: Arc::new(logging),
            shutdown_senders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ProxyCache> {
        &self.cache
    }

    /// Bind the configured address and serve until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port)
            .parse::<SocketAddr>()
            .map_err(|e| ServerError::InvalidAddress(e.to_string()))?;

        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;

        #[cfg(unix)]
        let mut term_stream = signal(SignalKind::terminate()).map_err(ServerError::Signal)?;

        let shutdown = async move {
            #[cfg(unix)]
            let sigterm = term_stream.recv();
            #[cfg(not(unix))]
            let sigterm = std::future::pending::<Option<()>>();

            tokio::select! {
                _ = signal::ctrl_c() => info!("Received Ctrl-C; initiating graceful shutdown"),
                _ = sigterm => info!("Received SIGTERM; initiating graceful shutdown"),
            }
        };

        self.serve(listener, shutdown).await
    }

    /// Accept connections on `listener` until `shutdown` resolves, then drain
    /// open connections.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!("Sema proxy listening on http://{}", addr);
        }

        tokio::pin!(shutdown);

        let shutdown_senders = self.shutdown_senders.clone();
        let mut join_set = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, remote_addr)) => {
                            let cache = self.cache.clone();
                            let logging = self.logging.clone();
                            let client_ip = remote_addr.ip().to_string();
                            let (tx, rx) = oneshot::channel();
                            let shutdown_senders_clone = shutdown_senders.clone();

                            let handle = join_set.spawn(async move {
                                let task_id = tokio::task::id();

                                let service = service_fn(move |req: Request<Incoming>| {
                                    debug!("Incoming over {:?}", req.version());
                                    handlers::handle_request(
                                        req,
                                        cache.clone(),
                                        logging.clone(),
                                        client_ip.clone(),
                                    )
                                });
                                let io = TokioIo::new(stream);

                                let builder = {
                                    let mut b = AutoBuilder::new(TokioExecutor::new());
                                    b.http1();
                                    b.http2();
                                    b
                                };

                                let connection = builder.serve_connection(io, service);
                                let mut conn = std::pin::pin!(connection);

                                tokio::select! {
                                    res = &mut conn => {
                                        if let Err(e) = res {
                                            log_connection_error(&*e);
                                        }
                                    }
                                    _ = rx => {
                                        debug!("Connection received shutdown signal, waiting for graceful close");
                                        conn.as_mut().graceful_shutdown();
                                        if let Err(e) = conn.await {
                                            log_connection_error(&*e);
                                        }
                                    }
                                }

                                shutdown_senders_clone.write().await.remove(&task_id);
                                debug!("Connection task {:?} completed", task_id);
                            });

                            shutdown_senders.write().await.insert(handle.id(), tx);
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
            }
        }

        {
            let mut senders = shutdown_senders.write().await;
            info!("Signaling {} connections to shut down", senders.len());
            for (_, sender) in senders.drain() {
                let _ = sender.send(());
            }
        }

        let shutdown_timeout = tokio::time::Duration::from_secs(30);
        let drain = async {
            while let Some(res) = join_set.join_next().await {
                match res {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => debug!("Connection task cancelled"),
                    Err(e) => error!("Connection task failed: {}", e),
                }
            }
        };

        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            warn!(
                "Shutdown timed out after {} seconds, remaining connections are closed",
                shutdown_timeout.as_secs()
            );
            join_set.shutdown().await;
        }

        info!("Shutdown complete");
        Ok(())
    }
}

fn log_connection_error(e: &(dyn std::error::Error + Send + Sync)) {
    let message = e.to_string();
    if message.contains("connection closed") || message.contains("connection reset") {
        debug!("Connection closed: {}", message);
    } else {
        error!("Connection error: {}", message);
    }
}
