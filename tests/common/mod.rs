// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared helpers for the sema integration tests.

use async_trait::async_trait;
use sema::server::{ClientFactory, ProxyCache, ProxyServer, ServerConfig};
use sema::logging::LoggingConfig;
use sema::store::{InMemoryClient, Labels, SecretEntry, SecretStoreClient, StoreEntry, StoreError};
use sema::StoreClient;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;

/// Upstream call counters shared by every client a factory builds.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct Counters {
    pub lists: AtomicUsize,
    pub gets: AtomicUsize,
    pub values: AtomicUsize,
}

#[allow(dead_code)]
impl Counters {
    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn values(&self) -> usize {
        self.values.load(Ordering::SeqCst)
    }
}

/// In-memory upstream whose value reads wait until the gate opens.
#[derive(Debug)]
pub struct GatedStore {
    inner: InMemoryClient,
    counters: Arc<Counters>,
    gate: Arc<Semaphore>,
}

#[derive(Debug)]
struct GatedEntry {
    inner: StoreEntry,
    counters: Arc<Counters>,
    gate: Arc<Semaphore>,
}

impl GatedStore {
    fn wrap(&self, entry: StoreEntry) -> StoreEntry {
        Arc::new(GatedEntry {
            inner: entry,
            counters: self.counters.clone(),
            gate: self.gate.clone(),
        })
    }
}

#[async_trait]
impl SecretStoreClient for GatedStore {
    async fn list_keys(&self) -> Result<Vec<StoreEntry>, StoreError> {
        self.counters.lists.fetch_add(1, Ordering::SeqCst);
        let entries = self.inner.list_keys().await?;
        Ok(entries.into_iter().map(|e| self.wrap(e)).collect())
    }

    async fn get(&self, short_name: &str) -> Result<StoreEntry, StoreError> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.wrap(self.inner.get(short_name).await?))
    }

    async fn create(&self, short_name: &str, labels: Labels) -> Result<StoreEntry, StoreError> {
        self.inner.create(short_name, labels).await
    }
}

#[async_trait]
impl SecretEntry for GatedEntry {
    fn full_name(&self) -> &str {
        self.inner.full_name()
    }

    fn short_name(&self) -> &str {
        self.inner.short_name()
    }

    fn labels(&self) -> Labels {
        self.inner.labels()
    }

    async fn set_labels(&self, labels: Labels) -> Result<(), StoreError> {
        self.inner.set_labels(labels).await
    }

    async fn get_value(&self) -> Result<Vec<u8>, StoreError> {
        self.counters.values.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StoreError::Upstream(e.to_string()))?;
        self.inner.get_value().await
    }

    async fn set_value(&self, data: &[u8]) -> Result<String, StoreError> {
        self.inner.set_value(data).await
    }
}

/// Factory over a fixed seed; the returned gate starts closed when `gated`.
#[allow(dead_code)]
pub fn gated_factory(
    seed: &'static [(&'static str, &'static str)],
    gated: bool,
) -> (ClientFactory, Arc<Counters>, Arc<Semaphore>) {
    let counters = Arc::new(Counters::default());
    let gate = Arc::new(Semaphore::new(if gated { 0 } else { Semaphore::MAX_PERMITS }));
    let (c, g) = (counters.clone(), gate.clone());
    let factory: ClientFactory = Arc::new(move |project: &str| -> Result<StoreClient, StoreError> {
        let client: StoreClient = Arc::new(GatedStore {
            inner: InMemoryClient::new(project, seed.iter().copied()),
            counters: c.clone(),
            gate: g.clone(),
        });
        Ok(client)
    });
    (factory, counters, gate)
}

/// A proxy running on an ephemeral port.
#[allow(dead_code)]
pub struct RunningProxy {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl RunningProxy {
    pub async fn start(factory: ClientFactory) -> Self {
        let server = ProxyServer::new(
            ServerConfig::default(),
            Arc::new(ProxyCache::new(factory)),
            LoggingConfig::default(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async move {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });
        Self {
            addr,
            stop: Some(stop),
            handle,
        }
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap();
    }
}
