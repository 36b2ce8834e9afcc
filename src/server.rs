use anyhow::{Context, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ListenConfig, TunnelConfig};
use crate::proxy;
use crate::security::is_client_ip_allowed;

const ACCEPT_BACKLOG: u32 = 5;

/// Tracks the tasks serving live connections so that shutdown can close them
/// in bulk. Tasks unregister themselves when they finish.
#[derive(Clone, Default)]
pub struct Registry {
    connections: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
    counter: Arc<AtomicU64>,
}

impl Registry {
    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    fn register(&self, id: u64, handle: JoinHandle<()>) {
        // The task may already have finished and unregistered itself.
        if handle.is_finished() {
            return;
        }
        self.connections.lock().unwrap().insert(id, handle);
    }

    fn unregister(&self, id: u64) {
        self.connections.lock().unwrap().remove(&id);
    }

    /// Aborts every tracked connection task, dropping (and thereby closing)
    /// its sockets. Safe to call more than once.
    pub fn close_all(&self) {
        let connections: Vec<(u64, JoinHandle<()>)> = {
            let mut guard = self.connections.lock().unwrap();
            guard.drain().collect()
        };
        for (id, handle) in connections {
            debug!(connection_id = id, "Closing tracked connection");
            handle.abort();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Server {
    listener: TcpListener,
    listen: ListenConfig,
    tunnel: Arc<TunnelConfig>,
    registry: Registry,
    running: AtomicBool,
}

impl Server {
    /// Binds and starts listening. A failure here is fatal to the process.
    pub fn bind(config: Config) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.listen.ip, config.listen.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    config.listen.ip, config.listen.port
                )
            })?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .context("Failed to create listening socket")?;
        socket
            .set_reuseaddr(true)
            .context("Failed to set SO_REUSEADDR")?;
        socket
            .bind(addr)
            .with_context(|| format!("Failed to bind to address {addr}"))?;
        let listener = socket
            .listen(ACCEPT_BACKLOG)
            .with_context(|| format!("Failed to listen on {addr}"))?;

        info!(listen_addr = %addr, "Tunnel server listening");

        Ok(Self {
            listener,
            listen: config.listen,
            tunnel: Arc::new(config.tunnel),
            registry: Registry::default(),
            running: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` flips to true, then closes every
    /// tracked connection. Transient accept errors are logged and the loop
    /// continues.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.dispatch(stream, addr),
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Stops accepting new connections and force-closes the tracked ones.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(active = self.registry.len(), "Shutting down, closing tracked connections");
        }
        self.registry.close_all();
    }

    fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        match is_client_ip_allowed(addr.ip(), self.listen.allowed_client_ips.as_deref()) {
            Ok(true) => {}
            Ok(false) => {
                warn!(client_addr = %addr, "Rejected connection from disallowed address");
                return;
            }
            Err(e) => {
                error!(client_addr = %addr, error = %e, "Bad allowed_client_ips entry");
                return;
            }
        }
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        let id = self.registry.next_id();
        let config = Arc::clone(&self.tunnel);
        let registry = self.registry.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = proxy::handle_connection(stream, addr, config).await {
                error!(client_addr = %addr, error = %e, "Connection failed");
            }
            registry.unregister(id);
        });
        self.registry.register(id, handle);
    }
}
