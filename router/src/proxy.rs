//! Sticky TCP relay between public clients and worker processes

use crate::affinity::{AffinityTable, Backend};
use log::{debug, error, info};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no backends configured")]
    NoBackends,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Why a worker could not be reached.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Failed(#[from] io::Error),
}

/// Startup configuration; fixed for the router's lifetime.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub listen: String,
    pub backends: Vec<Backend>,
    pub connect_timeout: Duration,
    /// Unpin a client when its backend refuses the connection.
    pub evict_on_refusal: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            backends: vec![
                Backend::new("127.0.0.1", 8001),
                Backend::new("127.0.0.1", 8002),
            ],
            connect_timeout: Duration::from_secs(10),
            evict_on_refusal: true,
        }
    }
}

pub struct Router {
    listener: TcpListener,
    table: Arc<Mutex<AffinityTable>>,
    connect_timeout: Duration,
    evict_on_refusal: bool,
}

impl Router {
    pub async fn bind(config: RouterConfig) -> Result<Self, RouterError> {
        let table = AffinityTable::new(config.backends).ok_or(RouterError::NoBackends)?;
        let listener = TcpListener::bind(&config.listen)
            .await
            .map_err(|source| RouterError::Bind {
                addr: config.listen.clone(),
                source,
            })?;

        info!("Sticky router listening on {}", listener.local_addr()?);
        info!("Forwarding to workers: {:?}", table.backends());

        Ok(Self {
            listener,
            table: Arc::new(Mutex::new(table)),
            connect_timeout: config.connect_timeout,
            evict_on_refusal: config.evict_on_refusal,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn table(&self) -> Arc<Mutex<AffinityTable>> {
        Arc::clone(&self.table)
    }

    /// Accepts clients forever, one task per connection
    pub async fn run(&self) -> Result<(), RouterError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let table = Arc::clone(&self.table);
                    let connect_timeout = self.connect_timeout;
                    let evict = self.evict_on_refusal;
                    tokio::spawn(async move {
                        handle_client(table, stream, addr, connect_timeout, evict).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting client connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

async fn handle_client(
    table: Arc<Mutex<AffinityTable>>,
    client: TcpStream,
    addr: SocketAddr,
    connect_timeout: Duration,
    evict_on_refusal: bool,
) {
    let backend = table.lock().await.select_backend(addr.ip());

    let upstream = match dial(&backend, connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Worker {} is not available: {}", backend, e);
            let mut table = table.lock().await;
            record_dial_failure(&mut table, addr.ip(), &backend, &e, evict_on_refusal);
            return;
        }
    };

    let (sent, received) = relay(client, upstream).await;
    debug!(
        "Client {} via {} closed ({} bytes up, {} bytes down)",
        addr, backend, sent, received
    );
}

pub async fn dial(backend: &Backend, connect_timeout: Duration) -> Result<TcpStream, DialError> {
    let connect = TcpStream::connect((backend.host.as_str(), backend.port));
    match timeout(connect_timeout, connect).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DialError::TimedOut(connect_timeout)),
    }
}

/// Applies the affinity policy after a failed dial. Returns true if the
/// client was unpinned.
///
/// Timeouts keep the pin; any other failure unpins the client when eviction
/// is enabled and the pin still points at `backend`.
pub fn record_dial_failure(
    table: &mut AffinityTable,
    client: IpAddr,
    backend: &Backend,
    error: &DialError,
    evict_on_refusal: bool,
) -> bool {
    match error {
        DialError::TimedOut(_) => false,
        DialError::Failed(_) if evict_on_refusal => table.evict(client, backend),
        DialError::Failed(_) => false,
    }
}

/// Streams bytes both ways until either side finishes, then closes both.
/// Returns bytes sent client-to-backend and backend-to-client.
pub async fn relay(client: TcpStream, upstream: TcpStream) -> (u64, u64) {
    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    let (done_tx, done_rx) = watch::channel(false);
    let done_tx = Arc::new(done_tx);

    let up = tokio::spawn(forward(
        client_read,
        upstream_write,
        Arc::clone(&done_tx),
        done_rx.clone(),
    ));
    let down = tokio::spawn(forward(upstream_read, client_write, done_tx, done_rx));

    (up.await.unwrap_or(0), down.await.unwrap_or(0))
}

/// Copies `reader` into `writer` until end-of-stream, an I/O error, or the
/// done signal. On exit it raises the signal and shuts its writer down.
pub async fn forward<R, W>(
    mut reader: R,
    mut writer: W,
    done: Arc<watch::Sender<bool>>,
    mut cancelled: watch::Receiver<bool>,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = [0u8; 4096];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            result = reader.read(&mut buffer) => match result {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("Read ended: {}", e);
                    break;
                }
            },
            _ = cancelled.changed() => break,
        };

        tokio::select! {
            result = writer.write_all(&buffer[..n]) => {
                if let Err(e) = result {
                    debug!("Write ended: {}", e);
                    break;
                }
            }
            _ = cancelled.changed() => break,
        }
        total += n as u64;
    }

    let _ = done.send(true);
    let _ = writer.shutdown().await;
    total
}
