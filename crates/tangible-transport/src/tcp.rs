//! TCP channel to the recognition service
//!
//! Connecting is a bounded blocking call so it can be made from any
//! thread. Once connected the socket is handed to a tokio runtime: a
//! writer task drains an unbounded queue, so [`Channel::send`] never
//! blocks, and a reader task (spawned on [`Channel::bind`]) delivers
//! incoming bytes to the bound handlers.

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tangible_core::{Channel, ChannelHandlers, Connector, Destination, TransportError};

/// Read buffer size per socket
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Default bound on a single connection attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Opens [`TcpChannel`]s on a tokio runtime
#[derive(Debug, Clone)]
pub struct TcpConnector {
    runtime: Handle,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn connect(&self, destination: &Destination) -> Result<std::net::TcpStream, TransportError> {
        let addrs = (destination.host.as_str(), destination.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", destination, e)))?;

        let mut last_error = None;
        for addr in addrs {
            match std::net::TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    last_error = Some(TransportError::ConnectTimeout {
                        destination: destination.to_string(),
                        timeout_ms: self.connect_timeout.as_millis() as u64,
                    });
                }
                Err(e) => {
                    last_error = Some(TransportError::ConnectionFailed(format!(
                        "{}: {}",
                        destination, e
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::ConnectionFailed(format!("{}: no addresses resolved", destination))
        }))
    }
}

impl Connector for TcpConnector {
    fn open(&self, destination: &Destination) -> Result<Arc<dyn Channel>, TransportError> {
        let stream = self.connect(destination)?;
        stream
            .set_nodelay(true)
            .and_then(|_| stream.set_nonblocking(true))
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let stream = {
            let _guard = self.runtime.enter();
            tokio::net::TcpStream::from_std(stream)
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
        };

        info!(%destination, "TCP connection established");
        Ok(Arc::new(TcpChannel::spawn(
            stream,
            destination.clone(),
            self.runtime.clone(),
        )))
    }
}

/// State shared between the channel and its tasks
struct ChannelState {
    handlers: RwLock<Option<Arc<ChannelHandlers>>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl ChannelState {
    fn handlers(&self) -> Option<Arc<ChannelHandlers>> {
        self.handlers.read().clone()
    }

    fn deliver(&self, data: &[u8]) {
        if let Some(handlers) = self.handlers() {
            (handlers.on_receive)(data);
        }
    }

    fn report_error(&self, error: TransportError) {
        if let Some(handlers) = self.handlers() {
            (handlers.on_error)(error);
        }
    }

    fn mark_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        if let Some(handlers) = self.handlers() {
            (handlers.on_closed)();
        }
    }
}

/// A connected TCP socket
pub struct TcpChannel {
    destination: Destination,
    state: Arc<ChannelState>,
    outgoing: mpsc::UnboundedSender<Bytes>,
    reader: Mutex<Option<OwnedReadHalf>>,
    runtime: Handle,
}

impl TcpChannel {
    fn spawn(stream: tokio::net::TcpStream, destination: Destination, runtime: Handle) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (outgoing, queue) = mpsc::unbounded_channel();
        let state = Arc::new(ChannelState {
            handlers: RwLock::new(None),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        runtime.spawn(write_loop(write_half, queue, Arc::clone(&state)));

        Self {
            destination,
            state,
            outgoing,
            reader: Mutex::new(Some(read_half)),
            runtime,
        }
    }
}

async fn read_loop(mut reader: OwnedReadHalf, state: Arc<ChannelState>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => break,
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    debug!("Remote end closed the stream");
                    break;
                }
                Ok(n) => state.deliver(&buf[..n]),
                Err(e) => {
                    warn!(error = %e, "Socket read failed");
                    state.report_error(TransportError::ReceiveFailed(e.to_string()));
                    break;
                }
            },
        }
    }
    state.mark_closed();
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    state: Arc<ChannelState>,
) {
    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(data) => {
                    if let Err(e) = writer.write_all(&data).await {
                        warn!(error = %e, "Socket write failed");
                        state.report_error(TransportError::SendFailed(e.to_string()));
                        state.mark_closed();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = writer.shutdown().await;
}

impl Channel for TcpChannel {
    fn bind(&self, handlers: ChannelHandlers) {
        *self.state.handlers.write() = Some(Arc::new(handlers));

        if let Some(reader) = self.reader.lock().take() {
            self.runtime.spawn(read_loop(reader, Arc::clone(&self.state)));
        }
    }

    fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        self.outgoing
            .send(data)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn close(&self) {
        self.state.mark_closed();
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn destination(&self) -> &Destination {
        &self.destination
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.state.cancel.cancel();
    }
}
