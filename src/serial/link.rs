//! One open serial connection shared by the reader task and the command channel.
//!
//! Access to the port is serialised by an async mutex. On top of that, a
//! command exchange announces itself through [`SerialLink::begin_exchange`]:
//! while any exchange is in flight the reader task stays off the port, and the
//! exchange epoch tells it to discard any partial line it was holding once the
//! exchange is over.

use super::DynSerial;
use crate::error::{AppResult, ScopeError};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{watch, Mutex, MutexGuard};

/// Exclusive access to the open port.
///
/// Reads and writes go straight to the port. If the port was released in the
/// meantime they fail with [`io::ErrorKind::NotConnected`].
pub struct PortGuard<'a> {
    guard: MutexGuard<'a, Option<DynSerial>>,
}

impl PortGuard<'_> {
    fn port(&mut self) -> io::Result<&mut DynSerial> {
        match &mut *self.guard {
            Some(port) => Ok(port),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "serial port released")),
        }
    }
}

impl std::fmt::Debug for PortGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortGuard")
            .field("open", &self.guard.is_some())
            .finish()
    }
}

impl AsyncRead for PortGuard<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().port() {
            Ok(port) => Pin::new(port).poll_read(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl AsyncWrite for PortGuard<'_> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut().port() {
            Ok(port) => Pin::new(port).poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().port() {
            Ok(port) => Pin::new(port).poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().port() {
            Ok(port) => Pin::new(port).poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

/// Command exchange bookkeeping published to the reader task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeState {
    /// Exchanges currently in flight
    pub in_flight: usize,
    /// Incremented every time an exchange starts
    pub epoch: u64,
}

/// Shared handle to one open port.
pub struct SerialLink {
    name: String,
    port: Mutex<Option<DynSerial>>,
    exchange: watch::Sender<ExchangeState>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("name", &self.name)
            .field("exchange", &*self.exchange.borrow())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SerialLink {
    /// Wrap an open port.
    pub fn new(name: impl Into<String>, port: DynSerial) -> Arc<Self> {
        let (exchange, _) = watch::channel(ExchangeState::default());
        Arc::new(Self {
            name: name.into(),
            port: Mutex::new(Some(port)),
            exchange,
            closed: AtomicBool::new(false),
        })
    }

    /// Port name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for exclusive access to the port.
    pub async fn lock(&self) -> AppResult<PortGuard<'_>> {
        if self.is_closed() {
            return Err(ScopeError::SerialPortNotConnected);
        }
        let guard = self.port.lock().await;
        if guard.is_none() {
            return Err(ScopeError::SerialPortNotConnected);
        }
        Ok(PortGuard { guard })
    }

    /// Mark a command exchange as in flight until the guard is dropped.
    pub fn begin_exchange(self: &Arc<Self>) -> ExchangeGuard {
        self.exchange.send_modify(|state| {
            state.in_flight += 1;
            state.epoch = state.epoch.wrapping_add(1);
        });
        ExchangeGuard {
            link: Arc::clone(self),
        }
    }

    /// Current exchange bookkeeping.
    pub fn exchange_state(&self) -> ExchangeState {
        *self.exchange.borrow()
    }

    /// Watch exchange bookkeeping.
    pub fn subscribe(&self) -> watch::Receiver<ExchangeState> {
        self.exchange.subscribe()
    }

    /// Flag the link closed without touching the port.
    ///
    /// Any task polling the port notices within one read timeout and bails out.
    pub fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(port = %self.name, "Serial link marked closed");
            // Wake anything parked on the exchange state.
            self.exchange.send_modify(|_| {});
        }
    }

    /// Mark closed, then release the OS handle once the current holder lets go.
    pub async fn close(&self) {
        self.mark_closed();
        if self.port.lock().await.take().is_some() {
            tracing::info!(port = %self.name, "Closed serial port");
        }
    }

    /// Whether the link has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// RAII marker for an in-flight command exchange.
#[derive(Debug)]
pub struct ExchangeGuard {
    link: Arc<SerialLink>,
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        self.link.exchange.send_modify(|state| {
            state.in_flight = state.in_flight.saturating_sub(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn exchange_guard_tracks_in_flight() {
        let (host, _device) = tokio::io::duplex(64);
        let link = SerialLink::new("test", Box::new(host));
        assert_eq!(link.exchange_state(), ExchangeState::default());

        let first = link.begin_exchange();
        let second = link.begin_exchange();
        assert_eq!(
            link.exchange_state(),
            ExchangeState {
                in_flight: 2,
                epoch: 2
            }
        );
        drop(first);
        drop(second);
        assert_eq!(link.exchange_state().in_flight, 0);
        assert_eq!(link.exchange_state().epoch, 2);
    }

    #[tokio::test]
    async fn lock_gives_port_access() {
        let (host, mut device) = tokio::io::duplex(64);
        let link = SerialLink::new("test", Box::new(host));
        link.lock().await.unwrap().write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn guard_is_held_across_awaits_in_a_spawned_task() {
        let (host, mut device) = tokio::io::duplex(64);
        let link = SerialLink::new("test", Box::new(host));

        let task_link = Arc::clone(&link);
        let task = tokio::spawn(async move {
            let mut port = task_link.lock().await?;
            port.write_all(b"he").await?;
            tokio::task::yield_now().await;
            port.write_all(b"ld").await?;
            port.flush().await?;
            Ok::<_, ScopeError>(())
        });
        task.await.unwrap().unwrap();

        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"held");
    }

    #[tokio::test]
    async fn close_releases_the_port() {
        let (host, mut device) = tokio::io::duplex(64);
        let link = SerialLink::new("test", Box::new(host));
        link.close().await;
        assert!(link.is_closed());
        assert!(matches!(
            link.lock().await,
            Err(ScopeError::SerialPortNotConnected)
        ));

        // Host end dropped: the device side sees EOF.
        let mut buf = [0u8; 1];
        assert_eq!(device.read(&mut buf).await.unwrap(), 0);
    }
}
