//! Background task turning the serial byte stream into queued samples.
//!
//! The task is the [`SampleQueue`]'s only producer. It never blocks on the
//! queue, stays off the port while a command exchange is in flight, and ends on
//! a stop request, end of stream or an I/O error. A failure is published once
//! through [`ReaderState::Failed`]; nothing is retried.

use super::link::{ExchangeState, SerialLink};
use crate::acquisition::{LineDecoder, SampleQueue};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Bytes requested from the port per read.
pub const READ_CHUNK: usize = 1024;

/// Lifecycle of the reader task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderState {
    /// Not started or stopped on request
    Idle,
    /// Reading the sample stream
    Reading,
    /// Parked while a command exchange owns the port
    Suspended,
    /// Ended by end of stream or an I/O error
    Failed(String),
}

/// Counters kept while the task runs.
#[derive(Debug, Default)]
struct Counters {
    lines: AtomicU64,
    samples: AtomicU64,
    rejected: AtomicU64,
}

/// Totals reported when the task ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderSummary {
    /// Lines that produced samples
    pub lines: u64,
    /// Samples pushed to the queue
    pub samples: u64,
    /// Lines that produced nothing
    pub rejected_lines: u64,
    /// Failure reason, if the task did not stop on request
    pub failure: Option<String>,
}

/// Reader task configuration and its shared endpoints.
#[derive(Debug)]
pub struct SerialReaderTask {
    link: Arc<SerialLink>,
    queue: Arc<SampleQueue>,
    poll_interval: Duration,
}

impl SerialReaderTask {
    /// Create a task reading `link` into `queue`.
    ///
    /// `poll_interval` bounds how long a single read may hold the port.
    pub fn new(link: Arc<SerialLink>, queue: Arc<SampleQueue>, poll_interval: Duration) -> Self {
        Self {
            link,
            queue,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Start the task on the current runtime.
    pub fn spawn(self) -> ReaderHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ReaderState::Reading);
        let counters = Arc::new(Counters::default());

        let join = tokio::spawn(self.run(stop_rx, state_tx, Arc::clone(&counters)));

        ReaderHandle {
            stop_tx,
            state_rx,
            counters,
            join,
        }
    }

    async fn run(
        self,
        mut stop_rx: watch::Receiver<bool>,
        state_tx: watch::Sender<ReaderState>,
        counters: Arc<Counters>,
    ) -> ReaderSummary {
        let port = self.link.name().to_string();
        info!(%port, poll_ms = self.poll_interval.as_millis() as u64, "Serial reader started");

        let mut decoder = LineDecoder::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut exchange_rx = self.link.subscribe();
        let mut seen_epoch = self.link.exchange_state().epoch;

        let failure = loop {
            // A dropped handle counts as a stop request.
            let stop_requested = *stop_rx.borrow();
            if stop_requested || stop_rx.has_changed().is_err() {
                break None;
            }
            if self.link.is_closed() {
                break Some("serial link closed".to_string());
            }

            if self.link.exchange_state().in_flight > 0 {
                state_tx.send_replace(ReaderState::Suspended);
                trace!(%port, "Reader suspended for command exchange");
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() {
                            break None;
                        }
                    }
                    _ = wait_until_idle(&mut exchange_rx) => {}
                }
                state_tx.send_replace(ReaderState::Reading);
                continue;
            }

            let read = {
                let mut guard = match self.link.lock().await {
                    Ok(guard) => guard,
                    Err(e) => break Some(e.to_string()),
                };
                let epoch = self.link.exchange_state().epoch;
                if epoch != seen_epoch {
                    if decoder.pending_len() > 0 {
                        debug!(%port, bytes = decoder.pending_len(), "Discarding partial line after command exchange");
                    }
                    decoder.reset();
                    seen_epoch = epoch;
                }
                tokio::time::timeout(self.poll_interval, guard.read(&mut buf)).await
            };

            match read {
                // Nothing arrived within the poll interval; let a waiting command in.
                Err(_) => tokio::task::yield_now().await,
                Ok(Ok(0)) => break Some("end of stream".to_string()),
                Ok(Ok(n)) => {
                    decoder.push_bytes(&buf[..n]);
                    self.drain_lines(&mut decoder, &counters);
                }
                Ok(Err(e)) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    tokio::task::yield_now().await;
                }
                Ok(Err(e)) => break Some(e.to_string()),
            }
        };

        let summary = ReaderSummary {
            lines: counters.lines.load(Ordering::Relaxed),
            samples: counters.samples.load(Ordering::Relaxed),
            rejected_lines: counters.rejected.load(Ordering::Relaxed),
            failure: failure.clone(),
        };
        match failure {
            Some(reason) => {
                warn!(%port, %reason, samples = summary.samples, "Serial reader failed");
                state_tx.send_replace(ReaderState::Failed(reason));
            }
            None => {
                info!(%port, samples = summary.samples, "Serial reader stopped");
                state_tx.send_replace(ReaderState::Idle);
            }
        }
        summary
    }

    fn drain_lines(&self, decoder: &mut LineDecoder, counters: &Counters) {
        while let Some(line) = decoder.next_line() {
            match line {
                Ok(samples) => {
                    self.queue.push_all(&samples);
                    counters.lines.fetch_add(1, Ordering::Relaxed);
                    counters
                        .samples
                        .fetch_add(samples.len() as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.rejected.fetch_add(1, Ordering::Relaxed);
                    trace!(error = %e, "Skipping undecodable line");
                }
            }
        }
    }
}

/// Control handle for a running reader task.
#[derive(Debug)]
pub struct ReaderHandle {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<ReaderState>,
    counters: Arc<Counters>,
    join: JoinHandle<ReaderSummary>,
}

impl ReaderHandle {
    /// Latest published state.
    pub fn state(&self) -> ReaderState {
        self.state_rx.borrow().clone()
    }

    /// Whether the task is still alive.
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Samples pushed so far.
    pub fn samples_read(&self) -> u64 {
        self.counters.samples.load(Ordering::Relaxed)
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ReaderState> {
        self.state_rx.clone()
    }

    /// Ask the task to stop and wait up to `grace` for it.
    ///
    /// A task that does not finish in time is aborted.
    pub async fn stop(self, grace: Duration) -> ReaderSummary {
        let Self {
            stop_tx,
            counters,
            mut join,
            ..
        } = self;
        // The task may already be gone; that is fine.
        let _ = stop_tx.send(true);

        match tokio::time::timeout(grace, &mut join).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                warn!(error = %e, "Serial reader task ended abnormally");
                summary_from(&counters, Some(e.to_string()))
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Serial reader did not stop in time; aborting");
                join.abort();
                summary_from(&counters, None)
            }
        }
    }
}

fn summary_from(counters: &Counters, failure: Option<String>) -> ReaderSummary {
    ReaderSummary {
        lines: counters.lines.load(Ordering::Relaxed),
        samples: counters.samples.load(Ordering::Relaxed),
        rejected_lines: counters.rejected.load(Ordering::Relaxed),
        failure,
    }
}

/// Returns once no command exchange is in flight, or the link's sender is gone.
async fn wait_until_idle(rx: &mut watch::Receiver<ExchangeState>) {
    loop {
        if rx.borrow_and_update().in_flight == 0 {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn start(capacity: usize) -> (tokio::io::DuplexStream, Arc<SerialLink>, Arc<SampleQueue>, ReaderHandle) {
        let (host, device) = tokio::io::duplex(4096);
        let link = SerialLink::new("duplex", Box::new(host));
        let queue = Arc::new(SampleQueue::new(capacity));
        let handle = SerialReaderTask::new(
            Arc::clone(&link),
            Arc::clone(&queue),
            Duration::from_millis(5),
        )
        .spawn();
        (device, link, queue, handle)
    }

    async fn wait_for_len(queue: &SampleQueue, len: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while queue.len() < len {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("samples did not arrive");
    }

    #[tokio::test]
    async fn reads_lines_into_queue() {
        let (mut device, _link, queue, handle) = start(100);
        device.write_all(b"1\r\n2 3\r\nhello\r\n-4").await.unwrap();
        wait_for_len(&queue, 3).await;
        device.write_all(b"\r\n").await.unwrap();
        wait_for_len(&queue, 4).await;

        assert_eq!(queue.drain_all(), vec![1, 2, 3, -4]);
        let summary = handle.stop(Duration::from_millis(500)).await;
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.samples, 4);
        assert_eq!(summary.rejected_lines, 1);
        assert_eq!(summary.failure, None);
    }

    #[tokio::test]
    async fn end_of_stream_fails_the_reader() {
        let (device, _link, _queue, handle) = start(10);
        let mut state = handle.subscribe();
        drop(device);

        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| matches!(s, ReaderState::Failed(_))),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(handle.state(), ReaderState::Failed("end of stream".into()));

        let summary = handle.stop(Duration::from_millis(500)).await;
        assert_eq!(summary.failure.as_deref(), Some("end of stream"));
    }

    #[tokio::test]
    async fn stop_returns_to_idle() {
        let (_device, _link, _queue, handle) = start(10);
        let mut state = handle.subscribe();
        let summary = handle.stop(Duration::from_millis(500)).await;
        assert_eq!(summary.failure, None);
        assert_eq!(*state.borrow_and_update(), ReaderState::Idle);
    }

    #[tokio::test]
    async fn exchange_suspends_and_discards_partial_line() {
        let (mut device, link, queue, handle) = start(100);
        device.write_all(b"12").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        {
            let _exchange = link.begin_exchange();
            let mut state = handle.subscribe();
            tokio::time::timeout(
                Duration::from_secs(1),
                state.wait_for(|s| *s == ReaderState::Suspended),
            )
            .await
            .unwrap()
            .unwrap();
        }

        device.write_all(b"34\r\n56\r\n").await.unwrap();
        wait_for_len(&queue, 2).await;
        assert_eq!(queue.drain_all(), vec![34, 56]);
        handle.stop(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn late_command_reply_is_not_decoded_as_samples() {
        use crate::alc::{CommandChannel, ProtocolTimeouts};

        let (device, link, queue, handle) = start(100);
        let channel = CommandChannel::new(
            Arc::clone(&link),
            ProtocolTimeouts {
                get_timeout: Duration::from_millis(100),
                poll_interval: Duration::from_millis(10),
                late_reply_window: Duration::from_millis(250),
                ..Default::default()
            },
        );

        let device_task = tokio::spawn(async move {
            let mut device = device;
            let mut buf = [0u8; 64];
            let _ = device.read(&mut buf).await.unwrap();
            tokio::time::sleep(Duration::from_millis(170)).await;
            device.write_all(b"111\r\n222\r\nOK\r\n").await.unwrap();
            device
        });

        assert!(matches!(
            channel.get().await,
            Err(crate::error::ScopeError::Timeout { .. })
        ));
        let mut device = device_task.await.unwrap();

        device.write_all(b"34\r\n").await.unwrap();
        wait_for_len(&queue, 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(queue.drain_all(), vec![34]);
        handle.stop(Duration::from_millis(500)).await;
    }
}
