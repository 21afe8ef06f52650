//! Sending side of the transport

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::SinkExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::codec::{FramedWrite, LengthDelimitedCodec};

use crate::event::{EventKind, EventSink, RunEnd, RunStart, SinkError, TraceRecord};
use crate::tracer::suspend_hooks;

use super::{socket_address, wire, TransportError};

/// Minimum delay between connection attempts while no listener is reachable
const RECONNECT_INTERVAL: Duration = Duration::from_millis(250);

/// Retry interval for a full queue on a thread that may not block on it
const FULL_QUEUE_POLL: Duration = Duration::from_millis(1);

/// Publishes messages to a collector endpoint.
///
/// `send` is synchronous and safe to call from any traced thread. Messages
/// go through a bounded queue to a background thread that owns the socket;
/// when `high_water_mark` messages are outstanding, `send` waits for room,
/// also when called from a thread inside an async runtime.
pub struct Publisher {
    endpoint: String,
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    pub fn connect(endpoint: &str, high_water_mark: usize) -> Result<Self, TransportError> {
        let address = socket_address(endpoint)?.to_string();
        let (sender, receiver) = mpsc::channel::<Bytes>(high_water_mark.max(1));

        let worker = std::thread::Builder::new()
            .name("stepwise-publisher".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to start publisher runtime");
                        return;
                    }
                };
                runtime.block_on(deliver(address, receiver));
            })?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Queue one `[kind, payload]` message.
    pub fn send<T: Serialize + ?Sized>(&self, kind: EventKind, payload: &T) -> Result<(), TransportError> {
        let _guard = suspend_hooks();
        let frame = wire::encode(kind, payload)?;
        let sender = self.sender.lock().clone().ok_or(TransportError::Closed)?;
        match sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(mut frame)) if tokio::runtime::Handle::try_current().is_ok() => {
                // `blocking_send` panics on runtime threads; the queue drains
                // on the publisher's own thread, so polling cannot deadlock.
                tracing::trace!("Publisher queue full, polling");
                loop {
                    std::thread::sleep(FULL_QUEUE_POLL);
                    match sender.try_send(frame) {
                        Ok(()) => return Ok(()),
                        Err(TrySendError::Full(back)) => frame = back,
                        Err(TrySendError::Closed(_)) => return Err(TransportError::Closed),
                    }
                }
            }
            Err(TrySendError::Full(frame)) => {
                tracing::trace!("Publisher queue full, waiting");
                sender
                    .blocking_send(frame)
                    .map_err(|_| TransportError::Closed)
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    /// Deliver what is queued, then shut the background thread down.
    pub fn close(&self) {
        drop(self.sender.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("Publisher thread panicked");
            }
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}

async fn deliver(address: String, mut receiver: mpsc::Receiver<Bytes>) {
    let mut connection: Option<FramedWrite<TcpStream, LengthDelimitedCodec>> = None;
    let mut last_attempt: Option<Instant> = None;
    let mut dropped: u64 = 0;

    while let Some(frame) = receiver.recv().await {
        if connection.is_none() && last_attempt.map_or(true, |at| at.elapsed() >= RECONNECT_INTERVAL) {
            last_attempt = Some(Instant::now());
            match TcpStream::connect(&address).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(endpoint = %address, "Connected to listener");
                    connection = Some(FramedWrite::new(stream, LengthDelimitedCodec::new()));
                }
                Err(e) => {
                    tracing::debug!(endpoint = %address, error = %e, "No listener reachable");
                }
            }
        }

        let Some(framed) = connection.as_mut() else {
            dropped += 1;
            continue;
        };
        if let Err(e) = framed.send(frame).await {
            tracing::debug!(endpoint = %address, error = %e, "Lost connection to listener");
            connection = None;
            dropped += 1;
        }
    }

    if let Some(mut framed) = connection {
        if let Err(e) = SinkExt::<Bytes>::close(&mut framed).await {
            tracing::debug!(endpoint = %address, error = %e, "Failed to close connection");
        }
    }
    if dropped > 0 {
        tracing::debug!(endpoint = %address, dropped, "Messages dropped without a listener");
    }
}

impl EventSink for Publisher {
    fn start_run(&self, run: &RunStart) -> Result<(), SinkError> {
        Ok(self.send(EventKind::StartRun, run)?)
    }

    fn end_run(&self, run: &RunEnd) -> Result<(), SinkError> {
        Ok(self.send(EventKind::EndRun, run)?)
    }

    fn trace(&self, record: &TraceRecord) -> Result<(), SinkError> {
        Ok(self.send(record.event, &record.encode())?)
    }
}
