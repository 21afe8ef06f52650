//! Receiving side of the transport

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};

use super::wire::{self, WireMessage};
use super::{socket_address, TransportError};

/// Accepts any number of publishers and yields their messages.
///
/// Messages from one publisher arrive in the order they were sent; there is
/// no ordering between publishers.
pub struct Listener {
    local_addr: SocketAddr,
    messages: mpsc::Receiver<WireMessage>,
    acceptor: JoinHandle<()>,
}

impl Listener {
    /// Bind `endpoint` and start accepting publishers.
    ///
    /// At most `capacity` decoded messages are buffered before readers stop
    /// pulling from their sockets.
    pub async fn bind(endpoint: &str, capacity: usize) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(socket_address(endpoint)?).await?;
        let local_addr = listener.local_addr()?;
        let (sender, messages) = mpsc::channel(capacity.max(1));
        let acceptor = tokio::spawn(accept_loop(listener, sender));
        tracing::debug!(address = %local_addr, "Listening for publishers");

        Ok(Self {
            local_addr,
            messages,
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Endpoint publishers can connect to
    pub fn endpoint(&self) -> String {
        format!("tcp://{}", self.local_addr)
    }

    /// Wait up to `timeout` for traffic and return whatever has arrived.
    pub async fn poll_once(&mut self, timeout: Duration) -> Vec<WireMessage> {
        let mut batch = Vec::new();
        match tokio::time::timeout(timeout, self.messages.recv()).await {
            Ok(Some(message)) => batch.push(message),
            Ok(None) | Err(_) => return batch,
        }
        while let Ok(message) = self.messages.try_recv() {
            batch.push(message);
        }
        batch
    }

    /// Feed every message to `callback` until `shutdown` is set.
    ///
    /// The flag is checked between polls, so shutdown takes effect within
    /// one `timeout`.
    pub async fn poll_until<F>(&mut self, mut callback: F, timeout: Duration, shutdown: &AtomicBool)
    where
        F: FnMut(WireMessage),
    {
        while !shutdown.load(Ordering::SeqCst) {
            for message in self.poll_once(timeout).await {
                callback(message);
            }
        }
    }

    /// Feed every message to `callback` until Ctrl-C.
    pub async fn poll_forever<F>(&mut self, callback: F, timeout: Duration)
    where
        F: FnMut(WireMessage),
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping listener");
                flag.store(true, Ordering::SeqCst);
            }
        });

        tracing::debug!("Waiting for incoming data");
        self.poll_until(callback, timeout, &shutdown).await;
        watcher.abort();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(listener: TcpListener, sender: mpsc::Sender<WireMessage>) {
    let mut readers = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(peer = %peer, "Publisher connected");
                    readers.spawn(read_frames(stream, peer, sender.clone()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept publisher");
                }
            },
            Some(_) = readers.join_next(), if !readers.is_empty() => {}
        }
    }
}

async fn read_frames(stream: TcpStream, peer: SocketAddr, sender: mpsc::Sender<WireMessage>) {
    let mut frames = FramedRead::new(stream, LengthDelimitedCodec::new());
    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "Publisher stream failed");
                break;
            }
        };
        match wire::decode(&frame) {
            Ok(message) => {
                if sender.send(message).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "Dropping malformed message");
            }
        }
    }
    tracing::debug!(peer = %peer, "Publisher disconnected");
}
