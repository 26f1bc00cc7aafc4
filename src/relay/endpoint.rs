//! Relay endpoints
//!
//! An inbound endpoint accepts any number of producer connections and keeps
//! only the newest decoded frame. An outbound endpoint accepts any number of
//! subscribers and gives each one its own latest-wins slot, so a slow
//! subscriber skips frames instead of queueing them.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use super::slot::ConflatedSlot;
use crate::config::RelaySettings;
use crate::error::{RelayError, RelayResult};
use crate::metrics::ChannelMetrics;
use crate::protocol::{read_frame, write_frame};

/// Where the relay loop receives frames from
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame
    async fn recv(&mut self) -> RelayResult<Bytes>;
}

/// Where the relay loop forwards frames to
#[async_trait]
pub trait FrameSink: Send {
    /// Publish one frame. A failed send drops the frame.
    async fn send(&mut self, frame: Bytes) -> RelayResult<()>;
}

/// State every connection task of one endpoint needs
#[derive(Clone)]
struct EndpointContext {
    channel: String,
    max_frame_size: usize,
    tcp_nodelay: bool,
    metrics: ChannelMetrics,
}

impl EndpointContext {
    fn new(channel: &str, settings: &RelaySettings, metrics: ChannelMetrics) -> Self {
        Self {
            channel: channel.to_string(),
            max_frame_size: settings.max_frame_size,
            tcp_nodelay: settings.tcp_nodelay,
            metrics,
        }
    }

    fn configure_socket(&self, socket: &TcpStream, peer: SocketAddr) {
        if self.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                warn!(channel = %self.channel, peer = %peer, error = %e, "Failed to set TCP_NODELAY");
            }
        }
    }
}

/// Fan-in endpoint: producers connect here
pub struct InboundEndpoint {
    local_addr: SocketAddr,
    slot: Arc<ConflatedSlot<Bytes>>,
    acceptor: JoinHandle<()>,
}

impl InboundEndpoint {
    /// Bind the listener and start accepting producers
    pub async fn bind(
        channel: &str,
        addr: SocketAddr,
        settings: &RelaySettings,
        metrics: ChannelMetrics,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let slot = Arc::new(ConflatedSlot::new());
        let ctx = EndpointContext::new(channel, settings, metrics);
        let acceptor = tokio::spawn(accept_producers(listener, Arc::clone(&slot), ctx));

        Ok(Self {
            local_addr,
            slot,
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for InboundEndpoint {
    fn drop(&mut self) {
        // Dropping the acceptor's JoinSet aborts every producer task
        self.acceptor.abort();
    }
}

#[async_trait]
impl FrameSource for InboundEndpoint {
    async fn recv(&mut self) -> RelayResult<Bytes> {
        self.slot
            .take()
            .await
            .ok_or(RelayError::EndpointClosed("inbound"))
    }
}

async fn accept_producers(listener: TcpListener, slot: Arc<ConflatedSlot<Bytes>>, ctx: EndpointContext) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    debug!(channel = %ctx.channel, peer = %peer, "Producer connected");
                    ctx.configure_socket(&socket, peer);
                    connections.spawn(read_producer(socket, peer, Arc::clone(&slot), ctx.clone()));
                }
                Err(e) => {
                    error!(channel = %ctx.channel, error = %e, "Failed to accept producer connection");
                }
            },
            Some(_) = connections.join_next() => {}
        }
    }
}

async fn read_producer(
    mut socket: TcpStream,
    peer: SocketAddr,
    slot: Arc<ConflatedSlot<Bytes>>,
    ctx: EndpointContext,
) {
    ctx.metrics.producers.inc();

    loop {
        match read_frame(&mut socket, ctx.max_frame_size).await {
            Ok(Some(frame)) => {
                if slot.put(frame).is_some() {
                    ctx.metrics.frames_conflated.inc();
                }
            }
            Ok(None) => {
                debug!(channel = %ctx.channel, peer = %peer, "Producer disconnected");
                break;
            }
            Err(e) => {
                warn!(channel = %ctx.channel, peer = %peer, error = %e, "Closing producer connection");
                break;
            }
        }
    }

    ctx.metrics.producers.dec();
}

/// Fan-out endpoint: subscribers connect here
pub struct OutboundEndpoint {
    local_addr: SocketAddr,
    latest: watch::Sender<Option<Bytes>>,
    max_frame_size: usize,
    acceptor: JoinHandle<()>,
}

impl OutboundEndpoint {
    /// Bind the listener and start accepting subscribers
    pub async fn bind(
        channel: &str,
        addr: SocketAddr,
        settings: &RelaySettings,
        metrics: ChannelMetrics,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (latest, template) = watch::channel(None);
        let ctx = EndpointContext::new(channel, settings, metrics);
        let acceptor = tokio::spawn(accept_subscribers(listener, template, ctx));

        Ok(Self {
            local_addr,
            latest,
            max_frame_size: settings.max_frame_size,
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for OutboundEndpoint {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

#[async_trait]
impl FrameSink for OutboundEndpoint {
    async fn send(&mut self, frame: Bytes) -> RelayResult<()> {
        if frame.len() > self.max_frame_size {
            return Err(RelayError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }

        // Never blocks: each subscriber task picks up the newest value
        self.latest.send_replace(Some(frame));
        Ok(())
    }
}

async fn accept_subscribers(
    listener: TcpListener,
    template: watch::Receiver<Option<Bytes>>,
    ctx: EndpointContext,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    debug!(channel = %ctx.channel, peer = %peer, "Subscriber connected");
                    ctx.configure_socket(&socket, peer);

                    // Subscribers only see frames published after they joined
                    let mut latest = template.clone();
                    latest.borrow_and_update();

                    connections.spawn(serve_subscriber(socket, peer, latest, ctx.clone()));
                }
                Err(e) => {
                    error!(channel = %ctx.channel, error = %e, "Failed to accept subscriber connection");
                }
            },
            Some(_) = connections.join_next() => {}
        }
    }
}

async fn serve_subscriber(
    socket: TcpStream,
    peer: SocketAddr,
    mut latest: watch::Receiver<Option<Bytes>>,
    ctx: EndpointContext,
) {
    ctx.metrics.subscribers.inc();

    let (mut reader, mut writer) = socket.into_split();
    let mut discard = [0u8; 256];

    loop {
        tokio::select! {
            changed = latest.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = latest.borrow_and_update().clone();
                if let Some(frame) = frame {
                    if let Err(e) = write_frame(&mut writer, &frame).await {
                        debug!(channel = %ctx.channel, peer = %peer, error = %e, "Subscriber write failed");
                        break;
                    }
                }
            }
            // Subscribers never send; reading only detects the disconnect
            read = reader.read(&mut discard) => match read {
                Ok(0) | Err(_) => {
                    debug!(channel = %ctx.channel, peer = %peer, "Subscriber disconnected");
                    break;
                }
                Ok(_) => {}
            },
        }
    }

    ctx.metrics.subscribers.dec();
}
