//! Relay clients
//!
//! [`Producer`] pushes frames into an inbound endpoint. [`Subscriber`] reads
//! from an outbound endpoint in the background and keeps only the newest
//! frame, so a consumer that reads slowly always gets the freshest one.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{RelayError, RelayResult};
use crate::protocol::{read_frame, write_frame};
use crate::relay::ConflatedSlot;

/// Sends frames to a relay inbound endpoint
pub struct Producer {
    stream: TcpStream,
}

impl Producer {
    /// Connect to an inbound endpoint
    pub async fn connect(addr: SocketAddr) -> RelayResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Send one frame
    pub async fn send(&mut self, frame: &[u8]) -> RelayResult<()> {
        write_frame(&mut self.stream, frame).await
    }
}

/// Receives the newest frame from a relay outbound endpoint
pub struct Subscriber {
    slot: Arc<ConflatedSlot<Bytes>>,
    reader: JoinHandle<()>,
}

impl Subscriber {
    /// Connect to an outbound endpoint and start reading in the background
    pub async fn connect(addr: SocketAddr, max_frame_size: usize) -> RelayResult<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let slot = Arc::new(ConflatedSlot::new());
        let reader_slot = Arc::clone(&slot);
        let reader = tokio::spawn(async move {
            loop {
                match read_frame(&mut stream, max_frame_size).await {
                    Ok(Some(frame)) => {
                        reader_slot.put(frame);
                    }
                    Ok(None) => {
                        debug!(relay = %addr, "Relay closed subscriber connection");
                        break;
                    }
                    Err(e) => {
                        debug!(relay = %addr, error = %e, "Subscriber read failed");
                        break;
                    }
                }
            }
            reader_slot.close();
        });

        Ok(Self { slot, reader })
    }

    /// Wait for the newest frame and take it.
    ///
    /// Fails once the connection is gone and no frame is left.
    pub async fn recv(&self) -> RelayResult<Bytes> {
        self.slot
            .take()
            .await
            .ok_or(RelayError::EndpointClosed("subscriber"))
    }

    /// Take the newest frame if one has arrived since the last read
    pub fn try_recv(&self) -> Option<Bytes> {
        self.slot.try_take()
    }

    /// Whether the connection to the relay is gone
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
