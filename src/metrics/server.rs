//! Metrics HTTP Server
//!
//! Provides HTTP endpoint for Prometheus metrics scraping

use crate::metrics::RelayMetrics;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// HTTP server for serving Prometheus metrics
pub struct MetricsServer {
    metrics: Arc<RelayMetrics>,
    listener: TcpListener,
}

impl MetricsServer {
    /// Bind the metrics listener
    pub async fn bind(metrics: Arc<RelayMetrics>, bind_addr: SocketAddr) -> crate::Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind metrics server on {}", bind_addr))?;

        Ok(Self { metrics, listener })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve scrape requests until the task is dropped
    pub async fn serve(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(bind_addr = %addr, "Metrics server started");
        }

        loop {
            match self.listener.accept().await {
                Ok((mut stream, addr)) => {
                    debug!(client_addr = %addr, "Metrics request received");

                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_request(&mut stream, metrics).await {
                            error!(error = %e, client_addr = %addr, "Failed to handle metrics request");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept metrics connection");
                }
            }
        }
    }
}

/// Handle a single HTTP request for metrics
async fn handle_request(stream: &mut TcpStream, metrics: Arc<RelayMetrics>) -> anyhow::Result<()> {
    let mut buffer = [0; 1024];
    let bytes_read = stream.read(&mut buffer).await?;

    if bytes_read == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..bytes_read]);

    let response = if request.starts_with("GET /metrics") {
        let body = metrics.export_prometheus();
        format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain; version=0.0.4; charset=utf-8\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            body.len(),
            body
        )
    } else if request.starts_with("GET /health") {
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: 2\r\n\
         Connection: close\r\n\
         \r\n\
         OK"
            .to_string()
    } else {
        "HTTP/1.1 404 Not Found\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: 9\r\n\
         Connection: close\r\n\
         \r\n\
         Not Found"
            .to_string()
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fetch(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_metrics_endpoint() -> anyhow::Result<()> {
        let metrics = Arc::new(RelayMetrics::new()?);
        metrics.channel("video").frames_forwarded.inc_by(7);

        let server = MetricsServer::bind(metrics, "127.0.0.1:0".parse()?).await?;
        let addr = server.local_addr()?;
        let handle = tokio::spawn(server.serve());

        let response = fetch(addr, "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("flycam_frames_forwarded_total{channel=\"video\"} 7"));

        let response = fetch(addr, "/health").await;
        assert!(response.ends_with("OK"));

        let response = fetch(addr, "/other").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        handle.abort();
        Ok(())
    }
}
