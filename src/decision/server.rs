//! TCP server for the decision service.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use super::service::DecisionService;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::RuleSet;

/// TCP server answering rate limit decisions.
pub struct DecisionServer {
    /// Bound listener
    listener: TcpListener,
    /// Shared request handler
    service: Arc<DecisionService>,
}

impl DecisionServer {
    /// Bind the server to `addr`.
    pub async fn bind(addr: SocketAddr, rules: Arc<RuleSet>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            service: Arc::new(DecisionService::new(rules)),
        })
    }

    /// Get the address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `signal` resolves.
    ///
    /// Connections already in progress are left to finish on their own.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(addr = %self.local_addr()?, "Starting decision server");

        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Decision server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, service).await {
                            error!(peer = %peer, error = %e, "Connection failed");
                        }
                    });
                }
            }
        }
    }
}

/// Upper bound on a single request line, newline excluded.
pub const MAX_LINE_LENGTH: usize = 1024;

/// One request line read from a connection.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(Vec<u8>),
    /// The line exceeded [`MAX_LINE_LENGTH`]; its bytes were discarded.
    TooLong,
    Eof,
}

/// Read up to the next `\n` while buffering at most `max` bytes.
async fn read_frame<R>(reader: &mut R, max: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut overflow = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if overflow {
                Frame::TooLong
            } else if line.is_empty() {
                Frame::Eof
            } else {
                Frame::Line(line)
            });
        }

        let newline = available.iter().position(|&b| b == b'\n');
        let data_end = newline.unwrap_or(available.len());
        if !overflow {
            if line.len() + data_end > max {
                overflow = true;
                line = Vec::new();
            } else {
                line.extend_from_slice(&available[..data_end]);
            }
        }

        let consumed = newline.map_or(data_end, |i| i + 1);
        reader.consume(consumed);

        if newline.is_some() {
            if overflow {
                return Ok(Frame::TooLong);
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(Frame::Line(line));
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<DecisionService>,
) -> Result<()> {
    debug!(peer = %peer, "Accepted connection");

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let mut response = match read_frame(&mut reader, MAX_LINE_LENGTH).await? {
            Frame::Eof => break,
            Frame::TooLong => service.error_response(&TurnstileError::Protocol(format!(
                "request line exceeds {} bytes",
                MAX_LINE_LENGTH
            ))),
            Frame::Line(bytes) => match String::from_utf8(bytes) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => service.handle_line(&line, peer),
                Err(_) => service.error_response(&TurnstileError::Protocol(
                    "request line is not valid UTF-8".to_string(),
                )),
            },
        };
        response.push('\n');
        writer.write_all(response.as_bytes()).await?;
    }

    debug!(peer = %peer, "Connection closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use tokio::sync::oneshot;

    type ServerHandle = tokio::task::JoinHandle<Result<()>>;

    async fn start(quota: u64) -> (SocketAddr, oneshot::Sender<()>, ServerHandle) {
        let rules = RuleSet::from_configs(&[RuleConfig {
            name: "api".to_string(),
            request_quota: quota,
            quota_duration_ms: 60_000,
        }])
        .unwrap();

        let server = DecisionServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(rules))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = rx.await;
        }));
        (addr, tx, handle)
    }

    async fn request(
        lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
        writer: &mut tokio::net::tcp::OwnedWriteHalf,
        line: &str,
    ) -> String {
        writer.write_all(format!("{}\n", line).as_bytes()).await.unwrap();
        lines.next_line().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_server_round_trip() {
        let (addr, shutdown, handle) = start(2).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        assert_eq!(request(&mut lines, &mut writer, "PING").await, "PONG");

        for expected in [true, true, false] {
            let response: serde_json::Value =
                serde_json::from_str(&request(&mut lines, &mut writer, "CHECK api").await).unwrap();
            assert_eq!(response["allowed"], expected);
            assert_eq!(response["key"], "127.0.0.1");
        }

        let response: serde_json::Value =
            serde_json::from_str(&request(&mut lines, &mut writer, "BOGUS").await).unwrap();
        assert!(response["error"].is_string());

        // The connection survives errors
        assert_eq!(request(&mut lines, &mut writer, "PING").await, "PONG");

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_utf8_keeps_connection_open() {
        let (addr, shutdown, handle) = start(2).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"CHECK api \xff\xfe\n").await.unwrap();
        let response: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(response["error"].as_str().unwrap().contains("UTF-8"));

        assert_eq!(request(&mut lines, &mut writer, "PING").await, "PONG");

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected() {
        let (addr, shutdown, handle) = start(2).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let oversized = format!("CHECK api {}", "k".repeat(MAX_LINE_LENGTH * 4));
        let response: serde_json::Value =
            serde_json::from_str(&request(&mut lines, &mut writer, &oversized).await).unwrap();
        assert!(response["error"].as_str().unwrap().contains("exceeds"));

        // The oversized line was discarded whole, the next one is read normally
        assert_eq!(request(&mut lines, &mut writer, "PING").await, "PONG");

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_read_frame() {
        let mut input: &[u8] = b"PING\r\nabcdefgh\nabc\n\ntail";

        assert_eq!(read_frame(&mut input, 5).await.unwrap(), Frame::Line(b"PING".to_vec()));
        assert_eq!(read_frame(&mut input, 5).await.unwrap(), Frame::TooLong);
        assert_eq!(read_frame(&mut input, 5).await.unwrap(), Frame::Line(b"abc".to_vec()));
        assert_eq!(read_frame(&mut input, 5).await.unwrap(), Frame::Line(Vec::new()));
        assert_eq!(read_frame(&mut input, 5).await.unwrap(), Frame::Line(b"tail".to_vec()));
        assert_eq!(read_frame(&mut input, 5).await.unwrap(), Frame::Eof);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clients_share_quota() {
        let (addr, shutdown, handle) = start(10).await;

        let clients: Vec<_> = (0..25)
            .map(|_| {
                tokio::spawn(async move {
                    let stream = TcpStream::connect(addr).await.unwrap();
                    let (reader, mut writer) = stream.into_split();
                    let mut lines = BufReader::new(reader).lines();
                    let response: serde_json::Value = serde_json::from_str(
                        &request(&mut lines, &mut writer, "CHECK api shared").await,
                    )
                    .unwrap();
                    response["allowed"].as_bool().unwrap()
                })
            })
            .collect();

        let allowed = futures::future::join_all(clients)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();
        assert_eq!(allowed, 10);

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
