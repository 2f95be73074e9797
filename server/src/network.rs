//! TCP accept loop and the name handshake

use crate::client::{BoxedReader, BoxedWriter, ParticipantStream};
use crate::error::ServerError;
use crate::registry::ConnectionRegistry;
use log::{debug, error, info, warn};
use shared::{parse_player_name, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Accepts connections and registers players once they send their name.
pub struct Server {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    handshake_timeout: Duration,
}

impl Server {
    pub async fn bind(
        addr: &str,
        registry: Arc<ConnectionRegistry>,
        handshake_timeout: Duration,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!("Server listening on {}", addr);

        Ok(Server {
            listener,
            registry,
            handshake_timeout,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Connection from {}", addr);
                    let registry = Arc::clone(&self.registry);
                    let handshake_timeout = self.handshake_timeout;
                    tokio::spawn(async move {
                        handle_connection(stream, addr, registry, handshake_timeout).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    handshake_timeout: Duration,
) {
    let (read_half, write_half) = stream.into_split();
    let mut writer: BoxedWriter = Box::new(write_half);

    if registry.is_full().await {
        reject_full(&mut writer, addr).await;
        return;
    }

    if let Err(e) = write_message(&mut writer, &ServerMessage::NameRequest).await {
        debug!("Failed to request a name from {}: {}", addr, e);
        return;
    }

    let reader: BoxedReader = Box::new(read_half);
    let mut lines = BufReader::new(reader).lines();
    let name = match timeout(handshake_timeout, lines.next_line()).await {
        Ok(Ok(Some(line))) => match parse_player_name(&line) {
            Some(name) => name,
            None => {
                warn!("Empty name from {}, closing", addr);
                return;
            }
        },
        Ok(Ok(None)) => {
            info!("A player disconnected from {} before sending a name", addr);
            return;
        }
        Ok(Err(e)) => {
            debug!("Handshake read from {} failed: {}", addr, e);
            return;
        }
        Err(_) => {
            info!("{} did not send a name in time", addr);
            return;
        }
    };

    let stream = ParticipantStream::from_lines(lines, writer);
    if registry
        .register_from(name, stream.clone(), Some(addr))
        .await
        .is_none()
    {
        // Filled up while this player was typing their name.
        if let Err(e) = stream
            .send(&ServerMessage::ServerFull, handshake_timeout)
            .await
        {
            debug!("Failed to notify {}: {}", addr, e);
        }
    }
}

async fn reject_full(writer: &mut BoxedWriter, addr: SocketAddr) {
    info!("Rejecting {}: server full", addr);
    if let Err(e) = write_message(writer, &ServerMessage::ServerFull).await {
        debug!("Failed to notify {}: {}", addr, e);
    }
    let _ = writer.shutdown().await;
}

async fn write_message(writer: &mut BoxedWriter, message: &ServerMessage) -> std::io::Result<()> {
    let line = message.encode()?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn start(max_players: usize) -> (SocketAddr, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new(max_players));
        let server = Server::bind("127.0.0.1:0", Arc::clone(&registry), Duration::from_secs(5))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        (addr, registry)
    }

    async fn wait_for_players(registry: &ConnectionRegistry, count: usize) {
        for _ in 0..100 {
            if registry.len().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} players", count);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let registry = Arc::new(ConnectionRegistry::new(1));
        let result = Server::bind(&addr, registry, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_name_handshake_registers_player() {
        let (addr, registry) = start(4).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(
            ServerMessage::decode(&line).unwrap(),
            ServerMessage::NameRequest
        );

        write_half.write_all(b"  Ada  \n").await.unwrap();
        wait_for_players(&registry, 1).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot[0].name, "Ada");
        assert!(snapshot[0].addr.is_some());
    }

    #[tokio::test]
    async fn test_server_full() {
        let (addr, registry) = start(1).await;

        let first = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = first.into_split();
        let mut first_lines = BufReader::new(read_half).lines();
        first_lines.next_line().await.unwrap().unwrap();
        write_half.write_all(b"Ada\n").await.unwrap();
        wait_for_players(&registry, 1).await;

        let second = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(second).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(
            ServerMessage::decode(&line).unwrap(),
            ServerMessage::ServerFull
        );
        assert!(lines.next_line().await.unwrap().is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_before_name() {
        let (addr, registry) = start(4).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        lines.next_line().await.unwrap().unwrap();
        drop(lines);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_empty().await);
    }
}
