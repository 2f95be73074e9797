use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shared::ServerMessage;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

pub type ParticipantId = u32;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type LineReader = Lines<BufReader<BoxedReader>>;

/// Both directions of a participant's byte stream.
///
/// Reads are line-framed. Each half sits behind its own lock so the round's
/// reader task and the broadcast path can hold them from different tasks.
#[derive(Clone)]
pub struct ParticipantStream {
    reader: Arc<Mutex<LineReader>>,
    writer: Arc<Mutex<BoxedWriter>>,
}

impl ParticipantStream {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        Self::from_lines(BufReader::new(reader).lines(), Box::new(writer))
    }

    /// Wraps a line reader that may already have consumed the handshake.
    pub fn from_lines(lines: LineReader, writer: BoxedWriter) -> Self {
        Self {
            reader: Arc::new(Mutex::new(lines)),
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn from_tcp(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self::new(read_half, write_half)
    }

    pub fn reader(&self) -> Arc<Mutex<LineReader>> {
        Arc::clone(&self.reader)
    }

    /// Writes raw bytes, bounded by `limit`. Flushes so framing reaches the peer.
    pub async fn write_bytes(&self, bytes: &[u8], limit: Duration) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        };

        match timeout(limit, write).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "write timed out",
            )),
        }
    }

    pub async fn send(&self, message: &ServerMessage, limit: Duration) -> std::io::Result<()> {
        let line = message.encode()?;
        self.write_bytes(line.as_bytes(), limit).await
    }
}

/// A registered player. Snapshots hand out clones; the stream handles are shared.
#[derive(Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub score: u32,
    pub addr: Option<SocketAddr>,
    pub stream: ParticipantStream,
}

impl Participant {
    pub fn new(id: ParticipantId, name: String, stream: ParticipantStream) -> Self {
        Participant {
            id,
            name,
            score: 0,
            addr: None,
            stream,
        }
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("score", &self.score)
            .field("addr", &self.addr)
            .finish()
    }
}
