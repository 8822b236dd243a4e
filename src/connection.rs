use crate::error::{BulbError, Result};
use std::net::SocketAddrV4;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Something to do on a connection
#[derive(Debug, PartialEq)]
pub enum Event {
    /// A line received from the bulb
    Inbound(String),
    /// A queued line waiting to be written
    Outbound(String),
}

/// Low-level TCP connection to one bulb
///
/// Outgoing lines are queued on an unbounded channel and written by the task
/// driving [`Connection::next_event`], so all writes to the socket happen
/// from a single task in queue order.
pub struct Connection {
    peer: SocketAddrV4,
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl Connection {
    /// Open a TCP connection, returning it together with its send queue
    pub async fn open(peer: SocketAddrV4) -> Result<(Self, mpsc::UnboundedSender<String>)> {
        tracing::info!("Connecting to {}", peer);

        let stream = TcpStream::connect(peer).await?;
        stream.set_nodelay(true)?;
        let (read, writer) = stream.into_split();

        let (tx, outbound) = mpsc::unbounded_channel();

        Ok((
            Self {
                peer,
                reader: BufReader::new(read).lines(),
                writer,
                outbound,
            },
            tx,
        ))
    }

    /// Wait for the next inbound line or queued outgoing line
    ///
    /// Both sources are cancel-safe, so this can sit in a `select!` next to
    /// timers. Outgoing lines are returned rather than written here; hand
    /// them to [`Connection::write_line`] outside the `select!` so a write is
    /// never cut off half way. Returns `Err(ConnectionClosed)` when the bulb
    /// closes the socket.
    pub async fn next_event(&mut self) -> Result<Event> {
        tokio::select! {
            line = self.reader.next_line() => match line? {
                Some(line) => {
                    tracing::debug!("Received: {}", line);
                    Ok(Event::Inbound(line))
                }
                None => Err(BulbError::ConnectionClosed),
            },
            Some(line) = self.outbound.recv() => Ok(Event::Outbound(line)),
        }
    }

    /// Write one complete line to the socket
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        tracing::debug!("Sending: {}", line.trim_end());
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut the socket down; errors from an already-dead socket are ignored
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("Ignoring error while closing {}: {}", self.peer, e);
        }
    }
}
