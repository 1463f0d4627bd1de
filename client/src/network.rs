use crate::error::ClientError;
use log::{debug, info, warn};
use shared::{read_frame, Envelope, DENIED, USERNAME_PROMPT};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// A TCP connection to the chat server.
pub struct Connection {
    incoming: Incoming,
    outgoing: Outgoing,
}

/// Receiving side: length-prefixed envelopes after login.
pub struct Incoming {
    reader: BufReader<OwnedReadHalf>,
}

/// Sending side: plain text lines.
pub struct Outgoing {
    writer: OwnedWriteHalf,
}

impl Connection {
    /// Connects and reads the server's username prompt.
    pub async fn open(addr: &str) -> Result<(Self, String), ClientError> {
        info!("Connecting to {}", addr);
        let stream = TcpStream::connect(addr).await?;
        let (read_half, writer) = stream.into_split();

        let mut connection = Connection {
            incoming: Incoming {
                reader: BufReader::new(read_half),
            },
            outgoing: Outgoing { writer },
        };

        let prompt = connection.incoming.read_text_line().await?;
        if prompt != USERNAME_PROMPT {
            warn!("Unexpected prompt from server: {:?}", prompt);
        }
        Ok((connection, prompt))
    }

    /// Sends the username and returns the welcome line.
    pub async fn login(&mut self, username: &str) -> Result<String, ClientError> {
        self.outgoing.send_line(username).await?;

        let response = self.incoming.read_text_line().await?;
        if response.starts_with(DENIED) {
            return Err(ClientError::LoginRejected(response));
        }
        debug!("Logged in as {}", username);
        Ok(response)
    }

    /// Connects and logs in as `username`.
    pub async fn connect(addr: &str, username: &str) -> Result<(Self, String), ClientError> {
        let (mut connection, _) = Self::open(addr).await?;
        let welcome = connection.login(username).await?;
        Ok((connection, welcome))
    }

    pub async fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
        self.outgoing.send_line(line).await
    }

    pub async fn next_envelope(&mut self) -> Result<Option<Envelope>, ClientError> {
        self.incoming.next_envelope().await
    }

    pub fn split(self) -> (Incoming, Outgoing) {
        (self.incoming, self.outgoing)
    }
}

impl Incoming {
    /// Next envelope from the server, `None` once it hangs up.
    pub async fn next_envelope(&mut self) -> Result<Option<Envelope>, ClientError> {
        Ok(read_frame(&mut self.reader).await?)
    }

    async fn read_text_line(&mut self) -> Result<String, ClientError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(ClientError::Closed);
        }
        Ok(line.trim_end().to_string())
    }
}

impl Outgoing {
    pub async fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
