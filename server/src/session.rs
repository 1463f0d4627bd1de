//! Per-connection session: login handshake, then a dispatcher that
//! interleaves pushed envelopes with replies to the client's own input.
//!
//! The dispatcher is the only writer on the socket. A separate reader task
//! turns incoming lines into submissions so a slow peer never stalls pushes.

use crate::actor::StateHandle;
use crate::error::ServerError;
use crate::signal::DoneSignal;
use log::{debug, info, warn};
use shared::{denied, write_frame, Envelope, MAX_LINE_LEN, USERNAME_PROMPT};
use std::io;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const INPUT_BUFFER: usize = 32;

/// Drives one client connection from handshake to teardown.
pub async fn handle_connection<S>(stream: S, handle: StateHandle) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let terminated = handle.terminated().clone();

    write_line(&mut writer, USERNAME_PROMPT).await?;

    let line = tokio::select! {
        read = read_limited_line(&mut reader) => read?,
        _ = terminated.wait() => {
            debug!("Server stopped before login");
            let _ = writer.shutdown().await;
            return Ok(());
        }
    };
    let username = match line {
        Line::Eof => {
            debug!("Connection closed before login");
            return Ok(());
        }
        Line::Oversized(_) => {
            write_line(&mut writer, &denied("Username is too long")).await?;
            let _ = writer.shutdown().await;
            return Ok(());
        }
        Line::Complete(text) => text.trim().to_string(),
    };

    let outcome = handle.join(&username).await?;
    let welcomed = write_line(&mut writer, &outcome.message).await;

    let (true, Some(push), Some(done)) = (outcome.accepted, outcome.push, outcome.done) else {
        let _ = writer.shutdown().await;
        return welcomed.map_err(ServerError::from);
    };

    let session = Session {
        username,
        session: outcome.session,
        handle,
        push,
        done,
        writer,
    };

    // The login is already committed in the actor.
    if let Err(e) = welcomed {
        warn!("Failed to welcome {}: {}", session.username, e);
        session.teardown(None).await;
        return Err(e.into());
    }

    session.run(reader).await
}

async fn write_line<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(format!("{}\n", text).as_bytes()).await?;
    writer.flush().await
}

struct Session<S> {
    username: String,
    session: u64,
    handle: StateHandle,
    push: mpsc::Receiver<Envelope>,
    done: DoneSignal,
    writer: WriteHalf<S>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn run(mut self, reader: BufReader<ReadHalf<S>>) -> Result<(), ServerError> {
        let (input_tx, mut input_rx) = mpsc::channel(INPUT_BUFFER);
        let reader_task = tokio::spawn(read_lines(
            reader,
            input_tx,
            self.done.clone(),
            self.username.clone(),
        ));
        let terminated = self.handle.terminated().clone();

        let result = loop {
            tokio::select! {
                pushed = self.push.recv() => match pushed {
                    Some(envelope) => {
                        if let Err(e) = write_frame(&mut self.writer, &envelope).await {
                            break Err(e.into());
                        }
                    }
                    None => break Ok(()),
                },
                line = input_rx.recv() => match line {
                    Some(line) => {
                        let reply = match self.handle.submit(&self.username, &line).await {
                            Ok(reply) => reply,
                            Err(e) => break Err(e),
                        };
                        if let Err(e) = write_frame(&mut self.writer, &reply).await {
                            break Err(e.into());
                        }
                    }
                    None => break Ok(()),
                },
                _ = self.done.wait() => break Ok(()),
                _ = terminated.wait() => break Ok(()),
            }
        };

        self.teardown(Some(reader_task)).await;
        result
    }

    async fn teardown(mut self, reader_task: Option<JoinHandle<()>>) {
        self.done.fire();

        while let Ok(envelope) = self.push.try_recv() {
            if write_frame(&mut self.writer, &envelope).await.is_err() {
                break;
            }
        }

        self.handle.disconnect(&self.username, self.session).await;
        if let Some(task) = reader_task {
            task.abort();
        }
        let _ = self.writer.shutdown().await;

        info!("Session for {} closed", self.username);
    }
}

enum Line {
    Eof,
    Complete(String),
    /// The first `MAX_LINE_LEN + 1` bytes of a longer line.
    Oversized(String),
}

/// Reads one line without buffering more than `MAX_LINE_LEN + 1` bytes.
/// The remainder of an oversized line is discarded.
async fn read_limited_line<R>(reader: &mut R) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(Line::Eof);
    }

    let text = String::from_utf8_lossy(&buf).into_owned();
    if buf.len() > MAX_LINE_LEN && buf.last() != Some(&b'\n') {
        skip_line(reader).await?;
        return Ok(Line::Oversized(text));
    }
    Ok(Line::Complete(text))
}

async fn skip_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        let read = (&mut *reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut scratch)
            .await?;
        if read == 0 || scratch.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}

/// Forwards trimmed, non-empty lines until EOF, an error or `done`.
///
/// Oversized lines are forwarded untrimmed so the actor refuses them.
async fn read_lines<R>(
    mut reader: BufReader<R>,
    input: mpsc::Sender<String>,
    done: DoneSignal,
    username: String,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let text = tokio::select! {
            read = read_limited_line(&mut reader) => match read {
                Ok(Line::Eof) => {
                    debug!("{} closed the connection", username);
                    break;
                }
                Ok(Line::Complete(line)) => line.trim().to_string(),
                Ok(Line::Oversized(line)) => {
                    debug!("{} sent an oversized line", username);
                    line
                }
                Err(e) => {
                    warn!("Failed to read from {}: {}", username, e);
                    break;
                }
            },
            _ = done.wait() => break,
        };

        if text.is_empty() {
            continue;
        }
        if input.send(text).await.is_err() {
            break;
        }
    }

    done.fire();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor;
    use crate::state::{ServerState, DEFAULT_PUSH_CAPACITY, JOIN_HISTORY_LIMIT};
    use crate::member::Member;
    use shared::{read_frame, Command, Role, DEFAULT_ROOM};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::time::timeout;

    fn start() -> StateHandle {
        let mut state = ServerState::new(DEFAULT_PUSH_CAPACITY);
        state
            .users
            .insert("mallory".to_string(), Member::new("mallory", Role::Banned));
        actor::spawn(state, None).0
    }

    #[tokio::test]
    async fn test_banned_handshake() {
        let handle = start();
        let mock = tokio_test::io::Builder::new()
            .write(b"Enter your username:\n")
            .read(b"mallory\n")
            .write(b"PERMISSION DENIED: You are banned!\n")
            .build();

        handle_connection(mock, handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let handle = start();
        let (client, server) = duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server, handle.clone()));

        let (read_half, mut writer) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), USERNAME_PROMPT);

        writer.write_all(b"alice\n").await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("Welcome to the server!"));

        writer.write_all(b"/join #general\n").await.unwrap();
        let reply = read_frame(&mut reader).await.unwrap().unwrap();
        assert!(reply.reply.status);
        assert!(matches!(reply.command, Command::Join { .. }));

        writer.write_all(b"/quit\n").await.unwrap();
        let reply = read_frame(&mut reader).await.unwrap().unwrap();
        assert!(matches!(reply.command, Command::Quit { .. }));

        let mut rest = Vec::new();
        timeout(Duration::from_secs(2), reader.read_to_end(&mut rest))
            .await
            .expect("session should close the stream")
            .unwrap();

        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let again = handle.join("alice").await.unwrap();
        assert!(again.accepted);
    }

    #[tokio::test]
    async fn test_dropped_connection_frees_username() {
        let handle = start();
        let (client, server) = duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server, handle.clone()));

        let (read_half, mut writer) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        writer.write_all(b"bob\n").await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("Welcome"));

        drop(writer);
        drop(reader);

        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .ok();

        let again = handle.join("bob").await.unwrap();
        assert!(again.accepted, "{}", again.message);
    }

    /// Logs in over an in-memory socket and returns the client's halves.
    async fn connect(
        handle: &StateHandle,
        username: &str,
    ) -> (
        BufReader<ReadHalf<tokio::io::DuplexStream>>,
        WriteHalf<tokio::io::DuplexStream>,
    ) {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(handle_connection(server, handle.clone()));

        let (read_half, mut writer) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        writer
            .write_all(format!("{}\n", username).as_bytes())
            .await
            .unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("Welcome"), "{}", line);
        (reader, writer)
    }

    #[tokio::test]
    async fn test_failed_welcome_releases_login() {
        let handle = start();
        let mock = tokio_test::io::Builder::new()
            .write(b"Enter your username:\n")
            .read(b"bob\n")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();

        assert!(handle_connection(mock, handle.clone()).await.is_err());

        let again = handle.join("bob").await.unwrap();
        assert!(again.accepted, "{}", again.message);
    }

    #[tokio::test]
    async fn test_oversized_username_denied() {
        let handle = start();
        let mut input = vec![b'x'; MAX_LINE_LEN + 10];
        input.push(b'\n');
        let mock = tokio_test::io::Builder::new()
            .write(b"Enter your username:\n")
            .read(&input)
            .write(b"PERMISSION DENIED: Username is too long\n")
            .build();

        handle_connection(mock, handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_line_refused_and_session_continues() {
        let handle = start();
        let (mut reader, mut writer) = connect(&handle, "alice").await;

        writer.write_all(b"/join #general\n").await.unwrap();
        let joined = read_frame(&mut reader).await.unwrap().unwrap();
        assert!(joined.reply.status);

        let mut long = vec![b'a'; MAX_LINE_LEN * 3];
        long.push(b'\n');
        writer.write_all(&long).await.unwrap();
        let refused = read_frame(&mut reader).await.unwrap().unwrap();
        assert!(!refused.reply.status);
        assert!(refused.reply.message.contains("usage: lines are limited"));
        assert_eq!(refused.reply.current_room, DEFAULT_ROOM);

        writer.write_all(b"hello\n").await.unwrap();
        let sent = read_frame(&mut reader).await.unwrap().unwrap();
        assert!(sent.reply.status, "{}", sent.reply.message);
        assert_eq!(sent.meta.content, "hello");
    }

    #[tokio::test]
    async fn test_join_busy_room_fits_in_frame() {
        let handle = start();
        let _alice = handle.join("alice").await.unwrap();
        handle.submit("alice", "/join #general").await.unwrap();
        let text = "m".repeat(600);
        for _ in 0..2_000 {
            handle.submit("alice", &text).await.unwrap();
        }

        let (mut reader, mut writer) = connect(&handle, "bob").await;
        writer.write_all(b"/join #general\n").await.unwrap();

        let reply = timeout(Duration::from_secs(2), read_frame(&mut reader))
            .await
            .unwrap()
            .unwrap()
            .expect("join reply");
        assert!(reply.reply.status);
        match reply.command {
            Command::Join { log, .. } => assert_eq!(log.len(), JOIN_HISTORY_LIMIT),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_releases_connection_at_prompt() {
        let handle = start();
        let (client, server) = duplex(1024);
        let task = tokio::spawn(handle_connection(server, handle.clone()));

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), USERNAME_PROMPT);

        handle.shutdown().await.unwrap();

        timeout(Duration::from_secs(2), task)
            .await
            .expect("handshake should stop on shutdown")
            .unwrap()
            .unwrap();
    }
}
