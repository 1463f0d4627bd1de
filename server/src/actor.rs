//! The single task that owns `ServerState`.
//!
//! Sessions talk to it through a cloneable [`StateHandle`]. Requests are
//! handled one at a time and nothing in `ServerState` is locked.

use crate::commands;
use crate::error::ServerError;
use crate::persistence;
use crate::signal::DoneSignal;
use crate::state::{JoinOutcome, ServerState};
use log::{debug, error, info, warn};
use shared::{Envelope, MsgMetadata};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const MAILBOX_CAPACITY: usize = 256;

/// Messages sent from sessions to the state actor
#[derive(Debug)]
pub enum Request {
    Join {
        username: String,
        reply: oneshot::Sender<JoinOutcome>,
    },
    Submit {
        username: String,
        content: String,
        reply: oneshot::Sender<Envelope>,
    },
    Disconnect {
        username: String,
        session: u64,
    },
    Shutdown,
}

/// Cloneable mailbox address of the state actor.
#[derive(Debug, Clone)]
pub struct StateHandle {
    tx: mpsc::Sender<Request>,
    terminated: DoneSignal,
}

impl StateHandle {
    pub async fn join(&self, username: &str) -> Result<JoinOutcome, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Join {
            username: username.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ServerError::ActorUnavailable)
    }

    pub async fn submit(&self, username: &str, content: &str) -> Result<Envelope, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Submit {
            username: username.to_string(),
            content: content.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ServerError::ActorUnavailable)
    }

    /// Reports a closed connection. Ignored by the actor if `session` is stale.
    pub async fn disconnect(&self, username: &str, session: u64) {
        let request = Request::Disconnect {
            username: username.to_string(),
            session,
        };
        if self.send(request).await.is_err() {
            debug!("Actor gone before disconnect of {}", username);
        }
    }

    /// Asks the actor to persist and stop.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        self.send(Request::Shutdown).await
    }

    /// Fires once the actor has stopped taking requests.
    pub fn terminated(&self) -> &DoneSignal {
        &self.terminated
    }

    async fn send(&self, request: Request) -> Result<(), ServerError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| ServerError::ActorUnavailable)
    }
}

pub struct StateActor {
    state: ServerState,
    rx: mpsc::Receiver<Request>,
    terminated: DoneSignal,
    snapshot_path: Option<PathBuf>,
}

impl StateActor {
    /// Processes requests until shutdown or until every handle is dropped,
    /// then hands the final state back.
    pub async fn run(mut self) -> ServerState {
        info!("State actor started with {} known users", self.state.users.len());

        while let Some(request) = self.rx.recv().await {
            self.handle_request(request);
            if self.terminated.is_fired() {
                break;
            }
        }

        if !self.terminated.is_fired() {
            info!("All state handles dropped");
            self.finish();
        }
        self.rx.close();
        self.state
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Join { username, reply } => {
                let outcome = self.state.login(&username);
                if outcome.accepted {
                    info!("{} logged in as {}", username, outcome.role);
                } else {
                    info!("Rejected login for {:?}: {}", username, outcome.message);
                }

                if let Err(outcome) = reply.send(outcome) {
                    warn!("Session for {} went away during login", username);
                    if outcome.accepted {
                        self.state.disconnect(&username, outcome.session);
                    }
                }
            }

            Request::Submit {
                username,
                content,
                reply,
            } => {
                let mut envelope = commands::parse(MsgMetadata::new(username, content));
                commands::execute(&mut self.state, &mut envelope);
                if reply.send(envelope).is_err() {
                    debug!("Reply receiver dropped");
                }

                if self.state.shutdown_requested {
                    self.finish();
                }
            }

            Request::Disconnect { username, session } => {
                if self.state.disconnect(&username, session) {
                    info!("{} disconnected", username);
                }
            }

            Request::Shutdown => {
                info!("Shutdown requested");
                self.state.announce_shutdown("", "The server is shutting down");
                self.state.record("server shut down");
                self.finish();
            }
        }
    }

    fn finish(&mut self) {
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = persistence::save(&self.state, path) {
                error!("Failed to save server state: {}", e);
            }
        }
        self.terminated.fire();
    }
}

/// Starts the actor on its own task.
///
/// With a `snapshot_path` the state is written there on shutdown.
pub fn spawn(
    state: ServerState,
    snapshot_path: Option<PathBuf>,
) -> (StateHandle, JoinHandle<ServerState>) {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let terminated = DoneSignal::new();

    let actor = StateActor {
        state,
        rx,
        terminated: terminated.clone(),
        snapshot_path,
    };

    (StateHandle { tx, terminated }, tokio::spawn(actor.run()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DEFAULT_PUSH_CAPACITY;
    use shared::{Command, DEFAULT_ROOM};

    fn start() -> (StateHandle, JoinHandle<ServerState>) {
        let mut state = ServerState::new(DEFAULT_PUSH_CAPACITY);
        state.ensure_owner("root");
        spawn(state, None)
    }

    #[tokio::test]
    async fn test_join_and_submit() {
        let (handle, _actor) = start();

        let outcome = handle.join("alice").await.unwrap();
        assert!(outcome.accepted);

        let reply = handle.submit("alice", "/join #general").await.unwrap();
        assert!(reply.reply.status);
        assert_eq!(reply.reply.current_room, DEFAULT_ROOM);

        let duplicate = handle.join("alice").await.unwrap();
        assert!(!duplicate.accepted);
    }

    #[tokio::test]
    async fn test_submit_from_unknown_user_fails() {
        let (handle, _actor) = start();
        let reply = handle.submit("ghost", "hello").await.unwrap();
        assert!(!reply.reply.status);
    }

    #[tokio::test]
    async fn test_disconnect_frees_username() {
        let (handle, actor) = start();

        let outcome = handle.join("alice").await.unwrap();
        handle.disconnect("alice", outcome.session).await;

        let again = handle.join("alice").await.unwrap();
        assert!(again.accepted);

        handle.shutdown().await.unwrap();
        let state = actor.await.unwrap();
        assert!(state.is_active("alice"));
        assert!(handle.terminated().is_fired());
    }

    #[tokio::test]
    async fn test_shutdown_command_stops_actor() {
        let (handle, actor) = start();
        let _root = handle.join("root").await.unwrap();

        let reply = handle.submit("root", "/shutdown").await.unwrap();
        assert!(reply.reply.status);
        assert_eq!(reply.command, Command::Shutdown);

        let state = actor.await.unwrap();
        assert!(state.shutdown_requested);
        handle.terminated().wait().await;

        assert!(matches!(
            handle.submit("root", "/help").await,
            Err(ServerError::ActorUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_actor() {
        let (handle, actor) = start();
        let terminated = handle.terminated().clone();
        drop(handle);

        let state = actor.await.unwrap();
        assert!(state.users.contains_key("root"));
        assert!(terminated.is_fired());
    }
}
