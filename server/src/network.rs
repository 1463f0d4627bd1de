//! Server network layer: TCP listener and session spawning

use crate::actor::{self, StateHandle};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::session;
use crate::state::ServerState;
use log::{error, info, warn};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Main server coordinating the listener and the state actor
pub struct Server {
    listener: TcpListener,
    handle: StateHandle,
    actor: JoinHandle<ServerState>,
}

impl Server {
    /// Builds the startup state, binds the listener and starts the actor.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let state = ServerState::bootstrap(config)?;
        Self::with_state(config, state).await
    }

    /// Like [`Server::bind`] but with a caller-supplied state.
    pub async fn with_state(config: &ServerConfig, state: ServerState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (handle, actor) = actor::spawn(state, config.state_file.clone());

        Ok(Server {
            listener,
            handle,
            actor,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> StateHandle {
        self.handle.clone()
    }

    /// Accepts connections until the actor terminates, then returns the
    /// final state.
    pub async fn run(self) -> Result<ServerState, ServerError> {
        let terminated = self.handle.terminated().clone();

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("Accepted connection from {}", addr);
                        let handle = self.handle.clone();
                        tokio::spawn(async move {
                            if let Err(e) = session::handle_connection(stream, handle).await {
                                warn!("Session from {} ended with error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                _ = terminated.wait() => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        drop(self.listener);
        drop(self.handle);
        Ok(self.actor.await?)
    }
}
