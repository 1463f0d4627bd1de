//! # Chat Server Library
//!
//! This library provides the server side of a multi-room text chat. Clients
//! connect over TCP, pick a username, then send plain text lines: either chat
//! messages for their current room or slash commands. The server answers each
//! line with one envelope and pushes other users' activity as it happens.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! A single registry of known users and rooms lives on one task. Roles,
//! room visibility, membership and room logs only change there, so every
//! client sees the same ordering of events.
//!
//! ### Session Management
//! Handles the complete lifecycle of a connection:
//! - Username handshake and login checks (duplicates, bans)
//! - Forwarding input lines and writing replies
//! - Delivering pushed envelopes without blocking the state task
//! - Cleanup on `/quit`, kicks, bans and dropped sockets
//!
//! ### Moderation
//! Admins and owners can kick, ban, create and delete rooms and broadcast.
//! Owners can promote, demote and shut the server down. Every moderation
//! action is recorded in an audit trail that staff receive on login.
//!
//! ## Architecture Design
//!
//! ### State Actor
//! `ServerState` is moved into the task started by [`actor::spawn`]. Sessions
//! hold a cloneable [`actor::StateHandle`] and send it requests with a
//! oneshot for the answer. Requests run one at a time.
//!
//! ### Push Channels
//! Every live member owns a bounded channel. Pushes use `try_send`; when a
//! client falls behind, envelopes are dropped with a warning instead of
//! stalling the actor.
//!
//! ### Termination Signals
//! A [`signal::DoneSignal`] fires once per session and once for the whole
//! server. Any path may fire it; teardown runs once.
//!
//! ## Wire Protocol
//!
//! The handshake is line based: the server sends a prompt, the client sends
//! a username, and the server answers with one welcome or rejection line.
//! After that the client sends text lines and the server sends
//! length-prefixed bincode envelopes (see the `shared` crate).
//!
//! ## Module Organization
//!
//! - `actor`: the state task and its handle
//! - `audit`: audit trail entries
//! - `commands`: line parsing and command execution
//! - `config`: command line arguments
//! - `member`, `room`, `role`: registry records and visibility rules
//! - `network`: TCP listener
//! - `persistence`: JSON snapshot load and save
//! - `session`: per-connection handshake and dispatch
//! - `state`: the registries themselves
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ServerConfig::local();
//!     config.port = 5461;
//!     config.owners.push("root".to_string());
//!
//!     let server = Server::bind(&config).await?;
//!     let state = server.run().await?;
//!     println!("Stopped with {} known users", state.users.len());
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod audit;
pub mod commands;
pub mod config;
pub mod error;
pub mod member;
pub mod network;
pub mod persistence;
pub mod role;
pub mod room;
pub mod session;
pub mod signal;
pub mod state;

pub use error::ServerError;
