//! # Chat Client Library
//!
//! Client side of the multi-room chat. It logs in over TCP, sends whatever
//! the user types as text lines and renders the envelopes the server sends
//! back.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Connection handling:
//! - Username handshake
//! - Sending input lines
//! - Reading length-prefixed envelopes
//!
//! ### Presenter (`present`)
//! Maps each envelope onto calls of the `ChatView` trait from `shared`. The
//! presenter knows nothing about terminals, so any front end that implements
//! the trait can reuse it.
//!
//! ### View Module (`view`)
//! A `ChatView` that prints `[room] text` lines to a terminal.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Connection;
//! use client::present;
//! use client::view::TerminalView;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (mut connection, welcome) = Connection::connect("127.0.0.1:5461", "alice").await?;
//!     println!("{}", welcome);
//!
//!     let mut view = TerminalView::stdout();
//!     connection.send_line("/join #general").await?;
//!     while let Some(envelope) = connection.next_envelope().await? {
//!         present(&envelope, &mut view);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod network;
mod presenter;
pub mod view;

pub use error::ClientError;
pub use presenter::present;
