use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_PORT: u16 = 5461;
pub const COMMAND_MARKER: char = '/';
pub const ROOM_MARKER: char = '#';
pub const DEFAULT_ROOM: &str = "#general";
pub const STAFF_ROOM: &str = "#staff";
pub const USERNAME_PROMPT: &str = "Enter your username:";
pub const DENIED: &str = "PERMISSION DENIED";
pub const MAX_FRAME_LEN: usize = 1024 * 1024;
/// Longest line, in bytes, the server accepts from a client.
pub const MAX_LINE_LEN: usize = 4096;

/// Formats a failure the way every rejection reaches a client.
pub fn denied(reason: impl fmt::Display) -> String {
    format!("{}: {}", DENIED, reason)
}

/// Permission level. Declaration order is the permission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Banned,
    Member,
    Admin,
    Owner,
}

impl Role {
    /// Parses the visibility keyword accepted by `/create`.
    pub fn from_visibility(keyword: &str) -> Option<Role> {
        match keyword.to_ascii_lowercase().as_str() {
            "member" | "all" => Some(Role::Member),
            "staff" | "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }

    pub fn is_staff(self) -> bool {
        self >= Role::Admin
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Banned => "banned",
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sender metadata stamped on every envelope.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MsgMetadata {
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub arg_count: usize,
    /// Server-generated line, rendered without the `user: ` prefix.
    pub flag: bool,
}

impl MsgMetadata {
    pub fn new(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            timestamp: Utc::now(),
            content: content.into(),
            arg_count: 0,
            flag: false,
        }
    }

    /// Whitespace separated arguments following the command verb.
    pub fn args(&self) -> Vec<&str> {
        self.content.split_whitespace().skip(1).collect()
    }
}

/// Result fields shared by every command variant.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Reply {
    pub status: bool,
    pub message: String,
    /// Room the receiving client should route this envelope to.
    pub current_room: String,
}

/// A message as stored in a room log.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatLine {
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub image: bool,
    pub flag: bool,
}

impl ChatLine {
    pub fn from_meta(meta: &MsgMetadata, image: bool) -> Self {
        Self {
            username: meta.username.clone(),
            timestamp: meta.timestamp,
            content: meta.content.clone(),
            image,
            flag: meta.flag,
        }
    }

    pub fn format(&self) -> String {
        let time = self.timestamp.format("%Y-%m-%d %H:%M:%S");
        if self.flag {
            format!("{}\t{}{}", time, self.username, self.content)
        } else {
            format!("{}\t{}:  {}", time, self.username, self.content)
        }
    }
}

/// Closed set of client and server originated events.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Command {
    Message {
        image: bool,
    },
    Join {
        room: String,
        previous: String,
        log: Vec<ChatLine>,
    },
    Leave {
        room: String,
        forced: bool,
    },
    ListUsers {
        room: String,
        users: Vec<String>,
    },
    Help {
        invalid: bool,
        usage: Vec<String>,
    },
    Quit {
        room: String,
    },
    KickBan {
        target: String,
        ban: bool,
    },
    Unban {
        target: String,
    },
    Create {
        room: String,
        visibility: Role,
    },
    Delete {
        room: String,
        in_room: bool,
    },
    PromoteDemote {
        target: String,
        promote: bool,
    },
    Broadcast,
    Shutdown,
    ListRooms {
        rooms: Vec<String>,
    },

    // Server originated only.
    RoomUpdate {
        room: String,
        created: bool,
    },
    UserUpdate {
        role: Role,
        rooms: Vec<String>,
        promote: bool,
    },
    AuditLog {
        entries: Vec<String>,
    },
    Notice,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Message { .. } => "message",
            Command::Join { .. } => "join",
            Command::Leave { .. } => "leave",
            Command::ListUsers { .. } => "listusers",
            Command::Help { .. } => "help",
            Command::Quit { .. } => "quit",
            Command::KickBan { ban: false, .. } => "kick",
            Command::KickBan { ban: true, .. } => "ban",
            Command::Unban { .. } => "unban",
            Command::Create { .. } => "create",
            Command::Delete { .. } => "delete",
            Command::PromoteDemote { promote: true, .. } => "promote",
            Command::PromoteDemote { promote: false, .. } => "demote",
            Command::Broadcast => "broadcast",
            Command::Shutdown => "shutdown",
            Command::ListRooms { .. } => "listrooms",
            Command::RoomUpdate { .. } => "roomupdate",
            Command::UserUpdate { .. } => "userupdate",
            Command::AuditLog { .. } => "auditlog",
            Command::Notice => "notice",
        }
    }
}

/// One parsed action plus its execution result.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub meta: MsgMetadata,
    pub reply: Reply,
    pub command: Command,
}

impl Envelope {
    pub fn new(meta: MsgMetadata, command: Command) -> Self {
        Self {
            meta,
            reply: Reply::default(),
            command,
        }
    }

    /// A server text notice; `username` is the subject of the notice.
    pub fn notice(username: impl Into<String>, content: impl Into<String>) -> Self {
        let mut meta = MsgMetadata::new(username, content);
        meta.flag = true;
        let mut envelope = Self::new(meta, Command::Notice);
        envelope.reply.status = true;
        envelope
    }

    pub fn succeed(&mut self, message: impl Into<String>) {
        self.reply.status = true;
        self.reply.message = message.into();
    }

    pub fn fail(&mut self, reason: impl fmt::Display) {
        self.reply.status = false;
        self.reply.message = denied(reason);
    }
}

/// Capabilities a presentation layer offers to rendered envelopes.
///
/// An empty room name addresses the lobby.
pub trait ChatView {
    fn display(&mut self, room: &str, text: &str);
    fn clear_room(&mut self, room: &str);
    fn clear_lobby(&mut self);
    fn select_room(&mut self, room: &str);
    fn deselect_room(&mut self);
    fn set_rooms(&mut self, rooms: &[String]);
    fn add_room(&mut self, room: &str);
    fn remove_room(&mut self, room: &str);
    fn show_lobby(&mut self);
    fn user_quit(&mut self, message: &str);
    fn display_image(&mut self, room: &str, url: &str);
    fn display_join_history(&mut self, room: &str, lines: &[ChatLine]);
}

pub fn encode_envelope(envelope: &Envelope) -> io::Result<Vec<u8>> {
    bincode::serialize(envelope).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn decode_envelope(data: &[u8]) -> io::Result<Envelope> {
    bincode::deserialize(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Writes one length-prefixed envelope frame.
pub async fn write_frame<W>(writer: &mut W, envelope: &Envelope) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = encode_envelope(envelope)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", data.len()),
        ));
    }

    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await
}

/// Reads one length-prefixed envelope frame. Returns `None` on a clean EOF.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Envelope>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;
    decode_envelope(&buffer).map(Some)
}
