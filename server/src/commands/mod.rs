//! Turns raw input lines into envelopes and executes them against the state.
//!
//! `parse` never fails: an unknown verb becomes an invalid `Help` envelope so
//! the sender gets told how to find the command list. `execute` fills in the
//! envelope's reply and any command-specific result fields, pushing side
//! effects to other members as it goes.

mod admin;
mod chat;

use crate::role::usage_of;
use crate::state::ServerState;
use log::debug;
use shared::{Command, Envelope, MsgMetadata, Role, COMMAND_MARKER, MAX_LINE_LEN};

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp"];

/// Builds the envelope for one input line.
pub fn parse(mut meta: MsgMetadata) -> Envelope {
    if !meta.content.starts_with(COMMAND_MARKER) {
        let image = is_image_link(&meta.content);
        return Envelope::new(meta, Command::Message { image });
    }

    meta.arg_count = meta.args().len();
    let first_arg = meta.args().first().map(|arg| arg.to_string()).unwrap_or_default();
    let verb = meta
        .content
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();

    let command = match verb.as_str() {
        "/join" => Command::Join {
            room: first_arg,
            previous: String::new(),
            log: Vec::new(),
        },
        "/leave" => Command::Leave {
            room: String::new(),
            forced: false,
        },
        "/listusers" => Command::ListUsers {
            room: String::new(),
            users: Vec::new(),
        },
        "/listrooms" => Command::ListRooms { rooms: Vec::new() },
        "/help" => Command::Help {
            invalid: false,
            usage: Vec::new(),
        },
        "/quit" => Command::Quit {
            room: String::new(),
        },
        "/kick" => Command::KickBan {
            target: first_arg,
            ban: false,
        },
        "/ban" => Command::KickBan {
            target: first_arg,
            ban: true,
        },
        "/unban" => Command::Unban { target: first_arg },
        "/create" => Command::Create {
            room: first_arg,
            visibility: Role::Member,
        },
        "/delete" => Command::Delete {
            room: first_arg,
            in_room: false,
        },
        "/promote" => Command::PromoteDemote {
            target: first_arg,
            promote: true,
        },
        "/demote" => Command::PromoteDemote {
            target: first_arg,
            promote: false,
        },
        "/broadcast" => Command::Broadcast,
        "/shutdown" => Command::Shutdown,
        _ => Command::Help {
            invalid: true,
            usage: Vec::new(),
        },
    };

    Envelope::new(meta, command)
}

/// Runs `envelope` on behalf of its author.
///
/// Lines longer than `MAX_LINE_LEN` are refused before dispatch. The reply is stamped with the author's room as it stands afterwards.
pub fn execute(state: &mut ServerState, envelope: &mut Envelope) {
    let username = envelope.meta.username.clone();
    if !state.is_active(&username) {
        envelope.fail("User is not logged in");
        return;
    }

    if envelope.meta.content.len() > MAX_LINE_LEN {
        envelope.fail(format!("usage: lines are limited to {} bytes", MAX_LINE_LEN));
        envelope.reply.current_room = state.current_room_of(&username);
        return;
    }

    match envelope.command {
        Command::Message { .. } => chat::message(state, envelope),
        Command::Join { .. } => chat::join(state, envelope),
        Command::Leave { .. } => chat::leave(state, envelope),
        Command::ListUsers { .. } => chat::list_users(state, envelope),
        Command::ListRooms { .. } => chat::list_rooms(state, envelope),
        Command::Help { .. } => chat::help(state, envelope),
        Command::Quit { .. } => chat::quit(state, envelope),
        Command::KickBan { .. } => admin::kick_ban(state, envelope),
        Command::Unban { .. } => admin::unban(state, envelope),
        Command::Create { .. } => admin::create(state, envelope),
        Command::Delete { .. } => admin::delete(state, envelope),
        Command::PromoteDemote { .. } => admin::promote_demote(state, envelope),
        Command::Broadcast => admin::broadcast(state, envelope),
        Command::Shutdown => admin::shutdown(state, envelope),
        Command::RoomUpdate { .. }
        | Command::UserUpdate { .. }
        | Command::AuditLog { .. }
        | Command::Notice => envelope.fail("Invalid command, enter /help for more information"),
    }

    envelope.reply.current_room = state.current_room_of(&username);
    debug!(
        "{} ran {}: {} {}",
        username,
        envelope.command.name(),
        envelope.reply.status,
        envelope.reply.message
    );
}

/// Checks argument count, then role. Returns the author's role when both
/// pass; otherwise the envelope already carries the failure.
fn authorize(
    state: &ServerState,
    envelope: &mut Envelope,
    verb: &str,
    arity_ok: bool,
    min_role: Role,
) -> Option<Role> {
    if !arity_ok {
        envelope.fail(format!("usage: {}", usage_of(verb)));
        return None;
    }

    let role = state
        .role_of(&envelope.meta.username)
        .unwrap_or(Role::Banned);
    if role < min_role {
        envelope.fail(format!("{} requires the {} role", verb, min_role));
        return None;
    }
    Some(role)
}

/// Recognises links to images served from an `/uploads/` path.
pub fn is_image_link(content: &str) -> bool {
    let content = content.trim();
    if content.contains(char::is_whitespace) {
        return false;
    }

    let Some(rest) = content
        .strip_prefix("http://")
        .or_else(|| content.strip_prefix("https://"))
    else {
        return false;
    };

    let Some((host, file)) = rest.split_once("/uploads/") else {
        return false;
    };
    if host.is_empty() || file.is_empty() || file.contains('/') {
        return false;
    }

    let lower = file.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.len() > ext.len() && lower.ends_with(ext))
}
