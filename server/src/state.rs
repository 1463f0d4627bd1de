//! The user and room registries owned by the state actor.
//!
//! Nothing here is synchronised: a `ServerState` is moved into the actor task
//! and every method runs on that task, one request at a time.

use crate::audit::AuditEntry;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::member::Member;
use crate::persistence;
use crate::room::Room;
use crate::signal::DoneSignal;
use log::info;
use shared::{
    denied, ChatLine, Command, Envelope, MsgMetadata, Role, COMMAND_MARKER, DEFAULT_ROOM,
    ROOM_MARKER, STAFF_ROOM,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;

pub const DEFAULT_PUSH_CAPACITY: usize = 64;

/// Lines of room history replayed on join. With lines capped at
/// `MAX_LINE_LEN` this keeps a join reply inside one frame.
pub const JOIN_HISTORY_LIMIT: usize = 100;

/// Result of a login attempt.
///
/// On success the session takes ownership of the push receiver and the
/// termination signal.
#[derive(Debug)]
pub struct JoinOutcome {
    pub accepted: bool,
    pub message: String,
    pub role: Role,
    pub rooms: Vec<String>,
    pub session: u64,
    pub push: Option<mpsc::Receiver<Envelope>>,
    pub done: Option<DoneSignal>,
}

impl JoinOutcome {
    fn rejected(message: String, role: Role) -> Self {
        Self {
            accepted: false,
            message,
            role,
            rooms: Vec::new(),
            session: 0,
            push: None,
            done: None,
        }
    }
}

#[derive(Debug)]
pub struct ServerState {
    pub users: HashMap<String, Member>,
    pub rooms: BTreeMap<String, Room>,
    pub audit: Vec<AuditEntry>,
    pub shutdown_requested: bool,
    push_capacity: usize,
    next_session: u64,
}

impl ServerState {
    /// Empty registries with no rooms.
    pub fn empty(push_capacity: usize) -> Self {
        Self {
            users: HashMap::new(),
            rooms: BTreeMap::new(),
            audit: Vec::new(),
            shutdown_requested: false,
            push_capacity,
            next_session: 0,
        }
    }

    /// Fresh state seeded with the public and staff rooms.
    pub fn new(push_capacity: usize) -> Self {
        let mut state = Self::empty(push_capacity);
        state.insert_room(Room::new(DEFAULT_ROOM, Role::Member));
        state.insert_room(Room::new(STAFF_ROOM, Role::Admin));
        state
    }

    /// Builds the startup state: restores the snapshot when persistence is
    /// enabled and one exists, then applies the configured owners.
    pub fn bootstrap(config: &ServerConfig) -> Result<Self, ServerError> {
        let snapshot = match &config.state_file {
            Some(path) => persistence::load(path)?,
            None => None,
        };

        let mut state = match snapshot {
            Some(snapshot) => {
                info!(
                    "Restored {} users and {} rooms from snapshot",
                    snapshot.users.len(),
                    snapshot.rooms.len()
                );
                Self::from_snapshot(snapshot, config.push_capacity)
            }
            None => Self::new(config.push_capacity),
        };

        for owner in &config.owners {
            state.ensure_owner(owner);
        }

        Ok(state)
    }

    pub fn push_capacity(&self) -> usize {
        self.push_capacity
    }

    pub fn insert_room(&mut self, room: Room) {
        self.rooms.insert(room.name.clone(), room);
    }

    /// Creates or upgrades `username` to Owner without logging them in.
    pub fn ensure_owner(&mut self, username: &str) {
        let member = self
            .users
            .entry(username.to_string())
            .or_insert_with(|| Member::new(username, Role::Owner));
        member.role = Role::Owner;
        member.refresh_access(&self.rooms);
        info!("{} holds the owner role", username);
    }

    pub fn record(&mut self, event: impl Into<String>) {
        self.audit.push(AuditEntry::new(event));
    }

    pub fn format_audit(&self) -> Vec<String> {
        self.audit.iter().map(AuditEntry::format).collect()
    }

    pub fn is_active(&self, username: &str) -> bool {
        self.users.get(username).map_or(false, |member| member.active)
    }

    pub fn role_of(&self, username: &str) -> Option<Role> {
        self.users.get(username).map(|member| member.role)
    }

    /// The member's current room, empty when in the lobby or unknown.
    pub fn current_room_of(&self, username: &str) -> String {
        self.users
            .get(username)
            .map(|member| member.current_room.clone())
            .unwrap_or_default()
    }

    /// Handles a login request for `username`.
    pub fn login(&mut self, username: &str) -> JoinOutcome {
        if let Err(reason) = validate_username(username) {
            return JoinOutcome::rejected(denied(reason), Role::Member);
        }

        let greeting = match self.users.get(username) {
            None => "Welcome to the server!",
            Some(member) if member.active => {
                return JoinOutcome::rejected(
                    denied(format!("{} is currently logged in!", username)),
                    member.role,
                );
            }
            Some(member) if member.role == Role::Banned => {
                return JoinOutcome::rejected(denied("You are banned!"), member.role);
            }
            Some(_) => "Welcome back to the server!",
        };

        self.next_session += 1;
        let session = self.next_session;

        let member = self
            .users
            .entry(username.to_string())
            .or_insert_with(|| Member::new(username, Role::Member));
        member.refresh_access(&self.rooms);
        let (push, done) = member.activate(session, self.push_capacity);
        let role = member.role;
        let rooms = member.available_rooms.clone();

        self.record(format!("{} joined the server", username));

        if role > Role::Member {
            let entries = self.format_audit();
            self.push_to(
                username,
                Envelope::new(
                    MsgMetadata::new(username, "/auditlog"),
                    Command::AuditLog { entries },
                ),
            );
        }

        JoinOutcome {
            accepted: true,
            message: format!("{} Available rooms: {}", greeting, rooms.join(" ")),
            role,
            rooms,
            session,
            push: Some(push),
            done: Some(done),
        }
    }

    /// Ends `session` for `username` if it is still the live one.
    pub fn disconnect(&mut self, username: &str, session: u64) -> bool {
        let live = self
            .users
            .get(username)
            .map_or(false, |member| member.active && member.session == session);

        if live {
            self.end_session(username);
        }
        live
    }

    /// Removes the member from its room, deactivates it and records the
    /// logout. Returns the room it was in.
    pub fn end_session(&mut self, username: &str) -> Option<String> {
        let room = self.leave_room(username);

        let was_active = match self.users.get_mut(username) {
            Some(member) if member.active => {
                member.deactivate();
                true
            }
            _ => false,
        };

        if was_active {
            self.record(format!("{} left the server", username));
        }
        room
    }

    /// Evicts an active member: notifies its session why, then ends it.
    pub fn force_out(&mut self, username: &str, reason: &str) {
        let room = self.leave_room(username);

        if let Some(member) = self.users.get(username) {
            if let Some(room) = &room {
                member.push(forced_leave(username, room, reason));
            }

            let mut quit = Envelope::new(
                MsgMetadata::new(username, "/quit"),
                Command::Quit {
                    room: room.clone().unwrap_or_default(),
                },
            );
            quit.succeed(reason);
            member.push(quit);
        }

        self.end_session(username);
    }

    /// Moves the member into `room_name` and announces it.
    ///
    /// Returns the last [`JOIN_HISTORY_LIMIT`] lines of the room's log as it
    /// was before the member entered.
    pub fn enter_room(&mut self, username: &str, room_name: &str) -> Vec<ChatLine> {
        let Some(room) = self.rooms.get_mut(room_name) else {
            return Vec::new();
        };

        let start = room.log.len().saturating_sub(JOIN_HISTORY_LIMIT);
        let history = room.log[start..].to_vec();
        room.add_user(username);
        if let Some(member) = self.users.get_mut(username) {
            member.current_room = room_name.to_string();
        }

        self.room_notice(room_name, username, "joined");
        history
    }

    /// Takes the member out of its current room and announces it.
    pub fn leave_room(&mut self, username: &str) -> Option<String> {
        let room_name = self
            .users
            .get(username)
            .filter(|member| member.in_room())
            .map(|member| member.current_room.clone())?;

        if let Some(room) = self.rooms.get_mut(&room_name) {
            room.remove_user(username);
        }
        if let Some(member) = self.users.get_mut(username) {
            member.current_room.clear();
        }

        self.room_notice(&room_name, username, "left");
        Some(room_name)
    }

    /// Logs and broadcasts a flagged line such as "alice left #general".
    pub fn room_notice(&mut self, room_name: &str, username: &str, verb: &str) {
        let notice = Envelope::notice(username, format!(" {} {}", verb, room_name));

        if let Some(room) = self.rooms.get_mut(room_name) {
            room.append(ChatLine::from_meta(&notice.meta, false));
            room.broadcast(&self.users, &notice, &[]);
        }
    }

    /// Sends a notice to every active staff member except `actor`.
    pub fn notify_staff(&self, actor: &str, text: &str) -> usize {
        let notice = Envelope::notice(actor, text);
        self.users
            .values()
            .filter(|member| member.active && member.role.is_staff())
            .filter(|member| member.username != actor)
            .filter(|member| member.push(notice.clone()))
            .count()
    }

    pub fn push_to(&self, username: &str, envelope: Envelope) -> bool {
        self.users
            .get(username)
            .map_or(false, |member| member.push(envelope))
    }

    /// Pushes a termination notice to every active member except `actor`.
    pub fn announce_shutdown(&self, actor: &str, reason: &str) {
        for username in self.active_usernames(actor) {
            let mut notice = Envelope::new(
                MsgMetadata::new(username.clone(), "/quit"),
                Command::Quit {
                    room: self.current_room_of(&username),
                },
            );
            notice.succeed(reason);
            self.push_to(&username, notice);
        }
    }

    /// Usernames of every active member except `except`.
    pub fn active_usernames(&self, except: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .users
            .values()
            .filter(|member| member.active && member.username != except)
            .map(|member| member.username.clone())
            .collect();
        names.sort();
        names
    }

    /// True when every room member points back at the room and every
    /// member's current room lists it.
    pub fn membership_consistent(&self) -> bool {
        let rooms_agree = self.rooms.values().all(|room| {
            room.members.iter().all(|name| {
                self.users
                    .get(name)
                    .map_or(false, |member| member.current_room == room.name)
            })
        });

        let members_agree = self.users.values().all(|member| {
            !member.in_room()
                || self
                    .rooms
                    .get(&member.current_room)
                    .map_or(false, |room| room.contains(&member.username))
        });

        rooms_agree && members_agree
    }
}

/// Leave envelope pushed to a member removed from a room by someone else.
pub fn forced_leave(username: &str, room: &str, reason: &str) -> Envelope {
    let mut envelope = Envelope::new(
        MsgMetadata::new(username, "/leave"),
        Command::Leave {
            room: room.to_string(),
            forced: true,
        },
    );
    envelope.succeed(reason);
    envelope
}

fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.is_empty() {
        return Err("Username cannot be empty");
    }
    if username.chars().any(char::is_whitespace) {
        return Err("Username cannot contain spaces");
    }
    if username.starts_with(COMMAND_MARKER) || username.starts_with(ROOM_MARKER) {
        return Err("Username cannot start with / or #");
    }
    Ok(())
}
