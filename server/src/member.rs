//! Per-user records owned by the state actor.

use crate::role::{commands_for, rooms_for};
use crate::room::Room;
use crate::signal::DoneSignal;
use log::{debug, warn};
use shared::{Envelope, Role};
use std::collections::BTreeMap;
use tokio::sync::mpsc::{self, error::TrySendError};

/// A known user, kept for the lifetime of the process.
///
/// `push` and `done` exist only while a connection is live.
#[derive(Debug)]
pub struct Member {
    pub username: String,
    pub role: Role,
    pub active: bool,
    /// Empty while in the lobby.
    pub current_room: String,
    pub available_rooms: Vec<String>,
    pub permissions: Vec<String>,
    /// Identifies the live connection; bumped on every login.
    pub session: u64,
    push: Option<mpsc::Sender<Envelope>>,
    done: Option<DoneSignal>,
}

impl Member {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
            active: false,
            current_room: String::new(),
            available_rooms: Vec::new(),
            permissions: commands_for(role),
            session: 0,
            push: None,
            done: None,
        }
    }

    /// Marks the member live and hands back the session's ends of the
    /// push channel and termination signal.
    pub fn activate(
        &mut self,
        session: u64,
        push_capacity: usize,
    ) -> (mpsc::Receiver<Envelope>, DoneSignal) {
        let (tx, rx) = mpsc::channel(push_capacity.max(1));
        let done = DoneSignal::new();

        self.active = true;
        self.session = session;
        self.current_room.clear();
        self.push = Some(tx);
        self.done = Some(done.clone());

        (rx, done)
    }

    /// Ends the live session: fires `done` and drops the push sender.
    ///
    /// The caller must already have removed the member from its room.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.current_room.clear();
        self.push = None;
        if let Some(done) = self.done.take() {
            done.fire();
        }
    }

    pub fn in_room(&self) -> bool {
        !self.current_room.is_empty()
    }

    /// Queues an envelope for the live session without blocking.
    ///
    /// The envelope is stamped with this member's current room so the client
    /// can route it. Returns false when nothing was queued.
    pub fn push(&self, mut envelope: Envelope) -> bool {
        let Some(push) = &self.push else {
            return false;
        };

        envelope.reply.current_room = self.current_room.clone();
        match push.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(envelope)) => {
                warn!(
                    "Push channel for {} is full, dropping {}",
                    self.username,
                    envelope.command.name()
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Push channel for {} already closed", self.username);
                false
            }
        }
    }

    /// Recomputes room visibility and permissions for the current role.
    ///
    /// Returns the rooms gained and the rooms lost.
    pub fn refresh_access(&mut self, rooms: &BTreeMap<String, Room>) -> (Vec<String>, Vec<String>) {
        let visible = rooms_for(self.role, rooms);

        let added = visible
            .iter()
            .filter(|room| !self.available_rooms.contains(room))
            .cloned()
            .collect();
        let removed = self
            .available_rooms
            .iter()
            .filter(|room| !visible.contains(room))
            .cloned()
            .collect();

        self.available_rooms = visible;
        self.permissions = commands_for(self.role);
        (added, removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MsgMetadata;

    fn rooms() -> BTreeMap<String, Room> {
        let mut rooms = BTreeMap::new();
        rooms.insert("#general".to_string(), Room::new("#general", Role::Member));
        rooms.insert("#staff".to_string(), Room::new("#staff", Role::Admin));
        rooms
    }

    #[test]
    fn test_member_creation() {
        let member = Member::new("alice", Role::Member);
        assert_eq!(member.username, "alice");
        assert!(!member.active);
        assert!(!member.in_room());
        assert!(member.permissions.contains(&"/join".to_string()));
    }

    #[test]
    fn test_push_stamps_current_room() {
        let mut member = Member::new("alice", Role::Member);
        let (mut rx, _done) = member.activate(1, 4);
        member.current_room = "#general".to_string();

        assert!(member.push(Envelope::notice("bob", " joined #general")));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.reply.current_room, "#general");
    }

    #[test]
    fn test_push_when_full_drops() {
        let mut member = Member::new("alice", Role::Member);
        let (_rx, _done) = member.activate(1, 1);

        assert!(member.push(Envelope::notice("bob", "one")));
        assert!(!member.push(Envelope::notice("bob", "two")));
    }

    #[test]
    fn test_push_inactive_member() {
        let member = Member::new("alice", Role::Member);
        assert!(!member.push(Envelope::notice("bob", "hi")));
    }

    #[test]
    fn test_deactivate_fires_done_once() {
        let mut member = Member::new("alice", Role::Member);
        let (mut rx, done) = member.activate(7, 4);
        member.current_room = "#general".to_string();

        member.deactivate();
        assert!(done.is_fired());
        assert!(!member.active);
        assert!(!member.in_room());
        assert!(rx.try_recv().is_err());

        // Second call has nothing left to close.
        member.deactivate();
        assert!(!member.push(Envelope::new(
            MsgMetadata::new("bob", "late"),
            shared::Command::Message { image: false }
        )));
    }

    #[test]
    fn test_refresh_access_reports_delta() {
        let rooms = rooms();
        let mut member = Member::new("bob", Role::Member);
        let (added, removed) = member.refresh_access(&rooms);
        assert_eq!(added, vec!["#general"]);
        assert!(removed.is_empty());

        member.role = Role::Admin;
        let (added, removed) = member.refresh_access(&rooms);
        assert_eq!(added, vec!["#staff"]);
        assert!(removed.is_empty());
        assert!(member.permissions.contains(&"/kick".to_string()));

        member.role = Role::Member;
        let (added, removed) = member.refresh_access(&rooms);
        assert!(added.is_empty());
        assert_eq!(removed, vec!["#staff"]);
    }
}
