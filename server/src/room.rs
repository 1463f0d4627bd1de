//! Rooms: named broadcast domains with a log and a minimum role.

use crate::member::Member;
use shared::{ChatLine, Envelope, Role};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct Room {
    pub name: String,
    /// Usernames; each must have this room as its `current_room`.
    pub members: BTreeSet<String>,
    pub log: Vec<ChatLine>,
    pub min_role: Role,
}

impl Room {
    pub fn new(name: impl Into<String>, min_role: Role) -> Self {
        Self {
            name: name.into(),
            members: BTreeSet::new(),
            log: Vec::new(),
            min_role,
        }
    }

    pub fn add_user(&mut self, username: &str) -> bool {
        self.members.insert(username.to_string())
    }

    pub fn remove_user(&mut self, username: &str) -> bool {
        self.members.remove(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.members.contains(username)
    }

    pub fn usernames(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    pub fn append(&mut self, line: ChatLine) {
        self.log.push(line);
    }

    /// Pushes `envelope` to every member except its author and `exclude`.
    ///
    /// Returns how many members the envelope was queued for.
    pub fn broadcast(
        &self,
        users: &HashMap<String, Member>,
        envelope: &Envelope,
        exclude: &[&str],
    ) -> usize {
        self.members
            .iter()
            .filter(|name| **name != envelope.meta.username)
            .filter(|name| !exclude.contains(&name.as_str()))
            .filter_map(|name| users.get(name))
            .filter(|member| member.push(envelope.clone()))
            .count()
    }
}
