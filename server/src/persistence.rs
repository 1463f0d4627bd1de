//! JSON snapshot of users, rooms and the audit trail.
//!
//! Only durable data is written: roles, room visibility and logs. Presence,
//! room membership and session plumbing start empty after a restore.

use crate::audit::AuditEntry;
use crate::error::ServerError;
use crate::member::Member;
use crate::room::Room;
use crate::state::ServerState;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use shared::{ChatLine, Role};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub users: BTreeMap<String, PersistedUser>,
    pub rooms: BTreeMap<String, PersistedRoom>,
    pub log: Vec<AuditEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedUser {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRoom {
    pub name: String,
    pub permission: Role,
    pub log: Vec<ChatLine>,
}

impl ServerState {
    pub fn to_snapshot(&self) -> Snapshot {
        let users = self
            .users
            .values()
            .map(|member| {
                (
                    member.username.clone(),
                    PersistedUser {
                        username: member.username.clone(),
                        role: member.role,
                    },
                )
            })
            .collect();

        let rooms = self
            .rooms
            .values()
            .map(|room| {
                (
                    room.name.clone(),
                    PersistedRoom {
                        name: room.name.clone(),
                        permission: room.min_role,
                        log: room.log.clone(),
                    },
                )
            })
            .collect();

        Snapshot {
            users,
            rooms,
            log: self.audit.clone(),
        }
    }

    /// Rebuilds registries from a snapshot. Every user comes back inactive.
    pub fn from_snapshot(snapshot: Snapshot, push_capacity: usize) -> Self {
        let mut state = ServerState::empty(push_capacity);

        for (name, persisted) in snapshot.rooms {
            let mut room = Room::new(name, persisted.permission);
            room.log = persisted.log;
            state.insert_room(room);
        }

        for (name, persisted) in snapshot.users {
            let mut member = Member::new(name.clone(), persisted.role);
            member.refresh_access(&state.rooms);
            state.users.insert(name, member);
        }

        state.audit = snapshot.log;
        state
    }
}

/// Writes the snapshot next to `path` and renames it into place.
pub fn save(state: &ServerState, path: &Path) -> Result<(), ServerError> {
    let json = serde_json::to_string_pretty(&state.to_snapshot())?;

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    fs::write(&temp, json)?;
    fs::rename(&temp, path)?;

    info!("Saved server state to {}", path.display());
    Ok(())
}

/// Reads a snapshot. A missing file is not an error.
pub fn load(path: &Path) -> Result<Option<Snapshot>, ServerError> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No snapshot at {}, starting fresh", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Some(serde_json::from_str(&json)?))
}
