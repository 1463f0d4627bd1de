//! Per-role command and room visibility rules.

use crate::room::Room;
use shared::Role;
use std::collections::BTreeMap;

/// Command verbs with their argument templates and the lowest role allowed
/// to run them, in display order.
const COMMANDS: &[(&str, &str, Role)] = &[
    ("/join", "<room>", Role::Member),
    ("/leave", "", Role::Member),
    ("/listusers", "", Role::Member),
    ("/listrooms", "", Role::Member),
    ("/help", "", Role::Member),
    ("/quit", "", Role::Member),
    ("/kick", "<user>", Role::Admin),
    ("/ban", "<user>", Role::Admin),
    ("/unban", "<user>", Role::Admin),
    ("/create", "<#room> [member|staff|owner]", Role::Admin),
    ("/delete", "<#room>", Role::Admin),
    ("/broadcast", "<message>", Role::Admin),
    ("/promote", "<user>", Role::Owner),
    ("/demote", "<user>", Role::Owner),
    ("/shutdown", "", Role::Owner),
];

/// Usage lines visible at `role`.
pub fn usage_for(role: Role) -> Vec<String> {
    if role == Role::Banned {
        return Vec::new();
    }

    COMMANDS
        .iter()
        .filter(|(_, _, min_role)| *min_role <= role)
        .map(|(verb, args, _)| {
            if args.is_empty() {
                verb.to_string()
            } else {
                format!("{} {}", verb, args)
            }
        })
        .collect()
}

/// Command verbs enabled at `role`.
pub fn commands_for(role: Role) -> Vec<String> {
    if role == Role::Banned {
        return Vec::new();
    }

    COMMANDS
        .iter()
        .filter(|(_, _, min_role)| *min_role <= role)
        .map(|(verb, _, _)| verb.to_string())
        .collect()
}

/// Usage template for a single verb, used in arity errors.
pub fn usage_of(verb: &str) -> String {
    COMMANDS
        .iter()
        .find(|(name, _, _)| *name == verb)
        .map(|(name, args, _)| {
            if args.is_empty() {
                name.to_string()
            } else {
                format!("{} {}", name, args)
            }
        })
        .unwrap_or_else(|| verb.to_string())
}

/// Rooms a member at `role` may see and join, in name order.
pub fn rooms_for(role: Role, rooms: &BTreeMap<String, Room>) -> Vec<String> {
    if role == Role::Banned {
        return Vec::new();
    }

    rooms
        .values()
        .filter(|room| room.min_role <= role)
        .map(|room| room.name.clone())
        .collect()
}
