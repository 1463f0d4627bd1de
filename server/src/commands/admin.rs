use super::authorize;
use crate::room::Room;
use crate::state::{forced_leave, ServerState};
use log::info;
use shared::{Command, Envelope, MsgMetadata, Role, ROOM_MARKER};

pub fn kick_ban(state: &mut ServerState, envelope: &mut Envelope) {
    let Command::KickBan { ban, .. } = envelope.command else {
        return;
    };
    let verb = if ban { "/ban" } else { "/kick" };
    let arity_ok = envelope.meta.arg_count == 1;
    let Some(actor_role) = authorize(state, envelope, verb, arity_ok, Role::Admin) else {
        return;
    };

    let actor = envelope.meta.username.clone();
    let target = envelope.meta.args()[0].to_string();

    let Some(member) = state.users.get(&target) else {
        envelope.fail("User does not exist");
        return;
    };
    if !ban && !member.active {
        envelope.fail(format!("{} is not online", target));
        return;
    }
    if member.role >= actor_role {
        envelope.fail(format!("Cannot {} a user of equal or higher role", &verb[1..]));
        return;
    }
    if ban && member.role == Role::Banned {
        envelope.fail(format!("{} is already banned", target));
        return;
    }
    let online = member.active;

    let (past, reason) = if ban {
        ("banned", format!("You have been banned by {}", actor))
    } else {
        ("kicked", format!("You have been kicked by {}", actor))
    };

    if online {
        state.force_out(&target, &reason);
    }
    if ban {
        if let Some(member) = state.users.get_mut(&target) {
            member.role = Role::Banned;
            member.refresh_access(&state.rooms);
        }
    }

    info!("{} {} {}", actor, past, target);
    state.record(format!("{} {} {}", actor, past, target));
    state.notify_staff(&actor, &format!(" {} {}", past, target));

    envelope.succeed(format!("{} was {} successfully", target, past));
    envelope.command = Command::KickBan { target, ban };
}

pub fn unban(state: &mut ServerState, envelope: &mut Envelope) {
    let arity_ok = envelope.meta.arg_count == 1;
    if authorize(state, envelope, "/unban", arity_ok, Role::Admin).is_none() {
        return;
    }

    let actor = envelope.meta.username.clone();
    let target = envelope.meta.args()[0].to_string();

    let Some(member) = state.users.get_mut(&target) else {
        envelope.fail("User does not exist");
        return;
    };
    if member.role != Role::Banned {
        envelope.fail(format!("{} is not banned", target));
        return;
    }

    member.role = Role::Member;
    member.refresh_access(&state.rooms);

    state.record(format!("{} unbanned {}", actor, target));
    state.notify_staff(&actor, &format!(" unbanned {}", target));

    envelope.succeed(format!("{} was unbanned successfully", target));
    envelope.command = Command::Unban { target };
}

pub fn create(state: &mut ServerState, envelope: &mut Envelope) {
    let arity_ok = matches!(envelope.meta.arg_count, 1 | 2);
    let Some(actor_role) = authorize(state, envelope, "/create", arity_ok, Role::Admin) else {
        return;
    };

    let actor = envelope.meta.username.clone();
    let args = envelope.meta.args();
    let name = args[0].to_string();
    let visibility = match args.get(1) {
        Some(keyword) => Role::from_visibility(keyword),
        None => Some(Role::Member),
    };

    if !name.starts_with(ROOM_MARKER) || name.len() < 2 {
        envelope.fail(format!("Room names must start with {}", ROOM_MARKER));
        return;
    }
    if state.rooms.contains_key(&name) {
        envelope.fail("Room already exists");
        return;
    }
    let Some(visibility) = visibility else {
        envelope.fail("Room visibility must be member, staff or owner");
        return;
    };
    if visibility > actor_role {
        envelope.fail("Cannot create a room above your own role");
        return;
    }

    state.insert_room(Room::new(name.clone(), visibility));

    for member in state.users.values_mut() {
        let (added, _) = member.refresh_access(&state.rooms);
        if member.username != actor && added.contains(&name) {
            member.push(room_update(&actor, &name, true));
        }
    }

    state.record(format!("{} created {} ({})", actor, name, visibility));
    state.notify_staff(&actor, &format!(" created {}", name));

    envelope.succeed(format!("Created {} ({})", name, visibility));
    envelope.command = Command::Create {
        room: name,
        visibility,
    };
}

pub fn delete(state: &mut ServerState, envelope: &mut Envelope) {
    let arity_ok = envelope.meta.arg_count == 1;
    let Some(actor_role) = authorize(state, envelope, "/delete", arity_ok, Role::Admin) else {
        return;
    };

    let actor = envelope.meta.username.clone();
    let name = envelope.meta.args()[0].to_string();

    let occupants = match state.rooms.get(&name) {
        Some(room) if room.min_role <= actor_role => room.usernames(),
        _ => {
            envelope.fail("Room does not exist");
            return;
        }
    };

    let reason = format!("{} was deleted by {}", name, actor);
    for username in &occupants {
        if let Some(member) = state.users.get_mut(username) {
            member.current_room.clear();
            if *username != actor {
                member.push(forced_leave(username, &name, &reason));
            }
        }
    }
    state.rooms.remove(&name);

    for member in state.users.values_mut() {
        let (_, removed) = member.refresh_access(&state.rooms);
        if member.username != actor && removed.contains(&name) {
            member.push(room_update(&actor, &name, false));
        }
    }

    state.record(format!("{} deleted {}", actor, name));
    state.notify_staff(&actor, &format!(" deleted {}", name));

    envelope.succeed(format!("Deleted {}", name));
    envelope.command = Command::Delete {
        in_room: occupants.contains(&actor),
        room: name,
    };
}

pub fn promote_demote(state: &mut ServerState, envelope: &mut Envelope) {
    let Command::PromoteDemote { promote, .. } = envelope.command else {
        return;
    };
    let verb = if promote { "/promote" } else { "/demote" };
    let arity_ok = envelope.meta.arg_count == 1;
    if authorize(state, envelope, verb, arity_ok, Role::Owner).is_none() {
        return;
    }

    let actor = envelope.meta.username.clone();
    let target = envelope.meta.args()[0].to_string();

    let Some(member) = state.users.get(&target) else {
        envelope.fail("User does not exist");
        return;
    };
    let current = member.role;
    let next = match (promote, current) {
        (_, Role::Banned) => {
            envelope.fail(format!("{} is banned", target));
            return;
        }
        (true, Role::Member) => Role::Admin,
        (true, role) => {
            envelope.fail(format!("{} is already an {}", target, role));
            return;
        }
        (false, Role::Admin) => Role::Member,
        (false, Role::Owner) => {
            envelope.fail("Cannot demote an owner");
            return;
        }
        (false, role) => {
            envelope.fail(format!("{} is already a {}", target, role));
            return;
        }
    };

    let blocked_room = state
        .users
        .get(&target)
        .map(|member| member.current_room.clone())
        .filter(|room| state.rooms.get(room).map_or(false, |room| room.min_role > next));
    if let Some(room) = blocked_room {
        state.leave_room(&target);
        state.push_to(
            &target,
            forced_leave(&target, &room, &format!("You no longer have access to {}", room)),
        );
    }

    let past = if promote { "promoted" } else { "demoted" };
    if let Some(member) = state.users.get_mut(&target) {
        member.role = next;
        let (added, removed) = member.refresh_access(&state.rooms);
        let mut update = Envelope::new(
            MsgMetadata::new(actor.clone(), verb),
            Command::UserUpdate {
                role: next,
                rooms: if promote { added } else { removed },
                promote,
            },
        );
        update.succeed(format!("You have been {} to {} by {}", past, next, actor));
        member.push(update);
    }

    info!("{} {} {} to {}", actor, past, target, next);
    state.record(format!("{} {} {} to {}", actor, past, target, next));
    state.notify_staff(&actor, &format!(" {} {} to {}", past, target, next));

    envelope.succeed(format!("{} was {} to {}", target, past, next));
    envelope.command = Command::PromoteDemote { target, promote };
}

pub fn broadcast(state: &mut ServerState, envelope: &mut Envelope) {
    let arity_ok = envelope.meta.arg_count >= 1;
    if authorize(state, envelope, "/broadcast", arity_ok, Role::Admin).is_none() {
        return;
    }

    let actor = envelope.meta.username.clone();
    let text = envelope
        .meta
        .content
        .trim()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim().to_string())
        .unwrap_or_default();

    let mut announcement = Envelope::new(
        MsgMetadata {
            content: text.clone(),
            ..envelope.meta.clone()
        },
        Command::Broadcast,
    );
    announcement.succeed(text.clone());

    let recipients = state.active_usernames(&actor);
    for username in &recipients {
        state.push_to(username, announcement.clone());
    }

    state.record(format!("{} broadcast: {}", actor, text));
    envelope.succeed(text);
}

pub fn shutdown(state: &mut ServerState, envelope: &mut Envelope) {
    let arity_ok = envelope.meta.arg_count == 0;
    if authorize(state, envelope, "/shutdown", arity_ok, Role::Owner).is_none() {
        return;
    }

    let actor = envelope.meta.username.clone();
    state.announce_shutdown(&actor, &format!("The server was shut down by {}", actor));

    info!("Shutdown requested by {}", actor);
    state.record(format!("{} shut down the server", actor));
    state.shutdown_requested = true;

    envelope.succeed("Server is shutting down");
}

fn room_update(actor: &str, room: &str, created: bool) -> Envelope {
    let mut update = Envelope::new(
        MsgMetadata::new(actor, if created { "/create" } else { "/delete" }),
        Command::RoomUpdate {
            room: room.to_string(),
            created,
        },
    );
    let verb = if created { "created" } else { "deleted" };
    update.succeed(format!("{} was {} by {}", room, verb, actor));
    update
}
