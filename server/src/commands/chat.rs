use super::authorize;
use crate::role::usage_for;
use crate::state::ServerState;
use shared::{ChatLine, Command, Envelope, Role};

pub fn message(state: &mut ServerState, envelope: &mut Envelope) {
    let Command::Message { image } = envelope.command else {
        return;
    };

    let room_name = state.current_room_of(&envelope.meta.username);
    if room_name.is_empty() {
        envelope.fail("User is not currently in a room");
        return;
    }
    if envelope.meta.content.trim().is_empty() {
        envelope.fail("Message is empty");
        return;
    }

    let Some(room) = state.rooms.get_mut(&room_name) else {
        envelope.fail("Room does not exist");
        return;
    };

    envelope.succeed("");
    room.append(ChatLine::from_meta(&envelope.meta, image));
    room.broadcast(&state.users, envelope, &[]);
}

pub fn join(state: &mut ServerState, envelope: &mut Envelope) {
    let arity_ok = envelope.meta.arg_count == 1;
    let Some(role) = authorize(state, envelope, "/join", arity_ok, Role::Member) else {
        return;
    };

    let username = envelope.meta.username.clone();
    let Command::Join { room: target, .. } = &envelope.command else {
        return;
    };
    let target = target.clone();

    let Some(room) = state.rooms.get(&target) else {
        envelope.fail("Room does not exist");
        return;
    };
    if role < room.min_role {
        envelope.fail("User role does not have access to room");
        return;
    }
    if state.current_room_of(&username) == target {
        envelope.fail("User already in specified room");
        return;
    }

    let previous = state.leave_room(&username).unwrap_or_default();
    let history = state.enter_room(&username, &target);

    envelope.succeed(format!("Joined {}", target));
    envelope.command = Command::Join {
        room: target,
        previous,
        log: history,
    };
}

pub fn leave(state: &mut ServerState, envelope: &mut Envelope) {
    let arity_ok = envelope.meta.arg_count == 0;
    if authorize(state, envelope, "/leave", arity_ok, Role::Member).is_none() {
        return;
    }

    let Some(room) = state.leave_room(&envelope.meta.username) else {
        envelope.fail("User not in room");
        return;
    };

    envelope.succeed(format!("Left {}", room));
    envelope.command = Command::Leave {
        room,
        forced: false,
    };
}

pub fn list_users(state: &mut ServerState, envelope: &mut Envelope) {
    let arity_ok = envelope.meta.arg_count == 0;
    if authorize(state, envelope, "/listusers", arity_ok, Role::Member).is_none() {
        return;
    }

    let room_name = state.current_room_of(&envelope.meta.username);
    let Some(room) = state.rooms.get(&room_name) else {
        envelope.fail("User is not currently in a room");
        return;
    };

    let users = room.usernames();
    envelope.succeed(format!("Users in {}: {}", room_name, users.join(" ")));
    envelope.command = Command::ListUsers {
        room: room_name,
        users,
    };
}

pub fn list_rooms(state: &mut ServerState, envelope: &mut Envelope) {
    let arity_ok = envelope.meta.arg_count == 0;
    if authorize(state, envelope, "/listrooms", arity_ok, Role::Member).is_none() {
        return;
    }

    let rooms = state
        .users
        .get(&envelope.meta.username)
        .map(|member| member.available_rooms.clone())
        .unwrap_or_default();

    envelope.succeed(format!("Available rooms: {}", rooms.join(" ")));
    envelope.command = Command::ListRooms { rooms };
}

pub fn help(state: &mut ServerState, envelope: &mut Envelope) {
    if let Command::Help { invalid: true, .. } = envelope.command {
        envelope.fail("Invalid command, enter /help for more information");
        return;
    }

    let role = state
        .role_of(&envelope.meta.username)
        .unwrap_or(Role::Banned);
    envelope.succeed("Available commands:");
    envelope.command = Command::Help {
        invalid: false,
        usage: usage_for(role),
    };
}

pub fn quit(state: &mut ServerState, envelope: &mut Envelope) {
    let room = state
        .end_session(&envelope.meta.username)
        .unwrap_or_default();

    envelope.succeed("You have been disconnected from the server");
    envelope.command = Command::Quit { room };
}

#[cfg(test)]
mod tests {
    use super::super::tests::{drain, fresh, login, run};
    use shared::{Command, DEFAULT_ROOM};

    #[test]
    fn test_message_requires_room() {
        let mut state = fresh();
        let _alice = login(&mut state, "alice");

        let envelope = run(&mut state, "alice", "hello");
        assert!(!envelope.reply.status);
        assert_eq!(
            envelope.reply.message,
            "PERMISSION DENIED: User is not currently in a room"
        );
    }

    #[test]
    fn test_message_broadcast_and_logged() {
        let mut state = fresh();
        let mut alice = login(&mut state, "alice");
        let mut bob = login(&mut state, "bob");
        run(&mut state, "alice", "/join #general");
        run(&mut state, "bob", "/join #general");
        drain(&mut alice);
        drain(&mut bob);

        let envelope = run(&mut state, "alice", "hi bob");
        assert!(envelope.reply.status);
        assert_eq!(envelope.reply.current_room, DEFAULT_ROOM);

        let pushed = drain(&mut bob);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].meta.content, "hi bob");
        assert_eq!(pushed[0].meta.username, "alice");
        assert!(drain(&mut alice).is_empty());

        let log = &state.rooms[DEFAULT_ROOM].log;
        assert_eq!(log.last().unwrap().content, "hi bob");
    }

    #[test]
    fn test_join_returns_previous_and_history() {
        let mut state = fresh();
        state.ensure_owner("root");
        let _root = login(&mut state, "root");

        run(&mut state, "root", "/join #general");
        run(&mut state, "root", "first!");

        let envelope = run(&mut state, "root", "/join #staff");
        assert!(envelope.reply.status);
        match envelope.command {
            Command::Join { room, previous, log } => {
                assert_eq!(room, "#staff");
                assert_eq!(previous, DEFAULT_ROOM);
                assert!(log.is_empty());
            }
            other => panic!("Unexpected command {:?}", other),
        }

        let envelope = run(&mut state, "root", "/join #general");
        match envelope.command {
            Command::Join { log, .. } => {
                let contents: Vec<&str> = log.iter().map(|line| line.content.as_str()).collect();
                assert_eq!(contents, vec![" joined #general", "first!", " left #general"]);
            }
            other => panic!("Unexpected command {:?}", other),
        }
        assert!(state.membership_consistent());
    }

    #[test]
    fn test_join_failures() {
        let mut state = fresh();
        let _alice = login(&mut state, "alice");

        let envelope = run(&mut state, "alice", "/join #nowhere");
        assert_eq!(envelope.reply.message, "PERMISSION DENIED: Room does not exist");

        let envelope = run(&mut state, "alice", "/join");
        assert_eq!(envelope.reply.message, "PERMISSION DENIED: usage: /join <room>");

        run(&mut state, "alice", "/join #general");
        let envelope = run(&mut state, "alice", "/join #general");
        assert_eq!(
            envelope.reply.message,
            "PERMISSION DENIED: User already in specified room"
        );

        let envelope = run(&mut state, "alice", "/join #staff");
        assert_eq!(
            envelope.reply.message,
            "PERMISSION DENIED: User role does not have access to room"
        );
    }

    #[test]
    fn test_leave_and_listusers() {
        let mut state = fresh();
        let _alice = login(&mut state, "alice");
        let _bob = login(&mut state, "bob");

        let envelope = run(&mut state, "alice", "/leave");
        assert_eq!(envelope.reply.message, "PERMISSION DENIED: User not in room");

        run(&mut state, "bob", "/join #general");
        run(&mut state, "alice", "/join #general");
        let envelope = run(&mut state, "alice", "/listusers");
        assert_eq!(
            envelope.command,
            Command::ListUsers {
                room: DEFAULT_ROOM.to_string(),
                users: vec!["alice".to_string(), "bob".to_string()],
            }
        );

        let envelope = run(&mut state, "alice", "/leave");
        assert!(envelope.reply.status);
        assert!(matches!(envelope.command, Command::Leave { forced: false, .. }));

        let envelope = run(&mut state, "alice", "/listusers");
        assert!(!envelope.reply.status);
    }

    #[test]
    fn test_help_depends_on_role() {
        let mut state = fresh();
        state.ensure_owner("root");
        let _alice = login(&mut state, "alice");
        let _root = login(&mut state, "root");

        let member_help = match run(&mut state, "alice", "/help").command {
            Command::Help { usage, .. } => usage,
            other => panic!("Unexpected command {:?}", other),
        };
        let owner_help = match run(&mut state, "root", "/help").command {
            Command::Help { usage, .. } => usage,
            other => panic!("Unexpected command {:?}", other),
        };

        assert!(member_help.iter().all(|line| owner_help.contains(line)));
        assert!(owner_help.iter().any(|line| line == "/shutdown"));
        assert!(!member_help.iter().any(|line| line == "/shutdown"));

        let invalid = run(&mut state, "alice", "/dance");
        assert_eq!(
            invalid.reply.message,
            "PERMISSION DENIED: Invalid command, enter /help for more information"
        );
    }

    #[test]
    fn test_listrooms() {
        let mut state = fresh();
        let _alice = login(&mut state, "alice");
        let envelope = run(&mut state, "alice", "/listrooms");
        assert_eq!(
            envelope.command,
            Command::ListRooms {
                rooms: vec![DEFAULT_ROOM.to_string()]
            }
        );
    }

    #[test]
    fn test_quit_ends_session() {
        let mut state = fresh();
        let mut alice = login(&mut state, "alice");
        let mut bob = login(&mut state, "bob");
        run(&mut state, "bob", "/join #general");
        run(&mut state, "alice", "/join #general");
        drain(&mut bob);

        let envelope = run(&mut state, "alice", "/quit");
        assert!(envelope.reply.status);
        assert_eq!(
            envelope.command,
            Command::Quit {
                room: DEFAULT_ROOM.to_string()
            }
        );
        assert_eq!(envelope.reply.current_room, "");
        assert!(!state.is_active("alice"));
        assert!(alice.done.as_ref().unwrap().is_fired());
        assert!(drain(&mut alice).is_empty());

        let pushed = drain(&mut bob);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].meta.content, " left #general");

        let envelope = run(&mut state, "alice", "/listrooms");
        assert!(!envelope.reply.status);
    }
}
