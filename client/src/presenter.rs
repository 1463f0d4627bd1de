use shared::{ChatLine, ChatView, Command, Envelope};

/// Renders one envelope from the server onto `view`.
///
/// Failures are shown as their message in the room the server stamped.
/// Successful envelopes are dispatched on their command.
pub fn present(envelope: &Envelope, view: &mut dyn ChatView) {
    let room = envelope.reply.current_room.as_str();
    let message = envelope.reply.message.as_str();

    if !envelope.reply.status {
        view.display(room, message);
        return;
    }

    match &envelope.command {
        Command::Message { image } => {
            let line = ChatLine::from_meta(&envelope.meta, *image);
            view.display(room, &line.format());
            if *image {
                view.display_image(room, &envelope.meta.content);
            }
        }

        Command::Notice => {
            view.display(room, &ChatLine::from_meta(&envelope.meta, false).format());
        }

        Command::Join { room: joined, log, .. } => {
            view.clear_room(joined);
            view.select_room(joined);
            view.display_join_history(joined, log);
            view.display(joined, message);
        }

        Command::Leave { room: left, .. } => {
            view.clear_room(left);
            view.deselect_room();
            view.display("", message);
            view.show_lobby();
        }

        Command::ListRooms { rooms } => {
            view.set_rooms(rooms);
            view.display(room, message);
        }

        Command::Help { usage, .. } => {
            view.display(room, message);
            for line in usage {
                view.display(room, line);
            }
        }

        Command::Quit { .. } => {
            view.clear_lobby();
            view.user_quit(message);
        }

        Command::Create { room: created, .. } => {
            view.add_room(created);
            view.display(room, message);
        }

        Command::Delete {
            room: deleted,
            in_room,
        } => {
            view.remove_room(deleted);
            if *in_room {
                view.deselect_room();
                view.show_lobby();
            }
            view.display(room, message);
        }

        Command::RoomUpdate {
            room: changed,
            created,
        } => {
            if *created {
                view.add_room(changed);
            } else {
                view.remove_room(changed);
            }
            view.display(room, message);
        }

        Command::UserUpdate { rooms, promote, .. } => {
            for changed in rooms {
                if *promote {
                    view.add_room(changed);
                } else {
                    view.remove_room(changed);
                }
            }
            view.display(room, message);
        }

        Command::AuditLog { entries } => {
            for entry in entries {
                view.display(room, entry);
            }
        }

        Command::Broadcast => {
            view.display(
                room,
                &format!("[BROADCAST] {}:  {}", envelope.meta.username, message),
            );
        }

        Command::ListUsers { .. }
        | Command::KickBan { .. }
        | Command::Unban { .. }
        | Command::PromoteDemote { .. }
        | Command::Shutdown => view.display(room, message),
    }
}
