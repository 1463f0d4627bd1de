//! Line oriented terminal rendering.
//!
//! A terminal cannot repaint a room pane, so room changes are announced as
//! lines and every line is prefixed with the room it belongs to.

use log::warn;
use shared::{ChatLine, ChatView};
use std::io::{self, Write};

const LOBBY: &str = "lobby";

pub struct TerminalView<W: Write> {
    out: W,
    rooms: Vec<String>,
    selected: Option<String>,
    quit: Option<String>,
}

impl TerminalView<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            rooms: Vec::new(),
            selected: None,
            quit: None,
        }
    }

    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Set once the server has ended the session.
    pub fn quit_reason(&self) -> Option<&str> {
        self.quit.as_deref()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print(&mut self, room: &str, text: &str) {
        let label = if room.is_empty() { LOBBY } else { room };
        for line in text.lines() {
            if let Err(e) = writeln!(self.out, "[{}] {}", label, line) {
                warn!("Failed to write to terminal: {}", e);
                return;
            }
        }
        let _ = self.out.flush();
    }
}

impl<W: Write> ChatView for TerminalView<W> {
    fn display(&mut self, room: &str, text: &str) {
        self.print(room, text);
    }

    fn clear_room(&mut self, room: &str) {
        if self.selected.as_deref() == Some(room) {
            self.selected = None;
        }
    }

    fn clear_lobby(&mut self) {}

    fn select_room(&mut self, room: &str) {
        self.selected = Some(room.to_string());
    }

    fn deselect_room(&mut self) {
        self.selected = None;
    }

    fn set_rooms(&mut self, rooms: &[String]) {
        self.rooms = rooms.to_vec();
    }

    fn add_room(&mut self, room: &str) {
        if !self.rooms.iter().any(|known| known == room) {
            self.rooms.push(room.to_string());
            self.rooms.sort();
        }
    }

    fn remove_room(&mut self, room: &str) {
        self.rooms.retain(|known| known != room);
        self.clear_room(room);
    }

    fn show_lobby(&mut self) {
        let rooms = self.rooms.join(" ");
        self.print("", &format!("Available rooms: {}", rooms));
    }

    fn user_quit(&mut self, message: &str) {
        self.print("", message);
        self.quit = Some(message.to_string());
    }

    fn display_image(&mut self, room: &str, url: &str) {
        self.print(room, &format!("[image] {}", url));
    }

    fn display_join_history(&mut self, room: &str, lines: &[ChatLine]) {
        for line in lines {
            self.print(room, &line.format());
        }
    }
}
