//! Console commands and the one-line status display

use crate::replica::{Mode, ReplicaController};
use shared::Action;
use std::io::{stdin, BufRead};
use std::thread;
use tokio::sync::mpsc::{self, Receiver};

pub const HELP: &str =
    "commands: fill|f, drain|d, heat|h, cool|c, online, offline, status, quit";

/// A parsed console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Action(Action),
    Online,
    Offline,
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parses one console line. Matching ignores case and surrounding
    /// whitespace.
    pub fn parse(input: &str) -> Result<Command, String> {
        let input = input.trim().to_ascii_lowercase();

        match input.as_str() {
            "fill" | "f" => Ok(Command::Action(Action::Fill)),
            "drain" | "d" => Ok(Command::Action(Action::Drain)),
            "heat" | "h" => Ok(Command::Action(Action::Heat)),
            "cool" | "c" => Ok(Command::Action(Action::Cool)),
            "online" | "on" => Ok(Command::Online),
            "offline" | "off" => Ok(Command::Offline),
            "status" | "s" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            "" => Err("empty command".to_string()),
            other => Err(format!("unknown command {:?}", other)),
        }
    }
}

/// Reads stdin lines on a dedicated thread and forwards them to the runtime.
/// The channel closes when stdin reaches end of input.
pub fn console_input_thread() -> Receiver<String> {
    let (sender, receiver) = mpsc::channel(100);
    thread::spawn(move || {
        for line in stdin().lock().lines() {
            let Ok(line) = line else { break };
            if sender.blocking_send(line).is_err() {
                break;
            }
        }
    });
    receiver
}

fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Replica => "ONLINE",
        Mode::LocalSimulation => "OFFLINE",
    }
}

/// One-line status, e.g. `[ONLINE] level= 42 temp=  8 users=3`.
///
/// A replica still waiting for its handshake has no state to show.
pub fn render_status(replica: &ReplicaController) -> String {
    let label = mode_label(replica.mode());
    match replica.state() {
        Some(state) => format!(
            "[{}] {} users={}",
            label,
            state,
            replica.presence_count()
        ),
        None => format!("[{}] waiting for server...", label),
    }
}

/// Multi-line presence listing with this peer's own identity marked
pub fn render_presence(replica: &ReplicaController) -> String {
    let mut lines = vec![format!("{} user(s) connected", replica.presence_count())];
    for identity in replica.presence() {
        let marker = if Some(identity.as_str()) == replica.identity() {
            " (you)"
        } else {
            ""
        };
        lines.push(format!("  User: {}{}", identity, marker));
    }
    lines.join("\n")
}
