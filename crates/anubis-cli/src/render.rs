use chrono::Local;

use anubis_core::notice::Notice;
use anubis_core::password::PasswordStrength;
use anubis_core::registration::{FieldState, FieldStatus, RegistrationForm};
use anubis_types::models::{Channel, ChannelKind, Message, PresenceStatus, Server, UserPresence};

pub fn notice(notice: &Notice) -> String {
    format!("{} {}: {}", notice.level.icon(), notice.level.title(), notice.text)
}

pub fn message(message: &Message, author: &str) -> String {
    let time = message.created_at.with_timezone(&Local).format("%H:%M");
    let edited = if message.edited { " (edited)" } else { "" };
    format!("[{}] {}: {}{}", time, author, message.content, edited)
}

pub fn field(label: &str, state: &FieldState) -> String {
    let mark = match state.status {
        FieldStatus::Valid => "✓",
        FieldStatus::Invalid => "✗",
        FieldStatus::Checking => "…",
        FieldStatus::Unchecked => " ",
    };
    format!("  {} {:<9} {}", mark, label, state.message)
}

pub fn form(form: &RegistrationForm, strength: PasswordStrength) -> Vec<String> {
    let mut lines = vec![
        field("username", &form.username),
        field("email", &form.email),
        field("password", &form.password),
        field("confirm", &form.confirm),
    ];
    let filled = "#".repeat(strength.value() as usize);
    let empty = "-".repeat((PasswordStrength::MAX_SCORE - strength.value()) as usize);
    lines.push(format!(
        "  strength  [{}{}] {} ({})",
        filled,
        empty,
        strength.label(),
        strength.color()
    ));
    lines
}

pub fn servers(servers: &[Server], current: Option<&Server>) -> Vec<String> {
    servers
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let marker = if current.is_some_and(|c| c.id == s.id) { "*" } else { " " };
            format!("{}{:>3}. {}", marker, i + 1, s.name)
        })
        .collect()
}

pub fn channels(channels: &[Channel], active: Option<&Channel>) -> Vec<String> {
    channels
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let marker = if active.is_some_and(|a| a.id == c.id) { "*" } else { " " };
            let prefix = match c.kind {
                ChannelKind::Text => "#",
                ChannelKind::Voice => "🔊 ",
            };
            format!("{}{:>3}. {}{}", marker, i + 1, prefix, c.name)
        })
        .collect()
}

pub fn roster(roster: &[UserPresence]) -> Vec<String> {
    roster
        .iter()
        .map(|u| {
            let dot = match u.status {
                PresenceStatus::Online => "●",
                PresenceStatus::Idle => "◐",
                PresenceStatus::Offline => "○",
            };
            format!("  {} {}", dot, u.username)
        })
        .collect()
}
