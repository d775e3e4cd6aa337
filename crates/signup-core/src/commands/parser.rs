//! Bot command parsing.
//!
//! Recognizes `/signup`, `/checkme`, `/checkdate` and `/cancel`, optionally
//! addressed to a bot (`/signup@SignupBot`). Arguments are split with shell
//! word rules so a quoted label stays one argument.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// `/command` or `/command@botname` as the first word of a message.
static COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_]+)(?:@([A-Za-z0-9_]+))?$").unwrap());

/// A recognized bot command with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reserve `num_participants` places on `date`.
    Signup { date: String, num_participants: u32 },

    /// List the sender's reservations.
    CheckMe,

    /// List everyone signed up for `date`.
    CheckDate { date: String },

    /// Cancel the sender's reservation for `date`.
    Cancel { date: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Signup { .. } => "signup",
            Command::CheckMe => "checkme",
            Command::CheckDate { .. } => "checkdate",
            Command::Cancel { .. } => "cancel",
        }
    }
}

/// A recognized command whose arguments don't make sense.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("/{command} needs a date")]
    MissingDate { command: &'static str },

    #[error("invalid participant count: {0}")]
    InvalidParticipants(String),
}

/// Parse message text into a command.
///
/// Returns `None` for plain text, unknown commands, and commands addressed
/// to a different bot than `bot_username`.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<Result<Command, CommandError>> {
    let text = text.trim();
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };

    let captures = COMMAND_RE.captures(head)?;
    let name = captures.get(1)?.as_str().to_lowercase();

    if let (Some(addressed), Some(me)) = (captures.get(2), bot_username) {
        if !addressed.as_str().eq_ignore_ascii_case(me) {
            return None;
        }
    }

    let args = split_args(rest);
    let mut args = args.into_iter();

    let command = match name.as_str() {
        "signup" => {
            let Some(date) = args.next() else {
                return Some(Err(CommandError::MissingDate { command: "signup" }));
            };
            let num_participants = match args.next() {
                Some(raw) => match raw.parse::<u32>() {
                    Ok(n) if n > 0 => n,
                    _ => return Some(Err(CommandError::InvalidParticipants(raw))),
                },
                None => 1,
            };
            Command::Signup {
                date,
                num_participants,
            }
        }
        "checkme" => Command::CheckMe,
        "checkdate" => match args.next() {
            Some(date) => Command::CheckDate { date },
            None => return Some(Err(CommandError::MissingDate { command: "checkdate" })),
        },
        "cancel" => match args.next() {
            Some(date) => Command::Cancel { date },
            None => return Some(Err(CommandError::MissingDate { command: "cancel" })),
        },
        _ => return None,
    };

    Some(Ok(command))
}

/// Split arguments with shell word rules, falling back to whitespace when
/// quoting is unbalanced.
fn split_args(rest: &str) -> Vec<String> {
    shlex::split(rest)
        .unwrap_or_else(|| rest.split_whitespace().map(str::to_string).collect())
        .into_iter()
        .filter(|arg| !arg.is_empty())
        .collect()
}
