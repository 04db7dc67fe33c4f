use anyhow::{Context, Result, bail};

use anubis_types::models::ChannelKind;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register {
        username: String,
        email: String,
        password: String,
    },
    Login {
        login: String,
        password: String,
    },
    Servers,
    /// 1-based index into the server list.
    Server(usize),
    Channels,
    Channel(usize),
    NewServer(String),
    NewChannel {
        name: String,
        kind: ChannelKind,
    },
    Online,
    Logout,
    Help,
    Quit,
    Say(String),
}

pub const HELP: &str = "\
/register <username> <email> <password>
/login <email-or-username> <password>
/servers              /server <n>
/channels             /channel <n>
/newserver <name>     /newchannel <name> [voice]
/online  /logout  /help  /quit
anything else is sent to the open channel";

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Say(line.to_string()));
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        Ok(match (name, args.as_slice()) {
            ("register", [username, email, password]) => Self::Register {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            },
            ("register", _) => bail!("usage: /register <username> <email> <password>"),
            ("login", [login, password]) => Self::Login {
                login: login.to_string(),
                password: password.to_string(),
            },
            ("login", _) => bail!("usage: /login <email-or-username> <password>"),
            ("servers", []) => Self::Servers,
            ("server", [n]) => Self::Server(index(n)?),
            ("channels", []) => Self::Channels,
            ("channel", [n]) => Self::Channel(index(n)?),
            ("newserver", [_, ..]) => Self::NewServer(args.join(" ")),
            ("newserver", []) => bail!("usage: /newserver <name>"),
            ("newchannel", [name]) => Self::NewChannel {
                name: name.to_string(),
                kind: ChannelKind::Text,
            },
            ("newchannel", [name, "voice"]) => Self::NewChannel {
                name: name.to_string(),
                kind: ChannelKind::Voice,
            },
            ("newchannel", _) => bail!("usage: /newchannel <name> [voice]"),
            ("online", []) => Self::Online,
            ("logout", []) => Self::Logout,
            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => bail!("unknown command /{}, try /help", name),
        })
    }
}

fn index(arg: &str) -> Result<usize> {
    let n: usize = arg
        .parse()
        .with_context(|| format!("{:?} is not a list number", arg))?;
    if n == 0 {
        bail!("lists start at 1");
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            Command::parse("hello there\n").unwrap(),
            Command::Say("hello there".into())
        );
        // Blank lines reach the sync controller, which refuses them.
        assert_eq!(Command::parse("   ").unwrap(), Command::Say("   ".into()));
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(
            Command::parse("/login neo@matrix.io secret1").unwrap(),
            Command::Login {
                login: "neo@matrix.io".into(),
                password: "secret1".into(),
            }
        );
        assert_eq!(Command::parse("/server 2").unwrap(), Command::Server(2));
        assert_eq!(
            Command::parse("/newserver The Construct").unwrap(),
            Command::NewServer("The Construct".into())
        );
        assert_eq!(
            Command::parse("/newchannel lounge voice").unwrap(),
            Command::NewChannel {
                name: "lounge".into(),
                kind: ChannelKind::Voice,
            }
        );
    }

    #[test]
    fn malformed_commands_explain_usage() {
        let err = Command::parse("/login neo").unwrap_err();
        assert!(err.to_string().starts_with("usage: /login"));
        assert!(Command::parse("/channel 0").is_err());
        assert!(Command::parse("/channel two").is_err());
        assert!(Command::parse("/dance").is_err());
    }
}
