use pubchat::{Broadcast, Session};
use pubchat::transport::CommandTransport;
use std::fmt;

/// One line of user input, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(String),
    Users,
    Channels,
    Create(String),
    Publish { channel: String, text: String },
    Message { user: String, text: String },
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Known command with the wrong number of arguments.
    Usage(&'static str),
    Unknown(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Usage(usage) => write!(f, "Usage: {usage}"),
            ParseError::Unknown(cmd) => write!(f, "Unknown command: {cmd}"),
        }
    }
}

impl std::error::Error for ParseError {}

pub const PROMPT: &str = "> ";

/// A broadcast as printed while the prompt may already be on screen:
/// return to column 0, clear the line, print, then redraw the prompt.
pub fn broadcast_line(broadcast: &Broadcast) -> String {
    format!("\r\x1b[2K{broadcast}\n{PROMPT}")
}

pub const HELP: &[&str] = &[
    "  login <name>           - log in",
    "  users                  - list users",
    "  channels               - list channels",
    "  create <channel>       - create a channel",
    "  pub <channel> <text>   - publish to a channel",
    "  msg <user> <text>      - send a private message",
    "  quit                   - exit",
];

/// Parse a line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&name, args)) = parts.split_first() else {
        return Ok(None);
    };

    let command = match name {
        "login" => Command::Login(first_arg(args, "login <name>")?),
        "users" => Command::Users,
        "channels" => Command::Channels,
        "create" => Command::Create(first_arg(args, "create <channel>")?),
        "pub" => {
            let (channel, text) = target_and_text(args, "pub <channel> <text>")?;
            Command::Publish { channel, text }
        }
        "msg" => {
            let (user, text) = target_and_text(args, "msg <user> <text>")?;
            Command::Message { user, text }
        }
        "quit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn first_arg(args: &[&str], usage: &'static str) -> Result<String, ParseError> {
    args.first()
        .map(|s| s.to_string())
        .ok_or(ParseError::Usage(usage))
}

fn target_and_text(args: &[&str], usage: &'static str) -> Result<(String, String), ParseError> {
    match args {
        [target, rest @ ..] if !rest.is_empty() => Ok((target.to_string(), rest.join(" "))),
        _ => Err(ParseError::Usage(usage)),
    }
}

/// Whether the prompt loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Run a parsed command and return the lines to show the user. Errors are
/// rendered, not returned: the shell keeps going either way.
pub async fn execute<T: CommandTransport>(
    session: &mut Session<T>,
    command: Command,
) -> (Flow, String) {
    let output = match command {
        Command::Login(name) => match session.login(&name).await {
            Ok(()) => format!("Logged in as: {name}"),
            Err(e) => format!("Error: {e}"),
        },
        Command::Users => match session.list_users().await {
            Ok(users) => format!("Users: {users:?}"),
            Err(e) => format!("Error: {e}"),
        },
        Command::Channels => match session.list_channels().await {
            Ok(channels) => format!("Channels: {channels:?}"),
            Err(e) => format!("Error: {e}"),
        },
        Command::Create(name) => match session.create_channel(&name).await {
            Ok(()) => format!("Channel '{name}' created"),
            Err(e) => format!("Error: {e}"),
        },
        Command::Publish { channel, text } => match session.publish(&channel, &text).await {
            Ok(()) => format!("Message published to '{channel}'"),
            Err(e) => format!("Error: {e}"),
        },
        Command::Message { user, text } => match session.send_private(&user, &text).await {
            Ok(()) => format!("Message sent to '{user}'"),
            Err(e) => format!("Error: {e}"),
        },
        Command::Quit => return (Flow::Quit, "Exiting...".to_string()),
    };
    (Flow::Continue, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubchat::loopback::LoopbackBroker;

    #[test]
    fn parses_every_command() {
        assert_eq!(parse("login alice"), Ok(Some(Command::Login("alice".into()))));
        assert_eq!(parse("users"), Ok(Some(Command::Users)));
        assert_eq!(parse("  channels  "), Ok(Some(Command::Channels)));
        assert_eq!(parse("create general"), Ok(Some(Command::Create("general".into()))));
        assert_eq!(
            parse("pub general hello   there world"),
            Ok(Some(Command::Publish {
                channel: "general".into(),
                text: "hello there world".into(),
            }))
        );
        assert_eq!(
            parse("msg bob hi bob"),
            Ok(Some(Command::Message {
                user: "bob".into(),
                text: "hi bob".into(),
            }))
        );
        assert_eq!(parse("quit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(parse(""), Ok(None));
        assert_eq!(parse("   \t "), Ok(None));
    }

    #[test]
    fn wrong_arity_is_usage() {
        assert_eq!(parse("login"), Err(ParseError::Usage("login <name>")));
        assert_eq!(parse("pub general"), Err(ParseError::Usage("pub <channel> <text>")));
        assert_eq!(parse("msg"), Err(ParseError::Usage("msg <user> <text>")));
        assert_eq!(
            parse("create").unwrap_err().to_string(),
            "Usage: create <channel>"
        );
    }

    #[test]
    fn broadcast_clears_prompt_and_redraws_it() {
        let line = broadcast_line(&Broadcast::Publication {
            user: "alice".into(),
            channel: "general".into(),
            message: "hi".into(),
        });
        assert_eq!(line, "\r\x1b[2K[general] alice: hi\n> ");
    }

    #[test]
    fn unknown_command() {
        assert_eq!(parse("dance now"), Err(ParseError::Unknown("dance".into())));
    }

    #[tokio::test]
    async fn execute_reports_success_and_errors() {
        let broker = LoopbackBroker::new();
        let mut session = Session::new(broker.command());

        let (flow, out) = execute(&mut session, Command::Login("alice".into())).await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, "Logged in as: alice");

        let (_, out) = execute(&mut session, Command::Create("general".into())).await;
        assert_eq!(out, "Channel 'general' created");

        let (_, out) = execute(&mut session, Command::Channels).await;
        assert_eq!(out, r#"Channels: ["general"]"#);

        let (_, out) = execute(
            &mut session,
            Command::Publish {
                channel: "nowhere".into(),
                text: "hi".into(),
            },
        )
        .await;
        assert_eq!(out, "Error: publish failed: channel does not exist");

        let (flow, _) = execute(&mut session, Command::Quit).await;
        assert_eq!(flow, Flow::Quit);
    }
}
