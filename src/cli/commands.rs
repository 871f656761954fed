use std::io::{self, Write};
use thiserror::Error;

use crate::core::Node;
use crate::storage::HashUtils;

pub const HELP: &str = "\
Commands:
  put <value>, p <value>   store a value in the network and print its key
  get <hash>, g <hash>     look up the value stored under a 40 character key
  ping <host:port>         ping a peer and add it to the routing table
  info                     show this node's id, contacts, keys and counters
  help, h                  show this help
  exit, e                  stop the node";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put(String),
    Get(String),
    Ping(String),
    Info,
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error("No argument!")]
    NoArgument,

    #[error("Invalid command!")]
    InvalidCommand,

    #[error("Invalid hash! Length needs to be 40 characters long.")]
    InvalidHash,
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ShellError> {
    let mut words = line.split_whitespace();
    let name = match words.next() {
        Some(name) => name,
        None => return Ok(None),
    };
    let args: Vec<&str> = words.collect();

    let single = |args: &[&str]| match args {
        [arg] => Ok(arg.to_string()),
        _ => Err(ShellError::NoArgument),
    };

    let command = match name {
        "put" | "p" if args.is_empty() => return Err(ShellError::NoArgument),
        "put" | "p" => Command::Put(args.join(" ")),
        "get" | "g" => Command::Get(single(&args)?),
        "ping" => Command::Ping(single(&args)?),
        "info" => Command::Info,
        "help" | "h" => Command::Help,
        "exit" | "e" => Command::Exit,
        _ => return Err(ShellError::InvalidCommand),
    };
    Ok(Some(command))
}

/// Run a command against `node`, writing its output to `out`. Returns false
/// when the shell should stop.
pub async fn execute<W: Write>(node: &Node, command: Command, out: &mut W) -> io::Result<bool> {
    match command {
        Command::Put(value) => match node.store_value(&value).await {
            Ok(key) => writeln!(out, "Stored with key {}", key)?,
            Err(e) => writeln!(out, "Store failed: {}", e)?,
        },
        Command::Get(hash) => {
            if !HashUtils::is_valid_key(&hash) {
                writeln!(out, "{}", ShellError::InvalidHash)?;
            } else {
                match node.find_value(&hash).await {
                    Ok(Some(value)) => writeln!(out, "Value = {}", value)?,
                    Ok(None) => writeln!(out, "Value not found")?,
                    Err(e) => writeln!(out, "Lookup failed: {}", e)?,
                }
            }
        }
        Command::Ping(address) => match node.ping_address(&address).await {
            Ok(id) => writeln!(out, "Pong from {}", id)?,
            Err(e) => writeln!(out, "Ping failed: {}", e)?,
        },
        Command::Info => writeln!(out, "{}", node.info().await)?,
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Exit => return Ok(false),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;

    async fn lone_node() -> Node {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Config::default()
        };
        let node = Node::new(config).await.unwrap();
        node.start().await.unwrap();
        node
    }

    async fn run(node: &Node, line: &str) -> String {
        let mut out = Vec::new();
        match parse(line) {
            Ok(Some(command)) => {
                execute(node, command, &mut out).await.unwrap();
            }
            Ok(None) => {}
            Err(e) => writeln!(out, "{}", e).unwrap(),
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("put hello").unwrap(), Some(Command::Put("hello".into())));
        assert_eq!(
            parse("p hello world").unwrap(),
            Some(Command::Put("hello world".into()))
        );
        assert_eq!(parse("g abc").unwrap(), Some(Command::Get("abc".into())));
        assert_eq!(
            parse("ping 10.0.8.1:8080").unwrap(),
            Some(Command::Ping("10.0.8.1:8080".into()))
        );
        assert_eq!(parse("  info ").unwrap(), Some(Command::Info));
        assert_eq!(parse("h").unwrap(), Some(Command::Help));
        assert_eq!(parse("e").unwrap(), Some(Command::Exit));
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("put"), Err(ShellError::NoArgument));
        assert_eq!(parse("get"), Err(ShellError::NoArgument));
        assert_eq!(parse("get a b"), Err(ShellError::NoArgument));
        assert_eq!(parse("ping"), Err(ShellError::NoArgument));
        assert_eq!(parse("jump"), Err(ShellError::InvalidCommand));
        assert_eq!(ShellError::NoArgument.to_string(), "No argument!");
        assert_eq!(ShellError::InvalidCommand.to_string(), "Invalid command!");
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let node = lone_node().await;

        let output = run(&node, "put hello shell").await;
        let key = HashUtils::content_key(b"hello shell");
        assert_eq!(output.trim(), format!("Stored with key {}", key));

        let output = run(&node, &format!("get {}", key)).await;
        assert_eq!(output.trim(), "Value = hello shell");
    }

    #[tokio::test]
    async fn test_get_rejects_short_hash() {
        let node = lone_node().await;
        let output = run(&node, "get abc").await;
        assert_eq!(
            output.trim(),
            "Invalid hash! Length needs to be 40 characters long."
        );
    }

    #[tokio::test]
    async fn test_info_help_and_exit() {
        let node = lone_node().await;

        let output = run(&node, "info").await;
        assert!(output.contains(&node.id().to_hex()));
        assert!(output.contains("Status: active"));

        let output = run(&node, "help").await;
        assert!(output.contains("put <value>"));

        let mut out = Vec::new();
        assert!(!execute(&node, Command::Exit, &mut out).await.unwrap());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let node = lone_node().await;
        assert_eq!(run(&node, "dance").await.trim(), "Invalid command!");
    }
}
