//! Interactive shell for a running node

pub mod commands;

pub use commands::{Command, HELP, ShellError, execute, parse};

use log::{debug, warn};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::core::Node;

/// Read commands from stdin until `exit` or end of input.
pub async fn run_shell(node: &Node) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    writeln!(stdout, "Type 'help' for a list of commands.")?;
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => {
                debug!("Shell input closed");
                return Ok(());
            }
        };

        match parse(&line) {
            Ok(Some(command)) => {
                if !execute(node, command, &mut stdout).await? {
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Bad shell input {:?}: {}", line, e);
                writeln!(stdout, "{}", e)?;
            }
        }
    }
}
