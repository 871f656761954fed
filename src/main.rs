use clap::{Parser, Subcommand};
use kademlia_dht::cli;
use kademlia_dht::utils::setup_logging;
use kademlia_dht::{Config, Node, Result};
use log::{LevelFilter, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kademlia-dht")]
#[command(about = "A Kademlia distributed hash table node")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,
    /// Append logs to this file instead of stdout
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node and open the interactive shell
    Start {
        /// Interface to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// UDP port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Fixed node id (40 hex characters), random if omitted
        #[arg(long)]
        id: Option<String>,
        /// Bootstrap peer address (host:port)
        #[arg(short, long)]
        bootstrap: Option<String>,
        /// Id of the bootstrap peer
        #[arg(long)]
        bootstrap_id: Option<String>,
        /// Lookup concurrency
        #[arg(long, default_value = "3")]
        alpha: usize,
        /// Run without the shell until Ctrl+C
        #[arg(long)]
        no_shell: bool,
    },
    /// Store a value through a bootstrap peer and print its key
    Put {
        value: String,
        /// Bootstrap peer address (host:port)
        #[arg(short, long)]
        bootstrap: String,
    },
    /// Look up a value by key through a bootstrap peer
    Get {
        hash: String,
        /// Bootstrap peer address (host:port)
        #[arg(short, long)]
        bootstrap: String,
    },
}

fn client_config(bootstrap: String) -> Config {
    Config {
        port: 0,
        bootstrap_peer: Some(bootstrap),
        ..Config::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level, cli.log_file.as_deref());

    match cli.command {
        Commands::Start {
            host,
            port,
            id,
            bootstrap,
            bootstrap_id,
            alpha,
            no_shell,
        } => {
            let defaults = Config::default();
            let config = Config {
                host,
                port,
                node_id: id,
                bootstrap_peer: bootstrap,
                bootstrap_id: bootstrap_id.unwrap_or(defaults.bootstrap_id),
                alpha,
                ..defaults
            };

            let node = Node::new(config).await?;
            node.start().await?;

            if no_shell {
                tokio::signal::ctrl_c().await?;
                info!("Ctrl+C received, shutting down");
            } else {
                tokio::select! {
                    result = cli::run_shell(&node) => result?,
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl+C received, shutting down");
                    }
                }
            }
            node.shutdown().await;
        }
        Commands::Put { value, bootstrap } => {
            let node = Node::new(client_config(bootstrap)).await?;
            node.start().await?;
            let key = node.store_value(&value).await?;
            println!("{}", key);
            node.shutdown().await;
        }
        Commands::Get { hash, bootstrap } => {
            let node = Node::new(client_config(bootstrap)).await?;
            node.start().await?;
            match node.find_value(&hash).await? {
                Some(value) => println!("{}", value),
                None => println!("Value not found"),
            }
            node.shutdown().await;
        }
    }

    Ok(())
}
