//! BoxChat CLI
//!
//! Thin wrapper around boxchat-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Create a new account phrase (write it down, it is never stored)
//! boxchat seed generate
//!
//! # Everything else needs the phrase
//! export BOXCHAT_SEED="word1 word2 ... word24"
//!
//! # Show your identity
//! boxchat identity show
//!
//! # Name a peer
//! boxchat contact add <public_key_hex> "Alice"
//!
//! # Contact list with unread counts
//! boxchat chats
//!
//! # Send and receive
//! boxchat send <public_key_hex> "Hello!"
//! boxchat sync --watch
//!
//! # Read a conversation
//! boxchat messages <public_key_hex>
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use zeroize::Zeroizing;

use boxchat_core::identity::short_id;
use boxchat_core::logging::JsonlLayer;
use boxchat_core::{
    generate_seed, validate_seed, ChatEvent, ClientConfig, ContactSummary, Direction, Messenger,
    StoredMessage,
};

/// BoxChat - end-to-end encrypted chat
#[derive(Parser)]
#[command(name = "boxchat")]
#[command(version = "0.1.0")]
#[command(about = "BoxChat - end-to-end encrypted chat")]
#[command(
    long_about = "A local-first, end-to-end encrypted one-to-one chat client. Messages are sealed on this device and relayed as ciphertext."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: ~/.boxchat)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Also write JSONL logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Relay base URL (overrides config.json)
    #[arg(long, env = "BOXCHAT_RELAY_URL", global = true)]
    relay_url: Option<String>,

    /// 24-word account phrase
    #[arg(long, env = "BOXCHAT_SEED", global = true, hide_env_values = true)]
    seed: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Account phrase tools
    Seed {
        #[command(subcommand)]
        action: SeedAction,
    },

    /// Identity information
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Contact management
    Contact {
        #[command(subcommand)]
        action: ContactAction,
    },

    /// Conversations with last message and unread count
    Chats {
        /// Filter by name
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show a conversation
    Messages {
        /// Peer public key (hex)
        peer: String,

        /// Only the newest N messages
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Send a message
    Send {
        /// Recipient public key (hex)
        peer: String,

        /// Message text
        text: String,
    },

    /// Fetch new messages from the relay
    Sync {
        /// Keep polling until Ctrl+C
        #[arg(short, long)]
        watch: bool,
    },

    /// Mark an incoming message as read
    Read {
        /// Message id
        id: String,
    },
}

#[derive(Subcommand)]
enum SeedAction {
    /// Generate a new 24-word phrase
    Generate,

    /// Check a phrase's words and checksum
    Validate {
        /// The phrase, quoted
        phrase: String,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Show the public key derived from the phrase
    Show,
}

#[derive(Subcommand)]
enum ContactAction {
    /// Add a contact or rename an existing one
    Add {
        /// Public key (hex)
        id: String,
        /// Display name
        name: String,
    },

    /// List contacts
    List {
        /// Filter by name
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Remove a contact
    Remove {
        /// Public key (hex)
        id: String,

        /// Also delete the conversation
        #[arg(long)]
        purge: bool,
    },
}

fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let jsonl = match log_dir {
        Some(dir) => Some(
            JsonlLayer::new(dir, "cli")
                .with_context(|| format!("failed to open log directory {}", dir.display()))?,
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(jsonl)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".boxchat")
}

fn format_time(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn print_contact(contact: &ContactSummary) {
    let unread = if contact.unread > 0 {
        format!(" [{}]", contact.unread)
    } else {
        String::new()
    };
    let time = contact.timestamp.map(format_time).unwrap_or_default();
    println!("  {} ({}){}", contact.name, time, unread);
    if let Some(last) = &contact.last_message {
        let prefix = match contact.last_direction {
            Some(Direction::Outgoing) => "You: ",
            _ => "",
        };
        println!("    \"{}{}\"", prefix, last);
    }
    println!("    ID: {}", contact.id);
    println!();
}

fn print_message(messenger: &Messenger, msg: &StoredMessage) -> Result<()> {
    let text = messenger.render(msg)?;
    let sender = match msg.direction() {
        Direction::Outgoing => "You",
        Direction::Incoming => "Them",
    };
    let status = match msg {
        StoredMessage::Outgoing(m) if !m.delivered => " (not delivered)",
        StoredMessage::Incoming(m) if m.read_at.is_none() => " (unread)",
        _ => "",
    };
    println!("  [{}] {}: {}{}", format_time(msg.created_at()), sender, text, status);
    println!("    ID: {}", msg.id());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.log_dir.as_deref())?;

    // Phrase tools need neither a store nor an identity
    if let Commands::Seed { action } = &cli.command {
        match action {
            SeedAction::Generate => {
                let seed = generate_seed();
                println!("{}", seed.as_str());
                println!();
                println!("Write these 24 words down. They are the only way to restore this account.");
            }
            SeedAction::Validate { phrase } => {
                if !validate_seed(phrase) {
                    anyhow::bail!("invalid seed phrase");
                }
                println!("Seed phrase is valid.");
            }
        }
        return Ok(());
    }

    let seed = Zeroizing::new(
        cli.seed
            .context("no seed phrase: pass --seed or set BOXCHAT_SEED")?,
    );

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let mut config = ClientConfig::load(&data_dir)?;
    if let Some(relay_url) = cli.relay_url {
        config.relay_url = relay_url;
    }
    tracing::debug!(data_dir = %data_dir.display(), relay = %config.relay_url, "opening store");
    let messenger = Messenger::open(&data_dir, config)?;

    match cli.command {
        Commands::Seed { .. } => {}

        Commands::Identity { action } => match action {
            IdentityAction::Show => {
                let public_key = messenger.login_offline(&seed)?;
                println!("Identity:");
                println!("  Public key: {}", public_key);
                println!("  Short ID: {}", short_id(&public_key));
                println!("  Relay: {}", messenger.config().relay_url);
                println!("  Data directory: {}", data_dir.display());
            }
        },

        Commands::Contact { action } => {
            messenger.login_offline(&seed)?;
            match action {
                ContactAction::Add { id, name } => {
                    let existed = messenger.get_contact(&id)?.is_some();
                    let contact = messenger.add_or_rename_contact(&id, &name)?;
                    if existed {
                        println!("Renamed contact: {}", contact.name);
                    } else {
                        println!("Added contact: {}", contact.name);
                    }
                    println!("  ID: {}", contact.id);
                }

                ContactAction::List { search } => {
                    messenger.set_search(search.as_deref());
                    let contacts: Vec<ContactSummary> = messenger
                        .contacts()?
                        .into_iter()
                        .filter(|c| c.explicit)
                        .collect();
                    if contacts.is_empty() {
                        println!("No contacts found.");
                    } else {
                        println!("Contacts ({}):", contacts.len());
                        println!();
                        for contact in &contacts {
                            println!("  {} {}", contact.id, contact.name);
                        }
                    }
                }

                ContactAction::Remove { id, purge } => {
                    let removed = messenger.delete_contact(&id, purge)?;
                    if removed {
                        println!("Removed contact: {}", id);
                    } else {
                        println!("No such contact: {}", id);
                    }
                    if purge {
                        println!("Conversation deleted.");
                    }
                }
            }
        }

        Commands::Chats { search } => {
            messenger.login_offline(&seed)?;
            messenger.set_search(search.as_deref());
            let contacts = messenger.contacts()?;
            println!("Conversations:");
            println!();
            if contacts.is_empty() {
                println!("  (no conversations yet)");
                println!();
                println!("  Send a message to start a conversation:");
                println!("  boxchat send <public_key_hex> \"Hello!\"");
            } else {
                for contact in &contacts {
                    print_contact(contact);
                }
            }
        }

        Commands::Messages { peer, limit } => {
            messenger.login_offline(&seed)?;
            messenger.select_contact(&peer)?;
            let messages = messenger.messages();
            let name = messenger
                .get_contact(&peer)?
                .map(|c| c.name)
                .unwrap_or_else(|| boxchat_core::directory::placeholder_name(&peer));

            println!("Conversation with {}:", name);
            println!("Messages: {}", messages.len());
            println!();

            let start = limit.map_or(0, |n| messages.len().saturating_sub(n));
            if messages.is_empty() {
                println!("  (no messages)");
            }
            for msg in &messages[start..] {
                print_message(&messenger, msg)?;
            }
        }

        Commands::Send { peer, text } => {
            messenger.login(&seed).await?;
            let sent = messenger.send_message_to(&peer, &text).await?;
            println!("Message sent.");
            println!("  ID: {}", sent.id());
        }

        Commands::Sync { watch } => {
            messenger.login(&seed).await?;
            let report = messenger.sync_now().await?;
            println!(
                "Fetched {} message(s), {} new, {} acknowledged.",
                report.fetched,
                report.new_ids.len(),
                if report.acknowledged { report.ack_ids.len() } else { 0 }
            );

            if watch {
                let mut events = messenger.subscribe();
                messenger.start();
                println!("Watching for messages. Press Ctrl+C to stop.");
                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Ok(ChatEvent::NewIncoming { id, sender }) => {
                                println!("New message from {} ({})", short_id(&sender), id);
                            }
                            Ok(ChatEvent::PollStatusChanged { available }) => {
                                if available {
                                    println!("Relay reachable again.");
                                } else {
                                    println!("Relay unreachable, retrying.");
                                }
                            }
                            Ok(_) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        },
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
                messenger.shutdown().await;
            }
        }

        Commands::Read { id } => {
            messenger.login_offline(&seed)?;
            if messenger.mark_message_as_read(&id)? {
                println!("Marked as read: {}", id);
            } else {
                println!("Nothing to mark: {}", id);
            }
        }
    }

    Ok(())
}
