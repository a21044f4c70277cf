//! PawnHub terminal client.
//!
//! Joins a hosted match and plays it from the terminal. Moves are read from
//! stdin as `<from> <to>`; the board is printed whenever it changes.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pawnhub_client::shared::{determine_is_game_id, PlayState};
use pawnhub_client::storage::ClientSettings;
use pawnhub_client::{ClientConfig, ClientError, Connection, Session, SessionState, SessionStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pawnhub", about = "Play PawnHub chess matches from the terminal")]
struct Args {
    /// Connect to the local development server.
    #[arg(long)]
    local: bool,

    /// Remember the server choice (`--local` or not) for future runs.
    #[arg(long, default_value_t = false)]
    remember: bool,

    /// Override the endpoint of the selected server.
    #[arg(long)]
    server: Option<String>,

    /// Seconds a dropped match may take to resume before it is given up.
    #[arg(long)]
    grace_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Join the match hosted by HOST using its invite CODE.
    Join { host: String, code: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pawnhub=info,pawnhub_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    pawnhub_client::init_connection(build_config(&args));
    let connection = pawnhub_client::connection();
    let session = pawnhub_client::session();

    match args.command {
        Command::Join { host, code } => join(connection, &session, &host, &code).await,
    }
}

fn build_config(args: &Args) -> ClientConfig {
    let mut config = ClientConfig::from_env();
    if args.local {
        config.debug_local_server = true;
    }

    if args.remember {
        let settings = ClientSettings {
            debug_local_server: config.debug_local_server,
        };
        if !settings.save() {
            warn!("Could not persist settings");
        }
    }

    if let Some(server) = &args.server {
        if config.debug_local_server {
            config.local_url = server.clone();
        } else {
            config.server_url = server.clone();
        }
    }

    if let Some(secs) = args.grace_secs {
        config.reconnect_grace = Duration::from_secs(secs);
    }

    config
}

async fn join(connection: &Connection, session: &Session, host: &str, code: &str) -> Result<()> {
    if determine_is_game_id(host) {
        warn!(%host, "This looks like a game code rather than a host id");
    }

    connection
        .prepare_with(|e| eprintln!("Could not reach the match server: {e}"))
        .await
        .context("connecting to match server")?;
    connection
        .send_connect_request(host, code)
        .context("sending join request")?;
    info!(%host, "Waiting for the match to start");

    let mut updates = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown: Option<(String, bool, PlayState, bool)> = None;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();

                let view = (
                    state.board_fen.clone(),
                    state.current_player_white,
                    state.play_state,
                    state.pending_move,
                );
                if shown.as_ref() != Some(&view) {
                    print_state(&state);
                    shown = Some(view);
                }
                if state.unread_move {
                    session.set_unread_move(false);
                }
                if state.play_state == PlayState::Closed {
                    println!("Match closed.");
                    break;
                }
            }
            line = lines.next_line() => {
                match line.context("reading stdin")? {
                    Some(line) => {
                        if !handle_input(connection, line.trim()) {
                            break;
                        }
                    }
                    None => {
                        connection.close();
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                connection.close();
                break;
            }
        }
    }

    Ok(())
}

/// Returns `false` when the player asked to leave.
fn handle_input(connection: &Connection, line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [] => true,
        ["quit"] | ["exit"] => {
            connection.close();
            false
        }
        [from, to] => {
            match connection.send_move(from, to) {
                Ok(()) => {}
                Err(ClientError::NotOpen) => eprintln!("Not connected, move not sent"),
                Err(e) => eprintln!("Could not send move: {e}"),
            }
            true
        }
        _ => {
            eprintln!("Enter a move as `<from> <to>` (e.g. `e2 e4`) or `quit`");
            true
        }
    }
}

fn print_state(state: &SessionState) {
    let side = if state.current_player_white {
        "white"
    } else {
        "black"
    };
    let pending = if state.pending_move { ", move pending" } else { "" };
    println!(
        "[{}] {} ({} to move{})",
        state.play_state, state.board_fen, side, pending
    );
}
