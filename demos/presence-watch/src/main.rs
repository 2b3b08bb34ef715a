use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rxlive::prelude::*;
use rxlive::session::now_unix;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "presence-watch")]
#[command(about = "Watch who is online at an outlet and inspect the stored session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Session file shared with the dashboard's login flow
    #[arg(long, env = "RXLIVE_STORE", default_value = "session.json", global = true)]
    store: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = rxlive::telemetry::DEFAULT_FILTER, global = true)]
    log: String,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and print every presence change until interrupted
    ///
    /// Without --outlet the watcher follows the signed-in user: it
    /// re-scopes on sign-in and goes quiet on sign-out.
    Watch {
        /// Presence WebSocket endpoint
        #[arg(long, env = "RXLIVE_ENDPOINT")]
        endpoint: String,

        /// Watch this outlet instead of the signed-in user's
        #[arg(long)]
        outlet: Option<String>,

        /// Query parameter that carries the outlet id
        #[arg(long, default_value = "outletId")]
        outlet_param: String,

        /// Seconds allowed for each connection attempt
        #[arg(long, default_value_t = 10)]
        connect_timeout: u64,
    },

    /// Report on the stored session (the raw token is never printed)
    Diagnose {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store a token and profile, as the dashboard login does
    Login {
        #[arg(long, env = "RXLIVE_TOKEN", hide_env_values = true)]
        token: String,

        /// User profile as JSON
        #[arg(long)]
        profile: String,
    },

    /// Clear the stored session
    Logout,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn watch(
    store: Arc<CredentialStore>,
    endpoint: String,
    outlet: Option<String>,
    outlet_param: String,
    connect_timeout: u64,
) {
    let mut presence = OutletPresenceBuilder::new(endpoint)
        .outlet_param(outlet_param)
        .connect_timeout(Duration::from_secs(connect_timeout))
        .build(store);
    let mut updates = presence.subscribe();

    let fixed = outlet.is_some();
    if fixed {
        presence.scope(outlet.map(OutletId::new)).await;
    }

    {
        let scoping = async {
            if fixed {
                std::future::pending::<()>().await
            } else {
                presence.follow().await
            }
        };
        tokio::pin!(scoping);

        loop {
            tokio::select! {
                _ = &mut scoping => break,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted");
                    break;
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    println!("{}", render(&snapshot));
                }
            }
        }
    }

    presence.stop().await;
}

fn diagnose(store: &CredentialStore, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let report = store.diagnose();
    report.emit();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn login(store: &CredentialStore, token: &str, profile: &str) -> Result<(), Box<dyn std::error::Error>> {
    let profile: UserProfile = serde_json::from_str(profile)?;
    if !is_valid(token, now_unix()) {
        tracing::warn!("storing a token that is not currently valid");
    }
    store.login(token, &profile)?;

    match resolve_outlet_id(&profile) {
        Some(outlet) => println!("signed in, outlet {outlet}"),
        None => println!("signed in, no outlet scope"),
    }
    Ok(())
}

/// One line per snapshot: `[outlet] State rev N: user (role), ...`.
fn render(snapshot: &PresenceSnapshot) -> String {
    let outlet = snapshot
        .outlet
        .as_ref()
        .map_or_else(|| "-".to_string(), OutletId::to_string);
    let users = if snapshot.online_users.is_empty() {
        "nobody online".to_string()
    } else {
        snapshot
            .online_users
            .iter()
            .map(|e| match e.role.as_str() {
                "" => e.user_id.to_string(),
                role => format!("{} ({role})", e.user_id),
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("[{outlet}] {} rev {}: {users}", snapshot.state, snapshot.revision)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    rxlive::telemetry::init(&cli.log);

    let store = Arc::new(CredentialStore::load(FileStore::new(&cli.store)));

    match cli.command {
        Command::Watch {
            endpoint,
            outlet,
            outlet_param,
            connect_timeout,
        } => watch(store, endpoint, outlet, outlet_param, connect_timeout).await,
        Command::Diagnose { json } => diagnose(&store, json)?,
        Command::Login { token, profile } => login(&store, &token, &profile)?,
        Command::Logout => {
            store.logout()?;
            println!("signed out");
        }
    }
    Ok(())
}
