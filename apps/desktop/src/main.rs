use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    AddOutcome, CatalogSession, ClientEvent, GestureOutcome, HttpCatalogClient, Notice,
    OfflineCatalogClient, Point, PointerEvent, RemoteCatalogClient, TriggerOutcome,
};
use shared::domain::{CatalogItem, ItemId, ViewTab};
use storage::Storage;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_database_url, Settings, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "catalog", about = "Browse the remote catalog and manage your collection")]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Skip the remote catalog entirely; only the saved collection is usable.
    #[arg(long)]
    offline: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Scroll the catalog, revealing `reveals` increments of items.
    Discover {
        #[arg(long, default_value_t = 1)]
        reveals: usize,
    },
    Add {
        id: i64,
    },
    Remove {
        id: i64,
    },
    /// Move the entry at index `from` to index `to`.
    Move {
        from: usize,
        to: usize,
    },
    /// Drag the entry `id` onto the entry `over`.
    Reorder {
        id: i64,
        #[arg(long)]
        over: i64,
    },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    let storage = Storage::new(&settings.database_url).await.map_err(|error| {
        error!(
            database_url = %settings.database_url,
            error = %error,
            "failed to open catalog database"
        );
        error
    })?;

    let http = if cli.offline {
        None
    } else {
        Some(Arc::new(HttpCatalogClient::new(&settings.api_base_url)?))
    };
    let remote: Arc<dyn RemoteCatalogClient> = match &http {
        Some(http) => http.clone(),
        None => Arc::new(OfflineCatalogClient),
    };
    info!(
        api = %settings.api_base_url,
        database_url = %settings.database_url,
        offline = cli.offline,
        "catalog session starting"
    );

    let session = CatalogSession::new(remote, Arc::new(storage), settings.session_config()).await;
    let mut events = session.subscribe_events();

    match cli.command {
        Command::Discover { reveals } => discover(&session, reveals).await,
        Command::Add { id } => {
            let Some(http) = http else {
                bail!("cannot look up item {id} while offline");
            };
            let reference = http.detail_ref_for(ItemId(id))?;
            let item = http.get_detail(&reference).await?;
            if session.request_add(item).await == AddOutcome::Added {
                print_collection(&session.collection().items().await);
            }
        }
        Command::Remove { id } => {
            if !session.request_remove(ItemId(id)).await {
                println!("#{id} is not in the collection");
            }
        }
        Command::Move { from, to } => {
            session.switch_view(ViewTab::Collection).await;
            session.move_entry(from, to).await?;
            print_collection(&session.collection().items().await);
        }
        Command::Reorder { id, over } => {
            session.switch_view(ViewTab::Collection).await;
            let outcome = drag_onto(&session, ItemId(id), ItemId(over), &settings).await;
            println!("{outcome:?}");
            print_collection(&session.collection().items().await);
        }
        Command::List => print_collection(&session.collection().items().await),
    }

    report_events(&mut events);
    Ok(())
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = load_settings(&cli.config)?;
    if let Some(api_url) = &cli.api_url {
        settings.api_base_url = api_url.clone();
    }
    if let Some(database_url) = &cli.database_url {
        settings.database_url = normalize_database_url(database_url);
    }
    Ok(settings)
}

async fn discover(session: &CatalogSession, reveals: usize) {
    let mut revealed = 0;
    // Each reveal may need one fetch first; the extra slack covers the final empty check.
    for _ in 0..reveals.saturating_mul(2).saturating_add(2) {
        if revealed >= reveals {
            break;
        }
        match session.on_sentinel_visible().await {
            TriggerOutcome::Revealed { .. } => revealed += 1,
            TriggerOutcome::Fetched { .. } | TriggerOutcome::Coalesced => {}
            TriggerOutcome::Idle | TriggerOutcome::Failed => break,
        }
    }

    let view = session.catalog_view();
    for (index, item) in view.items.iter().enumerate() {
        println!("{}", format_item(index, item));
    }
    if view.reached_end {
        println!("-- end of catalog --");
    }
}

/// Replays a press, hold and drag the way a pointer device would.
async fn drag_onto(
    session: &CatalogSession,
    entry: ItemId,
    over: ItemId,
    settings: &Settings,
) -> GestureOutcome {
    let activation = settings.session_config().reorder.activation;
    let pressed_at = Instant::now();
    let origin = Point::new(0.0, 0.0);

    let pressed = session
        .pointer(PointerEvent::Down {
            entry,
            at: origin,
            time: pressed_at,
        })
        .await;
    if pressed != GestureOutcome::Pressed {
        return pressed;
    }
    let dragged = session
        .pointer(PointerEvent::Move {
            at: Point::new(0.0, activation.min_distance * 4.0),
            over: Some(over),
            time: pressed_at + activation.hold,
        })
        .await;
    let dropped = session.pointer(PointerEvent::Up).await;
    match dragged {
        GestureOutcome::Moved { .. } | GestureOutcome::Activated => dropped,
        other => other,
    }
}

fn format_item(index: usize, item: &CatalogItem) -> String {
    format!(
        "{:>3}. #{:<5} {:<14} {:<18} hp={:<3} atk={:<3} def={}",
        index,
        item.id.0,
        item.name,
        item.types.join("/"),
        item.stats.hp,
        item.stats.attack,
        item.stats.defense
    )
}

fn print_collection(items: &[CatalogItem]) {
    if items.is_empty() {
        println!("(collection is empty)");
        return;
    }
    for (index, item) in items.iter().enumerate() {
        println!("{}", format_item(index, item));
    }
}

fn report_events(events: &mut broadcast::Receiver<ClientEvent>) {
    loop {
        match events.try_recv() {
            Ok(ClientEvent::Notice(notice)) => println!("{}", describe_notice(&notice)),
            Ok(ClientEvent::Error(message)) => eprintln!("error: {message}"),
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

fn describe_notice(notice: &Notice) -> String {
    match notice {
        Notice::Added { id, name } => format!("added {name} (#{id}) to your collection"),
        Notice::AlreadyCollected { id, name } => {
            format!("{name} (#{id}) is already in your collection")
        }
        Notice::Removed { id, name } => format!("removed {name} (#{id})"),
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
