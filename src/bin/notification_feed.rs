use std::path::PathBuf;

use notification_sync::bus::KIND_PAGE_LOADED;
use notification_sync::config::CorrelationFilter;
use notification_sync::event_types::ASSIGNMENT_CONTENT_EVENTS;
use notification_sync::{init_tracing, NotificationSession, PageLoad, SyncConfig};
use tokio::sync::broadcast::error::RecvError;

const ENV_ACCESS_TOKEN: &str = "NOTIFY_ACCESS_TOKEN";

#[derive(Debug, Default)]
struct FeedOptions {
    config_path: Option<PathBuf>,
    extra_pages: u32,
    assignment: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("notification feed failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let Some(options) = parse_args()? else {
        return Ok(());
    };

    let mut config = match &options.config_path {
        Some(path) => SyncConfig::load(path).map_err(|error| error.to_string())?,
        None => SyncConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(assignment) = &options.assignment {
        config.correlation = Some(CorrelationFilter {
            key: "classAssignmentId".to_string(),
            value: serde_json::Value::String(assignment.clone()),
        });
        config.event_types = ASSIGNMENT_CONTENT_EVENTS
            .iter()
            .map(|event| event.to_string())
            .collect();
    }

    let token = std::env::var(ENV_ACCESS_TOKEN)
        .map_err(|_| format!("{ENV_ACCESS_TOKEN} is not set"))?;

    let session = NotificationSession::start(config, &token)
        .await
        .map_err(|error| error.to_string())?;
    let mut changes = session.subscribe_changes();
    tracing::info!(
        loaded = session.notifications().len(),
        unread = session.unread_count(),
        "feed ready"
    );

    for _ in 0..options.extra_pages {
        match session.load_next_page().await {
            Ok(PageLoad::Loaded { page, added }) => {
                tracing::info!(page, added, "loaded older notifications");
            }
            Ok(PageLoad::Exhausted) => break,
            Ok(PageLoad::InFlight) => {}
            Err(error) => {
                tracing::warn!(%error, "could not load older notifications");
                break;
            }
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                break;
            }
            change = changes.recv() => match change {
                Ok(event) => {
                    if event.kind != KIND_PAGE_LOADED {
                        tracing::info!(
                            kind = %event.kind,
                            seq = event.seq,
                            payload = %event.payload,
                            unread = session.unread_count(),
                            "notifications changed"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "feed fell behind the sync bus");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.shutdown();
    Ok(())
}

/// `Ok(None)` means help was printed.
fn parse_args() -> Result<Option<FeedOptions>, String> {
    let mut options = FeedOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(None);
        }
        if arg == "--config" {
            let value = args
                .next()
                .ok_or_else(|| "--config requires a path".to_string())?;
            options.config_path = Some(PathBuf::from(value));
            continue;
        }
        if arg == "--pages" {
            let value = args
                .next()
                .ok_or_else(|| "--pages requires a value".to_string())?;
            options.extra_pages = value
                .parse()
                .map_err(|_| format!("invalid --pages value '{value}'"))?;
            continue;
        }
        if arg == "--assignment" {
            let value = args
                .next()
                .ok_or_else(|| "--assignment requires an id".to_string())?;
            options.assignment = Some(value);
            continue;
        }
        return Err(format!("unknown argument '{arg}'. Use --help for usage"));
    }
    Ok(Some(options))
}

fn print_help() {
    println!("Live notification feed");
    println!();
    println!("Usage:");
    println!("  cargo run --bin notification-feed -- [options]");
    println!();
    println!("Options:");
    println!("  --config <path>        JSON config file (env overrides still apply)");
    println!("  --pages <n>            Load n older pages after the first one (default: 0)");
    println!("  --assignment <id>      Only refresh on content events for this class assignment");
    println!();
    println!("Environment:");
    println!("  {ENV_ACCESS_TOKEN}    Bearer token for the API and push stream (required)");
    println!("  NOTIFY_API_BASE_URL, NOTIFY_PUSH_URL, NOTIFY_PAGE_SIZE, NOTIFY_SETTLE_DELAY_MS");
}
