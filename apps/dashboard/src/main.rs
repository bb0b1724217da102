//! Terminal dashboard for watching county sync operations.
//!
//! Connects the sync client to a live event source, subscribes to the
//! operations named on the command line and re-renders the projected
//! snapshot whenever a change event arrives.

use clap::Parser;
use shared::domain::OperationId;
use sync_client::{DashboardSnapshot, OperationSyncClient, SyncConfig};
use tokio::sync::broadcast;
use tracing::warn;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "dashboard", about = "Live operation-status dashboard")]
struct Args {
    /// Event-source websocket endpoint, e.g. wss://sync.example.gov/ws
    #[arg(long)]
    url: Url,

    /// Base url of the operations REST API. Enables snapshot seeding and
    /// retry/cancel actions.
    #[arg(long)]
    api_url: Option<Url>,

    /// Operation ids to subscribe to. Repeatable.
    #[arg(long = "operation")]
    operations: Vec<String>,

    /// Notifications retained in memory.
    #[arg(long, default_value_t = 100)]
    max_notifications: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = SyncConfig::new(args.url);
    if let Some(api_url) = args.api_url {
        config = config.with_api_url(api_url);
    }
    config.max_notifications = args.max_notifications;

    let client = OperationSyncClient::create(config);
    let mut events = client.subscribe_events();
    client.connect().await?;

    for id in args.operations {
        client.subscribe_operation(OperationId::new(id)).await;
    }
    render(&client.snapshot().await);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(_) => render(&client.snapshot().await),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged; re-rendering");
                    render(&client.snapshot().await);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    client.dispose().await;
    Ok(())
}

fn render(snapshot: &DashboardSnapshot) {
    println!("----------------------------------------");
    match (&snapshot.connection_error, snapshot.is_connected) {
        (_, true) => println!("connection: live"),
        (Some(error), false) => println!("connection: down ({error})"),
        (None, false) => println!("connection: connecting..."),
    }

    let mut operations: Vec<_> = snapshot.operations.values().collect();
    operations.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
    for op in operations {
        println!(
            "  {:<24} {:?}  {}/{} records ({} failed)",
            op.operation_id.as_str(),
            op.status,
            op.processed_records,
            op.total_records,
            op.failed_records,
        );
    }

    for event in snapshot.notifications.iter().take(5) {
        println!(
            "  [{:?}] {} {}",
            event.severity,
            event.timestamp.format("%H:%M:%S"),
            event.description
        );
    }
}
