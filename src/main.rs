use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use pulse_channel::{ChannelConfig, RealtimeChannel};
use pulse_core::{Session, UserId};
use pulse_store::{Database, NotificationStore, SessionStore, StorageRepo};
use pulse_sync::{
    AlertSink, ApiClient, LogToast, NotificationApi, QueryCache, StaleMarker, SyncController,
    TerminalBell,
};
use pulse_telemetry::TelemetryConfig;

mod settings;

use settings::Settings;

#[derive(Parser)]
#[command(name = "pulse", about = "Realtime notification sync client")]
struct Cli {
    /// Settings file (defaults to ~/.pulse/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a session issued by the server
    Login {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        token: String,
    },
    /// Clear the session and local notification state
    Logout,
    /// Run the sync daemon until interrupted
    Run,
    /// Show session and store state
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => settings::load_settings_from_path(path)?,
        None => settings::load_settings()?,
    };

    let telemetry = TelemetryConfig {
        log_level: settings.log.level.parse().unwrap_or(tracing::Level::INFO),
        module_levels: Vec::new(),
    };
    pulse_telemetry::init_telemetry(&telemetry);

    let data_dir = settings.storage.resolve_dir();
    let db = Database::open(&data_dir.join("client.db"))?;
    let notifications = Arc::new(NotificationStore::new(StorageRepo::new(db.clone())));
    let sessions = Arc::new(SessionStore::new(StorageRepo::new(db)));

    match cli.command {
        Command::Login { user_id, token } => {
            sessions.set(Session::new(UserId::new(user_id), token));
            println!("session stored for user {user_id}");
        }
        Command::Logout => {
            sessions.clear();
            notifications.clear();
            println!("session cleared");
        }
        Command::Status => {
            match sessions.current() {
                Some(session) => println!("session: user {}", session.user_id),
                None => println!("session: none"),
            }
            println!(
                "notifications: {} ({} unread)",
                notifications.len(),
                notifications.unread_count()
            );
            println!("channel target: {}", settings.channel.url);
        }
        Command::Run => run_daemon(settings, notifications, sessions).await?,
    }

    Ok(())
}

async fn run_daemon(
    settings: Settings,
    notifications: Arc<NotificationStore>,
    sessions: Arc<SessionStore>,
) -> anyhow::Result<()> {
    let Some(session) = sessions.current() else {
        anyhow::bail!("no session; run `pulse login` first");
    };

    let channel = RealtimeChannel::shared(ChannelConfig {
        url: settings.channel.url.clone(),
        heartbeat: Duration::from_secs(settings.channel.heartbeat_secs),
        outbound_queue: settings.channel.outbound_queue,
        ..Default::default()
    });

    let api: Arc<dyn NotificationApi> =
        Arc::new(ApiClient::new(settings.api.base_url.clone(), session.token.clone()));
    let cache: Arc<dyn QueryCache> = Arc::new(StaleMarker::new());
    let alerts: Vec<Arc<dyn AlertSink>> = vec![Arc::new(TerminalBell), Arc::new(LogToast)];

    let controller = SyncController::new(channel, notifications, sessions, api, cache, alerts);
    controller.activate();

    tracing::info!(user_id = %session.user_id, "pulse running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    controller.deactivate();
    tracing::info!("shutting down");
    Ok(())
}
