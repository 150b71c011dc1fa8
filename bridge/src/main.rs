use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::time::Duration;

use bridge::config::{BridgeConfig, ConfigError};
use bridge::events::{BridgeEvent, EventBus, EventKind};
use bridge::highlights::MomentService;
use bridge::supervisor::ConnectionSupervisor;
use bridge::webhook::WebhookIntake;
use moments::{DemoResolver, MomentState};
use rcon::RconSession;

/// Main-method of the application.
/// Parses command-line arguments, wires the shared components and runs the
/// intake and reconnect loops until shutdown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Path to the TOML configuration file
        #[clap(short, long, default_value = "bridge.toml")]
        config: String,
        /// Game server host, overrides the configuration
        #[clap(short = 'H', long)]
        host: Option<String>,
        /// Game server port, overrides the configuration
        #[clap(short, long)]
        port: Option<u16>,
    }

    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    // Parse command line arguments
    let args = Args::parse();

    let mut config = match BridgeConfig::load(&args.config) {
        Ok(config) => config,
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("config file {} not found, using defaults", args.config);
            BridgeConfig::default()
        }
        Err(err) => return Err(err.into()),
    };

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!(
        "bridging game server {}:{}",
        config.server.host, config.server.port
    );

    // Shared components, wired explicitly
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bus = Arc::new(EventBus::new());
    let session = Arc::new(RconSession::new(config.server.transport_config()));
    let supervisor = Arc::new(ConnectionSupervisor::new(
        Arc::clone(&session),
        Arc::clone(&bus),
        Duration::from_secs(config.server.min_retry_interval_sec),
        Duration::from_secs(config.server.reconnect_interval_sec),
    ));

    let resolver = Arc::new(DemoResolver::new(config.demos.resolver_config(), None));
    if !resolver.enabled() {
        info!("demo resolver disabled, fill in the [demos] section to enable it");
    }

    let moments = Arc::new(MomentService::new(
        MomentState::new(config.moments.window_sec, config.moments.session_idle_sec),
        Arc::clone(&resolver),
        Arc::clone(&bus),
        Duration::from_secs(config.moments.demo_retry_interval_sec),
        Duration::from_secs(config.moments.demo_retry_window_sec),
        shutdown_rx.clone(),
    ));
    let intake = Arc::new(WebhookIntake::new(Arc::clone(&bus), Arc::clone(&moments)));

    register_logging_handlers(&bus).await;

    // Smoke-check the link right after every successful connect
    {
        let session = Arc::clone(&session);
        bus.subscribe(EventKind::Connected, move |_event| {
            let session = Arc::clone(&session);
            async move {
                match session.fetch_status().await {
                    Ok(status) => debug!("server status after connect: {:.200}", status),
                    Err(err) => warn!("status fetch after connect failed: {}", err),
                }
            }
        })
        .await;
    }

    // First connection attempt before the periodic loop takes over
    if let Err(err) = supervisor.try_connect().await {
        warn!("initial connect failed: {}", err);
    }

    // Periodic reconnect loop
    let reconnect_handle = supervisor.spawn_reconnect_loop(shutdown_rx);

    // Webhook payloads arrive as JSON lines on stdin; the HTTP front end
    // forwarding them lives outside this binary.
    let intake_handle = {
        let intake = Arc::clone(&intake);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(&line) {
                    Ok(payload) => intake.dispatch(&payload).await,
                    Err(err) => warn!("undecodable webhook line: {}", err),
                }
            }
            info!("webhook intake reached end of input");
        })
    };

    // Handle shutdown gracefully
    tokio::select! {
        result = reconnect_handle => {
            if let Err(e) = result {
                eprintln!("Reconnect task panicked: {}", e);
            }
        }
        result = intake_handle => {
            if let Err(e) = result {
                eprintln!("Intake task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    let _ = shutdown_tx.send(true);
    session.disconnect().await;

    Ok(())
}

/// Logs every outbound event. The chat platform side subscribes its own
/// handlers the same way; this binary only reports what would go out.
async fn register_logging_handlers(bus: &Arc<EventBus>) {
    bus.subscribe(EventKind::Connected, |_event| async move {
        info!("game server link established");
    })
    .await;

    bus.subscribe(EventKind::Disconnected, |_event| async move {
        warn!("game server link lost");
    })
    .await;

    bus.subscribe(EventKind::ChatToDiscord, |event| async move {
        if let BridgeEvent::ChatToDiscord { text } = event.as_ref() {
            info!("chat out: {}", text.trim_end());
        }
    })
    .await;

    bus.subscribe(EventKind::StatusPanel, |event| async move {
        if let BridgeEvent::StatusPanel { text } = event.as_ref() {
            debug!("status panel refreshed ({} lines)", text.lines().count());
        }
    })
    .await;

    bus.subscribe(EventKind::ClusterCreated, |event| async move {
        if let BridgeEvent::ClusterCreated { cluster, .. } = event.as_ref() {
            info!(
                "moment cluster {} created for {} on {}",
                cluster.cluster_id, cluster.target_name, cluster.map_name
            );
        }
    })
    .await;

    bus.subscribe(EventKind::ClusterUpdated, |event| async move {
        if let BridgeEvent::ClusterUpdated { cluster, .. } = event.as_ref() {
            info!(
                "moment cluster {} updated, {} stars{}",
                cluster.cluster_id,
                cluster.stars,
                if cluster.demo_url.is_some() { ", demo attached" } else { "" }
            );
        }
    })
    .await;

    bus.subscribe(EventKind::SessionReset, |_event| async move {
        info!("moment session reset");
    })
    .await;
}
