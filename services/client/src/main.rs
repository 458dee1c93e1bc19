use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use queue_client::api::ApiClient;
use queue_client::clock::SystemClock;
use queue_client::config::{ClientConfig, DEFAULT_CONFIG_PATH, load_config_from_path};
use queue_client::control_api::{ControlState, build_router};
use queue_client::engine::Engine;
use queue_client::push_bridge::{LogNotifier, PushBridge};
use queue_client::sink::TracingSink;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "queue-client", version, about = "Queue status synchronization client")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "queue-client starting");

    let args = Args::parse();
    let cfg = match load_config_from_path(&args.config) {
        Ok(cfg) => {
            info!(
                entry_uuid = %cfg.session.entry_uuid,
                status_url = %cfg.session.status_url,
                "config loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    register_subscription(&cfg).await;

    // -------------------------------------------------------------------------
    // Push bridge and engine
    // -------------------------------------------------------------------------
    let (bridge, bridge_task) = PushBridge::new(LogNotifier, cfg.push.icon.clone()).spawn();
    let (engine, mut engine_task) =
        Engine::new(cfg.session.clone(), Arc::new(SystemClock), TracingSink)
            .with_bridge(bridge.attach())
            .spawn();

    // -------------------------------------------------------------------------
    // Control API
    // -------------------------------------------------------------------------
    if let Some(bind) = cfg.control.bind.clone() {
        let listener = match tokio::net::TcpListener::bind(&bind).await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("FATAL: failed to bind control API on {bind}: {e}");
                std::process::exit(1);
            }
        };
        info!(%bind, "control API listening");
        let router = build_router(ControlState {
            engine: engine.clone(),
            bridge: bridge.clone(),
        });
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "control API stopped");
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
            engine.shutdown();
            let _ = (&mut engine_task).await;
        }
        result = &mut engine_task => {
            if let Err(e) = result {
                error!(error = %e, "engine task ended unexpectedly");
            }
        }
    }
    bridge_task.abort();
}

/// One-time push subscription registration; never fatal.
async fn register_subscription(cfg: &ClientConfig) {
    let Some(path) = cfg.push.subscription_file.as_ref() else {
        return;
    };
    let subscription = match tokio::fs::read_to_string(path)
        .await
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).map_err(|e| e.to_string()))
    {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read push subscription");
            return;
        }
    };
    match ApiClient::new(&cfg.session)
        .register_push_subscription(subscription)
        .await
    {
        Ok(()) => info!("push subscription registered"),
        Err(e) => warn!(error = %e, "push subscription registration failed"),
    }
}
