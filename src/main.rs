use anyhow::Context;
use axum_tus_server::{cors_layer, tus_app, LogNotifier, MemoryStore, TusConfig, TusLayer, TusState};
use clap::Parser;
use dotenvy::dotenv;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::make::Shared;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Resumable upload server speaking tus 1.0.0.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8001)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "axum_tus_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = TusConfig::from_env().context("invalid tus configuration")?;
    config
        .ensure_directories()
        .await
        .context("unable to create upload directories")?;

    info!(
        upload_dir = %config.upload_dir.display(),
        destination_dir = %config.destination_dir.display(),
        upload_url = %config.upload_url,
        max_file_size = config.max_file_size,
        timeout_secs = config.timeout.as_secs(),
        file_name_format = %config.file_name_format,
        "Loaded tus configuration"
    );

    let store = Arc::new(MemoryStore::new());

    let purge_store = Arc::clone(&store);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired upload records");
            }
        }
    });

    let state = TusState::new(store, Arc::new(LogNotifier), config.clone());

    let app = tus_app(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http());

    let service = ServiceBuilder::new()
        .layer(TusLayer::new(&config))
        .service(app);

    let addr = SocketAddr::new(args.host, args.port);
    info!("Listening on http://{}{}", addr, config.upload_url);

    axum::Server::bind(&addr)
        .serve(Shared::new(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
