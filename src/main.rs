//! f3 server binary.
//!
//! A minimal upload/download file server: `PUT /<path>` or a multipart
//! `POST /` stores a file under the upload directory, `GET /<path>` serves it
//! back, and an optional background sweeper removes files past their expiry.

mod atomic;
mod background;
mod config;
mod copier;
mod download;
mod error;
mod frontend;
mod http;
mod logging;
mod router;
mod storage;
mod tls;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::background::spawn_expiry_sweeper;
use crate::config::Args;
use crate::router::build_router;
use crate::storage::Storage;

shadow!(build);

/// Starts the f3 server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let args = Args::parse();
    logging::init_logging(&args.log_level);

    let storage = Arc::new(Storage::new(PathBuf::from(&args.upload_dir)));
    storage.ensure_root().await?;
    let upload_config = Arc::new(args.upload_config());
    let expiry_policy = args.expiry_policy();

    let host = args
        .bind
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let tls_config = tls::load_rustls_config(&args).await?;

    let app = build_router(storage.clone(), upload_config.clone());
    let handle = Handle::new();
    let shutdown = CancellationToken::new();
    let sweeper = spawn_expiry_sweeper(storage.clone(), expiry_policy, shutdown.clone());

    info!(
        upload_dir = ?storage.root_path(),
        limit = upload_config.max_size,
        sub_dirs = upload_config.sub_dirs,
        expire = expiry_policy.is_enabled(),
        "use / for uploading files and /{{file_name}} for downloading"
    );

    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    let server = async {
        match tls_config {
            Some(tls_config) => {
                info!("🔒 Starting HTTPS server at {}", addr);
                axum_server::bind_rustls(addr, tls_config)
                    .handle(handle.clone())
                    .serve(service)
                    .await
            }
            None => {
                info!("🚀 Starting HTTP server at {}", addr);
                axum_server::bind(addr)
                    .handle(handle.clone())
                    .serve(service)
                    .await
            }
        }
    };

    let result = tokio::select! {
        result = server => result,
        _ = shutdown_signal(handle.clone()) => Ok(()),
    };

    shutdown.cancel();
    if let Some(sweeper) = sweeper
        && let Err(err) = sweeper.await
    {
        warn!(error = %err, "expiry sweeper task failed");
    }

    result
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
