//! # AudioHook Server - Main Application Entry Point
//!
//! Actix-web server exposing the AudioHook protocol over a WebSocket
//! endpoint, plus a small HTTP surface for managing the recordings the
//! protocol produces.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared application state and session counters
//! - **protocol**: AudioHook message types, auth, and the session engine
//! - **websocket**: Actix actor binding one connection to the engine
//! - **audio**: WAV container encoding for captured PCMU audio
//! - **handlers**: Recording list/delete endpoints and the startup sweep
//! - **health**: Health monitoring endpoint
//! - **error**: Custom error types and HTTP error responses

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod protocol;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag, set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audiohook-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // The media directory must exist before the sweep and before the first
    // session tries to write into it.
    let media_dir = config.media.dir();
    std::fs::create_dir_all(&media_dir)
        .with_context(|| format!("Failed to create media directory {}", media_dir.display()))?;

    // Remove recordings left over from a previous run.
    let report = handlers::sweep_media_dir(&media_dir)
        .await
        .with_context(|| format!("Failed to sweep media directory {}", media_dir.display()))?;
    for (name, err) in &report.failures {
        warn!(file = %name, error = %err, "Failed to delete leftover recording.");
    }
    info!(deleted = report.deleted, "Cleaned up old WAV files.");

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let media_path = config.media.path.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/audio", web::get().to(handlers::list_audio_files))
            .route("/audio/{id}", web::delete().to(handlers::delete_audio_file))
            .route("/ws", web::get().to(websocket::audiohook_websocket))
            .service(actix_files::Files::new("/media", &media_path))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging. `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audiohook_server=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag until the signal handler sets it.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
