use std::sync::Arc;

use adhd_reader::auth::Auth;
use adhd_reader::config::{Cli, Config, default_config_dir, default_config_path};
use adhd_reader::db::Database;
use adhd_reader::handler::AppState;
use adhd_reader::oracle::{OpenAiOracle, SnippetOracle};
use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // If --config is provided, its parent directory also holds the database.
    // Otherwise both live in ~/.adhd-reader/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    // A missing .env is fine; variables may come from the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    tracing::info!("adhd-reader.svc starting");

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));
    if cfg.oracle.api_key.is_none() {
        tracing::warn!("no oracle api key configured, generation requests will fail");
    }
    let oracle: Arc<dyn SnippetOracle> = Arc::new(OpenAiOracle::new(cfg.oracle.clone()).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup oracle client");
        std::process::exit(1);
    }));

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();
    let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);

    // Background task to purge expired sessions every 5 minutes
    let cleanup_db = db.clone();
    let cleanup_token = cancellation_token.clone();
    let cleanup_done = shutdown_complete_tx.clone();
    tokio::spawn(async move {
        let _done = cleanup_done;
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let conn = cleanup_db.connection().await;
                    match Auth::new(&conn).purge_expired_sessions().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(purged = n, "purged expired sessions"),
                        Err(e) => tracing::warn!("Failed to purge expired sessions: {}", e),
                    }
                }
                _ = cleanup_token.cancelled() => {
                    tracing::info!("Session cleanup task shutting down");
                    break;
                }
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    let cors = match cfg.app.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => cors.allow_origin(AllowOrigin::exact(origin)).allow_credentials(true),
        Some(Err(e)) => {
            tracing::error!(error = %e, "invalid cors_origin");
            std::process::exit(1);
        }
        None => cors.allow_origin(Any),
    };

    let state = AppState::new(db, oracle, cfg.app.session_ttl_hours);
    let app = adhd_reader::app(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("adhd-reader.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
            cancellation_token.cancel();
        }
    }

    drop(shutdown_complete_tx);
    shutdown_complete_rx.recv().await;
    tracing::info!("adhd-reader.svc going off, graceful shutdown complete");
}
