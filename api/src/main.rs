mod handlers;
mod retention;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use figure_judge_common::config::{Config, EncodeMode};
use figure_judge_frames::{FrameStore, Pipeline};
use figure_judge_model::{GeminiClient, JudgeModel};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub pipeline: Pipeline,
    /// `None` when no API key is configured; judging then reports the model
    /// as unavailable.
    pub model: Option<Arc<dyn JudgeModel>>,
    pub config: Config,
}

fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/extract_frames", post(handlers::extract_frames))
        .route("/judge_frames", post(handlers::judge_frames))
        .route("/judge_base64_frames", post(handlers::judge_frames));

    if let FrameStore::Disk { dir, url_prefix } = state.pipeline.encoder().store() {
        let mount = url_prefix.trim_end_matches('/');
        app = app.nest_service(mount, ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        capacity = config.selection.capacity,
        stride_divisor = config.selection.stride_divisor,
        min_stddev = config.selection.min_stddev,
        policy = ?config.selection.scan_policy,
        mode = ?config.encode.mode,
        max_width = config.encode.max_width,
        model = config.model.name,
        "starting figure-judge API"
    );

    let pipeline = Pipeline::from_config(&config);
    let store = pipeline.encoder().store().clone();
    if let Err(e) = store.prepare() {
        error!(error = %e, "failed to prepare frame store");
        std::process::exit(1);
    }
    if config.encode.mode == EncodeMode::Disk {
        tokio::spawn(retention::run_retention_loop(store, config.retention.clone()));
    }

    let model = GeminiClient::from_env(&config.model).map(|c| Arc::new(c) as Arc<dyn JudgeModel>);
    let addr = format!("{}:{}", config.server.bind, config.server.port);

    let state = Arc::new(AppState {
        pipeline,
        model,
        config,
    });
    let app = router(state);

    info!(addr, "figure-judge API server starting");
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}
