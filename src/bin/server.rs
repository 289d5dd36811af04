use std::{
    fs::OpenOptions,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use smartwallet::{
    AppState, ModelConfig, OpenAiCompatibleProvider, RetryPolicy, build_router,
    graceful_shutdown, logging_middleware,
};

/// The REST API server for SmartWallet.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// The base URL of an OpenAI-compatible API.
    #[arg(long, env = "LLM_URL", default_value = "http://localhost:11434/v1")]
    llm_url: String,

    /// The API key for the language model service.
    #[arg(long, env = "LLM_API_KEY", default_value = "ollama", hide_env_values = true)]
    llm_api_key: String,

    /// The model used to extract transactions from text.
    #[arg(long, env = "TEXT_MODEL", default_value = "llama3.1")]
    text_model: String,

    /// The model used to extract transactions from receipt photos.
    #[arg(long, env = "VISION_MODEL", default_value = "llama3.2-vision")]
    vision_model: String,

    /// The model used to translate questions into SQL, defaults to the text model.
    #[arg(long, env = "SQL_MODEL")]
    sql_model: Option<String>,

    /// How many times to ask the model before giving up on a request.
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// The pause before the first retry in milliseconds, growing 1.5x after each retry.
    #[arg(long, default_value_t = 250)]
    retry_delay_ms: u64,

    /// How long to wait for a single model response in seconds.
    #[arg(long, default_value_t = 120)]
    request_timeout_secs: u64,

    /// The largest accepted request body in megabytes.
    #[arg(long, default_value_t = 10)]
    max_upload_mb: usize,

    /// Where uploaded receipts are staged, defaults to the system temp directory.
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

impl Args {
    fn model_config(&self) -> ModelConfig {
        let defaults = RetryPolicy::default();

        ModelConfig {
            base_url: self.llm_url.clone(),
            api_key: self.llm_api_key.clone(),
            text_model: self.text_model.clone(),
            vision_model: self.vision_model.clone(),
            sql_model: self
                .sql_model
                .clone()
                .unwrap_or_else(|| self.text_model.clone()),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                initial_delay: Duration::from_millis(self.retry_delay_ms),
                max_delay: defaults.max_delay.max(Duration::from_millis(self.retry_delay_ms)),
            },
            temp_dir: self.temp_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();
    let config = args.model_config();

    let addr = SocketAddr::new(args.host, args.port);

    let conn = Connection::open(&args.db_path).expect("Could not open the database.");
    let provider =
        OpenAiCompatibleProvider::new(&config).expect("Could not create the model client.");
    let state = AppState::new(conn, Arc::new(provider), &config)
        .expect("Could not initialize the database.");

    tracing::info!(
        "Using models {} (text), {} (vision) and {} (SQL) at {}",
        config.text_model,
        config.vision_model,
        config.sql_model,
        config.base_url
    );

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let max_upload_bytes = args.max_upload_mb * 1024 * 1024;
    let router = build_router(state, max_upload_bytes).layer(middleware::from_fn_with_state(
        max_upload_bytes,
        logging_middleware,
    ));
    let router = add_tracing_layer(router);

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .expect("The server stopped unexpectedly.");
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter::LevelFilter::DEBUG.to_string()));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(env_filter),
        )
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // Errors are logged where they are turned into responses.
        .on_failure(());

    router.layer(tracing_layer)
}
