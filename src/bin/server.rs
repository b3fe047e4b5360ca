use std::{
    fs::OpenOptions,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    process::exit,
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
use tracing_subscriber::{
    EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt,
};

use fraudwatch::{
    AllowedOrigins, AppState, ConnectionMode, ConnectionProvider, build_router, cors_layer,
    graceful_shutdown, initialize_db, logging_middleware,
};

/// The REST API server for the fraud analytics dashboard.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "FRAUDWATCH_DB_PATH")]
    db_path: PathBuf,

    /// The address to listen on.
    #[arg(long, env = "FRAUDWATCH_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    host: IpAddr,

    /// The port to serve the API from.
    #[arg(short, long, env = "FRAUDWATCH_PORT", default_value_t = 3000)]
    port: u16,

    /// Whether to open a connection per request or share a single one.
    #[arg(long, env = "FRAUDWATCH_CONNECTION_MODE", value_enum, default_value_t = ConnectionMode::PerRequest)]
    connection_mode: ConnectionMode,

    /// An origin allowed to call the API, e.g. `http://localhost:3000`.
    /// Repeat to allow several. If none are given, any origin is allowed.
    #[arg(long = "allowed-origin", env = "FRAUDWATCH_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// How long a request may wait for the database, in seconds.
    #[arg(long, env = "FRAUDWATCH_QUERY_TIMEOUT_SECS", default_value_t = 10)]
    query_timeout_secs: u64,

    /// File path for the debug log.
    #[arg(long, env = "FRAUDWATCH_LOG_FILE", default_value = "debug.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logging(&args.log_file);

    let allowed_origins = match AllowedOrigins::parse(&args.allowed_origins) {
        Ok(origins) => origins,
        Err(error) => {
            tracing::error!("{error}");
            exit(1);
        }
    };

    if allowed_origins == AllowedOrigins::Any {
        tracing::warn!(
            "CORS allows any origin, pass --allowed-origin to restrict it outside of development"
        );
    }

    if let Err(error) = Connection::open(&args.db_path).and_then(|conn| initialize_db(&conn)) {
        tracing::error!("Could not initialize the database at {:?}: {error}", args.db_path);
        exit(1);
    }

    let connections = match ConnectionProvider::open(args.connection_mode, &args.db_path) {
        Ok(connections) => connections,
        Err(error) => {
            tracing::error!("{error}");
            exit(1);
        }
    };
    tracing::info!("Using {:?} database connections", args.connection_mode);

    let state = AppState::new(connections)
        .with_query_timeout(Duration::from_secs(args.query_timeout_secs));

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = build_router(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors_layer(&allowed_origins));
    let router = add_tracing_layer(router);

    let addr = SocketAddr::new(args.host, args.port);
    tracing::info!("HTTP server listening on {}", addr);

    if let Err(error) = axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
    {
        tracing::error!("Server error: {error}");
        exit(1);
    }
}

fn setup_logging(log_file_path: &Path) {
    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file))
        .with_filter(filter::LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(debug_log)
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
        // By default, `TraceLayer` will log 5xx responses but we're doing our specific
        // logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
