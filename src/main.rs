//! # Passkey Ceremony Server
//!
//! Entry point: loads configuration, builds the shared state and serves the
//! ceremony API plus the static frontend.

use passkey_ceremony::config::Config;
use passkey_ceremony::handlers;
use passkey_ceremony::state::{self, AppState};
// CORS (Cross-Origin Resource Sharing) - allows frontend to call API from different origin
use tower_http::cors::{Any, CorsLayer};
// Serves static files (HTML, CSS, JavaScript)
use tower_http::services::ServeDir;
// HTTP request/response tracing for debugging and monitoring
use tower_http::trace::TraceLayer;
use time::Duration;
// Session management - carries ceremony bindings and the signed-in identity
use tower_sessions::{Expiry, SessionManagerLayer};
// SQLite-backed session storage
use tower_sessions_sqlx_store::SqliteStore;
// Structured logging setup
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main application entry point
///
/// This function:
/// 1. Sets up logging
/// 2. Loads configuration from environment variables
/// 3. Connects the database and builds the shared state
/// 4. Starts a background task that sweeps abandoned challenges
/// 5. Configures HTTP sessions
/// 6. Sets up API routes and middleware
/// 7. Starts the HTTP server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: info level for most crates, debug level for our app
    // Can be overridden with RUST_LOG environment variable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_ceremony=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    // The pool is needed for sessions even when credentials live in memory
    let pool = state::connect(&config.database_url).await?;
    let app_state = AppState::from_config(config.clone(), &pool);
    tracing::info!("Application state initialized");

    // Abandoned ceremonies leave challenges in the outstanding registry
    let binder = app_state.binder.clone();
    let cleanup_every = std::time::Duration::from_secs(config.challenge_cleanup_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_every);
        loop {
            interval.tick().await;
            let purged = binder.purge_expired();
            tracing::debug!(purged, "Challenge cleanup finished");
        }
    });

    // Session data lives server-side in SQLite; the cookie only holds its id
    let session_store = SqliteStore::new(pool.clone());
    session_store.migrate().await?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.secure_cookies())
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            config.session_idle_hours,
        )));

    // ⚠️ use specific origins in production
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::router(app_state)
        // Serve the frontend (index.html, app.js, ...)
        .fallback_service(ServeDir::new(&config.static_dir))
        // Applied in reverse order
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
