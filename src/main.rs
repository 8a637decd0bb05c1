use std::net::SocketAddr;

use axum::http::HeaderValue;
use mimalloc::MiMalloc;
use snippetd::config::AppConfig;
use snippetd::services::cache::SnippetCache;
use snippetd::{db, routes, AppState};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Import payloads are the largest request bodies.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snippetd=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    db::migrate(&pool).await?;
    tracing::info!("Database migrations applied");

    let cache = match redis::Client::open(config.redis_url.as_str()) {
        Ok(client) => SnippetCache::new(client, config.active_cache_ttl_secs),
        Err(e) => {
            tracing::warn!(error = %e, "Invalid REDIS_URL, running without active-set cache");
            SnippetCache::disabled()
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_url.parse::<HeaderValue>()?)
        .allow_methods(Any)
        .allow_headers(Any);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let tls_paths = config.tls_cert_path.clone().zip(config.tls_key_path.clone());
    tracing::info!(
        host = %addr,
        multisite = config.multisite,
        safe_mode = config.safe_mode,
        tls = tls_paths.is_some(),
        "Starting snippetd"
    );

    let app = routes::router(AppState::new(pool, cache, config))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    match tls_paths {
        Some((cert, key)) => {
            // Ignored when a provider is already installed.
            let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
