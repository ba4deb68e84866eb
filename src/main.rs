use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use currency_rates::{
    AppState,
    config::Config,
    database::CurrencyOperation,
    feed::HttpFeedSource,
    limiter::RateLimiter,
    router::create_router,
    service::CurrencyService,
    worker::WorkerPool,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'currency_rates';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    let feed = HttpFeedSource::new(config.feed_url.clone(), config.request_timeout())
        .expect("Failed to build HTTP client");
    let service = CurrencyService::new(Arc::new(feed), Arc::new(CurrencyOperation::new(pool)));

    let job_service = service.clone();
    let (queue, workers) = WorkerPool::start(
        config.worker_count,
        config.worker_queue_capacity,
        move |job| {
            let service = job_service.clone();
            async move { service.run_save_job(job).await }
        },
    );

    let limiter = Arc::new(RateLimiter::new(&config.limiter).expect("Invalid rate limiter settings"));
    let shutdown = CancellationToken::new();
    let sweeper = limiter.spawn_sweeper(shutdown.clone());
    tracing::info!(
        enabled = limiter.is_enabled(),
        rps = config.limiter.rps,
        burst = config.limiter.burst,
        "Rate limiter configured"
    );

    let state = AppState { service, queue };
    let app = create_router(state, limiter);

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    tracing::info!("Shutting down");
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!("Rate limit sweeper failed: {}", e);
    }
    workers.shutdown().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
