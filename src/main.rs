use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{Router, routing::get};
use courtside_backend::{
    AppState,
    config::Config,
    middleware::{RateLimitLayer, RateLimiter, log_errors, rate_limit},
    routes,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Logging first, so config problems are visible.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    let state = AppState {
        config: config.clone(),
    };

    let limiter = Arc::new(RateLimiter::new());
    limiter.start_sweep();

    // Lesson endpoints sit under the booking preset; everything is also
    // covered by the blanket api preset applied to the whole router.
    let lesson_routes = Router::new()
        .route("/lessons/schedule", get(routes::lesson::monthly_schedule))
        .route("/lessons/quote", get(routes::lesson::quote))
        .route("/lessons/validate-date", get(routes::lesson::validate_date))
        .layer(axum::middleware::from_fn_with_state(
            RateLimitLayer::new(limiter.clone(), "booking", config.rate_limit_booking),
            rate_limit,
        ));

    let router = Router::new().merge(lesson_routes);

    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(
            RateLimitLayer::new(limiter.clone(), "api", config.rate_limit_api),
            rate_limit,
        ),
    );

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app,
    )
    .with_graceful_shutdown(shutdown_signal(limiter))
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal(limiter: Arc<RateLimiter>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    } else {
        tracing::info!("Shutting down");
    }
    // The sweep task stops whichever way we got here.
    limiter.shutdown();
}
