use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::IntoResponse;
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storefront_entitlements::config::Config;
use storefront_entitlements::db::{
    payment_repository::PaymentRepository,
    postgres_payment_repository::PostgresPaymentRepository,
    postgres_quota_repository::PostgresQuotaRepository,
    postgres_subscription_repository::PostgresSubscriptionRepository,
    postgres_user_repository::PostgresUserRepository, quota_repository::QuotaRepository,
    subscription_repository::SubscriptionRepository, user_repository::UserRepository,
};
use storefront_entitlements::responses::JsonResponse;
use storefront_entitlements::routes;
use storefront_entitlements::services::provider::{LivePaymentProvider, PaymentProvider};
use storefront_entitlements::AppState;

#[cfg(feature = "tls")]
use axum_server::tls_rustls::RustlsConfig;

/// `RUST_LOG` filtering, `LOG_FORMAT=json` for structured output, and Sentry
/// forwarding when `SENTRY_DSN` is set. The returned guard must outlive `main`.
fn init_tracing() -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let sentry_guard = std::env::var("SENTRY_DSN")
        .ok()
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .with(sentry_guard.as_ref().map(|_| sentry_tracing::layer()))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(sentry_guard.as_ref().map(|_| sentry_tracing::layer()))
            .init();
    }

    sentry_guard
}

#[tokio::main]
async fn main() {
    let _sentry = init_tracing();

    let config = Arc::new(Config::from_env().expect("Invalid configuration"));

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        // Default: 200ms/token (~5 req/sec)
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .expect("Invalid rate limiter configuration"),
    );

    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let pg_pool = establish_connection(&config.database_url).await;
    let users = Arc::new(PostgresUserRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn UserRepository>;
    let quota = Arc::new(PostgresQuotaRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn QuotaRepository>;
    let subscriptions = Arc::new(PostgresSubscriptionRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn SubscriptionRepository>;
    let payments = Arc::new(PostgresPaymentRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn PaymentRepository>;

    let provider = Arc::new(
        LivePaymentProvider::from_settings(&config.provider)
            .expect("Failed to build payment provider client"),
    ) as Arc<dyn PaymentProvider>;

    if config.provider.webhook_secret.is_none() {
        tracing::warn!("PROVIDER_WEBHOOK_SECRET is not set; webhook signatures will not be checked");
    }

    let state = AppState::new(
        users,
        quota,
        subscriptions,
        payments,
        provider,
        config.clone(),
    );

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .expect("FRONTEND_ORIGIN is not a valid header value"),
        )
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static("x-signature"),
            HeaderName::from_static("x-request-id"),
        ]);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = config.bind_addr;

    #[cfg(feature = "tls")]
    {
        let tls_config = RustlsConfig::from_pem_file(
            std::env::var("DEV_CERT_LOCATION").expect("DEV_CERT_LOCATION must be set"),
            std::env::var("DEV_KEY_LOCATION").expect("DEV_KEY_LOCATION must be set"),
        )
        .await
        .expect("Failed to load TLS certs");

        info!(%addr, "listening with TLS");
        let _ = axum_server::bind_rustls(addr, tls_config)
            .serve(make_service)
            .await;

        return;
    }

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!(%addr, "listening");
    axum::serve(listener, make_service)
        .await
        .expect("Server error");
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> PgPool {
    let pool = PgPool::connect(database_url)
        .await
        .expect("Failed to connect to the database");

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .expect("Failed to verify database connection");

    info!("Successfully connected to the database");
    pool
}
