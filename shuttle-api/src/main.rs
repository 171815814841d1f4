use anyhow::Context;
use shuttle_api::{
    app,
    state::{booking_rules, AppState, AuthConfig},
};
use shuttle_booking::{BookingService, PassthroughGateway};
use shuttle_core::notify::{EventNotifier, NoopNotifier};
use shuttle_store::{app_config::Config, DbClient, PgBookingStore, RedisClient, RedisEventPublisher};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shuttle_api=debug,shuttle_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!("Starting shuttle booking API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("failed to connect to Postgres")?;
    db.migrate().await.context("migrations failed")?;
    let rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .context("failed to load business rules")?;

    let redis = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url).await.context("failed to connect to Redis")?,
        )),
        None => {
            tracing::warn!("no redis configured: rate limiting and event publishing disabled");
            None
        }
    };
    let notifier: Arc<dyn EventNotifier> = match &redis {
        Some(client) => Arc::new(RedisEventPublisher::new(client.as_ref().clone())),
        None => Arc::new(NoopNotifier),
    };

    let store = PgBookingStore::new(db.pool.clone(), config.database.lock_timeout_ms);
    let bookings = BookingService::new(
        Arc::new(store),
        Arc::new(PassthroughGateway),
        notifier,
        booking_rules(&rules),
    );

    let app_state = AppState {
        bookings,
        redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        rate_limit_per_minute: rules.rate_limit_per_minute as i64,
    };

    let app = app(app_state, config.server.enable_test_routes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
