use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use profsim_api::services::ai_client::OpenAiClient;
use profsim_api::services::locks::AttemptLocks;
use profsim_api::services::mongo_store::MongoStore;
use profsim_api::services::payment_service::{PaymentGateway, YookassaGateway};
use profsim_api::{config::Config, create_router, services::AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "profsim_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting profession simulation API");

    let config = Arc::new(Config::load().expect("Failed to load configuration"));
    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to MongoDB");
    let mongo = mongo_client.database(&config.mongo_database);
    tracing::info!("MongoDB connected");

    let redis_client =
        redis::Client::open(config.redis_uri.clone()).expect("Failed to create Redis client");
    let redis = redis::aio::ConnectionManager::new(redis_client)
        .await
        .expect("Failed to connect to Redis");
    tracing::info!("Redis connected");

    let ai = Arc::new(OpenAiClient::new(
        &config.ai_base_url,
        &config.ai_api_key,
        &config.ai_model,
        Duration::from_secs(config.ai_timeout_seconds),
    ));

    let gateway: Option<Arc<dyn PaymentGateway>> =
        match (&config.payment_shop_id, &config.payment_secret_key) {
            (Some(shop_id), Some(secret_key)) => {
                Some(Arc::new(YookassaGateway::new(shop_id, secret_key)))
            }
            _ => {
                tracing::warn!("Payment credentials missing, payment endpoints disabled");
                None
            }
        };

    let app_state = Arc::new(AppState {
        config: config.clone(),
        mongo: Some(mongo.clone()),
        redis: Some(redis.clone()),
        store: Arc::new(MongoStore::new(mongo)),
        ai,
        locks: AttemptLocks::redis(redis),
        gateway,
    });

    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("Failed to bind the listen address");
    tracing::info!(
        "Server listening on {}",
        listener.local_addr().expect("listener has no local addr")
    );

    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
