use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: String,
    pub jwt_secret: String,

    /// Base URL of the OpenAI-compatible chat completions API.
    pub ai_base_url: String,
    pub ai_api_key: String,
    pub ai_model: String,
    /// Bound on a single AI call; streamed calls apply it to idle gaps too.
    pub ai_timeout_seconds: u64,

    /// Frontend origin, used to build payment return URLs.
    pub app_url: String,
    pub payment_shop_id: Option<String>,
    pub payment_secret_key: Option<String>,

    pub max_profession_attempts: u32,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/profsim".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "profsim".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let ai_base_url = settings
            .get_string("ai.base_url")
            .or_else(|_| env::var("AI_BASE_URL"))
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let ai_api_key = settings
            .get_string("ai.api_key")
            .or_else(|_| env::var("AI_API_KEY"))
            .unwrap_or_default();

        let ai_model = settings
            .get_string("ai.model")
            .or_else(|_| env::var("AI_MODEL"))
            .unwrap_or_else(|_| "gpt-4-turbo-preview".to_string());

        let ai_timeout_seconds = settings
            .get_int("ai.timeout_seconds")
            .ok()
            .or_else(|| {
                env::var("AI_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(60) as u64;

        let app_url = settings
            .get_string("app.url")
            .or_else(|_| env::var("APP_URL"))
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let payment_shop_id = settings
            .get_string("payments.shop_id")
            .or_else(|_| env::var("PAYMENT_SHOP_ID"))
            .ok();

        let payment_secret_key = settings
            .get_string("payments.secret_key")
            .or_else(|_| env::var("PAYMENT_SECRET_KEY"))
            .ok();

        let max_profession_attempts = settings
            .get_int("app.max_profession_attempts")
            .ok()
            .or_else(|| {
                env::var("MAX_PROFESSION_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(3) as u32;

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            ai_base_url,
            ai_api_key,
            ai_model,
            ai_timeout_seconds,
            app_url,
            payment_shop_id,
            payment_secret_key,
            max_profession_attempts,
        })
    }
}
