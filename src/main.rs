use anyhow::Result;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yoga_routines::api::routes::create_routes;
use yoga_routines::config::{run_migrations, AppConfig, DatabaseConfig, DatabaseSeeder};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let db_config = DatabaseConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if config.supabase_url.is_none() {
        warn!("SUPABASE_URL is not set");
    }
    if !config.is_production() && std::env::var("SUPABASE_JWT_SECRET").is_err() {
        warn!("SUPABASE_JWT_SECRET is not set, using the development signing secret");
    }

    let pool = db_config.create_pool().await?;
    run_migrations(&pool).await?;

    if config.seed_demo_data {
        DatabaseSeeder::new(pool.clone()).seed_all().await?;
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_routes(pool, &config.supabase_jwt_secret)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let address = config.server_address();
    let listener = TcpListener::bind(&address).await?;
    info!(
        "Yoga routines API ({}) listening on http://{}",
        config.environment, address
    );
    info!("Health check available at http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
