use std::sync::Arc;

use marketplace_backend::config::AppConfig;
use marketplace_backend::jobs::{pending_payment_sync, plan_expiry_sync};
use marketplace_backend::services::gateway::GatewayRegistry;
use marketplace_backend::services::payments::PaymentService;
use marketplace_backend::services::phonepe::PhonePeGateway;
use marketplace_backend::services::razorpay::RazorpayGateway;
use marketplace_backend::{create_router, AppState};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,marketplace_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None).await?;

    let mut gateways = GatewayRegistry::new();
    if let Some(phonepe) = config.phonepe.clone() {
        gateways.register(Arc::new(PhonePeGateway::new(phonepe)));
    }
    if let Some(razorpay) = config.razorpay.clone() {
        gateways.register(Arc::new(RazorpayGateway::new(razorpay)));
    }
    if gateways.kinds().is_empty() {
        tracing::warn!("No payment gateway configured - purchases and top-ups will fail");
    }

    let payments = PaymentService::new(db.clone(), gateways, config.payments.clone());

    // Background jobs
    plan_expiry_sync::start_plan_expiry_job(db, config.jobs.plan_expiry_interval_secs)
        .await;
    pending_payment_sync::start_pending_payment_job(payments.clone(), config.jobs.clone()).await;

    let state = AppState { payments };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
