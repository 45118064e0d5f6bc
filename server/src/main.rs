use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use boxoffice_server::config::Config;
use boxoffice_server::payment::MockPaymentCollaborator;
use boxoffice_server::routes::create_routes;
use boxoffice_server::services::{BookingService, CheckInService};
use boxoffice_server::state::AppState;
use boxoffice_server::store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,boxoffice_server=debug,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let store = PgStore::connect(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Successfully connected to database");

    sqlx::migrate!().run(store.pool()).await?;
    tracing::info!("Migrations run successfully");

    let lookups = Arc::new(store.clone());
    let bookings = BookingService::new(
        store.clone(),
        MockPaymentCollaborator::shared(config.checkout_base_url.clone()),
        lookups.clone(),
        config.booking.clone(),
    );
    let check_ins = CheckInService::new(store, lookups);

    let app = create_routes(AppState::new(bookings, check_ins));

    let addr = config.bind_addr()?;
    tracing::info!("Server running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
