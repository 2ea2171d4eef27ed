use std::net::SocketAddr;
use std::sync::Arc;

use lostfound::config::Config;
use lostfound::db::create_pool;
use lostfound::middleware::AuthLayer;
use lostfound::routes::{router, AppState};
use lostfound::services::{
    ApprovalsService, AuthService, ClaimsService, ItemsService, NotificationsService,
    StudentItemsService, VisionService,
};
use lostfound::storage::{R2Backend, StorageBackend};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lostfound=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    tracing::info!("Starting lostfound API server...");
    tracing::info!("Connecting to database...");

    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    // Object storage is optional; without it image blobs live in the database.
    let storage: Option<Arc<dyn StorageBackend>> = match config.r2_config() {
        Some(r2) => match R2Backend::new(&r2) {
            Ok(backend) => {
                tracing::info!("R2 image storage enabled: bucket={}", backend.bucket());
                Some(Arc::new(backend))
            }
            Err(e) => {
                tracing::error!("Failed to create R2 backend: {}", e);
                None
            }
        },
        None => {
            tracing::info!("Object storage disabled, storing image blobs in the database");
            None
        }
    };

    if config.google_api_key.is_none() {
        tracing::info!("GOOGLE_API_KEY not set; vision suggestions disabled");
    }

    let state = AppState {
        pool: pool.clone(),
        items: ItemsService::new(pool.clone(), storage.clone()),
        claims: ClaimsService::new(pool.clone()),
        approvals: ApprovalsService::new(pool.clone()),
        student_items: StudentItemsService::new(pool.clone(), storage),
        notifications: NotificationsService::new(pool.clone()),
        vision: VisionService::new(&config),
        auth: AuthService::new(pool.clone(), config.jwt_secret.clone()),
    };
    let auth_layer = AuthLayer::new(pool, config.jwt_secret.clone());

    let app = router(state, auth_layer);

    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
