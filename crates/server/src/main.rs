//! Parley server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use parley_api::middleware::AppState;
use parley_common::{Config, LocalStorage, MediaStore};
use parley_core::{
    ChatCoordinator, ConversationService, FollowingService, InMemoryPresence, MessagingService,
    NotificationService, PresenceRegistry, RoomHub, TokenVerifier,
};
use parley_db::repositories::{
    ChatMessageRepository, ConversationRepository, FollowingRepository, NotificationRepository,
    UserRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting parley server...");

    let config = Config::load()?;
    if config.auth.jwt_secret.is_empty() {
        anyhow::bail!("auth.jwt_secret must be set");
    }

    let db = parley_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    parley_db::migrate(&db).await?;
    info!("Migrations completed");

    // Repositories
    let db = Arc::new(db);
    let message_repo = ChatMessageRepository::new(Arc::clone(&db));
    let conversation_repo = ConversationRepository::new(Arc::clone(&db));
    let user_repo = UserRepository::new(Arc::clone(&db));
    let notification_repo = NotificationRepository::new(Arc::clone(&db));
    let following_repo = FollowingRepository::new(Arc::clone(&db));

    // Collaborators
    let media: Arc<dyn MediaStore> = Arc::new(LocalStorage::from_config(&config.media));
    let presence: Arc<dyn PresenceRegistry> = Arc::new(InMemoryPresence::new());
    let hub = RoomHub::new();

    // Services
    let mut messaging_service =
        MessagingService::new(message_repo, conversation_repo.clone(), user_repo.clone());
    messaging_service.set_media_store(Arc::clone(&media));
    let conversation_service = ConversationService::new(conversation_repo, user_repo.clone());
    let notification_service = NotificationService::new(notification_repo);
    let following_service = FollowingService::new(
        following_repo,
        user_repo,
        conversation_service.clone(),
        notification_service.clone(),
    );

    let coordinator = ChatCoordinator::new(
        hub,
        presence,
        messaging_service.clone(),
        conversation_service.clone(),
        notification_service.clone(),
    );

    let state = AppState {
        token_verifier: TokenVerifier::new(&config.auth.jwt_secret),
        coordinator,
        messaging_service,
        conversation_service,
        notification_service,
        following_service,
        media,
        max_upload_bytes: config.media.max_upload_bytes,
    };

    let app = parley_api::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
