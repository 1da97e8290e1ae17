use std::net::SocketAddr;
use std::sync::Arc;

use auth::PasswordHasher;
use auth::TokenIssuer;
use rosary_service::config::Config;
use rosary_service::domain::help::ports::HelpServicePort;
use rosary_service::domain::help::service::HelpService;
use rosary_service::domain::publication::ports::PublicationServicePort;
use rosary_service::domain::publication::service::PublicationService;
use rosary_service::domain::user::ports::UserServicePort;
use rosary_service::domain::user::service::UserService;
use rosary_service::inbound::http::router::create_router;
use rosary_service::outbound::mail::OutboxMailDispatcher;
use rosary_service::outbound::mail::SmtpMailDispatcher;
use rosary_service::outbound::repositories::PostgresHelpRepository;
use rosary_service::outbound::repositories::PostgresPublicationRepository;
use rosary_service::outbound::repositories::PostgresUserRepository;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rosary_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        service = "rosary-service",
        version = env!("CARGO_PKG_VERSION"),
        "Service starting"
    );

    let config = Config::load()?;

    tracing::info!(
        http_port = config.server.http_port,
        max_connections = config.database.max_connections,
        access_ttl_seconds = config.jwt.access_ttl_seconds,
        refresh_ttl_seconds = config.jwt.refresh_ttl_seconds,
        max_refresh_tokens = config.session.max_refresh_tokens,
        rate_limit_requests = config.rate_limit.requests,
        rate_limit_period_seconds = config.rate_limit.period_seconds,
        hashing_test_mode = config.hashing.test_mode,
        smtp_host = ?config.mail.smtp_host,
        "Configuration loaded"
    );

    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    tracing::info!(
        max_connections = config.database.max_connections,
        database = "postgresql",
        "Database connection pool created"
    );

    sqlx::migrate!("./migrations").run(&pg_pool).await?;
    tracing::info!(database = "postgresql", "Database migrations completed");

    let password_hasher = Arc::new(PasswordHasher::new(config.hashing_params())?);
    let token_issuer = Arc::new(TokenIssuer::new(config.token_settings()));
    let user_repository = Arc::new(PostgresUserRepository::new(pg_pool.clone()));
    let publication_repository = Arc::new(PostgresPublicationRepository::new(pg_pool.clone()));
    let help_repository = Arc::new(PostgresHelpRepository::new(pg_pool));

    let user_service: Arc<dyn UserServicePort> = match config.smtp_settings() {
        Some(settings) => {
            tracing::info!(host = %settings.host, port = settings.port, "Mail relay configured");
            Arc::new(UserService::new(
                user_repository,
                Arc::new(SmtpMailDispatcher::new(settings)?),
                password_hasher,
                token_issuer,
                config.session_policy(),
            ))
        }
        None => {
            tracing::warn!("No mail relay configured, link mails are kept in the outbox");
            Arc::new(UserService::new(
                user_repository,
                Arc::new(OutboxMailDispatcher::new()),
                password_hasher,
                token_issuer,
                config.session_policy(),
            ))
        }
    };
    let publication_service: Arc<dyn PublicationServicePort> =
        Arc::new(PublicationService::new(publication_repository));
    let help_service: Arc<dyn HelpServicePort> = Arc::new(HelpService::new(help_repository));

    let http_address = format!("0.0.0.0:{}", config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_address).await?;
    tracing::info!(
        address = %http_address,
        port = config.server.http_port,
        protocol = "http",
        "Http server listening"
    );

    let http_application = create_router(
        user_service,
        publication_service,
        help_service,
        config.rate_limit_policy(),
    );
    axum::serve(
        http_listener,
        http_application.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    tracing::info!("Server exited");
    Ok(())
}
