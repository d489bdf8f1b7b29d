use autonomy::auth::JwtKeys;
use autonomy::service::users;
use autonomy::{apply_migrations, build_router, catalog, ensure_database_exists, resolve, AppState, Settings};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autonomy=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    tracing::info!(?settings, "starting");

    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(&settings.database_url)
        .await?;

    let catalog = catalog(&settings.schema);
    apply_migrations(&pool, &catalog).await?;
    let model = resolve(&catalog)?;

    if let Some(admin) = &settings.admin {
        users::bootstrap_admin(&pool, &model, &admin.email, &admin.password).await?;
    }

    let state = AppState {
        pool,
        model: Arc::new(model),
        jwt: JwtKeys::new(&settings.jwt_secret, settings.token_ttl_secs),
        cookie_secure: settings.cookie_secure,
    };
    let app = build_router(state, settings.body_limit_bytes);

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
