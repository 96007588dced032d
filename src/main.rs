use std::{process, sync::Arc};

use folio::{
    application::auth::{HttpIdentityProvider, IdentityProvider},
    application::error::AppError,
    application::experiences::ExperienceService,
    application::profiles::ProfileService,
    application::repos::{ExperiencesRepo, ProfilesRepo},
    cache::{CacheService, CacheStore, MemoryStore, RedisStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AppState, RateLimitTiers, TieredRateLimiter},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn connect_database(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(PostgresRepositories::new(pool))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    connect_database(&settings).await?;
    info!(target = "folio::migrate", "migrations applied");
    Ok(())
}

fn build_cache_store(settings: &config::Settings) -> Result<Arc<dyn CacheStore>, AppError> {
    match settings.redis.url.as_ref() {
        Some(url) => {
            let store = RedisStore::connect(
                url,
                settings.redis.pool_size.get() as usize,
                settings.redis.timeout,
            )
            .map_err(|err| AppError::from(InfraError::cache(err.to_string())))?;
            info!(target = "folio::cache", "using Redis cache store");
            Ok(Arc::new(store))
        }
        None => {
            warn!(
                target = "folio::cache",
                "no redis url configured; falling back to the in-process cache store"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = Arc::new(connect_database(&settings).await?);

    let store = build_cache_store(&settings)?;
    let cache = CacheService::new(store, settings.cache.clone());

    let verify_url = settings
        .auth
        .verify_url
        .clone()
        .ok_or_else(|| InfraError::configuration("auth verify url is not configured"))
        .map_err(AppError::from)?;
    let identity: Arc<dyn IdentityProvider> = Arc::new(
        HttpIdentityProvider::new(verify_url, settings.auth.timeout)
            .map_err(|err| AppError::unexpected(err.to_string()))?,
    );

    let profiles_repo: Arc<dyn ProfilesRepo> = repositories.clone();
    let experiences_repo: Arc<dyn ExperiencesRepo> = repositories.clone();

    let rate_limiter = Arc::new(TieredRateLimiter::new(
        settings.rate_limit.window,
        RateLimitTiers {
            anonymous: settings.rate_limit.anonymous.get(),
            user: settings.rate_limit.user.get(),
            moderator: settings.rate_limit.moderator.get(),
            admin: settings.rate_limit.admin.get(),
        },
    ));

    let state = AppState {
        profiles: ProfileService::new(profiles_repo.clone(), cache.clone()),
        experiences: ExperienceService::new(experiences_repo, profiles_repo, cache.clone()),
        cache,
        identity,
        rate_limiter,
        db: repositories.clone(),
        request_timeout: settings.server.request_timeout,
    };

    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "folio::server",
        addr = %settings.server.addr,
        "listening"
    );

    let grace = settings.server.graceful_shutdown;
    let draining = Arc::new(tokio::sync::Notify::new());
    let drain_started = draining.clone();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            drain_started.notify_one();
        },
    );

    // In-flight requests get `graceful_shutdown` to finish after the
    // signal; after that the process stops waiting on them.
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            draining.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "folio::server",
                grace_secs = grace.as_secs(),
                "graceful shutdown deadline exceeded; aborting open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install shutdown handler");
        return;
    }
    info!(target = "folio::server", "shutdown signal received");
}
