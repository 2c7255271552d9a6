use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;

mod accounting;
mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod routes;
mod state;
mod store;
mod utils;

use accounting::SystemClock;
use config::{Config, StoreBackend};
use db::init_db;
use state::AppState;
use store::{
    AttendanceStore, MemoryAttendanceStore, MemoryTaskStore, MemoryUserStore,
    MySqlAttendanceStore, MySqlTaskStore, MySqlUserStore, TaskStore, UserStore,
};

use crate::docs::ApiDoc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

type Stores = (
    Arc<dyn AttendanceStore>,
    Arc<dyn UserStore>,
    Arc<dyn TaskStore>,
);

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.store_backend {
        StoreBackend::MySql => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            let pool = init_db(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;

            Ok((
                Arc::new(MySqlAttendanceStore::new(pool.clone())),
                Arc::new(MySqlUserStore::new(pool.clone())),
                Arc::new(MySqlTaskStore::new(pool)),
            ))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            Ok((
                Arc::new(MemoryAttendanceStore::new()),
                Arc::new(MemoryUserStore::new()),
                Arc::new(MemoryTaskStore::new()),
            ))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(
        backend = %config.store_backend,
        day_offset_minutes = config.day_boundary.offset_minutes(),
        standard_hours = config.hours_policy.standard_hours,
        "Server starting..."
    );

    let (attendance, users, tasks) = open_stores(&config).await?;
    let state = Data::new(AppState::new(
        &config,
        attendance,
        users,
        tasks,
        Arc::new(SystemClock),
    ));

    let filter_state = state.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = filter_state
            .email_filter
            .warmup(filter_state.users.as_ref(), 100)
            .await
        {
            error!(error = %e, "Failed to warmup email filter");
        }
    });

    let cache_state = state.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = cache_state
            .user_cache
            .warmup(cache_state.users.as_ref(), 250)
            .await
        {
            error!(error = %e, "Failed to warmup user cache");
        }
    });

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(state.clone())
            .app_data(config_data.clone())
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &config_data))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
