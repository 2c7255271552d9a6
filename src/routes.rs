use crate::{
    api::{attendance, drivers, tasks},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error::AppError,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Per-route limiter: `requests_per_min` spread evenly, with a burst of the same size
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Malformed bodies and query strings answer 400 with the usual error body
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| AppError::validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| AppError::validation(err.to_string()).into()),
    );

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    .route("/clock-in", web::post().to(attendance::clock_in))
                    .route("/clock-out", web::post().to(attendance::clock_out))
                    .route("/break/start", web::post().to(attendance::start_break))
                    .route("/break/end", web::post().to(attendance::end_break))
                    .route("/history", web::get().to(attendance::history))
                    .route("/today", web::delete().to(attendance::reset_today))
                    .service(
                        web::scope("/admin")
                            .route("/records", web::get().to(attendance::admin_records))
                            .route("/overtime", web::get().to(attendance::admin_overtime))
                            .route(
                                "/active-drivers",
                                web::get().to(attendance::active_drivers),
                            )
                            .route("/summary", web::get().to(attendance::daily_summary)),
                    ),
            )
            .service(
                web::scope("/drivers")
                    // /drivers
                    .service(web::resource("").route(web::get().to(drivers::list_drivers)))
                    // /drivers/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(drivers::get_driver))
                            .route(web::put().to(drivers::update_driver))
                            .route(web::delete().to(drivers::delete_driver)),
                    ),
            )
            .service(
                web::scope("/tasks")
                    // /tasks
                    .service(
                        web::resource("")
                            .route(web::get().to(tasks::list_tasks))
                            .route(web::post().to(tasks::create_task)),
                    )
                    // fixed segments before /{id}
                    .service(web::resource("/my-tasks").route(web::get().to(tasks::my_tasks)))
                    .service(
                        web::resource("/assigned").route(web::get().to(tasks::assigned_tasks)),
                    )
                    // /tasks/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(tasks::get_task))
                            .route(web::put().to(tasks::update_task))
                            .route(web::delete().to(tasks::delete_task)),
                    )
                    // /tasks/{id}/status
                    .service(
                        web::resource("/{id}/status")
                            .route(web::patch().to(tasks::update_status)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new access_token + rotated refresh_token
