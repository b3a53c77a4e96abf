use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use configuration::Settings;
use database::DbRepository;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod api_logger;
pub mod auth;
pub mod cache;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod response;

use api_logger::{ApiLogWorker, ApiLogger};
use auth::JwtService;
use database::NewApiLog;
use handlers::{
    api_logs, attendance, auth as auth_handlers, courses, enrollments, health, lessons, programs,
    reports, users,
};

const LOG_PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// The shared application state that all handlers can access.
#[derive(Clone)]
pub struct AppState {
    pub db_repo: DbRepository,
    pub settings: Settings,
    pub jwt: JwtService,
    pub api_logger: ApiLogger,
}

impl AppState {
    /// Builds the state and returns the API log queue its worker drains.
    pub fn new(db_repo: DbRepository, settings: Settings) -> (Self, mpsc::Receiver<NewApiLog>) {
        let jwt = JwtService::new(&settings.auth);
        let (api_logger, log_rx) = ApiLogger::new(settings.api_logging.clone());
        let state = Self {
            db_repo,
            settings,
            jwt,
            api_logger,
        };
        (state, log_rx)
    }
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/ready", get(health::ready))
        // --- Auth & self-service ---
        .route("/auth/login", post(auth_handlers::login))
        .route("/users/me", get(auth_handlers::me))
        .route("/users/me/enrollments", get(enrollments::my_enrollments))
        .route("/users/me/attendance", get(attendance::my_history))
        // --- Public catalogue ---
        .route("/courses", get(courses::list_public_courses))
        .route("/courses/:id", get(courses::get_public_course))
        .route(
            "/courses/:id/enroll",
            post(enrollments::enroll).delete(enrollments::unenroll),
        )
        .route("/courses/:id/progress", get(enrollments::progress))
        .route("/lessons/:id/complete", post(enrollments::complete_lesson))
        .route("/programs", get(programs::list_public_programs))
        .route("/programs/:id", get(programs::get_public_program))
        .route("/programs/:id/register", post(programs::register))
        // --- Attendance ---
        .route("/attendance/signin", post(attendance::sign_in))
        .route("/attendance/signout", post(attendance::sign_out))
        .route("/attendance/current", get(attendance::current))
        .route("/attendance/stats", get(attendance::stats))
        .nest("/admin", admin_routes())
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/courses", get(courses::list_courses).post(courses::create_course))
        .route(
            "/courses/:id",
            get(courses::get_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route(
            "/courses/:id/status",
            put(courses::update_course_status).post(courses::update_course_status),
        )
        .route("/courses/:id/featured", post(courses::toggle_featured))
        .route(
            "/courses/:id/modules",
            get(courses::list_modules).post(courses::create_module),
        )
        .route(
            "/courses/:id/sections",
            get(courses::list_sections).post(courses::create_section),
        )
        .route("/courses/:id/statistics", get(courses::course_statistics))
        .route("/courses/:id/lessons", post(lessons::create_lesson))
        .route(
            "/lessons/:id",
            get(lessons::get_lesson)
                .put(lessons::update_lesson)
                .delete(lessons::delete_lesson),
        )
        .route("/sections/:id/lessons", get(lessons::list_section_lessons))
        .route(
            "/programs",
            get(programs::list_programs).post(programs::create_program),
        )
        .route(
            "/programs/:id",
            get(programs::get_program)
                .put(programs::update_program)
                .delete(programs::delete_program),
        )
        .route("/programs/:id/registrations", get(programs::list_registrations))
        .route("/programs/:id/capacity", put(programs::update_capacity))
        .route(
            "/registrations/:id/status",
            put(programs::update_registration_status),
        )
        .route(
            "/registrations/:id/mentor-status",
            put(programs::update_mentor_status),
        )
        .route("/reports", get(reports::list_reports).post(reports::create_report))
        .route("/reports/summary", get(reports::summary))
        .route(
            "/reports/:id",
            put(reports::update_report).delete(reports::delete_report),
        )
        .route("/api-logs", get(api_logs::list_logs))
        .route("/api-logs/stats", get(api_logs::stats))
}

/// Assembles every route and middleware layer around the given state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());
    let body_limit = state.settings.server.body_limit_bytes;

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/v1", api_routes())
        .fallback(health::fallback)
        .layer(middleware::from_fn_with_state(state.clone(), cache::http_cache))
        .layer(middleware::from_fn_with_state(state.clone(), api_logger::log_requests))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        // Logs method, path, status and latency for every request.
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Connects to the database, starts the background workers and serves the
/// API until Ctrl-C.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let db_pool = database::connect(&settings.database).await?;
    database::run_migrations(&db_pool).await?;
    let db_repo = DbRepository::new(db_pool);

    let addr: SocketAddr = settings.bind_address().parse()?;
    let retention_days = settings.api_logging.retention_days;
    let (state, log_rx) = AppState::new(db_repo.clone(), settings);
    tokio::spawn(ApiLogWorker::new(db_repo.clone()).run(log_rx));
    tokio::spawn(prune_api_logs_daily(db_repo, retention_days));

    let app = build_router(Arc::new(state));

    tracing::info!("Web server started and listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Web server stopped");
    Ok(())
}

async fn prune_api_logs_daily(repo: DbRepository, retention_days: i64) {
    if retention_days <= 0 {
        return;
    }
    let mut ticker = tokio::time::interval(LOG_PRUNE_INTERVAL);
    loop {
        ticker.tick().await;
        match repo.prune_api_logs(retention_days).await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, retention_days, "Pruned old API request logs"),
            Err(e) => tracing::error!(error = ?e, "Failed to prune API request logs"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
