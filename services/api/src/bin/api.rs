//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{HttpMailAdapter, PgStore},
    config::Config,
    error::ApiError,
    web::{
        activate_candidate_handler, apply_handler,
        auth::{login_handler, logout_handler, signup_handler},
        course_capacity_handler, create_station_subject_handler, delete_subject_handler,
        generate_workshop_rotation_handler, list_programme_handler,
        middleware::require_auth,
        rest::ApiDoc,
        state::AppState,
        station_grid_handler, update_candidate_status_handler,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgStore::new(db_pool.clone()));
    info!("Running database migrations...");
    store
        .run_migrations()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Mail Adapter ---
    let mail_endpoint = config
        .mail_api_url
        .clone()
        .ok_or_else(|| ApiError::Internal("MAIL_API_URL is required".to_string()))?;
    let mail_adapter = Arc::new(HttpMailAdapter::new(
        reqwest::Client::new(),
        mail_endpoint,
        config.mail_api_key.clone(),
        config.mail_from.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store,
        email: mail_adapter,
        config: config.clone(),
    });

    let cors_origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required): the application form, the capacity
    // check it gates on, and the pure grid preview.
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/candidates", post(apply_handler))
        .route("/courses/{course_id}/capacity", get(course_capacity_handler))
        .route("/station-grid", get(station_grid_handler));

    // Protected routes (staff session required)
    let protected_routes = Router::new()
        .route(
            "/candidates/{candidate_id}/activate",
            post(activate_candidate_handler),
        )
        .route(
            "/candidates/{candidate_id}/status",
            patch(update_candidate_status_handler),
        )
        .route("/courses/{course_id}/programme", get(list_programme_handler))
        .route(
            "/courses/{course_id}/programme/workshop-rotation",
            post(generate_workshop_rotation_handler),
        )
        .route(
            "/courses/{course_id}/programme/stations",
            post(create_station_subject_handler),
        )
        .route(
            "/programme-subjects/{subject_id}",
            delete(delete_subject_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
