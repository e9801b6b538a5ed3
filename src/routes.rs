// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::{
    handlers::{auth, cards, checker, results, students},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public: health, result checker, admin login.
/// * `/api/admin/*`: cards, students and results, behind JWT + admin role.
/// * Optional static web client as the fallback route.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let public_routes = Router::new()
        .route("/health", get(checker::health))
        .route("/results/check", post(checker::check_result))
        .route("/auth/login", post(auth::login));

    let admin_routes = Router::new()
        .route("/cards", get(cards::list_cards).post(cards::generate_cards))
        .route("/cards/summary", get(cards::card_summary))
        .route("/cards/{id}", get(cards::get_card).delete(cards::delete_card))
        .route("/cards/{id}/regenerate", post(cards::regenerate_card))
        .route("/cards/{id}/deactivate", post(cards::deactivate_card))
        .route("/cards/{id}/expire", post(cards::expire_card))
        .route(
            "/students",
            get(students::list_students).post(students::create_student),
        )
        .route(
            "/students/{student_id}",
            get(students::get_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .route(
            "/results",
            get(results::list_results).post(results::create_result),
        )
        .route("/results/recalculate", post(results::recalculate_positions))
        .route(
            "/results/{id}",
            get(results::get_result)
                .put(results::update_result)
                .delete(results::delete_result),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let mut router = Router::new().nest("/api", public_routes.nest("/admin", admin_routes));

    if let Some(dir) = &state.config.static_dir {
        let index = format!("{}/index.html", dir.trim_end_matches('/'));
        router = router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    router
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
