// routes.rs
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/get-auth-token/", post(handlers::obtain_token))
        .route("/sign-on/", post(handlers::sign_on))
        .route("/questions/", get(handlers::list_questions))
        .route("/questions/statistics/", get(handlers::statistics))
        .route("/questions/{id}/", get(handlers::question_detail))
        .route("/questions/{id}/vote/", post(handlers::vote))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
