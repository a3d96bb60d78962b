use axum::{middleware, routing::post, Router};

use crate::{auth::jwt::require_auth, state::AppState};

pub mod completion;
pub mod dto;
pub mod handlers;
pub mod normalize;
pub mod prompt;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/generate", post(handlers::generate))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}
