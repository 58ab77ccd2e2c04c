//! JSON boundary between the chat transport and the control loop.

pub mod health;
pub mod messages;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/messages", post(messages::post_message))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
