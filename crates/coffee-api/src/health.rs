use axum::{Json, extract::State};

use coffee_types::api::HealthResponse;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.control.is_closed() { "degraded" } else { "ok" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cycle: state.matches.current_cycle(),
    })
}
