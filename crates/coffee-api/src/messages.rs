use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tokio::sync::oneshot;
use tracing::{debug, error};

use coffee_engine::ControlEvent;
use coffee_types::InboundMessage;
use coffee_types::api::RepliesResponse;

use crate::state::AppState;

/// Hand a member's message to the control loop and return its replies.
pub async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> Result<impl IntoResponse, StatusCode> {
    let member_id = message.member_id;
    debug!("Inbound message from member {}", member_id);

    let (respond, replies) = oneshot::channel();
    state
        .control
        .send(ControlEvent::Inbound { message, respond })
        .map_err(|_| {
            error!("Control loop is gone, dropping message from member {}", member_id);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    let replies = replies.await.map_err(|_| {
        error!("Control loop stopped before answering member {}", member_id);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(RepliesResponse { replies }))
}
