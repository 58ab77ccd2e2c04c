use serde::{Deserialize, Serialize};

use crate::events::Reply;
use crate::models::ChatAddress;

// -- Inbound boundary --

#[derive(Debug, Serialize, Deserialize)]
pub struct RepliesResponse {
    pub replies: Vec<Reply>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Current matching cycle, 0 before the first round.
    pub cycle: i64,
}

// -- Delivery webhook --

/// Body POSTed to the delivery webhook for every fired reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub destination: ChatAddress,
    pub text: String,
}
