use std::sync::Arc;

use tokio::sync::mpsc;

use coffee_engine::{ControlEvent, MatchStore};

#[derive(Clone)]
pub struct AppState {
    /// Inbound messages -> control loop
    pub control: mpsc::UnboundedSender<ControlEvent>,
    pub matches: Arc<dyn MatchStore>,
}
