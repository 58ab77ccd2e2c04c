pub mod cities;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod match_store;
pub mod orchestrator;
pub mod registry;
pub mod sqlite;
pub mod strings;

#[cfg(test)]
mod testing;

pub use control::{ControlEvent, run_control_loop};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::{EngineError, EngineResult};
pub use match_store::MatchStore;
pub use orchestrator::{MatchingOrchestrator, RoundSummary};
pub use registry::UserRegistry;
pub use sqlite::SqliteMatchStore;
