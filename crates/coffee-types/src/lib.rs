//! Shared types for the coffee matching service.
//!
//! Everything that crosses a crate boundary lives here: the domain models
//! stored by `coffee-db`, the replies produced by the conversation layer,
//! the JSON bodies of the HTTP boundary and the injectable clock.

pub mod api;
pub mod clock;
pub mod events;
pub mod models;

pub use clock::{Clock, FakeClock, SystemClock};
pub use events::{InboundMessage, MenuToken, Reply};
pub use models::{ChatAddress, Match, Member, MemberId, PairingScope, Reminder};
