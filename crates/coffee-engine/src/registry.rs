use coffee_types::{ChatAddress, Member, MemberId, PairingScope};

use crate::error::EngineResult;

/// Member directory used by matching and the conversation layer.
pub trait UserRegistry: Send + Sync {
    /// Every member currently taking part, ordered by id.
    fn list_active(&self) -> EngineResult<Vec<Member>>;

    fn get(&self, id: MemberId) -> EngineResult<Option<Member>>;

    /// Fails with `NotFound` for an unknown member.
    fn set_active(&self, id: MemberId, active: bool) -> EngineResult<()>;

    /// Create or refresh a member from a city submission. The member ends up
    /// active; an existing pairing scope is kept.
    fn register(&self, id: MemberId, handle: &str, city: &str, chat_address: ChatAddress) -> EngineResult<()>;

    fn set_pairing_scope(&self, id: MemberId, scope: PairingScope) -> EngineResult<()>;
}
