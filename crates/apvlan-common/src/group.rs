//! Group key context collaborator.

use async_trait::async_trait;

use crate::error::VlanResult;
use crate::types::VlanId;

/// Per-VLAN group key state owned by the authenticator.
///
/// A VLAN interface is only usable once its group context exists, so the
/// controller calls [`ensure_group`](GroupKeyManager::ensure_group) during
/// bring-up and [`release_group`](GroupKeyManager::release_group) during
/// teardown.
#[async_trait]
pub trait GroupKeyManager: Send + Sync {
    /// Creates the group context for `vlan_id` if it does not exist yet.
    async fn ensure_group(&self, vlan_id: VlanId) -> VlanResult<()>;

    /// Releases the group context for `vlan_id`.
    async fn release_group(&self, vlan_id: VlanId) -> VlanResult<()>;
}
