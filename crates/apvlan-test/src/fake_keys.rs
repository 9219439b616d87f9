//! Recording group key manager.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use apvlan_common::{GroupKeyManager, VlanError, VlanId, VlanResult};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct State {
    active: BTreeSet<u16>,
    ensured: Vec<u16>,
    released: Vec<u16>,
    fail_ensure: HashSet<u16>,
    fail_release: HashSet<u16>,
}

/// Cloneable fake of the authenticator's per-VLAN group contexts.
///
/// `ensure_group` activates a context unless a failure was injected for
/// that VLAN. `release_group` always deactivates and only errors when a
/// failure was injected, so rollback paths can call it unconditionally.
#[derive(Debug, Clone, Default)]
pub struct FakeGroupKeys {
    state: Arc<Mutex<State>>,
}

impl FakeGroupKeys {
    /// Creates a manager with no active contexts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `ensure_group(vlan_id)` fail.
    pub fn fail_ensure(&self, vlan_id: u16) {
        self.state.lock().fail_ensure.insert(vlan_id);
    }

    /// Makes `release_group(vlan_id)` fail.
    pub fn fail_release(&self, vlan_id: u16) {
        self.state.lock().fail_release.insert(vlan_id);
    }

    /// VLAN ids with an active context, sorted.
    pub fn active(&self) -> Vec<u16> {
        self.state.lock().active.iter().copied().collect()
    }

    /// Every `ensure_group` argument, in call order.
    pub fn ensured(&self) -> Vec<u16> {
        self.state.lock().ensured.clone()
    }

    /// Every `release_group` argument, in call order.
    pub fn released(&self) -> Vec<u16> {
        self.state.lock().released.clone()
    }
}

#[async_trait]
impl GroupKeyManager for FakeGroupKeys {
    async fn ensure_group(&self, vlan_id: VlanId) -> VlanResult<()> {
        let id = vlan_id.as_u16();
        let mut state = self.state.lock();
        state.ensured.push(id);
        if state.fail_ensure.contains(&id) {
            tracing::debug!(vlan_id = id, "Injected ensure_group failure");
            return Err(VlanError::group_key(id, "injected failure"));
        }
        state.active.insert(id);
        Ok(())
    }

    async fn release_group(&self, vlan_id: VlanId) -> VlanResult<()> {
        let id = vlan_id.as_u16();
        let mut state = self.state.lock();
        state.released.push(id);
        state.active.remove(&id);
        if state.fail_release.contains(&id) {
            tracing::debug!(vlan_id = id, "Injected release_group failure");
            return Err(VlanError::group_key(id, "injected failure"));
        }
        Ok(())
    }
}
