//! In-memory group key context table.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use apvlan_common::{GroupKeyManager, VlanError, VlanId, VlanResult};

/// Tracks which VLANs have a group key context.
///
/// Every station interface bound to a VLAN holds one reference on that
/// VLAN's context; the context is dropped with the last reference.
///
/// When WPA is disabled there are no group keys, so every call succeeds
/// without tracking anything.
#[derive(Debug)]
pub struct GroupContextTable {
    enabled: bool,
    users: Mutex<HashMap<VlanId, usize>>,
}

impl GroupContextTable {
    /// Creates a table. `enabled` mirrors whether WPA is configured.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if `vlan_id` has a context.
    pub fn is_active(&self, vlan_id: VlanId) -> bool {
        self.users.lock().contains_key(&vlan_id)
    }

    /// Number of interfaces holding the context of `vlan_id`.
    pub fn users(&self, vlan_id: VlanId) -> usize {
        self.users.lock().get(&vlan_id).copied().unwrap_or(0)
    }

    /// Number of active contexts.
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    /// Returns true if no context is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GroupKeyManager for GroupContextTable {
    async fn ensure_group(&self, vlan_id: VlanId) -> VlanResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut users = self.users.lock();
        let count = users.entry(vlan_id).or_insert(0);
        *count += 1;
        if *count == 1 {
            info!("Group key context created for VLAN {}", vlan_id);
        } else {
            debug!("Group key context for VLAN {} now has {} users", vlan_id, count);
        }
        Ok(())
    }

    async fn release_group(&self, vlan_id: VlanId) -> VlanResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut users = self.users.lock();
        let Some(count) = users.get_mut(&vlan_id) else {
            return Err(VlanError::group_key(vlan_id.as_u16(), "no group context"));
        };
        *count -= 1;
        if *count == 0 {
            users.remove(&vlan_id);
            info!("Group key context released for VLAN {}", vlan_id);
        } else {
            debug!("Group key context for VLAN {} still has {} users", vlan_id, count);
        }
        Ok(())
    }
}
