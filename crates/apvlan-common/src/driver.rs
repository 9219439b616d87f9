//! Kernel resource driver trait.
//!
//! The lifecycle controller never talks to the kernel directly. It goes
//! through a [`KernelDriver`], which lets the whole bring-up/teardown
//! sequence run against an in-memory fake in tests.
//!
//! Every create/attach primitive distinguishes "I did it" from "it was
//! already done". The controller records only the former in its clean
//! flags, which keeps replayed or reordered kernel events harmless.

use async_trait::async_trait;

use crate::error::VlanResult;
use crate::types::{AdminState, VlanId};

/// Result of an idempotent create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This call created the object.
    Created,
    /// The object already existed; nothing was done.
    AlreadyExists,
}

impl CreateOutcome {
    /// Returns true if this call created the object.
    pub fn created(&self) -> bool {
        matches!(self, CreateOutcome::Created)
    }
}

/// Result of an idempotent bridge-port attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// This call attached the port.
    Attached,
    /// The port was already attached; nothing was done.
    AlreadyAttached,
}

impl AttachOutcome {
    /// Returns true if this call attached the port.
    pub fn attached(&self) -> bool {
        matches!(self, AttachOutcome::Attached)
    }
}

/// Kernel-facing primitives for bridges, VLAN interfaces and ports.
///
/// Calls are not retried by the caller. Delete/detach of something that
/// is already gone must succeed.
#[async_trait]
pub trait KernelDriver: Send + Sync {
    /// Creates a bridge.
    async fn create_bridge(&self, name: &str) -> VlanResult<CreateOutcome>;

    /// Deletes a bridge. A missing bridge is not an error.
    async fn delete_bridge(&self, name: &str) -> VlanResult<()>;

    /// Adds `iface` as a port of `bridge`.
    async fn attach_port(&self, bridge: &str, iface: &str) -> VlanResult<AttachOutcome>;

    /// Removes `iface` from `bridge`. A missing port is not an error.
    async fn detach_port(&self, bridge: &str, iface: &str) -> VlanResult<()>;

    /// Returns the number of ports attached to `bridge`.
    async fn count_ports(&self, bridge: &str) -> VlanResult<usize>;

    /// Creates the 802.1Q interface `name` for `vlan_id` on top of `parent`.
    async fn create_vlan_iface(
        &self,
        parent: &str,
        vlan_id: VlanId,
        name: &str,
    ) -> VlanResult<CreateOutcome>;

    /// Deletes a VLAN interface.
    async fn delete_vlan_iface(&self, name: &str) -> VlanResult<()>;

    /// Sets the administrative state of an interface.
    async fn set_admin_state(&self, name: &str, state: AdminState) -> VlanResult<()>;

    /// Returns true if the kernel currently knows an interface called `name`.
    async fn interface_exists(&self, name: &str) -> bool;

    /// Creates the client-facing (wireless) interface `name`.
    async fn create_station_iface(&self, name: &str) -> VlanResult<()>;

    /// Destroys the client-facing interface `name`.
    async fn remove_station_iface(&self, name: &str) -> VlanResult<()>;
}
