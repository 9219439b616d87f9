//! In-memory kernel for lifecycle tests.
//!
//! `FakeKernel` models just enough of the link layer for the controller:
//! interfaces with an admin state, bridges with their ports, and 802.1Q
//! interfaces with their parent. Every call is appended to a journal so
//! tests can assert ordering and idempotence, and any operation can be
//! made to fail for a given name.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use apvlan_common::{
    AdminState, AttachOutcome, CreateOutcome, KernelDriver, VlanError, VlanId, VlanResult,
};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Point-in-time copy of the fake kernel's objects.
///
/// Two snapshots compare equal when the same interfaces exist with the
/// same admin state, the same bridges hold the same ports, and the same
/// VLAN interfaces exist. The journal is not part of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelSnapshot {
    /// Interface name to admin state.
    pub interfaces: BTreeMap<String, AdminState>,
    /// Bridge name to port names.
    pub bridges: BTreeMap<String, BTreeSet<String>>,
    /// VLAN interface name to (parent, vlan id).
    pub vlan_ifaces: BTreeMap<String, (String, u16)>,
}

#[derive(Debug, Default)]
struct State {
    objects: KernelSnapshot,
    journal: Vec<String>,
    failures: HashSet<(String, String)>,
}

impl State {
    fn record(&mut self, op: &str, args: &str) {
        self.journal.push(format!("{} {}", op, args));
    }

    fn check_failure(&self, op: &str, name: &str) -> VlanResult<()> {
        if self.failures.contains(&(op.to_string(), name.to_string()))
            || self.failures.contains(&(op.to_string(), "*".to_string()))
        {
            return Err(VlanError::kernel(op, name, "injected failure"));
        }
        Ok(())
    }

    fn bridge_of(&self, iface: &str) -> Option<String> {
        self.objects
            .bridges
            .iter()
            .find(|(_, ports)| ports.contains(iface))
            .map(|(bridge, _)| bridge.clone())
    }

    fn forget_interface(&mut self, name: &str) {
        self.objects.interfaces.remove(name);
        self.objects.vlan_ifaces.remove(name);
        self.objects.bridges.remove(name);
        for ports in self.objects.bridges.values_mut() {
            ports.remove(name);
        }
    }
}

/// Cloneable handle to an in-memory kernel.
///
/// Clones share state, so a test can hand one clone to the controller
/// and keep another for assertions.
#[derive(Debug, Clone, Default)]
pub struct FakeKernel {
    state: Arc<Mutex<State>>,
}

impl FakeKernel {
    /// Creates an empty kernel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a kernel that already has the given interfaces (admin down).
    pub fn with_interfaces<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kernel = Self::new();
        for name in names {
            kernel.add_interface(name);
        }
        kernel
    }

    /// Makes an interface appear, as if created outside the daemon.
    pub fn add_interface(&self, name: impl Into<String>) {
        self.state
            .lock()
            .objects
            .interfaces
            .insert(name.into(), AdminState::Down);
    }

    /// Makes an interface vanish, as if removed outside the daemon.
    pub fn remove_interface(&self, name: &str) {
        self.state.lock().forget_interface(name);
    }

    /// Attaches a port without going through the driver.
    pub fn add_port(&self, bridge: &str, iface: &str) {
        self.state
            .lock()
            .objects
            .bridges
            .entry(bridge.to_string())
            .or_default()
            .insert(iface.to_string());
    }

    /// Makes `op` fail for `name` until cleared. `"*"` matches every name.
    pub fn fail(&self, op: &str, name: &str) {
        self.state
            .lock()
            .failures
            .insert((op.to_string(), name.to_string()));
    }

    /// Clears every injected failure.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Returns true if an interface (of any type) exists.
    pub fn exists(&self, name: &str) -> bool {
        self.state.lock().objects.interfaces.contains_key(name)
    }

    /// Returns the admin state of an interface.
    pub fn admin_state(&self, name: &str) -> Option<AdminState> {
        self.state.lock().objects.interfaces.get(name).copied()
    }

    /// Returns true if `name` is a bridge.
    pub fn is_bridge(&self, name: &str) -> bool {
        self.state.lock().objects.bridges.contains_key(name)
    }

    /// Returns true if `name` is a VLAN interface.
    pub fn is_vlan_iface(&self, name: &str) -> bool {
        self.state.lock().objects.vlan_ifaces.contains_key(name)
    }

    /// Returns the ports of a bridge, sorted.
    pub fn ports(&self, bridge: &str) -> Vec<String> {
        self.state
            .lock()
            .objects
            .bridges
            .get(bridge)
            .map(|ports| ports.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns a copy of every kernel object.
    pub fn snapshot(&self) -> KernelSnapshot {
        self.state.lock().objects.clone()
    }

    /// Returns the call journal, oldest first, as `"<op> <args>"` lines.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().journal.clone()
    }

    /// Returns the argument strings of every call to `op`.
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        let prefix = format!("{} ", op);
        self.state
            .lock()
            .journal
            .iter()
            .filter_map(|line| line.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Returns how many times `op` was called.
    pub fn count(&self, op: &str) -> usize {
        self.calls_of(op).len()
    }

    /// Clears the journal.
    pub fn clear_calls(&self) {
        self.state.lock().journal.clear();
    }
}

#[async_trait]
impl KernelDriver for FakeKernel {
    async fn create_bridge(&self, name: &str) -> VlanResult<CreateOutcome> {
        let mut state = self.state.lock();
        state.record("create_bridge", name);
        state.check_failure("create_bridge", name)?;

        if state.objects.interfaces.contains_key(name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state
            .objects
            .interfaces
            .insert(name.to_string(), AdminState::Down);
        state
            .objects
            .bridges
            .insert(name.to_string(), BTreeSet::new());
        Ok(CreateOutcome::Created)
    }

    async fn delete_bridge(&self, name: &str) -> VlanResult<()> {
        let mut state = self.state.lock();
        state.record("delete_bridge", name);
        state.check_failure("delete_bridge", name)?;

        if state.objects.bridges.contains_key(name) {
            state.forget_interface(name);
        }
        Ok(())
    }

    async fn attach_port(&self, bridge: &str, iface: &str) -> VlanResult<AttachOutcome> {
        let mut state = self.state.lock();
        state.record("attach_port", &format!("{} {}", bridge, iface));
        state.check_failure("attach_port", iface)?;

        if !state.objects.bridges.contains_key(bridge) {
            return Err(VlanError::kernel("attach_port", bridge, "No such bridge"));
        }
        if !state.objects.interfaces.contains_key(iface) {
            return Err(VlanError::kernel("attach_port", iface, "No such device"));
        }
        match state.bridge_of(iface) {
            Some(current) if current == bridge => Ok(AttachOutcome::AlreadyAttached),
            Some(current) => Err(VlanError::kernel(
                "attach_port",
                iface,
                format!("already a port of {}", current),
            )),
            None => {
                if let Some(ports) = state.objects.bridges.get_mut(bridge) {
                    ports.insert(iface.to_string());
                }
                Ok(AttachOutcome::Attached)
            }
        }
    }

    async fn detach_port(&self, bridge: &str, iface: &str) -> VlanResult<()> {
        let mut state = self.state.lock();
        state.record("detach_port", &format!("{} {}", bridge, iface));
        state.check_failure("detach_port", iface)?;

        if let Some(ports) = state.objects.bridges.get_mut(bridge) {
            ports.remove(iface);
        }
        Ok(())
    }

    async fn count_ports(&self, bridge: &str) -> VlanResult<usize> {
        let mut state = self.state.lock();
        state.record("count_ports", bridge);
        state.check_failure("count_ports", bridge)?;

        state
            .objects
            .bridges
            .get(bridge)
            .map(BTreeSet::len)
            .ok_or_else(|| VlanError::kernel("count_ports", bridge, "No such bridge"))
    }

    async fn create_vlan_iface(
        &self,
        parent: &str,
        vlan_id: VlanId,
        name: &str,
    ) -> VlanResult<CreateOutcome> {
        let mut state = self.state.lock();
        state.record(
            "create_vlan_iface",
            &format!("{} {} {}", parent, vlan_id, name),
        );
        state.check_failure("create_vlan_iface", name)?;

        if state.objects.interfaces.contains_key(name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        if !state.objects.interfaces.contains_key(parent) {
            return Err(VlanError::kernel(
                "create_vlan_iface",
                parent,
                "Cannot find device",
            ));
        }
        state
            .objects
            .interfaces
            .insert(name.to_string(), AdminState::Down);
        state
            .objects
            .vlan_ifaces
            .insert(name.to_string(), (parent.to_string(), vlan_id.as_u16()));
        Ok(CreateOutcome::Created)
    }

    async fn delete_vlan_iface(&self, name: &str) -> VlanResult<()> {
        let mut state = self.state.lock();
        state.record("delete_vlan_iface", name);
        state.check_failure("delete_vlan_iface", name)?;

        if state.objects.vlan_ifaces.contains_key(name) {
            state.forget_interface(name);
        }
        Ok(())
    }

    async fn set_admin_state(&self, name: &str, admin: AdminState) -> VlanResult<()> {
        let mut state = self.state.lock();
        state.record("set_admin_state", &format!("{} {}", name, admin));
        state.check_failure("set_admin_state", name)?;

        match state.objects.interfaces.get_mut(name) {
            Some(current) => {
                *current = admin;
                Ok(())
            }
            None => Err(VlanError::kernel(
                "set_admin_state",
                name,
                "Cannot find device",
            )),
        }
    }

    async fn interface_exists(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        state.record("interface_exists", name);
        state.objects.interfaces.contains_key(name)
    }

    async fn create_station_iface(&self, name: &str) -> VlanResult<()> {
        let mut state = self.state.lock();
        state.record("create_station_iface", name);
        state.check_failure("create_station_iface", name)?;

        if state.objects.interfaces.contains_key(name) {
            return Err(VlanError::kernel(
                "create_station_iface",
                name,
                "File exists",
            ));
        }
        state
            .objects
            .interfaces
            .insert(name.to_string(), AdminState::Down);
        Ok(())
    }

    async fn remove_station_iface(&self, name: &str) -> VlanResult<()> {
        let mut state = self.state.lock();
        state.record("remove_station_iface", name);
        state.check_failure("remove_station_iface", name)?;

        if !state.objects.interfaces.contains_key(name) {
            return Err(VlanError::kernel(
                "remove_station_iface",
                name,
                "No such device",
            ));
        }
        state.forget_interface(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vid(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_bridge_create_is_idempotent() {
        let kernel = FakeKernel::new();
        assert_eq!(
            kernel.create_bridge("brvlan10").await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            kernel.create_bridge("brvlan10").await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert!(kernel.is_bridge("brvlan10"));
        assert_eq!(kernel.count("create_bridge"), 2);
    }

    #[tokio::test]
    async fn test_attach_and_detach() {
        let kernel = FakeKernel::with_interfaces(["wlan0.10"]);
        kernel.create_bridge("brvlan10").await.unwrap();

        assert_eq!(
            kernel.attach_port("brvlan10", "wlan0.10").await.unwrap(),
            AttachOutcome::Attached
        );
        assert_eq!(
            kernel.attach_port("brvlan10", "wlan0.10").await.unwrap(),
            AttachOutcome::AlreadyAttached
        );
        assert_eq!(kernel.count_ports("brvlan10").await.unwrap(), 1);

        kernel.detach_port("brvlan10", "wlan0.10").await.unwrap();
        kernel.detach_port("brvlan10", "wlan0.10").await.unwrap();
        assert_eq!(kernel.count_ports("brvlan10").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vlan_iface_requires_parent() {
        let kernel = FakeKernel::new();
        assert!(kernel
            .create_vlan_iface("eth0", vid(10), "vlan10")
            .await
            .is_err());

        kernel.add_interface("eth0");
        assert_eq!(
            kernel
                .create_vlan_iface("eth0", vid(10), "vlan10")
                .await
                .unwrap(),
            CreateOutcome::Created
        );
        assert!(kernel.is_vlan_iface("vlan10"));

        kernel.delete_vlan_iface("vlan10").await.unwrap();
        assert!(!kernel.exists("vlan10"));
    }

    #[tokio::test]
    async fn test_removed_interface_leaves_bridge() {
        let kernel = FakeKernel::with_interfaces(["wlan0.10"]);
        kernel.create_bridge("brvlan10").await.unwrap();
        kernel.attach_port("brvlan10", "wlan0.10").await.unwrap();

        kernel.remove_interface("wlan0.10");

        assert!(kernel.ports("brvlan10").is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let kernel = FakeKernel::new();
        kernel.fail("create_bridge", "brvlan10");

        assert!(kernel.create_bridge("brvlan10").await.is_err());
        assert!(!kernel.exists("brvlan10"));
        assert_eq!(kernel.calls(), vec!["create_bridge brvlan10".to_string()]);

        kernel.clear_failures();
        assert!(kernel.create_bridge("brvlan10").await.is_ok());
    }

    #[tokio::test]
    async fn test_wildcard_failure() {
        let kernel = FakeKernel::with_interfaces(["wlan0.1"]);
        kernel.fail("set_admin_state", "*");
        assert!(kernel
            .set_admin_state("wlan0.1", AdminState::Up)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_station_iface_lifecycle() {
        let kernel = FakeKernel::new();
        kernel.create_station_iface("wlan0.10").await.unwrap();
        assert!(kernel.create_station_iface("wlan0.10").await.is_err());
        assert!(kernel.interface_exists("wlan0.10").await);

        kernel.remove_station_iface("wlan0.10").await.unwrap();
        assert!(!kernel.interface_exists("wlan0.10").await);
        assert!(kernel.remove_station_iface("wlan0.10").await.is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let kernel = FakeKernel::new();
        let other = kernel.clone();
        other.add_interface("eth0");
        assert!(kernel.exists("eth0"));
        assert_eq!(kernel.admin_state("eth0"), Some(AdminState::Down));
    }
}
