//! VLAN interface lifecycle controller.
//!
//! Owns the VLAN table and the shared resource registry, and drives a
//! [`KernelDriver`] and a [`GroupKeyManager`] through two paths:
//!
//! - the explicit path ([`bring_up`](VlanController::bring_up) /
//!   [`tear_down`](VlanController::tear_down)) creates or destroys the
//!   client-facing interface and its group key context;
//! - the event path ([`on_link_appeared`](VlanController::on_link_appeared) /
//!   [`on_link_disappeared`](VlanController::on_link_disappeared)) bridges a
//!   client interface once the kernel reports it, and undoes exactly what
//!   was done once it goes away.
//!
//! Bring-up failures are rolled back and returned. Teardown never stops
//! early: failures are logged and the remaining steps still run.

use tracing::{debug, error, info, instrument, warn};

use apvlan_common::{
    AdminState, CleanFlags, GroupKeyManager, KernelDriver, VlanError, VlanId, VlanResult,
};

use crate::naming::NamingPolicy;
use crate::registry::ResourceRegistry;
use crate::table::{VlanEntry, VlanTable};

/// Behaviour switches of the controller.
#[derive(Debug, Clone, Default)]
pub struct VlanSettings {
    /// Bridge client interfaces and track kernel link events.
    pub full_dynamic: bool,
    /// Legacy WEP keys are configured on the client interface.
    pub wep_keys_configured: bool,
    /// Bridge and VLAN interface naming.
    pub naming: NamingPolicy,
}

/// VLAN lifecycle controller.
pub struct VlanController<D, G> {
    driver: D,
    group_keys: G,
    registry: ResourceRegistry,
    pub(crate) vlans: VlanTable,
    pub(crate) settings: VlanSettings,
}

impl<D, G> VlanController<D, G>
where
    D: KernelDriver,
    G: GroupKeyManager,
{
    /// Creates a controller with an empty VLAN table.
    pub fn new(driver: D, group_keys: G, settings: VlanSettings) -> Self {
        Self {
            driver,
            group_keys,
            registry: ResourceRegistry::new(),
            vlans: VlanTable::new(),
            settings,
        }
    }

    /// Appends a configured entry to the table.
    pub fn add_entry(&mut self, entry: VlanEntry) {
        self.vlans.push_back(entry);
    }

    /// The VLAN table.
    pub fn vlans(&self) -> &VlanTable {
        &self.vlans
    }

    /// The shared resource registry.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// The kernel driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The group key manager.
    pub fn group_keys(&self) -> &G {
        &self.group_keys
    }

    /// The controller settings.
    pub fn settings(&self) -> &VlanSettings {
        &self.settings
    }

    /// Brings up every configured VLAN at process start.
    ///
    /// Existing interfaces are reused. In full dynamic mode each entry is
    /// bridged right away instead of waiting for its link notification.
    pub async fn start(&mut self) -> VlanResult<()> {
        let entries: Vec<VlanEntry> = self
            .vlans
            .iter()
            .filter(|e| !e.is_wildcard())
            .cloned()
            .collect();

        for entry in entries {
            if let Err(e) = self.bring_up(&entry, true).await {
                error!("Could not add VLAN {}: {}", entry.ifname, e);
                return Err(e);
            }
            if self.settings.full_dynamic {
                self.on_link_appeared(&entry.ifname).await;
            }
        }

        info!(entries = self.vlans.len(), "VLAN interfaces initialized");
        Ok(())
    }

    /// Removes every entry, undoing everything this process set up.
    pub async fn shutdown(&mut self) {
        for ifname in self.vlans.ifnames() {
            self.remove(&ifname).await;
        }
        info!(
            tracked = self.registry.len(),
            "VLAN interfaces deinitialized"
        );
    }

    /// Creates the client interface of `entry` and its group key context.
    ///
    /// With `exists_ok` an interface that already exists is reused,
    /// otherwise it is an error. Any failure after the interface was
    /// created by this call destroys it again before returning.
    #[instrument(skip(self, entry), fields(ifname = %entry.ifname, vlan = %entry.vlan))]
    pub async fn bring_up(&self, entry: &VlanEntry, exists_ok: bool) -> VlanResult<()> {
        // The template has no VLAN id of its own.
        let vlan_id = entry.vlan_id().ok_or(VlanError::InvalidVlanId(0))?;

        if self.settings.wep_keys_configured {
            return Err(VlanError::policy_refused(
                &entry.ifname,
                "dynamic VLAN is not supported with WEP keys",
            ));
        }

        let created = if self.driver.interface_exists(&entry.ifname).await {
            if !exists_ok {
                return Err(VlanError::InterfaceExists {
                    ifname: entry.ifname.clone(),
                });
            }
            debug!("Reusing existing interface {}", entry.ifname);
            false
        } else {
            self.driver.create_station_iface(&entry.ifname).await?;
            true
        };

        if let Err(e) = self
            .driver
            .set_admin_state(&entry.ifname, AdminState::Up)
            .await
        {
            error!("Could not bring up {}: {}", entry.ifname, e);
            self.roll_back(&entry.ifname, created).await;
            return Err(e);
        }

        if let Err(e) = self.group_keys.ensure_group(vlan_id).await {
            error!("Group key setup for VLAN {} failed: {}", vlan_id, e);
            if let Err(release_err) = self.group_keys.release_group(vlan_id).await {
                error!("Group key release for {} failed: {}", entry.ifname, release_err);
            }
            self.roll_back(&entry.ifname, created).await;
            return Err(e);
        }

        info!("VLAN interface {} ready", entry.ifname);
        Ok(())
    }

    async fn roll_back(&self, ifname: &str, created: bool) {
        if !created {
            return;
        }
        if let Err(e) = self.driver.remove_station_iface(ifname).await {
            error!("Could not remove {} during rollback: {}", ifname, e);
        }
    }

    /// Releases the group key context of `entry` and destroys its client
    /// interface.
    ///
    /// A group key failure is logged and does not stop the removal.
    #[instrument(skip(self, entry), fields(ifname = %entry.ifname, vlan = %entry.vlan))]
    pub async fn tear_down(&self, entry: &VlanEntry) -> VlanResult<()> {
        let vlan_id = entry.vlan_id().ok_or(VlanError::InvalidVlanId(0))?;

        if let Err(e) = self.group_keys.release_group(vlan_id).await {
            warn!("Group key release for {} failed: {}", entry.ifname, e);
        }

        self.driver.remove_station_iface(&entry.ifname).await?;
        info!("VLAN interface {} removed", entry.ifname);
        Ok(())
    }

    /// Removes the entry named `ifname`.
    ///
    /// Runs [`tear_down`](Self::tear_down) for concrete entries, then the
    /// bridge teardown in full dynamic mode. Returns false if no entry has
    /// that name.
    #[instrument(skip(self))]
    pub async fn remove(&mut self, ifname: &str) -> bool {
        let Some(entry) = self.vlans.find(ifname).cloned() else {
            return false;
        };

        if !entry.is_wildcard() {
            if let Err(e) = self.tear_down(&entry).await {
                warn!("Could not remove VLAN interface {}: {}", ifname, e);
            }
        }
        self.unlink(ifname).await;
        true
    }

    /// Handles a kernel report that `ifname` exists.
    ///
    /// The first unconfigured entry named `ifname` becomes configured and
    /// is bridged. Repeated reports are no-ops.
    #[instrument(skip(self))]
    pub async fn on_link_appeared(&mut self, ifname: &str) {
        if self.vlans.is_configured(ifname) {
            debug!("{} is already configured", ifname);
            return;
        }
        let Some(entry) = self.vlans.find_pending_mut(ifname) else {
            return;
        };
        let Some(vlan_id) = entry.vlan_id() else {
            return;
        };
        entry.configured = true;

        let clean = self.bridge_entry(ifname, vlan_id).await;

        if let Some(entry) = self.vlans.find_mut(ifname) {
            entry.clean |= clean;
        }
    }

    /// Handles a kernel report that `ifname` is gone.
    ///
    /// Undoes the bridging recorded for the entry and drops the entry.
    #[instrument(skip(self))]
    pub async fn on_link_disappeared(&mut self, ifname: &str) {
        self.unlink_entry(ifname).await;
    }

    /// Drops the entry named `ifname`, unbridging it first when this
    /// process bridged it.
    pub(crate) async fn unlink(&mut self, ifname: &str) {
        if self.settings.full_dynamic {
            self.unlink_entry(ifname).await;
        } else {
            self.vlans.remove(ifname);
        }
    }

    async fn unlink_entry(&mut self, ifname: &str) {
        let Some(entry) = self.vlans.find(ifname).cloned() else {
            return;
        };
        if entry.configured {
            if let Some(vlan_id) = entry.vlan_id() {
                self.unbridge_entry(&entry, vlan_id).await;
            }
        }
        self.vlans.remove(ifname);
    }

    async fn bridge_entry(&mut self, ifname: &str, vlan_id: VlanId) -> CleanFlags {
        let bridge = self.settings.naming.bridge_name(vlan_id);

        let created = match self.driver.create_bridge(&bridge).await {
            Ok(outcome) => outcome.created(),
            Err(e) => {
                warn!("Could not create bridge {}: {}", bridge, e);
                false
            }
        };
        self.registry
            .acquire(&bridge, CleanFlags::when(created, CleanFlags::BRIDGE));
        self.set_admin(&bridge, AdminState::Up).await;

        let tagged = self.settings.naming.tagged_interface.clone();
        let vlan_ifname = self.settings.naming.vlan_iface_name(vlan_id);
        if let (Some(parent), Some(vlan_ifname)) = (tagged, vlan_ifname) {
            let mut clean = CleanFlags::empty();
            self.set_admin(&parent, AdminState::Up).await;

            match self
                .driver
                .create_vlan_iface(&parent, vlan_id, &vlan_ifname)
                .await
            {
                Ok(outcome) => clean |= CleanFlags::when(outcome.created(), CleanFlags::VLAN_IFACE),
                Err(e) => warn!("Could not create VLAN interface {}: {}", vlan_ifname, e),
            }
            match self.driver.attach_port(&bridge, &vlan_ifname).await {
                Ok(outcome) => clean |= CleanFlags::when(outcome.attached(), CleanFlags::VLAN_PORT),
                Err(e) => warn!("Could not add {} to {}: {}", vlan_ifname, bridge, e),
            }

            self.registry.acquire(&vlan_ifname, clean);
            self.set_admin(&vlan_ifname, AdminState::Up).await;
        }

        let mut own = CleanFlags::empty();
        match self.driver.attach_port(&bridge, ifname).await {
            Ok(outcome) => own |= CleanFlags::when(outcome.attached(), CleanFlags::WLAN_PORT),
            Err(e) => warn!("Could not add {} to {}: {}", ifname, bridge, e),
        }
        self.set_admin(ifname, AdminState::Up).await;

        info!(clean = %own, "Bridged {} into {}", ifname, bridge);
        own
    }

    async fn unbridge_entry(&mut self, entry: &VlanEntry, vlan_id: VlanId) {
        let bridge = self.settings.naming.bridge_name(vlan_id);

        if entry.clean.contains(CleanFlags::WLAN_PORT) {
            if let Err(e) = self.driver.detach_port(&bridge, &entry.ifname).await {
                warn!("Could not remove {} from {}: {}", entry.ifname, bridge, e);
            }
        }

        if let Some(vlan_ifname) = self.settings.naming.vlan_iface_name(vlan_id) {
            let clean = self.registry.release(&vlan_ifname).unwrap_or_default();

            if clean.contains(CleanFlags::VLAN_PORT) {
                if let Err(e) = self.driver.detach_port(&bridge, &vlan_ifname).await {
                    warn!("Could not remove {} from {}: {}", vlan_ifname, bridge, e);
                }
            }
            if clean.contains(CleanFlags::VLAN_IFACE) {
                self.set_admin(&vlan_ifname, AdminState::Down).await;
                if let Err(e) = self.driver.delete_vlan_iface(&vlan_ifname).await {
                    warn!("Could not delete VLAN interface {}: {}", vlan_ifname, e);
                }
            }
        }

        let clean = self.registry.release(&bridge).unwrap_or_default();
        if clean.contains(CleanFlags::BRIDGE) {
            match self.driver.count_ports(&bridge).await {
                Ok(0) => {
                    self.set_admin(&bridge, AdminState::Down).await;
                    if let Err(e) = self.driver.delete_bridge(&bridge).await {
                        warn!("Could not delete bridge {}: {}", bridge, e);
                    }
                }
                Ok(ports) => debug!("Keeping bridge {} with {} ports", bridge, ports),
                Err(e) => warn!("Could not count ports of {}: {}", bridge, e),
            }
        }

        info!("Unbridged {} from {}", entry.ifname, bridge);
    }

    async fn set_admin(&self, name: &str, state: AdminState) {
        if let Err(e) = self.driver.set_admin_state(name, state).await {
            warn!("Could not set {} {}: {}", name, state, e);
        }
    }
}
