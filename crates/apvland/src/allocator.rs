//! Per-client VLAN instantiation from the wildcard template.
//!
//! A client mapped onto VLAN `n` gets the interface named by replacing the
//! template's placeholder with `n`. The first client on a VLAN creates the
//! entry. Later clients only bump its session count, and the entry goes
//! away with the last one.

use tracing::{debug, info, instrument, warn};

use apvlan_common::{GroupKeyManager, KernelDriver, VlanError, VlanId, VlanResult};

use crate::controller::VlanController;
use crate::table::VlanEntry;

/// Outcome of releasing one client session on a VLAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicRelease {
    /// Other sessions remain on the VLAN.
    Retained {
        /// Sessions still mapped onto the VLAN.
        remaining: u32,
    },
    /// The last session left and the VLAN was torn down.
    Removed,
    /// No dynamic entry with live sessions exists for the VLAN.
    NotFound,
}

impl<D, G> VlanController<D, G>
where
    D: KernelDriver,
    G: GroupKeyManager,
{
    /// Creates and brings up the concrete entry for `vlan_id` from
    /// `template`, with one session. Returns the new interface name.
    ///
    /// The entry is dropped again if bring-up fails.
    #[instrument(skip(self, template), fields(template = %template.ifname))]
    pub async fn instantiate(&mut self, template: &VlanEntry, vlan_id: u16) -> VlanResult<String> {
        if !template.is_wildcard() {
            return Err(VlanError::NotWildcard {
                ifname: template.ifname.clone(),
            });
        }
        let vlan_id = VlanId::new(vlan_id)?;
        let ifname = self
            .settings
            .naming
            .expand_template(&template.ifname, vlan_id)
            .ok_or_else(|| VlanError::MissingPlaceholder {
                ifname: template.ifname.clone(),
            })?;

        let mut entry = VlanEntry::new(ifname.clone(), vlan_id);
        entry.dynamic_refs = 1;
        self.vlans.push_front(entry.clone());

        if let Err(e) = self.bring_up(&entry, false).await {
            self.vlans.remove(&ifname);
            return Err(e);
        }

        info!("Instantiated dynamic VLAN {} as {}", vlan_id, ifname);
        Ok(ifname)
    }

    /// Maps one more client session onto `vlan_id` and returns the
    /// interface to bind it to.
    ///
    /// A live dynamic entry gains a session, a static entry is used as is,
    /// and otherwise the wildcard template is instantiated.
    #[instrument(skip(self))]
    pub async fn assign(&mut self, vlan_id: u16) -> VlanResult<String> {
        let id = VlanId::new(vlan_id)?;

        if let Some(entry) = self.vlans.find_by_vlan_mut(id) {
            if entry.dynamic_refs > 0 {
                entry.dynamic_refs += 1;
                debug!(
                    sessions = entry.dynamic_refs,
                    "Joined dynamic VLAN {}", vlan_id
                );
            }
            return Ok(entry.ifname.clone());
        }

        let template = self
            .vlans
            .wildcard()
            .cloned()
            .ok_or(VlanError::NoTemplate { vlan_id })?;
        self.instantiate(&template, vlan_id).await
    }

    /// Drops one client session from `vlan_id`.
    ///
    /// The last session tears the VLAN down and removes its entry. An
    /// unknown VLAN, a static one, or one already released reports
    /// [`DynamicRelease::NotFound`].
    #[instrument(skip(self))]
    pub async fn release(&mut self, vlan_id: u16) -> DynamicRelease {
        let Ok(id) = VlanId::new(vlan_id) else {
            return DynamicRelease::NotFound;
        };
        let Some(entry) = self.vlans.find_dynamic_mut(id) else {
            debug!("No dynamic VLAN {} to release", vlan_id);
            return DynamicRelease::NotFound;
        };

        entry.dynamic_refs -= 1;
        if entry.dynamic_refs > 0 {
            return DynamicRelease::Retained {
                remaining: entry.dynamic_refs,
            };
        }

        let entry = entry.clone();
        if let Err(e) = self.tear_down(&entry).await {
            warn!("Could not remove VLAN interface {}: {}", entry.ifname, e);
        }
        self.unlink(&entry.ifname).await;

        info!("Released dynamic VLAN {} ({})", vlan_id, entry.ifname);
        DynamicRelease::Removed
    }
}
