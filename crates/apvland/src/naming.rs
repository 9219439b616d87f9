//! Bridge and VLAN interface naming policy.

use apvlan_common::{truncate_ifname, VlanId};
use serde::{Deserialize, Serialize};

/// Default wildcard placeholder.
pub const DEFAULT_PLACEHOLDER: char = '#';

/// Name form of tagged VLAN interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VlanNaming {
    /// `<parent>.<vid>`
    WithDevice,
    /// `vlan<vid>`
    #[default]
    WithoutDevice,
}

/// How bridge and VLAN interface names are derived from a VLAN id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    /// Explicit bridge prefix; empty means derive from the tagged parent.
    pub bridge_prefix: String,
    /// Tagged parent interface, if VLANs are carried on an uplink.
    pub tagged_interface: Option<String>,
    /// Name form of tagged VLAN interfaces.
    pub vlan_naming: VlanNaming,
    /// Placeholder in wildcard templates.
    pub placeholder: char,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            bridge_prefix: String::new(),
            tagged_interface: None,
            vlan_naming: VlanNaming::default(),
            placeholder: DEFAULT_PLACEHOLDER,
        }
    }
}

impl NamingPolicy {
    /// Bridge for `vlan_id`.
    ///
    /// `<prefix><vid>` if a prefix is set, else `br<parent>.<vid>` if a
    /// tagged parent is set, else `brvlan<vid>`.
    pub fn bridge_name(&self, vlan_id: VlanId) -> String {
        let name = if !self.bridge_prefix.is_empty() {
            format!("{}{}", self.bridge_prefix, vlan_id)
        } else if let Some(parent) = &self.tagged_interface {
            format!("br{}.{}", parent, vlan_id)
        } else {
            format!("brvlan{}", vlan_id)
        };
        truncate_ifname(&name)
    }

    /// Tagged VLAN interface for `vlan_id`, if a tagged parent is set.
    pub fn vlan_iface_name(&self, vlan_id: VlanId) -> Option<String> {
        let parent = self.tagged_interface.as_deref()?;
        let name = match self.vlan_naming {
            VlanNaming::WithDevice => format!("{}.{}", parent, vlan_id),
            VlanNaming::WithoutDevice => format!("vlan{}", vlan_id),
        };
        Some(truncate_ifname(&name))
    }

    /// Replaces the first placeholder in `template` with `vlan_id`.
    ///
    /// Returns `None` if `template` has no placeholder.
    pub fn expand_template(&self, template: &str, vlan_id: VlanId) -> Option<String> {
        let pos = template.find(self.placeholder)?;
        let rest = &template[pos + self.placeholder.len_utf8()..];
        let name = format!("{}{}{}", &template[..pos], vlan_id, rest);
        Some(truncate_ifname(&name))
    }
}
