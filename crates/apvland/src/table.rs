//! VLAN entries and the ordered table that owns them.

use std::collections::VecDeque;
use std::fmt;

use apvlan_common::{CleanFlags, VlanId};

/// VLAN of an entry: a concrete id or the wildcard template marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VlanTag {
    /// Template, instantiated per client.
    Wildcard,
    /// Concrete VLAN.
    Id(VlanId),
}

impl VlanTag {
    /// Returns the concrete id, if any.
    pub fn id(&self) -> Option<VlanId> {
        match self {
            VlanTag::Wildcard => None,
            VlanTag::Id(id) => Some(*id),
        }
    }

    /// Returns true for the wildcard template.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, VlanTag::Wildcard)
    }
}

impl fmt::Display for VlanTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VlanTag::Wildcard => f.write_str("*"),
            VlanTag::Id(id) => write!(f, "{}", id),
        }
    }
}

/// One logical VLAN binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanEntry {
    /// Client-facing interface. Holds the placeholder for a template.
    pub ifname: String,
    /// VLAN id or wildcard.
    pub vlan: VlanTag,
    /// Set once the kernel has reported `ifname`.
    pub configured: bool,
    /// Side effects this entry must undo.
    pub clean: CleanFlags,
    /// Live client sessions on an allocator-created entry.
    pub dynamic_refs: u32,
}

impl VlanEntry {
    /// Static entry for a concrete VLAN.
    pub fn new(ifname: impl Into<String>, vlan_id: VlanId) -> Self {
        Self {
            ifname: ifname.into(),
            vlan: VlanTag::Id(vlan_id),
            configured: false,
            clean: CleanFlags::empty(),
            dynamic_refs: 0,
        }
    }

    /// Wildcard template.
    pub fn wildcard(ifname: impl Into<String>) -> Self {
        Self {
            ifname: ifname.into(),
            vlan: VlanTag::Wildcard,
            configured: false,
            clean: CleanFlags::empty(),
            dynamic_refs: 0,
        }
    }

    /// Concrete id, `None` for the template.
    pub fn vlan_id(&self) -> Option<VlanId> {
        self.vlan.id()
    }

    /// Returns true for the wildcard template.
    pub fn is_wildcard(&self) -> bool {
        self.vlan.is_wildcard()
    }
}

/// Ordered collection of [`VlanEntry`], looked up by interface name.
///
/// Allocator-created entries go to the front so the template stays last.
#[derive(Debug, Default)]
pub struct VlanTable {
    entries: VecDeque<VlanEntry>,
}

impl VlanTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push_back(&mut self, entry: VlanEntry) {
        self.entries.push_back(entry);
    }

    /// Prepends an entry.
    pub fn push_front(&mut self, entry: VlanEntry) {
        self.entries.push_front(entry);
    }

    /// First entry named `ifname`.
    pub fn find(&self, ifname: &str) -> Option<&VlanEntry> {
        self.entries.iter().find(|e| e.ifname == ifname)
    }

    /// First entry named `ifname`, mutably.
    pub fn find_mut(&mut self, ifname: &str) -> Option<&mut VlanEntry> {
        self.entries.iter_mut().find(|e| e.ifname == ifname)
    }

    /// First unconfigured entry named `ifname`.
    pub fn find_pending_mut(&mut self, ifname: &str) -> Option<&mut VlanEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.ifname == ifname && !e.configured)
    }

    /// Returns true if an entry named `ifname` is configured.
    pub fn is_configured(&self, ifname: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.ifname == ifname && e.configured)
    }

    /// The wildcard template, if configured.
    pub fn wildcard(&self) -> Option<&VlanEntry> {
        self.entries.iter().find(|e| e.is_wildcard())
    }

    /// Allocator-created entry for `vlan_id` with live sessions.
    pub fn find_dynamic_mut(&mut self, vlan_id: VlanId) -> Option<&mut VlanEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.vlan_id() == Some(vlan_id) && e.dynamic_refs > 0)
    }

    /// First concrete entry for `vlan_id`, static or dynamic.
    pub fn find_by_vlan_mut(&mut self, vlan_id: VlanId) -> Option<&mut VlanEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.vlan_id() == Some(vlan_id))
    }

    /// Removes and returns the first entry named `ifname`.
    pub fn remove(&mut self, ifname: &str) -> Option<VlanEntry> {
        let pos = self.entries.iter().position(|e| e.ifname == ifname)?;
        self.entries.remove(pos)
    }

    /// Iterates entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = &VlanEntry> {
        self.entries.iter()
    }

    /// Interface names in table order.
    pub fn ifnames(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.ifname.clone()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
