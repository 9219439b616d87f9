//! Shared value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use crate::error::VlanError;

/// Longest interface name the kernel accepts (IFNAMSIZ - 1).
pub const IFNAME_MAX_LEN: usize = 15;

/// Truncates an interface name to [`IFNAME_MAX_LEN`] bytes.
///
/// Derived names (bridges, VLAN interfaces, instantiated templates) are
/// cut the same way a fixed IFNAMSIZ buffer would cut them. Names are
/// ASCII in practice; a multi-byte character straddling the limit is
/// dropped whole.
pub fn truncate_ifname(name: &str) -> String {
    if name.len() <= IFNAME_MAX_LEN {
        return name.to_string();
    }
    let mut end = IFNAME_MAX_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// IEEE 802.1Q VLAN identifier (1-4094).
///
/// # Examples
///
/// ```
/// use apvlan_common::VlanId;
///
/// let vlan = VlanId::new(10).unwrap();
/// assert_eq!(vlan.as_u16(), 10);
///
/// assert!(VlanId::new(0).is_err());
/// assert!(VlanId::new(4095).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Minimum valid VLAN ID.
    pub const MIN: u16 = 1;

    /// Maximum valid VLAN ID.
    pub const MAX: u16 = 4094;

    /// Creates a new VLAN ID.
    pub fn new(id: u16) -> Result<Self, VlanError> {
        if (Self::MIN..=Self::MAX).contains(&id) {
            Ok(VlanId(id))
        } else {
            Err(VlanError::InvalidVlanId(id))
        }
    }

    /// Returns the VLAN ID as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VlanId {
    type Err = VlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u16 = s.trim().parse().map_err(|_| VlanError::InvalidVlanId(0))?;
        VlanId::new(id)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = VlanError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}

/// Kernel-side side effects an owner is responsible for undoing.
///
/// Teardown is driven by these flags only, never by re-reading kernel
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CleanFlags(u8);

impl CleanFlags {
    /// The bridge was created by us.
    pub const BRIDGE: CleanFlags = CleanFlags(0x1);
    /// The tagged VLAN interface was created by us.
    pub const VLAN_IFACE: CleanFlags = CleanFlags(0x2);
    /// The tagged VLAN interface was attached to the bridge by us.
    pub const VLAN_PORT: CleanFlags = CleanFlags(0x4);
    /// The client-facing interface was attached to the bridge by us.
    pub const WLAN_PORT: CleanFlags = CleanFlags(0x8);

    const NAMES: [(CleanFlags, &'static str); 4] = [
        (CleanFlags::BRIDGE, "bridge"),
        (CleanFlags::VLAN_IFACE, "vlan-iface"),
        (CleanFlags::VLAN_PORT, "vlan-port"),
        (CleanFlags::WLAN_PORT, "wlan-port"),
    ];

    /// No flags.
    pub const fn empty() -> Self {
        CleanFlags(0)
    }

    /// Returns true if no flag is set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if every flag in `other` is set.
    pub const fn contains(&self, other: CleanFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets every flag in `other`.
    pub fn insert(&mut self, other: CleanFlags) {
        self.0 |= other.0;
    }

    /// Returns `flag` if `cond` holds, else no flags.
    pub const fn when(cond: bool, flag: CleanFlags) -> Self {
        if cond {
            flag
        } else {
            CleanFlags(0)
        }
    }
}

impl BitOr for CleanFlags {
    type Output = CleanFlags;

    fn bitor(self, rhs: CleanFlags) -> CleanFlags {
        CleanFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for CleanFlags {
    fn bitor_assign(&mut self, rhs: CleanFlags) {
        self.insert(rhs);
    }
}

impl fmt::Display for CleanFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Administrative state of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    /// IFF_UP set.
    Up,
    /// IFF_UP cleared.
    Down,
}

impl AdminState {
    /// Returns the `ip link set` keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminState::Up => "up",
            AdminState::Down => "down",
        }
    }
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
