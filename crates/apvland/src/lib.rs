//! apvland - VLAN interface lifecycle daemon for wireless access points
//!
//! Maps wireless clients onto per-VLAN interfaces. Each client-facing
//! interface is bridged with an optional tagged uplink VLAN interface,
//! shared bridge and VLAN interfaces are reference counted, and kernel
//! link notifications drive plumbing and cleanup.

mod allocator;
mod commands;
mod config;
mod controller;
mod groups;
mod ip_driver;
mod listener;
mod naming;
mod registry;
mod table;

pub use allocator::DynamicRelease;
pub use commands::*;
pub use config::{
    ApVlanConfig, DynamicVlan, InterfaceConfig, LoggingConfig, NamingConfig, VlanConfig,
    VlanIdSetting, DEFAULT_CONFIG_PATH,
};
pub use controller::{VlanController, VlanSettings};
pub use groups::GroupContextTable;
pub use ip_driver::{IpLinkDriver, DEFAULT_STATION_IFACE_TYPE};
pub use listener::*;
pub use naming::{NamingPolicy, VlanNaming, DEFAULT_PLACEHOLDER};
pub use registry::{ResourceRegistry, SharedResource};
pub use table::{VlanEntry, VlanTable, VlanTag};
