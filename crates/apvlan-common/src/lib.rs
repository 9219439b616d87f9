//! Common infrastructure for the AP VLAN interface daemon.
//!
//! This crate holds the pieces shared by the daemon (`apvland`) and its
//! test infrastructure (`apvlan-test`):
//!
//! - [`types`]: validated VLAN ids, clean flags, admin state
//! - [`error`]: error taxonomy for lifecycle operations
//! - [`shell`]: safe shell command execution with proper quoting
//! - [`KernelDriver`]: kernel-side bridge/VLAN/port primitives
//! - [`GroupKeyManager`]: per-VLAN group key contexts
//!
//! # Architecture
//!
//! The daemon keeps kernel interfaces in step with the VLANs its clients
//! are mapped onto:
//!
//! 1. Configuration yields static VLAN entries or one wildcard template
//! 2. The lifecycle controller asks a [`KernelDriver`] to create interfaces
//! 3. Kernel link notifications confirm creation and trigger bridging
//! 4. Teardown is driven strictly by recorded [`CleanFlags`]
//!
//! # Example
//!
//! ```ignore
//! use apvlan_common::{AdminState, KernelDriver, VlanResult};
//!
//! async fn bounce<D: KernelDriver>(driver: &D, ifname: &str) -> VlanResult<()> {
//!     driver.set_admin_state(ifname, AdminState::Down).await?;
//!     driver.set_admin_state(ifname, AdminState::Up).await
//! }
//! ```

pub mod driver;
pub mod error;
pub mod group;
pub mod shell;
pub mod types;

// Re-export commonly used items at crate root
pub use driver::{AttachOutcome, CreateOutcome, KernelDriver};
pub use error::{ErrorKind, VlanError, VlanResult};
pub use group::GroupKeyManager;
pub use types::{truncate_ifname, AdminState, CleanFlags, VlanId, IFNAME_MAX_LEN};
