//! Test infrastructure for the AP VLAN interface daemon
//!
//! Provides:
//! - An in-memory kernel implementing [`KernelDriver`](apvlan_common::KernelDriver)
//! - A recording group key manager
//! - Fixtures for interface names and raw netlink frames
//! - Verification helpers for kernel state and call journals

pub mod fake_kernel;
pub mod fake_keys;
pub mod fixtures;
mod verification;

pub use fake_kernel::{FakeKernel, KernelSnapshot};
pub use fake_keys::FakeGroupKeys;
pub use fixtures::*;
pub use verification::*;
