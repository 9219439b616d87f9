//! Verification helpers for lifecycle tests
//!
//! Provides assertion helpers over the fake kernel's objects and call
//! journal. Helpers return [`VerifyResult`] so tests can `.unwrap()` with
//! a readable message.

use crate::{FakeKernel, KernelSnapshot};
use apvlan_common::AdminState;
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected interface '{name}' to exist")]
    InterfaceMissing { name: String },

    #[error("Expected interface '{name}' to be absent")]
    InterfaceLeaked { name: String },

    #[error("Expected '{name}' to be {expected}, got {actual:?}")]
    AdminStateMismatch {
        name: String,
        expected: AdminState,
        actual: Option<AdminState>,
    },

    #[error("Expected ports of '{bridge}' to be {expected:?}, got {actual:?}")]
    PortsMismatch {
        bridge: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Expected {expected} calls to '{op}', found {actual}")]
    CallCountMismatch {
        op: String,
        expected: usize,
        actual: usize,
    },

    #[error("Kernel state differs from baseline:\n  before: {before:?}\n  after:  {after:?}")]
    StateChanged {
        before: KernelSnapshot,
        after: KernelSnapshot,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Kernel state verifier
pub struct KernelVerifier<'a> {
    kernel: &'a FakeKernel,
}

impl<'a> KernelVerifier<'a> {
    /// Create a new kernel verifier
    pub fn new(kernel: &'a FakeKernel) -> Self {
        Self { kernel }
    }

    /// Verify that an interface exists
    pub fn assert_exists(&self, name: &str) -> VerifyResult<()> {
        if self.kernel.exists(name) {
            Ok(())
        } else {
            Err(VerificationError::InterfaceMissing {
                name: name.to_string(),
            })
        }
    }

    /// Verify that an interface does not exist
    pub fn assert_absent(&self, name: &str) -> VerifyResult<()> {
        if self.kernel.exists(name) {
            Err(VerificationError::InterfaceLeaked {
                name: name.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Verify that an interface exists and is administratively up
    pub fn assert_up(&self, name: &str) -> VerifyResult<()> {
        match self.kernel.admin_state(name) {
            Some(AdminState::Up) => Ok(()),
            actual => Err(VerificationError::AdminStateMismatch {
                name: name.to_string(),
                expected: AdminState::Up,
                actual,
            }),
        }
    }

    /// Verify the exact port set of a bridge
    pub fn assert_ports(&self, bridge: &str, expected: &[&str]) -> VerifyResult<()> {
        let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        expected.sort();
        let actual = self.kernel.ports(bridge);
        if actual == expected {
            Ok(())
        } else {
            Err(VerificationError::PortsMismatch {
                bridge: bridge.to_string(),
                expected,
                actual,
            })
        }
    }

    /// Verify the number of journaled calls to `op`
    pub fn assert_call_count(&self, op: &str, expected: usize) -> VerifyResult<()> {
        let actual = self.kernel.count(op);
        if actual == expected {
            Ok(())
        } else {
            Err(VerificationError::CallCountMismatch {
                op: op.to_string(),
                expected,
                actual,
            })
        }
    }

    /// Verify that kernel objects match an earlier snapshot
    pub fn assert_unchanged(&self, before: &KernelSnapshot) -> VerifyResult<()> {
        let after = self.kernel.snapshot();
        if &after == before {
            Ok(())
        } else {
            Err(VerificationError::StateChanged {
                before: before.clone(),
                after,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_verifier() {
        let kernel = FakeKernel::with_interfaces(["wlan0"]);
        kernel.add_port("brvlan10", "wlan0");
        let verifier = KernelVerifier::new(&kernel);

        assert!(verifier.assert_exists("wlan0").is_ok());
        assert!(verifier.assert_absent("wlan0.10").is_ok());
        assert!(verifier.assert_up("wlan0").is_err());
        assert!(verifier.assert_ports("brvlan10", &["wlan0"]).is_ok());
        assert!(verifier.assert_ports("brvlan10", &[]).is_err());
        assert!(verifier.assert_call_count("create_bridge", 0).is_ok());
    }

    #[test]
    fn test_assert_unchanged() {
        let kernel = FakeKernel::with_interfaces(["wlan0"]);
        let verifier = KernelVerifier::new(&kernel);
        let before = kernel.snapshot();

        assert!(verifier.assert_unchanged(&before).is_ok());
        kernel.add_interface("wlan0.10");
        assert!(verifier.assert_unchanged(&before).is_err());
    }
}
