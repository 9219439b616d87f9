//! Error types for VLAN lifecycle operations.
//!
//! Every fallible operation in the daemon returns [`VlanResult`]. The
//! variants group into the categories reported by [`VlanError::kind`]:
//! kernel-resource failures, policy refusals, malformed kernel
//! notifications, invalid requests and configuration problems.
//!
//! Releasing an unknown or already released resource is not an error and
//! has no variant here.

use std::io;
use thiserror::Error;

/// Result type alias for VLAN lifecycle operations.
pub type VlanResult<T> = Result<T, VlanError>;

/// Broad category of a [`VlanError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A kernel-facing call failed (permission, name collision, ENODEV).
    KernelResource,
    /// The request was refused by local policy.
    PolicyRefusal,
    /// A kernel notification could not be decoded.
    Protocol,
    /// The caller passed an argument outside the operation's domain.
    InvalidRequest,
    /// The configuration file is unusable.
    Config,
}

/// Errors that can occur during VLAN lifecycle operations.
#[derive(Debug, Error)]
pub enum VlanError {
    /// Failed to spawn a shell command.
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A kernel resource operation failed.
    #[error("Kernel operation {operation} failed for {name}: {message}")]
    Kernel {
        /// The operation (e.g. "create_bridge").
        operation: String,
        /// The interface or bridge name.
        name: String,
        /// Error message.
        message: String,
    },

    /// Netlink socket operation failed.
    #[error("Netlink operation failed: {operation}: {message}")]
    Netlink {
        /// The operation that failed.
        operation: String,
        /// Error message.
        message: String,
    },

    /// Request refused by policy.
    #[error("Refusing to set up VLAN interface {ifname}: {reason}")]
    PolicyRefused {
        /// The client-facing interface.
        ifname: String,
        /// Why the request was refused.
        reason: String,
    },

    /// Interface already exists and reuse was not allowed.
    #[error("Interface {ifname} already exists")]
    InterfaceExists {
        /// The interface name.
        ifname: String,
    },

    /// Group key context setup or teardown failed.
    #[error("Group key context for VLAN {vlan_id} failed: {message}")]
    GroupKey {
        /// The VLAN id.
        vlan_id: u16,
        /// Error message.
        message: String,
    },

    /// VLAN id outside 1..4094.
    #[error("Invalid VLAN id {0}")]
    InvalidVlanId(u16),

    /// Dynamic instantiation requested against a non-template entry.
    #[error("VLAN entry {ifname} is not a wildcard template")]
    NotWildcard {
        /// The entry's interface name.
        ifname: String,
    },

    /// Wildcard template without a placeholder.
    #[error("Wildcard template {ifname} has no placeholder")]
    MissingPlaceholder {
        /// The template interface name.
        ifname: String,
    },

    /// Dynamic VLAN requested but no wildcard template is configured.
    #[error("No wildcard template to instantiate VLAN {vlan_id}")]
    NoTemplate {
        /// The requested VLAN id.
        vlan_id: u16,
    },

    /// Malformed kernel notification.
    #[error("Malformed kernel notification: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl VlanError {
    /// Creates a kernel resource error.
    pub fn kernel(
        operation: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Kernel {
            operation: operation.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a netlink error.
    pub fn netlink(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Netlink {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a policy refusal.
    pub fn policy_refused(ifname: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PolicyRefused {
            ifname: ifname.into(),
            reason: reason.into(),
        }
    }

    /// Creates a group key error.
    pub fn group_key(vlan_id: u16, message: impl Into<String>) -> Self {
        Self::GroupKey {
            vlan_id,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VlanError::ShellExec { .. }
            | VlanError::Kernel { .. }
            | VlanError::Netlink { .. }
            | VlanError::GroupKey { .. }
            | VlanError::Io(_) => ErrorKind::KernelResource,
            VlanError::PolicyRefused { .. } | VlanError::InterfaceExists { .. } => {
                ErrorKind::PolicyRefusal
            }
            VlanError::Protocol { .. } => ErrorKind::Protocol,
            VlanError::InvalidVlanId(_)
            | VlanError::NotWildcard { .. }
            | VlanError::MissingPlaceholder { .. }
            | VlanError::NoTemplate { .. } => ErrorKind::InvalidRequest,
            VlanError::InvalidConfig { .. } => ErrorKind::Config,
        }
    }
}
