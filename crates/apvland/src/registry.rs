//! Reference-counted registry of shared kernel resources.
//!
//! Several VLAN entries may depend on the same bridge or tagged VLAN
//! interface. The registry counts those dependencies per name and keeps
//! the clean flags owed for the resource, so that teardown happens exactly
//! once, when the last dependent lets go.
//!
//! Only resources this process is responsible for cleaning are tracked:
//! an `acquire` with empty flags on an unknown name records nothing.
//!
//! # Example
//!
//! ```
//! use apvland::ResourceRegistry;
//! use apvlan_common::CleanFlags;
//!
//! let mut registry = ResourceRegistry::new();
//! registry.acquire("brvlan10", CleanFlags::BRIDGE);
//! registry.acquire("brvlan10", CleanFlags::empty());
//!
//! assert_eq!(registry.release("brvlan10"), Some(CleanFlags::empty()));
//! assert_eq!(registry.release("brvlan10"), Some(CleanFlags::BRIDGE));
//! assert_eq!(registry.release("brvlan10"), None);
//! ```

use std::collections::HashMap;

use apvlan_common::CleanFlags;
use tracing::debug;

/// One tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedResource {
    /// Number of live dependents. Always positive while tracked.
    pub usage: u32,
    /// Accumulated clean flags.
    pub clean: CleanFlags,
}

/// Name-keyed registry of shared resources.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, SharedResource>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dependent on `name`.
    ///
    /// A tracked name gains one usage and ORs in `clean`. An untracked name
    /// is only recorded when `clean` is non-empty.
    pub fn acquire(&mut self, name: &str, clean: CleanFlags) {
        if let Some(resource) = self.resources.get_mut(name) {
            resource.usage += 1;
            resource.clean |= clean;
            debug!(
                name,
                usage = resource.usage,
                clean = %resource.clean,
                "Acquired shared resource"
            );
            return;
        }

        if clean.is_empty() {
            return;
        }

        self.resources
            .insert(name.to_string(), SharedResource { usage: 1, clean });
        debug!(name, clean = %clean, "Tracking new shared resource");
    }

    /// Drops a dependent on `name`.
    ///
    /// Returns `None` if `name` is not tracked, `Some(empty)` if other
    /// dependents remain, and the accumulated flags once the last
    /// dependent is gone. The entry is removed in that last case.
    pub fn release(&mut self, name: &str) -> Option<CleanFlags> {
        let resource = self.resources.get_mut(name)?;

        // Entries are removed on reaching zero, so usage is at least 1 here.
        resource.usage -= 1;
        if resource.usage > 0 {
            debug!(name, usage = resource.usage, "Released shared resource");
            return Some(CleanFlags::empty());
        }

        let clean = resource.clean;
        self.resources.remove(name);
        debug!(name, clean = %clean, "Last user released shared resource");
        Some(clean)
    }

    /// Returns the usage count of `name`, or 0 if untracked.
    pub fn usage(&self, name: &str) -> u32 {
        self.resources.get(name).map_or(0, |r| r.usage)
    }

    /// Returns the tracked entry for `name`.
    pub fn get(&self, name: &str) -> Option<&SharedResource> {
        self.resources.get(name)
    }

    /// Returns true if `name` is tracked.
    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
