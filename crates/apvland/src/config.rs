//! Configuration file support for apvland
//!
//! Loads and validates the daemon configuration from TOML files.
//! Default location: /etc/apvland/apvland.toml

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use apvlan_common::{VlanError, VlanId, VlanResult, IFNAME_MAX_LEN};

use crate::controller::VlanSettings;
use crate::naming::{NamingPolicy, VlanNaming, DEFAULT_PLACEHOLDER};
use crate::table::{VlanEntry, VlanTag};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/apvland/apvland.toml";

/// Wildcard marker accepted as `vlan_id`.
const WILDCARD_VLAN_ID: &str = "*";

/// Whether clients may be mapped onto VLANs at association time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicVlan {
    /// No per-client VLANs.
    #[default]
    Disabled,
    /// Per-client VLANs when the client carries one.
    Optional,
    /// Every client must be mapped onto a VLAN.
    Required,
}

/// Wireless interface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Base wireless interface
    #[serde(default = "default_iface")]
    pub iface: String,

    /// Per-client VLAN mode
    #[serde(default)]
    pub dynamic_vlan: DynamicVlan,

    /// Bridge client interfaces and follow kernel link events
    #[serde(default = "default_full_dynamic")]
    pub full_dynamic: bool,

    /// Manage a group key context per VLAN
    #[serde(default = "default_wpa")]
    pub wpa: bool,

    /// Legacy static WEP keys
    #[serde(default)]
    pub wep_keys: Vec<String>,

    /// `iw` interface type of client-facing interfaces
    #[serde(default = "default_station_iface_type")]
    pub station_iface_type: String,
}

/// Bridge and VLAN interface naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Bridge name prefix; empty derives it from the tagged interface
    #[serde(default)]
    pub bridge_prefix: String,

    /// Uplink carrying tagged VLAN traffic
    #[serde(default)]
    pub tagged_interface: Option<String>,

    /// Name form of tagged VLAN interfaces
    #[serde(default)]
    pub vlan_naming: VlanNaming,

    /// Placeholder in wildcard templates
    #[serde(default = "default_placeholder")]
    pub placeholder: char,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// VLAN id of a configured entry: a number or `"*"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VlanIdSetting {
    /// Concrete VLAN id.
    Id(i64),
    /// `"*"` for the wildcard template.
    Named(String),
}

/// One configured VLAN entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanConfig {
    /// VLAN id, or `"*"` for the wildcard template
    pub vlan_id: VlanIdSetting,

    /// Client-facing interface
    pub ifname: String,
}

/// Complete apvland configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApVlanConfig {
    /// Wireless interface configuration
    #[serde(default)]
    pub interface: InterfaceConfig,

    /// Naming configuration
    #[serde(default)]
    pub naming: NamingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Configured VLAN entries, in table order
    #[serde(default)]
    pub vlans: Vec<VlanConfig>,
}

// Default functions
fn default_iface() -> String {
    "wlan0".to_string()
}

fn default_full_dynamic() -> bool {
    true
}

fn default_wpa() -> bool {
    true
}

fn default_station_iface_type() -> String {
    "__ap".to_string()
}

fn default_placeholder() -> char {
    DEFAULT_PLACEHOLDER
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            iface: default_iface(),
            dynamic_vlan: DynamicVlan::default(),
            full_dynamic: default_full_dynamic(),
            wpa: default_wpa(),
            wep_keys: Vec::new(),
            station_iface_type: default_station_iface_type(),
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            bridge_prefix: String::new(),
            tagged_interface: None,
            vlan_naming: VlanNaming::default(),
            placeholder: default_placeholder(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl VlanConfig {
    /// Resolves the configured id into a [`VlanTag`].
    pub fn vlan_tag(&self) -> VlanResult<VlanTag> {
        let field = format!("vlans.{}.vlan_id", self.ifname);
        match &self.vlan_id {
            VlanIdSetting::Id(id) => {
                let id = u16::try_from(*id)
                    .map_err(|_| VlanError::invalid_config(&field, format!("{} is not a VLAN id", id)))?;
                let id = VlanId::new(id)
                    .map_err(|e| VlanError::invalid_config(&field, e.to_string()))?;
                Ok(VlanTag::Id(id))
            }
            VlanIdSetting::Named(name) if name == WILDCARD_VLAN_ID => Ok(VlanTag::Wildcard),
            VlanIdSetting::Named(name) => Err(VlanError::invalid_config(
                field,
                format!("expected a number or \"*\", got \"{}\"", name),
            )),
        }
    }
}

impl ApVlanConfig {
    /// Load configuration from `path`
    pub fn load(path: impl AsRef<Path>) -> VlanResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> VlanResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "apvland: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(VlanError::Io(e)),
        }
    }

    fn parse(content: &str, path: &Path) -> VlanResult<Self> {
        toml::from_str(content).map_err(|e| {
            VlanError::invalid_config(
                path.display().to_string(),
                format!("Failed to parse config file: {}", e),
            )
        })
    }

    /// Returns true unless per-client VLANs are disabled.
    pub fn dynamic_enabled(&self) -> bool {
        self.interface.dynamic_vlan != DynamicVlan::Disabled
    }

    /// Naming policy for the controller.
    pub fn naming_policy(&self) -> NamingPolicy {
        NamingPolicy {
            bridge_prefix: self.naming.bridge_prefix.clone(),
            tagged_interface: self
                .naming
                .tagged_interface
                .clone()
                .filter(|iface| !iface.is_empty()),
            vlan_naming: self.naming.vlan_naming,
            placeholder: self.naming.placeholder,
        }
    }

    /// Controller settings.
    pub fn settings(&self) -> VlanSettings {
        VlanSettings {
            full_dynamic: self.interface.full_dynamic,
            wep_keys_configured: !self.interface.wep_keys.is_empty(),
            naming: self.naming_policy(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> VlanResult<()> {
        validate_ifname("interface.iface", &self.interface.iface)?;

        if let Some(tagged) = &self.naming.tagged_interface {
            if tagged.len() > IFNAME_MAX_LEN {
                return Err(VlanError::invalid_config(
                    "naming.tagged_interface",
                    format!("{} is longer than {} bytes", tagged, IFNAME_MAX_LEN),
                ));
            }
        }

        if self.interface.station_iface_type.is_empty() {
            return Err(VlanError::invalid_config(
                "interface.station_iface_type",
                "must not be empty",
            ));
        }

        let mut wildcards = 0;
        let mut seen = HashSet::new();
        for vlan in &self.vlans {
            validate_ifname("vlans.ifname", &vlan.ifname)?;

            match vlan.vlan_tag()? {
                VlanTag::Wildcard => {
                    wildcards += 1;
                    if wildcards > 1 {
                        return Err(VlanError::invalid_config(
                            "vlans",
                            "more than one wildcard template",
                        ));
                    }
                    if !vlan.ifname.contains(self.naming.placeholder) {
                        return Err(VlanError::invalid_config(
                            format!("vlans.{}", vlan.ifname),
                            format!(
                                "wildcard template has no '{}' placeholder",
                                self.naming.placeholder
                            ),
                        ));
                    }
                }
                VlanTag::Id(_) => {
                    if !seen.insert(vlan.ifname.as_str()) {
                        return Err(VlanError::invalid_config(
                            format!("vlans.{}", vlan.ifname),
                            "interface configured twice",
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Entries the VLAN table starts with.
    ///
    /// With dynamic VLANs enabled and nothing configured, the wildcard
    /// template `<iface>.<placeholder>` is synthesized.
    pub fn initial_entries(&self) -> VlanResult<Vec<VlanEntry>> {
        if self.vlans.is_empty() && self.dynamic_enabled() {
            let template = format!("{}.{}", self.interface.iface, self.naming.placeholder);
            return Ok(vec![VlanEntry::wildcard(template)]);
        }

        self.vlans
            .iter()
            .map(|vlan| {
                Ok(match vlan.vlan_tag()? {
                    VlanTag::Wildcard => VlanEntry::wildcard(vlan.ifname.clone()),
                    VlanTag::Id(id) => VlanEntry::new(vlan.ifname.clone(), id),
                })
            })
            .collect()
    }
}

fn validate_ifname(field: &str, ifname: &str) -> VlanResult<()> {
    if ifname.is_empty() {
        return Err(VlanError::invalid_config(field, "interface name is empty"));
    }
    if ifname.len() > IFNAME_MAX_LEN {
        return Err(VlanError::invalid_config(
            field,
            format!("{} is longer than {} bytes", ifname, IFNAME_MAX_LEN),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn parse(toml_str: &str) -> ApVlanConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ApVlanConfig::default();
        assert_eq!(config.interface.iface, "wlan0");
        assert_eq!(config.interface.dynamic_vlan, DynamicVlan::Disabled);
        assert!(config.interface.full_dynamic);
        assert!(config.interface.wpa);
        assert_eq!(config.interface.station_iface_type, "__ap");
        assert_eq!(config.naming.placeholder, '#');
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let config = parse(
            r#"
[interface]
iface = "wlan1"
dynamic_vlan = "required"
wep_keys = ["0102030405"]

[naming]
tagged_interface = "eth0"
vlan_naming = "with_device"

[[vlans]]
vlan_id = 10
ifname = "wlan1.10"

[[vlans]]
vlan_id = "*"
ifname = "wlan1.#"
"#,
        );

        assert_eq!(config.interface.dynamic_vlan, DynamicVlan::Required);
        // Unspecified values use defaults
        assert_eq!(config.interface.station_iface_type, "__ap");
        assert_eq!(config.vlans.len(), 2);
        assert_eq!(config.vlans[0].vlan_id, VlanIdSetting::Id(10));
        assert_eq!(config.vlans[1].vlan_id, VlanIdSetting::Named("*".into()));
        assert!(config.validate().is_ok());

        let settings = config.settings();
        assert!(settings.wep_keys_configured);
        assert_eq!(settings.naming.tagged_interface.as_deref(), Some("eth0"));
        assert_eq!(settings.naming.vlan_naming, VlanNaming::WithDevice);
    }

    #[test]
    fn test_validate_rejects_bad_vlan_ids() {
        for vlan_id in ["0", "4095", "-1", "\"any\""] {
            let config = parse(&format!(
                "[[vlans]]\nvlan_id = {}\nifname = \"wlan0.x\"\n",
                vlan_id
            ));
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, VlanError::InvalidConfig { .. }),
                "vlan_id {} accepted",
                vlan_id
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_ifnames() {
        let config = parse("[[vlans]]\nvlan_id = 10\nifname = \"\"\n");
        assert!(config.validate().is_err());

        let config = parse("[[vlans]]\nvlan_id = 10\nifname = \"wlan0.verylongname\"\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_static_entries() {
        let config = parse(
            r#"
[[vlans]]
vlan_id = 10
ifname = "wlan0.10"

[[vlans]]
vlan_id = 20
ifname = "wlan0.10"
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_wildcard_rules() {
        let two = parse(
            r#"
[[vlans]]
vlan_id = "*"
ifname = "wlan0.#"

[[vlans]]
vlan_id = "*"
ifname = "wlan1.#"
"#,
        );
        assert!(two.validate().is_err());

        let no_placeholder = parse("[[vlans]]\nvlan_id = \"*\"\nifname = \"wlan0.dyn\"\n");
        assert!(no_placeholder.validate().is_err());
    }

    #[test]
    fn test_initial_entries_synthesizes_template() {
        let mut config = ApVlanConfig::default();
        assert!(config.initial_entries().unwrap().is_empty());

        config.interface.dynamic_vlan = DynamicVlan::Optional;
        let entries = config.initial_entries().unwrap();
        assert_eq!(entries, vec![VlanEntry::wildcard("wlan0.#")]);
    }

    #[test]
    fn test_initial_entries_keep_file_order() {
        let config = parse(
            r#"
[interface]
dynamic_vlan = "optional"

[[vlans]]
vlan_id = 20
ifname = "wlan0.20"

[[vlans]]
vlan_id = "*"
ifname = "wlan0.#"
"#,
        );

        let entries = config.initial_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], VlanEntry::new("wlan0.20", VlanId::new(20).unwrap()));
        assert!(entries[1].is_wildcard());
    }

    #[test]
    fn test_empty_tagged_interface_is_none() {
        let config = parse("[naming]\ntagged_interface = \"\"\n");
        assert_eq!(config.naming_policy().tagged_interface, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[interface]\niface = \"wlan2\"\n\n[logging]\nlevel = \"debug\"").unwrap();

        let config = ApVlanConfig::load(file.path()).unwrap();
        assert_eq!(config.interface.iface, "wlan2");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[interface\niface = ").unwrap();

        let err = ApVlanConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, VlanError::InvalidConfig { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ApVlanConfig::load("/nonexistent/apvland.toml"),
            Err(VlanError::Io(_))
        ));
        let config = ApVlanConfig::load_or_default("/nonexistent/apvland.toml").unwrap();
        assert_eq!(config.interface.iface, "wlan0");
    }
}
