//! Shell command builders for link operations

use apvlan_common::shell::{self, shellquote, IP_CMD, IW_CMD};
use apvlan_common::{AdminState, VlanId};

/// Bridge forward delay in centiseconds.
///
/// A freshly created bridge would otherwise hold ports in listening state
/// long enough for EAPOL exchanges to time out.
pub const BRIDGE_FORWARD_DELAY: u32 = 100;

/// Build bridge creation command
pub fn build_add_bridge_cmd(bridge: &str) -> String {
    format!(
        "{} link add name {} type bridge forward_delay {}",
        IP_CMD,
        shellquote(bridge),
        BRIDGE_FORWARD_DELAY
    )
}

/// Build bridge deletion command
pub fn build_del_bridge_cmd(bridge: &str) -> String {
    format!("{} link del dev {} type bridge", IP_CMD, shellquote(bridge))
}

/// Build bridge port attach command
pub fn build_add_port_cmd(bridge: &str, iface: &str) -> String {
    format!(
        "{} link set dev {} master {}",
        IP_CMD,
        shellquote(iface),
        shellquote(bridge)
    )
}

/// Build bridge port detach command
pub fn build_del_port_cmd(iface: &str) -> String {
    format!("{} link set dev {} nomaster", IP_CMD, shellquote(iface))
}

/// Build command listing the ports of a bridge, one line per port
pub fn build_list_ports_cmd(bridge: &str) -> String {
    format!(
        "{} -o link show master {}",
        IP_CMD,
        shellquote(bridge)
    )
}

/// Build command showing the current master of an interface
pub fn build_show_link_cmd(iface: &str) -> String {
    format!("{} -o link show dev {}", IP_CMD, shellquote(iface))
}

/// Build 802.1Q interface creation command
pub fn build_add_vlan_iface_cmd(parent: &str, vlan_id: VlanId, name: &str) -> String {
    format!(
        "{} link add link {} name {} type vlan id {}",
        IP_CMD,
        shellquote(parent),
        shellquote(name),
        vlan_id
    )
}

/// Build 802.1Q interface deletion command
pub fn build_del_vlan_iface_cmd(name: &str) -> String {
    format!("{} link del dev {}", IP_CMD, shellquote(name))
}

/// Build admin state command
pub fn build_set_admin_cmd(name: &str, state: AdminState) -> String {
    format!(
        "{} link set dev {} {}",
        IP_CMD,
        shellquote(name),
        state.as_str()
    )
}

/// Build wireless interface creation command
///
/// The new interface is created on the same phy as `base_iface`.
pub fn build_add_station_iface_cmd(base_iface: &str, name: &str, iface_type: &str) -> String {
    format!(
        "{} dev {} interface add {} type {}",
        IW_CMD,
        shellquote(base_iface),
        shellquote(name),
        shellquote(iface_type)
    )
}

/// Build wireless interface removal command
pub fn build_del_station_iface_cmd(name: &str) -> String {
    format!("{} dev {} del", IW_CMD, shellquote(name))
}

/// Extract the master from a one-line `ip -o link show` record
///
/// Example: `7: wlan0.10: <BROADCAST,UP> mtu 1500 ... master brvlan10 state UP ...`
pub fn parse_master(line: &str) -> Option<String> {
    let mut words = line.split_whitespace();
    while let Some(word) = words.next() {
        if word == "master" {
            return words.next().map(str::to_string);
        }
    }
    None
}

/// Count the records in `ip -o link show master <bridge>` output
pub fn count_link_records(output: &str) -> usize {
    output.lines().filter(|l| !l.trim().is_empty()).count()
}

/// Returns true if a failed command reported an existing object
pub fn is_exists_error(result: &shell::ExecResult) -> bool {
    result.output_contains("File exists")
}

/// Returns true if a failed command reported a missing device
pub fn is_missing_device_error(result: &shell::ExecResult) -> bool {
    result.output_contains("Cannot find device")
        || result.output_contains("No such device")
        || result.output_contains("does not exist")
}
