//! Test fixtures for common lifecycle scenarios
//!
//! Provides standard interface names, a pre-populated kernel and raw
//! rtnetlink frames for listener tests.

use crate::FakeKernel;

/// Base wireless interface used throughout the tests.
pub const WLAN_IFACE: &str = "wlan0";

/// Tagged uplink used as VLAN parent.
pub const TAGGED_IFACE: &str = "eth0";

/// Wildcard template for [`WLAN_IFACE`].
pub const WILDCARD_IFNAME: &str = "wlan0.#";

/// Kernel holding the base wireless interface and the tagged uplink.
pub fn base_kernel() -> FakeKernel {
    FakeKernel::with_interfaces([WLAN_IFACE, TAGGED_IFACE])
}

/// Client-facing interface name for `vlan_id` under [`WILDCARD_IFNAME`].
pub fn station_ifname(vlan_id: u16) -> String {
    format!("{}.{}", WLAN_IFACE, vlan_id)
}

/// Raw rtnetlink frame builders.
///
/// Frames use host byte order, as the kernel does on the local socket.
pub mod netlink {
    /// `nlmsghdr` length.
    pub const NLMSG_HDRLEN: usize = 16;
    /// `ifinfomsg` length.
    pub const IFINFOMSG_LEN: usize = 16;

    /// `RTM_NEWLINK`.
    pub const RTM_NEWLINK: u16 = 16;
    /// `RTM_DELLINK`.
    pub const RTM_DELLINK: u16 = 17;
    /// `RTM_NEWADDR`, a non-link message the decoder must skip.
    pub const RTM_NEWADDR: u16 = 20;
    /// `IFLA_IFNAME`.
    pub const IFLA_IFNAME: u16 = 3;
    /// `IFLA_MTU`.
    pub const IFLA_MTU: u16 = 4;

    /// `IFF_UP`.
    pub const IFF_UP: u32 = 0x1;
    /// `IFF_RUNNING`.
    pub const IFF_RUNNING: u32 = 0x40;
    /// `IFF_LOWER_UP`.
    pub const IFF_LOWER_UP: u32 = 0x1_0000;

    fn align4(len: usize) -> usize {
        (len + 3) & !3
    }

    fn push_attr(buf: &mut Vec<u8>, kind: u16, payload: &[u8]) {
        let len = 4 + payload.len();
        buf.extend_from_slice(&(len as u16).to_ne_bytes());
        buf.extend_from_slice(&kind.to_ne_bytes());
        buf.extend_from_slice(payload);
        buf.resize(align4(buf.len()), 0);
    }

    fn link_message(message_type: u16, ifname: Option<&str>, flags: u32) -> Vec<u8> {
        let mut body = Vec::new();
        // ifinfomsg: family, pad, type, index, flags, change
        body.push(0u8);
        body.push(0u8);
        body.extend_from_slice(&1u16.to_ne_bytes());
        body.extend_from_slice(&7i32.to_ne_bytes());
        body.extend_from_slice(&flags.to_ne_bytes());
        body.extend_from_slice(&0u32.to_ne_bytes());

        push_attr(&mut body, IFLA_MTU, &1500u32.to_ne_bytes());
        if let Some(name) = ifname {
            let mut payload = name.as_bytes().to_vec();
            payload.push(0);
            push_attr(&mut body, IFLA_IFNAME, &payload);
        }
        frame(message_type, &body)
    }

    /// Wraps `body` in an `nlmsghdr` of `message_type`.
    pub fn frame(message_type: u16, body: &[u8]) -> Vec<u8> {
        let len = NLMSG_HDRLEN + body.len();
        let mut buf = Vec::with_capacity(align4(len));
        buf.extend_from_slice(&(len as u32).to_ne_bytes());
        buf.extend_from_slice(&message_type.to_ne_bytes());
        buf.extend_from_slice(&0u16.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(body);
        buf.resize(align4(buf.len()), 0);
        buf
    }

    /// `RTM_NEWLINK` for `ifname` with the given `ifi_flags`.
    pub fn newlink(ifname: &str, flags: u32) -> Vec<u8> {
        link_message(RTM_NEWLINK, Some(ifname), flags)
    }

    /// `RTM_DELLINK` for `ifname`.
    pub fn dellink(ifname: &str) -> Vec<u8> {
        link_message(RTM_DELLINK, Some(ifname), 0)
    }

    /// `RTM_NEWLINK` without an `IFLA_IFNAME` attribute.
    pub fn newlink_without_name() -> Vec<u8> {
        link_message(RTM_NEWLINK, None, IFF_UP)
    }

    /// An `RTM_NEWADDR` frame with an empty body.
    pub fn newaddr() -> Vec<u8> {
        frame(RTM_NEWADDR, &[0u8; 8])
    }

    /// Concatenates frames into one datagram.
    pub fn batch(frames: &[Vec<u8>]) -> Vec<u8> {
        frames.concat()
    }
}
