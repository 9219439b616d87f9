//! Kernel link notification listener.
//!
//! Subscribes to rtnetlink link events (RTMGRP_LINK), decodes each
//! `RTM_NEWLINK`/`RTM_DELLINK` into a [`LinkEvent`] and hands batches to
//! [`dispatch_batch`], which feeds the lifecycle controller in receive
//! order.
//!
//! On non-Linux platforms a mock listener is provided that never yields
//! events.

use tracing::{debug, instrument};

use apvlan_common::{GroupKeyManager, KernelDriver};

use crate::controller::VlanController;

/// What happened to an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `RTM_NEWLINK`: the interface exists (created or changed).
    Appeared,
    /// `RTM_DELLINK`: the interface was removed.
    Disappeared,
}

/// One decoded link notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    /// Appeared or disappeared.
    pub kind: LinkKind,
    /// Interface name from `IFLA_IFNAME`.
    pub ifname: String,
    /// `ifi_flags` of the message.
    pub flags: u32,
}

const IFF_UP: u32 = 0x1;
const IFF_RUNNING: u32 = 0x40;
const IFF_LOWER_UP: u32 = 0x1_0000;
const IFF_DORMANT: u32 = 0x2_0000;

/// Renders the interesting `ifi_flags` bits as `[UP][RUNNING]...`.
pub fn describe_flags(flags: u32) -> String {
    [
        (IFF_UP, "[UP]"),
        (IFF_RUNNING, "[RUNNING]"),
        (IFF_LOWER_UP, "[LOWER_UP]"),
        (IFF_DORMANT, "[DORMANT]"),
    ]
    .iter()
    .filter(|(bit, _)| flags & bit != 0)
    .map(|(_, name)| *name)
    .collect()
}

/// Feeds one batch of events to the controller, in order.
pub async fn dispatch_batch<D, G>(controller: &mut VlanController<D, G>, events: &[LinkEvent])
where
    D: KernelDriver,
    G: GroupKeyManager,
{
    for event in events {
        dispatch_event(controller, event).await;
    }
}

/// Feeds one event to the controller.
///
/// A removal is dropped if the interface still exists: it was recreated
/// before the notification was read, and the newer state wins.
#[instrument(skip(controller, event), fields(ifname = %event.ifname))]
pub async fn dispatch_event<D, G>(controller: &mut VlanController<D, G>, event: &LinkEvent)
where
    D: KernelDriver,
    G: GroupKeyManager,
{
    debug!(
        kind = ?event.kind,
        flags = %describe_flags(event.flags),
        "Link event for {}", event.ifname
    );

    match event.kind {
        LinkKind::Appeared => controller.on_link_appeared(&event.ifname).await,
        LinkKind::Disappeared => {
            if controller.driver().interface_exists(&event.ifname).await {
                debug!("Ignoring removal of {}: interface still exists", event.ifname);
                return;
            }
            controller.on_link_disappeared(&event.ifname).await;
        }
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::{LinkEvent, LinkKind};
    use apvlan_common::{VlanError, VlanResult};
    use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
    use netlink_packet_route::link::{LinkAttribute, LinkMessage};
    use netlink_packet_route::RouteNetlinkMessage;
    use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
    use tokio::io::unix::AsyncFd;
    use tracing::{debug, instrument, warn};

    /// Multicast group for link notifications.
    const RTMGRP_LINK: u32 = 1;

    /// `nlmsghdr` length.
    const NLMSG_HDRLEN: usize = 16;

    /// Receive buffer per datagram.
    const RECV_BUFFER_SIZE: usize = 8192;

    fn nlmsg_align(len: usize) -> usize {
        (len + 3) & !3
    }

    fn link_event(kind: LinkKind, link: &LinkMessage) -> Option<LinkEvent> {
        let ifname = link.attributes.iter().find_map(|attr| match attr {
            LinkAttribute::IfName(name) => Some(name.clone()),
            _ => None,
        })?;
        if ifname.is_empty() {
            return None;
        }
        Some(LinkEvent {
            kind,
            ifname,
            flags: link.header.flags.bits(),
        })
    }

    /// Decodes one datagram into link events, preserving order.
    ///
    /// A frame whose length field is impossible ends decoding for the
    /// datagram. A well-framed message that fails to parse is skipped.
    pub fn decode_link_events(buf: &[u8]) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        let mut offset = 0;

        while buf.len() - offset >= NLMSG_HDRLEN {
            let left = buf.len() - offset;
            let len = u32::from_ne_bytes([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ]) as usize;

            if len < NLMSG_HDRLEN || len > left {
                let err = VlanError::protocol(format!(
                    "message length {} with {} bytes left",
                    len, left
                ));
                debug!("Dropping rest of datagram: {}", err);
                break;
            }

            let frame = &buf[offset..offset + len];
            match NetlinkMessage::<RouteNetlinkMessage>::deserialize(frame) {
                Ok(msg) => match msg.payload {
                    NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewLink(link)) => {
                        events.extend(link_event(LinkKind::Appeared, &link));
                    }
                    NetlinkPayload::InnerMessage(RouteNetlinkMessage::DelLink(link)) => {
                        events.extend(link_event(LinkKind::Disappeared, &link));
                    }
                    _ => {}
                },
                Err(e) => {
                    let err = VlanError::protocol(e.to_string());
                    debug!("Skipping undecodable netlink message: {}", err);
                }
            }

            offset = (offset + nlmsg_align(len)).min(buf.len());
        }

        if offset < buf.len() {
            debug!(
                "{} extra bytes in the end of netlink message",
                buf.len() - offset
            );
        }

        events
    }

    /// Settles one drain of the socket.
    ///
    /// Events read before a receive error are still delivered; the error
    /// surfaces only when nothing was read. `None` means keep waiting.
    pub(crate) fn settle_drain(
        events: Vec<LinkEvent>,
        datagrams: usize,
        error: Option<VlanError>,
    ) -> Option<VlanResult<Vec<LinkEvent>>> {
        match error {
            Some(e) if events.is_empty() => Some(Err(e)),
            Some(e) => {
                warn!(
                    events = events.len(),
                    "Delivering link events read before receive error: {}", e
                );
                Some(Ok(events))
            }
            None if datagrams > 0 => {
                debug!(datagrams, events = events.len(), "Drained link notifications");
                Some(Ok(events))
            }
            None => None,
        }
    }

    /// rtnetlink link event subscription.
    pub struct LinkEventListener {
        fd: AsyncFd<Socket>,
        buffer: Vec<u8>,
    }

    impl LinkEventListener {
        /// Opens a non-blocking NETLINK_ROUTE socket bound to RTMGRP_LINK.
        #[instrument]
        pub fn new() -> VlanResult<Self> {
            let mut socket = Socket::new(NETLINK_ROUTE)
                .map_err(|e| VlanError::netlink("socket", e.to_string()))?;
            socket
                .bind(&SocketAddr::new(0, RTMGRP_LINK))
                .map_err(|e| VlanError::netlink("bind", e.to_string()))?;
            socket
                .set_non_blocking(true)
                .map_err(|e| VlanError::netlink("set_non_blocking", e.to_string()))?;

            let fd = AsyncFd::new(socket)
                .map_err(|e| VlanError::netlink("register", e.to_string()))?;

            debug!("Netlink socket bound to RTMGRP_LINK");
            Ok(Self {
                fd,
                buffer: Vec::with_capacity(RECV_BUFFER_SIZE),
            })
        }

        /// Waits until the socket is readable, then drains every queued
        /// datagram and returns their events in receive order.
        pub async fn next_batch(&mut self) -> VlanResult<Vec<LinkEvent>> {
            loop {
                let mut guard = self
                    .fd
                    .readable()
                    .await
                    .map_err(|e| VlanError::netlink("readable", e.to_string()))?;

                let mut events = Vec::new();
                let mut datagrams = 0usize;
                let mut error = None;
                loop {
                    self.buffer.clear();
                    let buffer = &mut self.buffer;
                    match guard.try_io(|inner| inner.get_ref().recv(buffer, 0)) {
                        Ok(Ok(_)) => {
                            datagrams += 1;
                            events.extend(decode_link_events(&self.buffer));
                        }
                        Ok(Err(e)) => {
                            error = Some(VlanError::netlink("recv", e.to_string()));
                            break;
                        }
                        Err(_would_block) => break,
                    }
                }

                if let Some(result) = settle_drain(events, datagrams, error) {
                    return result;
                }
            }
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::*;

/// Mock implementation for non-Linux platforms (development only)
#[cfg(not(target_os = "linux"))]
mod mock {
    use super::LinkEvent;
    use apvlan_common::VlanResult;

    pub struct LinkEventListener;

    impl LinkEventListener {
        pub fn new() -> VlanResult<Self> {
            Ok(Self)
        }

        pub async fn next_batch(&mut self) -> VlanResult<Vec<LinkEvent>> {
            // In mock, just sleep to prevent busy-loop
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            Ok(Vec::new())
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use mock::*;
