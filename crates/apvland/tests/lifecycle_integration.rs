//! VLAN lifecycle integration tests
//!
//! Drives the controller, the dynamic allocator and link event dispatch
//! together against the in-memory kernel.

use apvlan_common::{AdminState, KernelDriver, VlanId};
use apvlan_test::{
    base_kernel, FakeGroupKeys, FakeKernel, KernelVerifier, TAGGED_IFACE, WILDCARD_IFNAME,
};
use apvland::{
    dispatch_batch, DynamicRelease, GroupContextTable, LinkEvent, LinkKind, NamingPolicy,
    VlanController, VlanEntry, VlanNaming, VlanSettings,
};
use pretty_assertions::assert_eq;

type Controller = VlanController<FakeKernel, FakeGroupKeys>;

fn tagged_settings() -> VlanSettings {
    VlanSettings {
        full_dynamic: true,
        wep_keys_configured: false,
        naming: NamingPolicy {
            tagged_interface: Some(TAGGED_IFACE.to_string()),
            vlan_naming: VlanNaming::WithDevice,
            ..Default::default()
        },
    }
}

fn untagged_settings() -> VlanSettings {
    VlanSettings {
        full_dynamic: true,
        ..Default::default()
    }
}

fn appeared(ifname: &str) -> LinkEvent {
    LinkEvent {
        kind: LinkKind::Appeared,
        ifname: ifname.to_string(),
        flags: 0,
    }
}

fn disappeared(ifname: &str) -> LinkEvent {
    LinkEvent {
        kind: LinkKind::Disappeared,
        ifname: ifname.to_string(),
        flags: 0,
    }
}

fn vid(id: u16) -> VlanId {
    VlanId::new(id).unwrap()
}

/// Wildcard scenario over a tagged uplink
///
/// Scenario:
/// 1. Two clients join VLAN 10 through the template
/// 2. The kernel reports the new interface
/// 3. Both clients leave
/// 4. The stale removal notification arrives last
#[tokio::test]
async fn test_dynamic_vlan_full_cycle() {
    let kernel = base_kernel();
    kernel.set_admin_state(TAGGED_IFACE, AdminState::Up).await.unwrap();
    let baseline = kernel.snapshot();
    let keys = FakeGroupKeys::new();
    let mut ctl: Controller = VlanController::new(kernel.clone(), keys.clone(), tagged_settings());
    ctl.add_entry(VlanEntry::wildcard(WILDCARD_IFNAME));

    assert_eq!(ctl.assign(10).await.unwrap(), "wlan0.10");
    dispatch_batch(&mut ctl, &[appeared("wlan0.10")]).await;
    assert_eq!(ctl.assign(10).await.unwrap(), "wlan0.10");

    let verifier = KernelVerifier::new(&kernel);
    verifier.assert_up("wlan0.10").unwrap();
    verifier.assert_up("breth0.10").unwrap();
    verifier.assert_up("eth0.10").unwrap();
    verifier.assert_ports("breth0.10", &["eth0.10", "wlan0.10"]).unwrap();
    assert_eq!(ctl.registry().usage("breth0.10"), 1);
    assert_eq!(ctl.registry().usage("eth0.10"), 1);
    assert_eq!(keys.active(), vec![10]);

    assert_eq!(ctl.release(10).await, DynamicRelease::Retained { remaining: 1 });
    verifier.assert_exists("wlan0.10").unwrap();

    assert_eq!(ctl.release(10).await, DynamicRelease::Removed);
    dispatch_batch(&mut ctl, &[disappeared("wlan0.10")]).await;

    verifier.assert_unchanged(&baseline).unwrap();
    assert!(ctl.registry().is_empty());
    assert_eq!(ctl.vlans().ifnames(), vec![WILDCARD_IFNAME]);
    assert!(keys.active().is_empty());
}

#[tokio::test]
async fn test_double_release_is_noop() {
    let kernel = base_kernel();
    let keys = FakeGroupKeys::new();
    let mut ctl: Controller = VlanController::new(kernel.clone(), keys.clone(), untagged_settings());
    ctl.add_entry(VlanEntry::wildcard(WILDCARD_IFNAME));

    ctl.assign(20).await.unwrap();
    assert_eq!(ctl.release(20).await, DynamicRelease::Removed);
    let calls = kernel.calls().len();

    assert_eq!(ctl.release(20).await, DynamicRelease::NotFound);
    assert_eq!(kernel.calls().len(), calls);
    assert_eq!(keys.released(), vec![20]);
}

#[tokio::test]
async fn test_repeated_appearance_bridges_once() {
    let kernel = base_kernel();
    let keys = FakeGroupKeys::new();
    let mut ctl: Controller = VlanController::new(kernel.clone(), keys, tagged_settings());
    ctl.add_entry(VlanEntry::wildcard(WILDCARD_IFNAME));
    ctl.assign(30).await.unwrap();

    dispatch_batch(&mut ctl, &[appeared("wlan0.30"), appeared("wlan0.30")]).await;
    dispatch_batch(&mut ctl, &[appeared("wlan0.30")]).await;

    let verifier = KernelVerifier::new(&kernel);
    verifier.assert_call_count("create_bridge", 1).unwrap();
    verifier.assert_call_count("create_vlan_iface", 1).unwrap();
    assert_eq!(ctl.registry().usage("breth0.30"), 1);
}

/// Two entries on the same VLAN share one bridge
///
/// Scenario:
/// 1. Two pre-existing interfaces are configured on VLAN 10
/// 2. Start bridges both into brvlan10
/// 3. The first interface vanishes: the bridge stays
/// 4. The second vanishes: the bridge is deleted
#[tokio::test]
async fn test_shared_bridge_outlives_first_user() {
    let kernel = FakeKernel::with_interfaces(["wlan0.a", "wlan1.a"]);
    let keys = FakeGroupKeys::new();
    let mut ctl: Controller = VlanController::new(kernel.clone(), keys, untagged_settings());
    ctl.add_entry(VlanEntry::new("wlan0.a", vid(10)));
    ctl.add_entry(VlanEntry::new("wlan1.a", vid(10)));

    ctl.start().await.unwrap();

    let verifier = KernelVerifier::new(&kernel);
    verifier.assert_ports("brvlan10", &["wlan0.a", "wlan1.a"]).unwrap();
    assert_eq!(ctl.registry().usage("brvlan10"), 2);

    kernel.remove_interface("wlan0.a");
    dispatch_batch(&mut ctl, &[disappeared("wlan0.a")]).await;

    verifier.assert_exists("brvlan10").unwrap();
    verifier.assert_ports("brvlan10", &["wlan1.a"]).unwrap();
    assert_eq!(ctl.registry().usage("brvlan10"), 1);

    kernel.remove_interface("wlan1.a");
    dispatch_batch(&mut ctl, &[disappeared("wlan1.a")]).await;

    verifier.assert_absent("brvlan10").unwrap();
    verifier.assert_call_count("delete_bridge", 1).unwrap();
    assert!(ctl.registry().is_empty());
    assert!(ctl.vlans().is_empty());
}

#[tokio::test]
async fn test_bridge_not_created_here_is_kept() {
    let kernel = FakeKernel::with_interfaces(["wlan0.a"]);
    kernel.create_bridge("brvlan10").await.unwrap();
    let keys = FakeGroupKeys::new();
    let mut ctl: Controller = VlanController::new(kernel.clone(), keys, untagged_settings());
    ctl.add_entry(VlanEntry::new("wlan0.a", vid(10)));

    ctl.start().await.unwrap();
    assert!(!ctl.registry().contains("brvlan10"));

    kernel.remove_interface("wlan0.a");
    dispatch_batch(&mut ctl, &[disappeared("wlan0.a")]).await;

    KernelVerifier::new(&kernel).assert_exists("brvlan10").unwrap();
    assert_eq!(kernel.count("delete_bridge"), 0);
}

#[tokio::test]
async fn test_stale_removal_is_ignored() {
    let kernel = base_kernel();
    let keys = FakeGroupKeys::new();
    let mut ctl: Controller = VlanController::new(kernel.clone(), keys, untagged_settings());
    ctl.add_entry(VlanEntry::wildcard(WILDCARD_IFNAME));
    ctl.assign(40).await.unwrap();

    // Removal and re-creation both happened before the batch was read.
    dispatch_batch(&mut ctl, &[appeared("wlan0.40"), disappeared("wlan0.40")]).await;

    let verifier = KernelVerifier::new(&kernel);
    verifier.assert_ports("brvlan40", &["wlan0.40"]).unwrap();
    assert!(ctl.vlans().is_configured("wlan0.40"));
    assert_eq!(kernel.count("detach_port"), 0);
}

#[tokio::test]
async fn test_failed_bring_up_rolls_back_everything() {
    let kernel = base_kernel();
    let baseline = kernel.snapshot();
    let keys = FakeGroupKeys::new();
    keys.fail_ensure(50);
    let mut ctl: Controller = VlanController::new(kernel.clone(), keys.clone(), tagged_settings());
    ctl.add_entry(VlanEntry::wildcard(WILDCARD_IFNAME));

    assert!(ctl.assign(50).await.is_err());

    KernelVerifier::new(&kernel).assert_unchanged(&baseline).unwrap();
    assert_eq!(ctl.vlans().ifnames(), vec![WILDCARD_IFNAME]);
    assert!(ctl.registry().is_empty());
    assert!(keys.active().is_empty());
    assert_eq!(keys.released(), vec![50]);
}

#[tokio::test]
async fn test_shutdown_undoes_start() {
    let kernel = base_kernel();
    kernel.set_admin_state(TAGGED_IFACE, AdminState::Up).await.unwrap();
    let baseline = kernel.snapshot();
    let keys = FakeGroupKeys::new();
    let mut ctl: Controller = VlanController::new(kernel.clone(), keys.clone(), tagged_settings());
    ctl.add_entry(VlanEntry::new("wlan0.10", vid(10)));
    ctl.add_entry(VlanEntry::new("wlan0.20", vid(20)));
    ctl.add_entry(VlanEntry::wildcard(WILDCARD_IFNAME));

    ctl.start().await.unwrap();
    ctl.assign(30).await.unwrap();
    dispatch_batch(&mut ctl, &[appeared("wlan0.30")]).await;
    assert_eq!(ctl.registry().len(), 6);

    ctl.shutdown().await;

    KernelVerifier::new(&kernel).assert_unchanged(&baseline).unwrap();
    assert!(ctl.registry().is_empty());
    assert!(ctl.vlans().is_empty());
    assert!(keys.active().is_empty());
}

/// Two interfaces on one VLAN share its group key context
///
/// Scenario:
/// 1. Two pre-existing interfaces are configured on VLAN 10 with WPA on
/// 2. Removing the first keeps the context for the second
/// 3. Removing the second drops the context
#[tokio::test]
async fn test_group_context_shared_by_vlan_members() {
    let kernel = FakeKernel::with_interfaces(["wlan0.10", "wlan0.ten"]);
    let mut ctl = VlanController::new(
        kernel.clone(),
        GroupContextTable::new(true),
        VlanSettings::default(),
    );
    ctl.add_entry(VlanEntry::new("wlan0.10", vid(10)));
    ctl.add_entry(VlanEntry::new("wlan0.ten", vid(10)));

    ctl.start().await.unwrap();
    assert_eq!(ctl.group_keys().users(vid(10)), 2);

    assert!(ctl.remove("wlan0.ten").await);

    let verifier = KernelVerifier::new(&kernel);
    verifier.assert_absent("wlan0.ten").unwrap();
    verifier.assert_exists("wlan0.10").unwrap();
    assert!(ctl.group_keys().is_active(vid(10)));
    assert_eq!(ctl.group_keys().users(vid(10)), 1);

    assert!(ctl.remove("wlan0.10").await);
    assert!(!ctl.group_keys().is_active(vid(10)));
    assert!(ctl.group_keys().is_empty());
}

#[cfg(target_os = "linux")]
mod netlink_dispatch {
    use super::*;
    use apvlan_test::netlink;
    use apvland::decode_link_events;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_decoded_datagram_drives_controller() {
        let kernel = base_kernel();
        let keys = FakeGroupKeys::new();
        let mut ctl: Controller = VlanController::new(kernel.clone(), keys, untagged_settings());
        ctl.add_entry(VlanEntry::wildcard(WILDCARD_IFNAME));
        ctl.assign(60).await.unwrap();

        let datagram = netlink::batch(&[
            netlink::newaddr(),
            netlink::newlink("wlan0.60", netlink::IFF_UP | netlink::IFF_RUNNING),
            netlink::newlink_without_name(),
        ]);
        let events = decode_link_events(&datagram);
        assert_eq!(events.len(), 1);

        dispatch_batch(&mut ctl, &events).await;

        KernelVerifier::new(&kernel)
            .assert_ports("brvlan60", &["wlan0.60"])
            .unwrap();
    }
}
