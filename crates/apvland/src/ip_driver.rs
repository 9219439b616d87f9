//! `KernelDriver` backed by the `ip` and `iw` tools.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use apvlan_common::shell::{self, ExecResult};
use apvlan_common::{
    AdminState, AttachOutcome, CreateOutcome, KernelDriver, VlanError, VlanId, VlanResult,
};

use crate::commands::{
    build_add_bridge_cmd, build_add_port_cmd, build_add_station_iface_cmd,
    build_add_vlan_iface_cmd, build_del_bridge_cmd, build_del_port_cmd,
    build_del_station_iface_cmd, build_del_vlan_iface_cmd, build_list_ports_cmd,
    build_set_admin_cmd, build_show_link_cmd, count_link_records, is_exists_error,
    is_missing_device_error, parse_master,
};

/// Default `iw` interface type for client-facing interfaces.
pub const DEFAULT_STATION_IFACE_TYPE: &str = "__ap";

#[cfg(test)]
#[derive(Debug, Default)]
struct MockShell {
    captured: Vec<String>,
    responses: std::collections::VecDeque<ExecResult>,
}

/// Drives bridges, VLAN interfaces and wireless interfaces through
/// `/sbin/ip` and `/usr/sbin/iw`.
#[derive(Debug)]
pub struct IpLinkDriver {
    /// Wireless interface whose phy hosts new client-facing interfaces.
    base_iface: String,
    /// `iw` interface type for client-facing interfaces.
    station_iface_type: String,

    /// Mock shell for testing
    #[cfg(test)]
    mock: Option<parking_lot::Mutex<MockShell>>,
}

impl IpLinkDriver {
    /// Creates a driver for client interfaces on the phy of `base_iface`.
    pub fn new(base_iface: impl Into<String>, station_iface_type: impl Into<String>) -> Self {
        Self {
            base_iface: base_iface.into(),
            station_iface_type: station_iface_type.into(),
            #[cfg(test)]
            mock: None,
        }
    }

    /// Enables mock mode for testing
    ///
    /// Commands are captured instead of executed. Each command consumes
    /// the next queued response, or succeeds with empty output.
    #[cfg(test)]
    fn with_mock_mode(mut self, responses: Vec<ExecResult>) -> Self {
        self.mock = Some(parking_lot::Mutex::new(MockShell {
            captured: Vec::new(),
            responses: responses.into(),
        }));
        self
    }

    /// Gets captured commands (for testing)
    #[cfg(test)]
    fn captured_commands(&self) -> Vec<String> {
        self.mock
            .as_ref()
            .map(|m| m.lock().captured.clone())
            .unwrap_or_default()
    }

    /// Execute a shell command (with mock mode support)
    async fn run(&self, cmd: &str) -> VlanResult<ExecResult> {
        #[cfg(test)]
        if let Some(mock) = &self.mock {
            let mut mock = mock.lock();
            mock.captured.push(cmd.to_string());
            return Ok(mock.responses.pop_front().unwrap_or(ExecResult {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }));
        }

        shell::exec(cmd).await
    }

    async fn run_checked(&self, op: &str, name: &str, cmd: &str) -> VlanResult<ExecResult> {
        let result = self.run(cmd).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(VlanError::kernel(op, name, result.combined_output()))
        }
    }

    async fn run_create(&self, op: &str, name: &str, cmd: &str) -> VlanResult<CreateOutcome> {
        let result = self.run(cmd).await?;
        if result.success() {
            Ok(CreateOutcome::Created)
        } else if is_exists_error(&result) {
            debug!("{} already exists", name);
            Ok(CreateOutcome::AlreadyExists)
        } else {
            Err(VlanError::kernel(op, name, result.combined_output()))
        }
    }

    async fn run_delete(&self, op: &str, name: &str, cmd: &str) -> VlanResult<()> {
        let result = self.run(cmd).await?;
        if result.success() || is_missing_device_error(&result) {
            Ok(())
        } else {
            Err(VlanError::kernel(op, name, result.combined_output()))
        }
    }

    async fn current_master(&self, op: &str, iface: &str) -> VlanResult<Option<String>> {
        let result = self
            .run_checked(op, iface, &build_show_link_cmd(iface))
            .await?;
        Ok(parse_master(&result.stdout))
    }
}

#[async_trait]
impl KernelDriver for IpLinkDriver {
    #[instrument(skip(self))]
    async fn create_bridge(&self, name: &str) -> VlanResult<CreateOutcome> {
        self.run_create("create_bridge", name, &build_add_bridge_cmd(name))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_bridge(&self, name: &str) -> VlanResult<()> {
        self.run_delete("delete_bridge", name, &build_del_bridge_cmd(name))
            .await
    }

    #[instrument(skip(self))]
    async fn attach_port(&self, bridge: &str, iface: &str) -> VlanResult<AttachOutcome> {
        if let Some(master) = self.current_master("attach_port", iface).await? {
            if master != bridge {
                warn!(
                    "{} is already a port of {}, not adding it to {}",
                    iface, master, bridge
                );
            }
            return Ok(AttachOutcome::AlreadyAttached);
        }

        self.run_checked("attach_port", iface, &build_add_port_cmd(bridge, iface))
            .await?;
        Ok(AttachOutcome::Attached)
    }

    #[instrument(skip(self))]
    async fn detach_port(&self, bridge: &str, iface: &str) -> VlanResult<()> {
        let result = self.run(&build_show_link_cmd(iface)).await?;
        if !result.success() {
            if is_missing_device_error(&result) {
                return Ok(());
            }
            return Err(VlanError::kernel(
                "detach_port",
                iface,
                result.combined_output(),
            ));
        }

        match parse_master(&result.stdout) {
            Some(master) if master == bridge => {
                self.run_delete("detach_port", iface, &build_del_port_cmd(iface))
                    .await
            }
            Some(master) => {
                debug!("{} is a port of {}, leaving it in place", iface, master);
                Ok(())
            }
            None => Ok(()),
        }
    }

    #[instrument(skip(self))]
    async fn count_ports(&self, bridge: &str) -> VlanResult<usize> {
        let result = self
            .run_checked("count_ports", bridge, &build_list_ports_cmd(bridge))
            .await?;
        Ok(count_link_records(&result.stdout))
    }

    #[instrument(skip(self))]
    async fn create_vlan_iface(
        &self,
        parent: &str,
        vlan_id: VlanId,
        name: &str,
    ) -> VlanResult<CreateOutcome> {
        self.run_create(
            "create_vlan_iface",
            name,
            &build_add_vlan_iface_cmd(parent, vlan_id, name),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_vlan_iface(&self, name: &str) -> VlanResult<()> {
        self.run_delete("delete_vlan_iface", name, &build_del_vlan_iface_cmd(name))
            .await
    }

    #[instrument(skip(self))]
    async fn set_admin_state(&self, name: &str, state: AdminState) -> VlanResult<()> {
        self.run_checked("set_admin_state", name, &build_set_admin_cmd(name, state))
            .await?;
        Ok(())
    }

    async fn interface_exists(&self, name: &str) -> bool {
        #[cfg(test)]
        if self.mock.is_some() {
            return matches!(self.run(&build_show_link_cmd(name)).await, Ok(r) if r.success());
        }

        #[cfg(target_os = "linux")]
        {
            nix::net::if_::if_nametoindex(name).is_ok()
        }

        #[cfg(not(target_os = "linux"))]
        {
            matches!(shell::exec(&build_show_link_cmd(name)).await, Ok(r) if r.success())
        }
    }

    #[instrument(skip(self))]
    async fn create_station_iface(&self, name: &str) -> VlanResult<()> {
        let cmd = build_add_station_iface_cmd(&self.base_iface, name, &self.station_iface_type);
        self.run_checked("create_station_iface", name, &cmd).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_station_iface(&self, name: &str) -> VlanResult<()> {
        self.run_checked(
            "remove_station_iface",
            name,
            &build_del_station_iface_cmd(name),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn failed(stderr: &str) -> ExecResult {
        ExecResult {
            exit_code: 2,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn ok(stdout: &str) -> ExecResult {
        ExecResult {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn driver(responses: Vec<ExecResult>) -> IpLinkDriver {
        IpLinkDriver::new("wlan0", DEFAULT_STATION_IFACE_TYPE).with_mock_mode(responses)
    }

    #[tokio::test]
    async fn test_create_bridge_outcomes() {
        let drv = driver(vec![ok(""), failed("RTNETLINK answers: File exists")]);

        assert_eq!(
            drv.create_bridge("brvlan10").await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            drv.create_bridge("brvlan10").await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(drv.captured_commands().len(), 2);
    }

    #[tokio::test]
    async fn test_create_bridge_error() {
        let drv = driver(vec![failed("RTNETLINK answers: Operation not permitted")]);
        let err = drv.create_bridge("brvlan10").await.unwrap_err();
        assert!(matches!(err, VlanError::Kernel { .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let drv = driver(vec![
            failed("Cannot find device \"brvlan10\""),
            failed("Cannot find device \"vlan10\""),
            failed("RTNETLINK answers: Device or resource busy"),
        ]);

        assert!(drv.delete_bridge("brvlan10").await.is_ok());
        assert!(drv.delete_vlan_iface("vlan10").await.is_ok());
        assert!(drv.delete_vlan_iface("vlan10").await.is_err());
    }

    #[tokio::test]
    async fn test_attach_port_fresh() {
        let drv = driver(vec![ok("7: wlan0.10: <UP> mtu 1500 state UP"), ok("")]);

        assert_eq!(
            drv.attach_port("brvlan10", "wlan0.10").await.unwrap(),
            AttachOutcome::Attached
        );
        let cmds = drv.captured_commands();
        assert!(cmds[1].contains("master \"brvlan10\""));
    }

    #[tokio::test]
    async fn test_attach_port_already_attached() {
        let drv = driver(vec![ok(
            "7: wlan0.10: <UP> mtu 1500 master brvlan10 state UP",
        )]);

        assert_eq!(
            drv.attach_port("brvlan10", "wlan0.10").await.unwrap(),
            AttachOutcome::AlreadyAttached
        );
        assert_eq!(drv.captured_commands().len(), 1);
    }

    #[tokio::test]
    async fn test_attach_port_other_bridge_is_left_alone() {
        let drv = driver(vec![ok(
            "7: wlan0.10: <UP> mtu 1500 master br-guest state UP",
        )]);

        assert_eq!(
            drv.attach_port("brvlan10", "wlan0.10").await.unwrap(),
            AttachOutcome::AlreadyAttached
        );
        let cmds = drv.captured_commands();
        assert_eq!(cmds.len(), 1);
        assert!(!cmds[0].contains("master"));
    }

    #[tokio::test]
    async fn test_detach_port_from_its_bridge() {
        let drv = driver(vec![
            ok("7: wlan0.10: <UP> mtu 1500 master brvlan10 state UP"),
            ok(""),
        ]);

        drv.detach_port("brvlan10", "wlan0.10").await.unwrap();
        let cmds = drv.captured_commands();
        assert_eq!(cmds.len(), 2);
        assert!(cmds[1].contains("nomaster"));
    }

    #[tokio::test]
    async fn test_detach_port_keeps_other_bridge() {
        let drv = driver(vec![ok(
            "7: wlan0.10: <UP> mtu 1500 master br-guest state UP",
        )]);

        drv.detach_port("brvlan10", "wlan0.10").await.unwrap();
        assert_eq!(drv.captured_commands().len(), 1);
    }

    #[tokio::test]
    async fn test_detach_port_unbridged_or_missing() {
        let drv = driver(vec![
            ok("7: wlan0.10: <UP> mtu 1500 state UP"),
            failed("Device \"wlan0.10\" does not exist."),
            failed("RTNETLINK answers: Operation not permitted"),
        ]);

        drv.detach_port("brvlan10", "wlan0.10").await.unwrap();
        drv.detach_port("brvlan10", "wlan0.10").await.unwrap();
        let err = drv.detach_port("brvlan10", "wlan0.10").await.unwrap_err();
        assert!(matches!(err, VlanError::Kernel { .. }));
        assert_eq!(drv.captured_commands().len(), 3);
    }

    #[tokio::test]
    async fn test_count_ports() {
        let drv = driver(vec![ok("7: wlan0.10: <UP>\n8: vlan10: <UP>")]);
        assert_eq!(drv.count_ports("brvlan10").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_station_iface_commands() {
        let drv = driver(vec![]);
        drv.create_station_iface("wlan0.10").await.unwrap();
        drv.remove_station_iface("wlan0.10").await.unwrap();

        let cmds = drv.captured_commands();
        assert!(cmds[0].contains("dev \"wlan0\" interface add \"wlan0.10\" type \"__ap\""));
        assert!(cmds[1].contains("dev \"wlan0.10\" del"));
    }

    #[tokio::test]
    async fn test_interface_exists_mock() {
        let drv = driver(vec![ok("7: wlan0: <UP>"), failed("Device \"x\" does not exist.")]);
        assert!(drv.interface_exists("wlan0").await);
        assert!(!drv.interface_exists("x").await);
    }
}
