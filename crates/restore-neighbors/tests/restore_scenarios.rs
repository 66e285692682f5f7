//! End-to-end restore runs against an in-memory kernel.

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sonic_restore_neighbors::{
    run_restore_neighbors, EthernetProbeBuilder, InsertOutcome, KernelNeighborInstaller,
    NeighborTableDriver, ProbeSocket, ProbeTransmitter, RestoreEnvironment, RestoreError,
    RestoreRunStatus, RestoreSummary, Result,
};
use sonic_warmrestart_common::{
    AddressFamily, MacAddress, ManualClock, MemoryStateStore, RestoreConfig,
    StateDbWarmRestartGate, StateStore,
};
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

const ROUTER_MAC: &str = "00:11:22:33:44:55";

/// Kernel double: carrier comes up at a fixed virtual time, inserts go into
/// a plain list.
struct FakeKernel {
    clock: ManualClock,
    carrier_up_at: HashMap<String, Option<Duration>>,
    macs: HashMap<String, MacAddress>,
    addresses: HashMap<String, Vec<IpAddr>>,
    rejected: Option<IpAddr>,
    table: Mutex<Vec<(String, IpAddr, MacAddress)>>,
    insert_times: Mutex<Vec<Duration>>,
}

impl FakeKernel {
    fn new(clock: &ManualClock) -> Self {
        Self {
            clock: clock.clone(),
            carrier_up_at: HashMap::new(),
            macs: HashMap::new(),
            addresses: HashMap::new(),
            rejected: None,
            table: Mutex::new(Vec::new()),
            insert_times: Mutex::new(Vec::new()),
        }
    }

    /// Interface with a MAC and addresses whose carrier comes up at `up_at`.
    fn interface(mut self, name: &str, up_at: Option<Duration>, addresses: &[&str]) -> Self {
        self.carrier_up_at.insert(name.to_string(), up_at);
        self.macs.insert(name.to_string(), ROUTER_MAC.parse().unwrap());
        self.addresses.insert(
            name.to_string(),
            addresses.iter().map(|a| a.parse().unwrap()).collect(),
        );
        self
    }

    fn without_mac(mut self, name: &str) -> Self {
        self.macs.remove(name);
        self
    }

    fn rejecting(mut self, ip: &str) -> Self {
        self.rejected = Some(ip.parse().unwrap());
        self
    }

    fn table_len(&self) -> usize {
        self.table.lock().len()
    }

    fn insert_times(&self) -> Vec<Duration> {
        self.insert_times.lock().clone()
    }
}

#[async_trait]
impl NeighborTableDriver for FakeKernel {
    async fn insert(&self, interface: &str, ip: IpAddr, mac: MacAddress) -> Result<InsertOutcome> {
        if self.rejected == Some(ip) {
            return Err(RestoreError::Kernel {
                interface: interface.to_string(),
                ip: ip.to_string(),
                message: "RTNETLINK answers: Operation not permitted".to_string(),
            });
        }
        self.insert_times.lock().push(self.clock.elapsed());

        let mut table = self.table.lock();
        if table.iter().any(|(i, a, _)| i == interface && *a == ip) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        table.push((interface.to_string(), ip, mac));
        Ok(InsertOutcome::Added)
    }

    async fn check_carrier(&self, interface: &str) -> Result<bool> {
        match self.carrier_up_at.get(interface) {
            Some(Some(up_at)) => Ok(self.clock.elapsed() >= *up_at),
            Some(None) => Ok(false),
            None => Err(RestoreError::link(interface, "No such device")),
        }
    }

    async fn lookup_first_address(
        &self,
        interface: &str,
        family: AddressFamily,
    ) -> Result<Option<IpAddr>> {
        Ok(self
            .addresses
            .get(interface)
            .and_then(|ips| ips.iter().copied().find(|ip| AddressFamily::of(ip) == family)))
    }

    async fn lookup_hardware_address(&self, interface: &str) -> Result<Option<MacAddress>> {
        Ok(self.macs.get(interface).copied())
    }
}

#[derive(Default)]
struct Wire {
    opened: Vec<String>,
    closed: usize,
    frames: Vec<(String, Vec<u8>)>,
}

/// Records every frame; optionally fails every send.
#[derive(Default)]
struct RecordingTransmitter {
    wire: Arc<Mutex<Wire>>,
    fail_sends: bool,
}

struct RecordingSocket {
    interface: String,
    wire: Arc<Mutex<Wire>>,
    fail_sends: bool,
}

impl ProbeTransmitter for RecordingTransmitter {
    fn open(&self, interface: &str) -> Result<Box<dyn ProbeSocket>> {
        self.wire.lock().opened.push(interface.to_string());
        Ok(Box::new(RecordingSocket {
            interface: interface.to_string(),
            wire: self.wire.clone(),
            fail_sends: self.fail_sends,
        }))
    }
}

impl ProbeSocket for RecordingSocket {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if self.fail_sends {
            return Err(RestoreError::Transmit {
                interface: self.interface.clone(),
                source: io::Error::from_raw_os_error(100),
            });
        }
        self.wire
            .lock()
            .frames
            .push((self.interface.clone(), frame.to_vec()));
        Ok(())
    }
}

impl Drop for RecordingSocket {
    fn drop(&mut self) {
        self.wire.lock().closed += 1;
    }
}

struct Harness {
    clock: ManualClock,
    appl_db: MemoryStateStore,
    state_db: MemoryStateStore,
}

impl Harness {
    /// System warm reboot in progress.
    async fn warm_reboot() -> Self {
        let harness = Self {
            clock: ManualClock::new(),
            appl_db: MemoryStateStore::new(),
            state_db: MemoryStateStore::new(),
        };
        harness
            .state_db
            .hset("WARM_RESTART_ENABLE_TABLE|system", &[("enable", "true")])
            .await
            .unwrap();
        harness
    }

    async fn neighbor(&self, interface: &str, ip: &str, mac: &str, family: &str) {
        let key = format!("NEIGH_TABLE:{}:{}", interface, ip);
        self.appl_db
            .hset(&key, &[("neigh", mac), ("family", family)])
            .await
            .unwrap();
    }

    async fn run(
        &self,
        kernel: &FakeKernel,
        transmitter: &RecordingTransmitter,
    ) -> Result<RestoreRunStatus> {
        let gate = StateDbWarmRestartGate::new(self.state_db.clone());
        let env = RestoreEnvironment {
            driver: kernel,
            transmitter,
            builder: &EthernetProbeBuilder,
            clock: &self.clock,
        };
        run_restore_neighbors(
            self.appl_db.clone(),
            self.state_db.clone(),
            &gate,
            env,
            &RestoreConfig::default(),
        )
        .await
    }

    async fn restored_flag(&self) -> Option<String> {
        self.state_db
            .hget("NEIGH_RESTORE_TABLE|Flags", "restored")
            .await
            .unwrap()
    }
}

fn completed(status: RestoreRunStatus) -> RestoreSummary {
    match status {
        RestoreRunStatus::Completed(summary) => summary,
        RestoreRunStatus::Disabled | RestoreRunStatus::Skipped => {
            panic!("expected the restore loop to run")
        }
    }
}

fn ethertype(frame: &[u8]) -> u16 {
    u16::from_be_bytes([frame[12], frame[13]])
}

#[tokio::test]
async fn test_entries_wait_for_carrier() {
    let harness = Harness::warm_reboot().await;
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv4")
        .await;
    let kernel = FakeKernel::new(&harness.clock).interface(
        "Ethernet0",
        Some(Duration::from_secs(8)),
        &["10.0.0.0"],
    );
    let transmitter = RecordingTransmitter::default();

    let summary = completed(harness.run(&kernel, &transmitter).await.unwrap());

    // Down at t=0 and t=5, up at t=10.
    assert_eq!(kernel.insert_times(), vec![Duration::from_secs(10)]);
    assert_eq!(summary.passes, 3);
    assert_eq!(summary.entries_added, 1);
    assert_eq!(summary.probes_sent, 1);
    assert!(summary.is_complete());
    assert_eq!(harness.clock.elapsed(), Duration::from_secs(10));

    let wire = transmitter.wire.lock();
    assert_eq!(wire.opened, vec!["Ethernet0"]);
    assert_eq!(wire.closed, 1);
    assert_eq!(wire.frames.len(), 1);
    let (interface, frame) = &wire.frames[0];
    assert_eq!(interface, "Ethernet0");
    assert_eq!(ethertype(frame), 0x0806);
    assert_eq!(&frame[0..6], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    drop(wire);

    assert_eq!(harness.restored_flag().await.as_deref(), Some("true"));
}

#[tokio::test]
async fn test_deadline_abandons_but_still_signals() {
    let harness = Harness::warm_reboot().await;
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv4")
        .await;
    let kernel = FakeKernel::new(&harness.clock).interface("Ethernet0", None, &["10.0.0.0"]);
    let transmitter = RecordingTransmitter::default();

    let summary = completed(harness.run(&kernel, &transmitter).await.unwrap());

    assert_eq!(summary.abandoned_interfaces, vec!["Ethernet0"]);
    assert_eq!(summary.abandoned_entries, 1);
    // Passes at t=0,5,...,110; the deadline is noticed at t=115.
    assert_eq!(summary.passes, 23);
    assert_eq!(harness.clock.elapsed(), Duration::from_secs(115));
    assert_eq!(kernel.table_len(), 0);
    assert!(transmitter.wire.lock().opened.is_empty());
    assert_eq!(harness.restored_flag().await.as_deref(), Some("true"));
}

#[tokio::test]
async fn test_missing_interface_is_not_fatal() {
    let harness = Harness::warm_reboot().await;
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv4")
        .await;
    harness
        .neighbor("Ethernet4", "10.0.0.3", "aa:bb:cc:dd:ee:01", "IPv4")
        .await;
    let kernel = FakeKernel::new(&harness.clock).interface(
        "Ethernet0",
        Some(Duration::ZERO),
        &["10.0.0.0"],
    );
    let transmitter = RecordingTransmitter::default();

    let summary = completed(harness.run(&kernel, &transmitter).await.unwrap());

    assert_eq!(summary.interfaces_restored, 1);
    assert_eq!(summary.abandoned_interfaces, vec!["Ethernet4"]);
    assert_eq!(harness.restored_flag().await.as_deref(), Some("true"));
}

#[tokio::test]
async fn test_existing_kernel_entries_are_accepted() {
    let harness = Harness::warm_reboot().await;
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv4")
        .await;
    let kernel = FakeKernel::new(&harness.clock).interface(
        "Ethernet0",
        Some(Duration::ZERO),
        &["10.0.0.0"],
    );
    kernel.table.lock().push((
        "Ethernet0".to_string(),
        "10.0.0.1".parse().unwrap(),
        "aa:bb:cc:dd:ee:ff".parse().unwrap(),
    ));
    let transmitter = RecordingTransmitter::default();

    let summary = completed(harness.run(&kernel, &transmitter).await.unwrap());

    assert_eq!(summary.entries_added, 0);
    assert_eq!(summary.entries_already_present, 1);
    assert_eq!(summary.probes_sent, 1);
    assert_eq!(kernel.table_len(), 1);
}

#[tokio::test]
async fn test_installer_is_idempotent() {
    let clock = ManualClock::new();
    let kernel = FakeKernel::new(&clock);
    let mut installer = KernelNeighborInstaller::new();
    let ip: IpAddr = "fc00::2".parse().unwrap();
    let mac: MacAddress = "aa:bb:cc:dd:ee:01".parse().unwrap();

    let first = installer.install(&kernel, "Vlan1000", ip, mac).await.unwrap();
    let second = installer.install(&kernel, "Vlan1000", ip, mac).await.unwrap();

    assert_eq!(first, InsertOutcome::Added);
    assert_eq!(second, InsertOutcome::AlreadyPresent);
    assert_eq!(kernel.table_len(), 1);
    assert_eq!(installer.total(), 2);
}

#[tokio::test]
async fn test_families_and_bridge_members() {
    let harness = Harness::warm_reboot().await;
    harness
        .state_db
        .hset("VLAN_MEMBER_TABLE|Vlan1000|Ethernet8", &[("state", "ok")])
        .await
        .unwrap();
    harness
        .neighbor("Vlan1000", "192.168.0.2", "aa:bb:cc:dd:ee:01", "IPv4")
        .await;
    harness
        .neighbor("Vlan1000", "fc02:1000::2", "aa:bb:cc:dd:ee:02", "IPv6")
        .await;
    harness
        .neighbor("Vlan1000", "fc02:1000::3", "aa:bb:cc:dd:ee:03", "IPv6")
        .await;
    let kernel = FakeKernel::new(&harness.clock).interface(
        "Vlan1000",
        Some(Duration::ZERO),
        &["192.168.0.1", "fc02:1000::1"],
    );
    let transmitter = RecordingTransmitter::default();

    let summary = completed(harness.run(&kernel, &transmitter).await.unwrap());

    assert_eq!(summary.passes, 1);
    assert_eq!(summary.entries_added, 3);
    assert_eq!(summary.probes_sent, 3);
    assert_eq!(harness.clock.elapsed(), Duration::ZERO);

    let wire = transmitter.wire.lock();
    assert_eq!(wire.opened, vec!["Vlan1000"]);
    assert_eq!(wire.closed, 1);
    let types: Vec<u16> = wire.frames.iter().map(|(_, f)| ethertype(f)).collect();
    assert_eq!(types, vec![0x0806, 0x86dd, 0x86dd]);
    // Neighbor solicitation goes to the solicited-node group of the target.
    assert_eq!(&wire.frames[1].1[0..6], &[0x33, 0x33, 0xff, 0x00, 0x00, 0x02]);
}

#[tokio::test]
async fn test_no_mac_installs_without_probes() {
    let harness = Harness::warm_reboot().await;
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv4")
        .await;
    let kernel = FakeKernel::new(&harness.clock)
        .interface("Ethernet0", Some(Duration::ZERO), &["10.0.0.0"])
        .without_mac("Ethernet0");
    let transmitter = RecordingTransmitter::default();

    let summary = completed(harness.run(&kernel, &transmitter).await.unwrap());

    assert_eq!(summary.entries_added, 1);
    assert_eq!(summary.probes_sent, 0);
    assert_eq!(summary.probes_skipped, 1);
    assert!(transmitter.wire.lock().opened.is_empty());
}

#[tokio::test]
async fn test_no_source_address_installs_without_probes() {
    let harness = Harness::warm_reboot().await;
    harness
        .neighbor("Ethernet0", "fc00::2", "aa:bb:cc:dd:ee:ff", "IPv6")
        .await;
    let kernel =
        FakeKernel::new(&harness.clock).interface("Ethernet0", Some(Duration::ZERO), &["10.0.0.0"]);
    let transmitter = RecordingTransmitter::default();

    let summary = completed(harness.run(&kernel, &transmitter).await.unwrap());

    assert_eq!(summary.entries_added, 1);
    assert_eq!(summary.probes_skipped, 1);
    assert!(transmitter.wire.lock().frames.is_empty());
}

#[tokio::test]
async fn test_transmit_failures_do_not_block() {
    let harness = Harness::warm_reboot().await;
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv4")
        .await;
    harness
        .neighbor("Ethernet0", "10.0.0.3", "aa:bb:cc:dd:ee:01", "IPv4")
        .await;
    let kernel = FakeKernel::new(&harness.clock).interface(
        "Ethernet0",
        Some(Duration::ZERO),
        &["10.0.0.0"],
    );
    let transmitter = RecordingTransmitter {
        fail_sends: true,
        ..Default::default()
    };

    let summary = completed(harness.run(&kernel, &transmitter).await.unwrap());

    assert_eq!(summary.entries_added, 2);
    assert_eq!(summary.transmit_failures, 2);
    assert!(summary.is_complete());
    assert_eq!(harness.restored_flag().await.as_deref(), Some("true"));
}

#[tokio::test]
async fn test_kernel_error_is_fatal_and_leaves_flag_unset() {
    let harness = Harness::warm_reboot().await;
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv4")
        .await;
    let kernel = FakeKernel::new(&harness.clock)
        .interface("Ethernet0", Some(Duration::ZERO), &["10.0.0.0"])
        .rejecting("10.0.0.1");
    let transmitter = RecordingTransmitter::default();

    let err = harness.run(&kernel, &transmitter).await.unwrap_err();

    assert!(matches!(err, RestoreError::Kernel { .. }));
    assert_eq!(harness.restored_flag().await, None);
}

#[tokio::test]
async fn test_malformed_snapshot_is_fatal() {
    let harness = Harness::warm_reboot().await;
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv5")
        .await;
    let kernel = FakeKernel::new(&harness.clock);
    let transmitter = RecordingTransmitter::default();

    let err = harness.run(&kernel, &transmitter).await.unwrap_err();

    assert!(matches!(err, RestoreError::MalformedSnapshot { .. }));
    assert_eq!(harness.restored_flag().await, None);
}

#[tokio::test]
async fn test_swss_restart_without_reboot_signals_immediately() {
    let harness = Harness {
        clock: ManualClock::new(),
        appl_db: MemoryStateStore::new(),
        state_db: MemoryStateStore::new(),
    };
    harness
        .state_db
        .hset("WARM_RESTART_ENABLE_TABLE|swss", &[("enable", "true")])
        .await
        .unwrap();
    // Never read: the kernel table survived.
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv5")
        .await;
    let kernel = FakeKernel::new(&harness.clock);
    let transmitter = RecordingTransmitter::default();

    let status = harness.run(&kernel, &transmitter).await.unwrap();

    assert_eq!(status, RestoreRunStatus::Skipped);
    assert_eq!(harness.restored_flag().await.as_deref(), Some("true"));
    assert_eq!(harness.clock.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_warm_restart_disabled_clears_flag() {
    let harness = Harness {
        clock: ManualClock::new(),
        appl_db: MemoryStateStore::new(),
        state_db: MemoryStateStore::new(),
    };
    // Left behind by an earlier warm reboot.
    harness
        .state_db
        .hset("NEIGH_RESTORE_TABLE|Flags", &[("restored", "true")])
        .await
        .unwrap();
    harness
        .neighbor("Ethernet0", "10.0.0.1", "aa:bb:cc:dd:ee:ff", "IPv4")
        .await;
    let kernel = FakeKernel::new(&harness.clock).interface(
        "Ethernet0",
        Some(Duration::ZERO),
        &["10.0.0.0"],
    );
    let transmitter = RecordingTransmitter::default();

    let status = harness.run(&kernel, &transmitter).await.unwrap();

    assert_eq!(status, RestoreRunStatus::Disabled);
    assert_eq!(harness.restored_flag().await, None);
    assert_eq!(kernel.table_len(), 0);
    assert_eq!(harness.clock.elapsed(), Duration::ZERO);
}
