//! linkwardend — the daemon entrypoint and CLI test harness (§6.3, §10.5).
//!
//! With no subcommand, runs as the persistent failover daemon: loads
//! config, starts discovery/collection/decision tickers, and blocks until
//! the process is killed (graceful drain is reachable in-process via
//! `CoreLoopHandle::shutdown`, wired to the SIGHUP/reload path, not to
//! process-exit signals here). With a subcommand, it boots the same engine, forces one
//! discovery + decision cycle, prints the requested `CoreHandle` view as
//! JSON, and exits — a local demo/test harness for the RPC surface, not a
//! client to an already-running daemon (§10.5: no wire transport is built;
//! that's the out-of-scope "RPC/CLI surface" collaborator's job).

use clap::{Parser, Subcommand};
use linkwarden_common::config::ConfigSnapshot;
use linkwarden_common::{Class, MemberId};
use linkwarden_core::collector::cellular::{CellularCollector, CellularRpc, CellularTelemetry, ModemControlChannel};
use linkwarden_core::collector::lan::LanCollector;
use linkwarden_core::collector::satellite::{SatelliteCollector, SatelliteRpc, SatelliteTelemetry};
use linkwarden_core::collector::wifi::{WifiCollector, WifiRpc, WifiTelemetry};
use linkwarden_core::collector::Collector;
use linkwarden_core::controller::{Controller, DryRunController, FallbackRouteController, RouteTable};
use linkwarden_core::discovery::{ClassificationProbe, PolicyEntry, SysfsProbe};
use linkwarden_core::rpc::CoreHandle;
use linkwarden_core::CoreLoop;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Command as ShellCommand;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "linkwardend", about = "Multi-WAN failover daemon")]
struct Cli {
    /// UCI-like TOML config document (§6.1).
    #[arg(long, default_value = "/etc/linkwarden.conf")]
    config: PathBuf,

    /// Policy tree mapping member names to netdevs (out-of-scope
    /// "configuration loader" collaborator's bundled stand-in, §10.4).
    #[arg(long, default_value = "/etc/linkwarden.policy.toml")]
    policy: PathBuf,

    /// Heartbeat JSON path (§6.4). Omit to disable.
    #[arg(long)]
    heartbeat_path: Option<PathBuf>,

    #[arg(long, default_value = "linkwarden-router")]
    device_id: String,

    /// Mutate kernel default-route metrics on switch (§6.5 fallback path)
    /// instead of logging a dry-run intent. Off by default.
    #[arg(long, default_value_t = false)]
    fallback_live: bool,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    Status,
    Members,
    Metrics { name: String },
    History { name: String, since_s: Option<u64> },
    Events { limit: Option<usize> },
    Failover,
    Restore,
    Recheck,
    Setlog { level: String },
}

/// One row of the bundled policy-tree loader (§10.4: TOML stand-in for
/// `uci show linkwarden`'s member list).
#[derive(Debug, Clone, Deserialize)]
struct PolicyMember {
    name: String,
    iface: String,
    class: Option<Class>,
    weight: Option<u32>,
    sim_slot: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    member: Vec<PolicyMember>,
}

fn load_policy_entries(path: &PathBuf) -> anyhow::Result<Vec<PolicyEntry>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return Ok(Vec::new()),
    };
    let parsed: PolicyFile = toml::from_str(&text)
        .map_err(|e| anyhow::anyhow!("invalid policy tree {}: {e}", path.display()))?;
    Ok(parsed
        .member
        .into_iter()
        .map(|m| {
            let mut entry = PolicyEntry::new(m.name, m.iface);
            entry.class_override = m.class;
            entry.weight = m.weight.unwrap_or(100);
            entry.cellular_sim_slot = m.sim_slot;
            entry
        })
        .collect())
}

/// Always-absent RPC providers for the out-of-scope management backends
/// (Starlink gRPC, ModemManager D-Bus, wpa_supplicant D-Bus, AT control
/// channel). Each collector's documented fallback leg (common TCP probe,
/// `/proc/net/wireless`, `iw`, sysfs counters) carries the member when
/// these report unavailable, exactly as it does in the unit tests for a
/// failing provider.
struct UnconfiguredRpc;

impl SatelliteRpc for UnconfiguredRpc {
    fn query(&self, _iface: &str, _timeout: Duration) -> Result<SatelliteTelemetry, String> {
        Err("satellite management RPC not configured".to_string())
    }
}

impl CellularRpc for UnconfiguredRpc {
    fn query(&self, _iface: &str, _timeout: Duration) -> Result<CellularTelemetry, String> {
        Err("mobile bus RPC not configured".to_string())
    }
}

impl ModemControlChannel for UnconfiguredRpc {
    fn query(&self, _iface: &str, _timeout: Duration) -> Result<CellularTelemetry, String> {
        Err("modem control channel not configured".to_string())
    }
}

impl WifiRpc for UnconfiguredRpc {
    fn query(&self, _iface: &str, _timeout: Duration) -> Result<WifiTelemetry, String> {
        Err("wireless-info RPC not configured".to_string())
    }
}

fn build_collectors(fallback_targets: Vec<SocketAddr>) -> HashMap<&'static str, Box<dyn Collector>> {
    let mut collectors: HashMap<&'static str, Box<dyn Collector>> = HashMap::new();
    collectors.insert(
        "satellite",
        Box::new(SatelliteCollector::new(UnconfiguredRpc, fallback_targets.clone())),
    );
    collectors.insert(
        "cellular",
        Box::new(CellularCollector::new(
            UnconfiguredRpc,
            UnconfiguredRpc,
            fallback_targets.clone(),
        )),
    );
    collectors.insert(
        "wifi",
        Box::new(WifiCollector::new(UnconfiguredRpc, fallback_targets.clone())),
    );
    collectors.insert("lan", Box::new(LanCollector::new(Class::Lan, fallback_targets.clone())));
    collectors.insert("other", Box::new(LanCollector::new(Class::Other, fallback_targets)));
    collectors
}

/// Shells out to `ip route`, the way the wifi collector's last-resort
/// fallback shells out to `iw` — there's no ambient crate in the stack for
/// netlink route manipulation.
struct IpRouteTable;

impl RouteTable for IpRouteTable {
    fn current_default_iface(&self) -> Result<Option<String>, String> {
        let output = ShellCommand::new("ip")
            .args(["route", "show", "default"])
            .output()
            .map_err(|e| e.to_string())?;
        let text = String::from_utf8_lossy(&output.stdout);
        let iface = text
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().skip_while(|w| *w != "dev").nth(1))
            .map(|s| s.to_string());
        Ok(iface)
    }

    fn set_metric(&self, iface: &str, metric: u32) -> Result<(), String> {
        let status = ShellCommand::new("ip")
            .args(["route", "replace", "default", "dev", iface, "metric", &metric.to_string()])
            .status()
            .map_err(|e| e.to_string())?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("ip route replace exited with {status}"))
        }
    }
}

fn build_controller(fallback_live: bool, policy: Vec<PolicyEntry>) -> Box<dyn Controller> {
    if !fallback_live {
        return Box::new(DryRunController);
    }
    let iface_by_id: HashMap<MemberId, String> = policy
        .into_iter()
        .map(|e| (MemberId::new(e.name), e.iface))
        .collect();
    Box::new(FallbackRouteController::new(IpRouteTable, move |id: &MemberId| {
        iface_by_id.get(id).cloned().unwrap_or_else(|| id.as_str().to_string())
    }))
}

fn load_config(path: &PathBuf) -> anyhow::Result<ConfigSnapshot> {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    let (snapshot, warnings) =
        ConfigSnapshot::from_toml_str(&text).map_err(|e| anyhow::anyhow!("config {}: {e}", path.display()))?;
    for w in warnings {
        tracing::warn!(field = %w.field, detail = %w.detail, "config field invalid");
    }
    Ok(snapshot)
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to serialize response: {e}"),
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.main.log_level.as_str())),
        )
        .init();

    let policy_entries = load_policy_entries(&cli.policy)?;
    let fallback_targets: Vec<SocketAddr> = vec!["1.1.1.1:443".parse().unwrap(), "8.8.8.8:443".parse().unwrap()];
    let probe: Box<dyn ClassificationProbe> = Box::new(SysfsProbe::new("192.168.100.1:9200".parse().unwrap()));
    let collectors = build_collectors(fallback_targets);
    let controller = build_controller(cli.fallback_live, policy_entries.clone());
    let handle = CoreHandle::new(config.clone(), now_ms());

    let core = std::sync::Arc::new(CoreLoop::new(
        config,
        handle.clone(),
        probe,
        Box::new(move || policy_entries.clone()),
        collectors,
        controller,
        cli.device_id,
        cli.heartbeat_path,
    ));

    match cli.command {
        None => {
            tracing::info!("linkwardend starting");
            let (_control, worker) = core.spawn();
            // procd/systemd deliver SIGTERM to stop the unit; the core
            // loop's own graceful-shutdown path (§4.8 "drain up to 5s") is
            // reached via `CoreLoopHandle::shutdown`, wired to SIGHUP/RPC
            // reload paths rather than process-exit signals here.
            let _ = worker.join();
            Ok(())
        }
        Some(action) => {
            core.discovery_tick();
            core.decision_tick(now_ms());
            run_action(&handle, action)
        }
    }
}

fn run_action(handle: &CoreHandle, action: Action) -> anyhow::Result<()> {
    match action {
        Action::Status => print_json(&handle.status(now_ms())),
        Action::Members => print_json(&handle.members()),
        Action::Metrics { name } => print_json(&handle.metrics(&MemberId::from(name), None)),
        Action::History { name, since_s } => print_json(&handle.metrics(&MemberId::from(name), since_s)),
        Action::Events { limit } => print_json(&handle.events(limit.unwrap_or(20))),
        Action::Failover | Action::Restore | Action::Recheck => {
            tracing::warn!(
                "{:?} requires a running daemon process; this invocation only booted a fresh, \
                 short-lived engine instance (§10.5 CLI is a demo harness, not an RPC client)",
                action
            );
        }
        Action::Setlog { level } => {
            tracing::warn!(level = %level, "setlog requires a running daemon process; no-op here");
        }
    }
    Ok(())
}
