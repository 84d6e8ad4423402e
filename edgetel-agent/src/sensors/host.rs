//! Host health metrics collection using sysinfo.
//!
//! One read gathers a [`HostSnapshot`]; each counter is optional so a
//! missing source degrades that field to null without failing the reading.

use std::path::{Path, PathBuf};

use edgetel_common::{FieldValue, Fields, Reading, SensorKind, Tags, round_to};
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, Networks, System};
use tracing::debug;

use crate::sensors::{SensorReader, device_tags};

/// Platform file exposing the SoC temperature in millidegrees Celsius.
pub const DEFAULT_THERMAL_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Which fields a metrics reading carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSet {
    /// Every counter, including per-core CPU and network totals.
    #[default]
    Detailed,
    /// A handful of headline values.
    Compact,
}

/// Fields kept by [`FieldSet::Compact`].
const COMPACT_FIELDS: [&str; 6] = [
    "cpu_percent",
    "ram_percent",
    "disk_percent",
    "pi_temp_c",
    "load_avg_1m",
    "uptime_seconds",
];

/// Cumulative network counters summed over all interfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: Option<u64>,
    pub dropout: Option<u64>,
}

/// Raw host counters from one collection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSnapshot {
    pub temperature_c: Option<f64>,
    pub ram_total_bytes: Option<u64>,
    pub ram_used_bytes: Option<u64>,
    pub swap_total_bytes: Option<u64>,
    pub swap_used_bytes: Option<u64>,
    pub disk_total_bytes: Option<u64>,
    pub disk_used_bytes: Option<u64>,
    pub cpu_percent: Option<f64>,
    pub cpu_freq_mhz: Option<f64>,
    pub per_core_percent: Vec<f64>,
    pub load_avg: Option<[f64; 3]>,
    pub net: Option<NetCounters>,
    pub uptime_seconds: Option<u64>,
    pub process_count: Option<u64>,
}

impl HostSnapshot {
    /// Convert the snapshot into reading fields.
    pub fn to_fields(&self, field_set: FieldSet) -> Fields {
        let mut fields = Fields::new();
        let mut put = |name: &str, value: Option<FieldValue>| {
            fields.insert(name.to_string(), value);
        };

        put("pi_temp_c", self.temperature_c.map(|t| gauge(t, 1)));

        put("ram_total_mb", self.ram_total_bytes.map(|b| gauge(b as f64 / MIB, 2)));
        put("ram_used_mb", self.ram_used_bytes.map(|b| gauge(b as f64 / MIB, 2)));
        put("ram_percent", percent(self.ram_used_bytes, self.ram_total_bytes));
        put("swap_total_mb", self.swap_total_bytes.map(|b| gauge(b as f64 / MIB, 2)));
        put("swap_used_mb", self.swap_used_bytes.map(|b| gauge(b as f64 / MIB, 2)));
        put("swap_percent", percent(self.swap_used_bytes, self.swap_total_bytes));

        put("disk_total_gb", self.disk_total_bytes.map(|b| gauge(b as f64 / GIB, 2)));
        put("disk_used_gb", self.disk_used_bytes.map(|b| gauge(b as f64 / GIB, 2)));
        put("disk_percent", percent(self.disk_used_bytes, self.disk_total_bytes));

        put("cpu_percent", self.cpu_percent.map(|p| gauge(p, 1)));
        put("cpu_freq_mhz", self.cpu_freq_mhz.map(|f| gauge(f, 2)));
        for (i, usage) in self.per_core_percent.iter().enumerate() {
            put(&format!("cpu_core_{}_percent", i), Some(gauge(*usage, 1)));
        }

        let load = self.load_avg;
        put("load_avg_1m", load.map(|l| gauge(l[0], 2)));
        put("load_avg_5m", load.map(|l| gauge(l[1], 2)));
        put("load_avg_15m", load.map(|l| gauge(l[2], 2)));

        let net = self.net;
        put("net_bytes_sent", net.map(|n| FieldValue::Counter(n.bytes_sent)));
        put("net_bytes_recv", net.map(|n| FieldValue::Counter(n.bytes_recv)));
        put("net_packets_sent", net.map(|n| FieldValue::Counter(n.packets_sent)));
        put("net_packets_recv", net.map(|n| FieldValue::Counter(n.packets_recv)));
        put("net_errin", net.map(|n| FieldValue::Counter(n.errin)));
        put("net_errout", net.map(|n| FieldValue::Counter(n.errout)));
        put("net_dropin", net.and_then(|n| n.dropin).map(FieldValue::Counter));
        put("net_dropout", net.and_then(|n| n.dropout).map(FieldValue::Counter));

        put("uptime_seconds", self.uptime_seconds.map(FieldValue::Counter));
        put("process_count", self.process_count.map(FieldValue::Counter));

        if field_set == FieldSet::Compact {
            fields.retain(|name, _| COMPACT_FIELDS.contains(&name.as_str()));
        }

        fields
    }
}

fn gauge(value: f64, decimals: i32) -> FieldValue {
    FieldValue::Gauge(round_to(value, decimals))
}

fn percent(used: Option<u64>, total: Option<u64>) -> Option<FieldValue> {
    let (used, total) = (used?, total?);
    let pct = if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    Some(gauge(pct, 1))
}

/// Read the SoC temperature in °C from a millidegree file.
///
/// Returns `None` if the file is missing or does not hold an integer.
pub fn read_thermal_zone(path: &Path) -> Option<f64> {
    let raw = std::fs::read_to_string(path).ok()?;
    let millidegrees: i64 = raw.trim().parse().ok()?;
    Some(millidegrees as f64 / 1000.0)
}

/// Reader for host health counters.
pub struct HostMetricsReader {
    system: System,
    disks: Disks,
    networks: Networks,
    thermal_path: PathBuf,
    field_set: FieldSet,
    tags: Tags,
}

impl HostMetricsReader {
    /// Create a new host metrics reader.
    pub fn new(device: &str, thermal_path: impl Into<PathBuf>, field_set: FieldSet) -> Self {
        let mut system = System::new();
        // Prime CPU usage so the first reading has a baseline.
        system.refresh_cpu_usage();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            thermal_path: thermal_path.into(),
            field_set,
            tags: device_tags(device),
        }
    }

    /// Gather one snapshot of every counter.
    pub fn collect(&mut self) -> HostSnapshot {
        let mut snapshot = HostSnapshot {
            temperature_c: read_thermal_zone(&self.thermal_path),
            ..Default::default()
        };

        self.collect_memory(&mut snapshot);
        self.collect_disk(&mut snapshot);
        self.collect_cpu(&mut snapshot);
        self.collect_network(&mut snapshot);

        let load = System::load_average();
        snapshot.load_avg = Some([load.one, load.five, load.fifteen]);
        snapshot.uptime_seconds = Some(System::uptime());
        snapshot.process_count = self.process_count();

        snapshot
    }

    fn collect_memory(&mut self, snapshot: &mut HostSnapshot) {
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total > 0 {
            snapshot.ram_total_bytes = Some(total);
            snapshot.ram_used_bytes = Some(self.system.used_memory());
        }

        // A host without swap reports zero for both, which is a real value.
        snapshot.swap_total_bytes = Some(self.system.total_swap());
        snapshot.swap_used_bytes = Some(self.system.used_swap());
    }

    fn collect_disk(&mut self, snapshot: &mut HostSnapshot) {
        self.disks.refresh(true);

        let Some(root) = self
            .disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
        else {
            debug!("No filesystem mounted at /");
            return;
        };

        let total = root.total_space();
        snapshot.disk_total_bytes = Some(total);
        snapshot.disk_used_bytes = Some(total.saturating_sub(root.available_space()));
    }

    fn collect_cpu(&mut self, snapshot: &mut HostSnapshot) {
        self.system.refresh_cpu_usage();
        self.system.refresh_cpu_frequency();

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return;
        }

        snapshot.cpu_percent = Some(self.system.global_cpu_usage() as f64);
        snapshot.per_core_percent = cpus.iter().map(|cpu| cpu.cpu_usage() as f64).collect();
        snapshot.cpu_freq_mhz = cpus
            .first()
            .map(|cpu| cpu.frequency())
            .filter(|freq| *freq > 0)
            .map(|freq| freq as f64);
    }

    fn collect_network(&mut self, snapshot: &mut HostSnapshot) {
        self.networks.refresh(true);

        let mut net = NetCounters::default();
        for data in self.networks.list().values() {
            net.bytes_sent += data.total_transmitted();
            net.bytes_recv += data.total_received();
            net.packets_sent += data.total_packets_transmitted();
            net.packets_recv += data.total_packets_received();
            net.errin += data.total_errors_on_received();
            net.errout += data.total_errors_on_transmitted();
        }

        #[cfg(target_os = "linux")]
        if let Some((dropin, dropout)) = crate::linux::network_drops() {
            net.dropin = Some(dropin);
            net.dropout = Some(dropout);
        }

        snapshot.net = Some(net);
    }

    #[cfg(target_os = "linux")]
    fn process_count(&mut self) -> Option<u64> {
        crate::linux::process_count()
    }

    #[cfg(not(target_os = "linux"))]
    fn process_count(&mut self) -> Option<u64> {
        use sysinfo::ProcessesToUpdate;

        self.system.refresh_processes(ProcessesToUpdate::All, true);
        Some(self.system.processes().len() as u64)
    }
}

impl SensorReader for HostMetricsReader {
    fn kind(&self) -> SensorKind {
        SensorKind::Metrics
    }

    fn read(&mut self) -> Option<Reading> {
        let snapshot = self.collect();
        let fields = snapshot.to_fields(self.field_set);
        debug!(
            sensor = %SensorKind::Metrics,
            fields = fields.len(),
            "Collected host metrics"
        );
        Reading::new(SensorKind::Metrics.measurement(), fields, self.tags.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn full_snapshot() -> HostSnapshot {
        HostSnapshot {
            temperature_c: Some(48.312),
            ram_total_bytes: Some(4 * 1024 * 1024 * 1024),
            ram_used_bytes: Some(1024 * 1024 * 1024),
            swap_total_bytes: Some(0),
            swap_used_bytes: Some(0),
            disk_total_bytes: Some(32 * 1024 * 1024 * 1024),
            disk_used_bytes: Some(8 * 1024 * 1024 * 1024),
            cpu_percent: Some(12.34),
            cpu_freq_mhz: Some(1500.0),
            per_core_percent: vec![10.0, 20.0, 5.56, 13.81],
            load_avg: Some([0.5, 0.25, 0.125]),
            net: Some(NetCounters {
                bytes_sent: 1000,
                bytes_recv: 2000,
                packets_sent: 10,
                packets_recv: 20,
                errin: 0,
                errout: 1,
                dropin: Some(3),
                dropout: None,
            }),
            uptime_seconds: Some(3600),
            process_count: Some(142),
        }
    }

    fn gauge_of(fields: &Fields, name: &str) -> Option<f64> {
        match fields.get(name)? {
            Some(FieldValue::Gauge(v)) => Some(*v),
            _ => None,
        }
    }

    #[test]
    fn test_detailed_fields() {
        let fields = full_snapshot().to_fields(FieldSet::Detailed);

        assert_eq!(gauge_of(&fields, "pi_temp_c"), Some(48.3));
        assert_eq!(gauge_of(&fields, "ram_total_mb"), Some(4096.0));
        assert_eq!(gauge_of(&fields, "ram_percent"), Some(25.0));
        assert_eq!(gauge_of(&fields, "swap_percent"), Some(0.0));
        assert_eq!(gauge_of(&fields, "disk_total_gb"), Some(32.0));
        assert_eq!(gauge_of(&fields, "disk_percent"), Some(25.0));
        assert_eq!(gauge_of(&fields, "cpu_percent"), Some(12.3));
        assert_eq!(gauge_of(&fields, "cpu_core_2_percent"), Some(5.6));
        assert_eq!(gauge_of(&fields, "load_avg_15m"), Some(0.13));
        assert_eq!(
            fields.get("net_bytes_recv"),
            Some(&Some(FieldValue::Counter(2000)))
        );
        assert_eq!(fields.get("net_dropin"), Some(&Some(FieldValue::Counter(3))));
        assert_eq!(fields.get("net_dropout"), Some(&None));
        assert_eq!(
            fields.get("process_count"),
            Some(&Some(FieldValue::Counter(142)))
        );
        assert!(fields.contains_key("cpu_core_3_percent"));
        assert!(!fields.contains_key("cpu_core_4_percent"));
    }

    #[test]
    fn test_compact_fields() {
        let fields = full_snapshot().to_fields(FieldSet::Compact);
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "cpu_percent",
                "disk_percent",
                "load_avg_1m",
                "pi_temp_c",
                "ram_percent",
                "uptime_seconds"
            ]
        );
    }

    #[test]
    fn test_missing_temperature_only_nulls_that_field() {
        let snapshot = HostSnapshot {
            temperature_c: None,
            ..full_snapshot()
        };
        let fields = snapshot.to_fields(FieldSet::Detailed);

        assert_eq!(fields.get("pi_temp_c"), Some(&None));
        let nulls: Vec<&String> = fields
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k)
            .collect();
        assert_eq!(nulls, vec!["net_dropout", "pi_temp_c"]);
    }

    #[test]
    fn test_read_thermal_zone() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "48312").unwrap();
        assert_eq!(read_thermal_zone(file.path()), Some(48.312));

        let mut garbage = tempfile::NamedTempFile::new().unwrap();
        writeln!(garbage, "n/a").unwrap();
        assert_eq!(read_thermal_zone(garbage.path()), None);

        assert_eq!(read_thermal_zone(Path::new("/nonexistent/thermal")), None);
    }

    #[test]
    fn test_reader_with_unreadable_thermal_file() {
        let mut reader =
            HostMetricsReader::new("pi01", "/nonexistent/thermal", FieldSet::Detailed);
        let reading = reader.read().expect("host metrics always produce a reading");

        assert_eq!(reading.measurement, "metrics");
        assert_eq!(reading.fields.get("pi_temp_c"), Some(&None));
        assert!(reading.field("ram_total_mb").is_some());
        assert!(reading.field("uptime_seconds").is_some());
        assert!(reading.field("load_avg_1m").is_some());
        assert!(reading.field("net_bytes_sent").is_some());
        assert_eq!(reading.tags.get("device"), Some(&"pi01".to_string()));
    }
}
