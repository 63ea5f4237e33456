// Model tests: JSON camelCase, absent fields, sample construction from raw reads

mod common;

use pimonitor::models::*;

#[test]
fn test_sample_serialization_camel_case_and_null_for_absent() {
    let s = common::empty_sample(42);
    let json = serde_json::to_value(&s).unwrap();
    assert_eq!(json["timestamp"], 42);
    assert!(json["cpuUsage"].is_null());
    assert!(json["memoryTotal"].is_null());
    assert!(json.get("diskIo").is_some());

    let full = serde_json::to_string(&common::sample(1)).unwrap();
    assert!(full.contains("\"rxBytesPerSec\""));
    assert!(full.contains("\"writtenBytesTotal\""));
    let back: Sample = serde_json::from_str(&full).unwrap();
    assert_eq!(back, common::sample(1));
}

#[test]
fn test_sample_from_raw_without_rates_has_counters_but_no_rates() {
    let raw = common::raw(5_000, 1_000, 2_000);
    let s = Sample::from_raw(&raw, None);
    assert_eq!(s.timestamp, 5_000);
    assert_eq!(s.cpu_usage, Some(5.0));
    assert_eq!(s.memory_used, Some(256));
    assert_eq!(s.memory_usage_percent(), Some(25.0));
    assert_eq!(s.disks[0].percent(), Some(25.0));
    assert_eq!(s.network[0].rx_bytes_total, Some(1_000));
    assert_eq!(s.network[0].rx_bytes_per_sec, None);
    assert_eq!(s.disk_io[0].read_bytes_total, Some(2_000));
    assert_eq!(s.disk_io[0].read_bytes_per_sec, None);
}

#[test]
fn test_sample_from_raw_keeps_absent_sources_absent() {
    let mut raw = common::raw(5_000, 1_000, 2_000);
    raw.memory = None;
    raw.mounts[0].usage = None;
    raw.interfaces[0].counters = None;
    let s = Sample::from_raw(&raw, None);
    assert_eq!(s.memory_used, None);
    assert_eq!(s.memory_usage_percent(), None);
    assert_eq!(s.disks[0].path, "/");
    assert_eq!(s.disks[0].percent(), None);
    assert_eq!(s.network[0].name, "eth0");
    assert_eq!(s.network[0].rx_bytes_total, None);
}

#[test]
fn test_space_usage_percent_of_zero_total_is_absent() {
    assert_eq!(SpaceUsage { used: 0, total: 0 }.percent(), None);
    assert_eq!(SpaceUsage { used: 1, total: 4 }.percent(), Some(25.0));
}

#[test]
fn test_stat_from_values() {
    assert_eq!(Stat::from_values(Vec::<f64>::new()), None);
    assert_eq!(
        Stat::from_values([2.0, 4.0, 9.0]),
        Some(Stat {
            mean: 5.0,
            min: 2.0,
            max: 9.0
        })
    );
}
