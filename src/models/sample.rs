// Sample: one stored data point. Counters are kept as-is and complemented with rates.

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use super::snapshot::{RawSnapshot, SpaceUsage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub path: String,
    pub used: Option<u64>,
    pub total: Option<u64>,
}

impl DiskUsage {
    pub fn percent(&self) -> Option<f64> {
        match (self.used, self.total) {
            (Some(used), Some(total)) => SpaceUsage { used, total }.percent(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceSample {
    pub name: String,
    pub rx_bytes_total: Option<u64>,
    pub tx_bytes_total: Option<u64>,
    /// Receive rate in bytes/sec against the previous snapshot; None for no data this interval.
    pub rx_bytes_per_sec: Option<f64>,
    pub tx_bytes_per_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSample {
    pub name: String,
    pub read_bytes_total: Option<u64>,
    pub written_bytes_total: Option<u64>,
    pub read_bytes_per_sec: Option<f64>,
    pub write_bytes_per_sec: Option<f64>,
}

/// Rates derived from two consecutive snapshots, keyed by interface / device name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedRates {
    pub interfaces: Vec<InterfaceRate>,
    pub devices: Vec<DeviceRate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceRate {
    pub name: String,
    pub rx_bytes_per_sec: Option<f64>,
    pub tx_bytes_per_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRate {
    pub name: String,
    pub read_bytes_per_sec: Option<f64>,
    pub write_bytes_per_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: u64,
    pub cpu_usage: Option<f64>,
    pub cpu_temp: Option<f64>,
    pub memory_used: Option<u64>,
    pub memory_total: Option<u64>,
    pub disks: Vec<DiskUsage>,
    pub network: Vec<InterfaceSample>,
    pub disk_io: Vec<DeviceSample>,
}

impl Sample {
    /// Combine a raw read with the rates computed against its predecessor.
    /// Without `rates` (first tick) every rate is absent.
    pub fn from_raw(raw: &RawSnapshot, rates: Option<&DerivedRates>) -> Self {
        let network = raw
            .interfaces
            .iter()
            .map(|iface| {
                let rate = rates.and_then(|r| r.interfaces.iter().find(|i| i.name == iface.name));
                InterfaceSample {
                    name: iface.name.clone(),
                    rx_bytes_total: iface.counters.map(|c| c.rx_bytes),
                    tx_bytes_total: iface.counters.map(|c| c.tx_bytes),
                    rx_bytes_per_sec: rate.and_then(|r| r.rx_bytes_per_sec),
                    tx_bytes_per_sec: rate.and_then(|r| r.tx_bytes_per_sec),
                }
            })
            .collect();

        let disk_io = raw
            .devices
            .iter()
            .map(|dev| {
                let rate = rates.and_then(|r| r.devices.iter().find(|d| d.name == dev.name));
                DeviceSample {
                    name: dev.name.clone(),
                    read_bytes_total: dev.counters.map(|c| c.read_bytes),
                    written_bytes_total: dev.counters.map(|c| c.written_bytes),
                    read_bytes_per_sec: rate.and_then(|r| r.read_bytes_per_sec),
                    write_bytes_per_sec: rate.and_then(|r| r.write_bytes_per_sec),
                }
            })
            .collect();

        Self {
            timestamp: raw.timestamp,
            cpu_usage: raw.cpu_usage,
            cpu_temp: raw.cpu_temp,
            memory_used: raw.memory.map(|m| m.used),
            memory_total: raw.memory.map(|m| m.total),
            disks: raw
                .mounts
                .iter()
                .map(|m| DiskUsage {
                    path: m.path.clone(),
                    used: m.usage.map(|u| u.used),
                    total: m.usage.map(|u| u.total),
                })
                .collect(),
            network,
            disk_io,
        }
    }

    pub fn memory_usage_percent(&self) -> Option<f64> {
        match (self.memory_used, self.memory_total) {
            (Some(used), Some(total)) => SpaceUsage { used, total }.percent(),
            _ => None,
        }
    }
}
