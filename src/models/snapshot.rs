// RawSnapshot: one unprocessed OS read, cumulative counters included.

use serde::{Deserialize, Serialize};

/// Used/total bytes of one filesystem or of RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceUsage {
    pub used: u64,
    pub total: u64,
}

impl SpaceUsage {
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.used as f64 * 100.0 / self.total as f64)
    }
}

/// Cumulative byte counters of a network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Cumulative byte counters of a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoCounters {
    pub read_bytes: u64,
    pub written_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountReading {
    pub path: String,
    /// None when the path is missing or its filesystem could not be read.
    pub usage: Option<SpaceUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceReading {
    pub name: String,
    /// None when the interface is down or gone.
    pub counters: Option<NetCounters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReading {
    pub name: String,
    pub counters: Option<IoCounters>,
}

/// Every field is independently optional: a failed source never invalidates the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    pub timestamp: u64,
    pub cpu_usage: Option<f64>,
    pub cpu_temp: Option<f64>,
    pub memory: Option<SpaceUsage>,
    pub mounts: Vec<MountReading>,
    pub interfaces: Vec<InterfaceReading>,
    pub devices: Vec<DeviceReading>,
}

impl RawSnapshot {
    /// Snapshot with every source absent.
    pub fn empty(timestamp: u64) -> Self {
        Self {
            timestamp,
            cpu_usage: None,
            cpu_temp: None,
            memory: None,
            mounts: vec![],
            interfaces: vec![],
            devices: vec![],
        }
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceReading> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn device(&self, name: &str) -> Option<&DeviceReading> {
        self.devices.iter().find(|d| d.name == name)
    }
}
