// Dashboard projection: samples or bucket means -> labelled lines of (t, v) points.
// Every line has one point per input timestamp; a missing value is a gap (None).

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::models::{AggregatedPoint, Sample};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Temp,
    Memory,
    Disk,
    Network,
    DiskIo,
}

impl Metric {
    pub fn unit(self) -> &'static str {
        match self {
            Metric::Cpu | Metric::Memory | Metric::Disk => "%",
            Metric::Temp => "°C",
            Metric::Network | Metric::DiskIo => "MB/s",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Metric::Cpu => "CPU Usage (%)",
            Metric::Temp => "Temperature (°C)",
            Metric::Memory => "Memory Usage (%)",
            Metric::Disk => "Disk Usage (%)",
            Metric::Network | Metric::DiskIo => "Speed (MB/s)",
        }
    }
}

impl FromStr for Metric {
    type Err = ChartParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Metric::Cpu),
            "temp" => Ok(Metric::Temp),
            "memory" => Ok(Metric::Memory),
            "disk" => Ok(Metric::Disk),
            "network" => Ok(Metric::Network),
            "diskio" => Ok(Metric::DiskIo),
            other => Err(ChartParseError::Metric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Metric::Cpu => "cpu",
            Metric::Temp => "temp",
            Metric::Memory => "memory",
            Metric::Disk => "disk",
            Metric::Network => "network",
            Metric::DiskIo => "diskio",
        };
        f.write_str(s)
    }
}

/// `hour`: raw samples of the recent window. `all`: bucket means over the retained span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Hour,
    All,
}

impl FromStr for View {
    type Err = ChartParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(View::Hour),
            "all" => Ok(View::All),
            other => Err(ChartParseError::View(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChartParseError {
    #[error("unknown chart metric: {0}")]
    Metric(String),
    #[error("unknown chart view: {0}")]
    View(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub t: u64,
    pub v: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub label: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub metric: Metric,
    pub view: View,
    pub title: &'static str,
    pub unit: &'static str,
    pub lines: Vec<Line>,
}

impl Chart {
    pub fn new(metric: Metric, view: View, lines: Vec<Line>) -> Self {
        Self {
            metric,
            view,
            title: metric.title(),
            unit: metric.unit(),
            lines,
        }
    }
}

fn to_mb(bytes_per_sec: Option<f64>) -> Option<f64> {
    bytes_per_sec.map(|v| v / BYTES_PER_MB)
}

/// Builds one line per label (in first-seen order), aligned on the input timestamps.
fn project<T>(
    items: &[T],
    timestamp: impl Fn(&T) -> u64,
    values: impl Fn(&T) -> Vec<(String, Option<f64>)>,
) -> Vec<Line> {
    let rows: Vec<(u64, Vec<(String, Option<f64>)>)> =
        items.iter().map(|i| (timestamp(i), values(i))).collect();

    let mut labels: Vec<&str> = Vec::new();
    for (_, vals) in &rows {
        for (label, _) in vals {
            if !labels.contains(&label.as_str()) {
                labels.push(label.as_str());
            }
        }
    }

    labels
        .iter()
        .map(|label| Line {
            label: label.to_string(),
            points: rows
                .iter()
                .map(|(t, vals)| Point {
                    t: *t,
                    v: vals
                        .iter()
                        .find(|(l, _)| l == label)
                        .and_then(|(_, v)| *v),
                })
                .collect(),
        })
        .collect()
}

/// Lines from raw samples.
pub fn sample_lines<S: AsRef<Sample>>(metric: Metric, samples: &[S]) -> Vec<Line> {
    project(
        samples,
        |s| s.as_ref().timestamp,
        |s| {
            let s = s.as_ref();
            match metric {
                Metric::Cpu => vec![("CPU Usage %".to_string(), s.cpu_usage)],
                Metric::Temp => vec![("CPU Temp °C".to_string(), s.cpu_temp)],
                Metric::Memory => vec![("Memory Usage %".to_string(), s.memory_usage_percent())],
                Metric::Disk => s
                    .disks
                    .iter()
                    .map(|d| (d.path.clone(), d.percent()))
                    .collect(),
                Metric::Network => s
                    .network
                    .iter()
                    .flat_map(|i| {
                        [
                            (format!("{}_rx", i.name), to_mb(i.rx_bytes_per_sec)),
                            (format!("{}_tx", i.name), to_mb(i.tx_bytes_per_sec)),
                        ]
                    })
                    .collect(),
                Metric::DiskIo => s
                    .disk_io
                    .iter()
                    .flat_map(|d| {
                        [
                            (format!("{}_read", d.name), to_mb(d.read_bytes_per_sec)),
                            (format!("{}_write", d.name), to_mb(d.write_bytes_per_sec)),
                        ]
                    })
                    .collect(),
            }
        },
    )
}

/// Lines from bucket means; each point sits at its bucket start.
pub fn bucket_lines(metric: Metric, points: &[AggregatedPoint]) -> Vec<Line> {
    project(
        points,
        |p| p.bucket_start,
        |p| match metric {
            Metric::Cpu => vec![("CPU Usage %".to_string(), p.cpu_usage.map(|s| s.mean))],
            Metric::Temp => vec![("CPU Temp °C".to_string(), p.cpu_temp.map(|s| s.mean))],
            Metric::Memory => vec![(
                "Memory Usage %".to_string(),
                p.memory_usage_percent.map(|s| s.mean),
            )],
            Metric::Disk => p
                .disks
                .iter()
                .map(|d| (d.path.clone(), d.usage_percent.map(|s| s.mean)))
                .collect(),
            Metric::Network => p
                .network
                .iter()
                .flat_map(|i| {
                    [
                        (format!("{}_rx", i.name), to_mb(i.rx_bytes_per_sec.map(|s| s.mean))),
                        (format!("{}_tx", i.name), to_mb(i.tx_bytes_per_sec.map(|s| s.mean))),
                    ]
                })
                .collect(),
            Metric::DiskIo => p
                .disk_io
                .iter()
                .flat_map(|d| {
                    [
                        (format!("{}_read", d.name), to_mb(d.read_bytes_per_sec.map(|s| s.mean))),
                        (format!("{}_write", d.name), to_mb(d.write_bytes_per_sec.map(|s| s.mean))),
                    ]
                })
                .collect(),
        },
    )
}
