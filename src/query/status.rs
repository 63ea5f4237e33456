// Plain-text rendering of one sample for the status tool.

use std::fmt::Write;

use crate::models::Sample;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const NA: &str = "N/A";

fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, suffix),
        None => NA.to_string(),
    }
}

fn fmt_mbps(bytes_per_sec: Option<f64>) -> String {
    match bytes_per_sec {
        Some(v) => format!("{:.2}MB/s", v / BYTES_PER_MB),
        None => NA.to_string(),
    }
}

fn fmt_timestamp(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| ms.to_string())
}

/// Multi-line report: timestamp, CPU, temperature, memory, then one line per mount,
/// interface and device. Absent readings print as N/A.
pub fn render(sample: &Sample) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Timestamp: {}", fmt_timestamp(sample.timestamp));
    let _ = writeln!(out, "CPU Usage: {}", fmt_opt(sample.cpu_usage, "%"));
    let _ = writeln!(out, "CPU Temp: {}", fmt_opt(sample.cpu_temp, "°C"));
    let _ = writeln!(
        out,
        "Memory Usage: {}",
        fmt_opt(sample.memory_usage_percent(), "%")
    );
    let _ = writeln!(out, "Disk Usage:");
    for d in &sample.disks {
        let _ = writeln!(out, "  {}: {}", d.path, fmt_opt(d.percent(), "%"));
    }
    let _ = writeln!(out, "Network:");
    for i in &sample.network {
        let _ = writeln!(
            out,
            "  {}: RX {} TX {}",
            i.name,
            fmt_mbps(i.rx_bytes_per_sec),
            fmt_mbps(i.tx_bytes_per_sec)
        );
    }
    let _ = writeln!(out, "Disk I/O:");
    for d in &sample.disk_io {
        let _ = writeln!(
            out,
            "  {}: Read {} Write {}",
            d.name,
            fmt_mbps(d.read_bytes_per_sec),
            fmt_mbps(d.write_bytes_per_sec)
        );
    }
    out
}
