// Linux-specific sources: thermal zone, /proc/diskstats.

use std::collections::HashMap;

use crate::models::IoCounters;

/// /proc/diskstats counts 512-byte sectors regardless of the device's block size.
const SECTOR_BYTES: u64 = 512;

/// Read a thermal zone file (millidegrees Celsius) and return degrees.
pub(super) fn read_thermal_celsius(path: &str) -> anyhow::Result<f64> {
    let content = std::fs::read_to_string(path)?;
    parse_thermal(&content).ok_or_else(|| anyhow::anyhow!("unparseable thermal reading in {}", path))
}

pub(super) fn parse_thermal(content: &str) -> Option<f64> {
    let milli: i64 = content.trim().parse().ok()?;
    Some(milli as f64 / 1000.0)
}

/// Cumulative read/write bytes per device from /proc/diskstats.
pub(super) fn read_diskstats() -> anyhow::Result<HashMap<String, IoCounters>> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/diskstats")?;
        Ok(parse_diskstats(&content))
    }
    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("disk I/O counters are only available on Linux")
    }
}

/// Fields: major minor name reads merged sectors_read ms writes merged sectors_written ...
pub(super) fn parse_diskstats(content: &str) -> HashMap<String, IoCounters> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }
        let (Ok(sectors_read), Ok(sectors_written)) =
            (parts[5].parse::<u64>(), parts[9].parse::<u64>())
        else {
            continue;
        };
        out.insert(
            parts[2].to_string(),
            IoCounters {
                read_bytes: sectors_read.saturating_mul(SECTOR_BYTES),
                written_bytes: sectors_written.saturating_mul(SECTOR_BYTES),
            },
        );
    }
    out
}
