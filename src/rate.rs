// Counter -> rate conversion.
//
// Policy: an interval whose counter went backwards (reset, wrap, device re-added) or
// whose elapsed time is not positive has NO rate. It is never clamped to zero.

use crate::models::{
    DerivedRates, DeviceRate, InterfaceRate, IoCounters, NetCounters, RawSnapshot,
};

/// Bytes/sec between two cumulative readings `dt_secs` apart.
pub fn counter_rate(prev: u64, curr: u64, dt_secs: f64) -> Option<f64> {
    if dt_secs <= 0.0 || !dt_secs.is_finite() {
        return None;
    }
    let delta = curr.checked_sub(prev)?;
    Some(delta as f64 / dt_secs)
}

/// Seconds from `previous` to `current`; None when the clock did not move forward.
pub fn elapsed_secs(previous: &RawSnapshot, current: &RawSnapshot) -> Option<f64> {
    let dt_ms = current.timestamp.checked_sub(previous.timestamp)?;
    if dt_ms == 0 {
        return None;
    }
    Some(dt_ms as f64 / 1000.0)
}

/// Per-interface and per-device rates of `current` against `previous`.
/// Names missing from either side, or with absent counters, get absent rates.
pub fn derive(previous: &RawSnapshot, current: &RawSnapshot) -> DerivedRates {
    let dt = elapsed_secs(previous, current);

    let interfaces = current
        .interfaces
        .iter()
        .map(|iface| {
            let prev = previous.interface(&iface.name).and_then(|p| p.counters);
            let (rx, tx) = match (dt, prev, iface.counters) {
                (Some(dt), Some(p), Some(c)) => net_rates(p, c, dt),
                _ => (None, None),
            };
            InterfaceRate {
                name: iface.name.clone(),
                rx_bytes_per_sec: rx,
                tx_bytes_per_sec: tx,
            }
        })
        .collect();

    let devices = current
        .devices
        .iter()
        .map(|dev| {
            let prev = previous.device(&dev.name).and_then(|p| p.counters);
            let (read, write) = match (dt, prev, dev.counters) {
                (Some(dt), Some(p), Some(c)) => io_rates(p, c, dt),
                _ => (None, None),
            };
            DeviceRate {
                name: dev.name.clone(),
                read_bytes_per_sec: read,
                write_bytes_per_sec: write,
            }
        })
        .collect();

    DerivedRates {
        interfaces,
        devices,
    }
}

fn net_rates(prev: NetCounters, curr: NetCounters, dt: f64) -> (Option<f64>, Option<f64>) {
    (
        counter_rate(prev.rx_bytes, curr.rx_bytes, dt),
        counter_rate(prev.tx_bytes, curr.tx_bytes, dt),
    )
}

fn io_rates(prev: IoCounters, curr: IoCounters, dt: f64) -> (Option<f64>, Option<f64>) {
    (
        counter_rate(prev.read_bytes, curr.read_bytes, dt),
        counter_rate(prev.written_bytes, curr.written_bytes, dt),
    )
}
