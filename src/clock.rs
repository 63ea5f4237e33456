// Wall-clock helpers. Timestamps throughout the crate are milliseconds since the Unix epoch.

/// Current wall-clock time in ms. A clock before the epoch is logged and reported as 0.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                operation = "get_timestamp",
                "system time error"
            );
            0
        })
}

/// Milliseconds until the next multiple of `interval_ms` (aligned to the epoch).
pub fn delay_to_boundary(now_ms: u64, interval_ms: u64) -> u64 {
    if interval_ms == 0 {
        return 0;
    }
    match now_ms % interval_ms {
        0 => 0,
        rem => interval_ms - rem,
    }
}
