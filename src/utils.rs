use std::time::{Duration, Instant};

/// Format a `Duration` as a human-readable string with automatic unit scaling.
///
/// Produces output like `1.94ms`, `2.34s` using Rust's Debug format.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Log a warning if the elapsed time since `start` exceeds `threshold`.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(duration = fmt_duration(elapsed), "slow operation: {label}");
    }
}

/// Format a completion ratio like `70/120 (58.3%)`.
pub fn fmt_ratio(done: usize, total: usize) -> String {
    if total == 0 {
        return "0/0".to_string();
    }
    let pct = done as f64 * 100.0 / total as f64;
    format!("{done}/{total} ({pct:.1}%)")
}
