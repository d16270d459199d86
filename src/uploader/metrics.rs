use std::time::Instant;

use crate::types::UploadMetrics;

/// Compute progress, rate and remaining time for a transfer.
///
/// `native_rate` is bytes per second and `native_estimate` seconds, both as reported by the
/// transport. When either is missing or zero the figures are derived from elapsed time.
pub fn compute(
    loaded: u64,
    total: u64,
    started: Instant,
    now: Instant,
    native_rate: Option<f64>,
    native_estimate: Option<f64>,
) -> UploadMetrics {
    let progress = if total > 0 {
        ((loaded as f64 * 100.0 / total as f64).round() as u64).min(100) as u8
    } else {
        0
    };

    let mut rate_kbps = native_rate
        .filter(|rate| rate.is_finite() && *rate > 0.0)
        .map(|rate| (rate / 1024.0).round() as u64)
        .filter(|kbps| *kbps > 0);
    let mut remaining_seconds = native_estimate
        .filter(|estimate| estimate.is_finite())
        .map(|estimate| estimate.max(0.0).round() as u64);

    if rate_kbps.is_none() || remaining_seconds.unwrap_or(0) == 0 {
        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        if elapsed > 0.0 && total > 0 {
            let rate = ((loaded as f64 / 1024.0) / elapsed).round().max(1.0);
            let remaining_bytes = total.saturating_sub(loaded) as f64;
            rate_kbps = Some(rate as u64);
            remaining_seconds = Some(((remaining_bytes / 1024.0) / rate).round().max(0.0) as u64);
        }
    }

    UploadMetrics {
        progress,
        rate_kbps,
        remaining_seconds,
    }
}
