//! Human-readable renderings of sizes, rates, and durations.

use std::time::Duration;

const UNIT: u64 = 1024;
const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Render a byte count with binary steps and one decimal, e.g. `"1.5 MB"`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut divisor = UNIT;
    let mut exponent = 0;
    let mut remaining = bytes / UNIT;
    while remaining >= UNIT && exponent + 1 < PREFIXES.len() {
        divisor *= UNIT;
        exponent += 1;
        remaining /= UNIT;
    }
    format!(
        "{:.1} {}B",
        to_f64(bytes) / to_f64(divisor),
        PREFIXES[exponent]
    )
}

/// Render a rate in bytes per second, e.g. `"512 B/s"`.
#[must_use]
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

/// Render a duration as `"42s"`, `"17m"`, or `"3h 5m"`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h {}m", secs / 3_600, (secs / 60) % 60)
    }
}

#[allow(clippy::cast_precision_loss, reason = "display precision only")]
const fn to_f64(value: u64) -> f64 {
    value as f64
}
