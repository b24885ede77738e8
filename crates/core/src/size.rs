//! Human-readable byte sizes.

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Format a byte count with binary units and one decimal place.
///
/// The value is divided by 1024 until it drops below 1024 or the largest
/// unit is reached: `512` becomes `"512.0 B"`, `1536` becomes `"1.5 KiB"`.
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
