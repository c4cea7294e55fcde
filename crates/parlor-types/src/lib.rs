pub mod api;
pub mod events;
pub mod models;

/// Render a byte count as a short human-readable string ("1.5 KB", "10 MB").
/// Used in attachment views so clients don't re-implement size formatting.
pub fn format_bytes(bytes: u64) -> String {
    const SUFFIXES: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut value = bytes as f64;
    let mut index = 0;
    while value >= 1024.0 && index < SUFFIXES.len() - 1 {
        value /= 1024.0;
        index += 1;
    }

    if value.fract() == 0.0 {
        format!("{} {}", value as u64, SUFFIXES[index])
    } else {
        format!("{:.1} {}", value, SUFFIXES[index])
    }
}

#[cfg(test)]
mod tests {
    use super::format_bytes;

    #[test]
    fn formats_small_sizes_as_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn formats_whole_units_without_decimals() {
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10 MB");
    }

    #[test]
    fn formats_fractional_units_with_one_decimal() {
        assert_eq!(format_bytes(1536), "1.5 KB");
    }

    #[test]
    fn caps_at_gigabytes() {
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }
}
