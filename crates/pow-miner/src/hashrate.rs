//! Hash-rate arithmetic and formatting.

/// Unit suffixes from largest to smallest scale.
const UNITS: [(f64, &str); 4] = [(1e12, "TH/s"), (1e9, "GH/s"), (1e6, "MH/s"), (1e3, "KH/s")];

/// Average hashes per second over `seconds`; 0 when no time has elapsed.
pub fn calculate_hashrate(hashes: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        hashes as f64 / seconds
    } else {
        0.0
    }
}

/// Render a rate with two decimals in the largest unit it reaches.
pub fn format_hashrate(hashrate: f64) -> String {
    UNITS
        .iter()
        .find(|(scale, _)| hashrate >= *scale)
        .map(|(scale, unit)| format!("{:.2} {}", hashrate / scale, unit))
        .unwrap_or_else(|| format!("{:.2} H/s", hashrate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashrate() {
        assert_eq!(calculate_hashrate(1000, 2.0), 500.0);
        assert_eq!(calculate_hashrate(1000, 0.0), 0.0);
        assert_eq!(calculate_hashrate(1000, -1.0), 0.0);
        assert_eq!(calculate_hashrate(0, 5.0), 0.0);
    }

    #[test]
    fn test_format_hashrate() {
        assert_eq!(format_hashrate(12.5), "12.50 H/s");
        assert_eq!(format_hashrate(2_720.5), "2.72 KH/s");
        assert_eq!(format_hashrate(3_500_000.0), "3.50 MH/s");
        assert_eq!(format_hashrate(1.5e9), "1.50 GH/s");
        assert_eq!(format_hashrate(4.25e12), "4.25 TH/s");
        assert_eq!(format_hashrate(0.0), "0.00 H/s");
    }
}
