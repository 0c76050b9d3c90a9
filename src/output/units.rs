//! Rate and size conversion for human-readable output

use crate::models::OutputOptions;

/// Converts canonical bit/s and byte counts into display units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitFormatter {
    /// Show rates in bytes per second
    pub bytes: bool,
    /// Use 1024-based prefixes
    pub binary: bool,
}

impl UnitFormatter {
    pub fn new(bytes: bool, binary: bool) -> Self {
        Self { bytes, binary }
    }

    pub fn from_options(options: &OutputOptions) -> Self {
        Self::new(options.bytes, options.mebibytes)
    }

    fn base(&self) -> f64 {
        if self.binary {
            1024.0
        } else {
            1000.0
        }
    }

    /// Convert `bps` into the configured mega-unit
    pub fn rate_value(&self, bps: f64) -> f64 {
        let value = if self.bytes { bps / 8.0 } else { bps };
        value / (self.base() * self.base())
    }

    pub fn rate_label(&self) -> &'static str {
        match (self.bytes, self.binary) {
            (false, false) => "Mbps",
            (false, true) => "Mibps",
            (true, false) => "MB/s",
            (true, true) => "MiB/s",
        }
    }

    /// `bps` rendered with two decimals and its unit
    pub fn format_rate(&self, bps: f64) -> String {
        format!("{:.2} {}", self.rate_value(bps), self.rate_label())
    }

    /// Byte count rendered with the largest fitting prefix
    pub fn format_size(&self, bytes: u64) -> String {
        let units: [&str; 5] = if self.binary {
            ["B", "KiB", "MiB", "GiB", "TiB"]
        } else {
            ["B", "KB", "MB", "GB", "TB"]
        };

        let mut value = bytes as f64;
        let mut unit = 0;
        while value >= self.base() && unit < units.len() - 1 {
            value /= self.base();
            unit += 1;
        }

        if unit == 0 {
            format!("{} {}", bytes, units[0])
        } else {
            format!("{:.2} {}", value, units[unit])
        }
    }
}
