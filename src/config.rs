//! GC configuration: region layout and the `paranoid-allocation` knob.
//!
//! Grounded in `fgc::config::GcConfig` — a plain struct with `Default` and
//! `validate()` — scoped to the values this spec's driver actually needs
//! (§4.10): region bases/limits, the headroom floor, and paranoia mode.

use thiserror::Error;

/// Default base addresses, chosen to match spec.md §6's example layout
/// ("wired region begins at 2 MiB, pinned at 2 GiB").
pub const DEFAULT_WIRED_BASE: usize = 2 * 1024 * 1024;
pub const DEFAULT_PINNED_BASE: usize = 2 * 1024 * 1024 * 1024;
pub const DEFAULT_GENERAL_BASE: usize = 4 * 1024 * 1024 * 1024;
pub const DEFAULT_CONS_BASE: usize = 8 * 1024 * 1024 * 1024;

/// §4.8 step 12: "always keeping >= 256 blocks of headroom".
pub const DEFAULT_HEADROOM_BLOCKS: usize = 256;

/// §4.8 step 11: "round bump to a 2 MiB boundary".
pub const TRIM_ALIGNMENT: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Base address of the wired (pinned, fixed-location) region.
    pub wired_base: usize,
    pub wired_size: usize,
    /// Base address of the pinned region.
    pub pinned_base: usize,
    pub pinned_size: usize,
    /// Base address of the general (copying) region's reserved window.
    /// The window holds both newspace and oldspace halves.
    pub general_base: usize,
    /// Currently committed length of the general region (one half of the
    /// reserved window), per §6 "Persisted state".
    pub general_area_limit: usize,
    /// Base address of the cons (copying) region's reserved window.
    pub cons_base: usize,
    pub cons_area_limit: usize,
    /// §9 "Paranoia mode": poison freed freelist interiors with `-1`.
    pub paranoid_allocation: bool,
    /// Minimum free store-blocks to retain as headroom (§4.8 step 12).
    pub headroom_blocks: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            wired_base: DEFAULT_WIRED_BASE,
            wired_size: 16 * 1024 * 1024,
            pinned_base: DEFAULT_PINNED_BASE,
            pinned_size: 256 * 1024 * 1024,
            general_base: DEFAULT_GENERAL_BASE,
            general_area_limit: 256 * 1024 * 1024,
            cons_base: DEFAULT_CONS_BASE,
            cons_area_limit: 64 * 1024 * 1024,
            paranoid_allocation: false,
            headroom_blocks: DEFAULT_HEADROOM_BLOCKS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("region size must be nonzero: {0}")]
    ZeroSize(&'static str),

    #[error("region size must be word-aligned: {0} = {1}")]
    Unaligned(&'static str, usize),

    #[error("regions overlap: {0} and {1}")]
    Overlap(&'static str, &'static str),
}

impl GcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, size) in [
            ("wired_size", self.wired_size),
            ("pinned_size", self.pinned_size),
            ("general_area_limit", self.general_area_limit),
            ("cons_area_limit", self.cons_area_limit),
        ] {
            if size == 0 {
                return Err(ConfigError::ZeroSize(name));
            }
            if size % 8 != 0 {
                return Err(ConfigError::Unaligned(name, size));
            }
        }

        let regions = [
            ("wired", self.wired_base, self.wired_size),
            ("pinned", self.pinned_base, self.pinned_size),
            // general/cons windows hold two mirrored halves.
            ("general", self.general_base, self.general_area_limit * 2),
            ("cons", self.cons_base, self.cons_area_limit * 2),
        ];
        for i in 0..regions.len() {
            for j in (i + 1)..regions.len() {
                let (name_a, base_a, size_a) = regions[i];
                let (name_b, base_b, size_b) = regions[j];
                let disjoint = base_a + size_a <= base_b || base_b + size_b <= base_a;
                if !disjoint {
                    return Err(ConfigError::Overlap(name_a, name_b));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        GcConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_size_rejected() {
        let mut c = GcConfig::default();
        c.wired_size = 0;
        assert!(matches!(c.validate(), Err(ConfigError::ZeroSize("wired_size"))));
    }

    #[test]
    fn unaligned_rejected() {
        let mut c = GcConfig::default();
        c.general_area_limit = 7;
        assert!(matches!(c.validate(), Err(ConfigError::Unaligned("general_area_limit", 7))));
    }

    #[test]
    fn overlap_rejected() {
        let mut c = GcConfig::default();
        c.pinned_base = c.wired_base;
        assert!(matches!(c.validate(), Err(ConfigError::Overlap("wired", "pinned"))));
    }
}
