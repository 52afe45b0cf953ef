//! Untrusted-input hardening caps.
//!
//! spec.md leaves these unspecified ("recommended but out of scope for the
//! core"); this crate still checks on-disk declared sizes against a cap
//! before sizing a buffer from them, the same way `gpx::decompress_bcfz`
//! pre-sizes its output `Vec` from a declared length. Defaults are generous
//! enough for any real tab; callers decoding arbitrary/untrusted input can
//! tighten them with `parse_with_limits`.

/// Caps applied to on-disk declared sizes before they size an allocation.
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    /// Max bytes a BCFZ/Inflate declared uncompressed length may request.
    pub max_uncompressed_size: usize,
    /// Max GP3/GP5 measure count before `UnsupportedVersion`-style bail-out.
    pub max_measure_count: i32,
    /// Max GP3/GP5 track count.
    pub max_track_count: i32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        DecodeLimits {
            max_uncompressed_size: 256 * 1024 * 1024,
            max_measure_count: 100_000,
            max_track_count: 1_000,
        }
    }
}
