//! Decoder for Guitar Pro tablature files (GP3, GP5, GPX, GP7+) into a
//! unified song model (spec §1-3). Each container format funnels into the
//! same `model::Song`: GPX and GP7+ both end up resolving a GPIF XML
//! document (`gpif::transform`), while GP3/GP5 are read sequentially by
//! the `legacy` decoders straight into the model.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;

pub mod bitcursor;
pub mod cursor;
pub mod detect;
pub mod error;
pub mod gp7;
pub mod gpif;
pub mod gpx;
pub mod inflate;
pub mod legacy;
pub mod limits;
pub mod model;
pub mod pitch;

pub use error::{Error, ErrorKind, Result};
pub use limits::DecodeLimits;
pub use model::*;

/// Detects the format and decodes `data` into a `Song`, using default
/// untrusted-input limits.
pub fn parse(data: &[u8]) -> Result<Song> {
    parse_with_limits(data, None, &DecodeLimits::default())
}

/// As `parse`, but with an optional filename hint for the detector's
/// fallback rule and explicit resource limits.
pub fn parse_with_limits(data: &[u8], filename_hint: Option<&str>, limits: &DecodeLimits) -> Result<Song> {
    detect::parse(data, filename_hint, limits)
}

/// Runs format detection alone, without decoding.
pub fn detect_format(data: &[u8], filename_hint: Option<&str>) -> Result<detect::Format> {
    detect::detect(data, filename_hint)
}

pub fn parse_gpx(data: &[u8], limits: &DecodeLimits) -> Result<Song> {
    let xml = gpx::extract_gpif(data, limits)?;
    gpif::transform(&xml, limits)
}

pub fn parse_gp7(data: &[u8], limits: &DecodeLimits) -> Result<Song> {
    let xml = gp7::extract_gpif(data, limits)?;
    gpif::transform(&xml, limits)
}

pub fn parse_gp5(data: &[u8], limits: &DecodeLimits) -> Result<Song> {
    legacy::gp5::parse(data, limits)
}

pub fn parse_gp3(data: &[u8], limits: &DecodeLimits) -> Result<Song> {
    legacy::gp3::parse(data, limits)
}

/// Converts a symbolic duration (plus dotted/tuplet modifiers) into a beat
/// count in quarter notes (spec §3). Each augmentation dot adds half of the
/// running value, compounding: dot 1 is `×1.5`, dot 2 is `×1.5` again on top
/// of that (`×2.25` total), and so on — `dotted` is uncapped (GPIF's
/// `<AugmentationDot count="N">` has no upper bound, see `gpif::build_bar`).
pub fn duration_to_beats(duration: Duration, dotted: u8, tuplet: Option<Tuplet>) -> f64 {
    let mut beats = duration.base_beats();
    for _ in 0..dotted {
        beats *= 1.5;
    }
    if let Some(t) = tuplet {
        if t.num > 0 {
            beats *= t.den as f64 / t.num as f64;
        }
    }
    beats
}

/// Wall-clock duration of one beat in milliseconds, given its tempo in BPM.
pub fn beat_duration_ms(beat: &Beat) -> f64 {
    let beats = duration_to_beats(beat.duration, beat.dotted, beat.tuplet);
    beats * 60_000.0 / beat.tempo.max(1) as f64
}

/// 1-based beat position within a bar (spec §6): sum the preceding beats'
/// fractions, divide by `4/denominator`, floor and add one, then clamp to
/// the time signature's numerator.
pub fn musical_beat_position(bar: &Bar, beat_index_in_bar: usize) -> u8 {
    let preceding: f64 = bar.beats[..beat_index_in_bar]
        .iter()
        .map(|b| duration_to_beats(b.duration, b.dotted, b.tuplet))
        .sum();
    let denominator_factor = 4.0 / bar.time_signature.denominator as f64;
    let position = (preceding / denominator_factor).floor() + 1.0;
    position.min(bar.time_signature.numerator as f64).max(1.0) as u8
}

/// Total musical length of a bar, in beats: the time-signature numerator
/// (spec §6), not a sum over the bar's actual beat durations.
pub fn bar_musical_beat_count(bar: &Bar) -> u8 {
    bar.time_signature.numerator
}
