//! `FormatDetector`: identifies which of the four container formats a byte
//! buffer holds (spec §4.9), then dispatches to the matching decoder.

use crate::error::{Error, ErrorKind, Result};
use crate::limits::DecodeLimits;
use crate::model::Song;
use crate::{gp7, gpif, gpx, legacy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Gpx,
    Gp7,
    Gp3,
    Gp5,
}

/// Five ordered rules: GPX magic, archive magic, a version-string sniff for
/// the legacy formats, a filename-suffix fallback, then failure.
///
/// A buffer too short to even attempt the magic-byte rules is `Truncated`,
/// not `UnrecognizedFormat` — detection never reaches the filename fallback
/// without first trying to read a real header.
pub fn detect(data: &[u8], filename_hint: Option<&str>) -> Result<Format> {
    if data.len() < 4 {
        return Err(Error::from(ErrorKind::Truncated));
    }
    if &data[0..4] == b"BCFZ" || &data[0..4] == b"BCFS" {
        debug!("Detected GPX container by magic");
        return Ok(Format::Gpx);
    }
    if data[0] == 0x50 && data[1] == 0x4B {
        debug!("Detected GP7+ archive by zip magic");
        return Ok(Format::Gp7);
    }
    let len = data[0] as usize;
    if (10..50).contains(&len) && data.len() >= 1 + len.min(40) {
        let header = String::from_utf8_lossy(&data[1..1 + len.min(40)]);
        if header.contains("GUITAR PRO") {
            if header.contains("v3") {
                debug!("Detected GP3 by version string");
                return Ok(Format::Gp3);
            }
            // GP4 shares GP5's v-string shape; without an explicit GP4
            // decoder, major version 5 is the only legacy fallback this
            // rule can commit to (spec §4.9's disambiguation note).
            debug!("Detected GP5 by version string");
            return Ok(Format::Gp5);
        }
    }
    if let Some(name) = filename_hint {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".gpx") {
            debug!("Falling back to filename suffix, detected GPX");
            return Ok(Format::Gpx);
        }
        if lower.ends_with(".gp7") || lower.ends_with(".gp") {
            debug!("Falling back to filename suffix, detected GP7+");
            return Ok(Format::Gp7);
        }
        if lower.ends_with(".gp3") {
            debug!("Falling back to filename suffix, detected GP3");
            return Ok(Format::Gp3);
        }
        if lower.ends_with(".gp5") || lower.ends_with(".gp4") {
            debug!("Falling back to filename suffix, detected GP5");
            return Ok(Format::Gp5);
        }
    }
    Err(Error::from(ErrorKind::UnrecognizedFormat))
}

/// Detects the format and runs the matching decoder end to end.
pub fn parse(data: &[u8], filename_hint: Option<&str>, limits: &DecodeLimits) -> Result<Song> {
    match detect(data, filename_hint)? {
        Format::Gpx => {
            let xml = gpx::extract_gpif(data, limits)?;
            gpif::transform(&xml, limits)
        }
        Format::Gp7 => {
            let xml = gp7::extract_gpif(data, limits)?;
            gpif::transform(&xml, limits)
        }
        Format::Gp3 => legacy::gp3::parse(data, limits),
        Format::Gp5 => legacy::gp5::parse(data, limits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_gpx_by_magic() {
        assert_eq!(detect(b"BCFZ....", None).unwrap(), Format::Gpx);
        assert_eq!(detect(b"BCFS....", None).unwrap(), Format::Gpx);
    }

    #[test]
    fn detects_gp7_by_zip_magic() {
        assert_eq!(detect(&[0x50, 0x4B, 0x03, 0x04], None).unwrap(), Format::Gp7);
    }

    #[test]
    fn detects_gp3_by_version_string() {
        let version = b"GUITAR PRO v3";
        let mut data = vec![version.len() as u8];
        data.extend_from_slice(version);
        assert_eq!(detect(&data, None).unwrap(), Format::Gp3);
    }

    #[test]
    fn detects_gp5_by_version_string() {
        let version = b"GUITAR PRO v5.10";
        let mut data = vec![version.len() as u8];
        data.extend_from_slice(version);
        assert_eq!(detect(&data, None).unwrap(), Format::Gp5);
    }

    #[test]
    fn falls_back_to_filename_suffix() {
        assert_eq!(detect(&[0u8; 10], Some("song.gp5")).unwrap(), Format::Gp5);
    }

    #[test]
    fn unrecognized_without_any_signal() {
        let err = detect(&[0u8; 10], None).unwrap_err();
        assert!(err.to_string().contains("recognize"));
    }

    #[test]
    fn truncated_buffer_fails_before_filename_fallback() {
        let err = detect(&[0u8, 1], Some("song.gp5")).unwrap_err();
        assert!(err.to_string().contains("past the end"));
    }

    #[test]
    fn filename_suffix_selects_gpx_and_gp7() {
        assert_eq!(detect(&[0u8; 10], Some("x.gpx")).unwrap(), Format::Gpx);
        assert_eq!(detect(&[0u8; 10], Some("x.gp")).unwrap(), Format::Gp7);
    }
}
