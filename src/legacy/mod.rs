//! Sequential binary decoders for GP3 and GP5 (spec §4.8), grounded on the
//! teacher's `legacy/gp5_reader.rs` field ordering and naming, rebuilt over
//! `ByteCursor` and producing `model::Song` directly instead of the
//! teacher's separate intermediate `song::Song` + `SongInfo` structs.

pub mod gp3;
pub mod gp5;

use crate::cursor::ByteCursor;
use crate::error::{Error, ErrorKind, Result};
use crate::model::{Duration, KeyMode, KeySignature, Section, TimeSignature, Tuplet};

/// Signed-byte duration code, `-2..=5` (spec §4.8 "Beat (GP5)").
pub fn duration_from_code(code: i8) -> Result<Duration> {
    match code {
        -2 => Ok(Duration::Whole),
        -1 => Ok(Duration::Half),
        0 => Ok(Duration::Quarter),
        1 => Ok(Duration::Eighth),
        2 => Ok(Duration::Sixteenth),
        3 => Ok(Duration::ThirtySecond),
        4 => Ok(Duration::SixtyFourth),
        5 => Ok(Duration::HundredTwentyEighth),
        _ => Err(Error::from(ErrorKind::BadContainer(format!("unknown duration code {}", code)))),
    }
}

/// Fixed tuplet code table (spec §4.8): `{3:(3,2), 5:(5,4), 6:(6,4), 7:(7,4),
/// 9..13 over den 8}`. Unknown codes are preserved as `None` per §7's
/// "unknown codes map to null" recovery rule.
pub fn tuplet_from_code(code: i32) -> Option<Tuplet> {
    match code {
        3 => Some(Tuplet { num: 3, den: 2 }),
        5 => Some(Tuplet { num: 5, den: 4 }),
        6 => Some(Tuplet { num: 6, den: 4 }),
        7 => Some(Tuplet { num: 7, den: 4 }),
        9..=13 => Some(Tuplet { num: code as u32, den: 8 }),
        _ => None,
    }
}

/// Result of reading one measure-header record (spec §4.8 "Measure headers
/// (GP5)"), shared by GP3 and GP5 since neither spec section documents a
/// difference between the two formats here.
#[derive(Debug, Clone)]
pub struct MeasureHeader {
    pub time_signature: TimeSignature,
    pub key_signature: Option<KeySignature>,
    pub section: Option<Section>,
    pub repeat_start: bool,
    pub repeat_end: bool,
    pub repeat_count: u8,
}

pub struct MeasureHeaderState {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for MeasureHeaderState {
    fn default() -> Self {
        MeasureHeaderState { numerator: 4, denominator: 4 }
    }
}

/// Numerator/denominator carry from the previous header when their flag
/// bits are clear; marker/key/double-bar/alternate-ending are read in the
/// order the spec lists their flag bits.
pub fn read_measure_header(cursor: &mut ByteCursor, state: &mut MeasureHeaderState, is_first: bool) -> Result<MeasureHeader> {
    if !is_first {
        cursor.skip(1)?;
    }
    let flags = cursor.read_u8()?;

    if flags & 0x01 != 0 {
        state.numerator = cursor.read_i8()? as u8;
    }
    if flags & 0x02 != 0 {
        state.denominator = cursor.read_i8()? as u8;
    }
    let repeat_start = flags & 0x04 != 0;

    let mut repeat_count = 0u8;
    let repeat_end = flags & 0x08 != 0;
    if repeat_end {
        let raw = cursor.read_i8()?;
        repeat_count = if raw > 0 { (raw - 1) as u8 } else { 0 };
    }

    let mut section = None;
    if flags & 0x20 != 0 {
        let name = cursor.read_int_byte_sized_string()?;
        cursor.skip(3)?; // marker RGB
        cursor.skip(1)?; // padding
        section = Some(Section { letter: None, text: Some(name) });
    }

    let mut key_signature = None;
    if flags & 0x40 != 0 {
        let accidental_count = cursor.read_i8()?;
        let mode_byte = cursor.read_i8()?;
        let mode = if mode_byte == 0 { KeyMode::Major } else { KeyMode::Minor };
        key_signature = Some(KeySignature { accidental_count, mode });
    }

    // flags & 0x80 (double bar) carries no extra payload.

    if flags & 0x10 != 0 {
        cursor.skip(1)?; // alternate-ending byte, not surfaced in the model
    }

    if flags & 0x03 != 0 {
        cursor.skip(4)?; // beam-group data
    }
    if flags & 0x10 == 0 {
        cursor.skip(1)?;
    }

    cursor.skip(1)?; // triplet feel

    Ok(MeasureHeader {
        time_signature: TimeSignature { numerator: state.numerator, denominator: state.denominator },
        key_signature,
        section,
        repeat_start,
        repeat_end,
        repeat_count,
    })
}

pub fn read_measure_headers(cursor: &mut ByteCursor, count: i32) -> Result<Vec<MeasureHeader>> {
    let mut state = MeasureHeaderState::default();
    let mut headers = Vec::with_capacity(count.max(0) as usize);
    for i in 0..count {
        headers.push(read_measure_header(cursor, &mut state, i == 0)?);
    }
    Ok(headers)
}
