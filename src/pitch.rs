//! Pitch class, MIDI pitch, and note-name rendering (spec §3, `PitchModel`).

const SHARP_NAMES: [&str; 12] =
    ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
const FLAT_NAMES: [&str; 12] =
    ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"];

/// `0 = C, 1 = C#/Db, ..., 11 = B` (spec §3).
pub fn midi_to_pitch_class(midi: i32) -> u8 {
    (((midi % 12) + 12) % 12) as u8
}

/// Render a pitch class as a note name. The seven naturals are spelled
/// without an accidental; the other five take sharp or flat spelling per
/// `prefer_sharp`.
pub fn note_name(pitch_class: u8, prefer_sharp: bool) -> String {
    let pc = (pitch_class % 12) as usize;
    if prefer_sharp {
        SHARP_NAMES[pc].to_string()
    } else {
        FLAT_NAMES[pc].to_string()
    }
}

/// Reconstruct a `(pitch_class, name)` pair from a pitch class alone,
/// defaulting to sharp spelling. Used by property test P8.
pub fn note_from_pitch_class(pitch_class: u8) -> (u8, String) {
    let pc = pitch_class % 12;
    (pc, note_name(pc, true))
}

/// Standard six-string guitar tuning, high-to-low (spec §4.7 GPIF default),
/// as MIDI note numbers: {E4, B3, G3, D3, A2, E2}.
pub const STANDARD_TUNING_MIDI_HIGH_TO_LOW: [i32; 6] = [64, 59, 55, 50, 45, 40];
